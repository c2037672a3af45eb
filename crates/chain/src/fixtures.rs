//! Builders for RPC logs carrying real ABI-encoded events.

use alloy::primitives::{Address, B256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;

/// An RPC log for `event` emitted by `address`, as a node would return it.
pub fn rpc_log<E: SolEvent>(
    address: Address,
    event: &E,
    block_number: u64,
    log_index: u64,
    transaction_hash: B256,
) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address,
            data: event.encode_log_data(),
        },
        block_number: Some(block_number),
        transaction_hash: Some(transaction_hash),
        log_index: Some(log_index),
        ..Default::default()
    }
}
