//! Chain boundary of the indexer: circle contract ABIs, typed log decoding
//! and the [`ChainClient`] the sync engine polls through.

pub mod abi;
pub mod decoder;
#[cfg(any(test, feature = "test-util"))]
pub mod fixtures;
pub mod provider;

pub use abi::{KyeFactory, KyeGroup};
pub use decoder::{
    DecodeError, DecodedLog, EventKind, EventMeta, KyeEvent, Phase, decode_factory_log,
    decode_group_log,
};
pub use provider::{ChainClient, CircleParams, RpcChainClient};
