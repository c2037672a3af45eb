use alloy::consensus::BlockHeader;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{Result, eyre};

use crate::abi::KyeGroup;

/// Static parameters of a deployed circle contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircleParams {
    pub name: String,
    pub max_members: u32,
    pub round_duration_secs: u64,
    pub penalty_bps: u32,
}

impl Default for CircleParams {
    /// Used when the contract cannot be queried.
    fn default() -> Self {
        Self {
            name: String::new(),
            max_members: 10,
            round_duration_secs: 30 * 86_400,
            penalty_bps: 0,
        }
    }
}

/// Read access to the chain the circle contracts live on.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn block_number(&self) -> Result<u64>;

    /// Logs of one contract in `[from, to]`, in block/log order.
    async fn get_logs(&self, address: Address, from: u64, to: u64) -> Result<Vec<Log>>;

    async fn block_timestamp(&self, block: u64) -> Result<DateTime<Utc>>;

    async fn circle_params(&self, circle: Address) -> Result<CircleParams>;
}

/// [`ChainClient`] over a JSON-RPC HTTP endpoint.
#[derive(Clone)]
pub struct RpcChainClient {
    provider: DynProvider,
}

impl RpcChainClient {
    pub fn connect(rpc_url: &str) -> Result<Self> {
        let url = rpc_url.parse()?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self { provider })
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn get_logs(&self, address: Address, from: u64, to: u64) -> Result<Vec<Log>> {
        let filter = Filter::new().address(address).from_block(from).to_block(to);
        let mut logs = self.provider.get_logs(&filter).await?;
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        tracing::debug!(address = %address, from, to, count = logs.len(), "Fetched logs");
        Ok(logs)
    }

    async fn block_timestamp(&self, block: u64) -> Result<DateTime<Utc>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block))
            .await?
            .ok_or_else(|| eyre!("Block {} not found on chain", block))?;
        let ts = block.header.timestamp();
        DateTime::from_timestamp(ts as i64, 0).ok_or_else(|| eyre!("Invalid block timestamp {ts}"))
    }

    async fn circle_params(&self, circle: Address) -> Result<CircleParams> {
        let group = KyeGroup::new(circle, self.provider.clone());

        let name = group.name().call().await?;
        let max_members = group.maxMembers().call().await?;
        let round_duration = group.roundDuration().call().await?;
        let penalty_bps = group.penaltyBps().call().await?;

        Ok(CircleParams {
            name,
            max_members: max_members.saturating_to(),
            round_duration_secs: round_duration.saturating_to(),
            penalty_bps: penalty_bps.saturating_to(),
        })
    }
}
