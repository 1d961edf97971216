//! Capability interface every chain kind implements, and the factory that
//! turns declarative [`ChainSpec`]s into running handles.

mod spec;
mod tx;
mod wallet;

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use futures::future::try_join_all;
use rand::{Rng as _, distributions::Alphanumeric, thread_rng};

pub use spec::{ChainKind, ChainSpec, DockerImage, GenesisKv};
pub use tx::{ExecOutput, IbcTimeout, TransferOptions, TransferTx, TxMessage, TxResult};
pub use wallet::{Wallet, WalletAmount};

use crate::{DynError, ibc::packet::PacketEvent};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("chain {chain_id} is not running")]
    NotRunning { chain_id: String },
    #[error("command `{command}` failed on {chain_id}: {stderr}")]
    Command {
        chain_id: String,
        command: String,
        stderr: String,
    },
    #[error("transaction on {chain_id} failed with code {code}: {raw_log}")]
    TxFailed {
        chain_id: String,
        code: u32,
        raw_log: String,
    },
    #[error("unexpected output from {chain_id} while reading {context}: {reason}")]
    Parse {
        chain_id: String,
        context: String,
        reason: String,
    },
    #[error("{operation} is not supported by {chain_id}")]
    Unsupported {
        chain_id: String,
        operation: &'static str,
    },
    #[error("chain {chain_id}: {source}")]
    Other {
        chain_id: String,
        #[source]
        source: DynError,
    },
}

impl ChainError {
    pub fn other(chain_id: &str, source: impl Into<DynError>) -> Self {
        Self::Other {
            chain_id: chain_id.to_owned(),
            source: source.into(),
        }
    }

    pub fn parse(chain_id: &str, context: &str, reason: impl ToString) -> Self {
        Self::Parse {
            chain_id: chain_id.to_owned(),
            context: context.to_owned(),
            reason: reason.to_string(),
        }
    }
}

/// A running chain network (one or more validator/full nodes).
///
/// Height only ever grows while the network runs; it is advanced by the
/// chain's own block production, never by the orchestrator.
#[async_trait]
pub trait NetworkHandle: Send + Sync {
    fn spec(&self) -> &ChainSpec;

    fn chain_id(&self) -> &str {
        &self.spec().chain_id
    }

    fn denom(&self) -> &str {
        &self.spec().denom
    }

    fn bech32_prefix(&self) -> &str {
        &self.spec().bech32_prefix
    }

    /// RPC address reachable from inside the test's network namespace.
    fn rpc_address(&self) -> String;

    async fn start(&self) -> Result<(), ChainError>;

    /// Stops every node. Stopping a stopped network is a no-op.
    async fn stop(&self) -> Result<(), ChainError>;

    async fn height(&self) -> Result<u64, ChainError>;

    async fn balance(&self, address: &str, denom: &str) -> Result<u128, ChainError>;

    async fn submit_transaction(&self, signer: &str, msg: TxMessage)
    -> Result<TxResult, ChainError>;

    async fn send_ibc_transfer(
        &self,
        channel_id: &str,
        signer: &str,
        amount: &WalletAmount,
        options: &TransferOptions,
    ) -> Result<TransferTx, ChainError>;

    async fn store_code(&self, signer: &str, artifact: &Path) -> Result<u64, ChainError>;

    async fn instantiate_contract(
        &self,
        signer: &str,
        code_id: u64,
        init: &serde_json::Value,
        label: &str,
        no_admin: bool,
    ) -> Result<String, ChainError>;

    async fn query_contract(
        &self,
        address: &str,
        query: &serde_json::Value,
    ) -> Result<serde_json::Value, ChainError>;

    async fn exec_cli(&self, argv: &[String]) -> Result<ExecOutput, ChainError>;

    /// Packet lifecycle events (acknowledgements, timeouts) included in the
    /// block at `height`.
    async fn packet_events(&self, height: u64) -> Result<Vec<PacketEvent>, ChainError>;

    /// Creates (or recovers from `mnemonic`) a key named `key_name` and funds
    /// it with `amount` of the native denom.
    async fn create_funded_wallet(
        &self,
        key_name: &str,
        amount: u128,
        mnemonic: Option<&str>,
    ) -> Result<Wallet, ChainError>;
}

#[async_trait]
pub trait ChainFactory: Send + Sync {
    async fn instantiate(
        &self,
        test_name: &str,
        specs: &[ChainSpec],
    ) -> Result<Vec<Arc<dyn NetworkHandle>>, ChainError>;
}

/// Funds one fresh wallet per network, returned in the same order.
pub async fn fund_test_wallets(
    key_prefix: &str,
    amount: u128,
    networks: &[Arc<dyn NetworkHandle>],
) -> Result<Vec<Wallet>, ChainError> {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();

    try_join_all(networks.iter().map(|network| {
        let key_name = format!("{key_prefix}-{}-{suffix}", network.chain_id());
        async move { network.create_funded_wallet(&key_name, amount, None).await }
    }))
    .await
}
