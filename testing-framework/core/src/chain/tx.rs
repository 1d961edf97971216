use serde::{Deserialize, Serialize};

use crate::ibc::packet::Packet;

/// Transaction payloads a scenario can submit through
/// [`NetworkHandle::submit_transaction`](super::NetworkHandle::submit_transaction).
#[derive(Clone, Debug, PartialEq)]
pub enum TxMessage {
    BankSend {
        to: String,
        denom: String,
        amount: u128,
    },
    WasmExecute {
        contract: String,
        msg: serde_json::Value,
        funds: Option<(u128, String)>,
    },
    /// Module-specific transaction, e.g. an administrative
    /// `liquidstakeibc register-host-chain ...` call.
    Module { module: String, args: Vec<String> },
}

impl TxMessage {
    #[must_use]
    pub fn module<I, S>(module: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Module {
            module: module.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxResult {
    pub height: u64,
    pub tx_hash: String,
    pub code: u32,
    #[serde(default)]
    pub raw_log: String,
}

impl TxResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Packet timeout requested at send time. Zero disables the respective bound.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IbcTimeout {
    pub height: u64,
    pub nanos: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferOptions {
    pub timeout: Option<IbcTimeout>,
    pub memo: Option<String>,
}

impl TransferOptions {
    #[must_use]
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: IbcTimeout) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A cross-chain transfer accepted by its source network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferTx {
    pub height: u64,
    pub tx_hash: String,
    pub gas_spent: u64,
    pub packet: Packet,
}

impl TransferTx {
    pub fn validate(&self) -> Result<(), String> {
        if self.height == 0 {
            return Err("transfer tx has no inclusion height".to_owned());
        }
        if self.tx_hash.is_empty() {
            return Err("transfer tx has no hash".to_owned());
        }
        self.packet.validate()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}
