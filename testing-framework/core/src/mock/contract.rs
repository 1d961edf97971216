use std::sync::Arc;

use serde_json::Value;

use super::network::ChainState;
use crate::ibc::DenomTrace;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    #[must_use]
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

/// In-process stand-in for a deployed contract.
///
/// Every `execute` runs inside a transaction: if it returns an error, bank
/// and packet state it touched and the contract's own state are restored.
pub trait MockContract: Send + Sync {
    fn instantiate(&mut self, ctx: &mut ContractContext<'_>, msg: &Value) -> Result<(), String>;

    fn execute(&mut self, ctx: &mut ContractContext<'_>, msg: &Value) -> Result<(), String>;

    fn query(&self, msg: &Value) -> Result<Value, String>;

    fn clone_box(&self) -> Box<dyn MockContract>;
}

/// Produces a fresh contract instance for a stored code id.
pub type CodeFactory = Arc<dyn Fn() -> Box<dyn MockContract> + Send + Sync>;

/// What a contract can see and do while handling one message.
pub struct ContractContext<'a> {
    pub(super) state: &'a mut ChainState,
    pub(super) address: String,
    pub(super) sender: String,
    pub(super) funds: Vec<Coin>,
    pub(super) admin: Option<String>,
}

impl ContractContext<'_> {
    #[must_use]
    pub fn contract_address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    #[must_use]
    pub fn funds(&self) -> &[Coin] {
        &self.funds
    }

    #[must_use]
    pub fn admin(&self) -> Option<&str> {
        self.admin.as_deref()
    }

    #[must_use]
    pub fn balance(&self, address: &str, denom: &str) -> u128 {
        self.state.ledger.balance(address, denom)
    }

    /// Bank send out of the contract's own account.
    pub fn send(&mut self, to: &str, denom: &str, amount: u128) -> Result<(), String> {
        let from = self.address.clone();
        self.state.ledger.transfer(&from, to, denom, amount)
    }

    /// Mints `denom` into the contract's account, standing in for a chain
    /// module the contract dispatches to.
    pub fn mint(&mut self, denom: &str, amount: u128) {
        let to = self.address.clone();
        self.state.ledger.mint(&to, denom, amount);
    }

    pub fn burn(&mut self, denom: &str, amount: u128) -> Result<(), String> {
        let from = self.address.clone();
        self.state.ledger.burn(&from, denom, amount)
    }

    #[must_use]
    pub fn denom_trace(&self, ibc_denom: &str) -> Option<DenomTrace> {
        self.state.ledger.denom_traces.get(ibc_denom).cloned()
    }

    /// Sends `amount` of `denom` from the contract over `channel_id`.
    /// Returns the packet sequence.
    pub fn ibc_transfer(
        &mut self,
        channel_id: &str,
        receiver: &str,
        denom: &str,
        amount: u128,
    ) -> Result<u64, String> {
        let sender = self.address.clone();
        self.state
            .send_transfer(channel_id, &sender, receiver, denom, amount, "", None)
            .map(|packet| packet.sequence)
    }
}
