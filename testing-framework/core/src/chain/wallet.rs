use std::fmt;

use serde::{Deserialize, Serialize};

/// A key held in a network's keyring together with its encoded address.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub key_name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
}

impl Wallet {
    #[must_use]
    pub fn new(key_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            key_name: key_name.into(),
            address: address.into(),
            mnemonic: None,
        }
    }

    #[must_use]
    pub fn with_mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
        self.mnemonic = Some(mnemonic.into());
        self
    }
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key_name, self.address)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WalletAmount {
    pub address: String,
    pub denom: String,
    pub amount: u128,
}

impl WalletAmount {
    #[must_use]
    pub fn new(address: impl Into<String>, denom: impl Into<String>, amount: u128) -> Self {
        Self {
            address: address.into(),
            denom: denom.into(),
            amount,
        }
    }

    /// Coin literal as accepted by Cosmos SDK CLIs, e.g. `1000uatom`.
    #[must_use]
    pub fn coin(&self) -> String {
        format!("{}{}", self.amount, self.denom)
    }
}

impl fmt::Display for WalletAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.coin(), self.address)
    }
}
