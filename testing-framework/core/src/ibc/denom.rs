//! ICS-20 denomination tracing.
//!
//! A voucher minted on a receiving chain is named after the full path it
//! travelled (`{port}/{channel}/.../{base}`) and exposed on-chain as
//! `ibc/{HEX(SHA256(path))}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct DenomTrace {
    /// Port/channel hops, outermost first. Empty for a native denom.
    pub path: String,
    pub base_denom: String,
}

impl DenomTrace {
    /// Splits a full trace such as `transfer/channel-0/uatom`.
    ///
    /// Anything that does not start with port/channel pairs is taken to be a
    /// native denom.
    #[must_use]
    pub fn parse(full: &str) -> Self {
        let parts: Vec<&str> = full.split('/').collect();
        let mut hops = 0;
        while parts.len() > hops + 2 && parts[hops + 1].starts_with("channel-") {
            hops += 2;
        }
        if hops == 0 {
            return Self::native(full);
        }
        Self {
            path: parts[..hops].join("/"),
            base_denom: parts[hops..].join("/"),
        }
    }

    #[must_use]
    pub fn native(base_denom: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            base_denom: base_denom.into(),
        }
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        self.path.is_empty()
    }

    /// Full trace as carried in transfer packet data.
    #[must_use]
    pub fn full_path(&self) -> String {
        if self.is_native() {
            self.base_denom.clone()
        } else {
            format!("{}/{}", self.path, self.base_denom)
        }
    }

    /// On-chain denom: the base denom for native tokens, `ibc/<HASH>` for
    /// vouchers.
    #[must_use]
    pub fn ibc_denom(&self) -> String {
        if self.is_native() {
            self.base_denom.clone()
        } else {
            ibc_denom(&self.full_path())
        }
    }

    /// Trace after one more hop onto `port/channel`.
    #[must_use]
    pub fn prefixed(&self, port: &str, channel: &str) -> Self {
        let path = if self.is_native() {
            format!("{port}/{channel}")
        } else {
            format!("{port}/{channel}/{}", self.path)
        };
        Self {
            path,
            base_denom: self.base_denom.clone(),
        }
    }

    /// Removes the outermost hop if it is `port/channel`, i.e. the token is
    /// travelling back towards where it came from.
    #[must_use]
    pub fn unwind(&self, port: &str, channel: &str) -> Option<Self> {
        let hop = format!("{port}/{channel}");
        if self.path == hop {
            return Some(Self::native(self.base_denom.clone()));
        }
        self.path
            .strip_prefix(&format!("{hop}/"))
            .map(|rest| Self {
                path: rest.to_owned(),
                base_denom: self.base_denom.clone(),
            })
    }
}

impl fmt::Display for DenomTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path())
    }
}

/// `{port}/{channel}/{base}`.
#[must_use]
pub fn prefixed_denom(port: &str, channel: &str, base_denom: &str) -> String {
    DenomTrace::parse(base_denom)
        .prefixed(port, channel)
        .full_path()
}

/// `ibc/` followed by the upper-case hex SHA-256 of the full trace path.
#[must_use]
pub fn ibc_denom(full_path: &str) -> String {
    let digest = Sha256::digest(full_path.as_bytes());
    format!("ibc/{}", hex::encode_upper(digest))
}

/// Denom a `base_denom` sent from the counterparty shows up as on the chain
/// owning `port/channel`.
#[must_use]
pub fn received_denom(port: &str, channel: &str, base_denom: &str) -> String {
    ibc_denom(&prefixed_denom(port, channel, base_denom))
}
