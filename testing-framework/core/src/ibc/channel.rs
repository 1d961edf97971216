use std::fmt;

use serde::{Deserialize, Serialize};

pub const TRANSFER_PORT: &str = "transfer";
pub const ICS20_VERSION: &str = "ics20-1";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Unordered,
    Ordered,
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unordered => f.write_str("unordered"),
            Self::Ordered => f.write_str("ordered"),
        }
    }
}

/// Channel handshake parameters used when a link is established.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelOptions {
    pub src_port: String,
    pub dst_port: String,
    #[serde(default)]
    pub order: ChannelOrder,
    pub version: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            src_port: TRANSFER_PORT.to_owned(),
            dst_port: TRANSFER_PORT.to_owned(),
            order: ChannelOrder::Unordered,
            version: ICS20_VERSION.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelCounterparty {
    pub port_id: String,
    #[serde(default)]
    pub channel_id: String,
}

/// A channel end as reported by the relayer, field names as printed by
/// `rly q channels`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub ordering: String,
    #[serde(default)]
    pub version: String,
    pub port_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub connection_hops: Vec<String>,
    pub counterparty: ChannelCounterparty,
}

impl ChannelInfo {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == "STATE_OPEN"
    }

    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_hops.first().map(String::as_str)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConnectionCounterparty {
    pub client_id: String,
    #[serde(default)]
    pub connection_id: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub client_id: String,
    #[serde(default)]
    pub state: String,
    pub counterparty: ConnectionCounterparty,
}
