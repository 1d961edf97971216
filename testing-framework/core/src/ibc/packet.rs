use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// Base64 of the single byte `0x01` written by ICS-20 on success.
pub const ACK_SUCCESS_B64: &str = "AQ==";

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub sequence: u64,
    pub source_port: String,
    pub source_channel: String,
    pub destination_port: String,
    pub destination_channel: String,
    #[serde(default)]
    pub data: Vec<u8>,
    /// Revision height on the destination; zero when unbounded.
    #[serde(default)]
    pub timeout_height: u64,
    /// Unix nanos on the destination; zero when unbounded.
    #[serde(default)]
    pub timeout_timestamp: u64,
}

impl Packet {
    pub fn validate(&self) -> Result<(), String> {
        if self.sequence == 0 {
            return Err("packet sequence is zero".to_owned());
        }
        for (field, value) in [
            ("source_port", &self.source_port),
            ("source_channel", &self.source_channel),
            ("destination_port", &self.destination_port),
            ("destination_channel", &self.destination_channel),
        ] {
            if value.is_empty() {
                return Err(format!("packet {field} is empty"));
            }
        }
        if self.timeout_height == 0 && self.timeout_timestamp == 0 {
            return Err("packet has neither a timeout height nor a timeout timestamp".to_owned());
        }
        if self.data.is_empty() {
            return Err("packet data is empty".to_owned());
        }
        Ok(())
    }

    /// Whether a destination at `height`/`time_nanos` must refuse the packet.
    #[must_use]
    pub const fn timed_out(&self, height: u64, time_nanos: u64) -> bool {
        (self.timeout_height != 0 && height >= self.timeout_height)
            || (self.timeout_timestamp != 0 && time_nanos >= self.timeout_timestamp)
    }

    #[must_use]
    pub fn reference(&self) -> PacketRef {
        PacketRef {
            sequence: self.sequence,
            source_port: self.source_port.clone(),
            source_channel: self.source_channel.clone(),
            destination_port: self.destination_port.clone(),
            destination_channel: self.destination_channel.clone(),
            path: None,
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seq:{}, path:{}/{}->{}/{}, toh:{}, tos:{}",
            self.sequence,
            self.source_channel,
            self.source_port,
            self.destination_channel,
            self.destination_port,
            self.timeout_height,
            self.timeout_timestamp
        )
    }
}

/// Identifies one outbound packet for the acknowledgement waiter.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct PacketRef {
    pub sequence: u64,
    pub source_port: String,
    pub source_channel: String,
    pub destination_port: String,
    pub destination_channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl PacketRef {
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn matches(&self, packet: &Packet) -> bool {
        self.sequence == packet.sequence
            && self.source_port == packet.source_port
            && self.source_channel == packet.source_channel
    }

    #[must_use]
    pub fn path_name(&self) -> &str {
        self.path.as_deref().unwrap_or("<unnamed>")
    }
}

impl fmt::Display for PacketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}#{}",
            self.source_port, self.source_channel, self.sequence
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Acknowledgement {
    Success(Vec<u8>),
    Error(String),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AckEnvelope {
    Result(String),
    Error(String),
}

impl Acknowledgement {
    #[must_use]
    pub fn success() -> Self {
        Self::Success(vec![1])
    }

    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error(reason.into())
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Decodes the JSON acknowledgement envelope written by the destination
    /// (`{"result":"AQ=="}` or `{"error":"..."}`).
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, String> {
        let envelope: AckEnvelope =
            serde_json::from_slice(bytes).map_err(|e| format!("malformed acknowledgement: {e}"))?;
        match envelope {
            AckEnvelope::Result(encoded) => STANDARD
                .decode(encoded)
                .map(Self::Success)
                .map_err(|e| format!("acknowledgement result is not base64: {e}")),
            AckEnvelope::Error(reason) => Ok(Self::Error(reason)),
        }
    }

    #[must_use]
    pub fn to_json_bytes(&self) -> Vec<u8> {
        let envelope = match self {
            Self::Success(bytes) => AckEnvelope::Result(STANDARD.encode(bytes)),
            Self::Error(reason) => AckEnvelope::Error(reason.clone()),
        };
        serde_json::to_vec(&envelope).unwrap_or_default()
    }
}

impl fmt::Display for Acknowledgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(bytes) => f.write_str(&STANDARD.encode(bytes)),
            Self::Error(reason) => f.write_str(reason),
        }
    }
}

/// Packet lifecycle event observed on the source chain at some height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PacketEvent {
    Acknowledged {
        packet: Packet,
        ack: Acknowledgement,
    },
    TimedOut {
        packet: Packet,
    },
}

impl PacketEvent {
    #[must_use]
    pub const fn packet(&self) -> &Packet {
        match self {
            Self::Acknowledged { packet, .. } | Self::TimedOut { packet } => packet,
        }
    }
}

/// ICS-20 packet payload.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FungibleTokenPacketData {
    pub denom: String,
    pub amount: String,
    pub sender: String,
    pub receiver: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memo: String,
}

impl FungibleTokenPacketData {
    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        serde_json::from_slice(data).map_err(|e| format!("malformed transfer packet data: {e}"))
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn amount(&self) -> Result<u128, String> {
        self.amount
            .parse()
            .map_err(|e| format!("invalid transfer amount {:?}: {e}", self.amount))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PacketState {
    Sent,
    Flushed,
    Acknowledged(Acknowledgement),
    TimedOut,
}

impl PacketState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Acknowledged(_) | Self::TimedOut)
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Flushed => "flushed",
            Self::Acknowledged(ack) if ack.is_success() => "acknowledged(success)",
            Self::Acknowledged(_) => "acknowledged(error)",
            Self::TimedOut => "timed out",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("packet {packet} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub packet: PacketRef,
    pub from: &'static str,
    pub to: &'static str,
}

/// Tracks one packet from its accepted send to its single resolution.
#[derive(Clone, Debug)]
pub struct PacketTracker {
    packet: PacketRef,
    state: PacketState,
}

impl PacketTracker {
    #[must_use]
    pub const fn sent(packet: PacketRef) -> Self {
        Self {
            packet,
            state: PacketState::Sent,
        }
    }

    #[must_use]
    pub const fn packet(&self) -> &PacketRef {
        &self.packet
    }

    #[must_use]
    pub const fn state(&self) -> &PacketState {
        &self.state
    }

    /// Flushing again before resolution is allowed.
    pub fn flushed(&mut self) -> Result<(), TransitionError> {
        self.transition(PacketState::Flushed)
    }

    pub fn acknowledged(&mut self, ack: Acknowledgement) -> Result<(), TransitionError> {
        self.transition(PacketState::Acknowledged(ack))
    }

    pub fn timed_out(&mut self) -> Result<(), TransitionError> {
        self.transition(PacketState::TimedOut)
    }

    fn transition(&mut self, next: PacketState) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError {
                packet: self.packet.clone(),
                from: self.state.label(),
                to: next.label(),
            });
        }
        self.state = next;
        Ok(())
    }
}
