mod controller;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use controller::{ControllerError, RelayerController};

use crate::{
    DynError,
    chain::{DockerImage, NetworkHandle},
    ibc::{ChannelInfo, ChannelOptions, ConnectionInfo},
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayerKind {
    #[default]
    CosmosRly,
    Hermes,
}

impl fmt::Display for RelayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CosmosRly => f.write_str("rly"),
            Self::Hermes => f.write_str("hermes"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RelayerSpec {
    pub kind: RelayerKind,
    pub image: DockerImage,
    #[serde(default)]
    pub startup_flags: Vec<String>,
}

impl RelayerSpec {
    #[must_use]
    pub fn cosmos_rly(image: DockerImage) -> Self {
        Self {
            kind: RelayerKind::CosmosRly,
            image,
            startup_flags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_startup_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.startup_flags = flags.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
    #[error("relayer has not been started")]
    NotStarted,
    #[error("relayer does not know chain {chain_id}")]
    UnknownChain { chain_id: String },
    #[error("relayer does not know path {path}")]
    UnknownPath { path: String },
    #[error("relayer command `{command}` failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("unexpected relayer output for {context}: {reason}")]
    Parse { context: String, reason: String },
    #[error("relayer {kind} is not supported by this runner")]
    Unsupported { kind: RelayerKind },
    #[error(transparent)]
    Other(DynError),
}

impl RelayerError {
    pub fn other(source: impl Into<DynError>) -> Self {
        Self::Other(source.into())
    }
}

/// A relayer process ferrying packets between the networks it was started
/// with.
#[async_trait]
pub trait Relayer: Send + Sync {
    fn kind(&self) -> RelayerKind;

    /// Starts the process and registers every network in `networks`.
    async fn start(&self, networks: &[Arc<dyn NetworkHandle>]) -> Result<(), RelayerError>;

    /// Stopping a stopped relayer is a no-op.
    async fn stop(&self) -> Result<(), RelayerError>;

    async fn generate_path(
        &self,
        src_chain_id: &str,
        dst_chain_id: &str,
        path: &str,
    ) -> Result<(), RelayerError>;

    /// Creates clients, a connection and a channel for `path`.
    async fn link_path(&self, path: &str, channel: &ChannelOptions) -> Result<(), RelayerError>;

    /// Starts continuous relaying on `paths` in the background.
    async fn start_relaying(&self, paths: &[String]) -> Result<(), RelayerError>;

    async fn channels(&self, chain_id: &str) -> Result<Vec<ChannelInfo>, RelayerError>;

    async fn connections(&self, chain_id: &str) -> Result<Vec<ConnectionInfo>, RelayerError>;

    /// Relays every packet and acknowledgement pending on `path`/`channel_id`
    /// at call time, in both directions.
    async fn flush(&self, path: &str, channel_id: &str) -> Result<(), RelayerError>;
}

#[async_trait]
pub trait RelayerFactory: Send + Sync {
    async fn build(
        &self,
        kind: RelayerKind,
        image: &DockerImage,
        flags: &[String],
    ) -> Result<Arc<dyn Relayer>, RelayerError>;

    async fn build_from_spec(&self, spec: &RelayerSpec) -> Result<Arc<dyn Relayer>, RelayerError> {
        self.build(spec.kind, &spec.image, &spec.startup_flags).await
    }
}
