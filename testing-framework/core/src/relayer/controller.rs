use std::sync::Arc;

use tracing::{debug, info};

use super::{Relayer, RelayerError};
use crate::ibc::{ChannelInfo, ConnectionInfo, TRANSFER_PORT};

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("relayer {relayer} failed to query {chain_id}: {source}")]
    QueryFailed {
        relayer: String,
        chain_id: String,
        #[source]
        source: RelayerError,
    },
    #[error("relayer {relayer} failed to relay path {path} channel {channel}: {source}")]
    RelayFailed {
        relayer: String,
        path: String,
        channel: String,
        #[source]
        source: RelayerError,
    },
    #[error("no open {port} channel on {src_chain} leads to {dst_chain}")]
    ChannelNotFound {
        src_chain: String,
        dst_chain: String,
        port: String,
    },
}

/// Scenario-facing view of one named relayer.
#[derive(Clone)]
pub struct RelayerController {
    name: String,
    relayer: Arc<dyn Relayer>,
}

impl RelayerController {
    #[must_use]
    pub fn new(name: impl Into<String>, relayer: Arc<dyn Relayer>) -> Self {
        Self {
            name: name.into(),
            relayer,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn relayer(&self) -> &Arc<dyn Relayer> {
        &self.relayer
    }

    /// Channels open on `chain_id`, in whatever order the relayer reports.
    pub async fn channels(&self, chain_id: &str) -> Result<Vec<ChannelInfo>, ControllerError> {
        self.relayer
            .channels(chain_id)
            .await
            .map_err(|source| self.query_failed(chain_id, source))
    }

    pub async fn connections(
        &self,
        chain_id: &str,
    ) -> Result<Vec<ConnectionInfo>, ControllerError> {
        self.relayer
            .connections(chain_id)
            .await
            .map_err(|source| self.query_failed(chain_id, source))
    }

    /// Drains what is pending on `path`/`channel_id` at call time. A flush
    /// with nothing pending succeeds.
    pub async fn flush(&self, path: &str, channel_id: &str) -> Result<(), ControllerError> {
        debug!(relayer = %self.name, path, channel = channel_id, "flushing");
        self.relayer
            .flush(path, channel_id)
            .await
            .map_err(|source| ControllerError::RelayFailed {
                relayer: self.name.clone(),
                path: path.to_owned(),
                channel: channel_id.to_owned(),
                source,
            })?;
        info!(relayer = %self.name, path, channel = channel_id, "flush complete");
        Ok(())
    }

    /// The `transfer` channel on `src_chain` whose counterparty end (channel
    /// and connection) lives on `dst_chain`.
    pub async fn transfer_channel(
        &self,
        src_chain: &str,
        dst_chain: &str,
    ) -> Result<ChannelInfo, ControllerError> {
        let src_channels = self.channels(src_chain).await?;
        let dst_channels = self.channels(dst_chain).await?;
        let src_connections = self.connections(src_chain).await?;
        let dst_connections = self.connections(dst_chain).await?;

        src_channels
            .into_iter()
            .filter(|channel| channel.port_id == TRANSFER_PORT && channel.is_open())
            .find(|channel| {
                let paired_channel = dst_channels.iter().any(|remote| {
                    remote.channel_id == channel.counterparty.channel_id
                        && remote.port_id == channel.counterparty.port_id
                        && remote.counterparty.channel_id == channel.channel_id
                });
                let paired_connection = channel
                    .connection_id()
                    .and_then(|id| src_connections.iter().find(|conn| conn.id == id))
                    .is_some_and(|conn| {
                        dst_connections.iter().any(|remote| {
                            remote.id == conn.counterparty.connection_id
                                && remote.counterparty.connection_id == conn.id
                        })
                    });
                paired_channel && paired_connection
            })
            .ok_or_else(|| ControllerError::ChannelNotFound {
                src_chain: src_chain.to_owned(),
                dst_chain: dst_chain.to_owned(),
                port: TRANSFER_PORT.to_owned(),
            })
    }

    fn query_failed(&self, chain_id: &str, source: RelayerError) -> ControllerError {
        ControllerError::QueryFailed {
            relayer: self.name.clone(),
            chain_id: chain_id.to_owned(),
            source,
        }
    }
}
