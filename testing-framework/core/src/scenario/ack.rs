use std::{fmt, time::Duration};

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::{
    chain::{ChainError, NetworkHandle},
    config::Settings,
    ibc::{Acknowledgement, Packet, PacketEvent, PacketRef},
};

/// Packet and height window an acknowledgement wait covered.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AckWindow {
    pub chain_id: String,
    pub path: String,
    pub port: String,
    pub channel: String,
    pub sequence: u64,
    pub from_height: u64,
    pub to_height: u64,
}

impl AckWindow {
    fn new(chain_id: &str, packet: &PacketRef, from_height: u64, to_height: u64) -> Self {
        Self {
            chain_id: chain_id.to_owned(),
            path: packet.path_name().to_owned(),
            port: packet.source_port.clone(),
            channel: packet.source_channel.clone(),
            sequence: packet.sequence,
            from_height,
            to_height,
        }
    }
}

impl fmt::Display for AckWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packet {}/{}#{} on path {} ({} heights {}..={})",
            self.port,
            self.channel,
            self.sequence,
            self.path,
            self.chain_id,
            self.from_height,
            self.to_height
        )
    }
}

#[derive(Debug, Error)]
pub enum AckError {
    /// Nothing matched inside the window, or the chain stopped producing
    /// blocks before the window closed.
    #[error("no acknowledgement for {window}: {reason}")]
    Timeout { window: AckWindow, reason: String },
    /// The destination application rejected the packet.
    #[error("error acknowledgement at height {height} for {window}: {reason}")]
    Mismatch {
        window: AckWindow,
        height: u64,
        reason: String,
    },
    #[error("{window} timed out at height {height} instead of being acknowledged")]
    PacketTimedOut { window: AckWindow, height: u64 },
    #[error("querying {window} failed: {source}")]
    Query {
        window: AckWindow,
        #[source]
        source: ChainError,
    },
}

impl AckError {
    #[must_use]
    pub const fn window(&self) -> &AckWindow {
        match self {
            Self::Timeout { window, .. }
            | Self::Mismatch { window, .. }
            | Self::PacketTimedOut { window, .. }
            | Self::Query { window, .. } => window,
        }
    }
}

/// Bounded, height-by-height search for the resolution of one packet on its
/// source chain.
#[derive(Clone, Copy, Debug)]
pub struct AckWaiter {
    poll_interval: Duration,
    height_poll_attempts: u32,
}

impl Default for AckWaiter {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

enum Resolution {
    Ack(Acknowledgement),
    TimedOut(Packet),
}

impl AckWaiter {
    #[must_use]
    pub const fn new(poll_interval: Duration, height_poll_attempts: u32) -> Self {
        Self {
            poll_interval,
            height_poll_attempts,
        }
    }

    #[must_use]
    pub const fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.ack_poll_interval, settings.height_poll_attempts)
    }

    /// Returns the success acknowledgement for `packet` found on `network`
    /// within `from_height..=to_height`. An error acknowledgement is reported
    /// as [`AckError::Mismatch`], an exhausted window as [`AckError::Timeout`].
    pub async fn poll_for_ack(
        &self,
        network: &dyn NetworkHandle,
        from_height: u64,
        to_height: u64,
        packet: &PacketRef,
    ) -> Result<Acknowledgement, AckError> {
        let window = AckWindow::new(network.chain_id(), packet, from_height, to_height);
        match self.scan(network, &window, packet).await? {
            (_, Resolution::Ack(ack @ Acknowledgement::Success(_))) => {
                info!(%window, "packet acknowledged");
                Ok(ack)
            }
            (height, Resolution::Ack(Acknowledgement::Error(reason))) => Err(AckError::Mismatch {
                window,
                height,
                reason,
            }),
            (height, Resolution::TimedOut(_)) => Err(AckError::PacketTimedOut { window, height }),
        }
    }

    /// Returns the timed-out packet once `network` records its timeout within
    /// the window.
    pub async fn poll_for_timeout(
        &self,
        network: &dyn NetworkHandle,
        from_height: u64,
        to_height: u64,
        packet: &PacketRef,
    ) -> Result<Packet, AckError> {
        let window = AckWindow::new(network.chain_id(), packet, from_height, to_height);
        match self.scan(network, &window, packet).await? {
            (_, Resolution::TimedOut(packet)) => {
                info!(%window, "packet timed out");
                Ok(packet)
            }
            (height, Resolution::Ack(ack)) => Err(AckError::Mismatch {
                window,
                height,
                reason: format!("acknowledged ({ack}) instead of timing out"),
            }),
        }
    }

    async fn scan(
        &self,
        network: &dyn NetworkHandle,
        window: &AckWindow,
        packet: &PacketRef,
    ) -> Result<(u64, Resolution), AckError> {
        for height in window.from_height..=window.to_height {
            self.await_height(network, window, height).await?;

            let events = network
                .packet_events(height)
                .await
                .map_err(|source| AckError::Query {
                    window: window.clone(),
                    source,
                })?;

            for event in events {
                if !packet.matches(event.packet()) {
                    continue;
                }
                debug!(%window, height, "packet resolved");
                return Ok(match event {
                    PacketEvent::Acknowledged { ack, .. } => (height, Resolution::Ack(ack)),
                    PacketEvent::TimedOut { packet } => (height, Resolution::TimedOut(packet)),
                });
            }
        }

        Err(AckError::Timeout {
            window: window.clone(),
            reason: "window exhausted".to_owned(),
        })
    }

    async fn await_height(
        &self,
        network: &dyn NetworkHandle,
        window: &AckWindow,
        height: u64,
    ) -> Result<(), AckError> {
        for attempt in 0..=self.height_poll_attempts {
            let current = network.height().await.map_err(|source| AckError::Query {
                window: window.clone(),
                source,
            })?;
            if current >= height {
                return Ok(());
            }
            if attempt < self.height_poll_attempts {
                sleep(self.poll_interval).await;
            }
        }

        Err(AckError::Timeout {
            window: window.clone(),
            reason: format!(
                "chain stalled below height {height} after {} polls",
                self.height_poll_attempts
            ),
        })
    }
}
