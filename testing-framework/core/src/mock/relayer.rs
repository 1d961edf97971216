use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use super::{
    MockHub,
    network::{MockNetwork, ReceiveError},
};
use crate::{
    chain::{ChainError, NetworkHandle},
    ibc::{
        ChannelCounterparty, ChannelInfo, ChannelOptions, ChannelOrder, ConnectionCounterparty,
        ConnectionInfo,
    },
    relayer::{Relayer, RelayerError, RelayerKind},
};

/// Relay rounds a flush runs before giving up on reaching quiescence.
const MAX_FLUSH_ROUNDS: usize = 16;

#[derive(Clone, Debug)]
struct LinkedEnds {
    src_channel: String,
    dst_channel: String,
}

#[derive(Clone, Debug)]
struct PathState {
    src: String,
    dst: String,
    linked: Option<LinkedEnds>,
}

#[derive(Default)]
struct RelayerState {
    running: bool,
    chains: Vec<String>,
    paths: BTreeMap<String, PathState>,
    relaying: Option<JoinHandle<()>>,
}

struct Inner {
    hub: MockHub,
    state: Mutex<RelayerState>,
    fail_flush: AtomicBool,
    flushes: AtomicU64,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, RelayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn network(&self, chain_id: &str) -> Result<Arc<MockNetwork>, RelayerError> {
        let state = self.state();
        if !state.running {
            return Err(RelayerError::NotStarted);
        }
        if !state.chains.iter().any(|c| c == chain_id) {
            return Err(RelayerError::UnknownChain {
                chain_id: chain_id.to_owned(),
            });
        }
        drop(state);
        self.hub
            .get(chain_id)
            .ok_or_else(|| RelayerError::UnknownChain {
                chain_id: chain_id.to_owned(),
            })
    }

    fn path(&self, path: &str) -> Result<PathState, RelayerError> {
        self.state()
            .paths
            .get(path)
            .cloned()
            .ok_or_else(|| RelayerError::UnknownPath {
                path: path.to_owned(),
            })
    }

    /// Relays in both directions until a round moves nothing.
    fn flush_path(&self, path: &str) -> Result<usize, RelayerError> {
        let state = self.path(path)?;
        let Some(ends) = state.linked else {
            return Err(command_error(
                "tx flush",
                format!("path {path} has no channel yet"),
            ));
        };
        let src = self.network(&state.src)?;
        let dst = self.network(&state.dst)?;

        let mut total = 0;
        for _ in 0..MAX_FLUSH_ROUNDS {
            let moved = relay_packets(&src, &ends.src_channel, &dst)?
                + relay_packets(&dst, &ends.dst_channel, &src)?
                + relay_acks(&dst, &ends.dst_channel, &src)?
                + relay_acks(&src, &ends.src_channel, &dst)?;
            if moved == 0 {
                return Ok(total);
            }
            total += moved;
        }

        Err(command_error(
            "tx flush",
            format!("path {path} still busy after {MAX_FLUSH_ROUNDS} rounds"),
        ))
    }
}

fn command_error(command: &str, stderr: impl Into<String>) -> RelayerError {
    RelayerError::Command {
        command: command.to_owned(),
        stderr: stderr.into(),
    }
}

fn chain_error(err: ChainError) -> RelayerError {
    RelayerError::other(err)
}

/// Delivers every packet committed on `from`/`channel_id`, in sequence
/// order. Expired packets are timed out on `from` instead.
fn relay_packets(
    from: &MockNetwork,
    channel_id: &str,
    to: &MockNetwork,
) -> Result<usize, RelayerError> {
    let mut moved = 0;
    for packet in from.pending_packets(channel_id).map_err(chain_error)? {
        let progressed = match to.receive_packet(&packet).map_err(chain_error)? {
            Ok(received) => received,
            Err(ReceiveError::TimedOut) => {
                debug!(%packet, "relaying timeout");
                from.timeout_packet(&packet).map_err(chain_error)?
            }
        };
        moved += usize::from(progressed);
    }
    Ok(moved)
}

/// Relays acknowledgements written on `from` for packets that arrived on
/// `channel_id` back to their source on `to`.
fn relay_acks(
    from: &MockNetwork,
    channel_id: &str,
    to: &MockNetwork,
) -> Result<usize, RelayerError> {
    let mut moved = 0;
    for written in from.take_written_acks(channel_id).map_err(chain_error)? {
        if to.acknowledge_packet(written).map_err(chain_error)? {
            moved += 1;
        }
    }
    Ok(moved)
}

/// In-memory relayer linking and flushing paths between [`MockNetwork`]s of
/// the same [`MockHub`].
pub struct MockRelayer {
    inner: Arc<Inner>,
}

impl MockRelayer {
    #[must_use]
    pub fn new(hub: MockHub) -> Self {
        Self {
            inner: Arc::new(Inner {
                hub,
                state: Mutex::new(RelayerState::default()),
                fail_flush: AtomicBool::new(false),
                flushes: AtomicU64::new(0),
            }),
        }
    }

    /// Makes every later `flush` fail.
    pub fn fail_flush(&self, fail: bool) {
        self.inner.fail_flush.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state().running
    }

    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Relayer for MockRelayer {
    fn kind(&self) -> RelayerKind {
        RelayerKind::CosmosRly
    }

    async fn start(&self, networks: &[Arc<dyn NetworkHandle>]) -> Result<(), RelayerError> {
        let mut chains = Vec::with_capacity(networks.len());
        for network in networks {
            let chain_id = network.chain_id();
            if self.inner.hub.get(chain_id).is_none() {
                return Err(RelayerError::UnknownChain {
                    chain_id: chain_id.to_owned(),
                });
            }
            chains.push(chain_id.to_owned());
        }

        let mut state = self.inner.state();
        state.running = true;
        state.chains = chains;
        info!(chains = ?state.chains, "mock relayer started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RelayerError> {
        let mut state = self.inner.state();
        if let Some(handle) = state.relaying.take() {
            handle.abort();
        }
        if state.running {
            state.running = false;
            info!("mock relayer stopped");
        }
        Ok(())
    }

    async fn generate_path(
        &self,
        src_chain_id: &str,
        dst_chain_id: &str,
        path: &str,
    ) -> Result<(), RelayerError> {
        self.inner.network(src_chain_id)?;
        self.inner.network(dst_chain_id)?;

        let mut state = self.inner.state();
        if state.paths.contains_key(path) {
            return Err(command_error(
                "paths new",
                format!("path with name {path} already exists"),
            ));
        }
        state.paths.insert(
            path.to_owned(),
            PathState {
                src: src_chain_id.to_owned(),
                dst: dst_chain_id.to_owned(),
                linked: None,
            },
        );
        Ok(())
    }

    async fn link_path(&self, path: &str, channel: &ChannelOptions) -> Result<(), RelayerError> {
        let state = self.inner.path(path)?;
        if state.linked.is_some() {
            return Ok(());
        }
        let src = self.inner.network(&state.src)?;
        let dst = self.inner.network(&state.dst)?;

        let src_client = src.allocate_client().map_err(chain_error)?;
        let dst_client = dst.allocate_client().map_err(chain_error)?;
        let src_connection = src.next_connection_id().map_err(chain_error)?;
        let dst_connection = dst.next_connection_id().map_err(chain_error)?;

        src.add_connection(connection(
            &src_connection,
            &src_client,
            &dst_client,
            &dst_connection,
        ))
        .map_err(chain_error)?;
        dst.add_connection(connection(
            &dst_connection,
            &dst_client,
            &src_client,
            &src_connection,
        ))
        .map_err(chain_error)?;

        let src_channel = src.next_channel_id().map_err(chain_error)?;
        let dst_channel = dst.next_channel_id().map_err(chain_error)?;
        let ordering = match channel.order {
            ChannelOrder::Unordered => "ORDER_UNORDERED",
            ChannelOrder::Ordered => "ORDER_ORDERED",
        };

        src.add_channel(ChannelInfo {
            state: "STATE_OPEN".to_owned(),
            ordering: ordering.to_owned(),
            version: channel.version.clone(),
            port_id: channel.src_port.clone(),
            channel_id: src_channel.clone(),
            connection_hops: vec![src_connection],
            counterparty: ChannelCounterparty {
                port_id: channel.dst_port.clone(),
                channel_id: dst_channel.clone(),
            },
        })
        .map_err(chain_error)?;
        dst.add_channel(ChannelInfo {
            state: "STATE_OPEN".to_owned(),
            ordering: ordering.to_owned(),
            version: channel.version.clone(),
            port_id: channel.dst_port.clone(),
            channel_id: dst_channel.clone(),
            connection_hops: vec![dst_connection],
            counterparty: ChannelCounterparty {
                port_id: channel.src_port.clone(),
                channel_id: src_channel.clone(),
            },
        })
        .map_err(chain_error)?;

        info!(path, %src_channel, %dst_channel, "path linked");
        if let Some(path_state) = self.inner.state().paths.get_mut(path) {
            path_state.linked = Some(LinkedEnds {
                src_channel,
                dst_channel,
            });
        }
        Ok(())
    }

    async fn start_relaying(&self, paths: &[String]) -> Result<(), RelayerError> {
        for path in paths {
            self.inner.path(path)?;
        }

        let inner = Arc::clone(&self.inner);
        let paths = paths.to_vec();
        let interval = self.inner.hub.block_time() * 2;
        let handle = tokio::spawn(async move {
            loop {
                for path in &paths {
                    if let Err(err) = inner.flush_path(path) {
                        warn!(path, error = %err, "background relay failed");
                    }
                }
                sleep(interval).await;
            }
        });

        if let Some(previous) = self.inner.state().relaying.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn channels(&self, chain_id: &str) -> Result<Vec<ChannelInfo>, RelayerError> {
        self.inner
            .network(chain_id)?
            .channel_list()
            .map_err(chain_error)
    }

    async fn connections(&self, chain_id: &str) -> Result<Vec<ConnectionInfo>, RelayerError> {
        self.inner
            .network(chain_id)?
            .connection_list()
            .map_err(chain_error)
    }

    async fn flush(&self, path: &str, channel_id: &str) -> Result<(), RelayerError> {
        if self.inner.fail_flush.load(Ordering::SeqCst) {
            return Err(command_error("tx flush", "injected flush failure"));
        }
        let state = self.inner.path(path)?;
        let on_path = state.linked.as_ref().is_some_and(|ends| {
            ends.src_channel == channel_id || ends.dst_channel == channel_id
        });
        if !on_path {
            return Err(command_error(
                "tx flush",
                format!("channel {channel_id} is not part of path {path}"),
            ));
        }

        let moved = self.inner.flush_path(path)?;
        self.inner.flushes.fetch_add(1, Ordering::SeqCst);
        debug!(path, channel = channel_id, moved, "flush drained");
        Ok(())
    }
}

impl Drop for MockRelayer {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.state().relaying.take() {
            handle.abort();
        }
    }
}

fn connection(
    id: &str,
    client: &str,
    counterparty_client: &str,
    counterparty_id: &str,
) -> ConnectionInfo {
    ConnectionInfo {
        id: id.to_owned(),
        client_id: client.to_owned(),
        state: "STATE_OPEN".to_owned(),
        counterparty: ConnectionCounterparty {
            client_id: counterparty_client.to_owned(),
            connection_id: counterparty_id.to_owned(),
        },
    }
}
