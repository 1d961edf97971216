use std::{sync::Arc, thread, time::Duration};

use tokio::time::timeout;
use tracing::{info, warn};

use crate::{chain::NetworkHandle, relayer::Relayer};

/// Stops whatever a build started: relayers first, then networks in reverse
/// declaration order. Failures are logged and skipped.
#[derive(Clone)]
pub struct TopologyCleanup {
    relayers: Vec<(String, Arc<dyn Relayer>)>,
    networks: Vec<Arc<dyn NetworkHandle>>,
    step_timeout: Duration,
    preserve: bool,
}

impl TopologyCleanup {
    #[must_use]
    pub const fn new(step_timeout: Duration, preserve: bool) -> Self {
        Self {
            relayers: Vec::new(),
            networks: Vec::new(),
            step_timeout,
            preserve,
        }
    }

    pub fn track_network(&mut self, network: Arc<dyn NetworkHandle>) {
        self.networks.push(network);
    }

    pub fn track_relayer(&mut self, name: impl Into<String>, relayer: Arc<dyn Relayer>) {
        self.relayers.push((name.into(), relayer));
    }

    pub async fn teardown(&self) {
        if self.preserve {
            info!(
                networks = self.networks.len(),
                relayers = self.relayers.len(),
                "preserving environment"
            );
            return;
        }

        for (name, relayer) in self.relayers.iter().rev() {
            match timeout(self.step_timeout, relayer.stop()).await {
                Ok(Ok(())) => info!(relayer = %name, "relayer stopped"),
                Ok(Err(err)) => warn!(relayer = %name, error = %err, "failed to stop relayer"),
                Err(_) => warn!(relayer = %name, timeout = ?self.step_timeout, "relayer stop timed out"),
            }
        }

        for network in self.networks.iter().rev() {
            let chain_id = network.chain_id();
            match timeout(self.step_timeout, network.stop()).await {
                Ok(Ok(())) => info!(chain_id, "network stopped"),
                Ok(Err(err)) => warn!(chain_id, error = %err, "failed to stop network"),
                Err(_) => warn!(chain_id, timeout = ?self.step_timeout, "network stop timed out"),
            }
        }
    }

    /// Runs [`Self::teardown`] on a dedicated thread with its own runtime and
    /// waits for it, so it is safe to call from inside another runtime.
    pub fn blocking_teardown(self) {
        let overall = self.step_timeout * 2;
        let spawned = thread::Builder::new()
            .name("ictest-cleanup".into())
            .spawn(move || match tokio::runtime::Runtime::new() {
                Ok(rt) => {
                    if let Err(err) = rt.block_on(async { timeout(overall, self.teardown()).await }) {
                        warn!("background cleanup timed out: {err}");
                    }
                }
                Err(err) => warn!("unable to create cleanup runtime: {err}"),
            });

        match spawned {
            Ok(handle) => {
                if let Err(err) = handle.join() {
                    warn!("cleanup thread panicked: {err:?}");
                }
            }
            Err(err) => warn!("failed to spawn cleanup thread: {err}"),
        }
    }
}
