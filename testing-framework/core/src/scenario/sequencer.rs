use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use thiserror::Error;
use tracing::{info, warn};

use super::{DynError, cleanup::TopologyCleanup, wait::wait_until_live};
use crate::{
    chain::NetworkHandle,
    config::Settings,
    relayer::{Relayer, RelayerController},
    topology::TopologyGraph,
};

#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub test_name: String,
    /// Only register paths on the relayer; the scenario links them itself.
    pub skip_path_creation: bool,
    /// Start each relayer's background relay loop once paths exist.
    pub start_relaying: bool,
    pub liveness_timeout: Duration,
    pub liveness_poll_interval: Duration,
    pub teardown_timeout: Duration,
    pub keep_containers: bool,
}

impl BuildOptions {
    #[must_use]
    pub fn new(test_name: impl Into<String>) -> Self {
        Self::from_settings(test_name, &Settings::default())
    }

    #[must_use]
    pub fn from_settings(test_name: impl Into<String>, settings: &Settings) -> Self {
        Self {
            test_name: test_name.into(),
            skip_path_creation: false,
            start_relaying: false,
            liveness_timeout: settings.liveness_timeout,
            liveness_poll_interval: settings.liveness_poll_interval,
            teardown_timeout: settings.teardown_timeout,
            keep_containers: settings.keep_containers,
        }
    }

    #[must_use]
    pub const fn with_skip_path_creation(mut self, skip: bool) -> Self {
        self.skip_path_creation = skip;
        self
    }

    #[must_use]
    pub const fn with_start_relaying(mut self, start: bool) -> Self {
        self.start_relaying = start;
        self
    }

    #[must_use]
    pub const fn with_liveness(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.liveness_timeout = timeout;
        self.liveness_poll_interval = poll_interval;
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildStage {
    StartNetworks,
    AwaitLiveness,
    StartRelayers,
    GeneratePaths,
    LinkPaths,
    StartRelaying,
}

impl BuildStage {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::StartNetworks => "start networks",
            Self::AwaitLiveness => "await liveness",
            Self::StartRelayers => "start relayers",
            Self::GeneratePaths => "generate paths",
            Self::LinkPaths => "link paths",
            Self::StartRelaying => "start relaying",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
#[error("build failed during {stage}: {cause}")]
pub struct BuildError {
    pub stage: BuildStage,
    #[source]
    pub cause: DynError,
}

impl BuildError {
    fn new(stage: BuildStage, cause: impl Into<DynError>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

/// Brings `graph` to a running state.
///
/// Stages run in order: networks start in declaration order, each network
/// must report a non-zero height, relayers start with the networks their
/// links touch, each link's path is generated and (unless skipped) linked,
/// and relaying optionally starts. On failure everything already started is
/// stopped before the error is returned.
pub async fn build(graph: TopologyGraph, options: &BuildOptions) -> Result<Environment, BuildError> {
    info!(test = %options.test_name, networks = graph.networks().len(), links = graph.links().len(), "building topology");
    let mut cleanup = TopologyCleanup::new(options.teardown_timeout, options.keep_containers);

    match bring_up(&graph, options, &mut cleanup).await {
        Ok(()) => {
            info!(test = %options.test_name, "topology ready");
            Ok(Environment::new(graph, cleanup))
        }
        Err(err) => {
            warn!(test = %options.test_name, error = %err, "build failed; tearing down");
            cleanup.teardown().await;
            Err(err)
        }
    }
}

async fn bring_up(
    graph: &TopologyGraph,
    options: &BuildOptions,
    cleanup: &mut TopologyCleanup,
) -> Result<(), BuildError> {
    for network in graph.networks() {
        cleanup.track_network(Arc::clone(network));
        info!(chain_id = network.chain_id(), "starting network");
        network
            .start()
            .await
            .map_err(|e| BuildError::new(BuildStage::StartNetworks, e))?;
    }

    for network in graph.networks() {
        let height = wait_until_live(
            network.as_ref(),
            options.liveness_timeout,
            options.liveness_poll_interval,
        )
        .await
        .map_err(|e| BuildError::new(BuildStage::AwaitLiveness, e))?;
        info!(chain_id = network.chain_id(), height, "network live");
    }

    for (name, relayer) in graph.relayers() {
        cleanup.track_relayer(name, Arc::clone(relayer));
        let networks = graph.networks_for_relayer(name);
        info!(relayer = name, chains = networks.len(), "starting relayer");
        relayer
            .start(&networks)
            .await
            .map_err(|e| BuildError::new(BuildStage::StartRelayers, e))?;
    }

    for link in graph.links() {
        let relayer = relayer_for(graph, &link.relayer, BuildStage::GeneratePaths)?;
        relayer
            .generate_path(&link.chain1, &link.chain2, &link.path)
            .await
            .map_err(|e| BuildError::new(BuildStage::GeneratePaths, e))?;
    }

    if !options.skip_path_creation {
        for link in graph.links() {
            let relayer = relayer_for(graph, &link.relayer, BuildStage::LinkPaths)?;
            info!(path = %link.path, chain1 = %link.chain1, chain2 = %link.chain2, "linking path");
            relayer
                .link_path(&link.path, &link.channel)
                .await
                .map_err(|e| BuildError::new(BuildStage::LinkPaths, e))?;
        }
    }

    if options.start_relaying {
        for (name, relayer) in graph.relayers() {
            let paths: Vec<String> = graph
                .links_for_relayer(name)
                .map(|l| l.path.clone())
                .collect();
            if paths.is_empty() {
                continue;
            }
            relayer
                .start_relaying(&paths)
                .await
                .map_err(|e| BuildError::new(BuildStage::StartRelaying, e))?;
        }
    }

    Ok(())
}

fn relayer_for<'a>(
    graph: &'a TopologyGraph,
    name: &str,
    stage: BuildStage,
) -> Result<&'a Arc<dyn Relayer>, BuildError> {
    graph
        .relayer(name)
        .ok_or_else(|| BuildError::new(stage, format!("relayer {name} is not part of the topology")))
}

/// A running topology. Torn down exactly once, explicitly through
/// [`Environment::teardown`] or on drop.
pub struct Environment {
    graph: TopologyGraph,
    cleanup: TopologyCleanup,
    torn_down: AtomicBool,
}

impl Environment {
    fn new(graph: TopologyGraph, cleanup: TopologyCleanup) -> Self {
        Self {
            graph,
            cleanup,
            torn_down: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    #[must_use]
    pub fn network(&self, chain_id: &str) -> Option<&Arc<dyn NetworkHandle>> {
        self.graph.network(chain_id)
    }

    #[must_use]
    pub fn relayer(&self, name: &str) -> Option<RelayerController> {
        self.graph
            .relayer(name)
            .map(|relayer| RelayerController::new(name, Arc::clone(relayer)))
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Stops every relayer and network. Later calls return immediately.
    pub async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cleanup.teardown().await;
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!("environment dropped without teardown; cleaning up");
        self.cleanup.clone().blocking_teardown();
    }
}
