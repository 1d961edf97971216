use std::{sync::Arc, time::Duration};

use interchain_testing_core::{
    DynError,
    chain::NetworkHandle,
    config::Settings,
    mock::{MockHub, MockNetwork, MockRelayer},
    scenario::{BuildOptions, Environment, build},
    topology::{Link, TopologyError, TopologyGraph},
};

use super::chains::{IBC_PATH, RELAYER_NAME, gaia_spec, persistence_spec};

const BLOCK_TIME: Duration = Duration::from_millis(20);

/// Fast timings for in-memory chains.
#[must_use]
pub fn settings() -> Settings {
    Settings {
        ack_poll_interval: Duration::from_millis(10),
        height_poll_attempts: 200,
        liveness_timeout: Duration::from_secs(10),
        liveness_poll_interval: Duration::from_millis(10),
        teardown_timeout: Duration::from_secs(5),
        ..Settings::default()
    }
}

/// Persistence and Gaia joined by one relayer over `ibc-path`.
pub struct MockInterchain {
    pub hub: MockHub,
    pub persistence: Arc<MockNetwork>,
    pub gaia: Arc<MockNetwork>,
    pub relayer: Arc<MockRelayer>,
}

impl Default for MockInterchain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInterchain {
    #[must_use]
    pub fn new() -> Self {
        let hub = MockHub::default().with_block_time(BLOCK_TIME);
        Self {
            persistence: hub.network(persistence_spec()),
            gaia: hub.network(gaia_spec()),
            relayer: hub.relayer(),
            hub,
        }
    }

    pub fn graph(&self) -> Result<TopologyGraph, TopologyError> {
        let persistence: Arc<dyn NetworkHandle> = self.persistence.clone();
        let gaia: Arc<dyn NetworkHandle> = self.gaia.clone();
        let mut graph = TopologyGraph::new();
        graph
            .add_network(persistence)?
            .add_network(gaia)?
            .add_relayer(RELAYER_NAME, self.relayer.clone())?
            .add_link(Link::new(
                self.persistence.spec().chain_id.clone(),
                self.gaia.spec().chain_id.clone(),
                RELAYER_NAME,
                IBC_PATH,
            ))?;
        Ok(graph)
    }

    pub async fn build(&self, test_name: &str) -> Result<Arc<Environment>, DynError> {
        let graph = self.graph()?;
        Ok(Arc::new(build(graph, &Self::options(test_name)).await?))
    }

    #[must_use]
    pub fn options(test_name: &str) -> BuildOptions {
        BuildOptions::from_settings(test_name, &settings())
    }
}
