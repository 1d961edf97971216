//! In-memory chains and relayer for exercising orchestration logic without
//! containers.

mod contract;
mod network;
mod relayer;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;

pub use contract::{CodeFactory, Coin, ContractContext, MockContract};
pub use network::MockNetwork;
pub use relayer::MockRelayer;

use crate::{
    chain::{ChainError, ChainFactory, ChainSpec, DockerImage, NetworkHandle},
    relayer::{Relayer, RelayerError, RelayerFactory, RelayerKind},
};

const DEFAULT_BLOCK_TIME: Duration = Duration::from_millis(50);

/// Registry shared by the mock networks and relayers of one test, so a
/// relayer can reach the networks it was started with.
#[derive(Clone)]
pub struct MockHub {
    networks: Arc<Mutex<HashMap<String, Arc<MockNetwork>>>>,
    block_time: Duration,
}

impl Default for MockHub {
    fn default() -> Self {
        Self {
            networks: Arc::default(),
            block_time: DEFAULT_BLOCK_TIME,
        }
    }
}

impl MockHub {
    #[must_use]
    pub const fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = block_time;
        self
    }

    #[must_use]
    pub const fn block_time(&self) -> Duration {
        self.block_time
    }

    /// Creates a stopped network for `spec`, replacing any earlier network
    /// registered under the same chain id.
    #[must_use]
    pub fn network(&self, spec: ChainSpec) -> Arc<MockNetwork> {
        let chain_id = spec.chain_id.clone();
        let network = Arc::new(MockNetwork::new(spec, self.block_time));
        self.networks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chain_id, Arc::clone(&network));
        network
    }

    #[must_use]
    pub fn relayer(&self) -> Arc<MockRelayer> {
        Arc::new(MockRelayer::new(self.clone()))
    }

    #[must_use]
    pub fn get(&self, chain_id: &str) -> Option<Arc<MockNetwork>> {
        self.networks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chain_id)
            .cloned()
    }
}

pub struct MockChainFactory {
    hub: MockHub,
}

impl MockChainFactory {
    #[must_use]
    pub const fn new(hub: MockHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl ChainFactory for MockChainFactory {
    async fn instantiate(
        &self,
        _test_name: &str,
        specs: &[ChainSpec],
    ) -> Result<Vec<Arc<dyn NetworkHandle>>, ChainError> {
        Ok(specs
            .iter()
            .map(|spec| self.hub.network(spec.clone()) as Arc<dyn NetworkHandle>)
            .collect())
    }
}

pub struct MockRelayerFactory {
    hub: MockHub,
}

impl MockRelayerFactory {
    #[must_use]
    pub const fn new(hub: MockHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl RelayerFactory for MockRelayerFactory {
    async fn build(
        &self,
        kind: RelayerKind,
        _image: &DockerImage,
        _flags: &[String],
    ) -> Result<Arc<dyn Relayer>, RelayerError> {
        match kind {
            RelayerKind::CosmosRly => Ok(self.hub.relayer()),
            RelayerKind::Hermes => Err(RelayerError::Unsupported { kind }),
        }
    }
}
