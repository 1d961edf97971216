use std::{process, sync::Arc};

use async_trait::async_trait;
use interchain_testing_core::{
    chain::{ChainError, ChainFactory, ChainKind, ChainSpec, DockerImage, NetworkHandle},
    relayer::{Relayer, RelayerError, RelayerFactory, RelayerKind},
};
use tracing::{info, warn};

use crate::{
    cosmos::CosmosChain,
    docker::{DockerNetwork, sanitize},
    exec::CommandError,
    relayer::CosmosRelayer,
};

/// The Docker network one test runs in. Removed on drop unless preserved.
pub struct DockerSetup {
    network: DockerNetwork,
    preserve: bool,
}

impl DockerSetup {
    pub async fn create(test_name: &str, preserve: bool) -> Result<Self, CommandError> {
        let network = DockerNetwork::create(&sanitize(test_name)).await?;
        Ok(Self { network, preserve })
    }

    #[must_use]
    pub const fn network(&self) -> &DockerNetwork {
        &self.network
    }

    #[must_use]
    pub fn chain_factory(&self) -> LocalChainFactory {
        LocalChainFactory {
            network: self.network.clone(),
        }
    }

    #[must_use]
    pub fn relayer_factory(&self) -> LocalRelayerFactory {
        LocalRelayerFactory {
            network: self.network.clone(),
        }
    }
}

impl Drop for DockerSetup {
    fn drop(&mut self) {
        if self.preserve {
            info!(network = self.network.name(), "preserving docker network");
            return;
        }
        if let Err(err) = remove_network_blocking(self.network.name()) {
            warn!(network = self.network.name(), error = %err, "failed to remove docker network");
        }
    }
}

fn remove_network_blocking(name: &str) -> Result<(), CommandError> {
    let command = format!("docker network rm {name}");
    let output = process::Command::new("docker")
        .args(["network", "rm", name])
        .output()
        .map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(CommandError::Failed {
            command,
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Builds [`CosmosChain`]s on the test's Docker network.
#[derive(Clone)]
pub struct LocalChainFactory {
    network: DockerNetwork,
}

#[async_trait]
impl ChainFactory for LocalChainFactory {
    async fn instantiate(
        &self,
        test_name: &str,
        specs: &[ChainSpec],
    ) -> Result<Vec<Arc<dyn NetworkHandle>>, ChainError> {
        info!(test = test_name, chains = specs.len(), network = self.network.name(), "instantiating chains");
        Ok(specs
            .iter()
            .map(|spec| match spec.kind {
                ChainKind::Cosmos => {
                    Arc::new(CosmosChain::new(spec.clone(), self.network.clone()))
                        as Arc<dyn NetworkHandle>
                }
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct LocalRelayerFactory {
    network: DockerNetwork,
}

#[async_trait]
impl RelayerFactory for LocalRelayerFactory {
    async fn build(
        &self,
        kind: RelayerKind,
        image: &DockerImage,
        flags: &[String],
    ) -> Result<Arc<dyn Relayer>, RelayerError> {
        match kind {
            RelayerKind::CosmosRly => Ok(Arc::new(CosmosRelayer::new(
                image.clone(),
                flags.to_vec(),
                self.network.clone(),
            ))),
            RelayerKind::Hermes => Err(RelayerError::Unsupported { kind }),
        }
    }
}
