//! The Go relayer (`rly`) in a helper container.

use std::sync::Arc;

use async_trait::async_trait;
use interchain_testing_core::{
    chain::{DockerImage, NetworkHandle},
    ibc::{ChannelInfo, ChannelOptions, ConnectionInfo},
    relayer::{Relayer, RelayerError, RelayerKind},
};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    cosmos::query,
    docker::{Container, ContainerSpec, DockerNetwork, sanitize, unique_name},
    exec::{CommandError, Output},
};

const RLY: &str = "rly";
const RLY_HOME: &str = "/tmp/relayer";
const RELAYER_WALLET_FUNDS: u128 = 100_000_000;

/// Relayer wallet key name registered on every chain.
fn key_name(chain_id: &str) -> String {
    format!("rly-{}", sanitize(chain_id))
}

/// `rly chains add --file` input for one chain.
#[must_use]
pub fn chain_config(network: &dyn NetworkHandle) -> serde_json::Value {
    let spec = network.spec();
    json!({
        "type": "cosmos",
        "value": {
            "key": key_name(&spec.chain_id),
            "chain-id": spec.chain_id,
            "rpc-addr": network.rpc_address(),
            "account-prefix": spec.bech32_prefix,
            "keyring-backend": "test",
            "gas-adjustment": spec.gas_adjustment,
            "gas-prices": spec.gas_prices,
            "min-gas-amount": 0,
            "debug": true,
            "timeout": "10s",
            "output-format": "json",
            "sign-mode": "direct",
            "trusting-period": spec.trusting_period,
        }
    })
}

#[derive(Default)]
struct State {
    container: Option<Container>,
    chains: Vec<String>,
}

pub struct CosmosRelayer {
    image: DockerImage,
    startup_flags: Vec<String>,
    network: DockerNetwork,
    state: Mutex<State>,
}

impl CosmosRelayer {
    #[must_use]
    pub fn new(image: DockerImage, startup_flags: Vec<String>, network: DockerNetwork) -> Self {
        Self {
            image,
            startup_flags,
            network,
            state: Mutex::new(State::default()),
        }
    }

    async fn container(&self) -> Result<Container, RelayerError> {
        self.state
            .lock()
            .await
            .container
            .clone()
            .ok_or(RelayerError::NotStarted)
    }

    async fn rly<I, S>(&self, args: I) -> Result<Output, RelayerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let container = self.container().await?;
        let mut argv = vec![RLY.to_owned()];
        argv.extend(args.into_iter().map(Into::into));
        argv.push("--home".to_owned());
        argv.push(RLY_HOME.to_owned());
        container.exec(&argv, None).await.map_err(command_error)
    }

    async fn known_chain(&self, chain_id: &str) -> Result<(), RelayerError> {
        if self.state.lock().await.chains.iter().any(|c| c == chain_id) {
            Ok(())
        } else {
            Err(RelayerError::UnknownChain {
                chain_id: chain_id.to_owned(),
            })
        }
    }

    async fn add_chain(&self, network: &dyn NetworkHandle) -> Result<(), RelayerError> {
        let chain_id = network.chain_id();
        let container = self.container().await?;
        let file = format!("{RLY_HOME}/{}.json", sanitize(chain_id));
        let config = serde_json::to_vec_pretty(&chain_config(network)).map_err(RelayerError::other)?;
        container
            .write_file(&file, &config)
            .await
            .map_err(command_error)?;
        self.rly(["chains", "add", "--file", file.as_str(), chain_id])
            .await?;

        let key = key_name(chain_id);
        let wallet = network
            .create_funded_wallet(&key, RELAYER_WALLET_FUNDS, None)
            .await
            .map_err(RelayerError::other)?;
        let mnemonic = wallet.mnemonic.ok_or_else(|| RelayerError::Parse {
            context: format!("relayer wallet on {chain_id}"),
            reason: "no mnemonic returned".to_owned(),
        })?;
        self.rly(["keys", "restore", chain_id, key.as_str(), mnemonic.as_str()])
            .await?;
        info!(chain_id, address = %wallet.address, "relayer wallet configured");
        Ok(())
    }
}

fn command_error(err: CommandError) -> RelayerError {
    match err {
        CommandError::Failed {
            command, stderr, ..
        } => RelayerError::Command { command, stderr },
        other => RelayerError::other(other),
    }
}

fn parse_error(context: &str) -> impl FnOnce(String) -> RelayerError + '_ {
    move |reason| RelayerError::Parse {
        context: context.to_owned(),
        reason,
    }
}

#[async_trait]
impl Relayer for CosmosRelayer {
    fn kind(&self) -> RelayerKind {
        RelayerKind::CosmosRly
    }

    async fn start(&self, networks: &[Arc<dyn NetworkHandle>]) -> Result<(), RelayerError> {
        {
            let mut state = self.state.lock().await;
            if state.container.is_none() {
                let spec = ContainerSpec::new(unique_name("ictest-rly"), self.image.reference())
                    .with_user(self.image.uid_gid.clone())
                    .with_env("HOME", RLY_HOME);
                let container = Container::run(&spec, &self.network)
                    .await
                    .map_err(command_error)?;
                state.container = Some(container);
            }
        }

        self.rly(["config", "init"]).await?;
        for network in networks {
            self.add_chain(network.as_ref()).await?;
            self.state
                .lock()
                .await
                .chains
                .push(network.chain_id().to_owned());
        }
        info!(chains = networks.len(), "rly configured");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RelayerError> {
        let container = self.state.lock().await.container.take();
        match container {
            Some(container) => container.remove().await.map_err(command_error),
            None => Ok(()),
        }
    }

    async fn generate_path(
        &self,
        src_chain_id: &str,
        dst_chain_id: &str,
        path: &str,
    ) -> Result<(), RelayerError> {
        self.known_chain(src_chain_id).await?;
        self.known_chain(dst_chain_id).await?;
        self.rly(["paths", "new", src_chain_id, dst_chain_id, path])
            .await
            .map(|_| ())
    }

    async fn link_path(&self, path: &str, channel: &ChannelOptions) -> Result<(), RelayerError> {
        let order = channel.order.to_string();
        self.rly([
            "tx",
            "link",
            path,
            "--src-port",
            channel.src_port.as_str(),
            "--dst-port",
            channel.dst_port.as_str(),
            "--order",
            order.as_str(),
            "--version",
            channel.version.as_str(),
        ])
        .await
        .map(|_| ())
    }

    async fn start_relaying(&self, paths: &[String]) -> Result<(), RelayerError> {
        let container = self.container().await?;
        let mut argv = vec![RLY.to_owned(), "start".to_owned()];
        argv.extend(paths.iter().cloned());
        argv.extend(self.startup_flags.iter().cloned());
        argv.push("--home".to_owned());
        argv.push(RLY_HOME.to_owned());
        container.exec_detached(&argv).await.map_err(command_error)?;
        info!(?paths, "rly relaying");
        Ok(())
    }

    async fn channels(&self, chain_id: &str) -> Result<Vec<ChannelInfo>, RelayerError> {
        let output = self.rly(["q", "channels", chain_id]).await?;
        query::channels(&output.stdout).map_err(parse_error("rly q channels"))
    }

    async fn connections(&self, chain_id: &str) -> Result<Vec<ConnectionInfo>, RelayerError> {
        let output = self.rly(["q", "connections", chain_id]).await?;
        query::connections(&output.stdout).map_err(parse_error("rly q connections"))
    }

    async fn flush(&self, path: &str, channel_id: &str) -> Result<(), RelayerError> {
        self.rly(["tx", "flush", path, channel_id]).await.map(|_| ())
    }
}
