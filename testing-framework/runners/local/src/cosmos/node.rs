use interchain_testing_core::chain::ChainSpec;

use crate::{
    docker::{Container, ContainerSpec, DockerNetwork},
    exec::{CommandError, Output},
};

pub const RPC_PORT: u16 = 26657;
pub const P2P_PORT: u16 = 26656;
pub const NODE_HOME: &str = "/tmp/ictest-home";
pub const KEYRING: [&str; 2] = ["--keyring-backend", "test"];

/// One validator or full node container of a Cosmos SDK chain.
#[derive(Clone, Debug)]
pub struct CosmosNode {
    pub index: usize,
    pub validator: bool,
    binary: String,
    container: Container,
}

impl CosmosNode {
    pub async fn launch(
        spec: &ChainSpec,
        network: &DockerNetwork,
        index: usize,
    ) -> Result<Self, CommandError> {
        let validator = index < spec.validators;
        let role = if validator { "val" } else { "fn" };
        let image = spec.primary_image().map_or_else(
            || format!("{}:latest", spec.name),
            |image| image.reference(),
        );
        let user = spec.primary_image().and_then(|image| image.uid_gid.clone());
        let name = crate::docker::unique_name(&format!("{}-{role}-{index}", spec.chain_id));

        let container_spec = ContainerSpec::new(name, image)
            .with_user(user)
            .with_env("HOME", NODE_HOME)
            .publish(RPC_PORT);
        let container = Container::run(&container_spec, network).await?;

        Ok(Self {
            index,
            validator,
            binary: spec.binary.clone(),
            container,
        })
    }

    #[must_use]
    pub fn container(&self) -> &Container {
        &self.container
    }

    #[must_use]
    pub fn host_name(&self) -> &str {
        self.container.name()
    }

    /// RPC endpoint as seen from other containers on the test network.
    #[must_use]
    pub fn internal_rpc(&self) -> String {
        format!("http://{}:{RPC_PORT}", self.host_name())
    }

    #[must_use]
    pub fn genesis_path(&self) -> String {
        format!("{NODE_HOME}/config/genesis.json")
    }

    /// `<binary> args.. --home <home>`.
    #[must_use]
    pub fn command<I, S>(&self, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = vec![self.binary.clone()];
        argv.extend(args.into_iter().map(Into::into));
        argv.push("--home".to_owned());
        argv.push(NODE_HOME.to_owned());
        argv
    }

    pub async fn run<I, S>(&self, args: I) -> Result<Output, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.container.exec(&self.command(args), None).await
    }

    pub async fn run_with_stdin<I, S>(&self, args: I, stdin: &[u8]) -> Result<Output, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.container.exec(&self.command(args), Some(stdin)).await
    }

    pub async fn remove(&self) -> Result<(), CommandError> {
        self.container.remove().await
    }
}
