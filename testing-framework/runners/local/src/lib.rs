pub mod cosmos;
pub mod docker;
pub mod exec;
mod factory;
mod relayer;

pub use cosmos::CosmosChain;
pub use factory::{DockerSetup, LocalChainFactory, LocalRelayerFactory};
pub use relayer::{CosmosRelayer, chain_config};
