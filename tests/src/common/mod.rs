pub mod chains;
pub mod liquid_stake;
pub mod mock;
pub mod scenario;
