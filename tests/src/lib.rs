pub mod common;

pub use interchain_testing_core::{adjust_timeout, logging::init as init_logging};
