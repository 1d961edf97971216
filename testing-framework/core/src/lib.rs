pub mod chain;
pub mod config;
pub mod ibc;
pub mod logging;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod relayer;
pub mod scenario;
pub mod topology;

use std::{env, ops::Mul as _, sync::LazyLock, time::Duration};

pub use scenario::DynError;

static IS_SLOW_TEST_ENV: LazyLock<bool> =
    LazyLock::new(|| env::var("SLOW_TEST_ENV").is_ok_and(|s| s == "true"));

/// In slow test environments like CI runners, use 2x timeout.
#[must_use]
pub fn adjust_timeout(d: Duration) -> Duration {
    if *IS_SLOW_TEST_ENV { d.mul(2) } else { d }
}
