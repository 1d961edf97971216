use std::{any::Any, future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt as _;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info};

use super::{
    DynError,
    sequencer::{BuildError, BuildOptions, Environment, build},
};
use crate::topology::TopologyGraph;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("scenario failed: {0}")]
    Scenario(#[source] DynError),
    #[error("scenario exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
    #[error("scenario panicked: {0}")]
    Panicked(String),
}

/// Builds `graph`, runs `scenario` against it under `deadline`, and tears the
/// environment down on every exit path, panics included.
pub async fn run_scoped<F, Fut, T>(
    graph: TopologyGraph,
    options: &BuildOptions,
    deadline: Duration,
    scenario: F,
) -> Result<T, ScopeError>
where
    F: FnOnce(Arc<Environment>) -> Fut,
    Fut: Future<Output = Result<T, DynError>>,
{
    let env = Arc::new(build(graph, options).await?);

    let outcome = timeout(
        deadline,
        AssertUnwindSafe(scenario(Arc::clone(&env))).catch_unwind(),
    )
    .await;

    env.teardown().await;
    info!(test = %options.test_name, "environment torn down");

    match outcome {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(source))) => Err(ScopeError::Scenario(source)),
        Ok(Err(panic)) => {
            let message = panic_message(panic);
            error!(test = %options.test_name, %message, "scenario panicked");
            Err(ScopeError::Panicked(message))
        }
        Err(_) => Err(ScopeError::DeadlineExceeded(deadline)),
    }
}

/// Attempts to turn a panic payload into a readable string for diagnostics.
fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic.downcast::<String>().map_or_else(
        |panic| {
            panic.downcast::<&'static str>().map_or_else(
                |_| "unknown panic".to_owned(),
                |message| (*message).to_owned(),
            )
        },
        |message| *message,
    )
}
