use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::chain::{ChainError, NetworkHandle};

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("{chain_id} did not reach height {target} within {timeout:?} (last seen {last_height:?})")]
    Timeout {
        chain_id: String,
        target: u64,
        last_height: Option<u64>,
        timeout: Duration,
    },
    #[error("failed to read height of {chain_id}: {source}")]
    Query {
        chain_id: String,
        #[source]
        source: ChainError,
    },
}

/// Waits until `network` reports a non-zero height. Query errors count as
/// "not live yet" until the timeout.
pub async fn wait_until_live(
    network: &dyn NetworkHandle,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> Result<u64, WaitError> {
    poll_height(network, 1, timeout_duration, poll_interval, true).await
}

/// Waits until `network` reaches `target`.
pub async fn wait_for_height(
    network: &dyn NetworkHandle,
    target: u64,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> Result<u64, WaitError> {
    poll_height(network, target, timeout_duration, poll_interval, false).await
}

/// Waits for `blocks` more blocks past the current height.
pub async fn wait_for_blocks(
    network: &dyn NetworkHandle,
    blocks: u64,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> Result<u64, WaitError> {
    let current = network
        .height()
        .await
        .map_err(|source| WaitError::Query {
            chain_id: network.chain_id().to_owned(),
            source,
        })?;
    wait_for_height(network, current + blocks, timeout_duration, poll_interval).await
}

async fn poll_height(
    network: &dyn NetworkHandle,
    target: u64,
    timeout_duration: Duration,
    poll_interval: Duration,
    tolerate_errors: bool,
) -> Result<u64, WaitError> {
    let mut last_height = None;
    let probe = async {
        loop {
            match network.height().await {
                Ok(height) if height >= target => return Ok(height),
                Ok(height) => last_height = Some(height),
                Err(err) if tolerate_errors => {
                    debug!(chain_id = network.chain_id(), error = %err, "height not available yet");
                }
                Err(source) => {
                    return Err(WaitError::Query {
                        chain_id: network.chain_id().to_owned(),
                        source,
                    });
                }
            }
            sleep(poll_interval).await;
        }
    };

    let outcome = timeout(timeout_duration, probe).await;
    match outcome {
        Ok(result) => result,
        Err(_) => Err(WaitError::Timeout {
            chain_id: network.chain_id().to_owned(),
            target,
            last_height,
            timeout: timeout_duration,
        }),
    }
}
