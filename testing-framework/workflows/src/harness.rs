//! One cross-chain step end to end: send, flush, wait for the
//! acknowledgement, settle.

use std::{path::Path, sync::Arc, time::Duration};

use futures::future::try_join_all;
use interchain_testing_core::{
    chain::{ChainError, IbcTimeout, NetworkHandle, TransferOptions, TransferTx, WalletAmount},
    config::Settings,
    ibc::{Acknowledgement, PacketTracker, TransitionError},
    relayer::{ControllerError, RelayerController},
    scenario::{AckError, AckWaiter, Environment, WaitError, wait::wait_for_blocks},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::memo::WasmHookMemo;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("network {chain_id} is not part of the environment")]
    UnknownNetwork { chain_id: String },
    #[error("relayer {name} is not part of the environment")]
    UnknownRelayer { name: String },
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("transfer from {chain_id} was not accepted: {reason}")]
    InvalidTransfer { chain_id: String, reason: String },
    #[error(transparent)]
    Relay(#[from] ControllerError),
    #[error(transparent)]
    Ack(#[from] AckError),
    #[error(transparent)]
    Settle(#[from] WaitError),
    #[error(transparent)]
    Tracking(#[from] TransitionError),
}

/// One ICS-20 send. `amount.address` is the receiver on the far chain.
#[derive(Clone, Debug)]
pub struct TransferRequest {
    pub src_chain: String,
    pub dst_chain: String,
    pub path: String,
    pub channel_id: String,
    pub signer: String,
    pub amount: WalletAmount,
    pub options: TransferOptions,
}

impl TransferRequest {
    #[must_use]
    pub fn new(
        src_chain: impl Into<String>,
        dst_chain: impl Into<String>,
        path: impl Into<String>,
        channel_id: impl Into<String>,
        signer: impl Into<String>,
        amount: WalletAmount,
    ) -> Self {
        Self {
            src_chain: src_chain.into(),
            dst_chain: dst_chain.into(),
            path: path.into(),
            channel_id: channel_id.into(),
            signer: signer.into(),
            amount,
            options: TransferOptions::default(),
        }
    }

    #[must_use]
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.options = self.options.with_memo(memo);
        self
    }

    #[must_use]
    pub fn with_hook(self, hook: &WasmHookMemo) -> Self {
        self.with_memo(hook.to_string())
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: IbcTimeout) -> Self {
        self.options = self.options.with_timeout(timeout);
        self
    }
}

#[derive(Clone, Debug)]
pub struct TransferReceipt {
    pub tx: TransferTx,
    pub pre_send_height: u64,
    pub ack: Acknowledgement,
    pub tracker: PacketTracker,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deployment {
    pub code_id: u64,
    pub address: String,
}

/// Drives scenario steps against a built environment through one relayer.
pub struct Harness {
    env: Arc<Environment>,
    relayer: RelayerController,
    waiter: AckWaiter,
    ack_window_blocks: u64,
    settle_blocks: u64,
    settle_timeout: Duration,
    poll_interval: Duration,
}

impl Harness {
    pub fn new(
        env: Arc<Environment>,
        relayer: &str,
        settings: &Settings,
    ) -> Result<Self, HarnessError> {
        let relayer = env
            .relayer(relayer)
            .ok_or_else(|| HarnessError::UnknownRelayer {
                name: relayer.to_owned(),
            })?;
        Ok(Self {
            env,
            relayer,
            waiter: AckWaiter::from_settings(settings),
            ack_window_blocks: settings.ack_window_blocks,
            settle_blocks: settings.settle_blocks,
            settle_timeout: settings.liveness_timeout,
            poll_interval: settings.ack_poll_interval,
        })
    }

    #[must_use]
    pub const fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    #[must_use]
    pub const fn relayer(&self) -> &RelayerController {
        &self.relayer
    }

    pub fn network(&self, chain_id: &str) -> Result<&Arc<dyn NetworkHandle>, HarnessError> {
        self.env
            .network(chain_id)
            .ok_or_else(|| HarnessError::UnknownNetwork {
                chain_id: chain_id.to_owned(),
            })
    }

    /// Sends, flushes, waits for the acknowledgement within the configured
    /// window past the pre-send height, then lets both chains settle.
    ///
    /// An error acknowledgement surfaces as [`AckError::Mismatch`] and a
    /// packet timeout as [`AckError::PacketTimedOut`]; neither settles.
    pub async fn transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, HarnessError> {
        let (tx, pre_send_height, mut tracker) = self.send_and_flush(request).await?;
        let src = self.network(&request.src_chain)?;

        let to_height = pre_send_height + self.ack_window_blocks;
        let ack = match self
            .waiter
            .poll_for_ack(src.as_ref(), pre_send_height, to_height, tracker.packet())
            .await
        {
            Ok(ack) => ack,
            Err(err) => {
                match &err {
                    AckError::Mismatch { reason, .. } => {
                        tracker.acknowledged(Acknowledgement::error(reason.clone()))?;
                    }
                    AckError::PacketTimedOut { .. } => tracker.timed_out()?,
                    AckError::Timeout { .. } | AckError::Query { .. } => {}
                }
                warn!(packet = %tracker.packet(), error = %err, "transfer did not succeed");
                return Err(err.into());
            }
        };
        tracker.acknowledged(ack.clone())?;

        self.settle(&[&request.src_chain, &request.dst_chain]).await?;
        info!(packet = %tracker.packet(), "transfer settled");

        Ok(TransferReceipt {
            tx,
            pre_send_height,
            ack,
            tracker,
        })
    }

    /// Like [`Harness::transfer`] but expects the packet to time out and be
    /// refunded on the source chain.
    pub async fn transfer_expecting_timeout(
        &self,
        request: &TransferRequest,
    ) -> Result<PacketTracker, HarnessError> {
        let (_, pre_send_height, mut tracker) = self.send_and_flush(request).await?;
        let src = self.network(&request.src_chain)?;

        let to_height = pre_send_height + self.ack_window_blocks;
        self.waiter
            .poll_for_timeout(src.as_ref(), pre_send_height, to_height, tracker.packet())
            .await?;
        tracker.timed_out()?;

        self.settle(&[&request.src_chain]).await?;
        Ok(tracker)
    }

    /// Waits for the configured number of blocks on every named chain.
    pub async fn settle(&self, chain_ids: &[&str]) -> Result<(), HarnessError> {
        let networks = chain_ids
            .iter()
            .map(|chain_id| self.network(chain_id))
            .collect::<Result<Vec<_>, _>>()?;
        try_join_all(networks.into_iter().map(|network| {
            wait_for_blocks(
                network.as_ref(),
                self.settle_blocks,
                self.settle_timeout,
                self.poll_interval,
            )
        }))
        .await?;
        Ok(())
    }

    /// Stores `artifact` and instantiates it once.
    pub async fn deploy_contract(
        &self,
        chain_id: &str,
        signer: &str,
        artifact: &Path,
        init: &serde_json::Value,
        label: &str,
        no_admin: bool,
    ) -> Result<Deployment, HarnessError> {
        let network = self.network(chain_id)?;
        let code_id = network.store_code(signer, artifact).await?;
        let address = network
            .instantiate_contract(signer, code_id, init, label, no_admin)
            .await?;
        info!(chain_id, code_id, %address, "contract deployed");
        Ok(Deployment { code_id, address })
    }

    async fn send_and_flush(
        &self,
        request: &TransferRequest,
    ) -> Result<(TransferTx, u64, PacketTracker), HarnessError> {
        let src = self.network(&request.src_chain)?;
        self.network(&request.dst_chain)?;

        let pre_send_height = src.height().await?;
        let tx = src
            .send_ibc_transfer(
                &request.channel_id,
                &request.signer,
                &request.amount,
                &request.options,
            )
            .await?;
        tx.validate()
            .map_err(|reason| HarnessError::InvalidTransfer {
                chain_id: request.src_chain.clone(),
                reason,
            })?;
        info!(
            src = %request.src_chain,
            dst = %request.dst_chain,
            channel = %request.channel_id,
            sequence = tx.packet.sequence,
            amount = %request.amount.coin(),
            "transfer sent"
        );

        let mut tracker = PacketTracker::sent(tx.packet.reference().with_path(&request.path));
        self.relayer
            .flush(&request.path, &request.channel_id)
            .await?;
        tracker.flushed()?;

        Ok((tx, pre_send_height, tracker))
    }
}
