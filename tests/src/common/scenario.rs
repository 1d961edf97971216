//! Steps shared by the liquid-staking scenarios. Each returns the values
//! later steps need; nothing is cached between scenarios.

use std::path::Path;

use interchain_testing_core::{
    DynError,
    chain::{TxMessage, Wallet, WalletAmount, fund_test_wallets},
    ibc::{ChannelInfo, received_denom},
};
use interchain_testing_workflows::{Deployment, Harness, TransferRequest, WasmHookMemo};
use tracing::info;

use super::{
    chains::{
        ADMIN_MNEMONIC, GAIA_CHAIN_ID, GAIA_DENOM, GENESIS_WALLET_AMOUNT, IBC_PATH,
        PERSISTENCE_CHAIN_ID,
    },
    liquid_stake::{self, LsConfig, Timeouts},
};

pub struct Users {
    pub persistence: Wallet,
    pub gaia: Wallet,
    pub admin: Wallet,
}

/// One funded user per chain plus the module admin on Persistence.
pub async fn fund_users(harness: &Harness, key_prefix: &str) -> Result<Users, DynError> {
    let persistence = harness.network(PERSISTENCE_CHAIN_ID)?;
    let gaia = harness.network(GAIA_CHAIN_ID)?;

    let mut wallets = fund_test_wallets(
        key_prefix,
        GENESIS_WALLET_AMOUNT,
        &[persistence.clone(), gaia.clone()],
    )
    .await?
    .into_iter();
    let (Some(persistence_user), Some(gaia_user)) = (wallets.next(), wallets.next()) else {
        return Err("expected one wallet per chain".into());
    };

    let admin = persistence
        .create_funded_wallet(
            &format!("{key_prefix}-admin"),
            GENESIS_WALLET_AMOUNT,
            Some(ADMIN_MNEMONIC),
        )
        .await?;

    Ok(Users {
        persistence: persistence_user,
        gaia: gaia_user,
        admin,
    })
}

/// Both ends of the transfer channel between Gaia and Persistence.
pub struct Channels {
    pub gaia: ChannelInfo,
    pub persistence: ChannelInfo,
}

impl Channels {
    /// `ibc/...` denom uatom arrives as on Persistence.
    #[must_use]
    pub fn atom_on_persistence(&self) -> String {
        received_denom(
            &self.persistence.port_id,
            &self.persistence.channel_id,
            GAIA_DENOM,
        )
    }

    /// `ibc/...` denom a Persistence-native `denom` arrives as on Gaia.
    #[must_use]
    pub fn on_gaia(&self, denom: &str) -> String {
        received_denom(&self.gaia.port_id, &self.gaia.channel_id, denom)
    }
}

pub async fn transfer_channels(harness: &Harness) -> Result<Channels, DynError> {
    let relayer = harness.relayer();
    let gaia = relayer
        .transfer_channel(GAIA_CHAIN_ID, PERSISTENCE_CHAIN_ID)
        .await?;
    let persistence = relayer
        .transfer_channel(PERSISTENCE_CHAIN_ID, GAIA_CHAIN_ID)
        .await?;
    info!(gaia = %gaia.channel_id, persistence = %persistence.channel_id, "transfer channels");
    Ok(Channels { gaia, persistence })
}

/// Registers Gaia as a liquid-staking host on Persistence and activates it.
pub async fn register_host_chain(
    harness: &Harness,
    admin: &Wallet,
    channels: &Channels,
) -> Result<(), DynError> {
    let persistence = harness.network(PERSISTENCE_CHAIN_ID)?;
    let connection = channels
        .persistence
        .connection_id()
        .ok_or("persistence transfer channel has no connection hop")?;

    persistence
        .submit_transaction(
            &admin.key_name,
            TxMessage::module(
                "liquidstakeibc",
                [
                    "register-host-chain",
                    connection,
                    channels.persistence.channel_id.as_str(),
                    channels.persistence.port_id.as_str(),
                    "0.00",
                    "0.05",
                    "0.00",
                    "0.005",
                    GAIA_DENOM,
                    "1",
                    "4",
                    "2",
                ],
            ),
        )
        .await?;

    persistence
        .submit_transaction(
            &admin.key_name,
            TxMessage::module(
                "liquidstakeibc",
                [
                    "update-host-chain",
                    GAIA_CHAIN_ID,
                    r#"[{"key":"active","value":"true"}]"#,
                ],
            ),
        )
        .await?;
    harness.settle(&[PERSISTENCE_CHAIN_ID]).await?;
    Ok(())
}

/// Stores and instantiates the liquid-staking contract and checks it starts
/// active.
pub async fn deploy_liquid_stake(
    harness: &Harness,
    signer: &str,
    artifact: &Path,
) -> Result<Deployment, DynError> {
    let deployment = harness
        .deploy_contract(
            PERSISTENCE_CHAIN_ID,
            signer,
            artifact,
            &liquid_stake::instantiate_msg(),
            "ica-liquid-staking",
            true,
        )
        .await?;

    let config = ls_config(harness, &deployment.address).await?;
    if !config.active {
        return Err(format!("contract {} is not active after instantiate", deployment.address).into());
    }
    Ok(deployment)
}

pub async fn ls_config(harness: &Harness, contract: &str) -> Result<LsConfig, DynError> {
    let raw = harness
        .network(PERSISTENCE_CHAIN_ID)?
        .query_contract(contract, &liquid_stake::ls_config_query())
        .await?;
    Ok(serde_json::from_value(raw)?)
}

pub async fn ibc_config(harness: &Harness, contract: &str) -> Result<Timeouts, DynError> {
    let raw = harness
        .network(PERSISTENCE_CHAIN_ID)?
        .query_contract(contract, &liquid_stake::ibc_config_query())
        .await?;
    Ok(serde_json::from_value(raw)?)
}

/// Gaia to Persistence transfer whose memo calls `liquid_stake` on the
/// contract.
#[must_use]
pub fn liquid_stake_transfer(
    users: &Users,
    channels: &Channels,
    contract: &str,
    amount: u128,
    receiver: &str,
    transfer_channel: Option<&str>,
    recovery_address: Option<&str>,
) -> TransferRequest {
    let hook = WasmHookMemo::new(
        contract,
        liquid_stake::liquid_stake_msg(receiver, transfer_channel, recovery_address),
    );
    TransferRequest::new(
        GAIA_CHAIN_ID,
        PERSISTENCE_CHAIN_ID,
        IBC_PATH,
        channels.gaia.channel_id.clone(),
        users.gaia.key_name.clone(),
        WalletAmount::new(contract, GAIA_DENOM, amount),
    )
    .with_hook(&hook)
}

/// Plain Gaia to Persistence transfer to `receiver`.
#[must_use]
pub fn atom_transfer(users: &Users, channels: &Channels, receiver: &str, amount: u128) -> TransferRequest {
    TransferRequest::new(
        GAIA_CHAIN_ID,
        PERSISTENCE_CHAIN_ID,
        IBC_PATH,
        channels.gaia.channel_id.clone(),
        users.gaia.key_name.clone(),
        WalletAmount::new(receiver, GAIA_DENOM, amount),
    )
}

/// Admin-only `update_config` on the contract.
pub async fn set_contract_active(
    harness: &Harness,
    signer: &str,
    contract: &str,
    active: bool,
) -> Result<(), DynError> {
    harness
        .network(PERSISTENCE_CHAIN_ID)?
        .submit_transaction(
            signer,
            TxMessage::WasmExecute {
                contract: contract.to_owned(),
                msg: liquid_stake::update_config_msg(Some(active), None, None),
                funds: None,
            },
        )
        .await?;
    Ok(())
}
