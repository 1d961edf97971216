use interchain_testing_core::{
    chain::{ChainSpec, DockerImage, GenesisKv},
    relayer::RelayerSpec,
};
use serde_json::json;

pub const PERSISTENCE_CHAIN_ID: &str = "ictest-core-1";
pub const PERSISTENCE_DENOM: &str = "uxprt";
pub const PERSISTENCE_COIN_TYPE: u32 = 118;
pub const GAIA_CHAIN_ID: &str = "gaia-1";
pub const GAIA_DENOM: &str = "uatom";

pub const IBC_PATH: &str = "ibc-path";
pub const RELAYER_NAME: &str = "relay";
pub const GENESIS_WALLET_AMOUNT: u128 = 10_000_000;

pub const LIQUIDSTAKEIBC_ADMIN: &str = "persistence1u20df3trc2c2zdhm8qvh2hdjx9ewh00spalt70";
pub const ADMIN_MNEMONIC: &str = "tone cause tribe this switch near host damage idle fragile antique tail soda alien depth write wool they rapid unfold body scan pledge soft";

const ICA_ALLOW_MESSAGES: [&str; 10] = [
    "/cosmos.bank.v1beta1.MsgSend",
    "/cosmos.bank.v1beta1.MsgMultiSend",
    "/cosmos.staking.v1beta1.MsgDelegate",
    "/cosmos.staking.v1beta1.MsgUndelegate",
    "/cosmos.staking.v1beta1.MsgBeginRedelegate",
    "/cosmos.staking.v1beta1.MsgRedeemTokensforShares",
    "/cosmos.staking.v1beta1.MsgTokenizeShares",
    "/cosmos.distribution.v1beta1.MsgWithdrawDelegatorReward",
    "/cosmos.distribution.v1beta1.MsgSetWithdrawAddress",
    "/ibc.applications.transfer.v1.MsgTransfer",
];

#[must_use]
pub fn persistence_genesis_overrides() -> Vec<GenesisKv> {
    vec![
        GenesisKv::new("app_state.gov.params.voting_period", "15s"),
        GenesisKv::new("app_state.gov.params.max_deposit_period", "10s"),
        GenesisKv::new("app_state.gov.params.min_deposit.0.denom", PERSISTENCE_DENOM),
        GenesisKv::new("app_state.builder.params.reserve_fee.denom", PERSISTENCE_DENOM),
        GenesisKv::new(
            "app_state.builder.params.min_bid_increment.denom",
            PERSISTENCE_DENOM,
        ),
        GenesisKv::new("app_state.wasm.params.code_upload_access.permission", "Everybody"),
        GenesisKv::new("app_state.wasm.params.instantiate_default_permission", "Everybody"),
        GenesisKv::new(
            "app_state.interchainaccounts.host_genesis_state.params.allow_messages",
            json!(ICA_ALLOW_MESSAGES),
        ),
        GenesisKv::new(
            "app_state.liquidstakeibc.params.admin_address",
            LIQUIDSTAKEIBC_ADMIN,
        ),
    ]
}

#[must_use]
pub fn persistence_spec() -> ChainSpec {
    let mut spec = ChainSpec::cosmos(
        "persistence",
        PERSISTENCE_CHAIN_ID,
        "persistenceCore",
        PERSISTENCE_DENOM,
        "persistence",
    )
    .with_image(
        DockerImage::new("persistenceone/persistencecore", "v11.2.0").with_uid_gid("1025:1025"),
    )
    .with_node_counts(1, 1)
    .with_gas_prices(format!("0{PERSISTENCE_DENOM}"))
    .with_new_genesis_command(true)
    .with_genesis_overrides(persistence_genesis_overrides());
    spec.coin_type = PERSISTENCE_COIN_TYPE;
    spec.gas_adjustment = 1.5;
    spec.trusting_period = "112h".to_owned();
    spec
}

#[must_use]
pub fn gaia_spec() -> ChainSpec {
    ChainSpec::cosmos("gaia", GAIA_CHAIN_ID, "gaiad", GAIA_DENOM, "cosmos")
        .with_image(DockerImage::new("ghcr.io/strangelove-ventures/heighliner/gaia", "v9.1.0"))
        .with_node_counts(1, 1)
        .with_gas_prices(format!("0.0{GAIA_DENOM}"))
}

#[must_use]
pub fn relayer_spec() -> RelayerSpec {
    RelayerSpec::cosmos_rly(DockerImage::new("ghcr.io/cosmos/relayer", "main").with_uid_gid("100:1000"))
        .with_startup_flags(["--processor", "events", "--block-history", "100"])
}
