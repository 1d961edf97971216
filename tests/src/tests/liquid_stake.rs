use std::path::Path;

use serde_json::Value;

use interchain_testing_core::{
    chain::{ChainError, NetworkHandle as _, TxMessage},
    scenario::AckError,
};
use interchain_testing_workflows::{BalanceExpectation, Deployment, Harness, HarnessError};
use tests::{
    common::{
        chains::{GAIA_CHAIN_ID, GAIA_DENOM, PERSISTENCE_CHAIN_ID, RELAYER_NAME},
        liquid_stake::{self, ARTIFACT, LS_PREFIX, Timeouts},
        mock::{MockInterchain, settings},
        scenario::{
            Channels, Users, atom_transfer, deploy_liquid_stake, fund_users, ibc_config,
            liquid_stake_transfer, ls_config, register_host_chain, set_contract_active,
            transfer_channels,
        },
    },
    init_logging,
};

const STAKE_AMOUNT: u128 = 1_000;

struct Staking {
    interchain: MockInterchain,
    harness: Harness,
    users: Users,
    channels: Channels,
    contract: Deployment,
}

impl Staking {
    fn stk_atom() -> String {
        format!("{LS_PREFIX}{GAIA_DENOM}")
    }

    async fn teardown(self) {
        self.harness.environment().teardown().await;
        assert!(!self.interchain.persistence.is_running());
        assert!(!self.interchain.gaia.is_running());
    }
}

async fn setup(test_name: &str) -> Staking {
    init_logging();
    let interchain = MockInterchain::new();
    interchain
        .persistence
        .register_code(ARTIFACT, liquid_stake::code_factory());

    let env = interchain.build(test_name).await.expect("topology builds");
    let harness = Harness::new(env, RELAYER_NAME, &settings()).expect("relayer is registered");
    let users = fund_users(&harness, test_name).await.expect("fund users");
    let channels = transfer_channels(&harness).await.expect("transfer channels");

    register_host_chain(&harness, &users.admin, &channels)
        .await
        .expect("host chain registered");
    let calls = interchain.persistence.module_calls();
    let commands: Vec<(&str, &str)> = calls
        .iter()
        .map(|(module, args)| (module.as_str(), args.first().map_or("", String::as_str)))
        .collect();
    assert_eq!(
        commands,
        [
            ("liquidstakeibc", "register-host-chain"),
            ("liquidstakeibc", "update-host-chain"),
        ]
    );

    let contract = deploy_liquid_stake(&harness, &users.persistence.key_name, Path::new(ARTIFACT))
        .await
        .expect("contract deployed");

    Staking {
        interchain,
        harness,
        users,
        channels,
        contract,
    }
}

#[tokio::test]
async fn liquid_stake_via_hook_mints_for_local_receiver() {
    let staking = setup("ls-local").await;
    let Staking {
        harness,
        users,
        channels,
        contract,
        ..
    } = &staking;

    let persistence = harness.network(PERSISTENCE_CHAIN_ID).expect("persistence");
    let gaia = harness.network(GAIA_CHAIN_ID).expect("gaia");
    let atom = channels.atom_on_persistence();
    let expectation = BalanceExpectation::new()
        .delta(gaia, &users.gaia.address, GAIA_DENOM, -1_000)
        .exact(persistence, &users.persistence.address, &atom, 0)
        .exact(persistence, &contract.address, &atom, 0)
        .exact(
            persistence,
            &users.persistence.address,
            Staking::stk_atom(),
            STAKE_AMOUNT,
        );
    let baseline = expectation.snapshot().await.expect("baseline");

    let receipt = harness
        .transfer(&liquid_stake_transfer(
            users,
            channels,
            &contract.address,
            STAKE_AMOUNT,
            &users.persistence.address,
            None,
            None,
        ))
        .await
        .expect("hook succeeds");
    assert!(receipt.ack.is_success());

    expectation.verify(&baseline).await.expect("liquid stake balances");
    staking.teardown().await;
}

#[tokio::test]
async fn liquid_stake_forwards_minted_tokens_back_over_ibc() {
    let staking = setup("ls-forward").await;
    let Staking {
        harness,
        users,
        channels,
        contract,
        ..
    } = &staking;

    let gaia = harness.network(GAIA_CHAIN_ID).expect("gaia");
    let persistence = harness.network(PERSISTENCE_CHAIN_ID).expect("persistence");
    let stk_on_gaia = channels.on_gaia(&Staking::stk_atom());
    let expectation = BalanceExpectation::new()
        .delta(gaia, &users.gaia.address, GAIA_DENOM, -1_000)
        .exact(gaia, &users.gaia.address, &stk_on_gaia, STAKE_AMOUNT)
        .exact(persistence, &contract.address, Staking::stk_atom(), 0);
    let baseline = expectation.snapshot().await.expect("baseline");

    harness
        .transfer(&liquid_stake_transfer(
            users,
            channels,
            &contract.address,
            STAKE_AMOUNT,
            &users.gaia.address,
            Some(&channels.persistence.channel_id),
            Some(&users.persistence.address),
        ))
        .await
        .expect("hook succeeds");

    expectation.verify(&baseline).await.expect("minted tokens arrive on gaia");
    staking.teardown().await;
}

#[tokio::test]
async fn inactive_contract_rejects_and_keeps_the_voucher() {
    let staking = setup("ls-inactive").await;
    let Staking {
        harness,
        users,
        channels,
        contract,
        ..
    } = &staking;

    set_contract_active(harness, &users.persistence.key_name, &contract.address, false)
        .await
        .expect("admin deactivates");
    assert!(
        !ls_config(harness, &contract.address)
            .await
            .expect("config")
            .active
    );

    let persistence = harness.network(PERSISTENCE_CHAIN_ID).expect("persistence");
    let gaia = harness.network(GAIA_CHAIN_ID).expect("gaia");
    let atom = channels.atom_on_persistence();
    let expectation = BalanceExpectation::new()
        .delta(gaia, &users.gaia.address, GAIA_DENOM, -1_000)
        .exact(persistence, &contract.address, &atom, STAKE_AMOUNT)
        .exact(persistence, &users.persistence.address, &atom, 0)
        .exact(persistence, &users.persistence.address, Staking::stk_atom(), 0);
    let baseline = expectation.snapshot().await.expect("baseline");

    let err = harness
        .transfer(&liquid_stake_transfer(
            users,
            channels,
            &contract.address,
            STAKE_AMOUNT,
            &users.persistence.address,
            None,
            None,
        ))
        .await
        .expect_err("inactive contract fails the hook");
    let HarnessError::Ack(AckError::Mismatch { reason, .. }) = &err else {
        panic!("expected an error acknowledgement, got {err}");
    };
    assert!(reason.contains("Not active"), "unexpected reason: {reason}");

    harness
        .settle(&[GAIA_CHAIN_ID, PERSISTENCE_CHAIN_ID])
        .await
        .expect("settle");
    expectation.verify(&baseline).await.expect("voucher stays with contract");
    staking.teardown().await;
}

#[tokio::test]
async fn inactive_contract_moves_voucher_to_recovery_address() {
    let staking = setup("ls-recovery").await;
    let Staking {
        harness,
        users,
        channels,
        contract,
        ..
    } = &staking;

    set_contract_active(harness, &users.persistence.key_name, &contract.address, false)
        .await
        .expect("admin deactivates");

    let persistence = harness.network(PERSISTENCE_CHAIN_ID).expect("persistence");
    let gaia = harness.network(GAIA_CHAIN_ID).expect("gaia");
    let atom = channels.atom_on_persistence();
    let expectation = BalanceExpectation::new()
        .delta(gaia, &users.gaia.address, GAIA_DENOM, -1_000)
        .exact(persistence, &users.persistence.address, &atom, STAKE_AMOUNT)
        .exact(persistence, &contract.address, &atom, 0);
    let baseline = expectation.snapshot().await.expect("baseline");

    let err = harness
        .transfer(&liquid_stake_transfer(
            users,
            channels,
            &contract.address,
            STAKE_AMOUNT,
            &users.persistence.address,
            None,
            Some(&users.persistence.address),
        ))
        .await
        .expect_err("inactive contract fails the hook");
    assert!(
        matches!(err, HarnessError::Ack(AckError::Mismatch { .. })),
        "unexpected error: {err}"
    );

    harness
        .settle(&[GAIA_CHAIN_ID, PERSISTENCE_CHAIN_ID])
        .await
        .expect("settle");
    expectation.verify(&baseline).await.expect("voucher recovered");
    staking.teardown().await;
}

fn execute(contract: &Deployment, msg: Value) -> TxMessage {
    TxMessage::WasmExecute {
        contract: contract.address.clone(),
        msg,
        funds: None,
    }
}

fn tx_log(err: &ChainError) -> &str {
    let ChainError::TxFailed { raw_log, .. } = err else {
        panic!("expected a failed tx, got {err}");
    };
    raw_log
}

#[tokio::test]
async fn update_config_requires_the_contract_admin() {
    let staking = setup("ls-unauthorized").await;
    let Staking {
        harness,
        users,
        contract,
        ..
    } = &staking;
    let persistence = harness.network(PERSISTENCE_CHAIN_ID).expect("persistence");
    let timeouts = Timeouts {
        ibc_transfer_timeout: "60".to_owned(),
        ica_timeout: "120".to_owned(),
    };
    let update = || {
        execute(
            contract,
            liquid_stake::update_config_msg(Some(false), Some("lst/"), Some(timeouts.clone())),
        )
    };

    let err = persistence
        .submit_transaction(&users.admin.key_name, update())
        .await
        .expect_err("module admin is not the contract admin");
    assert!(tx_log(&err).contains("Unauthorized"), "unexpected error: {err}");

    let config = ls_config(harness, &contract.address).await.expect("config");
    assert!(config.active);
    assert_eq!(config.ls_prefix, LS_PREFIX);
    assert_eq!(
        ibc_config(harness, &contract.address).await.expect("ibc config"),
        Timeouts::default()
    );

    persistence
        .submit_transaction(&users.persistence.key_name, update())
        .await
        .expect("contract admin updates");
    let config = ls_config(harness, &contract.address).await.expect("config");
    assert!(!config.active);
    assert_eq!(config.ls_prefix, "lst/");
    assert_eq!(
        ibc_config(harness, &contract.address).await.expect("ibc config"),
        timeouts
    );
    staking.teardown().await;
}

#[tokio::test]
async fn claim_pays_the_staked_voucher_back_to_the_sender() {
    let staking = setup("ls-claim").await;
    let Staking {
        harness,
        users,
        channels,
        contract,
        ..
    } = &staking;
    harness
        .transfer(&liquid_stake_transfer(
            users,
            channels,
            &contract.address,
            STAKE_AMOUNT,
            &users.persistence.address,
            None,
            None,
        ))
        .await
        .expect("hook succeeds");

    // Vouchers the contract can pay out, and liquid tokens left with it.
    harness
        .transfer(&atom_transfer(users, channels, &contract.address, 400))
        .await
        .expect("plain transfer to the contract");
    let persistence = harness.network(PERSISTENCE_CHAIN_ID).expect("persistence");
    persistence
        .submit_transaction(
            &users.persistence.key_name,
            TxMessage::BankSend {
                to: contract.address.clone(),
                denom: Staking::stk_atom(),
                amount: 400,
            },
        )
        .await
        .expect("liquid tokens sent to the contract");

    let atom = channels.atom_on_persistence();
    let hook_sender = format!(
        "ibc-hooks/{}/{}",
        channels.persistence.channel_id, users.gaia.address
    );
    let expectation = BalanceExpectation::new()
        .exact(persistence, &hook_sender, &atom, 400)
        .exact(persistence, &contract.address, &atom, 0)
        .exact(persistence, &contract.address, Staking::stk_atom(), 400);
    let baseline = expectation.snapshot().await.expect("baseline");

    let err = persistence
        .submit_transaction(&users.admin.key_name, execute(contract, liquid_stake::claim_msg()))
        .await
        .expect_err("only the receiver claims");
    assert!(tx_log(&err).contains("Unauthorized"), "unexpected error: {err}");

    persistence
        .submit_transaction(&users.persistence.key_name, execute(contract, liquid_stake::claim_msg()))
        .await
        .expect("receiver claims");
    expectation.verify(&baseline).await.expect("voucher paid to the staker");

    let err = persistence
        .submit_transaction(&users.persistence.key_name, execute(contract, liquid_stake::claim_msg()))
        .await
        .expect_err("claim is paid once");
    assert!(tx_log(&err).contains("No claimable tokens"), "unexpected error: {err}");
    staking.teardown().await;
}
