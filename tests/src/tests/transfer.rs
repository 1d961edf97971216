use std::sync::Arc;

use interchain_testing_core::{
    chain::{IbcTimeout, WalletAmount},
    ibc::PacketState,
    scenario::AckError,
};
use interchain_testing_workflows::{BalanceExpectation, Harness, HarnessError, TransferRequest};
use tests::{
    common::{
        chains::{
            GAIA_CHAIN_ID, GAIA_DENOM, GENESIS_WALLET_AMOUNT, IBC_PATH, PERSISTENCE_CHAIN_ID,
            RELAYER_NAME,
        },
        mock::{MockInterchain, settings},
        scenario::{atom_transfer, fund_users, transfer_channels},
    },
    init_logging,
};

const TRANSFER_AMOUNT: u128 = 1_000;

async fn harness(interchain: &MockInterchain, test_name: &str) -> Harness {
    init_logging();
    let env = interchain.build(test_name).await.expect("topology builds");
    Harness::new(env, RELAYER_NAME, &settings()).expect("relayer is part of the topology")
}

#[tokio::test]
async fn plain_transfer_moves_exactly_the_sent_amount() {
    let interchain = MockInterchain::new();
    let harness = harness(&interchain, "plain_transfer").await;
    let users = fund_users(&harness, "plain").await.expect("fund users");
    let channels = transfer_channels(&harness).await.expect("transfer channels");

    let persistence = harness.network(PERSISTENCE_CHAIN_ID).expect("persistence");
    let gaia = harness.network(GAIA_CHAIN_ID).expect("gaia");
    let atom = channels.atom_on_persistence();

    let expectation = BalanceExpectation::new()
        .exact(gaia, &users.gaia.address, GAIA_DENOM, 9_999_000)
        .delta(gaia, &users.gaia.address, GAIA_DENOM, -1_000)
        .exact(persistence, &users.persistence.address, &atom, TRANSFER_AMOUNT);
    let baseline = expectation.snapshot().await.expect("baseline");
    assert_eq!(
        baseline.get(GAIA_CHAIN_ID, &users.gaia.address, GAIA_DENOM),
        Some(GENESIS_WALLET_AMOUNT)
    );

    let receipt = harness
        .transfer(&atom_transfer(
            &users,
            &channels,
            &users.persistence.address,
            TRANSFER_AMOUNT,
        ))
        .await
        .expect("transfer is acknowledged");

    assert!(receipt.ack.is_success());
    assert_eq!(receipt.tracker.state(), &PacketState::Acknowledged(receipt.ack.clone()));
    assert_eq!(receipt.tx.packet.source_channel, channels.gaia.channel_id);
    assert_eq!(receipt.tx.packet.destination_channel, channels.persistence.channel_id);
    expectation.verify(&baseline).await.expect("balances after transfer");

    harness.environment().teardown().await;
}

#[tokio::test]
async fn voucher_sent_back_unescrows_the_native_token() {
    let interchain = MockInterchain::new();
    let harness = harness(&interchain, "voucher_round_trip").await;
    let users = fund_users(&harness, "round-trip").await.expect("fund users");
    let channels = transfer_channels(&harness).await.expect("transfer channels");
    let atom = channels.atom_on_persistence();

    harness
        .transfer(&atom_transfer(
            &users,
            &channels,
            &users.persistence.address,
            TRANSFER_AMOUNT,
        ))
        .await
        .expect("outbound transfer");

    let persistence = harness.network(PERSISTENCE_CHAIN_ID).expect("persistence");
    let gaia = harness.network(GAIA_CHAIN_ID).expect("gaia");
    let expectation = BalanceExpectation::new()
        .delta(persistence, &users.persistence.address, &atom, -400)
        .exact(persistence, &users.persistence.address, &atom, 600)
        .delta(gaia, &users.gaia.address, GAIA_DENOM, 400)
        .exact(gaia, &users.gaia.address, GAIA_DENOM, 9_999_400);
    let baseline = expectation.snapshot().await.expect("baseline");

    let back = TransferRequest::new(
        PERSISTENCE_CHAIN_ID,
        GAIA_CHAIN_ID,
        IBC_PATH,
        channels.persistence.channel_id.clone(),
        users.persistence.key_name.clone(),
        WalletAmount::new(&users.gaia.address, &atom, 400),
    );
    harness.transfer(&back).await.expect("return transfer");

    expectation.verify(&baseline).await.expect("balances after return");
    harness.environment().teardown().await;
}

#[tokio::test]
async fn flushing_an_idle_channel_is_a_noop() {
    let interchain = MockInterchain::new();
    let harness = harness(&interchain, "idle_flush").await;
    let users = fund_users(&harness, "idle").await.expect("fund users");
    let channels = transfer_channels(&harness).await.expect("transfer channels");

    let gaia = harness.network(GAIA_CHAIN_ID).expect("gaia");
    let expectation = BalanceExpectation::new().delta(gaia, &users.gaia.address, GAIA_DENOM, 0);
    let baseline = expectation.snapshot().await.expect("baseline");

    let relayer = harness.relayer();
    let flushes_before = interchain.relayer.flush_count();
    for channel in [&channels.gaia.channel_id, &channels.persistence.channel_id] {
        relayer.flush(IBC_PATH, channel).await.expect("first idle flush");
        relayer.flush(IBC_PATH, channel).await.expect("second idle flush");
    }

    expectation.verify(&baseline).await.expect("nothing moved");
    assert_eq!(interchain.relayer.flush_count(), flushes_before + 4);
    harness.environment().teardown().await;
}

#[tokio::test]
async fn expired_transfer_is_refunded_not_acknowledged() {
    let interchain = MockInterchain::new();
    let harness = harness(&interchain, "expired_transfer").await;
    let users = fund_users(&harness, "expired").await.expect("fund users");
    let channels = transfer_channels(&harness).await.expect("transfer channels");

    let gaia = harness.network(GAIA_CHAIN_ID).expect("gaia");
    let persistence = harness.network(PERSISTENCE_CHAIN_ID).expect("persistence");
    let expectation = BalanceExpectation::new()
        .exact(gaia, &users.gaia.address, GAIA_DENOM, GENESIS_WALLET_AMOUNT)
        .exact(persistence, &users.persistence.address, channels.atom_on_persistence(), 0);
    let baseline = expectation.snapshot().await.expect("baseline");

    let expired = atom_transfer(&users, &channels, &users.persistence.address, TRANSFER_AMOUNT)
        .with_timeout(IbcTimeout {
            height: 1,
            nanos: 0,
        });

    let tracker = harness
        .transfer_expecting_timeout(&expired)
        .await
        .expect("packet times out");
    assert_eq!(tracker.state(), &PacketState::TimedOut);
    expectation.verify(&baseline).await.expect("refunded");

    let err = harness
        .transfer(&expired)
        .await
        .expect_err("an expired packet is never acknowledged");
    assert!(
        matches!(err, HarnessError::Ack(AckError::PacketTimedOut { .. })),
        "unexpected error: {err}"
    );
    expectation.verify(&baseline).await.expect("refunded again");

    let env = Arc::clone(harness.environment());
    env.teardown().await;
    assert!(env.is_torn_down());
}
