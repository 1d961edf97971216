use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest as _, Sha256};
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use super::contract::{CodeFactory, Coin, ContractContext, MockContract};
use crate::{
    chain::{
        ChainError, ChainSpec, ExecOutput, IbcTimeout, NetworkHandle, TransferOptions, TransferTx,
        TxMessage, TxResult, Wallet, WalletAmount,
    },
    ibc::{
        Acknowledgement, ChannelInfo, ConnectionInfo, DenomTrace, FungibleTokenPacketData, Packet,
        PacketEvent,
    },
};

const DEFAULT_PACKET_TIMEOUT: Duration = Duration::from_secs(600);
const TRANSFER_GAS: u64 = 85_000;

/// Bank balances, outstanding packet commitments and denom traces: the part
/// of chain state a failed contract call rolls back.
#[derive(Clone, Default)]
pub(super) struct Ledger {
    balances: BTreeMap<(String, String), u128>,
    commitments: BTreeMap<(String, u64), Packet>,
    next_sequence: HashMap<String, u64>,
    pub(super) denom_traces: HashMap<String, DenomTrace>,
}

impl Ledger {
    pub(super) fn balance(&self, address: &str, denom: &str) -> u128 {
        self.balances
            .get(&(address.to_owned(), denom.to_owned()))
            .copied()
            .unwrap_or_default()
    }

    pub(super) fn mint(&mut self, to: &str, denom: &str, amount: u128) {
        *self
            .balances
            .entry((to.to_owned(), denom.to_owned()))
            .or_default() += amount;
    }

    pub(super) fn burn(&mut self, from: &str, denom: &str, amount: u128) -> Result<(), String> {
        let balance = self.balance(from, denom);
        if balance < amount {
            return Err(format!(
                "insufficient funds: {from} holds {balance}{denom}, needs {amount}{denom}"
            ));
        }
        self.balances
            .insert((from.to_owned(), denom.to_owned()), balance - amount);
        Ok(())
    }

    pub(super) fn transfer(
        &mut self,
        from: &str,
        to: &str,
        denom: &str,
        amount: u128,
    ) -> Result<(), String> {
        self.burn(from, denom, amount)?;
        self.mint(to, denom, amount);
        Ok(())
    }
}

/// Acknowledgement written on the receiving chain, waiting to be relayed back.
#[derive(Clone, Debug)]
pub(super) struct WrittenAck {
    pub(super) packet: Packet,
    pub(super) ack: Acknowledgement,
    /// The destination kept the transferred funds even though the ack is an
    /// error (a failed hook), so the source must not refund.
    pub(super) funds_retained: bool,
}

#[derive(Debug)]
pub(super) enum ReceiveError {
    TimedOut,
}

struct ContractInstance {
    admin: Option<String>,
    contract: Box<dyn MockContract>,
}

struct WasmHook {
    contract: String,
    msg: Value,
    recovery_address: Option<String>,
}

pub(super) struct ChainState {
    chain_id: String,
    prefix: String,
    running: bool,
    height: u64,
    pub(super) time_nanos: u64,
    keys: HashMap<String, String>,
    pub(super) ledger: Ledger,
    events: BTreeMap<u64, Vec<PacketEvent>>,
    receipts: HashSet<(String, u64)>,
    written_acks: BTreeMap<(String, u64), WrittenAck>,
    channels: Vec<ChannelInfo>,
    connections: Vec<ConnectionInfo>,
    clients: u64,
    contracts: HashMap<String, ContractInstance>,
    codes: Vec<String>,
    module_txs: Vec<(String, Vec<String>)>,
    txs: u64,
}

impl ChainState {
    fn new(spec: &ChainSpec) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        Self {
            chain_id: spec.chain_id.clone(),
            prefix: spec.bech32_prefix.clone(),
            running: false,
            height: 0,
            time_nanos: now,
            keys: HashMap::new(),
            ledger: Ledger::default(),
            events: BTreeMap::new(),
            receipts: HashSet::new(),
            written_acks: BTreeMap::new(),
            channels: Vec::new(),
            connections: Vec::new(),
            clients: 0,
            contracts: HashMap::new(),
            codes: Vec::new(),
            module_txs: Vec::new(),
            txs: 0,
        }
    }

    fn next_tx(&mut self) -> (u64, String) {
        self.txs += 1;
        let hash = Sha256::digest(format!("{}/tx/{}", self.chain_id, self.txs));
        (self.height + 1, hex::encode_upper(hash))
    }

    fn address_of(&self, key_name: &str) -> Result<String, ChainError> {
        self.keys
            .get(key_name)
            .cloned()
            .ok_or_else(|| ChainError::Command {
                chain_id: self.chain_id.clone(),
                command: "keys show".to_owned(),
                stderr: format!("{key_name} is not a valid name or address: key not found"),
            })
    }

    fn tx_failed(&self, raw_log: String) -> ChainError {
        ChainError::TxFailed {
            chain_id: self.chain_id.clone(),
            code: 1,
            raw_log,
        }
    }

    fn record_event(&mut self, event: PacketEvent) {
        self.events.entry(self.height + 1).or_default().push(event);
    }

    /// ICS-20 send: burns vouchers travelling back towards their origin,
    /// escrows everything else, and commits the packet.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn send_transfer(
        &mut self,
        channel_id: &str,
        sender: &str,
        receiver: &str,
        denom: &str,
        amount: u128,
        memo: &str,
        timeout: Option<IbcTimeout>,
    ) -> Result<Packet, String> {
        let channel = self
            .channels
            .iter()
            .find(|c| c.channel_id == channel_id)
            .cloned()
            .ok_or_else(|| format!("channel {channel_id} does not exist on {}", self.chain_id))?;
        if !channel.is_open() {
            return Err(format!("channel {channel_id} is not open"));
        }
        if amount == 0 {
            return Err("transfer amount must be positive".to_owned());
        }

        let trace = if denom.starts_with("ibc/") {
            self.ledger
                .denom_traces
                .get(denom)
                .cloned()
                .ok_or_else(|| format!("no denom trace for {denom}"))?
        } else {
            DenomTrace::native(denom)
        };

        if trace.unwind(&channel.port_id, channel_id).is_some() {
            self.ledger.burn(sender, denom, amount)?;
        } else {
            self.ledger
                .transfer(sender, &escrow_address(channel_id), denom, amount)?;
        }

        let (timeout_height, timeout_timestamp) = match timeout {
            Some(t) if t.height != 0 || t.nanos != 0 => (t.height, t.nanos),
            _ => (
                0,
                self.time_nanos + u64::try_from(DEFAULT_PACKET_TIMEOUT.as_nanos()).unwrap_or(0),
            ),
        };

        let next = self
            .ledger
            .next_sequence
            .entry(channel_id.to_owned())
            .or_insert(1);
        let sequence = *next;
        *next += 1;

        let data = FungibleTokenPacketData {
            denom: trace.full_path(),
            amount: amount.to_string(),
            sender: sender.to_owned(),
            receiver: receiver.to_owned(),
            memo: memo.to_owned(),
        };
        let packet = Packet {
            sequence,
            source_port: channel.port_id.clone(),
            source_channel: channel_id.to_owned(),
            destination_port: channel.counterparty.port_id.clone(),
            destination_channel: channel.counterparty.channel_id.clone(),
            data: data.to_bytes(),
            timeout_height,
            timeout_timestamp,
        };
        self.ledger
            .commitments
            .insert((channel_id.to_owned(), sequence), packet.clone());
        Ok(packet)
    }

    fn refund(&mut self, packet: &Packet) -> Result<(), String> {
        let data = FungibleTokenPacketData::from_bytes(&packet.data)?;
        let amount = data.amount()?;
        let trace = DenomTrace::parse(&data.denom);
        let local = trace.ibc_denom();
        if trace
            .unwind(&packet.source_port, &packet.source_channel)
            .is_some()
        {
            self.ledger.mint(&data.sender, &local, amount);
            Ok(())
        } else {
            self.ledger.transfer(
                &escrow_address(&packet.source_channel),
                &data.sender,
                &local,
                amount,
            )
        }
    }

    fn receive(&mut self, packet: &Packet) -> (Acknowledgement, bool) {
        let data = match FungibleTokenPacketData::from_bytes(&packet.data) {
            Ok(data) => data,
            Err(reason) => return (Acknowledgement::error(reason), false),
        };
        let amount = match data.amount() {
            Ok(amount) => amount,
            Err(reason) => return (Acknowledgement::error(reason), false),
        };
        let hook = match parse_wasm_hook(&data.memo) {
            Ok(hook) => hook,
            Err(reason) => return (Acknowledgement::error(reason), false),
        };
        if let Some(hook) = &hook {
            if hook.contract != data.receiver {
                return (
                    Acknowledgement::error("wasm hook contract must be the transfer receiver"),
                    false,
                );
            }
        }

        let local_denom = match self.credit(packet, &data, amount) {
            Ok(denom) => denom,
            Err(reason) => return (Acknowledgement::error(reason), false),
        };

        let Some(hook) = hook else {
            return (Acknowledgement::success(), false);
        };

        let sender = format!("ibc-hooks/{}/{}", packet.destination_channel, data.sender);
        let funds = vec![Coin::new(local_denom.clone(), amount)];
        match self.execute_contract(&hook.contract, &sender, &hook.msg, funds) {
            Ok(()) => (Acknowledgement::success(), false),
            Err(reason) => {
                if let Some(recovery) = &hook.recovery_address {
                    if let Err(err) =
                        self.ledger
                            .transfer(&hook.contract, recovery, &local_denom, amount)
                    {
                        warn!(chain_id = %self.chain_id, error = %err, "failed to move funds to recovery address");
                    }
                }
                (
                    Acknowledgement::error(format!("wasm hook execution failed: {reason}")),
                    true,
                )
            }
        }
    }

    /// Unescrows tokens returning home, mints vouchers for everything else.
    fn credit(
        &mut self,
        packet: &Packet,
        data: &FungibleTokenPacketData,
        amount: u128,
    ) -> Result<String, String> {
        let trace = DenomTrace::parse(&data.denom);
        if let Some(unwound) = trace.unwind(&packet.source_port, &packet.source_channel) {
            let local = unwound.ibc_denom();
            self.ledger.transfer(
                &escrow_address(&packet.destination_channel),
                &data.receiver,
                &local,
                amount,
            )?;
            return Ok(local);
        }

        let voucher = trace.prefixed(&packet.destination_port, &packet.destination_channel);
        let local = voucher.ibc_denom();
        self.ledger.denom_traces.insert(local.clone(), voucher);
        self.ledger.mint(&data.receiver, &local, amount);
        Ok(local)
    }

    fn execute_contract(
        &mut self,
        address: &str,
        sender: &str,
        msg: &Value,
        funds: Vec<Coin>,
    ) -> Result<(), String> {
        let mut instance = self
            .contracts
            .remove(address)
            .ok_or_else(|| format!("no contract at {address}"))?;
        let ledger = self.ledger.clone();
        let contract = instance.contract.clone_box();

        let result = {
            let mut ctx = ContractContext {
                state: self,
                address: address.to_owned(),
                sender: sender.to_owned(),
                funds,
                admin: instance.admin.clone(),
            };
            instance.contract.execute(&mut ctx, msg)
        };

        if result.is_err() {
            self.ledger = ledger;
            instance.contract = contract;
        }
        self.contracts.insert(address.to_owned(), instance);
        result
    }
}

fn escrow_address(channel_id: &str) -> String {
    format!("escrow/transfer/{channel_id}")
}

fn derive_address(prefix: &str, seed: &str, len: usize) -> String {
    let digest = hex::encode(Sha256::digest(seed.as_bytes()));
    format!("{prefix}1{}", &digest[..len.min(digest.len())])
}

/// `{"wasm":{"contract":..,"msg":{..}}}` memos. Anything else is a plain memo.
fn parse_wasm_hook(memo: &str) -> Result<Option<WasmHook>, String> {
    let Ok(Value::Object(memo)) = serde_json::from_str::<Value>(memo) else {
        return Ok(None);
    };
    let Some(wasm) = memo.get("wasm") else {
        return Ok(None);
    };
    let contract = wasm
        .get("contract")
        .and_then(Value::as_str)
        .ok_or("wasm hook memo has no contract")?
        .to_owned();
    let msg = wasm
        .get("msg")
        .filter(|msg| msg.is_object())
        .cloned()
        .ok_or("wasm hook memo has no msg object")?;
    let recovery_address = msg
        .as_object()
        .and_then(|m| m.values().next())
        .and_then(|inner| inner.get("recovery_address"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    Ok(Some(WasmHook {
        contract,
        msg,
        recovery_address,
    }))
}

fn lock(state: &Mutex<ChainState>) -> MutexGuard<'_, ChainState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory chain producing blocks on a timer while running.
pub struct MockNetwork {
    spec: ChainSpec,
    block_time: Duration,
    state: Arc<Mutex<ChainState>>,
    producer: Mutex<Option<JoinHandle<()>>>,
    code_factories: Mutex<HashMap<String, CodeFactory>>,
    fail_start: AtomicBool,
    stalled: Arc<AtomicBool>,
}

impl MockNetwork {
    #[must_use]
    pub fn new(spec: ChainSpec, block_time: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState::new(&spec))),
            spec,
            block_time,
            producer: Mutex::new(None),
            code_factories: Mutex::new(HashMap::new()),
            fail_start: AtomicBool::new(false),
            stalled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every later `start` fail.
    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Stops (or resumes) block production without stopping the network.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    /// Registers the contract `store_code` hands out for an artifact whose
    /// file name is `artifact`.
    pub fn register_code(&self, artifact: impl Into<String>, factory: CodeFactory) {
        self.code_factories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(artifact.into(), factory);
    }

    /// Module transactions accepted so far, in submission order.
    #[must_use]
    pub fn module_calls(&self) -> Vec<(String, Vec<String>)> {
        lock(&self.state).module_txs.clone()
    }

    fn running(&self) -> Result<MutexGuard<'_, ChainState>, ChainError> {
        let state = lock(&self.state);
        if state.running {
            Ok(state)
        } else {
            Err(ChainError::NotRunning {
                chain_id: self.spec.chain_id.clone(),
            })
        }
    }

    pub(super) fn allocate_client(&self) -> Result<String, ChainError> {
        let mut state = self.running()?;
        let id = format!("07-tendermint-{}", state.clients);
        state.clients += 1;
        Ok(id)
    }

    pub(super) fn next_connection_id(&self) -> Result<String, ChainError> {
        Ok(format!("connection-{}", self.running()?.connections.len()))
    }

    pub(super) fn next_channel_id(&self) -> Result<String, ChainError> {
        Ok(format!("channel-{}", self.running()?.channels.len()))
    }

    pub(super) fn add_connection(&self, connection: ConnectionInfo) -> Result<(), ChainError> {
        self.running()?.connections.push(connection);
        Ok(())
    }

    pub(super) fn add_channel(&self, channel: ChannelInfo) -> Result<(), ChainError> {
        self.running()?.channels.push(channel);
        Ok(())
    }

    pub(super) fn channel_list(&self) -> Result<Vec<ChannelInfo>, ChainError> {
        Ok(self.running()?.channels.clone())
    }

    pub(super) fn connection_list(&self) -> Result<Vec<ConnectionInfo>, ChainError> {
        Ok(self.running()?.connections.clone())
    }

    /// Committed, unresolved packets sent over `channel_id`, by sequence.
    pub(super) fn pending_packets(&self, channel_id: &str) -> Result<Vec<Packet>, ChainError> {
        Ok(self
            .running()?
            .ledger
            .commitments
            .iter()
            .filter(|((channel, _), _)| channel == channel_id)
            .map(|(_, packet)| packet.clone())
            .collect())
    }

    /// Delivers `packet`. Returns `false` if it had already been received.
    pub(super) fn receive_packet(
        &self,
        packet: &Packet,
    ) -> Result<Result<bool, ReceiveError>, ChainError> {
        let mut state = self.running()?;
        let key = (packet.destination_channel.clone(), packet.sequence);
        if state.receipts.contains(&key) {
            return Ok(Ok(false));
        }
        if packet.timed_out(state.height, state.time_nanos) {
            return Ok(Err(ReceiveError::TimedOut));
        }
        state.receipts.insert(key.clone());
        let (ack, funds_retained) = state.receive(packet);
        debug!(chain_id = %self.spec.chain_id, %packet, %ack, "packet received");
        state.written_acks.insert(
            key,
            WrittenAck {
                packet: packet.clone(),
                ack,
                funds_retained,
            },
        );
        Ok(Ok(true))
    }

    /// Removes and returns acknowledgements written for packets that arrived
    /// on `channel_id`.
    pub(super) fn take_written_acks(
        &self,
        channel_id: &str,
    ) -> Result<Vec<WrittenAck>, ChainError> {
        let mut state = self.running()?;
        let keys: Vec<_> = state
            .written_acks
            .keys()
            .filter(|(channel, _)| channel == channel_id)
            .cloned()
            .collect();
        Ok(keys
            .into_iter()
            .filter_map(|key| state.written_acks.remove(&key))
            .collect())
    }

    /// Resolves a commitment with its acknowledgement. Returns `false` if the
    /// packet was already resolved.
    pub(super) fn acknowledge_packet(&self, written: WrittenAck) -> Result<bool, ChainError> {
        let mut state = self.running()?;
        let packet = written.packet;
        let key = (packet.source_channel.clone(), packet.sequence);
        if state.ledger.commitments.remove(&key).is_none() {
            return Ok(false);
        }
        if !written.ack.is_success() && !written.funds_retained {
            if let Err(err) = state.refund(&packet) {
                warn!(chain_id = %self.spec.chain_id, error = %err, "refund failed");
            }
        }
        state.record_event(PacketEvent::Acknowledged {
            packet,
            ack: written.ack,
        });
        Ok(true)
    }

    pub(super) fn timeout_packet(&self, packet: &Packet) -> Result<bool, ChainError> {
        let mut state = self.running()?;
        let key = (packet.source_channel.clone(), packet.sequence);
        if state.ledger.commitments.remove(&key).is_none() {
            return Ok(false);
        }
        if let Err(err) = state.refund(packet) {
            warn!(chain_id = %self.spec.chain_id, error = %err, "refund failed");
        }
        state.record_event(PacketEvent::TimedOut {
            packet: packet.clone(),
        });
        Ok(true)
    }
}

#[async_trait]
impl NetworkHandle for MockNetwork {
    fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    fn rpc_address(&self) -> String {
        format!("mock://{}", self.spec.chain_id)
    }

    async fn start(&self) -> Result<(), ChainError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ChainError::Command {
                chain_id: self.spec.chain_id.clone(),
                command: "start".to_owned(),
                stderr: "injected start failure".to_owned(),
            });
        }

        {
            let mut state = lock(&self.state);
            if state.running {
                return Ok(());
            }
            state.running = true;
        }

        let state = Arc::clone(&self.state);
        let stalled = Arc::clone(&self.stalled);
        let block_time = self.block_time;
        let block_nanos = u64::try_from(block_time.as_nanos()).unwrap_or(u64::MAX);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(block_time);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if stalled.load(Ordering::SeqCst) {
                    continue;
                }
                let mut guard = lock(&state);
                guard.height += 1;
                guard.time_nanos += block_nanos;
            }
        });

        let previous = self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        info!(chain_id = %self.spec.chain_id, "mock network started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChainError> {
        lock(&self.state).running = false;
        if let Some(handle) = self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
            info!(chain_id = %self.spec.chain_id, "mock network stopped");
        }
        Ok(())
    }

    async fn height(&self) -> Result<u64, ChainError> {
        Ok(self.running()?.height)
    }

    async fn balance(&self, address: &str, denom: &str) -> Result<u128, ChainError> {
        Ok(self.running()?.ledger.balance(address, denom))
    }

    async fn submit_transaction(
        &self,
        signer: &str,
        msg: TxMessage,
    ) -> Result<TxResult, ChainError> {
        let mut state = self.running()?;
        let from = state.address_of(signer)?;

        match msg {
            TxMessage::BankSend { to, denom, amount } => {
                let outcome = state.ledger.transfer(&from, &to, &denom, amount);
                outcome.map_err(|e| state.tx_failed(e))?;
            }
            TxMessage::WasmExecute {
                contract,
                msg,
                funds,
            } => {
                let snapshot = state.ledger.clone();
                let mut coins = Vec::new();
                let outcome = match funds {
                    Some((amount, denom)) => {
                        coins.push(Coin::new(denom.clone(), amount));
                        state.ledger.transfer(&from, &contract, &denom, amount)
                    }
                    None => Ok(()),
                }
                .and_then(|()| state.execute_contract(&contract, &from, &msg, coins));
                if let Err(err) = outcome {
                    state.ledger = snapshot;
                    return Err(state.tx_failed(err));
                }
            }
            TxMessage::Module { module, args } => {
                debug!(chain_id = %self.spec.chain_id, %module, ?args, "module tx accepted");
                state.module_txs.push((module, args));
            }
        }

        let (height, tx_hash) = state.next_tx();
        Ok(TxResult {
            height,
            tx_hash,
            code: 0,
            raw_log: String::new(),
        })
    }

    async fn send_ibc_transfer(
        &self,
        channel_id: &str,
        signer: &str,
        amount: &WalletAmount,
        options: &TransferOptions,
    ) -> Result<TransferTx, ChainError> {
        let mut state = self.running()?;
        let sender = state.address_of(signer)?;
        let packet = state
            .send_transfer(
                channel_id,
                &sender,
                &amount.address,
                &amount.denom,
                amount.amount,
                options.memo.as_deref().unwrap_or_default(),
                options.timeout,
            )
            .map_err(|e| state.tx_failed(e))?;
        let (height, tx_hash) = state.next_tx();
        info!(chain_id = %self.spec.chain_id, %packet, "transfer submitted");
        Ok(TransferTx {
            height,
            tx_hash,
            gas_spent: TRANSFER_GAS,
            packet,
        })
    }

    async fn store_code(&self, signer: &str, artifact: &Path) -> Result<u64, ChainError> {
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let registered = self
            .code_factories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&name);
        if !registered {
            return Err(ChainError::Command {
                chain_id: self.spec.chain_id.clone(),
                command: format!("tx wasm store {}", artifact.display()),
                stderr: format!("no mock code registered for {name}"),
            });
        }

        let mut state = self.running()?;
        state.address_of(signer)?;
        state.codes.push(name);
        Ok(state.codes.len() as u64)
    }

    async fn instantiate_contract(
        &self,
        signer: &str,
        code_id: u64,
        init: &Value,
        label: &str,
        no_admin: bool,
    ) -> Result<String, ChainError> {
        let name = {
            let state = self.running()?;
            usize::try_from(code_id)
                .ok()
                .and_then(|id| id.checked_sub(1))
                .and_then(|idx| state.codes.get(idx).cloned())
                .ok_or_else(|| state.tx_failed(format!("code id {code_id} not found")))?
        };
        let factory = self
            .code_factories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned();

        let mut state = self.running()?;
        let factory = factory.ok_or_else(|| state.tx_failed(format!("code {name} unregistered")))?;
        let creator = state.address_of(signer)?;
        let address = derive_address(
            &state.prefix,
            &format!("{}/contract/{code_id}/{}/{label}", state.chain_id, state.contracts.len()),
            58,
        );
        let admin = (!no_admin).then(|| creator.clone());

        let mut contract = factory();
        let snapshot = state.ledger.clone();
        let outcome = {
            let mut ctx = ContractContext {
                state: &mut *state,
                address: address.clone(),
                sender: creator,
                funds: Vec::new(),
                admin: admin.clone(),
            };
            contract.instantiate(&mut ctx, init)
        };
        if let Err(err) = outcome {
            state.ledger = snapshot;
            return Err(state.tx_failed(err));
        }

        state
            .contracts
            .insert(address.clone(), ContractInstance { admin, contract });
        info!(chain_id = %self.spec.chain_id, %address, code_id, "contract instantiated");
        Ok(address)
    }

    async fn query_contract(&self, address: &str, query: &Value) -> Result<Value, ChainError> {
        let state = self.running()?;
        let instance = state
            .contracts
            .get(address)
            .ok_or_else(|| ChainError::Command {
                chain_id: self.spec.chain_id.clone(),
                command: "query wasm contract-state smart".to_owned(),
                stderr: format!("no contract at {address}"),
            })?;
        instance
            .contract
            .query(query)
            .map_err(|stderr| ChainError::Command {
                chain_id: self.spec.chain_id.clone(),
                command: "query wasm contract-state smart".to_owned(),
                stderr,
            })
    }

    async fn exec_cli(&self, _argv: &[String]) -> Result<ExecOutput, ChainError> {
        Err(ChainError::Unsupported {
            chain_id: self.spec.chain_id.clone(),
            operation: "exec_cli",
        })
    }

    async fn packet_events(&self, height: u64) -> Result<Vec<PacketEvent>, ChainError> {
        Ok(self
            .running()?
            .events
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_funded_wallet(
        &self,
        key_name: &str,
        amount: u128,
        mnemonic: Option<&str>,
    ) -> Result<Wallet, ChainError> {
        let mut state = self.running()?;
        if state.keys.contains_key(key_name) {
            return Err(ChainError::Command {
                chain_id: self.spec.chain_id.clone(),
                command: format!("keys add {key_name}"),
                stderr: "duplicated key name".to_owned(),
            });
        }
        let seed = mnemonic.unwrap_or(key_name);
        let address = derive_address(&state.prefix, &format!("{}/{seed}", state.chain_id), 38);
        state.keys.insert(key_name.to_owned(), address.clone());
        state.ledger.mint(&address, &self.spec.denom, amount);

        let wallet = Wallet::new(key_name, address);
        Ok(match mnemonic {
            Some(m) => wallet.with_mnemonic(m),
            None => wallet,
        })
    }
}

impl Drop for MockNetwork {
    fn drop(&mut self) {
        if let Some(handle) = self
            .producer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
