//! Cosmos SDK chains running in docker containers.

mod genesis;
mod node;
pub(crate) mod query;

use std::{path::Path, time::Duration};

use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use interchain_testing_core::{
    adjust_timeout,
    chain::{
        ChainError, ChainSpec, ExecOutput, NetworkHandle, TransferOptions, TransferTx, TxMessage,
        TxResult, Wallet, WalletAmount,
    },
    ibc::PacketEvent,
};
use reqwest::Client as ReqwestClient;
use serde_json::Value;
use tokio::{
    sync::{Mutex, RwLock},
    time::{sleep, timeout},
};
use tracing::{debug, info, warn};

pub use genesis::{GenesisError, apply_overrides, set_path};
pub use node::{CosmosNode, KEYRING, NODE_HOME, P2P_PORT, RPC_PORT};
pub use query::TxResponse;

use crate::{docker::DockerNetwork, exec::CommandError};

const VALIDATOR_KEY: &str = "validator";
const FAUCET_KEY: &str = "faucet";
const VALIDATOR_STAKE: u128 = 5_000_000_000_000;
const GENESIS_ACCOUNT_FUNDS: u128 = 10_000_000_000_000;
const FAUCET_FUNDS: u128 = 100_000_000_000_000;
const RPC_READY_TIMEOUT: Duration = Duration::from_secs(90);
const RPC_POLL_INTERVAL: Duration = Duration::from_millis(500);
const TX_CONFIRM_ATTEMPTS: u32 = 30;
const TX_CONFIRM_INTERVAL: Duration = Duration::from_secs(1);

struct Running {
    nodes: Vec<CosmosNode>,
    rpc_host_port: u16,
}

/// A Cosmos SDK chain: validators and full nodes in containers on the test's
/// docker network.
pub struct CosmosChain {
    spec: ChainSpec,
    network: DockerNetwork,
    http: ReqwestClient,
    running: RwLock<Option<Running>>,
    tx_lock: Mutex<()>,
}

impl CosmosChain {
    #[must_use]
    pub fn new(spec: ChainSpec, network: DockerNetwork) -> Self {
        Self {
            spec,
            network,
            http: ReqwestClient::new(),
            running: RwLock::new(None),
            tx_lock: Mutex::new(()),
        }
    }

    fn not_running(&self) -> ChainError {
        ChainError::NotRunning {
            chain_id: self.spec.chain_id.clone(),
        }
    }

    fn command_error(&self, err: CommandError) -> ChainError {
        match err {
            CommandError::Failed {
                command, stderr, ..
            } => ChainError::Command {
                chain_id: self.spec.chain_id.clone(),
                command,
                stderr,
            },
            other => ChainError::other(&self.spec.chain_id, other),
        }
    }

    fn parse_error(&self, context: &str, reason: impl ToString) -> ChainError {
        ChainError::parse(&self.spec.chain_id, context, reason)
    }

    async fn primary(&self) -> Result<CosmosNode, ChainError> {
        self.running
            .read()
            .await
            .as_ref()
            .and_then(|running| running.nodes.first().cloned())
            .ok_or_else(|| self.not_running())
    }

    async fn rpc_url(&self, path: &str) -> Result<String, ChainError> {
        let port = self
            .running
            .read()
            .await
            .as_ref()
            .map(|running| running.rpc_host_port)
            .ok_or_else(|| self.not_running())?;
        Ok(format!("http://127.0.0.1:{port}{path}"))
    }

    async fn rpc_get(&self, path: &str) -> Result<String, ChainError> {
        let url = self.rpc_url(path).await?;
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ChainError::other(&self.spec.chain_id, e))?;
        if !response.status().is_success() {
            return Err(self.parse_error(path, format!("rpc returned {}", response.status())));
        }
        response
            .text()
            .await
            .map_err(|e| ChainError::other(&self.spec.chain_id, e))
    }

    fn genesis_command<'a>(&self, sub: &'a str) -> Vec<&'a str> {
        if self.spec.using_new_genesis_command {
            vec!["genesis", sub]
        } else {
            vec![sub]
        }
    }

    /// Launches containers, assembles genesis on the first validator, and
    /// starts every node with the others as persistent peers.
    async fn provision(&self) -> anyhow::Result<Running> {
        let spec = &self.spec;
        if spec.validators == 0 {
            return Err(anyhow!("{} needs at least one validator", spec.chain_id));
        }

        let nodes = try_join_all(
            (0..spec.node_count()).map(|index| CosmosNode::launch(spec, &self.network, index)),
        )
        .await
        .context("launching node containers")?;

        let outcome = self.assemble(&nodes).await;
        if let Err(err) = outcome {
            for node in &nodes {
                if let Err(remove_err) = node.remove().await {
                    warn!(container = node.host_name(), error = %remove_err, "failed to remove node");
                }
            }
            return Err(err);
        }

        let rpc_host_port = nodes[0]
            .container()
            .host_port(RPC_PORT)
            .await
            .context("resolving published rpc port")?;
        Ok(Running {
            nodes,
            rpc_host_port,
        })
    }

    async fn assemble(&self, nodes: &[CosmosNode]) -> anyhow::Result<()> {
        let spec = &self.spec;
        let chain_id = spec.chain_id.as_str();
        let primary = &nodes[0];

        for node in nodes {
            let moniker = format!("{chain_id}-{}", node.index);
            node.run(["init", moniker.as_str(), "--chain-id", chain_id])
                .await
                .with_context(|| format!("init on {}", node.host_name()))?;
            let config = format!("{NODE_HOME}/config/config.toml");
            let script = format!(
                "sed -i -e 's/^timeout_commit = .*/timeout_commit = \"1s\"/' \
                 -e 's/^timeout_propose = .*/timeout_propose = \"1s\"/' \
                 -e 's/^addr_book_strict = .*/addr_book_strict = false/' \
                 -e 's/^allow_duplicate_ip = .*/allow_duplicate_ip = true/' {config}"
            );
            node.container()
                .exec(&["sh".into(), "-c".into(), script], None)
                .await
                .context("tuning config.toml")?;
        }

        let stake = format!("{VALIDATOR_STAKE}{}", spec.denom);
        let account_funds = format!("{GENESIS_ACCOUNT_FUNDS}{}", spec.denom);
        for node in nodes.iter().filter(|n| n.validator) {
            let address = add_key(node, VALIDATOR_KEY).await?;
            let mut args = self.genesis_command("add-genesis-account");
            args.extend([address.as_str(), account_funds.as_str()]);
            node.run(args.clone())
                .await
                .context("adding validator account to its own genesis")?;
            if node.index != 0 {
                primary
                    .run(args)
                    .await
                    .context("adding validator account to the shared genesis")?;
            }

            let mut gentx = self.genesis_command("gentx");
            gentx.extend([VALIDATOR_KEY, stake.as_str(), "--chain-id", chain_id]);
            gentx.extend(KEYRING);
            node.run(gentx)
                .await
                .with_context(|| format!("gentx on {}", node.host_name()))?;

            if node.index != 0 {
                copy_gentxs(node, primary).await?;
            }
        }

        let faucet = add_key(primary, FAUCET_KEY).await?;
        let faucet_funds = format!("{FAUCET_FUNDS}{}", spec.denom);
        let mut args = self.genesis_command("add-genesis-account");
        args.extend([faucet.as_str(), faucet_funds.as_str()]);
        primary.run(args).await.context("funding faucet")?;

        primary
            .run(self.genesis_command("collect-gentxs"))
            .await
            .context("collect-gentxs")?;

        let raw = primary
            .container()
            .read_file(&primary.genesis_path())
            .await
            .context("reading genesis")?;
        let mut genesis: Value = serde_json::from_str(&raw).context("parsing genesis")?;
        apply_overrides(&mut genesis, &spec.genesis_overrides).context("genesis overrides")?;
        let genesis = serde_json::to_vec_pretty(&genesis).context("encoding genesis")?;
        for node in nodes {
            node.container()
                .write_file(&node.genesis_path(), &genesis)
                .await
                .with_context(|| format!("writing genesis to {}", node.host_name()))?;
        }

        let ids = try_join_all(nodes.iter().map(|node| async move {
            node.run(["tendermint", "show-node-id"])
                .await
                .map(|out| format!("{}@{}:{P2P_PORT}", out.stdout.trim(), node.host_name()))
        }))
        .await
        .context("reading node ids")?;

        for node in nodes {
            let peers: Vec<&str> = ids
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != node.index)
                .map(|(_, id)| id.as_str())
                .collect();
            let mut args = vec![
                "start".to_owned(),
                "--rpc.laddr".to_owned(),
                format!("tcp://0.0.0.0:{RPC_PORT}"),
                "--minimum-gas-prices".to_owned(),
                spec.gas_prices.clone(),
            ];
            if !peers.is_empty() {
                args.push("--p2p.persistent_peers".to_owned());
                args.push(peers.join(","));
            }
            let start = node.command(args);
            let script = format!("{} > {NODE_HOME}/node.log 2>&1", start.join(" "));
            node.container()
                .exec_detached(&["sh".into(), "-c".into(), script])
                .await
                .with_context(|| format!("starting {}", node.host_name()))?;
        }

        info!(chain_id, nodes = nodes.len(), "nodes started");
        Ok(())
    }

    async fn wait_for_rpc(&self) -> Result<(), ChainError> {
        let limit = adjust_timeout(RPC_READY_TIMEOUT);
        let url = self.rpc_url("/status").await?;
        let probe = async {
            loop {
                let ready = self
                    .http
                    .get(&url)
                    .send()
                    .await
                    .map(|response| response.status().is_success())
                    .unwrap_or(false);
                if ready {
                    return;
                }
                sleep(RPC_POLL_INTERVAL).await;
            }
        };
        timeout(limit, probe).await.map_err(|_| ChainError::Command {
            chain_id: self.spec.chain_id.clone(),
            command: format!("GET {url}"),
            stderr: format!("rpc not reachable after {limit:?}"),
        })
    }

    fn tx_flags(&self, signer: &str) -> Vec<String> {
        let mut flags: Vec<String> = vec![
            "--from".into(),
            signer.into(),
            "--chain-id".into(),
            self.spec.chain_id.clone(),
            "--node".into(),
            format!("tcp://localhost:{RPC_PORT}"),
            "--gas".into(),
            "auto".into(),
            "--gas-adjustment".into(),
            self.spec.gas_adjustment.to_string(),
            "--gas-prices".into(),
            self.spec.gas_prices.clone(),
            "--output".into(),
            "json".into(),
            "-y".into(),
        ];
        flags.extend(KEYRING.map(str::to_owned));
        flags
    }

    /// Broadcasts `args` signed by `signer` and waits until the transaction
    /// is included in a block.
    async fn broadcast(&self, signer: &str, mut args: Vec<String>) -> Result<TxResponse, ChainError> {
        let node = self.primary().await?;
        args.extend(self.tx_flags(signer));

        let _guard = self.tx_lock.lock().await;
        let output = node.run(args).await.map_err(|e| self.command_error(e))?;
        let submitted = TxResponse::parse(&output.stdout).map_err(|e| self.parse_error("tx", e))?;
        if submitted.code != 0 {
            return Err(ChainError::TxFailed {
                chain_id: self.spec.chain_id.clone(),
                code: submitted.code,
                raw_log: submitted.raw_log,
            });
        }

        let included = self.confirm(&node, &submitted.txhash).await?;
        if included.code != 0 {
            return Err(ChainError::TxFailed {
                chain_id: self.spec.chain_id.clone(),
                code: included.code,
                raw_log: included.raw_log,
            });
        }
        debug!(chain_id = %self.spec.chain_id, tx = %included.txhash, height = included.height, "tx included");
        Ok(included)
    }

    async fn confirm(&self, node: &CosmosNode, hash: &str) -> Result<TxResponse, ChainError> {
        let node_flag = format!("tcp://localhost:{RPC_PORT}");
        for _ in 0..TX_CONFIRM_ATTEMPTS {
            sleep(TX_CONFIRM_INTERVAL).await;
            let queried = node
                .run(["q", "tx", hash, "--output", "json", "--node", node_flag.as_str()])
                .await;
            match queried {
                Ok(output) => {
                    return TxResponse::parse(&output.stdout)
                        .map_err(|e| self.parse_error("q tx", e));
                }
                Err(err) => debug!(chain_id = %self.spec.chain_id, tx = hash, error = %err, "tx not indexed yet"),
            }
        }
        Err(ChainError::Command {
            chain_id: self.spec.chain_id.clone(),
            command: format!("q tx {hash}"),
            stderr: format!("not included after {TX_CONFIRM_ATTEMPTS} attempts"),
        })
    }

    async fn key_address(&self, node: &CosmosNode, key_name: &str) -> Result<String, ChainError> {
        let mut args = vec!["keys", "show", key_name, "-a"];
        args.extend(KEYRING);
        node.run(args)
            .await
            .map(|output| output.stdout.trim().to_owned())
            .map_err(|e| self.command_error(e))
    }

    fn tx_result(tx: &TxResponse) -> TxResult {
        TxResult {
            height: tx.height,
            tx_hash: tx.txhash.clone(),
            code: tx.code,
            raw_log: tx.raw_log.clone(),
        }
    }
}

async fn add_key(node: &CosmosNode, name: &str) -> anyhow::Result<String> {
    let mut args = vec!["keys", "add", name, "--output", "json"];
    args.extend(KEYRING);
    let output = node
        .run(args)
        .await
        .with_context(|| format!("keys add {name} on {}", node.host_name()))?;
    query::key_address(&output.stdout, &output.stderr)
        .map(|(address, _)| address)
        .map_err(|reason| anyhow!(reason))
}

async fn copy_gentxs(from: &CosmosNode, to: &CosmosNode) -> anyhow::Result<()> {
    let dir = format!("{NODE_HOME}/config/gentx");
    let listing = from
        .container()
        .exec(&["ls".into(), dir.clone()], None)
        .await
        .context("listing gentxs")?;
    for file in listing.stdout.split_whitespace() {
        let path = format!("{dir}/{file}");
        let contents = from
            .container()
            .read_file(&path)
            .await
            .with_context(|| format!("reading {path}"))?;
        to.container()
            .exec(&["mkdir".into(), "-p".into(), dir.clone()], None)
            .await
            .context("creating gentx dir")?;
        to.container()
            .write_file(&path, contents.as_bytes())
            .await
            .with_context(|| format!("copying {path}"))?;
    }
    Ok(())
}

#[async_trait]
impl NetworkHandle for CosmosChain {
    fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    fn rpc_address(&self) -> String {
        self.running
            .try_read()
            .ok()
            .and_then(|running| {
                running
                    .as_ref()
                    .and_then(|r| r.nodes.first().map(CosmosNode::internal_rpc))
            })
            .unwrap_or_default()
    }

    async fn start(&self) -> Result<(), ChainError> {
        let mut running = self.running.write().await;
        if running.is_some() {
            return Ok(());
        }
        info!(chain_id = %self.spec.chain_id, validators = self.spec.validators, full_nodes = self.spec.full_nodes, "provisioning chain");
        let provisioned = self
            .provision()
            .await
            .map_err(|e| ChainError::other(&self.spec.chain_id, e))?;
        *running = Some(provisioned);
        drop(running);

        self.wait_for_rpc().await
    }

    async fn stop(&self) -> Result<(), ChainError> {
        let Some(running) = self.running.write().await.take() else {
            return Ok(());
        };
        let removals = running.nodes.iter().map(CosmosNode::remove);
        let outcome = join_all(removals).await;
        let mut first_error = None;
        for result in outcome {
            if let Err(err) = result {
                warn!(chain_id = %self.spec.chain_id, error = %err, "failed to remove node");
                first_error.get_or_insert(err);
            }
        }
        info!(chain_id = %self.spec.chain_id, "chain stopped");
        first_error.map_or(Ok(()), |err| Err(self.command_error(err)))
    }

    async fn height(&self) -> Result<u64, ChainError> {
        let raw = self.rpc_get("/status").await?;
        query::status_height(&raw).map_err(|e| self.parse_error("/status", e))
    }

    async fn balance(&self, address: &str, denom: &str) -> Result<u128, ChainError> {
        let node = self.primary().await?;
        let node_flag = format!("tcp://localhost:{RPC_PORT}");
        let output = node
            .run([
                "q",
                "bank",
                "balances",
                address,
                "--denom",
                denom,
                "--output",
                "json",
                "--node",
                node_flag.as_str(),
            ])
            .await
            .map_err(|e| self.command_error(e))?;
        query::balance(&output.stdout, denom).map_err(|e| self.parse_error("q bank balances", e))
    }

    async fn submit_transaction(
        &self,
        signer: &str,
        msg: TxMessage,
    ) -> Result<TxResult, ChainError> {
        let args: Vec<String> = match msg {
            TxMessage::BankSend { to, denom, amount } => {
                let from = self.key_address(&self.primary().await?, signer).await?;
                vec![
                    "tx".into(),
                    "bank".into(),
                    "send".into(),
                    from,
                    to,
                    format!("{amount}{denom}"),
                ]
            }
            TxMessage::WasmExecute {
                contract,
                msg,
                funds,
            } => {
                let mut args = vec![
                    "tx".into(),
                    "wasm".into(),
                    "execute".into(),
                    contract,
                    msg.to_string(),
                ];
                if let Some((amount, denom)) = funds {
                    args.push("--amount".into());
                    args.push(format!("{amount}{denom}"));
                }
                args
            }
            TxMessage::Module { module, args } => {
                let mut argv = vec!["tx".to_owned(), module];
                argv.extend(args);
                argv
            }
        };
        let tx = self.broadcast(signer, args).await?;
        Ok(Self::tx_result(&tx))
    }

    async fn send_ibc_transfer(
        &self,
        channel_id: &str,
        signer: &str,
        amount: &WalletAmount,
        options: &TransferOptions,
    ) -> Result<TransferTx, ChainError> {
        let mut args: Vec<String> = vec![
            "tx".into(),
            "ibc-transfer".into(),
            "transfer".into(),
            "transfer".into(),
            channel_id.into(),
            amount.address.clone(),
            amount.coin(),
        ];
        if let Some(memo) = options.memo.as_deref().filter(|m| !m.is_empty()) {
            args.push("--memo".into());
            args.push(memo.into());
        }
        if let Some(timeout) = options.timeout {
            if timeout.height > 0 {
                args.push("--packet-timeout-height".into());
                args.push(format!("0-{}", timeout.height));
            }
            if timeout.nanos > 0 {
                args.push("--packet-timeout-timestamp".into());
                args.push(timeout.nanos.to_string());
            }
            if timeout.height > 0 || timeout.nanos > 0 {
                args.push("--absolute-timeouts".into());
            }
        }

        let tx = self.broadcast(signer, args).await?;
        let packet = tx
            .sent_packet()
            .map_err(|e| self.parse_error("send_packet event", e))?;
        info!(chain_id = %self.spec.chain_id, %packet, "transfer submitted");
        Ok(TransferTx {
            height: tx.height,
            tx_hash: tx.txhash,
            gas_spent: tx.gas_used,
            packet,
        })
    }

    async fn store_code(&self, signer: &str, artifact: &Path) -> Result<u64, ChainError> {
        let node = self.primary().await?;
        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| self.parse_error("artifact", format!("{} has no file name", artifact.display())))?;
        let dest = format!("{NODE_HOME}/{file_name}");
        node.container()
            .copy_in(artifact, &dest)
            .await
            .map_err(|e| self.command_error(e))?;

        let tx = self
            .broadcast(signer, vec!["tx".into(), "wasm".into(), "store".into(), dest])
            .await?;
        tx.event_attribute("store_code", "code_id")
            .ok_or_else(|| self.parse_error("store_code event", "no code_id"))?
            .parse()
            .map_err(|e| self.parse_error("code_id", e))
    }

    async fn instantiate_contract(
        &self,
        signer: &str,
        code_id: u64,
        init: &Value,
        label: &str,
        no_admin: bool,
    ) -> Result<String, ChainError> {
        let mut args: Vec<String> = vec![
            "tx".into(),
            "wasm".into(),
            "instantiate".into(),
            code_id.to_string(),
            init.to_string(),
            "--label".into(),
            label.into(),
        ];
        if no_admin {
            args.push("--no-admin".into());
        } else {
            args.push("--admin".into());
            args.push(self.key_address(&self.primary().await?, signer).await?);
        }

        let tx = self.broadcast(signer, args).await?;
        let address = tx
            .event_attribute("instantiate", "_contract_address")
            .ok_or_else(|| self.parse_error("instantiate event", "no _contract_address"))?;
        info!(chain_id = %self.spec.chain_id, %address, code_id, "contract instantiated");
        Ok(address)
    }

    async fn query_contract(&self, address: &str, query: &Value) -> Result<Value, ChainError> {
        let node = self.primary().await?;
        let node_flag = format!("tcp://localhost:{RPC_PORT}");
        let output = node
            .run([
                "q".to_owned(),
                "wasm".to_owned(),
                "contract-state".to_owned(),
                "smart".to_owned(),
                address.to_owned(),
                query.to_string(),
                "--output".to_owned(),
                "json".to_owned(),
                "--node".to_owned(),
                node_flag,
            ])
            .await
            .map_err(|e| self.command_error(e))?;
        query::contract_response(&output.stdout)
            .map_err(|e| self.parse_error("contract-state smart", e))
    }

    async fn exec_cli(&self, argv: &[String]) -> Result<ExecOutput, ChainError> {
        let node = self.primary().await?;
        let output = node
            .container()
            .exec(argv, None)
            .await
            .map_err(|e| self.command_error(e))?;
        Ok(ExecOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn packet_events(&self, height: u64) -> Result<Vec<PacketEvent>, ChainError> {
        let raw = self.rpc_get(&format!("/block_results?height={height}")).await?;
        query::block_packet_events(&raw).map_err(|e| self.parse_error("/block_results", e))
    }

    async fn create_funded_wallet(
        &self,
        key_name: &str,
        amount: u128,
        mnemonic: Option<&str>,
    ) -> Result<Wallet, ChainError> {
        let node = self.primary().await?;
        let mut args = vec!["keys", "add", key_name, "--output", "json"];
        args.extend(KEYRING);
        let output = match mnemonic {
            Some(mnemonic) => {
                args.push("--recover");
                node.run_with_stdin(args, format!("{mnemonic}\n").as_bytes())
                    .await
            }
            None => node.run(args).await,
        }
        .map_err(|e| self.command_error(e))?;
        let (address, generated) = query::key_address(&output.stdout, &output.stderr)
            .map_err(|e| self.parse_error("keys add", e))?;

        self.broadcast(
            FAUCET_KEY,
            vec![
                "tx".into(),
                "bank".into(),
                "send".into(),
                self.key_address(&node, FAUCET_KEY).await?,
                address.clone(),
                format!("{amount}{}", self.spec.denom),
            ],
        )
        .await?;
        info!(chain_id = %self.spec.chain_id, key = key_name, %address, amount, "wallet funded");

        let wallet = Wallet::new(key_name, address);
        Ok(match mnemonic.map(str::to_owned).or(generated) {
            Some(m) => wallet.with_mnemonic(m),
            None => wallet,
        })
    }
}
