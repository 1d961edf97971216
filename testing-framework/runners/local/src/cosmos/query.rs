//! Parsers for Cosmos SDK CLI and CometBFT RPC output.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use interchain_testing_core::ibc::{
    Acknowledgement, ChannelInfo, ConnectionInfo, Packet, PacketEvent,
};
use serde::Deserialize;
use serde_json::Value;

pub type ParseResult<T> = Result<T, String>;

fn parse_json(raw: &str) -> ParseResult<Value> {
    serde_json::from_str(raw.trim()).map_err(|e| format!("invalid json: {e}"))
}

fn as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// `latest_block_height` from a `/status` response, with or without the
/// JSON-RPC envelope.
pub fn status_height(raw: &str) -> ParseResult<u64> {
    let value = parse_json(raw)?;
    let body = value.get("result").unwrap_or(&value);
    body.pointer("/sync_info/latest_block_height")
        .and_then(as_u64)
        .ok_or_else(|| "status has no sync_info.latest_block_height".to_owned())
}

/// Balance from `q bank balances <addr> --denom <denom>`, accepting the
/// shapes different SDK versions print.
pub fn balance(raw: &str, denom: &str) -> ParseResult<u128> {
    let value = parse_json(raw)?;
    let amount = value
        .pointer("/balance/amount")
        .or_else(|| value.get("amount"))
        .cloned()
        .or_else(|| {
            value
                .get("balances")
                .and_then(Value::as_array)
                .and_then(|coins| coins.iter().find(|c| c["denom"] == denom))
                .map(|coin| coin["amount"].clone())
        });
    match amount {
        Some(Value::String(amount)) => amount
            .parse()
            .map_err(|e| format!("balance amount {amount:?}: {e}")),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| format!("balance amount {n} is not an integer")),
        _ => Ok(0),
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    /// Attribute value by key. Falls back to base64-encoded attributes, as
    /// emitted by older CometBFT RPC servers.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<String> {
        if let Some(attr) = self.attributes.iter().find(|a| a.key == key) {
            return Some(attr.value.clone());
        }
        let encoded = STANDARD.encode(key);
        self.attributes
            .iter()
            .find(|a| a.key == encoded)
            .and_then(|a| STANDARD.decode(&a.value).ok())
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    fn has_attribute(&self, key: &str) -> bool {
        self.attribute(key).is_some()
    }
}

/// The fields of a broadcast or queried transaction the runner relies on.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TxResponse {
    #[serde(default, deserialize_with = "string_or_number")]
    pub height: u64,
    pub txhash: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub raw_log: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub gas_used: u64,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl TxResponse {
    pub fn parse(raw: &str) -> ParseResult<Self> {
        // Some CLIs print a gas estimate line before the JSON body.
        let start = raw.find('{').ok_or("no json object in tx output")?;
        serde_json::from_str(&raw[start..]).map_err(|e| format!("invalid tx json: {e}"))
    }

    #[must_use]
    pub fn event_attribute(&self, kind: &str, key: &str) -> Option<String> {
        self.events
            .iter()
            .filter(|e| e.kind == kind)
            .find_map(|e| e.attribute(key))
    }

    pub fn sent_packet(&self) -> ParseResult<Packet> {
        let event = self
            .events
            .iter()
            .find(|e| e.kind == "send_packet")
            .ok_or("transaction emitted no send_packet event")?;
        packet_from_event(event)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(as_u64(&value).unwrap_or_default())
}

/// Rebuilds a packet from `send_packet`/`acknowledge_packet`/`timeout_packet`
/// event attributes.
pub fn packet_from_event(event: &Event) -> ParseResult<Packet> {
    let required = |key: &str| {
        event
            .attribute(key)
            .ok_or_else(|| format!("{} event has no {key}", event.kind))
    };
    let sequence = required("packet_sequence")?
        .parse()
        .map_err(|e| format!("packet_sequence: {e}"))?;
    let timeout_height = event
        .attribute("packet_timeout_height")
        .map(|h| timeout_height(&h))
        .transpose()?
        .unwrap_or_default();
    let timeout_timestamp = event
        .attribute("packet_timeout_timestamp")
        .map(|t| t.parse().map_err(|e| format!("packet_timeout_timestamp: {e}")))
        .transpose()?
        .unwrap_or_default();

    Ok(Packet {
        sequence,
        source_port: required("packet_src_port")?,
        source_channel: required("packet_src_channel")?,
        destination_port: required("packet_dst_port")?,
        destination_channel: required("packet_dst_channel")?,
        data: event
            .attribute("packet_data")
            .map(String::into_bytes)
            .unwrap_or_default(),
        timeout_height,
        timeout_timestamp,
    })
}

/// `revision-height` as printed by ibc-go, e.g. `0-1200`.
fn timeout_height(raw: &str) -> ParseResult<u64> {
    let height = raw.rsplit_once('-').map_or(raw, |(_, h)| h);
    height
        .parse()
        .map_err(|e| format!("packet_timeout_height {raw:?}: {e}"))
}

/// Packet acknowledgements and timeouts in a `/block_results` response.
///
/// ibc-go emits one `acknowledge_packet` event per message, followed by the
/// application's events for that packet. The outcome of each acknowledgement
/// is the first `fungible_token_packet` event carrying `success` or `error`
/// before the next packet event, or else the ack event's own `packet_ack`.
pub fn block_packet_events(raw: &str) -> ParseResult<Vec<PacketEvent>> {
    let value = parse_json(raw)?;
    let body = value.get("result").unwrap_or(&value);
    let txs = body
        .get("txs_results")
        .cloned()
        .filter(|v| !v.is_null())
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let txs: Vec<TxEvents> =
        serde_json::from_value(txs).map_err(|e| format!("invalid txs_results: {e}"))?;

    let mut found = Vec::new();
    for tx in txs {
        if tx.code != 0 {
            continue;
        }
        for (index, event) in tx.events.iter().enumerate() {
            match event.kind.as_str() {
                "acknowledge_packet" => {
                    let packet = packet_from_event(event)?;
                    let ack = ack_outcome(event, &tx.events[index + 1..])
                        .ok_or_else(|| format!("acknowledgement of {packet} has no outcome"))??;
                    found.push(PacketEvent::Acknowledged { packet, ack });
                }
                "timeout_packet" => found.push(PacketEvent::TimedOut {
                    packet: packet_from_event(event)?,
                }),
                _ => {}
            }
        }
    }
    Ok(found)
}

fn is_packet_event(event: &Event) -> bool {
    matches!(event.kind.as_str(), "acknowledge_packet" | "timeout_packet")
}

fn ack_outcome(ack_event: &Event, following: &[Event]) -> Option<ParseResult<Acknowledgement>> {
    let from_app = following
        .iter()
        .take_while(|e| !is_packet_event(e))
        .filter(|e| e.kind == "fungible_token_packet")
        .find_map(|e| {
            e.attribute("error")
                .map(Acknowledgement::Error)
                .or_else(|| e.has_attribute("success").then(Acknowledgement::success))
        });
    if let Some(ack) = from_app {
        return Some(Ok(ack));
    }
    ack_event
        .attribute("packet_ack")
        .map(|raw| Acknowledgement::from_json_bytes(raw.as_bytes()))
}

#[derive(Deserialize)]
struct TxEvents {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    events: Vec<Event>,
}

/// `keys add --output json`. Older SDKs print it on stderr.
pub fn key_address(stdout: &str, stderr: &str) -> ParseResult<(String, Option<String>)> {
    for raw in [stdout, stderr] {
        let Some(start) = raw.find('{') else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(&raw[start..]) {
            if let Some(address) = value.get("address").and_then(Value::as_str) {
                let mnemonic = value
                    .get("mnemonic")
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty())
                    .map(str::to_owned);
                return Ok((address.to_owned(), mnemonic));
            }
        }
    }
    Err("keys output has no address".to_owned())
}

/// `rly q channels` / `rly q connections` print one JSON object per line.
pub fn json_lines<T: for<'de> Deserialize<'de>>(raw: &str) -> ParseResult<Vec<T>> {
    raw.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .map(|line| serde_json::from_str(line).map_err(|e| format!("{e} in {line}")))
        .collect()
}

pub fn channels(raw: &str) -> ParseResult<Vec<ChannelInfo>> {
    json_lines(raw)
}

pub fn connections(raw: &str) -> ParseResult<Vec<ConnectionInfo>> {
    json_lines(raw)
}

/// `q wasm contract-state smart` wraps the contract's answer in `data`.
pub fn contract_response(raw: &str) -> ParseResult<Value> {
    let mut value = parse_json(raw)?;
    value
        .get_mut("data")
        .map(Value::take)
        .ok_or_else(|| "contract query response has no data".to_owned())
}
