//! ============================================================================
//! Node Client - Minima RPC over HTTP
//! ============================================================================
//! Issues text commands to a Minima node, retries on connectivity failure
//! with linear backoff, and normalizes domain responses into stable shapes:
//! - balance: the raw `total` field (token max supply) is moved to
//!   `supply.total` so it can never be mistaken for a spendable balance
//! - status: numeric fields parsed from the node's string encoding
//! - send / record_onchain: receipts carrying the txpowid and explorer link
//! ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::types::{
    AddressInfo, BalanceSummary, Contact, HashResult, MaximaInfo, NodeStatus, NormalizedBalance,
    OnChainRecord, OperatorError, RandomValue, SendReceipt, Supply, TokenInfo,
};

/// Block explorer transaction page, keyed by txpowid.
const EXPLORER_TX_URL: &str = "https://explorer.minima.global/transactions/";

/// Everything except unreserved URL characters is percent-encoded, so the
/// full command string rides as a single path segment.
const COMMAND_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

/// Node connection settings.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Base URL of the node's RPC endpoint.
    pub base_url: String,
    /// Maximum command attempts on connectivity failure.
    pub retries: u32,
    /// Base backoff delay; attempt n waits `retry_delay * n`.
    pub retry_delay: Duration,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9005".to_string(),
            retries: 3,
            retry_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

/// The node's uniform response wrapper.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Options for a send transaction.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Token ID; omitted means native Minima.
    pub tokenid: Option<String>,
    /// Split the sent amount into N output coins (1-10).
    pub split: Option<u32>,
    /// Burn amount as a priority fee.
    pub burn: Option<String>,
}

/// Options for recording data on-chain.
#[derive(Debug, Clone)]
pub struct RecordOptions {
    /// Optional description stored in the slot after the payload.
    pub label: Option<String>,
    /// State slot for the payload (0-254; 255 is reserved for the
    /// timestamp).
    pub port: u8,
    pub burn: Option<String>,
    /// Additional state entries; these override any auto-generated slot,
    /// including 255.
    pub extra_state: Vec<(String, String)>,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            label: None,
            port: 0,
            burn: None,
            extra_state: Vec::new(),
        }
    }
}

/// HTTP client for Minima RPC with retries and normalized responses.
pub struct MinimaClient {
    client: reqwest::Client,
    config: NodeConfig,
}

impl MinimaClient {
    pub fn new(config: NodeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Execute a raw RPC command and return the envelope's `response`
    /// payload.
    ///
    /// Connectivity failures are retried up to the configured count with
    /// linear backoff (`retry_delay * attempt`); exhaustion yields
    /// [`OperatorError::Connection`]. A response with `status:false` yields
    /// [`OperatorError::Application`] and is never retried: the node
    /// received the command, and resending a possibly-irreversible
    /// operation is unsafe.
    pub async fn command(&self, cmd: &str) -> Result<Value, OperatorError> {
        let encoded = utf8_percent_encode(cmd, COMMAND_SEGMENT).to_string();
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), encoded);
        debug!("RPC command: {}", cmd);

        let mut last_error = String::new();
        for attempt in 1..=self.config.retries {
            match self.attempt(&url).await {
                Ok(text) => return decode_envelope(&text),
                Err(e) => {
                    last_error = e;
                    warn!(
                        "Node attempt {}/{} failed: {}",
                        attempt, self.config.retries, last_error
                    );
                    // Backoff runs after every failed attempt, the last
                    // included: exhaustion surfaces only after the full
                    // d + 2d + 3d wait.
                    tokio::time::sleep(self.config.retry_delay * attempt).await;
                }
            }
        }

        Err(OperatorError::Connection {
            url: self.config.base_url.clone(),
            attempts: self.config.retries,
            last: last_error,
        })
    }

    /// One HTTP attempt. Any failure here is a connectivity failure.
    async fn attempt(&self, url: &str) -> Result<String, String> {
        let resp = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        resp.text().await.map_err(|e| e.to_string())
    }

    /// Get wallet balances with safe field naming. An optional tokenid
    /// filters the result; `token_details` requests rich token metadata.
    pub async fn balance(
        &self,
        tokenid: Option<&str>,
        token_details: bool,
    ) -> Result<Vec<NormalizedBalance>, OperatorError> {
        let cmd = if token_details {
            "balance tokendetails:true"
        } else {
            "balance"
        };
        let response = self.command(cmd).await?;
        let mut entries = normalize_balance(&response);
        if let Some(tokenid) = tokenid {
            entries.retain(|b| b.tokenid == tokenid);
        }
        Ok(entries)
    }

    /// Simple numeric balance summary for one token.
    pub async fn balance_summary(&self, tokenid: &str) -> Result<BalanceSummary, OperatorError> {
        let balances = self.balance(Some(tokenid), false).await?;
        Ok(match balances.first() {
            Some(b) => BalanceSummary {
                sendable: b.sendable.parse().unwrap_or(0.0),
                confirmed: b.confirmed.parse().unwrap_or(0.0),
                unconfirmed: b.unconfirmed.parse().unwrap_or(0.0),
                coins: b.coins.parse().unwrap_or(0),
            },
            None => BalanceSummary {
                sendable: 0.0,
                confirmed: 0.0,
                unconfirmed: 0.0,
                coins: 0,
            },
        })
    }

    /// Wallet NFT entries: tokens with `decimals: 0` (indivisible).
    pub async fn nfts(&self) -> Result<Vec<NormalizedBalance>, OperatorError> {
        let mut balances = self.balance(None, true).await?;
        balances.retain(|b| {
            b.details
                .as_ref()
                .and_then(|d| d.get("decimals"))
                .map(|d| safe_int(Some(d)) == 0)
                .unwrap_or(false)
        });
        Ok(balances)
    }

    /// Node status with numeric fields parsed.
    pub async fn status(&self) -> Result<NodeStatus, OperatorError> {
        let response = self.command("status").await?;
        Ok(normalize_status(&response))
    }

    /// All tokens known to this node. `supply_total` is a max supply, not a
    /// wallet balance.
    pub async fn tokens(&self) -> Result<Vec<TokenInfo>, OperatorError> {
        let response = self.command("tokens").await?;
        let entries = response.as_array().cloned().unwrap_or_default();
        Ok(entries.iter().map(normalize_token).collect())
    }

    /// The node's default receiving address.
    pub async fn getaddress(&self) -> Result<AddressInfo, OperatorError> {
        let response = self.command("getaddress").await?;
        Ok(AddressInfo {
            address: text_field(&response, "address"),
            miniaddress: text_field(&response, "miniaddress"),
            publickey: text_field(&response, "publickey"),
        })
    }

    /// Maxima identity and contact details.
    pub async fn maxima_info(&self) -> Result<MaximaInfo, OperatorError> {
        let response = self.command("maxima action:info").await?;
        Ok(MaximaInfo {
            name: text_field(&response, "name"),
            publickey: text_field(&response, "publickey"),
            mls: text_field(&response, "mls"),
            p2pidentity: text_field(&response, "p2pidentity"),
            localidentity: text_field(&response, "localidentity"),
            contact: text_field(&response, "contact"),
        })
    }

    /// Maxima contacts.
    pub async fn contacts(&self) -> Result<Vec<Contact>, OperatorError> {
        let response = self.command("maxcontacts action:list").await?;
        let entries = response.as_array().cloned().unwrap_or_default();
        Ok(entries.iter().map(normalize_contact).collect())
    }

    /// Send Minima or tokens to an address.
    pub async fn send(
        &self,
        address: &str,
        amount: &str,
        opts: &SendOptions,
    ) -> Result<SendReceipt, OperatorError> {
        let cmd = build_send_command(address, amount, opts)?;
        info!("Sending transaction: {}", cmd);
        let response = self.command(&cmd).await?;
        Ok(send_receipt(&response))
    }

    /// Post data to the blockchain permanently via a zero-value self-send.
    ///
    /// State layout: `port` = payload, `port+1` = label (when given and it
    /// does not collide with slot 255), `255` = auto-generated ISO-8601 UTC
    /// timestamp. `extra_state` entries override any of these.
    ///
    /// The returned txpowid is the on-chain proof, searchable on the
    /// explorer.
    pub async fn record_onchain(
        &self,
        data: &str,
        opts: &RecordOptions,
    ) -> Result<OnChainRecord, OperatorError> {
        let addr = self.getaddress().await?;
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let state = build_record_state(
            data,
            opts.label.as_deref().unwrap_or(""),
            opts.port,
            &opts.extra_state,
            &timestamp,
        )?;
        let state_json =
            serde_json::to_string(&state).map_err(|e| OperatorError::Validation(e.to_string()))?;

        let mut cmd = format!(
            "send address:{} amount:0.000000001 state:{}",
            addr.miniaddress, state_json
        );
        if let Some(burn) = &opts.burn {
            cmd.push_str(&format!(" burn:{}", burn));
        }

        info!("Recording on-chain at state port {}", opts.port);
        let response = self.command(&cmd).await?;
        let receipt = send_receipt(&response);
        Ok(OnChainRecord {
            txpowid: receipt.txpowid,
            explorer_url: receipt.explorer_url,
            data: data.to_string(),
            label: opts.label.clone().unwrap_or_default(),
            port: opts.port,
            timestamp,
            block: receipt.block,
            date: receipt.date,
            raw: receipt.raw,
        })
    }

    /// Hash data with the node's Keccak-256.
    ///
    /// Local only: no txpowid, nothing written to the chain. Use
    /// [`record_onchain`](Self::record_onchain) for an on-chain record.
    pub async fn hash(&self, data: &str) -> Result<HashResult, OperatorError> {
        let response = self.command(&format!("hash data:{}", data)).await?;
        Ok(HashResult {
            input: text_field(&response, "input"),
            data: text_field(&response, "data"),
            hash_type: text_field(&response, "type"),
            hash: text_field(&response, "hash"),
        })
    }

    /// Generate a 256-bit cryptographic random value.
    pub async fn random(&self) -> Result<RandomValue, OperatorError> {
        let response = self.command("random").await?;
        Ok(RandomValue {
            random: text_field(&response, "random"),
            hashed: text_field(&response, "hashed"),
            keycode: text_field(&response, "keycode"),
        })
    }
}

/// Decode a response body. An unparseable body or `status:false` is an
/// application-level failure, never retried: the node saw the command.
fn decode_envelope(text: &str) -> Result<Value, OperatorError> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| OperatorError::Application(format!("invalid response from node: {}", e)))?;
    if !envelope.status {
        return Err(OperatorError::Application(
            envelope.error.unwrap_or_else(|| "Unknown RPC error".to_string()),
        ));
    }
    Ok(envelope.response.unwrap_or(Value::Null))
}

/// Build a send command string, enforcing the split bound (1-10).
pub fn build_send_command(
    address: &str,
    amount: &str,
    opts: &SendOptions,
) -> Result<String, OperatorError> {
    if let Some(split) = opts.split {
        if !(1..=10).contains(&split) {
            return Err(OperatorError::Validation(format!(
                "split must be between 1 and 10, got {}",
                split
            )));
        }
    }

    let mut cmd = format!("send address:{} amount:{}", address, amount);
    if let Some(tokenid) = &opts.tokenid {
        cmd.push_str(&format!(" tokenid:{}", tokenid));
    }
    if let Some(split) = opts.split {
        cmd.push_str(&format!(" split:{}", split));
    }
    if let Some(burn) = &opts.burn {
        cmd.push_str(&format!(" burn:{}", burn));
    }
    Ok(cmd)
}

/// Build the state map for an on-chain record. The payload port is bounded
/// to 0-254; slot 255 carries the timestamp and is only overwritten by an
/// explicit `extra_state` entry. A label that would collide with slot 255 is
/// dropped rather than clobbering the timestamp.
pub fn build_record_state(
    data: &str,
    label: &str,
    port: u8,
    extra_state: &[(String, String)],
    timestamp: &str,
) -> Result<BTreeMap<String, String>, OperatorError> {
    if port > 254 {
        return Err(OperatorError::Validation(format!(
            "state port must be between 0 and 254, got {}",
            port
        )));
    }

    let mut state = BTreeMap::new();
    state.insert(port.to_string(), data.to_string());
    state.insert("255".to_string(), timestamp.to_string());
    if !label.is_empty() {
        if port < 254 {
            state.insert((port + 1).to_string(), label.to_string());
        } else {
            warn!("Label slot would collide with the timestamp slot, dropped");
        }
    }
    for (key, value) in extra_state {
        state.insert(key.clone(), value.clone());
    }
    Ok(state)
}

/// Normalize the `balance` response array.
pub fn normalize_balance(response: &Value) -> Vec<NormalizedBalance> {
    let entries = response.as_array().cloned().unwrap_or_default();
    entries
        .iter()
        .map(|entry| NormalizedBalance {
            token: entry.get("token").cloned().unwrap_or(Value::String(String::new())),
            tokenid: text_field(entry, "tokenid"),
            sendable: text_field_or(entry, "sendable", "0"),
            confirmed: text_field_or(entry, "confirmed", "0"),
            unconfirmed: text_field_or(entry, "unconfirmed", "0"),
            coins: text_field_or(entry, "coins", "0"),
            supply: Supply {
                total: text_field_or(entry, "total", "0"),
            },
            details: entry.get("details").cloned(),
        })
        .collect()
}

/// Normalize the `status` response.
pub fn normalize_status(response: &Value) -> NodeStatus {
    let chain = response.get("chain").cloned().unwrap_or(Value::Null);
    let txpow = response.get("txpow").cloned().unwrap_or(Value::Null);
    NodeStatus {
        version: text_field(response, "version"),
        chain_height: safe_int(response.get("length")),
        block: safe_int(chain.get("block")),
        devices: safe_int(response.get("devices")),
        mempool: safe_int(txpow.get("mempool")),
        uptime: text_field(response, "uptime"),
        raw: response.clone(),
    }
}

/// Normalize one `tokens` entry. The name lives under `name` here (not
/// `token` as in balance), and may be a rich object.
fn normalize_token(entry: &Value) -> TokenInfo {
    let name_field = entry.get("name").or_else(|| entry.get("token"));
    let name = match name_field {
        Some(Value::String(s)) => s.clone(),
        Some(obj) => obj
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| obj.to_string()),
        None => String::new(),
    };

    TokenInfo {
        tokenid: text_field(entry, "tokenid"),
        name,
        supply_total: text_field_or(entry, "total", "0"),
        decimals: safe_int(entry.get("decimals")),
        scale: safe_int(entry.get("scale")),
    }
}

/// Normalize one `maxcontacts` entry.
fn normalize_contact(entry: &Value) -> Contact {
    Contact {
        id: safe_int(entry.get("id")),
        name: entry
            .get("extradata")
            .map(|e| text_field(e, "name"))
            .unwrap_or_default(),
        publickey: text_field(entry, "publickey"),
        address: text_field(entry, "currentaddress"),
        lastseen: text_field(entry, "date"),
        samechain: entry
            .get("samechain")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    }
}

/// Build a send receipt from a transaction response.
fn send_receipt(response: &Value) -> SendReceipt {
    let txpowid = text_field(response, "txpowid");
    let header = response.get("header").cloned().unwrap_or(Value::Null);
    SendReceipt {
        explorer_url: format!("{}{}", EXPLORER_TX_URL, txpowid),
        txpowid,
        block: text_field(&header, "block"),
        date: text_field(&header, "date"),
        raw: response.clone(),
    }
}

/// String view of a field; numbers and bools are stringified, everything
/// else is empty.
fn text_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn text_field_or(value: &Value, key: &str, default: &str) -> String {
    let s = text_field(value, key);
    if s.is_empty() {
        default.to_string()
    } else {
        s
    }
}

/// Parse a string-or-number field to u64, 0 on failure.
pub(crate) fn safe_int(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}
