//! ============================================================================
//! Core Types for the Minima Operator
//! ============================================================================
//! Defines the data structures for conversation turns, command outcomes, and
//! the normalized shapes of node responses. These types are serialized to
//! JSON for transport layers and for feeding results back into model turns.
//! ============================================================================

use serde::{Deserialize, Serialize};

/// One turn of a conversation, as sent to the language model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// How the command policy partitions a command string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Read-only or otherwise non-destructive; may run unattended.
    Safe,
    /// Irreversible or sensitive; must be confirmed by the user first.
    RequiresConfirmation,
    /// Not in any policy table; not actionable.
    Unknown,
}

/// Uniform result envelope produced by the executor. Mirrors the node's own
/// `{status, response|error}` wire envelope so results can be fed straight
/// back into a model turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn ok(response: serde_json::Value) -> Self {
        Self {
            status: true,
            response: Some(response),
            error: None,
        }
    }

    pub fn err(error: impl ToString) -> Self {
        Self {
            status: false,
            response: None,
            error: Some(error.to_string()),
        }
    }

    pub fn from_result(result: Result<serde_json::Value, OperatorError>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => Self::err(e),
        }
    }
}

/// A wallet balance entry with safe field naming.
///
/// The node reports a token's maximum issuable supply under the key `total`,
/// which is routinely mistaken for a spendable balance. That value is only
/// ever exposed here as `supply.total`; `sendable` is the primary display
/// field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedBalance {
    /// Token display name (a plain string, or an object for rich tokens).
    pub token: serde_json::Value,
    pub tokenid: String,
    /// Available to spend right now. PRIMARY BALANCE.
    pub sendable: String,
    /// Full wallet balance, including locked coins.
    pub confirmed: String,
    /// Pending incoming.
    pub unconfirmed: String,
    /// Number of UTXOs holding this token.
    pub coins: String,
    pub supply: Supply,
    /// Rich token metadata, present when requested with `tokendetails:true`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supply {
    /// Token max supply. NOT a balance.
    pub total: String,
}

/// Simple numeric balance summary for one token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub sendable: f64,
    pub confirmed: f64,
    pub unconfirmed: f64,
    pub coins: u64,
}

/// Node status with numeric fields parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub version: String,
    pub chain_height: u64,
    pub block: u64,
    pub devices: u64,
    pub mempool: u64,
    pub uptime: String,
    /// Full unmodified response.
    pub raw: serde_json::Value,
}

/// One entry from the node's token registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub tokenid: String,
    pub name: String,
    /// Token max supply. NOT a wallet balance.
    pub supply_total: String,
    pub decimals: u64,
    pub scale: u64,
}

/// A Maxima contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: u64,
    pub name: String,
    pub publickey: String,
    pub address: String,
    pub lastseen: String,
    pub samechain: bool,
}

/// The node's default receiving address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressInfo {
    pub address: String,
    pub miniaddress: String,
    pub publickey: String,
}

/// Maxima identity and contact details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaximaInfo {
    pub name: String,
    pub publickey: String,
    pub mls: String,
    pub p2pidentity: String,
    pub localidentity: String,
    pub contact: String,
}

/// Receipt for a send transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    pub txpowid: String,
    pub explorer_url: String,
    pub block: String,
    pub date: String,
    pub raw: serde_json::Value,
}

/// Receipt for an on-chain data record (a zero-value self-send whose state
/// slots carry the payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnChainRecord {
    pub txpowid: String,
    pub explorer_url: String,
    pub data: String,
    pub label: String,
    pub port: u8,
    pub timestamp: String,
    pub block: String,
    pub date: String,
    pub raw: serde_json::Value,
}

/// Result of the node's local hash operation.
///
/// Hashing is local only: it returns no txpowid and writes nothing to the
/// chain. Use `record_onchain` for an on-chain record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashResult {
    pub input: String,
    pub data: String,
    #[serde(rename = "type")]
    pub hash_type: String,
    pub hash: String,
}

/// A 256-bit random value in its raw, hashed, and human-readable encodings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomValue {
    pub random: String,
    pub hashed: String,
    pub keycode: String,
}

/// Error taxonomy for the operator. Every externally visible failure mode is
/// a distinct category even though the user-facing text is uniform.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OperatorError {
    /// Node unreachable after exhausting retries.
    #[error("node not reachable at {url} after {attempts} attempts: {last}")]
    Connection {
        url: String,
        attempts: u32,
        last: String,
    },

    /// The node received the command and rejected it. Never retried: the
    /// command may be irreversible and resending it is unsafe.
    #[error("node rejected command: {0}")]
    Application(String),

    /// Missing or malformed required parameter, caught before any network
    /// call.
    #[error("invalid command: {0}")]
    Validation(String),

    /// Unrecognized base verb; nothing was executed.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Local helper process exceeded its deadline and was killed.
    #[error("helper script timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Local helper process exited non-zero.
    #[error("helper script failed (exit {code:?}): {stderr}")]
    Script { code: Option<i32>, stderr: String },

    /// Language-model provider failure.
    #[error("provider error: {0}")]
    Provider(String),
}
