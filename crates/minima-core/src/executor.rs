//! ============================================================================
//! Command Executor - Verb Dispatch
//! ============================================================================
//! Maps a command string to one node client call or local helper invocation,
//! validating required parameters before anything touches the network.
//! Every failure folds into the uniform `CommandOutcome` envelope so that
//! results can be fed straight back into a model turn.
//! ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::command::parse;
use crate::node_client::{MinimaClient, RecordOptions, SendOptions};
use crate::policy;
use crate::script::ScriptRunner;
use crate::types::{CommandOutcome, OperatorError};

/// Seam between the orchestrator and command execution.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &str) -> CommandOutcome;
}

/// Dispatches classified commands to the node client or the local script
/// runner.
pub struct CommandExecutor {
    client: MinimaClient,
    scripts: ScriptRunner,
}

impl CommandExecutor {
    pub fn new(client: MinimaClient, scripts: ScriptRunner) -> Self {
        Self { client, scripts }
    }

    /// Execute one command, assuming the caller already applied the policy.
    pub async fn execute(&self, cmd: &str) -> Result<Value, OperatorError> {
        let parsed = parse(cmd);
        debug!("Executing command verb `{}`", parsed.verb);

        match parsed.verb.as_str() {
            "balance" => {
                let details = parsed
                    .get("tokendetails")
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false);
                let balances = self.client.balance(parsed.get("tokenid"), details).await?;
                to_value(&balances)
            }

            "status" => to_value(&self.client.status().await?),
            "tokens" => to_value(&self.client.tokens().await?),
            "getaddress" => to_value(&self.client.getaddress().await?),
            "random" => to_value(&self.client.random().await?),

            "hash" => {
                let data = require(&parsed, "hash", "data")?;
                to_value(&self.client.hash(data).await?)
            }

            "maxima" => match parsed.get("action") {
                Some("info") | None => to_value(&self.client.maxima_info().await?),
                Some(_) => self.client.command(cmd).await,
            },

            "maxcontacts" => match parsed.get("action") {
                Some("list") | None => to_value(&self.client.contacts().await?),
                Some(_) => self.client.command(cmd).await,
            },

            "send" => {
                let split = parse_bounded(&parsed, "split", 1, 10)?;
                // Multi-recipient form: the node parses the `multi:` JSON
                // list itself, so the command passes through as written.
                if parsed.has("multi") {
                    return self.client.command(cmd).await;
                }
                let address = require(&parsed, "send", "address")?;
                let amount = require(&parsed, "send", "amount")?;
                let opts = SendOptions {
                    tokenid: parsed.get("tokenid").map(str::to_string),
                    split,
                    burn: parsed.get("burn").map(str::to_string),
                };
                to_value(&self.client.send(address, amount, &opts).await?)
            }

            "record_onchain" => {
                let data = require(&parsed, "record_onchain", "data")?;
                let port = parse_bounded(&parsed, "port", 0, 254)?.unwrap_or(0);
                let opts = RecordOptions {
                    label: parsed.get("label").map(str::to_string),
                    port: port as u8,
                    burn: parsed.get("burn").map(str::to_string),
                    extra_state: Vec::new(),
                };
                to_value(&self.client.record_onchain(data, &opts).await?)
            }

            // Identity helpers run locally; they need key material the node
            // never sees.
            "mxid_info" => self.scripts.mxid_info().await,
            "get_maxima" => self.scripts.get_maxima().await,
            "mxid_challenge" => self.scripts.challenge().await,
            "mxid_sign" => {
                let data = require(&parsed, "mxid_sign", "data")?;
                self.scripts.sign(data).await
            }
            "mxid_verify" => {
                let data = require(&parsed, "mxid_verify", "data")?;
                let signature = require(&parsed, "mxid_verify", "signature")?;
                let publickey = require(&parsed, "mxid_verify", "publickey")?;
                self.scripts.verify(data, signature, publickey).await
            }

            // Remaining policy-known verbs pass through as raw commands.
            _ if policy::is_safe(cmd) || policy::requires_confirmation(cmd) => {
                self.client.command(cmd).await
            }

            verb => {
                warn!("Unknown command verb `{}`", verb);
                Err(OperatorError::UnknownCommand(verb.to_string()))
            }
        }
    }
}

#[async_trait]
impl CommandRunner for CommandExecutor {
    async fn run(&self, cmd: &str) -> CommandOutcome {
        CommandOutcome::from_result(self.execute(cmd).await)
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, OperatorError> {
    serde_json::to_value(value).map_err(|e| OperatorError::Validation(e.to_string()))
}

fn require<'a>(
    parsed: &'a crate::command::ParsedCommand,
    verb: &str,
    key: &str,
) -> Result<&'a str, OperatorError> {
    parsed
        .get(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OperatorError::Validation(format!("{} requires {}:<value>", verb, key)))
}

/// Parse an optional integer parameter, enforcing an inclusive range.
fn parse_bounded(
    parsed: &crate::command::ParsedCommand,
    key: &str,
    min: u32,
    max: u32,
) -> Result<Option<u32>, OperatorError> {
    let Some(raw) = parsed.get(key) else {
        return Ok(None);
    };
    let value: u32 = raw.parse().map_err(|_| {
        OperatorError::Validation(format!("{} must be an integer, got `{}`", key, raw))
    })?;
    if !(min..=max).contains(&value) {
        return Err(OperatorError::Validation(format!(
            "{} must be between {} and {}, got {}",
            key, min, max, value
        )));
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_client::NodeConfig;
    use std::time::Duration;

    /// An executor pointed at a dead address with no retries to speak of;
    /// validation must reject bad commands before any network call, so
    /// these tests never wait on the connection path.
    fn offline_executor() -> CommandExecutor {
        let config = NodeConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            retries: 1,
            retry_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
        };
        CommandExecutor::new(MinimaClient::new(config), ScriptRunner::new("/nonexistent"))
    }

    #[tokio::test]
    async fn test_send_requires_address_and_amount() {
        let executor = offline_executor();

        let err = executor.execute("send amount:10").await.unwrap_err();
        assert!(matches!(err, OperatorError::Validation(msg) if msg.contains("address")));

        let err = executor.execute("send address:MxABC").await.unwrap_err();
        assert!(matches!(err, OperatorError::Validation(msg) if msg.contains("amount")));
    }

    #[tokio::test]
    async fn test_multi_send_needs_no_address_or_amount() {
        // The multi form carries recipients in its JSON list; the only
        // failure left on a dead node is the connection itself.
        let executor = offline_executor();
        let err = executor
            .execute(r#"send multi:["MxA:10","MxB:5"] split:2"#)
            .await
            .unwrap_err();
        assert!(matches!(err, OperatorError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_multi_send_split_still_bounded() {
        let executor = offline_executor();
        let err = executor
            .execute(r#"send multi:["MxA:10"] split:20"#)
            .await
            .unwrap_err();
        assert!(matches!(err, OperatorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_send_split_out_of_range_rejected() {
        let executor = offline_executor();
        let err = executor
            .execute("send address:MxABC amount:10 split:20")
            .await
            .unwrap_err();
        assert!(matches!(err, OperatorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_record_onchain_requires_data() {
        let executor = offline_executor();
        let err = executor.execute("record_onchain label:x").await.unwrap_err();
        assert!(matches!(err, OperatorError::Validation(msg) if msg.contains("data")));
    }

    #[tokio::test]
    async fn test_record_onchain_port_bound() {
        let executor = offline_executor();
        let err = executor
            .execute("record_onchain data:0xCAFE port:255")
            .await
            .unwrap_err();
        assert!(matches!(err, OperatorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_hash_requires_data() {
        let executor = offline_executor();
        let err = executor.execute("hash").await.unwrap_err();
        assert!(matches!(err, OperatorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_verb_names_offender() {
        let executor = offline_executor();
        let err = executor.execute("frobnicate the node").await.unwrap_err();
        assert!(matches!(err, OperatorError::UnknownCommand(verb) if verb == "frobnicate"));
    }

    #[tokio::test]
    async fn test_unknown_verb_folds_into_outcome() {
        let executor = offline_executor();
        let outcome = executor.run("frobnicate").await;
        assert!(!outcome.status);
        assert!(outcome.error.unwrap().contains("frobnicate"));
    }

    #[tokio::test]
    async fn test_validation_happens_before_network() {
        // The client points at a dead port; an instant Validation error
        // proves no connection attempt was made.
        let executor = offline_executor();
        let started = std::time::Instant::now();
        let err = executor.execute("send address:MxABC").await.unwrap_err();
        assert!(matches!(err, OperatorError::Validation(_)));
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
