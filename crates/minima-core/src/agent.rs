//! ============================================================================
//! Conversation Agent - Orchestrator
//! ============================================================================
//! Owns one conversation: history, the confirmation gate, and the turn loop.
//! Per user message it resolves any pending confirmation, otherwise runs one
//! model turn, extracts `[EXECUTE: ...]` directives, reclassifies each of
//! them through the command policy (never trusting what the model claims),
//! executes safe ones inline, arms the gate for confirmation-required ones,
//! and runs a second model turn to summarize executed results.
//!
//! Every failure folds into a `{status:false, error}` result fed back to the
//! model; the caller always receives a response.
//! ============================================================================

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::command::base_verb;
use crate::executor::CommandRunner;
use crate::policy::{classify, ConfirmationGate, Resolution};
use crate::provider::ChatProvider;
use crate::types::{Classification, CommandOutcome, ConversationTurn};

/// Fixed textual marker for model-emitted execution directives.
static DIRECTIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[EXECUTE:\s*([^\]]+)\]").expect("directive regex"));

/// Maximum stored conversation turns; oldest are dropped first.
const HISTORY_LIMIT: usize = 20;

/// System prompt documenting the command vocabulary, the confirmation
/// protocol, and the response-formatting rules.
pub const SYSTEM_PROMPT: &str = r#"You are an assistant that controls a Minima blockchain node. You translate natural language into node commands and explain the results in plain English.

## Running commands

When you need to run a command, emit it on its own line in exactly this format:
[EXECUTE: command_here]

Examples:
[EXECUTE: status]
[EXECUTE: balance]
[EXECUTE: maxima action:info]

## Command vocabulary

Safe (run automatically):
- `status` - node status and sync info
- `balance` - token balances
- `block` - current top block
- `network` - network status
- `coins` - list coins
- `keys` - wallet keys
- `getaddress` - default receiving address
- `history` - transaction history
- `peers` - connected peers
- `tokens` - tokens known to the node
- `hash data:<DATA>` - Keccak-256 hash (LOCAL only, returns no txpowid)
- `random` - 256-bit random value
- `maxima action:info` - Maxima identity
- `maxcontacts action:list` - list contacts
- `mds action:list` - list installed MiniDapps
- `mxid_info` / `get_maxima` - local identity card and Maxima address

Requires explicit confirmation (never auto-execute):
- `send address:<ADDR> amount:<AMT>` - send Minima
- `send address:<ADDR> amount:<AMT> tokenid:<ID>` - send tokens
- `send address:<ADDR> amount:<AMT> split:<N>` - split the sent amount into N coins (1-10)
- `send multi:["<ADDR>:<AMT>","<ADDR>:<AMT>"] split:<N>` - send to several addresses in one transaction
- `record_onchain data:<DATA>` - permanent on-chain record (zero-value self-send)
- `vault` - reveal seed phrase (VERY sensitive)
- `backup` - create a backup
- destructive actions like `maxcontacts action:remove` or `mds action:install`

When the user wants to send, DO NOT execute directly. Summarize the transaction (amount, destination, token, split count) and ask them to confirm. Execution happens only after they reply with an exact confirmation word.

## Interpreting results

For balance results, report per token: `sendable` (amount available to send - the headline figure), `confirmed` (full balance), `unconfirmed` (pending incoming), and `coins` (UTXO count).

IMPORTANT: `supply.total` is the token's MAXIMUM SUPPLY, not the user's balance. Never present any "total" figure as a balance. If all values are "0", say the wallet is empty.

`hash` is a local computation and proves nothing on-chain; only `record_onchain` returns a txpowid that can be looked up on the explorer.

## Security rules

- For send/vault/backup and destructive actions: always ask for confirmation first.
- When confirming a send, repeat the exact amount and address back to the user.
- Never reveal private keys unless vault was explicitly requested and confirmed."#;

/// Extract execution directives from model output, in order of appearance.
pub fn extract_directives(text: &str) -> Vec<String> {
    DIRECTIVE_RE
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .collect()
}

/// Agent that drives one conversation against the node.
pub struct MinimaAgent {
    provider: Arc<dyn ChatProvider>,
    runner: Arc<dyn CommandRunner>,
    history: Vec<ConversationTurn>,
    gate: ConfirmationGate,
    history_limit: usize,
}

impl MinimaAgent {
    pub fn new(provider: Arc<dyn ChatProvider>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            provider,
            runner,
            history: Vec::new(),
            gate: ConfirmationGate::new(),
            history_limit: HISTORY_LIMIT,
        }
    }

    /// Process one user message and return the response. Never fails: every
    /// provider, node, or executor error becomes explanatory text.
    pub async fn chat(&mut self, user_message: &str) -> String {
        // A pending confirmation is resolved against this turn before
        // anything else; affirm and cancel short-circuit the model call.
        if self.gate.is_pending() {
            match self.gate.resolve(user_message) {
                Resolution::Execute(cmd) => {
                    info!("Confirmed, executing `{}`", cmd);
                    let outcome = self.runner.run(&cmd).await;
                    let response = confirmed_execution_text(&outcome);
                    return self.close_exchange(user_message, response);
                }
                Resolution::Cancelled(cmd) => {
                    info!("Cancelled pending `{}`", cmd);
                    let response = "OK, cancelled. The command was not executed.".to_string();
                    return self.close_exchange(user_message, response);
                }
                Resolution::Forfeited(cmd) => {
                    debug!("Pending `{}` forfeited, processing as a fresh message", cmd);
                }
            }
        }

        // Normal processing starts from a clean slot.
        self.gate.clear();
        self.history.push(ConversationTurn::user(user_message));

        let reply = match self.provider.chat(&self.history, SYSTEM_PROMPT).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Provider call failed: {}", e);
                let response =
                    "Sorry, I could not reach the language model. Please try again.".to_string();
                self.history.push(ConversationTurn::assistant(response.as_str()));
                self.truncate_history();
                return response;
            }
        };

        // Reclassify every directive independently of what the model
        // intended; model-declared safety is never trusted.
        let mut executed: Vec<(String, CommandOutcome)> = Vec::new();
        let mut blocked: Option<String> = None;
        for cmd in extract_directives(&reply) {
            match classify(&cmd) {
                Classification::RequiresConfirmation => {
                    // Latest directive wins; earlier ones are superseded.
                    self.gate.arm(cmd.clone());
                    blocked = Some(cmd);
                }
                Classification::Safe => {
                    let outcome = self.runner.run(&cmd).await;
                    executed.push((cmd, outcome));
                }
                Classification::Unknown => {
                    debug!("Ignoring unknown directive `{}`", cmd);
                }
            }
        }

        let final_response = if !executed.is_empty() {
            self.summarize_executed(&reply, &executed).await
        } else if let Some(cmd) = blocked {
            confirmation_prompt(&cmd, &reply)
        } else {
            reply
        };

        self.history
            .push(ConversationTurn::assistant(final_response.as_str()));
        self.truncate_history();
        final_response
    }

    /// Feed executed results back for a second model turn that produces the
    /// user-facing summary.
    async fn summarize_executed(
        &mut self,
        model_reply: &str,
        executed: &[(String, CommandOutcome)],
    ) -> String {
        let mut note = String::from(
            "[SYSTEM: I executed the following commands. Provide a friendly summary of the \
             results. Remember: supply.total is a token's maximum supply, never the user's \
             balance - headline the sendable figure.]\n",
        );
        for (cmd, outcome) in executed {
            note.push_str(&format_command_result(cmd, outcome));
            note.push('\n');
        }

        self.history.push(ConversationTurn::assistant(model_reply));
        self.history.push(ConversationTurn::user(note));

        match self.provider.chat(&self.history, SYSTEM_PROMPT).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Summary call failed: {}", e);
                let mut fallback = String::from("I ran the following for you:\n");
                for (cmd, outcome) in executed {
                    fallback.push_str(&format_command_result(cmd, outcome));
                    fallback.push('\n');
                }
                fallback
            }
        }
    }

    /// Record a short-circuited exchange (confirmation resolution) and
    /// return its response.
    fn close_exchange(&mut self, user_message: &str, response: String) -> String {
        self.history.push(ConversationTurn::user(user_message));
        self.history.push(ConversationTurn::assistant(response.as_str()));
        self.truncate_history();
        response
    }

    fn truncate_history(&mut self) {
        if self.history.len() > self.history_limit {
            let excess = self.history.len() - self.history_limit;
            self.history.drain(0..excess);
        }
    }

    /// Clear conversation history and any pending confirmation.
    pub fn reset(&mut self) {
        self.history.clear();
        self.gate.clear();
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn pending_confirmation(&self) -> Option<&str> {
        self.gate.pending()
    }
}

/// Format one executed command and its outcome for the synthetic system
/// note.
fn format_command_result(cmd: &str, outcome: &CommandOutcome) -> String {
    let result = serde_json::to_string_pretty(outcome).unwrap_or_else(|_| "{}".to_string());
    format!("Command: {}\nResult: {}", cmd, result)
}

/// Response for an affirmed pending command.
fn confirmed_execution_text(outcome: &CommandOutcome) -> String {
    if outcome.status {
        let result = outcome
            .response
            .as_ref()
            .and_then(|r| serde_json::to_string_pretty(r).ok())
            .unwrap_or_default();
        format!("Done! Command executed successfully.\n\nResult: {}", result)
    } else {
        format!(
            "Command failed: {}",
            outcome.error.as_deref().unwrap_or("Unknown error")
        )
    }
}

/// Confirmation prompt naming the exact blocked command. The model's own
/// text is passed through when it already asks for confirmation and names
/// the command; otherwise a prompt is synthesized per verb.
fn confirmation_prompt(cmd: &str, model_reply: &str) -> String {
    let cleaned = DIRECTIVE_RE.replace_all(model_reply, "").trim().to_string();
    if cleaned.to_lowercase().contains("confirm") && cleaned.contains(cmd) {
        return cleaned;
    }

    match base_verb(cmd).as_str() {
        "send" => format!(
            "I understand you want to execute: `{}`\n\nThis transaction will move funds and \
             cannot be undone. Type **confirm** to proceed, or **cancel** to abort.",
            cmd
        ),
        "vault" => format!(
            "`{}` will reveal your seed phrase, which is highly sensitive. Type **confirm** \
             if you are sure, or **cancel** to abort.",
            cmd
        ),
        _ => format!(
            "This command (`{}`) requires confirmation. Type **confirm** to proceed or \
             **cancel** to abort.",
            cmd
        ),
    }
}
