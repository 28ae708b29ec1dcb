//! ============================================================================
//! Command Policy & Confirmation Gate
//! ============================================================================
//! Enforces the safety policy for node commands:
//! - Read-only operations (status, balance, listings) run unattended
//! - Irreversible operations (send, vault, backup, on-chain records) must be
//!   explicitly confirmed by the user on the next turn
//! - Anything else is unknown and simply not actionable
//!
//! Classification is re-derived from the command string itself, never taken
//! from what the model claims about a directive.
//! ============================================================================

use tracing::{debug, warn};

use crate::command::{base_verb, parse};
use crate::types::Classification;

/// Verbs that may run without confirmation. Fixed, reviewed allow-list: a
/// verb missing here is never auto-run, whatever it does.
pub const SAFE_COMMANDS: &[&str] = &[
    "status",
    "balance",
    "block",
    "network",
    "coins",
    "keys",
    "getaddress",
    "history",
    "peers",
    "help",
    "txpow",
    "tokens",
    "hash",
    "random",
    "maxima",
    "maxcontacts",
    "mds",
    "mxid_info",
    "get_maxima",
    "mxid_challenge",
    "mxid_sign",
    "mxid_verify",
    "webhooks",
];

/// Verbs that are irreversible or sensitive and always require explicit
/// confirmation.
pub const REQUIRES_CONFIRMATION: &[&str] = &[
    "send",
    "vault",
    "backup",
    "record_onchain",
    "removewebhook",
];

/// Destructive sub-actions. Some verbs share a safe base (`maxcontacts`,
/// `mds`, `webhooks`) between read operations and destructive ones that are
/// disambiguated only by their `action:` parameter.
const DESTRUCTIVE_ACTIONS: &[&str] = &["remove", "clear", "install", "uninstall", "delete", "wipe"];

/// True iff the command requires explicit user confirmation.
///
/// Two checks, either being true is sufficient: the base verb is in the
/// confirm-list, or an allow-listed verb carries a destructive `action:`
/// parameter. The action check only applies to allow-listed verbs — it
/// exists to disambiguate them — so an unrecognized verb stays Unknown
/// whatever parameters it carries.
pub fn requires_confirmation(cmd: &str) -> bool {
    let verb = base_verb(cmd);
    if verb.is_empty() {
        return false;
    }
    if REQUIRES_CONFIRMATION.contains(&verb.as_str()) {
        return true;
    }

    if SAFE_COMMANDS.contains(&verb.as_str()) {
        let parsed = parse(cmd);
        if let Some(action) = parsed.get("action") {
            if DESTRUCTIVE_ACTIONS.contains(&action.to_lowercase().as_str()) {
                return true;
            }
        }
    }
    false
}

/// True iff the command may run without confirmation.
///
/// Mutually exclusive with [`requires_confirmation`]: an allow-listed verb
/// carrying a destructive `action:` parameter is not safe.
pub fn is_safe(cmd: &str) -> bool {
    let verb = base_verb(cmd);
    if verb.is_empty() || !SAFE_COMMANDS.contains(&verb.as_str()) {
        return false;
    }
    !requires_confirmation(cmd)
}

/// Classify a command string. Total over all inputs.
pub fn classify(cmd: &str) -> Classification {
    if requires_confirmation(cmd) {
        Classification::RequiresConfirmation
    } else if is_safe(cmd) {
        Classification::Safe
    } else {
        Classification::Unknown
    }
}

/// Exact affirmative tokens (post-trim, lower-cased). No fuzzy matching: a
/// message that merely mentions "yes" somewhere must not fire a send.
pub const CONFIRM_TOKENS: &[&str] = &["yes", "confirm", "ok", "proceed", "do it", "send it"];

/// Exact negative tokens.
pub const CANCEL_TOKENS: &[&str] = &["no", "cancel", "abort", "nevermind", "stop"];

/// How a pending confirmation resolved against a user turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Affirmed: execute exactly this command.
    Execute(String),
    /// Cancelled: do not execute this command.
    Cancelled(String),
    /// Any other reply: the pending command is forfeited and the turn is
    /// processed as a fresh message. Confirmation has exactly one chance.
    Forfeited(String),
}

/// Single-slot confirmation state machine.
///
/// Holds at most one pending command. Arming while a command is pending
/// silently replaces it (latest-wins, no queue).
#[derive(Debug, Default)]
pub struct ConfirmationGate {
    pending: Option<String>,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Arm the gate with a command awaiting confirmation.
    pub fn arm(&mut self, cmd: String) {
        if let Some(old) = &self.pending {
            warn!("Superseding pending confirmation `{}` with `{}`", old, cmd);
        }
        self.pending = Some(cmd);
    }

    /// Resolve the pending command against a user turn. The slot is cleared
    /// unconditionally, whatever the reply.
    ///
    /// Panics if nothing is pending; callers check [`is_pending`] first.
    pub fn resolve(&mut self, user_turn: &str) -> Resolution {
        let cmd = self
            .pending
            .take()
            .expect("resolve called with no pending confirmation");

        let reply = user_turn.trim().to_lowercase();
        if CONFIRM_TOKENS.contains(&reply.as_str()) {
            debug!("Confirmation accepted for `{}`", cmd);
            Resolution::Execute(cmd)
        } else if CANCEL_TOKENS.contains(&reply.as_str()) {
            debug!("Confirmation cancelled for `{}`", cmd);
            Resolution::Cancelled(cmd)
        } else {
            debug!("Ambiguous reply, forfeiting pending `{}`", cmd);
            Resolution::Forfeited(cmd)
        }
    }

    /// Force idle, dropping any stored command.
    pub fn clear(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_commands() {
        assert!(is_safe("status"));
        assert!(is_safe("balance"));
        assert!(is_safe("balance tokenid:0x00"));
        assert!(is_safe("maxima action:info"));
        assert!(is_safe("maxcontacts action:list"));
        assert!(is_safe("mds action:list"));
        assert!(is_safe("mxid_info"));
        assert!(is_safe("mxid_sign data:0xCAFE"));
    }

    #[test]
    fn test_confirmation_commands() {
        assert!(requires_confirmation("send address:MxABC amount:10"));
        assert!(requires_confirmation("vault"));
        assert!(requires_confirmation("backup"));
        assert!(requires_confirmation("record_onchain data:hello"));
        assert!(requires_confirmation("removewebhook hook:http://x"));
    }

    #[test]
    fn test_nested_destructive_actions() {
        // Safe base verbs turned destructive by their action parameter.
        assert!(requires_confirmation("maxcontacts action:remove id:3"));
        assert!(requires_confirmation("mds action:install file:dapp.zip"));
        assert!(requires_confirmation("mds action:uninstall uid:0x1"));
        assert!(requires_confirmation("webhooks action:clear"));
        // Case-insensitive action values.
        assert!(requires_confirmation("maxcontacts action:REMOVE id:3"));
        // The read versions stay safe.
        assert!(is_safe("maxcontacts action:list"));
        assert!(is_safe("webhooks action:list"));
    }

    #[test]
    fn test_mutual_exclusion() {
        let samples = [
            "status",
            "balance",
            "send address:Mx amount:1",
            "vault",
            "maxcontacts action:remove id:1",
            "maxcontacts action:list",
            "mds action:install file:x.zip",
            "frobnicate",
            "frobnicate action:remove",
            "",
            "SEND address:Mx amount:1",
        ];
        for cmd in samples {
            assert!(
                !(is_safe(cmd) && requires_confirmation(cmd)),
                "mutual exclusion violated for `{}`",
                cmd
            );
        }
    }

    #[test]
    fn test_unknown_commands() {
        assert_eq!(classify("frobnicate"), Classification::Unknown);
        assert_eq!(classify(""), Classification::Unknown);
        assert_eq!(classify("   "), Classification::Unknown);
        assert!(!is_safe("frobnicate"));
        assert!(!requires_confirmation("frobnicate"));
    }

    #[test]
    fn test_unrecognized_verb_with_destructive_action_stays_unknown() {
        // The action check disambiguates allow-listed verbs only; an
        // unknown verb must never become gate-armable through its
        // parameters.
        assert!(!requires_confirmation("frobnicate action:remove"));
        assert_eq!(
            classify("frobnicate action:remove"),
            Classification::Unknown
        );
        // Confirm-list and allow-list verbs are unaffected.
        assert!(requires_confirmation("send action:remove"));
        assert!(requires_confirmation("maxcontacts action:remove id:3"));
    }

    #[test]
    fn test_classify_case_insensitive_verb() {
        assert_eq!(classify("BALANCE"), Classification::Safe);
        assert_eq!(
            classify("Send address:Mx amount:1"),
            Classification::RequiresConfirmation
        );
    }

    #[test]
    fn test_gate_latest_wins() {
        let mut gate = ConfirmationGate::new();
        gate.arm("send address:MxA amount:1".into());
        gate.arm("send address:MxB amount:2".into());
        assert_eq!(gate.pending(), Some("send address:MxB amount:2"));
    }

    #[test]
    fn test_gate_affirm_executes_pending() {
        let mut gate = ConfirmationGate::new();
        gate.arm("send address:MxA amount:1".into());
        let resolution = gate.resolve("confirm");
        assert_eq!(
            resolution,
            Resolution::Execute("send address:MxA amount:1".into())
        );
        assert!(!gate.is_pending());
    }

    #[test]
    fn test_gate_affirm_tokens_trimmed_and_case_insensitive() {
        for token in ["YES", "  Confirm  ", "do it", "Send It"] {
            let mut gate = ConfirmationGate::new();
            gate.arm("vault".into());
            assert!(matches!(gate.resolve(token), Resolution::Execute(_)));
        }
    }

    #[test]
    fn test_gate_cancel_clears_without_executing() {
        let mut gate = ConfirmationGate::new();
        gate.arm("vault".into());
        assert_eq!(gate.resolve("cancel"), Resolution::Cancelled("vault".into()));
        assert!(!gate.is_pending());
    }

    #[test]
    fn test_gate_ambiguous_reply_forfeits() {
        let mut gate = ConfirmationGate::new();
        gate.arm("send address:MxA amount:1".into());
        assert!(matches!(
            gate.resolve("what's my balance?"),
            Resolution::Forfeited(_)
        ));
        assert!(!gate.is_pending());
    }

    #[test]
    fn test_gate_no_substring_matching() {
        // "yes please" is not an exact token and must not execute.
        let mut gate = ConfirmationGate::new();
        gate.arm("send address:MxA amount:1".into());
        assert!(matches!(gate.resolve("yes please"), Resolution::Forfeited(_)));
    }

    #[test]
    fn test_gate_clear() {
        let mut gate = ConfirmationGate::new();
        gate.arm("vault".into());
        gate.clear();
        assert!(!gate.is_pending());
    }
}
