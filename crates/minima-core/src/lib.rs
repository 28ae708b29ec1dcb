//! ============================================================================
//! MINIMA-CORE: Command Policy & Execution Layer
//! ============================================================================
//! This crate handles all backend logic for the Minima operator:
//! - Command policy (safe / requires-confirmation / unknown) and the
//!   single-slot confirmation gate
//! - Retrying HTTP client for the node's RPC interface with response
//!   normalization
//! - Command executor dispatching verbs to the node or local helper scripts
//! - Conversation agent extracting `[EXECUTE: ...]` directives from model
//!   turns, with per-session state
//! ============================================================================

pub mod agent;
pub mod command;
pub mod executor;
pub mod node_client;
pub mod policy;
pub mod provider;
pub mod script;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use agent::MinimaAgent;
pub use executor::{CommandExecutor, CommandRunner};
pub use node_client::{MinimaClient, NodeConfig};
pub use policy::{classify, ConfirmationGate};
pub use provider::{ChatProvider, XaiProvider};
pub use script::ScriptRunner;
pub use session::SessionStore;
pub use types::{Classification, CommandOutcome, ConversationTurn, OperatorError};
