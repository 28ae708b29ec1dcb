// ============================================================================
// minima-chat — natural-language CLI for a Minima node
// ============================================================================
// Usage:
//   minima-chat chat                       Interactive chat session
//   minima-chat exec "balance"             Run one safe command directly
//   minima-chat classify "send ..."        Show how the policy classifies it
//
// Environment:
//   MINIMA_RPC_URL      Node RPC endpoint (default http://localhost:9005)
//   XAI_API_KEY         x.ai API key (required for chat)
//   XAI_MODEL           Chat model override
//   MINIMA_SCRIPT_DIR   Directory holding local identity helper scripts
// ============================================================================

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use minima_core::{
    classify, Classification, CommandExecutor, CommandRunner, MinimaAgent, MinimaClient,
    NodeConfig, ScriptRunner, XaiProvider,
};

/// Minima node chat operator
#[derive(Parser)]
#[command(name = "minima-chat", version, about = "Control a Minima node in plain English")]
struct Cli {
    /// Node RPC endpoint (overrides MINIMA_RPC_URL)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat session (`/reset` clears history, `exit` quits)
    Chat,

    /// Execute one command directly, bypassing the model. Safe commands only.
    Exec {
        /// The command string, e.g. "balance" or "maxima action:info"
        command: String,
    },

    /// Show how the command policy classifies a command string
    Classify {
        /// The command string to classify
        command: String,
    },
}

fn node_config(cli: &Cli) -> NodeConfig {
    let mut config = NodeConfig::default();
    if let Some(url) = cli
        .rpc_url
        .clone()
        .or_else(|| std::env::var("MINIMA_RPC_URL").ok())
    {
        config.base_url = url;
    }
    config
}

fn build_executor(cli: &Cli) -> CommandExecutor {
    let client = MinimaClient::new(node_config(cli));
    let script_dir =
        std::env::var("MINIMA_SCRIPT_DIR").unwrap_or_else(|_| "./scripts".to_string());
    CommandExecutor::new(client, ScriptRunner::new(script_dir))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Chat => cmd_chat(&cli).await,
        Commands::Exec { command } => cmd_exec(&cli, command).await,
        Commands::Classify { command } => cmd_classify(command),
    }
}

async fn cmd_chat(cli: &Cli) -> Result<()> {
    let api_key = std::env::var("XAI_API_KEY")
        .context("XAI_API_KEY is required for chat (set it in the environment or .env)")?;
    let provider = match std::env::var("XAI_MODEL") {
        Ok(model) => XaiProvider::with_model(api_key, model),
        Err(_) => XaiProvider::new(api_key),
    };

    let runner: Arc<dyn CommandRunner> = Arc::new(build_executor(cli));
    let mut agent = MinimaAgent::new(Arc::new(provider), runner);

    println!("Minima chat operator. Type `exit` to quit, `/reset` to clear history.");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                agent.reset();
                println!("History cleared.");
            }
            message => {
                let response = agent.chat(message).await;
                println!("{}\n", response);
            }
        }
    }

    Ok(())
}

/// Direct execution path. Only safe commands run here: anything needing
/// confirmation belongs in an interactive chat where the gate can ask.
async fn cmd_exec(cli: &Cli, command: &str) -> Result<()> {
    match classify(command) {
        Classification::Safe => {}
        Classification::RequiresConfirmation => {
            anyhow::bail!(
                "`{}` requires confirmation and cannot run via exec; use `minima-chat chat`",
                command
            );
        }
        Classification::Unknown => {
            anyhow::bail!("`{}` is not a recognized command", command);
        }
    }

    let executor = build_executor(cli);
    let outcome = executor.run(command).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.status {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_classify(command: &str) -> Result<()> {
    let label = match classify(command) {
        Classification::Safe => "safe",
        Classification::RequiresConfirmation => "requires_confirmation",
        Classification::Unknown => "unknown",
    };
    println!("{}", label);
    Ok(())
}
