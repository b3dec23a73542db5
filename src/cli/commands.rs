use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::memory::ObjectType;

/// `continuity` - risk-gated decision support with confirmation and outcome feedback.
#[derive(Parser, Debug)]
#[command(name = "continuity")]
#[command(version)]
#[command(about = "Risk-gated decision support with confirmation and outcome feedback.", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one message through the decision pipeline
    Chat {
        /// User the message belongs to
        #[arg(short, long)]
        user: String,

        /// Message text
        #[arg(short, long)]
        message: String,

        /// Idempotency key; repeating it replays the stored response
        #[arg(short, long)]
        key: String,

        /// Conversation session to append to
        #[arg(long)]
        session: Option<Uuid>,

        /// Known slot value as name=value (repeatable)
        #[arg(long = "slot", value_parser = parse_slot)]
        slots: Vec<(String, String)>,
    },

    /// Show a user's resource state
    State {
        #[arg(short, long)]
        user: String,
    },

    /// Read and write memory objects
    Objects {
        #[command(subcommand)]
        object_command: ObjectCommands,
    },

    /// Confirm a gated high-risk decision with its one-time token
    Confirm {
        #[arg(short, long)]
        user: String,

        /// Decision id from the chat trace
        #[arg(short, long)]
        decision: i64,

        /// Token from the chat trace (shown once)
        #[arg(short, long)]
        token: String,
    },

    /// Show a stored decision record
    Decision {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        decision: i64,
    },

    /// Report the actual outcome of a decision
    Outcome {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        decision: i64,

        /// Outcome report as JSON, e.g. '{"actual_impact_vector":{"time":-0.2},"actual_cost":0.3}'
        #[arg(long)]
        json: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ObjectCommands {
    /// List objects, newest first
    List {
        #[arg(short, long)]
        user: String,

        /// Only this object type (shell, success_path)
        #[arg(long = "type")]
        object_type: Option<ObjectType>,

        /// Maximum rows (1-200)
        #[arg(long, default_value = "50")]
        limit: i64,
    },

    /// Show the current shell
    Shell {
        #[arg(short, long)]
        user: String,
    },

    /// Store a new shell from JSON
    PutShell {
        #[arg(short, long)]
        user: String,

        #[arg(long)]
        json: String,
    },

    /// Store a new success path from JSON
    PutSuccessPath {
        #[arg(short, long)]
        user: String,

        #[arg(long)]
        json: String,
    },
}

fn parse_slot(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("slot name must not be empty".into());
    }
    Ok((name.to_string(), value.trim().to_string()))
}
