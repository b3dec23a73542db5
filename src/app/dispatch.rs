use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::Config;
use crate::cli::{Cli, Commands, ObjectCommands};
use crate::core::outcome::OutcomeReport;
use crate::core::{ChatRequest, Orchestrator};
use crate::memory::{ShellWrite, SuccessPathWrite};
use crate::store::Store;

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let db_path = config.db_path();
    let store = Store::open(&db_path, config.storage.max_connections).await?;
    info!(db = %db_path.display(), "store opened");
    let orchestrator = Orchestrator::new(store, config);

    match cli.command {
        Commands::Chat {
            user,
            message,
            key,
            session,
            slots,
        } => {
            let mut req = ChatRequest::new(user, message, key);
            req.session_id = session;
            req.known_slots = slots.into_iter().collect();
            print_json(&orchestrator.handle_chat(&req).await?)
        }

        Commands::State { user } => print_json(&orchestrator.user_state(&user).await?),

        Commands::Objects { object_command } => match object_command {
            ObjectCommands::List {
                user,
                object_type,
                limit,
            } => print_json(&orchestrator.list_objects(&user, object_type, limit).await?),
            ObjectCommands::Shell { user } => print_json(&orchestrator.latest_shell(&user).await?),
            ObjectCommands::PutShell { user, json } => {
                let write: ShellWrite = parse_json("shell", &json)?;
                print_json(&orchestrator.put_shell(&user, write).await?)
            }
            ObjectCommands::PutSuccessPath { user, json } => {
                let write: SuccessPathWrite = parse_json("success path", &json)?;
                print_json(&orchestrator.put_success_path(&user, write).await?)
            }
        },

        Commands::Confirm {
            user,
            decision,
            token,
        } => print_json(&orchestrator.confirm_high_risk(decision, &user, &token).await?),

        Commands::Decision { user, decision } => {
            print_json(&orchestrator.decision(decision, &user).await?)
        }

        Commands::Outcome {
            user,
            decision,
            json,
        } => {
            let report: OutcomeReport = parse_json("outcome report", &json)?;
            print_json(&orchestrator.report_outcome(decision, &user, &report).await?)
        }
    }
}

fn parse_json<T: DeserializeOwned>(what: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).with_context(|| format!("invalid {what} JSON"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
