//! `taskbridge` binary
//!
//! Thin caller over [`TaskBridge`]: one subcommand, one JSON document on
//! stdout. Logs go to stderr, filtered by `TASKBRIDGE_LOG`.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taskbridge::bridge::TaskBridge;
use taskbridge::cli::{ApiKeyAction, Args, Command, DepAction};
use taskbridge::core::{BridgeError, TaskId, TaskUpdate};
use taskbridge::fs::{BridgePaths, BridgeSettings};

const LOG_ENV: &str = "TASKBRIDGE_LOG";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let paths = match &args.base_dir {
        Some(dir) => BridgePaths::new(dir),
        None => BridgePaths::from_cwd()?,
    };
    let mut settings = paths.load_settings()?;
    settings.apply_env(|key| std::env::var(key).ok());
    if args.simulate {
        settings.force_simulation = true;
    }

    if let Command::Config { save } = args.command {
        return print_config(&paths, &settings, save);
    }

    if !settings.force_simulation {
        paths.ensure_scripts_dir()?;
    }

    let bridge = TaskBridge::open(&paths, &settings).await;
    let result = execute(&bridge, args.command).await;
    if bridge.is_degraded().await {
        info!("served by simulation");
    }
    bridge.shutdown().await;

    if let Err(err) = &result {
        if err.downcast_ref::<BridgeError>().is_some_and(BridgeError::is_transient) {
            warn!("scheduler did not answer cleanly; the command can be retried");
        }
    }

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn execute(bridge: &TaskBridge, command: Command) -> Result<Value> {
    let value = match command {
        Command::List => to_json(bridge.list_tasks().await?)?,
        Command::Show { id, refresh } => to_json(bridge.get_task(id, refresh).await?)?,
        Command::Add(add) => {
            let id = bridge.create_task(&add.into_new_task()?).await?;
            json!({ "id": id })
        }
        Command::Edit { id, changes } => {
            to_json(bridge.update_task(id, &changes.into_update()?).await?)?
        }
        Command::Enable { id } => set_enabled(bridge, id, true).await?,
        Command::Disable { id } => set_enabled(bridge, id, false).await?,
        Command::Remove { id } => {
            bridge.delete_task(id).await?;
            json!({ "removed": id })
        }
        Command::Run { id } => to_json(bridge.run_task(id).await?)?,
        Command::Dep { action } => match action {
            DepAction::Add { id, dependency } => {
                bridge.add_dependency(id, dependency).await?;
                json!({ "id": id, "added": dependency })
            }
            DepAction::Remove { id, dependency } => {
                bridge.remove_dependency(id, dependency).await?;
                json!({ "id": id, "removed": dependency })
            }
            DepAction::Policy { id, policy } => {
                let policy = policy.into();
                bridge.set_dependency_policy(id, policy).await?;
                json!({ "id": id, "policy": policy })
            }
        },
        Command::ApiKey { action } => match action {
            ApiKeyAction::Set { key } => {
                bridge.set_api_key(&key).await?;
                json!({ "saved": true })
            }
            ApiKeyAction::Show => to_json(bridge.get_api_key().await?)?,
        },
        Command::Generate { description } => to_json(bridge.ai_generate_task(&description).await?)?,
        Command::GenerateCommand { goal, metrics } => {
            json!({ "command": bridge.ai_generate_command(&goal, &metrics).await? })
        }
        Command::ToAi {
            id,
            prompt,
            metrics,
        } => {
            bridge.convert_to_ai(id, &prompt, &metrics).await?;
            json!({ "id": id, "converted": true })
        }
        Command::Script { id } => json!({ "id": id, "script": bridge.script_content(id).await? }),
        Command::Metrics => to_json(bridge.system_metrics())?,
        Command::Config { .. } => json!(null),
    };
    Ok(value)
}

async fn set_enabled(bridge: &TaskBridge, id: TaskId, enabled: bool) -> Result<Value> {
    let outcome = bridge
        .update_task(id, &TaskUpdate::enabled_only(enabled))
        .await?;
    Ok(json!({ "id": outcome.id(), "enabled": enabled }))
}

fn print_config(paths: &BridgePaths, settings: &BridgeSettings, save: bool) -> Result<()> {
    if save {
        paths.save_settings(settings)?;
        info!(path = %paths.settings_file().display(), "settings saved");
    }
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

fn to_json(value: impl Serialize) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
