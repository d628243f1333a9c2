//! # Command Line Interface
//!
//! Operator commands for inspecting and updating provider credentials,
//! rotation state and usage metrics.

pub mod output;

use crate::config::{AppConfig, ReloadSettings};
use crate::observability::{init_logging, log_config_info};
use crate::secrets::{Provider, RotationStatePatch, VaultClient};
use anyhow::Context;
use clap::{Parser, Subcommand};
use output::OutputFormat;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "provider-vault")]
#[command(about = "Provider credential vault with encrypted local fallback")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the flat key view
    Keys {
        /// Print full credentials instead of masked ones
        #[arg(long)]
        reveal: bool,
    },

    /// Show the key currently selected for a provider
    Get {
        /// Provider name (groq or mistral)
        provider: Provider,

        /// Print the full credential
        #[arg(long)]
        reveal: bool,
    },

    /// Add or replace a provider credential
    Save {
        /// Provider name (groq or mistral)
        provider: Provider,

        /// Credential value
        key: String,

        /// Account id (Groq only)
        #[arg(long)]
        id: Option<String>,

        /// Daily request limit (Groq only)
        #[arg(long)]
        daily_limit: Option<u64>,
    },

    /// Show rotation state
    State,

    /// Patch rotation state
    UpdateState {
        #[arg(long)]
        active_key: Option<String>,

        #[arg(long)]
        failure_count: Option<u32>,

        #[arg(long)]
        rotation_index: Option<usize>,
    },

    /// Show usage metrics
    Metrics,

    /// Record one request made with a key
    RecordUsage {
        /// Account id the request used
        key_id: String,

        /// The request failed
        #[arg(long)]
        failed: bool,

        /// Error message for a failed request
        #[arg(long)]
        error: Option<String>,
    },

    /// Switch to the next available Groq account
    Rotate,

    /// Show daily quota and health per Groq account
    Quota,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Keep the credential cache refreshed until interrupted
    Watch {
        /// Refresh interval in milliseconds (defaults to VAULT_RELOAD_INTERVAL_MS)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    init_logging(&config.logging, cli.verbose)?;
    log_config_info(&config);

    if let Commands::Config { command: ConfigCommands::Show } = cli.command {
        return print_config(&config, cli.output);
    }

    let client = VaultClient::shared(config.client.clone()).context("Failed to create vault client")?;
    let result = run_command(&client, cli.command, cli.output).await;
    client.stop_auto_reload();
    result
}

/// Print the effective configuration. Table output for nested settings
/// reads best as YAML.
fn print_config(config: &AppConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => output::print_json(config),
        OutputFormat::Yaml | OutputFormat::Table => output::print_yaml(config),
    }
}

async fn run_command(
    client: &Arc<VaultClient>,
    command: Commands,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        Commands::Keys { reveal } => {
            let keys = client.get_keys().await;
            let keys = if reveal { keys } else { output::masked_keys(&keys) };
            output::print_with(&keys, format, output::print_keys_table)
        }
        Commands::Get { provider, reveal } => {
            let key = client
                .get_key(provider)
                .await
                .with_context(|| format!("No credential configured for {}", provider))?;
            let key = if reveal { key } else { output::mask_key(&key) };
            let data = json!({ "provider": provider, "key": &key });
            output::print_with(&data, format, |_| println!("{}: {}", provider, key))
        }
        Commands::Save { provider, key, id, daily_limit } => {
            let bundle = client.save_key(provider, &key, id.as_deref(), daily_limit).await?;
            let summary = json!({
                "provider": provider,
                "groqAccounts": bundle.groq.accounts.iter().map(|a| &a.id).collect::<Vec<_>>(),
                "mistralFallback": bundle.mistral.fallback.is_some(),
            });
            output::print_with(&summary, format, |_| {
                println!("Saved {} credential ({} Groq accounts)", provider, bundle.groq.accounts.len())
            })
        }
        Commands::State => {
            let state = client.load_state().await;
            output::print_with(&state, format, output::print_state_table)
        }
        Commands::UpdateState { active_key, failure_count, rotation_index } => {
            let patch = RotationStatePatch {
                active_key,
                failure_count,
                rotation_index,
                ..Default::default()
            };
            let state = client.update_rotation_state(patch).await?;
            output::print_with(&state, format, output::print_state_table)
        }
        Commands::Metrics => {
            let metrics = client.load_metrics().await;
            output::print_with(&metrics, format, output::print_metrics_table)
        }
        Commands::RecordUsage { key_id, failed, error } => {
            let health = client.record_usage(&key_id, !failed, error.as_deref()).await?;
            output::print_with(&health, format, |h| {
                println!("{}: {} ({} consecutive errors)", key_id, h.status, h.error_count)
            })
        }
        Commands::Rotate => {
            let rotated = client.rotate_key().await?;
            let data = json!({ "activeKey": &rotated });
            output::print_with(&data, format, |_| match &rotated {
                Some(id) => println!("Active Groq account: {}", id),
                None => println!("No Groq account available"),
            })
        }
        Commands::Quota => {
            let quota = client.quota_status().await;
            output::print_with(&quota, format, |q| output::print_quota_table(q))
        }
        Commands::Watch { interval_ms } => {
            let interval = match interval_ms {
                Some(ms) => ReloadSettings::with_interval_ms(ms)
                    .context("Invalid --interval-ms")?
                    .interval(),
                None => client.settings().reload.interval(),
            };

            let keys = client.refresh_keys_cache().await?;
            info!(populated = !keys.is_empty(), "Initial credential refresh complete");

            client.start_auto_reload(interval);
            tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
            client.stop_auto_reload();
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}
