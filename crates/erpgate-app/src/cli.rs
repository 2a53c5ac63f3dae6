//! Operator commands

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use erpgate_core::Params;
use serde_json::{Value, json};

use crate::bootstrap::Gateway;
use crate::settings::GatewaySettings;

#[derive(Parser, Debug)]
#[command(name = "erpgate")]
#[command(about = "Pooled connectors for SAP, Oracle, SQL Server and DIA", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(short, long, global = true, env = "ERPGATE_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter, overrides the configured one (e.g. "debug,erpgate_pool=trace")
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Start every configured pool and print its statistics
    Status,

    /// Run one operation on a pooled connector
    Exec {
        /// Pool name from the settings file
        #[arg(value_name = "POOL")]
        pool: String,

        /// Operation identifier (e.g. "scf_carikart_listele")
        #[arg(value_name = "OPERATION")]
        operation: String,

        /// Operation parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
    },

    /// Keep the pools open and log their statistics periodically
    Monitor {
        /// Seconds between reports
        #[arg(short, long, default_value_t = 30)]
        interval: u64,
    },
}

/// Parse `--params` into an operation parameter map
pub fn parse_params(raw: &str) -> Result<Params> {
    let value: Value = serde_json::from_str(raw).context("--params is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("--params must be a JSON object, got {}", other),
    }
}

pub async fn run(command: Command, settings: GatewaySettings) -> Result<()> {
    match command {
        Command::Status => status(&settings).await,
        Command::Exec {
            pool,
            operation,
            params,
        } => exec(settings, &pool, &operation, &params).await,
        Command::Monitor { interval } => monitor(&settings, interval).await,
    }
}

async fn status(settings: &GatewaySettings) -> Result<()> {
    let gateway = Gateway::start(settings).await;
    let stats = gateway.manager().get_all_stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    gateway.shutdown().await;
    Ok(())
}

async fn exec(settings: GatewaySettings, pool: &str, operation: &str, raw_params: &str) -> Result<()> {
    let params = parse_params(raw_params)?;
    anyhow::ensure!(
        settings.pools.contains_key(pool),
        "pool '{}' is not configured",
        pool
    );

    let gateway = Gateway::start(&settings.only_pool(pool)).await;
    let outcome = async {
        let mut connector = gateway.manager().get_connection(pool).await?;
        let result = connector.execute_with_retry(operation, &params).await?;
        Ok::<_, erpgate_core::ErpError>(json!({
            "result": result,
            "statistics": connector.statistics(),
        }))
    }
    .await;
    gateway.shutdown().await;

    let output = outcome.with_context(|| format!("{} on pool '{}' failed", operation, pool))?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn monitor(settings: &GatewaySettings, interval: u64) -> Result<()> {
    let gateway = Gateway::start(settings).await;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (name, stats) in gateway.manager().get_all_stats() {
                    tracing::info!(
                        pool = %name,
                        available = stats.available,
                        in_use = stats.in_use,
                        waiting = stats.waiting,
                        max = stats.max_connections,
                        utilization = stats.utilization(),
                        "pool status"
                    );
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "failed to listen for ctrl-c");
                }
                break;
            }
        }
    }

    gateway.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_exec() {
        let cli = Cli::try_parse_from([
            "erpgate",
            "--config",
            "/etc/erpgate/gateway.toml",
            "exec",
            "dia",
            "scf_carikart_listele",
            "--params",
            r#"{"limit": 10}"#,
        ])
        .expect("parse");

        assert_eq!(cli.config, Some(PathBuf::from("/etc/erpgate/gateway.toml")));
        assert_eq!(
            cli.command,
            Command::Exec {
                pool: "dia".to_string(),
                operation: "scf_carikart_listele".to_string(),
                params: r#"{"limit": 10}"#.to_string(),
            }
        );
    }

    #[test]
    fn test_monitor_default_interval() {
        let cli = Cli::try_parse_from(["erpgate", "monitor", "--log-level", "debug"]).expect("parse");
        assert_eq!(cli.command, Command::Monitor { interval: 30 });
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_parse_params() {
        let params = parse_params(r#"{"firma_kodu": 4}"#).expect("params");
        assert_eq!(params["firma_kodu"], json!(4));

        assert!(parse_params("[1, 2]").is_err());
        assert!(parse_params("{not json").is_err());
    }

    #[tokio::test]
    async fn test_exec_unconfigured_pool() {
        let err = exec(GatewaySettings::default(), "dia", "kontor_sorgula", "{}")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }
}
