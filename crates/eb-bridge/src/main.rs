// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Experiment bridge binary

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use eb_bridge::{BridgeConfig, RejoinPolicy, Server};
use eb_logging::{CliLoggingArgs, redact};
use eb_session_client::{CreateSessionRequest, SessionClient};
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

const COMPONENT: &str = "eb-bridge";

#[derive(Parser, Debug)]
#[command(author, version, about = "WebSocket bridge between agents and a web experiment", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "EB_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the experiment application
    #[arg(long, global = true, env = "EB_EXPERIMENT_URL")]
    experiment_url: Option<Url>,

    /// REST key for the session API
    #[arg(long, global = true, env = "EB_REST_KEY", hide_env_values = true)]
    rest_key: Option<String>,

    #[command(flatten)]
    logging: CliLoggingArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the WebSocket bridge (default)
    Serve(ServeArgs),
    /// Create an experiment session and print its participant roster as JSON
    CreateSession(CreateSessionArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Address to listen on
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// What to do when a participant joins while already joined
    #[arg(long, value_enum)]
    rejoin_policy: Option<RejoinPolicy>,

    /// Maximum concurrent agent connections
    #[arg(long)]
    connection_limit: Option<usize>,

    /// Polls of one wait page before giving up
    #[arg(long)]
    max_barrier_polls: Option<u32>,

    /// Delay between wait page polls, in milliseconds
    #[arg(long)]
    barrier_poll_interval_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct CreateSessionArgs {
    /// Session configuration name known to the experiment application
    #[arg(long)]
    config_name: String,

    /// Number of participants
    #[arg(long, default_value_t = 2)]
    participants: u32,
}

impl Cli {
    /// File configuration with global flags applied on top.
    fn load_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::from_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => BridgeConfig::default(),
        };
        if let Some(url) = &self.experiment_url {
            config.experiment_url = url.clone();
        }
        if let Some(key) = &self.rest_key {
            config.rest_key = Some(key.clone());
        }
        Ok(config)
    }
}

impl ServeArgs {
    fn apply(self, config: &mut BridgeConfig) {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(policy) = self.rejoin_policy {
            config.rejoin_policy = policy;
        }
        if let Some(limit) = self.connection_limit {
            config.connection_limit = limit;
        }
        if let Some(polls) = self.max_barrier_polls {
            config.navigation.max_barrier_polls = polls;
        }
        if let Some(interval) = self.barrier_poll_interval_ms {
            config.navigation.barrier_poll_interval_ms = interval;
        }
    }

    async fn run(self, mut config: BridgeConfig) -> Result<()> {
        self.apply(&mut config);
        tracing::info!(
            bind = %config.bind_addr,
            experiment_url = %config.experiment_url,
            rejoin_policy = ?config.rejoin_policy,
            rest_key = config.rest_key.as_ref().map(redact),
            "Starting experiment bridge"
        );

        let server = Server::bind(config).await.context("starting bridge")?;
        server
            .run_until(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %err, "Cannot listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
                tracing::info!("Shutdown requested");
            })
            .await?;
        Ok(())
    }
}

impl CreateSessionArgs {
    async fn run(self, config: BridgeConfig) -> Result<()> {
        let client = SessionClient::new(config.experiment_url.clone(), config.rest_key.as_deref())
            .context("building session API client")?;
        tracing::info!(
            experiment_url = %config.experiment_url,
            config_name = %self.config_name,
            participants = self.participants,
            "Creating session"
        );

        let request = CreateSessionRequest::new(&self.config_name, self.participants);
        let roster = client
            .create_session_with_roster(&request)
            .await
            .context("creating session")?;

        println!("{}", serde_json::to_string_pretty(&roster)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    match cli.command {
        Some(Command::CreateSession(args)) => {
            cli.logging.init_stderr(COMPONENT)?;
            args.run(config).await
        }
        Some(Command::Serve(args)) => {
            cli.logging.init(COMPONENT)?;
            args.run(config).await
        }
        None => {
            cli.logging.init(COMPONENT)?;
            ServeArgs::default().run(config).await
        }
    }
}
