use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crabgate_gateway::Manager;
use crabgate_server::state::AppState;

#[derive(Parser)]
#[command(
    name = "crabgate",
    version,
    about = "Multi-profile manager for local clawd gateways"
)]
struct Cli {
    #[arg(
        long,
        default_value = "~",
        help = "Directory the profile directories hang off (holds .clawd and .clawd-<name>)"
    )]
    home: PathBuf,

    #[arg(long, default_value = "clawd", help = "Path to the clawd control binary")]
    clawd: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP/SSE control plane")]
    Serve {
        #[arg(long, default_value = "18780", help = "Control plane port")]
        port: u16,
        #[arg(long, default_value = "127.0.0.1", help = "Bind address")]
        bind: String,
        #[arg(
            long,
            env = "CRABGATE_TOKEN",
            help = "Control token required for login; omit for open local access"
        )]
        token: Option<String>,
    },
    #[command(about = "List profiles with model, channel and live status")]
    Profiles,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Expand ~ to home directory
    if cli.home.starts_with("~") {
        if let Some(home) = std::env::var_os("HOME") {
            cli.home = PathBuf::from(home).join(cli.home.strip_prefix("~").unwrap_or(&cli.home));
        }
    }

    let log_dir = cli.home.join(".crabgate/logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "crabgate.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let manager = Manager::new(cli.home.clone(), cli.clawd.clone());

    match command {
        Commands::Serve { port, bind, token } => {
            let state = AppState::new(manager, token);
            crabgate_server::serve(state, &format!("{bind}:{port}")).await?;
        }
        Commands::Profiles => {
            println!(
                "{:<20} {:<8} {:<10} {:<24} {:<12}",
                "PROFILE", "PORT", "STATUS", "MODEL", "CHANNEL"
            );
            println!("{}", "-".repeat(78));
            for name in manager.list() {
                match manager.info(&name).await {
                    Ok(info) => {
                        let port = info
                            .port
                            .map(|p| p.to_string())
                            .unwrap_or_else(|| "-".to_string());
                        let status = match info.status {
                            crabgate_schema::ProfileStatus::Running => "running",
                            crabgate_schema::ProfileStatus::Stopped => "stopped",
                        };
                        println!(
                            "{:<20} {:<8} {:<10} {:<24} {:<12}",
                            info.name, port, status, info.model, info.channel
                        );
                    }
                    Err(err) => {
                        println!("{:<20} (unreadable: {err})", name);
                    }
                }
            }
        }
    }

    Ok(())
}
