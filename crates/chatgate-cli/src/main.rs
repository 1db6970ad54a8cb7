use std::net::SocketAddr;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatgate_config::ServerConfig;
use chatgate_probe::{CancellationToken, ProbeRunner};

#[derive(Parser)]
#[command(name = "chatgate", version, about = "LLM gateway: provider proxy, model tester, catalog")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway HTTP server
    Serve {
        /// Listen address, overriding CHATGATE_LISTEN_ADDR
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Probe model availability against an OpenAI-compatible endpoint
    Test {
        /// Model ids to probe, in order
        #[arg(required = true)]
        models: Vec<String>,
        /// Upstream base URL, overriding CHATGATE_OPENAI_URL
        #[arg(long)]
        base_url: Option<String>,
        /// API key, overriding OPENAI_API_KEY
        #[arg(long)]
        api_key: Option<String>,
        /// Per-probe timeout in seconds (5-10 is typical)
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = ServerConfig::from_env();

    match cli.command {
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or(config.listen_addr);
            chatgate_server::run_server(addr).await
        }
        Commands::Test {
            models,
            base_url,
            api_key,
            timeout,
        } => run_test(config, models, base_url, api_key, timeout).await,
    }
}

async fn run_test(
    config: ServerConfig,
    models: Vec<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: u64,
) -> anyhow::Result<()> {
    let base_url = base_url.unwrap_or(config.openai_base_url);
    let Some(api_key) = api_key.or(config.openai_api_key) else {
        bail!("no API key: pass --api-key or set OPENAI_API_KEY");
    };
    if timeout == 0 {
        bail!("--timeout must be greater than zero");
    }

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("stopping after the current probe");
            cancel.cancel();
        }
    });

    println!("testing {} model(s) against {}", models.len(), base_url);

    let runner = ProbeRunner::new(base_url, api_key, Duration::from_secs(timeout));
    let results = runner
        .run(&models, &token, |model, result, _| {
            let status = if result.success {
                "ok"
            } else if result.timeout {
                "timeout"
            } else {
                "failed"
            };
            println!(
                "  {model}: {status} ({}ms) {}",
                result.response_time,
                if result.success { "" } else { result.message.as_str() }
            );
        })
        .await;

    let passed = results.iter().filter(|(_, r)| r.success).count();
    println!("{passed}/{} model(s) available", results.len());

    Ok(())
}
