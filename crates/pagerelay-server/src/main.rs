use anyhow::Result;
use clap::{Parser, Subcommand};
use pagerelay::config::{load_env_file, models_from_env};
use pagerelay::{router, Relay, RelayConfig};
use pagerelay_core::{AskProvider, ProviderKind};
use pagerelay_local::{
    ChatgptClient, ClaudeCli, CodexCli, OpenAiClient, ProviderRegistry, DEFAULT_SESSION_TTL_S,
    DEFAULT_TIMEOUT_MS,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pagerelay")]
#[command(about = "Local relay that answers questions about the current web page", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flags for the default `serve` command.
    #[command(flatten)]
    serve: ServeCmd,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP relay (default when no command is given).
    Serve(ServeCmd),
    /// Diagnose provider availability (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug, Clone)]
struct ServeCmd {
    /// Listen address. Keep it on loopback: callers are not authenticated.
    #[arg(long, env = "PAGERELAY_ADDR", default_value = "127.0.0.1:8787")]
    addr: SocketAddr,
    /// Provider used when a request does not name one: codex|claude|chatgpt|openai
    #[arg(long, env = "PAGERELAY_DEFAULT_PROVIDER", default_value = "codex")]
    default_provider: ProviderKind,
    /// Session expiry window (seconds since creation).
    #[arg(long, env = "PAGERELAY_SESSION_TTL_S", default_value_t = DEFAULT_SESSION_TTL_S)]
    session_ttl_s: u64,
    /// Ceiling for each upstream call, HTTP or subprocess (ms).
    #[arg(long, env = "PAGERELAY_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,
    /// Start even when no provider is available.
    #[arg(long, default_value_t = false)]
    allow_no_providers: bool,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

async fn serve(args: ServeCmd) -> Result<()> {
    let timeout = Duration::from_millis(args.timeout_ms);
    let providers = ProviderRegistry::from_env(timeout)?;

    let availability = providers.availability();
    for (kind, available) in &availability {
        tracing::info!(provider = %kind, available, "provider probe");
    }
    if !availability.iter().any(|(_, up)| *up) {
        if !args.allow_no_providers {
            anyhow::bail!(
                "no provider is available. Install Codex and run `codex login`, install Claude \
                 Code and run `claude login`, or set PAGERELAY_OPENAI_API_KEY. Pass \
                 --allow-no-providers to start anyway."
            );
        }
        tracing::warn!("no provider is available; every ask will fail until one is installed");
    } else if !availability
        .iter()
        .any(|(k, up)| *k == args.default_provider && *up)
    {
        tracing::warn!(
            default_provider = %args.default_provider,
            "default provider is not available"
        );
    }

    let config = RelayConfig {
        default_provider: args.default_provider,
        session_ttl_s: args.session_ttl_s,
        timeout,
        models: models_from_env(),
    };
    let relay = Arc::new(Relay::new(providers, config));
    let app = router(relay);

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        default_provider = %args.default_provider,
        session_ttl_s = args.session_ttl_s,
        timeout_ms = args.timeout_ms,
        "listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn doctor(args: DoctorCmd) {
    let timeout = Duration::from_millis(DEFAULT_TIMEOUT_MS);
    let codex = CodexCli::from_env(timeout);
    let claude = ClaudeCli::from_env(timeout);
    // Availability probes never send requests, so a default client is enough here.
    let chatgpt = ChatgptClient::from_env(reqwest_client());
    let openai = OpenAiClient::from_env(reqwest_client());

    let models = models_from_env();
    let model = |k: ProviderKind| models.get(&k).cloned();
    let any = codex.is_available()
        || claude.is_available()
        || chatgpt.is_available()
        || openai.is_available();

    // Presence booleans and paths only; never print credential values.
    let payload = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": any,
        "name": "pagerelay",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": {
            "codex": {
                "available": codex.is_available(),
                "bin": codex.bin(),
                "model": model(ProviderKind::Codex),
            },
            "claude": {
                "available": claude.is_available(),
                "bin": claude.bin(),
                "model": model(ProviderKind::Claude),
            },
            "chatgpt": {
                "available": chatgpt.is_available(),
                "auth_file": chatgpt.auth_file().map(|p| p.to_string_lossy().to_string()),
                "model": model(ProviderKind::Chatgpt),
            },
            "openai": {
                "available": openai.is_available(),
                "model": model(ProviderKind::Openai),
            },
        },
    });
    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("pagerelay {} (ok={})", env!("CARGO_PKG_VERSION"), any);
            for k in ProviderKind::ALL {
                let p = &payload["providers"][k.as_str()];
                println!(
                    "- {}: {}",
                    k,
                    if p["available"].as_bool().unwrap_or(false) {
                        "available"
                    } else {
                        "missing"
                    }
                );
            }
        }
        _ => println!("{payload}"),
    }
}

fn reqwest_client() -> pagerelay_local::reqwest::Client {
    pagerelay_local::reqwest::Client::new()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so env-backed flags can come from the file.
    let env_file = load_env_file();
    let cli = Cli::parse();
    init_tracing();

    match env_file {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "env file loaded"),
        Ok(None) => {}
        Err(e) => anyhow::bail!("failed to load env file: {e}"),
    }

    match cli.command {
        None => serve(cli.serve).await?,
        Some(Commands::Serve(args)) => serve(args).await?,
        Some(Commands::Doctor(args)) => doctor(args),
        Some(Commands::Version(args)) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "pagerelay",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("pagerelay {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}
