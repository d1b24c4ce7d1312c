use clap::Parser;
use tracing_subscriber::EnvFilter;

use valet_domain::config::Config;
use valet_gateway::bootstrap;

/// Valet — a long-running personal assistant server.
#[derive(Parser, Debug)]
#[command(name = "valetd", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "valet.toml", env = "VALET_CONFIG")]
    config: String,

    /// Override the listen address from the config.
    #[arg(long)]
    listen: Option<String>,

    /// Run an interactive chat on the terminal instead of serving.
    #[arg(long)]
    chat: bool,
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let config: Config = toml::from_str(&raw)?;
            tracing::info!(path, "config loaded");
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path, "config file not found, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    let state = bootstrap::build_state(config)?;
    if cli.chat {
        let gardener = valet_gateway::gardener::spawn(state.clone());
        let result = valet_gateway::cli::chat(state).await;
        gardener.abort();
        return result;
    }
    bootstrap::serve(state).await
}
