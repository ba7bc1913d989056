//! prompt-relay - HTTP orchestration layer for OpenAI-compatible APIs
//!
//! Forwards prompts from front-end clients to the configured provider and
//! streams answers back as Server-Sent Events.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prompt_relay::Config;

#[derive(Parser)]
#[command(name = "prompt-relay")]
#[command(about = "HTTP orchestration layer for OpenAI-compatible APIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Override API_HOST
        #[arg(long)]
        host: Option<String>,

        /// Override API_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration and print a redacted summary
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the process environment still applies.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::from_env().map_err(prompt_relay::Error::from);

    let directive = config
        .as_ref()
        .map(|c| c.logging.filter_directive())
        .unwrap_or("info");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("prompt_relay={directive},tower_http={directive}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                tracing::info!(host = %host, "Override listen host");
                config.server.host = host;
            }
            if let Some(port) = port {
                tracing::info!(port, "Override listen port");
                config.server.port = port;
            }

            prompt_relay::proxy::run_server(config).await
        }

        Commands::Check => {
            println!("Configuration OK");
            println!("  model:          {}", config.openai.model);
            println!("  base url:       {}", config.openai.base_url);
            println!("  api key:        {}", config.openai.api_key);
            println!("  timeout:        {}s", config.openai.timeout.as_secs());
            println!("  listen:         {}", config.server.listen_addr());
            println!("  log level:      {}", config.logging.level);
            println!("  log buffer:     {} entries", config.logging.buffer_capacity);
            println!("  cors origins:   {}", config.cors.allowed_origins.join(", "));
            Ok(())
        }
    }
}
