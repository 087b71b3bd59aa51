use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use executron::Config;
use tracing_subscriber::EnvFilter;

/// Run user-submitted code on a pool of sandboxes.
#[derive(Parser, Debug)]
#[command(name = "executron", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Path to config.toml (defaults to the platform config dir)
        #[arg(long)]
        config: Option<String>,

        /// Override gateway.host
        #[arg(long)]
        host: Option<String>,

        /// Override gateway.port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the JSON Schema of config.toml
    Schema,
    /// Print the effective configuration with secrets redacted
    Show {
        #[arg(long)]
        config: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("executron=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, host, port } => {
            init_tracing();
            let mut config = Config::load(config.as_deref())?;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            executron::run_gateway(config).await
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Schema => {
                    println!("{}", serde_json::to_string_pretty(&Config::json_schema())?);
                }
                ConfigAction::Show { config } => {
                    print!("{}", Config::load(config.as_deref())?.to_redacted_toml()?);
                }
            }
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "executron", &mut std::io::stdout());
            Ok(())
        }
    }
}
