use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sts_broker::{
    forge::{self, CertificateSummary},
    observability::{init_observability, log_config_info},
    BrokerSettings, StaticConfigProvider, TokenBackend, APP_NAME, VERSION,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "sts-broker")]
#[command(about = "Issue delegated STS tokens with freshly forged client certificates")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Broker settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue one token and print the packaged response as JSON
    Issue {
        /// STS configuration file (JSON with authentication_url, api_url,
        /// username, password, region)
        #[arg(long)]
        sts_config: Option<PathBuf>,
    },

    /// Forge a client certificate and print it as PEM
    Forge {
        /// Region embedded in the certificate
        #[arg(long)]
        region: String,
    },
}

fn install_rustls_provider() {
    use rustls::crypto::{ring, CryptoProvider};

    if CryptoProvider::get_default().is_none() {
        // A concurrent install leaves a usable default behind either way.
        let _ = ring::default_provider().install_default();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    install_rustls_provider();

    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings =
        BrokerSettings::load(cli.config.as_deref()).context("Failed to load broker settings")?;
    let metrics =
        init_observability(&settings.observability).context("Failed to initialize logging")?;

    info!(app_name = APP_NAME, version = VERSION, "Starting STS broker");
    log_config_info(&settings);

    match cli.command {
        Commands::Issue { sts_config } => {
            let provider = match sts_config {
                Some(path) => StaticConfigProvider::from_json_file(&path)
                    .with_context(|| format!("Failed to load {}", path.display()))?,
                None => StaticConfigProvider::empty(),
            };

            let backend = TokenBackend::new(provider, &settings).with_metrics(metrics);
            let response = backend.read_token().await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Forge { region } => {
            let identity = forge::forge(&region, Utc::now())?;
            let summary = CertificateSummary::parse(identity.certificate.der())?;
            info!(
                subject = %summary.subject,
                serial = %identity.certificate.serial_hex(),
                not_after = %summary.not_after,
                "Forged client certificate"
            );
            print!("{}", identity.certificate.to_pem());
        }
    }

    Ok(())
}
