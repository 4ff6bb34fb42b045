use std::path::PathBuf;

use clap::Parser;
use ksema_client::ClientConf;
use ksema_logger::log_init;
use tracing::{debug, info};

use crate::{actions::HsmActions, error::result::CliResult};

/// Default filter of the CLI, overridden by `RUST_LOG`
const CLI_LOG_FILTER: &str = "warn";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file location
    ///
    /// This is an alternative to the env variable `KSEMA_CLI_CONF`.
    /// Takes precedence over `KSEMA_CLI_CONF` env variable.
    #[arg(short, long)]
    conf: Option<PathBuf>,

    #[command(subcommand)]
    pub command: HsmActions,

    /// The URL of the HSM REST service
    #[arg(long, env = "KSEMA_DEFAULT_URL", action)]
    pub url: Option<String>,

    /// Allow to connect using a self-signed cert or untrusted cert chain
    ///
    /// `accept_invalid_certs` is useful if the CLI needs to connect to an HSM
    /// exposing an invalid or insecure TLS certificate
    #[arg(long)]
    pub accept_invalid_certs: Option<bool>,

    /// Output the JSON requests and responses exchanged with the HSM
    #[arg(long, default_value = "false")]
    pub print_json: bool,
}

/// Main function of the Ksema CLI.
///
/// Initializes logging, parses the command line, authenticates against the HSM
/// and runs the requested subcommand.
///
/// # Errors
///
/// This function will return an error if:
/// - The configuration file cannot be located or loaded.
/// - The authentication against the HSM fails.
/// - The subcommand fails.
pub async fn ksema_main() -> CliResult<()> {
    log_init(Some(CLI_LOG_FILTER));
    let cli = Cli::parse();

    let conf_path = ClientConf::location(cli.conf.clone())?;
    debug!("Loading the configuration from {}", conf_path.display());
    let conf = ClientConf::load(&conf_path)?;

    let hsm_client = conf
        .initialize_hsm_client(
            cli.url.as_deref(),
            cli.accept_invalid_certs,
            cli.print_json,
        )
        .await?;
    info!(
        "Connected to {} as {}",
        hsm_client.server_url,
        hsm_client.user_type()
    );

    cli.command.process(&hsm_client).await
}
