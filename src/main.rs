use clap::Parser;
use newcamd_relay::config::CamdConfig;
use newcamd_relay::error::Result;
use newcamd_relay::service::decoder::{EntitlementDecoder, UnavailableDecoder};
use newcamd_relay::transport::Server;
use newcamd_relay::utils::logging::init_logging;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};

/// NewCAMD relay server
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file; NEWCAMD_* variables are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:15050
    #[arg(short, long)]
    listen: Option<String>,

    /// Account username
    #[arg(short, long)]
    user: Option<String>,

    /// Account password
    #[arg(short, long)]
    password: Option<String>,

    /// 14-byte DES key as 28 hex characters
    #[arg(short = 'k', long)]
    des_key: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    debug: bool,

    /// Print an example configuration file and exit
    #[arg(long)]
    example_config: bool,
}

impl Cli {
    fn load_config(&self) -> Result<CamdConfig> {
        let mut config = match &self.config {
            Some(path) => CamdConfig::from_file(path)?,
            None => CamdConfig::from_env()?,
        };

        if let Some(listen) = &self.listen {
            config.server.address = listen.clone();
        }
        if let Some(user) = &self.user {
            config.account.username = user.clone();
        }
        if let Some(password) = &self.password {
            config.account.password = password.clone();
        }
        if let Some(key) = &self.des_key {
            config.account.des_key = key.clone();
        }
        if self.debug {
            config.logging.log_level = Level::DEBUG;
        }

        config.validate_strict()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    if cli.example_config {
        println!("{}", CamdConfig::example_config());
        return std::process::ExitCode::SUCCESS;
    }

    match run(&cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server stopped");
            eprintln!("newcamd-relay: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    init_logging(&config.logging)?;

    // No card backend is linked into the binary; every ECM gets "not found".
    let decoder: Arc<dyn EntitlementDecoder> = Arc::new(UnavailableDecoder);
    let server = Server::bind(&config, decoder).await?;
    info!(username = %config.account.username, "NewCAMD relay ready");

    server.run().await
}
