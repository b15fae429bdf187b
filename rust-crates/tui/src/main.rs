use clap::{
    ArgGroup,
    Parser,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::OnceLock,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};
use url::Url;
use voting_client::Account;
use voting_tui::wallets;

mod client;
mod ui;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "voting-tui",
    about = "Browse, create and vote in on-chain voting rooms",
    version,
    group(
        ArgGroup::new("network")
            .args(["dev", "test", "local"])
            .required(true)
    )
)]
struct Args {
    /// Connect to the dev network (default RPC https://ethereum-holesky-rpc.publicnode.com)
    #[arg(long)]
    dev: bool,

    /// Connect to the test network (default RPC https://ethereum-sepolia-rpc.publicnode.com)
    #[arg(long)]
    test: bool,

    /// Connect to a local node (default RPC http://localhost:8545)
    #[arg(long)]
    local: bool,

    /// Override the RPC URL for the selected network
    #[arg(long)]
    rpc_url: Option<Url>,

    /// Factory address; defaults to the recorded deployment for the network
    #[arg(long)]
    factory: Option<Account>,

    /// Keystore to unlock; repeat to switch between several accounts
    #[arg(long = "wallet", value_name = "NAME")]
    wallets: Vec<String>,

    /// Override the keystore directory (defaults to ~/.voting/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Write logs to a daily file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<client::AppConfig> {
        let network = if self.dev {
            client::NetworkTarget::Dev {
                url: self.rpc_url.map_or_else(|| default_url(client::DEFAULT_DEV_RPC_URL), Ok)?,
            }
        } else if self.test {
            client::NetworkTarget::Test {
                url: self.rpc_url.map_or_else(|| default_url(client::DEFAULT_TEST_RPC_URL), Ok)?,
            }
        } else {
            client::NetworkTarget::Local {
                url: self.rpc_url.map_or_else(|| default_url(client::DEFAULT_LOCAL_RPC_URL), Ok)?,
            }
        };

        let wallets = if self.wallets.is_empty() {
            client::WalletConfig::None
        } else {
            client::WalletConfig::Keystore {
                names: self.wallets,
                dir: wallets::resolve_wallet_dir(self.wallet_dir.as_deref())?,
            }
        };

        Ok(client::AppConfig {
            network,
            factory: self.factory,
            wallets,
        })
    }
}

fn default_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| eyre!("invalid default RPC URL {raw}: {e}"))
}

/// Logs go to a daily file; the terminal belongs to the UI.
fn init_tracing(log_dir: &Path) {
    let appender = rolling::daily(log_dir, "voting-tui.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    if let Some(log_dir) = &args.log_dir {
        init_tracing(log_dir);
    }
    tracing::info!("starting voting-tui");
    deployments::ensure_structure().map_err(|e| eyre!(e))?;
    let app_config = args.into_config()?;
    client::run_app(app_config).await
}
