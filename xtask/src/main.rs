use anyhow::{
    Context,
    Result,
    ensure,
};
use clap::{
    ArgGroup,
    Args,
    Parser,
    Subcommand,
};
use deployments::{
    DeploymentEnv,
    compute_bytecode_hash,
    record_deployment,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    process::Command,
};

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Voting helper tasks (clippy, tests, deployment records)",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run clippy for the entire workspace with warnings-as-errors
    Clippy,
    /// Run every workspace test, including the fake-backed client tests
    Test,
    /// Record where the room factory is deployed for a network
    RecordFactory(RecordFactory),
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("network")
        .args(["dev", "test", "local"])
        .required(true)
))]
struct RecordFactory {
    /// Factory contract address
    address: String,

    #[arg(long)]
    dev: bool,

    #[arg(long)]
    test: bool,

    #[arg(long)]
    local: bool,

    /// RPC URL the factory was deployed through
    #[arg(long, default_value = "http://localhost:8545")]
    rpc_url: String,

    /// Chain id the client should insist on
    #[arg(long)]
    chain_id: Option<u64>,

    /// Runtime bytecode artifact; its hash is checked against on-chain code
    #[arg(long)]
    bytecode: Option<PathBuf>,
}

impl RecordFactory {
    fn env(&self) -> DeploymentEnv {
        if self.dev {
            DeploymentEnv::Dev
        } else if self.test {
            DeploymentEnv::Test
        } else {
            DeploymentEnv::Local
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = repo_root()?;

    match cli.command {
        Commands::Clippy => run_clippy(&root)?,
        Commands::Test => run_tests(&root)?,
        Commands::RecordFactory(args) => record_factory(&root, args)?,
    }

    Ok(())
}

fn repo_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask has no parent directory")
}

fn run_clippy(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("clippy")
        .arg("--workspace")
        .arg("--all-targets")
        .arg("--all-features")
        .arg("--")
        .arg("-D")
        .arg("warnings")
        .current_dir(root);
    run_command(cmd, "cargo clippy")?;
    Ok(())
}

fn run_tests(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("test")
        .arg("--workspace")
        .arg("--all-features")
        .current_dir(root);
    run_command(cmd, "cargo test --workspace")?;
    Ok(())
}

fn record_factory(root: &Path, args: RecordFactory) -> Result<()> {
    let env = args.env();
    let code_hash = args
        .bytecode
        .as_ref()
        .map(|path| compute_bytecode_hash(root.join(path)))
        .transpose()?;
    std::env::set_current_dir(root).context("failed to enter the repository root")?;
    deployments::ensure_structure()?;
    let record = record_deployment(env, &args.address, &args.rpc_url, args.chain_id, code_hash)?;
    println!(
        "Recorded {env} factory {} (chain id {}, code hash {})",
        record.factory_address,
        record
            .chain_id
            .map_or_else(|| "any".to_string(), |id| id.to_string()),
        record.code_hash.as_deref().unwrap_or("unchecked")
    );
    Ok(())
}

fn run_command(mut cmd: Command, label: &str) -> Result<()> {
    println!("Running: {}", label);
    let status = cmd
        .status()
        .with_context(|| format!("failed to run {label}"))?;
    ensure!(status.success(), "{label} failed with status {status}");
    Ok(())
}
