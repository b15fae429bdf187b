use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    fmt,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Dev,
    Test,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Dev => "dev",
            DeploymentEnv::Test => "test",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Dev => "Devnet",
            DeploymentEnv::Test => "Testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

/// Where the room factory for one network lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub recorded_at: String,
    pub factory_address: String,
    pub network_url: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// SHA-256 of the factory runtime bytecode, lowercase hex.
    #[serde(default)]
    pub code_hash: Option<String>,
    #[serde(default)]
    pub deployment_block_height: Option<u64>,
}

impl DeploymentRecord {
    pub fn new(
        factory_address: impl Into<String>,
        network_url: impl Into<String>,
    ) -> Self {
        Self {
            recorded_at: Utc::now().to_rfc3339(),
            factory_address: factory_address.into(),
            network_url: network_url.into(),
            chain_id: None,
            code_hash: None,
            deployment_block_height: None,
        }
    }

    /// Records without a stored hash are accepted as-is.
    pub fn is_compatible_with_hash(&self, hash: &str) -> bool {
        self.code_hash
            .as_deref()
            .is_none_or(|stored| stored.eq_ignore_ascii_case(hash))
    }

    pub fn is_compatible_with_chain(&self, chain_id: u64) -> bool {
        self.chain_id.is_none_or(|stored| stored == chain_id)
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::at(Path::new(DEPLOYMENTS_ROOT), env)
    }

    pub fn at(root: &Path, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root, env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: DeploymentRecord) -> Result<()> {
        write_record(&self.path, &record)
    }
}

pub fn compute_code_hash(code: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code);
    format!("{:x}", hasher.finalize())
}

/// Hashes a compiled runtime bytecode file. Hex artifacts (with or without a `0x`
/// prefix) are decoded first so the result matches the hash of on-chain code.
pub fn compute_bytecode_hash(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| {
        format!(
            "Failed to read contract bytecode for hashing: {}",
            path.display()
        )
    })?;
    let code = match std::str::from_utf8(&bytes) {
        Ok(text) => {
            let trimmed = text.trim();
            let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
            hex::decode(raw).unwrap_or(bytes)
        }
        Err(_) => bytes,
    };
    Ok(compute_code_hash(&code))
}

pub fn ensure_structure() -> Result<()> {
    for env in [
        DeploymentEnv::Dev,
        DeploymentEnv::Test,
        DeploymentEnv::Local,
    ] {
        let _ = ensure_store(Path::new(DEPLOYMENTS_ROOT), env)?;
    }
    Ok(())
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    if !root.exists() {
        fs::create_dir_all(root).with_context(|| {
            format!("Failed to create deployments directory {}", root.display())
        })?;
    }

    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!("Failed to create {} directory", env_dir.display())
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).with_context(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
        file.write_all(b"").with_context(|| {
            format!("Failed to initialize deployment record file for {}", env)
        })?;
    }

    Ok(file_path)
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(Some(record));
    }
    if let Ok(mut records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records.pop());
    }
    Err(anyhow!(
        "Failed to parse deployment record JSON; expected a single deployment object"
    ))
}

fn write_record(path: impl AsRef<Path>, record: &DeploymentRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .context("Failed to serialize deployment record")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment record")?;
    Ok(())
}

pub fn record_deployment(
    env: DeploymentEnv,
    factory_address: impl AsRef<str>,
    network_url: impl AsRef<str>,
    chain_id: Option<u64>,
    code_hash: Option<String>,
) -> Result<DeploymentRecord> {
    let store = DeploymentStore::new(env)?;
    let mut record =
        DeploymentRecord::new(factory_address.as_ref(), network_url.as_ref());
    record.chain_id = chain_id;
    record.code_hash = code_hash;
    store.save(record.clone())?;
    Ok(record)
}
