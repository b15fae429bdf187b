use alloy::{
    network::EthereumWallet,
    signers::local::{
        MnemonicBuilder,
        PrivateKeySigner,
        coins_bip39::English,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tokio::sync::mpsc;
use tracing::info;
use voting_client::{
    Account,
    WalletError,
    wallet::{
        WalletEvent,
        WalletProvider,
    },
};

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".voting").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

/// JSON keystores in `dir`, sorted by name.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

pub fn unlock_wallet(descriptor: &WalletDescriptor) -> Result<PrivateKeySigner> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read wallet password")?;

    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;
    signer_from_secret(&descriptor.name, &secret)
}

/// Keystores hold either a raw 32-byte key or a BIP-39 phrase.
pub fn signer_from_secret(name: &str, secret: &[u8]) -> Result<PrivateKeySigner> {
    if secret.len() == 32
        && let Ok(signer) = PrivateKeySigner::from_slice(secret)
    {
        return Ok(signer);
    }

    if let Ok(mnemonic) = std::str::from_utf8(secret) {
        let word_count = mnemonic.split_whitespace().count();
        if word_count >= 12 {
            return MnemonicBuilder::<English>::default()
                .phrase(mnemonic.trim())
                .build()
                .wrap_err_with(|| format!("Wallet '{name}' holds an invalid phrase"));
        }
    }

    Err(eyre!("Wallet '{name}' contained unsupported key material"))
}

#[derive(Debug)]
struct KeystoreState {
    accounts: Vec<(String, Account)>,
    active: usize,
    connected: bool,
    events: mpsc::UnboundedSender<WalletEvent>,
    receiver: Option<mpsc::UnboundedReceiver<WalletEvent>>,
}

impl KeystoreState {
    /// Active account first, the rest in unlock order.
    fn ordered(&self) -> Vec<Account> {
        let n = self.accounts.len();
        (0..n)
            .map(|i| self.accounts[(self.active + i) % n].1)
            .collect()
    }
}

/// Wallet over unlocked keystores. The user switches or disconnects accounts with key
/// bindings, which surface as wallet events like an external wallet would send.
#[derive(Clone, Debug)]
pub struct KeystoreWallet {
    state: Arc<Mutex<KeystoreState>>,
}

impl KeystoreWallet {
    /// Returns the wallet and a signer set holding every unlocked key, for the
    /// provider to sign with.
    pub fn new(signers: Vec<(String, PrivateKeySigner)>) -> Result<(Self, EthereumWallet)> {
        let mut signers = signers.into_iter();
        let (first_name, first) = signers
            .next()
            .ok_or_else(|| eyre!("At least one wallet is required"))?;
        let mut accounts = vec![(first_name, Account::from(first.address()))];
        let mut wallet = EthereumWallet::new(first);
        for (name, signer) in signers {
            accounts.push((name, Account::from(signer.address())));
            wallet.register_signer(signer);
        }
        let (events, receiver) = mpsc::unbounded_channel();
        let keystore = Self {
            state: Arc::new(Mutex::new(KeystoreState {
                accounts,
                active: 0,
                connected: false,
                events,
                receiver: Some(receiver),
            })),
        };
        Ok((keystore, wallet))
    }

    fn lock(&self) -> MutexGuard<'_, KeystoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn label(&self, account: &Account) -> Option<String> {
        self.lock()
            .accounts
            .iter()
            .find(|(_, a)| a == account)
            .map(|(name, _)| name.clone())
    }

    pub fn account_count(&self) -> usize {
        self.lock().accounts.len()
    }

    /// Makes the next unlocked account active. Emits an account change when connected.
    pub fn switch_next(&self) -> Account {
        let mut state = self.lock();
        state.active = (state.active + 1) % state.accounts.len();
        let ordered = state.ordered();
        if state.connected {
            let _ = state.events.send(WalletEvent::AccountsChanged(ordered.clone()));
        }
        info!(account = %ordered[0], "wallet account switched");
        ordered[0]
    }

    pub fn disconnect(&self) {
        let mut state = self.lock();
        if state.connected {
            state.connected = false;
            let _ = state.events.send(WalletEvent::Disconnect);
        }
    }
}

impl WalletProvider for KeystoreWallet {
    async fn request_accounts(&self) -> Result<Vec<Account>, WalletError> {
        let mut state = self.lock();
        if state.accounts.is_empty() {
            return Err(WalletError::NoAccounts);
        }
        state.connected = true;
        Ok(state.ordered())
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<WalletEvent>> {
        self.lock().receiver.take()
    }
}
