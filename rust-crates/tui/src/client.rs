use crate::ui::{
    self,
    FormKind,
    UserEvent,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentRecord,
    DeploymentStore,
    compute_code_hash,
};
use futures::StreamExt;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{
    debug,
    error,
    info,
    warn,
};
use url::Url;
use voting_client::{
    Account,
    VotingError,
    actions::{
        FactoryAction,
        RoomAction,
        submit_factory_action,
        submit_room_action,
    },
    aggregator::{
        FetchStatus,
        RoomListing,
        RoomState,
        fetch_all_rooms,
        fetch_room_detail,
        fetch_room_summaries,
        stream_room_details,
    },
    chain::AlloyGateway,
    contracts::{
        CallResult,
        ContractGateway,
        FactoryReader,
    },
    room::{
        Candidate,
        PartialRoomDetail,
        RoomFetch,
        RoomPermissions,
        RoomSummary,
        sort_candidates,
    },
    session::{
        SessionState,
        SessionStore,
    },
};
use voting_tui::{
    router::{
        Page,
        Router,
        View,
    },
    wallets::{
        self,
        KeystoreWallet,
    },
};

pub const DEFAULT_DEV_RPC_URL: &str = "https://ethereum-holesky-rpc.publicnode.com";
pub const DEFAULT_TEST_RPC_URL: &str = "https://ethereum-sepolia-rpc.publicnode.com";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545";
const MAX_ERRORS: usize = 50;

#[derive(Clone, Debug)]
pub enum NetworkTarget {
    Dev { url: Url },
    Test { url: Url },
    Local { url: Url },
}

impl NetworkTarget {
    pub fn env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Dev { .. } => DeploymentEnv::Dev,
            NetworkTarget::Test { .. } => DeploymentEnv::Test,
            NetworkTarget::Local { .. } => DeploymentEnv::Local,
        }
    }

    pub fn url(&self) -> &Url {
        match self {
            NetworkTarget::Dev { url }
            | NetworkTarget::Test { url }
            | NetworkTarget::Local { url } => url,
        }
    }
}

#[derive(Clone, Debug)]
pub enum WalletConfig {
    None,
    Keystore { names: Vec<String>, dir: PathBuf },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub factory: Option<Account>,
    pub wallets: WalletConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FactoryAdmins {
    pub creator: Option<Account>,
    pub super_admins: Option<Vec<Account>>,
    pub status: FetchStatus,
}

/// Everything a frame needs, detached from the controller.
#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub network: String,
    pub factory: Account,
    pub session: SessionState,
    pub wallet_label: Option<String>,
    pub has_wallet: bool,
    pub page: Page,
    pub view: Option<View>,
    pub listing: RoomListing,
    pub listing_status: FetchStatus,
    pub room: Option<RoomState>,
    pub permissions: RoomPermissions,
    pub factory_admins: FactoryAdmins,
    pub status: String,
    pub errors: Vec<String>,
}

impl AppSnapshot {
    pub fn room_detail(&self) -> Option<&PartialRoomDetail> {
        self.room.as_ref().and_then(|room| room.detail.as_ref())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListingScope {
    All,
    CreatedBy(Option<Account>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchCommand {
    Listing { epoch: u64, scope: ListingScope },
    Room { epoch: u64, address: Account },
    Factory { epoch: u64 },
    Shutdown,
}

#[derive(Debug)]
pub enum FetchEvent {
    Listing {
        epoch: u64,
        result: voting_client::Result<Vec<RoomSummary>>,
    },
    RoomDetail {
        epoch: u64,
        address: Account,
        result: voting_client::Result<RoomFetch>,
    },
    Factory {
        epoch: u64,
        creator: CallResult<Account>,
        super_admins: CallResult<Vec<Account>>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionNotice {
    AccountChanged(SessionState),
    Disconnected,
}

pub enum Flow {
    Continue(Option<FetchCommand>),
    Quit,
}

pub struct AppController<G: ContractGateway> {
    gateway: G,
    session: SessionStore<KeystoreWallet, G::Factory>,
    router: Router,
    network: String,
    factory: Account,
    status: String,
    errors: Vec<String>,
    listing: RoomListing,
    listing_status: FetchStatus,
    room: Option<RoomState>,
    factory_admins: FactoryAdmins,
}

impl AppController<AlloyGateway> {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let AppConfig {
            network,
            factory,
            wallets,
        } = config;
        let env = network.env();
        let url = network.url().clone();
        info!("Connecting to {env} at URL: {url}");

        let (keystore, signer_set) = match wallets {
            WalletConfig::None => (None, None),
            WalletConfig::Keystore { names, dir } => {
                let mut signers = Vec::with_capacity(names.len());
                for name in names {
                    let descriptor = wallets::find_wallet(&dir, &name)?;
                    let signer = wallets::unlock_wallet(&descriptor)?;
                    signers.push((name, signer));
                }
                let (keystore, signer_set) = KeystoreWallet::new(signers)?;
                (Some(keystore), Some(signer_set))
            }
        };

        let store = DeploymentStore::new(env).map_err(|e| eyre!(e))?;
        let record = store.load().map_err(|e| eyre!(e))?;
        let factory = match (factory, record.as_ref()) {
            (Some(factory), _) => factory,
            (None, Some(record)) => Account::parse(&record.factory_address).wrap_err_with(
                || format!("Deployment record at {} is malformed", store.path().display()),
            )?,
            (None, None) => {
                return Err(eyre!(
                    "No factory deployment recorded for {env}. Record one with \
                     `cargo xtask record-factory --{} <address>` or pass --factory <address>",
                    env.dir_name()
                ));
            }
        };

        // A record only vouches for the factory it names.
        let record = record.filter(|r| Account::parse(&r.factory_address).ok() == Some(factory));
        let gateway = AlloyGateway::connect_http(url.clone(), signer_set, factory);
        verify_deployment(&gateway, env, &url, record.as_ref()).await?;
        Ok(Self::from_parts(
            gateway,
            factory,
            keystore,
            format!("{env} ({url})"),
        ))
    }
}

impl<G: ContractGateway> AppController<G> {
    pub fn from_parts(
        gateway: G,
        factory: Account,
        wallet: Option<KeystoreWallet>,
        network: String,
    ) -> Self {
        let session = SessionStore::new(wallet, gateway.factory(None));
        Self {
            gateway,
            session,
            router: Router::new(),
            network,
            factory,
            status: String::from("Ready"),
            errors: Vec::new(),
            listing: RoomListing::default(),
            listing_status: FetchStatus::Loading,
            room: None,
            factory_admins: FactoryAdmins::default(),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn session(&self) -> SessionState {
        self.session.state()
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.errors.clear();
    }

    fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        self.errors.append(&mut items);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }

    fn report(&mut self, err: VotingError) {
        let message = match err {
            VotingError::WalletUnavailable => format!(
                "{err}. Restart with --wallet <name> to unlock a keystore from the wallet directory."
            ),
            _ => err.to_string(),
        };
        self.push_errors(vec![message]);
    }

    /// Routes session observer callbacks into the event loop.
    pub fn watch_session(&mut self, notices: mpsc::UnboundedSender<SessionNotice>) {
        let on_change = notices.clone();
        self.session.on_account_changed(move |state| {
            let _ = on_change.send(SessionNotice::AccountChanged(state.clone()));
        });
        self.session.on_disconnect(move || {
            let _ = notices.send(SessionNotice::Disconnected);
        });
    }

    pub fn take_wallet_events(
        &mut self,
    ) -> Option<mpsc::UnboundedReceiver<voting_client::wallet::WalletEvent>> {
        self.session.take_wallet_events()
    }

    pub async fn handle_wallet_event(&mut self, event: voting_client::wallet::WalletEvent) {
        self.session.handle_wallet_event(event).await;
    }

    pub fn build_snapshot(&self) -> AppSnapshot {
        let session = self.session.state();
        let detail = self
            .room
            .as_ref()
            .and_then(|room| room.detail.clone())
            .unwrap_or_default();
        let wallet_label = self
            .session
            .wallet()
            .zip(session.account.as_ref())
            .and_then(|(wallet, account)| wallet.label(account));
        AppSnapshot {
            network: self.network.clone(),
            factory: self.factory,
            permissions: RoomPermissions::derive(session.account.as_ref(), &detail),
            session,
            wallet_label,
            has_wallet: self.session.has_wallet(),
            page: self.router.page(),
            view: self.router.route(),
            listing: self.listing.clone(),
            listing_status: self.listing_status.clone(),
            room: self.room.clone(),
            factory_admins: self.factory_admins.clone(),
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }

    /// The read the mounted view needs, tagged with its epoch.
    pub fn fetch_command(&self) -> Option<FetchCommand> {
        let epoch = self.router.epoch();
        match self.router.route()? {
            View::Home => Some(FetchCommand::Listing {
                epoch,
                scope: ListingScope::All,
            }),
            View::MyRooms => Some(FetchCommand::Listing {
                epoch,
                scope: ListingScope::CreatedBy(self.session.state().account),
            }),
            View::RoomDetail(address) | View::RoomInteract(address) | View::RoomMembers(address) => {
                Some(FetchCommand::Room { epoch, address })
            }
            View::AdminPanel => Some(FetchCommand::Factory { epoch }),
            View::Landing | View::Create | View::Join => None,
        }
    }

    fn mount(&mut self) -> Option<FetchCommand> {
        self.listing = RoomListing::default();
        self.listing_status = FetchStatus::Loading;
        self.room = self
            .router
            .route()
            .and_then(View::room)
            .map(RoomState::new);
        self.factory_admins = FactoryAdmins::default();
        debug!(page = %self.router.page(), epoch = self.router.epoch(), "view mounted");
        self.fetch_command()
    }

    pub fn navigate(&mut self, page: Page) -> Option<FetchCommand> {
        self.router.navigate(page);
        self.mount()
    }

    pub fn open_room(&mut self, page: Page, room: Account) -> Option<FetchCommand> {
        self.router.open_room(page, room);
        self.mount()
    }

    pub fn back(&mut self) -> Option<FetchCommand> {
        self.router.back();
        self.mount()
    }

    pub fn refresh(&mut self) -> Option<FetchCommand> {
        self.router.remount();
        self.mount()
    }

    /// Applies a fetch result if it belongs to the mounted view. Returns whether
    /// anything changed.
    pub fn apply_fetch(&mut self, event: FetchEvent) -> bool {
        let epoch = match &event {
            FetchEvent::Listing { epoch, .. }
            | FetchEvent::RoomDetail { epoch, .. }
            | FetchEvent::Factory { epoch, .. } => *epoch,
        };
        if !self.router.is_current(epoch) {
            debug!(epoch, current = self.router.epoch(), "discarding stale fetch result");
            return false;
        }
        match event {
            FetchEvent::Listing { result, .. } => match result {
                Ok(rooms) => {
                    self.listing = RoomListing::new(rooms);
                    self.listing_status = FetchStatus::Ready;
                    true
                }
                Err(err) => {
                    warn!(%err, "room listing fetch failed");
                    self.listing_status = FetchStatus::Failed(err.to_string());
                    true
                }
            },
            FetchEvent::RoomDetail {
                address, result, ..
            } => match self.room.as_mut() {
                Some(room) if room.address == address => {
                    room.apply(result);
                    true
                }
                _ => self.listing.apply(&address, result),
            },
            FetchEvent::Factory {
                creator,
                super_admins,
                ..
            } => {
                let status = match (&creator, &super_admins) {
                    (Err(err), Err(_)) => FetchStatus::Failed(err.to_string()),
                    _ => FetchStatus::Ready,
                };
                self.factory_admins = FactoryAdmins {
                    creator: creator.ok(),
                    super_admins: super_admins.ok(),
                    status,
                };
                true
            }
        }
    }

    pub async fn connect(&mut self) {
        match self.session.connect().await {
            Ok(account) => info!(%account, "wallet connected"),
            Err(err) => self.report(err),
        }
    }

    /// Re-mounts the view so everything derived from the account is recomputed.
    pub fn session_changed(&mut self, notice: SessionNotice) -> Option<FetchCommand> {
        match notice {
            SessionNotice::AccountChanged(state) => {
                let account = state
                    .account
                    .map(|a| a.short())
                    .unwrap_or_else(|| String::from("none"));
                self.set_status(format!("Connected as {account} ({})", state.role));
            }
            SessionNotice::Disconnected => {
                self.set_status("Wallet disconnected");
                if matches!(self.router.page(), Page::AdminPanel | Page::MyRooms) {
                    return self.navigate(Page::Landing);
                }
            }
        }
        self.refresh()
    }

    pub fn switch_account(&mut self) {
        match self.session.wallet().cloned() {
            Some(wallet) if wallet.account_count() > 1 => {
                let account = wallet.switch_next();
                if !self.session.state().is_connected() {
                    let label = wallet.label(&account).unwrap_or_else(|| account.short());
                    self.set_status(format!("Active wallet account: {label}"));
                }
            }
            Some(_) => self.set_status("Only one wallet account is unlocked"),
            None => self.report(VotingError::WalletUnavailable),
        }
    }

    pub fn disconnect_wallet(&mut self) {
        match self.session.wallet().cloned() {
            Some(wallet) if self.session.state().is_connected() => wallet.disconnect(),
            Some(_) => self.set_status("Not connected"),
            None => self.report(VotingError::WalletUnavailable),
        }
    }

    pub fn room_at(&self, index: usize) -> Option<Account> {
        self.listing.rooms().get(index).map(|room| room.address)
    }

    /// Candidates in display order; row indices in the vote view refer to this order.
    pub fn display_candidates(&self) -> Vec<Candidate> {
        let mut candidates = self
            .room
            .as_ref()
            .and_then(|room| room.detail.as_ref())
            .and_then(|detail| detail.candidates.clone())
            .unwrap_or_default();
        sort_candidates(&mut candidates);
        candidates
    }

    pub async fn vote(&mut self, index: usize) {
        let Some(candidate) = self.display_candidates().into_iter().nth(index) else {
            self.report(VotingError::invalid_input("select a candidate to vote for"));
            return;
        };
        self.submit_room(RoomAction::Vote {
            candidate_id: candidate.id,
        })
        .await;
    }

    pub async fn submit_room(&mut self, action: RoomAction) {
        let Some(address) = self.router.route().and_then(View::room) else {
            self.report(VotingError::invalid_input("open a room first"));
            return;
        };
        let SessionState { account, role } = self.session.state();
        let current = self
            .room
            .as_ref()
            .and_then(|room| room.detail.clone())
            .unwrap_or_default();
        let handle = self.gateway.room(address, account);
        match submit_room_action(&handle, &action, account.as_ref(), role, &current).await {
            Ok(write) => {
                // Reads issued before the write must not land on top of the re-read.
                self.router.remount();
                if let Some(room) = self.room.as_mut() {
                    room.apply(write.refreshed);
                }
                self.set_status(format!("{} confirmed in {}", action.label(), write.tx));
            }
            Err(err) => self.report(err),
        }
    }

    pub async fn submit_factory(&mut self, action: FactoryAction) -> Option<FetchCommand> {
        let SessionState { account, role } = self.session.state();
        let handle = self.gateway.factory(account);
        match submit_factory_action(&handle, &action, account.as_ref(), role).await {
            Ok(tx) => {
                self.set_status(format!("{} confirmed in {tx}", action.label()));
                match action {
                    FactoryAction::CreateRoom { .. } => self.navigate(Page::MyRooms),
                    _ => {
                        self.session.refresh_role().await;
                        self.refresh()
                    }
                }
            }
            Err(err) => {
                self.report(err);
                None
            }
        }
    }

    /// Turns a submitted form into an action. Malformed input is reported without
    /// any remote call.
    pub async fn submit_form(&mut self, form: FormKind, values: Vec<String>) -> Option<FetchCommand> {
        let field = |i: usize| values.get(i).map(String::as_str).unwrap_or_default();
        let outcome: voting_client::Result<Pending> = match form {
            FormKind::JoinRoom => Account::parse(field(0)).map(Pending::Join),
            FormKind::CreateRoom => {
                FactoryAction::create_room(field(0), field(1), field(2)).map(Pending::Factory)
            }
            FormKind::AddCandidate => RoomAction::add_candidate(field(0)).map(Pending::Room),
            FormKind::AddVoter => RoomAction::add_voter(field(0), field(1)).map(Pending::Room),
            FormKind::RemoveVoter => RoomAction::remove_voter(field(0)).map(Pending::Room),
            FormKind::TransferAdmin => RoomAction::transfer_admin(field(0)).map(Pending::Room),
            FormKind::AddSuperAdmin => {
                FactoryAction::add_super_admin(field(0)).map(Pending::Factory)
            }
            FormKind::RemoveSuperAdmin => {
                FactoryAction::remove_super_admin(field(0)).map(Pending::Factory)
            }
            FormKind::TransferCreator => {
                FactoryAction::transfer_creator(field(0)).map(Pending::Factory)
            }
            FormKind::DeleteRoom => {
                FactoryAction::deactivate_and_delete_room(field(0)).map(Pending::Factory)
            }
        };
        match outcome {
            Ok(Pending::Join(room)) => self.open_room(Page::RoomInteract, room),
            Ok(Pending::Room(action)) => {
                self.submit_room(action).await;
                None
            }
            Ok(Pending::Factory(action)) => self.submit_factory(action).await,
            Err(err) => {
                self.report(err);
                None
            }
        }
    }
}

enum Pending {
    Join(Account),
    Room(RoomAction),
    Factory(FactoryAction),
}

/// Checks the recorded deployment against the live chain. Anything recorded that the
/// chain contradicts stops startup.
async fn verify_deployment(
    gateway: &AlloyGateway,
    env: DeploymentEnv,
    url: &Url,
    record: Option<&DeploymentRecord>,
) -> Result<()> {
    let chain_id = gateway
        .chain_id()
        .await
        .wrap_err_with(|| format!("Failed to reach {env} node at {url}"))?;
    let code = gateway
        .factory_code()
        .await
        .wrap_err("Failed to read factory bytecode")?;
    if code.is_empty() {
        return Err(eyre!(
            "No contract deployed at factory address {} on {env}",
            gateway.factory_address()
        ));
    }
    let code_hash = compute_code_hash(&code);
    if let Some(record) = record {
        let mismatches = deployment_mismatches(record, chain_id, &code_hash);
        if !mismatches.is_empty() {
            return Err(eyre!(format_deployment_summary(
                env, url, record, &mismatches
            )));
        }
    }
    info!(chain_id, code_hash = %hash_preview(&code_hash), "factory deployment verified");
    Ok(())
}

fn deployment_mismatches(
    record: &DeploymentRecord,
    chain_id: u64,
    code_hash: &str,
) -> Vec<String> {
    let mut mismatches = Vec::new();
    if !record.is_compatible_with_chain(chain_id) {
        mismatches.push(format!(
            "chain id: recorded {}, node reports {chain_id}",
            record.chain_id.unwrap_or_default()
        ));
    }
    if !record.is_compatible_with_hash(code_hash) {
        mismatches.push(format!(
            "factory bytecode: recorded {}, deployed {}",
            hash_preview(record.code_hash.as_deref().unwrap_or_default()),
            hash_preview(code_hash)
        ));
    }
    mismatches
}

fn format_deployment_summary(
    env: DeploymentEnv,
    url: &Url,
    record: &DeploymentRecord,
    mismatches: &[String],
) -> String {
    let mut message = format!(
        "No compatible deployment recorded for {env} at {url}.\n\nRecorded deployment for {env}:\n  \
         factory: {}\n  network: {}\n  recorded at: {}",
        record.factory_address, record.network_url, record.recorded_at
    );
    if let Some(height) = record.deployment_block_height {
        message.push_str(&format!("\n  block height: {height}"));
    }
    message.push_str("\n\nMismatches:");
    for mismatch in mismatches {
        message.push_str(&format!("\n  - {mismatch}"));
    }
    message
}

fn hash_preview(hash: &str) -> String {
    let mut preview: String = hash.chars().take(16).collect();
    if hash.chars().nth(16).is_some() {
        preview.push_str("...");
    }
    preview
}

pub async fn fetch_worker<G: ContractGateway>(
    gateway: G,
    mut cmd_rx: mpsc::UnboundedReceiver<FetchCommand>,
    event_tx: mpsc::UnboundedSender<FetchEvent>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            FetchCommand::Listing { epoch, scope } => {
                tokio::spawn(fetch_listing(gateway.clone(), epoch, scope, event_tx.clone()));
            }
            FetchCommand::Room { epoch, address } => {
                tokio::spawn(fetch_room(gateway.clone(), epoch, address, event_tx.clone()));
            }
            FetchCommand::Factory { epoch } => {
                tokio::spawn(fetch_factory(gateway.clone(), epoch, event_tx.clone()));
            }
            FetchCommand::Shutdown => break,
        }
    }
}

/// Sends the summaries first, then each room's detail as it completes.
async fn fetch_listing<G: ContractGateway>(
    gateway: G,
    epoch: u64,
    scope: ListingScope,
    event_tx: mpsc::UnboundedSender<FetchEvent>,
) {
    let factory = gateway.factory(None);
    let result = match scope {
        ListingScope::All => fetch_all_rooms(&factory).await,
        ListingScope::CreatedBy(account) => fetch_room_summaries(&factory, account.as_ref()).await,
    };
    let rooms = result.as_ref().map(Vec::clone).unwrap_or_default();
    if event_tx.send(FetchEvent::Listing { epoch, result }).is_err() {
        return;
    }
    let mut details = stream_room_details(&gateway, &rooms);
    while let Some((address, result)) = details.next().await {
        if event_tx
            .send(FetchEvent::RoomDetail {
                epoch,
                address,
                result,
            })
            .is_err()
        {
            break;
        }
    }
}

async fn fetch_room<G: ContractGateway>(
    gateway: G,
    epoch: u64,
    address: Account,
    event_tx: mpsc::UnboundedSender<FetchEvent>,
) {
    let result = fetch_room_detail(&gateway.room(address, None)).await;
    let _ = event_tx.send(FetchEvent::RoomDetail {
        epoch,
        address,
        result,
    });
}

async fn fetch_factory<G: ContractGateway>(
    gateway: G,
    epoch: u64,
    event_tx: mpsc::UnboundedSender<FetchEvent>,
) {
    let factory = gateway.factory(None);
    let (creator, super_admins) = tokio::join!(factory.creator(), factory.super_admins());
    let _ = event_tx.send(FetchEvent::Factory {
        epoch,
        creator,
        super_admins,
    });
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let controller = AppController::new(config).await?;
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    info!("UI ready");
    let res = run_loop(controller, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

fn show_processing_status<G: ContractGateway>(
    controller: &mut AppController<G>,
    ui_state: &mut ui::UiState,
    message: impl Into<String>,
    context: &'static str,
) -> Result<()> {
    controller.set_status(message);
    ui::draw(ui_state, &controller.build_snapshot()).wrap_err(context)
}

async fn next_wallet_event(
    events: &mut Option<mpsc::UnboundedReceiver<voting_client::wallet::WalletEvent>>,
) -> Option<voting_client::wallet::WalletEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_user_event<G: ContractGateway>(
    controller: &mut AppController<G>,
    ui_state: &mut ui::UiState,
    event: UserEvent,
) -> Result<Flow> {
    let fetch = match event {
        UserEvent::Quit => return Ok(Flow::Quit),
        UserEvent::Redraw => None,
        UserEvent::Back => controller.back(),
        UserEvent::Refresh => controller.refresh(),
        UserEvent::Navigate(page) => controller.navigate(page),
        UserEvent::Connect => {
            show_processing_status(controller, ui_state, "Connecting wallet...", "draw failed")?;
            controller.connect().await;
            None
        }
        UserEvent::SwitchAccount => {
            controller.switch_account();
            None
        }
        UserEvent::DisconnectWallet => {
            controller.disconnect_wallet();
            None
        }
        UserEvent::OpenRoom { index, page } => match controller.room_at(index) {
            Some(room) => controller.open_room(page, room),
            None => None,
        },
        UserEvent::RoomPage(page) => match controller.router().active_room() {
            Some(room) => controller.open_room(page, room),
            None => None,
        },
        UserEvent::Vote { index } => {
            show_processing_status(controller, ui_state, "Submitting vote...", "draw failed")?;
            controller.vote(index).await;
            None
        }
        UserEvent::Room(action) => {
            let message = format!("Submitting {}...", action.label());
            show_processing_status(controller, ui_state, message, "draw failed")?;
            controller.submit_room(action).await;
            None
        }
        UserEvent::Factory(action) => {
            let message = format!("Submitting {}...", action.label());
            show_processing_status(controller, ui_state, message, "draw failed")?;
            controller.submit_factory(action).await
        }
        UserEvent::Submit { form, values } => {
            if form != FormKind::JoinRoom {
                let message = format!("Submitting {}...", form.title());
                show_processing_status(controller, ui_state, message, "draw failed")?;
            }
            controller.submit_form(form, values).await
        }
    };
    Ok(Flow::Continue(fetch))
}

async fn run_loop<G: ContractGateway>(
    mut controller: AppController<G>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    info!("Running app loop");
    let (fetch_cmd_tx, fetch_cmd_rx) = mpsc::unbounded_channel();
    let (fetch_event_tx, mut fetch_event_rx) = mpsc::unbounded_channel();
    let worker_handle = tokio::spawn(fetch_worker(
        controller.gateway().clone(),
        fetch_cmd_rx,
        fetch_event_tx,
    ));
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    controller.watch_session(notice_tx);
    let mut wallet_events = controller.take_wallet_events();

    ui::draw(ui_state, &controller.build_snapshot()).wrap_err("initial draw failed")?;

    loop {
        let mut fetch = None;
        tokio::select! {
            maybe_event = fetch_event_rx.recv() => {
                let Some(event) = maybe_event else {
                    warn!("fetch worker channel closed");
                    break;
                };
                if !controller.apply_fetch(event) {
                    continue;
                }
            }
            Some(event) = next_wallet_event(&mut wallet_events) => {
                controller.handle_wallet_event(event).await;
            }
            Some(notice) = notice_rx.recv() => {
                fetch = controller.session_changed(notice);
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match handle_user_event(&mut controller, ui_state, ev).await? {
                    Flow::Quit => break,
                    Flow::Continue(cmd) => fetch = cmd,
                }
            }
        }
        if let Some(cmd) = fetch {
            let _ = fetch_cmd_tx.send(cmd);
        }
        ui::draw(ui_state, &controller.build_snapshot()).wrap_err("draw failed")?;
    }

    let _ = fetch_cmd_tx.send(FetchCommand::Shutdown);
    if let Err(err) = worker_handle.await {
        warn!(?err, "fetch worker ended abnormally");
    }
    Ok(())
}
