//! Process-wide session: the connected account and its role.
//!
//! All mutation goes through [`SessionStore::connect`] and
//! [`SessionStore::handle_wallet_event`]. Observers read published snapshots through a
//! `watch` channel; account and role are always published together.

use crate::{
    Account,
    Result,
    Role,
    VotingError,
    WalletError,
    contracts::FactoryReader,
    role::resolve_role,
    wallet::{
        WalletEvent,
        WalletProvider,
    },
};
use tokio::sync::{
    mpsc,
    watch,
};
use tracing::{
    debug,
    info,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub account: Option<Account>,
    pub role: Role,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        self.account.is_some()
    }
}

type AccountHandler = Box<dyn Fn(&SessionState) + Send + Sync>;
type DisconnectHandler = Box<dyn Fn() + Send + Sync>;

pub struct SessionStore<W, F> {
    wallet: Option<W>,
    factory: F,
    state: watch::Sender<SessionState>,
    events: Option<mpsc::UnboundedReceiver<WalletEvent>>,
    account_handlers: Vec<AccountHandler>,
    disconnect_handlers: Vec<DisconnectHandler>,
}

impl<W, F> SessionStore<W, F>
where
    W: WalletProvider,
    F: FactoryReader + Sync,
{
    /// Starts uninitialized: no account, role `Guest`.
    pub fn new(wallet: Option<W>, factory: F) -> Self {
        let events = wallet.as_ref().and_then(|w| w.subscribe());
        let (state, _) = watch::channel(SessionState::default());
        Self {
            wallet,
            factory,
            state,
            events,
            account_handlers: Vec::new(),
            disconnect_handlers: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn has_wallet(&self) -> bool {
        self.wallet.is_some()
    }

    pub fn wallet(&self) -> Option<&W> {
        self.wallet.as_ref()
    }

    pub fn on_account_changed(&mut self, handler: impl Fn(&SessionState) + Send + Sync + 'static) {
        self.account_handlers.push(Box::new(handler));
    }

    pub fn on_disconnect(&mut self, handler: impl Fn() + Send + Sync + 'static) {
        self.disconnect_handlers.push(Box::new(handler));
    }

    /// The wallet's event stream, for the owner's event loop to drive
    /// [`Self::handle_wallet_event`]. Returns `None` after the first call.
    pub fn take_wallet_events(&mut self) -> Option<mpsc::UnboundedReceiver<WalletEvent>> {
        self.events.take()
    }

    pub async fn connect(&mut self) -> Result<Account> {
        let wallet = self.wallet.as_ref().ok_or(VotingError::WalletUnavailable)?;
        let accounts = wallet.request_accounts().await?;
        let account = accounts
            .first()
            .copied()
            .ok_or(VotingError::Wallet(WalletError::NoAccounts))?;
        self.switch_to(account).await;
        Ok(account)
    }

    pub async fn handle_wallet_event(&mut self, event: WalletEvent) {
        match event {
            WalletEvent::AccountsChanged(accounts) => match accounts.first() {
                Some(account) => self.switch_to(*account).await,
                None => self.disconnect(),
            },
            WalletEvent::Disconnect => self.disconnect(),
        }
    }

    /// Re-resolves the role of the current account, e.g. after factory admin changes.
    pub async fn refresh_role(&mut self) -> Role {
        let account = self.state.borrow().account;
        let role = resolve_role(account.as_ref(), &self.factory).await;
        let changed = self.state.send_if_modified(|state| {
            if state.account == account && state.role != role {
                state.role = role;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(%role, "session role refreshed");
        }
        self.state.borrow().role
    }

    async fn switch_to(&mut self, account: Account) {
        let role = resolve_role(Some(&account), &self.factory).await;
        let next = SessionState {
            account: Some(account),
            role,
        };
        self.state.send_replace(next.clone());
        info!(%account, %role, "session account set");
        for handler in &self.account_handlers {
            handler(&next);
        }
    }

    fn disconnect(&mut self) {
        self.state.send_replace(SessionState::default());
        info!("session disconnected");
        for handler in &self.disconnect_handlers {
            handler();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        ErrorKind,
        fakes::{
            FakeChain,
            FakeFactory,
            FakeWallet,
        },
    };
    use std::sync::{
        Arc,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    };

    fn account(byte: u8) -> Account {
        Account::from_bytes([byte; 20])
    }

    fn store(
        chain: &FakeChain,
        wallet: Option<FakeWallet>,
    ) -> SessionStore<FakeWallet, FakeFactory> {
        SessionStore::new(wallet, chain.factory())
    }

    #[tokio::test]
    async fn connect__no_wallet__is_wallet_unavailable() {
        let chain = FakeChain::new(account(1));
        let mut session = store(&chain, None);

        let err = session.connect().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::WalletUnavailable);
        assert_eq!(session.state(), SessionState::default());
    }

    #[tokio::test]
    async fn connect__stores_first_account_with_resolved_role() {
        // given
        let chain = FakeChain::new(account(1));
        let wallet = FakeWallet::new(vec![account(1), account(2)]);
        let mut session = store(&chain, Some(wallet));

        // when
        let connected = session.connect().await.unwrap();

        // then
        assert_eq!(connected, account(1));
        assert_eq!(
            session.state(),
            SessionState {
                account: Some(account(1)),
                role: Role::Creator,
            }
        );
    }

    #[tokio::test]
    async fn connect__wallet_returns_nothing__is_an_error_and_state_unchanged() {
        let chain = FakeChain::new(account(1));
        let mut session = store(&chain, Some(FakeWallet::new(Vec::new())));

        let err = session.connect().await.unwrap_err();

        assert_eq!(err, VotingError::Wallet(WalletError::NoAccounts));
        assert!(!session.state().is_connected());
    }

    #[tokio::test]
    async fn handle_wallet_event__accounts_changed__re_resolves_role() {
        // given
        let chain = FakeChain::new(account(1));
        chain.add_super_admin(account(2));
        let wallet = FakeWallet::new(vec![account(1)]);
        let mut session = store(&chain, Some(wallet));
        session.connect().await.unwrap();

        // when
        session
            .handle_wallet_event(WalletEvent::AccountsChanged(vec![account(2)]))
            .await;

        // then
        assert_eq!(session.state().role, Role::SuperAdmin);
        assert_eq!(session.state().account, Some(account(2)));
    }

    #[tokio::test]
    async fn handle_wallet_event__empty_accounts__acts_as_disconnect() {
        // given
        let chain = FakeChain::new(account(1));
        let mut session = store(&chain, Some(FakeWallet::new(vec![account(1)])));
        session.connect().await.unwrap();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = disconnects.clone();
        session.on_disconnect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // when
        session
            .handle_wallet_event(WalletEvent::AccountsChanged(Vec::new()))
            .await;

        // then
        assert_eq!(session.state(), SessionState::default());
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handle_wallet_event__disconnect__observers_never_see_half_reset_state() {
        // given
        let chain = FakeChain::new(account(1));
        let mut session = store(&chain, Some(FakeWallet::new(vec![account(1)])));
        session.connect().await.unwrap();
        let mut observer = session.subscribe();
        observer.borrow_and_update();

        // when
        session.handle_wallet_event(WalletEvent::Disconnect).await;

        // then
        assert!(observer.has_changed().unwrap());
        let seen = observer.borrow_and_update().clone();
        assert_eq!(seen.account, None);
        assert_eq!(seen.role, Role::Guest);
    }

    #[tokio::test]
    async fn on_account_changed__receives_account_and_role_together() {
        // given
        let chain = FakeChain::new(account(1));
        let mut session = store(&chain, Some(FakeWallet::new(vec![account(3)])));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.on_account_changed(move |state| {
            sink.lock().unwrap().push(state.clone());
        });

        // when
        session.connect().await.unwrap();

        // then
        assert_eq!(
            *seen.lock().unwrap(),
            vec![SessionState {
                account: Some(account(3)),
                role: Role::User,
            }]
        );
    }

    #[tokio::test]
    async fn take_wallet_events__forwards_pushed_events_once() {
        // given
        let chain = FakeChain::new(account(1));
        let wallet = FakeWallet::new(vec![account(1)]);
        let mut session = store(&chain, Some(wallet.clone()));

        // when
        let mut events = session.take_wallet_events().unwrap();
        wallet.emit(WalletEvent::Disconnect);

        // then
        assert!(session.take_wallet_events().is_none());
        assert_eq!(events.recv().await, Some(WalletEvent::Disconnect));
    }

    #[tokio::test]
    async fn refresh_role__after_promotion__publishes_new_role() {
        // given
        let chain = FakeChain::new(account(1));
        let mut session = store(&chain, Some(FakeWallet::new(vec![account(4)])));
        session.connect().await.unwrap();
        chain.add_super_admin(account(4));

        // when
        let role = session.refresh_role().await;

        // then
        assert_eq!(role, Role::SuperAdmin);
        assert_eq!(session.state().role, Role::SuperAdmin);
    }

    #[tokio::test]
    async fn handle_wallet_event__mixed_case_spellings__resolve_identically() {
        // given
        let chain = FakeChain::new(account(1));
        chain.add_super_admin(Account::parse("0xabcdefabcdefabcdefabcdefabcdefabcdefabcd").unwrap());
        let upper = Account::parse("0xABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD").unwrap();
        let lower = Account::parse("0xabcdefabcdefabcdefabcdefabcdefabcdefabcd").unwrap();
        let mut session = store(&chain, Some(FakeWallet::new(vec![account(1)])));

        // when
        session
            .handle_wallet_event(WalletEvent::AccountsChanged(vec![upper]))
            .await;
        let upper_state = session.state();
        session
            .handle_wallet_event(WalletEvent::AccountsChanged(vec![lower]))
            .await;

        // then
        assert_eq!(upper_state, session.state());
        assert_eq!(upper_state.role, Role::SuperAdmin);
    }
}
