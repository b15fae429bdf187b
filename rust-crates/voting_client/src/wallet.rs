use crate::{
    Account,
    WalletError,
};
use tokio::sync::mpsc;

/// Notification pushed by the wallet when the user acts outside the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletEvent {
    AccountsChanged(Vec<Account>),
    Disconnect,
}

pub trait WalletProvider: Send + Sync {
    /// Asks the wallet for account access. The first account is the active one.
    fn request_accounts(
        &self,
    ) -> impl Future<Output = Result<Vec<Account>, WalletError>> + Send;

    /// Event stream for this wallet. Only the first call returns a receiver.
    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<WalletEvent>>;
}
