use thiserror::Error;

pub type Result<T, E = VotingError> = std::result::Result<T, E>;

/// Failure of a single call against a contract collaborator.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("call reverted: {0}")]
    Reverted(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("no wallet provider available")]
    Unavailable,
    #[error("wallet returned no accounts")]
    NoAccounts,
    #[error("wallet request rejected: {0}")]
    Rejected(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    WalletUnavailable,
    Unauthorized,
    RemoteRead,
    RemoteWrite,
    InvalidInput,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VotingError {
    #[error("no wallet detected; install or unlock a wallet to continue")]
    WalletUnavailable,
    #[error("wallet error: {0}")]
    Wallet(WalletError),
    #[error("{action} is not permitted: {reason}")]
    Unauthorized {
        action: &'static str,
        reason: &'static str,
    },
    #[error("read failed: {0}")]
    RemoteRead(#[source] CallError),
    #[error("{action} failed: {source}")]
    RemoteWrite {
        action: &'static str,
        #[source]
        source: CallError,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl VotingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VotingError::WalletUnavailable | VotingError::Wallet(_) => {
                ErrorKind::WalletUnavailable
            }
            VotingError::Unauthorized { .. } => ErrorKind::Unauthorized,
            VotingError::RemoteRead(_) => ErrorKind::RemoteRead,
            VotingError::RemoteWrite { .. } => ErrorKind::RemoteWrite,
            VotingError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        VotingError::InvalidInput(message.into())
    }
}

impl From<WalletError> for VotingError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Unavailable => VotingError::WalletUnavailable,
            other => VotingError::Wallet(other),
        }
    }
}
