//! Client-side core of the voting rooms application: who the connected account is,
//! what it may do, and consistent read views of factory and room contract state.

pub mod account;
pub mod actions;
pub mod aggregator;
pub mod chain;
pub mod contracts;
pub mod error;
pub mod role;
pub mod room;
pub mod session;
pub mod wallet;

#[cfg(any(test, feature = "test-helpers"))]
pub mod fakes;

pub use account::Account;
pub use error::{
    CallError,
    ErrorKind,
    Result,
    VotingError,
    WalletError,
};
pub use role::Role;
