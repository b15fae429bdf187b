//! Seams to the external contract collaborators.
//!
//! Reads return one value per call so the aggregator can fan them out and tolerate
//! individual failures. Writes resolve only once the transaction is confirmed.

use crate::{
    Account,
    CallError,
    actions::{
        FactoryAction,
        RoomAction,
    },
    room::{
        Candidate,
        RoomSummary,
        Voter,
    },
};
use alloy::primitives::TxHash;

pub type CallResult<T> = std::result::Result<T, CallError>;

pub trait FactoryReader {
    fn creator(&self) -> impl Future<Output = CallResult<Account>> + Send;

    fn super_admins(&self) -> impl Future<Output = CallResult<Vec<Account>>> + Send;

    fn rooms(&self) -> impl Future<Output = CallResult<Vec<RoomSummary>>> + Send;
}

pub trait FactoryWriter {
    fn submit(
        &self,
        action: &FactoryAction,
    ) -> impl Future<Output = CallResult<TxHash>> + Send;
}

pub trait RoomReader {
    fn room_name(&self) -> impl Future<Output = CallResult<String>> + Send;
    fn description(&self) -> impl Future<Output = CallResult<String>> + Send;
    fn room_admin(&self) -> impl Future<Output = CallResult<Account>> + Send;
    fn super_admin(&self) -> impl Future<Output = CallResult<Account>> + Send;
    fn voters(&self) -> impl Future<Output = CallResult<Vec<Voter>>> + Send;
    fn candidates(&self) -> impl Future<Output = CallResult<Vec<Candidate>>> + Send;
    fn is_active(&self) -> impl Future<Output = CallResult<bool>> + Send;
    fn voting_started(&self) -> impl Future<Output = CallResult<bool>> + Send;
    fn voting_ended(&self) -> impl Future<Output = CallResult<bool>> + Send;
    fn max_voters(&self) -> impl Future<Output = CallResult<u64>> + Send;
    fn factory(&self) -> impl Future<Output = CallResult<Account>> + Send;
}

pub trait RoomWriter {
    fn submit(&self, action: &RoomAction)
    -> impl Future<Output = CallResult<TxHash>> + Send;
}

/// Hands out contract handles. `sender` is the account writes are signed as;
/// `None` gives read-only handles.
pub trait ContractGateway: Clone + Send + Sync + 'static {
    type Factory: FactoryReader + FactoryWriter + Send + Sync + 'static;
    type Room: RoomReader + RoomWriter + Send + Sync + 'static;

    fn factory(&self, sender: Option<Account>) -> Self::Factory;

    fn room(&self, address: Account, sender: Option<Account>) -> Self::Room;
}
