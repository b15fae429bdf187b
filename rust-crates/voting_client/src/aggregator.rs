//! Multi-call read views of factory and room state.

use crate::{
    Account,
    CallError,
    Result,
    VotingError,
    contracts::{
        CallResult,
        ContractGateway,
        FactoryReader,
        RoomReader,
    },
    room::{
        PartialRoomDetail,
        RoomFetch,
        RoomSummary,
    },
};
use futures::{
    Stream,
    future::join_all,
    stream::FuturesUnordered,
};
use tracing::{
    debug,
    warn,
};

/// All rooms in the factory registry, in registry order.
pub async fn fetch_all_rooms<F>(factory: &F) -> Result<Vec<RoomSummary>>
where
    F: FactoryReader + Sync,
{
    factory.rooms().await.map_err(VotingError::RemoteRead)
}

/// Rooms created by `account`. Without an account there is nothing to show and the
/// factory is not queried.
pub async fn fetch_room_summaries<F>(
    factory: &F,
    account: Option<&Account>,
) -> Result<Vec<RoomSummary>>
where
    F: FactoryReader + Sync,
{
    let Some(account) = account else {
        return Ok(Vec::new());
    };
    let rooms = fetch_all_rooms(factory).await?;
    Ok(created_by(&rooms, account))
}

pub fn created_by(rooms: &[RoomSummary], account: &Account) -> Vec<RoomSummary> {
    rooms
        .iter()
        .filter(|room| room.created_by == *account)
        .cloned()
        .collect()
}

/// Reads every room field concurrently and waits for the whole batch.
///
/// Fields whose read failed stay `None`. If no read succeeded the room is reported
/// unreachable instead of returning an all-unknown snapshot.
pub async fn fetch_room_detail<R>(room: &R) -> Result<RoomFetch>
where
    R: RoomReader + Sync,
{
    let (
        room_name,
        description,
        room_admin,
        super_admin,
        voters,
        candidates,
        is_active,
        voting_started,
        voting_ended,
        max_voters,
        factory,
    ) = tokio::join!(
        room.room_name(),
        room.description(),
        room.room_admin(),
        room.super_admin(),
        room.voters(),
        room.candidates(),
        room.is_active(),
        room.voting_started(),
        room.voting_ended(),
        room.max_voters(),
        room.factory(),
    );

    let mut last_error = None;
    let partial = PartialRoomDetail {
        room_name: keep(room_name, &mut last_error),
        description: keep(description, &mut last_error),
        room_admin: keep(room_admin, &mut last_error),
        super_admin: keep(super_admin, &mut last_error),
        voters: keep(voters, &mut last_error),
        candidates: keep(candidates, &mut last_error),
        is_active: keep(is_active, &mut last_error),
        voting_started: keep(voting_started, &mut last_error),
        voting_ended: keep(voting_ended, &mut last_error),
        max_voters: keep(max_voters, &mut last_error),
        factory: keep(factory, &mut last_error),
    };

    match last_error {
        Some(err) if partial.is_empty() => Err(VotingError::RemoteRead(err)),
        _ => Ok(RoomFetch::from_partial(partial)),
    }
}

/// Fetches detail for every listed room concurrently. One room failing has no
/// effect on the others; results come back in input order.
pub async fn enrich_rooms<G>(
    gateway: &G,
    rooms: &[RoomSummary],
) -> Vec<(Account, Result<RoomFetch>)>
where
    G: ContractGateway,
{
    join_all(rooms.iter().map(|summary| enrich_one(gateway, summary.address))).await
}

/// Like [`enrich_rooms`] but yields each room as soon as its batch completes, in
/// completion order.
pub fn stream_room_details<G>(
    gateway: &G,
    rooms: &[RoomSummary],
) -> impl Stream<Item = (Account, Result<RoomFetch>)> + Send + 'static
where
    G: ContractGateway,
{
    rooms
        .iter()
        .map(|summary| enrich_one(gateway, summary.address))
        .collect::<FuturesUnordered<_>>()
}

fn enrich_one<G>(
    gateway: &G,
    address: Account,
) -> impl Future<Output = (Account, Result<RoomFetch>)> + Send + 'static
where
    G: ContractGateway,
{
    let handle = gateway.room(address, None);
    async move {
        let result = fetch_room_detail(&handle).await;
        if let Err(err) = &result {
            warn!(room = %address, %err, "room detail fetch failed");
        }
        (address, result)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FetchStatus {
    #[default]
    Loading,
    Ready,
    Failed(String),
}

/// One room as a view knows it: the registry row (if known), the latest merged
/// snapshot and where the most recent fetch stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomState {
    pub address: Account,
    pub summary: Option<RoomSummary>,
    pub detail: Option<PartialRoomDetail>,
    pub status: FetchStatus,
}

impl RoomState {
    pub fn new(address: Account) -> Self {
        Self {
            address,
            summary: None,
            detail: None,
            status: FetchStatus::Loading,
        }
    }

    pub fn from_summary(summary: RoomSummary) -> Self {
        Self {
            address: summary.address,
            summary: Some(summary),
            detail: None,
            status: FetchStatus::Loading,
        }
    }

    /// Merges a fetch result. A failed fetch leaves the snapshot as it was.
    pub fn apply(&mut self, result: Result<RoomFetch>) {
        match result {
            Ok(fetch) => {
                let partial = fetch.into_partial();
                match self.detail.as_mut() {
                    Some(detail) => detail.merge(partial),
                    None => self.detail = Some(partial),
                }
                self.status = FetchStatus::Ready;
            }
            Err(err) => {
                self.status = FetchStatus::Failed(err.to_string());
            }
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.detail
            .as_ref()
            .and_then(|d| d.room_name.as_deref())
            .or_else(|| self.summary.as_ref().map(|s| s.room_name.as_str()))
    }
}

/// Rooms shown by a listing view, each patched independently as results arrive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoomListing {
    rooms: Vec<RoomState>,
}

impl RoomListing {
    pub fn new(summaries: Vec<RoomSummary>) -> Self {
        Self {
            rooms: summaries.into_iter().map(RoomState::from_summary).collect(),
        }
    }

    pub fn rooms(&self) -> &[RoomState] {
        &self.rooms
    }

    pub fn get(&self, address: &Account) -> Option<&RoomState> {
        self.rooms.iter().find(|room| room.address == *address)
    }

    /// Returns false when the room is no longer listed; the result is dropped.
    pub fn apply(&mut self, address: &Account, result: Result<RoomFetch>) -> bool {
        match self.rooms.iter_mut().find(|room| room.address == *address) {
            Some(room) => {
                room.apply(result);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

fn keep<T>(result: CallResult<T>, last_error: &mut Option<CallError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(%err, "room field read failed");
            *last_error = Some(err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        ErrorKind,
        fakes::FakeChain,
        room::{
            Candidate,
            RoomDetail,
            RoomField,
        },
    };
    use proptest::prelude::*;

    fn account(byte: u8) -> Account {
        Account::from_bytes([byte; 20])
    }

    fn detail(name: &str, admin: Account) -> RoomDetail {
        RoomDetail {
            room_name: name.to_string(),
            description: format!("{name} description"),
            room_admin: admin,
            super_admin: account(1),
            voters: Vec::new(),
            candidates: vec![Candidate {
                id: 0,
                name: "Alice".to_string(),
                vote_count: 2,
            }],
            is_active: true,
            voting_started: false,
            voting_ended: false,
            max_voters: 3,
            factory: account(1),
        }
    }

    fn chain_with_rooms() -> FakeChain {
        let chain = FakeChain::new(account(1));
        chain.insert_room(account(10), account(20), detail("X", account(20)));
        chain.insert_room(account(11), account(21), detail("Y", account(21)));
        chain.insert_room(account(12), account(20), detail("Z", account(20)));
        chain
    }

    #[tokio::test]
    async fn fetch_room_summaries__filters_to_creator_in_registry_order() {
        // given
        let chain = chain_with_rooms();

        // when
        let rooms = fetch_room_summaries(&chain.factory(), Some(&account(20)))
            .await
            .unwrap();

        // then
        let names: Vec<_> = rooms.iter().map(|r| r.room_name.as_str()).collect();
        assert_eq!(names, vec!["X", "Z"]);
    }

    #[tokio::test]
    async fn fetch_room_summaries__no_account__skips_remote_call() {
        let chain = chain_with_rooms();

        let rooms = fetch_room_summaries(&chain.factory(), None).await.unwrap();

        assert!(rooms.is_empty());
        assert_eq!(chain.factory_reads(), 0);
    }

    #[tokio::test]
    async fn fetch_room_detail__all_reads_succeed__is_complete() {
        let chain = chain_with_rooms();

        let fetch = fetch_room_detail(&chain.room(account(10))).await.unwrap();

        assert_eq!(fetch, RoomFetch::Complete(detail("X", account(20))));
    }

    #[tokio::test]
    async fn fetch_room_detail__one_field_fails__other_fields_populate() {
        // given
        let chain = chain_with_rooms();
        chain.fail_field(account(10), RoomField::Voters);

        // when
        let fetch = fetch_room_detail(&chain.room(account(10))).await.unwrap();

        // then
        let partial = fetch.into_partial();
        assert_eq!(partial.missing_fields(), vec![RoomField::Voters]);
        assert_eq!(partial.room_name.as_deref(), Some("X"));
    }

    #[tokio::test]
    async fn fetch_room_detail__room_unreachable__reports_read_failure() {
        let chain = chain_with_rooms();
        chain.set_room_down(account(10), true);

        let err = fetch_room_detail(&chain.room(account(10))).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RemoteRead);
    }

    #[tokio::test]
    async fn enrich_rooms__one_room_fails__others_still_populate() {
        // given
        let chain = chain_with_rooms();
        chain.set_room_down(account(10), true);
        let summaries = fetch_all_rooms(&chain.factory()).await.unwrap();
        let mut listing = RoomListing::new(summaries.clone());

        // when
        for (address, result) in enrich_rooms(&chain.gateway(), &summaries).await {
            listing.apply(&address, result);
        }

        // then
        let x = listing.get(&account(10)).unwrap();
        assert!(matches!(x.status, FetchStatus::Failed(_)));
        assert_eq!(x.detail, None);
        let y = listing.get(&account(11)).unwrap();
        assert_eq!(y.status, FetchStatus::Ready);
        assert_eq!(
            y.detail.clone().and_then(PartialRoomDetail::into_complete),
            Some(detail("Y", account(21)))
        );
    }

    #[tokio::test]
    async fn stream_room_details__yields_every_room_once() {
        use futures::StreamExt;

        // given
        let chain = chain_with_rooms();
        chain.fail_field(account(12), RoomField::Candidates);
        let summaries = fetch_all_rooms(&chain.factory()).await.unwrap();

        // when
        let mut seen: Vec<_> = stream_room_details(&chain.gateway(), &summaries)
            .map(|(address, result)| (address, result.map(|f| f.is_complete())))
            .collect()
            .await;

        // then
        seen.sort_by_key(|(address, _)| *address);
        assert_eq!(
            seen,
            vec![
                (account(10), Ok(true)),
                (account(11), Ok(true)),
                (account(12), Ok(false)),
            ]
        );
    }

    #[test]
    fn apply__results_in_any_order__patch_their_own_rows() {
        // given
        let summaries = vec![
            RoomSummary {
                address: account(10),
                room_name: "X".to_string(),
                created_by: account(20),
            },
            RoomSummary {
                address: account(11),
                room_name: "Y".to_string(),
                created_by: account(21),
            },
        ];
        let mut listing = RoomListing::new(summaries);

        // when
        listing.apply(
            &account(11),
            Ok(RoomFetch::Complete(detail("Y", account(21)))),
        );
        let dropped = listing.apply(
            &account(99),
            Ok(RoomFetch::Complete(detail("gone", account(21)))),
        );

        // then
        assert!(!dropped);
        assert_eq!(listing.get(&account(10)).unwrap().status, FetchStatus::Loading);
        assert_eq!(listing.get(&account(11)).unwrap().status, FetchStatus::Ready);
    }

    #[test]
    fn apply__failure_after_success__keeps_prior_snapshot() {
        // given
        let mut state = RoomState::new(account(10));
        state.apply(Ok(RoomFetch::Complete(detail("X", account(20)))));

        // when
        state.apply(Err(VotingError::RemoteRead(crate::CallError::Transport(
            "connection reset".to_string(),
        ))));

        // then
        assert!(matches!(state.status, FetchStatus::Failed(_)));
        assert_eq!(state.display_name(), Some("X"));
    }

    proptest! {
        #[test]
        fn created_by__is_idempotent(creators in prop::collection::vec(0u8..3, 0..10)) {
            let rooms: Vec<_> = creators
                .iter()
                .enumerate()
                .map(|(i, c)| RoomSummary {
                    address: account(100 + i as u8),
                    room_name: format!("room {i}"),
                    created_by: account(*c),
                })
                .collect();
            let once = created_by(&rooms, &account(1));
            let twice = created_by(&once, &account(1));
            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(once, created_by(&rooms, &account(1)));
        }
    }
}
