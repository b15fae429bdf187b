use crate::{
    Account,
    account::same_account,
};
use std::cmp::Ordering;

/// One row of the factory's room registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomSummary {
    pub address: Account,
    pub room_name: String,
    pub created_by: Account,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub id: u64,
    pub name: String,
    pub vote_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Voter {
    pub address: Account,
    pub name: String,
}

/// The reads that make up one room snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoomField {
    RoomName,
    Description,
    RoomAdmin,
    SuperAdmin,
    Voters,
    Candidates,
    IsActive,
    VotingStarted,
    VotingEnded,
    MaxVoters,
    Factory,
}

impl RoomField {
    pub const ALL: [RoomField; 11] = [
        RoomField::RoomName,
        RoomField::Description,
        RoomField::RoomAdmin,
        RoomField::SuperAdmin,
        RoomField::Voters,
        RoomField::Candidates,
        RoomField::IsActive,
        RoomField::VotingStarted,
        RoomField::VotingEnded,
        RoomField::MaxVoters,
        RoomField::Factory,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RoomField::RoomName => "name",
            RoomField::Description => "description",
            RoomField::RoomAdmin => "room admin",
            RoomField::SuperAdmin => "super admin",
            RoomField::Voters => "voters",
            RoomField::Candidates => "candidates",
            RoomField::IsActive => "active flag",
            RoomField::VotingStarted => "voting started flag",
            RoomField::VotingEnded => "voting ended flag",
            RoomField::MaxVoters => "max voters",
            RoomField::Factory => "factory",
        }
    }
}

/// A fully fetched room snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomDetail {
    pub room_name: String,
    pub description: String,
    pub room_admin: Account,
    pub super_admin: Account,
    pub voters: Vec<Voter>,
    pub candidates: Vec<Candidate>,
    pub is_active: bool,
    pub voting_started: bool,
    pub voting_ended: bool,
    pub max_voters: u64,
    pub factory: Account,
}

/// A room snapshot where some reads may not have completed. `None` means unknown,
/// never a default value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartialRoomDetail {
    pub room_name: Option<String>,
    pub description: Option<String>,
    pub room_admin: Option<Account>,
    pub super_admin: Option<Account>,
    pub voters: Option<Vec<Voter>>,
    pub candidates: Option<Vec<Candidate>>,
    pub is_active: Option<bool>,
    pub voting_started: Option<bool>,
    pub voting_ended: Option<bool>,
    pub max_voters: Option<u64>,
    pub factory: Option<Account>,
}

impl PartialRoomDetail {
    pub fn missing_fields(&self) -> Vec<RoomField> {
        RoomField::ALL
            .into_iter()
            .filter(|field| !self.has(*field))
            .collect()
    }

    pub fn has(&self, field: RoomField) -> bool {
        match field {
            RoomField::RoomName => self.room_name.is_some(),
            RoomField::Description => self.description.is_some(),
            RoomField::RoomAdmin => self.room_admin.is_some(),
            RoomField::SuperAdmin => self.super_admin.is_some(),
            RoomField::Voters => self.voters.is_some(),
            RoomField::Candidates => self.candidates.is_some(),
            RoomField::IsActive => self.is_active.is_some(),
            RoomField::VotingStarted => self.voting_started.is_some(),
            RoomField::VotingEnded => self.voting_ended.is_some(),
            RoomField::MaxVoters => self.max_voters.is_some(),
            RoomField::Factory => self.factory.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        RoomField::ALL.into_iter().all(|field| !self.has(field))
    }

    /// Field-level merge: every field the newer snapshot resolved replaces ours,
    /// unresolved ones keep their prior value.
    pub fn merge(&mut self, newer: PartialRoomDetail) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.room_name, newer.room_name);
        take(&mut self.description, newer.description);
        take(&mut self.room_admin, newer.room_admin);
        take(&mut self.super_admin, newer.super_admin);
        take(&mut self.voters, newer.voters);
        take(&mut self.candidates, newer.candidates);
        take(&mut self.is_active, newer.is_active);
        take(&mut self.voting_started, newer.voting_started);
        take(&mut self.voting_ended, newer.voting_ended);
        take(&mut self.max_voters, newer.max_voters);
        take(&mut self.factory, newer.factory);
    }

    pub fn into_complete(self) -> Option<RoomDetail> {
        Some(RoomDetail {
            room_name: self.room_name?,
            description: self.description?,
            room_admin: self.room_admin?,
            super_admin: self.super_admin?,
            voters: self.voters?,
            candidates: self.candidates?,
            is_active: self.is_active?,
            voting_started: self.voting_started?,
            voting_ended: self.voting_ended?,
            max_voters: self.max_voters?,
            factory: self.factory?,
        })
    }

    /// Whether ballots are being accepted. Unknown flags count as closed.
    pub fn voting_open(&self) -> bool {
        self.is_active == Some(true)
            && self.voting_started == Some(true)
            && self.voting_ended == Some(false)
    }

    pub fn total_votes(&self) -> u64 {
        self.candidates
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|c| c.vote_count)
            .sum()
    }
}

impl From<RoomDetail> for PartialRoomDetail {
    fn from(detail: RoomDetail) -> Self {
        Self {
            room_name: Some(detail.room_name),
            description: Some(detail.description),
            room_admin: Some(detail.room_admin),
            super_admin: Some(detail.super_admin),
            voters: Some(detail.voters),
            candidates: Some(detail.candidates),
            is_active: Some(detail.is_active),
            voting_started: Some(detail.voting_started),
            voting_ended: Some(detail.voting_ended),
            max_voters: Some(detail.max_voters),
            factory: Some(detail.factory),
        }
    }
}

/// Outcome of one detail aggregation cycle in which at least one read succeeded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoomFetch {
    Complete(RoomDetail),
    Partial(PartialRoomDetail),
}

impl RoomFetch {
    pub fn from_partial(partial: PartialRoomDetail) -> Self {
        match partial.clone().into_complete() {
            Some(detail) => RoomFetch::Complete(detail),
            None => RoomFetch::Partial(partial),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, RoomFetch::Complete(_))
    }

    pub fn into_partial(self) -> PartialRoomDetail {
        match self {
            RoomFetch::Complete(detail) => detail.into(),
            RoomFetch::Partial(partial) => partial,
        }
    }
}

/// What the connected account may do in one room, derived from a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoomPermissions {
    pub is_room_admin: bool,
    pub is_super_admin_of_room: bool,
    pub is_voter: bool,
}

impl RoomPermissions {
    pub fn derive(account: Option<&Account>, detail: &PartialRoomDetail) -> Self {
        let is_room_admin = detail
            .room_admin
            .as_ref()
            .is_some_and(|admin| same_account(account, admin));
        let is_super_admin_of_room = detail
            .super_admin
            .as_ref()
            .is_some_and(|admin| same_account(account, admin));
        let is_voter = detail.voters.as_deref().is_some_and(|voters| {
            voters.iter().any(|v| same_account(account, &v.address))
        });
        Self {
            is_room_admin,
            is_super_admin_of_room,
            is_voter,
        }
    }

    pub fn can_manage(&self) -> bool {
        self.is_room_admin || self.is_super_admin_of_room
    }
}

/// Vote count descending, then name ascending. Id breaks any remaining tie so the
/// result does not depend on input order.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.vote_count
            .cmp(&a.vote_count)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Name ascending ignoring case; exact spelling then address break ties.
pub fn sort_voters(voters: &mut [Voter]) {
    voters.sort_by(|a, b| compare_voter_names(a, b).then_with(|| a.address.cmp(&b.address)));
}

fn compare_voter_names(a: &Voter, b: &Voter) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
}

/// Whole-percent share of `total`, rounded down.
pub fn vote_share_percent(vote_count: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (u128::from(vote_count) * 100 / u128::from(total)) as u64
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    fn candidate(id: u64, name: &str, vote_count: u64) -> Candidate {
        Candidate {
            id,
            name: name.to_string(),
            vote_count,
        }
    }

    fn voter(byte: u8, name: &str) -> Voter {
        Voter {
            address: Account::from_bytes([byte; 20]),
            name: name.to_string(),
        }
    }

    fn full_detail() -> RoomDetail {
        RoomDetail {
            room_name: "Board election".to_string(),
            description: "Annual".to_string(),
            room_admin: Account::from_bytes([1; 20]),
            super_admin: Account::from_bytes([2; 20]),
            voters: vec![voter(3, "Ann")],
            candidates: vec![candidate(0, "A", 1)],
            is_active: true,
            voting_started: true,
            voting_ended: false,
            max_voters: 10,
            factory: Account::from_bytes([9; 20]),
        }
    }

    #[test]
    fn sort_candidates__orders_by_votes_then_name() {
        // given
        let mut candidates =
            vec![candidate(0, "A", 3), candidate(1, "B", 5), candidate(2, "C", 5)];

        // when
        sort_candidates(&mut candidates);

        // then
        let names: Vec<_> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["B", "C", "A"]);
    }

    #[test]
    fn sort_voters__ignores_case() {
        // given
        let mut voters = vec![voter(1, "Zed"), voter(2, "amy")];

        // when
        sort_voters(&mut voters);

        // then
        let names: Vec<_> = voters.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["amy", "Zed"]);
    }

    #[test]
    fn merge__keeps_prior_fields_the_newer_snapshot_missed() {
        // given
        let mut current: PartialRoomDetail = full_detail().into();
        let newer = PartialRoomDetail {
            voting_ended: Some(true),
            ..PartialRoomDetail::default()
        };

        // when
        current.merge(newer);

        // then
        assert_eq!(current.voting_ended, Some(true));
        assert_eq!(current.room_name.as_deref(), Some("Board election"));
        assert!(current.missing_fields().is_empty());
    }

    #[test]
    fn from_partial__missing_field__stays_partial() {
        // given
        let mut partial: PartialRoomDetail = full_detail().into();
        partial.voters = None;

        // when
        let fetch = RoomFetch::from_partial(partial);

        // then
        assert!(!fetch.is_complete());
        assert_eq!(fetch.into_partial().missing_fields(), vec![RoomField::Voters]);
    }

    #[test]
    fn derive__account_matches_admin_and_voter_list() {
        // given
        let detail: PartialRoomDetail = full_detail().into();
        let admin = Account::from_bytes([1; 20]);
        let voter = Account::from_bytes([3; 20]);
        let stranger = Account::from_bytes([7; 20]);

        // then
        let perms = RoomPermissions::derive(Some(&admin), &detail);
        assert!(perms.is_room_admin && !perms.is_voter && perms.can_manage());
        let perms = RoomPermissions::derive(Some(&voter), &detail);
        assert!(perms.is_voter && !perms.can_manage());
        assert_eq!(
            RoomPermissions::derive(Some(&stranger), &detail),
            RoomPermissions::default()
        );
        assert_eq!(
            RoomPermissions::derive(None, &detail),
            RoomPermissions::default()
        );
    }

    #[test]
    fn derive__unknown_fields__grant_nothing() {
        let admin = Account::from_bytes([1; 20]);
        let perms = RoomPermissions::derive(Some(&admin), &PartialRoomDetail::default());
        assert_eq!(perms, RoomPermissions::default());
    }

    #[test]
    fn voting_open__unknown_flag__is_closed() {
        let mut detail: PartialRoomDetail = full_detail().into();
        assert!(detail.voting_open());
        detail.voting_ended = None;
        assert!(!detail.voting_open());
    }

    #[test]
    fn vote_share_percent__no_votes__is_zero() {
        assert_eq!(vote_share_percent(0, 0), 0);
        assert_eq!(vote_share_percent(1, 3), 33);
        assert_eq!(vote_share_percent(u64::MAX, u64::MAX), 100);
    }

    fn arb_candidates() -> impl Strategy<Value = Vec<Candidate>> {
        prop::collection::vec(("[a-cA-C]{1,2}", 0u64..4), 0..12).prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(id, (name, votes))| candidate(id as u64, &name, votes))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn sort_candidates__independent_of_input_order(mut candidates in arb_candidates()) {
            let mut reversed: Vec<_> = candidates.iter().rev().cloned().collect();
            sort_candidates(&mut candidates);
            sort_candidates(&mut reversed);
            prop_assert_eq!(&candidates, &reversed);
            for pair in candidates.windows(2) {
                prop_assert!(pair[0].vote_count >= pair[1].vote_count);
            }
        }

        #[test]
        fn sort_voters__independent_of_input_order(names in prop::collection::vec("[a-cA-C]{1,3}", 0..12)) {
            let mut voters: Vec<_> = names
                .iter()
                .enumerate()
                .map(|(i, name)| voter(i as u8, name))
                .collect();
            let mut reversed: Vec<_> = voters.iter().rev().cloned().collect();
            sort_voters(&mut voters);
            sort_voters(&mut reversed);
            prop_assert_eq!(voters, reversed);
        }
    }
}
