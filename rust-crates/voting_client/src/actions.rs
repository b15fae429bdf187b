//! Contract-mutating actions.
//!
//! Every action is validated and authorized locally before anything is sent. A write
//! that reaches the chain is awaited until confirmed; room writes then re-read the
//! room so callers get a snapshot that reflects the change when the read succeeds.

use crate::{
    Account,
    Result,
    Role,
    VotingError,
    aggregator::fetch_room_detail,
    contracts::{
        FactoryWriter,
        RoomReader,
        RoomWriter,
    },
    room::{
        PartialRoomDetail,
        RoomFetch,
        RoomPermissions,
    },
};
use alloy::primitives::TxHash;
use tracing::{
    info,
    warn,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoomAction {
    StartVote,
    EndVote,
    AddCandidate { name: String },
    AddVoter { address: Account, name: String },
    RemoveVoter { address: Account },
    Vote { candidate_id: u64 },
    DeactivateRoom,
    TransferAdmin { new_admin: Account },
    ResetRoom,
    ClearVotes,
    ClearCandidates,
}

impl RoomAction {
    pub fn add_candidate(name: &str) -> Result<Self> {
        Ok(RoomAction::AddCandidate {
            name: required("candidate name", name)?,
        })
    }

    pub fn add_voter(address: &str, name: &str) -> Result<Self> {
        Ok(RoomAction::AddVoter {
            address: Account::parse(address)?,
            name: required("voter name", name)?,
        })
    }

    pub fn remove_voter(address: &str) -> Result<Self> {
        Ok(RoomAction::RemoveVoter {
            address: Account::parse(address)?,
        })
    }

    pub fn transfer_admin(new_admin: &str) -> Result<Self> {
        Ok(RoomAction::TransferAdmin {
            new_admin: nonzero(Account::parse(new_admin)?)?,
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RoomAction::StartVote => "Start vote",
            RoomAction::EndVote => "End vote",
            RoomAction::AddCandidate { .. } => "Add candidate",
            RoomAction::AddVoter { .. } => "Add voter",
            RoomAction::RemoveVoter { .. } => "Remove voter",
            RoomAction::Vote { .. } => "Vote",
            RoomAction::DeactivateRoom => "Deactivate room",
            RoomAction::TransferAdmin { .. } => "Transfer admin",
            RoomAction::ResetRoom => "Reset room",
            RoomAction::ClearVotes => "Clear votes",
            RoomAction::ClearCandidates => "Clear candidates",
        }
    }

    /// Re-checks fields for actions built without the validating constructors.
    pub fn validate(&self) -> Result<()> {
        match self {
            RoomAction::AddCandidate { name } => {
                required("candidate name", name)?;
            }
            RoomAction::AddVoter { name, .. } => {
                required("voter name", name)?;
            }
            RoomAction::TransferAdmin { new_admin } => {
                nonzero(*new_admin)?;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn authorize(
        &self,
        account: Option<&Account>,
        role: Role,
        detail: &PartialRoomDetail,
    ) -> Result<()> {
        let action = self.label();
        if account.is_none() {
            return Err(VotingError::Unauthorized {
                action,
                reason: "no wallet account is connected",
            });
        }
        let perms = RoomPermissions::derive(account, detail);
        match self {
            RoomAction::Vote { candidate_id } => {
                if !perms.is_voter {
                    return Err(VotingError::Unauthorized {
                        action,
                        reason: "account is not registered as a voter in this room",
                    });
                }
                if !detail.voting_open() {
                    return Err(VotingError::Unauthorized {
                        action,
                        reason: "voting is not open in this room",
                    });
                }
                if let Some(candidates) = detail.candidates.as_deref()
                    && !candidates.iter().any(|c| c.id == *candidate_id)
                {
                    return Err(VotingError::invalid_input(format!(
                        "unknown candidate id {candidate_id}"
                    )));
                }
                Ok(())
            }
            RoomAction::DeactivateRoom
            | RoomAction::TransferAdmin { .. }
            | RoomAction::ResetRoom => {
                if perms.can_manage() || role.is_factory_admin() {
                    Ok(())
                } else {
                    Err(VotingError::Unauthorized {
                        action,
                        reason: "requires the room admin, the room super admin or a factory admin",
                    })
                }
            }
            _ => {
                if perms.can_manage() {
                    Ok(())
                } else {
                    Err(VotingError::Unauthorized {
                        action,
                        reason: "requires the room admin or the room super admin",
                    })
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FactoryAction {
    CreateRoom {
        name: String,
        description: String,
        max_voters: u64,
    },
    AddSuperAdmin(Account),
    RemoveSuperAdmin(Account),
    TransferCreator(Account),
    DeactivateAndDeleteRoom(Account),
    FactoryReset,
}

impl FactoryAction {
    pub fn create_room(name: &str, description: &str, max_voters: &str) -> Result<Self> {
        let max_voters = max_voters.trim().parse::<u64>().map_err(|_| {
            VotingError::invalid_input(format!(
                "max voters '{}' is not a whole number",
                max_voters.trim()
            ))
        })?;
        if max_voters == 0 {
            return Err(VotingError::invalid_input("max voters must be at least 1"));
        }
        Ok(FactoryAction::CreateRoom {
            name: required("room name", name)?,
            description: description.trim().to_string(),
            max_voters,
        })
    }

    pub fn add_super_admin(address: &str) -> Result<Self> {
        Ok(FactoryAction::AddSuperAdmin(nonzero(Account::parse(address)?)?))
    }

    pub fn remove_super_admin(address: &str) -> Result<Self> {
        Ok(FactoryAction::RemoveSuperAdmin(Account::parse(address)?))
    }

    pub fn transfer_creator(address: &str) -> Result<Self> {
        Ok(FactoryAction::TransferCreator(nonzero(Account::parse(address)?)?))
    }

    pub fn deactivate_and_delete_room(address: &str) -> Result<Self> {
        Ok(FactoryAction::DeactivateAndDeleteRoom(Account::parse(address)?))
    }

    pub fn label(&self) -> &'static str {
        match self {
            FactoryAction::CreateRoom { .. } => "Create room",
            FactoryAction::AddSuperAdmin(_) => "Add super admin",
            FactoryAction::RemoveSuperAdmin(_) => "Remove super admin",
            FactoryAction::TransferCreator(_) => "Transfer creator",
            FactoryAction::DeactivateAndDeleteRoom(_) => "Delete room",
            FactoryAction::FactoryReset => "Factory reset",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            FactoryAction::CreateRoom {
                name, max_voters, ..
            } => {
                required("room name", name)?;
                if *max_voters == 0 {
                    return Err(VotingError::invalid_input("max voters must be at least 1"));
                }
            }
            FactoryAction::AddSuperAdmin(account)
            | FactoryAction::TransferCreator(account) => {
                nonzero(*account)?;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn authorize(&self, account: Option<&Account>, role: Role) -> Result<()> {
        let action = self.label();
        if account.is_none() {
            return Err(VotingError::Unauthorized {
                action,
                reason: "no wallet account is connected",
            });
        }
        match self {
            FactoryAction::CreateRoom { .. } => Ok(()),
            FactoryAction::TransferCreator(_) | FactoryAction::FactoryReset => {
                if role == Role::Creator {
                    Ok(())
                } else {
                    Err(VotingError::Unauthorized {
                        action,
                        reason: "requires the factory creator",
                    })
                }
            }
            _ => {
                if role.is_factory_admin() {
                    Ok(())
                } else {
                    Err(VotingError::Unauthorized {
                        action,
                        reason: "requires the factory creator or a super admin",
                    })
                }
            }
        }
    }
}

/// Validates, authorizes and submits `action`, then re-reads the room.
///
/// `current` is the snapshot the caller's view is showing; permissions are derived
/// from it so the check matches what the user saw.
/// A confirmed room write and the re-read that followed it. A failed re-read leaves
/// the write confirmed.
#[derive(Debug)]
pub struct RoomWrite {
    pub tx: TxHash,
    pub refreshed: Result<RoomFetch>,
}

pub async fn submit_room_action<R>(
    room: &R,
    action: &RoomAction,
    account: Option<&Account>,
    role: Role,
    current: &PartialRoomDetail,
) -> Result<RoomWrite>
where
    R: RoomReader + RoomWriter + Sync,
{
    action.validate()?;
    action.authorize(account, role, current)?;
    let label = action.label();
    let tx = room.submit(action).await.map_err(|source| {
        warn!(action = label, %source, "room write failed");
        VotingError::RemoteWrite {
            action: label,
            source,
        }
    })?;
    info!(action = label, %tx, "room write confirmed");
    let refreshed = fetch_room_detail(room).await;
    if let Err(err) = &refreshed {
        warn!(action = label, %err, "re-read after room write failed");
    }
    Ok(RoomWrite { tx, refreshed })
}

pub async fn submit_factory_action<F>(
    factory: &F,
    action: &FactoryAction,
    account: Option<&Account>,
    role: Role,
) -> Result<TxHash>
where
    F: FactoryWriter + Sync,
{
    action.validate()?;
    action.authorize(account, role)?;
    let label = action.label();
    let tx = factory.submit(action).await.map_err(|source| {
        warn!(action = label, %source, "factory write failed");
        VotingError::RemoteWrite {
            action: label,
            source,
        }
    })?;
    info!(action = label, %tx, "factory write confirmed");
    Ok(tx)
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(VotingError::invalid_input(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn nonzero(account: Account) -> Result<Account> {
    if account.is_zero() {
        return Err(VotingError::invalid_input("the zero address is not allowed"));
    }
    Ok(account)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        CallError,
        ErrorKind,
        contracts::ContractGateway,
        fakes::FakeChain,
        room::{
            Candidate,
            RoomDetail,
            RoomField,
            Voter,
        },
    };

    fn account(byte: u8) -> Account {
        Account::from_bytes([byte; 20])
    }

    const CREATOR: u8 = 1;
    const ROOM: u8 = 10;
    const ADMIN: u8 = 11;
    const VOTER: u8 = 12;

    fn open_room() -> RoomDetail {
        RoomDetail {
            room_name: "Council".to_string(),
            description: String::new(),
            room_admin: account(ADMIN),
            super_admin: account(CREATOR),
            voters: vec![Voter {
                address: account(VOTER),
                name: "Vera".to_string(),
            }],
            candidates: vec![Candidate {
                id: 0,
                name: "Alice".to_string(),
                vote_count: 0,
            }],
            is_active: true,
            voting_started: true,
            voting_ended: false,
            max_voters: 5,
            factory: account(CREATOR),
        }
    }

    fn chain_with_room() -> FakeChain {
        let chain = FakeChain::new(account(CREATOR));
        chain.insert_room(account(ROOM), account(ADMIN), open_room());
        chain
    }

    #[test]
    fn add_voter__malformed_address__is_invalid_input() {
        let err = RoomAction::add_voter("0x1234", "Bob").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn add_candidate__blank_name__is_invalid_input() {
        let err = RoomAction::add_candidate("   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn create_room__zero_max_voters__is_invalid_input() {
        let err = FactoryAction::create_room("Room", "", "0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = FactoryAction::create_room("Room", "", "many").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn authorize__transfer_creator_as_super_admin__is_unauthorized() {
        let action = FactoryAction::TransferCreator(account(5));
        let err = action
            .authorize(Some(&account(2)), Role::SuperAdmin)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(action.authorize(Some(&account(1)), Role::Creator).is_ok());
    }

    #[test]
    fn authorize__reset_room_as_factory_admin__is_allowed() {
        let detail: PartialRoomDetail = open_room().into();
        let outsider = account(40);
        assert!(
            RoomAction::ResetRoom
                .authorize(Some(&outsider), Role::SuperAdmin, &detail)
                .is_ok()
        );
        assert!(
            RoomAction::StartVote
                .authorize(Some(&outsider), Role::SuperAdmin, &detail)
                .is_err()
        );
    }

    #[tokio::test]
    async fn submit_room_action__non_admin__rejected_without_remote_call() {
        // given
        let chain = chain_with_room();
        let room = chain.gateway().room(account(ROOM), Some(account(VOTER)));
        let current: PartialRoomDetail = open_room().into();

        // when
        let err = submit_room_action(
            &room,
            &RoomAction::StartVote,
            Some(&account(VOTER)),
            Role::User,
            &current,
        )
        .await
        .unwrap_err();

        // then
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(chain.submitted_room_actions().is_empty());
    }

    #[tokio::test]
    async fn submit_room_action__vote__returns_refreshed_snapshot() {
        // given
        let chain = chain_with_room();
        let room = chain.gateway().room(account(ROOM), Some(account(VOTER)));
        let current: PartialRoomDetail = open_room().into();

        // when
        let write = submit_room_action(
            &room,
            &RoomAction::Vote { candidate_id: 0 },
            Some(&account(VOTER)),
            Role::User,
            &current,
        )
        .await
        .unwrap();

        // then
        let Ok(RoomFetch::Complete(detail)) = write.refreshed else {
            panic!("expected a complete snapshot");
        };
        assert_eq!(detail.candidates[0].vote_count, 1);
    }

    #[tokio::test]
    async fn submit_room_action__re_read_fails__write_still_confirmed() {
        // given
        let chain = chain_with_room();
        for field in RoomField::ALL {
            chain.fail_field(account(ROOM), field);
        }
        let room = chain.gateway().room(account(ROOM), Some(account(VOTER)));
        let current: PartialRoomDetail = open_room().into();

        // when
        let write = submit_room_action(
            &room,
            &RoomAction::Vote { candidate_id: 0 },
            Some(&account(VOTER)),
            Role::User,
            &current,
        )
        .await
        .unwrap();

        // then
        assert_eq!(write.refreshed.unwrap_err().kind(), ErrorKind::RemoteRead);
        assert_eq!(chain.room_detail(account(ROOM)).unwrap().candidates[0].vote_count, 1);
    }

    #[tokio::test]
    async fn submit_room_action__voting_closed__is_unauthorized() {
        let chain = chain_with_room();
        let room = chain.gateway().room(account(ROOM), Some(account(VOTER)));
        let mut current: PartialRoomDetail = open_room().into();
        current.voting_ended = Some(true);

        let err = submit_room_action(
            &room,
            &RoomAction::Vote { candidate_id: 0 },
            Some(&account(VOTER)),
            Role::User,
            &current,
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn submit_room_action__write_rejected__names_the_action() {
        // given
        let chain = chain_with_room();
        chain.reject_writes(CallError::Reverted("only admin".to_string()));
        let room = chain.gateway().room(account(ROOM), Some(account(ADMIN)));
        let current: PartialRoomDetail = open_room().into();

        // when
        let err = submit_room_action(
            &room,
            &RoomAction::EndVote,
            Some(&account(ADMIN)),
            Role::User,
            &current,
        )
        .await
        .unwrap_err();

        // then
        assert_eq!(err.kind(), ErrorKind::RemoteWrite);
        assert!(err.to_string().starts_with("End vote failed"));
    }

    #[tokio::test]
    async fn submit_factory_action__creator_adds_super_admin() {
        // given
        let chain = chain_with_room();
        let factory = chain.gateway().factory(Some(account(CREATOR)));
        let action = FactoryAction::AddSuperAdmin(account(7));

        // when
        submit_factory_action(&factory, &action, Some(&account(CREATOR)), Role::Creator)
            .await
            .unwrap();

        // then
        assert_eq!(chain.submitted_factory_actions(), vec![action]);
        assert!(chain.super_admins().contains(&account(7)));
    }
}
