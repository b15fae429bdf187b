//! Contract collaborators backed by an Ethereum JSON-RPC node.

use crate::{
    Account,
    CallError,
    actions::{
        FactoryAction,
        RoomAction,
    },
    contracts::{
        CallResult,
        ContractGateway,
        FactoryReader,
        FactoryWriter,
        RoomReader,
        RoomWriter,
    },
    room::{
        Candidate,
        RoomSummary,
        Voter,
    },
};
use alloy::{
    contract::SolCallBuilder,
    network::EthereumWallet,
    primitives::{
        Address,
        Bytes,
        TxHash,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    sol_types::SolCall,
    transports::{
        RpcError,
        TransportErrorKind,
    },
};
use tracing::debug;
use url::Url;
use voting_abi::{
    VotingRoom,
    VotingRoomFactory,
};

/// Hands out factory and room handles over one shared provider. The provider signs
/// with whichever wallet signer matches the handle's sender.
#[derive(Clone, Debug)]
pub struct AlloyGateway {
    provider: DynProvider,
    factory: Address,
}

impl AlloyGateway {
    pub fn connect_http(url: Url, wallet: Option<EthereumWallet>, factory: Account) -> Self {
        let provider = match wallet {
            Some(wallet) => ProviderBuilder::new()
                .wallet(wallet)
                .connect_http(url)
                .erased(),
            None => ProviderBuilder::new().connect_http(url).erased(),
        };
        Self {
            provider,
            factory: factory.address(),
        }
    }

    pub fn factory_address(&self) -> Account {
        self.factory.into()
    }

    pub async fn chain_id(&self) -> CallResult<u64> {
        self.provider.get_chain_id().await.map_err(rpc_error)
    }

    /// Runtime bytecode at the factory address; empty when nothing is deployed there.
    pub async fn factory_code(&self) -> CallResult<Bytes> {
        self.provider
            .get_code_at(self.factory)
            .await
            .map_err(rpc_error)
    }
}

impl ContractGateway for AlloyGateway {
    type Factory = AlloyFactory;
    type Room = AlloyRoom;

    fn factory(&self, sender: Option<Account>) -> AlloyFactory {
        AlloyFactory {
            provider: self.provider.clone(),
            address: self.factory,
            sender: sender.map(|a| a.address()),
        }
    }

    fn room(&self, address: Account, sender: Option<Account>) -> AlloyRoom {
        AlloyRoom {
            provider: self.provider.clone(),
            address: address.address(),
            sender: sender.map(|a| a.address()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AlloyFactory {
    provider: DynProvider,
    address: Address,
    sender: Option<Address>,
}

impl AlloyFactory {
    fn contract(&self) -> VotingRoomFactory::VotingRoomFactoryInstance<DynProvider> {
        VotingRoomFactory::new(self.address, self.provider.clone())
    }
}

impl FactoryReader for AlloyFactory {
    async fn creator(&self) -> CallResult<Account> {
        let creator = self.contract().creator().call().await?;
        Ok(creator.into())
    }

    async fn super_admins(&self) -> CallResult<Vec<Account>> {
        let admins = self.contract().getSuperAdmins().call().await?;
        Ok(admins.into_iter().map(Account::from).collect())
    }

    async fn rooms(&self) -> CallResult<Vec<RoomSummary>> {
        let rooms = self.contract().getRooms().call().await?;
        Ok(rooms
            .into_iter()
            .map(|room| RoomSummary {
                address: room.roomAddress.into(),
                room_name: room.roomName,
                created_by: room.createdBy.into(),
            })
            .collect())
    }
}

impl FactoryWriter for AlloyFactory {
    async fn submit(&self, action: &FactoryAction) -> CallResult<TxHash> {
        let sender = signer(self.sender)?;
        let contract = self.contract();
        match action {
            FactoryAction::CreateRoom {
                name,
                description,
                max_voters,
            } => {
                confirm(
                    contract.createRoom(
                        name.clone(),
                        description.clone(),
                        U256::from(*max_voters),
                    ),
                    sender,
                )
                .await
            }
            FactoryAction::AddSuperAdmin(admin) => {
                confirm(contract.addSuperAdmin(admin.address()), sender).await
            }
            FactoryAction::RemoveSuperAdmin(admin) => {
                confirm(contract.removeSuperAdmin(admin.address()), sender).await
            }
            FactoryAction::TransferCreator(creator) => {
                confirm(contract.transferCreator(creator.address()), sender).await
            }
            FactoryAction::DeactivateAndDeleteRoom(room) => {
                confirm(contract.deactivateAndDeleteRoom(room.address()), sender).await
            }
            FactoryAction::FactoryReset => confirm(contract.factoryReset(), sender).await,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AlloyRoom {
    provider: DynProvider,
    address: Address,
    sender: Option<Address>,
}

impl AlloyRoom {
    fn contract(&self) -> VotingRoom::VotingRoomInstance<DynProvider> {
        VotingRoom::new(self.address, self.provider.clone())
    }
}

impl RoomReader for AlloyRoom {
    async fn room_name(&self) -> CallResult<String> {
        Ok(self.contract().roomName().call().await?)
    }

    async fn description(&self) -> CallResult<String> {
        Ok(self.contract().description().call().await?)
    }

    async fn room_admin(&self) -> CallResult<Account> {
        Ok(self.contract().roomAdmin().call().await?.into())
    }

    async fn super_admin(&self) -> CallResult<Account> {
        Ok(self.contract().superAdmin().call().await?.into())
    }

    async fn voters(&self) -> CallResult<Vec<Voter>> {
        let voters = self.contract().getVoters().call().await?;
        Ok(voters
            .into_iter()
            .map(|voter| Voter {
                address: voter.voterAddress.into(),
                name: voter.name,
            })
            .collect())
    }

    async fn candidates(&self) -> CallResult<Vec<Candidate>> {
        let candidates = self.contract().getCandidates().call().await?;
        candidates
            .into_iter()
            .map(|candidate| {
                Ok(Candidate {
                    id: to_u64("candidate id", candidate.id)?,
                    name: candidate.name,
                    vote_count: to_u64("vote count", candidate.voteCount)?,
                })
            })
            .collect()
    }

    async fn is_active(&self) -> CallResult<bool> {
        Ok(self.contract().isActive().call().await?)
    }

    async fn voting_started(&self) -> CallResult<bool> {
        Ok(self.contract().votingStarted().call().await?)
    }

    async fn voting_ended(&self) -> CallResult<bool> {
        Ok(self.contract().votingEnded().call().await?)
    }

    async fn max_voters(&self) -> CallResult<u64> {
        let max = self.contract().maxVoters().call().await?;
        to_u64("max voters", max)
    }

    async fn factory(&self) -> CallResult<Account> {
        Ok(self.contract().factory().call().await?.into())
    }
}

impl RoomWriter for AlloyRoom {
    async fn submit(&self, action: &RoomAction) -> CallResult<TxHash> {
        let sender = signer(self.sender)?;
        let contract = self.contract();
        match action {
            RoomAction::StartVote => confirm(contract.startVote(), sender).await,
            RoomAction::EndVote => confirm(contract.endVote(), sender).await,
            RoomAction::AddCandidate { name } => {
                confirm(contract.addCandidate(name.clone()), sender).await
            }
            RoomAction::AddVoter { address, name } => {
                confirm(contract.addVoter(address.address(), name.clone()), sender).await
            }
            RoomAction::RemoveVoter { address } => {
                confirm(contract.removeVoter(address.address()), sender).await
            }
            RoomAction::Vote { candidate_id } => {
                confirm(contract.vote(U256::from(*candidate_id)), sender).await
            }
            RoomAction::DeactivateRoom => confirm(contract.deactivateRoom(), sender).await,
            RoomAction::TransferAdmin { new_admin } => {
                confirm(contract.transferAdmin(new_admin.address()), sender).await
            }
            RoomAction::ResetRoom => confirm(contract.resetRoom(), sender).await,
            RoomAction::ClearVotes => confirm(contract.clearVotes(), sender).await,
            RoomAction::ClearCandidates => confirm(contract.clearCandidates(), sender).await,
        }
    }
}

/// Sends the call as `sender` and waits for its receipt.
async fn confirm<C>(call: SolCallBuilder<&DynProvider, C>, sender: Address) -> CallResult<TxHash>
where
    C: SolCall + Send + Sync,
{
    let pending = call.from(sender).send().await?;
    debug!(tx = %pending.tx_hash(), "transaction submitted");
    let receipt = pending
        .get_receipt()
        .await
        .map_err(|err| CallError::Transport(err.to_string()))?;
    if !receipt.status() {
        return Err(CallError::Reverted(format!(
            "transaction {} reverted",
            receipt.transaction_hash
        )));
    }
    Ok(receipt.transaction_hash)
}

fn signer(sender: Option<Address>) -> CallResult<Address> {
    sender.ok_or_else(|| CallError::Reverted("no signing account selected".to_string()))
}

fn to_u64(field: &str, value: U256) -> CallResult<u64> {
    u64::try_from(value).map_err(|_| CallError::Decode(format!("{field} {value} overflows u64")))
}

fn rpc_error(err: RpcError<TransportErrorKind>) -> CallError {
    match err.as_error_resp() {
        Some(payload) => CallError::Reverted(payload.message.to_string()),
        None => CallError::Transport(err.to_string()),
    }
}

impl From<alloy::contract::Error> for CallError {
    fn from(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(err) => rpc_error(err),
            alloy::contract::Error::PendingTransactionError(err) => {
                CallError::Transport(err.to_string())
            }
            other => CallError::Decode(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn to_u64__value_above_u64__is_decode_error() {
        let err = to_u64("max voters", U256::from(u64::MAX) + U256::from(1)).unwrap_err();
        assert!(matches!(err, CallError::Decode(_)));
        assert_eq!(to_u64("max voters", U256::from(7)).unwrap(), 7);
    }

    #[test]
    fn from__unknown_function__maps_to_decode() {
        let err: CallError =
            alloy::contract::Error::UnknownFunction("getRooms".to_string()).into();
        assert!(matches!(err, CallError::Decode(_)));
    }

    #[test]
    fn from__transport_failure_without_payload__maps_to_transport() {
        let err: CallError = alloy::contract::Error::TransportError(RpcError::Transport(
            TransportErrorKind::BackendGone,
        ))
        .into();
        assert!(matches!(err, CallError::Transport(_)));
    }

    #[test]
    fn signer__missing_sender__rejects_before_sending() {
        assert!(signer(None).is_err());
        assert_eq!(signer(Some(Address::ZERO)).unwrap(), Address::ZERO);
    }
}
