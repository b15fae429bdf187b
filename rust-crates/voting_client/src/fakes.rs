//! In-memory collaborators for tests.
//!
//! A [`FakeChain`] owns factory and room state behind one lock; every handle it hands
//! out sees the same state, so tests can change the chain underneath a running store or
//! inject failures per room or per field.

use crate::{
    Account,
    CallError,
    WalletError,
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
        RoomDetail,
        RoomField,
        RoomSummary,
        Voter,
    },
    wallet::{
        WalletEvent,
        WalletProvider,
    },
};
use alloy::primitives::TxHash;
use std::{
    collections::{
        BTreeMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tokio::sync::mpsc;

const UNREACHABLE: &str = "connection refused";

#[derive(Clone, Debug)]
struct FakeRoomState {
    detail: RoomDetail,
    created_by: Account,
    down: bool,
    failing: HashSet<RoomField>,
}

#[derive(Debug)]
struct ChainState {
    creator: Account,
    super_admins: Vec<Account>,
    rooms: BTreeMap<u64, Account>,
    room_state: BTreeMap<Account, FakeRoomState>,
    next_room: u64,
    factory_down: bool,
    factory_reads: usize,
    write_error: Option<CallError>,
    room_writes: Vec<(Account, RoomAction)>,
    factory_writes: Vec<FactoryAction>,
    tx_counter: u8,
}

impl ChainState {
    fn next_tx(&mut self) -> TxHash {
        self.tx_counter = self.tx_counter.wrapping_add(1);
        TxHash::with_last_byte(self.tx_counter)
    }

    fn room(&self, address: &Account) -> CallResult<&FakeRoomState> {
        match self.room_state.get(address) {
            Some(room) if !room.down => Ok(room),
            Some(_) => Err(CallError::Transport(UNREACHABLE.to_string())),
            None => Err(CallError::Decode(format!("no contract code at {address}"))),
        }
    }

    fn room_mut(&mut self, address: &Account) -> CallResult<&mut FakeRoomState> {
        match self.room_state.get_mut(address) {
            Some(room) if !room.down => Ok(room),
            Some(_) => Err(CallError::Transport(UNREACHABLE.to_string())),
            None => Err(CallError::Decode(format!("no contract code at {address}"))),
        }
    }

    fn listed_rooms(&self) -> Vec<RoomSummary> {
        self.rooms
            .values()
            .filter_map(|address| {
                self.room_state.get(address).map(|room| RoomSummary {
                    address: *address,
                    room_name: room.detail.room_name.clone(),
                    created_by: room.created_by,
                })
            })
            .collect()
    }
}

/// Shared fake chain. Cloning gives another handle to the same state.
#[derive(Clone, Debug)]
pub struct FakeChain {
    state: Arc<Mutex<ChainState>>,
}

impl FakeChain {
    pub fn new(creator: Account) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                creator,
                super_admins: Vec::new(),
                rooms: BTreeMap::new(),
                room_state: BTreeMap::new(),
                next_room: 0,
                factory_down: false,
                factory_reads: 0,
                write_error: None,
                room_writes: Vec::new(),
                factory_writes: Vec::new(),
                tx_counter: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn gateway(&self) -> FakeGateway {
        FakeGateway {
            chain: self.clone(),
        }
    }

    /// Read-only factory handle.
    pub fn factory(&self) -> FakeFactory {
        self.gateway().factory(None)
    }

    /// Read-only room handle.
    pub fn room(&self, address: Account) -> FakeRoom {
        self.gateway().room(address, None)
    }

    pub fn add_super_admin(&self, account: Account) {
        let mut state = self.lock();
        if !state.super_admins.contains(&account) {
            state.super_admins.push(account);
        }
    }

    pub fn super_admins(&self) -> Vec<Account> {
        self.lock().super_admins.clone()
    }

    pub fn creator(&self) -> Account {
        self.lock().creator
    }

    /// Registers a room in the factory, in insertion order.
    pub fn insert_room(&self, address: Account, created_by: Account, detail: RoomDetail) {
        let mut state = self.lock();
        let index = state.next_room;
        state.next_room += 1;
        state.rooms.insert(index, address);
        state.room_state.insert(
            address,
            FakeRoomState {
                detail,
                created_by,
                down: false,
                failing: HashSet::new(),
            },
        );
    }

    pub fn room_detail(&self, address: Account) -> Option<RoomDetail> {
        self.lock()
            .room_state
            .get(&address)
            .map(|room| room.detail.clone())
    }

    pub fn set_factory_down(&self, down: bool) {
        self.lock().factory_down = down;
    }

    /// Makes every read and write against `address` fail with a transport error.
    pub fn set_room_down(&self, address: Account, down: bool) {
        if let Some(room) = self.lock().room_state.get_mut(&address) {
            room.down = down;
        }
    }

    pub fn fail_field(&self, address: Account, field: RoomField) {
        if let Some(room) = self.lock().room_state.get_mut(&address) {
            room.failing.insert(field);
        }
    }

    /// Every subsequent write fails with `err` after passing local checks.
    pub fn reject_writes(&self, err: CallError) {
        self.lock().write_error = Some(err);
    }

    pub fn factory_reads(&self) -> usize {
        self.lock().factory_reads
    }

    pub fn submitted_room_actions(&self) -> Vec<(Account, RoomAction)> {
        self.lock().room_writes.clone()
    }

    pub fn submitted_factory_actions(&self) -> Vec<FactoryAction> {
        self.lock().factory_writes.clone()
    }

    fn read_factory<T>(&self, read: impl FnOnce(&ChainState) -> T) -> CallResult<T> {
        let mut state = self.lock();
        state.factory_reads += 1;
        if state.factory_down {
            return Err(CallError::Transport(UNREACHABLE.to_string()));
        }
        Ok(read(&*state))
    }

    fn read_room<T>(
        &self,
        address: &Account,
        field: RoomField,
        read: impl FnOnce(&RoomDetail) -> T,
    ) -> CallResult<T> {
        let state = self.lock();
        let room = state.room(address)?;
        if room.failing.contains(&field) {
            return Err(CallError::Decode(format!(
                "could not decode {}",
                field.label()
            )));
        }
        Ok(read(&room.detail))
    }
}

#[derive(Clone, Debug)]
pub struct FakeGateway {
    chain: FakeChain,
}

impl ContractGateway for FakeGateway {
    type Factory = FakeFactory;
    type Room = FakeRoom;

    fn factory(&self, sender: Option<Account>) -> FakeFactory {
        FakeFactory {
            chain: self.chain.clone(),
            sender,
        }
    }

    fn room(&self, address: Account, sender: Option<Account>) -> FakeRoom {
        FakeRoom {
            chain: self.chain.clone(),
            address,
            sender,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FakeFactory {
    chain: FakeChain,
    sender: Option<Account>,
}

impl FactoryReader for FakeFactory {
    async fn creator(&self) -> CallResult<Account> {
        self.chain.read_factory(|state| state.creator)
    }

    async fn super_admins(&self) -> CallResult<Vec<Account>> {
        self.chain.read_factory(|state| state.super_admins.clone())
    }

    async fn rooms(&self) -> CallResult<Vec<RoomSummary>> {
        self.chain.read_factory(ChainState::listed_rooms)
    }
}

impl FactoryWriter for FakeFactory {
    async fn submit(&self, action: &FactoryAction) -> CallResult<TxHash> {
        let mut state = self.chain.lock();
        if let Some(err) = state.write_error.clone() {
            return Err(err);
        }
        if state.factory_down {
            return Err(CallError::Transport(UNREACHABLE.to_string()));
        }
        let sender = self
            .sender
            .ok_or_else(|| CallError::Reverted("no sender".to_string()))?;
        match action {
            FactoryAction::CreateRoom {
                name,
                description,
                max_voters,
            } => {
                let index = state.next_room;
                state.next_room += 1;
                let mut bytes = [0xee; 20];
                bytes[12..].copy_from_slice(&index.to_be_bytes());
                let address = Account::from_bytes(bytes);
                let creator = state.creator;
                state.rooms.insert(index, address);
                state.room_state.insert(
                    address,
                    FakeRoomState {
                        detail: RoomDetail {
                            room_name: name.clone(),
                            description: description.clone(),
                            room_admin: sender,
                            super_admin: creator,
                            voters: Vec::new(),
                            candidates: Vec::new(),
                            is_active: true,
                            voting_started: false,
                            voting_ended: false,
                            max_voters: *max_voters,
                            factory: creator,
                        },
                        created_by: sender,
                        down: false,
                        failing: HashSet::new(),
                    },
                );
            }
            FactoryAction::AddSuperAdmin(account) => {
                if !state.super_admins.contains(account) {
                    state.super_admins.push(*account);
                }
            }
            FactoryAction::RemoveSuperAdmin(account) => {
                state.super_admins.retain(|a| a != account);
            }
            FactoryAction::TransferCreator(account) => {
                state.creator = *account;
            }
            FactoryAction::DeactivateAndDeleteRoom(address) => {
                state.rooms.retain(|_, a| a != address);
                if let Some(room) = state.room_state.get_mut(address) {
                    room.detail.is_active = false;
                }
            }
            FactoryAction::FactoryReset => {
                state.rooms.clear();
                state.super_admins.clear();
            }
        }
        state.factory_writes.push(action.clone());
        Ok(state.next_tx())
    }
}

#[derive(Clone, Debug)]
pub struct FakeRoom {
    chain: FakeChain,
    address: Account,
    sender: Option<Account>,
}

impl RoomReader for FakeRoom {
    async fn room_name(&self) -> CallResult<String> {
        self.chain
            .read_room(&self.address, RoomField::RoomName, |d| d.room_name.clone())
    }

    async fn description(&self) -> CallResult<String> {
        self.chain
            .read_room(&self.address, RoomField::Description, |d| {
                d.description.clone()
            })
    }

    async fn room_admin(&self) -> CallResult<Account> {
        self.chain
            .read_room(&self.address, RoomField::RoomAdmin, |d| d.room_admin)
    }

    async fn super_admin(&self) -> CallResult<Account> {
        self.chain
            .read_room(&self.address, RoomField::SuperAdmin, |d| d.super_admin)
    }

    async fn voters(&self) -> CallResult<Vec<Voter>> {
        self.chain
            .read_room(&self.address, RoomField::Voters, |d| d.voters.clone())
    }

    async fn candidates(&self) -> CallResult<Vec<Candidate>> {
        self.chain
            .read_room(&self.address, RoomField::Candidates, |d| d.candidates.clone())
    }

    async fn is_active(&self) -> CallResult<bool> {
        self.chain
            .read_room(&self.address, RoomField::IsActive, |d| d.is_active)
    }

    async fn voting_started(&self) -> CallResult<bool> {
        self.chain
            .read_room(&self.address, RoomField::VotingStarted, |d| d.voting_started)
    }

    async fn voting_ended(&self) -> CallResult<bool> {
        self.chain
            .read_room(&self.address, RoomField::VotingEnded, |d| d.voting_ended)
    }

    async fn max_voters(&self) -> CallResult<u64> {
        self.chain
            .read_room(&self.address, RoomField::MaxVoters, |d| d.max_voters)
    }

    async fn factory(&self) -> CallResult<Account> {
        self.chain
            .read_room(&self.address, RoomField::Factory, |d| d.factory)
    }
}

impl RoomWriter for FakeRoom {
    async fn submit(&self, action: &RoomAction) -> CallResult<TxHash> {
        let mut state = self.chain.lock();
        if let Some(err) = state.write_error.clone() {
            return Err(err);
        }
        if self.sender.is_none() {
            return Err(CallError::Reverted("no sender".to_string()));
        }
        let room = &mut state.room_mut(&self.address)?.detail;
        match action {
            RoomAction::StartVote => room.voting_started = true,
            RoomAction::EndVote => room.voting_ended = true,
            RoomAction::AddCandidate { name } => {
                let id = room.candidates.iter().map(|c| c.id + 1).max().unwrap_or(0);
                room.candidates.push(Candidate {
                    id,
                    name: name.clone(),
                    vote_count: 0,
                });
            }
            RoomAction::AddVoter { address, name } => {
                if room.voters.len() as u64 >= room.max_voters {
                    return Err(CallError::Reverted("room is full".to_string()));
                }
                room.voters.push(Voter {
                    address: *address,
                    name: name.clone(),
                });
            }
            RoomAction::RemoveVoter { address } => {
                room.voters.retain(|v| v.address != *address);
            }
            RoomAction::Vote { candidate_id } => {
                let candidate = room
                    .candidates
                    .iter_mut()
                    .find(|c| c.id == *candidate_id)
                    .ok_or_else(|| CallError::Reverted("invalid candidate".to_string()))?;
                candidate.vote_count += 1;
            }
            RoomAction::DeactivateRoom => room.is_active = false,
            RoomAction::TransferAdmin { new_admin } => room.room_admin = *new_admin,
            RoomAction::ResetRoom => {
                room.voting_started = false;
                room.voting_ended = false;
                room.candidates.clear();
                room.voters.clear();
            }
            RoomAction::ClearVotes => {
                for candidate in &mut room.candidates {
                    candidate.vote_count = 0;
                }
            }
            RoomAction::ClearCandidates => room.candidates.clear(),
        }
        state.room_writes.push((self.address, action.clone()));
        Ok(state.next_tx())
    }
}

#[derive(Debug)]
struct WalletState {
    accounts: Result<Vec<Account>, WalletError>,
    events: mpsc::UnboundedSender<WalletEvent>,
    receiver: Option<mpsc::UnboundedReceiver<WalletEvent>>,
    requests: usize,
}

/// Wallet that hands out a fixed account list and lets tests push events.
#[derive(Clone, Debug)]
pub struct FakeWallet {
    state: Arc<Mutex<WalletState>>,
}

impl FakeWallet {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self::with_response(Ok(accounts))
    }

    pub fn rejecting(err: WalletError) -> Self {
        Self::with_response(Err(err))
    }

    fn with_response(accounts: Result<Vec<Account>, WalletError>) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(WalletState {
                accounts,
                events,
                receiver: Some(receiver),
                requests: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_accounts(&self, accounts: Vec<Account>) {
        self.lock().accounts = Ok(accounts);
    }

    pub fn emit(&self, event: WalletEvent) {
        // Nobody listening is fine; the event is simply lost.
        let _ = self.lock().events.send(event);
    }

    pub fn requests(&self) -> usize {
        self.lock().requests
    }
}

impl WalletProvider for FakeWallet {
    async fn request_accounts(&self) -> Result<Vec<Account>, WalletError> {
        let mut state = self.lock();
        state.requests += 1;
        state.accounts.clone()
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<WalletEvent>> {
        self.lock().receiver.take()
    }
}
