//! In-memory collaborators for local rounds and tests
//!
//! Each type is a cheap `Clone` handle over shared state, so a test can keep
//! one handle while the engine owns another.

use crate::common::traits::{Clock, RandomnessOracle, RandomnessReceipt, TicketRegistry, TokenLedger};
use crate::common::types::{Address, Amount, GameId, RequestId, TicketId, Timestamp};
use crate::errors::{LedgerError, OracleError, RegistryError};
use crate::games::codec::EncodedNumber;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
}

/// ERC20-style ledger kept in memory
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` out of thin air
    pub fn mint(&self, account: Address, amount: Amount) {
        let mut state = write(&self.state);
        *state.balances.entry(account).or_insert(0) += amount;
    }

    /// Set the allowance `owner` grants `spender`
    pub fn approve(&self, owner: Address, spender: Address, amount: Amount) {
        write(&self.state).allowances.insert((owner, spender), amount);
    }

    fn debit(state: &mut LedgerState, from: Address, amount: Amount) -> Result<(), LedgerError> {
        let balance = state.balances.get(&from).copied().unwrap_or(0);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance { balance, requested: amount });
        }
        state.balances.insert(from, balance - amount);
        Ok(())
    }
}

impl TokenLedger for InMemoryLedger {
    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let mut state = write(&self.state);
        let allowance = state.allowances.get(&(from, spender)).copied().unwrap_or(0);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance { allowance, requested: amount });
        }
        Self::debit(&mut state, from, amount)?;
        state.allowances.insert((from, spender), allowance - amount);
        *state.balances.entry(to).or_insert(0) += amount;
        Ok(())
    }

    fn transfer(&self, from: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        let mut state = write(&self.state);
        Self::debit(&mut state, from, amount)?;
        *state.balances.entry(to).or_insert(0) += amount;
        Ok(())
    }

    fn balance_of(&self, account: Address) -> Amount {
        read(&self.state).balances.get(&account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: Address, spender: Address) -> Amount {
        read(&self.state).allowances.get(&(owner, spender)).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
struct TicketEntry {
    game_id: GameId,
    owner: Address,
    number: EncodedNumber,
}

#[derive(Default)]
struct RegistryState {
    tickets: HashMap<TicketId, TicketEntry>,
    by_owner: HashMap<(GameId, Address), Vec<TicketId>>,
}

/// Ticket registry kept in memory; ids start at 1
#[derive(Clone)]
pub struct InMemoryRegistry {
    state: Arc<RwLock<RegistryState>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Hand a ticket to someone else (secondary transfer)
    pub fn transfer(&self, from: Address, to: Address, ticket_id: TicketId) -> Result<(), RegistryError> {
        let mut state = write(&self.state);
        let entry = state
            .tickets
            .get_mut(&ticket_id)
            .ok_or(RegistryError::UnknownTicket(ticket_id))?;
        if entry.owner != from {
            return Err(RegistryError::NotOwner { caller: from, ticket_id });
        }
        entry.owner = to;
        let game_id = entry.game_id;

        if let Some(owned) = state.by_owner.get_mut(&(game_id, from)) {
            owned.retain(|id| *id != ticket_id);
        }
        state.by_owner.entry((game_id, to)).or_default().push(ticket_id);
        Ok(())
    }

    pub fn number_of(&self, ticket_id: TicketId) -> Option<EncodedNumber> {
        read(&self.state).tickets.get(&ticket_id).map(|entry| entry.number)
    }

    pub fn total_minted(&self) -> usize {
        read(&self.state).tickets.len()
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketRegistry for InMemoryRegistry {
    fn mint_batch(
        &self,
        owner: Address,
        game_id: GameId,
        numbers: &[EncodedNumber],
    ) -> Result<Vec<TicketId>, RegistryError> {
        let mut state = write(&self.state);
        let mut ids = Vec::with_capacity(numbers.len());

        for number in numbers {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            state.tickets.insert(id, TicketEntry { game_id, owner, number: *number });
            ids.push(id);
        }
        state.by_owner.entry((game_id, owner)).or_default().extend_from_slice(&ids);

        Ok(ids)
    }

    fn owner_of(&self, ticket_id: TicketId) -> Result<Address, RegistryError> {
        read(&self.state)
            .tickets
            .get(&ticket_id)
            .map(|entry| entry.owner)
            .ok_or(RegistryError::UnknownTicket(ticket_id))
    }

    fn user_tickets(&self, game_id: GameId, owner: Address) -> Vec<TicketId> {
        read(&self.state)
            .by_owner
            .get(&(game_id, owner))
            .cloned()
            .unwrap_or_default()
    }
}

/// Wall-clock time
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp().max(0) as Timestamp
    }
}

/// Clock that only moves when told to
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self { now: Arc::new(AtomicU64::new(start)) }
    }

    pub fn set(&self, timestamp: Timestamp) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) -> Timestamp {
        self.now.fetch_add(seconds, Ordering::SeqCst) + seconds
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// A request the queued oracle has accepted but not answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedRequest {
    pub request_id: RequestId,
    pub game_id: GameId,
    pub seed: u64,
}

/// Asynchronous oracle stand-in: hands out ids and never answers by itself.
/// Whoever plays the coordinator calls `LottoEngine::fulfill_randomness` later.
#[derive(Clone)]
pub struct QueuedOracle {
    next_id: Arc<AtomicU64>,
    requests: Arc<RwLock<Vec<QueuedRequest>>>,
}

impl QueuedOracle {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<QueuedRequest> {
        read(&self.requests).clone()
    }

    pub fn last_request(&self) -> Option<QueuedRequest> {
        read(&self.requests).last().copied()
    }
}

impl Default for QueuedOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomnessOracle for QueuedOracle {
    fn request(&self, game_id: GameId, seed: u64) -> Result<RandomnessReceipt, OracleError> {
        let request_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        write(&self.requests).push(QueuedRequest { request_id, game_id, seed });
        Ok(RandomnessReceipt { request_id, immediate: None })
    }
}
