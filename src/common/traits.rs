//! Collaborator interfaces
//!
//! The engine never owns funds, ticket ownership, time or randomness itself.
//! It reaches each of them through one of these traits so deployments can
//! plug in real services and tests can plug in the in-memory versions.

use crate::common::types::{Address, Amount, GameId, RandomWord, RequestId, TicketId, Timestamp};
use crate::errors::{LedgerError, OracleError, RegistryError};
use crate::games::codec::EncodedNumber;

/// Fungible token ledger used for payments and prizes
pub trait TokenLedger: Send + Sync {
    /// Move `amount` from `from` to `to` using the allowance `from` granted `spender`
    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), LedgerError>;

    /// Move `amount` out of an account the caller controls
    fn transfer(&self, from: Address, to: Address, amount: Amount) -> Result<(), LedgerError>;

    fn balance_of(&self, account: Address) -> Amount;

    fn allowance(&self, owner: Address, spender: Address) -> Amount;
}

/// Non-fungible ticket ownership registry
pub trait TicketRegistry: Send + Sync {
    /// Mint one ticket per number, in order, returning the new ids
    fn mint_batch(
        &self,
        owner: Address,
        game_id: GameId,
        numbers: &[EncodedNumber],
    ) -> Result<Vec<TicketId>, RegistryError>;

    fn owner_of(&self, ticket_id: TicketId) -> Result<Address, RegistryError>;

    fn user_tickets(&self, game_id: GameId, owner: Address) -> Vec<TicketId>;
}

/// Time source, overridable in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// What an oracle hands back when asked for randomness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomnessReceipt {
    pub request_id: RequestId,
    /// Present when the oracle answers synchronously
    pub immediate: Option<RandomWord>,
}

/// Outbound half of the randomness contract; the inbound half is
/// `LottoEngine::fulfill_randomness`
pub trait RandomnessOracle: Send + Sync {
    fn request(&self, game_id: GameId, seed: u64) -> Result<RandomnessReceipt, OracleError>;
}
