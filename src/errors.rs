//! Error types for the lottopool engine
//!
//! Every engine failure is synchronous and leaves state untouched; the caller
//! resubmits. Collaborator failures are wrapped so their context survives.

use crate::common::types::{Address, Amount, GameId, RequestId, TicketId};

/// Root error type for all engine operations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LottoError {
    #[error("Caller is not the administrator")]
    InvalidAdmin,

    #[error("Invalid distribution length: expected {expected}, got {actual}")]
    InvalidDistributionLength { expected: usize, actual: usize },

    #[error("Distribution must total 100, got {total}")]
    InvalidDistributionTotal { total: u32 },

    #[error("Prize or cost cannot be 0")]
    InvalidPriceOrCost,

    #[error("Timestamps for game invalid: open {open_time}, close {close_time}, now {now}")]
    InvalidTimestamp { open_time: u64, close_time: u64, now: u64 },

    #[error("Ticket number {value} out of range (max {max_valid_range})")]
    InvalidTicketNumberRange { value: u16, max_valid_range: u16 },

    #[error("Expected {expected} numbers for the batch, got {actual}")]
    InvalidMintNumbers { expected: usize, actual: usize },

    #[error("Payment not approved: {0}")]
    InvalidMintApproval(LedgerError),

    #[error("Invalid time for mint on game {0}")]
    InvalidMintTimestamp(GameId),

    #[error("Cannot draw game {0} before it closes")]
    InvalidDrawTime(GameId),

    #[error("Game {0} already has a pending or completed draw")]
    InvalidDrawRepeat(GameId),

    #[error("Wait till {claimable_from} to claim (now {now})")]
    InvalidClaimTime { claimable_from: u64, now: u64 },

    #[error("Winning number not chosen yet for game {0}")]
    InvalidClaimNotDrawn(GameId),

    #[error("Only the owner can claim ticket {0}")]
    InvalidClaimOwner(TicketId),

    #[error("Ticket {0} already claimed")]
    InvalidClaimDuplicate(TicketId),

    #[error("Ticket {ticket_id} belongs to game {actual}, not {expected}")]
    InvalidClaimWrongGame { ticket_id: TicketId, expected: GameId, actual: GameId },

    #[error("Cannot set max range to current value {0}")]
    InvalidSizeUpdateDuplicate(u16),

    #[error("Max range cannot be 0")]
    InvalidMaxRange,

    #[error("Batch size {requested} invalid (max {max})")]
    InvalidBatchSize { requested: u32, max: u32 },

    #[error("Game {0} not found")]
    GameNotFound(GameId),

    #[error("Ticket {0} not found")]
    TicketNotFound(TicketId),

    #[error("Insufficient unreserved funds for prize pool: need {required}, available {available}")]
    InsufficientPrizeFunds { required: Amount, available: Amount },

    #[error("Withdrawal of {requested} exceeds residual funds {available}")]
    InvalidWithdrawAmount { requested: Amount, available: Amount },

    #[error("Only the randomness coordinator can fulfill, got {0}")]
    InvalidRandomnessSource(Address),

    #[error("Unknown randomness request {0}")]
    UnknownRandomnessRequest(RequestId),

    #[error("Randomness request {0} is no longer pending")]
    DuplicateFulfillment(RequestId),

    #[error("Oracle reused request id {0} that is already tracked")]
    DuplicateRandomnessRequest(RequestId),

    #[error("Mint failed ({mint}) and refund of {amount} failed ({refund})")]
    MintRefundFailed { mint: RegistryError, refund: LedgerError, amount: Amount },

    #[error("Draw for game {0} cannot be cancelled")]
    InvalidDrawCancel(GameId),

    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Token ledger failures
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("transfer amount exceeds allowance ({allowance} < {requested})")]
    InsufficientAllowance { allowance: Amount, requested: Amount },

    #[error("transfer amount exceeds balance ({balance} < {requested})")]
    InsufficientBalance { balance: Amount, requested: Amount },

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Ticket registry failures
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("ticket {0} does not exist")]
    UnknownTicket(TicketId),

    #[error("{caller} does not own ticket {ticket_id}")]
    NotOwner { caller: Address, ticket_id: TicketId },

    #[error("mint failed: {0}")]
    MintFailed(String),
}

/// Randomness oracle failures
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("randomness request failed: {0}")]
    RequestFailed(String),

    #[error("VRF failure: {0}")]
    Vrf(String),

    #[error("timed out after {timeout_ms}ms waiting for request {request_id}")]
    Timeout { request_id: RequestId, timeout_ms: u64 },

    #[error("waiter cancelled for request {0}")]
    Cancelled(RequestId),
}

/// Configuration and validation errors
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue { field: String, value: String, reason: String },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

// Convenience type alias for Results
pub type LottoResult<T> = Result<T, LottoError>;
