use crate::common::types::{Address, Amount, GameId, RequestId, TicketId, Timestamp};
use crate::games::codec::{EncodedNumber, WinningOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported game variants
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GameVariant {
    /// Fixed-length digit sequences, paid by suffix-run brackets
    Lottery { number_size: u8 },
    /// Single number, paid on exact match
    Roulette,
}

impl GameVariant {
    pub fn digits_per_ticket(&self) -> usize {
        match self {
            GameVariant::Lottery { number_size } => *number_size as usize,
            GameVariant::Roulette => 1,
        }
    }
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameVariant::Lottery { number_size } => write!(f, "lottery({})", number_size),
            GameVariant::Roulette => write!(f, "roulette"),
        }
    }
}

/// Formal game state; claims only touch ticket flags
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Pending,
    Open,
    Closed,
    NumbersDrawn,
}

/// One round of a game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub variant: GameVariant,
    pub open_time: Timestamp,
    pub close_time: Timestamp,
    pub created_at: Timestamp,
    pub ticket_cost: Amount,
    /// Original pool; never changes after creation
    pub prize_pool: Amount,
    pub prize_paid: Amount,
    /// Percentage per bracket, index `k - 1` for `k` matches
    pub distribution: Vec<u8>,
    pub max_valid_range: u16,
    pub winning_outcome: Option<WinningOutcome>,
    pub bracket_winner_counts: Vec<u32>,
    pub randomness_request: Option<RequestId>,
    pub tickets_sold: u32,
    pub revenue: Amount,
}

impl Game {
    pub fn state(&self, now: Timestamp) -> GameState {
        if self.winning_outcome.is_some() {
            GameState::NumbersDrawn
        } else if now >= self.close_time {
            GameState::Closed
        } else if now >= self.open_time {
            GameState::Open
        } else {
            GameState::Pending
        }
    }

    pub fn is_drawn(&self) -> bool {
        self.winning_outcome.is_some()
    }

    pub fn draw_pending(&self) -> bool {
        self.randomness_request.is_some() && self.winning_outcome.is_none()
    }

    pub fn prize_remaining(&self) -> Amount {
        self.prize_pool - self.prize_paid
    }

    pub fn share_pct(&self, bracket: usize) -> u8 {
        if bracket == 0 {
            return 0;
        }
        self.distribution.get(bracket - 1).copied().unwrap_or(0)
    }
}

/// Engine-side view of a minted ticket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketRecord {
    pub game_id: GameId,
    pub number: EncodedNumber,
    pub claimed: bool,
}

/// Price of a batch, before and after the volume discount
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CostQuote {
    pub quantity: u32,
    pub gross: Amount,
    pub discount: Amount,
    pub total: Amount,
    pub discount_pct: u8,
}

/// Result of a single successful claim
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub ticket_id: TicketId,
    pub bracket: usize,
    pub amount: Amount,
}

/// Result of a batch claim
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchClaimReceipt {
    pub game_id: GameId,
    pub receipts: Vec<ClaimReceipt>,
    pub total_paid: Amount,
}

/// Events published by the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LottoEvent {
    GameOpened {
        game_id: GameId,
        initial_state: GameState,
    },
    BatchMint {
        buyer: Address,
        game_id: GameId,
        ticket_ids: Vec<TicketId>,
    },
    DrawRequested {
        game_id: GameId,
        request_id: RequestId,
    },
    WinningOutcomeSet {
        game_id: GameId,
        outcome: WinningOutcome,
    },
    DrawCancelled {
        game_id: GameId,
        request_id: RequestId,
    },
    TicketClaimed {
        game_id: GameId,
        ticket_id: TicketId,
        owner: Address,
        bracket: usize,
        amount: Amount,
    },
    MaxRangeUpdated {
        previous: u16,
        current: u16,
    },
    ResidualWithdrawn {
        recipient: Address,
        amount: Amount,
    },
}
