//! Lottopool - pooled-prize number-matching games
//!
//! Ticket accounting and prize settlement for two game variants: a
//! fixed-length digit Lottery paid by trailing-match brackets, and a
//! single-number Russian Roulette. Funds, ticket ownership, time and
//! randomness are external collaborators reached through `common::traits`.

pub mod common;
pub mod config;
pub mod errors;
pub mod games;
pub mod logging;
pub mod metrics;

pub use common::memory::{InMemoryLedger, InMemoryRegistry, ManualClock, QueuedOracle, SystemClock};
pub use common::traits::{Clock, RandomnessOracle, RandomnessReceipt, TicketRegistry, TokenLedger};
pub use common::types::{tokens, Address, Amount, GameId, RandomWord, RequestId, TicketId, Timestamp, TOKEN_UNIT};
pub use config::{ConfigBuilder, ConfigLoader, EngineConfig};
pub use errors::{LottoError, LottoResult};
pub use games::{
    BatchClaimReceipt, ClaimReceipt, Collaborators, CostQuote, Game, GameState, GameVariant, LottoEngine,
    LottoEvent, Roles, VrfOracle,
};
pub use metrics::{EngineMetrics, MetricsSnapshot};
