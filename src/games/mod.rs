pub mod codec;
pub mod lifecycle;
pub mod pricing;
pub mod randomness;
pub mod settlement;
pub mod types;
pub mod vrf_engine;

pub use codec::{NumberCodec, SuffixIndex, WinningOutcome};
pub use lifecycle::{Collaborators, LottoEngine, Roles};
pub use pricing::{DiscountTier, PricingEngine};
pub use randomness::{RandomnessRequest, RequestRegistry, RequestStatus};
pub use types::*;
pub use vrf_engine::{VrfOracle, VrfProof};
