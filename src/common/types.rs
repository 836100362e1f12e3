//! Shared type definitions for the lottopool engine
//!
//! Canonical identifiers and value types used by the engine and by every
//! collaborator implementation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Sequential game identifier, starting at 1
pub type GameId = u64;

/// Ticket identifier handed out by the ticket registry
pub type TicketId = u64;

/// Identifier correlating a draw to its oracle callback
pub type RequestId = u64;

/// Token amount in ledger base units (18 decimals by convention)
pub type Amount = u128;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// One unit of the payment token at 18 decimals
pub const TOKEN_UNIT: Amount = 1_000_000_000_000_000_000;

/// 32-byte account address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministic address derived from a human label (local setups and tests)
    pub fn from_label(label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"lottopool:address:");
        hasher.update(label.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps tracing output readable
        write!(f, "0x{}..", hex::encode(&self.0[..4]))
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| format!("Invalid address hex: {}", e))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "Address must be 32 bytes".to_string())?;
        Ok(Self(array))
    }
}

/// Raw randomness delivered by an oracle
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomWord(pub [u8; 32]);

impl RandomWord {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Big-endian embedding of a small integer, handy for fixtures
    pub fn from_u128(value: u128) -> Self {
        let mut bytes = [0u8; 32];
        bytes[16..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for RandomWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RandomWord({})", hex::encode(self.0))
    }
}

/// Convert whole tokens into base units
pub fn tokens(whole: u64) -> Amount {
    whole as Amount * TOKEN_UNIT
}
