//! Number codec: ticket validation, packing, matching and outcome derivation
//!
//! Lottery numbers are fixed-length digit sequences packed most-significant
//! digit first, 16 bits per digit, into a `u128`. Because of that layout the
//! last `k` digits of a number are simply its low `16 * k` bits, which is what
//! both the suffix-run match and the [`SuffixIndex`] lean on.
//!
//! Roulette numbers are the one-digit case of the same layout.

use crate::common::types::RandomWord;
use crate::errors::{LottoError, LottoResult};
use crate::games::types::GameVariant;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Packed ticket number
pub type EncodedNumber = u128;

pub const DIGIT_BITS: u32 = 16;
pub const MAX_NUMBER_SIZE: usize = (u128::BITS / DIGIT_BITS) as usize;

const DIGIT_MASK: u128 = 0xFFFF;

/// Drawn result for a game, kept in both forms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningOutcome {
    pub digits: Vec<u16>,
    pub encoded: EncodedNumber,
}

impl WinningOutcome {
    pub fn from_digits(digits: Vec<u16>) -> Self {
        let encoded = encode(&digits);
        Self { digits, encoded }
    }
}

/// Pack digits MSD-first
pub fn encode(digits: &[u16]) -> EncodedNumber {
    digits
        .iter()
        .fold(0u128, |acc, digit| (acc << DIGIT_BITS) | *digit as u128)
}

/// Unpack `len` digits; inverse of [`encode`] for `len == digits.len()`
pub fn decode(encoded: EncodedNumber, len: usize) -> Vec<u16> {
    (0..len)
        .rev()
        .map(|position| ((encoded >> (DIGIT_BITS * position as u32)) & DIGIT_MASK) as u16)
        .collect()
}

/// Low `k` digits of a packed number
pub fn suffix_key(encoded: EncodedNumber, k: usize) -> EncodedNumber {
    let bits = DIGIT_BITS * k as u32;
    if bits >= u128::BITS {
        encoded
    } else {
        encoded & ((1u128 << bits) - 1)
    }
}

/// Length of the run of equal digits counted from the least-significant end
pub fn suffix_run(ticket: EncodedNumber, outcome: EncodedNumber, len: usize) -> usize {
    let diff = ticket ^ outcome;
    (0..len)
        .take_while(|position| (diff >> (DIGIT_BITS * *position as u32)) & DIGIT_MASK == 0)
        .count()
}

/// Variant-aware codec bound to a game's valid range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberCodec {
    variant: GameVariant,
    max_valid_range: u16,
}

impl NumberCodec {
    pub fn new(variant: GameVariant, max_valid_range: u16) -> Self {
        Self { variant, max_valid_range }
    }

    pub fn variant(&self) -> GameVariant {
        self.variant
    }

    pub fn max_valid_range(&self) -> u16 {
        self.max_valid_range
    }

    /// Digits per ticket, which is also the number of prize brackets
    pub fn digits_per_ticket(&self) -> usize {
        self.variant.digits_per_ticket()
    }

    fn min_value(&self) -> u16 {
        match self.variant {
            GameVariant::Lottery { .. } => 0,
            GameVariant::Roulette => 1,
        }
    }

    /// Check a flat number list for `tickets` tickets and pack it per ticket
    pub fn validate_numbers(&self, numbers: &[u16], tickets: usize) -> LottoResult<Vec<EncodedNumber>> {
        let per_ticket = self.digits_per_ticket();
        let expected = tickets
            .checked_mul(per_ticket)
            .ok_or(LottoError::ArithmeticOverflow("number count"))?;
        if numbers.len() != expected {
            return Err(LottoError::InvalidMintNumbers { expected, actual: numbers.len() });
        }

        if let Some(bad) = numbers
            .iter()
            .find(|value| **value < self.min_value() || **value > self.max_valid_range)
        {
            return Err(LottoError::InvalidTicketNumberRange {
                value: *bad,
                max_valid_range: self.max_valid_range,
            });
        }

        Ok(numbers.chunks(per_ticket).map(encode).collect())
    }

    /// Match bracket of a ticket: trailing digits matched, 0 for none
    pub fn match_bracket(&self, ticket: EncodedNumber, outcome: EncodedNumber) -> usize {
        suffix_run(ticket, outcome, self.digits_per_ticket())
    }

    pub fn decode(&self, encoded: EncodedNumber) -> Vec<u16> {
        decode(encoded, self.digits_per_ticket())
    }

    /// Map oracle randomness onto the valid number range
    pub fn derive_outcome(&self, word: &RandomWord, salt: u64) -> WinningOutcome {
        let digits = match self.variant {
            GameVariant::Lottery { number_size } => (0..number_size as u32)
                .map(|position| {
                    let value = expand(word, salt, Some(position));
                    (value % (self.max_valid_range as u128 + 1)) as u16
                })
                .collect(),
            GameVariant::Roulette => {
                let value = expand(word, salt, None);
                vec![(value % self.max_valid_range as u128) as u16 + 1]
            }
        };
        WinningOutcome::from_digits(digits)
    }
}

fn expand(word: &RandomWord, salt: u64, position: Option<u32>) -> u128 {
    let mut hasher = Sha256::new();
    hasher.update(word.as_bytes());
    hasher.update(salt.to_be_bytes());
    if let Some(position) = position {
        hasher.update(position.to_be_bytes());
    }
    let digest = hasher.finalize();
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(head)
}

/// Per-game count of tickets sharing each trailing suffix.
///
/// `counts[k - 1][s]` is the number of tickets whose last `k` digits are `s`.
/// Tickets with exactly `k` trailing matches are then
/// `counts[k-1][suffix_k] - counts[k][suffix_{k+1}]`, so bracket sizes come
/// out of `len` lookups instead of a ticket scan.
#[derive(Debug, Clone, Default)]
pub struct SuffixIndex {
    counts: Vec<HashMap<EncodedNumber, u32>>,
}

impl SuffixIndex {
    pub fn new(len: usize) -> Self {
        Self { counts: vec![HashMap::new(); len] }
    }

    pub fn record(&mut self, encoded: EncodedNumber) {
        for (offset, table) in self.counts.iter_mut().enumerate() {
            *table.entry(suffix_key(encoded, offset + 1)).or_insert(0) += 1;
        }
    }

    fn at_least(&self, outcome: EncodedNumber, k: usize) -> u32 {
        self.counts
            .get(k - 1)
            .and_then(|table| table.get(&suffix_key(outcome, k)))
            .copied()
            .unwrap_or(0)
    }

    /// Exact winners per bracket; index `k - 1` holds bracket `k`
    pub fn winners_per_bracket(&self, outcome: EncodedNumber) -> Vec<u32> {
        let len = self.counts.len();
        (1..=len)
            .map(|k| {
                let deeper = if k < len { self.at_least(outcome, k + 1) } else { 0 };
                self.at_least(outcome, k).saturating_sub(deeper)
            })
            .collect()
    }
}
