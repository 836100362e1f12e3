//! Settlement: prize computation and claims
//!
//! Bracket winner counts are fixed when the outcome is written, so every
//! claim pays the same per-winner amount regardless of claim order. Local
//! effects are applied before the ledger transfer and undone if it fails.

use crate::common::types::{Address, Amount, GameId, TicketId};
use crate::errors::{LottoError, LottoResult};
use crate::games::codec::NumberCodec;
use crate::games::lifecycle::LottoEngine;
use crate::games::types::{BatchClaimReceipt, ClaimReceipt, Game, LottoEvent};
use std::collections::HashSet;

/// Amount each winner of `bracket` receives (floor division)
pub fn per_winner_amount(game: &Game, bracket: usize) -> Amount {
    let pct = game.share_pct(bracket) as Amount;
    let winners = bracket
        .checked_sub(1)
        .and_then(|i| game.bracket_winner_counts.get(i))
        .copied()
        .unwrap_or(0) as Amount;
    if pct == 0 || winners == 0 {
        return 0;
    }
    game.prize_pool.saturating_mul(pct) / 100 / winners
}

/// Per-winner amount for every bracket; index `k - 1` holds bracket `k`
pub fn payout_table(game: &Game) -> Vec<Amount> {
    (1..=game.distribution.len())
        .map(|bracket| per_winner_amount(game, bracket))
        .collect()
}

/// Total owed to all winners of a drawn game, paid or not
pub fn entitlement(game: &Game) -> Amount {
    payout_table(game)
        .iter()
        .zip(game.bracket_winner_counts.iter())
        .map(|(amount, winners)| amount.saturating_mul(*winners as Amount))
        .fold(0, Amount::saturating_add)
}

impl LottoEngine {
    /// Validate one claim without touching state
    fn assess_claim(&self, caller: Address, game_id: GameId, ticket_id: TicketId) -> LottoResult<ClaimReceipt> {
        let record = self.tickets.get(&ticket_id).ok_or(LottoError::TicketNotFound(ticket_id))?;
        if record.game_id != game_id {
            return Err(LottoError::InvalidClaimWrongGame {
                ticket_id,
                expected: game_id,
                actual: record.game_id,
            });
        }

        if self.registry.owner_of(ticket_id)? != caller {
            return Err(LottoError::InvalidClaimOwner(ticket_id));
        }

        let game = self.game_ref(game_id)?;
        let outcome = game
            .winning_outcome
            .as_ref()
            .ok_or(LottoError::InvalidClaimNotDrawn(game_id))?;

        let now = self.clock.now();
        let claimable_from = self.claimable_from(game_id)?;
        if now < claimable_from {
            return Err(LottoError::InvalidClaimTime { claimable_from, now });
        }

        if record.claimed {
            return Err(LottoError::InvalidClaimDuplicate(ticket_id));
        }

        let codec = NumberCodec::new(game.variant, game.max_valid_range);
        let bracket = codec.match_bracket(record.number, outcome.encoded);

        Ok(ClaimReceipt {
            ticket_id,
            bracket,
            amount: per_winner_amount(game, bracket),
        })
    }

    fn set_claimed(&mut self, ticket_id: TicketId, claimed: bool) {
        if let Some(record) = self.tickets.get_mut(&ticket_id) {
            record.claimed = claimed;
        }
    }

    /// Mark tickets consumed and book the payout, then pay once. Undone if the
    /// ledger refuses.
    fn settle(&mut self, caller: Address, game_id: GameId, receipts: &[ClaimReceipt]) -> LottoResult<Amount> {
        let index = self.game_index(game_id)?;
        let total = receipts
            .iter()
            .try_fold(0 as Amount, |acc, receipt| acc.checked_add(receipt.amount))
            .ok_or(LottoError::ArithmeticOverflow("claim total"))?;
        let paid = self.games[index]
            .prize_paid
            .checked_add(total)
            .filter(|paid| *paid <= self.games[index].prize_pool)
            .ok_or(LottoError::ArithmeticOverflow("prize paid"))?;

        let previous_paid = self.games[index].prize_paid;
        for receipt in receipts {
            self.set_claimed(receipt.ticket_id, true);
        }
        self.games[index].prize_paid = paid;

        if total > 0 {
            if let Err(e) = self.ledger.transfer(self.roles.engine, caller, total) {
                tracing::warn!(game_id, %caller, %total, error = %e, "Prize transfer failed, rolling back claim");
                for receipt in receipts {
                    self.set_claimed(receipt.ticket_id, false);
                }
                self.games[index].prize_paid = previous_paid;
                return Err(e.into());
            }
        }

        self.metrics.record_claims(receipts.len() as u64, total);
        for receipt in receipts {
            self.emit(LottoEvent::TicketClaimed {
                game_id,
                ticket_id: receipt.ticket_id,
                owner: caller,
                bracket: receipt.bracket,
                amount: receipt.amount,
            });
        }
        Ok(total)
    }

    /// Claim the prize for one ticket. A ticket with no winning bracket is
    /// still consumed, with nothing paid.
    pub fn claim(&mut self, caller: Address, game_id: GameId, ticket_id: TicketId) -> LottoResult<ClaimReceipt> {
        let receipt = self.assess_claim(caller, game_id, ticket_id)?;
        self.settle(caller, game_id, std::slice::from_ref(&receipt))?;

        tracing::info!(game_id, ticket_id, bracket = receipt.bracket, amount = %receipt.amount, "Ticket claimed");
        Ok(receipt)
    }

    /// Claim several tickets of one game in a single payout. Either every
    /// ticket is claimed or none is.
    pub fn batch_claim(
        &mut self,
        caller: Address,
        game_id: GameId,
        ticket_ids: &[TicketId],
    ) -> LottoResult<BatchClaimReceipt> {
        let mut seen = HashSet::with_capacity(ticket_ids.len());
        let mut receipts = Vec::with_capacity(ticket_ids.len());

        for ticket_id in ticket_ids {
            let receipt = self.assess_claim(caller, game_id, *ticket_id)?;
            if !seen.insert(*ticket_id) {
                return Err(LottoError::InvalidClaimDuplicate(*ticket_id));
            }
            receipts.push(receipt);
        }

        let total_paid = self.settle(caller, game_id, &receipts)?;

        tracing::info!(game_id, tickets = receipts.len(), %total_paid, "Batch claimed");
        Ok(BatchClaimReceipt { game_id, receipts, total_paid })
    }

    /// Per-winner payout for each bracket of a drawn game
    pub fn payout_table(&self, game_id: GameId) -> LottoResult<Vec<Amount>> {
        let game = self.game_ref(game_id)?;
        if !game.is_drawn() {
            return Err(LottoError::InvalidClaimNotDrawn(game_id));
        }
        Ok(payout_table(game))
    }
}
