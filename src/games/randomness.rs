//! Randomness request/fulfill contract
//!
//! A draw is a two-phase exchange: `request_draw` asks the oracle for
//! randomness and records a pending [`RandomnessRequest`]; the coordinator
//! later answers through `fulfill_randomness`. The pending window may be
//! arbitrarily long, so the request state lives in a shared
//! [`RequestRegistry`] that async callers can wait on.

use crate::common::types::{Address, GameId, RandomWord, RequestId, Timestamp};
use crate::errors::{LottoError, LottoResult, OracleError};
use crate::games::codec::{NumberCodec, WinningOutcome};
use crate::games::lifecycle::LottoEngine;
use crate::games::types::LottoEvent;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

/// One outstanding or settled draw request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessRequest {
    pub request_id: RequestId,
    pub game_id: GameId,
    pub salt: u64,
    pub status: RequestStatus,
    pub requested_at: Timestamp,
    pub result_seed: Option<RandomWord>,
}

/// Shared registry of draw requests with wake-ups for waiters.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct RequestRegistry {
    requests: Arc<DashMap<RequestId, RandomnessRequest>>,
    waiters: Arc<DashMap<RequestId, Vec<oneshot::Sender<RandomWord>>>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, request: RandomnessRequest) {
        self.requests.insert(request.request_id, request);
    }

    pub fn get(&self, request_id: RequestId) -> Option<RandomnessRequest> {
        self.requests.get(&request_id).map(|entry| entry.clone())
    }

    pub fn status(&self, request_id: RequestId) -> Option<RequestStatus> {
        self.requests.get(&request_id).map(|entry| entry.status)
    }

    pub fn pending_count(&self) -> usize {
        self.requests
            .iter()
            .filter(|entry| entry.status == RequestStatus::Pending)
            .count()
    }

    fn ensure_pending(&self, request_id: RequestId) -> LottoResult<RandomnessRequest> {
        let request = self
            .get(request_id)
            .ok_or(LottoError::UnknownRandomnessRequest(request_id))?;
        if request.status != RequestStatus::Pending {
            return Err(LottoError::DuplicateFulfillment(request_id));
        }
        Ok(request)
    }

    /// Settle a pending request and wake everyone waiting on it
    pub fn mark_fulfilled(&self, request_id: RequestId, word: RandomWord) -> LottoResult<RandomnessRequest> {
        let settled = {
            let mut entry = self
                .requests
                .get_mut(&request_id)
                .ok_or(LottoError::UnknownRandomnessRequest(request_id))?;
            if entry.status != RequestStatus::Pending {
                return Err(LottoError::DuplicateFulfillment(request_id));
            }
            entry.status = RequestStatus::Fulfilled;
            entry.result_seed = Some(word);
            entry.clone()
        };

        if let Some((_, senders)) = self.waiters.remove(&request_id) {
            for sender in senders {
                // Receiver may have timed out already
                let _ = sender.send(word);
            }
        }
        Ok(settled)
    }

    /// Cancel a pending request; waiters see `OracleError::Cancelled`
    pub fn mark_cancelled(&self, request_id: RequestId) -> LottoResult<RandomnessRequest> {
        let cancelled = {
            let mut entry = self
                .requests
                .get_mut(&request_id)
                .ok_or(LottoError::UnknownRandomnessRequest(request_id))?;
            if entry.status != RequestStatus::Pending {
                return Err(LottoError::DuplicateFulfillment(request_id));
            }
            entry.status = RequestStatus::Cancelled;
            entry.clone()
        };
        self.waiters.remove(&request_id);
        Ok(cancelled)
    }

    /// Wait until `request_id` is fulfilled, returning the delivered word.
    ///
    /// Resolves immediately for an already fulfilled request.
    pub async fn wait_for_outcome(&self, request_id: RequestId, timeout: Duration) -> LottoResult<RandomWord> {
        let (tx, rx) = oneshot::channel();
        // Register before reading the status so a fulfillment in between is not lost
        self.waiters.entry(request_id).or_default().push(tx);

        match self.get(request_id) {
            None => {
                self.waiters.remove(&request_id);
                return Err(LottoError::UnknownRandomnessRequest(request_id));
            }
            Some(RandomnessRequest { status: RequestStatus::Fulfilled, result_seed: Some(word), .. }) => {
                self.waiters.remove(&request_id);
                return Ok(word);
            }
            Some(RandomnessRequest { status: RequestStatus::Cancelled, .. }) => {
                self.waiters.remove(&request_id);
                return Err(OracleError::Cancelled(request_id).into());
            }
            Some(_) => {}
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(word)) => Ok(word),
            Ok(Err(_)) => Err(OracleError::Cancelled(request_id).into()),
            Err(_) => {
                if let Some(mut senders) = self.waiters.get_mut(&request_id) {
                    senders.retain(|sender| !sender.is_closed());
                }
                self.waiters.remove_if(&request_id, |_, senders| senders.is_empty());
                Err(OracleError::Timeout {
                    request_id,
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }
}

impl LottoEngine {
    /// Ask the oracle for randomness for a closed game
    pub fn request_draw(&mut self, caller: Address, game_id: GameId, salt: u64) -> LottoResult<RequestId> {
        self.ensure_admin(caller)?;
        let now = self.clock.now();
        let game = self.game_ref(game_id)?;

        if now < game.close_time {
            return Err(LottoError::InvalidDrawTime(game_id));
        }
        if game.is_drawn() || game.draw_pending() {
            return Err(LottoError::InvalidDrawRepeat(game_id));
        }

        let receipt = self.oracle.request(game_id, salt)?;
        let request_id = receipt.request_id;
        if let Some(existing) = self.requests.get(request_id) {
            tracing::error!(game_id, request_id, owner = existing.game_id, "Oracle reused a tracked request id");
            return Err(LottoError::DuplicateRandomnessRequest(request_id));
        }

        self.requests.insert(RandomnessRequest {
            request_id,
            game_id,
            salt,
            status: RequestStatus::Pending,
            requested_at: now,
            result_seed: None,
        });
        self.game_mut(game_id)?.randomness_request = Some(request_id);
        self.metrics.record_draw_requested();
        self.emit(LottoEvent::DrawRequested { game_id, request_id });

        if let Some(word) = receipt.immediate {
            tracing::debug!(game_id, request_id, "Oracle answered synchronously");
            self.apply_randomness(request_id, word)?;
        }

        Ok(request_id)
    }

    /// Oracle callback. Only the configured coordinator may deliver randomness.
    pub fn fulfill_randomness(
        &mut self,
        caller: Address,
        request_id: RequestId,
        word: RandomWord,
    ) -> LottoResult<WinningOutcome> {
        if caller != self.roles.coordinator {
            tracing::warn!(%caller, request_id, "Rejected randomness from unexpected source");
            return Err(LottoError::InvalidRandomnessSource(caller));
        }
        self.apply_randomness(request_id, word)
    }

    fn apply_randomness(&mut self, request_id: RequestId, word: RandomWord) -> LottoResult<WinningOutcome> {
        let request = self.requests.ensure_pending(request_id)?;
        let game_id = request.game_id;
        let index = self.game_index(game_id)?;

        let game = &self.games[index];
        if game.is_drawn() {
            return Err(LottoError::DuplicateFulfillment(request_id));
        }

        let codec = NumberCodec::new(game.variant, game.max_valid_range);
        let outcome = codec.derive_outcome(&word, request.salt);
        let counts = self.suffix_indexes[index].winners_per_bracket(outcome.encoded);

        self.requests.mark_fulfilled(request_id, word)?;

        tracing::info!(
            game_id,
            request_id,
            digits = ?outcome.digits,
            winners = ?counts,
            "Winning outcome set"
        );
        let game = &mut self.games[index];
        game.winning_outcome = Some(outcome.clone());
        game.bracket_winner_counts = counts;

        self.metrics.record_draw_fulfilled();
        self.emit(LottoEvent::WinningOutcomeSet { game_id, outcome: outcome.clone() });

        Ok(outcome)
    }

    /// Abandon a draw the oracle never answered so a new one can be requested
    pub fn cancel_stalled_draw(&mut self, caller: Address, game_id: GameId) -> LottoResult<RequestId> {
        self.ensure_admin(caller)?;
        let now = self.clock.now();
        let game = self.game_ref(game_id)?;

        let request_id = match game.randomness_request {
            Some(request_id) if game.draw_pending() => request_id,
            _ => return Err(LottoError::InvalidDrawCancel(game_id)),
        };
        let request = self
            .requests
            .get(request_id)
            .ok_or(LottoError::UnknownRandomnessRequest(request_id))?;
        if request.game_id != game_id {
            return Err(LottoError::UnknownRandomnessRequest(request_id));
        }

        let deadline = request
            .requested_at
            .saturating_add(self.config.oracle.fulfillment_timeout_secs);
        if now < deadline {
            return Err(LottoError::InvalidDrawCancel(game_id));
        }

        self.requests.mark_cancelled(request_id)?;
        self.game_mut(game_id)?.randomness_request = None;

        tracing::warn!(game_id, request_id, waited_secs = now - request.requested_at, "Cancelled stalled draw");
        self.metrics.record_draw_cancelled();
        self.emit(LottoEvent::DrawCancelled { game_id, request_id });

        Ok(request_id)
    }

    /// Handle for waiting on draws from async code
    pub fn requests(&self) -> RequestRegistry {
        self.requests.clone()
    }
}
