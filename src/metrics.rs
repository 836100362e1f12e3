//! Engine counters

use crate::common::types::Amount;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

pub struct EngineMetrics {
    start_time: Instant,
    games_created: AtomicU64,
    tickets_sold: AtomicU64,
    draws_requested: AtomicU64,
    draws_fulfilled: AtomicU64,
    draws_cancelled: AtomicU64,
    claims_processed: AtomicU64,
    revenue: RwLock<Amount>,
    prizes_paid: RwLock<Amount>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub games_created: u64,
    pub tickets_sold: u64,
    pub draws_requested: u64,
    pub draws_fulfilled: u64,
    pub draws_cancelled: u64,
    pub claims_processed: u64,
    pub revenue: Amount,
    pub prizes_paid: Amount,
}

fn add_amount(lock: &RwLock<Amount>, amount: Amount) {
    let mut total = lock.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *total = total.saturating_add(amount);
}

fn load_amount(lock: &RwLock<Amount>) -> Amount {
    *lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            games_created: AtomicU64::new(0),
            tickets_sold: AtomicU64::new(0),
            draws_requested: AtomicU64::new(0),
            draws_fulfilled: AtomicU64::new(0),
            draws_cancelled: AtomicU64::new(0),
            claims_processed: AtomicU64::new(0),
            revenue: RwLock::new(0),
            prizes_paid: RwLock::new(0),
        }
    }

    pub fn record_game(&self) {
        self.games_created.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_sale(&self, tickets: u64, revenue: Amount) {
        self.tickets_sold.fetch_add(tickets, Ordering::SeqCst);
        add_amount(&self.revenue, revenue);
    }

    pub fn record_draw_requested(&self) {
        self.draws_requested.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_draw_fulfilled(&self) {
        self.draws_fulfilled.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_draw_cancelled(&self) {
        self.draws_cancelled.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_claims(&self, claims: u64, paid: Amount) {
        self.claims_processed.fetch_add(claims, Ordering::SeqCst);
        add_amount(&self.prizes_paid, paid);
    }

    pub fn total_runtime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            games_created: self.games_created.load(Ordering::SeqCst),
            tickets_sold: self.tickets_sold.load(Ordering::SeqCst),
            draws_requested: self.draws_requested.load(Ordering::SeqCst),
            draws_fulfilled: self.draws_fulfilled.load(Ordering::SeqCst),
            draws_cancelled: self.draws_cancelled.load(Ordering::SeqCst),
            claims_processed: self.claims_processed.load(Ordering::SeqCst),
            revenue: load_amount(&self.revenue),
            prizes_paid: load_amount(&self.prizes_paid),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = EngineMetrics::new();
        metrics.record_game();
        metrics.record_sale(3, 30);
        metrics.record_sale(2, 20);
        metrics.record_claims(2, 15);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.games_created, 1);
        assert_eq!(snapshot.tickets_sold, 5);
        assert_eq!(snapshot.revenue, 50);
        assert_eq!(snapshot.claims_processed, 2);
        assert_eq!(snapshot.prizes_paid, 15);
        assert_eq!(snapshot.draws_requested, 0);
    }
}
