//! Batch pricing with bucketed volume discounts

use crate::common::types::Amount;
use crate::errors::{LottoError, LottoResult};
use crate::games::types::CostQuote;
use serde::{Deserialize, Serialize};

/// Discount applied once a batch reaches `min_quantity` tickets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscountTier {
    pub min_quantity: u32,
    pub discount_pct: u8,
}

/// Tiered price calculator. Tiers are expected in ascending order, which
/// `EngineConfig::validate` enforces.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    tiers: Vec<DiscountTier>,
}

impl PricingEngine {
    pub fn new(tiers: Vec<DiscountTier>) -> Self {
        Self { tiers }
    }

    pub fn tiers(&self) -> &[DiscountTier] {
        &self.tiers
    }

    /// Discount of the highest tier the quantity reaches
    pub fn discount_pct(&self, quantity: u32) -> u8 {
        self.tiers
            .iter()
            .rev()
            .find(|tier| quantity >= tier.min_quantity)
            .map(|tier| tier.discount_pct)
            .unwrap_or(0)
    }

    /// Full price breakdown for `quantity` tickets at `ticket_cost` each
    pub fn quote(&self, ticket_cost: Amount, quantity: u32) -> LottoResult<CostQuote> {
        let discount_pct = self.discount_pct(quantity);

        let gross = ticket_cost
            .checked_mul(quantity as u128)
            .ok_or(LottoError::ArithmeticOverflow("batch cost"))?;
        let total = gross
            .checked_mul((100 - discount_pct) as u128)
            .ok_or(LottoError::ArithmeticOverflow("discounted cost"))?
            / 100;

        tracing::debug!(quantity, discount_pct, %gross, %total, "Quoted ticket batch");

        Ok(CostQuote {
            quantity,
            gross,
            discount: gross - total,
            total,
            discount_pct,
        })
    }

    pub fn quote_cost(&self, ticket_cost: Amount, quantity: u32) -> LottoResult<Amount> {
        self.quote(ticket_cost, quantity).map(|quote| quote.total)
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(crate::config::PricingConfig::default().tiers)
    }
}
