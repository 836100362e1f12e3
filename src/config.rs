//! Configuration management for the lottopool engine
//!
//! Deployment-time parameters: game variant and number range, discount tiers,
//! batch limits, claim grace period and oracle timeout. Loaded from TOML with
//! `LOTTO_*` environment overrides, validated before any engine is built.

use crate::errors::{ConfigurationError, LottoResult};
use crate::games::codec::MAX_NUMBER_SIZE;
use crate::games::pricing::DiscountTier;
use crate::games::types::GameVariant;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Complete engine configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub game: GameConfig,
    pub pricing: PricingConfig,
    pub limits: LimitsConfig,
    pub claims: ClaimsConfig,
    pub oracle: OracleConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    pub variant: GameVariant,
    /// Highest number a ticket may carry; games snapshot it at creation
    pub max_valid_range: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PricingConfig {
    pub tiers: Vec<DiscountTier>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    pub max_batch_size: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClaimsConfig {
    /// Extra delay after close before claims open
    pub grace_period_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OracleConfig {
    /// How long a draw may stay unfulfilled before the admin can cancel it
    pub fulfillment_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::lottery()
    }
}

impl EngineConfig {
    /// 4-digit lottery over 0..=20
    pub fn lottery() -> Self {
        Self {
            game: GameConfig {
                variant: GameVariant::Lottery { number_size: 4 },
                max_valid_range: 20,
            },
            pricing: PricingConfig::default(),
            limits: LimitsConfig::default(),
            claims: ClaimsConfig::default(),
            oracle: OracleConfig::default(),
        }
    }

    /// Six-chamber russian roulette
    pub fn roulette() -> Self {
        Self {
            game: GameConfig {
                variant: GameVariant::Roulette,
                max_valid_range: 6,
            },
            ..Self::lottery()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let GameVariant::Lottery { number_size } = self.game.variant {
            if number_size == 0 || number_size as usize > MAX_NUMBER_SIZE {
                return Err(ConfigurationError::InvalidValue {
                    field: "game.variant.number_size".to_string(),
                    value: number_size.to_string(),
                    reason: format!("Must be between 1 and {}", MAX_NUMBER_SIZE),
                });
            }
        }

        if self.game.max_valid_range == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "game.max_valid_range".to_string(),
                value: "0".to_string(),
                reason: "Max range cannot be 0".to_string(),
            });
        }

        if self.limits.max_batch_size == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "limits.max_batch_size".to_string(),
                value: "0".to_string(),
                reason: "Max batch size cannot be zero".to_string(),
            });
        }

        let mut previous: Option<&DiscountTier> = None;
        for tier in &self.pricing.tiers {
            if tier.discount_pct >= 100 {
                return Err(ConfigurationError::ValidationFailed(format!(
                    "Discount {}% for {} tickets must be below 100",
                    tier.discount_pct, tier.min_quantity
                )));
            }
            if tier.min_quantity == 0 {
                return Err(ConfigurationError::ValidationFailed(
                    "Discount tier threshold cannot be zero".to_string(),
                ));
            }
            if let Some(prev) = previous {
                if tier.min_quantity <= prev.min_quantity || tier.discount_pct <= prev.discount_pct {
                    return Err(ConfigurationError::ValidationFailed(format!(
                        "Discount tiers must be strictly increasing (tier at {} after tier at {})",
                        tier.min_quantity, prev.min_quantity
                    )));
                }
            }
            previous = Some(tier);
        }

        Ok(())
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                DiscountTier { min_quantity: 20, discount_pct: 5 },
                DiscountTier { min_quantity: 50, discount_pct: 10 },
                DiscountTier { min_quantity: 100, discount_pct: 15 },
            ],
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_batch_size: 200 }
    }
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self { grace_period_secs: 0 }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            fulfillment_timeout_secs: 86_400, // 1 day
        }
    }
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> LottoResult<EngineConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => EngineConfig::default(),
        };

        apply_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> LottoResult<EngineConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    /// Save configuration to file
    pub fn save(&self, config: &EngineConfig, path: &str) -> LottoResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: String, reason: &str) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: key.to_string(),
        value,
        reason: reason.to_string(),
    })
}

/// Apply `LOTTO_*` overrides fetched through `lookup`
pub fn apply_overrides<F>(config: &mut EngineConfig, lookup: F) -> Result<(), ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("LOTTO_MAX_VALID_RANGE") {
        config.game.max_valid_range = parse_override("LOTTO_MAX_VALID_RANGE", value, "Invalid range")?;
    }
    if let Some(value) = lookup("LOTTO_MAX_BATCH_SIZE") {
        config.limits.max_batch_size = parse_override("LOTTO_MAX_BATCH_SIZE", value, "Invalid batch size")?;
    }
    if let Some(value) = lookup("LOTTO_CLAIM_GRACE_SECS") {
        config.claims.grace_period_secs = parse_override("LOTTO_CLAIM_GRACE_SECS", value, "Invalid duration")?;
    }
    if let Some(value) = lookup("LOTTO_FULFILLMENT_TIMEOUT_SECS") {
        config.oracle.fulfillment_timeout_secs =
            parse_override("LOTTO_FULFILLMENT_TIMEOUT_SECS", value, "Invalid duration")?;
    }
    Ok(())
}

/// Builder pattern for creating configurations
pub struct ConfigBuilder {
    config: EngineConfig,
}

impl ConfigBuilder {
    pub fn new(base: EngineConfig) -> Self {
        Self { config: base }
    }

    pub fn variant(mut self, variant: GameVariant) -> Self {
        self.config.game.variant = variant;
        self
    }

    pub fn max_valid_range(mut self, range: u16) -> Self {
        self.config.game.max_valid_range = range;
        self
    }

    pub fn tiers(mut self, tiers: Vec<DiscountTier>) -> Self {
        self.config.pricing.tiers = tiers;
        self
    }

    pub fn max_batch_size(mut self, size: u32) -> Self {
        self.config.limits.max_batch_size = size;
        self
    }

    pub fn grace_period_secs(mut self, secs: u64) -> Self {
        self.config.claims.grace_period_secs = secs;
        self
    }

    pub fn fulfillment_timeout_secs(mut self, secs: u64) -> Self {
        self.config.oracle.fulfillment_timeout_secs = secs;
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<EngineConfig, ConfigurationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
