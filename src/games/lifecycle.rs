//! Game lifecycle: creation, ticket sales and admin operations
//!
//! `LottoEngine` owns every game, the engine-side ticket records and the
//! per-game suffix indexes. Funds, ticket ownership, time and randomness are
//! reached through the collaborator traits. Each operation validates fully
//! before mutating anything, and undoes its own effects if a ledger or
//! registry call fails afterwards.

use crate::common::traits::{Clock, RandomnessOracle, TicketRegistry, TokenLedger};
use crate::common::types::{Address, Amount, GameId, TicketId, Timestamp};
use crate::config::EngineConfig;
use crate::errors::{LedgerError, LottoError, LottoResult, RegistryError};
use crate::games::codec::{NumberCodec, SuffixIndex};
use crate::games::pricing::PricingEngine;
use crate::games::randomness::RequestRegistry;
use crate::games::settlement::entitlement;
use crate::games::types::{CostQuote, Game, GameState, GameVariant, LottoEvent, TicketRecord};
use crate::metrics::EngineMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Addresses the engine acts as or trusts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roles {
    /// Account holding prize pools and ticket revenue
    pub engine: Address,
    pub admin: Address,
    /// Only source allowed to deliver randomness
    pub coordinator: Address,
}

/// External services the engine depends on
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn TokenLedger>,
    pub registry: Arc<dyn TicketRegistry>,
    pub clock: Arc<dyn Clock>,
    pub oracle: Arc<dyn RandomnessOracle>,
}

pub struct LottoEngine {
    pub(crate) config: EngineConfig,
    pub(crate) roles: Roles,
    pub(crate) ledger: Arc<dyn TokenLedger>,
    pub(crate) registry: Arc<dyn TicketRegistry>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) oracle: Arc<dyn RandomnessOracle>,
    pricing: PricingEngine,
    /// Current range; each game keeps the value it was created with
    max_valid_range: u16,
    /// Arena indexed by `id - 1`
    pub(crate) games: Vec<Game>,
    /// Parallel to `games`
    pub(crate) suffix_indexes: Vec<SuffixIndex>,
    pub(crate) tickets: HashMap<TicketId, TicketRecord>,
    pub(crate) requests: RequestRegistry,
    /// Full history for tests and local runs; long-lived deployments should
    /// follow `subscribe` instead
    events: Vec<LottoEvent>,
    event_publisher: broadcast::Sender<LottoEvent>,
    pub(crate) metrics: Arc<EngineMetrics>,
}

impl LottoEngine {
    pub fn new(config: EngineConfig, roles: Roles, collaborators: Collaborators) -> LottoResult<Self> {
        config.validate()?;
        let (event_publisher, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tracing::info!(
            variant = %config.game.variant,
            max_valid_range = config.game.max_valid_range,
            engine = %roles.engine,
            "Lotto engine initialised"
        );

        Ok(Self {
            pricing: PricingEngine::new(config.pricing.tiers.clone()),
            max_valid_range: config.game.max_valid_range,
            config,
            roles,
            ledger: collaborators.ledger,
            registry: collaborators.registry,
            clock: collaborators.clock,
            oracle: collaborators.oracle,
            games: Vec::new(),
            suffix_indexes: Vec::new(),
            tickets: HashMap::new(),
            requests: RequestRegistry::new(),
            events: Vec::new(),
            event_publisher,
            metrics: Arc::new(EngineMetrics::new()),
        })
    }

    // ----- internal helpers -----

    pub(crate) fn ensure_admin(&self, caller: Address) -> LottoResult<()> {
        if caller != self.roles.admin {
            return Err(LottoError::InvalidAdmin);
        }
        Ok(())
    }

    pub(crate) fn game_index(&self, game_id: GameId) -> LottoResult<usize> {
        let index = game_id
            .checked_sub(1)
            .map(|i| i as usize)
            .filter(|i| *i < self.games.len())
            .ok_or(LottoError::GameNotFound(game_id))?;
        Ok(index)
    }

    pub(crate) fn game_ref(&self, game_id: GameId) -> LottoResult<&Game> {
        let index = self.game_index(game_id)?;
        Ok(&self.games[index])
    }

    pub(crate) fn game_mut(&mut self, game_id: GameId) -> LottoResult<&mut Game> {
        let index = self.game_index(game_id)?;
        Ok(&mut self.games[index])
    }

    pub(crate) fn emit(&mut self, event: LottoEvent) {
        tracing::info!(event = ?event, "Engine event");
        // No subscribers is fine
        let _ = self.event_publisher.send(event.clone());
        self.events.push(event);
    }

    fn check_distribution(&self, distribution: Option<Vec<u8>>) -> LottoResult<Vec<u8>> {
        let variant = self.config.game.variant;
        let expected = variant.digits_per_ticket();

        let distribution = match (variant, distribution) {
            (GameVariant::Roulette, None) => vec![100],
            (GameVariant::Lottery { .. }, None) => {
                return Err(LottoError::InvalidDistributionLength { expected, actual: 0 })
            }
            (_, Some(distribution)) => distribution,
        };

        if distribution.len() != expected {
            return Err(LottoError::InvalidDistributionLength {
                expected,
                actual: distribution.len(),
            });
        }
        let total: u32 = distribution.iter().map(|pct| *pct as u32).sum();
        if total != 100 {
            return Err(LottoError::InvalidDistributionTotal { total });
        }
        Ok(distribution)
    }

    // ----- operations -----

    /// Open a new round funded from the engine's unreserved balance
    pub fn create_game(
        &mut self,
        caller: Address,
        distribution: Option<Vec<u8>>,
        prize_pool: Amount,
        ticket_cost: Amount,
        open_time: Timestamp,
        close_time: Timestamp,
    ) -> LottoResult<GameId> {
        self.ensure_admin(caller)?;
        let distribution = self.check_distribution(distribution)?;

        if prize_pool == 0 || ticket_cost == 0 {
            return Err(LottoError::InvalidPriceOrCost);
        }

        let now = self.clock.now();
        if open_time >= close_time || close_time <= now {
            return Err(LottoError::InvalidTimestamp { open_time, close_time, now });
        }

        let available = self.unreserved_balance();
        if available < prize_pool {
            return Err(LottoError::InsufficientPrizeFunds { required: prize_pool, available });
        }

        let variant = self.config.game.variant;
        let id = self.games.len() as GameId + 1;
        let game = Game {
            id,
            variant,
            open_time,
            close_time,
            created_at: now,
            ticket_cost,
            prize_pool,
            prize_paid: 0,
            bracket_winner_counts: vec![0; distribution.len()],
            distribution,
            max_valid_range: self.max_valid_range,
            winning_outcome: None,
            randomness_request: None,
            tickets_sold: 0,
            revenue: 0,
        };
        let initial_state = game.state(now);

        self.games.push(game);
        self.suffix_indexes.push(SuffixIndex::new(variant.digits_per_ticket()));
        self.metrics.record_game();

        tracing::info!(game_id = id, %prize_pool, %ticket_cost, open_time, close_time, "Game created");
        self.emit(LottoEvent::GameOpened { game_id: id, initial_state });

        Ok(id)
    }

    pub fn quote_cost(&self, game_id: GameId, quantity: u32) -> LottoResult<Amount> {
        let game = self.game_ref(game_id)?;
        self.pricing.quote_cost(game.ticket_cost, quantity)
    }

    pub fn quote_breakdown(&self, game_id: GameId, quantity: u32) -> LottoResult<CostQuote> {
        let game = self.game_ref(game_id)?;
        self.pricing.quote(game.ticket_cost, quantity)
    }

    /// Sell `quantity` tickets carrying `numbers` (flattened, one run of
    /// digits per ticket) to `buyer`
    pub fn buy_tickets(
        &mut self,
        buyer: Address,
        game_id: GameId,
        quantity: u32,
        numbers: &[u16],
    ) -> LottoResult<Vec<TicketId>> {
        let index = self.game_index(game_id)?;
        let max_batch = self.config.limits.max_batch_size;
        if quantity == 0 || quantity > max_batch {
            return Err(LottoError::InvalidBatchSize { requested: quantity, max: max_batch });
        }

        let now = self.clock.now();
        let game = &self.games[index];
        if game.state(now) != GameState::Open {
            return Err(LottoError::InvalidMintTimestamp(game_id));
        }

        let codec = NumberCodec::new(game.variant, game.max_valid_range);
        let encoded = codec.validate_numbers(numbers, quantity as usize)?;
        let cost = self.pricing.quote_cost(game.ticket_cost, quantity)?;
        let tickets_sold = game
            .tickets_sold
            .checked_add(quantity)
            .ok_or(LottoError::ArithmeticOverflow("tickets sold"))?;
        let revenue = game
            .revenue
            .checked_add(cost)
            .ok_or(LottoError::ArithmeticOverflow("game revenue"))?;

        let engine = self.roles.engine;
        let allowance = self.ledger.allowance(buyer, engine);
        if allowance < cost {
            return Err(LottoError::InvalidMintApproval(LedgerError::InsufficientAllowance {
                allowance,
                requested: cost,
            }));
        }
        let balance = self.ledger.balance_of(buyer);
        if balance < cost {
            return Err(LottoError::InvalidMintApproval(LedgerError::InsufficientBalance {
                balance,
                requested: cost,
            }));
        }

        self.ledger.transfer_from(engine, buyer, engine, cost)?;

        let minted = self.registry.mint_batch(buyer, game_id, &encoded).and_then(|ids| {
            if ids.len() == encoded.len() {
                Ok(ids)
            } else {
                Err(RegistryError::MintFailed(format!(
                    "registry returned {} ids for {} tickets",
                    ids.len(),
                    encoded.len()
                )))
            }
        });
        let ticket_ids = match minted {
            Ok(ids) => ids,
            Err(e) => return Err(self.refund_failed_mint(buyer, game_id, cost, e)),
        };

        for (ticket_id, number) in ticket_ids.iter().zip(encoded.iter()) {
            self.tickets.insert(
                *ticket_id,
                TicketRecord { game_id, number: *number, claimed: false },
            );
            self.suffix_indexes[index].record(*number);
        }

        let game = &mut self.games[index];
        game.tickets_sold = tickets_sold;
        game.revenue = revenue;
        self.metrics.record_sale(quantity as u64, cost);

        tracing::info!(game_id, %buyer, quantity, %cost, "Tickets sold");
        self.emit(LottoEvent::BatchMint {
            buyer,
            game_id,
            ticket_ids: ticket_ids.clone(),
        });

        Ok(ticket_ids)
    }

    fn refund_failed_mint(&self, buyer: Address, game_id: GameId, cost: Amount, mint: RegistryError) -> LottoError {
        tracing::warn!(game_id, %buyer, error = %mint, "Ticket mint failed, refunding payment");
        match self.ledger.transfer(self.roles.engine, buyer, cost) {
            Ok(()) => mint.into(),
            Err(refund) => {
                tracing::error!(game_id, %buyer, %cost, error = %refund, "Refund after failed mint failed");
                LottoError::MintRefundFailed { mint, refund, amount: cost }
            }
        }
    }

    /// Change the number range used by games created from now on
    pub fn update_max_range(&mut self, caller: Address, new_range: u16) -> LottoResult<()> {
        self.ensure_admin(caller)?;
        if new_range == 0 {
            return Err(LottoError::InvalidMaxRange);
        }
        if new_range == self.max_valid_range {
            return Err(LottoError::InvalidSizeUpdateDuplicate(new_range));
        }

        let previous = self.max_valid_range;
        self.max_valid_range = new_range;
        self.emit(LottoEvent::MaxRangeUpdated { previous, current: new_range });
        Ok(())
    }

    /// Send funds not owed to any player to the admin
    pub fn withdraw_residual_funds(&mut self, caller: Address, amount: Amount) -> LottoResult<()> {
        self.ensure_admin(caller)?;
        let available = self.unreserved_balance();
        if amount > available {
            return Err(LottoError::InvalidWithdrawAmount { requested: amount, available });
        }

        self.ledger.transfer(self.roles.engine, caller, amount)?;

        tracing::info!(recipient = %caller, %amount, "Residual funds withdrawn");
        self.emit(LottoEvent::ResidualWithdrawn { recipient: caller, amount });
        Ok(())
    }

    // ----- queries -----

    /// Prize funds still owed: whole pools of undrawn games, unpaid
    /// entitlements of drawn ones
    pub fn outstanding_liabilities(&self) -> Amount {
        self.games
            .iter()
            .map(|game| {
                if game.is_drawn() {
                    entitlement(game).saturating_sub(game.prize_paid)
                } else {
                    game.prize_remaining()
                }
            })
            .fold(0, Amount::saturating_add)
    }

    fn unreserved_balance(&self) -> Amount {
        self.ledger
            .balance_of(self.roles.engine)
            .saturating_sub(self.outstanding_liabilities())
    }

    pub fn game(&self, game_id: GameId) -> LottoResult<&Game> {
        self.game_ref(game_id)
    }

    pub fn game_state(&self, game_id: GameId) -> LottoResult<GameState> {
        let now = self.clock.now();
        self.game_ref(game_id).map(|game| game.state(now))
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    pub fn ticket(&self, ticket_id: TicketId) -> LottoResult<&TicketRecord> {
        self.tickets.get(&ticket_id).ok_or(LottoError::TicketNotFound(ticket_id))
    }

    pub fn user_tickets(&self, game_id: GameId, owner: Address) -> LottoResult<Vec<TicketId>> {
        self.game_ref(game_id)?;
        Ok(self.registry.user_tickets(game_id, owner))
    }

    /// Earliest time tickets of `game_id` can be claimed
    pub fn claimable_from(&self, game_id: GameId) -> LottoResult<Timestamp> {
        let game = self.game_ref(game_id)?;
        Ok(game.close_time.saturating_add(self.config.claims.grace_period_secs))
    }

    pub fn max_valid_range(&self) -> u16 {
        self.max_valid_range
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn roles(&self) -> Roles {
        self.roles
    }

    /// Every event emitted so far, oldest first
    pub fn events(&self) -> &[LottoEvent] {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LottoEvent> {
        self.event_publisher.subscribe()
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::memory::{InMemoryLedger, InMemoryRegistry, ManualClock, QueuedOracle};
    use crate::common::types::tokens;
    use crate::errors::RegistryError;
    use crate::games::codec::EncodedNumber;

    struct Fixture {
        engine: LottoEngine,
        ledger: InMemoryLedger,
        clock: ManualClock,
        roles: Roles,
    }

    fn fixture_with(config: EngineConfig, registry: Arc<dyn TicketRegistry>) -> Fixture {
        let roles = Roles {
            engine: Address::from_label("engine"),
            admin: Address::from_label("admin"),
            coordinator: Address::from_label("coordinator"),
        };
        let ledger = InMemoryLedger::new();
        ledger.mint(roles.engine, tokens(10_000));
        let clock = ManualClock::new(1_000);

        let engine = LottoEngine::new(
            config,
            roles,
            Collaborators {
                ledger: Arc::new(ledger.clone()),
                registry,
                clock: Arc::new(clock.clone()),
                oracle: Arc::new(QueuedOracle::new()),
            },
        )
        .unwrap();

        Fixture { engine, ledger, clock, roles }
    }

    fn fixture() -> Fixture {
        fixture_with(EngineConfig::lottery(), Arc::new(InMemoryRegistry::new()))
    }

    fn fund_buyer(f: &Fixture, buyer: Address) {
        f.ledger.mint(buyer, tokens(1_000));
        f.ledger.approve(buyer, f.roles.engine, tokens(1_000));
    }

    #[test]
    fn test_create_game_assigns_sequential_ids() {
        let mut f = fixture();
        let admin = f.roles.admin;
        let first = f
            .engine
            .create_game(admin, Some(vec![5, 10, 35, 50]), tokens(100), tokens(1), 1_000, 2_000)
            .unwrap();
        let second = f
            .engine
            .create_game(admin, Some(vec![25, 25, 25, 25]), tokens(100), tokens(1), 1_500, 2_000)
            .unwrap();

        assert_eq!((first, second), (1, 2));
        assert_eq!(f.engine.game_state(1).unwrap(), GameState::Open);
        assert_eq!(f.engine.game_state(2).unwrap(), GameState::Pending);
        assert_eq!(
            f.engine.events()[1],
            LottoEvent::GameOpened { game_id: 2, initial_state: GameState::Pending }
        );
    }

    #[test]
    fn test_create_game_validation_order() {
        let mut f = fixture();
        let admin = f.roles.admin;

        assert_eq!(
            f.engine.create_game(Address::from_label("mallory"), None, 1, 1, 1_000, 2_000),
            Err(LottoError::InvalidAdmin)
        );
        assert_eq!(
            f.engine.create_game(admin, None, 1, 1, 1_000, 2_000),
            Err(LottoError::InvalidDistributionLength { expected: 4, actual: 0 })
        );
        assert_eq!(
            f.engine.create_game(admin, Some(vec![50, 50]), 1, 1, 1_000, 2_000),
            Err(LottoError::InvalidDistributionLength { expected: 4, actual: 2 })
        );
        assert_eq!(
            f.engine.create_game(admin, Some(vec![10, 10, 10, 10]), 1, 1, 1_000, 2_000),
            Err(LottoError::InvalidDistributionTotal { total: 40 })
        );
        assert_eq!(
            f.engine.create_game(admin, Some(vec![25; 4]), 0, 1, 1_000, 2_000),
            Err(LottoError::InvalidPriceOrCost)
        );
        assert_eq!(
            f.engine.create_game(admin, Some(vec![25; 4]), 1, 0, 1_000, 2_000),
            Err(LottoError::InvalidPriceOrCost)
        );
        assert_eq!(
            f.engine.create_game(admin, Some(vec![25; 4]), 1, 1, 2_000, 2_000),
            Err(LottoError::InvalidTimestamp { open_time: 2_000, close_time: 2_000, now: 1_000 })
        );
        assert_eq!(
            f.engine.create_game(admin, Some(vec![25; 4]), 1, 1, 500, 1_000),
            Err(LottoError::InvalidTimestamp { open_time: 500, close_time: 1_000, now: 1_000 })
        );
        assert!(f.engine.games().is_empty());
    }

    #[test]
    fn test_create_game_requires_unreserved_funds() {
        let mut f = fixture();
        let admin = f.roles.admin;
        f.engine
            .create_game(admin, Some(vec![25; 4]), tokens(8_000), tokens(1), 1_000, 2_000)
            .unwrap();

        let err = f
            .engine
            .create_game(admin, Some(vec![25; 4]), tokens(3_000), tokens(1), 1_000, 2_000)
            .unwrap_err();
        assert_eq!(
            err,
            LottoError::InsufficientPrizeFunds { required: tokens(3_000), available: tokens(2_000) }
        );
        assert_eq!(f.engine.outstanding_liabilities(), tokens(8_000));
    }

    #[test]
    fn test_roulette_distribution_defaults_to_single_bracket() {
        let mut f = fixture_with(EngineConfig::roulette(), Arc::new(InMemoryRegistry::new()));
        let admin = f.roles.admin;
        let id = f.engine.create_game(admin, None, tokens(60), tokens(1), 1_000, 2_000).unwrap();
        assert_eq!(f.engine.game(id).unwrap().distribution, vec![100]);

        assert_eq!(
            f.engine.create_game(admin, Some(vec![50, 50]), tokens(60), tokens(1), 1_000, 2_000),
            Err(LottoError::InvalidDistributionLength { expected: 1, actual: 2 })
        );
        assert_eq!(
            f.engine.create_game(admin, Some(vec![90]), tokens(60), tokens(1), 1_000, 2_000),
            Err(LottoError::InvalidDistributionTotal { total: 90 })
        );
    }

    #[test]
    fn test_buy_tickets_charges_discounted_price() {
        let mut f = fixture();
        let admin = f.roles.admin;
        let buyer = Address::from_label("buyer");
        fund_buyer(&f, buyer);
        let id = f
            .engine
            .create_game(admin, Some(vec![5, 10, 35, 50]), tokens(100), tokens(2), 1_000, 2_000)
            .unwrap();

        let numbers: Vec<u16> = (0..20u16).flat_map(|i| vec![i, 1, 2, 3]).collect();
        let ids = f.engine.buy_tickets(buyer, id, 20, &numbers).unwrap();

        assert_eq!(ids.len(), 20);
        assert_eq!(f.ledger.balance_of(buyer), tokens(1_000) - tokens(38));
        let game = f.engine.game(id).unwrap();
        assert_eq!(game.tickets_sold, 20);
        assert_eq!(game.revenue, tokens(38));
        assert_eq!(f.engine.ticket(ids[3]).unwrap().number, crate::games::codec::encode(&[3, 1, 2, 3]));
        assert_eq!(f.engine.user_tickets(id, buyer).unwrap(), ids);
        assert_eq!(f.engine.metrics().snapshot().tickets_sold, 20);
    }

    #[test]
    fn test_buy_tickets_rejects_bad_batches() {
        let mut f = fixture();
        let admin = f.roles.admin;
        let buyer = Address::from_label("buyer");
        fund_buyer(&f, buyer);
        let id = f
            .engine
            .create_game(admin, Some(vec![25; 4]), tokens(100), tokens(1), 1_000, 2_000)
            .unwrap();

        assert_eq!(
            f.engine.buy_tickets(buyer, id, 0, &[]),
            Err(LottoError::InvalidBatchSize { requested: 0, max: 200 })
        );
        assert_eq!(
            f.engine.buy_tickets(buyer, id, 201, &[]),
            Err(LottoError::InvalidBatchSize { requested: 201, max: 200 })
        );
        assert_eq!(
            f.engine.buy_tickets(buyer, id, 1, &[1, 2, 3]),
            Err(LottoError::InvalidMintNumbers { expected: 4, actual: 3 })
        );
        assert_eq!(
            f.engine.buy_tickets(buyer, id, 1, &[1, 2, 3, 21]),
            Err(LottoError::InvalidTicketNumberRange { value: 21, max_valid_range: 20 })
        );
        assert_eq!(f.engine.buy_tickets(buyer, 9, 1, &[1, 2, 3, 4]), Err(LottoError::GameNotFound(9)));

        f.clock.set(2_000);
        assert_eq!(
            f.engine.buy_tickets(buyer, id, 1, &[1, 2, 3, 4]),
            Err(LottoError::InvalidMintTimestamp(id))
        );
        assert_eq!(f.ledger.balance_of(buyer), tokens(1_000));
    }

    #[test]
    fn test_buy_tickets_requires_approval() {
        let mut f = fixture();
        let admin = f.roles.admin;
        let buyer = Address::from_label("buyer");
        f.ledger.mint(buyer, tokens(10));
        let id = f
            .engine
            .create_game(admin, Some(vec![25; 4]), tokens(100), tokens(1), 1_000, 2_000)
            .unwrap();

        let err = f.engine.buy_tickets(buyer, id, 1, &[1, 2, 3, 4]).unwrap_err();
        assert_eq!(
            err,
            LottoError::InvalidMintApproval(LedgerError::InsufficientAllowance {
                allowance: 0,
                requested: tokens(1),
            })
        );

        f.ledger.approve(buyer, f.roles.engine, tokens(100));
        let err = f.engine.buy_tickets(buyer, id, 11, &[1; 44]).unwrap_err();
        assert!(matches!(err, LottoError::InvalidMintApproval(LedgerError::InsufficientBalance { .. })));
        assert_eq!(f.engine.game(id).unwrap().tickets_sold, 0);
    }

    struct FailingRegistry;

    impl TicketRegistry for FailingRegistry {
        fn mint_batch(&self, _: Address, _: GameId, _: &[EncodedNumber]) -> Result<Vec<TicketId>, RegistryError> {
            Err(RegistryError::MintFailed("registry offline".to_string()))
        }

        fn owner_of(&self, ticket_id: TicketId) -> Result<Address, RegistryError> {
            Err(RegistryError::UnknownTicket(ticket_id))
        }

        fn user_tickets(&self, _: GameId, _: Address) -> Vec<TicketId> {
            Vec::new()
        }
    }

    #[test]
    fn test_failed_mint_refunds_buyer() {
        let mut f = fixture_with(EngineConfig::lottery(), Arc::new(FailingRegistry));
        let admin = f.roles.admin;
        let buyer = Address::from_label("buyer");
        fund_buyer(&f, buyer);
        let id = f
            .engine
            .create_game(admin, Some(vec![25; 4]), tokens(100), tokens(1), 1_000, 2_000)
            .unwrap();

        let err = f.engine.buy_tickets(buyer, id, 2, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap_err();
        assert_eq!(err, LottoError::Registry(RegistryError::MintFailed("registry offline".to_string())));
        assert_eq!(f.ledger.balance_of(buyer), tokens(1_000));
        assert_eq!(f.engine.game(id).unwrap().tickets_sold, 0);
        assert!(f.engine.tickets.is_empty());
    }

    /// Registry that mints one ticket fewer than asked
    struct ShortRegistry(InMemoryRegistry);

    impl TicketRegistry for ShortRegistry {
        fn mint_batch(&self, owner: Address, game_id: GameId, numbers: &[EncodedNumber]) -> Result<Vec<TicketId>, RegistryError> {
            self.0.mint_batch(owner, game_id, &numbers[1..])
        }

        fn owner_of(&self, ticket_id: TicketId) -> Result<Address, RegistryError> {
            self.0.owner_of(ticket_id)
        }

        fn user_tickets(&self, game_id: GameId, owner: Address) -> Vec<TicketId> {
            self.0.user_tickets(game_id, owner)
        }
    }

    #[test]
    fn test_short_mint_refunds_buyer() {
        let mut f = fixture_with(EngineConfig::lottery(), Arc::new(ShortRegistry(InMemoryRegistry::new())));
        let admin = f.roles.admin;
        let buyer = Address::from_label("buyer");
        fund_buyer(&f, buyer);
        let id = f
            .engine
            .create_game(admin, Some(vec![25; 4]), tokens(100), tokens(1), 1_000, 2_000)
            .unwrap();

        let err = f.engine.buy_tickets(buyer, id, 2, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap_err();
        assert_eq!(
            err,
            LottoError::Registry(RegistryError::MintFailed("registry returned 1 ids for 2 tickets".to_string()))
        );
        assert_eq!(f.ledger.balance_of(buyer), tokens(1_000));
        assert_eq!(f.engine.game(id).unwrap().tickets_sold, 0);
        assert_eq!(f.engine.metrics().snapshot().tickets_sold, 0);
        assert!(f.engine.tickets.is_empty());
    }

    /// Ledger that takes payments but cannot pay out
    struct OneWayLedger(InMemoryLedger);

    impl TokenLedger for OneWayLedger {
        fn transfer_from(&self, spender: Address, from: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
            self.0.transfer_from(spender, from, to, amount)
        }

        fn transfer(&self, _: Address, _: Address, _: Amount) -> Result<(), LedgerError> {
            Err(LedgerError::Unavailable("frozen".to_string()))
        }

        fn balance_of(&self, account: Address) -> Amount {
            self.0.balance_of(account)
        }

        fn allowance(&self, owner: Address, spender: Address) -> Amount {
            self.0.allowance(owner, spender)
        }
    }

    #[test]
    fn test_failed_refund_is_reported_to_buyer() {
        let roles = Roles {
            engine: Address::from_label("engine"),
            admin: Address::from_label("admin"),
            coordinator: Address::from_label("coordinator"),
        };
        let buyer = Address::from_label("buyer");
        let ledger = InMemoryLedger::new();
        ledger.mint(roles.engine, tokens(1_000));
        ledger.mint(buyer, tokens(10));
        ledger.approve(buyer, roles.engine, tokens(10));

        let mut engine = LottoEngine::new(
            EngineConfig::lottery(),
            roles,
            Collaborators {
                ledger: Arc::new(OneWayLedger(ledger.clone())),
                registry: Arc::new(FailingRegistry),
                clock: Arc::new(ManualClock::new(1_000)),
                oracle: Arc::new(QueuedOracle::new()),
            },
        )
        .unwrap();
        let id = engine
            .create_game(roles.admin, Some(vec![25; 4]), tokens(100), tokens(1), 1_000, 2_000)
            .unwrap();

        assert_eq!(
            engine.buy_tickets(buyer, id, 1, &[1, 2, 3, 4]),
            Err(LottoError::MintRefundFailed {
                mint: RegistryError::MintFailed("registry offline".to_string()),
                refund: LedgerError::Unavailable("frozen".to_string()),
                amount: tokens(1),
            })
        );
        assert_eq!(ledger.balance_of(buyer), tokens(9));
    }

    #[test]
    fn test_update_max_range() {
        let mut f = fixture();
        let admin = f.roles.admin;
        let id = f
            .engine
            .create_game(admin, Some(vec![25; 4]), tokens(100), tokens(1), 1_000, 2_000)
            .unwrap();

        assert_eq!(
            f.engine.update_max_range(Address::from_label("mallory"), 30),
            Err(LottoError::InvalidAdmin)
        );
        assert_eq!(f.engine.update_max_range(admin, 0), Err(LottoError::InvalidMaxRange));
        assert_eq!(f.engine.update_max_range(admin, 20), Err(LottoError::InvalidSizeUpdateDuplicate(20)));

        f.engine.update_max_range(admin, 30).unwrap();
        assert_eq!(f.engine.max_valid_range(), 30);
        // Existing game keeps its range
        assert_eq!(f.engine.game(id).unwrap().max_valid_range, 20);
        assert_eq!(
            f.engine.events().last(),
            Some(&LottoEvent::MaxRangeUpdated { previous: 20, current: 30 })
        );
    }

    #[test]
    fn test_withdraw_limited_to_unreserved_funds() {
        let mut f = fixture();
        let admin = f.roles.admin;
        f.engine
            .create_game(admin, Some(vec![25; 4]), tokens(6_000), tokens(1), 1_000, 2_000)
            .unwrap();

        assert_eq!(
            f.engine.withdraw_residual_funds(admin, tokens(4_001)),
            Err(LottoError::InvalidWithdrawAmount { requested: tokens(4_001), available: tokens(4_000) })
        );
        f.engine.withdraw_residual_funds(admin, tokens(4_000)).unwrap();
        assert_eq!(f.ledger.balance_of(admin), tokens(4_000));
        assert_eq!(f.ledger.balance_of(f.roles.engine), tokens(6_000));
    }

    #[test]
    fn test_claimable_from_includes_grace_period() {
        let config = crate::config::ConfigBuilder::default().grace_period_secs(300).build().unwrap();
        let mut f = fixture_with(config, Arc::new(InMemoryRegistry::new()));
        let admin = f.roles.admin;
        let id = f
            .engine
            .create_game(admin, Some(vec![25; 4]), tokens(100), tokens(1), 1_000, 2_000)
            .unwrap();
        assert_eq!(f.engine.claimable_from(id).unwrap(), 2_300);
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let mut f = fixture();
        let mut rx = f.engine.subscribe();
        let admin = f.roles.admin;
        f.engine
            .create_game(admin, Some(vec![25; 4]), tokens(100), tokens(1), 1_000, 2_000)
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event, LottoEvent::GameOpened { game_id: 1, initial_state: GameState::Open });
    }
}
