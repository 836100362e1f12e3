//! Shared harness for the scenario tests

#![allow(dead_code)]

use lottopool::common::traits::TokenLedger;
use lottopool::games::NumberCodec;
use lottopool::{
    tokens, Address, Amount, Collaborators, EngineConfig, GameId, InMemoryLedger, InMemoryRegistry, LottoEngine,
    ManualClock, QueuedOracle, RandomWord, Roles, TicketId,
};
use lottopool::games::WinningOutcome;
use std::sync::Arc;

pub const START: u64 = 1_700_000_000;
pub const OPEN_FOR: u64 = 3_600;

pub struct Harness {
    pub engine: LottoEngine,
    pub ledger: InMemoryLedger,
    pub registry: InMemoryRegistry,
    pub clock: ManualClock,
    pub oracle: QueuedOracle,
    pub roles: Roles,
    pub config: EngineConfig,
}

impl Harness {
    pub fn new(config: EngineConfig) -> Self {
        let roles = Roles {
            engine: Address::from_label("engine"),
            admin: Address::from_label("admin"),
            coordinator: Address::from_label("coordinator"),
        };
        let ledger = InMemoryLedger::new();
        let registry = InMemoryRegistry::new();
        let clock = ManualClock::new(START);
        let oracle = QueuedOracle::new();
        ledger.mint(roles.engine, tokens(100_000));

        let engine = LottoEngine::new(
            config.clone(),
            roles,
            Collaborators {
                ledger: Arc::new(ledger.clone()),
                registry: Arc::new(registry.clone()),
                clock: Arc::new(clock.clone()),
                oracle: Arc::new(oracle.clone()),
            },
        )
        .expect("engine");

        Self { engine, ledger, registry, clock, oracle, roles, config }
    }

    /// Player holding plenty of approved tokens
    pub fn player(&self, label: &str) -> Address {
        let player = Address::from_label(label);
        self.ledger.mint(player, tokens(10_000));
        self.ledger.approve(player, self.roles.engine, tokens(10_000));
        player
    }

    /// Game open from now until `OPEN_FOR` seconds later
    pub fn open_game(&mut self, distribution: Option<Vec<u8>>, pool: Amount, cost: Amount) -> GameId {
        let now = START.max(self.now());
        self.engine
            .create_game(self.roles.admin, distribution, pool, cost, now, now + OPEN_FOR)
            .expect("create game")
    }

    pub fn now(&self) -> u64 {
        use lottopool::Clock;
        self.clock.now()
    }

    pub fn buy(&mut self, player: Address, game_id: GameId, digits: &[u16]) -> TicketId {
        let ids = self.engine.buy_tickets(player, game_id, 1, digits).expect("buy ticket");
        ids[0]
    }

    /// Outcome the engine will derive for `word` and `salt` on this config
    pub fn predict(&self, word: &RandomWord, salt: u64) -> WinningOutcome {
        NumberCodec::new(self.config.game.variant, self.config.game.max_valid_range).derive_outcome(word, salt)
    }

    /// Close the game, request a draw and fulfill it as the coordinator
    pub fn close_and_draw(&mut self, game_id: GameId, word: RandomWord, salt: u64) -> WinningOutcome {
        self.clock.advance(OPEN_FOR);
        let request_id = self
            .engine
            .request_draw(self.roles.admin, game_id, salt)
            .expect("request draw");
        self.engine
            .fulfill_randomness(self.roles.coordinator, request_id, word)
            .expect("fulfill")
    }

    pub fn balance(&self, account: Address) -> Amount {
        self.ledger.balance_of(account)
    }
}
