//! Local round runner
//!
//! Plays one complete round against the in-memory collaborators: create a
//! game, sell random tickets, draw, then claim every ticket. Useful for
//! eyeballing payouts and the event stream of a configuration.

use clap::Parser;
use lottopool::{
    tokens, Address, Collaborators, ConfigLoader, EngineConfig, GameVariant, InMemoryLedger, InMemoryRegistry,
    LottoEngine, ManualClock, QueuedOracle, RandomWord, RandomnessOracle, Roles, SystemClock, VrfOracle,
};
use lottopool::common::traits::{Clock, TokenLedger};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "local-round")]
#[command(about = "Run one lottery or roulette round against in-memory collaborators", long_about = None)]
struct Args {
    /// TOML configuration file (defaults to the built-in lottery preset)
    #[arg(long)]
    config: Option<String>,

    /// Use the roulette preset when no config file is given
    #[arg(long)]
    roulette: bool,

    /// Number of players
    #[arg(long, default_value = "5")]
    players: u32,

    /// Tickets each player buys
    #[arg(long, default_value = "10")]
    tickets: u32,

    /// Prize pool in whole tokens
    #[arg(long, default_value = "1000")]
    pool: u64,

    /// Ticket cost in whole tokens
    #[arg(long, default_value = "1")]
    cost: u64,

    /// Deliver randomness through the asynchronous request/fulfill path
    #[arg(long)]
    async_oracle: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    lottopool::logging::init_tracing("lottopool=info,local_round=info");

    let config = match (&args.config, args.roulette) {
        (Some(path), _) => ConfigLoader::new().with_path(path).load()?,
        (None, true) => EngineConfig::roulette(),
        (None, false) => ConfigLoader::new().load()?,
    };

    let roles = Roles {
        engine: Address::from_label("engine"),
        admin: Address::from_label("admin"),
        coordinator: Address::from_label("coordinator"),
    };

    let ledger = InMemoryLedger::new();
    let registry = InMemoryRegistry::new();
    let clock = ManualClock::new(SystemClock.now());
    let queued = QueuedOracle::new();
    let oracle: Arc<dyn RandomnessOracle> = if args.async_oracle {
        Arc::new(queued.clone())
    } else {
        Arc::new(VrfOracle::new_random())
    };

    ledger.mint(roles.engine, tokens(args.pool));

    let mut engine = LottoEngine::new(
        config.clone(),
        roles,
        Collaborators {
            ledger: Arc::new(ledger.clone()),
            registry: Arc::new(registry.clone()),
            clock: Arc::new(clock.clone()),
            oracle,
        },
    )?;

    info!("🎲 Starting local {} round", config.game.variant);

    let now = clock.now();
    let distribution = match config.game.variant {
        GameVariant::Lottery { number_size } => Some(even_split(number_size as usize)),
        GameVariant::Roulette => None,
    };
    let game_id = engine.create_game(
        roles.admin,
        distribution,
        tokens(args.pool),
        tokens(args.cost),
        now,
        now + 3_600,
    )?;

    let mut rng = rand::thread_rng();
    let digits = config.game.variant.digits_per_ticket();
    let (low, high) = match config.game.variant {
        GameVariant::Lottery { .. } => (0, config.game.max_valid_range),
        GameVariant::Roulette => (1, config.game.max_valid_range),
    };

    let mut players = Vec::new();
    for index in 0..args.players {
        let player = Address::from_label(&format!("player-{}", index));
        let quote = engine.quote_breakdown(game_id, args.tickets)?;
        ledger.mint(player, quote.total);
        ledger.approve(player, roles.engine, quote.total);

        let numbers: Vec<u16> = (0..args.tickets as usize * digits)
            .map(|_| rng.gen_range(low..=high))
            .collect();
        let ticket_ids = engine.buy_tickets(player, game_id, args.tickets, &numbers)?;
        info!(
            "   player-{} bought {} tickets for {} ({}% off)",
            index,
            ticket_ids.len(),
            quote.total,
            quote.discount_pct
        );
        players.push((player, ticket_ids));
    }

    clock.advance(3_600);
    let salt: u64 = rng.gen();
    let request_id = engine.request_draw(roles.admin, game_id, salt)?;

    if args.async_oracle {
        let waiter = engine.requests();
        let wait = tokio::spawn(async move { waiter.wait_for_outcome(request_id, Duration::from_secs(5)).await });

        let word = RandomWord::new(rng.gen());
        info!("🔔 Coordinator fulfilling request {}", request_id);
        engine.fulfill_randomness(roles.coordinator, request_id, word)?;
        wait.await??;
    }

    let game = engine.game(game_id)?;
    info!(
        "🏁 Winning outcome {:?}, winners per bracket {:?}",
        game.winning_outcome.as_ref().map(|outcome| outcome.digits.clone()),
        game.bracket_winner_counts
    );
    info!("   Payout table: {:?}", engine.payout_table(game_id)?);

    for (index, (player, ticket_ids)) in players.iter().enumerate() {
        let receipt = engine.batch_claim(*player, game_id, ticket_ids)?;
        if receipt.total_paid > 0 {
            info!("💰 player-{} won {}", index, receipt.total_paid);
        }
    }

    let game = engine.game(game_id)?;
    info!(
        "✅ Round complete in {:?}: {} tickets minted, paid {} of {}, engine balance {}, {} events",
        engine.metrics().total_runtime(),
        registry.total_minted(),
        game.prize_paid,
        game.prize_pool,
        ledger.balance_of(roles.engine),
        engine.events().len()
    );
    info!("📊 {}", serde_json::to_string(&engine.metrics().snapshot())?);

    Ok(())
}

/// Percentages summing to 100, remainder on the full-match bracket
fn even_split(brackets: usize) -> Vec<u8> {
    let brackets = brackets.max(1);
    let share = (100 / brackets) as u8;
    let mut split = vec![share; brackets];
    if let Some(last) = split.last_mut() {
        *last += 100 - share * brackets as u8;
    }
    split
}
