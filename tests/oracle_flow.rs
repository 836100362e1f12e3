//! Randomness delivery: asynchronous fulfillment, VRF draws, stalled requests

mod common;

use common::{Harness, OPEN_FOR, START};
use lottopool::errors::OracleError;
use lottopool::games::RequestStatus;
use lottopool::{
    tokens, Address, Collaborators, ConfigBuilder, EngineConfig, GameId, GameState, InMemoryLedger,
    InMemoryRegistry, LottoEngine, LottoError, LottoEvent, ManualClock, RandomWord, RandomnessOracle,
    RandomnessReceipt, Roles, VrfOracle,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_waiter_sees_coordinator_fulfillment() {
    let mut h = Harness::new(EngineConfig::lottery());
    let game_id = h.open_game(Some(vec![10, 20, 30, 40]), tokens(100), tokens(1));
    h.clock.advance(OPEN_FOR);

    let request_id = h.engine.request_draw(h.roles.admin, game_id, 5).unwrap();
    let queued = h.oracle.last_request().expect("oracle saw the request");
    assert_eq!((queued.request_id, queued.game_id, queued.seed), (request_id, game_id, 5));

    let requests = h.engine.requests();
    let waiter = tokio::spawn(async move { requests.wait_for_outcome(request_id, Duration::from_secs(5)).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let word = RandomWord::from_u128(0x5EED);
    h.engine.fulfill_randomness(h.roles.coordinator, request_id, word).unwrap();

    let delivered = waiter.await.expect("waiter task").expect("outcome delivered");
    assert_eq!(delivered, word);
    assert_eq!(h.engine.requests().status(request_id), Some(RequestStatus::Fulfilled));
    assert_eq!(h.engine.game_state(game_id).unwrap(), GameState::NumbersDrawn);
}

#[tokio::test]
async fn test_event_stream_follows_round() {
    let mut h = Harness::new(EngineConfig::roulette());
    let mut events = h.engine.subscribe();

    let game_id = h.open_game(None, tokens(60), tokens(1));
    let alice = h.player("alice");
    let ticket = h.buy(alice, game_id, &[3]);
    h.close_and_draw(game_id, RandomWord::from_u128(1), 1);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    assert!(matches!(seen[0], LottoEvent::GameOpened { game_id: 1, .. }));
    assert_eq!(
        seen[1],
        LottoEvent::BatchMint { buyer: alice, game_id, ticket_ids: vec![ticket] }
    );
    assert_eq!(seen[2], LottoEvent::DrawRequested { game_id, request_id: 1 });
    assert!(matches!(seen[3], LottoEvent::WinningOutcomeSet { .. }));
    assert_eq!(seen.len(), h.engine.events().len());
}

fn engine_with(config: EngineConfig, oracle: Arc<dyn RandomnessOracle>) -> (LottoEngine, ManualClock, Roles) {
    let roles = Roles {
        engine: Address::from_label("engine"),
        admin: Address::from_label("admin"),
        coordinator: Address::from_label("coordinator"),
    };
    let ledger = InMemoryLedger::new();
    ledger.mint(roles.engine, tokens(1_000));
    let clock = ManualClock::new(START);

    let engine = LottoEngine::new(
        config,
        roles,
        Collaborators {
            ledger: Arc::new(ledger),
            registry: Arc::new(InMemoryRegistry::new()),
            clock: Arc::new(clock.clone()),
            oracle,
        },
    )
    .unwrap();
    (engine, clock, roles)
}

#[test]
fn test_vrf_oracle_draws_synchronously() {
    let oracle = VrfOracle::new_random();
    let (mut engine, clock, roles) = engine_with(EngineConfig::lottery(), Arc::new(oracle.clone()));
    let game_id = engine
        .create_game(roles.admin, Some(vec![25; 4]), tokens(100), tokens(1), START, START + OPEN_FOR)
        .unwrap();

    clock.advance(OPEN_FOR);
    let request_id = engine.request_draw(roles.admin, game_id, 77).unwrap();

    let game = engine.game(game_id).unwrap();
    let outcome = game.winning_outcome.clone().expect("drawn in the same call");
    assert!(outcome.digits.iter().all(|digit| *digit <= 20));
    assert_eq!(engine.requests().status(request_id), Some(RequestStatus::Fulfilled));

    let proof = oracle.proof(request_id).expect("proof kept");
    assert!(VrfOracle::verify_proof(&proof, &VrfOracle::input_message(game_id, 77)).unwrap());

    // The coordinator cannot overwrite a synchronous draw
    assert_eq!(
        engine.fulfill_randomness(roles.coordinator, request_id, RandomWord::from_u128(1)),
        Err(LottoError::DuplicateFulfillment(request_id))
    );
}

#[tokio::test]
async fn test_stalled_draw_can_be_cancelled_and_retried() {
    let config = ConfigBuilder::new(EngineConfig::lottery())
        .fulfillment_timeout_secs(600)
        .build()
        .unwrap();
    let mut h = Harness::new(config);
    let game_id = h.open_game(Some(vec![25; 4]), tokens(100), tokens(1));
    let admin = h.roles.admin;
    h.clock.advance(OPEN_FOR);

    assert_eq!(h.engine.cancel_stalled_draw(admin, game_id), Err(LottoError::InvalidDrawCancel(game_id)));

    let first = h.engine.request_draw(admin, game_id, 1).unwrap();
    let requests = h.engine.requests();
    let waiter = tokio::spawn(async move { requests.wait_for_outcome(first, Duration::from_secs(5)).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    h.clock.advance(599);
    assert_eq!(h.engine.cancel_stalled_draw(admin, game_id), Err(LottoError::InvalidDrawCancel(game_id)));
    assert_eq!(
        h.engine.cancel_stalled_draw(Address::from_label("mallory"), game_id),
        Err(LottoError::InvalidAdmin)
    );

    h.clock.advance(1);
    assert_eq!(h.engine.cancel_stalled_draw(admin, game_id), Ok(first));
    assert_eq!(
        waiter.await.expect("waiter task"),
        Err(LottoError::Oracle(OracleError::Cancelled(first)))
    );
    assert!(h.engine.events().contains(&LottoEvent::DrawCancelled { game_id, request_id: first }));

    // Late answer to the abandoned request is refused
    assert_eq!(
        h.engine.fulfill_randomness(h.roles.coordinator, first, RandomWord::from_u128(1)),
        Err(LottoError::DuplicateFulfillment(first))
    );

    let second = h.engine.request_draw(admin, game_id, 2).unwrap();
    assert_ne!(second, first);
    h.engine
        .fulfill_randomness(h.roles.coordinator, second, RandomWord::from_u128(2))
        .unwrap();
    assert_eq!(h.engine.cancel_stalled_draw(admin, game_id), Err(LottoError::InvalidDrawCancel(game_id)));
    assert_eq!(h.engine.metrics().snapshot().draws_cancelled, 1);
}

/// Oracle that hands out the same request id every time
struct FixedIdOracle;

impl RandomnessOracle for FixedIdOracle {
    fn request(&self, _: GameId, _: u64) -> Result<RandomnessReceipt, OracleError> {
        Ok(RandomnessReceipt { request_id: 7, immediate: None })
    }
}

#[test]
fn test_reused_request_id_is_rejected() {
    let (mut engine, clock, roles) = engine_with(EngineConfig::lottery(), Arc::new(FixedIdOracle));
    let first = engine
        .create_game(roles.admin, Some(vec![25; 4]), tokens(100), tokens(1), START, START + OPEN_FOR)
        .unwrap();
    let second = engine
        .create_game(roles.admin, Some(vec![25; 4]), tokens(100), tokens(1), START, START + OPEN_FOR)
        .unwrap();
    clock.advance(OPEN_FOR);

    assert_eq!(engine.request_draw(roles.admin, first, 1), Ok(7));
    assert_eq!(
        engine.request_draw(roles.admin, second, 2),
        Err(LottoError::DuplicateRandomnessRequest(7))
    );
    assert_eq!(engine.game(second).unwrap().randomness_request, None);
    assert_eq!(engine.requests().get(7).unwrap().game_id, first);

    // The id still answers the game that first received it
    engine
        .fulfill_randomness(roles.coordinator, 7, RandomWord::from_u128(3))
        .unwrap();
    assert_eq!(engine.game_state(first).unwrap(), GameState::NumbersDrawn);
    assert_eq!(engine.game_state(second).unwrap(), GameState::Closed);
}
