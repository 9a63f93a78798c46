//! Deck composition under weight overrides. A single test body keeps the
//! environment mutations ordered.

use squall_harness::DeterministicRng;
use squall_stress::vectors::build_deck;

const WEIGHT_VARS: &[&str] = &[
    "STRESS_WEIGHT_TRANSFER",
    "STRESS_WEIGHT_GAS_WAR",
    "STRESS_WEIGHT_HEAVY_COMPUTE",
    "STRESS_WEIGHT_ADVERSARIAL",
    "STRESS_WEIGHT_CHAIN_MONITOR",
    "STRESS_WEIGHT_DEPLOY",
    "STRESS_WEIGHT_CONTRACT_CALL",
    "STRESS_WEIGHT_SELFDESTRUCT",
    "STRESS_WEIGHT_CONTRACT_RACE",
    "STRESS_WEIGHT_GAS_GUZZLER",
    "STRESS_WEIGHT_LOG_BLASTER",
    "STRESS_WEIGHT_MEMORY_BOMB",
    "STRESS_WEIGHT_STORAGE_SPAM",
    "STRESS_WEIGHT_REORG",
    "STRESS_WEIGHT_PAY_MONITOR",
    "STRESS_WEIGHT_PAY_TRANSFER",
    "STRESS_WEIGHT_PAY_DEPOSIT",
    "STRESS_WEIGHT_PAY_APPROVE_OPERATOR",
    "STRESS_WEIGHT_PAY_CREATE_RAIL",
    "STRESS_WEIGHT_PAY_MODIFY_RAIL",
    "STRESS_WEIGHT_PAY_SETTLE_RAIL",
    "STRESS_WEIGHT_PAY_WITHDRAW",
];

fn clear_weights() {
    for var in WEIGHT_VARS {
        std::env::remove_var(var);
    }
}

#[test]
fn deck_composition_tracks_the_weight_variables() {
    clear_weights();

    // Built-in defaults: deploy 2 + contract-call 3 + selfdestruct 1 +
    // contract-race 2.
    let deck = build_deck().expect("default deck");
    assert_eq!(deck.len(), 8);

    // A weight override adds exactly that many copies.
    std::env::set_var("STRESS_WEIGHT_TRANSFER", "10");
    let deck = build_deck().expect("deck with transfers");
    assert_eq!(deck.len(), 18);

    // Zero disables a vector entirely.
    std::env::set_var("STRESS_WEIGHT_DEPLOY", "0");
    let deck = build_deck().expect("deck without deploys");
    assert_eq!(deck.len(), 16);

    // Identical environments draw identical sequences for a seed.
    let first = build_deck().expect("deck");
    let second = build_deck().expect("deck");
    let rng_a = DeterministicRng::seeded(0);
    let rng_b = DeterministicRng::seeded(0);
    for _ in 0..100 {
        assert_eq!(first.draw(&rng_a).name, second.draw(&rng_b).name);
    }

    // Disabling everything is a fatal configuration error.
    std::env::remove_var("STRESS_WEIGHT_TRANSFER");
    std::env::set_var("STRESS_WEIGHT_CONTRACT_CALL", "0");
    std::env::set_var("STRESS_WEIGHT_SELFDESTRUCT", "0");
    std::env::set_var("STRESS_WEIGHT_CONTRACT_RACE", "0");
    assert!(build_deck().is_err());

    clear_weights();
}
