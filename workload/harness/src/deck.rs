use std::collections::BTreeMap;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

use crate::env::env_int;
use crate::rng::DeterministicRng;

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("deck is empty: set at least one weight variable > 0")]
    Empty,
}

/// One runnable entry: a display name plus the action payload.
#[derive(Clone, Debug)]
pub struct DeckEntry<A> {
    pub name: String,
    pub action: A,
}

/// Weighted multiset of actions. A weight of `W` for a row puts `W` copies of
/// the row's entries into the deck, so a uniform draw over the expanded deck
/// respects the configured relative weights exactly.
#[derive(Debug)]
pub struct Deck<A> {
    entries: Vec<DeckEntry<A>>,
    counts: Mutex<BTreeMap<String, u64>>,
}

pub struct DeckBuilder<A> {
    entries: Vec<DeckEntry<A>>,
}

impl<A: Clone> Default for DeckBuilder<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Clone> DeckBuilder<A> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a single action weighted by the given environment variable.
    pub fn action(self, name: &str, env_var: &str, default_weight: i64, action: A) -> Self {
        self.category(env_var, default_weight, vec![(name.to_string(), action)])
    }

    /// Adds a whole category of actions: the weight multiplies every entry.
    pub fn category(
        mut self,
        env_var: &str,
        default_weight: i64,
        entries: Vec<(String, A)>,
    ) -> Self {
        let weight = env_int(env_var, default_weight);
        if weight <= 0 || entries.is_empty() {
            return self;
        }
        info!(
            target: "deck",
            %env_var,
            weight,
            entries = entries.len(),
            "enabled"
        );
        for _ in 0..weight {
            for (name, action) in &entries {
                self.entries.push(DeckEntry {
                    name: name.clone(),
                    action: action.clone(),
                });
            }
        }
        self
    }

    pub fn build(self) -> Result<Deck<A>, DeckError> {
        if self.entries.is_empty() {
            return Err(DeckError::Empty);
        }
        info!(target: "deck", size = self.entries.len(), "deck built");
        Ok(Deck {
            entries: self.entries,
            counts: Mutex::new(BTreeMap::new()),
        })
    }
}

impl<A> Deck<A> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Uniform draw over the expanded multiset; bumps the per-name counter.
    pub fn draw(&self, rng: &DeterministicRng) -> &DeckEntry<A> {
        let entry = &self.entries[rng.next_int(self.entries.len())];
        *self.counts.lock().entry(entry.name.clone()).or_insert(0) += 1;
        entry
    }

    /// Logs per-action draw counts, called at fixed iteration intervals.
    pub fn log_summary(&self, iteration: u64) {
        let counts = self.counts.lock();
        info!(target: "deck", iteration, "=== action summary ===");
        for (name, count) in counts.iter() {
            info!(target: "deck", %name, count, "drawn");
        }
    }

    #[cfg(test)]
    fn count_of(&self, name: &str) -> usize {
        self.entries.iter().filter(|e| e.name == name).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_expand_to_exact_multiplicities() {
        std::env::set_var("SQUALL_TEST_DECK_A", "3");
        std::env::set_var("SQUALL_TEST_DECK_B", "0");
        let deck = DeckBuilder::new()
            .action("alpha", "SQUALL_TEST_DECK_A", 1, 1u8)
            .action("beta", "SQUALL_TEST_DECK_B", 1, 2u8)
            .action("gamma", "SQUALL_TEST_DECK_UNSET", 2, 3u8)
            .build()
            .expect("deck");
        assert_eq!(deck.len(), 5);
        assert_eq!(deck.count_of("alpha"), 3);
        assert_eq!(deck.count_of("beta"), 0);
        assert_eq!(deck.count_of("gamma"), 2);
        std::env::remove_var("SQUALL_TEST_DECK_A");
        std::env::remove_var("SQUALL_TEST_DECK_B");
    }

    #[test]
    fn category_weight_multiplies_all_entries() {
        let deck = DeckBuilder::new()
            .category(
                "SQUALL_TEST_DECK_CAT",
                2,
                vec![("x".to_string(), 0u8), ("y".to_string(), 1u8)],
            )
            .build()
            .expect("deck");
        assert_eq!(deck.len(), 4);
        assert_eq!(deck.count_of("x"), 2);
        assert_eq!(deck.count_of("y"), 2);
    }

    #[test]
    fn empty_deck_is_an_error() {
        let err = DeckBuilder::<u8>::new()
            .action("off", "SQUALL_TEST_DECK_OFF", 0, 0u8)
            .build()
            .unwrap_err();
        assert!(matches!(err, DeckError::Empty));
    }

    #[test]
    fn draws_are_deterministic_for_a_seed() {
        let build = || {
            DeckBuilder::new()
                .action("a", "SQUALL_TEST_DECK_UNSET2", 2, 0u8)
                .action("b", "SQUALL_TEST_DECK_UNSET3", 3, 1u8)
                .build()
                .expect("deck")
        };
        let first = build();
        let second = build();
        let rng_a = DeterministicRng::seeded(9);
        let rng_b = DeterministicRng::seeded(9);
        for _ in 0..64 {
            assert_eq!(first.draw(&rng_a).name, second.draw(&rng_b).name);
        }
    }
}
