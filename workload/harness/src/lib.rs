//! Shared workload-driver primitives: env-var configuration helpers, the
//! deterministic random source, the weighted action deck, and thin wrappers
//! over the simulator's assertion contract.

mod assertions;
mod deck;
mod env;
mod rng;

pub use assertions::{always, reachable, setup_complete, sometimes};
pub use deck::{Deck, DeckBuilder, DeckError};
pub use env::{env_flag, env_int, env_or_default, env_u64};
pub use rng::DeterministicRng;
