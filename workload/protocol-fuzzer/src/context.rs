//! Shared fuzzer state handed to every attack.

use squall_harness::DeterministicRng;

use crate::config::FuzzerConfig;
use crate::discovery::TargetNode;
use crate::identity::IdentityPool;
use crate::wire::RawCid;

pub struct FuzzerContext {
    pub config: FuzzerConfig,
    pub targets: Vec<TargetNode>,
    pub network_name: String,
    pub genesis: Option<RawCid>,
    pub pool: IdentityPool,
    pub rng: DeterministicRng,
}

impl FuzzerContext {
    pub fn pick_target(&self) -> &TargetNode {
        &self.targets[self.rng.next_int(self.targets.len())]
    }

    /// Discovered genesis CID, or a random stand-in when discovery failed.
    pub fn genesis_cid(&self) -> RawCid {
        self.genesis
            .clone()
            .unwrap_or_else(|| RawCid::random(&self.rng))
    }
}
