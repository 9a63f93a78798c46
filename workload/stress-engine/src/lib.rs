//! Chain-level stress engine: weighted adversarial load against a node
//! fleet with cross-node consistency audits. The binary wires these
//! modules into the `init → deck → loop` shape.

pub mod config;
pub mod context;
pub mod evm;
pub mod keystore;
pub mod payments;
pub mod pipeline;
pub mod vectors;
