//! JSON-RPC client stack for driving a Filecoin-family node fleet.
//!
//! Covers the full surface the workload driver touches: authenticated
//! JSON-RPC 2.0 transport, chain DTOs, address parsing and formatting,
//! dag-CBOR message encoding with CID computation, and secp256k1 signing in
//! both the native and delegated flavours.

pub mod address;
pub mod cbor;
mod client;
mod dto;
mod error;
pub mod message;
mod pool;
pub mod signing;

pub use address::{Address, AddressError, Protocol};
pub use client::{ComputeStateOutput, FullNodeClient};
pub use dto::{
    ActorState, BlockHeaderJson, CidJson, EthCallRequest, GenesisTipSet, MessageJson,
    MessageReceipt, MsgLookup, PeerAddrInfo, SignatureJson, SignedMessageJson, TipSet, TipSetKey,
    SIG_TYPE_DELEGATED, SIG_TYPE_SECP256K1,
};
pub use error::RpcClientError;
pub use message::{Message, TokenAmount};
pub use pool::{NodeHandle, NodePool, PoolConfig, PoolError};
