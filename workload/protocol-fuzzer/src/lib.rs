//! Malicious-peer protocol fuzzer for the block-exchange and hello wire
//! protocols. The binary wires these modules into the
//! `discover → pool → deck → loop` shape.

pub mod config;
pub mod context;
pub mod deck;
pub mod discovery;
pub mod exchange_client;
pub mod exchange_server;
pub mod hello;
pub mod host;
pub mod identity;
pub mod wire;
