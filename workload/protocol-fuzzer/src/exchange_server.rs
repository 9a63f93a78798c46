//! Block-exchange server attacks. The fuzzer plays a malicious peer the
//! victim chooses to fetch from:
//!
//! 1. a fresh identity (the hello handshake requires an unseen peer),
//! 2. a malicious exchange handler serving a mutated response,
//! 3. a minimal hello responder to keep the handshake happy,
//! 4. a trigger hello claiming a far heavier chain at an implausible
//!    height, after which the victim opens an exchange stream back to us.
//!
//! Omit any one of the four and the malicious handler never fires.

use std::sync::Arc;
use std::time::Duration;

use futures::{AsyncReadExt, AsyncWriteExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

use squall_chain_client::cbor;
use squall_harness::DeterministicRng;

use crate::context::FuzzerContext;
use crate::discovery::TargetNode;
use crate::host::{EXCHANGE_PROTOCOL, HELLO_PROTOCOL};
use crate::wire::{
    build_bs_tipset, build_block_header, build_hello_message, build_latency_message,
    build_response, empty_compacted_messages, mismatched_includes_compacted_messages,
    multi_block_compacted_messages, nil_bls_compacted_messages, nil_secpk_compacted_messages,
    oob_bls_compacted_messages, oob_secpk_compacted_messages, zero_signature_compacted_messages,
    BlockHeaderOpts, RawCid, SharedBlockCids, MINER_F01000, MINER_F01001,
};

/// Claimed chain height in the trigger hello.
const TRIGGER_HEIGHT: u64 = 100_000;
/// Claimed chain weight in the trigger hello.
const TRIGGER_WEIGHT: u64 = 999_999_999;
/// How long to wait for the victim to fetch from us.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(15);
const REQUEST_READ_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMutation {
    NilTicket,
    NilElectionProof,
    NilBlsAggregate,
    NilBlockSig,
    NilBeaconEntries,
    EmptyBeaconEntries,
    NilBlockInArray,
    NilBlsMessage,
    NilSecpkMessage,
    NilSecpkSignature,
    OobBlsIndex,
    OobSecpkIndex,
    NilCompactedMessages,
    EmptyChainOk,
    DuplicateBlocks,
    UnknownStatus,
    MismatchedIncludes,
    MoreTipsetsThanRequested,
    NilParents,
    EmptyParents,
    AllNilFields,
    NilTicketMultiBlock,
    BothNilTickets,
    NilElectionProofMultiBlock,
}

impl ServerMutation {
    pub const ALL: [ServerMutation; 24] = [
        ServerMutation::NilTicket,
        ServerMutation::NilElectionProof,
        ServerMutation::NilBlsAggregate,
        ServerMutation::NilBlockSig,
        ServerMutation::NilBeaconEntries,
        ServerMutation::EmptyBeaconEntries,
        ServerMutation::NilBlockInArray,
        ServerMutation::NilBlsMessage,
        ServerMutation::NilSecpkMessage,
        ServerMutation::NilSecpkSignature,
        ServerMutation::OobBlsIndex,
        ServerMutation::OobSecpkIndex,
        ServerMutation::NilCompactedMessages,
        ServerMutation::EmptyChainOk,
        ServerMutation::DuplicateBlocks,
        ServerMutation::UnknownStatus,
        ServerMutation::MismatchedIncludes,
        ServerMutation::MoreTipsetsThanRequested,
        ServerMutation::NilParents,
        ServerMutation::EmptyParents,
        ServerMutation::AllNilFields,
        ServerMutation::NilTicketMultiBlock,
        ServerMutation::BothNilTickets,
        ServerMutation::NilElectionProofMultiBlock,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ServerMutation::NilTicket => "srv-nil-ticket",
            ServerMutation::NilElectionProof => "srv-nil-election-proof",
            ServerMutation::NilBlsAggregate => "srv-nil-bls-aggregate",
            ServerMutation::NilBlockSig => "srv-nil-block-sig",
            ServerMutation::NilBeaconEntries => "srv-nil-beacon-entries",
            ServerMutation::EmptyBeaconEntries => "srv-empty-beacon-entries",
            ServerMutation::NilBlockInArray => "srv-nil-block-in-array",
            ServerMutation::NilBlsMessage => "srv-nil-bls-message",
            ServerMutation::NilSecpkMessage => "srv-nil-secpk-message",
            ServerMutation::NilSecpkSignature => "srv-nil-secpk-signature",
            ServerMutation::OobBlsIndex => "srv-oob-bls-index",
            ServerMutation::OobSecpkIndex => "srv-oob-secpk-index",
            ServerMutation::NilCompactedMessages => "srv-nil-compacted-msgs",
            ServerMutation::EmptyChainOk => "srv-empty-chain-ok",
            ServerMutation::DuplicateBlocks => "srv-duplicate-blocks",
            ServerMutation::UnknownStatus => "srv-unknown-status",
            ServerMutation::MismatchedIncludes => "srv-mismatched-includes",
            ServerMutation::MoreTipsetsThanRequested => "srv-more-tipsets-than-req",
            ServerMutation::NilParents => "srv-nil-parents",
            ServerMutation::EmptyParents => "srv-empty-parents",
            ServerMutation::AllNilFields => "srv-all-nil-fields",
            ServerMutation::NilTicketMultiBlock => "srv-nil-ticket-multiblock",
            ServerMutation::BothNilTickets => "srv-both-nil-tickets",
            ServerMutation::NilElectionProofMultiBlock => "srv-nil-electionproof-multiblock",
        }
    }

    /// Full response bytes for this mutation.
    pub fn build(self, rng: &DeterministicRng) -> Vec<u8> {
        let valid_block = || build_block_header(rng, &BlockHeaderOpts::default());
        let single = |block: Vec<u8>| {
            ok_response(&[build_bs_tipset(&[block], &empty_compacted_messages())])
        };
        let poisoned = |opts: BlockHeaderOpts<'_>| single(build_block_header(rng, &opts));

        match self {
            ServerMutation::NilTicket => poisoned(BlockHeaderOpts {
                nil_ticket: true,
                ..Default::default()
            }),
            ServerMutation::NilElectionProof => poisoned(BlockHeaderOpts {
                nil_election_proof: true,
                ..Default::default()
            }),
            ServerMutation::NilBlsAggregate => poisoned(BlockHeaderOpts {
                nil_bls_aggregate: true,
                ..Default::default()
            }),
            ServerMutation::NilBlockSig => poisoned(BlockHeaderOpts {
                nil_block_sig: true,
                ..Default::default()
            }),
            ServerMutation::NilBeaconEntries => poisoned(BlockHeaderOpts {
                nil_beacon_entries: true,
                ..Default::default()
            }),
            // The default header already carries an empty beacon array.
            ServerMutation::EmptyBeaconEntries => single(valid_block()),
            ServerMutation::NilBlockInArray => {
                ok_response(&[build_bs_tipset(&[cbor::null()], &empty_compacted_messages())])
            }
            ServerMutation::NilBlsMessage => {
                ok_response(&[build_bs_tipset(&[valid_block()], &nil_bls_compacted_messages())])
            }
            ServerMutation::NilSecpkMessage => {
                ok_response(&[build_bs_tipset(&[valid_block()], &nil_secpk_compacted_messages())])
            }
            ServerMutation::NilSecpkSignature => ok_response(&[build_bs_tipset(
                &[valid_block()],
                &zero_signature_compacted_messages(),
            )]),
            ServerMutation::OobBlsIndex => {
                ok_response(&[build_bs_tipset(&[valid_block()], &oob_bls_compacted_messages())])
            }
            ServerMutation::OobSecpkIndex => {
                ok_response(&[build_bs_tipset(&[valid_block()], &oob_secpk_compacted_messages())])
            }
            ServerMutation::NilCompactedMessages => {
                ok_response(&[build_bs_tipset(&[valid_block()], &cbor::null())])
            }
            ServerMutation::EmptyChainOk => ok_response(&[]),
            ServerMutation::DuplicateBlocks => {
                let block = valid_block();
                ok_response(&[build_bs_tipset(
                    &[block.clone(), block],
                    &empty_compacted_messages(),
                )])
            }
            ServerMutation::UnknownStatus => build_response(
                999,
                "unknown error",
                &[build_bs_tipset(&[valid_block()], &empty_compacted_messages())],
            ),
            ServerMutation::MismatchedIncludes => ok_response(&[build_bs_tipset(
                &[valid_block()],
                &mismatched_includes_compacted_messages(),
            )]),
            ServerMutation::MoreTipsetsThanRequested => {
                let tipset =
                    || build_bs_tipset(&[valid_block()], &empty_compacted_messages());
                ok_response(&[tipset(), tipset(), tipset()])
            }
            ServerMutation::NilParents => poisoned(BlockHeaderOpts {
                nil_parents: true,
                ..Default::default()
            }),
            ServerMutation::EmptyParents => poisoned(BlockHeaderOpts {
                empty_parents: true,
                ..Default::default()
            }),
            ServerMutation::AllNilFields => poisoned(BlockHeaderOpts {
                all_nil: true,
                ..Default::default()
            }),
            // Multi-block tipsets: the receiver sorts blocks only when a
            // tipset holds two or more, so the blocks must share parents
            // and height to reach that path.
            ServerMutation::NilTicketMultiBlock => {
                let shared = SharedBlockCids::random(rng);
                let block_a = build_block_header(
                    rng,
                    &BlockHeaderOpts {
                        shared: Some(&shared),
                        miner: Some(MINER_F01000.to_vec()),
                        ..Default::default()
                    },
                );
                let block_b = build_block_header(
                    rng,
                    &BlockHeaderOpts {
                        nil_ticket: true,
                        shared: Some(&shared),
                        miner: Some(MINER_F01001.to_vec()),
                        ..Default::default()
                    },
                );
                ok_response(&[build_bs_tipset(
                    &[block_a, block_b],
                    &multi_block_compacted_messages(),
                )])
            }
            ServerMutation::BothNilTickets => {
                let shared = SharedBlockCids::random(rng);
                let block_a = build_block_header(
                    rng,
                    &BlockHeaderOpts {
                        nil_ticket: true,
                        shared: Some(&shared),
                        miner: Some(MINER_F01000.to_vec()),
                        ..Default::default()
                    },
                );
                let block_b = build_block_header(
                    rng,
                    &BlockHeaderOpts {
                        nil_ticket: true,
                        shared: Some(&shared),
                        miner: Some(MINER_F01001.to_vec()),
                        ..Default::default()
                    },
                );
                ok_response(&[build_bs_tipset(
                    &[block_a, block_b],
                    &multi_block_compacted_messages(),
                )])
            }
            ServerMutation::NilElectionProofMultiBlock => {
                let shared = SharedBlockCids::random(rng);
                let block_a = build_block_header(
                    rng,
                    &BlockHeaderOpts {
                        shared: Some(&shared),
                        miner: Some(MINER_F01000.to_vec()),
                        ..Default::default()
                    },
                );
                let block_b = build_block_header(
                    rng,
                    &BlockHeaderOpts {
                        nil_election_proof: true,
                        shared: Some(&shared),
                        miner: Some(MINER_F01001.to_vec()),
                        ..Default::default()
                    },
                );
                ok_response(&[build_bs_tipset(
                    &[block_a, block_b],
                    &multi_block_compacted_messages(),
                )])
            }
        }
    }
}

fn ok_response(chain: &[Vec<u8>]) -> Vec<u8> {
    build_response(0, "", chain)
}

/// Runs one server-side attack end to end.
pub async fn run_server_attack(ctx: &FuzzerContext, mutation: ServerMutation) {
    let host = match ctx.pool.get_fresh() {
        Ok(host) => Arc::new(host),
        Err(err) => {
            debug!(target: "fuzzer::exchange-server", attack = mutation.name(), %err, "host failed");
            return;
        }
    };
    let target = ctx.pick_target().clone();
    let response = mutation.build(&ctx.rng);

    let (served_tx, mut served_rx) = mpsc::channel::<()>(1);

    // Malicious exchange handler: drain the request, answer with the
    // mutated response.
    let mut exchange_in = match host.accept(EXCHANGE_PROTOCOL) {
        Ok(incoming) => incoming,
        Err(err) => {
            debug!(target: "fuzzer::exchange-server", %err, "exchange accept failed");
            return;
        }
    };
    tokio::spawn(async move {
        while let Some((_, mut stream)) = exchange_in.next().await {
            let mut buf = [0u8; 4096];
            let mut total = 0usize;
            while total < REQUEST_READ_LIMIT {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => total += n,
                }
            }
            let _ = stream.write_all(&response).await;
            let _ = stream.close().await;
            let _ = served_tx.try_send(());
        }
    });

    // Minimal hello responder: the victim says hello on connect and
    // expects a latency reply.
    let mut hello_in = match host.accept(HELLO_PROTOCOL) {
        Ok(incoming) => incoming,
        Err(err) => {
            debug!(target: "fuzzer::exchange-server", %err, "hello accept failed");
            return;
        }
    };
    tokio::spawn(async move {
        while let Some((_, mut stream)) = hello_in.next().await {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(&build_latency_message()).await;
            let _ = stream.close().await;
        }
    });

    send_trigger_hello(ctx, &host, &target).await;

    match timeout(CALLBACK_TIMEOUT, served_rx.recv()).await {
        Ok(Some(())) => {
            debug!(
                target: "fuzzer::exchange-server",
                attack = mutation.name(),
                victim = %target.name,
                "malicious response served"
            );
        }
        _ => {
            debug!(
                target: "fuzzer::exchange-server",
                attack = mutation.name(),
                victim = %target.name,
                "timeout waiting for victim fetch"
            );
        }
    }

    host.close();
}

/// Hello claiming a heavier chain; the victim fetches the fake head from
/// us over the exchange protocol.
async fn send_trigger_hello(ctx: &FuzzerContext, host: &crate::host::FuzzHost, target: &TargetNode) {
    let mut stream = match host
        .open_stream(target.peer_id, target.addr.clone(), HELLO_PROTOCOL)
        .await
    {
        Ok(stream) => stream,
        Err(err) => {
            debug!(target: "fuzzer::exchange-server", %err, "trigger hello open failed");
            return;
        }
    };

    let payload = build_hello_message(
        &[RawCid::random(&ctx.rng)],
        TRIGGER_HEIGHT,
        TRIGGER_WEIGHT,
        &ctx.genesis_cid(),
    );
    let _ = stream.write_all(&payload).await;
    let _ = stream.close().await;

    // Drain the latency reply.
    let mut buf = [0u8; 1024];
    let _ = timeout(Duration::from_secs(5), stream.read(&mut buf)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_twenty_four_mutations_have_distinct_names() {
        let mut names: Vec<&str> = ServerMutation::ALL.iter().map(|m| m.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 24);
    }
}
