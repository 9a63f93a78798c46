//! Structural checks over every server-side response mutation: the payloads
//! are deliberately wrong semantically, but each one must still be a
//! complete CBOR document with the claimed envelope, and identical for a
//! fixed seed.

use squall_chain_client::cbor::{Reader, MAJ_ARRAY};
use squall_fuzzer::exchange_client::MAX_REQUEST_LENGTH;
use squall_fuzzer::exchange_server::ServerMutation;
use squall_fuzzer::wire::{build_exchange_request, RawCid};
use squall_harness::DeterministicRng;

/// Reads the response envelope, returning (status, error message, chain
/// length) and consuming every chain element.
fn read_envelope(payload: &[u8]) -> (u64, String, u64) {
    let mut reader = Reader::new(payload);
    assert_eq!(reader.read_array().expect("envelope"), 3);
    let status = reader.read_uint().expect("status");
    let message = reader.read_text().expect("error message").to_string();
    let chain_len = reader.read_array().expect("chain");
    for _ in 0..chain_len {
        reader.skip_value().expect("tipset");
    }
    assert_eq!(reader.remaining(), 0, "trailing bytes after envelope");
    (status, message, chain_len)
}

#[test]
fn every_mutation_is_a_complete_envelope() {
    let rng = DeterministicRng::seeded(11);
    for mutation in ServerMutation::ALL {
        let payload = mutation.build(&rng);
        let (status, _, chain_len) = read_envelope(&payload);
        match mutation {
            ServerMutation::UnknownStatus => assert_eq!(status, 999),
            _ => assert_eq!(status, 0, "{}", mutation.name()),
        }
        match mutation {
            ServerMutation::EmptyChainOk => assert_eq!(chain_len, 0),
            ServerMutation::MoreTipsetsThanRequested => assert_eq!(chain_len, 3),
            _ => assert_eq!(chain_len, 1, "{}", mutation.name()),
        }
    }
}

#[test]
fn mutations_are_deterministic_for_a_seed() {
    for mutation in ServerMutation::ALL {
        let first = mutation.build(&DeterministicRng::seeded(5));
        let second = mutation.build(&DeterministicRng::seeded(5));
        assert_eq!(first, second, "{}", mutation.name());
    }
}

/// Extracts the parents field (field 5) of each block header in the first
/// tipset of a response.
fn block_parents_spans(payload: &[u8]) -> Vec<Vec<u8>> {
    let mut reader = Reader::new(payload);
    assert_eq!(reader.read_array().unwrap(), 3);
    reader.read_uint().unwrap();
    reader.read_text().unwrap();
    assert!(reader.read_array().unwrap() >= 1);
    // First BSTipSet: [blocks, messages].
    assert_eq!(reader.read_array().unwrap(), 2);
    let block_count = reader.read_array().unwrap();

    let mut spans = Vec::new();
    for _ in 0..block_count {
        assert_eq!(reader.read_array().unwrap(), 16);
        for _ in 0..5 {
            reader.skip_value().unwrap();
        }
        let start = reader.position();
        reader.skip_value().unwrap();
        spans.push(payload[start..reader.position()].to_vec());
        for _ in 0..10 {
            reader.skip_value().unwrap();
        }
    }
    spans
}

#[test]
fn multi_block_tipsets_share_parents() {
    let rng = DeterministicRng::seeded(23);
    for mutation in [
        ServerMutation::NilTicketMultiBlock,
        ServerMutation::BothNilTickets,
        ServerMutation::NilElectionProofMultiBlock,
    ] {
        let payload = mutation.build(&rng);
        let spans = block_parents_spans(&payload);
        assert_eq!(spans.len(), 2, "{}", mutation.name());
        assert_eq!(spans[0], spans[1], "{}", mutation.name());
    }
}

#[test]
fn duplicate_blocks_are_byte_identical() {
    let rng = DeterministicRng::seeded(31);
    let payload = ServerMutation::DuplicateBlocks.build(&rng);

    let mut reader = Reader::new(&payload);
    assert_eq!(reader.read_array().unwrap(), 3);
    reader.read_uint().unwrap();
    reader.read_text().unwrap();
    assert_eq!(reader.read_array().unwrap(), 1);
    assert_eq!(reader.read_array().unwrap(), 2);
    assert_eq!(reader.read_array().unwrap(), 2);

    let first_start = reader.position();
    reader.skip_value().unwrap();
    let first_end = reader.position();
    reader.skip_value().unwrap();
    let second_end = reader.position();
    assert_eq!(
        payload[first_start..first_end],
        payload[first_end..second_end]
    );
}

#[test]
fn request_lengths_straddle_the_protocol_boundary() {
    let rng = DeterministicRng::seeded(41);
    let head = [RawCid::random(&rng)];

    for (length, expected) in [
        (MAX_REQUEST_LENGTH, MAX_REQUEST_LENGTH),
        (MAX_REQUEST_LENGTH + 1, MAX_REQUEST_LENGTH + 1),
    ] {
        let request = build_exchange_request(&head, length, 1);
        let mut reader = Reader::new(&request);
        assert_eq!(reader.read_array().unwrap(), 3);
        reader.skip_value().unwrap();
        assert_eq!(reader.read_uint().unwrap(), expected);
        assert_eq!(reader.read_uint().unwrap(), 1);
    }
}

#[test]
fn block_headers_inside_responses_are_sixteen_fields() {
    let rng = DeterministicRng::seeded(53);
    let payload = ServerMutation::AllNilFields.build(&rng);
    let mut reader = Reader::new(&payload);
    assert_eq!(reader.read_array().unwrap(), 3);
    reader.read_uint().unwrap();
    reader.read_text().unwrap();
    assert_eq!(reader.read_array().unwrap(), 1);
    assert_eq!(reader.read_array().unwrap(), 2);
    assert_eq!(reader.read_array().unwrap(), 1);
    let (major, len) = reader.header().unwrap();
    assert_eq!(major, MAJ_ARRAY);
    assert_eq!(len, 16);
}
