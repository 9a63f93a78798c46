//! Hand-crafted wire payloads for the block-exchange and hello protocols.
//!
//! Everything here writes CBOR byte streams directly from the major-type
//! primitives. None of it round-trips through typed constructors: the
//! builders must produce shapes the constructors cannot.
//!
//! Wire shapes:
//!   Response          = [status, error-message, [BSTipSet…]]
//!   BSTipSet          = [[BlockHeader…], CompactedMessages]
//!   CompactedMessages = [bls, blsIncludes, secpk, secpkIncludes]
//!   BlockHeader       = 16-field array
//!   Request           = [[CID…], length, options]
//!   Hello             = [[CID…], height, weight, genesisCID]

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use sha2::{Digest, Sha256};

use squall_chain_client::cbor;
use squall_harness::DeterministicRng;

const DAG_CBOR_CODEC: u8 = 0x71;
const SHA2_256_CODE: u8 = 0x12;
// blake2b-256 multihash code 0xb220, varint encoded.
const BLAKE2B_256_VARINT: [u8; 3] = [0xa0, 0xe4, 0x02];
const CID_TAG: u64 = 42;

/// Raw binary CID (version + codec + multihash).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCid(pub Vec<u8>);

impl RawCid {
    /// Random CIDv1: sha2-256 over random bytes.
    pub fn random(rng: &DeterministicRng) -> Self {
        let digest = Sha256::digest(rng.fill_bytes(32));
        let mut out = Vec::with_capacity(36);
        out.push(0x01);
        out.push(DAG_CBOR_CODEC);
        out.push(SHA2_256_CODE);
        out.push(32);
        out.extend_from_slice(&digest);
        Self(out)
    }

    /// CID of an encoded block header: blake2b-256, matching the chain's
    /// block CID builder.
    pub fn for_block(header_cbor: &[u8]) -> Self {
        let mut hasher = Blake2bVar::new(32).expect("digest size");
        hasher.update(header_cbor);
        let mut digest = [0u8; 32];
        hasher.finalize_variable(&mut digest).expect("digest output");

        let mut out = Vec::with_capacity(40);
        out.push(0x01);
        out.push(DAG_CBOR_CODEC);
        out.extend_from_slice(&BLAKE2B_256_VARINT);
        out.push(32);
        out.extend_from_slice(&digest);
        Self(out)
    }

    /// Parses a multibase base32-lower string (`b…`).
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix('b')?;
        base32::decode(base32::Alphabet::Rfc4648Lower { padding: false }, rest).map(Self)
    }
}

/// CBOR CID: tag 42 over an identity-prefixed byte string.
pub fn cbor_cid(cid: &RawCid) -> Vec<u8> {
    let mut buf = Vec::with_capacity(cid.0.len() + 4);
    cbor::write_header(&mut buf, cbor::MAJ_TAG, CID_TAG);
    let mut tagged = Vec::with_capacity(cid.0.len() + 1);
    tagged.push(0x00);
    tagged.extend_from_slice(&cid.0);
    buf.extend_from_slice(&cbor::bytes(&tagged));
    buf
}

pub fn cbor_cid_array(cids: &[RawCid]) -> Vec<u8> {
    let elements: Vec<Vec<u8>> = cids.iter().map(cbor_cid).collect();
    cbor::array(&elements)
}

/// Chain-style BigInt bytes: empty for zero, else a 0x00 sign byte plus
/// trimmed big-endian magnitude.
pub fn big_int_bytes(value: u64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let raw = value.to_be_bytes();
    let start = raw.iter().position(|b| *b != 0).unwrap_or(raw.len() - 1);
    let mut out = Vec::with_capacity(1 + raw.len() - start);
    out.push(0x00);
    out.extend_from_slice(&raw[start..]);
    out
}

// --- requests ---

/// Well-formed exchange request: `[head, length, options]`.
pub fn build_exchange_request(head: &[RawCid], length: u64, options: u64) -> Vec<u8> {
    cbor::array(&[
        cbor_cid_array(head),
        cbor::uint(length),
        cbor::uint(options),
    ])
}

/// Hello message: `[heaviest-tipset, height, weight, genesis]`.
pub fn build_hello_message(
    tipset: &[RawCid],
    height: u64,
    weight: u64,
    genesis: &RawCid,
) -> Vec<u8> {
    cbor::array(&[
        cbor_cid_array(tipset),
        cbor::uint(height),
        cbor::bytes(&big_int_bytes(weight)),
        cbor_cid(genesis),
    ])
}

/// Hello latency reply: `[t-arrival, t-sent]`.
pub fn build_latency_message() -> Vec<u8> {
    cbor::array(&[cbor::int(0), cbor::int(0)])
}

// --- responses ---

/// Response envelope over pre-serialised BSTipSet elements.
pub fn build_response(status: u64, error_message: &str, chain: &[Vec<u8>]) -> Vec<u8> {
    let mut chain_array = Vec::new();
    cbor::write_header(&mut chain_array, cbor::MAJ_ARRAY, chain.len() as u64);
    for tipset in chain {
        chain_array.extend_from_slice(tipset);
    }
    cbor::array(&[cbor::uint(status), cbor::text(error_message), chain_array])
}

/// BSTipSet over pre-serialised block headers and messages.
pub fn build_bs_tipset(blocks: &[Vec<u8>], messages: &[u8]) -> Vec<u8> {
    let mut blocks_array = Vec::new();
    cbor::write_header(&mut blocks_array, cbor::MAJ_ARRAY, blocks.len() as u64);
    for block in blocks {
        blocks_array.extend_from_slice(block);
    }
    let mut out = Vec::new();
    cbor::write_header(&mut out, cbor::MAJ_ARRAY, 2);
    out.extend_from_slice(&blocks_array);
    out.extend_from_slice(messages);
    out
}

// --- compacted messages ---

/// No messages, include lists shaped for a single-block tipset.
pub fn empty_compacted_messages() -> Vec<u8> {
    cbor::array(&[
        cbor::array(&[]),
        cbor::array(&[cbor::array(&[])]),
        cbor::array(&[]),
        cbor::array(&[cbor::array(&[])]),
    ])
}

/// Include lists shaped for a two-block tipset.
pub fn multi_block_compacted_messages() -> Vec<u8> {
    cbor::array(&[
        cbor::array(&[]),
        cbor::array(&[cbor::array(&[]), cbor::array(&[])]),
        cbor::array(&[]),
        cbor::array(&[cbor::array(&[]), cbor::array(&[])]),
    ])
}

/// A null in the bls slot with an include referencing it.
pub fn nil_bls_compacted_messages() -> Vec<u8> {
    cbor::array(&[
        cbor::array(&[cbor::null()]),
        cbor::array(&[cbor::array(&[cbor::uint(0)])]),
        cbor::array(&[]),
        cbor::array(&[cbor::array(&[])]),
    ])
}

/// A null in the secpk slot with an include referencing it.
pub fn nil_secpk_compacted_messages() -> Vec<u8> {
    cbor::array(&[
        cbor::array(&[]),
        cbor::array(&[cbor::array(&[])]),
        cbor::array(&[cbor::null()]),
        cbor::array(&[cbor::array(&[cbor::uint(0)])]),
    ])
}

/// Out-of-bounds index into an empty bls array.
pub fn oob_bls_compacted_messages() -> Vec<u8> {
    cbor::array(&[
        cbor::array(&[]),
        cbor::array(&[cbor::array(&[cbor::uint(99_999)])]),
        cbor::array(&[]),
        cbor::array(&[cbor::array(&[])]),
    ])
}

/// Out-of-bounds index into an empty secpk array.
pub fn oob_secpk_compacted_messages() -> Vec<u8> {
    cbor::array(&[
        cbor::array(&[]),
        cbor::array(&[cbor::array(&[])]),
        cbor::array(&[]),
        cbor::array(&[cbor::array(&[cbor::uint(99_999)])]),
    ])
}

/// Three include entries against a one-block tipset.
pub fn mismatched_includes_compacted_messages() -> Vec<u8> {
    let triple = cbor::array(&[cbor::array(&[]), cbor::array(&[]), cbor::array(&[])]);
    cbor::array(&[cbor::array(&[]), triple.clone(), cbor::array(&[]), triple])
}

/// A secpk entry whose signature is type 0 with empty data. The message
/// tuple mirrors the chain's 10-field layout with zero addresses.
pub fn zero_signature_compacted_messages() -> Vec<u8> {
    let zero_addr = cbor::bytes(&[0x00, 0x00]);
    let message = cbor::array(&[
        cbor::uint(0),
        zero_addr.clone(),
        zero_addr,
        cbor::uint(0),
        cbor::bytes(&[]),
        cbor::int(1_000_000),
        cbor::bytes(&big_int_bytes(100_000)),
        cbor::bytes(&big_int_bytes(1_000)),
        cbor::uint(0),
        cbor::bytes(&[]),
    ]);
    let zero_sig = cbor::array(&[cbor::uint(0), cbor::bytes(&[])]);
    let signed = cbor::array(&[message, zero_sig]);

    cbor::array(&[
        cbor::array(&[]),
        cbor::array(&[cbor::array(&[])]),
        cbor::array(&[signed]),
        cbor::array(&[cbor::array(&[cbor::uint(0)])]),
    ])
}

// --- block headers ---

/// CIDs shared across the blocks of a multi-block tipset so the receiver
/// treats them as one tipset (same parents, height, state roots) and
/// reaches its sort path.
pub struct SharedBlockCids {
    pub parent: RawCid,
    pub state_root: RawCid,
    pub msg_receipts: RawCid,
    pub messages: RawCid,
}

impl SharedBlockCids {
    pub fn random(rng: &DeterministicRng) -> Self {
        Self {
            parent: RawCid::random(rng),
            state_root: RawCid::random(rng),
            msg_receipts: RawCid::random(rng),
            messages: RawCid::random(rng),
        }
    }
}

/// Field selection for a poisoned block header.
#[derive(Default)]
pub struct BlockHeaderOpts<'a> {
    pub nil_ticket: bool,
    pub nil_election_proof: bool,
    pub nil_bls_aggregate: bool,
    pub nil_block_sig: bool,
    pub nil_beacon_entries: bool,
    pub nil_parents: bool,
    pub empty_parents: bool,
    pub all_nil: bool,
    pub shared: Option<&'a SharedBlockCids>,
    /// Distinct miners give each block in a multi-block tipset a distinct
    /// CID.
    pub miner: Option<Vec<u8>>,
}

/// Miner address payload for `f01000`.
pub const MINER_F01000: [u8; 3] = [0x00, 0xe8, 0x07];
/// Miner address payload for `f01001`.
pub const MINER_F01001: [u8; 3] = [0x00, 0xe9, 0x07];

/// Builds the 16-field block header:
/// `[miner, ticket, election-proof, beacon-entries, winpost, parents,
///   parent-weight, height, parent-state-root, parent-msg-receipts,
///   messages, bls-aggregate, timestamp, block-sig, fork-signaling,
///   parent-base-fee]`.
pub fn build_block_header(rng: &DeterministicRng, opts: &BlockHeaderOpts<'_>) -> Vec<u8> {
    let fallback = RawCid::random(rng);
    let parent_cid = opts.shared.map(|s| s.parent.clone()).unwrap_or_else(|| fallback.clone());

    let miner = cbor::bytes(opts.miner.as_deref().unwrap_or(&MINER_F01000));

    let ticket = if opts.nil_ticket || opts.all_nil {
        cbor::null()
    } else {
        cbor::array(&[cbor::bytes(&rng.fill_bytes(32))])
    };

    let election_proof = if opts.nil_election_proof || opts.all_nil {
        cbor::null()
    } else {
        cbor::array(&[cbor::int(1), cbor::bytes(&rng.fill_bytes(32))])
    };

    let beacon_entries = if opts.nil_beacon_entries || opts.all_nil {
        cbor::null()
    } else {
        cbor::array(&[])
    };

    let win_post_proof = cbor::array(&[]);

    let parents = if opts.nil_parents || opts.all_nil {
        cbor::null()
    } else if opts.empty_parents {
        cbor::array(&[])
    } else {
        cbor_cid_array(std::slice::from_ref(&parent_cid))
    };

    let parent_weight = cbor::bytes(&big_int_bytes(1));
    let height = cbor::uint(1);

    let state_root = opts.shared.map(|s| s.state_root.clone()).unwrap_or_else(|| fallback.clone());
    let msg_receipts = opts
        .shared
        .map(|s| s.msg_receipts.clone())
        .unwrap_or_else(|| fallback.clone());
    let messages = opts.shared.map(|s| s.messages.clone()).unwrap_or(fallback);

    let bls_aggregate = if opts.nil_bls_aggregate || opts.all_nil {
        cbor::null()
    } else {
        // BLS signature type tag is 2.
        cbor::array(&[cbor::uint(2), cbor::bytes(&[])])
    };

    let timestamp = cbor::uint(1_700_000_000);

    let block_sig = if opts.nil_block_sig || opts.all_nil {
        cbor::null()
    } else {
        cbor::array(&[cbor::uint(2), cbor::bytes(&rng.fill_bytes(8))])
    };

    let fork_signaling = cbor::uint(0);
    let parent_base_fee = cbor::bytes(&big_int_bytes(100));

    cbor::array(&[
        miner,
        ticket,
        election_proof,
        beacon_entries,
        win_post_proof,
        parents,
        parent_weight,
        height,
        cbor_cid(&state_root),
        cbor_cid(&msg_receipts),
        cbor_cid(&messages),
        bls_aggregate,
        timestamp,
        block_sig,
        fork_signaling,
        parent_base_fee,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use squall_chain_client::cbor::Reader;

    fn rng() -> DeterministicRng {
        DeterministicRng::seeded(7)
    }

    #[test]
    fn exchange_request_shape_round_trips() {
        let rng = rng();
        let head = vec![RawCid::random(&rng), RawCid::random(&rng)];
        let request = build_exchange_request(&head, 900, 1);

        let mut reader = Reader::new(&request);
        assert_eq!(reader.read_array().unwrap(), 3);
        assert_eq!(reader.read_array().unwrap(), 2);
        for expected in &head {
            let (major, tag) = reader.header().unwrap();
            assert_eq!((major, tag), (cbor::MAJ_TAG, 42));
            let tagged = reader.read_bytes().unwrap();
            assert_eq!(tagged[0], 0x00);
            assert_eq!(&tagged[1..], &expected.0[..]);
        }
        assert_eq!(reader.read_uint().unwrap(), 900);
        assert_eq!(reader.read_uint().unwrap(), 1);
    }

    #[test]
    fn response_envelope_round_trips() {
        let rng = rng();
        let block = build_block_header(&rng, &BlockHeaderOpts::default());
        let tipset = build_bs_tipset(
            &[block],
            &empty_compacted_messages(),
        );
        let response = build_response(0, "", &[tipset]);

        let mut reader = Reader::new(&response);
        assert_eq!(reader.read_array().unwrap(), 3);
        assert_eq!(reader.read_uint().unwrap(), 0);
        assert_eq!(reader.read_text().unwrap(), "");
        assert_eq!(reader.read_array().unwrap(), 1);
        assert_eq!(reader.read_array().unwrap(), 2);
        assert_eq!(reader.read_array().unwrap(), 1);
        // The block header itself is a 16-field array.
        assert_eq!(reader.read_array().unwrap(), 16);
    }

    #[test]
    fn nil_options_place_null_in_the_claimed_fields() {
        let rng = rng();
        let header = build_block_header(
            &rng,
            &BlockHeaderOpts {
                nil_ticket: true,
                ..Default::default()
            },
        );
        let mut reader = Reader::new(&header);
        assert_eq!(reader.read_array().unwrap(), 16);
        let _miner = reader.read_bytes().unwrap();
        // Field 1 is the ticket.
        assert!(reader.peek_null().unwrap());
    }

    #[test]
    fn all_nil_poisons_every_pointer_field() {
        let rng = rng();
        let header = build_block_header(
            &rng,
            &BlockHeaderOpts {
                all_nil: true,
                ..Default::default()
            },
        );
        let mut reader = Reader::new(&header);
        assert_eq!(reader.read_array().unwrap(), 16);
        let _miner = reader.read_bytes().unwrap();
        // Ticket, election proof, beacon entries all null.
        for _ in 0..3 {
            assert!(reader.peek_null().unwrap());
            let _ = reader.header().unwrap();
        }
        // WinPoSt stays an empty array; parents is null again.
        assert_eq!(reader.read_array().unwrap(), 0);
        assert!(reader.peek_null().unwrap());
    }

    #[test]
    fn shared_cids_make_blocks_tipset_compatible() {
        let rng = rng();
        let shared = SharedBlockCids::random(&rng);
        let block_a = build_block_header(
            &rng,
            &BlockHeaderOpts {
                shared: Some(&shared),
                miner: Some(MINER_F01000.to_vec()),
                ..Default::default()
            },
        );
        let block_b = build_block_header(
            &rng,
            &BlockHeaderOpts {
                nil_ticket: true,
                shared: Some(&shared),
                miner: Some(MINER_F01001.to_vec()),
                ..Default::default()
            },
        );
        assert_ne!(block_a, block_b);
        // Both carry the shared parent CID bytes.
        let needle = &shared.parent.0;
        assert!(block_a.windows(needle.len()).any(|w| w == &needle[..]));
        assert!(block_b.windows(needle.len()).any(|w| w == &needle[..]));
    }

    #[test]
    fn hello_message_has_four_fields() {
        let rng = rng();
        let genesis = RawCid::random(&rng);
        let hello = build_hello_message(&[RawCid::random(&rng)], 100_000, 999_999_999, &genesis);
        let mut reader = Reader::new(&hello);
        assert_eq!(reader.read_array().unwrap(), 4);
    }

    #[test]
    fn big_int_bytes_layout() {
        assert!(big_int_bytes(0).is_empty());
        assert_eq!(big_int_bytes(1), vec![0x00, 0x01]);
        assert_eq!(big_int_bytes(100), vec![0x00, 0x64]);
        assert_eq!(big_int_bytes(999_999_999), vec![0x00, 0x3b, 0x9a, 0xc9, 0xff]);
    }

    #[test]
    fn random_cids_are_deterministic_per_seed() {
        let a = RawCid::random(&DeterministicRng::seeded(3));
        let b = RawCid::random(&DeterministicRng::seeded(3));
        let c = RawCid::random(&DeterministicRng::seeded(4));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn multibase_cid_strings_parse() {
        let rng = rng();
        let cid = RawCid::random(&rng);
        let encoded = format!(
            "b{}",
            base32::encode(base32::Alphabet::Rfc4648Lower { padding: false }, &cid.0)
        );
        assert_eq!(RawCid::parse(&encoded), Some(cid));
        assert_eq!(RawCid::parse("no-multibase-prefix"), None);
    }
}
