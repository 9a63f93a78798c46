//! Cross-module round trips: key → address → message → signature → sender.

use squall_chain_client::{
    signing, Address, Message, MessageJson, SignedMessageJson, TokenAmount, SIG_TYPE_SECP256K1,
};

fn wallet_key(fill: u8) -> Vec<u8> {
    let mut key = vec![fill; 32];
    key[0] = 0x01;
    key
}

fn sample_message(from: &Address, nonce: u64) -> Message {
    Message {
        version: 0,
        to: Address::new_id(1001),
        from: from.clone(),
        nonce,
        value: TokenAmount(42),
        gas_limit: 1_000_000,
        gas_fee_cap: TokenAmount(100_000),
        gas_premium: TokenAmount(1_000),
        method: 0,
        params: Vec::new(),
    }
}

#[test]
fn address_survives_format_parse_round_trip() {
    let key = wallet_key(0x61);
    let address = signing::secp256k1_address(&key).expect("address");
    let formatted = address.to_string();
    assert!(formatted.starts_with("f1"));
    assert_eq!(Address::parse(&formatted).expect("parse"), address);
}

#[test]
fn signing_a_message_cid_recovers_the_sender() {
    let key = wallet_key(0x62);
    let sender = signing::secp256k1_address(&key).expect("address");
    let message = sample_message(&sender, 9);

    let signature = signing::sign_secp256k1(&key, &message.cid_bytes()).expect("sign");
    let recovered =
        signing::recover_secp256k1_signer(&message.cid_bytes(), &signature).expect("recover");
    assert_eq!(recovered, sender);
}

#[test]
fn nonce_changes_produce_distinct_cids_and_signatures() {
    let key = wallet_key(0x63);
    let sender = signing::secp256k1_address(&key).expect("address");

    let first = sample_message(&sender, 0);
    let second = sample_message(&sender, 1);
    assert_ne!(first.cid_string(), second.cid_string());

    let sig_first = signing::sign_secp256k1(&key, &first.cid_bytes()).expect("sign");
    let sig_second = signing::sign_secp256k1(&key, &second.cid_bytes()).expect("sign");
    assert_ne!(sig_first[..64], sig_second[..64]);
}

#[test]
fn signed_message_json_round_trips_through_serde() {
    let key = wallet_key(0x64);
    let sender = signing::secp256k1_address(&key).expect("address");
    let message = sample_message(&sender, 3);
    let signature = signing::sign_secp256k1(&key, &message.cid_bytes()).expect("sign");

    let signed = SignedMessageJson {
        message: MessageJson::from(&message),
        signature: squall_chain_client::SignatureJson::new(SIG_TYPE_SECP256K1, &signature),
    };
    let encoded = serde_json::to_string(&signed).expect("encode");
    let decoded: SignedMessageJson = serde_json::from_str(&encoded).expect("decode");
    assert_eq!(decoded.message.from, sender.to_string());
    assert_eq!(decoded.message.nonce, 3);
    assert_eq!(decoded.signature.sig_type, SIG_TYPE_SECP256K1);
    assert_eq!(decoded.signature.data, signed.signature.data);
}

#[test]
fn delegated_address_tracks_the_eth_address() {
    let key = wallet_key(0x65);
    let eth = signing::eth_address(&key).expect("eth address");
    let delegated = signing::delegated_address(&key).expect("delegated");
    let formatted = delegated.to_string();
    assert!(formatted.starts_with("f410"));
    assert_eq!(
        Address::parse(&formatted)
            .expect("parse")
            .delegated_subaddress(),
        Some(&eth[..])
    );
}
