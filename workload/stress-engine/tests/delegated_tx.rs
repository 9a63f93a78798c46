//! Delegated-transaction pipeline pieces: deterministic wallet derivation,
//! EIP-1559 encoding, and the signature envelope.

use squall_chain_client::signing;
use squall_stress::evm::abi;
use squall_stress::evm::{Eip1559Tx, ETH_CHAIN_ID, ETH_GAS_LIMIT, ETH_MAX_FEE_PER_GAS};
use squall_stress::keystore::derive_wallet_key;

fn sample_tx(nonce: u64, input: Vec<u8>) -> Eip1559Tx {
    Eip1559Tx {
        chain_id: ETH_CHAIN_ID,
        nonce,
        max_priority_fee_per_gas: 0,
        max_fee_per_gas: ETH_MAX_FEE_PER_GAS,
        gas_limit: ETH_GAS_LIMIT,
        to: [0x42; 20],
        value: 0,
        input,
    }
}

#[test]
fn derived_wallets_are_stable_across_runs() {
    let key_a = derive_wallet_key("genesis-seed-v1", 7);
    let key_b = derive_wallet_key("genesis-seed-v1", 7);
    assert_eq!(key_a, key_b);

    let addr_a = signing::secp256k1_address(&key_a).expect("address");
    let addr_b = signing::secp256k1_address(&key_b).expect("address");
    assert_eq!(addr_a, addr_b);
}

#[test]
fn delegated_signing_fills_the_signature_envelope() {
    let key = derive_wallet_key("genesis-seed-v1", 0);
    let calldata = abi::calldata(
        abi::selector("transfer(address,uint256)"),
        &[abi::encode_address(&[0x11; 20]), abi::encode_u64(5)],
    );
    let tx = sample_tx(3, calldata);

    let signature = signing::sign_delegated(&key, &tx.unsigned_preimage()).expect("sign");
    assert_eq!(signature.len(), 65);
    assert!(signature[64] <= 1);

    let raw = tx.signed_raw(&signature);
    assert_eq!(raw[0], 0x02);
    assert!(raw.len() > tx.unsigned_preimage().len());
}

#[test]
fn preimages_are_deterministic_and_nonce_sensitive() {
    let calldata = abi::calldata(abi::selector("totalSupply()"), &[]);
    assert_eq!(
        sample_tx(0, calldata.clone()).unsigned_preimage(),
        sample_tx(0, calldata.clone()).unsigned_preimage()
    );
    assert_ne!(
        sample_tx(0, calldata.clone()).unsigned_preimage(),
        sample_tx(1, calldata).unsigned_preimage()
    );
}

#[test]
fn wrapped_calldata_goes_through_the_cbor_envelope() {
    let calldata = abi::calldata(abi::selector("destroy()"), &[]);
    let wrapped = abi::wrap_calldata(&calldata);

    let mut reader = squall_chain_client::cbor::Reader::new(&wrapped);
    assert_eq!(reader.read_bytes().expect("byte string"), &calldata[..]);
    assert_eq!(reader.remaining(), 0);
}
