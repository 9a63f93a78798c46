//! EVM-side helpers: call-data shaping, delegated EIP-1559 transactions,
//! and the deploy/invoke submission paths.

pub mod abi;
pub mod contracts;
pub mod tx;
pub mod uint256;

use tracing::{debug, warn};

use squall_chain_client::{
    cbor, signing, Address, CidJson, Message, MessageJson, NodeHandle, TokenAmount,
};

use crate::context::EngineContext;
use crate::keystore::Wallet;
use crate::pipeline::{
    base_message, eam_address, push_message, METHOD_CREATE_EXTERNAL, METHOD_INVOKE_CONTRACT,
};

pub use tx::{Eip1559Tx, ETH_CHAIN_ID, ETH_GAS_LIMIT, ETH_MAX_FEE_PER_GAS};

/// Fallback gas parameters for contract-bearing messages when estimation
/// fails.
const FALLBACK_GAS_LIMIT: i64 = 10_000_000_000;
const FALLBACK_GAS_FEE_CAP: u128 = 150_000;
const FALLBACK_GAS_PREMIUM: u128 = 1_000;

/// Asks the node for gas parameters, falling back to fixed literals.
pub async fn estimate_or_fallback(node: &NodeHandle, message: &mut Message) {
    let json = MessageJson::from(&*message);
    match node.client.gas_estimate_message_gas(&json).await {
        Ok(estimated) => {
            message.gas_limit = estimated.gas_limit;
            if let Some(fee_cap) = estimated.gas_fee_cap_amount() {
                message.gas_fee_cap = fee_cap;
            }
            if let Some(premium) = estimated.gas_premium_amount() {
                message.gas_premium = premium;
            }
        }
        Err(err) => {
            debug!(target: "engine::evm", %err, "gas estimation failed, using fallback");
            message.gas_limit = FALLBACK_GAS_LIMIT;
            message.gas_fee_cap = TokenAmount(FALLBACK_GAS_FEE_CAP);
            message.gas_premium = TokenAmount(FALLBACK_GAS_PREMIUM);
        }
    }
}

/// Submits a `create-external` deployment carrying the given bytecode.
pub async fn deploy_contract(
    ctx: &EngineContext,
    node: &NodeHandle,
    wallet: &Wallet,
    bytecode: &[u8],
    tag: &str,
) -> Option<CidJson> {
    let mut message = base_message(&wallet.address, &eam_address(), TokenAmount::zero());
    message.method = METHOD_CREATE_EXTERNAL;
    message.params = cbor::bytes(bytecode);
    estimate_or_fallback(node, &mut message).await;
    push_message(ctx, node, &mut message, &wallet.key, tag).await
}

/// Invokes a deployed contract with pre-wrapped call data.
pub async fn invoke_contract(
    ctx: &EngineContext,
    node: &NodeHandle,
    deployer: &Wallet,
    contract: &Address,
    wrapped_calldata: Vec<u8>,
    tag: &str,
) -> Option<CidJson> {
    let mut message = base_message(&deployer.address, contract, TokenAmount::zero());
    message.method = METHOD_INVOKE_CONTRACT;
    message.params = wrapped_calldata;
    estimate_or_fallback(node, &mut message).await;
    push_message(ctx, node, &mut message, &deployer.key, tag).await
}

/// Signs and submits a delegated EIP-1559 transaction. The per-sender nonce
/// cache is invalidated on a failed push so the next call resyncs.
pub async fn send_eth_tx(
    ctx: &EngineContext,
    node: &NodeHandle,
    private_key: &[u8],
    to: &[u8],
    calldata: Vec<u8>,
    tag: &str,
) -> bool {
    if private_key.len() != 32 || to.len() != 20 {
        warn!(target: "engine::evm", tag, "invalid key or destination length");
        return false;
    }
    let sender = match signing::delegated_address(private_key) {
        Ok(sender) => sender,
        Err(err) => {
            warn!(target: "engine::evm", tag, %err, "sender derivation failed");
            return false;
        }
    };

    let Some(nonce) = ctx.take_eth_nonce(node, &sender).await else {
        return false;
    };

    let mut to_fixed = [0u8; 20];
    to_fixed.copy_from_slice(to);
    let tx = Eip1559Tx {
        chain_id: ETH_CHAIN_ID,
        nonce,
        max_priority_fee_per_gas: 0,
        max_fee_per_gas: ETH_MAX_FEE_PER_GAS,
        gas_limit: ETH_GAS_LIMIT,
        to: to_fixed,
        value: 0,
        input: calldata,
    };

    let signature = match signing::sign_delegated(private_key, &tx.unsigned_preimage()) {
        Ok(signature) => signature,
        Err(err) => {
            warn!(target: "engine::evm", tag, %err, "delegated signing failed");
            return false;
        }
    };

    match node
        .client
        .eth_send_raw_transaction(&tx.signed_raw(&signature))
        .await
    {
        Ok(hash) => {
            debug!(target: "engine::evm", tag, sender = %sender, nonce, %hash, "tx submitted");
            true
        }
        Err(err) => {
            warn!(target: "engine::evm", tag, %err, "raw transaction rejected");
            ctx.invalidate_eth_nonce(&sender);
            false
        }
    }
}
