//! Token-layer profile: payment-contract monitoring and lifecycle vectors.
//! Active only when the deployment's environment file is present.

mod lifecycle;
mod monitor;
mod profile;

pub use lifecycle::{
    approve_operator, create_rail, deposit, modify_rail, settle_rail, transfer_token, withdraw,
};
pub use monitor::run_monitor;
pub use profile::PaymentsProfile;

use tracing::warn;

use squall_chain_client::{EthCallRequest, NodeHandle, RpcClientError};

use crate::evm::abi;
use crate::evm::uint256::U256Word;

/// `eth_call` returning the trailing 32-byte word, zero when the result is
/// shorter than a word.
pub(crate) async fn eth_call_word(
    node: &NodeHandle,
    to: &[u8],
    calldata: &[u8],
) -> Result<U256Word, RpcClientError> {
    let raw = node
        .client
        .eth_call(&EthCallRequest::new(to, calldata))
        .await?;
    if raw.len() < 32 {
        return Ok(U256Word::ZERO);
    }
    Ok(U256Word::from_be_slice(&raw[raw.len() - 32..]))
}

/// `eth_call` returning the raw result bytes.
pub(crate) async fn eth_call_raw(
    node: &NodeHandle,
    to: &[u8],
    calldata: &[u8],
) -> Result<Vec<u8>, RpcClientError> {
    node.client.eth_call(&EthCallRequest::new(to, calldata)).await
}

/// Reads the `funds` field of the payment contract's
/// `accounts(token, owner)` view; the 4-tuple's first word.
pub(crate) async fn read_account_funds(
    node: &NodeHandle,
    pay_addr: &[u8],
    token_addr: &[u8],
    owner: &[u8],
) -> U256Word {
    let calldata = abi::calldata(
        abi::selector("accounts(address,address)"),
        &[abi::encode_address(token_addr), abi::encode_address(owner)],
    );
    match eth_call_raw(node, pay_addr, &calldata).await {
        Ok(raw) if raw.len() >= 32 => U256Word::from_be_slice(&raw[..32]),
        Ok(_) => U256Word::ZERO,
        Err(err) => {
            warn!(target: "engine::payments", %err, "accounts() call failed");
            U256Word::ZERO
        }
    }
}
