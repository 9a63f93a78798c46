//! Native message submission: conservative gas defaults, local signing over
//! the message CID, mempool push with increment-on-success nonce handling.

use tracing::{debug, warn};

use squall_chain_client::{
    signing, Address, CidJson, Message, MessageJson, NodeHandle, SignatureJson, SignedMessageJson,
    TokenAmount, SIG_TYPE_SECP256K1,
};

use crate::context::EngineContext;

pub const DEFAULT_GAS_LIMIT: i64 = 1_000_000;
pub const DEFAULT_GAS_FEE_CAP: u128 = 100_000;
pub const DEFAULT_GAS_PREMIUM: u128 = 1_000;

pub const METHOD_SEND: u64 = 0;
pub const METHOD_INVOKE_CONTRACT: u64 = 3_844_450_837;
pub const METHOD_CREATE_EXTERNAL: u64 = 4;

/// EVM actor manager singleton.
pub fn eam_address() -> Address {
    Address::new_id(10)
}

/// Skeleton message with the conservative default gas parameters.
pub fn base_message(from: &Address, to: &Address, value: TokenAmount) -> Message {
    Message {
        version: 0,
        to: to.clone(),
        from: from.clone(),
        nonce: 0,
        value,
        gas_limit: DEFAULT_GAS_LIMIT,
        gas_fee_cap: TokenAmount(DEFAULT_GAS_FEE_CAP),
        gas_premium: TokenAmount(DEFAULT_GAS_PREMIUM),
        method: METHOD_SEND,
        params: Vec::new(),
    }
}

/// Signs a message locally. `None` on signing failure (logged).
pub fn sign_message(message: &Message, key: &[u8]) -> Option<SignedMessageJson> {
    let signature = match signing::sign_secp256k1(key, &message.cid_bytes()) {
        Ok(signature) => signature,
        Err(err) => {
            warn!(target: "engine::sign", from = %message.from, %err, "signing failed");
            return None;
        }
    };
    Some(SignedMessageJson {
        message: MessageJson::from(message),
        signature: SignatureJson::new(SIG_TYPE_SECP256K1, &signature),
    })
}

/// Stamps the sender's current nonce onto the message, signs, and pushes.
/// The counter advances only when the push succeeded.
pub async fn push_message(
    ctx: &EngineContext,
    node: &NodeHandle,
    message: &mut Message,
    key: &[u8],
    tag: &str,
) -> Option<CidJson> {
    message.nonce = ctx.current_nonce(&message.from);

    let signed = sign_message(message, key)?;
    match node.client.mpool_push(&signed).await {
        Ok(cid) => {
            ctx.bump_nonce(&message.from);
            debug!(target: "engine::push", tag, nonce = message.nonce, cid = %cid.root, "pushed");
            Some(cid)
        }
        Err(err) => {
            warn!(target: "engine::push", tag, %err, "mempool push failed");
            None
        }
    }
}

/// Short CID prefix for log lines.
pub fn cid_short(cid: &CidJson) -> &str {
    let root = cid.root.as_str();
    &root[..root.len().min(16)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use squall_chain_client::signing::secp256k1_address;

    #[test]
    fn base_message_carries_default_gas() {
        let from = Address::new_id(100);
        let to = Address::new_id(101);
        let msg = base_message(&from, &to, TokenAmount(5));
        assert_eq!(msg.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(msg.gas_fee_cap, TokenAmount(DEFAULT_GAS_FEE_CAP));
        assert_eq!(msg.gas_premium, TokenAmount(DEFAULT_GAS_PREMIUM));
        assert_eq!(msg.method, METHOD_SEND);
    }

    #[test]
    fn sign_message_produces_a_recoverable_secp_signature() {
        let key = [0x42u8; 32];
        let from = secp256k1_address(&key).unwrap();
        let msg = base_message(&from, &Address::new_id(1), TokenAmount(1));
        let signed = sign_message(&msg, &key).expect("signed");
        assert_eq!(signed.signature.sig_type, SIG_TYPE_SECP256K1);

        let recovered =
            signing::recover_secp256k1_signer(&msg.cid_bytes(), &{
                use base64::Engine as _;
                base64::engine::general_purpose::STANDARD
                    .decode(&signed.signature.data)
                    .unwrap()
            })
            .unwrap();
        assert_eq!(recovered, from);
    }

    #[test]
    fn sign_message_rejects_bad_keys() {
        let from = Address::new_id(100);
        let msg = base_message(&from, &Address::new_id(1), TokenAmount(1));
        assert!(sign_message(&msg, &[0u8; 5]).is_none());
    }
}
