//! JSON shapes for the node RPC surface, following the chain's conventions:
//! PascalCase fields, CIDs as `{"/": "…"}`, token amounts as decimal strings,
//! byte fields as base64.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::message::{Message, TokenAmount};

pub const SIG_TYPE_SECP256K1: u64 = 1;
pub const SIG_TYPE_DELEGATED: u64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CidJson {
    #[serde(rename = "/")]
    pub root: String,
}

impl CidJson {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }
}

/// Canonical tipset identity: the set of block CIDs at one height.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TipSetKey(pub Vec<CidJson>);

impl TipSetKey {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable string form used for equality grouping in the audits.
    pub fn to_key_string(&self) -> String {
        let roots: Vec<&str> = self.0.iter().map(|c| c.root.as_str()).collect();
        format!("{{{}}}", roots.join(","))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeaderJson {
    #[serde(rename = "Miner", default)]
    pub miner: Option<String>,
    #[serde(rename = "Parents", default)]
    pub parents: Vec<CidJson>,
    #[serde(rename = "ParentStateRoot")]
    pub parent_state_root: CidJson,
    #[serde(rename = "ParentMessageReceipts", default)]
    pub parent_message_receipts: Option<CidJson>,
    #[serde(rename = "Height")]
    pub height: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TipSet {
    #[serde(rename = "Cids")]
    pub cids: Vec<CidJson>,
    #[serde(rename = "Blocks")]
    pub blocks: Vec<BlockHeaderJson>,
    #[serde(rename = "Height")]
    pub height: i64,
}

impl TipSet {
    pub fn key(&self) -> TipSetKey {
        TipSetKey(self.cids.clone())
    }

    pub fn parents(&self) -> TipSetKey {
        self.blocks
            .first()
            .map(|b| TipSetKey(b.parents.clone()))
            .unwrap_or_default()
    }

    /// Parent-state root shared by every block in the tipset.
    pub fn parent_state(&self) -> Option<&str> {
        self.blocks.first().map(|b| b.parent_state_root.root.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageJson {
    #[serde(rename = "Version")]
    pub version: u64,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Nonce")]
    pub nonce: u64,
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "GasLimit")]
    pub gas_limit: i64,
    #[serde(rename = "GasFeeCap")]
    pub gas_fee_cap: String,
    #[serde(rename = "GasPremium")]
    pub gas_premium: String,
    #[serde(rename = "Method")]
    pub method: u64,
    #[serde(rename = "Params")]
    pub params: Option<String>,
}

impl From<&Message> for MessageJson {
    fn from(msg: &Message) -> Self {
        Self {
            version: msg.version,
            to: msg.to.to_string(),
            from: msg.from.to_string(),
            nonce: msg.nonce,
            value: msg.value.to_string(),
            gas_limit: msg.gas_limit,
            gas_fee_cap: msg.gas_fee_cap.to_string(),
            gas_premium: msg.gas_premium.to_string(),
            method: msg.method,
            params: if msg.params.is_empty() {
                None
            } else {
                Some(BASE64.encode(&msg.params))
            },
        }
    }
}

impl MessageJson {
    /// Parses the gas fields back into native amounts; used after
    /// gas-estimation calls.
    pub fn gas_fee_cap_amount(&self) -> Option<TokenAmount> {
        self.gas_fee_cap.parse().ok().map(TokenAmount)
    }

    pub fn gas_premium_amount(&self) -> Option<TokenAmount> {
        self.gas_premium.parse().ok().map(TokenAmount)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureJson {
    #[serde(rename = "Type")]
    pub sig_type: u64,
    #[serde(rename = "Data")]
    pub data: String,
}

impl SignatureJson {
    pub fn new(sig_type: u64, signature: &[u8]) -> Self {
        Self {
            sig_type,
            data: BASE64.encode(signature),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedMessageJson {
    #[serde(rename = "Message")]
    pub message: MessageJson,
    #[serde(rename = "Signature")]
    pub signature: SignatureJson,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageReceipt {
    #[serde(rename = "ExitCode")]
    pub exit_code: i64,
    #[serde(rename = "Return", default)]
    pub return_data: Option<String>,
    #[serde(rename = "GasUsed", default)]
    pub gas_used: i64,
}

impl MessageReceipt {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Decoded return bytes, empty when the receipt carried none.
    pub fn return_bytes(&self) -> Vec<u8> {
        self.return_data
            .as_deref()
            .and_then(|data| BASE64.decode(data).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MsgLookup {
    #[serde(rename = "Message")]
    pub message: CidJson,
    #[serde(rename = "Receipt")]
    pub receipt: MessageReceipt,
    #[serde(rename = "TipSet")]
    pub tipset: TipSetKey,
    #[serde(rename = "Height")]
    pub height: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActorState {
    #[serde(rename = "Code")]
    pub code: CidJson,
    #[serde(rename = "Head")]
    pub head: CidJson,
    #[serde(rename = "Nonce")]
    pub nonce: u64,
    #[serde(rename = "Balance")]
    pub balance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAddrInfo {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Addrs", default)]
    pub addrs: Vec<String>,
}

/// `EthCall` request body. The eth namespace uses lowercase field names.
#[derive(Debug, Clone, Serialize)]
pub struct EthCallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    pub data: String,
}

impl EthCallRequest {
    pub fn new(to: &[u8], calldata: &[u8]) -> Self {
        Self {
            from: None,
            to: format!("0x{}", hex::encode(to)),
            data: format!("0x{}", hex::encode(calldata)),
        }
    }
}

/// Genesis response shape: only the CID list matters to callers.
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisTipSet {
    #[serde(rename = "Cids")]
    pub cids: Vec<CidJson>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    #[test]
    fn cid_json_uses_slash_key() {
        let cid = CidJson::new("bafy2bzacea");
        let encoded = serde_json::to_string(&cid).unwrap();
        assert_eq!(encoded, r#"{"/":"bafy2bzacea"}"#);
        let decoded: CidJson = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, cid);
    }

    #[test]
    fn tipset_key_string_is_brace_wrapped() {
        let key = TipSetKey(vec![CidJson::new("a"), CidJson::new("b")]);
        assert_eq!(key.to_key_string(), "{a,b}");
        assert_eq!(TipSetKey::empty().to_key_string(), "{}");
    }

    #[test]
    fn message_json_serialises_chain_conventions() {
        let msg = Message {
            version: 0,
            to: Address::new_id(1001),
            from: Address::new_id(1000),
            nonce: 3,
            value: TokenAmount(55),
            gas_limit: 1_000_000,
            gas_fee_cap: TokenAmount(100_000),
            gas_premium: TokenAmount(1_000),
            method: 0,
            params: vec![1, 2, 3],
        };
        let json = MessageJson::from(&msg);
        assert_eq!(json.to, "f01001");
        assert_eq!(json.value, "55");
        assert_eq!(json.params.as_deref(), Some("AQID"));
        assert_eq!(json.gas_fee_cap_amount(), Some(TokenAmount(100_000)));
    }

    #[test]
    fn receipt_return_bytes_decode_base64() {
        let receipt: MessageReceipt = serde_json::from_str(
            r#"{"ExitCode":0,"Return":"gwHWRBIzRFU=","GasUsed":100}"#,
        )
        .unwrap();
        assert!(receipt.is_success());
        assert!(!receipt.return_bytes().is_empty());

        let empty: MessageReceipt =
            serde_json::from_str(r#"{"ExitCode":7,"Return":null,"GasUsed":0}"#).unwrap();
        assert!(!empty.is_success());
        assert!(empty.return_bytes().is_empty());
    }

    #[test]
    fn eth_call_request_hex_encodes() {
        let req = EthCallRequest::new(&[0xab; 20], &[0x18, 0x16, 0x0d, 0xdd]);
        assert_eq!(req.to.len(), 42);
        assert_eq!(req.data, "0x18160ddd");
        let encoded = serde_json::to_value(&req).unwrap();
        assert!(encoded.get("from").is_none());
    }
}
