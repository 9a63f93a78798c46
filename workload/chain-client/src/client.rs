use std::time::Duration;

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dto::{
    ActorState, CidJson, EthCallRequest, GenesisTipSet, MessageJson, MessageReceipt, MsgLookup,
    PeerAddrInfo, SignedMessageJson, TipSet, TipSetKey,
};
use crate::error::RpcClientError;

const JSONRPC_VERSION: &str = "2.0";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(150);

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Output of the state-recompute RPC; only the root is asserted on.
#[derive(Debug, Clone, Deserialize)]
pub struct ComputeStateOutput {
    #[serde(rename = "Root")]
    pub root: CidJson,
}

/// Typed JSON-RPC 2.0 client for one full node.
#[derive(Clone)]
pub struct FullNodeClient {
    inner: Client,
    url: Url,
    bearer: Option<String>,
}

impl FullNodeClient {
    pub fn new(endpoint: &str, bearer: Option<String>) -> Result<Self, RpcClientError> {
        let url = Url::parse(endpoint)
            .map_err(|err| RpcClientError::InvalidEndpoint(format!("{endpoint}: {err}")))?;
        let inner = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self { inner, url, bearer })
    }

    pub fn endpoint(&self) -> &Url {
        &self.url
    }

    /// Issues a raw call. `Ok(None)` means the node answered with a null
    /// result, which is the normal shape for void methods.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<Value>, RpcClientError> {
        let payload = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: 1,
            method: method.to_owned(),
            params,
        };

        let mut request = self.inner.post(self.url.clone()).json(&payload);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RpcClientError::HttpStatus(response.status()));
        }

        let response: JsonRpcResponse = response.json().await?;
        if let Some(error) = response.error {
            return Err(RpcClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.filter(|value| !value.is_null()))
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<R, RpcClientError> {
        let value = self
            .request(method, params)
            .await?
            .ok_or(RpcClientError::EmptyResponse)?;
        Ok(serde_json::from_value(value)?)
    }

    async fn call_void(&self, method: &str, params: Value) -> Result<(), RpcClientError> {
        self.request(method, params).await?;
        Ok(())
    }

    async fn call_optional<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<R>, RpcClientError> {
        match self.request(method, params).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    // --- chain ---

    pub async fn chain_head(&self) -> Result<TipSet, RpcClientError> {
        self.call("Filecoin.ChainHead", json!([])).await
    }

    /// Latest tipset the node reports as final. State-sensitive audits anchor
    /// here rather than on the live head.
    pub async fn chain_get_finalized_tip_set(&self) -> Result<TipSet, RpcClientError> {
        self.call("Filecoin.ChainGetFinalizedTipSet", json!([])).await
    }

    pub async fn chain_get_tip_set(&self, key: &TipSetKey) -> Result<TipSet, RpcClientError> {
        self.call("Filecoin.ChainGetTipSet", json!([key])).await
    }

    pub async fn chain_get_tip_set_by_height(
        &self,
        height: i64,
        anchor: &TipSetKey,
    ) -> Result<TipSet, RpcClientError> {
        self.call("Filecoin.ChainGetTipSetByHeight", json!([height, anchor]))
            .await
    }

    pub async fn chain_get_genesis(&self) -> Result<GenesisTipSet, RpcClientError> {
        self.call("Filecoin.ChainGetGenesis", json!([])).await
    }

    pub async fn chain_get_parent_messages(
        &self,
        block: &CidJson,
    ) -> Result<Vec<Value>, RpcClientError> {
        self.call("Filecoin.ChainGetParentMessages", json!([block]))
            .await
    }

    pub async fn chain_get_parent_receipts(
        &self,
        block: &CidJson,
    ) -> Result<Vec<MessageReceipt>, RpcClientError> {
        self.call("Filecoin.ChainGetParentReceipts", json!([block]))
            .await
    }

    // --- mempool ---

    pub async fn mpool_push(
        &self,
        signed: &SignedMessageJson,
    ) -> Result<CidJson, RpcClientError> {
        self.call("Filecoin.MpoolPush", json!([signed])).await
    }

    pub async fn mpool_get_nonce(&self, address: &str) -> Result<u64, RpcClientError> {
        self.call("Filecoin.MpoolGetNonce", json!([address])).await
    }

    pub async fn gas_estimate_message_gas(
        &self,
        message: &MessageJson,
    ) -> Result<MessageJson, RpcClientError> {
        self.call(
            "Filecoin.GasEstimateMessageGas",
            json!([message, null, TipSetKey::empty()]),
        )
        .await
    }

    // --- state ---

    pub async fn state_compute(
        &self,
        height: i64,
        anchor: &TipSetKey,
    ) -> Result<ComputeStateOutput, RpcClientError> {
        self.call("Filecoin.StateCompute", json!([height, null, anchor]))
            .await
    }

    pub async fn state_search_msg(
        &self,
        from: &TipSetKey,
        message: &CidJson,
        lookback: i64,
        allow_replaced: bool,
    ) -> Result<Option<MsgLookup>, RpcClientError> {
        self.call_optional(
            "Filecoin.StateSearchMsg",
            json!([from, message, lookback, allow_replaced]),
        )
        .await
    }

    pub async fn state_wait_msg(
        &self,
        message: &CidJson,
        confidence: u64,
        lookback: i64,
        allow_replaced: bool,
    ) -> Result<MsgLookup, RpcClientError> {
        self.call(
            "Filecoin.StateWaitMsg",
            json!([message, confidence, lookback, allow_replaced]),
        )
        .await
    }

    pub async fn state_get_actor(
        &self,
        address: &str,
        anchor: &TipSetKey,
    ) -> Result<Option<ActorState>, RpcClientError> {
        self.call_optional("Filecoin.StateGetActor", json!([address, anchor]))
            .await
    }

    // --- net ---

    pub async fn net_peers(&self) -> Result<Vec<PeerAddrInfo>, RpcClientError> {
        self.call("Filecoin.NetPeers", json!([])).await
    }

    pub async fn net_connect(&self, peer: &PeerAddrInfo) -> Result<(), RpcClientError> {
        self.call_void("Filecoin.NetConnect", json!([peer])).await
    }

    pub async fn net_disconnect(&self, peer_id: &str) -> Result<(), RpcClientError> {
        self.call_void("Filecoin.NetDisconnect", json!([peer_id]))
            .await
    }

    pub async fn net_addrs_listen(&self) -> Result<PeerAddrInfo, RpcClientError> {
        self.call("Filecoin.NetAddrsListen", json!([])).await
    }

    // --- eth ---

    /// `EthCall` against the latest block; returns the raw result bytes.
    pub async fn eth_call(&self, request: &EthCallRequest) -> Result<Vec<u8>, RpcClientError> {
        let result: String = self
            .call("Filecoin.EthCall", json!([request, "latest"]))
            .await?;
        Ok(hex::decode(result.trim_start_matches("0x")).unwrap_or_default())
    }

    /// Submits a signed EIP-1559 transaction; returns the transaction hash.
    pub async fn eth_send_raw_transaction(
        &self,
        raw: &[u8],
    ) -> Result<String, RpcClientError> {
        self.call(
            "Filecoin.EthSendRawTransaction",
            json!([format!("0x{}", hex::encode(raw))]),
        )
        .await
    }
}
