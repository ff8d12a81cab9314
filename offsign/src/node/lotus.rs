//! JSON-RPC client for a Lotus-compatible full node.
//!
//! Requests are JSON-RPC 2.0 over HTTP POST, one call per request:
//!
//! ```json
//! POST /rpc/v1
//! Authorization: Bearer <token>
//! { "jsonrpc": "2.0", "method": "Filecoin.ChainHead", "params": [], "id": 1 }
//!
//! Response:
//! { "jsonrpc": "2.0", "result": { "Cids": [{"/": "bafy..."}], "Height": 123 }, "id": 1 }
//! ```
//!
//! Node-side JSON conventions: big integers are decimal strings, byte fields
//! are standard base64, CIDs are `{"/": "<cid>"}` objects and an unset
//! address is the literal `"<empty>"`.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{ChainHead, MessageLookup, NodeApi, NodeError, TipSetKey};
use crate::config::RpcConfig;
use crate::fees::FeeParameters;
use crate::types::{
    Address, MessageId, MinerInfo, SigType, Signature, SignedMessage, TokenAmount,
    UnsignedMessage,
};

/// JSON-RPC client for a remote full node.
///
/// Cheap to share by reference; the underlying `reqwest::Client` pools
/// connections.
pub struct LotusRpcClient {
    endpoint: String,
    token: Option<String>,
    client: Client,
    next_id: AtomicU64,
}

impl LotusRpcClient {
    /// Builds a client for `config.endpoint` with the configured timeout.
    pub fn new(config: &RpcConfig) -> Result<Self, NodeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NodeError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, NodeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let method = format!("Filecoin.{method}");
        debug!(%method, id, "node call");

        let body = RpcRequest {
            jsonrpc: "2.0",
            method: &method,
            params,
            id,
        };
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| NodeError::Transport(format!("{method} to {}: {e}", self.endpoint)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NodeError::Transport(format!(
                "{method}: node returned HTTP status {status}"
            )));
        }

        let body = resp
            .json::<RpcResponse>()
            .await
            .map_err(|e| NodeError::Protocol(format!("{method}: invalid JSON-RPC response: {e}")))?;

        if let Some(err) = body.error {
            return Err(NodeError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        serde_json::from_value(body.result)
            .map_err(|e| NodeError::Protocol(format!("{method}: unexpected result shape: {e}")))
    }
}

/// Maps node-reported failures of a lookup to `NotFound`.
fn not_found(err: NodeError) -> NodeError {
    match err {
        NodeError::Rpc { message, .. } => NodeError::NotFound(message),
        other => other,
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CidJson {
    #[serde(rename = "/")]
    cid: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MessageJson {
    version: u64,
    to: String,
    from: String,
    nonce: u64,
    value: String,
    gas_limit: i64,
    gas_fee_cap: String,
    gas_premium: String,
    method: u64,
    #[serde(default)]
    params: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SignatureJson {
    #[serde(rename = "Type")]
    sig_type: u8,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SignedMessageJson {
    message: MessageJson,
    signature: SignatureJson,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MinerInfoJson {
    owner: String,
    worker: String,
    #[serde(default)]
    new_worker: Option<String>,
    #[serde(default)]
    control_addresses: Option<Vec<String>>,
    worker_change_epoch: i64,
    #[serde(default)]
    pending_owner_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HeadJson {
    cids: Vec<CidJson>,
    height: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiptJson {
    exit_code: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LookupJson {
    message: CidJson,
    receipt: ReceiptJson,
    tip_set: Vec<CidJson>,
    height: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionJson {
    version: String,
}

fn protocol<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> NodeError {
    move |e| NodeError::Protocol(format!("{what}: {e}"))
}

fn parse_address(s: &str) -> Result<Address, NodeError> {
    s.parse().map_err(protocol("address"))
}

fn parse_optional_address(s: Option<&str>) -> Result<Option<Address>, NodeError> {
    match s {
        None | Some("") | Some("<empty>") => Ok(None),
        Some(s) => parse_address(s).map(Some),
    }
}

fn parse_amount(s: &str) -> Result<TokenAmount, NodeError> {
    TokenAmount::parse_atto(s).map_err(protocol("amount"))
}

fn cid_to_json(id: &MessageId) -> CidJson {
    CidJson {
        cid: id.to_string(),
    }
}

fn cid_from_json(c: &CidJson) -> Result<MessageId, NodeError> {
    c.cid.parse().map_err(protocol("cid"))
}

fn tipset_to_json(key: &TipSetKey) -> Vec<CidJson> {
    key.0
        .iter()
        .map(|c| CidJson { cid: c.to_string() })
        .collect()
}

fn tipset_from_json(cids: &[CidJson]) -> Result<TipSetKey, NodeError> {
    cids.iter()
        .map(|c| cid_from_json(c).map(|id| id.0))
        .collect::<Result<Vec<_>, _>>()
        .map(TipSetKey)
}

fn message_to_json(m: &UnsignedMessage) -> MessageJson {
    MessageJson {
        version: m.version,
        to: m.to.to_string(),
        from: m.from.to_string(),
        nonce: m.nonce,
        value: m.value.to_string(),
        gas_limit: m.gas_limit,
        gas_fee_cap: m.gas_fee_cap.to_string(),
        gas_premium: m.gas_premium.to_string(),
        method: m.method,
        params: Some(STANDARD.encode(&m.params)),
    }
}

fn message_from_json(m: &MessageJson) -> Result<UnsignedMessage, NodeError> {
    let params = match m.params.as_deref() {
        None | Some("") => Vec::new(),
        Some(p) => STANDARD.decode(p).map_err(protocol("params"))?,
    };
    Ok(UnsignedMessage {
        version: m.version,
        to: parse_address(&m.to)?,
        from: parse_address(&m.from)?,
        nonce: m.nonce,
        value: parse_amount(&m.value)?,
        gas_limit: m.gas_limit,
        gas_fee_cap: parse_amount(&m.gas_fee_cap)?,
        gas_premium: parse_amount(&m.gas_premium)?,
        method: m.method,
        params,
    })
}

fn signed_to_json(s: &SignedMessage) -> SignedMessageJson {
    SignedMessageJson {
        message: message_to_json(&s.message),
        signature: SignatureJson {
            sig_type: s.signature.sig_type as u8,
            data: STANDARD.encode(&s.signature.bytes),
        },
    }
}

fn signed_from_json(s: &SignedMessageJson) -> Result<SignedMessage, NodeError> {
    let sig_type = SigType::from_wire(s.signature.sig_type).ok_or_else(|| {
        NodeError::Protocol(format!("unknown signature type {}", s.signature.sig_type))
    })?;
    Ok(SignedMessage {
        message: message_from_json(&s.message)?,
        signature: Signature {
            sig_type,
            bytes: STANDARD
                .decode(&s.signature.data)
                .map_err(protocol("signature"))?,
        },
    })
}

fn miner_info_from_json(
    info: &MinerInfoJson,
    available_balance: TokenAmount,
) -> Result<MinerInfo, NodeError> {
    let control_addresses = info
        .control_addresses
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|a| parse_address(a))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MinerInfo {
        owner: parse_address(&info.owner)?,
        worker: parse_address(&info.worker)?,
        pending_worker: parse_optional_address(info.new_worker.as_deref())?,
        worker_change_epoch: info.worker_change_epoch,
        pending_owner: parse_optional_address(info.pending_owner_address.as_deref())?,
        control_addresses,
        available_balance,
    })
}

fn lookup_from_json(l: &LookupJson) -> Result<MessageLookup, NodeError> {
    Ok(MessageLookup {
        message: cid_from_json(&l.message)?,
        exit_code: l.receipt.exit_code,
        tipset: tipset_from_json(&l.tip_set)?,
        height: l.height,
    })
}

#[async_trait]
impl NodeApi for LotusRpcClient {
    async fn resolve_account_key(&self, address: &Address) -> Result<Address, NodeError> {
        let raw: String = self
            .call("StateAccountKey", json!([address.to_string(), []]))
            .await
            .map_err(not_found)?;
        parse_address(&raw)
    }

    async fn lookup_id(&self, address: &Address) -> Result<Address, NodeError> {
        let raw: String = self
            .call("StateLookupID", json!([address.to_string(), []]))
            .await
            .map_err(not_found)?;
        parse_address(&raw)
    }

    async fn miner_info(
        &self,
        miner: &Address,
        tipset: Option<&TipSetKey>,
    ) -> Result<MinerInfo, NodeError> {
        let tsk = tipset.map(tipset_to_json).unwrap_or_default();
        let info: MinerInfoJson = self
            .call("StateMinerInfo", json!([miner.to_string(), tsk]))
            .await
            .map_err(not_found)?;
        let balance: String = self
            .call("StateMinerAvailableBalance", json!([miner.to_string(), tsk]))
            .await?;
        miner_info_from_json(&info, parse_amount(&balance)?)
    }

    async fn next_nonce(&self, address: &Address) -> Result<u64, NodeError> {
        self.call("MpoolGetNonce", json!([address.to_string()])).await
    }

    async fn estimate_gas(
        &self,
        message: &UnsignedMessage,
        max_fee: Option<&TokenAmount>,
    ) -> Result<FeeParameters, NodeError> {
        let send_spec = max_fee.map(|fee| json!({ "MaxFee": fee.to_string() }));
        let estimated: MessageJson = self
            .call(
                "GasEstimateMessageGas",
                json!([message_to_json(message), send_spec, []]),
            )
            .await?;
        let estimated = message_from_json(&estimated)?;
        Ok(FeeParameters::of(&estimated))
    }

    async fn pending_messages(&self, tipset: &TipSetKey) -> Result<Vec<SignedMessage>, NodeError> {
        let pending: Option<Vec<Value>> = self
            .call("MpoolPending", json!([tipset_to_json(tipset)]))
            .await?;
        // The pool holds every sender's messages; entries this client cannot
        // represent (e.g. delegated signatures) are not ours to replace.
        Ok(pending
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                match serde_json::from_value::<SignedMessageJson>(entry)
                    .map_err(protocol("pending message"))
                    .and_then(|s| signed_from_json(&s))
                {
                    Ok(signed) => Some(signed),
                    Err(e) => {
                        debug!(error = %e, "skipping undecodable pending message");
                        None
                    }
                }
            })
            .collect())
    }

    async fn get_message(&self, id: &MessageId) -> Result<UnsignedMessage, NodeError> {
        let msg: MessageJson = self
            .call("ChainGetMessage", json!([cid_to_json(id)]))
            .await
            .map_err(not_found)?;
        message_from_json(&msg)
    }

    async fn push(&self, message: &SignedMessage) -> Result<MessageId, NodeError> {
        let cid: CidJson = self
            .call("MpoolPush", json!([signed_to_json(message)]))
            .await
            .map_err(|e| match e {
                NodeError::Rpc { message, .. } => NodeError::Rejected(message),
                other => other,
            })?;
        cid_from_json(&cid)
    }

    async fn search_message(&self, id: &MessageId) -> Result<Option<MessageLookup>, NodeError> {
        // Search back without a limit and accept replacements.
        let found: Option<LookupJson> = self
            .call("StateSearchMsg", json!([[], cid_to_json(id), -1, true]))
            .await?;
        found.as_ref().map(lookup_from_json).transpose()
    }

    async fn chain_head(&self) -> Result<ChainHead, NodeError> {
        let head: HeadJson = self.call("ChainHead", json!([])).await?;
        Ok(ChainHead {
            key: tipset_from_json(&head.cids)?,
            height: head.height,
        })
    }

    async fn version(&self) -> Result<String, NodeError> {
        let v: VersionJson = self.call("Version", json!([])).await?;
        Ok(v.version)
    }
}
