//! In-process node.
//!
//! Keeps a tiny chain in memory: ID-to-key account mappings, per-sender
//! nonces, a message pool with replace-by-fee, and miner actors that honour
//! the handful of methods the workflows send. Useful for tests and for
//! rehearsing a workflow without a network.
//!
//! With `auto_mine` set, every accepted push is executed at once in a new
//! tipset one epoch above the head, after which the head moves
//! `settle_epochs` further. Without it, messages wait in the pool until
//! [`InMemoryNode::mine`] is called.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{ChainHead, MessageLookup, NodeApi, NodeError, TipSetKey};
use crate::config::FeePolicyConfig;
use crate::fees::{FeeParameters, FeePolicy};
use crate::signer;
use crate::types::miner::decode_params;
use crate::types::{
    Address, ChainEpoch, ChangeOwnerParams, ChangeWorkerAddressParams, MessageId, MinerInfo,
    MinerMethod, Payload, SignedMessage, TokenAmount, UnsignedMessage, WithdrawBalanceParams,
};

/// Actor exit codes produced by the fake miner.
pub mod exit_code {
    pub const OK: i64 = 0;
    pub const ILLEGAL_ARGUMENT: i64 = 16;
    pub const NOT_FOUND: i64 = 17;
    pub const FORBIDDEN: i64 = 18;
    pub const ILLEGAL_STATE: i64 = 20;
    pub const UNHANDLED_METHOD: i64 = 22;
}

/// Behaviour knobs for [`InMemoryNode`].
#[derive(Clone, Debug)]
pub struct MemoryNodeConfig {
    pub start_height: ChainEpoch,
    /// Epochs between a worker proposal and its earliest confirmation.
    pub worker_change_delay: ChainEpoch,
    pub auto_mine: bool,
    /// Extra epochs the head advances after each mined tipset.
    pub settle_epochs: ChainEpoch,
    /// What `estimate_gas` answers, before any `max_fee` capping.
    pub gas_estimate: FeeParameters,
    pub version: String,
}

impl Default for MemoryNodeConfig {
    fn default() -> Self {
        Self {
            start_height: 100,
            worker_change_delay: 900,
            auto_mine: true,
            settle_epochs: 0,
            gas_estimate: FeeParameters {
                gas_limit: 10_000_000,
                gas_fee_cap: TokenAmount::from(1_000_000_000u64),
                gas_premium: TokenAmount::from(100_000u64),
            },
            version: "1.0.0+memory".to_string(),
        }
    }
}

#[derive(Default)]
struct State {
    height: ChainEpoch,
    tipsets: u64,
    head: TipSetKey,
    /// ID -> account key.
    accounts: HashMap<u64, Address>,
    miners: BTreeMap<u64, MinerInfo>,
    nonces: HashMap<u64, u64>,
    /// Pending messages keyed by (sender ID, nonce).
    pool: BTreeMap<(u64, u64), SignedMessage>,
    messages: HashMap<MessageId, UnsignedMessage>,
    receipts: HashMap<MessageId, MessageLookup>,
    /// Replaced message -> its replacement.
    replaced: HashMap<MessageId, MessageId>,
    snapshots: HashMap<TipSetKey, BTreeMap<u64, MinerInfo>>,
    pushed: Vec<SignedMessage>,
    next_id: u64,
}

/// In-memory implementation of [`NodeApi`].
pub struct InMemoryNode {
    config: MemoryNodeConfig,
    rbf: FeePolicy,
    state: Mutex<State>,
}

impl Default for InMemoryNode {
    fn default() -> Self {
        Self::new(MemoryNodeConfig::default())
    }
}

impl InMemoryNode {
    pub fn new(config: MemoryNodeConfig) -> Self {
        let mut state = State {
            height: config.start_height,
            next_id: 1000,
            ..State::default()
        };
        state.head = tipset_key(state.height, 0);
        Self {
            config,
            rbf: FeePolicy::new(FeePolicyConfig::default()),
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an account key and returns its freshly assigned ID address.
    pub fn add_account(&self, key: &Address) -> Address {
        let mut st = self.state();
        let id = st.next_id;
        st.next_id += 1;
        st.accounts.insert(id, key.clone());
        Address::new_id(id)
    }

    /// Registers a miner actor and returns its ID address. Addresses in
    /// `info` should be in ID form.
    pub fn add_miner(&self, info: MinerInfo) -> Address {
        let mut st = self.state();
        let id = st.next_id;
        st.next_id += 1;
        st.miners.insert(id, info);
        Address::new_id(id)
    }

    /// Current miner state, bypassing the trait.
    pub fn miner(&self, miner: &Address) -> Option<MinerInfo> {
        let id = miner.id()?;
        self.state().miners.get(&id).cloned()
    }

    pub fn set_nonce(&self, account: &Address, nonce: u64) {
        let mut st = self.state();
        if let Ok(id) = st.id_of(account) {
            st.nonces.insert(id, nonce);
        }
    }

    pub fn height(&self) -> ChainEpoch {
        self.state().height
    }

    /// Moves the head to `height` without executing anything.
    pub fn set_height(&self, height: ChainEpoch) {
        let mut st = self.state();
        st.tipsets += 1;
        st.height = height;
        st.head = tipset_key(height, st.tipsets);
    }

    pub fn set_auto_mine(&mut self, auto_mine: bool) {
        self.config.auto_mine = auto_mine;
    }

    /// Every message accepted by `push`, in order.
    pub fn pushed(&self) -> Vec<SignedMessage> {
        self.state().pushed.clone()
    }

    pub fn pending(&self) -> Vec<SignedMessage> {
        self.state().pool.values().cloned().collect()
    }

    /// Executes every pending message whose nonce is next in line, in a new
    /// tipset one epoch above the head.
    pub fn mine(&self) {
        let mut st = self.state();
        self.mine_locked(&mut st);
    }

    fn mine_locked(&self, st: &mut State) {
        st.height += 1;
        st.tipsets += 1;
        let height = st.height;
        let key = tipset_key(height, st.tipsets);

        loop {
            let next = st
                .pool
                .iter()
                .find(|((sender, nonce), _)| st.nonces.get(sender).copied().unwrap_or(0) == *nonce)
                .map(|(k, _)| *k);
            let Some(slot) = next else { break };
            let Some(msg) = st.pool.remove(&slot) else { break };

            let exit_code = self.execute(st, slot.0, &msg.message, height);
            *st.nonces.entry(slot.0).or_insert(0) += 1;
            let id = msg.id();
            st.receipts.insert(
                id,
                MessageLookup {
                    message: id,
                    exit_code,
                    tipset: key.clone(),
                    height,
                },
            );
        }

        let snapshot = st.miners.clone();
        st.snapshots.insert(key.clone(), snapshot);
        st.head = key;
        if self.config.settle_epochs > 0 {
            st.tipsets += 1;
            st.height += self.config.settle_epochs;
            st.head = tipset_key(st.height, st.tipsets);
            let snapshot = st.miners.clone();
            st.snapshots.insert(st.head.clone(), snapshot);
        }
    }

    fn execute(&self, st: &mut State, sender: u64, msg: &UnsignedMessage, height: ChainEpoch) -> i64 {
        let method = MinerMethod::from_number(msg.method);
        if method == Some(MinerMethod::Send) {
            return exit_code::OK;
        }
        let Ok(to) = st.id_of(&msg.to) else {
            return exit_code::NOT_FOUND;
        };
        let Some(mut info) = st.miners.get(&to).cloned() else {
            return exit_code::UNHANDLED_METHOD;
        };
        let sender = Address::new_id(sender);

        let code = match method {
            Some(MinerMethod::ChangeWorkerAddress) => {
                let Ok(params) = decode_params::<ChangeWorkerAddressParams>(&msg.params) else {
                    return exit_code::ILLEGAL_ARGUMENT;
                };
                if sender != info.owner {
                    return exit_code::FORBIDDEN;
                }
                let Ok(worker) = st.id_of(&params.new_worker) else {
                    return exit_code::ILLEGAL_ARGUMENT;
                };
                let Ok(controls) = params
                    .new_control_addresses
                    .iter()
                    .map(|a| st.id_of(a).map(Address::new_id))
                    .collect::<Result<Vec<_>, _>>()
                else {
                    return exit_code::ILLEGAL_ARGUMENT;
                };
                info.control_addresses = controls;
                let worker = Address::new_id(worker);
                if worker != info.worker {
                    info.pending_worker = Some(worker);
                    info.worker_change_epoch = height + self.config.worker_change_delay;
                }
                exit_code::OK
            }
            Some(MinerMethod::ConfirmChangeWorkerAddress) => {
                if sender != info.owner {
                    return exit_code::FORBIDDEN;
                }
                match info.pending_worker.take() {
                    None => exit_code::ILLEGAL_STATE,
                    Some(_) if height < info.worker_change_epoch => exit_code::ILLEGAL_STATE,
                    Some(worker) => {
                        info.worker = worker;
                        info.worker_change_epoch = -1;
                        exit_code::OK
                    }
                }
            }
            Some(MinerMethod::ChangeOwnerAddress) => {
                let Ok(params) = decode_params::<ChangeOwnerParams>(&msg.params) else {
                    return exit_code::ILLEGAL_ARGUMENT;
                };
                let Ok(new_owner) = st.id_of(&params.new_owner).map(Address::new_id) else {
                    return exit_code::ILLEGAL_ARGUMENT;
                };
                if sender == info.owner {
                    if new_owner == info.owner {
                        return exit_code::ILLEGAL_ARGUMENT;
                    }
                    info.pending_owner = Some(new_owner);
                    exit_code::OK
                } else if info.pending_owner.as_ref() == Some(&sender) && new_owner == sender {
                    info.owner = new_owner;
                    info.pending_owner = None;
                    exit_code::OK
                } else {
                    exit_code::FORBIDDEN
                }
            }
            Some(MinerMethod::WithdrawBalance) => {
                let Ok(params) = decode_params::<WithdrawBalanceParams>(&msg.params) else {
                    return exit_code::ILLEGAL_ARGUMENT;
                };
                if sender != info.owner {
                    return exit_code::FORBIDDEN;
                }
                if params.amount_requested.is_negative() {
                    return exit_code::ILLEGAL_ARGUMENT;
                }
                let amount = params.amount_requested.min(info.available_balance.clone());
                info.available_balance = &info.available_balance - &amount;
                exit_code::OK
            }
            Some(MinerMethod::Send) | None => exit_code::UNHANDLED_METHOD,
        };

        if code == exit_code::OK {
            st.miners.insert(to, info);
        }
        code
    }

    fn signer_key(st: &State, sender: u64) -> Option<Address> {
        st.accounts.get(&sender).cloned()
    }
}

fn tipset_key(height: ChainEpoch, seq: u64) -> TipSetKey {
    let bytes = serde_cbor::to_vec(&("tipset", height, seq)).unwrap_or_default();
    TipSetKey(vec![MessageId::of_cbor(&bytes).0])
}

impl State {
    /// Resolves any address form to a known actor ID.
    fn id_of(&self, address: &Address) -> Result<u64, NodeError> {
        match address.payload() {
            Payload::Id(id) if self.accounts.contains_key(id) || self.miners.contains_key(id) => {
                Ok(*id)
            }
            Payload::Id(_) => Err(NodeError::NotFound(format!("actor {address} not found"))),
            _ => self
                .accounts
                .iter()
                .find(|(_, key)| *key == address)
                .map(|(id, _)| *id)
                .ok_or_else(|| NodeError::NotFound(format!("actor {address} not found"))),
        }
    }

    fn pending_nonce(&self, sender: u64) -> u64 {
        let chain = self.nonces.get(&sender).copied().unwrap_or(0);
        self.pool
            .range((sender, 0)..=(sender, u64::MAX))
            .map(|((_, n), _)| n + 1)
            .max()
            .map_or(chain, |n| n.max(chain))
    }
}

#[async_trait]
impl NodeApi for InMemoryNode {
    async fn resolve_account_key(&self, address: &Address) -> Result<Address, NodeError> {
        let st = self.state();
        match address.payload() {
            Payload::Secp256k1(_) | Payload::Bls(_) => Ok(address.clone()),
            _ => {
                let id = st.id_of(address)?;
                Self::signer_key(&st, id).ok_or_else(|| {
                    NodeError::NotFound(format!("{address} is not an account actor"))
                })
            }
        }
    }

    async fn lookup_id(&self, address: &Address) -> Result<Address, NodeError> {
        self.state().id_of(address).map(Address::new_id)
    }

    async fn miner_info(
        &self,
        miner: &Address,
        tipset: Option<&TipSetKey>,
    ) -> Result<MinerInfo, NodeError> {
        let st = self.state();
        let id = st.id_of(miner)?;
        let miners = match tipset {
            Some(key) if !key.is_head() => st
                .snapshots
                .get(key)
                .ok_or_else(|| NodeError::NotFound("tipset not found".into()))?,
            _ => &st.miners,
        };
        miners
            .get(&id)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(format!("{miner} is not a miner actor")))
    }

    async fn next_nonce(&self, address: &Address) -> Result<u64, NodeError> {
        let st = self.state();
        let id = st.id_of(address)?;
        Ok(st.pending_nonce(id))
    }

    async fn estimate_gas(
        &self,
        _message: &UnsignedMessage,
        max_fee: Option<&TokenAmount>,
    ) -> Result<FeeParameters, NodeError> {
        let mut params = self.config.gas_estimate.clone();
        if let Some(max_fee) = max_fee {
            self.rbf.cap_gas_fee(&mut params, max_fee);
        }
        Ok(params)
    }

    async fn pending_messages(&self, _tipset: &TipSetKey) -> Result<Vec<SignedMessage>, NodeError> {
        Ok(self.pending())
    }

    async fn get_message(&self, id: &MessageId) -> Result<UnsignedMessage, NodeError> {
        self.state()
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(format!("message {id} not found")))
    }

    async fn push(&self, message: &SignedMessage) -> Result<MessageId, NodeError> {
        let mut st = self.state();
        let sender = st
            .id_of(&message.message.from)
            .map_err(|e| NodeError::Rejected(e.to_string()))?;
        let key = Self::signer_key(&st, sender)
            .ok_or_else(|| NodeError::Rejected("sender is not an account actor".into()))?;
        signer::verify(&key, &message.message, &message.signature)
            .map_err(|e| NodeError::Rejected(e.to_string()))?;

        let nonce = message.message.nonce;
        let chain_nonce = st.nonces.get(&sender).copied().unwrap_or(0);
        if nonce < chain_nonce {
            return Err(NodeError::Rejected(format!(
                "nonce {nonce} too low, expected at least {chain_nonce}"
            )));
        }

        let id = message.id();
        if let Some(existing) = st.pool.get(&(sender, nonce)) {
            let floor = self.rbf.min_rbf_premium(&existing.message.gas_premium);
            if message.message.gas_premium < floor {
                return Err(NodeError::Rejected(format!(
                    "replace by fee has too low gas premium {}, need at least {floor}",
                    message.message.gas_premium
                )));
            }
            let old = existing.id();
            st.replaced.insert(old, id);
        }

        st.pool.insert((sender, nonce), message.clone());
        st.messages.insert(id, message.message.clone());
        st.messages.insert(message.message.cid(), message.message.clone());
        st.pushed.push(message.clone());

        if self.config.auto_mine {
            self.mine_locked(&mut st);
        }
        Ok(id)
    }

    async fn search_message(&self, id: &MessageId) -> Result<Option<MessageLookup>, NodeError> {
        let st = self.state();
        let mut current = *id;
        // Follow the replacement chain to whatever actually executed.
        for _ in 0..=st.replaced.len() {
            if let Some(lookup) = st.receipts.get(&current) {
                return Ok(Some(lookup.clone()));
            }
            match st.replaced.get(&current) {
                Some(next) => current = *next,
                None => break,
            }
        }
        Ok(None)
    }

    async fn chain_head(&self) -> Result<ChainHead, NodeError> {
        let st = self.state();
        Ok(ChainHead {
            key: st.head.clone(),
            height: st.height,
        })
    }

    async fn version(&self) -> Result<String, NodeError> {
        Ok(self.config.version.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::signer::KeyMaterial;
    use crate::signer::testing::blob;
    use crate::types::miner::encode_params;

    struct Fixture {
        node: InMemoryNode,
        key: KeyMaterial,
        owner: Address,
        worker: Address,
        miner: Address,
    }

    fn fixture(config: MemoryNodeConfig) -> Fixture {
        let node = InMemoryNode::new(config);
        let key = KeyMaterial::from_hex_blob(&blob("secp256k1", &[3u8; 32])).unwrap();
        let owner = node.add_account(&key.address());
        let other = KeyMaterial::from_hex_blob(&blob("secp256k1", &[4u8; 32])).unwrap();
        let worker = node.add_account(&other.address());
        let miner = node.add_miner(MinerInfo {
            owner: owner.clone(),
            worker: worker.clone(),
            pending_worker: None,
            worker_change_epoch: -1,
            pending_owner: None,
            control_addresses: Vec::new(),
            available_balance: TokenAmount::from_whole(10),
        });
        Fixture {
            node,
            key,
            owner,
            worker,
            miner,
        }
    }

    fn signed(f: &Fixture, method: MinerMethod, params: Vec<u8>, nonce: u64, premium: u64) -> SignedMessage {
        let mut msg = build(&f.owner, &f.miner, method.number(), TokenAmount::zero(), params, nonce);
        msg.gas_limit = 1_000_000;
        msg.gas_fee_cap = TokenAmount::from(1_000_000u64);
        msg.gas_premium = TokenAmount::from(premium);
        f.key.sign_message(msg).unwrap()
    }

    #[tokio::test]
    async fn withdraw_reduces_available_balance() {
        let f = fixture(MemoryNodeConfig::default());
        let params = encode_params(&WithdrawBalanceParams {
            amount_requested: TokenAmount::from_whole(4),
        })
        .unwrap();
        let id = f
            .node
            .push(&signed(&f, MinerMethod::WithdrawBalance, params, 0, 100))
            .await
            .unwrap();

        let lookup = f.node.search_message(&id).await.unwrap().unwrap();
        assert!(lookup.succeeded());
        assert_eq!(
            f.node.miner(&f.miner).unwrap().available_balance,
            TokenAmount::from_whole(6)
        );
        assert_eq!(f.node.next_nonce(&f.owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn worker_change_is_height_gated() {
        let f = fixture(MemoryNodeConfig {
            worker_change_delay: 10,
            ..Default::default()
        });
        let params = encode_params(&ChangeWorkerAddressParams {
            new_worker: f.owner.clone(),
            new_control_addresses: Vec::new(),
        })
        .unwrap();
        f.node
            .push(&signed(&f, MinerMethod::ChangeWorkerAddress, params, 0, 100))
            .await
            .unwrap();
        let info = f.node.miner(&f.miner).unwrap();
        assert_eq!(info.pending_worker, Some(f.owner.clone()));
        assert_eq!(info.worker_change_epoch, 101 + 10);

        let early = f
            .node
            .push(&signed(&f, MinerMethod::ConfirmChangeWorkerAddress, Vec::new(), 1, 100))
            .await
            .unwrap();
        let lookup = f.node.search_message(&early).await.unwrap().unwrap();
        assert_eq!(lookup.exit_code, exit_code::ILLEGAL_STATE);
        assert_eq!(f.node.miner(&f.miner).unwrap().worker, f.worker);

        f.node.set_height(111);
        let on_time = f
            .node
            .push(&signed(&f, MinerMethod::ConfirmChangeWorkerAddress, Vec::new(), 2, 100))
            .await
            .unwrap();
        assert!(f.node.search_message(&on_time).await.unwrap().unwrap().succeeded());
        assert_eq!(f.node.miner(&f.miner).unwrap().worker, f.owner);
    }

    #[tokio::test]
    async fn replacement_needs_a_higher_premium() {
        let mut f = fixture(MemoryNodeConfig::default());
        f.node.set_auto_mine(false);
        let first = f
            .node
            .push(&signed(&f, MinerMethod::ConfirmChangeWorkerAddress, Vec::new(), 0, 100))
            .await
            .unwrap();

        let low = signed(&f, MinerMethod::ConfirmChangeWorkerAddress, vec![], 0, 110);
        assert!(matches!(f.node.push(&low).await, Err(NodeError::Rejected(_))));

        let high = signed(&f, MinerMethod::ConfirmChangeWorkerAddress, vec![], 0, 126);
        let second = f.node.push(&high).await.unwrap();
        assert_eq!(f.node.pending().len(), 1);

        f.node.mine();
        let lookup = f.node.search_message(&first).await.unwrap().unwrap();
        assert_eq!(lookup.message, second);
    }

    #[tokio::test]
    async fn bad_signatures_and_stale_nonces_are_rejected() {
        let f = fixture(MemoryNodeConfig::default());
        let mut forged = signed(&f, MinerMethod::ConfirmChangeWorkerAddress, vec![], 0, 100);
        forged.message.nonce = 9;
        assert!(matches!(f.node.push(&forged).await, Err(NodeError::Rejected(_))));

        f.node.set_nonce(&f.owner, 3);
        let stale = signed(&f, MinerMethod::ConfirmChangeWorkerAddress, vec![], 2, 100);
        assert!(matches!(f.node.push(&stale).await, Err(NodeError::Rejected(_))));
    }

    #[tokio::test]
    async fn snapshots_are_kept_per_tipset() {
        let f = fixture(MemoryNodeConfig::default());
        let params = encode_params(&WithdrawBalanceParams {
            amount_requested: TokenAmount::from_whole(1),
        })
        .unwrap();
        let id = f
            .node
            .push(&signed(&f, MinerMethod::WithdrawBalance, params.clone(), 0, 100))
            .await
            .unwrap();
        let at = f.node.search_message(&id).await.unwrap().unwrap().tipset;
        f.node
            .push(&signed(&f, MinerMethod::WithdrawBalance, params, 1, 100))
            .await
            .unwrap();

        let then = f.node.miner_info(&f.miner, Some(&at)).await.unwrap();
        let now = f.node.miner_info(&f.miner, None).await.unwrap();
        assert_eq!(then.available_balance, TokenAmount::from_whole(9));
        assert_eq!(now.available_balance, TokenAmount::from_whole(8));
    }
}
