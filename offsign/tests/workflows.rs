//! End-to-end workflow runs against the in-memory node.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio_util::sync::CancellationToken;

use offsign::node::memory::exit_code;
use offsign::workflows::{
    ConfirmWorkerChange, OwnerStep, ProposeWorkerChange, ReplacePending, ReplaceTarget,
    SendFunds, SetControlAddresses, SetOwner, WithdrawBalance,
};
use offsign::{
    Address, FeeError, FeeOverrides, InMemoryNode, InclusionConfig, KeyMaterial, MemoryNodeConfig,
    MinerInfo, NodeApi, OfflineConfig, OfflineError, TokenAmount, Workflow, builder,
};

fn key(seed: u8) -> KeyMaterial {
    let json = format!(
        r#"{{"Type":"secp256k1","PrivateKey":"{}"}}"#,
        STANDARD.encode([seed; 32])
    );
    KeyMaterial::from_hex_blob(&hex::encode(json)).unwrap()
}

struct Fixture {
    node: InMemoryNode,
    config: OfflineConfig,
    owner_key: KeyMaterial,
    worker_key: KeyMaterial,
    owner: Address,
    worker: Address,
    miner: Address,
}

impl Fixture {
    fn new(node_config: MemoryNodeConfig) -> Self {
        let node = InMemoryNode::new(node_config);
        let owner_key = key(1);
        let worker_key = key(2);
        let owner = node.add_account(&owner_key.address());
        let worker = node.add_account(&worker_key.address());
        let miner = node.add_miner(MinerInfo {
            owner: owner.clone(),
            worker: worker.clone(),
            pending_worker: None,
            worker_change_epoch: -1,
            pending_owner: None,
            control_addresses: Vec::new(),
            available_balance: TokenAmount::from_whole(10),
        });
        let config = OfflineConfig {
            inclusion: InclusionConfig {
                confidence: 0,
                poll_interval: Duration::from_secs(1),
                deadline: Duration::from_secs(60),
            },
            ..OfflineConfig::default()
        };
        Self {
            node,
            config,
            owner_key,
            worker_key,
            owner,
            worker,
            miner,
        }
    }

    fn workflow(&self) -> Workflow<'_, InMemoryNode> {
        Workflow::new(&self.node, &self.config, CancellationToken::new())
    }
}

#[tokio::test(start_paused = true)]
async fn worker_rotation_is_gated_by_activation_height() {
    let f = Fixture::new(MemoryNodeConfig {
        worker_change_delay: 10,
        ..Default::default()
    });
    let new_key = key(3);
    let new_worker = f.node.add_account(&new_key.address());
    let wf = f.workflow();

    let proposed = wf
        .propose_worker_change(
            &f.owner_key,
            ProposeWorkerChange {
                miner: f.miner.clone(),
                sender: f.owner.clone(),
                new_worker: new_key.address(),
                fees: FeeOverrides::default(),
                execute: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(proposed.new_worker, new_worker);
    let activation = proposed.activation_height.unwrap();
    assert_eq!(activation, 101 + 10);
    assert!(proposed.report.next_steps[0].contains(&activation.to_string()));

    let confirm = || ConfirmWorkerChange {
        miner: f.miner.clone(),
        sender: f.owner.clone(),
        new_worker: new_worker.clone(),
        fees: FeeOverrides::default(),
        execute: true,
    };

    f.node.set_height(activation - 1);
    let err = wf.confirm_worker_change(&f.owner_key, confirm()).await.unwrap_err();
    assert!(matches!(
        err,
        OfflineError::ConfirmTooEarly { activation_height, current_height }
            if activation_height == activation && current_height == activation - 1
    ));
    assert_eq!(f.node.pushed().len(), 1);

    f.node.set_height(activation);
    let report = wf.confirm_worker_change(&f.owner_key, confirm()).await.unwrap();
    assert!(report.submitted);
    let after = report.state_after.unwrap();
    assert_eq!(after.worker, new_worker);
    assert_eq!(after.pending_worker, None);
    assert_eq!(f.node.miner(&f.miner).unwrap().worker, new_worker);
}

#[tokio::test]
async fn proposing_the_current_worker_is_a_noop() {
    let f = Fixture::new(MemoryNodeConfig::default());
    let err = f
        .workflow()
        .propose_worker_change(
            &f.owner_key,
            ProposeWorkerChange {
                miner: f.miner.clone(),
                sender: f.owner.clone(),
                new_worker: f.worker_key.address(),
                fees: FeeOverrides::default(),
                execute: true,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OfflineError::NoOpProposal { .. }));
    assert!(f.node.pushed().is_empty());
}

#[tokio::test]
async fn confirm_without_proposal_is_refused() {
    let f = Fixture::new(MemoryNodeConfig::default());
    let err = f
        .workflow()
        .confirm_worker_change(
            &f.owner_key,
            ConfirmWorkerChange {
                miner: f.miner.clone(),
                sender: f.owner.clone(),
                new_worker: f.owner.clone(),
                fees: FeeOverrides::default(),
                execute: true,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OfflineError::NoPendingProposal));
    assert!(f.node.pushed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn auto_replace_bumps_premium_and_reuses_nonce() {
    let f = Fixture::new(MemoryNodeConfig {
        auto_mine: false,
        ..Default::default()
    });
    f.node.set_nonce(&f.owner, 5);

    let mut stuck = builder::build(&f.owner, &f.worker, 0, TokenAmount::from(1u64), Vec::new(), 5);
    stuck.gas_limit = 1_000_000;
    stuck.gas_fee_cap = TokenAmount::from(1_000u64);
    stuck.gas_premium = TokenAmount::from(100u64);
    let stuck_id = f
        .node
        .push(&f.owner_key.sign_message(stuck).unwrap())
        .await
        .unwrap();

    let outcome = f
        .workflow()
        .replace_pending(
            &f.owner_key,
            ReplacePending {
                target: ReplaceTarget::FromNonce {
                    from: f.owner.clone(),
                    nonce: 5,
                },
                auto: true,
                fees: FeeOverrides::default(),
                execute: true,
                wait: false,
            },
        )
        .await
        .unwrap();

    let replacement = &outcome.report.message.message;
    assert_eq!(outcome.replaced, stuck_id);
    assert_eq!(outcome.previous_premium, TokenAmount::from(100u64));
    assert_eq!(replacement.nonce, 5);
    assert_eq!(replacement.gas_limit, 1_000_000);
    assert!(replacement.gas_premium >= TokenAmount::from(126u64));
    assert!(replacement.gas_fee_cap >= replacement.gas_premium);

    let pending = f.node.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id(), outcome.report.message_id);
}

#[tokio::test]
async fn manual_replace_enforces_the_bump_floor() {
    let f = Fixture::new(MemoryNodeConfig {
        auto_mine: false,
        ..Default::default()
    });
    let mut stuck = builder::build(&f.owner, &f.worker, 0, TokenAmount::zero(), Vec::new(), 0);
    stuck.gas_limit = 1_000_000;
    stuck.gas_fee_cap = TokenAmount::from(1_000u64);
    stuck.gas_premium = TokenAmount::from(100u64);
    let stuck_id = f
        .node
        .push(&f.owner_key.sign_message(stuck).unwrap())
        .await
        .unwrap();

    let request = |premium: &str| ReplacePending {
        target: ReplaceTarget::Message(stuck_id),
        auto: false,
        fees: FeeOverrides {
            gas_premium: Some(premium.to_string()),
            gas_fee_cap: Some("2000".to_string()),
            ..FeeOverrides::default()
        },
        execute: false,
        wait: false,
    };

    let err = f
        .workflow()
        .replace_pending(&f.owner_key, request("125"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OfflineError::InvalidFeeParameters(FeeError::PremiumBelowReplaceFloor { .. })
    ));

    let ok = f
        .workflow()
        .replace_pending(&f.owner_key, request("126"))
        .await
        .unwrap();
    assert!(ok.report.is_dry_run());
    assert_eq!(ok.report.message.message.gas_premium, TokenAmount::from(126u64));
    assert_eq!(f.node.pushed().len(), 1);
}

#[tokio::test]
async fn replace_without_pending_message_fails() {
    let f = Fixture::new(MemoryNodeConfig::default());
    let err = f
        .workflow()
        .replace_pending(
            &f.owner_key,
            ReplacePending {
                target: ReplaceTarget::FromNonce {
                    from: f.owner.clone(),
                    nonce: 3,
                },
                auto: true,
                fees: FeeOverrides::default(),
                execute: true,
                wait: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OfflineError::PendingMessageNotFound { nonce: 3, .. }));
}

#[tokio::test]
async fn withdraw_above_available_is_refused_before_signing() {
    let f = Fixture::new(MemoryNodeConfig::default());
    let err = f
        .workflow()
        .withdraw_balance(
            &f.owner_key,
            WithdrawBalance {
                miner: f.miner.clone(),
                sender: f.owner.clone(),
                amount: Some(TokenAmount::from_whole(11)),
                fees: FeeOverrides::default(),
                execute: true,
                wait: true,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OfflineError::InputValidation(_)));
    assert!(f.node.pushed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn withdraw_defaults_to_everything_available() {
    let f = Fixture::new(MemoryNodeConfig::default());
    let report = f
        .workflow()
        .withdraw_balance(
            &f.owner_key,
            WithdrawBalance {
                miner: f.miner.clone(),
                sender: f.owner.clone(),
                amount: None,
                fees: FeeOverrides::default(),
                execute: true,
                wait: true,
            },
        )
        .await
        .unwrap();
    assert!(report.receipt.unwrap().succeeded());
    assert!(f.node.miner(&f.miner).unwrap().available_balance.is_zero());
}

#[tokio::test(start_paused = true)]
async fn withdraw_by_non_owner_fails_on_chain() {
    let f = Fixture::new(MemoryNodeConfig::default());
    let err = f
        .workflow()
        .withdraw_balance(
            &f.worker_key,
            WithdrawBalance {
                miner: f.miner.clone(),
                sender: f.worker.clone(),
                amount: Some(TokenAmount::from_whole(1)),
                fees: FeeOverrides::default(),
                execute: true,
                wait: true,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OfflineError::OnChainExecutionFailure { exit_code: code, .. } if code == exit_code::FORBIDDEN
    ));
    assert!(err.submitted_message().is_some());
}

#[tokio::test]
async fn wrong_key_is_a_signer_mismatch() {
    let f = Fixture::new(MemoryNodeConfig::default());
    let err = f
        .workflow()
        .send_funds(
            &f.worker_key,
            SendFunds {
                sender: f.owner.clone(),
                to: f.worker.clone(),
                amount: TokenAmount::from_whole(1),
                fees: FeeOverrides::default(),
                execute: true,
                wait: false,
            },
        )
        .await
        .unwrap_err();
    match err {
        OfflineError::SignerMismatch { expected, actual } => {
            assert_eq!(expected, f.owner_key.address());
            assert_eq!(actual, f.worker_key.address());
        }
        other => panic!("expected SignerMismatch, got {other:?}"),
    }
    assert!(f.node.pushed().is_empty());
}

#[tokio::test]
async fn dry_run_is_deterministic_and_never_pushes() {
    let f = Fixture::new(MemoryNodeConfig::default());
    let request = || SetControlAddresses {
        miner: f.miner.clone(),
        sender: f.owner.clone(),
        desired: vec![f.worker_key.address()],
        fees: FeeOverrides::default(),
        execute: false,
        wait: false,
    };

    let first = f
        .workflow()
        .set_control_addresses(&f.owner_key, request())
        .await
        .unwrap();
    let second = f
        .workflow()
        .set_control_addresses(&f.owner_key, request())
        .await
        .unwrap();

    assert!(first.report.is_dry_run());
    assert_eq!(first.report.message_id, second.report.message_id);
    assert_eq!(first.report.message, second.report.message);
    assert_eq!(first.diff.to_add, vec![f.worker_key.address()]);
    assert!(f.node.pushed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn control_addresses_are_replaced_on_chain() {
    let f = Fixture::new(MemoryNodeConfig::default());
    let outcome = f
        .workflow()
        .set_control_addresses(
            &f.owner_key,
            SetControlAddresses {
                miner: f.miner.clone(),
                sender: f.owner.clone(),
                desired: vec![f.worker_key.address(), f.owner_key.address()],
                fees: FeeOverrides::default(),
                execute: true,
                wait: true,
            },
        )
        .await
        .unwrap();
    assert!(outcome.report.receipt.is_some());

    let info = f.node.miner(&f.miner).unwrap();
    assert_eq!(info.control_addresses, vec![f.worker.clone(), f.owner.clone()]);
    assert_eq!(info.worker, f.worker);
    assert_eq!(info.pending_worker, None);
}

#[tokio::test]
async fn unknown_control_address_is_unresolvable() {
    let f = Fixture::new(MemoryNodeConfig::default());
    let stranger = key(9).address();
    let err = f
        .workflow()
        .set_control_addresses(
            &f.owner_key,
            SetControlAddresses {
                miner: f.miner.clone(),
                sender: f.owner.clone(),
                desired: vec![stranger.clone()],
                fees: FeeOverrides::default(),
                execute: false,
                wait: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OfflineError::UnresolvableAddress { address, .. } if address == stranger));
}

#[tokio::test(start_paused = true)]
async fn owner_change_takes_two_steps() {
    let f = Fixture::new(MemoryNodeConfig::default());
    let wf = f.workflow();

    let proposed = wf
        .set_owner(
            &f.owner_key,
            SetOwner {
                miner: f.miner.clone(),
                sender: f.owner.clone(),
                step: OwnerStep::Propose {
                    new_owner: f.worker.clone(),
                },
                fees: FeeOverrides::default(),
                execute: true,
                wait: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(
        proposed.state_after.unwrap().pending_owner,
        Some(f.worker.clone())
    );

    let accepted = wf
        .set_owner(
            &f.worker_key,
            SetOwner {
                miner: f.miner.clone(),
                sender: f.worker.clone(),
                step: OwnerStep::Confirm,
                fees: FeeOverrides::default(),
                execute: true,
                wait: true,
            },
        )
        .await
        .unwrap();
    let after = accepted.state_after.unwrap();
    assert_eq!(after.owner, f.worker);
    assert_eq!(after.pending_owner, None);
}

#[tokio::test]
async fn send_dry_run_carries_value_and_fees() {
    let f = Fixture::new(MemoryNodeConfig::default());
    let report = f
        .workflow()
        .send_funds(
            &f.owner_key,
            SendFunds {
                sender: f.owner.clone(),
                to: f.worker.clone(),
                amount: TokenAmount::from_whole(2),
                fees: FeeOverrides {
                    gas_premium: Some("5000".to_string()),
                    ..FeeOverrides::default()
                },
                execute: false,
                wait: false,
            },
        )
        .await
        .unwrap();
    let msg = &report.message.message;
    assert_eq!(msg.method, 0);
    assert_eq!(msg.value, TokenAmount::from_whole(2));
    assert_eq!(msg.gas_premium, TokenAmount::from(5_000u64));
    assert_eq!(msg.gas_limit, 10_000_000);
    assert!(report.is_dry_run());
}
