//! Report rendering.
//!
//! Results go to stdout, either as a short human-readable block or as one
//! JSON object per run (`--json`). Logs go to stderr and never mix in.

use serde_json::{Value, json};

use offsign::workflows::Report;
use offsign::{ControlDiff, MinerInfo};

/// Plain-text rendering of `report`.
pub fn render_text(report: &Report) -> String {
    let mut out = Vec::new();
    let msg = &report.message.message;

    if report.is_dry_run() {
        out.push(format!("DRY RUN: would {}", report.action));
    } else {
        out.push(report.action.clone());
    }
    out.push(format!("message:     {}", report.message_id));
    out.push(format!(
        "from:        {}  nonce {}  method {}",
        msg.from, msg.nonce, msg.method
    ));
    out.push(format!("to:          {}", msg.to));
    if !msg.value.is_zero() {
        out.push(format!("value:       {}", msg.value.to_fil_string()));
    }
    out.push(format!(
        "gas:         limit {}  fee cap {}  premium {}",
        msg.gas_limit, msg.gas_fee_cap, msg.gas_premium
    ));
    out.push(format!("max gas fee: {}", msg.max_gas_cost().to_fil_string()));

    if let Some(receipt) = &report.receipt {
        out.push(format!(
            "included:    height {}  exit code {}",
            receipt.height, receipt.exit_code
        ));
        if receipt.message != report.message_id {
            out.push(format!("executed as: {}", receipt.message));
        }
    }
    if let Some(state) = &report.state_after {
        out.push(format!("state:       {}", summarize(state)));
    }
    for w in &report.warnings {
        out.push(format!("WARNING: {w}"));
    }
    for step in &report.next_steps {
        out.push(format!("next: {step}"));
    }
    if report.is_dry_run() {
        out.push("pass --really-do-it to actually send".to_string());
    }
    out.join("\n")
}

/// JSON rendering of `report`.
pub fn render_json(report: &Report) -> Value {
    let msg = &report.message.message;
    json!({
        "action": report.action,
        "dry_run": report.is_dry_run(),
        "message_id": report.message_id.to_string(),
        "message": {
            "from": msg.from.to_string(),
            "to": msg.to.to_string(),
            "nonce": msg.nonce,
            "value": msg.value.to_string(),
            "method": msg.method,
            "gas_limit": msg.gas_limit,
            "gas_fee_cap": msg.gas_fee_cap.to_string(),
            "gas_premium": msg.gas_premium.to_string(),
            "params": hex::encode(&msg.params),
        },
        "signature": hex::encode(report.message.signature.to_wire_bytes()),
        "receipt": report.receipt.as_ref().map(|r| json!({
            "message": r.message.to_string(),
            "exit_code": r.exit_code,
            "height": r.height,
        })),
        "warnings": report.warnings,
        "next_steps": report.next_steps,
    })
}

/// Renders a control-address diff ahead of the report.
pub fn render_diff(diff: &ControlDiff) -> String {
    let mut out = Vec::new();
    for a in &diff.to_remove {
        out.push(format!("- {a}"));
    }
    for a in &diff.to_add {
        out.push(format!("+ {a}"));
    }
    if out.is_empty() {
        out.push("control addresses unchanged".to_string());
    }
    out.join("\n")
}

fn summarize(info: &MinerInfo) -> String {
    let mut s = format!("owner {} worker {}", info.owner, info.worker);
    if let Some(pending) = &info.pending_worker {
        s.push_str(&format!(
            " pending worker {pending} (confirmable at {})",
            info.worker_change_epoch
        ));
    }
    if let Some(pending) = &info.pending_owner {
        s.push_str(&format!(" pending owner {pending}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use offsign::{Address, MessageId, SigType, Signature, SignedMessage, TokenAmount, builder};

    use super::*;

    fn report(submitted: bool) -> Report {
        let mut msg = builder::build(
            &Address::new_id(1000),
            &Address::new_id(1234),
            16,
            TokenAmount::zero(),
            vec![0x81, 0x40],
            4,
        );
        msg.gas_limit = 2_000_000;
        msg.gas_fee_cap = TokenAmount::from(100_000u64);
        msg.gas_premium = TokenAmount::from(1_000u64);
        let id: MessageId = msg.cid();
        Report {
            action: "withdraw 1 FIL of 2 FIL available from f01234".to_string(),
            message: SignedMessage {
                message: msg,
                signature: Signature {
                    sig_type: SigType::Secp256k1,
                    bytes: vec![0; 65],
                },
            },
            message_id: id,
            submitted,
            receipt: None,
            state_after: None,
            warnings: vec!["sender f01001 is not the recorded owner f01000".to_string()],
            next_steps: Vec::new(),
        }
    }

    #[test]
    fn dry_run_text_says_so() {
        let text = render_text(&report(false));
        assert!(text.starts_with("DRY RUN: would withdraw"));
        assert!(text.contains("nonce 4"));
        assert!(text.contains("WARNING: sender f01001"));
        assert!(text.contains("--really-do-it"));
    }

    #[test]
    fn submitted_text_has_no_dry_run_hint() {
        let text = render_text(&report(true));
        assert!(text.starts_with("withdraw"));
        assert!(!text.contains("--really-do-it"));
    }

    #[test]
    fn json_carries_message_and_signature() {
        let r = report(false);
        let v = render_json(&r);
        assert_eq!(v["dry_run"], json!(true));
        assert_eq!(v["message_id"], json!(r.message_id.to_string()));
        assert_eq!(v["message"]["params"], json!("8140"));
        assert_eq!(v["message"]["gas_premium"], json!("1000"));
        assert_eq!(v["signature"].as_str().unwrap().len(), 2 * 66);
        assert_eq!(v["receipt"], Value::Null);
    }

    #[test]
    fn diff_lists_removals_then_additions() {
        let diff = ControlDiff {
            to_add: vec![Address::new_id(5)],
            to_remove: vec![Address::new_id(3)],
            to_set: vec![Address::new_id(5)],
        };
        assert_eq!(render_diff(&diff), "- f03\n+ f05");
        assert_eq!(
            render_diff(&ControlDiff::default()),
            "control addresses unchanged"
        );
    }
}
