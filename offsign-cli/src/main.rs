//! `offsign` binary.
//!
//! Offline administration of a storage provider's miner actor. Every command
//! builds and signs its message locally with the key passed in `--key`; the
//! node only supplies chain state and receives the signed result.
//!
//! Nothing is pushed unless `--really-do-it` is given. Without it the command
//! prints the exact message it would send.

mod config;
mod output;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use offsign::workflows::{
    ConfirmWorkerChange, OwnerStep, ProposeWorkerChange, ReplacePending, ReplaceTarget, Report,
    SendFunds, SetControlAddresses, SetOwner, WithdrawBalance,
};
use offsign::{
    Address, KeyMaterial, LotusRpcClient, MessageId, OfflineError, TokenAmount, Workflow,
};

use config::{FeeArgs, NodeArgs};

#[derive(Debug, Parser)]
#[command(name = "offsign", version, about = "Offline signing for Filecoin miner administration")]
struct Cli {
    #[command(flatten)]
    node: NodeArgs,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Key and execution flags shared by every command.
#[derive(Debug, Args)]
struct SignArgs {
    /// Hex-encoded key-info blob of the sending account.
    #[arg(long, env = "OFFSIGN_KEY", hide_env_values = true)]
    key: String,

    /// Actually send the message. Without this flag nothing is pushed.
    #[arg(long)]
    really_do_it: bool,

    #[command(flatten)]
    fees: FeeArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage control addresses and the worker key.
    #[command(subcommand)]
    Control(ControlCommand),

    /// Replace a message stuck in the pool: `<from> <nonce>` or `<message-cid>`.
    Replace {
        #[arg(num_args = 1..=2, required = true, value_name = "FROM NONCE | CID")]
        target: Vec<String>,

        /// Re-estimate and bump the premium automatically.
        #[arg(long)]
        auto: bool,

        /// Wait for the replacement to be included.
        #[arg(long)]
        wait: bool,

        #[command(flatten)]
        sign: SignArgs,
    },

    /// Send funds between accounts.
    Send {
        /// Account to send from.
        #[arg(long)]
        from: Address,

        to: Address,

        /// Amount, e.g. "1.5" (FIL) or "250 milliFIL".
        amount: String,

        #[arg(long)]
        wait: bool,

        #[command(flatten)]
        sign: SignArgs,
    },

    /// Two-step owner change.
    #[command(subcommand)]
    SetOwner(OwnerCommand),

    /// Withdraw available balance to the owner.
    Withdraw {
        #[arg(long)]
        miner: Address,

        #[arg(long)]
        owner: Address,

        /// Amount in FIL; everything available when omitted.
        amount: Option<String>,

        #[arg(long)]
        wait: bool,

        #[command(flatten)]
        sign: SignArgs,
    },
}

#[derive(Debug, Subcommand)]
enum ControlCommand {
    /// Set the complete list of control addresses.
    Set {
        #[arg(long)]
        miner: Address,

        #[arg(long)]
        owner: Address,

        /// Desired control addresses, in order. Empty clears the list.
        addresses: Vec<Address>,

        #[arg(long)]
        wait: bool,

        #[command(flatten)]
        sign: SignArgs,
    },

    /// Propose a new worker key; waits for inclusion when sent.
    ProposeChangeWorker {
        #[arg(long)]
        miner: Address,

        #[arg(long)]
        owner: Address,

        #[arg(long = "new-worker")]
        new_worker: Address,

        #[command(flatten)]
        sign: SignArgs,
    },

    /// Confirm a proposed worker key after its activation height.
    ConfirmChangeWorker {
        #[arg(long)]
        miner: Address,

        #[arg(long)]
        owner: Address,

        #[arg(long = "new-worker")]
        new_worker: Address,

        #[command(flatten)]
        sign: SignArgs,
    },
}

#[derive(Debug, Subcommand)]
enum OwnerCommand {
    /// Sent by the current owner.
    Propose {
        #[arg(long)]
        miner: Address,

        #[arg(long)]
        owner: Address,

        #[arg(long = "new-owner")]
        new_owner: Address,

        #[arg(long)]
        wait: bool,

        #[command(flatten)]
        sign: SignArgs,
    },

    /// Sent by the proposed owner to accept.
    Confirm {
        #[arg(long)]
        miner: Address,

        /// The proposed owner.
        #[arg(long = "new-owner")]
        new_owner: Address,

        #[arg(long)]
        wait: bool,

        #[command(flatten)]
        sign: SignArgs,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("offsign=info,offsign_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = cli.node.to_config()?;
    let node = LotusRpcClient::new(&config.rpc).map_err(|e| format!("failed to create node client: {e}"))?;
    tracing::debug!(endpoint = node.endpoint(), "using node");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let wf = Workflow::new(&node, &config, cancel);
    let report = match cli.command {
        Command::Control(ControlCommand::Set {
            miner,
            owner,
            addresses,
            wait,
            sign,
        }) => {
            let key = load_key(&sign.key)?;
            let outcome = wf
                .set_control_addresses(
                    &key,
                    SetControlAddresses {
                        miner,
                        sender: owner,
                        desired: addresses,
                        fees: sign.fees.overrides(),
                        execute: sign.really_do_it,
                        wait,
                    },
                )
                .await
                .map_err(describe)?;
            if !cli.json {
                println!("{}", output::render_diff(&outcome.diff));
            }
            outcome.report
        }
        Command::Control(ControlCommand::ProposeChangeWorker {
            miner,
            owner,
            new_worker,
            sign,
        }) => {
            let key = load_key(&sign.key)?;
            wf.propose_worker_change(
                &key,
                ProposeWorkerChange {
                    miner,
                    sender: owner,
                    new_worker,
                    fees: sign.fees.overrides(),
                    execute: sign.really_do_it,
                },
            )
            .await
            .map_err(describe)?
            .report
        }
        Command::Control(ControlCommand::ConfirmChangeWorker {
            miner,
            owner,
            new_worker,
            sign,
        }) => {
            let key = load_key(&sign.key)?;
            wf.confirm_worker_change(
                &key,
                ConfirmWorkerChange {
                    miner,
                    sender: owner,
                    new_worker,
                    fees: sign.fees.overrides(),
                    execute: sign.really_do_it,
                },
            )
            .await
            .map_err(describe)?
        }
        Command::Replace {
            target,
            auto,
            wait,
            sign,
        } => {
            let key = load_key(&sign.key)?;
            let outcome = wf
                .replace_pending(
                    &key,
                    ReplacePending {
                        target: parse_replace_target(&target)?,
                        auto,
                        fees: sign.fees.overrides(),
                        execute: sign.really_do_it,
                        wait,
                    },
                )
                .await
                .map_err(describe)?;
            tracing::info!(replaced = %outcome.replaced, "replacement prepared");
            outcome.report
        }
        Command::Send {
            from,
            to,
            amount,
            wait,
            sign,
        } => {
            let key = load_key(&sign.key)?;
            wf.send_funds(
                &key,
                SendFunds {
                    sender: from,
                    to,
                    amount: parse_amount(&amount)?,
                    fees: sign.fees.overrides(),
                    execute: sign.really_do_it,
                    wait,
                },
            )
            .await
            .map_err(describe)?
        }
        Command::SetOwner(cmd) => {
            let (miner, sender, step, wait, sign) = match cmd {
                OwnerCommand::Propose {
                    miner,
                    owner,
                    new_owner,
                    wait,
                    sign,
                } => (miner, owner, OwnerStep::Propose { new_owner }, wait, sign),
                OwnerCommand::Confirm {
                    miner,
                    new_owner,
                    wait,
                    sign,
                } => (miner, new_owner, OwnerStep::Confirm, wait, sign),
            };
            let key = load_key(&sign.key)?;
            wf.set_owner(
                &key,
                SetOwner {
                    miner,
                    sender,
                    step,
                    fees: sign.fees.overrides(),
                    execute: sign.really_do_it,
                    wait,
                },
            )
            .await
            .map_err(describe)?
        }
        Command::Withdraw {
            miner,
            owner,
            amount,
            wait,
            sign,
        } => {
            let key = load_key(&sign.key)?;
            wf.withdraw_balance(
                &key,
                WithdrawBalance {
                    miner,
                    sender: owner,
                    amount: amount.as_deref().map(parse_amount).transpose()?,
                    fees: sign.fees.overrides(),
                    execute: sign.really_do_it,
                    wait,
                },
            )
            .await
            .map_err(describe)?
        }
    };

    print_report(&report, cli.json)
}

fn print_report(report: &Report, json: bool) -> Result<(), String> {
    if json {
        let rendered = serde_json::to_string_pretty(&output::render_json(report))
            .map_err(|e| format!("failed to render report: {e}"))?;
        println!("{rendered}");
    } else {
        println!("{}", output::render_text(report));
    }
    Ok(())
}

fn load_key(blob: &str) -> Result<KeyMaterial, String> {
    KeyMaterial::from_hex_blob(blob).map_err(|e| format!("invalid --key: {e}"))
}

fn parse_amount(raw: &str) -> Result<TokenAmount, String> {
    TokenAmount::parse_fil(raw).map_err(|e| format!("invalid amount: {e}"))
}

fn parse_replace_target(args: &[String]) -> Result<ReplaceTarget, String> {
    match args {
        [cid] => cid
            .parse::<MessageId>()
            .map(ReplaceTarget::Message)
            .map_err(|e| format!("invalid message cid: {e}")),
        [from, nonce] => Ok(ReplaceTarget::FromNonce {
            from: from
                .parse::<Address>()
                .map_err(|e| format!("invalid sender address: {e}"))?,
            nonce: nonce
                .parse::<u64>()
                .map_err(|e| format!("invalid nonce {nonce:?}: {e}"))?,
        }),
        _ => Err("expected <from> <nonce> or <message-cid>".to_string()),
    }
}

/// Renders a workflow error, pointing at any message that already left.
fn describe(e: OfflineError) -> String {
    match e.submitted_message() {
        Some(id) => format!("{e}\nmessage {id} was already submitted; check its status before retrying"),
        None => e.to_string(),
    }
}
