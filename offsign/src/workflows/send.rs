use super::{Dispatch, Report, Workflow};
use crate::builder::build;
use crate::error::OfflineError;
use crate::fees::FeeOverrides;
use crate::node::NodeApi;
use crate::signer::KeyMaterial;
use crate::types::{Address, MinerMethod, TokenAmount};

/// Plain value transfer.
#[derive(Clone, Debug)]
pub struct SendFunds {
    pub sender: Address,
    pub to: Address,
    pub amount: TokenAmount,
    pub fees: FeeOverrides,
    pub execute: bool,
    pub wait: bool,
}

impl<N: NodeApi + ?Sized> Workflow<'_, N> {
    pub async fn send_funds(&self, key: &KeyMaterial, req: SendFunds) -> Result<Report, OfflineError> {
        if req.amount.is_negative() {
            return Err(OfflineError::InputValidation(format!(
                "amount must not be negative, got {}",
                req.amount.to_fil_string()
            )));
        }
        self.check_signer(&req.sender, key).await?;

        let nonce = self.node.next_nonce(&req.sender).await?;
        let draft = build(
            &req.sender,
            &req.to,
            MinerMethod::Send.number(),
            req.amount.clone(),
            Vec::new(),
            nonce,
        );
        let message = self.price(draft, None, &req.fees).await?;

        self.dispatch(
            format!("send {} from {} to {}", req.amount.to_fil_string(), req.sender, req.to),
            key,
            message,
            Dispatch {
                execute: req.execute,
                wait: req.wait,
                postcondition: None,
            },
            Vec::new(),
        )
        .await
    }
}
