//! Transfer Gateway Adapter — Signed Inter-Venue Fund Movement
//!
//! Implements the `TransferGateway` port by signing a `sendAsset`
//! instruction with the agent wallet and posting it to the exchange
//! endpoint. One attempt per call; failures are classified for user
//! messaging and abort the surrounding execution.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::client::VenueClient;
use super::signing::{AgentWallet, SendAssetFields};
use super::types::ExchangeResponseWire;
use crate::ports::transfer_gateway::{
    TransferError, TransferGateway, TransferReceipt, TransferRequest,
};

/// Exchange-endpoint implementation of the transfer gateway.
pub struct SendAssetGateway {
    client: Arc<VenueClient>,
    wallet: Arc<AgentWallet>,
    /// "Testnet" or "Mainnet".
    hyperliquid_chain: String,
    /// 0x-prefixed signature chain id, echoed into the action payload.
    signature_chain_id: String,
}

impl SendAssetGateway {
    pub fn new(
        client: Arc<VenueClient>,
        wallet: Arc<AgentWallet>,
        hyperliquid_chain: String,
        signature_chain_id: String,
    ) -> Self {
        Self {
            client,
            wallet,
            hyperliquid_chain,
            signature_chain_id,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Map a venue rejection string onto the transfer failure taxonomy.
fn classify_rejection(message: &str) -> TransferError {
    let lowered = message.to_lowercase();
    if lowered.contains("chain") {
        TransferError::ChainIdMismatch(message.to_string())
    } else if lowered.contains("rejected") && lowered.contains("user") {
        TransferError::UserRejected
    } else {
        TransferError::VenueRejected(message.to_string())
    }
}

#[async_trait]
impl TransferGateway for SendAssetGateway {
    async fn transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, TransferError> {
        let nonce = now_ms();
        let amount = request.amount.to_string();

        let signature = self
            .wallet
            .sign_send_asset(&SendAssetFields {
                hyperliquid_chain: self.hyperliquid_chain.clone(),
                destination: request.account.clone(),
                source_dex: request.source.to_lowercase(),
                destination_dex: request.destination.to_lowercase(),
                token: request.token.clone(),
                amount: amount.clone(),
                nonce,
            })
            .map_err(|_| TransferError::UserRejected)?;

        let action = json!({
            "type": "sendAsset",
            "hyperliquidChain": self.hyperliquid_chain,
            "signatureChainId": self.signature_chain_id,
            "destination": request.account,
            "sourceDex": request.source.to_lowercase(),
            "destinationDex": request.destination.to_lowercase(),
            "token": request.token,
            "amount": amount,
            "fromSubAccount": "",
            "nonce": nonce,
        });

        let body = json!({
            "action": action,
            "nonce": nonce,
            "signature": signature,
        });

        let raw = self
            .client
            .post_exchange(&body)
            .await
            .map_err(|e| TransferError::Gateway(e.to_string()))?;

        let response: ExchangeResponseWire = serde_json::from_value(raw)
            .map_err(|e| TransferError::Gateway(format!("malformed response: {e}")))?;

        if response.status == "ok" {
            info!(
                amount = %request.amount,
                source = %request.source,
                destination = %request.destination,
                "Transfer acknowledged"
            );
            Ok(TransferReceipt {
                amount: request.amount,
                source: request.source.clone(),
                destination: request.destination.clone(),
                timestamp_ms: nonce,
            })
        } else {
            let message = response
                .response
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| response.response.to_string());
            warn!(error = %message, "Transfer rejected");
            Err(classify_rejection(&message))
        }
    }
}
