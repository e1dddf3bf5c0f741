//! Agent Wallet — EIP-712 Action Signing
//!
//! The venue authorizes a delegated "agent" key to sign trading actions
//! on behalf of the account owner. Transfers are user-signed typed data;
//! order actions are agent-signed over a connection hash of the action
//! payload. Signing is local and synchronous via alloy.

use anyhow::{Context, Result};
use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol_types::{Eip712Domain, SolStruct};
use serde::Serialize;

alloy::sol! {
    /// Typed payload for the user-signed inter-venue transfer action.
    struct SendAsset {
        string hyperliquidChain;
        string destination;
        string sourceDex;
        string destinationDex;
        string token;
        string amount;
        uint64 nonce;
    }

    /// Typed payload for agent-signed exchange actions.
    struct Agent {
        string source;
        bytes32 connectionId;
    }
}

/// Environment variable holding the agent private key.
pub const AGENT_KEY_ENV: &str = "ROUTER_AGENT_KEY";

/// r/s/v signature triple in the shape the exchange endpoint expects.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureParts {
    pub r: String,
    pub s: String,
    pub v: u64,
}

/// Fields of a transfer instruction to be signed.
#[derive(Debug, Clone)]
pub struct SendAssetFields {
    pub hyperliquid_chain: String,
    pub destination: String,
    pub source_dex: String,
    pub destination_dex: String,
    pub token: String,
    pub amount: String,
    pub nonce: u64,
}

/// Delegated signing credential for exchange actions.
pub struct AgentWallet {
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl AgentWallet {
    /// Build from a hex private key and the configured signature chain id.
    pub fn new(private_key: &str, signature_chain_id: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .trim_start_matches("0x")
            .parse()
            .context("Invalid agent private key")?;
        let chain_id = parse_chain_id(signature_chain_id)?;
        Ok(Self { signer, chain_id })
    }

    /// Load the agent key from `ROUTER_AGENT_KEY`.
    pub fn from_env(signature_chain_id: &str) -> Result<Self> {
        let key = std::env::var(AGENT_KEY_ENV)
            .with_context(|| format!("{AGENT_KEY_ENV} not set"))?;
        Self::new(&key, signature_chain_id)
    }

    /// The agent's address, as registered with the venue.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// The chain id this wallet signs for.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Sign a user-signed transfer instruction.
    pub fn sign_send_asset(&self, fields: &SendAssetFields) -> Result<SignatureParts> {
        let payload = SendAsset {
            hyperliquidChain: fields.hyperliquid_chain.clone(),
            destination: fields.destination.clone(),
            sourceDex: fields.source_dex.clone(),
            destinationDex: fields.destination_dex.clone(),
            token: fields.token.clone(),
            amount: fields.amount.clone(),
            nonce: fields.nonce,
        };
        let domain = user_signed_domain(self.chain_id);
        self.sign_typed(&payload, &domain)
    }

    /// Sign an exchange action (orders) as the delegated agent.
    ///
    /// The agent signs a connection hash binding the action payload to
    /// the nonce, under the exchange's fixed signing domain.
    pub fn sign_l1_action(&self, action: &serde_json::Value, nonce: u64) -> Result<SignatureParts> {
        let mut bytes = serde_json::to_vec(action).context("Unserializable action")?;
        bytes.extend_from_slice(&nonce.to_be_bytes());
        let connection_id: B256 = keccak256(&bytes);

        let payload = Agent {
            source: if self.chain_id == 1 { "a" } else { "b" }.to_string(),
            connectionId: connection_id,
        };
        let domain = l1_domain();
        self.sign_typed(&payload, &domain)
    }

    fn sign_typed<T: SolStruct>(&self, payload: &T, domain: &Eip712Domain) -> Result<SignatureParts> {
        let hash = payload.eip712_signing_hash(domain);
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .context("Agent signing failed")?;
        Ok(SignatureParts {
            r: format!("0x{:064x}", signature.r()),
            s: format!("0x{:064x}", signature.s()),
            v: 27 + u64::from(signature.v()),
        })
    }
}

/// Domain for user-signed actions (transfers).
fn user_signed_domain(chain_id: u64) -> Eip712Domain {
    Eip712Domain::new(
        Some("HyperliquidSignTransaction".into()),
        Some("1".into()),
        Some(U256::from(chain_id)),
        Some(Address::ZERO),
        None,
    )
}

/// Fixed domain for agent-signed exchange actions.
fn l1_domain() -> Eip712Domain {
    Eip712Domain::new(
        Some("Exchange".into()),
        Some("1".into()),
        Some(U256::from(1337u64)),
        Some(Address::ZERO),
        None,
    )
}

/// Parse a 0x-prefixed hex chain id.
pub fn parse_chain_id(value: &str) -> Result<u64> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid signature chain id: {value}"))
}
