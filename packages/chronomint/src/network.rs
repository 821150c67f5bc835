//! Tempo network parameters
//!
//! The presale, token and airdrop contracts live on a single designated
//! network. Wallets that do not know it are asked to add it with the
//! EIP-3085 parameter bundle below.

use serde::{Deserialize, Serialize};

/// Tempo testnet (Andantino) chain ID
pub const TEMPO_CHAIN_ID: u64 = 42429;

/// Tempo chain ID as a 0x-prefixed hex quantity
pub const TEMPO_CHAIN_ID_HEX: &str = "0xA5BD";

pub const TEMPO_CHAIN_NAME: &str = "Tempo Testnet (Andantino)";
pub const TEMPO_RPC_URL: &str = "https://rpc.testnet.tempo.xyz";
pub const TEMPO_EXPLORER_URL: &str = "https://explore.tempo.xyz";

/// EIP-1193 error code: the user rejected the request
pub const USER_REJECTED_CODE: i64 = 4001;

/// Error code returned by `wallet_switchEthereumChain` for a chain the wallet
/// has never seen
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// Native currency descriptor (EIP-3085)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// `wallet_addEthereumChain` parameter bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    /// Hex quantity, e.g. "0xA5BD"
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl AddChainParams {
    /// Parameters for the designated Tempo network
    pub fn tempo() -> Self {
        Self::tempo_with_rpc(TEMPO_RPC_URL)
    }

    /// Tempo parameters with a custom RPC endpoint (e.g. a private node)
    pub fn tempo_with_rpc(rpc_url: &str) -> Self {
        Self {
            chain_id: TEMPO_CHAIN_ID_HEX.to_string(),
            chain_name: TEMPO_CHAIN_NAME.to_string(),
            native_currency: NativeCurrency {
                name: "Andantino".to_string(),
                symbol: "TEMPO".to_string(),
                decimals: 18,
            },
            rpc_urls: vec![rpc_url.to_string()],
            block_explorer_urls: vec![TEMPO_EXPLORER_URL.to_string()],
        }
    }

    /// Numeric chain ID, if `chain_id` is well formed
    pub fn numeric_chain_id(&self) -> Option<u64> {
        parse_chain_id(&self.chain_id)
    }

    /// First RPC endpoint, if any
    pub fn primary_rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(String::as_str)
    }
}

/// Parse a chain ID given either as a hex quantity ("0xA5BD") or decimal ("42429")
pub fn parse_chain_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}

/// Encode a chain ID as a hex quantity
pub fn chain_id_hex(chain_id: u64) -> String {
    format!("0x{:X}", chain_id)
}

/// True if the chain ID is the designated Tempo network
pub fn is_designated_chain(chain_id: u64) -> bool {
    chain_id == TEMPO_CHAIN_ID
}

/// Network mismatch: a chain is known and it is not Tempo
pub fn is_wrong_network(chain_id: Option<u64>) -> bool {
    chain_id.is_some_and(|id| !is_designated_chain(id))
}

/// Explorer link for an account
pub fn explorer_address_url(address: &str) -> String {
    format!("{}/address/{}", TEMPO_EXPLORER_URL, address)
}

/// Explorer link for a transaction
pub fn explorer_tx_url(tx_hash: &str) -> String {
    format!("{}/tx/{}", TEMPO_EXPLORER_URL, tx_hash)
}
