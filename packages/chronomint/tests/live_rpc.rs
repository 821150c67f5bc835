//! Tests against the public Tempo testnet RPC
//!
//! Run with: `cargo test --test live_rpc -- --ignored`

use chronomint::network::{parse_chain_id, TEMPO_CHAIN_ID, TEMPO_RPC_URL};
use chronomint::wallet::LocalWallet;
use serde_json::json;

const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

fn rpc_url() -> String {
    std::env::var("TEMPO_RPC_URL").unwrap_or_else(|_| TEMPO_RPC_URL.to_string())
}

#[tokio::test]
#[ignore = "requires network access to the Tempo RPC"]
async fn test_rpc_serves_tempo_chain_id() {
    let response: serde_json::Value = reqwest::Client::new()
        .post(rpc_url())
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_chainId",
            "params": [],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let chain_id = response["result"].as_str().and_then(parse_chain_id);
    assert_eq!(chain_id, Some(TEMPO_CHAIN_ID));
}

#[tokio::test]
#[ignore = "requires network access to the Tempo RPC"]
async fn test_detected_wallet_is_on_tempo() {
    let wallet = LocalWallet::detect(&rpc_url(), TEST_KEY, true).await.unwrap();
    assert_eq!(wallet.known_chains(), vec![TEMPO_CHAIN_ID]);
}
