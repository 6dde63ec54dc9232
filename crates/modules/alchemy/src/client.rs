//! Ethereum JSON-RPC client with the Alchemy token-balance extension.
//!
//! Serves as the direct-RPC [`BalanceProvider`]: native balance through
//! `eth_getBalance`, held tokens through `alchemy_getTokenBalances`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use folio_common::traits::BalanceProvider;
use folio_common::types::wei_to_native;
use folio_common::{Address, FolioError, FolioResult, TokenId};

/// Upper bound on `alchemy_getTokenBalances` pages followed per wallet.
const MAX_BALANCE_PAGES: usize = 10;

pub struct RpcClient {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: &str, timeout: Duration) -> FolioResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FolioError::Config(format!("Failed to build RPC HTTP client: {e}")))?;

        info!("JSON-RPC client initialized");

        Ok(Self {
            http,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    /// One JSON-RPC request. Returns the `result` member.
    pub async fn call(&self, method: &str, params: Value) -> FolioResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| FolioError::Network(format!("{method} request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(FolioError::upstream("rpc", format!("{method}: HTTP {status}: {text}")));
        }

        let parsed: Value = resp
            .json()
            .await
            .map_err(|e| FolioError::Decode(format!("{method} response: {e}")))?;
        rpc_result(parsed)
    }

    /// `eth_call` against `to` at the latest block; returns the raw bytes.
    pub async fn eth_call(&self, to: &TokenId, data: &[u8]) -> FolioResult<Vec<u8>> {
        let params = json!([
            { "to": to.as_str(), "data": format!("0x{}", hex::encode(data)) },
            "latest"
        ]);
        let result = self.call("eth_call", params).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| FolioError::Decode("eth_call result is not a string".into()))?;
        decode_hex(raw)
    }

    pub async fn balance_wei(&self, wallet: &Address) -> FolioResult<u128> {
        let result = self.call("eth_getBalance", json!([wallet.as_str(), "latest"])).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| FolioError::Decode("eth_getBalance result is not a string".into()))?;
        parse_quantity(raw)
    }

    /// ERC-20 contracts with a non-zero balance, following page keys.
    pub async fn token_balances(&self, wallet: &Address) -> FolioResult<Vec<TokenId>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut page_key: Option<String> = None;

        for page in 0..MAX_BALANCE_PAGES {
            let params = match &page_key {
                Some(key) => json!([wallet.as_str(), "erc20", { "pageKey": key }]),
                None => json!([wallet.as_str(), "erc20"]),
            };
            let result = self.call("alchemy_getTokenBalances", params).await?;
            for token in parse_token_balances(&result)? {
                if seen.insert(token.clone()) {
                    out.push(token);
                }
            }

            page_key = result.get("pageKey").and_then(Value::as_str).map(str::to_string);
            if page_key.is_none() {
                return Ok(out);
            }
            debug!(page = page + 1, "following token balance page key");
        }

        warn!(wallet = %wallet, pages = MAX_BALANCE_PAGES, "token balance pagination truncated");
        Ok(out)
    }
}

#[async_trait]
impl BalanceProvider for RpcClient {
    fn name(&self) -> &'static str {
        "rpc"
    }

    async fn native_balance(&self, wallet: &Address) -> f64 {
        match self.balance_wei(wallet).await {
            Ok(wei) => wei_to_native(wei),
            Err(e) => {
                error!(wallet = %wallet, "error getting native balance: {e}");
                0.0
            }
        }
    }

    async fn held_tokens(&self, wallet: &Address) -> Vec<TokenId> {
        match self.token_balances(wallet).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(wallet = %wallet, "error getting held tokens: {e}");
                Vec::new()
            }
        }
    }
}

/// Unwrap a JSON-RPC envelope.
pub fn rpc_result(mut body: Value) -> FolioResult<Value> {
    if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = err.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        return Err(FolioError::upstream("rpc", format!("{code}: {message}")));
    }
    match body.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(FolioError::Decode("JSON-RPC response has neither result nor error".into())),
    }
}

/// Hex quantity (`0x1bc16d674ec80000`, possibly zero-padded) to u128.
pub fn parse_quantity(raw: &str) -> FolioResult<u128> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw).trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() > 32 {
        return Err(FolioError::Decode(format!("quantity overflows u128: {raw}")));
    }
    u128::from_str_radix(digits, 16).map_err(|e| FolioError::Decode(format!("quantity '{raw}': {e}")))
}

pub fn decode_hex(raw: &str) -> FolioResult<Vec<u8>> {
    hex::decode(raw.strip_prefix("0x").unwrap_or(raw)).map_err(|e| FolioError::Decode(format!("hex payload: {e}")))
}

/// Contracts from an `alchemy_getTokenBalances` result whose balance is
/// present, error-free and non-zero.
pub fn parse_token_balances(result: &Value) -> FolioResult<Vec<TokenId>> {
    let entries = result
        .get("tokenBalances")
        .and_then(Value::as_array)
        .ok_or_else(|| FolioError::Decode("missing tokenBalances".into()))?;

    let mut out = Vec::new();
    for entry in entries {
        if entry.get("error").is_some_and(|e| !e.is_null()) {
            continue;
        }
        let Some(balance) = entry.get("tokenBalance").and_then(Value::as_str) else {
            continue;
        };
        let digits = balance.strip_prefix("0x").unwrap_or(balance);
        if digits.trim_start_matches('0').is_empty() {
            continue;
        }
        let Some(contract) = entry.get("contractAddress").and_then(Value::as_str) else {
            continue;
        };
        match TokenId::parse(contract) {
            Ok(token) => out.push(token),
            Err(_) => warn!(contract, "skipping malformed contract address"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_result_ok() {
        let v = rpc_result(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x10" })).unwrap();
        assert_eq!(v, json!("0x10"));
    }

    #[test]
    fn test_rpc_result_error() {
        let err = rpc_result(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": { "code": -32000, "message": "execution reverted" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("execution reverted"));
        assert!(rpc_result(json!({ "jsonrpc": "2.0", "id": 1 })).is_err());
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("0x22b1c8c1227a0000").unwrap(), 2_500_000_000_000_000_000);
        assert_eq!(
            parse_quantity("0x000000000000000000000000000000000000000000000000000000000007a120").unwrap(),
            500_000
        );
        assert!(parse_quantity("0xzz").is_err());
        assert!(parse_quantity(&format!("0x1{}", "0".repeat(32))).is_err());
    }

    #[test]
    fn test_parse_token_balances_skips_zero_and_errors() {
        let result = json!({
            "address": "0xabc",
            "tokenBalances": [
                { "contractAddress": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
                  "tokenBalance": "0x000000000000000000000000000000000000000000000000000000000007a120", "error": null },
                { "contractAddress": "0x6b175474e89094c44da98b954eedeac495271d0f",
                  "tokenBalance": "0x0000000000000000000000000000000000000000000000000000000000000000", "error": null },
                { "contractAddress": "0xdac17f958d2ee523a2206206994597c13d831ec7",
                  "tokenBalance": null, "error": "execution reverted" },
                { "contractAddress": "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599" }
            ]
        });
        let tokens = parse_token_balances(&result).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].as_str(), "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    }

    #[test]
    fn test_parse_token_balances_requires_list() {
        assert!(parse_token_balances(&json!({ "address": "0xabc" })).is_err());
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("0x0102").unwrap(), vec![1, 2]);
        assert!(decode_hex("0x0").is_err());
    }
}
