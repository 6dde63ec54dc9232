//! Etherscan-style explorer API — transfer-history token discovery.
//!
//! Targets the V2 multichain API: every query names Ethereum mainnet with
//! `chainid=1`. The retired V1 endpoint answers `NOTOK` to everything.
//!
//! Discovery reads the most recent `window` ERC-20 transfers and unions the
//! contracts with a fixed list of high-liquidity tokens, so holdings whose
//! last transfer predates the window are still checked.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use folio_common::constants::WELL_KNOWN_TOKENS;
use folio_common::traits::BalanceProvider;
use folio_common::types::wei_to_native;
use folio_common::{Address, FolioError, FolioResult, TokenId};

/// Ethereum mainnet in the V2 `chainid` parameter.
pub const ETHEREUM_CHAIN_ID: &str = "1";

/// Explorer envelope: `{"status": "1", "message": "OK", "result": ...}`.
#[derive(Deserialize, Debug, Clone)]
pub struct ExplorerResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: Value,
}

pub struct EtherscanClient {
    http: Client,
    api_url: String,
    api_key: String,
    window: usize,
}

impl EtherscanClient {
    pub fn new(api_url: &str, api_key: &str, window: usize, timeout: Duration) -> FolioResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FolioError::Config(format!("Failed to build Etherscan HTTP client: {e}")))?;

        info!(window, "Etherscan client initialized");

        Ok(Self {
            http,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            window,
        })
    }

    async fn query(&self, params: &[(&str, &str)]) -> FolioResult<ExplorerResponse> {
        let resp = self
            .http
            .get(&self.api_url)
            .query(&common_params(&self.api_key))
            .query(params)
            .send()
            .await
            .map_err(|e| FolioError::Network(format!("Etherscan request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FolioError::upstream("etherscan", format!("HTTP {status}: {body}")));
        }

        resp.json()
            .await
            .map_err(|e| FolioError::Decode(format!("Etherscan response: {e}")))
    }

    /// Contracts from the most recent ERC-20 transfers, newest first.
    pub async fn recent_token_contracts(&self, wallet: &Address) -> FolioResult<Vec<TokenId>> {
        let offset = self.window.to_string();
        let resp = self
            .query(&[
                ("module", "account"),
                ("action", "tokentx"),
                ("address", wallet.as_str()),
                ("page", "1"),
                ("offset", offset.as_str()),
                ("sort", "desc"),
            ])
            .await?;
        parse_transfer_contracts(&resp)
    }

    /// Native balance in wei.
    pub async fn balance_wei(&self, wallet: &Address) -> FolioResult<u128> {
        let resp = self
            .query(&[
                ("module", "account"),
                ("action", "balance"),
                ("address", wallet.as_str()),
                ("tag", "latest"),
            ])
            .await?;
        parse_balance(&resp)
    }
}

#[async_trait]
impl BalanceProvider for EtherscanClient {
    fn name(&self) -> &'static str {
        "etherscan"
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
        match self.recent_token_contracts(wallet).await {
            Ok(recent) => with_well_known(recent),
            Err(e) => {
                error!(wallet = %wallet, "error getting held tokens: {e}");
                Vec::new()
            }
        }
    }
}

/// Parameters every explorer query carries.
pub fn common_params(api_key: &str) -> [(&'static str, &str); 2] {
    [("chainid", ETHEREUM_CHAIN_ID), ("apikey", api_key)]
}

/// Deduplicated `contractAddress` values, in response order. "No
/// transactions found" is an empty history, not an error.
pub fn parse_transfer_contracts(resp: &ExplorerResponse) -> FolioResult<Vec<TokenId>> {
    if resp.status != "1" {
        if resp.message.starts_with("No transactions found") {
            return Ok(Vec::new());
        }
        let detail = resp.result.as_str().unwrap_or_default();
        return Err(FolioError::upstream("etherscan", format!("{} {detail}", resp.message)));
    }

    let transfers = resp
        .result
        .as_array()
        .ok_or_else(|| FolioError::Decode("tokentx result is not an array".into()))?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tx in transfers {
        let Some(raw) = tx.get("contractAddress").and_then(Value::as_str) else {
            continue;
        };
        match TokenId::parse(raw) {
            Ok(token) => {
                if seen.insert(token.clone()) {
                    out.push(token);
                }
            }
            Err(_) => warn!(contract = raw, "skipping malformed contract address"),
        }
    }
    Ok(out)
}

pub fn parse_balance(resp: &ExplorerResponse) -> FolioResult<u128> {
    if resp.status != "1" {
        return Err(FolioError::upstream("etherscan", resp.message.clone()));
    }
    let raw = resp
        .result
        .as_str()
        .ok_or_else(|| FolioError::Decode("balance result is not a string".into()))?;
    raw.parse()
        .map_err(|e| FolioError::Decode(format!("balance '{raw}': {e}")))
}

/// Append the well-known tokens not already discovered.
pub fn with_well_known(mut tokens: Vec<TokenId>) -> Vec<TokenId> {
    let mut seen: HashSet<TokenId> = tokens.iter().cloned().collect();
    for (_, addr) in WELL_KNOWN_TOKENS {
        if let Ok(token) = TokenId::parse(addr) {
            if seen.insert(token.clone()) {
                tokens.push(token);
            }
        }
    }
    tokens
}
