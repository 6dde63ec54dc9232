//! ERC-20 metadata resolver over `eth_call`.
//!
//! `balanceOf`, `decimals`, `symbol` and `name` are read concurrently and
//! each one falls back on its own, so a contract that reverts on `name()`
//! still reports its balance.

use std::sync::Arc;

use alloy::primitives::{Address as EvmAddress, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tracing::{debug, warn};

use folio_common::constants::{DEFAULT_TOKEN_DECIMALS, UNKNOWN_NAME, UNKNOWN_SYMBOL};
use folio_common::traits::TokenMetadataResolver;
use folio_common::types::{Field, TokenMetadata};
use folio_common::{Address, FolioError, FolioResult, TokenId};

use crate::client::RpcClient;

sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function name() external view returns (string);
    }
}

pub struct Erc20Resolver {
    rpc: Arc<RpcClient>,
}

impl Erc20Resolver {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }

    pub async fn balance_of(&self, wallet: &Address, token: &TokenId) -> FolioResult<u128> {
        let owner: EvmAddress = wallet
            .as_str()
            .parse()
            .map_err(|e| FolioError::InvalidAddress(format!("{wallet}: {e}")))?;
        let data = self
            .rpc
            .eth_call(token, &IERC20::balanceOfCall { owner }.abi_encode())
            .await?;
        let raw = IERC20::balanceOfCall::abi_decode_returns(&data).map_err(abi_err("balanceOf"))?;
        Ok(saturating_balance(token, raw))
    }

    pub async fn decimals(&self, token: &TokenId) -> FolioResult<u8> {
        let data = self.rpc.eth_call(token, &IERC20::decimalsCall {}.abi_encode()).await?;
        IERC20::decimalsCall::abi_decode_returns(&data).map_err(abi_err("decimals"))
    }

    pub async fn symbol(&self, token: &TokenId) -> FolioResult<String> {
        let data = self.rpc.eth_call(token, &IERC20::symbolCall {}.abi_encode()).await?;
        text_or_bytes32(IERC20::symbolCall::abi_decode_returns(&data).ok(), &data, "symbol")
    }

    pub async fn name(&self, token: &TokenId) -> FolioResult<String> {
        let data = self.rpc.eth_call(token, &IERC20::nameCall {}.abi_encode()).await?;
        text_or_bytes32(IERC20::nameCall::abi_decode_returns(&data).ok(), &data, "name")
    }
}

#[async_trait]
impl TokenMetadataResolver for Erc20Resolver {
    async fn resolve(&self, wallet: &Address, token: &TokenId) -> TokenMetadata {
        let (balance, decimals, symbol, name) = futures::join!(
            self.balance_of(wallet, token),
            self.decimals(token),
            self.symbol(token),
            self.name(token),
        );
        let meta = assemble_metadata(token, balance, decimals, symbol, name);
        if meta.is_fully_degraded() {
            warn!(token = %token, "no ERC-20 field could be read");
        }
        meta
    }
}

/// Clamp a `balanceOf` word into `u128`. Anything larger is still a
/// positive holding, so it saturates instead of reading as zero.
pub fn saturating_balance(token: &TokenId, raw: U256) -> u128 {
    u128::try_from(raw).unwrap_or_else(|_| {
        warn!(token = %token, "balanceOf {raw} overflows u128, saturating");
        u128::MAX
    })
}

fn abi_err(call: &'static str) -> impl Fn(alloy::sol_types::Error) -> FolioError {
    move |e| FolioError::Decode(format!("{call}(): {e}"))
}

/// ABI string, or a NUL-padded `bytes32` from older contracts (MKR, SAI).
pub fn text_or_bytes32(decoded: Option<String>, data: &[u8], call: &str) -> FolioResult<String> {
    let text = match decoded {
        Some(s) => s,
        None if data.len() == 32 => {
            let end = data.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            String::from_utf8(data[..end].to_vec())
                .map_err(|_| FolioError::Decode(format!("{call}(): bytes32 is not UTF-8")))?
        }
        None => return Err(FolioError::Decode(format!("{call}(): undecodable return data"))),
    };
    let text = text.trim_matches(char::from(0)).trim().to_string();
    if text.is_empty() {
        return Err(FolioError::Decode(format!("{call}(): empty")));
    }
    Ok(text)
}

/// Merge the four independent reads, applying per-field defaults. The name
/// falls back to the symbol when only the symbol could be read.
pub fn assemble_metadata(
    token: &TokenId,
    balance: FolioResult<u128>,
    decimals: FolioResult<u8>,
    symbol: FolioResult<String>,
    name: FolioResult<String>,
) -> TokenMetadata {
    for (field, err) in [
        ("balance", balance.as_ref().err()),
        ("decimals", decimals.as_ref().err()),
        ("symbol", symbol.as_ref().err()),
        ("name", name.as_ref().err()),
    ] {
        if let Some(e) = err {
            debug!(token = %token, field, "falling back: {e}");
        }
    }

    let name = match (name, &symbol) {
        (Ok(n), _) => Field::Found(n),
        (Err(_), Ok(s)) => Field::Fallback(s.clone()),
        (Err(_), Err(_)) => Field::Fallback(UNKNOWN_NAME.to_string()),
    };

    TokenMetadata {
        token: token.clone(),
        symbol: Field::from_result(symbol, UNKNOWN_SYMBOL.to_string()),
        name,
        decimals: Field::from_result(decimals, DEFAULT_TOKEN_DECIMALS),
        raw_balance: Field::from_result(balance, 0),
    }
}
