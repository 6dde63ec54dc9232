//! Address validation and the normalized address newtypes.
//!
//! Every address that crosses a module boundary is lower-cased once, here.
//! Cache keys, discovery results and price maps all compare the normalized
//! form, so checksum casing from user input or upstream APIs never matters.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{ADDRESS_HEX_LEN, ADDRESS_PREFIX};
use crate::error::{FolioError, FolioResult};

/// Returns true for `0x` followed by exactly 40 hex characters, any case.
///
/// Never panics. Empty input and a bare prefix are rejected.
pub fn is_valid_address(address: &str) -> bool {
    let Some(payload) = address.strip_prefix(ADDRESS_PREFIX) else {
        return false;
    };
    payload.len() == ADDRESS_HEX_LEN && payload.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A wallet address, lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Validate and normalize. Accepts exactly what [`is_valid_address`]
    /// accepts; surrounding whitespace is an invalid address.
    pub fn parse(raw: &str) -> FolioResult<Self> {
        if !is_valid_address(raw) {
            return Err(FolioError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = FolioError;

    fn try_from(value: String) -> FolioResult<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

/// A token contract address, lower-cased.
///
/// Same representation as [`Address`] but a separate namespace: a wallet
/// can never be passed where a token is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(String);

impl TokenId {
    pub fn parse(raw: &str) -> FolioResult<Self> {
        Address::parse(raw).map(|a| Self(a.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TokenId {
    type Error = FolioError;

    fn try_from(value: String) -> FolioResult<Self> {
        Self::parse(&value)
    }
}

impl From<TokenId> for String {
    fn from(value: TokenId) -> Self {
        value.0
    }
}
