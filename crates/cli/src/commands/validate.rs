use anyhow::Result;
use folio_common::Address;
use folio_utils::output::{render, OutputFormat, ValidateOutput};

/// `folio validate <ADDRESS>` — syntax check only, no network.
pub fn run(address: &str, fmt: OutputFormat) -> Result<()> {
    let normalized = Address::parse(address).ok().map(|a| a.to_string());
    let output = ValidateOutput {
        address: address.to_string(),
        valid: normalized.is_some(),
        normalized,
    };
    render(fmt, &output)
}
