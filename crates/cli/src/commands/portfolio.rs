use anyhow::{bail, Result};
use folio_common::is_valid_address;
use folio_utils::output::{render, OutputFormat, PortfolioOutput};

use crate::factory;

/// `folio portfolio <ADDRESS>` — aggregate and print one wallet.
pub async fn run(address: &str, top: Option<usize>, fmt: OutputFormat) -> Result<()> {
    if !is_valid_address(address) {
        bail!("Invalid Ethereum address: {address}");
    }

    let service = factory::from_env()?;
    let portfolio = service.get_portfolio(address).await;
    render(fmt, &PortfolioOutput { portfolio, top })
}
