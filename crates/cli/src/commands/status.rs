use anyhow::Result;
use folio_core::config::{env_lookup, provider_status_from_lookup, FolioConfig};
use folio_utils::output::{render, OutputFormat, StatusOutput};
use tracing::warn;

/// `folio status` — which providers are configured.
///
/// Still reports when the full config does not load, so the user can see
/// which key is missing.
pub fn run(fmt: OutputFormat) -> Result<()> {
    let output = match FolioConfig::from_env() {
        Ok(config) => StatusOutput {
            providers: config.provider_status(),
            discovery: format!("{:?}", config.discovery).to_lowercase(),
            price_provider: format!("{:?}", config.price_backend).to_lowercase(),
        },
        Err(e) => {
            warn!("configuration incomplete: {e}");
            StatusOutput {
                providers: provider_status_from_lookup(env_lookup),
                discovery: "unconfigured".into(),
                price_provider: "unconfigured".into(),
            }
        }
    };
    render(fmt, &output)
}
