//! Unified output rendering: JSON or human-readable table.
//!
//! Usage:
//! ```ignore
//! use folio_utils::output::{OutputFormat, render};
//!
//! let data = StatusOutput { ... };
//! render(format, &data)?;
//! ```

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use folio_common::constants::NATIVE_SYMBOL;
use folio_common::types::Portfolio;

use crate::format::*;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table (default).
    Table,
    /// Compact JSON (for piping to jq, scripts).
    Json,
    /// Pretty-printed JSON (for reading).
    JsonPretty,
}

/// Trait for types that can render as a human-readable table.
///
/// Implement this on each structured output type to define
/// how it looks in table mode.
pub trait TableDisplay {
    fn print_table(&self);
}

/// Render structured output — JSON or table depending on format.
///
/// For JSON formats, uses `serde_json` serialization.
/// For table format, calls `TableDisplay::print_table()`.
pub fn render<T: Serialize + TableDisplay>(format: OutputFormat, data: &T) -> Result<()> {
    match format {
        OutputFormat::Table => {
            data.print_table();
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string(data)?;
            println!("{json}");
            Ok(())
        }
        OutputFormat::JsonPretty => {
            let json = serde_json::to_string_pretty(data)?;
            println!("{json}");
            Ok(())
        }
    }
}

// ─── Output types ───────────────────────────────────────────────────

/// `folio portfolio` — the full snapshot; `top` only limits the table.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioOutput {
    #[serde(flatten)]
    pub portfolio: Portfolio,
    #[serde(skip)]
    pub top: Option<usize>,
}

/// `folio status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusOutput {
    pub providers: BTreeMap<String, bool>,
    pub discovery: String,
    pub price_provider: String,
}

/// `folio validate`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidateOutput {
    pub address: String,
    pub valid: bool,
    pub normalized: Option<String>,
}

/// `folio cache show`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheOutput {
    pub path: String,
    pub ttl_secs: u64,
    pub entries: Vec<CacheRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheRow {
    pub token: String,
    pub price: f64,
    pub change_24h: Option<f64>,
    pub source: String,
    pub observed_at: f64,
    pub age_secs: f64,
}

/// `folio cache clear`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheClearOutput {
    pub path: String,
    pub cleared: usize,
}

// ─── TableDisplay implementations ───────────────────────────────────

impl TableDisplay for PortfolioOutput {
    fn print_table(&self) {
        let p = &self.portfolio;
        println!("╔══════════════════════════════════════════════════════════╗");
        println!("║  PORTFOLIO                                               ║");
        println!("╠══════════════════════════════════════════════════════════╣");
        println!("║  Wallet      : {:<42}║", p.wallet);
        println!("║  Total Value : {:<42}║", format_usd(p.total_value));
        println!("║  {:<3} Balance : {:<42}║", NATIVE_SYMBOL, format_amount(p.native_balance));
        println!(
            "║  {:<3} Price   : {:<42}║",
            NATIVE_SYMBOL,
            format!("{} ({})", format_price(p.native_price), format_change(p.native_change_24h))
        );
        println!("║  {:<3} Value   : {:<42}║", NATIVE_SYMBOL, format_usd(p.native_value));
        println!("║  Tokens      : {:<42}║", format_usd(p.token_value()));
        println!("╚══════════════════════════════════════════════════════════╝");

        if p.holdings.is_empty() {
            println!("No token holdings.");
            return;
        }

        let shown = self.top.unwrap_or(p.holdings.len()).min(p.holdings.len());
        println!("┌──────────┬──────────────────┬──────────────┬──────────┬──────────────┐");
        println!("│ Token    │ Balance          │ Price        │ 24h      │ Value        │");
        println!("├──────────┼──────────────────┼──────────────┼──────────┼──────────────┤");
        for h in &p.holdings[..shown] {
            println!(
                "│ {:<8} │ {:>16} │ {:>12} │ {:>8} │ {:>12} │",
                truncate(&h.symbol, 8),
                format_amount(h.balance),
                format_price(h.price.price),
                format_change(h.price.change_24h),
                format_usd(h.value_usd),
            );
        }
        println!("└──────────┴──────────────────┴──────────────┴──────────┴──────────────┘");
        if shown < p.holdings.len() {
            println!("Showing top {shown} of {} holdings", p.holdings.len());
        }
        println!("Generated {}", p.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

impl TableDisplay for StatusOutput {
    fn print_table(&self) {
        println!("Discovery      : {}", self.discovery);
        println!("Price provider : {}", self.price_provider);
        println!("┌──────────────┬────────────┐");
        println!("│ Provider     │ Configured │");
        println!("├──────────────┼────────────┤");
        for (name, ok) in &self.providers {
            println!("│ {:<12} │ {:^10} │", name, if *ok { "✓" } else { "✗" });
        }
        println!("└──────────────┴────────────┘");
    }
}

impl TableDisplay for ValidateOutput {
    fn print_table(&self) {
        match (&self.normalized, self.valid) {
            (Some(n), true) => println!("✓ Valid address ({n})"),
            _ => println!("✗ Invalid address: {}", self.address),
        }
    }
}

impl TableDisplay for CacheOutput {
    fn print_table(&self) {
        println!("Cache: {} (TTL {})", self.path, format_age(self.ttl_secs as f64));
        if self.entries.is_empty() {
            println!("No cached prices.");
            return;
        }

        println!("┌──────────────┬──────────────┬──────────┬───────────┬─────────────────────┬──────────┐");
        println!("│ Token        │ Price        │ 24h      │ Source    │ Observed            │ Age      │");
        println!("├──────────────┼──────────────┼──────────┼───────────┼─────────────────────┼──────────┤");
        for e in &self.entries {
            println!(
                "│ {:<12} │ {:>12} │ {:>8} │ {:<9} │ {:>19} │ {:>8} │",
                short_address(&e.token),
                format_price(e.price),
                format_change(e.change_24h),
                e.source,
                format_unix_secs(e.observed_at),
                format_age(e.age_secs),
            );
        }
        println!("└──────────────┴──────────────┴──────────┴───────────┴─────────────────────┴──────────┘");
        println!("Total: {} entries", self.entries.len());
    }
}

impl TableDisplay for CacheClearOutput {
    fn print_table(&self) {
        println!("✓ Cleared {} cached prices ({})", self.cleared, self.path);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max - 1).collect();
        out.push('…');
        out
    }
}
