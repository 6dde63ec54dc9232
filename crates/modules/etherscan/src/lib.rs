pub mod client;

pub use client::EtherscanClient;
