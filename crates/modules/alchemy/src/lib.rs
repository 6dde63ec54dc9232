pub mod client;
pub mod erc20;

pub use client::RpcClient;
pub use erc20::Erc20Resolver;
