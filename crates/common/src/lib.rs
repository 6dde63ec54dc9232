pub mod address;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

pub use address::{is_valid_address, Address, TokenId};
pub use error::{FolioError, FolioResult};
