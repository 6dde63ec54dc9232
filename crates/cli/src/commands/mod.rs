pub mod cache;
pub mod portfolio;
pub mod status;
pub mod validate;
