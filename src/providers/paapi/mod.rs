//! Tier 1: Product Advertising API 5 `GetItems`.

pub mod provider;
pub mod signer;

pub use provider::PaApiProvider;
