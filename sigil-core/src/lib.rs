//! Sigil core library exports

pub mod anchor;
pub mod audit;
pub mod config;
pub mod engine;
pub mod signer;

#[cfg(feature = "publish")]
pub mod publisher;
