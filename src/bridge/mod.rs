//! The translation bridge.
//!
//! Chat events enter through [`orchestrator::FanoutRouter`], are filtered,
//! translated once per target language via [`cache::TranslationCache`] and
//! delivered in order per destination by [`gate::DeliveryGate`].

pub mod admin;
pub mod announce;
pub mod audience;
pub mod cache;
pub mod channels;
pub mod context;
pub mod emoji;
pub mod engine;
pub mod filter;
pub mod formatter;
pub mod gate;
pub mod orchestrator;
pub mod preferences;
pub mod sink;

#[cfg(test)]
pub mod testing;

pub use context::BridgeContext;
pub use orchestrator::{FanoutReport, FanoutRouter};
