/*
[INPUT]:  Public API exports for binance-stream-tail crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod tail;

// Re-export main types for convenience
pub use config::{SubscriptionConfig, TailConfig};
pub use tail::{LineSink, Tail, stdout_sink};
