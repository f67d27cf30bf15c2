/*
[INPUT]:  Consecutive failed attempt count
[OUTPUT]: Delay before the next connection attempt
[POS]:    WebSocket layer - reconnect pacing (never gives up)
[UPDATE]: When changing reconnect pacing
*/

use std::time::Duration;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Delay applied between a disconnect and the next connection attempt.
///
/// Neither variant has a retry ceiling: a channel reconnects until it is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay after every disconnect
    Fixed(Duration),
    /// Doubling delay starting at `initial`, clamped at `max`
    Exponential { initial: Duration, max: Duration },
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (1-based, reset after each successful connect)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            ReconnectPolicy::Fixed(delay) => delay,
            ReconnectPolicy::Exponential { initial, max } => {
                let exp = attempt.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << exp).min(max)
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}
