use std::time::Duration;

use rand::Rng;
use typed_builder::TypedBuilder;

/// How the fetch adapter resolves a descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Opens (or reuses) a live subscription and resolves with its latest value.
    #[default]
    Subscribe,
    /// Resolves with a one-shot call, without opening a subscription.
    ///
    /// Entries fetched this way do not receive pushes.
    Call,
}

/// Reconnection backoff of a backend channel.
///
/// # Example
///
/// ```
/// # use std::time::Duration;
/// # use liveline_bridge::BackoffOptions;
/// let backoff = BackoffOptions::builder()
///     .initial(Duration::from_millis(50))
///     .max_retries(Some(5))
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct BackoffOptions {
    /// The delay before the first reconnection attempt.
    #[builder(default = Duration::from_millis(100))]
    pub initial: Duration,
    /// The upper bound of a delay.
    #[builder(default = Duration::from_secs(10))]
    pub max: Duration,
    /// The factor applied to the delay after each failed attempt.
    #[builder(default = 2)]
    pub multiplier: u32,
    /// The number of attempts before giving up, `None` retries forever.
    #[builder(default)]
    pub max_retries: Option<u32>,
    /// Randomizes each delay between half of it and all of it.
    #[builder(default = true)]
    pub jitter: bool,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BackoffOptions {
    /// Returns the delay before reconnection attempt `attempt`, starting from 0.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt);
        let delay = self.initial.saturating_mul(factor).min(self.max);

        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
    }

    /// Returns `true` if another attempt is allowed after `attempt` failed attempts.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_retries.map_or(true, |m| attempt < m)
    }
}

/// Options of a [`SubscriptionBridge`](crate::SubscriptionBridge).
///
/// # Example
///
/// ```
/// # use std::time::Duration;
/// # use liveline_bridge::{BridgeOptions, FetchMode};
/// let options = BridgeOptions::builder()
///     .grace_period(Duration::from_secs(1))
///     .fetch_mode(FetchMode::Subscribe)
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct BridgeOptions {
    /// How long an unused subscription stays open before its channel is closed.
    ///
    /// A reader that appears during this period reuses the subscription.
    #[builder(default = Duration::from_secs(5))]
    pub grace_period: Duration,
    /// How descriptors are fetched.
    #[builder(default)]
    pub fetch_mode: FetchMode,
    /// Reconnection backoff of subscriptions.
    #[builder(default)]
    pub backoff: BackoffOptions,
    /// The number of times a one-shot call is retried after a disconnect.
    #[builder(default = 3)]
    pub call_retries: u32,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_is_capped() {
        let backoff = BackoffOptions::builder()
            .initial(Duration::from_millis(100))
            .max(Duration::from_millis(1000))
            .jitter(false)
            .build();

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_millis(1000));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let backoff = BackoffOptions::default();

        for attempt in 0..8 {
            let bound = BackoffOptions {
                jitter: false,
                ..backoff.clone()
            }
            .delay(attempt);
            let delay = backoff.delay(attempt);

            assert!(delay <= bound);
            assert!(delay >= bound / 2);
        }
    }

    #[test]
    fn retries_are_bounded() {
        let forever = BackoffOptions::default();
        assert!(forever.allows(u32::MAX - 1));

        let bounded = BackoffOptions::builder().max_retries(Some(2)).build();
        assert!(bounded.allows(1));
        assert!(!bounded.allows(2));
    }
}
