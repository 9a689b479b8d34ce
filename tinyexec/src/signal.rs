//! Cooperative abort signals.
//!
//! An [`AbortSignal`] is a cloneable cancellation source. Several sources
//! (a caller-supplied signal, a timeout) are folded into one effective signal
//! with [`AbortSignal::any`]: the first source to fire wins and its reason is
//! carried over.
//!
//! Listener tasks armed by [`AbortSignal::timeout`] and [`AbortSignal::any`]
//! live until they fire or the signal is released. The `_until` variants take
//! a release token so an owner can stop them once the signal is no longer
//! needed.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::future::select_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Why a signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Explicit abort requested by the caller.
    Aborted,
    /// A timeout expired.
    TimedOut,
}

/// A cloneable abort signal. All clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<AbortReason>>,
}

impl AbortSignal {
    /// Create a signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal with [`AbortReason::Aborted`].
    pub fn abort(&self) {
        self.abort_with(AbortReason::Aborted);
    }

    /// Fire the signal. Only the first reason is kept.
    pub fn abort_with(&self, reason: AbortReason) {
        if self.reason.set(reason).is_ok() {
            trace!(?reason, "abort signal fired");
        }
        self.token.cancel();
    }

    /// Returns `true` once the signal has fired.
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason the signal fired, if it has.
    pub fn reason(&self) -> Option<AbortReason> {
        self.reason.get().copied()
    }

    /// Wait until the signal fires and return its reason.
    pub async fn aborted(&self) -> AbortReason {
        self.token.cancelled().await;
        self.reason().unwrap_or(AbortReason::Aborted)
    }

    /// A signal that fires with [`AbortReason::TimedOut`] after `duration`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn timeout(duration: Duration) -> Self {
        Self::timeout_until(duration, CancellationToken::new())
    }

    /// Like [`AbortSignal::timeout`], but the timer task also stops once
    /// `release` is cancelled.
    pub fn timeout_until(duration: Duration, release: CancellationToken) -> Self {
        let signal = Self::new();
        let timer = signal.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(duration) => timer.abort_with(AbortReason::TimedOut),
                () = timer.token.cancelled() => {}
                () = release.cancelled() => trace!("timeout released"),
            }
        });
        signal
    }

    /// Combine several signals into one that fires on the first of them.
    ///
    /// If any input already fired, the result has fired too, with the same
    /// reason. Otherwise a listener task is armed on every input. Must be
    /// called from within a tokio runtime unless an input already fired.
    pub fn any(signals: &[Self]) -> Self {
        Self::any_until(signals, CancellationToken::new())
    }

    /// Like [`AbortSignal::any`], but the listener task also stops once
    /// `release` is cancelled.
    pub fn any_until(signals: &[Self], release: CancellationToken) -> Self {
        let combined = Self::new();

        if let Some(fired) = signals.iter().find(|signal| signal.is_aborted()) {
            combined.abort_with(fired.reason().unwrap_or(AbortReason::Aborted));
            return combined;
        }
        if signals.is_empty() {
            return combined;
        }

        let sources = signals.to_vec();
        let target = combined.clone();
        tokio::spawn(async move {
            let waits = sources.iter().map(|source| Box::pin(source.aborted()));
            tokio::select! {
                (reason, _, _) = select_all(waits) => target.abort_with(reason),
                () = target.token.cancelled() => {}
                () = release.cancelled() => trace!("abort listener released"),
            }
        });
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn abort_records_reason_once() {
        let signal = AbortSignal::new();
        assert!(!signal.is_aborted());
        signal.abort_with(AbortReason::TimedOut);
        signal.abort();
        assert!(signal.is_aborted());
        assert_eq!(signal.reason(), Some(AbortReason::TimedOut));
        assert_eq!(signal.aborted().await, AbortReason::TimedOut);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let signal = AbortSignal::new();
        let clone = signal.clone();
        clone.abort();
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn timeout_fires_with_timed_out() {
        let signal = AbortSignal::timeout(Duration::from_millis(10));
        let reason = tokio::time::timeout(Duration::from_secs(5), signal.aborted())
            .await
            .unwrap();
        assert_eq!(reason, AbortReason::TimedOut);
    }

    #[tokio::test]
    async fn any_propagates_already_fired_input() {
        let fired = AbortSignal::new();
        fired.abort();
        let combined = AbortSignal::any(&[AbortSignal::new(), fired]);
        assert!(combined.is_aborted());
        assert_eq!(combined.reason(), Some(AbortReason::Aborted));
    }

    #[tokio::test]
    async fn any_fires_on_first_input() {
        let first = AbortSignal::new();
        let second = AbortSignal::new();
        let combined = AbortSignal::any(&[first.clone(), second.clone()]);
        assert!(!combined.is_aborted());

        second.abort_with(AbortReason::TimedOut);
        let reason = tokio::time::timeout(Duration::from_secs(5), combined.aborted())
            .await
            .unwrap();
        assert_eq!(reason, AbortReason::TimedOut);
        assert!(!first.is_aborted());
    }

    #[tokio::test]
    async fn released_listeners_exit() {
        let metrics = tokio::runtime::Handle::current().metrics();
        let before = metrics.num_alive_tasks();

        let release = CancellationToken::new();
        let caller = AbortSignal::new();
        let timer = AbortSignal::timeout_until(Duration::from_secs(60), release.clone());
        let combined = AbortSignal::any_until(&[timer, caller.clone()], release.clone());
        assert_eq!(metrics.num_alive_tasks(), before + 2);

        release.cancel();
        tokio::time::timeout(Duration::from_secs(5), async {
            while metrics.num_alive_tasks() > before {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(!combined.is_aborted());
        assert!(!caller.is_aborted());
    }

    #[tokio::test]
    async fn any_of_nothing_never_fires() {
        let combined = AbortSignal::any(&[]);
        assert!(!combined.is_aborted());
    }
}
