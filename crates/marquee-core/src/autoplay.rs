//! Autoplay capability probe
//!
//! Before committing to autostart the player plays a synthetic test element.
//! Probes are memoized per key so that concurrent callers share one attempt.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::config::DEFAULT_AUTOPLAY_TIMEOUT_MS;
use crate::error::{Error, Result};
use crate::pool::{MediaElement, MediaPool};

/// Plays a test element to find out whether the runtime allows it
#[async_trait]
pub trait AutoplayTester: Send + Sync {
    async fn try_play(&self, element: &MediaElement, muted: bool) -> Result<()>;
}

/// Why autoplay is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledReason {
    /// The runtime refused playback
    Blocked,
    /// The test element never settled
    Timeout,
}

impl std::fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisabledReason::Blocked => write!(f, "autoplayDisabled"),
            DisabledReason::Timeout => write!(f, "autoplayTimeout"),
        }
    }
}

/// Result of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoplayOutcome {
    /// Unmuted autoplay works
    Enabled,
    /// Only muted autoplay works
    MutedRequired,
    Disabled(DisabledReason),
}

/// Probe parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoplayOptions {
    /// Test muted playback only
    pub muted: bool,
    /// Retry muted when unmuted playback is refused
    pub allow_muted: bool,
    pub timeout: Duration,
}

impl Default for AutoplayOptions {
    fn default() -> Self {
        Self {
            muted: false,
            allow_muted: false,
            timeout: Duration::from_millis(DEFAULT_AUTOPLAY_TIMEOUT_MS),
        }
    }
}

impl AutoplayOptions {
    /// Memo key: `"muted"` when muted, otherwise the allow-muted flag
    pub fn memo_key(&self) -> String {
        if self.muted {
            "muted".to_string()
        } else {
            self.allow_muted.to_string()
        }
    }
}

type ProbeFuture = Shared<BoxFuture<'static, AutoplayOutcome>>;

struct Memo {
    generation: u64,
    probe: ProbeFuture,
}

type MemoMap = Arc<Mutex<HashMap<String, Memo>>>;

/// Memoizing autoplay probe
pub struct AutoplayProbe {
    tester: Arc<dyn AutoplayTester>,
    pool: Arc<MediaPool>,
    memo: MemoMap,
    generation: AtomicU64,
}

impl AutoplayProbe {
    pub fn new(tester: Arc<dyn AutoplayTester>, pool: Arc<MediaPool>) -> Self {
        Self {
            tester,
            pool,
            memo: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Probe autoplay, sharing an in-flight or successful probe with the same key.
    ///
    /// Resolves to [`Error::AutoplayCancelled`] once `cancel` fires, whatever
    /// the probe's outcome.
    pub async fn test(&self, options: AutoplayOptions, cancel: &CancelToken) -> Result<AutoplayOutcome> {
        let key = options.memo_key();
        let probe = {
            let mut memo = self.memo.lock();
            match memo.get(&key) {
                Some(entry) => entry.probe.clone(),
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let probe = self.start_probe(key.clone(), generation, options, cancel.clone());
                    memo.insert(
                        key.clone(),
                        Memo {
                            generation,
                            probe: probe.clone(),
                        },
                    );
                    probe
                }
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::AutoplayCancelled),
            outcome = probe => outcome,
        };
        if cancel.is_cancelled() {
            return Err(Error::AutoplayCancelled);
        }
        debug!(key = %key, ?outcome, "Autoplay probe settled");
        Ok(outcome)
    }

    /// Drop every memoized result
    pub fn clear(&self) {
        self.memo.lock().clear();
    }

    fn start_probe(
        &self,
        key: String,
        generation: u64,
        options: AutoplayOptions,
        first_caller: CancelToken,
    ) -> ProbeFuture {
        let tester = self.tester.clone();
        let element = self.pool.test_element();
        let memo = self.memo.clone();

        async move {
            let attempt = probe_playback(tester, element, options, first_caller);
            let outcome = match tokio::time::timeout(options.timeout, attempt).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    info!(timeout_ms = options.timeout.as_millis() as u64, "Autoplay probe timed out");
                    AutoplayOutcome::Disabled(DisabledReason::Timeout)
                }
            };
            if outcome != AutoplayOutcome::Enabled {
                let mut memo = memo.lock();
                if memo.get(&key).map(|m| m.generation) == Some(generation) {
                    memo.remove(&key);
                }
            }
            outcome
        }
        .boxed()
        .shared()
    }
}

async fn probe_playback(
    tester: Arc<dyn AutoplayTester>,
    element: Arc<MediaElement>,
    options: AutoplayOptions,
    first_caller: CancelToken,
) -> AutoplayOutcome {
    element.set_muted(options.muted);
    match tester.try_play(&element, options.muted).await {
        Ok(()) if options.muted => AutoplayOutcome::MutedRequired,
        Ok(()) => AutoplayOutcome::Enabled,
        Err(e) => {
            debug!(error = %e, muted = options.muted, "Autoplay test refused");
            if first_caller.is_cancelled() || options.muted || !options.allow_muted {
                return AutoplayOutcome::Disabled(DisabledReason::Blocked);
            }
            element.set_muted(true);
            match tester.try_play(&element, true).await {
                Ok(()) => AutoplayOutcome::MutedRequired,
                Err(_) => AutoplayOutcome::Disabled(DisabledReason::Blocked),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{AutoplayBehavior, SimulatedAutoplayTester};

    fn probe(behavior: AutoplayBehavior) -> (AutoplayProbe, Arc<SimulatedAutoplayTester>) {
        let tester = Arc::new(SimulatedAutoplayTester::new(behavior));
        let probe = AutoplayProbe::new(tester.clone(), Arc::new(MediaPool::new(1)));
        (probe, tester)
    }

    fn allow_muted() -> AutoplayOptions {
        AutoplayOptions {
            allow_muted: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_memo_keys() {
        let muted = AutoplayOptions {
            muted: true,
            allow_muted: true,
            ..Default::default()
        };
        assert_eq!(muted.memo_key(), "muted");
        assert_eq!(allow_muted().memo_key(), "true");
        assert_eq!(AutoplayOptions::default().memo_key(), "false");
    }

    #[tokio::test]
    async fn test_enabled_is_memoized() {
        let (probe, tester) = probe(AutoplayBehavior::Allow);
        let token = CancelToken::new();
        assert_eq!(probe.test(allow_muted(), &token).await, Ok(AutoplayOutcome::Enabled));
        assert_eq!(probe.test(allow_muted(), &token).await, Ok(AutoplayOutcome::Enabled));
        assert_eq!(tester.attempts(), 1);
    }

    #[tokio::test]
    async fn test_muted_fallback_not_memoized() {
        let (probe, tester) = probe(AutoplayBehavior::MutedOnly);
        let token = CancelToken::new();
        assert_eq!(
            probe.test(allow_muted(), &token).await,
            Ok(AutoplayOutcome::MutedRequired)
        );
        assert_eq!(tester.attempts(), 2);
        probe.test(allow_muted(), &token).await.unwrap();
        assert_eq!(tester.attempts(), 4);
    }

    #[tokio::test]
    async fn test_no_muted_retry_without_permission() {
        let (probe, tester) = probe(AutoplayBehavior::MutedOnly);
        let outcome = probe.test(AutoplayOptions::default(), &CancelToken::new()).await;
        assert_eq!(outcome, Ok(AutoplayOutcome::Disabled(DisabledReason::Blocked)));
        assert_eq!(tester.attempts(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_probes_share_attempt() {
        let (probe, tester) = probe(AutoplayBehavior::Allow);
        tester.set_delay(Duration::from_millis(20));
        let (a, b) = (CancelToken::new(), CancelToken::new());
        let (ra, rb) = tokio::join!(probe.test(allow_muted(), &a), probe.test(allow_muted(), &b));
        assert_eq!(ra, Ok(AutoplayOutcome::Enabled));
        assert_eq!(rb, Ok(AutoplayOutcome::Enabled));
        assert_eq!(tester.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_disables() {
        let (probe, tester) = probe(AutoplayBehavior::Hang);
        let options = AutoplayOptions {
            timeout: Duration::from_millis(500),
            ..allow_muted()
        };
        let outcome = probe.test(options, &CancelToken::new()).await;
        assert_eq!(outcome, Ok(AutoplayOutcome::Disabled(DisabledReason::Timeout)));

        tester.set_behavior(AutoplayBehavior::Allow);
        let outcome = probe.test(options, &CancelToken::new()).await;
        assert_eq!(outcome, Ok(AutoplayOutcome::Enabled));
    }

    #[tokio::test]
    async fn test_cancelled_caller_gets_error() {
        let (probe, tester) = probe(AutoplayBehavior::Allow);
        tester.set_delay(Duration::from_millis(20));
        let cancelled = CancelToken::new();
        let live = CancelToken::new();
        let cancel = cancelled.clone();

        let (ra, rb, _) = tokio::join!(
            probe.test(allow_muted(), &cancelled),
            probe.test(allow_muted(), &live),
            async move { cancel.cancel() }
        );
        assert_eq!(ra, Err(Error::AutoplayCancelled));
        assert_eq!(rb, Ok(AutoplayOutcome::Enabled));
    }

    #[tokio::test]
    async fn test_cancelled_first_caller_suppresses_muted_retry() {
        let (probe, tester) = probe(AutoplayBehavior::MutedOnly);
        tester.set_delay(Duration::from_millis(20));
        let first = CancelToken::new();
        let live = CancelToken::new();
        let cancel = first.clone();

        let (_, rb, _) = tokio::join!(
            probe.test(allow_muted(), &first),
            probe.test(allow_muted(), &live),
            async move { cancel.cancel() }
        );
        assert_eq!(rb, Ok(AutoplayOutcome::Disabled(DisabledReason::Blocked)));
        assert_eq!(tester.attempts(), 1);
    }
}
