//! Condition waits with increasing poll intervals.
//!
//! Every suspension in a flow goes through the [`Waiter`]: a predicate is
//! re-evaluated on an increasing interval sequence until it holds or the
//! timeout elapses. Fixed delays are never a substitute for a condition
//! check; the one exception is the named [`Waiter::settle`] wait for
//! animation-only transitions with no observable completion signal.
//!
//! - **Jidoka**: a timeout carries the last observed value, so a flaky
//!   wait is diagnosable after the fact
//! - **Muda**: the increasing interval sequence bounds total poll count
//!   while keeping fast transitions fast

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::driver::{ElementHandle, PageDriver};
use crate::locator::Strategy;
use crate::result::{TenazError, TenazResult};

/// Default overall wait timeout (30 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Default increasing interval sequence (1s, 2s, 3s, 5s; last repeats)
pub const DEFAULT_INTERVALS_MS: [u64; 4] = [1_000, 2_000, 3_000, 5_000];

/// Options for a wait: overall timeout plus the poll interval sequence
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Overall timeout
    pub timeout: Duration,
    /// Increasing poll intervals; the last entry repeats once exhausted
    pub intervals: Vec<Duration>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            intervals: DEFAULT_INTERVALS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        }
    }
}

impl WaitOptions {
    /// Create options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the overall timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the interval sequence
    #[must_use]
    pub fn with_intervals(mut self, intervals: Vec<Duration>) -> Self {
        self.intervals = intervals;
        self
    }

    /// The poll interval for the given tick number.
    ///
    /// Clamps to the last declared interval; an empty sequence falls back
    /// to one second.
    #[must_use]
    pub fn interval_at(&self, tick: usize) -> Duration {
        self.intervals
            .get(tick)
            .or_else(|| self.intervals.last())
            .copied()
            .unwrap_or(Duration::from_secs(1))
    }
}

/// One evaluation of a wait predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The condition holds
    Satisfied,
    /// The condition does not hold; carries what was actually observed
    Unsatisfied(String),
}

impl Observation {
    /// Build an observation from a boolean plus a description of what was
    /// seen
    #[must_use]
    pub fn from_check(satisfied: bool, seen: impl Into<String>) -> Self {
        if satisfied {
            Self::Satisfied
        } else {
            Self::Unsatisfied(seen.into())
        }
    }
}

/// Polls predicates against the live page until they hold, time out, or
/// the page goes away
pub struct Waiter {
    driver: Arc<dyn PageDriver>,
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter").finish_non_exhaustive()
    }
}

impl Waiter {
    /// Create a waiter over a driver
    #[must_use]
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self { driver }
    }

    /// Poll `probe` until it reports [`Observation::Satisfied`].
    ///
    /// The predicate is stateless from the waiter's point of view and is
    /// re-evaluated in full on every tick. Between ticks the waiter
    /// suspends cooperatively and races the driver's close signal, so a
    /// teardown mid-wait surfaces as `Cancelled`, never as a stale
    /// success or a masked not-found.
    ///
    /// # Errors
    ///
    /// `Timeout` (carrying the last observed value) once `options.timeout`
    /// has elapsed without the condition holding; `Cancelled` if the page
    /// closes mid-wait; any error the probe itself returns.
    pub async fn wait_until<F, Fut>(
        &self,
        condition: &str,
        options: &WaitOptions,
        mut probe: F,
    ) -> TenazResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TenazResult<Observation>>,
    {
        let start = tokio::time::Instant::now();
        let mut closed = self.driver.closed_signal();
        let mut tick = 0usize;
        let mut last_observed = String::from("<not yet observed>");

        loop {
            if self.driver.is_closed() {
                return Err(TenazError::Cancelled {
                    during: format!("waiting for '{condition}'"),
                });
            }

            match probe().await? {
                Observation::Satisfied => {
                    tracing::debug!(
                        condition,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "condition met"
                    );
                    return Ok(());
                }
                Observation::Unsatisfied(seen) => last_observed = seen,
            }

            let elapsed = start.elapsed();
            if elapsed >= options.timeout {
                return Err(TenazError::Timeout {
                    condition: condition.to_string(),
                    waited_ms: elapsed.as_millis() as u64,
                    last_observed,
                });
            }

            let delay = options.interval_at(tick).min(options.timeout - elapsed);
            tick += 1;

            tokio::select! {
                changed = closed.wait_for(|c| *c) => {
                    // A dropped sender also means the page is gone.
                    let _ = changed;
                    return Err(TenazError::Cancelled {
                        during: format!("waiting for '{condition}'"),
                    });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Wait until a strategy matches at least one visible element
    pub async fn wait_visible(
        &self,
        strategy: &Strategy,
        options: &WaitOptions,
    ) -> TenazResult<()> {
        let driver = Arc::clone(&self.driver);
        let strategy = strategy.clone();
        self.wait_until(
            &format!("{strategy} visible"),
            options,
            move || {
                let driver = Arc::clone(&driver);
                let strategy = strategy.clone();
                async move {
                    let visible = visible_matches(&driver, &strategy).await?;
                    Ok(Observation::from_check(
                        !visible.is_empty(),
                        format!("visible={}", visible.len()),
                    ))
                }
            },
        )
        .await
    }

    /// Wait until a strategy matches no visible element
    pub async fn wait_hidden(
        &self,
        strategy: &Strategy,
        options: &WaitOptions,
    ) -> TenazResult<()> {
        let driver = Arc::clone(&self.driver);
        let strategy = strategy.clone();
        self.wait_until(
            &format!("{strategy} hidden"),
            options,
            move || {
                let driver = Arc::clone(&driver);
                let strategy = strategy.clone();
                async move {
                    let visible = visible_matches(&driver, &strategy).await?;
                    Ok(Observation::from_check(
                        visible.is_empty(),
                        format!("still visible={}", visible.len()),
                    ))
                }
            },
        )
        .await
    }

    /// Wait until some visible match of a strategy contains the given text
    pub async fn wait_text(
        &self,
        strategy: &Strategy,
        needle: &str,
        options: &WaitOptions,
    ) -> TenazResult<()> {
        let driver = Arc::clone(&self.driver);
        let strategy = strategy.clone();
        let needle = needle.to_string();
        self.wait_until(
            &format!("{strategy} contains '{needle}'"),
            options,
            move || {
                let driver = Arc::clone(&driver);
                let strategy = strategy.clone();
                let needle = needle.clone();
                async move {
                    let visible = visible_matches(&driver, &strategy).await?;
                    let hit = visible.iter().any(|h| h.text.contains(&needle));
                    let seen = visible
                        .first()
                        .map_or_else(|| "<no match>".to_string(), |h| h.text.clone());
                    Ok(Observation::from_check(hit, seen))
                }
            },
        )
        .await
    }

    /// Wait until a strategy's visible match count reaches a threshold
    pub async fn wait_count_at_least(
        &self,
        strategy: &Strategy,
        minimum: usize,
        options: &WaitOptions,
    ) -> TenazResult<()> {
        let driver = Arc::clone(&self.driver);
        let strategy = strategy.clone();
        self.wait_until(
            &format!("count({strategy}) >= {minimum}"),
            options,
            move || {
                let driver = Arc::clone(&driver);
                let strategy = strategy.clone();
                async move {
                    let count = visible_matches(&driver, &strategy).await?.len();
                    Ok(Observation::from_check(
                        count >= minimum,
                        format!("count={count}"),
                    ))
                }
            },
        )
        .await
    }

    /// Wait until the current URL matches a pattern
    pub async fn wait_url_matches(
        &self,
        pattern: &Regex,
        options: &WaitOptions,
    ) -> TenazResult<()> {
        let driver = Arc::clone(&self.driver);
        let pattern = pattern.clone();
        self.wait_until(
            &format!("url matches /{pattern}/"),
            options,
            move || {
                let driver = Arc::clone(&driver);
                let pattern = pattern.clone();
                async move {
                    let url = driver.current_url().await?;
                    Ok(Observation::from_check(pattern.is_match(&url), url))
                }
            },
        )
        .await
    }

    /// A named, minimal fixed delay for animation-only transitions.
    ///
    /// Only for transitions with no observable predicate. `reason` is
    /// mandatory and logged so every settle in a suite is accounted for;
    /// anything that CAN be expressed as a condition must use
    /// [`Self::wait_until`] instead.
    pub async fn settle(&self, reason: &str, duration: Duration) -> TenazResult<()> {
        tracing::debug!(reason, settle_ms = duration.as_millis() as u64, "settle wait");
        let mut closed = self.driver.closed_signal();
        if self.driver.is_closed() {
            return Err(TenazError::Cancelled {
                during: format!("settle '{reason}'"),
            });
        }
        tokio::select! {
            changed = closed.wait_for(|c| *c) => {
                let _ = changed;
                Err(TenazError::Cancelled {
                    during: format!("settle '{reason}'"),
                })
            }
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Whether a strategy becomes visible within the timeout.
    ///
    /// KNOWN RISK: a `false` here means "not visible within the timeout",
    /// which callers treat as "feature absent / empty state". That
    /// conflates a slow page with legitimate absence and can mask genuine
    /// failures. Kept because several journeys depend on the behavior;
    /// prefer [`Self::wait_visible`] plus an explicit empty-state check
    /// where the UI offers one.
    pub async fn is_eventually_visible(
        &self,
        strategy: &Strategy,
        options: &WaitOptions,
    ) -> TenazResult<bool> {
        match self.wait_visible(strategy, options).await {
            Ok(()) => Ok(true),
            Err(TenazError::Timeout { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }
}

async fn visible_matches(
    driver: &Arc<dyn PageDriver>,
    strategy: &Strategy,
) -> TenazResult<Vec<ElementHandle>> {
    Ok(driver
        .query(strategy)
        .await?
        .into_iter()
        .filter(ElementHandle::is_interactable_target)
        .collect())
}
