use rand::random_range;
use std::future::Future;
use tokio::time::{Duration, Instant, sleep};

const DEFAULT_TOTAL_BUDGET: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(200);
const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5);
const DEFAULT_JITTER_FRAC: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,    // transient errors, 5xx, busy peers
    NonRetryable, // logic errors, rejections
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub total_budget: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub jitter_frac: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            total_budget: DEFAULT_TOTAL_BUDGET,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            jitter_frac: DEFAULT_JITTER_FRAC,
        }
    }
}

impl RetryConfig {
    pub fn with_budget(total_budget: Duration) -> Self {
        Self {
            total_budget,
            ..Self::default()
        }
    }
}

fn jitter(d: Duration, frac: f32) -> Duration {
    let ms = d.as_millis() as i64;
    let delta = (ms as f32 * frac) as i64;
    let j = random_range(-delta..=delta);
    Duration::from_millis((ms + j).max(0) as u64)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// total budget is spent. Each attempt must carry its own timeout.
pub async fn retry_timeboxed<E, F, Fut, C, T>(
    cfg: &RetryConfig,
    mut op: F,
    classify: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryClass,
{
    let deadline = Instant::now() + cfg.total_budget;
    let mut backoff = cfg.backoff_base;

    loop {
        match op().await {
            Ok(res) => return Ok(res),
            Err(e) => {
                if classify(&e) == RetryClass::NonRetryable {
                    return Err(e);
                }
                let now = Instant::now();
                if now >= deadline {
                    return Err(e);
                }
                // Sleep with jitter but not beyond deadline
                let sleep_dur = jitter(backoff.min(cfg.backoff_max), cfg.jitter_frac);
                let remaining = deadline.saturating_duration_since(now);
                if sleep_dur > remaining {
                    return Err(e);
                }
                sleep(sleep_dur).await;
                backoff = (backoff * 2).min(cfg.backoff_max);
            }
        }
    }
}
