use log;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(10);
const FACTOR: u32 = 2;

/*
 * RetryPolicy bounds how often (and how patiently) a failing API call or
 * notifier run is attempted again before its error is handed back. Once the
 * shutdown token is cancelled nothing is retried anymore.
 */
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: u32,
    shutdown: CancellationToken,
}

impl Default for RetryPolicy {
    fn default() -> Self {
	Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {

    pub fn new(max_retries: u32) -> Self {
	Self{
	    max_retries: max_retries,
	    base_delay: BASE_DELAY,
	    max_delay: MAX_DELAY,
	    factor: FACTOR,
	    shutdown: CancellationToken::new(),
	}
    }

    /*
     * Same retry budget, but without any waiting in between.
     */
    pub fn immediate(max_retries: u32) -> Self {
	Self{
	    max_retries: max_retries,
	    base_delay: Duration::ZERO,
	    max_delay: Duration::ZERO,
	    factor: FACTOR,
	    shutdown: CancellationToken::new(),
	}
    }

    /*
     * Stop waiting for the next attempt as soon as `token` is cancelled.
     */
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
	self.shutdown = token;
	self
    }

    /*
     * How long to wait before the `retry`-th retry (1-based).
     */
    pub fn delay(&self, retry: u32) -> Duration {
	let exp = retry.saturating_sub(1);
	let delay = self.base_delay.saturating_mul(self.factor.saturating_pow(exp));

	delay.min(self.max_delay)
    }

    /*
     * Run `op` until it succeeds or the retry budget is spent, in which case
     * the last error is returned.
     */
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: Display,
    {
	let mut retry = 0;

	loop {
	    match op().await {
		Ok(value) => return Ok(value),
		Err(err) if retry < self.max_retries => {
		    retry += 1;
		    let delay = self.delay(retry);
		    log::warn!("{} failed ({}), retry {}/{} in {:?}", what, err, retry, self.max_retries, delay);

		    tokio::select! {
			biased;

			_ = self.shutdown.cancelled() => {
			    log::warn!("{} not retried, shutting down", what);
			    return Err(err);
			},
			_ = tokio::time::sleep(delay) => {},
		    }
		},
		Err(err) => {
		    log::error!("{} failed after {} retries: {}", what, retry, err);
		    return Err(err);
		}
	    }
	}
    }
}
