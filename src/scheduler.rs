use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerState {
    pub consecutive_errors: u32,
    pub poll_interval: Duration,
}

pub struct PollScheduler {
    state: SchedulerState,
    max_backoff_factor: f64,
    ticker: Option<Interval>,
    retry: Option<Pin<Box<Sleep>>>,
    retry_delay: Option<Duration>,
}

impl PollScheduler {
    pub fn new(poll_interval: Duration, max_backoff_factor: f64) -> Self {
        Self {
            state: SchedulerState {
                consecutive_errors: 0,
                poll_interval,
            },
            max_backoff_factor,
            ticker: None,
            retry: None,
            retry_delay: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn pending_retry(&self) -> Option<Duration> {
        self.retry_delay
    }

    pub fn arm(&mut self) {
        self.cancel_retry();
        let period = self.state.poll_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
    }

    pub fn record_success(&mut self) {
        self.cancel_retry();
        self.state.consecutive_errors = 0;
    }

    pub fn record_failure(&mut self) -> Option<Duration> {
        self.state.consecutive_errors = self.state.consecutive_errors.saturating_add(1);
        self.cancel_retry();
        if !self.is_running() {
            return None;
        }
        let delay = backoff_delay(
            self.state.poll_interval,
            self.state.consecutive_errors,
            self.max_backoff_factor,
        );
        self.retry = Some(Box::pin(time::sleep(delay)));
        self.retry_delay = Some(delay);
        Some(delay)
    }

    pub fn suspend(&mut self) {
        self.ticker = None;
        self.cancel_retry();
    }

    pub fn cancel_retry(&mut self) {
        self.retry = None;
        self.retry_delay = None;
    }

    /// Resolves when either timer fires. Never resolves while both are disarmed.
    pub async fn next_event(&mut self) -> TimerEvent {
        tokio::select! {
            _ = wait_tick(&mut self.ticker) => TimerEvent::Tick,
            _ = wait_retry(&mut self.retry, &mut self.retry_delay) => TimerEvent::Retry,
        }
    }
}

async fn wait_tick(slot: &mut Option<Interval>) {
    match slot {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn wait_retry(slot: &mut Option<Pin<Box<Sleep>>>, delay: &mut Option<Duration>) {
    match slot {
        Some(sleep) => {
            sleep.as_mut().await;
            *slot = None;
            *delay = None;
        }
        None => pending::<()>().await,
    }
}

pub fn backoff_delay(interval: Duration, consecutive_errors: u32, max_factor: f64) -> Duration {
    let exponent = consecutive_errors.saturating_sub(1).min(1023) as i32;
    let factor = 2_f64.powi(exponent).min(max_factor);
    Duration::try_from_secs_f64(interval.as_secs_f64() * factor).unwrap_or(interval)
}
