use crate::collectors::{CollectorNotification, CollectorRequest};
use crate::config::Settings;
use crate::metrics::Metrics;
use crate::render::{render, DisplayFrame};
use crate::scheduler::{PollScheduler, TimerEvent};
use crate::state::{validate_snapshot, DisplayState, INVALID_PAYLOAD_MESSAGE, UNKNOWN_ERROR_MESSAGE};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Suspend,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestReason {
    Start,
    Tick,
    Retry,
    Resume,
}

impl RequestReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Tick => "tick",
            Self::Retry => "retry",
            Self::Resume => "resume",
        }
    }
}

pub struct StatsMonitor {
    settings: Settings,
    scheduler: PollScheduler,
    display: DisplayState,
    stopped: bool,
    requests: mpsc::UnboundedSender<CollectorRequest>,
    frames: watch::Sender<DisplayFrame>,
    metrics: Arc<Metrics>,
}

impl StatsMonitor {
    pub fn new(
        settings: Settings,
        requests: mpsc::UnboundedSender<CollectorRequest>,
        frames: watch::Sender<DisplayFrame>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let scheduler = PollScheduler::new(settings.poll_interval, settings.max_backoff_factor);
        Self {
            settings,
            scheduler,
            display: DisplayState::Loading,
            stopped: false,
            requests,
            frames,
            metrics,
        }
    }

    pub fn start(&mut self) {
        if self.stopped {
            return;
        }
        info!(
            interval = %humantime::format_duration(self.settings.poll_interval),
            max_backoff_factor = self.settings.max_backoff_factor,
            "запуск опроса метрик"
        );
        self.request(RequestReason::Start);
        self.scheduler.arm();
        self.publish_backoff();
    }

    pub fn suspend(&mut self) {
        debug!("опрос приостановлен");
        self.scheduler.suspend();
        self.publish_backoff();
    }

    pub fn resume(&mut self) {
        if self.stopped {
            return;
        }
        debug!("опрос возобновлён");
        self.request(RequestReason::Resume);
        self.scheduler.arm();
        self.publish_backoff();
    }

    pub fn stop(&mut self) {
        self.suspend();
        self.stopped = true;
        info!("опрос метрик остановлен");
    }

    pub fn handle_notification(&mut self, notification: CollectorNotification) {
        if self.stopped {
            return;
        }
        match notification {
            CollectorNotification::StatsUpdate(payload) => match validate_snapshot(&payload) {
                Ok(snapshot) => {
                    self.scheduler.record_success();
                    self.metrics
                        .update_from_snapshot(&snapshot, &self.settings.thresholds);
                    self.display = DisplayState::Ready(snapshot);
                }
                Err(err) => {
                    warn!(error = %err, "получены некорректные данные метрик");
                    self.fail("validation", INVALID_PAYLOAD_MESSAGE.to_string());
                }
            },
            CollectorNotification::StatsError { message } => {
                let message = if message.trim().is_empty() {
                    UNKNOWN_ERROR_MESSAGE.to_string()
                } else {
                    message
                };
                self.fail("collection", message);
            }
        }
        self.refresh();
    }

    fn on_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Tick => self.request(RequestReason::Tick),
            TimerEvent::Retry => self.request(RequestReason::Retry),
        }
        self.publish_backoff();
    }

    fn fail(&mut self, kind: &str, message: String) {
        self.metrics.inc_failure(kind);
        self.display = DisplayState::Error(message);
        let retry = self.scheduler.record_failure();
        let consecutive_errors = self.scheduler.state().consecutive_errors;
        if let Some(delay) = retry {
            warn!(
                kind,
                consecutive_errors,
                retry_in = %humantime::format_duration(delay),
                "ошибка цикла опроса, запланирован повтор"
            );
        } else {
            warn!(kind, consecutive_errors, "ошибка цикла опроса, опрос приостановлен");
        }
    }

    fn request(&self, reason: RequestReason) {
        self.metrics.inc_request(reason.as_str());
        if self.requests.send(CollectorRequest::GetStats).is_err() {
            warn!(reason = reason.as_str(), "сборщик метрик недоступен");
        }
    }

    fn refresh(&self) {
        self.frames.send_replace(render(&self.display, &self.settings));
        self.publish_backoff();
    }

    fn publish_backoff(&self) {
        self.metrics.set_backoff(
            self.scheduler.state().consecutive_errors,
            self.scheduler.pending_retry(),
        );
    }

    pub async fn run(
        mut self,
        mut notifications: mpsc::UnboundedReceiver<CollectorNotification>,
        mut control: mpsc::Receiver<ControlCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        self.start();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    self.stop();
                    break;
                }
                Some(command) = control.recv() => match command {
                    ControlCommand::Suspend => self.suspend(),
                    ControlCommand::Resume => self.resume(),
                },
                notification = notifications.recv() => match notification {
                    Some(notification) => self.handle_notification(notification),
                    None => {
                        self.stop();
                        break;
                    }
                },
                event = self.scheduler.next_event() => self.on_timer(event),
            }
        }
    }
}
