pub mod system;

use crate::state::Snapshot;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

pub const COLLECTION_FAILED_MESSAGE: &str = "Unable to read system metrics";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorRequest {
    GetStats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectorNotification {
    StatsUpdate(Value),
    StatsError { message: String },
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("общий объём памяти равен нулю")]
    ZeroMemoryTotal,
    #[error("некорректная загрузка CPU: {0}")]
    InvalidCpuLoad(f64),
    #[error("сбор метрики {0} завершился паникой")]
    Panicked(&'static str),
    #[error("фоновая задача сбора не завершилась: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("не удалось сериализовать снимок: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait MetricsSource: Send + Sync + 'static {
    fn gather(&self) -> Result<Snapshot, CollectError>;
}

/// Every request is gathered on its own blocking task, so a slow gather may
/// overlap the next one; whichever finishes last is the last notification sent.
pub async fn run_collector<S: MetricsSource>(
    source: Arc<S>,
    mut requests: mpsc::UnboundedReceiver<CollectorRequest>,
    notifications: mpsc::UnboundedSender<CollectorNotification>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("сборщик метрик запущен");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            request = requests.recv() => {
                let Some(CollectorRequest::GetStats) = request else {
                    break;
                };
                let source = source.clone();
                let notifications = notifications.clone();
                tokio::spawn(async move {
                    let notification = collect_once(source).await;
                    if notifications.send(notification).is_err() {
                        debug!("получатель уведомлений закрыт");
                    }
                });
            }
        }
    }
    info!("сборщик метрик остановлен");
}

pub async fn collect_once<S: MetricsSource>(source: Arc<S>) -> CollectorNotification {
    let gathered = tokio::task::spawn_blocking(move || source.gather())
        .await
        .map_err(CollectError::from)
        .and_then(|result| result)
        .and_then(|snapshot| serde_json::to_value(snapshot).map_err(CollectError::from));

    match gathered {
        Ok(payload) => CollectorNotification::StatsUpdate(payload),
        Err(err) => {
            error!(error = %err, "не удалось собрать метрики системы");
            CollectorNotification::StatsError {
                message: COLLECTION_FAILED_MESSAGE.to_string(),
            }
        }
    }
}
