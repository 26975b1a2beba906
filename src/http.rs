use crate::metrics::Metrics;
use crate::monitor::ControlCommand;
use crate::render::DisplayFrame;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub frames: watch::Receiver<DisplayFrame>,
    pub control: mpsc::Sender<ControlCommand>,
}

pub fn build_router(
    metrics: Arc<Metrics>,
    frames: watch::Receiver<DisplayFrame>,
    control: mpsc::Sender<ControlCommand>,
) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/display", get(display_handler))
        .route("/api/suspend", post(suspend_handler))
        .route("/api/resume", post(resume_handler))
        .with_state(HttpAppState {
            metrics,
            frames,
            control,
        })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("ошибка кодирования метрик: {err}"),
        )
            .into_response(),
    }
}

async fn display_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let frame = state.frames.borrow().clone();
    Json(frame)
}

async fn suspend_handler(State(state): State<HttpAppState>) -> Response {
    forward(&state, ControlCommand::Suspend).await
}

async fn resume_handler(State(state): State<HttpAppState>) -> Response {
    forward(&state, ControlCommand::Resume).await
}

async fn forward(state: &HttpAppState, command: ControlCommand) -> Response {
    match state.control.send(command).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "опрос остановлен").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::render::render;
    use crate::state::DisplayState;
    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    struct Fixture {
        app: Router,
        metrics: Arc<Metrics>,
        frames: watch::Sender<DisplayFrame>,
        control: mpsc::Receiver<ControlCommand>,
    }

    fn fixture() -> Fixture {
        let metrics = Metrics::new().expect("инициализация метрик");
        let (frame_tx, frame_rx) = watch::channel(DisplayFrame::loading(&Settings::default()));
        let (control_tx, control_rx) = mpsc::channel(4);
        Fixture {
            app: build_router(metrics.clone(), frame_rx, control_tx),
            metrics,
            frames: frame_tx,
            control: control_rx,
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let f = fixture();
        let response = f
            .app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn metrics_exposes_backoff_state() {
        let f = fixture();
        f.metrics.set_backoff(2, None);

        let response = f
            .app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("stats_consecutive_errors 2"));
        assert!(text.contains("stats_scrape_count_total 1"));
    }

    #[tokio::test]
    async fn display_returns_latest_frame() {
        let f = fixture();
        f.frames.send_replace(render(
            &DisplayState::Error("Invalid metrics payload".to_string()),
            &Settings::default(),
        ));

        let response = f
            .app
            .oneshot(
                Request::builder()
                    .uri("/api/display")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("\"mode\":\"error\""));
        assert!(text.contains("Invalid metrics payload"));
        assert!(text.contains("\"animation_speed_ms\":300"));
    }

    #[tokio::test]
    async fn suspend_and_resume_are_forwarded() {
        let mut f = fixture();
        for (uri, expected) in [
            ("/api/suspend", ControlCommand::Suspend),
            ("/api/resume", ControlCommand::Resume),
        ] {
            let response = f
                .app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::ACCEPTED);
            assert_eq!(f.control.recv().await, Some(expected));
        }
    }

    #[tokio::test]
    async fn control_after_shutdown_is_unavailable() {
        let Fixture { app, control, .. } = fixture();
        drop(control);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/resume")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
