mod collectors;
mod config;
mod http;
mod metrics;
mod monitor;
mod render;
mod scheduler;
mod state;
mod thresholds;

use axum::serve;
use clap::Parser;
use collectors::system::SysinfoSource;
use config::Config;
use metrics::Metrics;
use monitor::StatsMonitor;
use render::DisplayFrame;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hoststatsd")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long)]
    listen: Option<String>,
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };
    if let Some(listen) = cli.listen {
        cfg.listen = Some(listen);
    }
    let settings = cfg.settings();

    info!(
        config = %cli.config,
        interval = %humantime::format_duration(settings.poll_interval),
        units = %settings.units,
        "запуск hoststatsd"
    );

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (notification_tx, notification_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::channel(16);
    let (frame_tx, frame_rx) = watch::channel(DisplayFrame::loading(&settings));

    let collector_task = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let source = match tokio::task::spawn_blocking(SysinfoSource::new).await {
                Ok(source) => Arc::new(source),
                Err(err) => {
                    error!(error = %err, "не удалось инициализировать источник метрик");
                    return;
                }
            };
            collectors::run_collector(source, request_rx, notification_tx, shutdown).await;
        })
    };

    let http_task = settings.listen.map(|addr| {
        let app = http::build_router(metrics.clone(), frame_rx.clone(), control_tx.clone());
        let shutdown = shutdown_rx.clone();
        tokio::spawn(serve_http(addr, app, shutdown))
    });
    if http_task.is_none() {
        warn!("адрес listen не задан, HTTP-сервер не запускается");
    }

    let presenter_task = if cli.quiet {
        None
    } else {
        Some(tokio::spawn(render::run_presenter(
            frame_rx.clone(),
            shutdown_rx.clone(),
        )))
    };

    let monitor = StatsMonitor::new(settings, request_tx, frame_tx, metrics);
    let monitor_task = tokio::spawn(monitor.run(notification_rx, control_rx, shutdown_rx));

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    let _ = shutdown_tx.send(true);
    drop(control_tx);

    let _ = monitor_task.await;
    let _ = collector_task.await;
    if let Some(task) = presenter_task {
        let _ = task.await;
    }
    if let Some(task) = http_task {
        let _ = task.await;
    }
}

async fn serve_http(addr: SocketAddr, app: axum::Router, mut shutdown: watch::Receiver<bool>) {
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, listen = %addr, "не удалось запустить HTTP-сервер");
            return;
        }
    };
    info!(listen = %addr, "HTTP-сервер запущен");

    let server = serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown.changed().await;
    });

    if let Err(err) = server.await {
        error!(error = %err, "ошибка HTTP-сервера");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
