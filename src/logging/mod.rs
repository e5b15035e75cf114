//! Access log for the HTTP surface, written through slog.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use slog::{o, Drain, Logger};
use slog_async::Async;
use slog_term::{FullFormat, PlainDecorator, TermDecorator};
use std::sync::Arc;
use std::time::Instant;

use crate::middleware_helpers::REQUEST_ID_HEADER;

/// Configuration for setting up the logger
#[derive(Debug, Clone, Copy)]
pub struct LoggerConfig {
    pub async_buffer_size: usize,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            async_buffer_size: 1024,
            use_color: true,
        }
    }
}

/// Sets up a logger with configurable options
pub fn setup_logger(config: LoggerConfig) -> Logger {
    let drain = if config.use_color {
        let decorator = TermDecorator::new().force_color().build();
        Async::new(FullFormat::new(decorator).build().fuse())
            .chan_size(config.async_buffer_size)
            .build()
            .fuse()
    } else {
        let decorator = PlainDecorator::new(std::io::stdout());
        Async::new(FullFormat::new(decorator).build().fuse())
            .chan_size(config.async_buffer_size)
            .build()
            .fuse()
    };

    Logger::root(
        drain,
        o!("service" => "dealership-sales", "version" => env!("CARGO_PKG_VERSION")),
    )
}

/// State struct for logging middleware
#[derive(Clone)]
pub struct LoggingState {
    logger: Logger,
}

impl LoggingState {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

/// One access-log line per request: method, path, status, duration.
pub async fn logging_middleware(
    State(state): State<Arc<LoggingState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start_time = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    let status = response.status().as_u16();
    let duration_ms = start_time.elapsed().as_millis() as u64;
    // runs outside the request-id scope, so read the echoed header
    let request_id = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if status >= 500 {
        slog::error!(
            &state.logger,
            "HTTP request failed";
            "method" => method,
            "path" => path,
            "status" => status,
            "duration_ms" => duration_ms,
            "request_id" => request_id,
        );
    } else {
        slog::info!(
            &state.logger,
            "HTTP request handled";
            "method" => method,
            "path" => path,
            "status" => status,
            "duration_ms" => duration_ms,
            "request_id" => request_id,
        );
    }

    response
}
