//! # Request/Response Tracing
//!
//! `tower_http::trace::TraceLayer` for structured request logging.

/// Build the request `TraceLayer`.
///
/// Each request gets a span with method and URI; the response event
/// carries status and latency. 5xx responses are classified as failures.
pub fn layer() -> tower_http::trace::TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
> {
    tower_http::trace::TraceLayer::new_for_http()
}
