use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use opentelemetry::global;
use opentelemetry::propagation::{Extractor, Injector};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Axum middleware: adopt the caller's W3C trace context as the parent of the
/// request span, so a control-plane fan-out shows up as one trace.
pub async fn trace_context_middleware(headers: HeaderMap, request: Request, next: Next) -> Response {
    let parent_context =
        global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(&headers)));

    let _ = Span::current().set_parent(parent_context);

    next.run(request).await
}

pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.to_str().ok()
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            return;
        };
        self.0.insert(name, value);
    }
}

/// Current span's trace context, rendered as propagation headers.
pub fn current_trace_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    let cx = Span::current().context();
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&cx, &mut HeaderInjector(&mut headers))
    });
    headers
}

/// Attach the current trace context to an outgoing RPC.
pub fn inject_trace_context_reqwest(builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    builder.headers(current_trace_headers())
}
