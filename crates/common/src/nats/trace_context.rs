use async_nats::HeaderMap;
use opentelemetry::global;
use opentelemetry::propagation::{Extractor, Injector};
use tracing_opentelemetry::OpenTelemetrySpanExt;

const TRACE_HEADERS: [&str; 2] = ["traceparent", "tracestate"];

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key, value.as_str());
    }
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        TRACE_HEADERS.to_vec()
    }
}

/// Write the current span's W3C trace context into outgoing message headers.
pub fn inject_trace_context(headers: &mut HeaderMap) {
    let ctx = tracing::Span::current().context();
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&ctx, &mut HeaderInjector(headers));
    });
}

/// Parent the current span on the trace carried by an incoming message, if any.
pub fn set_parent_from_headers(headers: &HeaderMap) {
    let ctx = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(headers))
    });
    tracing::Span::current().set_parent(ctx);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_without_propagator_is_harmless() {
        let mut headers = HeaderMap::new();
        headers.insert("Nats-Msg-Id", "evt-1");

        inject_trace_context(&mut headers);

        assert_eq!(headers.get("Nats-Msg-Id").map(|v| v.as_str()), Some("evt-1"));
    }

    #[test]
    fn test_extractor_reads_traceparent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
        );

        let extractor = HeaderExtractor(&headers);

        assert!(extractor
            .get("traceparent")
            .is_some_and(|v| v.starts_with("00-0af7")));
        assert!(extractor.get("tracestate").is_none());
        set_parent_from_headers(&headers);
    }
}
