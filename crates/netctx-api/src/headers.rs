use http::{HeaderMap, HeaderName, HeaderValue};
use netctx_core::{Extractor, Injector};
use tracing::warn;

/// Writes propagated fields into an [`HeaderMap`], appending to existing values.
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn inject(&mut self, name: &str, value: String) {
        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                warn!(target: "netctx", field = name, error = %e, "invalid header name, field dropped");
                return;
            }
        };
        match HeaderValue::try_from(value) {
            Ok(value) => {
                self.0.append(name, value);
            }
            Err(e) => {
                warn!(target: "netctx", field = %name, error = %e, "invalid header value, field dropped")
            }
        }
    }
}

/// Reads propagated fields from an [`HeaderMap`]. Non-UTF-8 values are treated as absent.
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.to_str().ok())
    }
}
