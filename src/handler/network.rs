//! `NetworkHandler` — request/response pairing buffer, header injection
//! (spec.md §4.8).
//!
//! Grounded on the teacher's `src/handler/network.rs` (`NetworkManager`,
//! tracking `ignore_httpserrors` off `Network.enable`); this crate's version
//! adds the `requestId`-keyed pairing buffer and `setExtraHTTPHeaders`
//! call the spec names, which the teacher leaves to its typed
//! `Network.*` command builders directly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::cdp::network::{
    EnableParams, EventRequestWillBeSent, EventResponseReceived, NetworkRequest, NetworkResponse,
    SetExtraHTTPHeadersParams,
};
use crate::debugger::Debugger;
use crate::error::Result;
use crate::handler::{impl_as_any, parse_params, Handler};

/// One request, paired with its response once `responseReceived` lands.
#[derive(Debug, Clone)]
pub struct RequestPair {
    pub request: NetworkRequest,
    pub requested_at: f64,
    pub response: Option<NetworkResponse>,
}

#[derive(Default)]
struct Inner {
    pairs: HashMap<String, RequestPair>,
}

/// Buffers `requestWillBeSent`/`responseReceived` pairs keyed by
/// `requestId`, skipping `data:image` URLs, and lets callers inject extra
/// headers on outgoing requests (spec.md §4.8).
#[derive(Default)]
pub struct NetworkHandler {
    inner: Mutex<Inner>,
}

impl NetworkHandler {
    pub fn get_pair(&self, request_id: &str) -> Option<RequestPair> {
        self.inner.lock().unwrap().pairs.get(request_id).cloned()
    }

    pub fn pairs(&self) -> Vec<RequestPair> {
        self.inner.lock().unwrap().pairs.values().cloned().collect()
    }

    /// `setExtraHTTPHeaders`, preserving the caller's insertion order
    /// (spec.md §4.8) — `serde_json::Map` keeps order because
    /// `serde_json`'s `preserve_order` feature is enabled crate-wide.
    pub fn set_http_headers(
        &self,
        debugger: &Arc<Debugger>,
        session_id: Option<&str>,
        headers: Vec<(String, String)>,
    ) -> Result<()> {
        let mut map = serde_json::Map::new();
        for (key, value) in headers {
            map.insert(key, Value::String(value));
        }
        debugger.send_request(session_id, SetExtraHTTPHeadersParams { headers: map })?;
        Ok(())
    }

    fn handle_request_will_be_sent(&self, event: EventRequestWillBeSent) -> Result<()> {
        if event.request.url.starts_with("data:image") {
            return Ok(());
        }
        self.inner.lock().unwrap().pairs.insert(
            event.request_id,
            RequestPair { request: event.request, requested_at: event.timestamp, response: None },
        );
        Ok(())
    }

    fn handle_response_received(&self, event: EventResponseReceived) -> Result<()> {
        if let Some(pair) = self.inner.lock().unwrap().pairs.get_mut(&event.request_id) {
            pair.response = Some(event.response);
        }
        Ok(())
    }
}

impl Handler for NetworkHandler {
    fn namespace(&self) -> &'static str {
        "Network"
    }

    fn on_attached(&self, debugger: &Arc<Debugger>) -> Result<()> {
        debugger.send_request(None, EnableParams {})?;
        Ok(())
    }

    fn on_recv_notify_msg(
        &self,
        _debugger: &Arc<Debugger>,
        submethod: &str,
        params: Value,
        _session_id: Option<&str>,
    ) -> Result<()> {
        match submethod {
            "requestWillBeSent" => self.handle_request_will_be_sent(parse_params(params)?),
            "responseReceived" => self.handle_response_received(parse_params(params)?),
            _ => Ok(()),
        }
    }

    /// Re-enables `Network` on every newly attached subtarget session
    /// (spec.md §4.8).
    fn on_new_session(&self, debugger: &Arc<Debugger>, session_id: &str) -> Result<()> {
        debugger.send_request(Some(session_id), EnableParams {})?;
        Ok(())
    }

    impl_as_any!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_image_urls_are_skipped() {
        let handler = NetworkHandler::default();
        handler
            .handle_request_will_be_sent(EventRequestWillBeSent {
                request_id: "1".into(),
                request: NetworkRequest { url: "data:image/png;base64,abc".into(), method: "GET".into() },
                timestamp: 0.0,
            })
            .unwrap();
        assert!(handler.get_pair("1").is_none());
    }

    #[test]
    fn request_and_response_pair_by_id() {
        let handler = NetworkHandler::default();
        handler
            .handle_request_will_be_sent(EventRequestWillBeSent {
                request_id: "1".into(),
                request: NetworkRequest { url: "http://a".into(), method: "GET".into() },
                timestamp: 0.0,
            })
            .unwrap();
        handler
            .handle_response_received(EventResponseReceived {
                request_id: "1".into(),
                response: NetworkResponse { url: "http://a".into(), status: 200 },
                timestamp: 0.1,
            })
            .unwrap();
        let pair = handler.get_pair("1").unwrap();
        assert_eq!(pair.response.unwrap().status, 200);
    }
}
