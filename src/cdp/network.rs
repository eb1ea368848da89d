//! `Network.*` — request/response pairing and header injection
//! (spec.md §4.8).

use serde::{Deserialize, Serialize};

use super::command;
use crate::protocol::EmptyResponse;

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnableParams {}
command!(EnableParams, "Network.enable", EmptyResponse);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExtraHTTPHeadersParams {
    /// `serde_json::Map` preserves insertion order when serde_json is built
    /// with the `preserve_order` feature, which is what spec.md §4.8 asks
    /// for ("preserving insertion order").
    pub headers: serde_json::Map<String, serde_json::Value>,
}
command!(SetExtraHTTPHeadersParams, "Network.setExtraHTTPHeaders", EmptyResponse);

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkRequest {
    pub url: String,
    pub method: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkResponse {
    pub url: String,
    pub status: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequestWillBeSent {
    pub request_id: String,
    pub request: NetworkRequest,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponseReceived {
    pub request_id: String,
    pub response: NetworkResponse,
    pub timestamp: f64,
}
