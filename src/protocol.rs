//! Wire types shared by every CDP namespace: `{id, method, params,
//! sessionId}` requests, `{id, result|error}` responses and
//! `{method, params, sessionId}` events (see spec.md §6).
//!
//! Grounded on `chromiumoxid_types`'s `Method`/`Command`/`Response`/`Message`
//! shape from the teacher crate; adapted to a synchronous call site (no
//! `Cow<'static, str>` borrow games since requests are built and sent
//! within a single call).

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{CdpError, WireError};

/// Numeric identifier for a single request/response pair. Strictly
/// increasing within one `Debugger`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything that knows its own `"<Namespace>.<method>"` identifier.
pub trait Method {
    fn identifier(&self) -> &'static str;

    /// The first segment of [`Method::identifier`], e.g. `"DOM"`.
    fn domain_name(&self) -> &'static str {
        self.identifier().split('.').next().unwrap()
    }

    /// The second segment, e.g. `"removeNode"`.
    fn method_name(&self) -> &'static str {
        self.identifier().split('.').nth(1).unwrap()
    }
}

/// A typed CDP command: serializes to the `params` object and knows the
/// shape of its own response.
pub trait Command: Serialize + Method {
    type Response: DeserializeOwned + fmt::Debug;
}

/// Outbound frame: `{"id":…, "method":…, "params":…, "sessionId":?}`.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: CallId,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Inbound response: `{"id":…, "result":…}` or `{"id":…, "error":…}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: CallId,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<WireError>,
}

impl Response {
    /// Resolves `result`/`error` into a typed value, or `ConnectionClosed`
    /// for a malformed response that has neither (spec.md §4.2 tie-break b).
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, CdpError> {
        if let Some(result) = self.result {
            Ok(serde_json::from_value(result)?)
        } else if let Some(err) = self.error {
            Err(CdpError::from_wire(err))
        } else {
            Err(CdpError::ConnectionClosed)
        }
    }
}

/// Inbound event: `{"method":…, "params":…, "sessionId":?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

impl EventMessage {
    /// Splits `method` on `'.'` into `(namespace, submethod)`.
    pub fn split(&self) -> (&str, &str) {
        self.method
            .split_once('.')
            .unwrap_or((self.method.as_str(), ""))
    }
}

/// Response shape for commands whose `result` is `{}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmptyResponse {}

/// Untagged inbound message: a response carries `id`, an event doesn't.
#[derive(Debug, Clone)]
pub enum Message {
    Response(Response),
    Event(EventMessage),
}

impl Message {
    /// Parses one inbound websocket text frame. A frame with an `id` field
    /// is a response; otherwise it's an event.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("id").is_some() {
            Ok(Message::Response(serde_json::from_value(value)?))
        } else {
            Ok(Message::Event(serde_json::from_value(value)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_response() {
        let msg = Message::parse(r#"{"id":1,"result":{"ok":true}}"#).unwrap();
        assert!(matches!(msg, Message::Response(_)));
    }

    #[test]
    fn parses_event() {
        let msg = Message::parse(r#"{"method":"Page.frameNavigated","params":{}}"#).unwrap();
        match msg {
            Message::Event(ev) => assert_eq!(ev.split(), ("Page", "frameNavigated")),
            _ => panic!("expected event"),
        }
    }

    #[test]
    fn malformed_response_is_connection_closed() {
        let resp = Response { id: CallId(1), result: None, error: None };
        let err = resp.into_result::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, CdpError::ConnectionClosed));
    }

    #[test]
    fn error_code_dispatches_to_subclass() {
        let resp = Response {
            id: CallId(1),
            result: None,
            error: Some(WireError { code: -32601, message: "nope".into(), data: None }),
        };
        let err = resp.into_result::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, CdpError::MethodNotFound(_)));
    }
}
