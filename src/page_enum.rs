//! `PageDescriptor` and the `PageEnumerator` trait: the HTTP `/json`
//! discovery collaborator (spec.md §4.9, §6). Treated as an out-of-scope
//! external collaborator per spec.md §1 — `Master` owns the filtering,
//! dedup and sort logic; this module owns only the wire shape and the seam
//! a caller plugs a different transport into (e.g. to tunnel discovery
//! through the same forwarded channel as the websocket).
//!
//! Grounded on the teacher crate's use of `reqwest`'s blocking client for
//! every HTTP collaborator it has (fetcher downloads, browser discovery);
//! this crate's default `HttpPageEnumerator` is the same crate used the
//! same way, against `reqwest::blocking::Client` rather than async.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::error::{CdpError, Result};

/// The raw shape of one entry in the `/json` array (spec.md §6):
/// `description` is itself a JSON string the caller must parse separately.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPageEntry {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: Option<String>,
}

/// `description`'s embedded JSON, parsed only far enough to apply the
/// visibility filter spec.md §4.9 names.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct DescriptionMeta {
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    height: Option<f64>,
    #[serde(default = "default_visible")]
    visible: bool,
}

fn default_visible() -> bool {
    true
}

impl RawPageEntry {
    /// True when the page should be dropped by `Master::get_page_list`
    /// (spec.md §4.9): `description` parses with `visible=false`, or
    /// without both a nonzero `width` and a nonzero `height` (spec.md §8
    /// scenario 1: `visible=true` with no `width` is still filtered out).
    pub fn is_hidden(&self) -> bool {
        let Some(description) = &self.description else { return false };
        let Ok(meta) = serde_json::from_str::<DescriptionMeta>(description) else { return false };
        !meta.visible
            || !matches!(meta.width, Some(w) if w != 0.0)
            || !matches!(meta.height, Some(h) if h != 0.0)
    }
}

/// One debuggable page, as tracked by `Master` (spec.md §3).
/// `first_seen_at` is assigned on first observation and never changed —
/// the stable ordering key `get_page_list`/`find_page` sort and dedup by.
#[derive(Debug, Clone)]
pub struct PageDescriptor {
    pub id: String,
    pub title: String,
    pub url: String,
    pub ty: String,
    pub web_socket_debugger_url: Option<String>,
    pub description: Option<String>,
    pub first_seen_at: Instant,
}

/// The injected HTTP `/json` discovery collaborator (spec.md §1, §6).
/// Default implementation below; a caller tunneling through a forwarded
/// channel supplies its own.
pub trait PageEnumerator: Send + Sync {
    fn fetch(&self, host: &str, port: u16) -> Result<Vec<RawPageEntry>>;
}

/// Default `PageEnumerator`: a blocking GET against `http://host:port/json`
/// via `reqwest::blocking::Client` (spec.md §6), the teacher crate's own
/// HTTP stack used in its blocking mode instead of async.
pub struct HttpPageEnumerator {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl HttpPageEnumerator {
    pub fn new(timeout: Duration) -> Self {
        Self { client: reqwest::blocking::Client::new(), timeout }
    }
}

impl Default for HttpPageEnumerator {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl PageEnumerator for HttpPageEnumerator {
    fn fetch(&self, host: &str, port: u16) -> Result<Vec<RawPageEntry>> {
        let url = format!("http://{host}:{port}/json");
        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .map_err(CdpError::Http)?;
        let entries: Vec<RawPageEntry> = resp.json().map_err(CdpError::Http)?;
        Ok(entries)
    }
}

pub fn default_enumerator() -> Arc<dyn PageEnumerator> {
    Arc::new(HttpPageEnumerator::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(description: Option<&str>) -> RawPageEntry {
        RawPageEntry {
            id: "1".into(),
            title: "t".into(),
            url: "http://a".into(),
            ty: "page".into(),
            description: description.map(str::to_owned),
            web_socket_debugger_url: Some("ws://a".into()),
        }
    }

    #[test]
    fn visible_with_dimensions_is_not_hidden() {
        let e = entry(Some(r#"{"width":100,"height":50,"visible":true}"#));
        assert!(!e.is_hidden());
    }

    #[test]
    fn zero_width_is_hidden() {
        let e = entry(Some(r#"{"width":0,"height":50,"visible":true}"#));
        assert!(e.is_hidden());
    }

    #[test]
    fn visible_with_no_width_is_hidden() {
        let e = entry(Some(r#"{"visible":true}"#));
        assert!(e.is_hidden());
    }

    #[test]
    fn explicit_invisible_is_hidden() {
        let e = entry(Some(r#"{"width":100,"height":50,"visible":false}"#));
        assert!(e.is_hidden());
    }

    #[test]
    fn missing_description_defaults_visible() {
        let e = entry(None);
        assert!(!e.is_hidden());
    }
}
