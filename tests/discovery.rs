//! Discovery and page-selection scenarios driven through the public
//! `PageEnumerator` seam, with no real browser or HTTP server involved.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use remote_debug_cdp::logging::default_logger;
use remote_debug_cdp::page_enum::{PageEnumerator, RawPageEntry};
use remote_debug_cdp::{CdpError, Master, Result};

struct StaticPages(Mutex<Vec<RawPageEntry>>);

impl PageEnumerator for StaticPages {
    fn fetch(&self, _host: &str, _port: u16) -> Result<Vec<RawPageEntry>> {
        Ok(self.0.lock().unwrap().clone())
    }
}

fn entry(id: &str, title: &str, url: &str, description: Option<&str>) -> RawPageEntry {
    RawPageEntry {
        id: id.into(),
        title: title.into(),
        url: url.into(),
        ty: "page".into(),
        description: description.map(str::to_owned),
        web_socket_debugger_url: Some(format!("ws://example.invalid/{id}")),
    }
}

#[test]
fn discovery_keeps_only_visible_sized_pages_in_first_seen_order() {
    let enumerator = Arc::new(StaticPages(Mutex::new(vec![
        entry("1", "no-size", "http://a.example", Some(r#"{"visible":true}"#)),
        entry("2", "two", "http://b.example", Some(r#"{"width":800,"height":600,"visible":true}"#)),
        entry("3", "three", "http://c.example", Some(r#"{"width":800,"height":600,"visible":true}"#)),
    ])));
    let master = Master::get_with("discovery-scenario-1.invalid", 9401, enumerator, default_logger());

    let pages = master.get_page_list().unwrap();
    let ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "3"]);
}

#[test]
fn find_page_disambiguates_by_url_then_falls_back_to_recency() {
    let enumerator = Arc::new(StaticPages(Mutex::new(vec![
        entry("2", "测试", "http://www.qq.com/", Some(r#"{"width":10,"height":10,"visible":true}"#)),
        entry("3", "测试", "http://other.invalid/", Some(r#"{"width":10,"height":10,"visible":true}"#)),
    ])));
    let master = Master::get_with("discovery-scenario-2.invalid", 9402, enumerator, default_logger());

    let by_url = master
        .find_page(Some("测试"), Some("http://www.qq.com/"), true, Duration::from_millis(50))
        .unwrap();
    assert_eq!(by_url.id, "2");

    let most_recent = master.find_page(Some("测试"), None, true, Duration::from_millis(50)).unwrap();
    assert_eq!(most_recent.id, "3");

    let err = master.find_page(Some("测试"), None, false, Duration::from_millis(50)).unwrap_err();
    assert!(matches!(err, CdpError::Other(_)));
}
