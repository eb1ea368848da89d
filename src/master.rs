//! `Master` — HTTP `/json` enumeration, page filtering/dedup/sort,
//! `Debugger` instantiation (spec.md §4.9).
//!
//! Grounded on the teacher's top-level `Browser` (`src/browser.rs`), which
//! owns page/target discovery and hands out `Page`/`Tab` handles over one
//! transport; this crate's `Master` instead owns one `Debugger` per
//! discovered page id, matching spec.md §3's "Master owns Debuggers keyed
//! by pageId" ownership rule, and the process-wide per-address dedup
//! registry spec.md §3/§9 call for.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;

use crate::debugger::Debugger;
use crate::error::{CdpError, Result};
use crate::handler::log::LogHandler;
use crate::handler::network::NetworkHandler;
use crate::handler::runtime::RuntimeHandler;
use crate::handler::target::TargetHandler;
use crate::logging::{default_logger, Logger};
use crate::page_enum::{default_enumerator, PageDescriptor, PageEnumerator};
use crate::transport::SocketFactory;

const FIND_PAGE_POLL: Duration = Duration::from_millis(500);
const DEFAULT_FIND_PAGE_TIMEOUT: Duration = Duration::from_secs(5);
const MAIN_CONTEXT_POLL: Duration = Duration::from_millis(200);
const MAIN_CONTEXT_TIMEOUT: Duration = Duration::from_secs(2);

type Address = (String, u16);

fn registry() -> &'static Mutex<HashMap<Address, Arc<Master>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<Address, Arc<Master>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

struct Inner {
    /// Ordered by `first_seen_at`; reused across `get_page_list` calls so
    /// ids keep a stable ordering key (spec.md §3).
    pages: Vec<PageDescriptor>,
    debuggers: HashMap<String, Arc<Debugger>>,
}

/// Owns discovery and live `Debugger`s for one `(host, port)` address.
/// Identical addresses share a `Master` (spec.md §3's dedup contract).
pub struct Master {
    host: String,
    port: u16,
    enumerator: Arc<dyn PageEnumerator>,
    logger: Arc<dyn Logger>,
    inner: Mutex<Inner>,
}

impl Master {
    /// Returns the process-wide `Master` for `(host, port)`, constructing
    /// one with the default `reqwest`-backed enumerator and logger on first
    /// use.
    pub fn get(host: impl Into<String>, port: u16) -> Arc<Master> {
        Self::get_with(host, port, default_enumerator(), default_logger())
    }

    pub fn get_with(
        host: impl Into<String>,
        port: u16,
        enumerator: Arc<dyn PageEnumerator>,
        logger: Arc<dyn Logger>,
    ) -> Arc<Master> {
        let host = host.into();
        let key = (host.clone(), port);
        let mut reg = registry().lock().unwrap();
        if let Some(existing) = reg.get(&key) {
            return existing.clone();
        }
        let master = Arc::new(Master {
            host,
            port,
            enumerator,
            logger,
            inner: Mutex::new(Inner { pages: Vec::new(), debuggers: HashMap::new() }),
        });
        reg.insert(key, master.clone());
        master
    }

    /// Test-only escape hatch for the guarded registry (spec.md §9).
    #[cfg(test)]
    pub fn reset_registry_for_test() {
        registry().lock().unwrap().clear();
    }

    /// `GET /json`, keep only `type=page`, drop hidden pages, assign
    /// `first_seen_at` on first sight, sort by it (spec.md §4.9).
    pub fn get_page_list(&self) -> Result<Vec<PageDescriptor>> {
        let raw = self.enumerator.fetch(&self.host, self.port)?;
        let mut inner = self.inner.lock().unwrap();
        for entry in raw {
            if entry.ty != "page" {
                continue;
            }
            if entry.is_hidden() {
                continue;
            }
            let already_open = inner.debuggers.contains_key(&entry.id);
            if entry.web_socket_debugger_url.is_none() && !already_open {
                self.logger.warn(
                    "master",
                    &format!("page {} has no webSocketDebuggerUrl and no open debugger; skipping", entry.id),
                );
                continue;
            }
            if let Some(existing) = inner.pages.iter_mut().find(|p| p.id == entry.id) {
                existing.title = entry.title;
                existing.url = entry.url;
                existing.web_socket_debugger_url = entry.web_socket_debugger_url;
                existing.description = entry.description;
            } else {
                inner.pages.push(PageDescriptor {
                    id: entry.id,
                    title: entry.title,
                    url: entry.url,
                    ty: entry.ty,
                    web_socket_debugger_url: entry.web_socket_debugger_url,
                    description: entry.description,
                    first_seen_at: Instant::now(),
                });
            }
        }
        inner.pages.sort_by_key(|p| p.first_seen_at);
        Ok(inner.pages.clone())
    }

    fn matches(pattern: &str, value: &str) -> bool {
        if pattern == value {
            return true;
        }
        let anchored = format!("^(?:{pattern})$");
        Regex::new(&anchored).map(|re| re.is_match(value)).unwrap_or(false)
    }

    fn filter<'a>(pages: &'a [PageDescriptor], title: Option<&str>, url: Option<&str>) -> Vec<&'a PageDescriptor> {
        pages
            .iter()
            .filter(|p| title.map(|t| Self::matches(t, &p.title)).unwrap_or(true))
            .filter(|p| url.map(|u| Self::matches(u, &p.url)).unwrap_or(true))
            .collect()
    }

    fn pick(matches: Vec<&PageDescriptor>, last: bool) -> Result<PageDescriptor> {
        match matches.len() {
            0 => Err(CdpError::Other("find_page: no matching page".into())),
            1 => Ok(matches[0].clone()),
            _ if last => Ok(matches.into_iter().max_by_key(|p| p.first_seen_at).unwrap().clone()),
            _ => Err(CdpError::Other("find_page: multiple matching pages".into())),
        }
    }

    /// Short-polls `get_page_list` (spec.md §4.9): within the filtered set,
    /// prefers a page not seen before this call started; if none showed up
    /// within `timeout`, falls back to resolving against the whole filtered
    /// set.
    pub fn find_page(
        &self,
        title: Option<&str>,
        url: Option<&str>,
        last: bool,
        timeout: Duration,
    ) -> Result<PageDescriptor> {
        let baseline: std::collections::HashSet<String> =
            self.inner.lock().unwrap().pages.iter().map(|p| p.id.clone()).collect();
        let deadline = Instant::now() + timeout;
        let mut last_filtered: Vec<PageDescriptor> = Vec::new();
        loop {
            let pages = self.get_page_list()?;
            let filtered = Self::filter(&pages, title, url);
            let new: Vec<&PageDescriptor> = filtered.iter().filter(|p| !baseline.contains(&p.id)).copied().collect();
            if !new.is_empty() {
                return Self::pick(new, last);
            }
            last_filtered = filtered.into_iter().cloned().collect();
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(FIND_PAGE_POLL);
        }
        Self::pick(last_filtered.iter().collect(), last)
    }

    /// `find_page` with spec.md §4.9's default timeout.
    pub fn find_page_default(&self, title: Option<&str>, url: Option<&str>, last: bool) -> Result<PageDescriptor> {
        self.find_page(title, url, last, DEFAULT_FIND_PAGE_TIMEOUT)
    }

    /// Constructs (or returns the already-live) `Debugger` for `page`
    /// (spec.md §3: "at most one live Debugger per page; re-resolving a
    /// still-live page returns the existing one"). Registers `Target` and
    /// `Runtime`, waits up to 2s for the page to report a live execution
    /// context, then registers `Log` and `Network` (spec.md §4.9).
    pub fn connect(&self, page: &PageDescriptor, factory: Option<SocketFactory>) -> Result<Arc<Debugger>> {
        if let Some(existing) = self.inner.lock().unwrap().debuggers.get(&page.id).cloned() {
            return Ok(existing);
        }
        let url = page
            .web_socket_debugger_url
            .clone()
            .ok_or_else(|| CdpError::Other(format!("page {} has no webSocketDebuggerUrl", page.id)))?;

        let debugger = Debugger::connect(url, factory, self.logger.clone())?;
        debugger.register_handler::<TargetHandler>()?;
        let runtime = debugger.register_handler::<RuntimeHandler>()?;

        let deadline = Instant::now() + MAIN_CONTEXT_TIMEOUT;
        while runtime.get_main_context_id().is_none() {
            if Instant::now() >= deadline {
                self.logger.warn("master", "timed out waiting for a live execution context");
                break;
            }
            std::thread::sleep(MAIN_CONTEXT_POLL);
        }

        debugger.register_handler::<LogHandler>()?;
        debugger.register_handler::<NetworkHandler>()?;

        self.inner.lock().unwrap().debuggers.insert(page.id.clone(), debugger.clone());
        Ok(debugger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_enum::RawPageEntry;
    use std::sync::Mutex as StdMutex;

    struct FixedEnumerator {
        pages: StdMutex<Vec<RawPageEntry>>,
    }

    impl PageEnumerator for FixedEnumerator {
        fn fetch(&self, _host: &str, _port: u16) -> Result<Vec<RawPageEntry>> {
            Ok(self.pages.lock().unwrap().clone())
        }
    }

    fn raw(id: &str, title: &str, url: &str, ty: &str, description: Option<&str>) -> RawPageEntry {
        RawPageEntry {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            ty: ty.into(),
            description: description.map(str::to_owned),
            web_socket_debugger_url: Some(format!("ws://x/{id}")),
        }
    }

    #[test]
    fn discovery_filters_non_page_and_hidden_entries() {
        let enumerator = Arc::new(FixedEnumerator {
            pages: StdMutex::new(vec![
                raw("1", "a", "http://a", "page", Some(r#"{"visible":true}"#)),
                raw("2", "b", "http://b", "page", Some(r#"{"width":100,"height":50,"visible":true}"#)),
                raw("3", "c", "http://c", "page", Some(r#"{"width":100,"height":50,"visible":true}"#)),
                raw("4", "d", "http://d", "iframe", None),
            ]),
        });
        Master::reset_registry_for_test();
        let master = Master::get_with("localhost", 9001, enumerator, default_logger());
        let pages = master.get_page_list().unwrap();
        let ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn find_page_disambiguates_by_url_and_recency() {
        let enumerator = Arc::new(FixedEnumerator {
            pages: StdMutex::new(vec![
                raw("1", "测试", "http://www.qq.com/", "page", Some(r#"{"width":10,"height":10}"#)),
                raw("2", "测试", "http://other.example/", "page", Some(r#"{"width":10,"height":10}"#)),
            ]),
        });
        Master::reset_registry_for_test();
        let master = Master::get_with("localhost", 9002, enumerator, default_logger());

        let by_url = master.find_page(Some("测试"), Some("http://www.qq.com/"), true, Duration::from_millis(50)).unwrap();
        assert_eq!(by_url.id, "1");

        let err = master.find_page(Some("测试"), None, false, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, CdpError::Other(_)));
    }

    #[test]
    fn get_with_dedups_by_address() {
        Master::reset_registry_for_test();
        let a = Master::get("localhost", 9100);
        let b = Master::get("localhost", 9100);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
