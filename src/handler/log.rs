//! `LogHandler` — violation reports, forwarding `Log.entryAdded` to the
//! injected logger sink (spec.md §4.8).
//!
//! Grounded on the teacher's use of `tracing` to surface CDP-side
//! diagnostics; the violation threshold table itself has no teacher
//! counterpart (chromiumoxide never calls `Log.startViolationsReport`), so
//! it is lifted from spec.md §4.8's fixed table, enriched the way the other
//! handlers are — typed params, `on_attached`/`on_recv_notify_msg`.

use std::sync::Arc;

use serde_json::Value;

use crate::cdp::log::{EnableParams, EventEntryAdded, StartViolationsReportParams, ViolationSetting};
use crate::debugger::Debugger;
use crate::error::{CdpError, Result};
use crate::handler::{impl_as_any, parse_params, Handler};

/// Fixed violation-threshold table (spec.md §4.8): `-1` disables reporting
/// for that violation type.
fn violation_config() -> Vec<ViolationSetting> {
    vec![
        ViolationSetting { name: "longTask", threshold: 200 },
        ViolationSetting { name: "longLayout", threshold: 30 },
        ViolationSetting { name: "blockedEvent", threshold: 100 },
        ViolationSetting { name: "handler", threshold: 150 },
        ViolationSetting { name: "recurringHandler", threshold: 50 },
        ViolationSetting { name: "blockedParser", threshold: -1 },
        ViolationSetting { name: "discouragedAPIUse", threshold: -1 },
    ]
}

/// Enables the `Log` domain and forwards `entryAdded` to the injected
/// logger (spec.md §4.8).
#[derive(Default)]
pub struct LogHandler;

impl Handler for LogHandler {
    fn namespace(&self) -> &'static str {
        "Log"
    }

    fn on_attached(&self, debugger: &Arc<Debugger>) -> Result<()> {
        match debugger.send_request(None, EnableParams {}) {
            Ok(_) => {}
            Err(CdpError::MethodNotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        }
        debugger.send_request(None, StartViolationsReportParams { config: violation_config() })?;
        Ok(())
    }

    fn on_recv_notify_msg(
        &self,
        debugger: &Arc<Debugger>,
        submethod: &str,
        params: Value,
        _session_id: Option<&str>,
    ) -> Result<()> {
        if submethod == "entryAdded" {
            let event: EventEntryAdded = parse_params(params)?;
            let url = event.entry.url.as_deref().unwrap_or("");
            let message = format!("{} {url}", event.entry.text);
            match event.entry.level.as_str() {
                "error" => debugger.logger().error("handler.log", &message),
                "warning" => debugger.logger().warn("handler.log", &message),
                _ => debugger.logger().info("handler.log", &message),
            }
        }
        Ok(())
    }

    impl_as_any!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_table_disables_blocked_parser_and_discouraged_api() {
        let config = violation_config();
        let blocked_parser = config.iter().find(|v| v.name == "blockedParser").unwrap();
        let discouraged = config.iter().find(|v| v.name == "discouragedAPIUse").unwrap();
        assert_eq!(blocked_parser.threshold, -1);
        assert_eq!(discouraged.threshold, -1);
        assert_eq!(config.iter().find(|v| v.name == "longTask").unwrap().threshold, 200);
    }
}
