//! `Log.*` — violation reports and console-adjacent log entries
//! (spec.md §4.8).

use serde::{Deserialize, Serialize};

use super::command;
use crate::protocol::EmptyResponse;

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnableParams {}
command!(EnableParams, "Log.enable", EmptyResponse);

#[derive(Debug, Clone, Serialize)]
pub struct ViolationSetting {
    pub name: &'static str,
    pub threshold: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartViolationsReportParams {
    pub config: Vec<ViolationSetting>,
}
command!(StartViolationsReportParams, "Log.startViolationsReport", EmptyResponse);

#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventEntryAdded {
    pub entry: LogEntry,
}
