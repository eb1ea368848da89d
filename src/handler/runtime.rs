//! `RuntimeHandler` — execution-context map, script evaluation, console-log
//! ring, object-property fetch (spec.md §4.5).
//!
//! Grounded on the teacher's `src/handler/execution.rs` (execution-context
//! bookkeeping from `executionContextCreated`/`executionContextDestroyed`);
//! this crate additionally owns the evaluate-shim encoding the teacher
//! leaves to chromiumoxide's typed `Runtime.evaluate` builder, since this
//! spec's client speaks to the shim's `'S'`/`'E'` wire convention directly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::cdp::page::FrameId;
use crate::cdp::runtime::{
    EnableParams, EvaluateParams, EventConsoleApiCalled, EventExecutionContextCreated,
    EventExecutionContextDestroyed, ExecutionContextId, GetPropertiesParams, RemoteObject,
    RemoteObjectId,
};
use crate::debugger::Debugger;
use crate::error::{CdpError, JavaScriptError, Result, WireError};
use crate::handler::{impl_as_any, parse_params, Handler};

/// Console ring capacity (spec.md §3, §8).
pub const MAX_CONSOLE_LOG_COUNT: usize = 100;
const CONTEXT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const CONTEXT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// One resolved console-API argument (spec.md §3): primitives are copied,
/// objects are kept as a placeholder until resolved via `getProperties`.
#[derive(Debug, Clone)]
pub enum ConsoleValue {
    Primitive(Value),
    Object { object_id: RemoteObjectId, description: Option<String> },
}

#[derive(Debug, Clone)]
pub struct ConsoleLogEntry {
    pub timestamp: f64,
    pub function: Option<String>,
    pub frame_id: Option<FrameId>,
    pub ty: String,
    pub values: Vec<ConsoleValue>,
}

#[derive(Debug, Clone)]
struct ExecutionContextEntry {
    frame_id: Option<FrameId>,
}

#[derive(Default)]
struct Inner {
    contexts: HashMap<ExecutionContextId, ExecutionContextEntry>,
    frame_to_context: HashMap<FrameId, ExecutionContextId>,
    console_log: VecDeque<ConsoleLogEntry>,
}

/// Builds the fixed evaluate shim (spec.md §4.5): wraps `script` in a
/// `try/catch`, coercing the result to a string prefixed with `'S'`
/// (success) or `'E'` + `\n` + stack (thrown). `\\`, `"`, `\r`, `\n` in the
/// raw script are escaped before embedding.
fn build_shim(script: &str) -> String {
    let escaped = script
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\r', "\\r")
        .replace('\n', "\\n");
    format!(
        "(function(){{try{{var __r=eval(\"{escaped}\");return 'S'+String(__r);}}\
catch(e){{return 'E'+String(e)+'\\n'+((e&&e.stack)?e.stack:'');}}}})()"
    )
}

/// Decodes a shim response per spec.md §4.5/§8: `'S…'` is a success value,
/// `'E…'` is a thrown exception (message is the text up to the first
/// `\n`), any other prefix is a protocol error.
fn decode_shim_result(value: &str, frame_id: &str) -> Result<String> {
    let mut chars = value.chars();
    match chars.next() {
        Some('S') => Ok(chars.as_str().to_string()),
        Some('E') => {
            let rest = chars.as_str();
            let message = rest.split_once('\n').map(|(m, _)| m).unwrap_or(rest);
            Err(CdpError::JavaScript(JavaScriptError { frame: frame_id.to_string(), message: message.to_string() }))
        }
        _ => Err(CdpError::Protocol(WireError {
            code: 0,
            message: format!("unexpected evaluate shim prefix: {value:?}"),
            data: None,
        })),
    }
}

/// Execution-context bookkeeping, script evaluation and the console-log
/// ring (spec.md §4.5).
#[derive(Default)]
pub struct RuntimeHandler {
    inner: Mutex<Inner>,
}

impl RuntimeHandler {
    fn on_context_created(&self, event: EventExecutionContextCreated) -> Result<()> {
        if event.context.is_extension() {
            return Ok(());
        }
        let frame_id = event.context.frame_id();
        let mut inner = self.inner.lock().unwrap();
        inner.contexts.insert(event.context.id, ExecutionContextEntry { frame_id: frame_id.clone() });
        if let Some(frame_id) = frame_id {
            inner.frame_to_context.insert(frame_id, event.context.id);
        }
        Ok(())
    }

    fn on_context_destroyed(&self, event: EventExecutionContextDestroyed) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.contexts.remove(&event.execution_context_id) {
            if let Some(frame_id) = entry.frame_id {
                if inner.frame_to_context.get(&frame_id) == Some(&event.execution_context_id) {
                    inner.frame_to_context.remove(&frame_id);
                }
            }
        }
        Ok(())
    }

    fn on_console_api_called(&self, event: EventConsoleApiCalled) -> Result<()> {
        let function = event.function_name().map(str::to_owned);
        let frame_id = {
            let inner = self.inner.lock().unwrap();
            inner.contexts.get(&event.execution_context_id).and_then(|c| c.frame_id.clone())
        };
        let values = event
            .args
            .into_iter()
            .map(|obj| match obj.object_id {
                Some(object_id) => ConsoleValue::Object { object_id, description: obj.description },
                None => ConsoleValue::Primitive(obj.value.unwrap_or(Value::Null)),
            })
            .collect();
        let entry = ConsoleLogEntry { timestamp: event.timestamp, function, frame_id, ty: event.ty, values };

        let mut inner = self.inner.lock().unwrap();
        inner.console_log.push_back(entry);
        while inner.console_log.len() > MAX_CONSOLE_LOG_COUNT {
            inner.console_log.pop_front();
        }
        Ok(())
    }

    /// The 100 most recent console entries, oldest first.
    pub fn console_log(&self) -> Vec<ConsoleLogEntry> {
        self.inner.lock().unwrap().console_log.iter().cloned().collect()
    }

    /// Non-empty once at least one execution context is live; used by
    /// `Master` as the sentinel that the page is up (spec.md §4.9).
    pub fn get_main_context_id(&self) -> Option<ExecutionContextId> {
        self.inner.lock().unwrap().frame_to_context.values().next().copied()
    }

    fn resolve_context_id(&self, frame_id: Option<&str>) -> Result<ExecutionContextId> {
        let deadline = Instant::now() + CONTEXT_WAIT_TIMEOUT;
        loop {
            {
                let inner = self.inner.lock().unwrap();
                let found = match frame_id {
                    Some(fid) => inner.frame_to_context.get(fid).copied(),
                    None => inner.frame_to_context.values().next().copied(),
                };
                if let Some(context_id) = found {
                    return Ok(context_id);
                }
            }
            if Instant::now() >= deadline {
                return Err(CdpError::Timeout("execution context"));
            }
            thread::sleep(CONTEXT_POLL_INTERVAL);
        }
    }

    /// Evaluates `script` in `frame_id`'s context (or the first live
    /// context if `None`), via the shim described above. Retries context
    /// resolution on `IdNotFound` (the context was evicted mid-call),
    /// bounded by the same 10s/500ms budget (spec.md §4.5).
    pub fn eval_script(
        &self,
        debugger: &Arc<Debugger>,
        session_id: Option<&str>,
        frame_id: Option<&str>,
        script: &str,
    ) -> Result<String> {
        let shim = build_shim(script);
        let deadline = Instant::now() + CONTEXT_WAIT_TIMEOUT;
        let mut last_err = None;
        loop {
            let context_id = self.resolve_context_id(frame_id)?;
            let params = EvaluateParams {
                expression: shim.clone(),
                context_id,
                object_group: "cdp".into(),
                include_command_line_api: false,
                silent: true,
                return_by_value: true,
                generate_preview: false,
            };
            match debugger.send_request(session_id, params) {
                Ok(resp) => {
                    let value = resp
                        .result
                        .value
                        .as_ref()
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| CdpError::Other("evaluate returned a non-string shim value".into()))?;
                    return decode_shim_result(value, frame_id.unwrap_or_default());
                }
                Err(CdpError::IdNotFound(err)) => {
                    last_err = Some(CdpError::IdNotFound(err));
                    if Instant::now() >= deadline {
                        return Err(last_err.unwrap());
                    }
                    thread::sleep(CONTEXT_POLL_INTERVAL);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Resolves an object placeholder left by `consoleAPICalled` (or any
    /// other `RemoteObject` reference) into its own-property map.
    pub fn get_properties(
        &self,
        debugger: &Arc<Debugger>,
        session_id: Option<&str>,
        object_id: RemoteObjectId,
    ) -> Result<HashMap<String, Option<RemoteObject>>> {
        let resp = debugger.send_request(
            session_id,
            GetPropertiesParams { object_id, own_properties: true },
        )?;
        Ok(resp.result.into_iter().map(|p| (p.name, p.value)).collect())
    }
}

impl Handler for RuntimeHandler {
    fn namespace(&self) -> &'static str {
        "Runtime"
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
            "executionContextCreated" => self.on_context_created(parse_params(params)?),
            "executionContextDestroyed" => self.on_context_destroyed(parse_params(params)?),
            "consoleAPICalled" => self.on_console_api_called(parse_params(params)?),
            _ => Ok(()),
        }
    }

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
    fn shim_escapes_special_characters() {
        let shim = build_shim("a\\b\"c\r\nd");
        assert!(shim.contains("a\\\\b\\\"c\\r\\nd"));
    }

    #[test]
    fn success_prefix_yields_value() {
        assert_eq!(decode_shim_result("Shello", "f").unwrap(), "hello");
    }

    #[test]
    fn error_prefix_yields_javascript_error() {
        let err = decode_shim_result("E[TypeError]x is not a function\nstack...", "f").unwrap_err();
        match err {
            CdpError::JavaScript(e) => assert!(e.message.starts_with("[TypeError]")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_prefix_is_protocol_error() {
        let err = decode_shim_result("Xwhatever", "f").unwrap_err();
        assert!(matches!(err, CdpError::Protocol(_)));
    }

    #[test]
    fn console_ring_caps_at_100() {
        let handler = RuntimeHandler::default();
        for i in 0..150 {
            handler
                .on_console_api_called(EventConsoleApiCalled {
                    ty: "log".into(),
                    args: vec![],
                    execution_context_id: 1,
                    timestamp: i as f64,
                    stack_trace: None,
                })
                .unwrap();
        }
        let log = handler.console_log();
        assert_eq!(log.len(), MAX_CONSOLE_LOG_COUNT);
        assert_eq!(log.first().unwrap().timestamp, 50.0);
        assert_eq!(log.last().unwrap().timestamp, 149.0);
    }
}
