//! `TargetHandler` — auto-attach subtargets, session map, `on_new_session`
//! fan-out (spec.md §4.3).
//!
//! Grounded on the teacher's `src/handler/target.rs` (`Target`, tracking a
//! target's attached session) and `src/handler/session.rs`; this crate's
//! version owns the bidirectional target↔session map itself rather than
//! threading it through the async `Handler`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::cdp::target::{
    AttachToTargetParams, EventAttachedToTarget, EventDetachedFromTarget, EventTargetCreated,
    EventTargetDestroyed, EventTargetInfoChanged, SessionId, SetAutoAttachParams,
    SetDiscoverTargetsParams, TargetId, TargetInfo,
};
use crate::debugger::Debugger;
use crate::error::{CdpError, Result};
use crate::handler::{impl_as_any, parse_params, Handler};

const WAIT_FOR_SESSION_INTERVAL: Duration = Duration::from_millis(100);
const WAIT_FOR_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct Inner {
    targets: HashMap<TargetId, TargetInfo>,
    target_to_session: HashMap<TargetId, SessionId>,
    session_to_target: HashMap<SessionId, TargetId>,
    /// Set once `Target.setDiscoverTargets` comes back `MethodNotFound`:
    /// the browser is too old for out-of-process iframes (spec.md §4.3).
    discover_disabled: bool,
}

/// Tracks attachable surfaces (pages, out-of-process iframes) and the
/// session multiplexed per attached target.
#[derive(Default)]
pub struct TargetHandler {
    inner: Mutex<Inner>,
}

impl TargetHandler {
    /// All currently attached session ids.
    pub fn get_sessionid_list(&self) -> Vec<SessionId> {
        self.inner.lock().unwrap().session_to_target.keys().cloned().collect()
    }

    /// Short-polls for a session id to appear for `target_id`, per the
    /// general 10s/poll idiom this spec uses for "not mirrored yet" waits.
    pub fn wait_for_session_id(&self, target_id: &str) -> Result<SessionId> {
        let deadline = Instant::now() + WAIT_FOR_SESSION_TIMEOUT;
        loop {
            if let Some(session) = self.inner.lock().unwrap().target_to_session.get(target_id).cloned() {
                return Ok(session);
            }
            if Instant::now() >= deadline {
                return Err(CdpError::Timeout("session id"));
            }
            std::thread::sleep(WAIT_FOR_SESSION_INTERVAL);
        }
    }

    pub fn target_info(&self, target_id: &str) -> Option<TargetInfo> {
        self.inner.lock().unwrap().targets.get(target_id).cloned()
    }

    fn on_target_created(&self, debugger: &Arc<Debugger>, event: EventTargetCreated) -> Result<()> {
        let target_id = event.target_info.target_id.clone();
        let is_page = event.target_info.ty == "page";
        self.inner.lock().unwrap().targets.insert(target_id.clone(), event.target_info);

        if is_page {
            match debugger.send_request(None, AttachToTargetParams { target_id, flatten: true }) {
                Ok(_resp) => {
                    // `attachedToTarget` does the actual bookkeeping; the
                    // direct response only confirms the same session id
                    // that event will carry (spec.md §8 scenario 4).
                }
                Err(CdpError::MethodNotFound(_)) => {}
                Err(err) => {
                    debugger
                        .logger()
                        .warn("handler.target", &format!("attachToTarget failed: {err}"));
                }
            }
        }
        Ok(())
    }

    fn on_attached_to_target(&self, debugger: &Arc<Debugger>, event: EventAttachedToTarget) -> Result<()> {
        let target_id = event.target_info.target_id.clone();
        let session_id = event.session_id.clone();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.targets.insert(target_id.clone(), event.target_info);
            inner.target_to_session.insert(target_id.clone(), session_id.clone());
            inner.session_to_target.insert(session_id.clone(), target_id);
        }

        if let Err(err) = debugger.send_request(
            Some(session_id.as_str()),
            SetAutoAttachParams {
                auto_attach: true,
                wait_for_debugger_on_start: false,
                flatten: true,
            },
        ) {
            debugger
                .logger()
                .warn("handler.target", &format!("setAutoAttach failed: {err}"));
        }

        debugger.broadcast_new_session(&session_id);
        Ok(())
    }

    fn on_detached_from_target(&self, event: EventDetachedFromTarget) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(target_id) = inner.session_to_target.remove(&event.session_id) {
            inner.target_to_session.remove(&target_id);
        }
        Ok(())
    }

    fn on_target_destroyed(&self, event: EventTargetDestroyed) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.targets.remove(&event.target_id);
        if let Some(session_id) = inner.target_to_session.remove(&event.target_id) {
            inner.session_to_target.remove(&session_id);
        }
        Ok(())
    }

    fn on_target_info_changed(&self, event: EventTargetInfoChanged) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .targets
            .insert(event.target_info.target_id.clone(), event.target_info);
        Ok(())
    }
}

impl Handler for TargetHandler {
    fn namespace(&self) -> &'static str {
        "Target"
    }

    fn on_attached(&self, debugger: &Arc<Debugger>) -> Result<()> {
        match debugger.send_request(None, SetDiscoverTargetsParams { discover: true }) {
            Ok(_) => Ok(()),
            Err(CdpError::MethodNotFound(_)) => {
                self.inner.lock().unwrap().discover_disabled = true;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn on_recv_notify_msg(
        &self,
        debugger: &Arc<Debugger>,
        submethod: &str,
        params: Value,
        _session_id: Option<&str>,
    ) -> Result<()> {
        match submethod {
            "targetCreated" => self.on_target_created(debugger, parse_params(params)?),
            "attachedToTarget" => self.on_attached_to_target(debugger, parse_params(params)?),
            "detachedFromTarget" => self.on_detached_from_target(parse_params(params)?),
            "targetDestroyed" => self.on_target_destroyed(parse_params(params)?),
            "targetInfoChanged" => self.on_target_info_changed(parse_params(params)?),
            _ => Ok(()),
        }
    }

    impl_as_any!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_discover_enabled() {
        let handler = TargetHandler::default();
        assert!(!handler.inner.lock().unwrap().discover_disabled);
        assert!(handler.get_sessionid_list().is_empty());
    }
}
