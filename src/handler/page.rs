//! `PageHandler` — frame tree mirror, screencast buffer, dialog
//! auto-dismiss, layout metrics, screenshot (spec.md §4.4).
//!
//! Grounded on the teacher's `src/handler/frame.rs` (frame tree bookkeeping
//! from `frameNavigated`/`frameAttached`/`frameDetached`); generalized to a
//! plain mirror struct driven entirely by the blocking `Handler` trait
//! rather than the teacher's `NavigationId`/`CommandFuture` machinery.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;

use crate::cdp::page::{
    CaptureScreenshotParams, EnableParams, EventFrameAttached, EventFrameDetached,
    EventFrameNavigated, EventJavascriptDialogOpening, EventScreencastFrame, FrameId,
    FrameTreeNode, GetLayoutMetricsParams, GetLayoutMetricsResponse, GetResourceTreeParams,
    HandleJavaScriptDialogParams, ScreencastFrameAckParams,
};
use crate::debugger::Debugger;
use crate::error::{CdpError, Result};
use crate::handler::{impl_as_any, parse_params, Handler};
use crate::video::{self, ScreencastEncoder, VideoCodec};

const QUIESCENCE_WINDOW: Duration = Duration::from_secs(5);
const QUIESCENCE_POLL: Duration = Duration::from_millis(100);
const SCREENCAST_FPS: f64 = 10.0;

#[derive(Debug, Clone)]
struct FrameEntry {
    parent_id: Option<FrameId>,
    name: Option<String>,
    url: Option<String>,
    children: Vec<FrameId>,
}

#[derive(Default)]
struct Inner {
    root: Option<FrameId>,
    frames: HashMap<FrameId, FrameEntry>,
    screencast: Vec<video::ScreencastFrame>,
    last_frame_at: Option<Instant>,
}

impl Inner {
    /// Evicts `frame_id`'s subtree from the mirror, detaching it from its
    /// parent's child list first.
    fn evict_subtree(&mut self, frame_id: &str) {
        let children = self
            .frames
            .get(frame_id)
            .map(|f| f.children.clone())
            .unwrap_or_default();
        for child in children {
            self.evict_subtree(&child);
        }
        self.frames.remove(frame_id);
    }

    fn ingest_tree(&mut self, node: &FrameTreeNode, parent_id: Option<FrameId>) {
        let id = node.frame.id.clone();
        self.frames.insert(
            id.clone(),
            FrameEntry {
                parent_id: parent_id.clone(),
                name: node.frame.name.clone(),
                url: node.frame.url.clone(),
                children: node.child_frames.iter().map(|c| c.frame.id.clone()).collect(),
            },
        );
        if let Some(parent_id) = &parent_id {
            if let Some(parent) = self.frames.get_mut(parent_id) {
                if !parent.children.contains(&id) {
                    parent.children.push(id.clone());
                }
            }
        }
        for child in &node.child_frames {
            self.ingest_tree(child, Some(id.clone()));
        }
    }
}

/// Mirrors the frame tree and owns the screencast buffer (spec.md §4.4).
#[derive(Default)]
pub struct PageHandler {
    inner: Mutex<Inner>,
}

impl PageHandler {
    fn handle_frame_navigated(&self, event: EventFrameNavigated) -> Result<()> {
        let frame = event.frame;
        let mut inner = self.inner.lock().unwrap();

        match &frame.parent_id {
            None => {
                // Root replacement (spec.md §4.4): any `frameNavigated`
                // without a parent resets the whole tree.
                inner.frames.clear();
                inner.frames.insert(
                    frame.id.clone(),
                    FrameEntry { parent_id: None, name: frame.name, url: frame.url, children: Vec::new() },
                );
                inner.root = Some(frame.id);
                Ok(())
            }
            Some(parent_id) => {
                if !inner.frames.contains_key(parent_id) {
                    // Parent not mirrored yet: retry once a prior event
                    // (likely an earlier `frameNavigated`/`frameAttached`
                    // for that parent) lands (spec.md §8 scenario 5).
                    return Err(CdpError::MessageNotHandled);
                }
                // Sibling replacement: drop any existing child with this
                // id before re-inserting (re-navigation).
                if let Some(parent) = inner.frames.get_mut(parent_id) {
                    parent.children.retain(|c| c != &frame.id);
                }
                inner.evict_subtree(&frame.id);
                inner.frames.insert(
                    frame.id.clone(),
                    FrameEntry {
                        parent_id: Some(parent_id.clone()),
                        name: frame.name,
                        url: frame.url,
                        children: Vec::new(),
                    },
                );
                if let Some(parent) = inner.frames.get_mut(parent_id) {
                    parent.children.push(frame.id);
                }
                Ok(())
            }
        }
    }

    fn handle_frame_attached(&self, event: EventFrameAttached) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.frames.contains_key(&event.parent_frame_id) {
            return Err(CdpError::MessageNotHandled);
        }
        inner.frames.entry(event.frame_id.clone()).or_insert_with(|| FrameEntry {
            parent_id: Some(event.parent_frame_id.clone()),
            name: None,
            url: None,
            children: Vec::new(),
        });
        if let Some(parent) = inner.frames.get_mut(&event.parent_frame_id) {
            if !parent.children.contains(&event.frame_id) {
                parent.children.push(event.frame_id);
            }
        }
        Ok(())
    }

    fn handle_frame_detached(&self, event: EventFrameDetached) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.frames.get(&event.frame_id) {
            if let Some(parent_id) = entry.parent_id.clone() {
                if let Some(parent) = inner.frames.get_mut(&parent_id) {
                    parent.children.retain(|c| c != &event.frame_id);
                }
            }
        }
        inner.evict_subtree(&event.frame_id);
        if inner.root.as_deref() == Some(event.frame_id.as_str()) {
            inner.root = None;
        }
        Ok(())
    }

    /// Lazily resolves the root frame id if the mirror is empty, by
    /// re-pulling `getResourceTree` (spec.md §4.4).
    pub fn get_main_frame_id(&self, debugger: &Arc<Debugger>) -> Result<FrameId> {
        if let Some(root) = self.inner.lock().unwrap().root.clone() {
            return Ok(root);
        }
        let resp = debugger.send_request(None, GetResourceTreeParams {})?;
        let mut inner = self.inner.lock().unwrap();
        inner.frames.clear();
        inner.ingest_tree(&resp.frame_tree, None);
        inner.root = Some(resp.frame_tree.frame.id.clone());
        Ok(resp.frame_tree.frame.id)
    }

    pub fn get_layout_metrics(
        &self,
        debugger: &Arc<Debugger>,
        session_id: Option<&str>,
    ) -> Result<GetLayoutMetricsResponse> {
        debugger.send_request(session_id, GetLayoutMetricsParams {})
    }

    pub fn screenshot(&self, debugger: &Arc<Debugger>, session_id: Option<&str>, format: Option<String>) -> Result<Vec<u8>> {
        let resp = debugger.send_request(session_id, CaptureScreenshotParams { format })?;
        BASE64
            .decode(resp.data)
            .map_err(|e| CdpError::Other(format!("invalid screenshot base64: {e}")))
    }

    fn handle_screencast_frame(&self, debugger: &Arc<Debugger>, session_id: Option<&str>, event: EventScreencastFrame) -> Result<()> {
        let data = BASE64
            .decode(&event.data)
            .map_err(|e| CdpError::Other(format!("invalid screencast base64: {e}")))?;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.screencast.push(video::ScreencastFrame { timestamp: event.metadata.timestamp, data });
            inner.last_frame_at = Some(Instant::now());
        }
        if let Err(err) = debugger.send_request(session_id, ScreencastFrameAckParams { session_id: event.session_id }) {
            debugger.logger().warn("handler.page", &format!("screencastFrameAck failed: {err}"));
        }
        Ok(())
    }

    /// Waits for 5s of frame quiescence, then hands the buffered frames —
    /// expanded per spec.md §4.4's duplication math — to `encoder` at a
    /// fixed 10 FPS, choosing the container from `path`'s suffix.
    pub fn save_screen_record(&self, path: impl AsRef<std::path::Path>, encoder: &dyn ScreencastEncoder) -> Result<()> {
        loop {
            let last = self.inner.lock().unwrap().last_frame_at;
            match last {
                Some(at) if at.elapsed() < QUIESCENCE_WINDOW => {
                    std::thread::sleep(QUIESCENCE_POLL);
                }
                _ => break,
            }
        }
        let path = path.as_ref();
        let codec = VideoCodec::for_path(path);
        let inner = self.inner.lock().unwrap();
        let frames = video::expand_frames(&inner.screencast, SCREENCAST_FPS);
        encoder.encode(path, &frames, SCREENCAST_FPS as u32, codec)
    }
}

impl Handler for PageHandler {
    fn namespace(&self) -> &'static str {
        "Page"
    }

    fn on_attached(&self, debugger: &Arc<Debugger>) -> Result<()> {
        debugger.send_request(None, EnableParams {})?;
        Ok(())
    }

    fn on_recv_notify_msg(
        &self,
        debugger: &Arc<Debugger>,
        submethod: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<()> {
        match submethod {
            "frameNavigated" => self.handle_frame_navigated(parse_params(params)?),
            "frameAttached" => self.handle_frame_attached(parse_params(params)?),
            "frameDetached" => self.handle_frame_detached(parse_params(params)?),
            "javascriptDialogOpening" => {
                let _event: EventJavascriptDialogOpening = parse_params(params)?;
                if let Err(err) = debugger.send_request(session_id, HandleJavaScriptDialogParams { accept: true }) {
                    debugger.logger().warn("handler.page", &format!("handleJavaScriptDialog failed: {err}"));
                }
                Ok(())
            }
            "screencastFrame" => self.handle_screencast_frame(debugger, session_id, parse_params(params)?),
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
    use crate::cdp::page::Frame;

    #[test]
    fn root_navigation_resets_tree() {
        let handler = PageHandler::default();
        handler
            .handle_frame_navigated(EventFrameNavigated {
                frame: Frame { id: "root".into(), parent_id: None, name: None, url: Some("http://a".into()) },
            })
            .unwrap();
        assert_eq!(handler.inner.lock().unwrap().root.as_deref(), Some("root"));
        assert_eq!(handler.inner.lock().unwrap().frames.len(), 1);
    }

    #[test]
    fn child_navigation_with_unknown_parent_retries() {
        let handler = PageHandler::default();
        let err = handler
            .handle_frame_navigated(EventFrameNavigated {
                frame: Frame { id: "child".into(), parent_id: Some("missing-parent".into()), name: None, url: None },
            })
            .unwrap_err();
        assert!(matches!(err, CdpError::MessageNotHandled));
    }

    #[test]
    fn renavigation_replaces_sibling_keeping_parent() {
        let handler = PageHandler::default();
        handler
            .handle_frame_navigated(EventFrameNavigated {
                frame: Frame { id: "root".into(), parent_id: None, name: None, url: None },
            })
            .unwrap();
        handler
            .handle_frame_navigated(EventFrameNavigated {
                frame: Frame { id: "child".into(), parent_id: Some("root".into()), name: None, url: Some("http://a".into()) },
            })
            .unwrap();
        handler
            .handle_frame_navigated(EventFrameNavigated {
                frame: Frame { id: "child".into(), parent_id: Some("root".into()), name: None, url: Some("http://b".into()) },
            })
            .unwrap();
        let inner = handler.inner.lock().unwrap();
        assert_eq!(inner.frames.get("root").unwrap().children, vec!["child".to_string()]);
        assert_eq!(inner.frames.get("child").unwrap().url.as_deref(), Some("http://b"));
    }
}
