//! `Page.*` — frame tree, dialogs, screencast, screenshots (spec.md §4.4).

use serde::{Deserialize, Serialize};

use super::command;
use crate::protocol::EmptyResponse;

pub type FrameId = String;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: FrameId,
    #[serde(default)]
    pub parent_id: Option<FrameId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTreeNode {
    pub frame: Frame,
    #[serde(default)]
    pub child_frames: Vec<FrameTreeNode>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnableParams {}
command!(EnableParams, "Page.enable", EmptyResponse);

#[derive(Debug, Clone, Default, Serialize)]
pub struct GetResourceTreeParams {}
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResourceTreeResponse {
    pub frame_tree: FrameTreeNode,
}
command!(GetResourceTreeParams, "Page.getResourceTree", GetResourceTreeResponse);

#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptureScreenshotParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureScreenshotResponse {
    pub data: String,
}
command!(CaptureScreenshotParams, "Page.captureScreenshot", CaptureScreenshotResponse);

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartScreencastParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub every_nth_frame: Option<i64>,
}
command!(StartScreencastParams, "Page.startScreencast", EmptyResponse);

#[derive(Debug, Clone, Default, Serialize)]
pub struct StopScreencastParams {}
command!(StopScreencastParams, "Page.stopScreencast", EmptyResponse);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleJavaScriptDialogParams {
    pub accept: bool,
}
command!(HandleJavaScriptDialogParams, "Page.handleJavaScriptDialog", EmptyResponse);

#[derive(Debug, Clone, Default, Serialize)]
pub struct GetLayoutMetricsParams {}
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualViewport {
    pub scale: f64,
    pub client_width: f64,
    pub client_height: f64,
}
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLayoutMetricsResponse {
    pub visual_viewport: VisualViewport,
}
command!(GetLayoutMetricsParams, "Page.getLayoutMetrics", GetLayoutMetricsResponse);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrameNavigated {
    pub frame: Frame,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrameAttached {
    pub frame_id: FrameId,
    pub parent_frame_id: FrameId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrameDetached {
    pub frame_id: FrameId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventJavascriptDialogOpening {
    pub message: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreencastFrameMetadata {
    pub timestamp: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventScreencastFrame {
    pub data: String,
    pub metadata: ScreencastFrameMetadata,
    pub session_id: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreencastFrameAckParams {
    pub session_id: i64,
}
command!(ScreencastFrameAckParams, "Page.screencastFrameAck", EmptyResponse);
