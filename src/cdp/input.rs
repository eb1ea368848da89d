//! `Input.*` — synthetic mouse/keyboard events (spec.md §4.7).

use serde::Serialize;

use super::command;
use crate::protocol::EmptyResponse;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMouseEventParams {
    #[serde(rename = "type")]
    pub ty: &'static str,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "clickCount")]
    pub click_count: Option<u32>,
}
command!(DispatchMouseEventParams, "Input.dispatchMouseEvent", EmptyResponse);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchKeyEventParams {
    #[serde(rename = "type")]
    pub ty: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "windowsVirtualKeyCode")]
    pub windows_virtual_key_code: Option<u32>,
}
command!(DispatchKeyEventParams, "Input.dispatchKeyEvent", EmptyResponse);
