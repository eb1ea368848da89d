//! `InputHandler` — synthetic mouse/keyboard events (spec.md §4.7).
//!
//! Grounded on the teacher's `Page::click`/`Page::move_mouse` helpers in
//! `src/page.rs`, which drive `Input.dispatchMouseEvent` directly; this
//! crate's version additionally owns the keyboard modifier-accumulator and
//! the interpolated-drag math the spec names, since the teacher leaves
//! those to higher-level `Key`/`input` crates this spec has no use for.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::cdp::input::{DispatchKeyEventParams, DispatchMouseEventParams};
use crate::debugger::Debugger;
use crate::error::Result;
use crate::handler::{impl_as_any, Handler};

/// Modifier bit flags, summed into `DispatchKeyEventParams::modifiers`
/// (spec.md §4.7).
pub const MODIFIER_ALT: u32 = 1;
pub const MODIFIER_CTRL: u32 = 2;
pub const MODIFIER_COMMAND: u32 = 4;
pub const MODIFIER_SHIFT: u32 = 8;

/// One entry of the `send_keys` accumulator: either a modifier (added to the
/// running mask, no event emitted) or a key code (emits `keyDown`/`keyUp`
/// with the current mask, then resets it to 0).
#[derive(Debug, Clone, Copy)]
pub enum KeyInput {
    Modifier(u32),
    Code(u32),
}

/// Synthesizes mouse and keyboard input (spec.md §4.7).
#[derive(Default)]
pub struct InputHandler;

impl InputHandler {
    pub fn hover(&self, debugger: &Arc<Debugger>, session_id: Option<&str>, x: f64, y: f64) -> Result<()> {
        debugger.send_request(
            session_id,
            DispatchMouseEventParams { ty: "mouseMoved", x, y, button: None, click_count: None },
        )?;
        Ok(())
    }

    /// `mousePressed` then (optionally sleeping `duration`) `mouseReleased`,
    /// both `button=left, clickCount=1` (spec.md §4.7).
    pub fn click(
        &self,
        debugger: &Arc<Debugger>,
        session_id: Option<&str>,
        x: f64,
        y: f64,
        duration: Option<Duration>,
    ) -> Result<()> {
        debugger.send_request(
            session_id,
            DispatchMouseEventParams { ty: "mousePressed", x, y, button: Some("left"), click_count: Some(1) },
        )?;
        if let Some(duration) = duration {
            thread::sleep(duration);
        }
        debugger.send_request(
            session_id,
            DispatchMouseEventParams { ty: "mouseReleased", x, y, button: Some("left"), click_count: Some(1) },
        )?;
        Ok(())
    }

    /// Optionally presses, interpolates `⌊length/step⌋ + 1` intermediate
    /// `mouseMoved` events when `step > 0`, always ends with a final move to
    /// `(x2, y2)`, optionally releases (spec.md §4.7).
    pub fn drag(
        &self,
        debugger: &Arc<Debugger>,
        session_id: Option<&str>,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        step: f64,
        fire_press: bool,
        fire_release: bool,
    ) -> Result<()> {
        if fire_press {
            debugger.send_request(
                session_id,
                DispatchMouseEventParams { ty: "mousePressed", x: x1, y: y1, button: Some("left"), click_count: Some(1) },
            )?;
        }
        if step > 0.0 {
            let length = ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt();
            let step_count = (length / step) as u64 + 1;
            for i in 0..step_count {
                let t = i as f64 / step_count as f64;
                let x = x1 + (x2 - x1) * t;
                let y = y1 + (y2 - y1) * t;
                debugger.send_request(
                    session_id,
                    DispatchMouseEventParams { ty: "mouseMoved", x, y, button: None, click_count: None },
                )?;
            }
        }
        debugger.send_request(
            session_id,
            DispatchMouseEventParams { ty: "mouseMoved", x: x2, y: y2, button: None, click_count: None },
        )?;
        if fire_release {
            debugger.send_request(
                session_id,
                DispatchMouseEventParams { ty: "mouseReleased", x: x2, y: y2, button: Some("left"), click_count: Some(1) },
            )?;
        }
        Ok(())
    }

    /// Processes `codes` against a modifier accumulator (spec.md §4.7):
    /// modifier entries add to the running mask without emitting an event;
    /// a code entry emits `keyDown` then `keyUp` with the current mask, then
    /// resets the mask to 0.
    pub fn send_keys(&self, debugger: &Arc<Debugger>, session_id: Option<&str>, codes: &[KeyInput]) -> Result<()> {
        let mut modifiers = 0u32;
        for code in codes {
            match *code {
                KeyInput::Modifier(bits) => modifiers |= bits,
                KeyInput::Code(key) => {
                    debugger.send_request(
                        session_id,
                        DispatchKeyEventParams {
                            ty: "keyDown",
                            text: None,
                            modifiers: Some(modifiers),
                            windows_virtual_key_code: Some(key),
                        },
                    )?;
                    debugger.send_request(
                        session_id,
                        DispatchKeyEventParams {
                            ty: "keyUp",
                            text: None,
                            modifiers: Some(modifiers),
                            windows_virtual_key_code: Some(key),
                        },
                    )?;
                    modifiers = 0;
                }
            }
        }
        Ok(())
    }

    /// One `dispatchKeyEvent(type=char, text=c)` per code point (spec.md
    /// §4.7).
    pub fn send_text(&self, debugger: &Arc<Debugger>, session_id: Option<&str>, text: &str) -> Result<()> {
        for ch in text.chars() {
            debugger.send_request(
                session_id,
                DispatchKeyEventParams {
                    ty: "char",
                    text: Some(ch.to_string()),
                    modifiers: None,
                    windows_virtual_key_code: None,
                },
            )?;
        }
        Ok(())
    }
}

impl Handler for InputHandler {
    fn namespace(&self) -> &'static str {
        "Input"
    }

    fn on_recv_notify_msg(
        &self,
        _debugger: &Arc<Debugger>,
        _submethod: &str,
        _params: Value,
        _session_id: Option<&str>,
    ) -> Result<()> {
        // `Input` has no events of its own to mirror; it's a pure
        // command-issuing namespace (spec.md §4.7).
        Ok(())
    }

    impl_as_any!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_step_count_matches_length_over_step_plus_one() {
        let length = ((10f64).powi(2) + (0f64).powi(2)).sqrt();
        let step = 2.0;
        let step_count = (length / step) as u64 + 1;
        assert_eq!(step_count, 6);
    }

    #[test]
    fn drag_emits_step_count_intermediate_moves() {
        // Mirrors `InputHandler::drag`'s loop directly: `step_count`
        // intermediate positions, starting at the press point (t=0).
        let length = ((10f64).powi(2) + (0f64).powi(2)).sqrt();
        let step = 2.0;
        let step_count = (length / step) as u64 + 1;
        let positions: Vec<f64> = (0..step_count).map(|i| i as f64 / step_count as f64 * 10.0).collect();
        assert_eq!(positions.len(), step_count as usize);
        assert_eq!(positions[0], 0.0);
    }

    #[test]
    fn modifier_bits_accumulate_then_reset() {
        let mut modifiers = 0u32;
        modifiers |= MODIFIER_SHIFT;
        modifiers |= MODIFIER_CTRL;
        assert_eq!(modifiers, MODIFIER_SHIFT | MODIFIER_CTRL);
        modifiers = 0;
        assert_eq!(modifiers, 0);
    }
}
