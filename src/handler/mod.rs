//! Namespace-handler convention shared by every `handler::*` module
//! (spec.md §4, "Handler base").
//!
//! Grounded on the teacher's dynamic `debugger.page`/`debugger.runtime`
//! attribute-style dispatch (`src/handler/mod.rs`, `src/handler/target.rs`);
//! reworked into an explicit registry keyed by namespace string plus typed
//! accessor methods on [`crate::debugger::Debugger`]. `Handler` is the
//! object-safe half used for event dispatch; registration works off the
//! concrete type directly since there are exactly seven namespaces, all
//! known at compile time (spec.md §9's "process-wide... intentional"
//! guidance applied one level down: no reflection needed here either).

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use crate::debugger::Debugger;
use crate::error::Result;

pub mod dom;
pub mod input;
pub mod log;
pub mod network;
pub mod page;
pub mod runtime;
pub mod target;

/// A registered namespace handler.
///
/// Implementors are constructed with `Default` (cheap, empty state) and
/// wired to a live [`Debugger`] in [`Handler::on_attached`] — the point at
/// which a handler issues its own `enable` call and subscribes to events.
pub trait Handler: Any + Send + Sync {
    /// The CDP method namespace this handler owns, e.g. `"Page"`.
    fn namespace(&self) -> &'static str;

    /// Namespaces that must be registered (and attached) before this one,
    /// per spec.md §4.2 "every declared dependency is recursively
    /// registered".
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    /// Runs once, immediately after registration.
    fn on_attached(&self, _debugger: &Arc<Debugger>) -> Result<()> {
        Ok(())
    }

    /// Dispatches one notification addressed to this namespace.
    /// `submethod` is the part of the CDP method after the first `.`.
    /// Returning `CdpError::MessageNotHandled` schedules a retry
    /// (spec.md §4.2); `CdpError::ConnectionClosed` stops the dispatch
    /// loop; any other error is logged and the loop continues.
    fn on_recv_notify_msg(
        &self,
        debugger: &Arc<Debugger>,
        submethod: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<()>;

    /// Called on every registered handler whenever `TargetHandler` attaches
    /// a new out-of-process subtarget session (spec.md §4.3).
    fn on_new_session(&self, _debugger: &Arc<Debugger>, _session_id: &str) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

/// Implements the `as_any` boilerplate for a handler type.
macro_rules! impl_as_any {
    () => {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    };
}

pub(crate) use impl_as_any;

/// Deserializes notification params, turning a parse failure into a plain
/// (non-retriable) error rather than `MessageNotHandled` — malformed JSON
/// will not fix itself on redelivery.
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(crate::error::CdpError::from)
}
