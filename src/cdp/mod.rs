//! Hand-written per-namespace CDP command/event wire types.
//!
//! The teacher crate generates this layer wholesale from the protocol's PDL
//! files (`chromiumoxide_cdp`, driven by `build.rs` + `chromeoxid_pdl`); this
//! crate only needs the seven namespaces spec.md names, so the types below
//! are hand-written in the same shape the generator produces (newtype ids,
//! `#[serde(rename_all = "camelCase")]`, `Option<T>` + `skip_serializing_if`
//! for optional fields) rather than pulled in via codegen.

pub mod dom;
pub mod input;
pub mod log;
pub mod network;
pub mod page;
pub mod runtime;
pub mod target;

/// Implements [`crate::protocol::Method`] and [`crate::protocol::Command`]
/// for a params struct in one line.
macro_rules! command {
    ($ty:ty, $identifier:literal, $response:ty) => {
        impl crate::protocol::Method for $ty {
            fn identifier(&self) -> &'static str {
                $identifier
            }
        }
        impl crate::protocol::Command for $ty {
            type Response = $response;
        }
    };
}

pub(crate) use command;
