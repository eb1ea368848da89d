//! Client-side Chrome DevTools Protocol implementation: page discovery,
//! a blocking RPC multiplexer over one websocket connection per page, and
//! typed per-namespace handlers (`Page`, `Runtime`, `DOM`, `Input`, `Log`,
//! `Network`, `Target`) that keep a client-side mirror of the page (frame
//! tree, DOM tree, execution contexts, console log ring).
//!
//! Grounded on the teacher crate's top-level module layout
//! (`Browser`/`Handler`/`Page`/`cdp::*`); see `DESIGN.md` for the full
//! grounding ledger.

pub mod cdp;
pub mod debugger;
pub mod error;
pub mod handler;
pub mod logging;
pub mod master;
pub mod page_enum;
pub mod protocol;
pub mod transport;
pub mod video;

pub use debugger::Debugger;
pub use error::{CdpError, Result};
pub use logging::Logger;
pub use master::Master;
pub use page_enum::{PageDescriptor, PageEnumerator};
