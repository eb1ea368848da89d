//! The RPC multiplexer (spec.md §4.2): request correlation, the inbound
//! notification queue, the delayed-retry queue, the handler registry and
//! its dispatch thread.
//!
//! Grounded on the teacher's `Handler` (`src/handler/mod.rs`, an async
//! `Stream` polled by an executor, with a `pending_commands` table and a
//! `conn: Connection` field); this crate expresses the same correlation and
//! fan-out with blocking primitives and a dedicated OS thread, per spec.md
//! §5's thread-per-transport / thread-per-dispatch concurrency model. A
//! `PendingCall` here is the `CommandFuture` there (`src/handler/commandfuture.rs`):
//! a single-assignment slot completed by the receive path and awaited by
//! the caller.

use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fnv::FnvHashMap;
use serde_json::Value;

use crate::error::{CdpError, Result};
use crate::handler::dom::DomHandler;
use crate::handler::input::InputHandler;
use crate::handler::log::LogHandler;
use crate::handler::network::NetworkHandler;
use crate::handler::page::PageHandler;
use crate::handler::runtime::RuntimeHandler;
use crate::handler::target::TargetHandler;
use crate::handler::Handler;
use crate::logging::Logger;
use crate::protocol::{CallId, Command, EventMessage, Message, Method, Request, Response};
use crate::transport::{SocketFactory, Transport};

/// Hard timeout for `send_request` (spec.md §4.2).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// How long a retried notification waits before its next redelivery attempt.
const RETRY_DELAY: Duration = Duration::from_secs(2);
/// Age past which a retried notification is dropped (spec.md §3).
const RETRY_TTL: Duration = Duration::from_secs(10);
/// How long the dispatch thread sleeps when both queues are empty.
const DISPATCH_IDLE: Duration = Duration::from_millis(10);

/// A single outstanding `send_request` call: a one-shot slot fulfilled by
/// the receive path, awaited by the calling thread.
struct PendingCall {
    slot: Mutex<Option<Result<Response>>>,
    ready: Condvar,
}

impl PendingCall {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn fulfil(&self, response: Response) {
        let mut guard = self.slot.lock().unwrap();
        if guard.is_none() {
            *guard = Some(Ok(response));
            self.ready.notify_all();
        }
    }

    fn cancel(&self, err: CdpError) {
        let mut guard = self.slot.lock().unwrap();
        if guard.is_none() {
            *guard = Some(Err(err));
            self.ready.notify_all();
        }
    }

    fn wait(&self, timeout: Duration) -> Option<Result<Response>> {
        let guard = self.slot.lock().unwrap();
        let (mut guard, _timed_out) = self
            .ready
            .wait_timeout_while(guard, timeout, |v| v.is_none())
            .unwrap();
        guard.take()
    }
}

/// A queued inbound event, stamped with its arrival time for retry-TTL
/// accounting (spec.md §3).
struct Notification {
    method: String,
    params: Value,
    session_id: Option<String>,
    received_at: Instant,
}

impl Notification {
    fn namespace(&self) -> &str {
        self.method.split_once('.').map(|(ns, _)| ns).unwrap_or(&self.method)
    }

    fn submethod(&self) -> &str {
        self.method.split_once('.').map(|(_, m)| m).unwrap_or("")
    }
}

struct RetryEntry {
    run_at: Instant,
    notification: Notification,
}

impl PartialEq for RetryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.run_at == other.run_at
    }
}
impl Eq for RetryEntry {}
impl PartialOrd for RetryEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for RetryEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.run_at.cmp(&other.run_at)
    }
}

/// One debuggable page's persistent connection: the RPC multiplexer
/// described in spec.md §4.2, owning its `Transport` and its handler
/// registry.
pub struct Debugger {
    transport: Transport,
    seq: AtomicU64,
    /// `FnvHashMap` per the teacher's own `pending_commands` table
    /// (`src/handler/mod.rs`) — small integer keys, no need for a
    /// DoS-resistant hasher.
    pending: Mutex<FnvHashMap<CallId, Arc<PendingCall>>>,
    main_queue: Mutex<VecDeque<Notification>>,
    retry_queue: Mutex<BinaryHeap<Reverse<RetryEntry>>>,
    /// Object-safe view of each registered handler, used for dispatch and
    /// for `on_new_session` fan-out.
    dispatch: Mutex<HashMap<&'static str, Arc<dyn Handler>>>,
    /// Each entry is really a `Box<Arc<T>>` for the concrete handler type,
    /// boxed as `Any` so `register_handler::<T>()` can hand back the exact
    /// `Arc<T>` it was constructed with instead of re-wrapping a trait
    /// object (the classic "erase, then downcast the box" trick — see
    /// `typed_existing`).
    typed: Mutex<HashMap<&'static str, Box<dyn Any + Send + Sync>>>,
    logger: Arc<dyn Logger>,
    running: AtomicBool,
    dispatch_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Debugger {
    /// Dials `url` (or the supplied socket factory), waits for the
    /// transport to open, and spawns the dispatch thread. Registers no
    /// handlers itself — that's the caller's job (spec.md §2 data flow;
    /// `Master` does it in dependency order).
    pub fn connect(
        url: impl Into<String>,
        factory: Option<SocketFactory>,
        logger: Arc<dyn Logger>,
    ) -> Result<Arc<Self>> {
        let url = url.into();
        let debugger = Arc::new_cyclic(|weak: &Weak<Debugger>| {
            let on_message_weak = weak.clone();
            let on_close_weak = weak.clone();
            let transport = Transport::connect(
                url,
                factory,
                move |text| {
                    if let Some(d) = on_message_weak.upgrade() {
                        d.on_message(text);
                    }
                },
                move || {
                    if let Some(d) = on_close_weak.upgrade() {
                        d.on_transport_closed();
                    }
                },
            );
            Debugger {
                transport,
                seq: AtomicU64::new(0),
                pending: Mutex::new(FnvHashMap::default()),
                main_queue: Mutex::new(VecDeque::new()),
                retry_queue: Mutex::new(BinaryHeap::new()),
                dispatch: Mutex::new(HashMap::new()),
                typed: Mutex::new(HashMap::new()),
                logger,
                running: AtomicBool::new(true),
                dispatch_thread: Mutex::new(None),
            }
        });

        debugger.transport.wait_until_open().map_err(|err| {
            debugger.running.store(false, Ordering::SeqCst);
            err
        })?;

        let dispatcher = debugger.clone();
        let handle = thread::Builder::new()
            .name("cdp-dispatch".into())
            .spawn(move || dispatcher.dispatch_loop())
            .map_err(CdpError::Io)?;
        *debugger.dispatch_thread.lock().unwrap() = Some(handle);

        Ok(debugger)
    }

    fn on_message(self: &Arc<Self>, text: String) {
        match Message::parse(&text) {
            Ok(Message::Response(resp)) => self.complete_pending(resp),
            Ok(Message::Event(ev)) => self.enqueue_notification(ev),
            Err(err) => self
                .logger
                .warn("debugger", &format!("malformed frame, dropping: {err}")),
        }
    }

    fn on_transport_closed(self: &Arc<Self>) {
        self.running.store(false, Ordering::SeqCst);
        let pending: Vec<Arc<PendingCall>> = self.pending.lock().unwrap().values().cloned().collect();
        for call in pending {
            call.cancel(CdpError::ConnectionClosed);
        }
    }

    fn complete_pending(&self, resp: Response) {
        let slot = self.pending.lock().unwrap().get(&resp.id).cloned();
        if let Some(slot) = slot {
            slot.fulfil(resp);
        } else {
            self.logger
                .debug("debugger", &format!("response for unknown call id {}", resp.id));
        }
    }

    fn enqueue_notification(&self, ev: EventMessage) {
        let notif = Notification {
            method: ev.method,
            params: ev.params,
            session_id: ev.session_id,
            received_at: Instant::now(),
        };
        self.main_queue.lock().unwrap().push_back(notif);
    }

    /// Allocates `seq`, writes the request, blocks until a response is
    /// paired or `REQUEST_TIMEOUT` elapses (spec.md §4.2).
    pub fn send_request<C: Command>(self: &Arc<Self>, session_id: Option<&str>, params: C) -> Result<C::Response> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CdpError::ConnectionClosed);
        }
        let id = CallId(self.seq.fetch_add(1, Ordering::SeqCst) + 1);
        let method = params.identifier();
        let params_value = serde_json::to_value(&params)?;
        let request = Request {
            id,
            method,
            params: Some(params_value),
            session_id: session_id.map(str::to_owned),
        };
        let frame = serde_json::to_string(&request)?;

        let slot = Arc::new(PendingCall::new());
        self.pending.lock().unwrap().insert(id, slot.clone());

        if let Err(err) = self.transport.send(&frame) {
            self.pending.lock().unwrap().remove(&id);
            return Err(err);
        }

        let outcome = slot.wait(REQUEST_TIMEOUT);
        self.pending.lock().unwrap().remove(&id);
        match outcome {
            Some(Ok(resp)) => resp.into_result::<C::Response>(),
            Some(Err(err)) => Err(err),
            None => Err(CdpError::Timeout("response")),
        }
    }

    fn typed_existing<T: Handler + 'static>(&self, namespace: &str) -> Option<Arc<T>> {
        self.typed
            .lock()
            .unwrap()
            .get(namespace)
            .and_then(|boxed| boxed.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// Idempotent per namespace: re-registering returns the existing
    /// handler instance. Every declared dependency is recursively
    /// registered first (spec.md §4.2).
    pub fn register_handler<T: Handler + Default + 'static>(self: &Arc<Self>) -> Result<Arc<T>> {
        let namespace = T::default().namespace();
        if let Some(existing) = self.typed_existing::<T>(namespace) {
            return Ok(existing);
        }

        let instance = Arc::new(T::default());
        for dep in instance.dependencies() {
            self.register_dependency(dep)?;
        }

        let mut typed = self.typed.lock().unwrap();
        if let Some(existing) = typed.get(namespace).and_then(|b| b.downcast_ref::<Arc<T>>()) {
            return Ok(existing.clone());
        }
        typed.insert(namespace, Box::new(instance.clone()));
        drop(typed);
        self.dispatch
            .lock()
            .unwrap()
            .insert(namespace, instance.clone() as Arc<dyn Handler>);

        instance.on_attached(self)?;
        Ok(instance)
    }

    fn register_dependency(self: &Arc<Self>, namespace: &str) -> Result<()> {
        if self.dispatch.lock().unwrap().contains_key(namespace) {
            return Ok(());
        }
        match namespace {
            "Target" => {
                self.register_handler::<TargetHandler>()?;
            }
            "Page" => {
                self.register_handler::<PageHandler>()?;
            }
            "Runtime" => {
                self.register_handler::<RuntimeHandler>()?;
            }
            "DOM" => {
                self.register_handler::<DomHandler>()?;
            }
            "Input" => {
                self.register_handler::<InputHandler>()?;
            }
            "Log" => {
                self.register_handler::<LogHandler>()?;
            }
            "Network" => {
                self.register_handler::<NetworkHandler>()?;
            }
            other => return Err(CdpError::Other(format!("unknown handler dependency: {other}"))),
        }
        Ok(())
    }

    /// Fails if the namespace isn't currently registered.
    pub fn unregister_handler<T: Handler + Default + 'static>(&self) -> Result<()> {
        let namespace = T::default().namespace();
        let removed = self.typed.lock().unwrap().remove(namespace).is_some();
        self.dispatch.lock().unwrap().remove(namespace);
        if removed {
            Ok(())
        } else {
            Err(CdpError::Other(format!("handler not registered: {namespace}")))
        }
    }

    /// Fan-out of `on_new_session` to every registered handler (spec.md
    /// §4.3): each handler decides for itself whether to re-issue its own
    /// `enable(sessionId=…)`.
    pub fn broadcast_new_session(self: &Arc<Self>, session_id: &str) {
        let handlers: Vec<Arc<dyn Handler>> = self.dispatch.lock().unwrap().values().cloned().collect();
        for handler in handlers {
            if let Err(err) = handler.on_new_session(self, session_id) {
                self.logger
                    .warn("debugger", &format!("on_new_session failed: {err}"));
            }
        }
    }

    pub fn page(&self) -> Result<Arc<PageHandler>> {
        self.typed_existing("Page")
            .ok_or_else(|| CdpError::Other("handler not registered: Page".into()))
    }

    pub fn runtime(&self) -> Result<Arc<RuntimeHandler>> {
        self.typed_existing("Runtime")
            .ok_or_else(|| CdpError::Other("handler not registered: Runtime".into()))
    }

    pub fn dom(&self) -> Result<Arc<DomHandler>> {
        self.typed_existing("DOM")
            .ok_or_else(|| CdpError::Other("handler not registered: DOM".into()))
    }

    pub fn input(&self) -> Result<Arc<InputHandler>> {
        self.typed_existing("Input")
            .ok_or_else(|| CdpError::Other("handler not registered: Input".into()))
    }

    pub fn log_handler(&self) -> Result<Arc<LogHandler>> {
        self.typed_existing("Log")
            .ok_or_else(|| CdpError::Other("handler not registered: Log".into()))
    }

    pub fn network(&self) -> Result<Arc<NetworkHandler>> {
        self.typed_existing("Network")
            .ok_or_else(|| CdpError::Other("handler not registered: Network".into()))
    }

    pub fn target(&self) -> Result<Arc<TargetHandler>> {
        self.typed_existing("Target")
            .ok_or_else(|| CdpError::Other("handler not registered: Target".into()))
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    /// Stops dispatch, closes the transport; further sends fail.
    pub fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.transport.close();
        let pending: Vec<Arc<PendingCall>> = self.pending.lock().unwrap().values().cloned().collect();
        for call in pending {
            call.cancel(CdpError::ConnectionClosed);
        }
    }

    pub fn is_closed(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    /// Drains the main queue first; only when it's empty does it peek the
    /// retry queue, preserving FIFO delivery on the happy path (spec.md
    /// §4.2 tie-break a).
    fn dispatch_loop(self: Arc<Self>) {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let next = {
                let mut main = self.main_queue.lock().unwrap();
                if let Some(notif) = main.pop_front() {
                    Some(notif)
                } else {
                    drop(main);
                    let mut retry = self.retry_queue.lock().unwrap();
                    let ready = matches!(retry.peek(), Some(Reverse(entry)) if entry.run_at <= Instant::now());
                    if ready {
                        retry.pop().map(|Reverse(entry)| entry.notification)
                    } else {
                        None
                    }
                }
            };
            match next {
                Some(notif) => self.process_notification(notif),
                None => thread::sleep(DISPATCH_IDLE),
            }
        }
    }

    fn process_notification(self: &Arc<Self>, notif: Notification) {
        let namespace = notif.namespace().to_string();
        let submethod = notif.submethod().to_string();
        let handler = self.dispatch.lock().unwrap().get(namespace.as_str()).cloned();
        let Some(handler) = handler else {
            self.logger
                .debug("debugger", &format!("no handler registered for namespace {namespace}"));
            return;
        };

        let params = notif.params.clone();
        let session_id = notif.session_id.clone();
        match handler.on_recv_notify_msg(self, &submethod, params, session_id.as_deref()) {
            Ok(()) => {}
            Err(CdpError::MessageNotHandled) => {
                let age = notif.received_at.elapsed();
                if age > RETRY_TTL {
                    self.logger
                        .warn("debugger", &format!("dropping {namespace}.{submethod} after {age:?}"));
                } else {
                    let run_at = Instant::now() + RETRY_DELAY;
                    self.retry_queue
                        .lock()
                        .unwrap()
                        .push(Reverse(RetryEntry { run_at, notification: notif }));
                }
            }
            Err(CdpError::ConnectionClosed) => {
                self.logger
                    .warn("debugger", "handler reported connection closed, stopping dispatch");
                self.running.store(false, Ordering::SeqCst);
            }
            Err(err) => {
                self.logger
                    .exception("debugger", &format!("{namespace}.{submethod} failed: {err}"));
            }
        }
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_splits_namespace_and_submethod() {
        let notif = Notification {
            method: "Page.frameNavigated".into(),
            params: Value::Null,
            session_id: None,
            received_at: Instant::now(),
        };
        assert_eq!(notif.namespace(), "Page");
        assert_eq!(notif.submethod(), "frameNavigated");
    }

    #[test]
    fn retry_heap_pops_earliest_first() {
        let mut heap = BinaryHeap::new();
        let now = Instant::now();
        let late = Notification {
            method: "A.a".into(),
            params: Value::Null,
            session_id: None,
            received_at: now,
        };
        let early = Notification {
            method: "B.b".into(),
            params: Value::Null,
            session_id: None,
            received_at: now,
        };
        heap.push(Reverse(RetryEntry { run_at: now + Duration::from_secs(5), notification: late }));
        heap.push(Reverse(RetryEntry { run_at: now + Duration::from_secs(1), notification: early }));
        let Reverse(first) = heap.pop().unwrap();
        assert_eq!(first.notification.method, "B.b");
    }
}
