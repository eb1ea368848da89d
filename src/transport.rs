//! The persistent bidirectional JSON-over-WebSocket channel (spec.md §4.1).
//!
//! Grounded on the teacher's `Connection` (`src/conn.rs`), which owns the
//! websocket and turns frames into `Message`s; re-expressed here as a
//! blocking dial on a dedicated thread instead of a polled `Stream`, per
//! spec.md §5's thread-per-transport concurrency model. The dial and
//! handshake are blocking; the steady-state receive loop runs non-blocking
//! so it never parks while holding the lock `send` also needs.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tungstenite::{Message as WsMessage, WebSocket};
use url::Url;

use crate::error::CdpError;

/// Anything byte-stream-shaped that a websocket handshake can ride over.
/// The handshake itself runs blocking; once it completes, `Transport`
/// switches the socket into non-blocking mode (`set_nonblocking`) so the
/// background receive thread's `ws.read()` can't sit parked while holding
/// the mutex `Transport::send` also needs (spec.md §5's thread-per-transport
/// model requires sends to interleave with the receive loop, not queue
/// behind it). A caller supplying a pre-connected tunnel socket via a
/// `SocketFactory` (spec.md §6) must implement this for its own type — if
/// that socket is already permanently non-blocking, the impl can just
/// return `Ok(())`.
pub trait Socket: Read + Write + Send {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
}

impl Socket for TcpStream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }
}

pub type BoxedSocket = Box<dyn Socket>;

/// Nullary callable returning a connected stream, used in place of dialing
/// the URL directly. The same factory is meant to be shared with the HTTP
/// discovery client (spec.md §6).
pub type SocketFactory = Arc<dyn Fn() -> io::Result<BoxedSocket> + Send + Sync>;

const OPEN_TIMEOUT: Duration = Duration::from_secs(10);
const OPEN_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn dial(url: &Url, factory: Option<&SocketFactory>) -> io::Result<BoxedSocket> {
    if let Some(factory) = factory {
        return factory();
    }
    let host = url
        .host_str()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "url has no host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "url has no port"))?;
    let stream = TcpStream::connect((host, port))?;
    stream.set_nodelay(true).ok();
    Ok(Box::new(stream))
}

/// Transport state shared between the caller and the background I/O thread.
struct Shared {
    open: AtomicBool,
    closed: AtomicBool,
    write_half: Mutex<Option<WebSocket<BoxedSocket>>>,
}

/// A persistent duplex connection to one `webSocketDebuggerUrl`.
///
/// `on_message` is invoked exactly once per received frame, in receive
/// order, from the background I/O thread.
pub struct Transport {
    shared: Arc<Shared>,
}

impl Transport {
    /// Dials `url` (or the supplied `factory`) on a dedicated thread and
    /// begins the receive loop. Returns immediately; callers must
    /// `wait_until_open` before sending. Never fails synchronously — a bad
    /// URL or a dial error surfaces asynchronously as `on_close`, which lets
    /// callers construct a `Transport` inside a self-referencing
    /// `Arc::new_cyclic` closure (spec.md §9's `Debugger`↔`Transport`
    /// ownership) without threading a `Result` through it.
    pub fn connect(
        url: impl AsRef<str>,
        factory: Option<SocketFactory>,
        on_message: impl Fn(String) + Send + 'static,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        let url = url.as_ref().to_string();

        let shared = Arc::new(Shared {
            open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            write_half: Mutex::new(None),
        });

        let io_shared = shared.clone();
        let spawned = thread::Builder::new()
            .name("cdp-transport-io".into())
            .spawn(move || {
                let url = match Url::parse(&url) {
                    Ok(url) => url,
                    Err(err) => {
                        tracing::error!(target: "transport", "invalid websocket url: {err}");
                        io_shared.closed.store(true, Ordering::SeqCst);
                        on_close();
                        return;
                    }
                };
                let socket = match dial(&url, factory.as_ref()) {
                    Ok(s) => s,
                    Err(err) => {
                        tracing::error!(target: "transport", "dial failed: {err}");
                        io_shared.closed.store(true, Ordering::SeqCst);
                        on_close();
                        return;
                    }
                };
                let (ws, _response) = match tungstenite::client(url.as_str(), socket) {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::error!(target: "transport", "handshake failed: {err}");
                        io_shared.closed.store(true, Ordering::SeqCst);
                        on_close();
                        return;
                    }
                };
                // Non-blocking from here on: holding `write_half`'s lock for
                // the duration of a blocking `ws.read()` would starve
                // `Transport::send`, which needs the same lock, until a
                // frame happens to arrive — a deadlock on the very first
                // outbound request (nothing to send it yet, since nothing's
                // been sent).
                if let Err(err) = ws.get_ref().set_nonblocking(true) {
                    tracing::error!(target: "transport", "failed to set socket non-blocking: {err}");
                    io_shared.closed.store(true, Ordering::SeqCst);
                    on_close();
                    return;
                }

                *io_shared.write_half.lock().unwrap() = Some(ws);
                io_shared.open.store(true, Ordering::SeqCst);

                loop {
                    if io_shared.closed.load(Ordering::SeqCst) {
                        break;
                    }
                    let read = {
                        let mut guard = io_shared.write_half.lock().unwrap();
                        guard.as_mut().map(|ws| ws.read())
                    };
                    match read {
                        Some(Ok(WsMessage::Text(text))) => on_message(text.to_string()),
                        Some(Ok(WsMessage::Binary(bytes))) => {
                            if let Ok(text) = String::from_utf8(bytes.to_vec()) {
                                on_message(text);
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) => break,
                        Some(Ok(_)) => continue,
                        Some(Err(tungstenite::Error::Io(ref e)))
                            if e.kind() == io::ErrorKind::WouldBlock =>
                        {
                            thread::sleep(Duration::from_millis(5));
                        }
                        Some(Err(err)) => {
                            tracing::warn!(target: "transport", "read error: {err}");
                            break;
                        }
                        None => break,
                    }
                }
                io_shared.closed.store(true, Ordering::SeqCst);
                io_shared.open.store(false, Ordering::SeqCst);
                on_close();
            });

        if spawned.is_err() {
            tracing::error!(target: "transport", "failed to spawn cdp-transport-io thread");
            shared.closed.store(true, Ordering::SeqCst);
        }

        Self { shared }
    }

    /// Polls for `onOpen` with a 10s total budget, 100ms interval, per
    /// spec.md §4.1.
    pub fn wait_until_open(&self) -> Result<(), CdpError> {
        let start = Instant::now();
        while start.elapsed() < OPEN_TIMEOUT {
            if self.shared.open.load(Ordering::SeqCst) {
                return Ok(());
            }
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(CdpError::ConnectionClosed);
            }
            thread::sleep(OPEN_POLL_INTERVAL);
        }
        Err(CdpError::Timeout("websocket open"))
    }

    /// Fails with `ConnectionClosed` once the socket has been torn down.
    pub fn send(&self, frame: &str) -> Result<(), CdpError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(CdpError::ConnectionClosed);
        }
        let mut guard = self.shared.write_half.lock().unwrap();
        match guard.as_mut() {
            Some(ws) => {
                ws.send(WsMessage::Text(frame.to_string().into()))
                    .map_err(CdpError::Ws)?;
                Ok(())
            }
            None => Err(CdpError::ConnectionClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(ws) = self.shared.write_half.lock().unwrap().as_mut() {
            let _ = ws.close(None);
        }
    }
}
