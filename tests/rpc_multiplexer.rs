//! End-to-end exercise of the notification dispatch loop's retry queue
//! against a real TCP socket and a `tungstenite`-handshaked peer standing
//! in for the browser side of the connection.

use std::any::Any;
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use remote_debug_cdp::debugger::Debugger;
use remote_debug_cdp::error::CdpError;
use remote_debug_cdp::handler::Handler;
use remote_debug_cdp::logging::default_logger;
use remote_debug_cdp::Result;

/// A handler for a synthetic `Probe` namespace: refuses its first delivery
/// with `MessageNotHandled`, forcing the dispatch thread's retry queue to
/// redeliver it, and records when the second delivery lands.
#[derive(Default)]
struct RetryProbe {
    attempts: AtomicUsize,
    second_delivery_at: Mutex<Option<Instant>>,
}

impl Handler for RetryProbe {
    fn namespace(&self) -> &'static str {
        "Probe"
    }

    fn on_recv_notify_msg(
        &self,
        _debugger: &Arc<Debugger>,
        _submethod: &str,
        _params: Value,
        _session_id: Option<&str>,
    ) -> Result<()> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if n < 2 {
            return Err(CdpError::MessageNotHandled);
        }
        *self.second_delivery_at.lock().unwrap() = Some(Instant::now());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn retried_notification_is_redelivered_after_the_retry_delay() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let started = Instant::now();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut ws = tungstenite::accept(stream).unwrap();
        ws.send(tungstenite::Message::Text(r#"{"method":"Probe.retryMe"}"#.to_string().into()))
            .unwrap();
        // Keep the peer alive long enough for the 2s retry delay to fire
        // before the socket drops out from under the client.
        thread::sleep(Duration::from_secs(4));
    });

    let debugger = Debugger::connect(format!("ws://127.0.0.1:{port}"), None, default_logger())
        .expect("client should complete the websocket handshake");
    let probe: Arc<RetryProbe> = debugger.register_handler::<RetryProbe>().unwrap();

    let deadline = Instant::now() + Duration::from_secs(8);
    loop {
        if probe.second_delivery_at.lock().unwrap().is_some() {
            break;
        }
        assert!(Instant::now() < deadline, "retry redelivery never happened");
        thread::sleep(Duration::from_millis(50));
    }

    let redelivered_at = probe.second_delivery_at.lock().unwrap().unwrap();
    assert_eq!(probe.attempts.load(Ordering::SeqCst), 2);
    assert!(
        redelivered_at.duration_since(started) >= Duration::from_secs(2),
        "redelivery happened before the retry delay elapsed"
    );

    debugger.close();
    server.join().unwrap();
}
