//! Integration tests for devtools-socket.
//!
//! Each test runs a dispatcher against a scripted remote endpoint on the
//! other end of an in-memory pipe.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use devtools_socket::transport::{FrameRead, FrameWrite, PipeReader, PipeTransport, PipeWriter, Transport};
use devtools_socket::{BoxFuture, Command, Dispatcher, DispatcherBuilder, Event, SocketError};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{duplex, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

/// Scripted remote side of the connection.
struct Remote {
    reader: PipeReader<ReadHalf<DuplexStream>>,
    writer: PipeWriter<WriteHalf<DuplexStream>>,
}

impl Remote {
    async fn recv(&mut self) -> Value {
        let frame = self
            .reader
            .read_frame()
            .await
            .unwrap()
            .expect("dispatcher closed the pipe");
        serde_json::from_slice(&frame).unwrap()
    }

    async fn send(&mut self, value: Value) {
        let frame = serde_json::to_vec(&value).unwrap();
        self.writer.write_frame(frame.into()).await.unwrap();
    }

    async fn send_raw(&mut self, bytes: &'static [u8]) {
        self.writer.write_frame(bytes.into()).await.unwrap();
    }
}

fn connect() -> (Dispatcher, Remote) {
    connect_with(Dispatcher::builder())
}

fn connect_with(builder: DispatcherBuilder) -> (Dispatcher, Remote) {
    connect_with_buffer(builder, 256 * 1024)
}

/// `buffer` bounds how many bytes the pipe holds before writes block.
fn connect_with_buffer(builder: DispatcherBuilder, buffer: usize) -> (Dispatcher, Remote) {
    let (ours, theirs) = duplex(buffer);
    let dispatcher = builder.start(PipeTransport::new(ours));
    (dispatcher, remote_end(theirs))
}

fn remote_end(stream: DuplexStream) -> Remote {
    let (reader, writer) = PipeTransport::new(stream).into_split();
    Remote { reader, writer }
}

fn large_params() -> Value {
    json!({"blob": "x".repeat(16 * 1024)})
}

async fn wait_for_pending(dispatcher: &Dispatcher, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while dispatcher.pending_requests() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pending count never reached");
}

#[tokio::test]
async fn test_successful_command() {
    let (dispatcher, mut remote) = connect();

    let server = tokio::spawn(async move {
        let request = remote.recv().await;
        assert_eq!(request, json!({"id": 1, "method": "Foo.bar", "params": {"x": 1}}));
        remote.send(json!({"id": 1, "result": {"y": 2}})).await;
        remote
    });

    let result = dispatcher.send("Foo.bar", Some(json!({"x": 1}))).await.unwrap();
    assert_eq!(result, json!({"y": 2}));
    assert_eq!(dispatcher.pending_requests(), 0);

    let _remote = server.await.unwrap();
}

#[tokio::test]
async fn test_params_omitted_when_absent() {
    let (dispatcher, mut remote) = connect();

    let server = tokio::spawn(async move {
        let request = remote.recv().await;
        assert_eq!(request, json!({"id": 1, "method": "Page.enable"}));
        remote.send(json!({"id": 1})).await;
        remote
    });

    // Reply without a result field completes with null.
    let result = dispatcher.send("Page.enable", None).await.unwrap();
    assert_eq!(result, Value::Null);

    let _remote = server.await.unwrap();
}

#[tokio::test]
async fn test_error_response_keeps_connection_usable() {
    let (dispatcher, mut remote) = connect();

    let server = tokio::spawn(async move {
        let first = remote.recv().await;
        remote
            .send(json!({"id": first["id"], "error": {"code": -32000, "message": "bad"}}))
            .await;
        let second = remote.recv().await;
        remote.send(json!({"id": second["id"], "result": {"ok": true}})).await;
        remote
    });

    let err = dispatcher.send("Foo.bar", None).await.unwrap_err();
    match &err {
        SocketError::ErrorResponse { source, .. } => {
            assert_eq!(source.code, -32000);
            assert_eq!(source.message, "bad");
        }
        other => panic!("expected ErrorResponse, got {:?}", other),
    }
    assert!(!err.is_connection_fatal());
    assert!(err.to_string().contains("bad"));

    let result = dispatcher.send("Foo.baz", None).await.unwrap();
    assert_eq!(result, json!({"ok": true}));
    assert!(!dispatcher.is_closed());

    let _remote = server.await.unwrap();
}

#[tokio::test]
async fn test_event_reaches_only_its_handlers() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let others = Arc::new(AtomicUsize::new(0));
    let others_seen = others.clone();

    let (dispatcher, mut remote) = connect_with(Dispatcher::builder().event(
        "Foo.other",
        move |_event: Event| {
            let others = others_seen.clone();
            async move {
                others.fetch_add(1, Ordering::SeqCst);
            }
        },
    ));
    dispatcher.add_event_handler("Foo.changed", move |event: Event| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(event);
        }
    });

    remote
        .send(json!({"method": "Foo.changed", "params": {"z": 3}}))
        .await;
    remote.send(json!({"method": "Foo.unhandled"})).await;

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.method, "Foo.changed");
    assert_eq!(event.params, json!({"z": 3}));
    assert_eq!(event.session_id, None);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(others.load(Ordering::SeqCst), 0);
    assert!(!dispatcher.is_closed());
}

#[tokio::test]
async fn test_every_handler_runs_for_an_event() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (dispatcher, mut remote) = connect();

    for tag in 0..3 {
        let tx = tx.clone();
        dispatcher.add_event_handler("Target.attachedToTarget", move |event: Event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((tag, event.session_id));
            }
        });
    }

    remote
        .send(json!({"method": "Target.attachedToTarget", "params": {}, "sessionId": "S1"}))
        .await;

    let mut tags = Vec::new();
    for _ in 0..3 {
        let (tag, session) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.as_deref(), Some("S1"));
        tags.push(tag);
    }
    tags.sort();
    assert_eq!(tags, vec![0, 1, 2]);
}

#[derive(Debug, Deserialize)]
struct ConsoleCalled {
    #[serde(rename = "type")]
    kind: String,
}

#[tokio::test]
async fn test_typed_handler_and_removal() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (dispatcher, mut remote) = connect();

    dispatcher.on("Runtime.consoleAPICalled", move |called: ConsoleCalled| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(called.kind);
        }
    });

    remote
        .send(json!({"method": "Runtime.consoleAPICalled", "params": {"type": "log"}}))
        .await;
    let kind = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kind, "log");

    assert_eq!(dispatcher.remove_event_handlers("Runtime.consoleAPICalled"), 1);
    remote
        .send(json!({"method": "Runtime.consoleAPICalled", "params": {"type": "warning"}}))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_concurrent_sends_get_their_own_replies() {
    const CALLERS: usize = 64;
    let (dispatcher, mut remote) = connect();

    let server = tokio::spawn(async move {
        let mut requests = Vec::new();
        for _ in 0..CALLERS {
            requests.push(remote.recv().await);
        }
        let mut ids: Vec<u64> = requests.iter().map(|r| r["id"].as_u64().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CALLERS);

        // Reply in reverse order.
        for request in requests.iter().rev() {
            remote
                .send(json!({"id": request["id"], "result": {"n": request["params"]["n"]}}))
                .await;
        }
        remote
    });

    let callers: Vec<_> = (0..CALLERS)
        .map(|n| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let result = dispatcher.send("Echo.n", Some(json!({"n": n}))).await.unwrap();
                assert_eq!(result, json!({"n": n}));
            })
        })
        .collect();
    for caller in callers {
        caller.await.unwrap();
    }

    assert_eq!(dispatcher.pending_requests(), 0);
    let _remote = server.await.unwrap();
}

#[tokio::test]
async fn test_unknown_and_duplicate_replies_are_dropped() {
    let (dispatcher, mut remote) = connect();

    let server = tokio::spawn(async move {
        let first = remote.recv().await;
        remote.send(json!({"id": 999, "result": {}})).await;
        remote.send(json!({"id": first["id"], "result": {"n": 1}})).await;
        remote.send(json!({"id": first["id"], "result": {"n": "again"}})).await;

        let second = remote.recv().await;
        remote.send(json!({"id": second["id"], "result": {"n": 2}})).await;
        remote
    });

    assert_eq!(dispatcher.send("A.a", None).await.unwrap(), json!({"n": 1}));
    assert_eq!(dispatcher.send("A.b", None).await.unwrap(), json!({"n": 2}));
    assert!(!dispatcher.is_closed());

    let _remote = server.await.unwrap();
}

#[tokio::test]
async fn test_frames_without_id_or_method_are_ignored() {
    let (dispatcher, mut remote) = connect();

    let server = tokio::spawn(async move {
        let request = remote.recv().await;
        remote.send(json!({"foo": "bar"})).await;
        remote.send(json!({"id": 7, "method": "Remote.asks"})).await;
        remote.send(json!({"id": request["id"], "result": 5})).await;
        remote
    });

    assert_eq!(dispatcher.send("A.a", None).await.unwrap(), json!(5));
    let _remote = server.await.unwrap();
}

#[tokio::test]
async fn test_close_fails_blocked_callers() {
    const CALLERS: usize = 5;
    let (dispatcher, mut remote) = connect();

    let callers: Vec<_> = (0..CALLERS)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.send("Slow.op", None).await })
        })
        .collect();

    for _ in 0..CALLERS {
        remote.recv().await;
    }
    wait_for_pending(&dispatcher, CALLERS).await;

    dispatcher.close().await;
    assert!(dispatcher.is_closed());
    assert_eq!(dispatcher.pending_requests(), 0);

    for caller in callers {
        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, SocketError::ReadFailed { .. }), "{:?}", err);
    }

    // Idempotent, and the dispatcher stays closed.
    dispatcher.close().await;
    let err = dispatcher.send("After.close", None).await.unwrap_err();
    assert!(err.is_connection_fatal());
}

#[tokio::test]
async fn test_remote_eof_fails_blocked_callers() {
    let (dispatcher, mut remote) = connect();

    let caller = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.send("Slow.op", None).await })
    };
    remote.recv().await;
    wait_for_pending(&dispatcher, 1).await;

    drop(remote);

    let err = caller.await.unwrap().unwrap_err();
    assert!(matches!(err, SocketError::ReadFailed { .. }), "{:?}", err);

    tokio::time::timeout(Duration::from_secs(5), dispatcher.closed())
        .await
        .unwrap();
    assert!(dispatcher.is_closed());
    assert_eq!(dispatcher.pending_requests(), 0);
}

#[tokio::test]
async fn test_malformed_frame_is_fatal() {
    let (dispatcher, mut remote) = connect();

    let caller = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.send("A.a", None).await })
    };
    remote.recv().await;
    remote.send_raw(b"{not json").await;

    let err = caller.await.unwrap().unwrap_err();
    assert!(matches!(err, SocketError::ReadFailed { .. }), "{:?}", err);

    tokio::time::timeout(Duration::from_secs(5), dispatcher.closed())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_timeout_then_late_reply() {
    let (dispatcher, mut remote) = connect();

    let err = {
        let send = dispatcher.send_with_timeout("Slow.op", None, Duration::from_millis(50));
        let (outcome, request) = tokio::join!(send, remote.recv());
        assert_eq!(request["id"], 1);
        outcome.unwrap_err()
    };
    assert!(matches!(err, SocketError::Timeout { .. }), "{:?}", err);
    assert_eq!(dispatcher.pending_requests(), 0);

    let server = tokio::spawn(async move {
        remote.send(json!({"id": 1, "result": "late"})).await;
        let request = remote.recv().await;
        assert_eq!(request["id"], 2);
        remote.send(json!({"id": 2, "result": "on time"})).await;
        remote
    });

    assert_eq!(dispatcher.send("Fast.op", None).await.unwrap(), json!("on time"));
    let _remote = server.await.unwrap();
}

#[tokio::test]
async fn test_configured_command_timeout() {
    let (dispatcher, mut remote) =
        connect_with(Dispatcher::builder().command_timeout(Duration::from_millis(50)));

    let mut command = Command::new("Slow.op");
    let (_, request) = tokio::join!(dispatcher.send_command(&mut command), remote.recv());

    assert_eq!(request["id"], 1);
    assert_eq!(command.id, 1);
    assert!(command.result.is_none());
    assert!(matches!(command.error, Some(SocketError::Timeout { .. })));
    assert!(!dispatcher.is_closed());
}

#[tokio::test]
async fn test_slow_handler_does_not_block_replies() {
    let (dispatcher, mut remote) = connect_with(Dispatcher::builder().max_concurrent_handlers(1));
    dispatcher.add_event_handler("Slow.event", |_event: Event| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let server = tokio::spawn(async move {
        remote.send(json!({"method": "Slow.event"})).await;
        remote.send(json!({"method": "Slow.event"})).await;
        let request = remote.recv().await;
        remote.send(json!({"id": request["id"], "result": {}})).await;
        remote
    });

    let result = tokio::time::timeout(Duration::from_secs(5), dispatcher.send("A.a", None))
        .await
        .expect("reply blocked behind event handler")
        .unwrap();
    assert_eq!(result, json!({}));

    let _remote = server.await.unwrap();
}

#[tokio::test]
async fn test_close_releases_caller_stuck_in_write() {
    // The remote never reads, so the 16 KiB frame cannot be written.
    let (dispatcher, _remote) = connect_with_buffer(
        Dispatcher::builder().close_timeout(Duration::from_millis(100)),
        64,
    );

    let caller = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.send("Big.op", Some(large_params())).await })
    };
    wait_for_pending(&dispatcher, 1).await;

    tokio::time::timeout(Duration::from_secs(5), dispatcher.close())
        .await
        .expect("close hung");
    assert!(dispatcher.is_closed());

    let err = tokio::time::timeout(Duration::from_secs(5), caller)
        .await
        .expect("caller still blocked after close")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, SocketError::ReadFailed { .. }), "{:?}", err);
    assert_eq!(dispatcher.pending_requests(), 0);
}

#[tokio::test]
async fn test_close_with_full_write_queue() {
    const CALLERS: usize = 3;
    let (dispatcher, _remote) = connect_with_buffer(
        Dispatcher::builder()
            .channel_capacity(1)
            .close_timeout(Duration::from_millis(100)),
        64,
    );

    let callers: Vec<_> = (0..CALLERS)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.send("Big.op", Some(large_params())).await })
        })
        .collect();
    wait_for_pending(&dispatcher, CALLERS).await;

    tokio::time::timeout(Duration::from_secs(5), dispatcher.close())
        .await
        .expect("close hung");

    for caller in callers {
        let err = tokio::time::timeout(Duration::from_secs(5), caller)
            .await
            .expect("caller still blocked after close")
            .unwrap()
            .unwrap_err();
        assert!(err.is_connection_fatal(), "{:?}", err);
    }
    assert_eq!(dispatcher.pending_requests(), 0);
}

/// Refuses frames for `Fail.me`, forwards everything else.
struct RefusingWriter {
    inner: PipeWriter<WriteHalf<DuplexStream>>,
}

impl FrameWrite for RefusingWriter {
    fn write_frame(&mut self, frame: Bytes) -> BoxFuture<'_, io::Result<()>> {
        if frame.windows(7).any(|w| w == b"Fail.me") {
            return Box::pin(async {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "refused"))
            });
        }
        self.inner.write_frame(frame)
    }

    fn close(&mut self) -> BoxFuture<'_, io::Result<()>> {
        self.inner.close()
    }
}

#[tokio::test]
async fn test_write_failure_fails_only_that_command() {
    let (ours, theirs) = duplex(256 * 1024);
    let (reader, writer) = PipeTransport::new(ours).into_split();
    let dispatcher = Dispatcher::start((reader, RefusingWriter { inner: writer }));
    let mut remote = remote_end(theirs);

    let err = dispatcher.send("Fail.me", None).await.unwrap_err();
    assert!(matches!(err, SocketError::WriteFailed { .. }), "{:?}", err);
    assert!(!err.is_connection_fatal());
    assert_eq!(dispatcher.pending_requests(), 0);
    assert!(!dispatcher.is_closed());

    let server = tokio::spawn(async move {
        let request = remote.recv().await;
        assert_eq!(request["id"], 2);
        assert_eq!(request["method"], "Foo.bar");
        remote.send(json!({"id": 2, "result": {"y": 2}})).await;
        remote
    });

    assert_eq!(dispatcher.send("Foo.bar", None).await.unwrap(), json!({"y": 2}));
    let _remote = server.await.unwrap();
}

