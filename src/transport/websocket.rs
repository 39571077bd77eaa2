//! WebSocket transport.
//!
//! Every DevTools target advertises a `webSocketDebuggerUrl`; one protocol
//! frame travels as one WebSocket text message. Ping/pong control messages
//! are answered by tungstenite itself and skipped here; a close message ends
//! the stream.

use std::io;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{BoxFuture, FrameRead, FrameWrite, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected WebSocket.
pub struct WebSocketTransport {
    stream: WsStream,
}

impl WebSocketTransport {
    /// Connect to a debugger URL such as
    /// `ws://127.0.0.1:9222/devtools/page/<target-id>`.
    pub async fn connect(url: &str) -> io::Result<Self> {
        tracing::debug!(url, "Connecting to debugger websocket");
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(into_io_error)?;
        Ok(Self { stream })
    }

    /// Wrap an already established stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self { stream }
    }
}

impl Transport for WebSocketTransport {
    type Reader = WebSocketReader;
    type Writer = WebSocketWriter;

    fn into_split(self) -> (WebSocketReader, WebSocketWriter) {
        let (sink, source) = self.stream.split();
        (WebSocketReader { source }, WebSocketWriter { sink })
    }
}

/// Read half of a [`WebSocketTransport`].
pub struct WebSocketReader {
    source: SplitStream<WsStream>,
}

impl FrameRead for WebSocketReader {
    fn read_frame(&mut self) -> BoxFuture<'_, io::Result<Option<Bytes>>> {
        Box::pin(async move {
            while let Some(message) = self.source.next().await {
                match message.map_err(into_io_error)? {
                    Message::Text(text) => {
                        return Ok(Some(Bytes::copy_from_slice(text.as_str().as_bytes())))
                    }
                    Message::Binary(data) => return Ok(Some(data)),
                    Message::Close(frame) => {
                        tracing::debug!(?frame, "Websocket closed by remote");
                        return Ok(None);
                    }
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                }
            }
            Ok(None)
        })
    }
}

/// Write half of a [`WebSocketTransport`].
pub struct WebSocketWriter {
    sink: SplitSink<WsStream, Message>,
}

impl FrameWrite for WebSocketWriter {
    fn write_frame(&mut self, frame: Bytes) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            let text = String::from_utf8(frame.to_vec())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            self.sink
                .send(Message::Text(text.into()))
                .await
                .map_err(into_io_error)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move { self.sink.close().await.map_err(into_io_error) })
    }
}

fn into_io_error(err: tungstenite::Error) -> io::Error {
    match err {
        tungstenite::Error::Io(e) => e,
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            io::Error::new(io::ErrorKind::NotConnected, err)
        }
        other => io::Error::other(other),
    }
}
