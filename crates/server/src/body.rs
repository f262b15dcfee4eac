//! Response body fed by a channel of frames, ending in trailers.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use bytes::Bytes;
use http_body::Frame;
use http_body_util::StreamBody;
use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

/// Trailer reporting whether the body was cut short by a failure.
pub const STREAMING_ERROR_TRAILER: HeaderName = HeaderName::from_static("x-streaming-error");

/// Frames buffered between the producer task and the connection.
const FRAME_BUFFER: usize = 16;

/// Producing half of a streamed body.
pub struct FrameSender {
    tx: mpsc::Sender<Frame<Bytes>>,
}

/// Create a streaming body and the sender that feeds it.
///
/// The body ends once every sender is dropped.
pub fn channel() -> (FrameSender, Body) {
    let (tx, mut rx) = mpsc::channel::<Frame<Bytes>>(FRAME_BUFFER);
    let frames = async_stream::stream! {
        while let Some(frame) = rx.recv().await {
            yield Ok::<_, Infallible>(frame);
        }
    };
    (FrameSender { tx }, Body::new(StreamBody::new(frames)))
}

impl FrameSender {
    /// Writer whose bytes become data frames.
    pub fn writer(&self) -> FrameWriter {
        FrameWriter {
            tx: PollSender::new(self.tx.clone()),
            written: 0,
        }
    }

    /// Resolves once the receiving side (the client connection) has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    /// Send the `X-Streaming-Error` trailer and end the body.
    pub async fn finish(self, failed: bool) {
        let mut trailers = HeaderMap::new();
        trailers.insert(
            STREAMING_ERROR_TRAILER,
            HeaderValue::from_static(if failed { "true" } else { "false" }),
        );
        if self.tx.send(Frame::trailers(trailers)).await.is_err() {
            tracing::debug!("client went away before trailers");
        }
    }
}

/// `AsyncWrite` adapter sending each write as one data frame.
pub struct FrameWriter {
    tx: PollSender<Frame<Bytes>>,
    written: u64,
}

impl FrameWriter {
    /// Bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}

impl AsyncWrite for FrameWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let this = &mut *self;
        ready!(this.tx.poll_reserve(cx)).map_err(|_| disconnected())?;
        this.tx
            .send_item(Frame::data(Bytes::copy_from_slice(buf)))
            .map_err(|_| disconnected())?;
        this.written += buf.len() as u64;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.tx.close();
        Poll::Ready(Ok(()))
    }
}
