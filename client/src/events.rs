use crate::{Error, Result};
use commonware_codec::ReadExt;
use futures_util::{Stream as FutStream, StreamExt};
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tracing::{debug, error};

pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Decoded messages fed by a background task.
///
/// Dropping the stream stops the task.
pub struct Stream<T: ReadExt + Send + Sync + 'static> {
    receiver: mpsc::Receiver<Result<T>>,
    handle: JoinHandle<()>,
}

impl<T: ReadExt + Send + Sync + 'static> Drop for Stream<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl<T: ReadExt + Send + Sync + 'static> Stream<T> {
    /// Decode every binary frame received on `ws`.
    pub(crate) fn new<S>(ws: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let handle = tokio::spawn(forward(ws, tx));
        Self::from_parts(rx, handle)
    }

    /// Wrap a channel fed by `handle`.
    pub(crate) fn from_parts(receiver: mpsc::Receiver<Result<T>>, handle: JoinHandle<()>) -> Self {
        Self { receiver, handle }
    }

    /// Receive the next message, or `None` once the feeding task is gone.
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.receiver.recv().await
    }
}

async fn forward<S, T>(mut ws: WebSocketStream<S>, tx: mpsc::Sender<Result<T>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: ReadExt + Send + Sync + 'static,
{
    while let Some(msg) = ws.next().await {
        let item = match msg {
            Ok(Message::Binary(data)) => {
                debug!(len = data.len(), "received frame");
                T::read(&mut data.as_slice()).map_err(|err| {
                    error!(?err, "failed to decode frame");
                    Error::InvalidData(err)
                })
            }
            Ok(Message::Close(_)) => {
                debug!("websocket closed by server");
                let _ = tx.send(Err(Error::ConnectionClosed)).await;
                return;
            }
            Ok(_) => continue,
            Err(err) => {
                error!(?err, "websocket error");
                let _ = tx.send(Err(err.into())).await;
                return;
            }
        };
        if tx.send(item).await.is_err() {
            return; // Receiver dropped
        }
    }
    let _ = tx.send(Err(Error::ConnectionClosed)).await;
}

impl<T: ReadExt + Send + Sync + 'static> FutStream for Stream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
