//! WebSocket transport
//!
//! Each link runs as its own tokio task. The task owns the socket and
//! reports everything back over one channel as `(LinkId, TransportEvent)`,
//! so the session only ever sees events on the event-loop thread.

use crate::error::TransportError;
use crate::session::{Link, LinkId, Transport, TransportEvent};
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Commands from a `WsLink` to its task
#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close(String),
}

pub struct WsTransport {
    events: UnboundedSender<(LinkId, TransportEvent)>,
}

impl WsTransport {
    /// Transport plus the receiving end of its event channel.
    /// Links must be opened from inside a tokio runtime.
    pub fn new() -> (Self, UnboundedReceiver<(LinkId, TransportEvent)>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }
}

impl Transport for WsTransport {
    fn open(&mut self, id: LinkId, url: &str) -> Box<dyn Link> {
        let (outgoing, commands) = mpsc::unbounded_channel();
        tokio::spawn(run_link(id, url.to_string(), commands, self.events.clone()));
        Box::new(WsLink { outgoing })
    }
}

struct WsLink {
    outgoing: UnboundedSender<Outgoing>,
}

impl Link for WsLink {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outgoing
            .send(Outgoing::Text(text))
            .map_err(|_| TransportError::NotOpen)
    }

    fn close(&mut self, reason: &str) {
        // The task may already be gone; then there is nothing to close.
        let _ = self.outgoing.send(Outgoing::Close(reason.to_string()));
    }
}

/// Wait for a close request while the socket is still connecting
async fn close_requested(commands: &mut UnboundedReceiver<Outgoing>) -> Option<String> {
    loop {
        match commands.recv().await {
            Some(Outgoing::Close(reason)) => return Some(reason),
            Some(Outgoing::Text(_)) => warn!("Dropping message sent before the link opened"),
            None => return None,
        }
    }
}

async fn run_link(
    id: LinkId,
    url: String,
    mut commands: UnboundedReceiver<Outgoing>,
    events: UnboundedSender<(LinkId, TransportEvent)>,
) {
    let emit = |event: TransportEvent| {
        // Receiver gone means the app is shutting down
        let _ = events.send((id, event));
    };

    let stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!("{}: failed to connect to {}: {}", id, url, e);
                emit(TransportEvent::Error(e.to_string()));
                emit(TransportEvent::Closed { reason: None });
                return;
            }
        },
        reason = close_requested(&mut commands) => {
            debug!("{}: closed before opening", id);
            emit(TransportEvent::Closed { reason });
            return;
        }
    };

    info!("{}: connected to {}", id, url);
    emit(TransportEvent::Opened);
    let (mut writer, mut reader) = stream.split();

    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = writer.send(WsMessage::Text(text)).await {
                        emit(TransportEvent::Error(e.to_string()));
                        break None;
                    }
                }
                Some(Outgoing::Close(reason)) => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: Cow::Owned(reason.clone()),
                    };
                    if let Err(e) = writer.send(WsMessage::Close(Some(frame))).await {
                        debug!("{}: close frame not sent: {}", id, e);
                    }
                    break Some(reason);
                }
                None => {
                    let _ = writer.send(WsMessage::Close(None)).await;
                    break None;
                }
            },
            message = reader.next() => match message {
                Some(Ok(WsMessage::Text(text))) => emit(TransportEvent::Message(text)),
                Some(Ok(WsMessage::Close(frame))) => {
                    break frame.map(|frame| frame.reason.into_owned());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(TransportEvent::Error(e.to_string()));
                    break None;
                }
                None => break None,
            },
        }
    };

    info!("{}: closed ({})", id, reason.as_deref().unwrap_or("no reason"));
    emit(TransportEvent::Closed { reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    async fn next_event(rx: &mut UnboundedReceiver<(LinkId, TransportEvent)>) -> (LinkId, TransportEvent) {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_link_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();

            let first = ws.next().await.unwrap().unwrap();
            assert_eq!(first, WsMessage::Text(r#"{"key":"s3cret"}"#.to_string()));
            ws.send(WsMessage::Text(r#"{"type":"handshake_success"}"#.to_string()))
                .await
                .unwrap();

            match ws.next().await.unwrap().unwrap() {
                WsMessage::Close(Some(frame)) => frame.reason.into_owned(),
                other => panic!("expected close, got {other:?}"),
            }
        });

        let (mut transport, mut rx) = WsTransport::new();
        let mut link = transport.open(LinkId(7), &format!("ws://127.0.0.1:{port}"));

        assert_eq!(next_event(&mut rx).await, (LinkId(7), TransportEvent::Opened));
        link.send(r#"{"key":"s3cret"}"#.to_string()).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            (LinkId(7), TransportEvent::Message(r#"{"type":"handshake_success"}"#.to_string()))
        );

        link.close("User disconnected");
        assert_eq!(
            next_event(&mut rx).await,
            (LinkId(7), TransportEvent::Closed { reason: Some("User disconnected".to_string()) })
        );
        assert_eq!(server.await.unwrap(), "User disconnected");
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (mut transport, mut rx) = WsTransport::new();
        let _link = transport.open(LinkId(1), &format!("ws://127.0.0.1:{port}"));

        assert!(matches!(next_event(&mut rx).await, (LinkId(1), TransportEvent::Error(_))));
        assert_eq!(
            next_event(&mut rx).await,
            (LinkId(1), TransportEvent::Closed { reason: None })
        );
    }
}
