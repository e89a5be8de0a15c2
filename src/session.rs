//! Session Manager
//!
//! Connection lifecycle with the host:
//!
//! ```text
//! disconnected -> connecting -> authenticating -> connected
//!       ^              |               |              |
//!       +--------------+---------------+--------------+  (error, close, disconnect, auth failure)
//! ```
//!
//! The session never does I/O itself. It asks a `Transport` to open a
//! `Link` and is fed the link's `TransportEvent`s by the event loop.

use crate::error::{TransportError, ValidationError};
use crate::intent::{AuthMessage, HostMessage, Intent};
use crate::settings;
use crate::storage::BlobStore;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Fixed port the host listens on
pub const HOST_PORT: u16 = 59874;

const STATUS_DISCONNECTED: &str = "Disconnected";
const STATUS_FAILED: &str = "Connection Failed";
const REASON_AUTH_FAILED: &str = "Authentication Failed";
const REASON_USER: &str = "User disconnected";
const REASON_RECONNECT: &str = "Reconnecting";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Connected => "connected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the user should be looking at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Surface {
    /// Host/secret prompt, prefilled with the last status
    ConnectionPrompt { message: String },
    /// Trackpad and command grid
    Controls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
}

impl Endpoint {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, HOST_PORT)
    }
}

/// Generation id of an opened link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Something that happened on a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed { reason: Option<String> },
}

/// An open (or opening) text-framed connection
pub trait Link {
    /// Queue one text frame
    fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Ask for a graceful close
    fn close(&mut self, reason: &str);
}

/// Opens links. Events for the link are delivered later, tagged with `id`.
pub trait Transport {
    fn open(&mut self, id: LinkId, url: &str) -> Box<dyn Link>;
}

/// Tactile acknowledgement of a send attempt
pub trait Feedback {
    fn pulse(&self);
}

/// Feedback that does nothing
pub struct NoFeedback;

impl Feedback for NoFeedback {
    fn pulse(&self) {}
}

struct ActiveLink {
    id: LinkId,
    link: Box<dyn Link>,
}

pub struct Session {
    transport: Box<dyn Transport>,
    feedback: Box<dyn Feedback>,
    store: Rc<dyn BlobStore>,
    state: SessionState,
    status_message: String,
    surface: Surface,
    endpoint: Option<Endpoint>,
    link: Option<ActiveLink>,
    pending_secret: Option<String>,
    next_link: u64,
}

impl Session {
    pub fn new(transport: Box<dyn Transport>, feedback: Box<dyn Feedback>, store: Rc<dyn BlobStore>) -> Self {
        let endpoint = match settings::remembered_host(store.as_ref()) {
            Ok(host) => host.map(|host| Endpoint { host }),
            Err(e) => {
                warn!("Ignoring remembered host: {:#}", e);
                None
            }
        };

        Self {
            transport,
            feedback,
            store,
            state: SessionState::Disconnected,
            status_message: STATUS_DISCONNECTED.to_string(),
            surface: Surface::ConnectionPrompt { message: String::new() },
            endpoint,
            link: None,
            pending_secret: None,
            next_link: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Host to prefill the connection prompt with
    pub fn remembered_host(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|endpoint| endpoint.host.as_str())
    }

    /// Open a link to `host` and authenticate with `secret` once it opens.
    /// Both must be non-empty; otherwise nothing changes.
    pub fn connect(&mut self, host: &str, secret: &str) -> Result<(), ValidationError> {
        let host = host.trim();
        let secret = secret.trim();
        if host.is_empty() || secret.is_empty() {
            return Err(ValidationError::MissingCredentials);
        }

        if let Some(mut previous) = self.link.take() {
            debug!("Dropping {} for a new connection", previous.id);
            previous.link.close(REASON_RECONNECT);
        }

        if let Err(e) = settings::remember_host(self.store.as_ref(), host) {
            warn!("Failed to remember host: {:#}", e);
        }
        let endpoint = Endpoint { host: host.to_string() };
        let url = endpoint.url();
        self.endpoint = Some(endpoint);

        self.next_link += 1;
        let id = LinkId(self.next_link);
        info!("Connecting to {} ({})", url, id);
        let link = self.transport.open(id, &url);

        self.link = Some(ActiveLink { id, link });
        self.pending_secret = Some(secret.to_string());
        self.set_state(SessionState::Connecting, "Connecting...");
        Ok(())
    }

    /// Close the current link, if any
    pub fn disconnect(&mut self) {
        if self.link.is_some() {
            self.close_link(REASON_USER);
        }
    }

    /// Pulse the feedback, then send `intent` if connected. A send while
    /// not connected is dropped and tears the session down.
    pub fn send_intent(&mut self, intent: &Intent) -> bool {
        self.feedback.pulse();

        if self.state != SessionState::Connected {
            warn!("Dropping {} while {}", intent.kind(), self.state);
            self.disconnect();
            return false;
        }

        let text = match intent.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {}: {}", intent.kind(), e);
                return false;
            }
        };

        let Some(active) = self.link.as_mut() else {
            return false;
        };
        match active.link.send(text) {
            Ok(()) => {
                debug!("Sent {}", intent.kind());
                true
            }
            Err(e) => {
                warn!("Failed to send {}: {}", intent.kind(), e);
                self.disconnect();
                false
            }
        }
    }

    /// Feed one event from link `id`. Events from superseded links are ignored.
    pub fn on_transport_event(&mut self, id: LinkId, event: TransportEvent) {
        if self.link.as_ref().map(|active| active.id) != Some(id) {
            debug!("Ignoring {:?} from stale {}", event, id);
            return;
        }

        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Error(detail) => {
                warn!("Transport error on {}: {}", id, detail);
                self.status_message = STATUS_FAILED.to_string();
            }
            TransportEvent::Closed { reason } => self.on_closed(reason),
        }
    }

    fn on_opened(&mut self) {
        if self.state != SessionState::Connecting {
            debug!("Link opened while {}", self.state);
            return;
        }
        let secret = self.pending_secret.take().unwrap_or_default();
        let sent = match serde_json::to_string(&AuthMessage { key: &secret }) {
            Ok(text) => self
                .link
                .as_mut()
                .map(|active| active.link.send(text))
                .unwrap_or(Err(TransportError::NotOpen)),
            Err(e) => Err(e.into()),
        };

        match sent {
            Ok(()) => self.set_state(SessionState::Authenticating, "Authenticating..."),
            Err(e) => {
                warn!("Failed to send credentials: {}", e);
                self.close_link(STATUS_FAILED);
            }
        }
    }

    fn on_message(&mut self, text: &str) {
        let message = match HostMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring unreadable host message: {}", e);
                return;
            }
        };

        match (self.state, message) {
            (SessionState::Authenticating, HostMessage::HandshakeSuccess) => {
                self.set_state(SessionState::Connected, "Connected");
                self.surface = Surface::Controls;
            }
            (SessionState::Authenticating, HostMessage::AuthFailed { reason }) => {
                warn!("Host rejected the secret: {}", reason.as_deref().unwrap_or("no reason given"));
                self.close_link(REASON_AUTH_FAILED);
            }
            (state, message) => debug!("Ignoring {:?} while {}", message, state),
        }
    }

    /// Ask the link to close and settle into `disconnected` right away.
    /// The link's own close event arrives later and is stale by then.
    fn close_link(&mut self, reason: &str) {
        if let Some(mut active) = self.link.take() {
            info!("Closing {}: {}", active.id, reason);
            active.link.close(reason);
        }
        self.on_closed(Some(reason.to_string()));
    }

    fn on_closed(&mut self, reason: Option<String>) {
        let message = reason
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| STATUS_DISCONNECTED.to_string());

        self.link = None;
        self.pending_secret = None;
        self.set_state(SessionState::Disconnected, &message);
        self.surface = Surface::ConnectionPrompt { message };
    }

    fn set_state(&mut self, state: SessionState, status: &str) {
        if self.state != state {
            info!("Session {} -> {} ({})", self.state, state, status);
        }
        self.state = state;
        self.status_message = status.to_string();
    }
}
