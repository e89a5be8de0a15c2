//! Touchpad Remote - trackpad and command grid for a desktop host
//!
//! A handheld client that turns touches into pointer commands and tile
//! taps into key presses, media keys, shell commands and macros, sent to
//! a host over a WebSocket after a shared-secret handshake.

pub mod app;
pub mod editor;
pub mod error;
pub mod gesture;
pub mod grid;
pub mod intent;
pub mod macro_script;
pub mod session;
pub mod settings;
pub mod storage;
pub mod tile;
pub mod ws;

pub use app::{Remote, TileTap};
pub use error::{EditorError, PlacementConflict, TransportError, ValidationError};
pub use session::{Feedback, NoFeedback, SessionState, Surface};
pub use settings::AppSettings;
pub use storage::{BlobStore, DirStore, MemoryStore};
