//! Error types
//!
//! Every error here is recoverable: the caller reports it and the system
//! stays in the editor form or at the connection prompt.

use crate::tile::{Cell, TileId};
use thiserror::Error;

/// Bad user input. Nothing is mutated when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Label cannot be empty.")]
    EmptyLabel,

    #[error("{field} must be a whole number from 1 to 4 (got '{value}')")]
    InvalidSize { field: &'static str, value: String },

    #[error("IP and Secret Key are required.")]
    MissingCredentials,
}

/// A tile that would overlap another tile or hang off the grid
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementConflict {
    #[error("tile '{id}' overlaps tile '{other}' at {cell}")]
    Overlap { id: TileId, other: TileId, cell: Cell },

    #[error("tile '{id}' ({w}x{h} at r{row}c{col}) does not fit in the grid")]
    OutOfBounds { id: TileId, row: u8, col: u8, w: u8, h: u8 },

    #[error("tile id '{id}' is used more than once")]
    DuplicateId { id: TileId },
}

/// Failures of the command editor
#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Placement(#[from] PlacementConflict),

    #[error("no command is being edited")]
    NotEditing,

    #[error("command '{0}' no longer exists")]
    UnknownTile(TileId),

    #[error("generated command id '{0}' is already in use")]
    IdCollision(TileId),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Failures handing a message to the transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection is not open")]
    NotOpen,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
