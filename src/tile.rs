//! Command tiles and grid geometry
//!
//! A tile is one button placed on the 4 x 8 command grid. The shape of its
//! parameters is tied to its command type through the `CommandParams`
//! tagged union, so a `key_combo` tile can never carry a `url`.

use crate::error::PlacementConflict;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// Number of grid columns
pub const GRID_COLS: u8 = 4;
/// Number of grid rows
pub const GRID_ROWS: u8 = 8;
/// Largest width or height a single tile may span
pub const MAX_SPAN: u8 = 4;

/// Accent color given to tiles created from an empty cell
pub const DEFAULT_COLOR: &str = "#4A5568";

/// Opaque tile identifier, stable across save/load cycles
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(pub String);

impl TileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One grid cell, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub row: u8,
    pub col: u8,
}

impl Cell {
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    /// Whether the cell lies inside the 4 x 8 grid
    pub fn in_grid(&self) -> bool {
        (1..=GRID_ROWS).contains(&self.row) && (1..=GRID_COLS).contains(&self.col)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}c{}", self.row, self.col)
    }
}

/// Kind of command a tile sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    KeyPress,
    KeyCombo,
    Text,
    MediaControl,
    Website,
    Shell,
    Macro,
}

impl CommandType {
    pub const ALL: [CommandType; 7] = [
        CommandType::KeyPress,
        CommandType::KeyCombo,
        CommandType::Text,
        CommandType::MediaControl,
        CommandType::Website,
        CommandType::Shell,
        CommandType::Macro,
    ];

    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::KeyPress => "key_press",
            CommandType::KeyCombo => "key_combo",
            CommandType::Text => "text",
            CommandType::MediaControl => "media_control",
            CommandType::Website => "website",
            CommandType::Shell => "shell",
            CommandType::Macro => "macro",
        }
    }

    /// Name shown in the editor's type picker
    pub fn display_name(&self) -> &'static str {
        match self {
            CommandType::KeyPress => "Key Press",
            CommandType::KeyCombo => "Key Combo",
            CommandType::Text => "Type Text",
            CommandType::MediaControl => "Media Control",
            CommandType::Website => "Open Website",
            CommandType::Shell => "Run Shell Command",
            CommandType::Macro => "Run Macro",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown command type '{}'", s))
    }
}

/// Media keys the host knows how to press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaAction {
    MediaPlayPause,
    MediaNext,
    MediaPrevious,
    VolumeUp,
    VolumeDown,
    VolumeMute,
}

impl MediaAction {
    pub const ALL: [MediaAction; 6] = [
        MediaAction::MediaPlayPause,
        MediaAction::MediaNext,
        MediaAction::MediaPrevious,
        MediaAction::VolumeUp,
        MediaAction::VolumeDown,
        MediaAction::VolumeMute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaAction::MediaPlayPause => "media_play_pause",
            MediaAction::MediaNext => "media_next",
            MediaAction::MediaPrevious => "media_previous",
            MediaAction::VolumeUp => "volume_up",
            MediaAction::VolumeDown => "volume_down",
            MediaAction::VolumeMute => "volume_mute",
        }
    }

    /// Human-readable label ("media play pause")
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl FromStr for MediaAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("unknown media action '{}'", s))
    }
}

/// Parameters of a tile, one variant per command type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum CommandParams {
    KeyPress { key: String },
    KeyCombo { keys: Vec<String> },
    Text { text: String },
    MediaControl { action: MediaAction },
    Website { url: String },
    Shell { command: String },
    Macro { script: String },
}

impl CommandParams {
    pub fn command_type(&self) -> CommandType {
        match self {
            CommandParams::KeyPress { .. } => CommandType::KeyPress,
            CommandParams::KeyCombo { .. } => CommandType::KeyCombo,
            CommandParams::Text { .. } => CommandType::Text,
            CommandParams::MediaControl { .. } => CommandType::MediaControl,
            CommandParams::Website { .. } => CommandType::Website,
            CommandParams::Shell { .. } => CommandType::Shell,
            CommandParams::Macro { .. } => CommandType::Macro,
        }
    }
}

fn default_span() -> u8 {
    1
}

/// A command button placed on the grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandTile {
    pub id: TileId,

    /// Display text, never empty
    pub label: String,

    /// `type` + `params`, flattened into the record
    #[serde(flatten)]
    pub params: CommandParams,

    /// Accent color, passed through untouched
    pub color: String,

    /// Top-left cell (1-based)
    pub row: u8,
    pub col: u8,

    /// Span in columns and rows
    #[serde(default = "default_span")]
    pub w: u8,
    #[serde(default = "default_span")]
    pub h: u8,
}

impl CommandTile {
    pub fn command_type(&self) -> CommandType {
        self.params.command_type()
    }

    pub fn anchor(&self) -> Cell {
        Cell::new(self.row, self.col)
    }

    /// Every cell covered by the tile
    pub fn cells(&self) -> impl Iterator<Item = Cell> + use<> {
        span_cells(self.anchor(), self.w, self.h)
    }

    /// Whether the whole span lies inside the grid. Zero spans never fit.
    pub fn fits_grid(&self) -> bool {
        if self.w == 0 || self.h == 0 {
            return false;
        }
        let last_row = u16::from(self.row) + u16::from(self.h) - 1;
        let last_col = u16::from(self.col) + u16::from(self.w) - 1;
        self.anchor().in_grid()
            && last_row <= u16::from(GRID_ROWS)
            && last_col <= u16::from(GRID_COLS)
    }
}

/// Cells covered by a `w` x `h` span anchored at `anchor`
pub fn span_cells(anchor: Cell, w: u8, h: u8) -> impl Iterator<Item = Cell> {
    let rows = 0..h;
    let cols = 0..w;
    rows.flat_map(move |dr| {
        cols.clone()
            .map(move |dc| Cell::new(anchor.row.saturating_add(dr), anchor.col.saturating_add(dc)))
    })
}

/// Union of every tile's covered cells
pub fn occupied_cells(tiles: &[CommandTile]) -> BTreeSet<Cell> {
    tiles.iter().flat_map(|tile| tile.cells()).collect()
}

/// Grid cells not covered by any tile, row-major
pub fn free_cells(tiles: &[CommandTile]) -> Vec<Cell> {
    let occupied = occupied_cells(tiles);
    (1..=GRID_ROWS)
        .flat_map(|row| (1..=GRID_COLS).map(move |col| Cell::new(row, col)))
        .filter(|cell| !occupied.contains(cell))
        .collect()
}

/// Check that `candidate` fits the grid and overlaps none of `tiles`.
/// A tile with the same id as the candidate is ignored (it is being replaced).
pub fn check_placement(tiles: &[CommandTile], candidate: &CommandTile) -> Result<(), PlacementConflict> {
    check_bounds(candidate)?;
    check_overlap(tiles.iter().filter(|t| t.id != candidate.id), candidate)
}

/// Check a whole collection: ids unique, every tile in bounds, no two
/// overlapping
pub fn check_layout(tiles: &[CommandTile]) -> Result<(), PlacementConflict> {
    let mut seen = HashSet::new();
    for (index, tile) in tiles.iter().enumerate() {
        if !seen.insert(&tile.id) {
            return Err(PlacementConflict::DuplicateId { id: tile.id.clone() });
        }
        check_bounds(tile)?;
        check_overlap(tiles[..index].iter(), tile)?;
    }
    Ok(())
}

fn check_bounds(candidate: &CommandTile) -> Result<(), PlacementConflict> {
    if candidate.fits_grid() {
        return Ok(());
    }
    Err(PlacementConflict::OutOfBounds {
        id: candidate.id.clone(),
        row: candidate.row,
        col: candidate.col,
        w: candidate.w,
        h: candidate.h,
    })
}

fn check_overlap<'a>(
    others: impl Iterator<Item = &'a CommandTile>,
    candidate: &CommandTile,
) -> Result<(), PlacementConflict> {
    for other in others {
        let theirs: BTreeSet<Cell> = other.cells().collect();
        if let Some(cell) = candidate.cells().find(|cell| theirs.contains(cell)) {
            return Err(PlacementConflict::Overlap {
                id: candidate.id.clone(),
                other: other.id.clone(),
                cell,
            });
        }
    }
    Ok(())
}

/// Built-in layout used until the user saves their own: six media keys
/// filling rows 1-2.
pub fn default_tiles() -> Vec<CommandTile> {
    fn media(id: &str, label: &str, action: MediaAction, color: &str, row: u8, col: u8, w: u8) -> CommandTile {
        CommandTile {
            id: TileId::new(id),
            label: label.to_string(),
            params: CommandParams::MediaControl { action },
            color: color.to_string(),
            row,
            col,
            w,
            h: 1,
        }
    }

    vec![
        media("cmd-1", "Play/Pause", MediaAction::MediaPlayPause, "#2563eb", 1, 1, 2),
        media("cmd-2", "⏮", MediaAction::MediaPrevious, "#3b82f6", 2, 1, 1),
        media("cmd-3", "⏭", MediaAction::MediaNext, "#3b82f6", 2, 2, 1),
        media("cmd-4", "Vol Up", MediaAction::VolumeUp, "#16a34a", 1, 3, 1),
        media("cmd-5", "Vol Down", MediaAction::VolumeDown, "#16a34a", 1, 4, 1),
        media("cmd-6", "Mute", MediaAction::VolumeMute, "#dc2626", 2, 3, 2),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(id: &str, row: u8, col: u8, w: u8, h: u8) -> CommandTile {
        CommandTile {
            id: TileId::new(id),
            label: id.to_string(),
            params: CommandParams::KeyPress { key: "a".to_string() },
            color: DEFAULT_COLOR.to_string(),
            row,
            col,
            w,
            h,
        }
    }

    #[test]
    fn test_tile_cells() {
        let cells: Vec<Cell> = tile("t", 2, 3, 2, 2).cells().collect();
        assert_eq!(
            cells,
            vec![Cell::new(2, 3), Cell::new(2, 4), Cell::new(3, 3), Cell::new(3, 4)]
        );
    }

    #[test]
    fn test_default_layout_fills_first_two_rows() {
        let tiles = default_tiles();
        assert_eq!(tiles.len(), 6);
        assert!(check_layout(&tiles).is_ok());

        let occupied = occupied_cells(&tiles);
        let expected: BTreeSet<Cell> = (1..=2)
            .flat_map(|row| (1..=4).map(move |col| Cell::new(row, col)))
            .collect();
        assert_eq!(occupied, expected);
        assert!(tiles.iter().all(|t| t.command_type() == CommandType::MediaControl));
    }

    #[test]
    fn test_free_cells_excludes_occupied() {
        let free = free_cells(&default_tiles());
        assert_eq!(free.len(), 24);
        assert_eq!(free[0], Cell::new(3, 1));
        assert_eq!(free.last(), Some(&Cell::new(8, 4)));
    }

    #[test]
    fn test_overlap_detected() {
        let tiles = vec![tile("a", 1, 1, 2, 1)];
        let err = check_placement(&tiles, &tile("b", 1, 2, 1, 1)).unwrap_err();
        assert_eq!(
            err,
            PlacementConflict::Overlap {
                id: TileId::new("b"),
                other: TileId::new("a"),
                cell: Cell::new(1, 2),
            }
        );
    }

    #[test]
    fn test_same_id_is_not_a_conflict() {
        let tiles = vec![tile("a", 1, 1, 1, 1)];
        assert!(check_placement(&tiles, &tile("a", 1, 1, 2, 2)).is_ok());
    }

    #[test]
    fn test_layout_rejects_duplicate_ids() {
        let tiles = vec![tile("dup", 3, 1, 2, 2), tile("dup", 3, 1, 2, 2)];
        assert_eq!(
            check_layout(&tiles),
            Err(PlacementConflict::DuplicateId { id: TileId::new("dup") })
        );
    }

    #[test]
    fn test_layout_rejects_zero_span() {
        let tiles = vec![tile("a", 1, 1, 1, 1), tile("b", 3, 1, 0, 2)];
        assert!(matches!(
            check_layout(&tiles),
            Err(PlacementConflict::OutOfBounds { w: 0, .. })
        ));
    }

    #[test]
    fn test_out_of_bounds() {
        assert!(!tile("a", 1, 4, 2, 1).fits_grid());
        assert!(!tile("a", 8, 1, 1, 2).fits_grid());
        assert!(!tile("a", 0, 1, 1, 1).fits_grid());
        assert!(tile("a", 5, 1, 4, 4).fits_grid());
        assert!(!tile("a", 3, 1, 0, 1).fits_grid());
        assert!(!tile("a", 3, 1, 2, 0).fits_grid());
        assert!(matches!(
            check_placement(&[], &tile("a", 1, 4, 2, 1)),
            Err(PlacementConflict::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_tile_serialization() {
        let json = serde_json::to_value(&default_tiles()[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "cmd-1",
                "label": "Play/Pause",
                "type": "media_control",
                "params": { "action": "media_play_pause" },
                "color": "#2563eb",
                "row": 1,
                "col": 1,
                "w": 2,
                "h": 1
            })
        );
    }

    #[test]
    fn test_tile_deserialization_defaults_span() {
        let json = r##"{
            "id": "cmd-9",
            "label": "Copy",
            "type": "key_combo",
            "params": { "keys": ["ctrl", "c"] },
            "color": "#000000",
            "row": 4,
            "col": 2
        }"##;
        let tile: CommandTile = serde_json::from_str(json).unwrap();
        assert_eq!(tile.w, 1);
        assert_eq!(tile.h, 1);
        assert_eq!(
            tile.params,
            CommandParams::KeyCombo { keys: vec!["ctrl".to_string(), "c".to_string()] }
        );
    }

    #[test]
    fn test_command_type_names() {
        assert_eq!("media_control".parse::<CommandType>(), Ok(CommandType::MediaControl));
        assert!("launch_rocket".parse::<CommandType>().is_err());
        assert_eq!(CommandType::Shell.display_name(), "Run Shell Command");
        assert_eq!(MediaAction::VolumeMute.label(), "volume mute");
    }
}
