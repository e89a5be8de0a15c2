//! Grid Store
//!
//! Owns the tile collection. The whole collection is read and written as one
//! JSON array, so a save either replaces everything or nothing.

use crate::storage::BlobStore;
use crate::tile::{self, Cell, CommandTile, TileId};
use anyhow::{Context, Result, bail};
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, info, warn};

/// Blob holding the tile collection
pub const TILES_FILE: &str = "tiles.json";

/// One slot of the rendered grid
#[derive(Debug, Clone, PartialEq)]
pub enum GridSlot<'a> {
    Tile(&'a CommandTile),
    /// Empty cell offered as a placement target (edit mode only)
    Add(Cell),
}

pub struct GridStore {
    store: Rc<dyn BlobStore>,
    tiles: Vec<CommandTile>,
    subscribers: Vec<Sender<Vec<CommandTile>>>,
}

impl GridStore {
    pub fn new(store: Rc<dyn BlobStore>) -> Self {
        Self {
            store,
            tiles: tile::default_tiles(),
            subscribers: Vec::new(),
        }
    }

    /// Load the persisted tiles, or the built-in layout if there are none.
    /// Never fails: unreadable data is logged and replaced by the defaults.
    pub fn load(&mut self) -> &[CommandTile] {
        self.tiles = match self.read_persisted() {
            Ok(Some(tiles)) => {
                info!("Loaded {} tiles", tiles.len());
                tiles
            }
            Ok(None) => {
                info!("No saved tiles, using default layout");
                tile::default_tiles()
            }
            Err(e) => {
                warn!("Ignoring saved tiles: {:#}", e);
                tile::default_tiles()
            }
        };
        &self.tiles
    }

    fn read_persisted(&self) -> Result<Option<Vec<CommandTile>>> {
        let Some(content) = self.store.read(TILES_FILE)? else {
            return Ok(None);
        };
        let tiles: Vec<CommandTile> =
            serde_json::from_str(&content).context("Failed to parse tiles")?;
        check_tiles(&tiles).context("Saved tiles are invalid")?;
        Ok(Some(tiles))
    }

    /// Replace the whole collection and notify subscribers.
    /// A layout with duplicate ids, blank labels, or overlapping or
    /// overhanging tiles is refused.
    pub fn save(&mut self, tiles: Vec<CommandTile>) -> Result<()> {
        check_tiles(&tiles)?;

        let content = serde_json::to_string_pretty(&tiles).context("Failed to serialize tiles")?;
        self.store.write(TILES_FILE, &content)?;
        self.tiles = tiles;
        info!("Saved {} tiles", self.tiles.len());

        self.notify();
        Ok(())
    }

    fn notify(&mut self) {
        let tiles = &self.tiles;
        self.subscribers.retain(|tx| tx.send(tiles.clone()).is_ok());
        debug!("Notified {} subscribers", self.subscribers.len());
    }

    /// Receive a snapshot after every successful save
    pub fn subscribe(&mut self) -> Receiver<Vec<CommandTile>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn tiles(&self) -> &[CommandTile] {
        &self.tiles
    }

    pub fn find(&self, id: &TileId) -> Option<&CommandTile> {
        self.tiles.iter().find(|tile| &tile.id == id)
    }

    pub fn occupied_cells(&self) -> BTreeSet<Cell> {
        tile::occupied_cells(&self.tiles)
    }

    pub fn free_cells(&self) -> Vec<Cell> {
        tile::free_cells(&self.tiles)
    }

    /// Tiles in stored order, followed in edit mode by an add slot for every
    /// free cell (row-major).
    pub fn layout(&self, edit_mode: bool) -> Vec<GridSlot<'_>> {
        let mut slots: Vec<GridSlot<'_>> = self.tiles.iter().map(GridSlot::Tile).collect();
        if edit_mode {
            slots.extend(self.free_cells().into_iter().map(GridSlot::Add));
        }
        slots
    }
}

fn check_tiles(tiles: &[CommandTile]) -> Result<()> {
    tile::check_layout(tiles)?;
    if let Some(blank) = tiles.iter().find(|t| t.label.trim().is_empty()) {
        bail!("tile '{}' has an empty label", blank.id);
    }
    Ok(())
}
