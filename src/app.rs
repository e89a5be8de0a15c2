//! The remote control context
//!
//! `Remote` is constructed once at startup and owns the grid, the editor,
//! the gesture engine and the session. Every input (taps, touches, frames,
//! timers, transport events) enters through it on the single event-loop
//! thread.

use crate::editor::{CommandEditor, Confirm, TileForm};
use crate::error::{EditorError, ValidationError};
use crate::gesture::{GestureEngine, ScrollSensitivity, TouchFrame};
use crate::grid::{GridSlot, GridStore};
use crate::intent::{Intent, MouseButton, PointerIntent};
use crate::session::{Feedback, LinkId, Session, Transport, TransportEvent};
use crate::settings::AppSettings;
use crate::storage::BlobStore;
use crate::tile::{Cell, CommandTile, CommandType, TileId};
use anyhow::Result;
use std::cell::Cell as FlagCell;
use std::rc::Rc;
use std::sync::mpsc::Receiver;
use std::time::Instant;
use tracing::{debug, info};

/// What a tap on a tile did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileTap {
    /// Edit mode: the editor is now open for the tile
    Editing,
    /// The tile's command went out
    Sent,
    /// Not connected, the command was dropped
    Dropped,
    /// No such tile
    Unknown,
}

/// Feedback that only pulses while haptics are switched on
struct GatedFeedback {
    inner: Box<dyn Feedback>,
    enabled: Rc<FlagCell<bool>>,
}

impl Feedback for GatedFeedback {
    fn pulse(&self) {
        if self.enabled.get() {
            self.inner.pulse();
        }
    }
}

pub struct Remote {
    store: Rc<dyn BlobStore>,
    settings: AppSettings,
    haptics: Rc<FlagCell<bool>>,
    grid: GridStore,
    editor: CommandEditor,
    gestures: GestureEngine,
    session: Session,
    edit_mode: bool,
}

impl Remote {
    pub fn new(
        store: Rc<dyn BlobStore>,
        settings: AppSettings,
        transport: Box<dyn Transport>,
        feedback: Box<dyn Feedback>,
    ) -> Self {
        let mut grid = GridStore::new(store.clone());
        grid.load();

        let haptics = Rc::new(FlagCell::new(settings.haptics));
        let feedback = Box::new(GatedFeedback {
            inner: feedback,
            enabled: haptics.clone(),
        });

        Self {
            gestures: GestureEngine::new(ScrollSensitivity(settings.scroll_sensitivity)),
            session: Session::new(transport, feedback, store.clone()),
            editor: CommandEditor::new(),
            store,
            settings,
            haptics,
            grid,
            edit_mode: false,
        }
    }

    pub fn grid(&self) -> &GridStore {
        &self.grid
    }

    /// Receive the tile collection after every successful save or delete
    pub fn subscribe_tiles(&mut self) -> Receiver<Vec<CommandTile>> {
        self.grid.subscribe()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn editor(&self) -> &CommandEditor {
        &self.editor
    }

    pub fn edit_mode(&self) -> bool {
        self.edit_mode
    }

    /// Rendered grid for the current mode
    pub fn layout(&self) -> Vec<GridSlot<'_>> {
        self.grid.layout(self.edit_mode)
    }

    /// Toggle layout-edit mode. The gesture engine is off while editing,
    /// and leaving edit mode discards an unsaved form.
    pub fn set_edit_mode(&mut self, on: bool) {
        if self.edit_mode == on {
            return;
        }
        self.edit_mode = on;
        self.gestures.set_enabled(!on);
        self.forward_pointer();
        if !on {
            self.editor.cancel();
        }
        info!("Edit mode {}", if on { "on" } else { "off" });
    }

    /// Send the tile's command, or open it in the editor while in edit mode
    pub fn tap_tile(&mut self, id: &TileId) -> TileTap {
        if self.edit_mode {
            return match self.editor.open(&self.grid, Some(id), None) {
                Some(_) => TileTap::Editing,
                None => TileTap::Unknown,
            };
        }

        let Some(tile) = self.grid.find(id) else {
            return TileTap::Unknown;
        };
        let intent = Intent::Tile(tile.params.clone());
        debug!("Tile {} tapped", id);
        if self.session.send_intent(&intent) {
            TileTap::Sent
        } else {
            TileTap::Dropped
        }
    }

    /// Open the editor for a new tile at an empty cell (edit mode only)
    pub fn tap_empty_cell(&mut self, cell: Cell) -> bool {
        if !self.edit_mode || !self.grid.free_cells().contains(&cell) {
            return false;
        }
        self.editor.open(&self.grid, None, Some(cell)).is_some()
    }

    /// Dedicated click buttons, inactive while editing
    pub fn click(&mut self, button: MouseButton) -> bool {
        if self.edit_mode {
            return false;
        }
        self.session
            .send_intent(&PointerIntent::MouseClick { button }.into())
    }

    /// Trackpad touch input
    pub fn touch(&mut self, frame: &TouchFrame, now: Instant) {
        if self.edit_mode {
            return;
        }
        self.gestures.handle(frame, now);
        self.forward_pointer();
    }

    /// Timer callback for the dwell deadline
    pub fn tick(&mut self, now: Instant) {
        self.gestures.tick(now);
        self.forward_pointer();
    }

    /// Display-frame callback
    pub fn frame(&mut self) {
        self.gestures.on_frame();
        self.forward_pointer();
    }

    pub fn wants_frame(&self) -> bool {
        self.gestures.wants_frame()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.gestures.deadline()
    }

    pub fn connect(&mut self, host: &str, secret: &str) -> Result<(), ValidationError> {
        self.session.connect(host, secret)
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    pub fn transport_event(&mut self, id: LinkId, event: TransportEvent) {
        self.session.on_transport_event(id, event);
    }

    pub fn edit_form_mut(&mut self) -> Option<&mut TileForm> {
        self.editor.form_mut()
    }

    pub fn change_edit_type(&mut self, kind: CommandType) {
        self.editor.change_type(kind);
    }

    pub fn cancel_edit(&mut self) {
        self.editor.cancel();
    }

    /// Commit the open form
    pub fn save_edit(&mut self, values: TileForm) -> Result<CommandTile, EditorError> {
        self.editor.save(&mut self.grid, values)
    }

    pub fn delete_tile(&mut self, id: &TileId, confirm: &mut impl Confirm) -> Result<bool, EditorError> {
        self.editor.delete(&mut self.grid, id, confirm)
    }

    /// Persist and apply a new scroll sensitivity unit
    pub fn set_scroll_sensitivity(&mut self, unit: u8) -> Result<()> {
        self.settings.set_scroll_sensitivity(unit, self.store.as_ref())?;
        self.gestures
            .set_sensitivity(ScrollSensitivity(self.settings.scroll_sensitivity));
        Ok(())
    }

    pub fn set_haptics(&mut self, enabled: bool) -> Result<()> {
        self.settings.set_haptics(enabled, self.store.as_ref())?;
        self.haptics.set(enabled);
        Ok(())
    }

    fn forward_pointer(&mut self) {
        for intent in self.gestures.drain() {
            self.session.send_intent(&intent.into());
        }
    }
}
