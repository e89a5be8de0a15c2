//! Command Editor
//!
//! Form-based creation, editing and deletion of tiles. The editor is the
//! only path that mutates the grid, and it checks placement before every
//! commit so the no-overlap invariant holds after any successful save.

use crate::error::{EditorError, ValidationError};
use crate::grid::GridStore;
use crate::macro_script::MacroScript;
use crate::tile::{self, Cell, CommandParams, CommandTile, CommandType, MediaAction, TileId, MAX_SPAN};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// What an open editor will write to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTarget {
    Existing(TileId),
    NewAt(Cell),
}

/// Per-type input fields, as typed by the user
#[derive(Debug, Clone, PartialEq)]
pub enum ParamForm {
    KeyPress { key: String },
    /// Comma-separated key names
    KeyCombo { keys: String },
    Text { text: String },
    MediaControl { action: MediaAction },
    Website { url: String },
    Shell { command: String },
    Macro { script: String },
}

impl ParamForm {
    /// Empty fields for `kind`
    pub fn blank(kind: CommandType) -> Self {
        match kind {
            CommandType::KeyPress => ParamForm::KeyPress { key: String::new() },
            CommandType::KeyCombo => ParamForm::KeyCombo { keys: String::new() },
            CommandType::Text => ParamForm::Text { text: String::new() },
            CommandType::MediaControl => ParamForm::MediaControl { action: MediaAction::MediaPlayPause },
            CommandType::Website => ParamForm::Website { url: String::new() },
            CommandType::Shell => ParamForm::Shell { command: String::new() },
            CommandType::Macro => ParamForm::Macro { script: String::new() },
        }
    }

    pub fn from_params(params: &CommandParams) -> Self {
        match params {
            CommandParams::KeyPress { key } => ParamForm::KeyPress { key: key.clone() },
            CommandParams::KeyCombo { keys } => ParamForm::KeyCombo { keys: keys.join(",") },
            CommandParams::Text { text } => ParamForm::Text { text: text.clone() },
            CommandParams::MediaControl { action } => ParamForm::MediaControl { action: *action },
            CommandParams::Website { url } => ParamForm::Website { url: url.clone() },
            CommandParams::Shell { command } => ParamForm::Shell { command: command.clone() },
            CommandParams::Macro { script } => ParamForm::Macro { script: script.clone() },
        }
    }

    pub fn command_type(&self) -> CommandType {
        match self {
            ParamForm::KeyPress { .. } => CommandType::KeyPress,
            ParamForm::KeyCombo { .. } => CommandType::KeyCombo,
            ParamForm::Text { .. } => CommandType::Text,
            ParamForm::MediaControl { .. } => CommandType::MediaControl,
            ParamForm::Website { .. } => CommandType::Website,
            ParamForm::Shell { .. } => CommandType::Shell,
            ParamForm::Macro { .. } => CommandType::Macro,
        }
    }

    /// Build the params record. Only the fields of this type exist, so
    /// nothing from a previous type can leak into the tile.
    pub fn to_params(&self) -> CommandParams {
        match self {
            ParamForm::KeyPress { key } => CommandParams::KeyPress { key: key.trim().to_string() },
            ParamForm::KeyCombo { keys } => CommandParams::KeyCombo { keys: split_keys(keys) },
            ParamForm::Text { text } => CommandParams::Text { text: text.clone() },
            ParamForm::MediaControl { action } => CommandParams::MediaControl { action: *action },
            ParamForm::Website { url } => CommandParams::Website { url: url.trim().to_string() },
            ParamForm::Shell { command } => CommandParams::Shell { command: command.clone() },
            ParamForm::Macro { script } => CommandParams::Macro { script: script.clone() },
        }
    }

    /// Current value of the single input field
    pub fn value(&self) -> String {
        match self {
            ParamForm::KeyPress { key } => key.clone(),
            ParamForm::KeyCombo { keys } => keys.clone(),
            ParamForm::Text { text } => text.clone(),
            ParamForm::MediaControl { action } => action.as_str().to_string(),
            ParamForm::Website { url } => url.clone(),
            ParamForm::Shell { command } => command.clone(),
            ParamForm::Macro { script } => script.clone(),
        }
    }

    /// Replace the input field. Fails only for an unknown media action.
    pub fn set_value(&mut self, value: &str) -> Result<(), String> {
        match self {
            ParamForm::KeyPress { key } => *key = value.to_string(),
            ParamForm::KeyCombo { keys } => *keys = value.to_string(),
            ParamForm::Text { text } => *text = value.to_string(),
            ParamForm::MediaControl { action } => *action = value.trim().parse()?,
            ParamForm::Website { url } => *url = value.to_string(),
            ParamForm::Shell { command } => *command = value.to_string(),
            ParamForm::Macro { script } => *script = value.to_string(),
        }
        Ok(())
    }
}

/// "ctrl, alt,,delete" -> ["ctrl", "alt", "delete"]
fn split_keys(keys: &str) -> Vec<String> {
    keys.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

/// Editor form values
#[derive(Debug, Clone, PartialEq)]
pub struct TileForm {
    pub label: String,
    pub color: String,
    pub params: ParamForm,
    pub w: String,
    pub h: String,
}

impl TileForm {
    /// Defaults for a tile created from an empty cell
    pub fn new_tile() -> Self {
        Self {
            label: String::new(),
            color: tile::DEFAULT_COLOR.to_string(),
            params: ParamForm::blank(CommandType::KeyPress),
            w: "1".to_string(),
            h: "1".to_string(),
        }
    }

    pub fn from_tile(tile: &CommandTile) -> Self {
        Self {
            label: tile.label.clone(),
            color: tile.color.clone(),
            params: ParamForm::from_params(&tile.params),
            w: tile.w.to_string(),
            h: tile.h.to_string(),
        }
    }

    /// Parsed macro for the preview pane, if this is a macro tile
    pub fn macro_preview(&self) -> Option<MacroScript> {
        match &self.params {
            ParamForm::Macro { script } => Some(MacroScript::parse(script)),
            _ => None,
        }
    }
}

fn parse_span(field: &'static str, value: &str) -> Result<u8, ValidationError> {
    value
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|span| (1..=MAX_SPAN).contains(span))
        .ok_or_else(|| ValidationError::InvalidSize { field, value: value.to_string() })
}

/// A yes/no question put to the user before a destructive action
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone)]
struct EditSession {
    target: EditTarget,
    form: TileForm,
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

pub struct CommandEditor {
    session: Option<EditSession>,
    clock: fn() -> u64,
    last_issued: u64,
}

impl Default for CommandEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandEditor {
    pub fn new() -> Self {
        Self::with_clock(unix_millis)
    }

    /// Editor whose new ids are derived from `clock` (milliseconds)
    pub fn with_clock(clock: fn() -> u64) -> Self {
        Self {
            session: None,
            clock,
            last_issued: 0,
        }
    }

    /// Start editing `existing`, or a new tile anchored at `target`.
    /// Does nothing if the id is unknown or no usable target is given.
    pub fn open(
        &mut self,
        grid: &GridStore,
        existing: Option<&TileId>,
        target: Option<Cell>,
    ) -> Option<&TileForm> {
        let session = match (existing, target) {
            (Some(id), _) => {
                let Some(tile) = grid.find(id) else {
                    warn!("Cannot edit unknown command {}", id);
                    return None;
                };
                EditSession {
                    target: EditTarget::Existing(id.clone()),
                    form: TileForm::from_tile(tile),
                }
            }
            (None, Some(cell)) if cell.in_grid() => EditSession {
                target: EditTarget::NewAt(cell),
                form: TileForm::new_tile(),
            },
            (None, _) => {
                warn!("Cannot add a command without a target cell");
                return None;
            }
        };

        info!("Editing {:?}", session.target);
        self.session = Some(session);
        self.form()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn target(&self) -> Option<&EditTarget> {
        self.session.as_ref().map(|session| &session.target)
    }

    pub fn form(&self) -> Option<&TileForm> {
        self.session.as_ref().map(|session| &session.form)
    }

    pub fn form_mut(&mut self) -> Option<&mut TileForm> {
        self.session.as_mut().map(|session| &mut session.form)
    }

    /// Switch the form to another command type. The parameter fields are
    /// reset, the size is kept (empty sizes become 1).
    pub fn change_type(&mut self, kind: CommandType) {
        let Some(form) = self.form_mut() else {
            return;
        };
        if form.params.command_type() != kind {
            form.params = ParamForm::blank(kind);
        }
        for span in [&mut form.w, &mut form.h] {
            if span.trim().is_empty() {
                *span = "1".to_string();
            }
        }
        debug!("Editor type changed to {}", kind);
    }

    pub fn cancel(&mut self) {
        if self.session.take().is_some() {
            debug!("Edit cancelled");
        }
    }

    /// Validate `values` and commit them. On error nothing is written and
    /// the editor stays open with the submitted values.
    pub fn save(&mut self, grid: &mut GridStore, values: TileForm) -> Result<CommandTile, EditorError> {
        let session = self.session.as_mut().ok_or(EditorError::NotEditing)?;
        session.form = values;
        let target = session.target.clone();
        let form = session.form.clone();

        let label = form.label.trim();
        if label.is_empty() {
            return Err(ValidationError::EmptyLabel.into());
        }
        let w = parse_span("Width", &form.w)?;
        let h = parse_span("Height", &form.h)?;

        let (id, anchor) = match target {
            EditTarget::Existing(id) => {
                let tile = grid.find(&id).ok_or_else(|| EditorError::UnknownTile(id.clone()))?;
                let anchor = tile.anchor();
                (id, anchor)
            }
            EditTarget::NewAt(cell) => (self.allocate_id(grid)?, cell),
        };

        let tile = CommandTile {
            id,
            label: label.to_string(),
            params: form.params.to_params(),
            color: form.color.clone(),
            row: anchor.row,
            col: anchor.col,
            w,
            h,
        };

        let mut tiles = grid.tiles().to_vec();
        tile::check_placement(&tiles, &tile)?;
        match tiles.iter_mut().find(|existing| existing.id == tile.id) {
            Some(existing) => *existing = tile.clone(),
            None => tiles.push(tile.clone()),
        }
        grid.save(tiles)?;

        info!("Saved command {} ({})", tile.id, tile.command_type());
        self.session = None;
        Ok(tile)
    }

    /// Remove a tile after the user confirms. Returns whether it was removed.
    pub fn delete(
        &mut self,
        grid: &mut GridStore,
        id: &TileId,
        confirm: &mut impl Confirm,
    ) -> Result<bool, EditorError> {
        let tile = grid.find(id).ok_or_else(|| EditorError::UnknownTile(id.clone()))?;
        if !confirm.confirm(&format!("Delete \"{}\"?", tile.label)) {
            debug!("Delete of {} declined", id);
            return Ok(false);
        }

        let tiles: Vec<CommandTile> = grid.tiles().iter().filter(|t| &t.id != id).cloned().collect();
        grid.save(tiles)?;

        if self.target() == Some(&EditTarget::Existing(id.clone())) {
            self.session = None;
        }
        info!("Deleted command {}", id);
        Ok(true)
    }

    /// `cmd-<millis>`, strictly increasing even if the clock stalls
    fn allocate_id(&mut self, grid: &GridStore) -> Result<TileId, EditorError> {
        let next = (self.clock)().max(self.last_issued + 1);
        self.last_issued = next;
        let id = TileId::new(format!("cmd-{}", next));
        if grid.find(&id).is_some() {
            return Err(EditorError::IdCollision(id));
        }
        Ok(id)
    }
}
