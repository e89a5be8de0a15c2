//! Integration tests for Touchpad Remote
//!
//! These tests drive the public API the way the event loop does: taps,
//! touches, frames and transport events go in, wire messages come out.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::{Duration, Instant};

use touchpad_remote::editor::{CommandEditor, ParamForm, TileForm};
use touchpad_remote::gesture::{GestureEngine, ScrollSensitivity, TouchFrame, TouchPoint};
use touchpad_remote::grid::{GridStore, TILES_FILE};
use touchpad_remote::intent::{MouseButton, PointerIntent};
use touchpad_remote::session::{Link, LinkId, Transport, TransportEvent};
use touchpad_remote::tile::{self, Cell, CommandType, TileId};
use touchpad_remote::{
    AppSettings, BlobStore, DirStore, EditorError, MemoryStore, NoFeedback, PlacementConflict, Remote,
    SessionState, Surface, TileTap, TransportError,
};

#[derive(Default)]
struct Wire {
    urls: Vec<String>,
    sent: Vec<String>,
    closed: Vec<String>,
}

struct FakeTransport(Rc<RefCell<Wire>>);

struct FakeLink(Rc<RefCell<Wire>>);

impl Transport for FakeTransport {
    fn open(&mut self, _id: LinkId, url: &str) -> Box<dyn Link> {
        self.0.borrow_mut().urls.push(url.to_string());
        Box::new(FakeLink(self.0.clone()))
    }
}

impl Link for FakeLink {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.0.borrow_mut().sent.push(text);
        Ok(())
    }

    fn close(&mut self, reason: &str) {
        self.0.borrow_mut().closed.push(reason.to_string());
    }
}

fn remote_with(store: Rc<dyn BlobStore>) -> (Remote, Rc<RefCell<Wire>>) {
    let wire = Rc::new(RefCell::new(Wire::default()));
    let remote = Remote::new(
        store,
        AppSettings::default(),
        Box::new(FakeTransport(wire.clone())),
        Box::new(NoFeedback),
    );
    (remote, wire)
}

fn handshake(remote: &mut Remote) {
    remote.connect("192.168.1.20", "hunter2").unwrap();
    remote.transport_event(LinkId(1), TransportEvent::Opened);
    remote.transport_event(
        LinkId(1),
        TransportEvent::Message(r#"{"type":"handshake_success"}"#.to_string()),
    );
}

fn sent_json(wire: &Rc<RefCell<Wire>>) -> Vec<serde_json::Value> {
    wire.borrow()
        .sent
        .iter()
        .map(|text| serde_json::from_str(text).unwrap())
        .collect()
}

/// Test that a fresh install shows the six media tiles in rows 1-2
#[test]
fn test_default_layout_scenario() {
    let mut grid = GridStore::new(Rc::new(MemoryStore::new()));
    let tiles = grid.load().to_vec();

    assert_eq!(tiles.len(), 6);
    assert!(tile::check_layout(&tiles).is_ok());

    let expected: BTreeSet<Cell> = (1..=2)
        .flat_map(|row| (1..=4).map(move |col| Cell::new(row, col)))
        .collect();
    assert_eq!(grid.occupied_cells(), expected);
}

/// Test that saving what was loaded changes nothing, on disk too
#[test]
fn test_dir_store_round_trip_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let store: Rc<dyn BlobStore> = Rc::new(DirStore::new(tmp.path()).unwrap());

    let mut grid = GridStore::new(store.clone());
    let loaded = grid.load().to_vec();
    grid.save(loaded.clone()).unwrap();
    let first = std::fs::read_to_string(tmp.path().join(TILES_FILE)).unwrap();

    let mut reopened = GridStore::new(store);
    assert_eq!(reopened.load(), loaded.as_slice());
    let reloaded = reopened.tiles().to_vec();
    reopened.save(reloaded).unwrap();
    assert_eq!(std::fs::read_to_string(tmp.path().join(TILES_FILE)).unwrap(), first);
}

/// Test that no sequence of editor saves can produce overlapping tiles
#[test]
fn test_editor_never_creates_overlap() {
    let mut grid = GridStore::new(Rc::new(MemoryStore::new()));
    grid.load();
    let mut editor = CommandEditor::new();

    let attempts = [
        (Cell::new(3, 1), "2", "2"),
        (Cell::new(3, 2), "1", "1"),
        (Cell::new(4, 3), "2", "3"),
        (Cell::new(5, 3), "1", "1"),
        (Cell::new(8, 4), "1", "2"),
        (Cell::new(7, 1), "4", "1"),
    ];

    for (cell, w, h) in attempts {
        editor.open(&grid, None, Some(cell));
        let values = TileForm {
            label: format!("at {}", cell),
            w: w.to_string(),
            h: h.to_string(),
            ..TileForm::new_tile()
        };
        match editor.save(&mut grid, values) {
            Ok(_) | Err(EditorError::Placement(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
        editor.cancel();
        assert!(tile::check_layout(grid.tiles()).is_ok());
    }

    // 3,1 (2x2), 4,3 (2x3) and 7,1 (4x1) fit; the rest collide or overhang
    assert_eq!(grid.tiles().len(), 9);
}

/// Test that an overhanging tile is reported as a placement conflict
#[test]
fn test_editor_rejects_overhang() {
    let mut grid = GridStore::new(Rc::new(MemoryStore::new()));
    grid.load();
    let mut editor = CommandEditor::new();
    editor.open(&grid, None, Some(Cell::new(8, 1)));

    let values = TileForm {
        label: "Tall".to_string(),
        h: "2".to_string(),
        ..TileForm::new_tile()
    };
    let err = editor.save(&mut grid, values).unwrap_err();
    assert!(matches!(err, EditorError::Placement(PlacementConflict::OutOfBounds { .. })));
    assert!(editor.is_open());
}

/// Test the dwell/tap property: a quick lift is exactly one click
#[test]
fn test_gesture_quick_tap() {
    let mut engine = GestureEngine::default();
    let t0 = Instant::now();

    engine.handle(&TouchFrame::start(vec![TouchPoint::new(0, 50.0, 50.0)]), t0);
    engine.handle(&TouchFrame::end(vec![], 1), t0 + Duration::from_millis(100));
    engine.on_frame();

    let intents: Vec<PointerIntent> = engine.drain().collect();
    assert_eq!(intents, vec![PointerIntent::MouseClick { button: MouseButton::Left }]);
}

/// Test the drag property: held past the dwell then moved by (5, -3)
#[test]
fn test_gesture_drag_totals_motion() {
    let mut engine = GestureEngine::default();
    let t0 = Instant::now();

    engine.handle(&TouchFrame::start(vec![TouchPoint::new(0, 100.0, 100.0)]), t0);
    engine.tick(t0 + Duration::from_millis(151));
    engine.handle(&TouchFrame::moved(vec![TouchPoint::new(0, 102.0, 99.0)]), t0 + Duration::from_millis(160));
    engine.on_frame();
    engine.handle(&TouchFrame::moved(vec![TouchPoint::new(0, 105.0, 97.0)]), t0 + Duration::from_millis(170));
    engine.handle(&TouchFrame::end(vec![], 1), t0 + Duration::from_millis(180));

    let intents: Vec<PointerIntent> = engine.drain().collect();
    let (mut dx, mut dy) = (0.0, 0.0);
    for intent in &intents {
        match intent {
            PointerIntent::MouseMove { dx: x, dy: y } => {
                dx += x;
                dy += y;
            }
            other => panic!("unexpected intent {other:?}"),
        }
    }
    assert_eq!((dx, dy), (5.0, -3.0));
    assert_eq!(intents.len(), 2);
}

/// Test the scroll property: average Y -10 at unit 5 scrolls by 5
#[test]
fn test_gesture_two_finger_scroll() {
    let mut engine = GestureEngine::new(ScrollSensitivity(5));
    let t0 = Instant::now();

    engine.handle(
        &TouchFrame::start(vec![TouchPoint::new(0, 10.0, 200.0), TouchPoint::new(1, 60.0, 220.0)]),
        t0,
    );
    engine.handle(
        &TouchFrame::moved(vec![TouchPoint::new(0, 10.0, 190.0), TouchPoint::new(1, 60.0, 210.0)]),
        t0,
    );
    engine.handle(&TouchFrame::end(vec![TouchPoint::new(1, 60.0, 210.0)], 1), t0);
    engine.handle(&TouchFrame::end(vec![], 1), t0);

    let intents: Vec<PointerIntent> = engine.drain().collect();
    assert_eq!(intents, vec![PointerIntent::MouseScroll { dy: 5.0 }]);
}

/// Test a full session: handshake, tile tap, pointer input, disconnect
#[test]
fn test_session_end_to_end() {
    let (mut remote, wire) = remote_with(Rc::new(MemoryStore::new()));

    assert!(remote.connect("", "hunter2").is_err());
    assert!(wire.borrow().urls.is_empty());
    assert_eq!(remote.session().state(), SessionState::Disconnected);

    handshake(&mut remote);
    assert_eq!(wire.borrow().urls, vec!["ws://192.168.1.20:59874".to_string()]);
    assert_eq!(remote.session().surface(), &Surface::Controls);

    assert_eq!(remote.tap_tile(&TileId::new("cmd-1")), TileTap::Sent);
    assert!(remote.click(MouseButton::Right));
    remote.disconnect();

    assert_eq!(
        sent_json(&wire),
        vec![
            serde_json::json!({ "key": "hunter2" }),
            serde_json::json!({ "type": "media_control", "data": { "action": "media_play_pause" } }),
            serde_json::json!({ "type": "mouse_click", "data": { "button": "right" } }),
        ]
    );
    assert_eq!(wire.borrow().closed, vec!["User disconnected".to_string()]);
    assert_eq!(
        remote.session().surface(),
        &Surface::ConnectionPrompt { message: "User disconnected".to_string() }
    );
}

/// Test that a rejected secret lands back at the prompt
#[test]
fn test_session_auth_failure() {
    let (mut remote, wire) = remote_with(Rc::new(MemoryStore::new()));
    remote.connect("192.168.1.20", "wrong").unwrap();
    remote.transport_event(LinkId(1), TransportEvent::Opened);
    remote.transport_event(
        LinkId(1),
        TransportEvent::Message(r#"{"type":"auth_failed"}"#.to_string()),
    );

    assert_eq!(remote.session().state(), SessionState::Disconnected);
    assert_eq!(remote.session().status_message(), "Authentication Failed");
    assert_eq!(wire.borrow().closed, vec!["Authentication Failed".to_string()]);
}

/// Test creating a macro tile in edit mode and firing it afterwards
#[test]
fn test_create_and_fire_macro_tile() {
    let store: Rc<dyn BlobStore> = Rc::new(MemoryStore::new());
    let (mut remote, wire) = remote_with(store.clone());
    handshake(&mut remote);

    remote.set_edit_mode(true);
    assert!(remote.tap_empty_cell(Cell::new(3, 1)));
    remote.change_edit_type(CommandType::Macro);

    let mut values = remote.editor().form().unwrap().clone();
    values.label = "Greet".to_string();
    values.params = ParamForm::Macro { script: "TYPE \"hi\"\nPRESS enter".to_string() };
    let tile = remote.save_edit(values).unwrap();
    remote.set_edit_mode(false);

    assert_eq!(remote.tap_tile(&tile.id), TileTap::Sent);
    assert_eq!(
        sent_json(&wire).last(),
        Some(&serde_json::json!({ "type": "macro", "data": { "script": "TYPE \"hi\"\nPRESS enter" } }))
    );

    // The new tile survives a restart
    let (restarted, _) = remote_with(store);
    assert_eq!(restarted.grid().find(&tile.id), Some(&tile));
}
