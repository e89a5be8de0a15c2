//! Trackpad gesture engine
//!
//! Turns raw multi-touch frames into pointer intents:
//!
//! - one finger lifted before the dwell timer fires -> left click
//! - one finger still down when the dwell timer fires -> drag; motion is
//!   accumulated and flushed as one `mouse_move` per display frame
//! - two fingers -> vertical scroll from the change of their average Y
//!
//! The engine owns no timers or frame callbacks. The event loop asks for
//! `deadline()` and `wants_frame()`, and calls `tick()` / `on_frame()` when
//! they are due. Intents collect in an outbox read with `drain()`.
//!
//! Promotion to a drag is gated on time only: a finger that moves but lifts
//! inside the dwell window is still a click and its motion is discarded.

use crate::intent::{MouseButton, PointerIntent};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Hold time that separates a tap from a drag
pub const DWELL: Duration = Duration::from_millis(150);

/// Average-Y changes at or below this many pixels do not scroll
pub const SCROLL_DEADBAND: f64 = 1.0;

/// One active touch point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub id: u64,
    pub x: f64,
    pub y: f64,
}

impl TouchPoint {
    pub fn new(id: u64, x: f64, y: f64) -> Self {
        Self { id, x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// One touch event from the trackpad surface
#[derive(Debug, Clone, PartialEq)]
pub struct TouchFrame {
    pub phase: TouchPhase,
    /// Points still on the surface after this event
    pub touches: Vec<TouchPoint>,
    /// Points that started, moved or lifted in this event
    pub changed: usize,
}

impl TouchFrame {
    pub fn start(touches: Vec<TouchPoint>) -> Self {
        Self { phase: TouchPhase::Start, touches, changed: 1 }
    }

    pub fn moved(touches: Vec<TouchPoint>) -> Self {
        let changed = touches.len();
        Self { phase: TouchPhase::Move, touches, changed }
    }

    /// `lifted` points left the surface, `remaining` are still down
    pub fn end(remaining: Vec<TouchPoint>, lifted: usize) -> Self {
        Self { phase: TouchPhase::End, touches: remaining, changed: lifted }
    }

    /// The platform took the touches away; nothing counts as a tap
    pub fn cancel(remaining: Vec<TouchPoint>, cancelled: usize) -> Self {
        Self { phase: TouchPhase::Cancel, touches: remaining, changed: cancelled }
    }
}

/// User-configured scroll multiplier; one unit is a factor of 0.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSensitivity(pub u8);

impl ScrollSensitivity {
    pub fn factor(&self) -> f64 {
        f64::from(self.0) * 0.1
    }
}

impl Default for ScrollSensitivity {
    fn default() -> Self {
        Self(5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    PendingTap { deadline: Instant },
    Dragging,
    Scrolling { last_avg_y: f64 },
}

pub struct GestureEngine {
    phase: Phase,
    /// Last sample of the tracked finger
    anchor: Option<TouchPoint>,
    /// Motion not yet sent
    pending_dx: f64,
    pending_dy: f64,
    frame_requested: bool,
    sensitivity: ScrollSensitivity,
    enabled: bool,
    outbox: VecDeque<PointerIntent>,
}

impl GestureEngine {
    pub fn new(sensitivity: ScrollSensitivity) -> Self {
        Self {
            phase: Phase::Idle,
            anchor: None,
            pending_dx: 0.0,
            pending_dy: 0.0,
            frame_requested: false,
            sensitivity,
            enabled: true,
            outbox: VecDeque::new(),
        }
    }

    pub fn set_sensitivity(&mut self, sensitivity: ScrollSensitivity) {
        self.sensitivity = sensitivity;
    }

    /// Layout-edit mode turns the engine off. Motion already accumulated is
    /// flushed and any gesture in progress is abandoned.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        if !enabled {
            self.flush_motion();
            self.reset();
        }
        self.enabled = enabled;
        debug!("Gesture engine {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Feed one touch event
    pub fn handle(&mut self, frame: &TouchFrame, now: Instant) {
        if !self.enabled {
            return;
        }
        // A dwell deadline that passed without a tick still counts.
        self.tick(now);

        match frame.phase {
            TouchPhase::Start => self.on_start(&frame.touches, now),
            TouchPhase::Move => self.on_move(&frame.touches),
            TouchPhase::End => self.on_end(&frame.touches, frame.changed),
            TouchPhase::Cancel => self.on_cancel(),
        }
    }

    /// Fire the dwell timer if it is due
    pub fn tick(&mut self, now: Instant) {
        if let Phase::PendingTap { deadline } = self.phase {
            if now >= deadline {
                debug!("Dwell elapsed, dragging");
                self.phase = Phase::Dragging;
            }
        }
    }

    /// When the dwell timer fires, if one is running
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::PendingTap { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Whether a frame callback is scheduled
    pub fn wants_frame(&self) -> bool {
        self.frame_requested
    }

    /// Per-frame callback: emit the accumulated motion as one move
    pub fn on_frame(&mut self) {
        self.frame_requested = false;
        self.flush_motion();
    }

    /// Take the intents produced so far, oldest first
    pub fn drain(&mut self) -> impl Iterator<Item = PointerIntent> + '_ {
        self.outbox.drain(..)
    }

    fn on_start(&mut self, touches: &[TouchPoint], now: Instant) {
        match touches {
            [point] => {
                self.phase = Phase::PendingTap { deadline: now + DWELL };
                self.anchor = Some(*point);
            }
            [first, second] => {
                // A drag turning into a scroll keeps the motion it already made.
                self.flush_motion();
                self.frame_requested = false;
                self.anchor = None;
                self.phase = Phase::Scrolling { last_avg_y: average_y(first, second) };
                debug!("Two-finger scroll started");
            }
            [] => {}
            _ => {
                self.flush_motion();
                self.frame_requested = false;
                self.anchor = None;
                self.phase = Phase::Idle;
            }
        }
    }

    fn on_move(&mut self, touches: &[TouchPoint]) {
        match (self.phase, touches) {
            (Phase::Dragging, [point]) => {
                if let Some(last) = self.anchor.filter(|last| last.id == point.id) {
                    self.pending_dx += point.x - last.x;
                    self.pending_dy += point.y - last.y;
                }
                self.anchor = Some(*point);
                self.frame_requested = true;
            }
            (Phase::Scrolling { last_avg_y }, [first, second]) => {
                let avg_y = average_y(first, second);
                let delta_y = avg_y - last_avg_y;
                self.phase = Phase::Scrolling { last_avg_y: avg_y };
                if delta_y.abs() > SCROLL_DEADBAND {
                    let dy = -delta_y * self.sensitivity.factor();
                    self.outbox.push_back(PointerIntent::MouseScroll { dy });
                }
            }
            _ => {}
        }
    }

    fn on_end(&mut self, remaining: &[TouchPoint], lifted: usize) {
        // Cancel the frame callback and flush synchronously instead.
        self.frame_requested = false;
        self.flush_motion();

        if let Phase::PendingTap { .. } = self.phase {
            if lifted == 1 && remaining.is_empty() {
                debug!("Tap");
                self.outbox.push_back(PointerIntent::MouseClick { button: MouseButton::Left });
            }
        }

        self.phase = Phase::Idle;
        self.anchor = None;
    }

    /// Like a lift, but a pending tap is dropped rather than clicked
    fn on_cancel(&mut self) {
        self.flush_motion();
        self.reset();
        debug!("Touch cancelled");
    }

    fn flush_motion(&mut self) {
        if self.pending_dx != 0.0 || self.pending_dy != 0.0 {
            self.outbox.push_back(PointerIntent::MouseMove {
                dx: self.pending_dx,
                dy: self.pending_dy,
            });
            self.pending_dx = 0.0;
            self.pending_dy = 0.0;
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.anchor = None;
        self.frame_requested = false;
    }
}

impl Default for GestureEngine {
    fn default() -> Self {
        Self::new(ScrollSensitivity::default())
    }
}

fn average_y(first: &TouchPoint, second: &TouchPoint) -> f64 {
    (first.y + second.y) / 2.0
}
