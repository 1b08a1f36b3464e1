//! Drag gestures on the vertical brightness slider.
//!
//! Mouse and touch input are normalized to a pointer id and a `client_y`
//! reading. While a drag is active the tracker holds a [`CaptureGuard`] on
//! the [`PointerHub`], so move/up events reach it even when the pointer has
//! left the slider surface. The guard is released when the drag ends or the
//! tracker is dropped.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::{debug, trace};

use crate::observe::Observable;

// =============================================================================
// Input normalization
// =============================================================================

/// Identifies the pointer driving a drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerId {
    /// The mouse.
    Mouse,
    /// A touch contact, by its platform identifier.
    Touch(i64),
}

/// One touch contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    /// Platform contact identifier.
    pub id: i64,
    /// Vertical viewport coordinate.
    pub client_y: f64,
}

/// Raw pointer input as delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerInput {
    /// A mouse event.
    Mouse {
        /// Vertical viewport coordinate.
        client_y: f64,
    },
    /// A touch event with its active contacts.
    Touch {
        /// Active contacts; the first one is the primary contact.
        touches: Vec<TouchPoint>,
    },
}

impl PointerInput {
    /// Reduce to `(pointer, client_y)`. Touch uses the primary contact;
    /// a touch event without contacts yields `None`.
    pub fn normalize(&self) -> Option<(PointerId, f64)> {
        match self {
            PointerInput::Mouse { client_y } => Some((PointerId::Mouse, *client_y)),
            PointerInput::Touch { touches } => touches
                .first()
                .map(|t| (PointerId::Touch(t.id), t.client_y)),
        }
    }
}

/// A window-level pointer event.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    /// Pointer moved (mousemove / touchmove).
    Move(PointerInput),
    /// Pointer released (mouseup / touchend).
    Up(PointerId),
}

// =============================================================================
// Geometry
// =============================================================================

/// Measured on-screen geometry of the slider surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderGeometry {
    /// Viewport y of the surface's top edge.
    pub top: f64,
    /// Surface height in the same units.
    pub height: f64,
}

impl SliderGeometry {
    /// Map a vertical coordinate to a 0-100 value, bottom = 0, top = 100.
    ///
    /// Returns `None` for a degenerate surface (zero, negative or non-finite
    /// height) or a non-finite coordinate.
    pub fn value_at(&self, client_y: f64) -> Option<f64> {
        if !(self.height.is_finite() && self.height > 0.0) || !client_y.is_finite() {
            return None;
        }
        let y = client_y - self.top;
        let value = (self.height - y) / self.height * 100.0;
        Some(value.clamp(0.0, 100.0))
    }
}

// =============================================================================
// Pointer hub (global capture)
// =============================================================================

type PointerListener = Rc<dyn Fn(&PointerEvent)>;

#[derive(Default)]
struct HubRegistry {
    listeners: Vec<(usize, PointerListener)>,
    next_id: usize,
}

/// Window-level dispatcher for pointer move/up events.
///
/// The host forwards every global pointer event here; only components that
/// currently hold a [`CaptureGuard`] receive them.
#[derive(Clone, Default)]
pub struct PointerHub {
    registry: Rc<RefCell<HubRegistry>>,
}

impl PointerHub {
    /// Create a hub with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` until the returned guard is dropped.
    pub fn capture(&self, listener: impl Fn(&PointerEvent) + 'static) -> CaptureGuard {
        let mut reg = self.registry.borrow_mut();
        let id = reg.next_id;
        reg.next_id += 1;
        reg.listeners.push((id, Rc::new(listener)));
        CaptureGuard {
            registry: Rc::downgrade(&self.registry),
            id,
        }
    }

    /// Deliver `event` to every current listener.
    ///
    /// Listeners may release their own or other captures while handling the
    /// event.
    pub fn dispatch(&self, event: &PointerEvent) {
        let listeners: Vec<PointerListener> = self
            .registry
            .borrow()
            .listeners
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Number of active captures.
    pub fn listener_count(&self) -> usize {
        self.registry.borrow().listeners.len()
    }
}

/// A scoped pointer capture; unregisters its listener on drop.
#[must_use = "dropping the guard releases the capture"]
pub struct CaptureGuard {
    registry: Weak<RefCell<HubRegistry>>,
    id: usize,
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .borrow_mut()
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}

// =============================================================================
// GestureTracker
// =============================================================================

/// An active drag: which pointer drives it and its capture on the hub.
struct DragSession {
    pointer: PointerId,
    _capture: CaptureGuard,
}

struct TrackerInner {
    value: Observable<f64>,
    geometry: Cell<Option<SliderGeometry>>,
    session: RefCell<Option<DragSession>>,
    on_input: Box<dyn Fn(f64)>,
}

impl TrackerInner {
    /// Recompute from `client_y`; emits only when the geometry allows it.
    fn apply(&self, client_y: f64) {
        let Some(geometry) = self.geometry.get() else {
            trace!("slider not measured yet, ignoring y={}", client_y);
            return;
        };
        let Some(value) = geometry.value_at(client_y) else {
            trace!("degenerate slider geometry {:?}", geometry);
            return;
        };
        self.value.set(value);
        (self.on_input)(value);
    }

    fn move_drag(&self, input: &PointerInput) {
        let Some((pointer, client_y)) = input.normalize() else {
            return;
        };
        let active = matches!(&*self.session.borrow(), Some(s) if s.pointer == pointer);
        if active {
            self.apply(client_y);
        }
    }

    fn end_drag(&self) {
        // Take the session out first so the guard drops without the cell borrowed.
        let session = self.session.borrow_mut().take();
        if let Some(session) = session {
            debug!("drag ended ({:?})", session.pointer);
        }
    }
}

/// Converts drag gestures on the slider into a 0-100 value.
///
/// Every gesture-driven value is written to the shared value cell and
/// forwarded to the input sink given at construction. Seeding through
/// [`GestureTracker::seed`] updates the cell only.
pub struct GestureTracker {
    inner: Rc<TrackerInner>,
    hub: PointerHub,
}

impl GestureTracker {
    /// Create a tracker writing to `value` and reporting user input to `on_input`.
    pub fn new(value: Observable<f64>, hub: PointerHub, on_input: impl Fn(f64) + 'static) -> Self {
        Self {
            inner: Rc::new(TrackerInner {
                value,
                geometry: Cell::new(None),
                session: RefCell::new(None),
                on_input: Box::new(on_input),
            }),
            hub,
        }
    }

    /// Update the measured slider geometry (`None` = not laid out yet).
    pub fn set_geometry(&self, geometry: Option<SliderGeometry>) {
        self.inner.geometry.set(geometry);
    }

    /// Current slider value.
    pub fn value(&self) -> f64 {
        self.inner.value.get()
    }

    /// Set the value without treating it as user input.
    pub fn seed(&self, value: f64) {
        if value.is_finite() {
            self.inner.value.set(value.clamp(0.0, 100.0));
        }
    }

    /// Whether a drag session is active.
    pub fn is_dragging(&self) -> bool {
        self.inner.session.borrow().is_some()
    }

    /// Begin a drag (mousedown / touchstart on the slider).
    pub fn start_drag(&self, input: &PointerInput) {
        let Some((pointer, client_y)) = input.normalize() else {
            return;
        };
        // Release a stale session before capturing again.
        self.inner.end_drag();

        let weak = Rc::downgrade(&self.inner);
        let capture = self.hub.capture(move |event| {
            let Some(tracker) = weak.upgrade() else {
                return;
            };
            match event {
                PointerEvent::Move(input) => tracker.move_drag(input),
                PointerEvent::Up(id) => {
                    let owns = matches!(&*tracker.session.borrow(), Some(s) if s.pointer == *id);
                    if owns {
                        tracker.end_drag();
                    }
                }
            }
        });

        debug!("drag started ({:?})", pointer);
        *self.inner.session.borrow_mut() = Some(DragSession {
            pointer,
            _capture: capture,
        });
        self.inner.apply(client_y);
    }

    /// Continue the drag; ignored unless a session for this pointer is active.
    pub fn move_drag(&self, input: &PointerInput) {
        self.inner.move_drag(input);
    }

    /// End the active drag, if any.
    pub fn end_drag(&self) {
        self.inner.end_drag();
    }
}

impl Drop for GestureTracker {
    fn drop(&mut self) {
        self.inner.end_drag();
    }
}
