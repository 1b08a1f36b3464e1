//! Interactive state core for a networked LED strip control panel.
//!
//! The panel has a vertical brightness slider, an effect list and a power
//! switch. This crate owns the logic behind them and leaves rendering and
//! networking to the host:
//!
//! - [`GestureTracker`] turns mouse/touch drags into a 0-100 value.
//! - [`BrightnessSync`] sends that value to the device with at most one
//!   write in flight, coalescing values that arrive meanwhile.
//! - [`EffectsAndPower`] handles effect selection and power with
//!   optimistic, last-write-wins local state.
//! - [`PanelViewModel`] wires them together and seeds everything from the
//!   device on load without writing anything back.
//!
//! The host supplies a [`Transport`] (one request/response call), a
//! [`futures::task::LocalSpawn`] to run writes on, and forwards global
//! pointer events to a [`PointerHub`].
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use futures::executor::LocalPool;
//! use ledpanel_core::{
//!     MockDevice, PanelConfig, PanelViewModel, PointerEvent, PointerHub, PointerId,
//!     PointerInput, SliderGeometry,
//! };
//!
//! let mut pool = LocalPool::new();
//! let device = Rc::new(MockDevice::new());
//! let hub = PointerHub::new();
//! let panel = PanelViewModel::new(
//!     device.clone(),
//!     Rc::new(pool.spawner()),
//!     hub.clone(),
//!     PanelConfig::default(),
//! );
//! panel.start();
//! pool.run_until_stalled();
//!
//! // Drag from the middle of a 200px slider to its top.
//! panel.set_slider_geometry(Some(SliderGeometry { top: 0.0, height: 200.0 }));
//! panel.pointer_down(&PointerInput::Mouse { client_y: 100.0 });
//! hub.dispatch(&PointerEvent::Move(PointerInput::Mouse { client_y: -20.0 }));
//! hub.dispatch(&PointerEvent::Up(PointerId::Mouse));
//! pool.run_until_stalled();
//!
//! assert_eq!(device.brightness(), 100);
//! assert_eq!(panel.brightness_label(), "100%");
//! ```
//!
//! # Testing
//!
//! Use [`MockDevice`] to test code without hardware. It records calls,
//! injects failures and can hold write responses to exercise ordering.

#![warn(missing_docs)]

mod api;
mod brightness;
mod config;
mod effects;
mod error;
mod gesture;
mod mock;
mod observe;
mod panel;
mod state;

// Re-export public API
pub use api::{DeviceApi, Method, Transport};
pub use brightness::{BrightnessSync, to_percent};
pub use config::{DEFAULT_API_PREFIX, DEFAULT_BRIGHTNESS, PanelConfig};
pub use effects::EffectsAndPower;
pub use error::{DeviceError, PanelError};
pub use gesture::{
    CaptureGuard, GestureTracker, PointerEvent, PointerHub, PointerId, PointerInput,
    SliderGeometry, TouchPoint,
};
pub use mock::{MockDevice, RecordedCall};
pub use observe::{Observable, Subscription};
pub use panel::{PanelState, PanelViewModel};
pub use state::{BrightnessRequest, DeviceStatus, EffectAck, EffectList, ReportedBrightness};
