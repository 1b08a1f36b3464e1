//! The panel view model.
//!
//! Composes the gesture tracker, brightness sync and effects/power
//! controller over one set of observable state cells, and reconciles that
//! state with the device on load and on refresh. Reconciliation only ever
//! reads from the device.

use std::rc::{Rc, Weak};

use futures::task::{LocalSpawn, LocalSpawnExt};
use log::{debug, info, warn};

use crate::api::{DeviceApi, Transport};
use crate::brightness::{BrightnessSync, to_percent};
use crate::config::PanelConfig;
use crate::effects::EffectsAndPower;
use crate::error::{DeviceError, PanelError};
use crate::gesture::{GestureTracker, PointerHub, PointerInput, SliderGeometry};
use crate::observe::Observable;
use crate::state::{DeviceStatus, EffectList};

// =============================================================================
// PanelState
// =============================================================================

/// The observable state a rendered panel reflects.
///
/// Subscribe to any cell to be notified on actual transitions.
#[derive(Debug, Clone)]
pub struct PanelState {
    /// Slider value, 0-100.
    pub brightness: Observable<f64>,
    /// Selected effect.
    pub current_effect: Observable<Option<String>>,
    /// Power switch.
    pub power: Observable<bool>,
    /// Effect names in device order.
    pub effects: Observable<Vec<String>>,
    /// Set once the initial reconciliation has finished (successfully or not).
    pub loaded: Observable<bool>,
    /// Most recent device failure.
    pub last_error: Observable<Option<DeviceError>>,
}

impl PanelState {
    fn new(brightness: f64) -> Self {
        Self {
            brightness: Observable::new(brightness),
            current_effect: Observable::new(None),
            power: Observable::new(false),
            effects: Observable::new(Vec::new()),
            loaded: Observable::new(false),
            last_error: Observable::new(None),
        }
    }
}

// =============================================================================
// PanelViewModel
// =============================================================================

/// The control panel: brightness slider, effect list and power switch.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use futures::executor::LocalPool;
/// use ledpanel_core::{MockDevice, PanelConfig, PanelViewModel, PointerHub};
///
/// let mut pool = LocalPool::new();
/// let device = Rc::new(MockDevice::new());
/// let panel = PanelViewModel::new(
///     device.clone(),
///     Rc::new(pool.spawner()),
///     PointerHub::new(),
///     PanelConfig::default(),
/// );
/// panel.start();
/// pool.run_until_stalled();
///
/// assert!(panel.state().loaded.get());
/// assert_eq!(panel.brightness_label(), "50%");
/// ```
pub struct PanelViewModel {
    config: PanelConfig,
    api: DeviceApi,
    spawner: Rc<dyn LocalSpawn>,
    state: PanelState,
    brightness: Rc<BrightnessSync>,
    effects: EffectsAndPower,
    tracker: GestureTracker,
}

impl PanelViewModel {
    /// Build a panel talking to the device through `transport`.
    ///
    /// Writes run on `spawner`; global pointer events arrive through `hub`.
    /// Until [`start`](Self::start) or [`load`](Self::load) completes the
    /// panel shows the configured default brightness.
    pub fn new(
        transport: Rc<dyn Transport>,
        spawner: Rc<dyn LocalSpawn>,
        hub: PointerHub,
        config: PanelConfig,
    ) -> Rc<Self> {
        let api = DeviceApi::new(transport, &config);
        let state = PanelState::new(f64::from(config.default_brightness));

        let brightness = Rc::new(BrightnessSync::new(
            api.clone(),
            Rc::clone(&spawner),
            state.last_error.clone(),
            config.default_brightness,
        ));
        let effects = EffectsAndPower::new(
            api.clone(),
            Rc::clone(&spawner),
            state.effects.clone(),
            state.current_effect.clone(),
            state.power.clone(),
            state.last_error.clone(),
        );

        let sync = Rc::clone(&brightness);
        let tracker = GestureTracker::new(state.brightness.clone(), hub, move |value| {
            sync.on_value_change(value)
        });

        Rc::new(Self {
            config,
            api,
            spawner,
            state,
            brightness,
            effects,
            tracker,
        })
    }

    /// Observable state cells.
    pub fn state(&self) -> &PanelState {
        &self.state
    }

    /// Configuration in use.
    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------------------------

    /// Spawn the initial reconciliation.
    ///
    /// If the panel is dropped before the device answers, the answer is
    /// discarded.
    pub fn start(self: &Rc<Self>) {
        let api = self.api.clone();
        let panel: Weak<Self> = Rc::downgrade(self);
        let task = async move {
            let (status, effects) = fetch_initial(&api).await;
            match panel.upgrade() {
                Some(panel) => panel.reconcile(status, Some(effects)),
                None => debug!("panel gone before initial load finished"),
            }
        };
        if let Err(e) = self.spawner.spawn_local(task) {
            warn!("failed to spawn initial load: {}", e);
            self.state.loaded.set(true);
        }
    }

    /// Run the initial reconciliation in place.
    ///
    /// Status and effect list are fetched concurrently. Nothing is written
    /// back to the device.
    pub async fn load(&self) {
        let (status, effects) = fetch_initial(&self.api).await;
        self.reconcile(status, Some(effects));
    }

    /// Re-read the device status after an external change.
    ///
    /// Brightness is only adopted while no drag is active and no brightness
    /// write is in flight; effect and power only while their channels are
    /// idle.
    pub async fn refresh(&self) {
        let status = self.api.status().await;
        self.reconcile(status, None);
    }

    /// Spawn [`refresh`](Self::refresh), guarded against teardown.
    pub fn spawn_refresh(self: &Rc<Self>) {
        let api = self.api.clone();
        let panel: Weak<Self> = Rc::downgrade(self);
        let task = async move {
            let status = api.status().await;
            if let Some(panel) = panel.upgrade() {
                panel.reconcile(status, None);
            }
        };
        if let Err(e) = self.spawner.spawn_local(task) {
            warn!("failed to spawn refresh: {}", e);
        }
    }

    fn reconcile(
        &self,
        status: Result<DeviceStatus, DeviceError>,
        effects: Option<Result<EffectList, DeviceError>>,
    ) {
        let initial = effects.is_some();
        let mut listed_effect = None;

        if let Some(effects) = effects {
            match effects {
                Ok(list) => {
                    debug!("catalog: {:?}", list.effects);
                    if list.is_truncated() {
                        warn!(
                            "device reports {:?} effects but listed {}",
                            list.total,
                            list.effects.len()
                        );
                    }
                    listed_effect = list.current();
                    self.effects.seed_catalog(list.effects);
                }
                Err(e) => {
                    warn!("failed to fetch effects: {}", e);
                    self.effects.seed_catalog(Vec::new());
                    self.state.last_error.set(Some(e));
                }
            }
        }

        let status = match status {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("failed to fetch status: {}", e);
                self.state.last_error.set(Some(e));
                None
            }
        };

        // A reported 0 is kept; only a missing or unparseable value falls
        // back to the default.
        let reported = status.as_ref().and_then(DeviceStatus::brightness_percent);
        let target = match (reported, initial) {
            (Some(value), _) => Some(value),
            (None, true) => Some(f64::from(self.config.default_brightness)),
            (None, false) => None,
        };
        if let Some(value) = target {
            self.seed_brightness(value);
        }

        let catalog = self.effects.catalog();
        let effect = status
            .as_ref()
            .and_then(|status| status.effect_in(&catalog))
            .or(listed_effect);
        if effect.is_some() && !self.effects.effect_busy() {
            self.effects.seed_effect(effect);
        }

        if let Some(status) = &status {
            if let Some(total) = status.total_effects {
                if usize::try_from(total).ok() != Some(catalog.len()) && !catalog.is_empty() {
                    warn!(
                        "device has {} effects, catalog has {}; reload to refresh it",
                        total,
                        catalog.len()
                    );
                }
            }
            if let Some(on) = status.is_running {
                if !self.effects.power_busy() {
                    self.effects.seed_power(on);
                }
            }
        }

        if initial {
            info!(
                "panel loaded: brightness={}, effect={:?}, power={}",
                self.brightness.confirmed(),
                self.state.current_effect.get(),
                self.state.power.get()
            );
            self.state.loaded.set(true);
        }
    }

    fn seed_brightness(&self, value: f64) {
        if self.tracker.is_dragging() || self.brightness.is_locked() {
            debug!("user is adjusting brightness, not seeding {}", value);
            return;
        }
        if self.brightness.seed(value) {
            self.tracker.seed(value);
        }
    }

    // -------------------------------------------------------------------------
    // Slider
    // -------------------------------------------------------------------------

    /// Report the slider surface geometry after layout.
    pub fn set_slider_geometry(&self, geometry: Option<SliderGeometry>) {
        self.tracker.set_geometry(geometry);
    }

    /// Pointer pressed on the slider surface.
    pub fn pointer_down(&self, input: &PointerInput) {
        self.tracker.start_drag(input);
    }

    /// The gesture tracker (for hosts delivering move/end directly).
    pub fn tracker(&self) -> &GestureTracker {
        &self.tracker
    }

    /// Nudge brightness by `delta` percent (e.g. from +/- buttons).
    ///
    /// Goes through the same lock and coalescing as a drag.
    pub fn step_brightness(&self, delta: i32) {
        let current = to_percent(self.state.brightness.get()).unwrap_or(0);
        let next = (i32::from(current) + delta).clamp(0, 100);
        let value = f64::from(next);
        self.state.brightness.set(value);
        self.brightness.on_value_change(value);
    }

    /// Rounded brightness for display, e.g. `"42%"`.
    pub fn brightness_label(&self) -> String {
        format!("{}%", to_percent(self.state.brightness.get()).unwrap_or(0))
    }

    /// Last brightness the device acknowledged.
    pub fn confirmed_brightness(&self) -> u8 {
        self.brightness.confirmed()
    }

    /// Whether a brightness write is in flight.
    pub fn is_write_locked(&self) -> bool {
        self.brightness.is_locked()
    }

    // -------------------------------------------------------------------------
    // Effects and power
    // -------------------------------------------------------------------------

    /// Select an effect by name.
    pub fn select_effect(&self, name: &str) -> Result<(), PanelError> {
        self.effects.select_effect(name)
    }

    /// Advance to the next effect.
    pub fn next_effect(&self) -> Option<String> {
        self.effects.next_effect()
    }

    /// Flip the power switch.
    pub fn toggle_power(&self) -> bool {
        self.effects.toggle_power()
    }
}

async fn fetch_initial(
    api: &DeviceApi,
) -> (
    Result<DeviceStatus, DeviceError>,
    Result<EffectList, DeviceError>,
) {
    futures::join!(api.status(), api.effects())
}
