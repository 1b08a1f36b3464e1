//! Brightness write serialization.
//!
//! At most one `set_brightness` call is outstanding at a time. Values that
//! arrive while a write is in flight overwrite the pending value; when the
//! write completes, the newest pending value (if it differs from what the
//! device now has) is sent next. Intermediate values are coalesced, never
//! queued.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures::task::{LocalSpawn, LocalSpawnExt};
use log::{debug, info, warn};

use crate::api::DeviceApi;
use crate::error::DeviceError;
use crate::observe::Observable;

struct SyncState {
    /// Last value known to be on the device.
    confirmed: u8,
    /// Latest requested value.
    pending: u8,
    /// Held while a write is in flight.
    locked: bool,
}

/// Serializes brightness writes to the device.
pub struct BrightnessSync {
    state: Rc<RefCell<SyncState>>,
    api: DeviceApi,
    spawner: Rc<dyn LocalSpawn>,
    errors: Observable<Option<DeviceError>>,
}

/// Round a slider value to the percent sent over the wire.
pub fn to_percent(raw: f64) -> Option<u8> {
    raw.is_finite().then(|| raw.round().clamp(0.0, 100.0) as u8)
}

impl BrightnessSync {
    /// Create a controller that believes the device is at `confirmed`.
    ///
    /// Write failures are published to `errors`.
    pub fn new(
        api: DeviceApi,
        spawner: Rc<dyn LocalSpawn>,
        errors: Observable<Option<DeviceError>>,
        confirmed: u8,
    ) -> Self {
        let confirmed = confirmed.min(100);
        Self {
            state: Rc::new(RefCell::new(SyncState {
                confirmed,
                pending: confirmed,
                locked: false,
            })),
            api,
            spawner,
            errors,
        }
    }

    /// Last value the device acknowledged (or was seeded with).
    pub fn confirmed(&self) -> u8 {
        self.state.borrow().confirmed
    }

    /// Latest requested value.
    pub fn pending(&self) -> u8 {
        self.state.borrow().pending
    }

    /// Whether a write is in flight.
    pub fn is_locked(&self) -> bool {
        self.state.borrow().locked
    }

    /// No write in flight and nothing left to send.
    pub fn is_idle(&self) -> bool {
        let state = self.state.borrow();
        !state.locked && state.pending == state.confirmed
    }

    /// Adopt a device-reported value without writing it back.
    ///
    /// Refused (returns false) while a write is in flight, since the
    /// completion would otherwise race the seeded value.
    pub fn seed(&self, raw: f64) -> bool {
        let Some(percent) = to_percent(raw) else {
            return false;
        };
        let mut state = self.state.borrow_mut();
        if state.locked {
            debug!("not seeding brightness {} during a write", percent);
            return false;
        }
        state.confirmed = percent;
        state.pending = percent;
        true
    }

    /// Handle a user-driven slider value.
    ///
    /// Rounds to the nearest integer. Starts a write cycle unless one is
    /// already running (the value then waits as the pending value) or the
    /// device already has it.
    pub fn on_value_change(&self, raw: f64) {
        let Some(percent) = to_percent(raw) else {
            return;
        };
        {
            let mut state = self.state.borrow_mut();
            state.pending = percent;
            if state.locked || state.pending == state.confirmed {
                return;
            }
            state.locked = true;
        }
        self.spawn_cycle(percent);
    }

    fn spawn_cycle(&self, first: u8) {
        let state = Rc::downgrade(&self.state);
        let api = self.api.clone();
        let errors = self.errors.clone();

        let cycle = write_cycle(state, api, errors, first);
        if let Err(e) = self.spawner.spawn_local(cycle) {
            warn!("failed to spawn brightness write: {}", e);
            self.state.borrow_mut().locked = false;
            self.errors
                .set(Some(DeviceError::Transport(format!("spawn failed: {e}"))));
        }
    }
}

/// Send `value`, then keep sending the newest pending value until the
/// device matches it or a write fails.
async fn write_cycle(
    state: Weak<RefCell<SyncState>>,
    api: DeviceApi,
    errors: Observable<Option<DeviceError>>,
    mut value: u8,
) {
    loop {
        debug!("writing brightness {}", value);
        let result = api.set_brightness(value).await;

        let Some(state) = state.upgrade() else {
            debug!("brightness sync gone, dropping result for {}", value);
            return;
        };
        let next = {
            let mut state = state.borrow_mut();
            state.locked = false;
            let next = match result {
                Ok(()) => {
                    state.confirmed = value;
                    state.pending
                }
                // A value that arrived during the failed call is a new
                // request and is still sent; the failed value is not retried.
                Err(_) if state.pending == value => state.confirmed,
                Err(_) => state.pending,
            };
            let next = (next != state.confirmed).then_some(next);
            state.locked = next.is_some();
            next
        };

        match &result {
            Ok(()) => info!("brightness confirmed at {}", value),
            Err(e) => {
                warn!("brightness write {} failed: {}", value, e);
                errors.set(Some(e.clone()));
            }
        }

        match next {
            Some(newer) => value = newer,
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelConfig;
    use crate::mock::MockDevice;
    use futures::executor::LocalPool;

    struct Harness {
        pool: LocalPool,
        device: Rc<MockDevice>,
        sync: BrightnessSync,
        errors: Observable<Option<DeviceError>>,
    }

    fn harness(confirmed: u8) -> Harness {
        let pool = LocalPool::new();
        let device = Rc::new(MockDevice::new());
        let api = DeviceApi::new(device.clone(), &PanelConfig::default());
        let errors = Observable::new(None);
        let sync = BrightnessSync::new(
            api,
            Rc::new(pool.spawner()),
            errors.clone(),
            confirmed,
        );
        Harness {
            pool,
            device,
            sync,
            errors,
        }
    }

    #[test]
    fn test_rounding() {
        assert_eq!(to_percent(41.5), Some(42));
        assert_eq!(to_percent(41.49), Some(41));
        assert_eq!(to_percent(-3.0), Some(0));
        assert_eq!(to_percent(140.0), Some(100));
        assert_eq!(to_percent(f64::NAN), None);
    }

    #[test]
    fn test_equal_to_confirmed_is_noop() {
        let mut h = harness(40);
        h.sync.on_value_change(40.3);
        h.pool.run_until_stalled();
        assert!(h.device.brightness_writes().is_empty());
        assert!(!h.sync.is_locked());
    }

    #[test]
    fn test_single_write_confirms() {
        let mut h = harness(40);
        h.sync.on_value_change(62.0);
        assert!(h.sync.is_locked());
        h.pool.run_until_stalled();
        assert_eq!(h.device.brightness_writes(), vec![62]);
        assert_eq!(h.sync.confirmed(), 62);
        assert!(h.sync.is_idle());
    }

    #[test]
    fn test_values_during_flight_are_coalesced() {
        let mut h = harness(10);
        h.device.hold_writes(true);

        h.sync.on_value_change(40.0);
        h.pool.run_until_stalled();
        for v in [45.0, 50.0, 52.0, 55.0] {
            h.sync.on_value_change(v);
        }
        h.pool.run_until_stalled();
        assert_eq!(h.device.held_writes(), 1);

        h.device.release_next();
        h.pool.run_until_stalled();
        assert_eq!(h.device.held_writes(), 1);
        h.device.release_next();
        h.pool.run_until_stalled();

        assert_eq!(h.device.brightness_writes(), vec![40, 55]);
        assert_eq!(h.sync.confirmed(), 55);
        assert!(h.sync.is_idle());
    }

    #[test]
    fn test_return_to_confirmed_value_during_flight() {
        let mut h = harness(40);
        h.device.hold_writes(true);

        h.sync.on_value_change(55.0);
        h.pool.run_until_stalled();
        h.sync.on_value_change(40.0);
        h.device.release_all();
        h.pool.run_until_stalled();
        h.device.release_all();
        h.pool.run_until_stalled();

        assert_eq!(h.device.brightness_writes(), vec![55, 40]);
        assert_eq!(h.sync.confirmed(), 40);
    }

    #[test]
    fn test_failure_releases_lock_without_retry() {
        let mut h = harness(40);
        h.device.reject_next("brightness", "overheated");

        h.sync.on_value_change(70.0);
        h.pool.run_until_stalled();

        assert!(!h.sync.is_locked());
        assert_eq!(h.sync.confirmed(), 40);
        assert_eq!(h.sync.pending(), 70);
        assert_eq!(h.device.brightness_writes(), vec![70]);
        assert_eq!(
            h.errors.get(),
            Some(DeviceError::Rejected("overheated".into()))
        );

        h.sync.on_value_change(70.0);
        h.pool.run_until_stalled();
        assert_eq!(h.device.brightness_writes(), vec![70, 70]);
        assert_eq!(h.sync.confirmed(), 70);
    }

    #[test]
    fn test_newer_value_survives_failed_write() {
        let mut h = harness(20);
        h.device.hold_writes(true);
        h.device.fail_next("brightness", "timeout");

        h.sync.on_value_change(30.0);
        h.pool.run_until_stalled();
        h.sync.on_value_change(35.0);
        h.device.release_next();
        h.pool.run_until_stalled();
        h.device.release_next();
        h.pool.run_until_stalled();

        assert_eq!(h.device.brightness_writes(), vec![30, 35]);
        assert_eq!(h.sync.confirmed(), 35);
    }

    #[test]
    fn test_completion_after_drop_is_ignored() {
        let mut h = harness(0);
        h.device.hold_writes(true);
        h.sync.on_value_change(80.0);
        h.pool.run_until_stalled();

        let Harness {
            mut pool,
            device,
            sync,
            errors,
        } = h;
        drop(sync);
        device.release_all();
        pool.run_until_stalled();

        assert_eq!(device.brightness(), 80);
        assert_eq!(errors.get(), None);
    }

    #[test]
    fn test_seed_refused_while_locked() {
        let mut h = harness(10);
        h.device.hold_writes(true);
        h.sync.on_value_change(90.0);
        h.pool.run_until_stalled();
        assert!(!h.sync.seed(30.0));

        h.device.release_all();
        h.pool.run_until_stalled();
        assert!(h.sync.seed(30.0));
        assert_eq!(h.sync.confirmed(), 30);
        assert_eq!(h.device.brightness_writes(), vec![90]);
    }
}
