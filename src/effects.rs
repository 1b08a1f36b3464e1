//! Effect selection and power switching.
//!
//! Both are optimistic: the local state changes immediately and a single
//! write is sent per user action. The two channels are independent of each
//! other and of the brightness lock. A failed write is reported on the error
//! channel and leaves the optimistic state alone, so what is shown is always
//! the target of the latest action. An acknowledgement is only adopted if
//! nothing newer happened on its channel.

use std::cell::Cell;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::task::{LocalSpawn, LocalSpawnExt};
use log::{debug, info, warn};

use crate::api::DeviceApi;
use crate::error::{DeviceError, PanelError};
use crate::observe::Observable;

/// Bookkeeping for one independent write channel.
#[derive(Default)]
struct Channel {
    generation: Cell<u64>,
    in_flight: Cell<usize>,
}

impl Channel {
    fn begin(&self) -> u64 {
        self.in_flight.set(self.in_flight.get() + 1);
        self.supersede()
    }

    fn finish(&self) {
        self.in_flight.set(self.in_flight.get().saturating_sub(1));
    }

    /// Invalidate every earlier operation on this channel.
    fn supersede(&self) -> u64 {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        generation
    }

    fn is_latest(&self, generation: u64) -> bool {
        self.generation.get() == generation
    }

    fn is_busy(&self) -> bool {
        self.in_flight.get() > 0
    }
}

/// Manages the effect catalog, the current effect and power state.
pub struct EffectsAndPower {
    catalog: Observable<Vec<String>>,
    current: Observable<Option<String>>,
    power: Observable<bool>,
    effect_channel: Rc<Channel>,
    power_channel: Rc<Channel>,
    api: DeviceApi,
    spawner: Rc<dyn LocalSpawn>,
    errors: Observable<Option<DeviceError>>,
    alive: Rc<()>,
}

impl EffectsAndPower {
    /// Create a controller over the given state cells.
    pub fn new(
        api: DeviceApi,
        spawner: Rc<dyn LocalSpawn>,
        catalog: Observable<Vec<String>>,
        current: Observable<Option<String>>,
        power: Observable<bool>,
        errors: Observable<Option<DeviceError>>,
    ) -> Self {
        Self {
            catalog,
            current,
            power,
            effect_channel: Rc::default(),
            power_channel: Rc::default(),
            api,
            spawner,
            errors,
            alive: Rc::new(()),
        }
    }

    /// Effect names in device order.
    pub fn catalog(&self) -> Vec<String> {
        self.catalog.get()
    }

    /// The selected effect.
    pub fn current_effect(&self) -> Option<String> {
        self.current.get()
    }

    /// Whether the strip is (optimistically) on.
    pub fn is_on(&self) -> bool {
        self.power.get()
    }

    /// Whether an effect write is outstanding.
    pub fn effect_busy(&self) -> bool {
        self.effect_channel.is_busy()
    }

    /// Whether a power write is outstanding.
    pub fn power_busy(&self) -> bool {
        self.power_channel.is_busy()
    }

    // -------------------------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------------------------

    /// Replace the catalog with the device's list.
    pub fn seed_catalog(&self, effects: Vec<String>) {
        self.catalog.set(effects);
    }

    /// Adopt the device-reported effect without writing.
    pub fn seed_effect(&self, name: Option<String>) {
        self.effect_channel.supersede();
        self.current.set(name);
    }

    /// Adopt the device-reported power state without writing.
    pub fn seed_power(&self, on: bool) {
        self.power_channel.supersede();
        self.power.set(on);
    }

    // -------------------------------------------------------------------------
    // User actions
    // -------------------------------------------------------------------------

    /// Select an effect from the catalog.
    ///
    /// # Errors
    ///
    /// [`PanelError::UnknownEffect`] if `name` is not in the catalog; nothing
    /// is sent and the current effect is unchanged.
    pub fn select_effect(&self, name: &str) -> Result<(), PanelError> {
        if !self.catalog.get().iter().any(|e| e == name) {
            debug!("rejecting unknown effect '{}'", name);
            return Err(PanelError::UnknownEffect(name.to_string()));
        }

        self.current.set(Some(name.to_string()));

        let api = self.api.clone();
        let name = name.to_string();
        self.spawn_write(
            &self.effect_channel,
            async move { api.set_effect(&name).await },
            |()| {},
        );
        Ok(())
    }

    /// Advance to the next effect in catalog order, wrapping at the end.
    ///
    /// With an empty catalog the request is still sent, but there is no
    /// local guess to show. Returns the optimistically selected effect; the
    /// effect the device acknowledges replaces it once the write completes.
    pub fn next_effect(&self) -> Option<String> {
        let catalog = self.catalog.get();
        let next = if catalog.is_empty() {
            None
        } else {
            let index = self
                .current
                .get()
                .as_ref()
                .and_then(|cur| catalog.iter().position(|e| e == cur))
                .map(|i| (i + 1) % catalog.len())
                .unwrap_or(0);
            Some(catalog[index].clone())
        };
        if next.is_some() {
            self.current.set(next.clone());
        }

        let api = self.api.clone();
        let current = self.current.clone();
        self.spawn_write(
            &self.effect_channel,
            async move { api.next_effect().await },
            move |acked: Option<String>| {
                if let Some(name) = acked {
                    debug!("device advanced to '{}'", name);
                    current.set(Some(name));
                }
            },
        );
        next
    }

    /// Flip power. Every call sends its own write. Returns the new state.
    pub fn toggle_power(&self) -> bool {
        let target = !self.power.get();
        self.power.set(target);
        info!("power -> {}", if target { "on" } else { "off" });

        let api = self.api.clone();
        self.spawn_write(
            &self.power_channel,
            async move { api.set_power(target).await },
            |()| {},
        );
        target
    }

    /// Run `write` on the spawner; `adopt` sees its result only while no
    /// newer operation on `channel` exists.
    fn spawn_write<T, F>(&self, channel: &Rc<Channel>, write: F, adopt: impl FnOnce(T) + 'static)
    where
        T: 'static,
        F: Future<Output = Result<T, DeviceError>> + 'static,
    {
        let generation = channel.begin();
        let channel_ref = Rc::clone(channel);
        let alive: Weak<()> = Rc::downgrade(&self.alive);
        let errors = self.errors.clone();

        let task = async move {
            let result = write.await;
            channel_ref.finish();
            if alive.upgrade().is_none() {
                debug!("controller gone, dropping write result");
                return;
            }
            match result {
                Ok(value) if channel_ref.is_latest(generation) => adopt(value),
                Ok(_) => debug!("superseded write completed"),
                Err(e) => {
                    warn!("write failed: {}", e);
                    errors.set(Some(e));
                }
            }
        };

        if let Err(e) = self.spawner.spawn_local(task) {
            warn!("failed to spawn write: {}", e);
            channel.finish();
            self.errors
                .set(Some(DeviceError::Transport(format!("spawn failed: {e}"))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelConfig;
    use crate::mock::MockDevice;
    use futures::executor::LocalPool;
    use serde_json::json;

    struct Harness {
        pool: LocalPool,
        device: Rc<MockDevice>,
        ctl: EffectsAndPower,
        errors: Observable<Option<DeviceError>>,
    }

    fn harness() -> Harness {
        let pool = LocalPool::new();
        let device = Rc::new(MockDevice::new());
        let api = DeviceApi::new(device.clone(), &PanelConfig::default());
        let errors = Observable::new(None);
        let ctl = EffectsAndPower::new(
            api,
            Rc::new(pool.spawner()),
            Observable::new(Vec::new()),
            Observable::new(None),
            Observable::new(false),
            errors.clone(),
        );
        ctl.seed_catalog(vec!["rainbow".into(), "fire".into(), "static".into()]);
        ctl.seed_effect(Some("rainbow".into()));
        ctl.seed_power(true);
        Harness {
            pool,
            device,
            ctl,
            errors,
        }
    }

    #[test]
    fn test_select_known_effect() {
        let mut h = harness();
        h.ctl.select_effect("fire").unwrap();
        assert_eq!(h.ctl.current_effect().as_deref(), Some("fire"));
        h.pool.run_until_stalled();
        assert_eq!(h.device.writes_to("effect"), vec![json!({"effect": "fire"})]);
        assert_eq!(h.device.current_effect().as_deref(), Some("fire"));
    }

    #[test]
    fn test_select_unknown_effect_is_rejected() {
        let mut h = harness();
        let err = h.ctl.select_effect("strobe").unwrap_err();
        assert_eq!(err, PanelError::UnknownEffect("strobe".into()));
        h.pool.run_until_stalled();
        assert!(h.device.calls().is_empty());
        assert_eq!(h.ctl.current_effect().as_deref(), Some("rainbow"));
    }

    #[test]
    fn test_effect_writes_are_not_coalesced() {
        let mut h = harness();
        h.device.hold_writes(true);
        h.ctl.select_effect("fire").unwrap();
        h.ctl.select_effect("static").unwrap();
        h.pool.run_until_stalled();
        assert_eq!(h.device.held_writes(), 2);
        assert!(h.ctl.effect_busy());
        h.device.release_all();
        h.pool.run_until_stalled();
        assert!(!h.ctl.effect_busy());
        assert_eq!(h.ctl.current_effect().as_deref(), Some("static"));
    }

    #[test]
    fn test_next_effect_wraps() {
        let mut h = harness();
        assert_eq!(h.ctl.next_effect().as_deref(), Some("fire"));
        assert_eq!(h.ctl.next_effect().as_deref(), Some("static"));
        assert_eq!(h.ctl.next_effect().as_deref(), Some("rainbow"));
        h.pool.run_until_stalled();
        assert_eq!(h.device.writes_to("effect/next").len(), 3);
    }

    #[test]
    fn test_next_effect_from_unknown_current() {
        let h = harness();
        h.ctl.seed_effect(Some("not-listed".into()));
        assert_eq!(h.ctl.next_effect().as_deref(), Some("rainbow"));
    }

    #[test]
    fn test_power_toggles_last_write_wins() {
        let mut h = harness();
        h.device.hold_writes(true);

        assert!(!h.ctl.toggle_power());
        assert!(h.ctl.toggle_power());
        h.pool.run_until_stalled();
        assert_eq!(h.device.held_writes(), 2);

        // Newest completes first, then the stale OFF.
        h.device.release_last();
        h.pool.run_until_stalled();
        h.device.release_last();
        h.pool.run_until_stalled();

        assert!(h.ctl.is_on());
        assert_eq!(
            h.device.writes_to("power"),
            vec![json!({"power": false}), json!({"power": true})]
        );
    }

    #[test]
    fn test_failed_power_keeps_latest_target() {
        let mut h = harness();
        h.device.reject_next("power", "relay stuck");
        assert!(!h.ctl.toggle_power());
        h.pool.run_until_stalled();
        assert!(!h.ctl.is_on());
        assert_eq!(
            h.errors.get(),
            Some(DeviceError::Rejected("relay stuck".into()))
        );

        // ON fails, OFF and ON succeed: the shown state is the last toggle.
        h.device.hold_writes(true);
        h.device.reject_next("power", "relay stuck");
        assert!(h.ctl.toggle_power());
        assert!(!h.ctl.toggle_power());
        assert!(h.ctl.toggle_power());
        h.pool.run_until_stalled();
        h.device.release_all();
        h.pool.run_until_stalled();
        assert!(h.ctl.is_on());
        assert!(!h.ctl.power_busy());
    }

    #[test]
    fn test_failed_effect_keeps_selection() {
        let mut h = harness();
        h.device.fail_next("effect", "timeout");
        h.ctl.select_effect("fire").unwrap();
        h.pool.run_until_stalled();
        assert_eq!(h.ctl.current_effect().as_deref(), Some("fire"));
        assert!(matches!(h.errors.get(), Some(DeviceError::Transport(_))));
    }

    #[test]
    fn test_next_effect_adopts_device_answer() {
        let mut h = harness();
        h.ctl.select_effect("fire").unwrap();
        h.pool.run_until_stalled();

        // The local catalog lacks "breathing", which follows "fire" on the device.
        assert_eq!(h.ctl.next_effect().as_deref(), Some("static"));
        h.pool.run_until_stalled();
        assert_eq!(h.ctl.current_effect().as_deref(), Some("breathing"));
        assert_eq!(h.device.current_effect().as_deref(), Some("breathing"));
    }

    #[test]
    fn test_next_effect_answer_ignored_after_newer_selection() {
        let mut h = harness();
        h.device.hold_writes(true);
        h.ctl.next_effect();
        h.ctl.select_effect("static").unwrap();
        h.pool.run_until_stalled();
        assert_eq!(h.device.held_writes(), 2);

        h.device.release_next();
        h.pool.run_until_stalled();
        assert_eq!(h.ctl.current_effect().as_deref(), Some("static"));
        h.device.release_next();
        h.pool.run_until_stalled();
        assert_eq!(h.ctl.current_effect().as_deref(), Some("static"));
        assert_eq!(h.device.current_effect().as_deref(), Some("static"));
    }

    #[test]
    fn test_completion_after_drop_is_ignored() {
        let mut h = harness();
        h.device.hold_writes(true);
        h.device.reject_next("power", "late");
        h.ctl.toggle_power();
        h.pool.run_until_stalled();

        let Harness {
            mut pool,
            device,
            ctl,
            errors,
        } = h;
        drop(ctl);
        device.release_all();
        pool.run_until_stalled();
        assert_eq!(errors.get(), None);
    }
}
