//! Simulated device for testing.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use futures::channel::oneshot;
use log::debug;
use serde_json::{Value, json};

use crate::api::{Method, Transport};
use crate::config::DEFAULT_API_PREFIX;
use crate::error::DeviceError;

/// A request observed by [`MockDevice`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Request method.
    pub method: Method,
    /// Full request path including the API prefix.
    pub path: String,
    /// JSON body, if one was sent.
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
enum Fault {
    Transport(String),
    Reject(String),
    Garble,
}

struct DeviceState {
    brightness: u8,
    effects: Vec<String>,
    current: usize,
    running: bool,
    raw_status: Option<Value>,
    offline: bool,
    calls: Vec<RecordedCall>,
    faults: HashMap<String, VecDeque<Fault>>,
    hold_writes: bool,
    held: VecDeque<oneshot::Sender<()>>,
}

/// An in-memory LED device speaking the panel's JSON API.
///
/// This allows testing code that depends on [`Transport`] without a real
/// device. Besides answering requests it records every call, can inject
/// transport failures, device rejections and garbled bodies, and can park
/// write requests until the test releases them in any order.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use futures::executor::block_on;
/// use ledpanel_core::{DeviceApi, MockDevice, PanelConfig};
///
/// let device = Rc::new(MockDevice::new());
/// let api = DeviceApi::new(device.clone(), &PanelConfig::default());
/// block_on(api.set_brightness(42)).unwrap();
/// assert_eq!(device.brightness(), 42);
/// ```
pub struct MockDevice {
    prefix: String,
    state: RefCell<DeviceState>,
}

impl MockDevice {
    /// Create a device at 50% brightness, powered on, with four effects.
    pub fn new() -> Self {
        Self::with_effects(&["rainbow", "fire", "breathing", "static"])
    }

    /// Create a device with a custom effect catalog.
    pub fn with_effects(effects: &[&str]) -> Self {
        Self {
            prefix: DEFAULT_API_PREFIX.into(),
            state: RefCell::new(DeviceState {
                brightness: 50,
                effects: effects.iter().map(|e| e.to_string()).collect(),
                current: 0,
                running: true,
                raw_status: None,
                offline: false,
                calls: Vec::new(),
                faults: HashMap::new(),
                hold_writes: false,
                held: VecDeque::new(),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Device state
    // -------------------------------------------------------------------------

    /// Current brightness percent.
    pub fn brightness(&self) -> u8 {
        self.state.borrow().brightness
    }

    /// Set brightness as if changed on the device itself.
    pub fn set_brightness(&self, percent: u8) {
        self.state.borrow_mut().brightness = percent.min(100);
    }

    /// Whether the strip is powered.
    pub fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    /// Set power as if changed on the device itself.
    pub fn set_running(&self, on: bool) {
        self.state.borrow_mut().running = on;
    }

    /// Name of the running effect.
    pub fn current_effect(&self) -> Option<String> {
        let state = self.state.borrow();
        state.effects.get(state.current).cloned()
    }

    /// Answer `GET status` with exactly this body.
    pub fn set_raw_status(&self, body: Value) {
        self.state.borrow_mut().raw_status = Some(body);
    }

    /// Fail every request with a transport error while `offline` is set.
    pub fn set_offline(&self, offline: bool) {
        self.state.borrow_mut().offline = offline;
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    fn push_fault(&self, endpoint: &str, fault: Fault) {
        self.state
            .borrow_mut()
            .faults
            .entry(endpoint.to_string())
            .or_default()
            .push_back(fault);
    }

    /// Make the next request to `endpoint` fail in transport.
    pub fn fail_next(&self, endpoint: &str, message: &str) {
        self.push_fault(endpoint, Fault::Transport(message.into()));
    }

    /// Make the device answer the next request to `endpoint` with `{error}`.
    pub fn reject_next(&self, endpoint: &str, message: &str) {
        self.push_fault(endpoint, Fault::Reject(message.into()));
    }

    /// Make the next response from `endpoint` a non-JSON body.
    pub fn garble_next(&self, endpoint: &str) {
        self.push_fault(endpoint, Fault::Garble);
    }

    // -------------------------------------------------------------------------
    // Held writes
    // -------------------------------------------------------------------------

    /// Park POST requests until released.
    pub fn hold_writes(&self, hold: bool) {
        self.state.borrow_mut().hold_writes = hold;
    }

    /// Number of parked POST requests.
    pub fn held_writes(&self) -> usize {
        self.state.borrow().held.len()
    }

    /// Complete the oldest parked request. Returns false if none was parked.
    pub fn release_next(&self) -> bool {
        let sender = self.state.borrow_mut().held.pop_front();
        sender.map(|tx| tx.send(()).is_ok()).unwrap_or(false)
    }

    /// Complete the newest parked request. Returns false if none was parked.
    pub fn release_last(&self) -> bool {
        let sender = self.state.borrow_mut().held.pop_back();
        sender.map(|tx| tx.send(()).is_ok()).unwrap_or(false)
    }

    /// Complete every parked request, oldest first.
    pub fn release_all(&self) {
        while self.release_next() {}
    }

    // -------------------------------------------------------------------------
    // Call log
    // -------------------------------------------------------------------------

    /// Every request received so far, in issue order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.borrow().calls.clone()
    }

    /// Bodies of the POST requests sent to `endpoint`, in issue order.
    pub fn writes_to(&self, endpoint: &str) -> Vec<Value> {
        let path = format!("{}{}", self.prefix, endpoint);
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.method == Method::Post && c.path == path)
            .map(|c| c.body.clone().unwrap_or(Value::Null))
            .collect()
    }

    /// Absolute brightness values written, in issue order.
    pub fn brightness_writes(&self) -> Vec<u8> {
        self.writes_to("brightness")
            .iter()
            .filter_map(|b| b.get("brightness").and_then(Value::as_u64))
            .map(|b| b as u8)
            .collect()
    }

    /// Forget all recorded calls.
    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    // -------------------------------------------------------------------------
    // Request handling
    // -------------------------------------------------------------------------

    fn respond(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Value {
        let mut state = self.state.borrow_mut();
        match (method, endpoint) {
            (Method::Get, "status") => {
                if let Some(raw) = &state.raw_status {
                    return raw.clone();
                }
                json!({
                    "current_effect": state.effects.get(state.current),
                    "current_effect_index": state.current,
                    "total_effects": state.effects.len(),
                    "brightness": state.brightness.to_string(),
                    "is_running": state.running,
                })
            }
            (Method::Get, "effects") => json!({
                "effects": state.effects,
                "total": state.effects.len(),
                "current_index": state.current,
            }),
            (Method::Post, "effect") => {
                let name = body.and_then(|b| b.get("effect")).and_then(Value::as_str);
                match name.and_then(|n| state.effects.iter().position(|e| e == n)) {
                    Some(index) => {
                        state.current = index;
                        json!({ "status": "success", "current_effect": state.effects[index] })
                    }
                    None => json!({ "error": "Effect not found" }),
                }
            }
            (Method::Post, "effect/next") => {
                if state.effects.is_empty() {
                    return json!({ "error": "No effects" });
                }
                state.current = (state.current + 1) % state.effects.len();
                json!({
                    "status": "success",
                    "current_effect": state.effects[state.current],
                    "current_index": state.current,
                })
            }
            (Method::Post, "brightness") => {
                let absolute = body.and_then(|b| b.get("brightness")).and_then(Value::as_i64);
                let delta = body.and_then(|b| b.get("delta")).and_then(Value::as_i64);
                let next = match (absolute, delta) {
                    (Some(value), _) => value,
                    (None, Some(delta)) => state.brightness as i64 + delta,
                    (None, None) => return json!({ "error": "Invalid brightness value or delta" }),
                };
                state.brightness = next.clamp(0, 100) as u8;
                json!({ "status": "success", "brightness": state.brightness })
            }
            (Method::Post, "power") => {
                match body.and_then(|b| b.get("power")).and_then(Value::as_bool) {
                    Some(on) => {
                        state.running = on;
                        json!({ "status": "success", "power": on })
                    }
                    None => json!({ "error": "Missing power parameter" }),
                }
            }
            _ => json!({ "error": "Not found" }),
        }
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Transport for MockDevice {
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<String, DeviceError> {
        let endpoint = path.strip_prefix(self.prefix.as_str()).unwrap_or(path).to_string();

        let (fault, parked) = {
            let mut state = self.state.borrow_mut();
            state.calls.push(RecordedCall {
                method,
                path: path.to_string(),
                body: body.clone(),
            });
            if state.offline {
                return Err(DeviceError::Transport("device unreachable".into()));
            }
            let fault = state
                .faults
                .get_mut(&endpoint)
                .and_then(|queue| queue.pop_front());
            let parked = if method == Method::Post && state.hold_writes {
                let (tx, rx) = oneshot::channel();
                state.held.push_back(tx);
                Some(rx)
            } else {
                None
            };
            (fault, parked)
        };

        if let Some(rx) = parked {
            debug!("mock: parking {:?} {}", method, path);
            rx.await
                .map_err(|_| DeviceError::Transport("request aborted".into()))?;
        }

        match fault {
            Some(Fault::Transport(message)) => Err(DeviceError::Transport(message)),
            Some(Fault::Reject(message)) => Ok(json!({ "error": message }).to_string()),
            Some(Fault::Garble) => Ok("<html>502 Bad Gateway</html>".into()),
            None => Ok(self.respond(method, &endpoint, body.as_ref()).to_string()),
        }
    }
}
