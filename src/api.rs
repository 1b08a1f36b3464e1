//! Device API client.

use std::rc::Rc;

use async_trait::async_trait;
use log::{debug, trace, warn};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::PanelConfig;
use crate::error::DeviceError;
use crate::state::{BrightnessRequest, DeviceStatus, EffectAck, EffectList};

// =============================================================================
// Transport Trait
// =============================================================================

/// HTTP-like request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read request.
    Get,
    /// Write request.
    Post,
}

/// The single request/response channel to the device.
///
/// Implementations deliver a JSON body (if any) to `path` and hand back the
/// raw response body. This allows for mock implementations in tests.
#[async_trait(?Send)]
pub trait Transport {
    /// Send one request and return the raw response body.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<String, DeviceError>;
}

// =============================================================================
// DeviceApi
// =============================================================================

/// Typed access to the device's status and control endpoints.
///
/// Every failure is normalized to a [`DeviceError`]: transport faults stay
/// [`DeviceError::Transport`], non-JSON bodies become
/// [`DeviceError::Parse`], and bodies carrying an `error` member become
/// [`DeviceError::Rejected`].
#[derive(Clone)]
pub struct DeviceApi {
    transport: Rc<dyn Transport>,
    prefix: String,
}

impl DeviceApi {
    /// Wrap a transport using the prefix from `config`.
    pub fn new(transport: Rc<dyn Transport>, config: &PanelConfig) -> Self {
        Self {
            transport,
            prefix: config.api_prefix.clone(),
        }
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<Value, DeviceError> {
        let path = format!("{}{}", self.prefix, endpoint);
        trace!("{:?} {} body={:?}", method, path, body);

        let raw = self.transport.call(method, &path, body).await.map_err(|e| {
            warn!("{:?} {} failed: {}", method, path, e);
            e
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            warn!("{:?} {} returned non-JSON body: {}", method, path, e);
            DeviceError::from(e)
        })?;

        if let Some(error) = value.get("error") {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            debug!("{:?} {} rejected: {}", method, path, message);
            return Err(DeviceError::Rejected(message));
        }
        Ok(value)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, DeviceError> {
        let value = self.request(Method::Get, endpoint, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn post(&self, endpoint: &str, body: Option<Value>) -> Result<(), DeviceError> {
        self.request(Method::Post, endpoint, body).await.map(|_| ())
    }

    async fn post_for<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<T, DeviceError> {
        let value = self.request(Method::Post, endpoint, body).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Read the device status.
    pub async fn status(&self) -> Result<DeviceStatus, DeviceError> {
        self.get("status").await
    }

    /// Read the effect catalog.
    pub async fn effects(&self) -> Result<EffectList, DeviceError> {
        self.get("effects").await
    }

    /// Switch to the named effect.
    pub async fn set_effect(&self, name: &str) -> Result<(), DeviceError> {
        self.post("effect", Some(json!({ "effect": name }))).await
    }

    /// Advance to the next effect in device order.
    ///
    /// Returns the effect the device reports as now running, if it says.
    pub async fn next_effect(&self) -> Result<Option<String>, DeviceError> {
        let ack: EffectAck = self.post_for("effect/next", None).await?;
        Ok(ack.current_effect)
    }

    /// Set absolute brightness (0-100).
    pub async fn set_brightness(&self, percent: u8) -> Result<(), DeviceError> {
        let body = serde_json::to_value(BrightnessRequest::Brightness(percent.min(100)))?;
        self.post("brightness", Some(body)).await
    }

    /// Adjust brightness relative to its current value.
    pub async fn adjust_brightness(&self, delta: i32) -> Result<(), DeviceError> {
        let body = serde_json::to_value(BrightnessRequest::Delta(delta))?;
        self.post("brightness", Some(body)).await
    }

    /// Power the strip on or off.
    pub async fn set_power(&self, on: bool) -> Result<(), DeviceError> {
        self.post("power", Some(json!({ "power": on }))).await
    }
}

impl std::fmt::Debug for DeviceApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceApi")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
