// ABOUTME: Device registration against the realtime-channel infrastructure
// ABOUTME: Ensures exactly one registration exists for this client and yields its websocket endpoint

use anyhow::Result;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::api::TeamsApi;
use crate::error::BridgeError;

/// Device registration collection endpoint.
pub const DEVICES_URL: &str = "https://wdm-a.wbx2.com/wdm/api/v1/devices";

/// Registration payload sent when creating a device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub device_name: String,
    pub device_type: String,
    pub localized_model: String,
    pub model: String,
    pub name: String,
    pub system_name: String,
    pub system_version: String,
}

/// A device registration row as the platform returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceRecord {
    pub name: String,
    pub url: Option<String>,
    pub web_socket_url: Option<String>,
}

/// Ensures a single realtime-channel registration exists for this client.
///
/// The registered `name` carries a random suffix generated once per
/// registrar, so separate bridge instances never collide on the same row.
#[derive(Debug, Clone)]
pub struct DeviceRegistrar {
    descriptor: DeviceDescriptor,
}

impl DeviceRegistrar {
    pub fn new(device_name: &str) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(5)
            .map(char::from)
            .collect::<String>()
            .to_ascii_uppercase();
        Self {
            descriptor: DeviceDescriptor {
                device_name: device_name.to_string(),
                device_type: "DESKTOP".to_string(),
                localized_model: "rust".to_string(),
                model: "rust".to_string(),
                name: format!("{device_name}-{suffix}"),
                system_name: device_name.to_string(),
                system_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// The full registered name, including the per-process suffix.
    pub fn device_name(&self) -> &str {
        &self.descriptor.name
    }

    /// Ensure our registration exists and return its websocket endpoint.
    ///
    /// Reuses an existing registration under our name when present. Any
    /// *other* registration under this credential is deleted - only one
    /// logical device per client is retained. Deletions are idempotent;
    /// a row that is already gone is not an error.
    pub async fn ensure_device(&self, api: &dyn TeamsApi) -> Result<String> {
        tracing::debug!("Listing existing device registrations");
        let devices = match api.get_json(DEVICES_URL).await {
            Ok(listing) => listing
                .get("devices")
                .and_then(|d| d.as_array())
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| serde_json::from_value::<DeviceRecord>(row.clone()).ok())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Device listing failed, will register fresh");
                Vec::new()
            }
        };

        for device in &devices {
            if device.name == self.descriptor.name {
                tracing::info!(name = %device.name, "Reusing existing device registration");
                return device.web_socket_url.clone().ok_or_else(|| {
                    BridgeError::DeviceRegistration(format!(
                        "registration {} has no websocket endpoint",
                        device.name
                    ))
                    .into()
                });
            }
        }

        // Single-device policy: clear out registrations left behind by
        // previous runs before creating ours.
        for device in &devices {
            let Some(url) = device.url.as_deref() else {
                tracing::debug!(name = %device.name, "Stale registration has no url, skipping");
                continue;
            };
            if let Err(e) = api.delete_url(url).await {
                tracing::warn!(name = %device.name, error = %e, "Failed to delete stale device registration");
            } else {
                tracing::info!(name = %device.name, "Deleted stale device registration");
            }
        }

        tracing::info!(name = %self.descriptor.name, "Creating device registration");
        let body = serde_json::to_value(&self.descriptor)?;
        let created = api
            .post_json(DEVICES_URL, body)
            .await
            .map_err(|e| BridgeError::DeviceRegistration(format!("{e:#}")))?;
        let record: DeviceRecord = serde_json::from_value(created)
            .map_err(|e| BridgeError::DeviceRegistration(format!("unparseable response: {e}")))?;
        record.web_socket_url.ok_or_else(|| {
            BridgeError::DeviceRegistration("registration response has no websocket endpoint".into())
                .into()
        })
    }
}
