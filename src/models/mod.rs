use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};


/// Body of the device registration request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewDevice {
    pub name: String,
    pub location: String,
}

impl NewDevice {
    pub fn new(name: &str, location: &str) -> Self {
        return NewDevice {
            name: name.to_string(),
            location: location.to_string(),
        };
    }
}

/// Represents a device as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Identifier assigned by the backend (`_id`)
    pub id: String,
    /// Human-readable name of the device
    pub name: String,
    /// Where the device is installed
    pub location: String,
    /// Creation time as reported by the backend (`createdAt`)
    pub created_at: Option<DateTime<Utc>>,
}

impl Device {
    /// Build the device from a registration response.
    ///
    /// Only `_id` is mandatory, everything else falls back to what we asked
    /// the backend to create.
    pub fn from_response(request: &NewDevice, id: String, body: &serde_json::Value) -> Self {
        let name = body.get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(request.name.as_str())
            .to_string();
        let location = body.get("location")
            .and_then(|v| v.as_str())
            .unwrap_or(request.location.as_str())
            .to_string();
        let created_at = body.get("createdAt")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));

        return Device { id, name, location, created_at };
    }
}

/// A single power measurement tied to a registered device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub watts: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Reading {
    pub fn new(device: &Device, watts: f64) -> Self {
        return Reading {
            device_id: device.id.clone(),
            watts,
            timestamp: None,
        };
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        return self;
    }
}
