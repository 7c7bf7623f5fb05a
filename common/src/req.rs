use chrono::{DateTime, Utc};

use crate::model::{DeviceStatus, PowerState, Reading};

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub name: String,
}

// Required fields are `Option` so the handler can answer a 400 with a
// message instead of a serde rejection, and so `0`/`0.0` pass the
// explicit null-check.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct IngestRequest {
    pub device_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct IngestResponse {
    pub message: String,
    pub reading: Reading,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct NewDeviceRequest {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub location: Option<String>,
    pub lab_incharge: Option<String>,
    pub status: Option<DeviceStatus>,
    pub power_state: Option<PowerState>,
}

/// Partial update: absent fields keep their stored values.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct UpdateDeviceRequest {
    pub device_name: Option<String>,
    pub location: Option<String>,
    pub lab_incharge: Option<String>,
    pub status: Option<DeviceStatus>,
    pub power_state: Option<PowerState>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
