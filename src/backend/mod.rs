use crate::models::{Device, NewDevice, Reading};
use log::debug;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const DEVICES_PATH: &str = "api/devices";
pub const READINGS_PATH: &str = "api/readings";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("invalid endpoint {0}")]
    Endpoint(String),
    #[error("unable to reach {url}: {source}")]
    Connect { url: String, source: reqwest::Error },
    #[error("{url} replied with status {status}: {body}")]
    Status { url: String, status: StatusCode, body: String },
    #[error("malformed response from {url}: {source}")]
    Decode { url: String, source: serde_json::Error },
    #[error("response from {url} has no device identifier (_id)")]
    MissingId { url: String },
}

/// Thin client for the two endpoints the simulator talks to
#[derive(Clone, Debug)]
pub struct BackendClient {
    base: String,
    client: Client,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::Client)?;

        return Ok(BackendClient {
            base: base_url.trim_end_matches('/').to_string(),
            client,
        });
    }

    pub fn endpoint(&self, path: &str) -> Result<reqwest::Url, BackendError> {
        let url = format!("{}/{}", self.base, path.trim_start_matches('/'));
        return reqwest::Url::parse(&url).map_err(|_| BackendError::Endpoint(url));
    }

    /// Create the device on the backend and return it with its assigned id
    pub async fn register_device(&self, device: &NewDevice) -> Result<Device, BackendError> {
        let url = self.endpoint(DEVICES_PATH)?;
        let body = self.post(url.clone(), device).await?;

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|source| BackendError::Decode { url: url.to_string(), source })?;

        let id = parse_device_id(&value).ok_or(BackendError::MissingId { url: url.to_string() })?;
        return Ok(Device::from_response(device, id, &value));
    }

    /// Post a reading, the response body is not interpreted
    pub async fn submit_reading(&self, reading: &Reading) -> Result<(), BackendError> {
        let url = self.endpoint(READINGS_PATH)?;
        let _ = self.post(url, reading).await?;
        return Ok(());
    }

    async fn post<T: Serialize + ?Sized>(&self, url: reqwest::Url, payload: &T) -> Result<String, BackendError> {
        debug!("POST {url}");
        let response = self.client
            .post(url.clone())
            .json(payload)
            .send()
            .await
            .map_err(|source| BackendError::Connect { url: url.to_string(), source })?;

        let status = response.status();
        let body = response.text().await
            .map_err(|source| BackendError::Connect { url: url.to_string(), source })?;
        debug!("{url} replied {status}: {body}");

        if !status.is_success() {
            return Err(BackendError::Status { url: url.to_string(), status, body });
        }
        return Ok(body);
    }
}

/// Pull the identifier out of a registration response, mongo style `_id`
/// first and a plain `id` as fallback
pub fn parse_device_id(value: &serde_json::Value) -> Option<String> {
    for key in ["_id", "id"] {
        match value.get(key) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            _ => {}
        }
    }
    return None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client_for(server: &Server) -> BackendClient {
        BackendClient::new(&server.url(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_device_id() {
        assert_eq!(parse_device_id(&json!({"_id": "abc123"})), Some("abc123".to_string()));
        assert_eq!(parse_device_id(&json!({"id": "xyz"})), Some("xyz".to_string()));
        assert_eq!(parse_device_id(&json!({"_id": ""})), None);
        assert_eq!(parse_device_id(&json!({"_id": 42})), None);
        assert_eq!(parse_device_id(&json!({"name": "blue_bulb"})), None);
        assert_eq!(parse_device_id(&json!([1, 2])), None);
    }

    #[test]
    fn test_endpoint_joins_base_path() {
        let c = BackendClient::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(c.endpoint(DEVICES_PATH).unwrap().as_str(), "http://localhost:5000/api/devices");

        let c = BackendClient::new("http://localhost:5000/prefix", Duration::from_secs(1)).unwrap();
        assert_eq!(c.endpoint(READINGS_PATH).unwrap().as_str(), "http://localhost:5000/prefix/api/readings");
    }

    #[tokio::test]
    async fn test_register_device() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/devices")
            .match_body(Matcher::Json(json!({"name": "blue_bulb", "location": "living-room"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"_id": "abc123", "name": "blue_bulb", "location": "living-room"}"#)
            .create_async()
            .await;

        let device = client_for(&server)
            .register_device(&NewDevice::new("blue_bulb", "living-room"))
            .await
            .unwrap();

        assert_eq!(device.id, "abc123");
        assert_eq!(device.name, "blue_bulb");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_register_device_bad_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/devices")
            .with_status(500)
            .with_body(r#"{"error": "boom"}"#)
            .create_async()
            .await;

        let result = client_for(&server)
            .register_device(&NewDevice::new("blue_bulb", "living-room"))
            .await;

        match result {
            Err(BackendError::Status { status, body, .. }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert!(body.contains("boom"));
            },
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_device_missing_id() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/devices")
            .with_status(200)
            .with_body(r#"{"name": "blue_bulb"}"#)
            .create_async()
            .await;

        let result = client_for(&server)
            .register_device(&NewDevice::new("blue_bulb", "living-room"))
            .await;
        assert!(matches!(result, Err(BackendError::MissingId { .. })));
    }

    #[tokio::test]
    async fn test_register_device_malformed_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/devices")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let result = client_for(&server)
            .register_device(&NewDevice::new("blue_bulb", "living-room"))
            .await;
        assert!(matches!(result, Err(BackendError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_register_device_connection_refused() {
        /* Nothing listens on port 1 */
        let client = BackendClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let result = client.register_device(&NewDevice::new("blue_bulb", "living-room")).await;
        assert!(matches!(result, Err(BackendError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_submit_reading() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/readings")
            .match_body(Matcher::Json(json!({"deviceId": "abc123", "watts": 42.5})))
            .with_status(200)
            .with_body(r#"{"success": true}"#)
            .create_async()
            .await;

        let reading = Reading { device_id: "abc123".to_string(), watts: 42.5, timestamp: None };
        client_for(&server).submit_reading(&reading).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_reading_bad_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/readings")
            .with_status(400)
            .with_body(r#"{"error": "deviceId and watts required"}"#)
            .create_async()
            .await;

        let reading = Reading { device_id: "abc123".to_string(), watts: 42.5, timestamp: None };
        let result = client_for(&server).submit_reading(&reading).await;
        assert!(matches!(result, Err(BackendError::Status { .. })));
    }
}
