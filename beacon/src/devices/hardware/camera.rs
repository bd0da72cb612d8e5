use crate::{
    errors::{CaptureError, ScannerError},
    utils::config::read_yaml_config,
};
use chrono::{DateTime, Utc};
use opencv::{
    core::{Mat, Size, Vector},
    imgcodecs, imgproc,
    prelude::*,
};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::{ffi::OsStr, time::Duration};
use tracing::{debug, trace};
use uuid::Uuid;

/// Camera configuration for devices that serve one still frame per plain
/// HTTP request, such as the ESP32-CAM `/capture` endpoint. No streaming,
/// no authentication.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct CaptureCameraConfig {
    /// Network address of the camera, a port may be appended (`10.0.0.7:8080`).
    pub host: String,
    /// Path of the still capture endpoint on the camera.
    pub path: String,
    /// Upper bound on a whole request in milliseconds. A hung camera would
    /// otherwise stall the scanner indefinitely.
    pub timeout_ms: u64,
    /// Upper bound on establishing the connection in milliseconds.
    pub connect_timeout_ms: u64,
    /// Width every decoded frame is resized to.
    pub frame_width: i32,
    /// Height every decoded frame is resized to.
    pub frame_height: i32,
}

impl Default for CaptureCameraConfig {
    fn default() -> Self {
        Self {
            host: String::from("192.168.31.170"),
            path: String::from("/capture"),
            timeout_ms: 5000,
            connect_timeout_ms: 2000,
            frame_width: 800,
            frame_height: 600,
        }
    }
}

impl CaptureCameraConfig {
    /// Create new camera configuration using defaults.
    ///
    /// * `host`: address of the networked camera.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Generates a new camera config from a file.
    ///
    /// * `filepath`: path to config file.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, ScannerError> {
        read_yaml_config(filepath)
    }

    /// Full url of the capture endpoint.
    pub fn url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        format!("http://{host}/{path}")
    }

    /// Size every frame is normalised to after decoding.
    pub fn frame_size(&self) -> Size {
        Size::new(self.frame_width, self.frame_height)
    }
}

/// A still frame pulled from the camera. Owned by one iteration of the
/// scanner loop and dropped at its end.
#[derive(Debug)]
pub struct Frame {
    /// Unique identifier of the capture, only used to correlate log lines.
    uuid: Uuid,
    /// Decoded BGR pixels, already resized to the configured frame size.
    pub image: Mat,
    /// Time the response body was decoded.
    datetime: DateTime<Utc>,
}

impl Frame {
    /// Wrap an already decoded image.
    pub fn new(image: Mat) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            image,
            datetime: Utc::now(),
        }
    }

    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.datetime
    }
}

/// A network camera polled for single frames. Like every device in beacon it
/// carries a UUID for logging, and is built by consuming its config.
pub struct CaptureCamera {
    /// Unique identifier, helpful for trouble shooting and logging.
    uuid: Uuid,
    /// Capture endpoint built from the config.
    url: String,
    /// Decoded frames are resized to this.
    frame_size: Size,
    /// Blocking client with the configured timeouts baked in.
    client: Client,
}

impl CaptureCamera {
    /// Create a new camera by consuming a camera config.
    ///
    /// * `config`: Set of parameters that configure a network camera.
    pub fn new(config: CaptureCameraConfig) -> Result<Self, ScannerError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(ScannerError::HttpClient)?;
        Ok(Self {
            uuid: Uuid::new_v4(),
            url: config.url(),
            frame_size: config.frame_size(),
            client,
        })
    }

    /// Create a new camera by reading a `CaptureCameraConfig` from a file.
    ///
    /// * `filepath`: path to the parameter file.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, ScannerError> {
        Self::new(CaptureCameraConfig::from_file(filepath)?)
    }

    /// Return the unique identifier of the camera.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    /// Capture endpoint the camera is polled on.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one blocking GET and decode the body. Any failure abandons the
    /// frame, the caller decides whether and when to retry.
    pub fn capture(&self) -> Result<Frame, CaptureError> {
        trace!(camera = %self.uuid, url = %self.url, "Requesting frame");
        let response = self.client.get(&self.url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::Status(status));
        }
        let body = response.bytes()?;
        let image = decode_frame(&body, self.frame_size)?;
        let frame = Frame::new(image);
        debug!(
            camera = %self.uuid,
            frame = %frame.get_uuid(),
            bytes = body.len(),
            "Captured frame"
        );
        Ok(frame)
    }
}

/// Decode encoded image bytes (JPEG, PNG, ...) into a BGR frame of the given
/// size.
///
/// * `bytes`: response body from the camera.
/// * `size`: size the frame is resized to.
pub fn decode_frame(bytes: &[u8], size: Size) -> Result<Mat, CaptureError> {
    if bytes.is_empty() {
        return Err(CaptureError::EmptyBody);
    }
    let buffer = Vector::<u8>::from_slice(bytes);
    let decoded = imgcodecs::imdecode(&buffer, imgcodecs::IMREAD_COLOR)?;
    if decoded.empty() {
        return Err(CaptureError::Decode { len: bytes.len() });
    }
    if decoded.size()? == size {
        return Ok(decoded);
    }
    let mut resized = Mat::default();
    imgproc::resize(
        &decoded,
        &mut resized,
        size,
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    Ok(resized)
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::utils::tests::{blank_frame, encode_png, http_response, serve_responses};
    use rstest::rstest;

    #[rstest]
    #[case("192.168.31.170", "/capture", "http://192.168.31.170/capture")]
    #[case("192.168.31.170/", "capture", "http://192.168.31.170/capture")]
    #[case("cam.local:8080", "/still/jpg", "http://cam.local:8080/still/jpg")]
    fn test_capture_url(#[case] host: &str, #[case] path: &str, #[case] expected: &str) {
        let mut config = CaptureCameraConfig::new(host);
        config.path = String::from(path);
        assert_eq!(config.url(), expected);
    }

    #[test]
    fn test_camera_config_yaml_round_trip() {
        let mut config = CaptureCameraConfig::new("10.0.0.7:8080");
        config.timeout_ms = 750;
        let yaml = serde_yaml::to_string(&config).unwrap();
        let read_config: CaptureCameraConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, read_config, "Failed to be created equally");
    }

    #[test]
    fn test_decode_frame_resizes_to_frame_size() {
        let encoded = encode_png(&blank_frame(320, 240));
        let frame = decode_frame(&encoded, Size::new(800, 600)).unwrap();
        assert_eq!(frame.size().unwrap(), Size::new(800, 600));
        assert_eq!(frame.channels(), 3);
    }

    #[rstest]
    #[case(b"".to_vec())]
    #[case(b"definitely not an image".to_vec())]
    fn test_decode_frame_rejects_bad_bodies(#[case] body: Vec<u8>) {
        assert!(decode_frame(&body, Size::new(800, 600)).is_err());
    }

    #[test]
    fn test_capture_success() {
        let png = encode_png(&blank_frame(640, 480));
        let (address, server) =
            serve_responses(vec![http_response("200 OK", "image/png", &png)]);
        let camera = CaptureCamera::new(CaptureCameraConfig::new(address.to_string())).unwrap();

        let frame = camera.capture().unwrap();
        assert_eq!(frame.image.size().unwrap(), Size::new(800, 600));
        server.join().unwrap();
    }

    #[test]
    fn test_capture_non_success_status() {
        let (address, server) = serve_responses(vec![http_response(
            "503 Service Unavailable",
            "text/plain",
            b"busy",
        )]);
        let camera = CaptureCamera::new(CaptureCameraConfig::new(address.to_string())).unwrap();

        match camera.capture() {
            Err(CaptureError::Status(status)) => assert_eq!(status.as_u16(), 503),
            other => panic!("Expected a status error, got {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn test_capture_connection_refused() {
        // Bind then drop so the port is known to be closed.
        let address = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let camera = CaptureCamera::new(CaptureCameraConfig::new(address.to_string())).unwrap();

        assert!(matches!(camera.capture(), Err(CaptureError::Transport(_))));
    }

    #[cfg_attr(not(feature = "hardware_test"), ignore)]
    #[test]
    /// Pull a single frame from the camera at the default address.
    fn test_capture_from_camera() {
        let camera = CaptureCamera::new(CaptureCameraConfig::default()).unwrap();
        let frame = camera.capture().expect("Failed to capture frame");
        assert_eq!(frame.image.size().unwrap(), Size::new(800, 600));
    }
}
