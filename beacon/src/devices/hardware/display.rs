use crate::{errors::ScannerError, utils::config::read_yaml_config};
use opencv::{core::Mat, highgui};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use tracing::debug;
use uuid::Uuid;

/// Anything the scanner can hand an annotated frame to, and ask for the
/// last key pressed. The preview window is the only production sink.
pub trait FrameSink {
    /// Replace whatever is currently shown with `frame`.
    fn show(&mut self, frame: &Mat) -> Result<(), ScannerError>;
    /// Key pressed since the last poll, if any.
    fn poll_key(&mut self) -> Result<Option<char>, ScannerError>;
}

/// Configuration for the live preview window.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct PreviewWindowConfig {
    /// Title of the window, OpenCV also uses it as the window handle.
    pub title: String,
    /// Key that ends the scanner loop.
    pub quit_key: char,
    /// How long each key poll may block in milliseconds.
    pub key_poll_ms: i32,
}

impl Default for PreviewWindowConfig {
    fn default() -> Self {
        Self {
            title: String::from("QR Scanner"),
            quit_key: 'q',
            key_poll_ms: 1,
        }
    }
}

impl PreviewWindowConfig {
    /// Generates a new window config from a file.
    ///
    /// * `filepath`: path to config file.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, ScannerError> {
        read_yaml_config(filepath)
    }
}

/// A named highgui window. The window is created on construction and
/// destroyed when the device is dropped.
pub struct PreviewWindow {
    /// Unique identifier, helpful for trouble shooting and logging.
    uuid: Uuid,
    /// Window title, doubles as the highgui handle.
    title: String,
    /// Blocking time of each key poll.
    key_poll_ms: i32,
}

impl PreviewWindow {
    /// Open a new preview window by consuming a window config.
    ///
    /// * `config`: Window parameters.
    pub fn new(config: PreviewWindowConfig) -> Result<Self, ScannerError> {
        highgui::named_window(&config.title, highgui::WINDOW_AUTOSIZE)?;
        let window = Self {
            uuid: Uuid::new_v4(),
            title: config.title,
            key_poll_ms: config.key_poll_ms.max(1),
        };
        debug!(window = %window.uuid, title = %window.title, "Opened preview window");
        Ok(window)
    }

    /// Return the unique identifier of the window.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }
}

impl FrameSink for PreviewWindow {
    fn show(&mut self, frame: &Mat) -> Result<(), ScannerError> {
        highgui::imshow(&self.title, frame)?;
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<char>, ScannerError> {
        // wait_key also pumps the highgui event loop, without it nothing is drawn.
        let key = highgui::wait_key(self.key_poll_ms)?;
        if key < 0 {
            return Ok(None);
        }
        #[allow(clippy::cast_sign_loss)]
        // Non negative here and masked to a single byte.
        let code = (key & 0xFF) as u32;
        Ok(char::from_u32(code))
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(&self.title) {
            debug!(window = %self.uuid, error = %e, "Failed to destroy preview window");
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::utils::tests::blank_frame;

    #[test]
    fn test_window_config_defaults_from_partial_yaml() {
        let config: PreviewWindowConfig = serde_yaml::from_str("title: Bench").unwrap();
        assert_eq!(config.title, "Bench");
        assert_eq!(config.quit_key, 'q');
        assert_eq!(config.key_poll_ms, 1);
    }

    #[cfg_attr(not(feature = "hardware_test"), ignore)]
    #[test]
    /// Needs a display. Shows a black frame for a moment.
    fn test_preview_window_shows_frame() {
        let mut window = PreviewWindow::new(PreviewWindowConfig::default()).unwrap();
        let frame = blank_frame(800, 600);
        for _ in 0..10 {
            window.show(&frame).unwrap();
            let _ = window.poll_key().unwrap();
        }
    }
}
