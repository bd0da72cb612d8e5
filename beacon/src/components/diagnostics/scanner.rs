use crate::{
    components::diagnostics::perception::{
        bright_spot::{BrightSpotConfig, BrightSpotDetection, BrightSpotLocator},
        qr_locator::{BarcodeDecoder, QrDetection, QrLocator, RqrrDecoder},
    },
    devices::hardware::{
        camera::{CaptureCamera, CaptureCameraConfig, Frame},
        display::{FrameSink, PreviewWindowConfig},
    },
    errors::ScannerError,
    utils::config::read_yaml_config,
};
use opencv::{core::Mat, prelude::*};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use strum_macros::IntoStaticStr;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Longest single sleep while waiting to retry, bounds how late a stop
/// request is noticed.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// As with all elements in beacon, a configuration struct is consumed to
/// create the component, which in turn builds the devices it is composed of.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    /// Camera the frames are polled from.
    pub camera: CaptureCameraConfig,
    /// Preview window the annotated frames are shown in.
    pub window: PreviewWindowConfig,
    /// Light source detection thresholds.
    pub bright_spot: BrightSpotConfig,
    /// Pause after a failed iteration in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            camera: CaptureCameraConfig::default(),
            window: PreviewWindowConfig::default(),
            bright_spot: BrightSpotConfig::default(),
            retry_delay_ms: 1000,
        }
    }
}

impl ScannerConfig {
    /// Create a scanner config for a camera, everything else defaulted.
    ///
    /// * `camera`: camera the scanner polls.
    pub fn new(camera: CaptureCameraConfig) -> Self {
        Self {
            camera,
            ..Default::default()
        }
    }

    /// Replace the preview window settings.
    ///
    /// * `window`: window config.
    pub fn with_window(mut self, window: PreviewWindowConfig) -> Self {
        self.window = window;
        self
    }

    /// Replace the light source thresholds.
    ///
    /// * `bright_spot`: detection thresholds.
    pub fn with_bright_spot(mut self, bright_spot: BrightSpotConfig) -> Self {
        self.bright_spot = bright_spot;
        self
    }

    /// Replace the pause after a failed iteration.
    ///
    /// * `retry_delay_ms`: delay in milliseconds.
    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    /// Create a scanner config from a file.
    ///
    /// * `filepath`: path to the scanner config.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, ScannerError> {
        read_yaml_config(filepath)
    }
}

/// What was found in a single frame. The two detections are independent,
/// neither is used to validate the other.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct FrameReport {
    pub qr: Option<QrDetection>,
    pub bright_spot: Option<BrightSpotDetection>,
}

/// Component grouping the camera with the two locators. The preview window
/// is handed to the controller separately so it can be swapped out.
pub struct Scanner<D = RqrrDecoder> {
    /// Unique id of the scanner.
    uuid: Uuid,
    /// Camera device frames are polled from.
    camera: CaptureCamera,
    qr_locator: QrLocator<D>,
    bright_spot_locator: BrightSpotLocator,
    /// Key that ends the loop.
    quit_key: char,
    /// Pause after a failed iteration.
    retry_delay: Duration,
}

impl Scanner<RqrrDecoder> {
    /// Create a scanner by consuming a config, decoding QR codes with rqrr.
    ///
    /// * `config`: Specified scanner config.
    pub fn new(config: ScannerConfig) -> Result<Self, ScannerError> {
        Self::with_decoder(config, RqrrDecoder)
    }

    /// Create a scanner by ingesting a config file.
    ///
    /// * `filepath`: filepath to the config.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, ScannerError> {
        Self::new(ScannerConfig::from_file(filepath)?)
    }
}

impl<D: BarcodeDecoder> Scanner<D> {
    /// Create a scanner around a specific barcode decoder.
    ///
    /// * `config`: Specified scanner config.
    /// * `decoder`: barcode decoder used by the QR locator.
    pub fn with_decoder(config: ScannerConfig, decoder: D) -> Result<Self, ScannerError> {
        Ok(Self {
            uuid: Uuid::new_v4(),
            camera: CaptureCamera::new(config.camera)?,
            qr_locator: QrLocator::new(decoder),
            bright_spot_locator: BrightSpotLocator::new(config.bright_spot)?,
            quit_key: config.window.quit_key,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    /// Return the unique id of the scanner.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    /// Run both locators on the untouched frame, then draw their results
    /// onto it.
    ///
    /// * `frame`: decoded frame, annotated in place.
    pub fn process_frame(&self, frame: &mut Mat) -> Result<FrameReport, ScannerError> {
        let pristine = frame.try_clone()?;
        let qr = self.qr_locator.locate(&pristine, frame)?;
        let bright_spot = self.bright_spot_locator.locate(&pristine, frame)?;
        Ok(FrameReport { qr, bright_spot })
    }
}

/// States of the scanner loop. The frame travels with the state from
/// acquisition to display and is dropped when the state moves on.
#[derive(Debug, IntoStaticStr)]
pub enum LoopState {
    /// About to request a frame from the camera.
    Acquiring,
    /// Holding a freshly decoded frame.
    Processing(Frame),
    /// Holding an annotated frame.
    Displaying(Frame),
    /// Pausing after a failure.
    Waiting,
    /// The user asked to quit.
    Stopped,
}

/// Unit struct to link the scanner loop behaviour, detached from the
/// state it operates on.
pub struct ScannerController;

impl ScannerController {
    /// Run the loop until the quit key is pressed or `stop_signal` is set.
    /// Failures never end the loop, they are logged and retried.
    ///
    /// * `scanner`: component holding the camera and locators.
    /// * `sink`: where annotated frames are shown.
    /// * `stop_signal`: Will halt the loop, checked between transitions.
    pub fn start<D, S>(scanner: &Scanner<D>, sink: &mut S, stop_signal: Arc<AtomicBool>)
    where
        D: BarcodeDecoder,
        S: FrameSink,
    {
        info!("Connecting to camera at {}", scanner.camera.url());
        let mut state = LoopState::Acquiring;
        while !matches!(state, LoopState::Stopped) {
            if stop_signal.load(Ordering::Relaxed) {
                info!(scanner = %scanner.uuid, "Stop requested");
                break;
            }
            state = Self::advance(scanner, state, sink, &stop_signal);
        }
        info!(scanner = %scanner.uuid, "Scanner stopped");
    }

    /// Perform exactly one transition of the loop.
    ///
    /// * `scanner`: component holding the camera and locators.
    /// * `state`: current state, consumed.
    /// * `sink`: where annotated frames are shown.
    /// * `stop_signal`: cuts the retry wait short when set.
    pub fn advance<D, S>(
        scanner: &Scanner<D>,
        state: LoopState,
        sink: &mut S,
        stop_signal: &AtomicBool,
    ) -> LoopState
    where
        D: BarcodeDecoder,
        S: FrameSink,
    {
        let name: &'static str = (&state).into();
        trace!(state = name, "Advancing scanner loop");

        match state {
            LoopState::Acquiring => match scanner.camera.capture() {
                Ok(frame) => LoopState::Processing(frame),
                Err(e) => {
                    warn!(url = %scanner.camera.url(), "Failed to get frame: {e}");
                    LoopState::Waiting
                }
            },
            LoopState::Processing(mut frame) => match scanner.process_frame(&mut frame.image) {
                Ok(report) => {
                    debug!(
                        frame = %frame.get_uuid(),
                        captured = %frame.datetime(),
                        qr = report.qr.is_some(),
                        bright_spot = report.bright_spot.is_some(),
                        "Processed frame"
                    );
                    LoopState::Displaying(frame)
                }
                Err(e) => {
                    warn!(frame = %frame.get_uuid(), "Failed to process frame: {e}");
                    LoopState::Waiting
                }
            },
            LoopState::Displaying(frame) => match Self::display(scanner, &frame, sink) {
                Ok(true) => LoopState::Stopped,
                Ok(false) => LoopState::Acquiring,
                Err(e) => {
                    warn!(frame = %frame.get_uuid(), "Failed to display frame: {e}");
                    LoopState::Waiting
                }
            },
            LoopState::Waiting => {
                wait(scanner.retry_delay, stop_signal);
                LoopState::Acquiring
            }
            LoopState::Stopped => LoopState::Stopped,
        }
    }

    /// Show the frame and report whether the quit key was pressed.
    fn display<D, S: FrameSink>(
        scanner: &Scanner<D>,
        frame: &Frame,
        sink: &mut S,
    ) -> Result<bool, ScannerError> {
        sink.show(&frame.image)?;
        Ok(sink.poll_key()? == Some(scanner.quit_key))
    }
}

/// Sleep for `delay`, waking early once `stop_signal` is set.
fn wait(delay: Duration, stop_signal: &AtomicBool) {
    let deadline = Instant::now() + delay;
    while !stop_signal.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(WAIT_SLICE));
    }
}
