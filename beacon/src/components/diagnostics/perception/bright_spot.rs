use crate::{
    errors::ScannerError,
    utils::{config::read_yaml_config, image::to_grayscale},
};
use opencv::{
    core::{self, Mat, Point, Point2f, Scalar, Size, Vector},
    imgproc,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use std::{f64::consts::PI, ffi::OsStr};
use tracing::{debug, info, trace};

/// Thresholds for finding a light source in a frame. The defaults are tuned
/// for a single LED seen by an ESP32-CAM at 800×600.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrightSpotConfig {
    /// Side of the square Gaussian kernel, must be odd.
    pub blur_kernel: i32,
    /// Pixels within this many levels of the brightest blurred pixel are
    /// candidates.
    pub threshold_margin: f64,
    /// Side of the square structuring element for open and close.
    pub morph_kernel: i32,
    /// Contours must be strictly larger than this, in square pixels.
    pub min_area: f64,
    /// Contours must be strictly smaller than this, in square pixels.
    pub max_area: f64,
    /// Contours must be strictly rounder than this, 1.0 is a perfect circle.
    pub min_circularity: f64,
    /// Mean grayscale level inside the contour must be strictly above this.
    pub min_brightness: f64,
}

impl Default for BrightSpotConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 15,
            threshold_margin: 30.0,
            morph_kernel: 5,
            min_area: 100.0,
            max_area: 5000.0,
            min_circularity: 0.7,
            min_brightness: 200.0,
        }
    }
}

impl BrightSpotConfig {
    /// Generates a new bright spot config from a file.
    ///
    /// * `filepath`: path to config file.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, ScannerError> {
        read_yaml_config(filepath)
    }

    /// Reject kernels OpenCV refuses and an empty area window.
    pub fn validate(&self) -> Result<(), ScannerError> {
        if self.blur_kernel <= 0 || self.blur_kernel % 2 == 0 {
            return Err(ScannerError::InvalidConfig(format!(
                "blur_kernel must be positive and odd, got {}",
                self.blur_kernel
            )));
        }
        if self.morph_kernel <= 0 {
            return Err(ScannerError::InvalidConfig(format!(
                "morph_kernel must be positive, got {}",
                self.morph_kernel
            )));
        }
        if self.min_area >= self.max_area {
            return Err(ScannerError::InvalidConfig(format!(
                "min_area {} must be below max_area {}",
                self.min_area, self.max_area
            )));
        }
        Ok(())
    }
}

/// The light source found in a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct BrightSpotDetection {
    /// Centre of the minimum enclosing circle.
    pub centroid: (f32, f32),
    /// Radius of the minimum enclosing circle.
    pub radius: f32,
    /// Mean grayscale level inside the contour.
    pub mean_brightness: f64,
    /// Contour area in square pixels.
    pub area: f64,
    /// 4π·area/perimeter² of the contour.
    pub circularity: f64,
}

/// Shape compactness, 1.0 for a perfect circle. A zero perimeter gives 0.0
/// rather than a division by zero.
///
/// * `area`: area enclosed by the contour.
/// * `perimeter`: closed length of the contour.
pub fn circularity(area: f64, perimeter: f64) -> f64 {
    if perimeter <= 0.0 {
        return 0.0;
    }
    4.0 * PI * area / (perimeter * perimeter)
}

/// Contour that passed the area and circularity filters.
struct Candidate {
    contour: Vector<Point>,
    area: f64,
    circularity: f64,
}

/// Finds the brightest round blob in a frame. Every frame is treated on
/// its own, nothing carries over between calls.
pub struct BrightSpotLocator {
    config: BrightSpotConfig,
}

impl Default for BrightSpotLocator {
    fn default() -> Self {
        Self {
            config: BrightSpotConfig::default(),
        }
    }
}

impl BrightSpotLocator {
    /// Create a locator by consuming its thresholds, rejecting values that
    /// would fail on every frame.
    ///
    /// * `config`: `BrightSpotConfig`
    pub fn new(config: BrightSpotConfig) -> Result<Self, ScannerError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Detect on `frame` without touching it.
    pub fn find(&self, frame: &Mat) -> Result<Option<BrightSpotDetection>, ScannerError> {
        let gray = to_grayscale(frame)?;
        let mask = self.bright_mask(&gray)?;

        let mut contours = Vector::<Vector<Point>>::new();
        imgproc::find_contours_def(
            &mask,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
        )?;

        let Some(candidate) = self.best_candidate(&contours)? else {
            trace!(contours = contours.len(), "No contour passed the shape filters");
            return Ok(None);
        };

        let mut center = Point2f::default();
        let mut radius = 0.0_f32;
        imgproc::min_enclosing_circle(&candidate.contour, &mut center, &mut radius)?;

        let mean_brightness = mean_inside(&gray, &candidate.contour)?;
        if mean_brightness <= self.config.min_brightness {
            debug!(
                mean_brightness,
                x = center.x,
                y = center.y,
                "Round blob is too dim to be the light source"
            );
            return Ok(None);
        }

        Ok(Some(BrightSpotDetection {
            centroid: (center.x, center.y),
            radius,
            mean_brightness,
            area: candidate.area,
            circularity: candidate.circularity,
        }))
    }

    /// Detect on `frame`, then draw the result onto `canvas` and report it.
    ///
    /// * `frame`: pristine frame to detect on.
    /// * `canvas`: frame that is displayed, usually a copy of `frame`.
    pub fn locate(
        &self,
        frame: &Mat,
        canvas: &mut Mat,
    ) -> Result<Option<BrightSpotDetection>, ScannerError> {
        let detection = self.find(frame)?;
        if let Some(spot) = &detection {
            annotate(canvas, spot)?;
            let (x, y) = spot.centroid;
            info!(
                radius = spot.radius,
                brightness = spot.mean_brightness,
                "Light source centre: ({x:.1}, {y:.1})"
            );
        }
        Ok(detection)
    }

    /// Blur, threshold near the maximum, then open and close to drop
    /// speckle and fill pin holes.
    fn bright_mask(&self, gray: &Mat) -> opencv::Result<Mat> {
        let blur = self.config.blur_kernel;
        let mut blurred = Mat::default();
        imgproc::gaussian_blur_def(gray, &mut blurred, Size::new(blur, blur), 0.0)?;

        let mut max_intensity = 0.0;
        core::min_max_loc(
            &blurred,
            None,
            Some(&mut max_intensity),
            None,
            None,
            &core::no_array(),
        )?;

        // THRESH_BINARY keeps values strictly above the cutoff, 8 bit levels
        // at or above (max - margin) survive.
        let cutoff = max_intensity - self.config.threshold_margin - 1.0;
        let mut mask = Mat::default();
        imgproc::threshold(&blurred, &mut mask, cutoff, 255.0, imgproc::THRESH_BINARY)?;
        trace!(max_intensity, cutoff, "Thresholded blurred frame");

        let side = self.config.morph_kernel;
        let kernel =
            imgproc::get_structuring_element_def(imgproc::MORPH_RECT, Size::new(side, side))?;
        let mut opened = Mat::default();
        imgproc::morphology_ex_def(&mask, &mut opened, imgproc::MORPH_OPEN, &kernel)?;
        let mut closed = Mat::default();
        imgproc::morphology_ex_def(&opened, &mut closed, imgproc::MORPH_CLOSE, &kernel)?;
        Ok(closed)
    }

    /// Largest contour inside the area window that is round enough.
    fn best_candidate(
        &self,
        contours: &Vector<Vector<Point>>,
    ) -> opencv::Result<Option<Candidate>> {
        let mut best: Option<Candidate> = None;
        for contour in contours.iter() {
            let area = imgproc::contour_area_def(&contour)?;
            if area <= self.config.min_area || area >= self.config.max_area {
                trace!(area, "Contour rejected by area");
                continue;
            }
            let perimeter = imgproc::arc_length(&contour, true)?;
            let roundness = circularity(area, perimeter);
            if roundness <= self.config.min_circularity {
                trace!(area, circularity = roundness, "Contour rejected by circularity");
                continue;
            }
            if best.as_ref().map_or(true, |b| area > b.area) {
                best = Some(Candidate {
                    contour,
                    area,
                    circularity: roundness,
                });
            }
        }
        Ok(best)
    }
}

/// Mean grayscale level of the pixels covered by the filled contour.
fn mean_inside(gray: &Mat, contour: &Vector<Point>) -> opencv::Result<f64> {
    let mut mask =
        Mat::new_rows_cols_with_default(gray.rows(), gray.cols(), core::CV_8UC1, Scalar::all(0.0))?;
    let mut filled = Vector::<Vector<Point>>::new();
    filled.push(contour.iter().collect::<Vector<Point>>());
    imgproc::draw_contours(
        &mut mask,
        &filled,
        -1,
        Scalar::all(255.0),
        imgproc::FILLED,
        imgproc::LINE_8,
        &core::no_array(),
        i32::MAX,
        Point::default(),
    )?;
    Ok(core::mean(gray, &mask)?[0])
}

fn circle_colour() -> Scalar {
    Scalar::new(0.0, 255.0, 255.0, 0.0)
}

fn label_colour() -> Scalar {
    Scalar::new(255.0, 255.0, 0.0, 0.0)
}

/// Fitted circle, coordinate label above it and brightness label below.
fn annotate(canvas: &mut Mat, spot: &BrightSpotDetection) -> opencv::Result<()> {
    let (x, y) = spot.centroid;
    let center = Point::new(x.round() as i32, y.round() as i32);
    let radius = spot.radius.round() as i32;

    imgproc::circle(
        canvas,
        center,
        radius,
        circle_colour(),
        2,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::put_text(
        canvas,
        &format!("Light X: {x:.0}, Y: {y:.0}"),
        Point::new(center.x - 50, center.y - radius - 10),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        label_colour(),
        2,
        imgproc::LINE_8,
        false,
    )?;
    imgproc::put_text(
        canvas,
        &format!("Brightness: {:.1}", spot.mean_brightness),
        Point::new(center.x - 50, center.y + radius + 20),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        label_colour(),
        2,
        imgproc::LINE_8,
        false,
    )
}
