use crate::{errors::ScannerError, utils::image::gray_buffer};
use opencv::{
    core::{Mat, Point, Scalar, Vector},
    imgproc,
};
use tracing::{debug, info, trace};

/// One symbol as reported by a barcode decoder.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedSymbol {
    /// Outline of the symbol in frame coordinates, in decoder order.
    pub polygon: Vec<Point>,
    /// Decoded text.
    pub payload: String,
}

/// Seam between the locator and whichever library does the decoding.
pub trait BarcodeDecoder {
    /// Every decodable symbol in the frame, in the order the decoder found them.
    fn decode(&self, frame: &Mat) -> Result<Vec<DecodedSymbol>, ScannerError>;
}

/// Decoder backed by the pure Rust `rqrr` crate.
#[derive(Default, Clone, Copy, Debug)]
pub struct RqrrDecoder;

impl BarcodeDecoder for RqrrDecoder {
    fn decode(&self, frame: &Mat) -> Result<Vec<DecodedSymbol>, ScannerError> {
        let gray = gray_buffer(frame)?;
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(gray.width, gray.height, |x, y| {
                gray.pixel(x, y)
            });
        let grids = prepared.detect_grids();
        trace!(grids = grids.len(), "rqrr grid detection complete");

        let symbols = grids
            .into_iter()
            .filter_map(|grid| match grid.decode() {
                Ok((_, payload)) => Some(DecodedSymbol {
                    polygon: grid.bounds.iter().map(|p| Point::new(p.x, p.y)).collect(),
                    payload,
                }),
                Err(e) => {
                    debug!(error = ?e, "Skipping grid that failed to decode");
                    None
                }
            })
            .collect();
        Ok(symbols)
    }
}

/// The QR code found in a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct QrDetection {
    /// Integer mean of the outline vertices.
    pub centroid: (i32, i32),
    /// Decoded text.
    pub payload: String,
    /// Outline used for annotation and the centroid.
    pub polygon: Vec<Point>,
}

/// Keep annotation outlines well formed: a polygon with more than four
/// points is replaced by its convex hull.
///
/// * `points`: outline as reported by the decoder.
pub fn reduce_polygon(points: &[Point]) -> opencv::Result<Vec<Point>> {
    if points.len() <= 4 {
        return Ok(points.to_vec());
    }
    let outline = Vector::<Point>::from_slice(points);
    let mut hull = Vector::<Point>::new();
    imgproc::convex_hull_def(&outline, &mut hull)?;
    Ok(hull.to_vec())
}

/// Mean of the vertices, truncated to whole pixels. `None` for an empty
/// outline.
pub fn polygon_centroid(points: &[Point]) -> Option<(i32, i32)> {
    if points.is_empty() {
        return None;
    }
    let count = points.len() as i64;
    let (sum_x, sum_y) = points.iter().fold((0_i64, 0_i64), |(sx, sy), p| {
        (sx + i64::from(p.x), sy + i64::from(p.y))
    });
    #[allow(clippy::cast_possible_truncation)]
    // The mean of i32 values always fits back into an i32.
    let centroid = ((sum_x / count) as i32, (sum_y / count) as i32);
    Some(centroid)
}

/// Finds a QR code in a frame and draws its outline, centroid and
/// coordinates.
///
/// Only the first symbol in decoder order is reported. Frames holding
/// several codes silently lose all but that one, which is not necessarily
/// the largest or the sharpest.
pub struct QrLocator<D = RqrrDecoder> {
    decoder: D,
}

impl Default for QrLocator<RqrrDecoder> {
    fn default() -> Self {
        Self::new(RqrrDecoder)
    }
}

impl<D: BarcodeDecoder> QrLocator<D> {
    /// Create a locator around a decoder.
    ///
    /// * `decoder`: barcode decoder implementation.
    pub fn new(decoder: D) -> Self {
        Self { decoder }
    }

    /// Detect on `frame` without touching it.
    pub fn find(&self, frame: &Mat) -> Result<Option<QrDetection>, ScannerError> {
        let Some(symbol) = self.decoder.decode(frame)?.into_iter().next() else {
            return Ok(None);
        };
        let polygon = reduce_polygon(&symbol.polygon)?;
        let Some(centroid) = polygon_centroid(&polygon) else {
            debug!(payload = %symbol.payload, "Decoded symbol has no outline");
            return Ok(None);
        };
        Ok(Some(QrDetection {
            centroid,
            payload: symbol.payload,
            polygon,
        }))
    }

    /// Detect on `frame`, then draw the result onto `canvas` and report it.
    /// Detection and drawing are split so annotations from one locator
    /// never feed into another.
    ///
    /// * `frame`: pristine frame to detect on.
    /// * `canvas`: frame that is displayed, usually a copy of `frame`.
    pub fn locate(
        &self,
        frame: &Mat,
        canvas: &mut Mat,
    ) -> Result<Option<QrDetection>, ScannerError> {
        let detection = self.find(frame)?;
        if let Some(qr) = &detection {
            annotate(canvas, qr)?;
            let (x, y) = qr.centroid;
            info!("QR code data: {}", qr.payload);
            info!("QR code centre: ({x}, {y})");
        }
        Ok(detection)
    }
}

fn outline_colour() -> Scalar {
    Scalar::new(0.0, 255.0, 0.0, 0.0)
}

fn marker_colour() -> Scalar {
    Scalar::new(0.0, 0.0, 255.0, 0.0)
}

/// Outline, centre dot and coordinate label.
fn annotate(canvas: &mut Mat, qr: &QrDetection) -> opencv::Result<()> {
    let mut outlines = Vector::<Vector<Point>>::new();
    outlines.push(Vector::from_slice(&qr.polygon));
    imgproc::polylines(
        canvas,
        &outlines,
        true,
        outline_colour(),
        2,
        imgproc::LINE_8,
        0,
    )?;

    let (x, y) = qr.centroid;
    imgproc::circle(
        canvas,
        Point::new(x, y),
        5,
        marker_colour(),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::put_text(
        canvas,
        &format!("X: {x}, Y: {y}"),
        Point::new(x - 50, y - 20),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        marker_colour(),
        2,
        imgproc::LINE_8,
        false,
    )
}
