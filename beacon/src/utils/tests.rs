/// Macro that helps to check test file exist at compile time.
/// [link](https://stackoverflow.com/questions/30003921/how-can-i-locate-resources-for-testing-with-cargo)
/// [link](https://stackoverflow.com/questions/73187970/compile-time-check-if-file-at-path-exists-like-include-str)
#[macro_export]
macro_rules! test_file_path {
    ($arg1:expr) => {{
        let _ = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), $arg1));
        concat!(env!("CARGO_MANIFEST_DIR"), $arg1)
    }};
}

#[cfg(test)]
pub(crate) use fixtures::*;

#[cfg(test)]
mod fixtures {
    use opencv::{
        core::{self, Mat, Point, Scalar, Vector},
        imgcodecs, imgproc,
    };
    use std::{
        io::{BufRead, BufReader, Write},
        net::{SocketAddr, TcpListener},
        thread::{self, JoinHandle},
    };

    /// Black BGR frame.
    pub(crate) fn blank_frame(width: i32, height: i32) -> Mat {
        Mat::new_rows_cols_with_default(height, width, core::CV_8UC3, Scalar::all(0.0))
            .expect("Failed to allocate frame")
    }

    /// Frame where every pixel holds the same gray level.
    pub(crate) fn uniform_frame(width: i32, height: i32, level: f64) -> Mat {
        Mat::new_rows_cols_with_default(height, width, core::CV_8UC3, Scalar::all(level))
            .expect("Failed to allocate frame")
    }

    /// Paint a filled gray disc, the synthetic stand-in for a light source.
    pub(crate) fn draw_disc(frame: &mut Mat, center: Point, radius: i32, level: f64) {
        imgproc::circle(
            frame,
            center,
            radius,
            Scalar::all(level),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .expect("Failed to draw disc");
    }

    /// Paint a filled gray rectangle.
    pub(crate) fn draw_bar(frame: &mut Mat, rect: core::Rect, level: f64) {
        imgproc::rectangle(
            frame,
            rect,
            Scalar::all(level),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .expect("Failed to draw bar");
    }

    /// Sum over every channel of every pixel, zero means nothing was drawn.
    pub(crate) fn frame_energy(frame: &Mat) -> f64 {
        let sum = core::sum_elems(frame).expect("Failed to sum frame");
        sum[0] + sum[1] + sum[2] + sum[3]
    }

    /// Encode a frame the way the camera serves it.
    pub(crate) fn encode_png(frame: &Mat) -> Vec<u8> {
        let mut buffer = Vector::<u8>::new();
        imgcodecs::imencode_def(".png", frame, &mut buffer).expect("Failed to encode frame");
        buffer.to_vec()
    }

    /// Full http response with the given status line and body.
    pub(crate) fn http_response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        response
    }

    /// Stand in camera. Serves each canned response to exactly one
    /// connection, in order, then stops listening.
    pub(crate) fn serve_responses(responses: Vec<Vec<u8>>) -> (SocketAddr, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test camera");
        let address = listener.local_addr().expect("Failed to read test camera address");
        let handle = thread::spawn(move || {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                // Drain the request head before answering.
                let mut reader = BufReader::new(stream.try_clone().expect("Failed to clone stream"));
                let mut line = String::new();
                while reader.read_line(&mut line).map_or(false, |n| n > 0) {
                    if line == "\r\n" {
                        break;
                    }
                    line.clear();
                }
                let _ = stream.write_all(&response);
                let _ = stream.flush();
            }
        });
        (address, handle)
    }
}
