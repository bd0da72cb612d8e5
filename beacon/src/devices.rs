/// Devices are the atomic units that can be combined together
/// into components. Their core responsibilities do not change
/// based on location, name etc.
pub mod hardware {
    /// Device interface for cameras serving still frames over http.
    pub mod camera;
    /// Device interface for the live preview window.
    pub mod display;
}

/// Helpful prelude when working with devices.
pub mod prelude {
    pub use crate::devices::hardware::camera::*;
    pub use crate::devices::hardware::display::*;
}
