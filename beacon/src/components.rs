/// Components used to check the camera setup on the bench, rather than
/// on the machine.
pub mod diagnostics {
    /// Locators that find things of interest in a single frame.
    pub mod perception {
        /// Finding and decoding QR codes.
        pub mod qr_locator;
        /// Finding a small, round, bright light source.
        pub mod bright_spot;
    }
    /// The camera polling scanner and its loop.
    pub mod scanner;
}

/// Helpful prelude when working with components.
pub mod prelude {
    pub use crate::components::diagnostics::perception::bright_spot::*;
    pub use crate::components::diagnostics::perception::qr_locator::*;
    pub use crate::components::diagnostics::scanner::*;
}
