/**
Beacon groups the pieces needed to check a networked camera on the bench.
Still frames are polled over http, searched for a QR code and a bright light
source, annotated and shown in a preview window. Devices wrap a single piece
of hardware, components group devices with the processing that runs on them,
and small binaries under `systems` wire components together.
*/

/// Components in the system are created by grouping together
/// devices into a logical unit that performs some function.
pub mod components;
/// Devices that are an atomic unit, and can be composed
/// with other devices into components to perform some function.
pub mod devices;
/// Error types shared by devices and components.
pub mod errors;
/// Development utilities for working with configuration and
/// image information.
pub mod utils;
