/// Reading typed configuration structs from yaml files.
pub mod config;
/// Conversions between OpenCV frames and the buffers other crates expect.
pub mod image;
/// Test helpers: compile time fixture paths, canned http responses
/// and synthetic frames.
pub mod tests;
