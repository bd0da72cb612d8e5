use crate::errors::ScannerError;
use serde::de::DeserializeOwned;
use std::{ffi::OsStr, path::Path};

/// Every config struct in beacon is read the same way, a single yaml file
/// deserialised through the `config` crate. Keys missing from the file fall
/// back to the struct's serde defaults.
///
/// * `filepath`: path to the yaml file.
pub fn read_yaml_config<T, F>(filepath: F) -> Result<T, ScannerError>
where
    T: DeserializeOwned,
    F: AsRef<OsStr>,
{
    let file = Path::new(&filepath);
    if !file.is_file() {
        return Err(ScannerError::MissingConfig(file.to_path_buf()));
    }
    let config_file = config::Config::builder()
        .add_source(config::File::new(
            &file.to_string_lossy(),
            config::FileFormat::Yaml,
        ))
        .build()?;
    Ok(config_file.try_deserialize::<T>()?)
}
