//! Errors raised below the GPU layer: windowing, surfaces and settings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// winit refused to create or manage the window.
    #[error("window: {0}")]
    Window(String),

    /// Display or window handle missing, or `vkCreate*SurfaceKHR` failed.
    #[error("surface: {0}")]
    Surface(String),

    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("vsync = ");
        let error: Error = parse.unwrap_err().into();
        assert!(matches!(error, Error::Config(_)));
        assert!(error.to_string().starts_with("invalid settings"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
