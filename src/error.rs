use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Library error type for slideshow operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured photo root is missing or not a directory.
    #[error("photo root {0} is not a directory")]
    NotADirectory(PathBuf),

    /// A command-line value is outside its accepted range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A catalog rebuild produced nothing to show.
    #[error("no images selected under {0}")]
    EmptySelection(PathBuf),

    /// A single photo could not be opened or decoded.
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Scaling a decoded photo to the surface failed.
    #[error("failed to resize {path}: {reason}")]
    Resize { path: PathBuf, reason: String },

    /// The reverse-geocoding request failed.
    #[error("geocoding request failed: {0}")]
    Geocode(#[from] reqwest::Error),

    /// The reverse-geocoding request exceeded its time budget.
    #[error("geocoding request timed out after {0:?}")]
    GeocodeTimeout(Duration),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Presentation error from the display surface.
    #[error("render error: {0}")]
    Render(anyhow::Error),
}
