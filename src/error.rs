//! Viewer error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("no panorama available for '{city}'")]
    AssetUnavailable { city: String },

    #[error("render surface unavailable: {0}")]
    RenderSurfaceUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type ViewerResult<T> = Result<T, ViewerError>;
