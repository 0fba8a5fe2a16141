use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("no position data supplied")]
    MissingPosition,

    #[error("coordinate out of range: {0}")]
    OutOfRange(String),

    #[error("viewport dimensions must be positive")]
    DegenerateViewport,

    #[error("page dimensions must be positive")]
    DegeneratePage,
}

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    #[error("failed to save PDF: {0}")]
    Save(String),

    #[error("page {0} not found in document")]
    PageNotFound(u32),

    #[error("malformed page object: {0}")]
    MalformedPage(String),

    #[error("image decode failed: {0}")]
    Image(String),
}

impl From<RasterError> for EmbedError {
    fn from(e: RasterError) -> Self {
        EmbedError::Image(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("empty image data")]
    Empty,

    #[error("undecodable image data: {0}")]
    Undecodable(String),
}
