//! Geometry normalization and PDF mark embedding
//!
//! This crate turns heterogeneous client-supplied field positions into one
//! canonical fractional geometry (`coords`) and burns resolved marks into
//! PDF bytes (`embed`), producing a new document revision per signing pass.

pub mod coords;
pub mod embed;
pub mod error;
pub mod fonts;
pub mod raster;

pub use coords::{
    estimate_viewport, normalize, to_page_rect, PageDims, PageRect, RawFieldPosition, Viewport,
};
pub use embed::{embed, fit_image, page_dimensions, Mark, MarkJob};
pub use error::{EmbedError, GeometryError, RasterError};
