//! Raster decode for drawn signature assets
//!
//! Clients submit PNG or JPEG bytes, sometimes mislabeled. Decode tries the
//! format the magic bytes claim first, then the other common raster format,
//! then a generic sniffing decode, before giving up.

use image::{DynamicImage, ImageFormat};

use crate::error::RasterError;

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: [u8; 2] = [0xFF, 0xD8];

/// A decoded image ready for XObject embedding.
#[derive(Debug, Clone)]
pub enum Decoded {
    /// Valid JPEG bytes are embedded as-is with a DCTDecode filter.
    Jpeg {
        bytes: Vec<u8>,
        width: u32,
        height: u32,
    },
    /// Everything else is flattened to raw RGB with an optional alpha mask.
    Raw {
        rgb: Vec<u8>,
        alpha: Option<Vec<u8>>,
        width: u32,
        height: u32,
    },
}

impl Decoded {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Decoded::Jpeg { width, height, .. } => (*width, *height),
            Decoded::Raw { width, height, .. } => (*width, *height),
        }
    }
}

fn flatten(img: DynamicImage) -> Decoded {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut opaque = true;
    for px in rgba.pixels() {
        rgb.extend_from_slice(&px.0[..3]);
        alpha.push(px.0[3]);
        if px.0[3] != 255 {
            opaque = false;
        }
    }
    Decoded::Raw {
        rgb,
        alpha: if opaque { None } else { Some(alpha) },
        width,
        height,
    }
}

/// Decode submitted asset bytes, transcoding once if the claimed format
/// fails to parse.
pub fn decode(bytes: &[u8]) -> Result<Decoded, RasterError> {
    if bytes.is_empty() {
        return Err(RasterError::Empty);
    }

    if bytes.starts_with(&JPEG_MAGIC) {
        if let Ok(img) = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg) {
            return Ok(Decoded::Jpeg {
                bytes: bytes.to_vec(),
                width: img.width(),
                height: img.height(),
            });
        }
        // Mislabeled; fall through to the PNG attempt, then generic.
        if let Ok(img) = image::load_from_memory_with_format(bytes, ImageFormat::Png) {
            return Ok(flatten(img));
        }
    } else if bytes.starts_with(&PNG_MAGIC) {
        if let Ok(img) = image::load_from_memory_with_format(bytes, ImageFormat::Png) {
            return Ok(flatten(img));
        }
        if let Ok(img) = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg) {
            return Ok(flatten(img));
        }
    }

    image::load_from_memory(bytes)
        .map(flatten)
        .map_err(|e| RasterError::Undecodable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use std::io::Cursor;

    fn png_fixture(width: u32, height: u32, alpha: u8) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgba([10u8, 20, 30, alpha]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgba([10u8, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .to_rgb8()
            .write_to(&mut out, ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn opaque_png_decodes_without_alpha_mask() {
        let decoded = decode(&png_fixture(4, 2, 255)).unwrap();
        match decoded {
            Decoded::Raw {
                rgb,
                alpha,
                width,
                height,
            } => {
                assert_eq!((width, height), (4, 2));
                assert_eq!(rgb.len(), 4 * 2 * 3);
                assert!(alpha.is_none());
            }
            other => panic!("expected raw decode, got {other:?}"),
        }
    }

    #[test]
    fn transparent_png_keeps_alpha_mask() {
        let decoded = decode(&png_fixture(3, 3, 128)).unwrap();
        match decoded {
            Decoded::Raw { alpha, .. } => {
                let alpha = alpha.expect("alpha mask");
                assert_eq!(alpha.len(), 9);
                assert!(alpha.iter().all(|&a| a == 128));
            }
            other => panic!("expected raw decode, got {other:?}"),
        }
    }

    #[test]
    fn jpeg_passes_through_as_dct() {
        let bytes = jpeg_fixture(5, 4);
        let decoded = decode(&bytes).unwrap();
        match decoded {
            Decoded::Jpeg {
                bytes: kept,
                width,
                height,
            } => {
                assert_eq!(kept, bytes);
                assert_eq!((width, height), (5, 4));
            }
            other => panic!("expected jpeg passthrough, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_rejected() {
        let err = decode(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x11, 0x22, 0x33]).unwrap_err();
        assert!(matches!(err, RasterError::Undecodable(_)));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(decode(&[]), Err(RasterError::Empty)));
    }
}
