//! Coordinate normalization between client viewports and canonical geometry
//!
//! Clients submit field positions in several shapes: fractions of the page,
//! percentages in 0..100, or raw pixels against some render viewport. This
//! module reconciles all of them into one [`CanonicalRect`] per field and
//! converts canonical rects into PDF page space (bottom-left origin, points).

use signchain_types::CanonicalRect;

use crate::error::GeometryError;

/// Page dimensions in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageDims {
    pub width: f64,
    pub height: f64,
}

/// Client render viewport in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Raw position data as submitted by a client. Newer clients send the
/// `*_pct` family (fractions or percentages), legacy clients send pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawFieldPosition {
    pub x_pct: Option<f64>,
    pub y_pct: Option<f64>,
    pub w_pct: Option<f64>,
    pub h_pct: Option<f64>,
    pub x_px: Option<f64>,
    pub y_px: Option<f64>,
    pub w_px: Option<f64>,
    pub h_px: Option<f64>,
}

/// A field rectangle in PDF page space, bottom-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRect {
    pub left: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
}

/// Default mark box for fields submitted without any size, in viewport
/// pixels.
const DEFAULT_BOX_W_PX: f64 = 160.0;
const DEFAULT_BOX_H_PX: f64 = 48.0;

/// Estimate the viewport a legacy client most likely rendered against.
///
/// Known approximation: wide pages (ratio > 1.5) are assumed to have been
/// shown on a 1000px-wide landscape canvas, everything else on an 800px-wide
/// portrait canvas, with the paired dimension derived from the page's own
/// aspect ratio. Unusual page sizes can misplace fields under this guess;
/// it is preserved as-is because existing documents were signed under it.
pub fn estimate_viewport(page: PageDims) -> Viewport {
    let ratio = page.width / page.height;
    let width = if ratio > 1.5 { 1000.0 } else { 800.0 };
    Viewport {
        width,
        height: width / ratio,
    }
}

/// Interpret one submitted fraction-family value: `[0,1]` passes through,
/// anything above 1 is a percentage in 0..100.
fn fraction_component(v: f64) -> Result<f64, GeometryError> {
    if !v.is_finite() || v < 0.0 {
        return Err(GeometryError::OutOfRange(format!("{v}")));
    }
    if v > 1.0 {
        Ok(v / 100.0)
    } else {
        Ok(v)
    }
}

/// Normalize a raw client position into a canonical fractional rectangle.
///
/// Idempotent: feeding an already-canonical rectangle back through returns
/// it unchanged.
pub fn normalize(
    raw: &RawFieldPosition,
    page: PageDims,
    viewport_hint: Option<Viewport>,
) -> Result<CanonicalRect, GeometryError> {
    if page.width <= 0.0 || page.height <= 0.0 {
        return Err(GeometryError::DegeneratePage);
    }
    if let Some(vp) = viewport_hint {
        if vp.width <= 0.0 || vp.height <= 0.0 {
            return Err(GeometryError::DegenerateViewport);
        }
    }
    let viewport = viewport_hint.unwrap_or_else(|| estimate_viewport(page));

    let pixel = |px: f64, dim: f64| -> Result<f64, GeometryError> {
        if !px.is_finite() || px < 0.0 {
            return Err(GeometryError::OutOfRange(format!("{px}px")));
        }
        Ok(px / dim)
    };

    let x = match (raw.x_pct, raw.x_px) {
        (Some(v), _) => fraction_component(v)?,
        (None, Some(px)) => pixel(px, viewport.width)?,
        (None, None) => return Err(GeometryError::MissingPosition),
    };
    let y = match (raw.y_pct, raw.y_px) {
        (Some(v), _) => fraction_component(v)?,
        (None, Some(px)) => pixel(px, viewport.height)?,
        (None, None) => return Err(GeometryError::MissingPosition),
    };

    let mut w = match (raw.w_pct, raw.w_px) {
        (Some(v), _) => fraction_component(v)?,
        (None, Some(px)) => pixel(px, viewport.width)?,
        (None, None) => DEFAULT_BOX_W_PX / viewport.width,
    };
    let mut h = match (raw.h_pct, raw.h_px) {
        (Some(v), _) => fraction_component(v)?,
        (None, Some(px)) => pixel(px, viewport.height)?,
        (None, None) => DEFAULT_BOX_H_PX / viewport.height,
    };
    if w <= 0.0 || h <= 0.0 {
        return Err(GeometryError::OutOfRange("zero-sized mark box".into()));
    }
    w = w.min(1.0);
    h = h.min(1.0);

    // Clamp to page bounds by shifting the origin, never shrinking the box.
    let x = if x + w > 1.0 { 1.0 - w } else { x };
    let y = if y + h > 1.0 { 1.0 - h } else { y };

    Ok(CanonicalRect { x, y, w, h })
}

/// Convert a canonical rectangle to PDF page space.
///
/// Canonical y runs top-down; PDF's origin is bottom-left, so
/// `bottom = page_h - y*page_h - h*page_h`.
pub fn to_page_rect(rect: &CanonicalRect, page: PageDims) -> PageRect {
    let left = rect.x * page.width;
    let width = rect.w * page.width;
    let height = rect.h * page.height;
    let top_from_top = rect.y * page.height;
    PageRect {
        left,
        bottom: page.height - top_from_top - height,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LETTER: PageDims = PageDims {
        width: 612.0,
        height: 792.0,
    };

    fn pct(x: f64, y: f64, w: f64, h: f64) -> RawFieldPosition {
        RawFieldPosition {
            x_pct: Some(x),
            y_pct: Some(y),
            w_pct: Some(w),
            h_pct: Some(h),
            ..Default::default()
        }
    }

    #[test]
    fn fractions_pass_through() {
        let rect = normalize(&pct(0.1, 0.2, 0.3, 0.1), LETTER, None).unwrap();
        assert_eq!(
            rect,
            CanonicalRect {
                x: 0.1,
                y: 0.2,
                w: 0.3,
                h: 0.1
            }
        );
    }

    #[test]
    fn percentages_divide_by_100() {
        let rect = normalize(&pct(10.0, 20.0, 30.0, 10.0), LETTER, None).unwrap();
        assert!((rect.x - 0.1).abs() < 1e-9);
        assert!((rect.y - 0.2).abs() < 1e-9);
        assert!((rect.w - 0.3).abs() < 1e-9);
        assert!((rect.h - 0.1).abs() < 1e-9);
    }

    #[test]
    fn pixels_divide_by_explicit_viewport() {
        let raw = RawFieldPosition {
            x_px: Some(100.0),
            y_px: Some(200.0),
            w_px: Some(150.0),
            h_px: Some(50.0),
            ..Default::default()
        };
        let vp = Viewport {
            width: 1000.0,
            height: 1294.0,
        };
        let rect = normalize(&raw, LETTER, Some(vp)).unwrap();
        assert!((rect.x - 0.1).abs() < 1e-9);
        assert!((rect.y - 200.0 / 1294.0).abs() < 1e-9);
        assert!((rect.w - 0.15).abs() < 1e-9);
        assert!((rect.h - 50.0 / 1294.0).abs() < 1e-9);
    }

    #[test]
    fn pixel_and_fraction_submissions_agree() {
        // Round-trip geometry: equivalent pixel and fraction inputs produce
        // the same canonical rectangle.
        let vp = Viewport {
            width: 800.0,
            height: 1035.3,
        };
        let px = RawFieldPosition {
            x_px: Some(0.25 * vp.width),
            y_px: Some(0.5 * vp.height),
            w_px: Some(0.2 * vp.width),
            h_px: Some(0.05 * vp.height),
            ..Default::default()
        };
        let from_px = normalize(&px, LETTER, Some(vp)).unwrap();
        let from_pct = normalize(&pct(0.25, 0.5, 0.2, 0.05), LETTER, None).unwrap();
        assert!((from_px.x - from_pct.x).abs() < 1e-9);
        assert!((from_px.y - from_pct.y).abs() < 1e-9);
        assert!((from_px.w - from_pct.w).abs() < 1e-9);
        assert!((from_px.h - from_pct.h).abs() < 1e-9);
    }

    #[test]
    fn estimated_viewport_portrait() {
        let vp = estimate_viewport(LETTER);
        assert_eq!(vp.width, 800.0);
        let ratio = LETTER.width / LETTER.height;
        assert!((vp.height - 800.0 / ratio).abs() < 1e-9);
    }

    #[test]
    fn estimated_viewport_landscape() {
        let page = PageDims {
            width: 1008.0,
            height: 612.0,
        };
        let vp = estimate_viewport(page);
        assert_eq!(vp.width, 1000.0);
        assert!((vp.height - 1000.0 / (1008.0 / 612.0)).abs() < 1e-9);
    }

    #[test]
    fn missing_size_gets_default_box() {
        let raw = RawFieldPosition {
            x_pct: Some(0.1),
            y_pct: Some(0.1),
            ..Default::default()
        };
        let rect = normalize(&raw, LETTER, None).unwrap();
        let vp = estimate_viewport(LETTER);
        assert!((rect.w - 160.0 / vp.width).abs() < 1e-9);
        assert!((rect.h - 48.0 / vp.height).abs() < 1e-9);
    }

    #[test]
    fn overflowing_percentage_shift_clamps() {
        // xPct=150 -> 1.5 after divide-by-100, then shifted to 1 - w.
        let raw = RawFieldPosition {
            x_pct: Some(150.0),
            y_pct: Some(10.0),
            w_pct: Some(0.2),
            h_pct: Some(0.05),
            ..Default::default()
        };
        let rect = normalize(&raw, LETTER, None).unwrap();
        assert!((rect.x - 0.8).abs() < 1e-9, "x = {}", rect.x);
        assert!((rect.w - 0.2).abs() < 1e-9, "w kept, not shrunk");
    }

    #[test]
    fn clamp_shifts_origin_not_size() {
        let rect = normalize(&pct(0.9, 0.95, 0.3, 0.2), LETTER, None).unwrap();
        assert!((rect.x - 0.7).abs() < 1e-9);
        assert!((rect.y - 0.8).abs() < 1e-9);
        assert!((rect.w - 0.3).abs() < 1e-9);
        assert!((rect.h - 0.2).abs() < 1e-9);
    }

    #[test]
    fn missing_position_is_rejected() {
        let err = normalize(&RawFieldPosition::default(), LETTER, None).unwrap_err();
        assert!(matches!(err, GeometryError::MissingPosition));
    }

    #[test]
    fn negative_coordinates_are_rejected() {
        let raw = pct(-0.1, 0.2, 0.3, 0.1);
        assert!(normalize(&raw, LETTER, None).is_err());
    }

    #[test]
    fn page_rect_flips_y_axis() {
        let rect = CanonicalRect {
            x: 0.1,
            y: 0.1,
            w: 0.3,
            h: 0.1,
        };
        let pr = to_page_rect(&rect, LETTER);
        assert!((pr.left - 61.2).abs() < 1e-9);
        assert!((pr.width - 183.6).abs() < 1e-9);
        assert!((pr.height - 79.2).abs() < 1e-9);
        // bottom = 792 - 79.2 (top offset) - 79.2 (height)
        assert!((pr.bottom - 633.6).abs() < 1e-9);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn page_dims() -> impl Strategy<Value = PageDims> {
        (100.0f64..2000.0, 100.0f64..2000.0).prop_map(|(width, height)| PageDims { width, height })
    }

    fn canonical_input() -> impl Strategy<Value = (f64, f64, f64, f64)> {
        (0.0f64..=1.0, 0.0f64..=1.0, 0.01f64..=1.0, 0.01f64..=1.0)
    }

    proptest! {
        /// Normalization output always satisfies the canonical invariants.
        #[test]
        fn output_is_always_in_bounds(
            page in page_dims(),
            (x, y, w, h) in (0.0f64..200.0, 0.0f64..200.0, 0.01f64..200.0, 0.01f64..200.0),
        ) {
            let raw = RawFieldPosition {
                x_pct: Some(x), y_pct: Some(y), w_pct: Some(w), h_pct: Some(h),
                ..Default::default()
            };
            let rect = normalize(&raw, page, None).unwrap();
            prop_assert!(rect.x >= 0.0 && rect.y >= 0.0);
            prop_assert!(rect.w > 0.0 && rect.h > 0.0);
            prop_assert!(rect.x + rect.w <= 1.0 + 1e-9);
            prop_assert!(rect.y + rect.h <= 1.0 + 1e-9);
        }

        /// normalize(normalize(f)) == normalize(f)
        #[test]
        fn normalization_is_idempotent(
            page in page_dims(),
            (x, y, w, h) in canonical_input(),
        ) {
            let raw = RawFieldPosition {
                x_pct: Some(x), y_pct: Some(y), w_pct: Some(w), h_pct: Some(h),
                ..Default::default()
            };
            let once = normalize(&raw, page, None).unwrap();
            let again = normalize(
                &RawFieldPosition {
                    x_pct: Some(once.x),
                    y_pct: Some(once.y),
                    w_pct: Some(once.w),
                    h_pct: Some(once.h),
                    ..Default::default()
                },
                page,
                None,
            )
            .unwrap();
            prop_assert!((again.x - once.x).abs() < 1e-12);
            prop_assert!((again.y - once.y).abs() < 1e-12);
            prop_assert!((again.w - once.w).abs() < 1e-12);
            prop_assert!((again.h - once.h).abs() < 1e-12);
        }

        /// Page-space conversion preserves area scaling and stays on-page.
        #[test]
        fn page_rect_stays_on_page(
            page in page_dims(),
            (x, y, w, h) in canonical_input(),
        ) {
            let raw = RawFieldPosition {
                x_pct: Some(x), y_pct: Some(y), w_pct: Some(w), h_pct: Some(h),
                ..Default::default()
            };
            let rect = normalize(&raw, page, None).unwrap();
            let pr = to_page_rect(&rect, page);
            prop_assert!(pr.left >= -1e-9);
            prop_assert!(pr.bottom >= -1e-9);
            prop_assert!(pr.left + pr.width <= page.width + 1e-6);
            prop_assert!(pr.bottom + pr.height <= page.height + 1e-6);
        }
    }
}
