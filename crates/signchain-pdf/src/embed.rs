//! Mark-embedding engine
//!
//! Burns resolved marks (typed text and drawn signature images) into PDF
//! bytes, producing a new document revision. Per-field failures are logged
//! and skipped; the pass only fails when the base document cannot be parsed
//! or the result cannot be serialized.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::warn;
use uuid::Uuid;

use signchain_types::CanonicalRect;

use crate::coords::{to_page_rect, PageDims, PageRect};
use crate::error::EmbedError;
use crate::fonts;
use crate::raster::{self, Decoded};

/// What gets drawn into a field's box.
#[derive(Debug, Clone)]
pub enum Mark {
    /// Raster signature image, aspect-preserved and centered.
    Image(Vec<u8>),
    /// Literal text; `cursive` selects the signature-style register.
    Text {
        text: String,
        cursive: bool,
        font: Option<String>,
    },
}

/// One field's worth of work for an embedding pass.
#[derive(Debug, Clone)]
pub struct MarkJob {
    pub field_id: Uuid,
    /// 1-based page number.
    pub page: u32,
    pub rect: CanonicalRect,
    pub mark: Mark,
}

const LEFT_PADDING: f64 = 2.0;

/// Letter fallback for documents whose page tree carries no MediaBox.
const FALLBACK_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Dimensions of every page, in document order.
pub fn page_dimensions(bytes: &[u8]) -> Result<Vec<PageDims>, EmbedError> {
    let doc = Document::load_mem(bytes).map_err(|e| EmbedError::Parse(e.to_string()))?;
    let mut dims = Vec::new();
    for (_, page_id) in doc.get_pages() {
        let mb = media_box(&doc, page_id);
        dims.push(PageDims {
            width: mb[2] - mb[0],
            height: mb[3] - mb[1],
        });
    }
    Ok(dims)
}

/// Embed all marks into `base_pdf`, returning the new revision bytes.
///
/// A failing field never aborts the pass: it is logged and skipped so the
/// remaining marks still land.
pub fn embed(base_pdf: &[u8], jobs: &[MarkJob]) -> Result<Vec<u8>, EmbedError> {
    let mut doc = Document::load_mem(base_pdf).map_err(|e| EmbedError::Parse(e.to_string()))?;
    let pages = doc.get_pages();

    for job in jobs {
        let Some(&page_id) = pages.get(&job.page) else {
            warn!(field = %job.field_id, page = job.page, "page not found, skipping field");
            continue;
        };
        if let Err(e) = embed_one(&mut doc, page_id, job) {
            warn!(field = %job.field_id, error = %e, "failed to embed field, skipping");
        }
    }

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| EmbedError::Save(e.to_string()))?;
    Ok(out)
}

fn embed_one(doc: &mut Document, page_id: ObjectId, job: &MarkJob) -> Result<(), EmbedError> {
    let mb = media_box(doc, page_id);
    let page = PageDims {
        width: mb[2] - mb[0],
        height: mb[3] - mb[1],
    };
    let mut rect = to_page_rect(&job.rect, page);
    rect.left += mb[0];
    rect.bottom += mb[1];

    match &job.mark {
        Mark::Text {
            text,
            cursive,
            font,
        } => draw_text(doc, page_id, &rect, text, *cursive, font.as_deref()),
        Mark::Image(bytes) => draw_image(doc, page_id, &rect, bytes),
    }
}

/// Uniform aspect-preserving fit of an image into a box, centered.
pub fn fit_image(rect: &PageRect, img_w: f64, img_h: f64) -> PageRect {
    let scale = (rect.width / img_w).min(rect.height / img_h);
    let width = img_w * scale;
    let height = img_h * scale;
    PageRect {
        left: rect.left + (rect.width - width) / 2.0,
        bottom: rect.bottom + (rect.height - height) / 2.0,
        width,
        height,
    }
}

fn draw_text(
    doc: &mut Document,
    page_id: ObjectId,
    rect: &PageRect,
    text: &str,
    cursive: bool,
    font: Option<&str>,
) -> Result<(), EmbedError> {
    let (base_font, size) = if cursive {
        (fonts::cursive_font(font), fonts::cursive_size(rect.height))
    } else {
        (fonts::standard_font(font), fonts::text_size(rect.height))
    };
    let res_name = ensure_font(doc, page_id, base_font)?;

    // Baseline so the glyph box (cap height ~0.7em) sits visually centered.
    let baseline = rect.bottom + rect.height / 2.0 - size * 0.35;
    let content = format!(
        "q\nBT\n/{} {:.2} Tf\n0 g\n{:.2} {:.2} Td\n({}) Tj\nET\nQ\n",
        res_name,
        size,
        rect.left + LEFT_PADDING,
        baseline,
        escape_pdf_string(text),
    );
    append_content(doc, page_id, content.into_bytes())
}

fn draw_image(
    doc: &mut Document,
    page_id: ObjectId,
    rect: &PageRect,
    bytes: &[u8],
) -> Result<(), EmbedError> {
    let decoded = raster::decode(bytes)?;
    let (iw, ih) = decoded.dimensions();
    if iw == 0 || ih == 0 {
        return Err(EmbedError::Image("zero-sized image".into()));
    }
    let drawn = fit_image(rect, iw as f64, ih as f64);

    let stream = match decoded {
        Decoded::Jpeg {
            bytes,
            width,
            height,
        } => Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            bytes,
        ),
        Decoded::Raw {
            rgb,
            alpha,
            width,
            height,
        } => {
            let mut dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            };
            if let Some(alpha) = alpha {
                let smask = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => width as i64,
                        "Height" => height as i64,
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                    },
                    alpha,
                );
                let smask_id = doc.add_object(Object::Stream(smask));
                dict.set("SMask", Object::Reference(smask_id));
            }
            Stream::new(dict, rgb)
        }
    };

    let image_id = doc.add_object(Object::Stream(stream));
    // Object numbers grow monotonically, so the name stays unique across
    // successive signing passes over the same document.
    let res_name = format!("SCimg{}", image_id.0);
    set_page_resource(doc, page_id, b"XObject", &res_name, image_id)?;

    let content = format!(
        "q\n{:.2} 0 0 {:.2} {:.2} {:.2} cm\n/{} Do\nQ\n",
        drawn.width, drawn.height, drawn.left, drawn.bottom, res_name,
    );
    append_content(doc, page_id, content.into_bytes())
}

fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            _ if c.is_ascii() => c.to_string(),
            _ => "?".to_string(),
        })
        .collect()
}

fn deref<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    if let Object::Reference(id) = obj {
        doc.get_object(*id).unwrap_or(obj)
    } else {
        obj
    }
}

fn num(obj: &Object) -> f64 {
    match obj {
        Object::Integer(i) => *i as f64,
        Object::Real(r) => *r as f64,
        _ => 0.0,
    }
}

/// MediaBox for a page, walking the Parent chain for inherited boxes.
fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let mut id = page_id;
    for _ in 0..32 {
        let Ok(dict) = doc.get_object(id).and_then(Object::as_dict) else {
            break;
        };
        if let Ok(mb) = dict.get(b"MediaBox") {
            if let Object::Array(arr) = deref(doc, mb) {
                if arr.len() == 4 {
                    let vals: Vec<f64> = arr.iter().map(|o| num(deref(doc, o))).collect();
                    return [vals[0], vals[1], vals[2], vals[3]];
                }
            }
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(p)) => id = *p,
            _ => break,
        }
    }
    FALLBACK_MEDIA_BOX
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, EmbedError> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| EmbedError::MalformedPage(e.to_string()))
}

/// Append a new content stream to a page, preserving whatever Contents shape
/// the document already uses.
fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    ops: Vec<u8>,
) -> Result<(), EmbedError> {
    let stream_id = doc.add_object(Object::Stream(Stream::new(dictionary! {}, ops)));

    let existing = page_dict_mut(doc, page_id)?.remove(b"Contents");
    let contents = match existing {
        None => Object::Array(vec![Object::Reference(stream_id)]),
        Some(Object::Reference(r)) => {
            Object::Array(vec![Object::Reference(r), Object::Reference(stream_id)])
        }
        Some(Object::Array(mut arr)) => {
            arr.push(Object::Reference(stream_id));
            Object::Array(arr)
        }
        // Inline stream: move it out to its own object first.
        Some(other) => {
            let moved = doc.add_object(other);
            Object::Array(vec![Object::Reference(moved), Object::Reference(stream_id)])
        }
    };
    page_dict_mut(doc, page_id)?.set("Contents", contents);
    Ok(())
}

enum ResourcesLoc {
    PageInline,
    Indirect(ObjectId),
}

fn resources_loc(doc: &mut Document, page_id: ObjectId) -> Result<ResourcesLoc, EmbedError> {
    let dict = page_dict_mut(doc, page_id)?;
    match dict.get(b"Resources") {
        Ok(Object::Reference(r)) => Ok(ResourcesLoc::Indirect(*r)),
        Ok(Object::Dictionary(_)) => Ok(ResourcesLoc::PageInline),
        _ => {
            dict.set("Resources", Object::Dictionary(Dictionary::new()));
            Ok(ResourcesLoc::PageInline)
        }
    }
}

fn resources_dict_mut<'a>(
    doc: &'a mut Document,
    page_id: ObjectId,
    loc: &ResourcesLoc,
) -> Result<&'a mut Dictionary, EmbedError> {
    match loc {
        ResourcesLoc::PageInline => page_dict_mut(doc, page_id)?
            .get_mut(b"Resources")
            .and_then(Object::as_dict_mut)
            .map_err(|e| EmbedError::MalformedPage(e.to_string())),
        ResourcesLoc::Indirect(r) => doc
            .get_object_mut(*r)
            .and_then(Object::as_dict_mut)
            .map_err(|e| EmbedError::MalformedPage(e.to_string())),
    }
}

/// Register `name -> value` under a Resources category (Font, XObject),
/// tolerating inline and indirect Resources and category dictionaries.
fn set_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &[u8],
    name: &str,
    value: ObjectId,
) -> Result<(), EmbedError> {
    let loc = resources_loc(doc, page_id)?;

    let indirect_category = {
        let rdict = resources_dict_mut(doc, page_id, &loc)?;
        match rdict.get(category) {
            Ok(Object::Reference(c)) => Some(*c),
            Ok(Object::Dictionary(_)) => None,
            _ => {
                rdict.set(category, Object::Dictionary(Dictionary::new()));
                None
            }
        }
    };

    match indirect_category {
        Some(cid) => {
            let cdict = doc
                .get_object_mut(cid)
                .and_then(Object::as_dict_mut)
                .map_err(|e| EmbedError::MalformedPage(e.to_string()))?;
            cdict.set(name.as_bytes().to_vec(), Object::Reference(value));
        }
        None => {
            let rdict = resources_dict_mut(doc, page_id, &loc)?;
            let cdict = rdict
                .get_mut(category)
                .and_then(Object::as_dict_mut)
                .map_err(|e| EmbedError::MalformedPage(e.to_string()))?;
            cdict.set(name.as_bytes().to_vec(), Object::Reference(value));
        }
    }
    Ok(())
}

fn page_resource_exists(doc: &Document, page_id: ObjectId, category: &[u8], name: &str) -> bool {
    let Ok(page) = doc.get_object(page_id).and_then(Object::as_dict) else {
        return false;
    };
    let Ok(res) = page.get(b"Resources") else {
        return false;
    };
    let Ok(res) = deref(doc, res).as_dict() else {
        return false;
    };
    let Ok(cat) = res.get(category) else {
        return false;
    };
    match deref(doc, cat).as_dict() {
        Ok(cat) => cat.has(name.as_bytes()),
        Err(_) => false,
    }
}

/// Ensure a standard font is registered on the page, returning its resource
/// name. Idempotent per base font so repeated passes reuse the entry.
fn ensure_font(
    doc: &mut Document,
    page_id: ObjectId,
    base_font: &str,
) -> Result<String, EmbedError> {
    let res_name = format!("SCF{}", base_font.replace('-', ""));
    if page_resource_exists(doc, page_id, b"Font", &res_name) {
        return Ok(res_name);
    }
    let font_id = doc.add_object(Object::Dictionary(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
    }));
    set_page_resource(doc, page_id, b"Font", &res_name, font_id)?;
    Ok(res_name)
}
