//! Mapping of client font/style ids onto the PDF standard 14 fonts
//!
//! Clients send CSS-ish family names ("serif", "Dancing Script", "Courier
//! New"); marks are drawn with standard fonts for maximum viewer
//! compatibility.

/// Map a declared font id to a standard base font.
pub fn standard_font(name: Option<&str>) -> &'static str {
    let Some(name) = name else {
        return "Helvetica";
    };
    let lower = name.to_lowercase();

    match lower.as_str() {
        "serif" => return "Times-Roman",
        "sans-serif" => return "Helvetica",
        "monospace" => return "Courier",
        "cursive" | "fantasy" => return "Times-Italic",
        _ => {}
    }

    if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
        return "Times-Roman";
    }
    if lower.contains("courier") || lower.contains("mono") || lower.contains("consolas") {
        return "Courier";
    }
    // Script/handwriting families common in signature pickers.
    if lower.contains("script") || lower.contains("cursive") || lower.contains("hand") {
        return "Times-Italic";
    }
    "Helvetica"
}

/// Font for signature-style text marks: cursive register, italic variant of
/// whatever family the field declares.
pub fn cursive_font(name: Option<&str>) -> &'static str {
    match standard_font(name) {
        "Times-Roman" | "Times-Italic" => "Times-Italic",
        "Courier" => "Courier-Oblique",
        _ => "Helvetica-Oblique",
    }
}

/// Font size for a plain text mark, scaled to the box height.
pub fn text_size(box_height: f64) -> f64 {
    (box_height * 0.6).clamp(8.0, 16.0)
}

/// Font size for signature-style cursive text; larger register with its own
/// bounds so drawn names fill the box.
pub fn cursive_size(box_height: f64) -> f64 {
    (box_height * 0.7).clamp(10.0, 22.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_families_map_to_standard_fonts() {
        assert_eq!(standard_font(Some("serif")), "Times-Roman");
        assert_eq!(standard_font(Some("sans-serif")), "Helvetica");
        assert_eq!(standard_font(Some("monospace")), "Courier");
        assert_eq!(standard_font(None), "Helvetica");
    }

    #[test]
    fn script_families_go_italic() {
        assert_eq!(standard_font(Some("Dancing Script")), "Times-Italic");
        assert_eq!(standard_font(Some("cursive")), "Times-Italic");
    }

    #[test]
    fn unknown_defaults_to_helvetica() {
        assert_eq!(standard_font(Some("g_d0_f1")), "Helvetica");
        assert_eq!(standard_font(Some("")), "Helvetica");
    }

    #[test]
    fn cursive_register_uses_italic_variants() {
        assert_eq!(cursive_font(Some("serif")), "Times-Italic");
        assert_eq!(cursive_font(Some("monospace")), "Courier-Oblique");
        assert_eq!(cursive_font(None), "Helvetica-Oblique");
    }

    #[test]
    fn text_size_is_clamped() {
        assert_eq!(text_size(5.0), 8.0);
        assert_eq!(text_size(20.0), 12.0);
        assert_eq!(text_size(200.0), 16.0);
    }

    #[test]
    fn cursive_size_has_its_own_bounds() {
        assert_eq!(cursive_size(5.0), 10.0);
        assert_eq!(cursive_size(200.0), 22.0);
        assert!((cursive_size(20.0) - 14.0).abs() < 1e-9);
    }
}
