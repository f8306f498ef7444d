/// Trim whitespace and strip one pair of outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// Cleaned cell value, `None` when nothing is left.
pub fn non_empty(raw: &str) -> Option<String> {
    let cleaned = clean_str(raw);
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Upper-cased, BOM-free header name, so `accession_number` and
/// `\u{feff}ACCESSION_NUMBER` both match `ACCESSION_NUMBER`.
pub fn normalize_header(raw: &str) -> String {
    clean_str(raw.trim_start_matches('\u{feff}')).to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_cells_and_headers() {
        assert_eq!(clean_str("  \"APPLE INC\" "), "APPLE INC");
        assert_eq!(clean_str("\""), "\"");
        assert_eq!(non_empty("   "), None);
        assert_eq!(non_empty(" 100 "), Some("100".to_string()));
        assert_eq!(normalize_header("\u{feff}accession_number"), "ACCESSION_NUMBER");
    }
}
