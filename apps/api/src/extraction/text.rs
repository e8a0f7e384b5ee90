/// Counts characters that carry information: letters, digits and ASCII punctuation.
pub fn readable_chars(text: &str) -> usize {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_ascii_punctuation())
        .count()
}

/// Cleans extracted text without reflowing it: control characters are dropped,
/// runs of spaces collapse to one, lines are trimmed, and more than one blank
/// line in a row collapses to a single blank line.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0usize;

    for line in raw.lines() {
        let cleaned: String = line
            .chars()
            .map(|c| if c == '\t' || c == '\u{a0}' { ' ' } else { c })
            .filter(|c| !c.is_control())
            .collect();
        let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
            out.push('\n');
            continue;
        }

        blank_run = 0;
        out.push_str(&collapsed);
        out.push('\n');
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_chars_ignores_whitespace_and_controls() {
        assert_eq!(readable_chars("a b\tc\n\u{0}"), 3);
        assert_eq!(readable_chars("C++, 5 yrs."), 9);
    }

    #[test]
    fn test_normalize_collapses_spaces_and_blank_lines() {
        let raw = "  Jane   Doe \n\n\n\nEngineer\t\tat  Acme\r\n";
        assert_eq!(normalize_text(raw), "Jane Doe\n\nEngineer at Acme");
    }

    #[test]
    fn test_normalize_drops_control_characters() {
        assert_eq!(normalize_text("Ru\u{7}st\u{0}"), "Rust");
    }

    #[test]
    fn test_normalize_keeps_clean_text_unchanged() {
        let clean = "Jane Doe\nSenior Engineer";
        assert_eq!(normalize_text(clean), clean);
    }
}
