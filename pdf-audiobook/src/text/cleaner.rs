//! Text normalization for PDF-extracted text.

use regex::Regex;
use std::sync::OnceLock;

/// Characters that can cause TTS issues and their replacements.
const PROBLEMATIC_CHARS: &[(char, &str)] = &[
    ('\u{2018}', "'"),   // Left single quote
    ('\u{2019}', "'"),   // Right single quote
    ('\u{201c}', "\""),  // Left double quote
    ('\u{201d}', "\""),  // Right double quote
    ('\u{2013}', "-"),   // En dash
    ('\u{2014}', "-"),   // Em dash
    ('\u{2026}', "..."), // Ellipsis
    ('\u{00a0}', " "),   // Non-breaking space
    ('\u{00ad}', ""),    // Soft hyphen
    ('\u{200b}', ""),    // Zero-width space
    ('\u{200c}', ""),    // Zero-width non-joiner
    ('\u{200d}', ""),    // Zero-width joiner
    ('\u{feff}', ""),    // BOM
    ('\u{2011}', "-"),   // Non-breaking hyphen
    ('\u{2012}', "-"),   // Figure dash
    ('\u{2015}', "-"),   // Horizontal bar
    ('\u{2032}', "'"),   // Prime (feet)
    ('\u{2033}', "\""),  // Double prime (inches)
    ('\u{00ab}', "\""),  // Left-pointing double angle quote
    ('\u{00bb}', "\""),  // Right-pointing double angle quote
    ('\u{fb01}', "fi"),  // Ligature fi
    ('\u{fb02}', "fl"),  // Ligature fl
];

/// Lines that hold nothing but a page number: "12", "- 12 -", "Page 12", "Page 12 of 80".
fn page_number_line() -> &'static Regex {
    static PAGE_NUMBER: OnceLock<Regex> = OnceLock::new();
    PAGE_NUMBER.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*(?:page[ \t]+)?[-\u{2013}\u{2014}]?[ \t]*\d{1,5}[ \t]*(?:of[ \t]+\d{1,5})?[ \t]*[-\u{2013}\u{2014}]?[ \t]*$")
            .expect("page number pattern is valid")
    })
}

/// Normalize raw extracted text into a single canonical line of prose.
///
/// This function:
/// - Joins words hyphenated across line breaks
/// - Drops form feeds and page-number-only lines left by the extractor
/// - Replaces problematic Unicode characters (smart quotes, dashes, etc.)
/// - Removes control and other non-printable characters
/// - Collapses consecutive periods
/// - Collapses all whitespace, newlines included, to single spaces
///
/// Never fails; input without any printable content yields an empty string.
pub fn normalize(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace(['\r', '\u{000c}'], "\n");
    let text = page_number_line().replace_all(&text, "");
    let text = join_hyphenated_lines(&text);

    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        let replacement = PROBLEMATIC_CHARS
            .iter()
            .find(|(ch, _)| *ch == c)
            .map(|(_, r)| *r);

        if let Some(r) = replacement {
            result.push_str(r);
        } else if c.is_whitespace() {
            result.push(' ');
        } else if is_printable(c) {
            result.push(c);
        }
    }

    let result = fix_multiple_periods(&result);
    collapse_whitespace(&result)
}

/// Join `exam-\nple` into `example` when the break sits between two letters
/// and the continuation starts lowercase. A capitalized continuation keeps
/// its hyphen: `New-\nYork` becomes `New-York`.
fn join_hyphenated_lines(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '-' && i > 0 && chars[i - 1].is_alphabetic() {
            // Skip trailing spaces, the newline, and any indentation after it.
            let mut j = i + 1;
            while j < chars.len() && (chars[j] == ' ' || chars[j] == '\t') {
                j += 1;
            }
            if j < chars.len() && chars[j] == '\n' {
                let mut k = j + 1;
                while k < chars.len() && chars[k].is_whitespace() {
                    k += 1;
                }
                if k < chars.len() && chars[k].is_lowercase() {
                    i = k;
                    continue;
                }
                if k < chars.len() && chars[k].is_alphabetic() {
                    result.push('-');
                    i = k;
                    continue;
                }
            }
        }
        result.push(c);
        i += 1;
    }

    result
}

/// Check if a character is printable text.
fn is_printable(c: char) -> bool {
    if c.is_control() {
        return false;
    }

    // Private use area and unassigned noncharacters carry no readable text.
    !matches!(c, '\u{e000}'..='\u{f8ff}' | '\u{fff0}'..='\u{ffff}')
}

/// Replace multiple consecutive periods with a single period.
fn fix_multiple_periods(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut period_count = 0;

    for c in text.chars() {
        if c == '.' {
            period_count += 1;
            if period_count == 1 {
                result.push('.');
            }
        } else {
            period_count = 0;
            result.push(c);
        }
    }

    result
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
