use crate::parsers::text;

#[test]
fn test_collapse_whitespace() {
    assert_eq!(text::collapse_whitespace("  a \t b\n\nc  "), "a b c");
    assert_eq!(text::collapse_whitespace("   "), "");
}

#[test]
fn test_normalize_lines_drops_empty_lines() {
    let raw = "\n\n  Admissions   deadlines \n\n\n Apply by   Nov 30 \n   \n";
    assert_eq!(
        text::normalize_lines(raw, 1000),
        "Admissions deadlines\nApply by Nov 30"
    );
}

#[test]
fn test_normalize_lines_cuts_on_line_boundary() {
    let raw = "first line\nsecond line\nthird line";
    // "first line\nsecond line" is 22 chars
    assert_eq!(text::normalize_lines(raw, 25), "first line\nsecond line");
    assert_eq!(text::normalize_lines(raw, 10), "first line");
}

#[test]
fn test_normalize_lines_truncates_single_long_line() {
    let raw = "abcdefghij";
    assert_eq!(text::normalize_lines(raw, 4), "abcd");
    assert_eq!(text::normalize_lines(raw, 0), "");
}

#[test]
fn test_truncate_chars_respects_char_boundaries() {
    assert_eq!(text::truncate_chars("héllo", 2), "hé");
    assert_eq!(text::truncate_chars("abc", 10), "abc");
}

#[test]
fn test_clip_marks_truncation() {
    assert_eq!(text::clip("abcdef", 3), "abc…");
    assert_eq!(text::clip("abc", 3), "abc");
}
