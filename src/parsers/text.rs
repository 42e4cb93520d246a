/// Collapse runs of whitespace into single spaces and trim the ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalizes extracted page text
///
/// - Collapses whitespace within each line
/// - Drops empty lines
/// - Keeps one block of text per line
/// - Cuts the result at `max_chars` characters, on a line boundary when possible
pub fn normalize_lines(raw: &str, max_chars: usize) -> String {
    let mut result = String::new();
    let mut used = 0usize;

    for line in raw.lines() {
        let line = collapse_whitespace(line);
        if line.is_empty() {
            continue;
        }

        let separator = usize::from(!result.is_empty());
        let line_chars = line.chars().count();
        if used + separator + line_chars > max_chars {
            let room = max_chars.saturating_sub(used + separator);
            if room > 0 && result.is_empty() {
                result.push_str(truncate_chars(&line, room));
            }
            break;
        }

        if separator == 1 {
            result.push('\n');
        }
        result.push_str(&line);
        used += separator + line_chars;
    }

    result
}

/// Longest prefix of `text` holding at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Truncate for prompts, marking the cut
pub fn clip(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{}…", cut)
    } else {
        cut.to_string()
    }
}
