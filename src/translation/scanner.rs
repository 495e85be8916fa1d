#[derive(Clone)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

pub(super) fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

pub(super) fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

pub(super) fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

/// `$tag$` opener at `start`; returns the tag and the index of its closing `$`.
pub(super) fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphabetic() || b == b'_' || (idx > start + 1 && b.is_ascii_digit())) {
            return None;
        }
        idx += 1;
    }
    if idx < bytes.len() {
        let tag = std::str::from_utf8(&bytes[start + 1..idx]).ok()?.to_string();
        Some((tag, idx))
    } else {
        None
    }
}

pub(super) fn closes_dollar_quote(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    bytes.get(idx) == Some(&b'$')
        && bytes.get(idx + 1..end) == Some(tag.as_bytes())
        && bytes.get(end) == Some(&b'$')
}

fn is_identifier_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// A bare keyword or identifier starting at `idx`; returns its end index.
///
/// Words glued to a preceding identifier byte, `.`, or marker sigil are not reported.
pub(super) fn scan_word(bytes: &[u8], idx: usize) -> Option<usize> {
    if !bytes.get(idx).copied().is_some_and(is_identifier_start) {
        return None;
    }
    if idx > 0 {
        let prev = bytes[idx - 1];
        if is_identifier_byte(prev) || matches!(prev, b'@' | b':' | b'$' | b'.') {
            return None;
        }
    }
    let mut end = idx + 1;
    while end < bytes.len() && is_identifier_byte(bytes[end]) {
        end += 1;
    }
    Some(end)
}

/// A named marker (`@name` or `:name`) starting at `idx`; returns the end index of the name.
///
/// `::` casts and markers glued to a preceding identifier are not placeholders.
pub(super) fn scan_named_marker(bytes: &[u8], idx: usize) -> Option<usize> {
    let marker = *bytes.get(idx)?;
    if marker != b'@' && marker != b':' {
        return None;
    }
    if idx > 0 {
        let prev = bytes[idx - 1];
        if is_identifier_byte(prev) || prev == b':' || prev == b'@' {
            return None;
        }
    }
    if !bytes.get(idx + 1).copied().is_some_and(is_identifier_start) {
        return None;
    }
    let mut end = idx + 1;
    while end < bytes.len() && is_identifier_byte(bytes[end]) {
        end += 1;
    }
    Some(end)
}
