//! Named-placeholder rewriting.
//!
//! Commands carry named markers (`@id`, `:id`). Drivers whose wire protocol only understands
//! positional placeholders rewrite the text once and bind values in the returned name order.

use std::borrow::Cow;

mod scanner;

use scanner::{
    State, closes_dollar_quote, is_block_comment_end, is_block_comment_start,
    is_line_comment_start, scan_named_marker, scan_word, try_start_dollar_quote,
};

/// Target placeholder style for rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
    /// SQLite-style placeholders like `?1`.
    Sqlite,
}

impl PlaceholderStyle {
    fn sigil(self) -> char {
        match self {
            PlaceholderStyle::Postgres => '$',
            PlaceholderStyle::Sqlite => '?',
        }
    }
}

/// SQL text with named markers replaced by positional placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenSql<'a> {
    pub sql: Cow<'a, str>,
    /// Bare marker names; placeholder `N` binds `names[N - 1]`.
    pub names: Vec<String>,
}

impl RewrittenSql<'_> {
    /// Zero-based slot of a marker name (case-insensitive, prefix optional).
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        let bare = name.trim_start_matches(['@', ':', '$']);
        self.names.iter().position(|n| n.eq_ignore_ascii_case(bare))
    }
}

/// Rewrite `@name` / `:name` markers into positional placeholders.
///
/// Repeated names reuse their first slot. Quoted strings, quoted identifiers, comments and
/// dollar-quoted blocks are copied untouched, as are `::` casts. Returns a borrowed `Cow` when
/// the text has no markers.
///
/// ```rust
/// use sql_facade::translation::{PlaceholderStyle, rewrite_named_placeholders};
///
/// let out = rewrite_named_placeholders(
///     "UPDATE t SET v = @v WHERE id = @id AND v <> @v",
///     PlaceholderStyle::Postgres,
/// );
/// assert_eq!(out.sql, "UPDATE t SET v = $1 WHERE id = $2 AND v <> $1");
/// assert_eq!(out.names, vec!["v", "id"]);
/// ```
#[must_use]
pub fn rewrite_named_placeholders(sql: &str, style: PlaceholderStyle) -> RewrittenSql<'_> {
    let mut out: Option<String> = None;
    let mut names: Vec<String> = Vec::new();
    let mut copied = 0;
    let mut state = State::Normal;
    let mut idx = 0;
    let bytes = sql.as_bytes();

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, close)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = close;
                    }
                }
                b'@' | b':' => {
                    if let Some(end) = scan_named_marker(bytes, idx) {
                        let name = &sql[idx + 1..end];
                        let slot = match names.iter().position(|n| n.eq_ignore_ascii_case(name)) {
                            Some(existing) => existing,
                            None => {
                                names.push(name.to_string());
                                names.len() - 1
                            }
                        };
                        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len()));
                        buf.push_str(&sql[copied..idx]);
                        buf.push(style.sigil());
                        buf.push_str(&(slot + 1).to_string());
                        copied = end;
                        idx = end;
                        continue;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if closes_dollar_quote(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    let sql = match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    };
    RewrittenSql { sql, names }
}

/// Keyword tracking for `CREATE TRIGGER ... BEGIN ... END`, whose body holds `;`.
#[derive(Default)]
struct TriggerBody {
    words: usize,
    creates: bool,
    in_trigger: bool,
    depth: usize,
}

impl TriggerBody {
    fn word(&mut self, word: &str) {
        if self.words == 0 {
            self.creates = word.eq_ignore_ascii_case("create");
        } else if self.creates && !self.in_trigger && word.eq_ignore_ascii_case("trigger") {
            self.in_trigger = true;
        } else if self.in_trigger {
            if word.eq_ignore_ascii_case("begin") || word.eq_ignore_ascii_case("case") {
                self.depth += 1;
            } else if word.eq_ignore_ascii_case("end") {
                self.depth = self.depth.saturating_sub(1);
            }
        }
        self.words += 1;
    }

    fn open(&self) -> bool {
        self.depth > 0
    }
}

/// Split a script into its statements at top-level `;`, skipping the same quoted and commented
/// regions as [`rewrite_named_placeholders`]. A trigger body stays with its `CREATE TRIGGER`
/// until the matching `END`. Empty statements are dropped.
#[must_use]
pub fn split_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut state = State::Normal;
    let mut trigger = TriggerBody::default();
    let mut idx = 0;
    let bytes = sql.as_bytes();

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b';' if !trigger.open() => {
                    statements.push(&sql[start..idx]);
                    start = idx + 1;
                    trigger = TriggerBody::default();
                }
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, close)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = close;
                    }
                }
                _ => {
                    if let Some(end) = scan_word(bytes, idx) {
                        trigger.word(&sql[idx..end]);
                        idx = end - 1;
                    }
                }
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    state = State::Normal;
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if closes_dollar_quote(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }
    statements.push(&sql[start..]);
    statements.retain(|s| !is_blank(s));
    statements
}

/// Only whitespace and comments.
fn is_blank(statement: &str) -> bool {
    let mut rest = statement.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail).trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail).trim_start();
        } else {
            return rest.is_empty();
        }
    }
}
