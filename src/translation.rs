//! SQL scanning: positional placeholders, bare keywords and statement ends.
//!
//! Builders write `?` placeholders. PostgreSQL expects `$1..$n`, so drivers
//! translate before preparing. The scanner skips quoted literals, quoted
//! identifiers, comments and dollar-quoted bodies; it does not understand
//! the PostgreSQL JSON operators `?`, `?|` and `?&`.

use std::borrow::Cow;

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteClass {
    Code,
    Quoted,
    Comment,
}

/// Classifies every byte of `sql` as code, quoted text or comment.
fn classify(sql: &str) -> Vec<ByteClass> {
    let bytes = sql.as_bytes();
    let mut classes = vec![ByteClass::Code; bytes.len()];
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        let next = bytes.get(idx + 1).copied();
        // Last byte consumed by this step.
        let mut end = idx;
        let class = match state {
            State::Normal => match b {
                b'\'' => {
                    state = State::SingleQuoted;
                    ByteClass::Quoted
                }
                b'"' => {
                    state = State::DoubleQuoted;
                    ByteClass::Quoted
                }
                b'-' if next == Some(b'-') => {
                    state = State::LineComment;
                    end = idx + 1;
                    ByteClass::Comment
                }
                b'/' if next == Some(b'*') => {
                    state = State::BlockComment(1);
                    end = idx + 1;
                    ByteClass::Comment
                }
                b'$' => match dollar_quote_tag(bytes, idx) {
                    Some((tag, tag_end)) => {
                        state = State::DollarQuoted(tag);
                        end = tag_end;
                        ByteClass::Quoted
                    }
                    None => ByteClass::Code,
                },
                _ => ByteClass::Code,
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if next == Some(b'\'') {
                        end = idx + 1;
                    } else {
                        state = State::Normal;
                    }
                }
                ByteClass::Quoted
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if next == Some(b'"') {
                        end = idx + 1;
                    } else {
                        state = State::Normal;
                    }
                }
                ByteClass::Quoted
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
                ByteClass::Comment
            }
            State::BlockComment(depth) => {
                if b == b'/' && next == Some(b'*') {
                    state = State::BlockComment(depth + 1);
                    end = idx + 1;
                } else if b == b'*' && next == Some(b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    end = idx + 1;
                }
                ByteClass::Comment
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && closes_dollar_quote(bytes, idx, tag) {
                    end = idx + tag.len() + 1;
                    state = State::Normal;
                }
                ByteClass::Quoted
            }
        };
        classes[idx..=end].fill(class);
        idx = end + 1;
    }

    classes
}

/// Byte offsets of every bare `?` placeholder in `sql`.
pub fn placeholder_positions(sql: &str) -> Vec<usize> {
    let bytes = sql.as_bytes();
    classify(sql)
        .into_iter()
        .enumerate()
        .filter(|&(idx, class)| class == ByteClass::Code && bytes[idx] == b'?')
        .map(|(idx, _)| idx)
        .collect()
}

/// Whether `keyword` appears as a bare word outside literals and comments.
/// Matching ignores ASCII case.
pub fn contains_keyword(sql: &str, keyword: &str) -> bool {
    let bytes = sql.as_bytes();
    let classes = classify(sql);
    let mut word_start = None;

    for idx in 0..=bytes.len() {
        let in_word = idx < bytes.len()
            && classes[idx] == ByteClass::Code
            && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_');
        match (in_word, word_start) {
            (true, None) => word_start = Some(idx),
            (false, Some(start)) => {
                if bytes[start..idx].eq_ignore_ascii_case(keyword.as_bytes()) {
                    return true;
                }
                word_start = None;
            }
            _ => {}
        }
    }
    false
}

/// `sql` without trailing comments, whitespace and statement terminators.
pub fn trim_statement_end(sql: &str) -> &str {
    let bytes = sql.as_bytes();
    let classes = classify(sql);
    let end = (0..bytes.len())
        .rev()
        .find(|&idx| match classes[idx] {
            ByteClass::Comment => false,
            ByteClass::Quoted => true,
            ByteClass::Code => !(bytes[idx].is_ascii_whitespace() || bytes[idx] == b';'),
        })
        .map_or(0, |idx| idx + 1);
    &sql[..end]
}

/// Number of bare `?` placeholders in `sql`.
pub fn count_placeholders(sql: &str) -> usize {
    placeholder_positions(sql).len()
}

/// Rewrites `?` placeholders as PostgreSQL `$1..$n`.
/// Returns a borrowed `Cow` when the statement has no placeholders.
pub fn to_numbered(sql: &str) -> Cow<'_, str> {
    let positions = placeholder_positions(sql);
    if positions.is_empty() {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + positions.len() * 2);
    let mut last = 0;
    for (n, pos) in positions.into_iter().enumerate() {
        out.push_str(&sql[last..pos]);
        out.push('$');
        out.push_str(&(n + 1).to_string());
        last = pos + 1;
    }
    out.push_str(&sql[last..]);
    Cow::Owned(out)
}

/// Parses `$tag$` starting at `start`; returns the tag and the index of the closing `$`.
fn dollar_quote_tag(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') || (b.is_ascii_digit() && idx == start + 1) {
            return None;
        }
        idx += 1;
    }
    if idx < bytes.len() {
        let tag = String::from_utf8(bytes[start + 1..idx].to_vec()).ok()?;
        Some((tag, idx))
    } else {
        None
    }
}

fn closes_dollar_quote(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    end < bytes.len() && &bytes[idx + 1..end] == tag.as_bytes() && bytes[end] == b'$'
}
