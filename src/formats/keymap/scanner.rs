//! Small lexical scanner for keymap sources
//!
//! The source is split into code, comments and literals once; every other
//! helper here works on code only. Macro arguments nest arbitrarily deep, so
//! argument splitting counts bracket depth instead of pattern matching.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    LineComment,
    BlockComment,
    /// String or character literal, quotes included
    Literal,
}

/// Split `src` into consecutive segments covering every byte
pub fn segments(src: &str) -> Vec<(SegmentKind, Range<usize>)> {
    let bytes = src.as_bytes();
    let len = bytes.len();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < len {
        let special = match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = src[i..].find('\n').map_or(len, |n| i + n);
                Some((SegmentKind::LineComment, end))
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = src[i + 2..].find("*/").map_or(len, |n| i + 2 + n + 2);
                Some((SegmentKind::BlockComment, end))
            }
            quote @ (b'"' | b'\'') => {
                let mut j = i + 1;
                while j < len {
                    match bytes[j] {
                        b'\\' => j += 2,
                        b'\n' => break,
                        b if b == quote => {
                            j += 1;
                            break;
                        }
                        _ => j += 1,
                    }
                }
                Some((SegmentKind::Literal, j.min(len)))
            }
            _ => None,
        };

        match special {
            Some((kind, end)) => {
                if start < i {
                    out.push((SegmentKind::Code, start..i));
                }
                out.push((kind, i..end));
                i = end;
                start = end;
            }
            None => i += 1,
        }
    }

    if start < len {
        out.push((SegmentKind::Code, start..len));
    }
    out
}

/// Remove `//` comments, keeping block comments and literals
pub fn strip_line_comments(src: &str) -> String {
    segments(src)
        .into_iter()
        .filter(|(kind, _)| *kind != SegmentKind::LineComment)
        .map(|(_, range)| &src[range])
        .collect()
}

/// Replace every comment with spaces, keeping byte offsets and newlines
pub fn blank_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    for (kind, range) in segments(src) {
        let text = &src[range];
        match kind {
            SegmentKind::LineComment | SegmentKind::BlockComment => {
                for ch in text.chars() {
                    if ch == '\n' {
                        out.push('\n');
                    } else {
                        out.extend(std::iter::repeat(' ').take(ch.len_utf8()));
                    }
                }
            }
            _ => out.push_str(text),
        }
    }
    out
}

/// Inner text of every block comment in `src`
pub fn block_comments(src: &str) -> Vec<&str> {
    segments(src)
        .into_iter()
        .filter(|(kind, _)| *kind == SegmentKind::BlockComment)
        .map(|(_, range)| {
            let text = &src[range];
            let text = text.strip_prefix("/*").unwrap_or(text);
            text.strip_suffix("*/").unwrap_or(text)
        })
        .collect()
}

/// Code bytes of `src` with their offsets
fn code_bytes(src: &str) -> impl Iterator<Item = (usize, u8)> + '_ {
    segments(src)
        .into_iter()
        .filter(|(kind, _)| *kind == SegmentKind::Code)
        .flat_map(move |(_, range)| {
            let start = range.start;
            src.as_bytes()[range]
                .iter()
                .enumerate()
                .map(move |(i, b)| (start + i, *b))
        })
}

fn line_of(src: &str, offset: usize) -> usize {
    src[..offset].matches('\n').count() + 1
}

fn closer_for(open: u8) -> Option<u8> {
    match open {
        b'(' => Some(b')'),
        b'{' => Some(b'}'),
        b'[' => Some(b']'),
        _ => None,
    }
}

/// Check that parentheses, braces and brackets in code are balanced
pub fn check_balance(src: &str) -> Result<(), String> {
    let mut stack: Vec<(u8, usize)> = Vec::new();

    for (offset, byte) in code_bytes(src) {
        match byte {
            b'(' | b'{' | b'[' => stack.push((byte, offset)),
            b')' | b'}' | b']' => match stack.pop() {
                Some((open, _)) if closer_for(open) == Some(byte) => {}
                Some((open, open_at)) => {
                    return Err(format!(
                        "'{}' at line {} does not match '{}' opened at line {}",
                        byte as char,
                        line_of(src, offset),
                        open as char,
                        line_of(src, open_at)
                    ))
                }
                None => {
                    return Err(format!(
                        "unexpected '{}' at line {}",
                        byte as char,
                        line_of(src, offset)
                    ))
                }
            },
            _ => {}
        }
    }

    match stack.last() {
        Some((open, open_at)) => Err(format!(
            "'{}' opened at line {} is never closed",
            *open as char,
            line_of(src, *open_at)
        )),
        None => Ok(()),
    }
}

/// Offset of the bracket closing the one at `open_at`
pub fn matching_close(src: &str, open_at: usize) -> Option<usize> {
    let open = *src.as_bytes().get(open_at)?;
    let close = closer_for(open)?;
    let mut depth = 0usize;

    for (offset, byte) in code_bytes(src).skip_while(|(offset, _)| *offset < open_at) {
        if byte == open {
            depth += 1;
        } else if byte == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(offset);
            }
        }
    }
    None
}

/// Split on commas that are not nested inside any bracket
pub fn split_top_level(src: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (offset, byte) in code_bytes(src) {
        match byte {
            b'(' | b'{' | b'[' => depth += 1,
            b')' | b'}' | b']' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&src[start..offset]);
                start = offset + 1;
            }
            _ => {}
        }
    }
    parts.push(&src[start..]);

    parts.retain(|p| !p.trim().is_empty());
    parts
}

/// Collapse whitespace runs and drop padding just inside parentheses
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("( ", "(")
        .replace(" )", ")")
        .replace(" (", "(")
        .replace(" ,", ",")
}

/// Split `NAME(arg, ...)` into its name and top-level arguments
pub fn split_macro_call(text: &str) -> Option<(String, Vec<String>)> {
    let text = text.trim();
    let open = text.find('(')?;
    let name = text[..open].trim();
    if !is_identifier(name) {
        return None;
    }
    let close = matching_close(text, open)?;
    if close != text.len() - 1 {
        return None;
    }

    let inner = blank_comments(&text[open + 1..close]);
    let args = split_top_level(&inner)
        .into_iter()
        .map(normalize_whitespace)
        .filter(|a| !a.is_empty())
        .collect();
    Some((name.to_string(), args))
}

/// C identifier check
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
