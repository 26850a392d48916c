//! Lexical entity-reference scanning and rewriting.
//!
//! References are `#<digits>` tokens. Rewriting works directly on the raw
//! parameter text and leaves everything else byte-for-byte intact; the only
//! grammar it knows is how to step over string literals, binaries and
//! comments so that a `#12` inside `'part #12'` is never touched.

/// Collect every entity reference in `params`, in textual order.
pub fn references(params: &str) -> Vec<u64> {
    let mut out = Vec::new();
    scan(params, |id| {
        out.push(id);
        None
    });
    out
}

/// Rewrite every entity reference in `params` through `f`.
pub fn renumber(params: &str, mut f: impl FnMut(u64) -> u64) -> String {
    scan(params, |id| Some(f(id)))
}

/// Walk `text`, calling `visit` for every reference. When `visit` returns
/// `Some(new)`, the reference is replaced in the returned string.
fn scan(text: &str, mut visit: impl FnMut(u64) -> Option<u64>) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                // '' inside a string is an escaped quote; toggling twice
                // keeps us inside.
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\'' {
                        if bytes.get(i + 1) == Some(&b'\'') {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 2;
            }
            b'#' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end > start {
                    if let Ok(id) = text[start..end].parse::<u64>() {
                        if let Some(new_id) = visit(id) {
                            out.push_str(&text[copied..start]);
                            out.push_str(&new_id.to_string());
                            copied = end;
                        }
                    }
                }
                i = end;
            }
            _ => i += 1,
        }
    }

    out.push_str(&text[copied.min(text.len())..]);
    out
}
