//! `hwa.<name>(...)` rewriting.
//!
//! Browser code calls server functions as if they were local:
//!
//! ```js
//! hwa.add(1, 2, function (result, error) { console.log(result); });
//! ```
//!
//! Served scripts are rewritten so each such call becomes a `fetch` POST to
//! `/_hwapi/<name>` carrying the positional arguments as a JSON array.
//!
//! # Grammar
//!
//! - `hwa` must not continue an identifier or a member chain (`x.hwa.f()` and
//!   `myhwa.f()` are left alone).
//! - The argument list ends at its matching `)`. Brackets and braces nest.
//!   String literals, regular expression literals and comments are skipped
//!   while scanning. Arguments are split on top-level commas.
//! - A `/` opens a regular expression where an expression may start: at the
//!   beginning of the input, after an operator or opening punctuation, or
//!   after a keyword such as `return`. Elsewhere it is division.
//! - The last argument is the callback when it starts with `function` or
//!   contains `=>`.
//! - Positional arguments may not contain parentheses. Such a call is left
//!   untouched.
//!
//! A rewritten call is a `void function () { ... }()` expression. It starts
//! with a keyword, so a preceding line without a semicolon is never continued
//! into a call of its result.

use hostweb_common::{HostwebError, Result};
use lol_html::html_content::ContentType;
use lol_html::{rewrite_str, text, RewriteStrSettings};

/// Prefix of the dispatch endpoint.
pub const API_PREFIX: &str = "/_hwapi/";

const CALL_TOKEN: &str = "hwa";

/// Keywords after which a `/` starts a regular expression.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

#[derive(Debug, PartialEq, Eq)]
struct RpcCall<'a> {
    name: &'a str,
    args: Vec<&'a str>,
    callback: Option<&'a str>,
}

enum Scan<'a> {
    /// A well-formed call ending at the given byte offset.
    Call(RpcCall<'a>, usize),
    /// Looks like a call but breaks the grammar; skip to the offset verbatim.
    Skip(usize),
    NotACall,
}

/// Rewrites every `hwa.<name>(...)` call in `source`.
pub fn transform_script(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = skip_literal_or_comment(bytes, i) {
            i = end;
            continue;
        }
        if bytes[i] == b'h' && starts_call_token(bytes, i) {
            match scan_call(source, i) {
                Scan::Call(call, end) => {
                    out.push_str(&source[copied..i]);
                    out.push_str(&render_call(&call));
                    copied = end;
                    i = end;
                    continue;
                }
                Scan::Skip(end) => {
                    i = end;
                    continue;
                }
                Scan::NotACall => {}
            }
        }
        i += 1;
    }

    out.push_str(&source[copied..]);
    out
}

/// Applies [`transform_script`] to the contents of every `<script>` element.
pub fn transform_html(html: &str) -> Result<String> {
    let mut buffer = String::new();
    let handlers = vec![text!("script", move |chunk| {
        buffer.push_str(chunk.as_str());
        if chunk.last_in_text_node() {
            let rewritten = transform_script(&buffer);
            chunk.replace(&rewritten, ContentType::Html);
            buffer.clear();
        } else {
            chunk.remove();
        }
        Ok(())
    })];

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::new()
        },
    )
    .map_err(|e| HostwebError::Rewrite(e.to_string()))
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn starts_call_token(bytes: &[u8], i: usize) -> bool {
    if !bytes[i..].starts_with(CALL_TOKEN.as_bytes()) {
        return false;
    }
    if i == 0 {
        return true;
    }
    let before = bytes[i - 1];
    !is_ident_byte(before) && before != b'.'
}

fn scan_call(source: &str, start: usize) -> Scan<'_> {
    let bytes = source.as_bytes();
    let mut j = start + CALL_TOKEN.len();
    if bytes.get(j) != Some(&b'.') {
        return Scan::NotACall;
    }
    j += 1;

    let name_start = j;
    match bytes.get(j) {
        Some(&b) if b.is_ascii_alphabetic() || b == b'_' || b == b'$' => {}
        _ => return Scan::NotACall,
    }
    while j < bytes.len() && is_ident_byte(bytes[j]) {
        j += 1;
    }
    let name = &source[name_start..j];

    while j < bytes.len() && bytes[j].is_ascii_whitespace() {
        j += 1;
    }
    if bytes.get(j) != Some(&b'(') {
        return Scan::NotACall;
    }
    let open = j;
    let Some(close) = matching_paren(bytes, open) else {
        tracing::debug!("Unbalanced arguments in hwa.{} call, leaving it as is", name);
        return Scan::NotACall;
    };

    let mut args = split_top_level(&source[open + 1..close]);
    let callback = match args.last() {
        Some(last) if is_callback(last) => args.pop(),
        _ => None,
    };

    if args.iter().any(|arg| arg.contains(|c| c == '(' || c == ')')) {
        tracing::debug!(
            "hwa.{} has parenthesized arguments, leaving the call as is",
            name
        );
        return Scan::Skip(close + 1);
    }

    Scan::Call(
        RpcCall {
            name,
            args,
            callback,
        },
        close + 1,
    )
}

fn is_callback(arg: &str) -> bool {
    let starts_with_function = arg
        .strip_prefix("function")
        .is_some_and(|rest| !rest.bytes().next().is_some_and(is_ident_byte));
    starts_with_function || arg.contains("=>")
}

/// Returns the end offset of a string literal, regular expression literal or
/// comment starting at `i`.
fn skip_literal_or_comment(bytes: &[u8], i: usize) -> Option<usize> {
    match bytes[i] {
        quote @ (b'"' | b'\'' | b'`') => {
            let mut j = i + 1;
            while j < bytes.len() {
                match bytes[j] {
                    b'\\' => j += 2,
                    b if b == quote => return Some(j + 1),
                    _ => j += 1,
                }
            }
            Some(bytes.len())
        }
        b'/' if bytes.get(i + 1) == Some(&b'/') => {
            let end = bytes[i..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |p| i + p);
            Some(end)
        }
        b'/' if bytes.get(i + 1) == Some(&b'*') => {
            let end = bytes[i + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map_or(bytes.len(), |p| i + 2 + p + 2);
            Some(end)
        }
        b'/' if regex_allowed(bytes, i) => skip_regex(bytes, i),
        _ => None,
    }
}

/// Whether a `/` at `i` would begin an expression rather than divide.
fn regex_allowed(bytes: &[u8], i: usize) -> bool {
    let Some(prev) = bytes[..i].iter().rposition(|b| !b.is_ascii_whitespace()) else {
        return true;
    };
    match bytes[prev] {
        b')' | b']' | b'"' | b'\'' | b'`' | b'.' => false,
        b if is_ident_byte(b) => {
            let start = bytes[..prev]
                .iter()
                .rposition(|&b| !is_ident_byte(b))
                .map_or(0, |p| p + 1);
            let word = &bytes[start..=prev];
            REGEX_KEYWORDS.iter().any(|keyword| keyword.as_bytes() == word)
        }
        _ => true,
    }
}

/// End offset of the regular expression literal opening at `i`, flags
/// included. `None` when the line ends first.
fn skip_regex(bytes: &[u8], i: usize) -> Option<usize> {
    let mut in_class = false;
    let mut j = i + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'\n' | b'\r' => return None,
            b'[' => {
                in_class = true;
                j += 1;
            }
            b']' => {
                in_class = false;
                j += 1;
            }
            b'/' if !in_class => {
                j += 1;
                while j < bytes.len() && is_ident_byte(bytes[j]) {
                    j += 1;
                }
                return Some(j);
            }
            _ => j += 1,
        }
    }
    None
}

fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        if let Some(end) = skip_literal_or_comment(bytes, i) {
            i = end;
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return (bytes[i] == b')').then_some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn split_top_level(args: &str) -> Vec<&str> {
    let bytes = args.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(end) = skip_literal_or_comment(bytes, i) {
            i = end;
            continue;
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(args[start..].trim());
    // `f()` has no arguments and `f(a, b,)` has two.
    if parts.last().is_some_and(|last| last.is_empty()) {
        parts.pop();
    }
    parts
}

fn render_call(call: &RpcCall<'_>) -> String {
    let endpoint = format!("{}{}", API_PREFIX, call.name);
    let args = call.args.join(", ");
    let (on_ok, on_err) = match call.callback {
        Some(_) => ("cb(d.result, null);", "cb(null, e);"),
        None => ("", ""),
    };
    let callback = call.callback.unwrap_or("null");
    format!(
        "void function () {{ var cb = ({callback}); \
         fetch({endpoint:?}, {{ method: \"POST\", headers: {{ \"Content-Type\": \"application/json\" }}, \
         body: JSON.stringify([{args}]) }})\
         .then(function (r) {{ if (!r.ok) {{ throw new Error(\"HWERR: \" + r.status + \" \" + r.statusText); }} return r.json(); }})\
         .then(function (d) {{ {on_ok} }}, function (e) {{ console.error(e); {on_err} }}); }}()"
    )
}
