//! Markdown rendering for `.md` sites and pack entries.

use hostweb_common::VERSION;
use pulldown_cmark::{html, Options, Parser};

/// Stylesheet linked from generated pages.
pub const STYLESHEET: &str = "/_hostweb/hostweb.css";

pub fn to_html(markdown: &str) -> String {
    let options =
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(markdown, options);
    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, parser);
    output
}

/// Wraps rendered markdown in a complete HTML document titled `title`.
pub fn render_document(title: &str, markdown: &str) -> String {
    format!(
        r#"<!-- Generated by HostWeb v{version} -->
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <link rel="stylesheet" href="{stylesheet}">
</head>
<body class="hostweb-markdown">
{body}
</body>
</html>
"#,
        version = VERSION,
        title = escape_html(title),
        stylesheet = STYLESHEET,
        body = to_html(markdown),
    )
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
