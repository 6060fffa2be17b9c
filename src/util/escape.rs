//! Escaping helpers for values spliced into HTML attributes and inline scripts.

/// Escape `&`, `"`, `'`, `<` and `>` using HTML5 named entities.
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Escape a value for use inside a single-quoted JavaScript string literal.
pub fn escape_js_single_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            // keep `</script>` from closing the surrounding tag
            '<' if chars.peek() == Some(&'/') => escaped.push_str("<\\"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
