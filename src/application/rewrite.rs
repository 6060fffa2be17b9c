//! Textual rewrites applied to a rendered landing page before it is served.
//!
//! The passes run in a fixed order: form actions, the `_redirect` hidden field,
//! button links, then the lightbox bootstrap script. Each pass is a plain regex
//! substitution over the markup; everything they do not match is left byte for byte.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::util::escape::escape_js_single_quoted;

static FORM_ACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#" action="/([\s\S]*?)""#).expect("form action pattern"));

static REDIRECT_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(<input type="hidden" name="_redirect" value)="">"#)
        .expect("redirect field pattern")
});

static BUTTON_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#" href="(?:/[^/]+)?(/button/[a-zA-Z0-9_^\[\]\\`]{32})""#)
        .expect("button link pattern")
});

const HEAD_CLOSE: &str = "</head>";

/// Values spliced into the page.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    pub endpoint: &'a str,
    pub export_hash: &'a str,
    pub tid: &'a str,
    /// Canonical URL of the visitor request, already HTML-escaped.
    pub actual_link: &'a str,
}

impl RewriteContext<'_> {
    fn tracking_query(&self) -> String {
        format!("export_hash={}&tid={}", self.export_hash, self.tid)
    }
}

/// Run every pass over `content`.
pub fn rewrite_landing(content: &str, ctx: &RewriteContext<'_>) -> String {
    let content = rewrite_form_actions(content, ctx);
    let content = fill_redirect_field(&content, ctx);
    let content = rewrite_button_links(&content, ctx);
    inject_lightbox_handler(&content, ctx)
}

/// Point root-relative form actions at the export API.
pub fn rewrite_form_actions(content: &str, ctx: &RewriteContext<'_>) -> String {
    let query = ctx.tracking_query();
    FORM_ACTION
        .replace_all(content, |caps: &Captures<'_>| {
            format!(r#" action="{}/{}?{query}""#, ctx.endpoint, &caps[1])
        })
        .into_owned()
}

/// Fill an empty `_redirect` hidden field with the canonical link; set values stay.
pub fn fill_redirect_field(content: &str, ctx: &RewriteContext<'_>) -> String {
    REDIRECT_FIELD
        .replace_all(content, |caps: &Captures<'_>| {
            format!(r#"{}="{}">"#, &caps[1], ctx.actual_link)
        })
        .into_owned()
}

/// Route `/button/<token>` links (optionally under one path prefix) through the export API.
pub fn rewrite_button_links(content: &str, ctx: &RewriteContext<'_>) -> String {
    let query = ctx.tracking_query();
    BUTTON_LINK
        .replace_all(content, |caps: &Captures<'_>| {
            format!(r#" href="{}{}?{query}""#, ctx.endpoint, &caps[1])
        })
        .into_owned()
}

/// Insert the lightbox bootstrap before the first `</head>`; pages without one are returned as-is.
pub fn inject_lightbox_handler(content: &str, ctx: &RewriteContext<'_>) -> String {
    let Some(position) = content.find(HEAD_CLOSE) else {
        return content.to_string();
    };

    let script = lightbox_script(ctx);
    let mut html = String::with_capacity(content.len() + script.len());
    html.push_str(&content[..position]);
    html.push_str(&script);
    html.push_str(&content[position..]);
    html
}

fn lightbox_script(ctx: &RewriteContext<'_>) -> String {
    format!(
        r#"<script>
    if (typeof Lightbox !== 'undefined') {{
        Lightbox.init({{
            exportUrl: '{endpoint}',
            hash: '{hash}',
            tid: '{tid}',
            redirectUrl: '{redirect}'
        }});
        Lightbox.register();
    }}
</script>"#,
        endpoint = escape_js_single_quoted(ctx.endpoint),
        hash = escape_js_single_quoted(ctx.export_hash),
        tid = escape_js_single_quoted(ctx.tid),
        redirect = escape_js_single_quoted(ctx.actual_link),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef";

    fn ctx() -> RewriteContext<'static> {
        RewriteContext {
            endpoint: "E",
            export_hash: "H",
            tid: "T",
            actual_link: "https://shop.test/offer?a=1&amp;b=2",
        }
    }

    #[test]
    fn form_action_points_at_export_api() {
        assert_eq!(
            rewrite_form_actions(r#"<form action="/submit">"#, &ctx()),
            r#"<form action="E/submit?export_hash=H&tid=T">"#
        );
    }

    #[test]
    fn absolute_form_actions_are_left_alone() {
        let html = r#"<form action="https://elsewhere.test/post">"#;
        assert_eq!(rewrite_form_actions(html, &ctx()), html);
    }

    #[test]
    fn every_form_action_is_rewritten() {
        let html = r#"<form action="/a"></form><form method="post" action="/b/c"></form>"#;
        assert_eq!(
            rewrite_form_actions(html, &ctx()),
            r#"<form action="E/a?export_hash=H&tid=T"></form><form method="post" action="E/b/c?export_hash=H&tid=T"></form>"#
        );
    }

    #[test]
    fn empty_redirect_field_receives_actual_link() {
        assert_eq!(
            fill_redirect_field(r#"<input type="hidden" name="_redirect" value="">"#, &ctx()),
            r#"<input type="hidden" name="_redirect" value="https://shop.test/offer?a=1&amp;b=2">"#
        );
    }

    #[test]
    fn populated_redirect_field_is_kept() {
        let html = r#"<input type="hidden" name="_redirect" value="https://kept.example">"#;
        assert_eq!(fill_redirect_field(html, &ctx()), html);
    }

    #[test]
    fn prefixed_button_link_is_rewritten() {
        let html = format!(r#"<a href="/foo/button/{TOKEN}">Buy</a>"#);
        assert_eq!(
            rewrite_button_links(&html, &ctx()),
            format!(r#"<a href="E/button/{TOKEN}?export_hash=H&tid=T">Buy</a>"#)
        );
    }

    #[test]
    fn bare_button_link_is_rewritten() {
        let html = format!(r#"<a href="/button/{TOKEN}">Buy</a>"#);
        assert_eq!(
            rewrite_button_links(&html, &ctx()),
            format!(r#"<a href="E/button/{TOKEN}?export_hash=H&tid=T">Buy</a>"#)
        );
    }

    #[test]
    fn underscore_button_tokens_are_rewritten() {
        let token = "0123456789abcdef_123456789ABCDEF";
        let html = format!(r#"<a href="/button/{token}">Buy</a>"#);
        assert_eq!(
            rewrite_button_links(&html, &ctx()),
            format!(r#"<a href="E/button/{token}?export_hash=H&tid=T">Buy</a>"#)
        );
    }

    #[test]
    fn short_button_tokens_are_ignored() {
        let html = r#"<a href="/button/abc">Buy</a>"#;
        assert_eq!(rewrite_button_links(html, &ctx()), html);
    }

    #[test]
    fn lightbox_script_lands_before_first_head_close() {
        let html = "<html><head><title>x</title></head><body></head></body></html>";
        let rewritten = inject_lightbox_handler(html, &ctx());

        assert!(rewritten.starts_with("<html><head><title>x</title><script>"));
        assert!(rewritten.contains("Lightbox.init({"));
        assert!(rewritten.contains("exportUrl: 'E',"));
        assert!(rewritten.contains("hash: 'H',"));
        assert!(rewritten.contains("tid: 'T',"));
        assert!(rewritten.contains("redirectUrl: 'https://shop.test/offer?a=1&amp;b=2'"));
        assert!(rewritten.contains("Lightbox.register();"));
        assert_eq!(rewritten.matches("<script>").count(), 1);
        assert!(rewritten.ends_with("</script></head><body></head></body></html>"));
    }

    #[test]
    fn missing_head_close_leaves_content_unchanged() {
        let html = "<div>fragment only</div>";
        assert_eq!(inject_lightbox_handler(html, &ctx()), html);
    }

    #[test]
    fn full_pipeline_leaves_untouched_markup_verbatim() {
        let html = format!(
            concat!(
                "<!doctype html><head></head><body>",
                r#"<form action="/submit"><input type="hidden" name="_redirect" value=""></form>"#,
                r#"<a href="/button/{}">Go</a><p class="keep">text</p></body>"#
            ),
            TOKEN
        );

        let rewritten = rewrite_landing(&html, &ctx());

        assert!(rewritten.starts_with("<!doctype html><head><script>"));
        assert!(rewritten.contains(r#"action="E/submit?export_hash=H&tid=T""#));
        assert!(rewritten.contains(r#"value="https://shop.test/offer?a=1&amp;b=2">"#));
        assert!(rewritten.contains(&format!(
            r#"href="E/button/{TOKEN}?export_hash=H&tid=T""#
        )));
        assert!(rewritten.ends_with(r#"<p class="keep">text</p></body>"#));
    }
}
