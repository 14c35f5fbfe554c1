//! Message body decoding, §4.I.
//!
//! Quoted-printable is decoded to a raw byte buffer first and only decoded
//! as text once the whole buffer is assembled — a character-by-character
//! decode would split multi-byte UTF-8 sequences emitted across adjacent
//! `=HH` triples.

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

const HTML_FALLBACK_MIN_CHARS: usize = 100;

/// Removes soft line breaks (`=CRLF`, `=LF`), decodes `=HH` triples to raw
/// bytes, and decodes the assembled buffer as UTF-8 — falling back to
/// Latin-1 only if the buffer is not valid UTF-8. WHATWG (and therefore
/// `encoding_rs`) maps the `iso-8859-1` label onto windows-1252, which is a
/// superset of Latin-1 over the byte range mail bodies actually use.
pub fn decode_quoted_printable_utf8(input: &str) -> String {
    let stripped = input.replace("=\r\n", "").replace("=\n", "");
    let bytes = stripped.as_bytes();

    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    match String::from_utf8(out.clone()) {
        Ok(s) => s,
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&out);
            decoded.into_owned()
        }
    }
}

/// Locates a MIME part by plain substring search for its `Content-Type`
/// marker rather than a single regex, to avoid catastrophic backtracking
/// on adversarial input (§4.I.4). Stops at the next `--` MIME boundary.
pub fn extract_mime_part(raw: &str, content_type_marker: &str) -> Option<String> {
    let marker_idx = raw.find(content_type_marker)?;
    let after_marker = &raw[marker_idx..];

    let (sep_offset, sep_len) = after_marker
        .find("\r\n\r\n")
        .map(|o| (o, 4))
        .or_else(|| after_marker.find("\n\n").map(|o| (o, 2)))?;

    let body_start = marker_idx + sep_offset + sep_len;
    let body = &raw[body_start..];
    let end = body.find("\n--").unwrap_or(body.len());
    Some(body[..end].to_string())
}

/// Prefers HTML, converted to a Markdown-like text; falls back to plain
/// text if no HTML part is present or the conversion yields fewer than
/// [`HTML_FALLBACK_MIN_CHARS`] characters (§4.I.2).
pub fn select_body(plain_text: Option<&str>, html: Option<&str>) -> String {
    if let Some(html) = html {
        let converted = html_to_markdown(html);
        if converted.trim().chars().count() >= HTML_FALLBACK_MIN_CHARS {
            return converted;
        }
    }
    plain_text.unwrap_or_default().to_string()
}

/// Structural HTML→Markdown-like conversion (§4.I.1): headings to ATX,
/// emphasis to asterisks/underscores, lists to bullets/ordered markers,
/// strikethrough, links preserved as `[text](href)`. Style/script/image
/// content is dropped; layout tables are unwrapped to their inner text.
pub fn html_to_markdown(html: &str) -> String {
    let opts = ParseOpts::default();
    let dom = match parse_document(RcDom::default(), opts).from_utf8().read_from(&mut html.as_bytes()) {
        Ok(dom) => dom,
        Err(_) => return String::new(),
    };

    let mut out = String::new();
    render(&dom.document, &mut out, &ListContext::None);
    normalize_blank_lines(&out)
}

#[derive(Clone, Copy)]
enum ListContext {
    None,
    Unordered,
    Ordered(usize),
}

fn render(handle: &Handle, out: &mut String, list_ctx: &ListContext) {
    match &handle.data {
        NodeData::Text { contents } => {
            out.push_str(&contents.borrow());
        }
        NodeData::Element { name, attrs, .. } => {
            let tag = name.local.as_ref();
            match tag {
                "script" | "style" | "img" | "head" => return,
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    let level = tag[1..].parse::<usize>().unwrap_or(1);
                    out.push('\n');
                    out.push_str(&"#".repeat(level));
                    out.push(' ');
                    render_children(handle, out, &ListContext::None);
                    out.push('\n');
                }
                "strong" | "b" => {
                    out.push_str("**");
                    render_children(handle, out, list_ctx);
                    out.push_str("**");
                }
                "em" | "i" => {
                    out.push('*');
                    render_children(handle, out, list_ctx);
                    out.push('*');
                }
                "s" | "strike" | "del" => {
                    out.push_str("~~");
                    render_children(handle, out, list_ctx);
                    out.push_str("~~");
                }
                "br" => out.push('\n'),
                "p" | "div" => {
                    out.push('\n');
                    render_children(handle, out, list_ctx);
                    out.push('\n');
                }
                "a" => {
                    let href = attrs
                        .borrow()
                        .iter()
                        .find(|a| a.name.local.as_ref() == "href")
                        .map(|a| a.value.to_string())
                        .unwrap_or_default();
                    out.push('[');
                    render_children(handle, out, list_ctx);
                    out.push_str("](");
                    out.push_str(&href);
                    out.push(')');
                }
                "ul" => {
                    out.push('\n');
                    render_children(handle, out, &ListContext::Unordered);
                }
                "ol" => {
                    out.push('\n');
                    render_children(handle, out, &ListContext::Ordered(0));
                }
                "li" => {
                    out.push('\n');
                    match list_ctx {
                        ListContext::Ordered(n) => out.push_str(&format!("{}. ", n + 1)),
                        _ => out.push_str("- "),
                    }
                    render_children(handle, out, &ListContext::None);
                }
                // Layout tables: unwrap to inner text, dropping the grid structure.
                "table" | "tbody" | "thead" | "tr" | "td" | "th" => {
                    render_children(handle, out, list_ctx);
                    if matches!(tag, "tr") {
                        out.push('\n');
                    } else if matches!(tag, "td" | "th") {
                        out.push(' ');
                    }
                }
                _ => render_children(handle, out, list_ctx),
            }
        }
        NodeData::Document => render_children(handle, out, list_ctx),
        _ => {}
    }
}

fn render_children(handle: &Handle, out: &mut String, list_ctx: &ListContext) {
    let children = handle.children.borrow();
    let mut ordinal = 0usize;
    for child in children.iter() {
        let ctx = match list_ctx {
            ListContext::Ordered(_) => {
                let this = ListContext::Ordered(ordinal);
                ordinal += 1;
                this
            }
            other => *other,
        };
        render(child, out, &ctx);
    }
}

fn normalize_blank_lines(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut blank_run = 0;
    for line in s.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(trimmed);
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_printable_reassembles_multibyte_utf8() {
        assert_eq!(decode_quoted_printable_utf8("caf=C3=A9"), "café");
        assert_eq!(decode_quoted_printable_utf8("=E2=86=92"), "→");
    }

    #[test]
    fn quoted_printable_strips_soft_line_breaks() {
        assert_eq!(decode_quoted_printable_utf8("hello=\r\nworld"), "helloworld");
        assert_eq!(decode_quoted_printable_utf8("hello=\nworld"), "helloworld");
    }

    #[test]
    fn heading_converts_to_atx() {
        let md = html_to_markdown("<h1>Title</h1><p>body text</p>");
        assert!(md.contains("# Title"));
        assert!(md.contains("body text"));
    }

    #[test]
    fn link_preserved_with_href() {
        let md = html_to_markdown("<a href=\"https://example.com\">click</a>");
        assert!(md.contains("[click](https://example.com)"));
    }

    #[test]
    fn list_items_become_bullets() {
        let md = html_to_markdown("<ul><li>one</li><li>two</li></ul>");
        assert!(md.contains("- one"));
        assert!(md.contains("- two"));
    }

    #[test]
    fn script_and_image_content_dropped() {
        let md = html_to_markdown("<p>keep</p><script>evil()</script><img src=\"x.png\">");
        assert!(md.contains("keep"));
        assert!(!md.contains("evil"));
    }

    #[test]
    fn extract_mime_part_stops_at_boundary() {
        let raw = "Content-Type: text/plain\r\n\r\nhello world\r\n--boundary--";
        let part = extract_mime_part(raw, "Content-Type: text/plain").unwrap();
        assert_eq!(part.trim(), "hello world");
    }

    #[test]
    fn select_body_falls_back_to_plain_text_on_short_html() {
        let body = select_body(Some("plain fallback text"), Some("<p>hi</p>"));
        assert_eq!(body, "plain fallback text");
    }
}
