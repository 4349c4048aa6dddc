use std::borrow::Cow;

/// Elements whose whole body is dropped from item descriptions.
const STRIPPED_ELEMENTS: [&str; 5] = ["script", "style", "iframe", "object", "embed"];

/// Removes terminal control characters and ANSI escape sequences.
///
/// Tab, newline and carriage return are kept. CSI (`ESC [ ... final`) and OSC
/// (`ESC ] ... BEL|ST`) sequences are removed as a unit so no parameter bytes
/// leak into the output. Returns `Cow::Borrowed` when nothing needs stripping.
///
/// ```
/// use feedsift::util::strip_control_chars;
///
/// assert_eq!(strip_control_chars("plain"), "plain");
/// assert_eq!(strip_control_chars("red\x1b[31m text"), "red text");
/// ```
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let needs_strip = s
        .chars()
        .any(|c| c == '\x7f' || (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r')));
    if !needs_strip {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                Some('[') => {
                    chars.next();
                    // parameter and intermediate bytes up to the final byte
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\x07' {
                            break;
                        }
                        if c == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            '\t' | '\n' | '\r' => out.push(c),
            c if c == '\x7f' || c.is_ascii_control() => {}
            c => out.push(c),
        }
    }

    Cow::Owned(out)
}

/// Collapses runs of whitespace into single spaces and trims both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Escapes `<`, `>`, `&`, `'` and `"` for inclusion in markup.
pub fn escape_html(s: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(s)
}

/// Cleans an HTML fragment for storage as an item description.
///
/// Drops active content (`<script>`, `<style>`, `<iframe>`, `<object>`,
/// `<embed>` with their bodies) and control characters. Everything else is
/// kept verbatim; rendering is the viewer's concern.
pub fn sanitize_html(html: &str) -> String {
    let mut out = strip_control_chars(html).into_owned();
    for tag in STRIPPED_ELEMENTS {
        out = remove_element(&out, tag);
    }
    out.trim().to_owned()
}

/// Removes every `<tag ...>...</tag>` block (ASCII case-insensitive).
///
/// An unterminated block is removed up to the end of its opening tag only.
fn remove_element(html: &str, tag: &str) -> String {
    // ASCII lowercasing keeps byte offsets identical to the original
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}");

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(rel) = lower[pos..].find(&open) {
        let start = pos + rel;
        // `<scripts>` or `<styled>` are not the element we are looking for
        let after = lower.as_bytes().get(start + open.len()).copied();
        if matches!(after, Some(b) if b.is_ascii_alphanumeric() || b == b'-') {
            out.push_str(&html[pos..start + open.len()]);
            pos = start + open.len();
            continue;
        }

        out.push_str(&html[pos..start]);

        let end = match lower[start..].find(&close) {
            Some(close_rel) => {
                let close_start = start + close_rel;
                lower[close_start..]
                    .find('>')
                    .map(|gt| close_start + gt + 1)
                    .unwrap_or(html.len())
            }
            None => lower[start..]
                .find('>')
                .map(|gt| start + gt + 1)
                .unwrap_or(html.len()),
        };
        pos = end;
    }

    out.push_str(&html[pos..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_control_chars_borrows_clean_input() {
        assert!(matches!(strip_control_chars("clean\ttext\n"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_control_chars_removes_csi_and_osc() {
        assert_eq!(strip_control_chars("a\x1b[1;31mb"), "ab");
        assert_eq!(strip_control_chars("a\x1b]0;title\x07b"), "ab");
        assert_eq!(strip_control_chars("a\x1b]0;title\x1b\\b"), "ab");
        assert_eq!(strip_control_chars("bell\x07 del\x7f"), "bell del");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_sanitize_removes_script_blocks() {
        let html = "<p>Hi</p><SCRIPT type=\"text/javascript\">alert(1)</script><p>there</p>";
        assert_eq!(sanitize_html(html), "<p>Hi</p><p>there</p>");
    }

    #[test]
    fn test_sanitize_keeps_lookalike_tags() {
        let html = "<styled>kept</styled><style>p{}</style>";
        assert_eq!(sanitize_html(html), "<styled>kept</styled>");
    }

    #[test]
    fn test_sanitize_unterminated_block() {
        let html = "<p>a</p><iframe src=\"x\"><p>b</p>";
        assert_eq!(sanitize_html(html), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_sanitize_preserves_non_ascii() {
        let html = "<p>İstanbul café</p><script>x</script>";
        assert_eq!(sanitize_html(html), "<p>İstanbul café</p>");
    }
}
