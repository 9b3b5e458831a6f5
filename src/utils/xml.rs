//! Escaping and parsing for the XML-like structure tags of vertical files.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};

/// Escape a value for use inside a double-quoted attribute.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            c => out.push(c),
        }
    }
    out
}

/// Characters XML 1.0 does not allow in text.
pub fn is_xml_invalid(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}')
}

/// A structural line is a whole tag: `<` ... `>` with no tab. Token lines
/// whose form starts with `<` always carry tabs.
fn is_structural(line: &str) -> bool {
    line.starts_with('<') && line.trim_end().ends_with('>') && !line.contains('\t')
}

/// Name of the opening tag on a line, e.g. `doc` for `<doc id="1">`.
/// Closing tags and non-tag lines yield `None`.
pub fn open_tag_name(line: &str) -> Option<&str> {
    if !is_structural(line) {
        return None;
    }
    let rest = line.strip_prefix('<')?;
    if rest.starts_with('/') {
        return None;
    }
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    let name = &rest[..end];
    (!name.is_empty()).then_some(name)
}

/// Name of the closing tag on a line, e.g. `docx` for `</docx>`.
pub fn close_tag_name(line: &str) -> Option<&str> {
    if !is_structural(line) {
        return None;
    }
    let name = line.strip_prefix("</")?.trim_end().strip_suffix('>')?.trim();
    (!name.is_empty()).then_some(name)
}

/// Parse the attributes of a single opening tag, in source order.
pub fn parse_tag_attrs(line: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(line.trim());
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                let mut attrs = Vec::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr.unescape_value()?.into_owned();
                    attrs.push((key, value));
                }
                return Ok(attrs);
            }
            Event::Eof => {
                return Err(Error::Verify(format!("no opening tag in {:?}", line)));
            }
            _ => {}
        }
    }
}

/// Render an opening tag: `<name k="v" k2="v2">`.
pub fn render_tag(name: &str, attrs: &[(String, String)]) -> String {
    let mut out = format!("<{}", name);
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_attr() {
        assert_eq!(escape_attr("A & B"), "A &amp; B");
        assert_eq!(escape_attr("say \"hi\""), "say &quot;hi&quot;");
        assert_eq!(escape_attr("<b>\n"), "&lt;b&gt;&#10;");
        assert_eq!(escape_attr("plain"), "plain");
    }

    #[test]
    fn test_open_tag_name() {
        assert_eq!(open_tag_name("<doc id=\"1\">"), Some("doc"));
        assert_eq!(open_tag_name("<docx ref=\"1\">"), Some("docx"));
        assert_eq!(open_tag_name("<s>"), Some("s"));
        assert_eq!(open_tag_name("</s>"), None);
        assert_eq!(open_tag_name("word\tNN\tword-n"), None);
        assert_eq!(open_tag_name("<\tSYM\t<-x"), None);
        assert_eq!(open_tag_name("<doc\tNN\t<doc-n"), None);
        assert_eq!(open_tag_name("<s\tSYM\t<s-x"), None);
        assert_eq!(open_tag_name("<doc id=\"1\""), None);
    }

    #[test]
    fn test_close_tag_name() {
        assert_eq!(close_tag_name("</docx>"), Some("docx"));
        assert_eq!(close_tag_name("</s> "), Some("s"));
        assert_eq!(close_tag_name("<s>"), None);
        assert_eq!(close_tag_name("</docx\tSYM\t</docx-x"), None);
    }

    #[test]
    fn test_parse_tag_attrs() {
        let attrs = parse_tag_attrs("<s id=\"5\" lang=\"es\">").unwrap();
        assert_eq!(
            attrs,
            vec![
                ("id".to_string(), "5".to_string()),
                ("lang".to_string(), "es".to_string())
            ]
        );

        let attrs = parse_tag_attrs("<doc id=\"42\" title=\"A &amp; B\" >").unwrap();
        assert_eq!(attrs[1].1, "A & B");
    }

    #[test]
    fn test_render_round_trips_through_parser() {
        let attrs = vec![
            ("id".to_string(), "1".to_string()),
            ("title".to_string(), "x \"y\" & <z>".to_string()),
        ];
        let tag = render_tag("doc", &attrs);
        assert_eq!(parse_tag_attrs(&tag).unwrap(), attrs);
    }

    #[test]
    fn test_invalid_chars() {
        assert!(is_xml_invalid('\u{b}'));
        assert!(is_xml_invalid('\u{1e}'));
        assert!(!is_xml_invalid('\n'));
        assert!(!is_xml_invalid('é'));
    }
}
