//! Line tokenizer for the server's tag markup
//!
//! A line is split into text runs and tags. Tag names and attribute names are
//! lower-cased; text and attribute values have entities decoded. Anything
//! that does not parse as a tag is returned as [`Node::Malformed`] with its
//! raw text so the caller can keep it in the transcript.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Text(String),
    Open(Tag),
    Close(String),
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tag {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub self_closing: bool,
    pub raw: String,
}

impl Tag {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

pub(crate) fn tokenize(line: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut text = String::new();
    let mut rest = line;

    while let Some(start) = rest.find('<') {
        text.push_str(&rest[..start]);
        let after = &rest[start..];

        let Some(end) = find_tag_end(after) else {
            flush_text(&mut text, &mut nodes);
            nodes.push(Node::Malformed(after.to_string()));
            return nodes;
        };

        let raw = &after[..=end];
        flush_text(&mut text, &mut nodes);
        nodes.push(parse_tag(raw).unwrap_or_else(|| Node::Malformed(raw.to_string())));
        rest = &after[end + 1..];
    }

    text.push_str(rest);
    flush_text(&mut text, &mut nodes);
    nodes
}

fn flush_text(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.is_empty() {
        nodes.push(Node::Text(decode_entities(text)));
        text.clear();
    }
}

/// Byte index of the `>` closing the tag that starts at `s[0]`, skipping
/// over quoted attribute values
fn find_tag_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices().skip(1) {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '>' => return Some(i),
                '<' => return None,
                _ => {}
            },
        }
    }
    None
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')
}

fn parse_tag(raw: &str) -> Option<Node> {
    let inner = &raw[1..raw.len() - 1];

    if let Some(name) = inner.strip_prefix('/') {
        let name = name.trim();
        if name.is_empty() || !name.chars().all(is_name_char) {
            return None;
        }
        return Some(Node::Close(name.to_ascii_lowercase()));
    }

    let (body, self_closing) = match inner.trim_end().strip_suffix('/') {
        Some(body) => (body, true),
        None => (inner, false),
    };

    let name_len = body
        .char_indices()
        .find(|(_, c)| !is_name_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    if name_len == 0 || !body.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }

    let name = body[..name_len].to_ascii_lowercase();
    let attrs = parse_attrs(&body[name_len..])?;

    Some(Node::Open(Tag {
        name,
        attrs,
        self_closing,
        raw: raw.to_string(),
    }))
}

fn parse_attrs(mut s: &str) -> Option<Vec<(String, String)>> {
    let mut attrs = Vec::new();

    loop {
        let trimmed = s.trim_start();
        if trimmed.is_empty() {
            return Some(attrs);
        }
        // Attributes must be separated from the tag name and each other
        if trimmed.len() == s.len() && !attrs.is_empty() {
            return None;
        }
        s = trimmed;

        let key_len = s
            .char_indices()
            .find(|(_, c)| !is_name_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        if key_len == 0 {
            return None;
        }
        let key = s[..key_len].to_ascii_lowercase();
        s = s[key_len..].trim_start();

        let Some(after_eq) = s.strip_prefix('=') else {
            attrs.push((key, String::new()));
            continue;
        };
        s = after_eq.trim_start();

        let value;
        match s.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let close = s[1..].find(q)?;
                value = decode_entities(&s[1..=close]);
                s = &s[close + 2..];
            }
            Some(_) => {
                let end = s.find(char::is_whitespace).unwrap_or(s.len());
                value = decode_entities(&s[..end]);
                s = &s[end..];
            }
            None => return None,
        }
        attrs.push((key, value));
    }
}

pub(crate) fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let decoded = candidate.find(';').and_then(|semi| {
            let entity = &candidate[1..semi];
            let c = match entity {
                "gt" => Some('>'),
                "lt" => Some('<'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix('#')
                    .and_then(|n| n.parse::<u32>().ok())
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(name: &str, attrs: &[(&str, &str)], self_closing: bool, raw: &str) -> Node {
        Node::Open(Tag {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            self_closing,
            raw: raw.to_string(),
        })
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            tokenize("You wave."),
            vec![Node::Text("You wave.".to_string())]
        );
    }

    #[test]
    fn test_empty_line_has_no_nodes() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_self_closing_with_mixed_quotes() {
        let raw = r#"<progressBar id='health' value="95"/>"#;
        assert_eq!(
            tokenize(raw),
            vec![open("progressbar", &[("id", "health"), ("value", "95")], true, raw)]
        );
    }

    #[test]
    fn test_open_text_close() {
        assert_eq!(
            tokenize("<prompt time=\"12\">&gt;</prompt>"),
            vec![
                open("prompt", &[("time", "12")], false, "<prompt time=\"12\">"),
                Node::Text(">".to_string()),
                Node::Close("prompt".to_string()),
            ]
        );
    }

    #[test]
    fn test_gt_inside_quotes_does_not_end_tag() {
        let raw = "<a title='x>y'>";
        assert_eq!(tokenize(raw), vec![open("a", &[("title", "x>y")], false, raw)]);
    }

    #[test]
    fn test_unterminated_tag_is_malformed() {
        assert_eq!(
            tokenize("hello <pushStream id='thou"),
            vec![
                Node::Text("hello ".to_string()),
                Node::Malformed("<pushStream id='thou".to_string()),
            ]
        );
    }

    #[test]
    fn test_bad_tag_name_is_malformed() {
        assert_eq!(
            tokenize("I <3 you>"),
            vec![
                Node::Text("I ".to_string()),
                Node::Malformed("<3 you>".to_string()),
            ]
        );
    }

    #[test]
    fn test_unclosed_quote_is_malformed() {
        assert_eq!(
            tokenize("<a href='oops>"),
            vec![Node::Malformed("<a href='oops>".to_string())]
        );
    }

    #[test]
    fn test_boolean_attribute() {
        let raw = "<d cmd>";
        assert_eq!(tokenize(raw), vec![open("d", &[("cmd", "")], false, raw)]);
    }

    #[test]
    fn test_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &amp; &#65;"), "a <b> & A");
        assert_eq!(decode_entities("fish & chips"), "fish & chips");
        assert_eq!(decode_entities("&bogus;"), "&bogus;");
    }
}
