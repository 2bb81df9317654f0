//! Markdown helpers: titles, front-matter meta, descriptions, HTML rendering

use pulldown_cmark::{html, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use std::collections::BTreeMap;

/// Title used when a note has no heading and no meta title
pub const UNTITLED: &str = "Untitled";

/// Maximum length of a generated description, in characters
pub const DESCRIPTION_MAX_CHARS: usize = 150;

/// Front-matter metadata of a note
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub robots: Option<String>,
    pub ga: Option<String>,
    pub disqus: Option<String>,
    pub tags: Vec<String>,
    /// Keys not recognised above, kept for templates
    pub extra: BTreeMap<String, String>,
}

/// Split a leading `---` front-matter block from the markdown body
///
/// Returns the raw meta text (without fences) and the remaining markdown.
/// Content without a closed front-matter block is returned untouched.
pub fn extract_meta(content: &str) -> (Option<&str>, &str) {
    let rest = match content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => return (None, content),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "---" || trimmed == "..." {
            let meta = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(meta), body);
        }
        offset += line.len();
    }

    (None, content)
}

/// Parse `key: value` lines of a front-matter block
pub fn parse_meta(meta: Option<&str>) -> NoteMeta {
    let mut parsed = NoteMeta::default();
    let Some(meta) = meta else {
        return parsed;
    };

    for line in meta.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = unquote(value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        match key {
            "title" => parsed.title = Some(value.to_string()),
            "description" => parsed.description = Some(value.to_string()),
            "image" => parsed.image = Some(value.to_string()),
            "robots" => parsed.robots = Some(value.to_string()),
            "GA" => parsed.ga = Some(value.to_string()),
            "disqus" => parsed.disqus = Some(value.to_string()),
            "tags" => {
                parsed.tags = value
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .split(',')
                    .map(|t| unquote(t.trim()).to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
            }
            other => {
                parsed.extra.insert(other.to_string(), value.to_string());
            }
        }
    }

    parsed
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Derive a note title from its content
///
/// Meta title first, then the first level-one heading, else [`UNTITLED`].
pub fn parse_note_title(content: &str) -> String {
    let (meta, body) = extract_meta(content);
    if let Some(title) = parse_meta(meta).title {
        return title;
    }

    let mut in_h1 = false;
    let mut title = String::new();
    for event in Parser::new(body) {
        match event {
            Event::Start(Tag::Heading { level: HeadingLevel::H1, .. }) => in_h1 = true,
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                let trimmed = title.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
                in_h1 = false;
            }
            Event::Text(text) | Event::Code(text) if in_h1 => title.push_str(&text),
            _ => {}
        }
    }

    UNTITLED.to_string()
}

/// Page title shown in the browser tab
pub fn generate_web_title(title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        format!("{} - notehub", UNTITLED)
    } else {
        format!("{} - notehub", title)
    }
}

/// Plain-text description of a markdown body
pub fn generate_description(markdown: &str) -> String {
    let mut text = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => {
                if !text.is_empty() && !text.ends_with(' ') {
                    text.push(' ');
                }
                text.push_str(t.trim());
            }
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
        if text.chars().count() >= DESCRIPTION_MAX_CHARS {
            break;
        }
    }
    text.trim().chars().take(DESCRIPTION_MAX_CHARS).collect()
}

/// Render markdown to HTML
pub fn render_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
