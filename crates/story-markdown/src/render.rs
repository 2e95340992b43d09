use std::borrow::Cow;

use crate::content::Content;

/// Alt label written for every image reference.
pub const DEFAULT_IMAGE_ALT: &str = "OBS Image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub image_alt: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            image_alt: DEFAULT_IMAGE_ALT.to_string(),
        }
    }
}

/// Render a structured document back into the narrative dialect.
pub fn serialize(content: &Content) -> String {
    serialize_with(content, &RenderOptions::default())
}

/// Render with an explicit image alt label.
///
/// Heading style, alt text and footnote placement are normalised, so the output
/// only matches the text a document was parsed from when that text was already
/// in this shape. Text is escaped so that parsing the output reproduces the same
/// title, sections and footnote.
pub fn serialize_with(content: &Content, options: &RenderOptions) -> String {
    let mut markdown = format!("# {}\n\n", escape_title(&content.title));

    for section in &content.sections {
        if let Some(url) = section.image_url.as_deref() {
            markdown.push_str(&format!(
                "![{}]({})\n\n",
                options.image_alt,
                link_destination(url)
            ));
        }
        if section.has_text() {
            markdown.push_str(&escape_text(&section.text));
            markdown.push_str("\n\n");
        }
    }

    if !content.footnotes.is_empty() {
        markdown.push_str(&format!("_{}_\n", escape_text(&content.footnotes)));
    }

    markdown
}

fn link_destination(url: &str) -> Cow<'_, str> {
    let needs_brackets = url
        .chars()
        .any(|ch| ch.is_whitespace() || matches!(ch, '(' | ')' | '<' | '>'));
    if needs_brackets {
        Cow::Owned(format!("<{}>", url.replace('<', "%3C").replace('>', "%3E")))
    } else {
        Cow::Borrowed(url)
    }
}

// Spaces the parser would strip at either end of a line.
const SPACE_ENTITY: &str = "&#32;";

// A trailing run of `#` would be read as the closing sequence of the heading.
fn escape_title(title: &str) -> String {
    let mut escaped = String::with_capacity(title.len());
    escape_inline(title, &mut escaped);
    escaped.replace('#', "\\#")
}

/// Backslash-escape everything in `text` that would otherwise parse as
/// Markdown syntax, line by line.
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 8);
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            escaped.push('\n');
        }

        let body = line.trim_start_matches(' ');
        if body.is_empty() {
            escaped.push_str(&SPACE_ENTITY.repeat(line.len()));
            continue;
        }
        let indent = line.len() - body.len();
        if indent > 0 {
            escaped.push_str(SPACE_ENTITY);
            escaped.push_str(&line[1..indent]);
        }

        let core = body.trim_end_matches(' ');
        let rest = escape_line_start(core, &mut escaped);
        escape_inline(rest, &mut escaped);

        let trailing = body.len() - core.len();
        if trailing > 0 {
            escaped.push_str(&body[core.len()..body.len() - 1]);
            escaped.push_str(SPACE_ENTITY);
        }
    }
    escaped
}

/// Write the escaped form of a block marker at the start of `line` and return
/// what is left of the line.
fn escape_line_start<'a>(line: &'a str, out: &mut String) -> &'a str {
    let mut chars = line.chars();
    match chars.next() {
        Some(marker @ ('#' | '>' | '-' | '+' | '=' | '~')) => {
            out.push('\\');
            out.push(marker);
            chars.as_str()
        }
        Some(first) if first.is_ascii_digit() => {
            let digits = line.len() - line.trim_start_matches(|ch: char| ch.is_ascii_digit()).len();
            match line[digits..].chars().next() {
                Some(delimiter @ ('.' | ')')) => {
                    out.push_str(&line[..digits]);
                    out.push('\\');
                    out.push(delimiter);
                    &line[digits + 1..]
                }
                _ => line,
            }
        }
        _ => line,
    }
}

fn escape_inline(text: &str, out: &mut String) {
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' | '`' | '*' | '_' | '[' | ']' | '<' => {
                out.push('\\');
                out.push(ch);
            }
            '&' if chars
                .peek()
                .is_some_and(|next| next.is_ascii_alphanumeric() || *next == '#') =>
            {
                out.push_str("\\&");
            }
            _ => out.push(ch),
        }
    }
}
