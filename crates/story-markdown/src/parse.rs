use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag};

use crate::content::{Content, Section};

/// Parse a story written in the narrative dialect into its structured form.
///
/// Never fails: anything missing from the input comes back empty.
pub fn parse(markdown: &str) -> Content {
    let mut title: Option<String> = None;
    let mut heading: Option<TextRuns> = None;
    let mut paragraph: Option<ParagraphScan> = None;
    // Inline content of a tight list item, which has no paragraph of its own.
    let mut item: Option<ParagraphScan> = None;
    let mut sections = SectionBuilder::default();
    let mut footnotes = String::new();

    for event in Parser::new_ext(markdown, Options::empty()) {
        if let Event::Start(tag) = &event {
            if paragraph.is_none() && is_block(tag) {
                if let Some(scan) = item.take() {
                    finish_block(scan, &mut sections, &mut footnotes);
                }
            }
        }

        match event {
            Event::Start(Tag::Paragraph) => paragraph = Some(ParagraphScan::default()),
            Event::End(Tag::Paragraph) => {
                if let Some(scan) = paragraph.take() {
                    finish_block(scan, &mut sections, &mut footnotes);
                }
            }
            Event::Start(Tag::Item) => item = Some(ParagraphScan::default()),
            Event::End(Tag::Item) => {
                if let Some(scan) = item.take() {
                    finish_block(scan, &mut sections, &mut footnotes);
                }
            }
            Event::Start(Tag::Heading(HeadingLevel::H1, _, _))
                if title.is_none() && heading.is_none() =>
            {
                heading = Some(TextRuns::default());
            }
            Event::End(Tag::Heading(HeadingLevel::H1, _, _)) => {
                if let Some(runs) = heading.take() {
                    title = Some(runs.concat());
                }
            }
            event => {
                if let Some(scan) = paragraph.as_mut().or(item.as_mut()) {
                    scan.observe(event);
                } else if let Some(runs) = heading.as_mut() {
                    observe_heading(runs, event);
                }
            }
        }
    }

    Content {
        title: title.unwrap_or_default(),
        sections: sections.finish(),
        footnotes: footnotes.trim().to_string(),
    }
}

fn is_block(tag: &Tag<'_>) -> bool {
    !matches!(
        tag,
        Tag::Emphasis | Tag::Strong | Tag::Strikethrough | Tag::Link(..) | Tag::Image(..)
    )
}

fn finish_block(scan: ParagraphScan, sections: &mut SectionBuilder, footnotes: &mut String) {
    let block = scan.finish();
    if let Some(url) = block.image {
        sections.push_image(url);
    } else if !block.text.is_empty() {
        sections.push_text(block.text);
    }
    if let Some(note) = block.footnote {
        footnotes.push_str(&note);
        footnotes.push(' ');
    }
}

// Only literal children of the heading count towards the title; formatted
// spans contribute nothing.
fn observe_heading(runs: &mut TextRuns, event: Event<'_>) {
    match event {
        Event::Text(text) | Event::Code(text) | Event::Html(text) if runs.depth == 0 => {
            runs.push(&text)
        }
        Event::Start(_) => runs.depth += 1,
        Event::End(_) => runs.depth = runs.depth.saturating_sub(1),
        _ => {}
    }
}

/// Collected text of a block, split wherever a non-text child interrupts it.
#[derive(Default)]
struct TextRuns {
    runs: Vec<String>,
    open: bool,
    depth: usize,
}

impl TextRuns {
    fn push(&mut self, text: &str) {
        match self.runs.last_mut() {
            Some(last) if self.open => last.push_str(text),
            _ => {
                self.runs.push(text.to_string());
                self.open = true;
            }
        }
    }

    fn push_element(&mut self, value: &str) {
        self.runs.push(value.to_string());
        self.open = false;
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn concat(&self) -> String {
        self.runs.concat()
    }

    fn joined(&self) -> String {
        self.runs.join(" ")
    }
}

struct ParagraphBlock {
    image: Option<String>,
    text: String,
    footnote: Option<String>,
}

#[derive(Default)]
struct ParagraphScan {
    depth: usize,
    image: Option<String>,
    text: TextRuns,
    emphasis: Option<TextRuns>,
    in_emphasis: bool,
}

impl ParagraphScan {
    fn observe(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => {
                if self.depth == 0 {
                    self.text.close();
                    match tag {
                        Tag::Image(_, dest, _) if self.image.is_none() => {
                            self.image = Some(dest.to_string());
                        }
                        Tag::Emphasis if self.emphasis.is_none() => {
                            self.emphasis = Some(TextRuns::default());
                            self.in_emphasis = true;
                        }
                        _ => {}
                    }
                } else {
                    self.element("");
                }
                self.depth += 1;
            }
            Event::End(_) => {
                self.depth = self.depth.saturating_sub(1);
                if self.depth == 0 {
                    self.in_emphasis = false;
                }
            }
            Event::Text(text) => self.push_text(&text),
            Event::SoftBreak => self.push_text("\n"),
            Event::Code(text) | Event::Html(text) => self.element(&text),
            _ => self.element(""),
        }
    }

    fn push_text(&mut self, text: &str) {
        if self.depth == 0 {
            self.text.push(text);
        } else if self.in_emphasis && self.depth == 1 {
            if let Some(runs) = self.emphasis.as_mut() {
                runs.push(text);
            }
        }
    }

    /// A child that is not plain text. It splits the paragraph text, and inside
    /// the footnote emphasis it counts as one entry holding `value`.
    fn element(&mut self, value: &str) {
        if self.depth == 0 {
            self.text.close();
        } else if self.in_emphasis && self.depth == 1 {
            if let Some(runs) = self.emphasis.as_mut() {
                runs.push_element(value);
            }
        }
    }

    fn finish(self) -> ParagraphBlock {
        ParagraphBlock {
            image: self.image,
            text: self.text.joined().trim().to_string(),
            footnote: self.emphasis.map(|runs| runs.joined()),
        }
    }
}

/// Numbers sections as they are emitted and folds a text paragraph into the
/// image section right before it.
#[derive(Default)]
struct SectionBuilder {
    sections: Vec<Section>,
    pending_image: Option<usize>,
    last_id: u32,
}

impl SectionBuilder {
    fn next_id(&mut self) -> u32 {
        self.last_id += 1;
        self.last_id
    }

    fn push_image(&mut self, url: String) {
        let id = self.next_id();
        self.pending_image = Some(self.sections.len());
        self.sections.push(Section::image(id, url));
    }

    fn push_text(&mut self, text: String) {
        if let Some(index) = self.pending_image.take() {
            if let Some(section) = self.sections.get_mut(index) {
                if section.text.is_empty() {
                    section.text = text;
                    return;
                }
            }
        }

        let id = self.next_id();
        self.sections.push(Section::text(id, text));
    }

    fn finish(self) -> Vec<Section> {
        self.sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_followed_by_text_merges_into_one_section() {
        let content = parse("![](a.png)\n\nHello\n");
        assert_eq!(content.sections, vec![Section {
            id: 1,
            image_url: Some("a.png".into()),
            text: "Hello".into(),
        }]);
    }

    #[test]
    fn consecutive_images_stay_separate() {
        let content = parse("![](a.png)\n\n![](b.png)\n");
        assert_eq!(content.sections.len(), 2);
        assert_eq!(content.sections[0].id, 1);
        assert_eq!(content.sections[1].id, 2);
        assert!(content.sections.iter().all(|section| section.text.is_empty()));
    }

    #[test]
    fn text_after_merged_section_starts_new_section() {
        let content = parse("![](a.png)\n\nFirst\n\nSecond\n");
        assert_eq!(content.sections.len(), 2);
        assert_eq!(content.sections[1], Section::text(2, "Second"));
    }

    #[test]
    fn text_inside_image_paragraph_is_ignored() {
        let content = parse("![alt](a.png) caption\n\nBody\n");
        assert_eq!(content.sections.len(), 1);
        assert_eq!(content.sections[0].text, "Body");
    }

    #[test]
    fn title_is_first_level_one_heading() {
        let content = parse("## Sub\n\n# First `code`\n\n# Second\n");
        assert_eq!(content.title, "First code");
    }

    #[test]
    fn formatted_heading_children_are_dropped_from_title() {
        let content = parse("# Story *One* Two\n");
        assert_eq!(content.title, "Story  Two");
    }

    #[test]
    fn emphasis_is_not_section_text() {
        let content = parse("Hello _aside_ world\n");
        assert_eq!(content.sections, vec![Section::text(1, "Hello   world")]);
        assert_eq!(content.footnotes, "aside");
    }

    #[test]
    fn soft_breaks_stay_inside_text() {
        let content = parse("line one\nline two\n");
        assert_eq!(content.sections[0].text, "line one\nline two");
    }

    #[test]
    fn only_first_emphasis_per_paragraph_is_a_footnote() {
        let content = parse("_a_ and _b_\n\n*c*\n");
        assert_eq!(content.footnotes, "a c");
    }

    #[test]
    fn tight_list_items_are_sections() {
        let content = parse("# T\n\n- In the beginning\n");
        assert_eq!(content.sections, vec![Section::text(1, "In the beginning")]);

        let nested = parse("- a\n  - b\n");
        assert_eq!(nested.sections, vec![Section::text(1, "a"), Section::text(2, "b")]);
    }

    #[test]
    fn loose_list_items_are_read_through_their_paragraphs() {
        let content = parse("- a\n\n- b\n");
        assert_eq!(content.sections, vec![Section::text(1, "a"), Section::text(2, "b")]);
    }

    #[test]
    fn emphasis_in_a_tight_list_item_is_a_footnote() {
        let content = parse("![](a.png)\n\n- _A Bible story from: Genesis 1-2_\n");
        assert_eq!(content.sections, vec![Section::image(1, "a.png")]);
        assert_eq!(content.footnotes, "A Bible story from: Genesis 1-2");
    }

    #[test]
    fn non_text_children_of_a_footnote_count_as_entries() {
        assert_eq!(parse("_see `x` now_\n").footnotes, "see  x  now");
        assert_eq!(parse("_a **b** c_\n").footnotes, "a    c");
    }

    #[test]
    fn empty_input_yields_empty_document() {
        assert_eq!(parse(""), Content::default());
    }
}
