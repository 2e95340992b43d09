use serde::{Deserialize, Serialize};

/// One visual frame of a story: an optional picture and the narrative text shown with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub text: String,
}

impl Section {
    pub fn image(id: u32, url: impl Into<String>) -> Self {
        Self {
            id,
            image_url: Some(url.into()),
            text: String::new(),
        }
    }

    pub fn text(id: u32, text: impl Into<String>) -> Self {
        Self {
            id,
            image_url: None,
            text: text.into(),
        }
    }

    /// True when the section carries an image reference, even an empty one.
    pub fn has_image(&self) -> bool {
        self.image_url.is_some()
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Structured form of a story document.
///
/// `sections` carries display order; section `n` renders as frame `n` no matter
/// what its `id` is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    pub title: String,
    pub sections: Vec<Section>,
    pub footnotes: String,
}

impl Content {
    /// Copy of the document's frame structure with every piece of text cleared.
    ///
    /// Section ids and image references survive so a translation can be typed
    /// in next to the source frame by frame. Text-only sections come out empty,
    /// which is the one state where a section carries neither image nor text.
    pub fn blank_template(&self) -> Content {
        Content {
            title: String::new(),
            sections: self
                .sections
                .iter()
                .map(|section| Section {
                    id: section.id,
                    image_url: section.image_url.clone(),
                    text: String::new(),
                })
                .collect(),
            footnotes: String::new(),
        }
    }

    /// True once any user-visible text (title, a section, or the footnote) is non-blank.
    pub fn has_changes(&self) -> bool {
        !self.title.trim().is_empty()
            || self.sections.iter().any(Section::has_text)
            || !self.footnotes.trim().is_empty()
    }

    /// Replace the text of the section with `id`. Returns false if no section matched.
    pub fn set_section_text(&mut self, id: u32, text: impl Into<String>) -> bool {
        match self.sections.iter_mut().find(|section| section.id == id) {
            Some(section) => {
                section.text = text.into();
                true
            }
            None => false,
        }
    }
}
