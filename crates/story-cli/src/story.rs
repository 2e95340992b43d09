/// Target languages offered for translation, as (code, name).
pub const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("bn", "Bengali"),
    ("hi", "Hindi"),
    ("ml", "Malayalam"),
    ("ta", "Tamil"),
    ("te", "Telugu"),
    ("kn", "Kannada"),
    ("mr", "Marathi"),
    ("ur", "Urdu"),
];

const STORY_COUNT: u32 = 50;

/// Story identifier taken from the leading digits of a file or selection name.
///
/// `"05-the-son.md"` gives `"05"`; a name that does not start with a digit gives `None`.
pub fn story_number(name: &str) -> Option<&str> {
    let end = name
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(name.len(), |(idx, _)| idx);
    (end > 0).then(|| &name[..end])
}

/// Identifiers of every published story, `01` through `50`.
pub fn story_catalog() -> Vec<String> {
    (1..=STORY_COUNT).map(|num| format!("{num:02}")).collect()
}

pub fn language_name(code: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
}
