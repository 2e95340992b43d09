mod content;
mod parse;
mod render;

pub use content::{Content, Section};
pub use parse::parse;
pub use render::{serialize, serialize_with, RenderOptions, DEFAULT_IMAGE_ALT};
