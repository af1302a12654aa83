pub mod defs;
pub mod render;

pub use defs::*;
pub use render::{report_file_name, JsonRenderer, MarkdownRenderer, ReportRenderer};
