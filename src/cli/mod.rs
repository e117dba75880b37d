pub mod ascii_preview;
pub mod commands;

pub use ascii_preview::{AsciiRenderer, clear_screen, check_for_escape, redraw};
