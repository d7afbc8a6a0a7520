//! Plan exporters: iCalendar, CSV, and Markdown.
//!
//! Exporters are pure `&Plan -> String` functions; writing files is left to
//! the caller.

pub mod calendar;
pub mod markdown;
pub mod table;

pub use calendar::{event_uid, to_calendar};
pub use markdown::{slugify, to_markdown};
pub use table::{TABLE_HEADER, to_table};
