pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{cache_status, file_entry, header, section, status, success, timing, warn};
pub use table::{report_table, stats_table, TableBuilder};
pub use theme::{theme, Theme};
