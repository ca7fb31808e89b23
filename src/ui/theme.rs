use std::sync::OnceLock;

use owo_colors::Style;

use crate::package::FileKind;
use crate::storage::CacheStatus;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles for cache reports, keyed by what is being shown
#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub dim: Style,
    pub path: Style,
    /// Stamp matches: nothing to do
    pub fresh: Style,
    /// Same layout, new data: a data refresh
    pub stale: Style,
    /// Wrong version, unreadable or missing: a full rebuild
    pub broken: Style,
    pub directory: Style,
    pub ghost: Style,
}

impl Theme {
    /// Colors only when stdout is a terminal that accepts them
    pub fn detect() -> Self {
        if console::Term::stdout().is_term() && console::colors_enabled() {
            Self::colored()
        } else {
            Self::plain()
        }
    }

    pub fn colored() -> Self {
        Self {
            header: Style::new().cyan().bold(),
            dim: Style::new().dimmed(),
            path: Style::new().bright_black(),
            fresh: Style::new().green().bold(),
            stale: Style::new().yellow().bold(),
            broken: Style::new().red().bold(),
            directory: Style::new().blue().bold(),
            ghost: Style::new().dimmed().italic(),
        }
    }

    pub fn plain() -> Self {
        let none = Style::new();
        Self {
            header: none,
            dim: none,
            path: none,
            fresh: none,
            stale: none,
            broken: none,
            directory: none,
            ghost: none,
        }
    }

    pub fn cache_status(&self, status: &CacheStatus) -> Style {
        match status {
            CacheStatus::Current => self.fresh,
            CacheStatus::ChecksumMismatch => self.stale,
            _ => self.broken,
        }
    }

    pub fn file_kind(&self, kind: FileKind) -> Style {
        match kind {
            FileKind::Directory => self.directory,
            FileKind::File => Style::new(),
            FileKind::Ghost => self.ghost,
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
