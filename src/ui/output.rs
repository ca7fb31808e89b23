use crate::package::FileKind;
use crate::storage::CacheStatus;
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(theme().header));
}

pub fn status(icon: &str, label: &str, value: &str) {
    println!("{} {}: {}", icon, label.style(theme().dim), value);
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().fresh));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().stale));
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header));
}

/// One line describing a cache file's freshness
pub fn cache_status(path: &str, cache: &CacheStatus) {
    let icon = match cache {
        CacheStatus::Current => Icons::CHECK,
        CacheStatus::ChecksumMismatch => Icons::WRENCH,
        _ => Icons::CROSS,
    };
    println!(
        "{} {} {}",
        icon,
        path.style(theme().path),
        cache.to_string().style(theme().cache_status(cache))
    );
}

/// One line of a decoded file list
pub fn file_entry(path: &str, kind: FileKind) {
    let icon = match kind {
        FileKind::Directory => Icons::DIR,
        FileKind::File => Icons::FILE,
        FileKind::Ghost => Icons::GHOST,
    };
    println!("{} {}", icon, path.style(theme().file_kind(kind)));
}

pub fn timing(elapsed: &str) {
    println!("{} {}", Icons::CLOCK.style(theme().dim), elapsed);
}
