use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("REPOCACHE_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}

/// BLAKE3 hex digest used as the default checksum of a metadata document
pub fn content_checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
