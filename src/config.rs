//! Environment-backed configuration.
//!
//! Settings are resolved from process environment variables (a `.env` file is
//! honored via `dotenvy`), with compiled defaults for every knob so the crate
//! works out of the box in tests and demos.

use std::time::Duration;

/// Runtime settings for the ingestion pipeline.
///
/// # Examples
///
/// ```
/// use inkstream::config::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.chunk_size_tokens, 500);
/// assert_eq!(settings.embed_batch_size, 10);
/// ```
#[derive(Clone, Debug)]
pub struct Settings {
    /// SQLite database URL for the ledger and stores.
    pub database_url: String,
    /// Lifetime of stored blobs before the TTL reaper may remove them.
    pub content_ttl: Duration,
    /// Default chunk size in tokens when a job does not specify one.
    pub chunk_size_tokens: usize,
    /// Number of chunks per embedding-provider call.
    pub embed_batch_size: usize,
    /// Maximum concurrent CPU-bound tasks (hashing, parsing, chunking).
    pub cpu_pool_size: usize,
    /// Bounded wait when acquiring an extraction slot.
    pub slot_acquire_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            content_ttl: Duration::from_secs(24 * 60 * 60),
            chunk_size_tokens: 500,
            embed_batch_size: 10,
            cpu_pool_size: 4,
            slot_acquire_timeout: Duration::from_millis(100),
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    ///
    /// Recognized variables: `INKSTREAM_DATABASE_URL`,
    /// `INKSTREAM_CONTENT_TTL_HOURS`, `INKSTREAM_CHUNK_SIZE`,
    /// `INKSTREAM_EMBED_BATCH_SIZE`, `INKSTREAM_CPU_POOL_SIZE`,
    /// `INKSTREAM_SLOT_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        // Best-effort: a missing .env file is not an error.
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        Self {
            database_url: env_string("INKSTREAM_DATABASE_URL", defaults.database_url),
            content_ttl: Duration::from_secs(
                env_parse("INKSTREAM_CONTENT_TTL_HOURS", 24u64) * 60 * 60,
            ),
            chunk_size_tokens: env_parse("INKSTREAM_CHUNK_SIZE", defaults.chunk_size_tokens),
            embed_batch_size: env_parse("INKSTREAM_EMBED_BATCH_SIZE", defaults.embed_batch_size),
            cpu_pool_size: env_parse("INKSTREAM_CPU_POOL_SIZE", defaults.cpu_pool_size),
            slot_acquire_timeout: Duration::from_millis(env_parse(
                "INKSTREAM_SLOT_TIMEOUT_MS",
                100u64,
            )),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.content_ttl, Duration::from_secs(86_400));
        assert_eq!(settings.slot_acquire_timeout, Duration::from_millis(100));
        assert!(settings.cpu_pool_size > 0);
    }
}
