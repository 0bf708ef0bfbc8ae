//! Per-client settings and their environment overrides.

pub const MAX_URL_LEN: usize = 1024;
pub const READ_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                                      (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const ENV_USER_AGENT: &str = "TICK_HTTP_USER_AGENT";
pub const ENV_READ_CHUNK: &str = "TICK_HTTP_READ_CHUNK";
pub const ENV_MAX_URL_LEN: &str = "TICK_HTTP_MAX_URL_LEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// URLs longer than this are rejected before a client exists.
    pub max_url_len: usize,
    /// Bytes requested per receive; clamped to `1..=READ_CHUNK_SIZE`.
    pub read_chunk_size: usize,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_url_len: MAX_URL_LEN,
            read_chunk_size: READ_CHUNK_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `TICK_HTTP_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns. Values that do not
    /// parse keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(agent) = lookup(ENV_USER_AGENT).filter(|s| !s.trim().is_empty()) {
            config.user_agent = agent.trim().to_string();
        }
        if let Some(n) = lookup(ENV_READ_CHUNK).and_then(|s| s.trim().parse().ok()) {
            config.read_chunk_size = n;
        }
        if let Some(n) = lookup(ENV_MAX_URL_LEN).and_then(|s| s.trim().parse().ok()) {
            config.max_url_len = n;
        }
        config
    }

    pub(crate) fn effective_read_chunk(&self) -> usize {
        self.read_chunk_size.clamp(1, READ_CHUNK_SIZE)
    }
}
