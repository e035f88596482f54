use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address to listen on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Root directory where content is stored.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Shared bearer token for the access-scope check.
    pub token: String,

    /// Log output format: "json" or "pretty".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Maximum accepted ciphertext size per chunk in bytes. 0 = unlimited.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            data_dir: default_data_dir(),
            token: String::new(),
            log_format: default_log_format(),
            max_chunk_bytes: default_max_chunk_bytes(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_data_dir() -> String {
    "/var/lib/kist".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Chunks are 64 KiB of plaintext plus cipher overhead; 1 MiB leaves
/// generous headroom without letting a client buffer arbitrary bodies.
fn default_max_chunk_bytes() -> u64 {
    1024 * 1024
}

/// Parse sizes like "500M", "10G", or plain bytes.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (number, multiplier) = match s.chars().last() {
        Some('K' | 'k') => (&s[..s.len() - 1], 1024u64),
        Some('M' | 'm') => (&s[..s.len() - 1], 1024 * 1024),
        Some('G' | 'g') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    number
        .trim()
        .parse::<u64>()
        .map(|n| n * multiplier)
        .map_err(|e| format!("invalid size '{s}': {e}"))
}
