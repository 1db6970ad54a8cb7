use std::net::SocketAddr;
use std::path::PathBuf;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:4310";
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Server-side configuration resolved from the environment.
///
/// The gateway never persists keys; they come from the environment or from
/// the inbound request, and stay read-only for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub google_base_url: String,
    pub openai_base_url: String,
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub probe_timeout_secs: u64,
    pub data_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let listen_addr = env_nonempty("CHATGATE_LISTEN_ADDR")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_else(|| {
                DEFAULT_LISTEN_ADDR
                    .parse()
                    .unwrap_or(SocketAddr::from(([127, 0, 0, 1], 4310)))
            });

        Self {
            listen_addr,
            google_base_url: env_nonempty("CHATGATE_GOOGLE_URL")
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            openai_base_url: env_nonempty("CHATGATE_OPENAI_URL")
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            google_api_key: env_nonempty("GOOGLE_API_KEY"),
            openai_api_key: env_nonempty("OPENAI_API_KEY"),
            probe_timeout_secs: env_nonempty("CHATGATE_PROBE_TIMEOUT_SECS")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS),
            data_dir: data_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

pub fn data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("CHATGATE_DATA_DIR") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("chatgate")
}
