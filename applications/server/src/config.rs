/// Server configuration
use crate::error::{Result, ServerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of environment variables that override file settings
pub const ENV_PREFIX: &str = "ORB_";

const SECTIONS: &[&str] = &["server", "storage", "auth", "party", "stream"];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_server")]
    pub server: ServerSettings,

    #[serde(default = "default_storage")]
    pub storage: StorageSettings,

    #[serde(default = "default_auth")]
    pub auth: AuthSettings,

    #[serde(default = "default_party")]
    pub party: PartySettings,

    #[serde(default = "default_stream")]
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Track catalog (read-only `tracks` table)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Root directory of the local object store
    #[serde(default = "default_object_store_path")]
    pub object_store_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub jwt_secret: String,

    #[serde(default = "default_jwt_expiration_hours")]
    pub jwt_expiration_hours: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PartySettings {
    /// Guests allowed per session, host excluded
    #[serde(default = "default_max_participants")]
    pub max_participants: usize,

    /// How long a session survives a lost host connection
    #[serde(default = "default_host_grace_secs")]
    pub host_grace_secs: u64,

    /// Messages queued per connection before new ones are dropped
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Hard cap on a session's lifetime, host connected or not
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamSettings {
    /// Target HLS segment length
    #[serde(default = "default_segment_target_ms")]
    pub segment_target_ms: u64,
}

impl ServerConfig {
    /// Load `config.toml` from the working directory (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an explicit file (required) or the default
    /// optional `config.toml`, then apply `ORB_*` environment overrides
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path).required(true));
            }
            None => {
                let config_path = PathBuf::from("config.toml");
                if config_path.exists() {
                    settings = settings.add_source(config::File::from(config_path));
                }
            }
        }

        for (key, value) in env_overrides(std::env::vars()) {
            settings = settings
                .set_override(key, value)
                .map_err(|e| ServerError::Config(e.to_string()))?;
        }

        let config = settings
            .build()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ServerError::Config(
                "JWT secret is required (set ORB_AUTH_JWT_SECRET)".to_string(),
            ));
        }

        if !(30..=60).contains(&self.party.host_grace_secs) {
            return Err(ServerError::Config(format!(
                "party.host_grace_secs must be between 30 and 60, got {}",
                self.party.host_grace_secs
            )));
        }

        if self.party.max_participants == 0 {
            return Err(ServerError::Config(
                "party.max_participants must be at least 1".to_string(),
            ));
        }

        if self.party.outbound_buffer == 0 {
            return Err(ServerError::Config(
                "party.outbound_buffer must be at least 1".to_string(),
            ));
        }

        if self.party.session_ttl_secs < self.party.host_grace_secs {
            return Err(ServerError::Config(format!(
                "party.session_ttl_secs must be at least the grace period, got {}",
                self.party.session_ttl_secs
            )));
        }

        if self.stream.segment_target_ms == 0 {
            return Err(ServerError::Config(
                "stream.segment_target_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Map `ORB_<SECTION>_<KEY>` variables to `section.key` overrides
///
/// Keys themselves contain underscores (`ORB_AUTH_JWT_SECRET` is
/// `auth.jwt_secret`), so only the first segment after the prefix is treated
/// as the section, and only known sections are accepted.
pub fn env_overrides<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut overrides: Vec<(String, String)> = vars
        .into_iter()
        .filter_map(|(name, value)| {
            let rest = name.strip_prefix(ENV_PREFIX)?.to_ascii_lowercase();
            let (section, key) = rest.split_once('_')?;
            if key.is_empty() || !SECTIONS.contains(&section) {
                return None;
            }
            Some((format!("{}.{}", section, key), value))
        })
        .collect();
    overrides.sort();
    overrides
}

// Default values
fn default_server() -> ServerSettings {
    ServerSettings {
        host: default_host(),
        port: default_port(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_storage() -> StorageSettings {
    StorageSettings {
        database_url: default_database_url(),
        object_store_path: default_object_store_path(),
    }
}

fn default_database_url() -> String {
    "sqlite://./data/orb.db".to_string()
}

fn default_object_store_path() -> PathBuf {
    PathBuf::from("./data/objects")
}

fn default_auth() -> AuthSettings {
    AuthSettings {
        jwt_secret: String::new(),
        jwt_expiration_hours: default_jwt_expiration_hours(),
    }
}

fn default_jwt_expiration_hours() -> u64 {
    24
}

fn default_party() -> PartySettings {
    PartySettings {
        max_participants: default_max_participants(),
        host_grace_secs: default_host_grace_secs(),
        outbound_buffer: default_outbound_buffer(),
        session_ttl_secs: default_session_ttl_secs(),
    }
}

fn default_max_participants() -> usize {
    50
}

fn default_host_grace_secs() -> u64 {
    45
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_session_ttl_secs() -> u64 {
    12 * 60 * 60
}

fn default_stream() -> StreamSettings {
    StreamSettings {
        segment_target_ms: default_segment_target_ms(),
    }
}

fn default_segment_target_ms() -> u64 {
    6000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            auth: default_auth(),
            party: default_party(),
            stream: default_stream(),
        }
    }
}

impl Default for PartySettings {
    fn default() -> Self {
        default_party()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_overrides_keep_underscored_keys() {
        let overrides = env_overrides(vars(&[
            ("ORB_AUTH_JWT_SECRET", "s3cret"),
            ("ORB_PARTY_MAX_PARTICIPANTS", "8"),
            ("ORB_SERVER_PORT", "9000"),
            ("ORB_UNKNOWN_THING", "x"),
            ("ORB_SERVER", "x"),
            ("HOME", "/root"),
        ]));

        assert_eq!(
            overrides,
            vars(&[
                ("auth.jwt_secret", "s3cret"),
                ("party.max_participants", "8"),
                ("server.port", "9000"),
            ])
        );
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.party.host_grace_secs, 45);
        assert_eq!(config.party.outbound_buffer, 64);
        assert_eq!(config.party.session_ttl_secs, 43_200);
        assert_eq!(config.stream.segment_target_ms, 6000);
    }

    #[test]
    fn test_validate_requires_secret() {
        let config = ServerConfig::default();
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));

        let mut config = ServerConfig::default();
        config.auth.jwt_secret = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bounds_grace_period() {
        let mut config = ServerConfig::default();
        config.auth.jwt_secret = "secret".to_string();

        config.party.host_grace_secs = 29;
        assert!(config.validate().is_err());
        config.party.host_grace_secs = 61;
        assert!(config.validate().is_err());
        config.party.host_grace_secs = 30;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = ServerConfig::default();
        config.auth.jwt_secret = "secret".to_string();
        config.party.max_participants = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.auth.jwt_secret = "secret".to_string();
        config.stream.segment_target_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.auth.jwt_secret = "secret".to_string();
        config.party.session_ttl_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orb.toml");
        std::fs::write(
            &path,
            "[auth]\njwt_secret = \"from-file\"\n\n[party]\nmax_participants = 3\n",
        )
        .unwrap();

        let config = ServerConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.party.max_participants, 3);
        assert_eq!(config.party.host_grace_secs, 45);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let result = ServerConfig::load_from(Some(Path::new("/nonexistent/orb.toml")));
        assert!(matches!(result, Err(ServerError::Config(_))));
    }
}
