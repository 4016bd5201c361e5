use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_JWT_SECRET: &str = "your-secret-key-change-in-production";

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub auth_rate_limit_per_minute: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            db_path: "./data/quill.db".to_string(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl_days: 7,
            upload_dir: PathBuf::from("./uploads"),
            max_upload_bytes: 5 * 1024 * 1024,
            auth_rate_limit_per_minute: 20,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = AppConfig::default();

        AppConfig {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT", defaults.port),
            db_path: env::var("DB_PATH").unwrap_or(defaults.db_path),
            jwt_secret: env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            token_ttl_days: parse_var("TOKEN_TTL_DAYS", defaults.token_ttl_days),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            auth_rate_limit_per_minute: parse_var(
                "AUTH_RATE_LIMIT_PER_MINUTE",
                defaults.auth_rate_limit_per_minute,
            ),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(var = name, value = %raw, "Ignoring unparseable setting, using default");
            default
        }),
        Err(_) => default,
    }
}
