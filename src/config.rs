use serde::Deserialize;

const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Base for public object URLs, e.g. `https://<project>.supabase.co/storage/v1/object/public`.
    pub public_url: String,
    pub images_bucket: String,
    pub avatars_bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub generator: GeneratorConfig,
    pub bcrypt_cost: u32,
    /// Email that is granted admin access in addition to users with the admin role.
    pub admin_email: Option<String>,
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "dreamcanvas".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "dreamcanvas-users".into()),
            ttl_minutes: parse_env("JWT_TTL_MINUTES").unwrap_or(60 * 24),
        };
        let storage = StorageConfig {
            endpoint: std::env::var("STORAGE_ENDPOINT")?,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".into()),
            access_key: std::env::var("STORAGE_ACCESS_KEY")?,
            secret_key: std::env::var("STORAGE_SECRET_KEY")?,
            public_url: std::env::var("STORAGE_PUBLIC_URL")?,
            images_bucket: std::env::var("STORAGE_IMAGES_BUCKET")
                .unwrap_or_else(|_| "images".into()),
            avatars_bucket: std::env::var("STORAGE_AVATARS_BUCKET")
                .unwrap_or_else(|_| "avatars".into()),
        };
        let generator = GeneratorConfig {
            base_url: std::env::var("IMAGE_API_URL")?,
            timeout_secs: parse_env("IMAGE_API_TIMEOUT_SECS").unwrap_or(120),
        };
        let admin_email = std::env::var("ADMIN_EMAIL")
            .ok()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty());

        Ok(Self {
            database_url,
            jwt,
            storage,
            generator,
            bcrypt_cost: parse_env("BCRYPT_COST").unwrap_or(bcrypt::DEFAULT_COST),
            admin_email,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_env("APP_PORT").unwrap_or(8080),
            max_body_bytes: parse_env("MAX_BODY_BYTES").unwrap_or(DEFAULT_BODY_LIMIT),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
