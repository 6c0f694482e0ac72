use std::env;

pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24 * 7;
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub default_admin_email: String,
    pub default_admin_password: String,
    /// Password shared by every account the dataset generator creates.
    pub seed_password: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/projecthub.db?mode=rwc".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "development-secret-change-in-production".to_string()),
            token_ttl_hours: token_ttl_hours(env::var("TOKEN_TTL_HOURS").ok().as_deref()),
            default_admin_email: env::var("DEFAULT_ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@admin.com".to_string()),
            default_admin_password: env::var("DEFAULT_ADMIN_PASSWORD")
                .unwrap_or_else(|_| "admin123".to_string()),
            seed_password: env::var("SEED_PASSWORD")
                .unwrap_or_else(|_| "password123".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "development-secret-change-in-production".to_string(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            default_admin_email: "admin@admin.com".to_string(),
            default_admin_password: "admin123".to_string(),
            seed_password: "password123".to_string(),
        }
    }
}

/// Parses `TOKEN_TTL_HOURS`; unparsable or non-positive values fall back to the
/// default and large ones are capped at a year.
fn token_ttl_hours(raw: Option<&str>) -> i64 {
    raw.and_then(|h| h.trim().parse::<i64>().ok())
        .filter(|h| *h > 0)
        .map_or(DEFAULT_TOKEN_TTL_HOURS, |h| h.min(MAX_TOKEN_TTL_HOURS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, DEFAULT_TOKEN_TTL_HOURS)]
    #[case(Some("12"), 12)]
    #[case(Some("0"), DEFAULT_TOKEN_TTL_HOURS)]
    #[case(Some("-3"), DEFAULT_TOKEN_TTL_HOURS)]
    #[case(Some("soon"), DEFAULT_TOKEN_TTL_HOURS)]
    #[case(Some("9223372036854775807"), MAX_TOKEN_TTL_HOURS)]
    fn parses_token_ttl(#[case] raw: Option<&str>, #[case] expected: i64) {
        assert_eq!(token_ttl_hours(raw), expected);
    }
}
