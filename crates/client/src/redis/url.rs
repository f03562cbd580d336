//! Redis connection URL composition from configured settings.

use tracelabel_core::config::RedisSettings;

/// Error type for connection URL composition failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("redis host not configured")]
    MissingHost,

    #[error("invalid redis URL: {0}")]
    InvalidUrl(String),

    #[error("invalid redis credentials")]
    InvalidCredentials,
}

/// Build the connection URL for `settings`.
///
/// Composition rules:
/// 1. Scheme is `rediss` when `secure` is set, `redis` otherwise
/// 2. Host is trimmed; bare IPv6 addresses are bracketed
/// 3. Credentials are attached only when a non-empty password is set
/// 4. The database index becomes the path (`/<db>`)
pub fn connection_url(settings: &RedisSettings) -> Result<url::Url, UrlError> {
    let host = settings.host.as_deref().map(str::trim).unwrap_or_default();
    if host.is_empty() {
        return Err(UrlError::MissingHost);
    }

    let host = if host.contains(':') && !host.starts_with('[') { format!("[{host}]") } else { host.to_string() };
    let scheme = if settings.secure { "rediss" } else { "redis" };

    let mut parsed = url::Url::parse(&format!("{scheme}://{host}:{}/{}", settings.port, settings.db))
        .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    if let Some(password) = settings.password.as_deref().filter(|p| !p.is_empty()) {
        if let Some(username) = settings.username.as_deref().filter(|u| !u.is_empty()) {
            parsed.set_username(username).map_err(|()| UrlError::InvalidCredentials)?;
        }
        parsed.set_password(Some(password)).map_err(|()| UrlError::InvalidCredentials)?;
    }

    Ok(parsed)
}

/// The URL with any password masked, for logging.
pub fn redacted(url: &url::Url) -> String {
    let mut shown = url.clone();
    if shown.password().is_some() {
        let _ = shown.set_password(Some("***"));
    }
    shown.to_string()
}
