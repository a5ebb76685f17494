use std::fmt;

use crate::domain::errors::{DomainError, Result};

const ALLOWED_SCHEMES: [&str; 2] = ["rtmp://", "rtmps://"];
const MAX_BASE_URL_LEN: usize = 1024;
const MAX_STREAM_KEY_LEN: usize = 512;

/// RTMP ingest destination: base URL plus stream key.
///
/// Both fields end up as a single argument of the transcoder command line, so
/// they are allow-listed here before any process is spawned.
#[derive(Clone, PartialEq, Eq)]
pub struct Destination {
    base_url: String,
    stream_key: String,
}

impl Destination {
    pub fn new(base_url: impl Into<String>, stream_key: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let stream_key = stream_key.into();

        let base_url = Self::validate_base_url(&base_url)?.to_string();
        Self::validate_stream_key(&stream_key)?;

        Ok(Self {
            base_url,
            stream_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    /// Full publish URL handed to the transcoder
    pub fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.stream_key)
    }

    /// Publish URL safe for logs
    pub fn redacted_url(&self) -> String {
        format!("{}/****", self.base_url)
    }

    fn validate_base_url(url: &str) -> Result<&str> {
        if url.len() > MAX_BASE_URL_LEN {
            return Err(DomainError::InvalidDestination(format!(
                "stream URL longer than {} bytes",
                MAX_BASE_URL_LEN
            )));
        }

        let rest = ALLOWED_SCHEMES
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme))
            .ok_or_else(|| {
                DomainError::InvalidDestination(format!(
                    "stream URL must start with rtmp:// or rtmps://: {}",
                    url
                ))
            })?;

        let valid_chars = rest.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | ':' | '/' | '@' | '%' | '+')
        });
        if !valid_chars {
            return Err(DomainError::InvalidDestination(format!(
                "stream URL contains invalid characters: {}",
                url
            )));
        }

        let trimmed = url.trim_end_matches('/');
        let path = rest.trim_end_matches('/');
        let mut segments = path.split('/');

        match segments.next() {
            Some(host) if !host.is_empty() && !host.starts_with(':') => {}
            _ => {
                return Err(DomainError::InvalidDestination(format!(
                    "stream URL has no host: {}",
                    url
                )))
            }
        }

        for segment in segments {
            if segment.is_empty() {
                return Err(DomainError::InvalidDestination(format!(
                    "stream URL cannot contain empty path segments: {}",
                    url
                )));
            }
            if segment == ".." || segment == "." {
                return Err(DomainError::InvalidDestination(format!(
                    "stream URL cannot contain relative path segments: {}",
                    url
                )));
            }
        }

        Ok(trimmed)
    }

    fn validate_stream_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(DomainError::InvalidDestination(
                "stream key cannot be empty".to_string(),
            ));
        }

        if key.len() > MAX_STREAM_KEY_LEN {
            return Err(DomainError::InvalidDestination(format!(
                "stream key longer than {} bytes",
                MAX_STREAM_KEY_LEN
            )));
        }

        if key.starts_with('-') {
            return Err(DomainError::InvalidDestination(
                "stream key cannot start with '-'".to_string(),
            ));
        }

        let valid_chars = key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '=' | '?'));
        if !valid_chars {
            return Err(DomainError::InvalidDestination(
                "stream key contains invalid characters".to_string(),
            ));
        }

        if key.contains("..") {
            return Err(DomainError::InvalidDestination(
                "stream key cannot contain '..'".to_string(),
            ));
        }

        Ok(())
    }
}

// The stream key is a credential; keep it out of Debug output.
impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("base_url", &self.base_url)
            .field("stream_key", &"****")
            .finish()
    }
}
