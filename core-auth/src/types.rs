use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OAuth credential issued by the survey API.
///
/// A credential is a value: once created it never changes. A refresh
/// produces a new `Credential` that replaces the old one wholesale.
///
/// # Security
///
/// The `Debug` implementation redacts both tokens.
///
/// # Examples
///
/// ```
/// use core_auth::Credential;
///
/// let credential = Credential::issued("at", "Bearer", "rt", 1_597_169_495.0, 7200.0).unwrap();
/// assert_eq!(credential.valid_until().timestamp(), 1_597_176_695);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    token_type: String,
    refresh_token: String,
    valid_until: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        refresh_token: impl Into<String>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            refresh_token: refresh_token.into(),
            valid_until,
        }
    }

    /// Build a credential from a token response.
    ///
    /// `valid_until` is `created_at + expires_in`, both in seconds (fractions
    /// are kept to the millisecond). Returns `None` when the sum is not a
    /// representable instant.
    pub fn issued(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        refresh_token: impl Into<String>,
        created_at: f64,
        expires_in: f64,
    ) -> Option<Self> {
        let valid_until = created_at + expires_in;
        if !valid_until.is_finite() {
            return None;
        }

        let millis = (valid_until * 1000.0).round();
        if millis.abs() >= i64::MAX as f64 {
            return None;
        }

        let valid_until = DateTime::from_timestamp_millis(millis as i64)?;
        Some(Self::new(access_token, token_type, refresh_token, valid_until))
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn valid_until(&self) -> DateTime<Utc> {
        self.valid_until
    }

    /// True once `now + leeway` reaches `valid_until`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        now + leeway >= self.valid_until
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("refresh_token", &"[REDACTED]")
            .field("valid_until", &self.valid_until)
            .finish()
    }
}

/// A survey as listed by `GET /surveys`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    pub id: String,
    pub title: String,
    pub description: String,
    pub cover_image_url: Option<String>,
}

impl Survey {
    /// Cover image at full resolution.
    ///
    /// The image CDN serves the large variant when `l` is appended to the
    /// thumbnail URL.
    pub fn high_resolution_cover_image_url(&self) -> Option<String> {
        self.cover_image_url.as_ref().map(|url| format!("{url}l"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_computes_valid_until() {
        let credential =
            Credential::issued("at1234", "Bearer", "rt5678", 1_597_169_495.0, 7200.0).unwrap();

        assert_eq!(credential.valid_until().timestamp(), 1_597_176_695);
        assert_eq!(credential.access_token(), "at1234");
        assert_eq!(credential.token_type(), "Bearer");
        assert_eq!(credential.refresh_token(), "rt5678");
    }

    #[test]
    fn test_issued_rejects_unrepresentable_instants() {
        assert!(Credential::issued("a", "Bearer", "r", f64::NAN, 7200.0).is_none());
        assert!(Credential::issued("a", "Bearer", "r", f64::MAX, 7200.0).is_none());
    }

    #[test]
    fn test_is_expired_at() {
        let valid_until = DateTime::from_timestamp(1_000, 0).unwrap();
        let credential = Credential::new("a", "Bearer", "r", valid_until);
        let before = DateTime::from_timestamp(900, 0).unwrap();

        assert!(!credential.is_expired_at(before, Duration::zero()));
        assert!(credential.is_expired_at(before, Duration::seconds(100)));
        assert!(credential.is_expired_at(valid_until, Duration::zero()));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let credential =
            Credential::issued("secret-access", "Bearer", "secret-refresh", 0.0, 60.0).unwrap();
        let debug = format!("{:?}", credential);

        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("Bearer"));
    }

    #[test]
    fn test_high_resolution_cover() {
        let survey = Survey {
            id: "d5de6a8f8f5f1cfe51bc".to_string(),
            title: "Scarlett Bangkok".to_string(),
            description: "We'd love ot hear from you!".to_string(),
            cover_image_url: Some("https://dhdbhh0jsld0o.cloudfront.net/m/1ea51560991bcb7d00d0_".to_string()),
        };

        assert_eq!(
            survey.high_resolution_cover_image_url().as_deref(),
            Some("https://dhdbhh0jsld0o.cloudfront.net/m/1ea51560991bcb7d00d0_l")
        );
    }
}
