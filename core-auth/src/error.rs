use thiserror::Error;

/// Classified failure reported by the survey API wire layer.
///
/// Hosts never see these directly: [`AuthError`] and [`ClientError`] are
/// derived from them with exhaustive matches.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    #[error("Network failure")]
    Network,

    #[error("Bad request")]
    BadRequest,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Response could not be parsed")]
    Parsing,

    #[error("Unknown error")]
    Unknown,
}

/// Failure of [`authenticate`](crate::AuthenticatedClient::authenticate).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The server rejected the client id/secret pair.
    #[error("Client is not authorized")]
    Unauthorized,

    /// The server rejected the email/password pair.
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Unknown authentication error")]
    Unknown,
}

impl From<WireError> for AuthError {
    fn from(error: WireError) -> Self {
        match error {
            WireError::Unauthorized => AuthError::Unauthorized,
            WireError::BadRequest => AuthError::AuthenticationFailed,
            WireError::Network => AuthError::Unknown,
            WireError::NotFound => AuthError::Unknown,
            WireError::Parsing => AuthError::Unknown,
            WireError::Unknown => AuthError::Unknown,
        }
    }
}

/// Failure of an authenticated request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientError {
    /// No credential, the refresh was rejected, or the retried request was
    /// still unauthorized.
    #[error("Not authenticated")]
    Unauthorized,

    #[error("Network failure")]
    Network,

    #[error("Response could not be parsed")]
    Parsing,

    #[error("Unknown error")]
    Unknown,

    #[error("Request cancelled")]
    Cancelled,
}

impl ClientError {
    /// True for the failures a host shows as a generic "something went wrong".
    pub fn is_unknown_kind(&self) -> bool {
        matches!(
            self,
            ClientError::Network | ClientError::Parsing | ClientError::Unknown
        )
    }
}

impl From<WireError> for ClientError {
    /// Terminal mapping. `Unauthorized` is only handed here once the
    /// refresh-and-retry protocol is exhausted.
    fn from(error: WireError) -> Self {
        match error {
            WireError::Unauthorized => ClientError::Unauthorized,
            WireError::Network => ClientError::Network,
            WireError::Parsing => ClientError::Parsing,
            WireError::BadRequest => ClientError::Unknown,
            WireError::NotFound => ClientError::Unknown,
            WireError::Unknown => ClientError::Unknown,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_mapping() {
        assert_eq!(AuthError::from(WireError::Unauthorized), AuthError::Unauthorized);
        assert_eq!(
            AuthError::from(WireError::BadRequest),
            AuthError::AuthenticationFailed
        );
        for wire in [
            WireError::Network,
            WireError::NotFound,
            WireError::Parsing,
            WireError::Unknown,
        ] {
            assert_eq!(AuthError::from(wire), AuthError::Unknown);
        }
    }

    #[test]
    fn test_client_error_mapping_keeps_distinctions() {
        assert_eq!(ClientError::from(WireError::Unauthorized), ClientError::Unauthorized);
        assert_eq!(ClientError::from(WireError::Network), ClientError::Network);
        assert_eq!(ClientError::from(WireError::Parsing), ClientError::Parsing);
        assert_eq!(ClientError::from(WireError::BadRequest), ClientError::Unknown);
        assert_eq!(ClientError::from(WireError::NotFound), ClientError::Unknown);
        assert_eq!(ClientError::from(WireError::Unknown), ClientError::Unknown);
    }

    #[test]
    fn test_unknown_kind() {
        assert!(ClientError::Network.is_unknown_kind());
        assert!(ClientError::Parsing.is_unknown_kind());
        assert!(ClientError::Unknown.is_unknown_kind());
        assert!(!ClientError::Unauthorized.is_unknown_kind());
        assert!(!ClientError::Cancelled.is_unknown_kind());
    }
}
