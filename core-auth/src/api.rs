//! # Survey API wire layer
//!
//! [`AuthApi`] is the seam between the authenticated client and the network.
//! [`HttpAuthApi`] implements it over a host [`HttpClient`] against the
//! NimbleSurvey JSON:API backend:
//!
//! | operation | request |
//! |---|---|
//! | `login` | `POST {base}/oauth/token` with `grant_type=password` |
//! | `refresh_token` | `POST {base}/oauth/token` with `grant_type=refresh_token` |
//! | `survey_list` | `GET {base}/surveys?page[number]=N&page[size]=M` |
//!
//! Every failure is classified into a [`WireError`]; HTTP 401 is always
//! [`WireError::Unauthorized`] so the client can run its refresh protocol.

use crate::error::WireError;
use crate::types::{Credential, Survey};
use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_runtime::config::DEFAULT_REQUEST_TIMEOUT;
use core_runtime::logging::redact_if_sensitive;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub type WireResult<T> = std::result::Result<T, WireError>;

/// Survey API operations used by the authenticated client.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Password grant.
    async fn login(
        &self,
        email: &str,
        password: &str,
        client_id: &str,
        client_secret: &str,
    ) -> WireResult<Credential>;

    /// Refresh grant. The returned credential replaces the old one.
    async fn refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> WireResult<Credential>;

    /// One page of surveys. `bearer` is sent as `Authorization: Bearer ...`.
    async fn survey_list(
        &self,
        page_number: u32,
        page_size: u32,
        bearer: Option<&str>,
    ) -> WireResult<Vec<Survey>>;
}

#[derive(Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
enum TokenRequest<'a> {
    Password {
        email: &'a str,
        password: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
    },
    RefreshToken {
        refresh_token: &'a str,
        client_id: &'a str,
        client_secret: &'a str,
    },
}

#[derive(Deserialize)]
struct Document<T> {
    data: T,
}

#[derive(Deserialize)]
struct Resource<A> {
    #[serde(default)]
    id: Option<serde_json::Value>,
    attributes: A,
}

#[derive(Deserialize)]
struct TokenAttributes {
    access_token: String,
    token_type: String,
    expires_in: f64,
    refresh_token: String,
    created_at: f64,
}

#[derive(Deserialize)]
struct SurveyAttributes {
    title: String,
    description: String,
    #[serde(default)]
    cover_image_url: Option<String>,
}

impl Resource<SurveyAttributes> {
    fn into_survey(self) -> Survey {
        let id = match self.id {
            Some(serde_json::Value::String(id)) => id,
            _ => Uuid::new_v4().to_string(),
        };

        Survey {
            id,
            title: self.attributes.title,
            description: self.attributes.description,
            cover_image_url: self.attributes.cover_image_url,
        }
    }
}

/// [`AuthApi`] over HTTP + JSON:API.
pub struct HttpAuthApi {
    base_url: String,
    timeout: Duration,
    http_client: Arc<dyn HttpClient>,
}

impl HttpAuthApi {
    /// `base_url` must already be normalized (no trailing slash), as
    /// `ClientConfig` guarantees.
    pub fn new(base_url: impl Into<String>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            http_client,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url)
    }

    fn surveys_url(&self, page_number: u32, page_size: u32) -> WireResult<String> {
        let query = serde_urlencoded::to_string(&[
            ("page[number]", page_number),
            ("page[size]", page_size),
        ])
        .map_err(|e| {
            warn!(error = %e, "Failed to encode survey query");
            WireError::Unknown
        })?;

        Ok(format!("{}/surveys?{}", self.base_url, query))
    }

    async fn send(&self, request: HttpRequest) -> WireResult<HttpResponse> {
        let request = request
            .header("Accept", "application/json")
            .timeout(self.timeout);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| classify_bridge_error(&e))?;

        debug!(status = response.status, "Survey API responded");

        match classify_status(response.status) {
            None => Ok(response),
            Some(error) => {
                warn!(status = response.status, error = %error, "Survey API request failed");
                Err(error)
            }
        }
    }

    async fn exchange_token(&self, body: &TokenRequest<'_>) -> WireResult<Credential> {
        let request = HttpRequest::new(HttpMethod::Post, self.token_url())
            .json(body)
            .map_err(|e| {
                warn!(error = %e, "Failed to encode token request");
                WireError::Unknown
            })?;

        let response = self.send(request).await?;
        let document: Document<Resource<TokenAttributes>> = decode(&response)?;
        let token = document.data.attributes;

        Credential::issued(
            token.access_token,
            token.token_type,
            token.refresh_token,
            token.created_at,
            token.expires_in,
        )
        .ok_or_else(|| {
            warn!(
                created_at = token.created_at,
                expires_in = token.expires_in,
                "Token expiry is out of range"
            );
            WireError::Parsing
        })
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    #[instrument(skip_all, fields(email = %redact_if_sensitive("email", email)))]
    async fn login(
        &self,
        email: &str,
        password: &str,
        client_id: &str,
        client_secret: &str,
    ) -> WireResult<Credential> {
        self.exchange_token(&TokenRequest::Password {
            email,
            password,
            client_id,
            client_secret,
        })
        .await
    }

    #[instrument(skip_all)]
    async fn refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> WireResult<Credential> {
        self.exchange_token(&TokenRequest::RefreshToken {
            refresh_token,
            client_id,
            client_secret,
        })
        .await
    }

    #[instrument(skip(self, bearer), fields(authorized = bearer.is_some()))]
    async fn survey_list(
        &self,
        page_number: u32,
        page_size: u32,
        bearer: Option<&str>,
    ) -> WireResult<Vec<Survey>> {
        let mut request = HttpRequest::new(HttpMethod::Get, self.surveys_url(page_number, page_size)?);
        if let Some(token) = bearer {
            request = request.bearer_token(token);
        }

        let response = self.send(request).await?;
        let document: Document<Vec<Resource<SurveyAttributes>>> = decode(&response)?;

        let surveys: Vec<Survey> = document
            .data
            .into_iter()
            .map(Resource::into_survey)
            .collect();

        debug!(count = surveys.len(), "Decoded survey page");
        Ok(surveys)
    }
}

/// Map an HTTP status to a wire error; `None` for 2xx.
fn classify_status(status: u16) -> Option<WireError> {
    match status {
        200..=299 => None,
        400 => Some(WireError::BadRequest),
        401 => Some(WireError::Unauthorized),
        404 => Some(WireError::NotFound),
        _ => Some(WireError::Network),
    }
}

fn classify_bridge_error(error: &BridgeError) -> WireError {
    if error.is_transport() {
        warn!(error = %error, "Survey API unreachable");
        WireError::Network
    } else {
        warn!(error = %error, "HTTP bridge failed");
        WireError::Unknown
    }
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> WireResult<T> {
    if response.body.is_empty() {
        warn!(status = response.status, "Survey API returned an empty body");
        return Err(WireError::Unknown);
    }

    serde_json::from_slice(&response.body).map_err(|e| {
        warn!(error = %e, "Failed to decode survey API response");
        WireError::Parsing
    })
}
