//! Bearer token resolution for the Fabric API.
//!
//! A token supplied up front is used as is. Otherwise the credentials are
//! exchanged once against the identity provider's token endpoint and the
//! result is kept for the rest of the run. There is no refresh: an expired
//! token shows up as an authorization failure on the next API call.

use crate::config::IdentityConfig;
use crate::http::HttpSender;
use crate::provider::{ApiError, ApiResult};
use reqwest::Method;
use serde::Deserialize;
use std::fmt;
use tokio::sync::OnceCell;
use tracing::{info, warn};

#[derive(Clone)]
pub enum Credential {
    /// Pre-issued bearer token
    Token(String),
    /// Resource-owner password grant (account without MFA)
    UserPassword {
        tenant_id: String,
        client_id: String,
        username: String,
        password: String,
    },
    /// Client-credentials grant of a service principal
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Token(token) => f.debug_tuple("Token").field(&token_preview(token)).finish(),
            Credential::UserPassword {
                tenant_id,
                client_id,
                username,
                ..
            } => f
                .debug_struct("UserPassword")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credential::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

fn present(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Raw credential inputs as they arrive from flags or the environment.
#[derive(Default, Clone)]
pub struct CredentialInputs<'a> {
    pub token: Option<&'a str>,
    pub tenant_id: Option<&'a str>,
    pub client_id: Option<&'a str>,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub client_secret: Option<&'a str>,
}

impl Credential {
    /// Picks the credential to use: a token wins, then user/password, then a
    /// client secret. Incomplete tuples are an authentication error.
    pub fn from_inputs(inputs: &CredentialInputs<'_>) -> ApiResult<Self> {
        if let Some(token) = present(inputs.token) {
            return Ok(Credential::Token(token));
        }

        let tenant_id = present(inputs.tenant_id);
        let client_id = present(inputs.client_id);
        let username = present(inputs.username);
        let password = present(inputs.password);
        let client_secret = present(inputs.client_secret);

        match (tenant_id, client_id, username, password, client_secret) {
            (Some(tenant_id), Some(client_id), Some(username), Some(password), _) => {
                Ok(Credential::UserPassword {
                    tenant_id,
                    client_id,
                    username,
                    password,
                })
            }
            (Some(tenant_id), Some(client_id), None, None, Some(client_secret)) => {
                Ok(Credential::ClientSecret {
                    tenant_id,
                    client_id,
                    client_secret,
                })
            }
            _ => Err(ApiError::Authentication {
                message: "provide a Fabric token, or tenant id, client id and either \
                          user name + password or a client secret"
                    .to_string(),
            }),
        }
    }

    fn form(&self, scope: &str) -> Vec<(&'static str, String)> {
        match self {
            Credential::Token(_) => Vec::new(),
            Credential::UserPassword {
                client_id,
                username,
                password,
                ..
            } => vec![
                ("grant_type", "password".to_string()),
                ("client_id", client_id.clone()),
                ("username", username.clone()),
                ("password", password.clone()),
                ("scope", scope.to_string()),
            ],
            Credential::ClientSecret {
                client_id,
                client_secret,
                ..
            } => vec![
                ("grant_type", "client_credentials".to_string()),
                ("client_id", client_id.clone()),
                ("client_secret", client_secret.clone()),
                ("scope", scope.to_string()),
            ],
        }
    }

    fn tenant_id(&self) -> Option<&str> {
        match self {
            Credential::Token(_) => None,
            Credential::UserPassword { tenant_id, .. } | Credential::ClientSecret { tenant_id, .. } => {
                Some(tenant_id)
            }
        }
    }
}

/// First 20 characters followed by `...`; never the whole token.
pub fn token_preview(token: &str) -> String {
    if token.chars().count() > 20 {
        format!("{}...", token.chars().take(20).collect::<String>())
    } else {
        "<short token>".to_string()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn error_message(self) -> Option<String> {
        match (self.error, self.error_description) {
            (Some(error), Some(description)) => Some(format!("{}: {}", error, description)),
            (Some(error), None) => Some(error),
            (None, Some(description)) => Some(description),
            (None, None) => None,
        }
    }
}

pub struct TokenResolver {
    credential: Credential,
    config: IdentityConfig,
    sender: HttpSender,
    cached: OnceCell<String>,
}

impl TokenResolver {
    pub fn new(credential: Credential, config: IdentityConfig) -> ApiResult<Self> {
        config
            .validate()
            .map_err(|message| ApiError::InvalidConfig { message })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let sender = HttpSender::new(client, config.retry.clone());

        Ok(Self {
            credential,
            config,
            sender,
            cached: OnceCell::new(),
        })
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The bearer token for this run. Exchanged at most once.
    pub async fn token(&self) -> ApiResult<&str> {
        let token = self.cached.get_or_try_init(|| self.acquire()).await?;
        Ok(token.as_str())
    }

    async fn acquire(&self) -> ApiResult<String> {
        let token = match &self.credential {
            Credential::Token(token) => {
                info!("Fabric token supplied, skipping credential exchange");
                token.clone()
            }
            credential => self.exchange(credential).await?,
        };

        if token.trim().is_empty() {
            return Err(ApiError::Authentication {
                message: "identity provider returned an empty token".to_string(),
            });
        }

        info!(
            preview = %token_preview(&token),
            length = token.len(),
            "Fabric token ready"
        );
        Ok(token)
    }

    async fn exchange(&self, credential: &Credential) -> ApiResult<String> {
        let tenant_id = credential.tenant_id().unwrap_or_default();
        let url = self.config.token_url(tenant_id);
        info!(tenant_id, "Exchanging credentials for a Fabric token");

        let form = credential.form(&self.config.scope);
        let response = match self
            .sender
            .send(Method::POST, &url, |request| request.form(&form))
            .await
        {
            Ok(response) => response,
            Err(ApiError::Status { status, body, .. }) => {
                let message = serde_json::from_str::<TokenResponse>(&body)
                    .ok()
                    .and_then(TokenResponse::error_message)
                    .unwrap_or_else(|| format!("token endpoint answered {}", status));
                warn!(status, "Fabric token could not be obtained");
                return Err(ApiError::Authentication { message });
            }
            Err(err) => return Err(err),
        };

        let status = response.status();
        let body: TokenResponse = response.json().await.map_err(|e| ApiError::Authentication {
            message: format!("unreadable token response ({}): {}", status, e),
        })?;

        match body.access_token {
            Some(token) => Ok(token),
            None => Err(ApiError::Authentication {
                message: body
                    .error_message()
                    .unwrap_or_else(|| "token response carried no access_token".to_string()),
            }),
        }
    }
}
