//! Gmail OAuth2 access-token refresh, §4.J step 2.

use serde::Deserialize;
use tracing::instrument;

use crate::error::{EmailError, Result};

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchanges a stored refresh token for a fresh access token. Never logs
/// the token itself, only the outcome.
#[instrument(skip(client_id, client_secret, refresh_token))]
pub async fn refresh_access_token(client_id: &str, client_secret: &str, refresh_token: &str) -> Result<String> {
    let client = reqwest::Client::new();
    let response = client
        .post(TOKEN_ENDPOINT)
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .map_err(|e| EmailError::OAuthRefresh(e.to_string()))?;

    if !response.status().is_success() {
        return Err(EmailError::OAuthRefresh(format!("token endpoint returned {}", response.status())));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| EmailError::OAuthRefresh(e.to_string()))?;

    tracing::info!("refreshed gmail access token");
    Ok(body.access_token)
}
