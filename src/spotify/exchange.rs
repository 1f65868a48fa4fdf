//! OAuth token exchanges against the Spotify accounts service.

use super::SpotifyClient;
use crate::tokens::{ProviderClient, TokenGrant};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    token_type: Option<String>,
}

impl SpotifyClient {
    /// POSTs a grant to the token endpoint and parses the issued tokens.
    async fn request_token(&self, grant_type: &str, params: &[(&str, &str)]) -> Result<TokenGrant> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", grant_type),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        form.extend_from_slice(params);

        tracing::debug!(
            grant_type = %grant_type,
            token_url = %self.config.token_url,
            "Requesting Spotify token"
        );

        let response = self
            .http
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .context("Failed to send token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(anyhow!(
                "Token endpoint returned status {}: {}",
                status,
                body
            ));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        tracing::debug!(
            grant_type = %grant_type,
            has_refresh_token = token_response.refresh_token.is_some(),
            expires_in = token_response.expires_in,
            token_type = ?token_response.token_type,
            "Spotify token issued"
        );

        Ok(TokenGrant {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_in: token_response.expires_in,
        })
    }
}

#[async_trait]
impl ProviderClient for SpotifyClient {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant> {
        self.request_token(
            "authorization_code",
            &[("code", code), ("redirect_uri", redirect_uri)],
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.request_token("refresh_token", &[("refresh_token", refresh_token)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::SpotifyConfig;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> SpotifyClient {
        SpotifyClient::new(SpotifyConfig {
            client_id: "cid".to_string(),
            client_secret: "csecret".to_string(),
            token_url: format!("{}/api/token", server.url()),
            ..SpotifyConfig::default()
        })
    }

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"{
            "access_token": "BQD_access",
            "token_type": "Bearer",
            "scope": "user-read-recently-played",
            "expires_in": 3600,
            "refresh_token": "AQD_refresh"
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "BQD_access");
        assert_eq!(response.refresh_token, Some("AQD_refresh".to_string()));
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.token_type, Some("Bearer".to_string()));
    }

    #[test]
    fn test_token_response_requires_expires_in() {
        let json = r#"{ "access_token": "BQD_access" }"#;
        assert!(serde_json::from_str::<TokenResponse>(json).is_err());
    }

    #[tokio::test]
    async fn test_exchange_code_sends_authorization_code_grant() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "goodcode".into()),
                Matcher::UrlEncoded("redirect_uri".into(), "https://cb".into()),
                Matcher::UrlEncoded("client_id".into(), "cid".into()),
                Matcher::UrlEncoded("client_secret".into(), "csecret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"A1","refresh_token":"R1","expires_in":3600,"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let grant = client_for(&server)
            .exchange_code("goodcode", "https://cb")
            .await
            .unwrap();

        assert_eq!(
            grant,
            TokenGrant {
                access_token: "A1".to_string(),
                refresh_token: Some("R1".to_string()),
                expires_in: 3600,
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_sends_refresh_token_grant() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "R1".into()),
                Matcher::UrlEncoded("client_id".into(), "cid".into()),
                Matcher::UrlEncoded("client_secret".into(), "csecret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"A2","expires_in":3600}"#)
            .create_async()
            .await;

        let grant = client_for(&server).refresh("R1").await.unwrap();

        assert_eq!(grant.access_token, "A2");
        // Provider did not rotate; the manager keeps the old refresh token
        assert_eq!(grant.refresh_token, None);
        assert_eq!(grant.expires_in, 3600);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_failure_includes_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#)
            .create_async()
            .await;

        let err = client_for(&server).refresh("revoked").await.unwrap_err();
        let message = format!("{:#}", err);

        assert!(message.contains("400"));
        assert!(message.contains("invalid_grant"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token":"nope"}"#)
            .create_async()
            .await;

        let err = client_for(&server).refresh("R1").await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse token response"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let client = SpotifyClient::new(SpotifyConfig {
            token_url: "http://127.0.0.1:9/api/token".to_string(),
            ..SpotifyConfig::default()
        });

        assert!(client.refresh("R1").await.is_err());
    }
}
