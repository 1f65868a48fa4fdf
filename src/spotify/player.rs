//! Recently played lookup against the Spotify Web API.

use super::SpotifyClient;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The track a user listened to most recently.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningTo {
    pub track: String,
    pub artists: Vec<String>,
    pub album: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub played_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RecentlyPlayed {
    #[serde(default)]
    items: Vec<PlayHistory>,
}

#[derive(Deserialize)]
struct PlayHistory {
    track: Track,
    played_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Track {
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
    album: Album,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Deserialize)]
struct Artist {
    name: String,
}

#[derive(Deserialize)]
struct Album {
    name: String,
}

#[derive(Deserialize, Default)]
struct ExternalUrls {
    spotify: Option<String>,
}

impl From<PlayHistory> for ListeningTo {
    fn from(item: PlayHistory) -> Self {
        Self {
            track: item.track.name,
            artists: item.track.artists.into_iter().map(|a| a.name).collect(),
            album: item.track.album.name,
            url: item.track.external_urls.spotify,
            played_at: item.played_at,
        }
    }
}

impl SpotifyClient {
    /// Fetches the user's most recently played track.
    ///
    /// Requires the `user-read-recently-played` scope. Returns `Ok(None)` when
    /// the listening history is empty.
    pub async fn fetch_listening_to(&self, access_token: &str) -> Result<Option<ListeningTo>> {
        let url = format!("{}/me/player/recently-played", self.config.api_base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("limit", "1")])
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to send recently-played request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(anyhow!(
                "Spotify API returned status {}: {}",
                status,
                body
            ));
        }

        let recent: RecentlyPlayed = response
            .json()
            .await
            .context("Failed to parse recently-played response")?;

        Ok(recent.items.into_iter().next().map(ListeningTo::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::SpotifyConfig;
    use mockito::Matcher;

    const RECENTLY_PLAYED: &str = r#"{
        "items": [{
            "track": {
                "name": "Windowlicker",
                "artists": [{ "name": "Aphex Twin" }],
                "album": { "name": "Windowlicker" },
                "external_urls": { "spotify": "https://open.spotify.com/track/abc" }
            },
            "played_at": "2024-03-01T11:58:00.000Z"
        }],
        "limit": 1
    }"#;

    fn client_for(server: &mockito::Server) -> SpotifyClient {
        SpotifyClient::new(SpotifyConfig {
            api_base_url: format!("{}/v1", server.url()),
            ..SpotifyConfig::default()
        })
    }

    #[tokio::test]
    async fn test_fetch_listening_to() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/me/player/recently-played")
            .match_query(Matcher::UrlEncoded("limit".into(), "1".into()))
            .match_header("authorization", "Bearer A1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(RECENTLY_PLAYED)
            .create_async()
            .await;

        let listening = client_for(&server)
            .fetch_listening_to("A1")
            .await
            .unwrap()
            .expect("expected a track");

        assert_eq!(listening.track, "Windowlicker");
        assert_eq!(listening.artists, vec!["Aphex Twin".to_string()]);
        assert_eq!(listening.album, "Windowlicker");
        assert_eq!(
            listening.url.as_deref(),
            Some("https://open.spotify.com/track/abc")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_history_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/me/player/recently-played")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"items":[]}"#)
            .create_async()
            .await;

        let listening = client_for(&server).fetch_listening_to("A1").await.unwrap();
        assert!(listening.is_none());
    }

    #[tokio::test]
    async fn test_expired_token_rejected_by_api() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/me/player/recently-played")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error":{"status":401,"message":"The access token expired"}}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .fetch_listening_to("stale")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_listening_to_serializes_camel_case() {
        let listening = ListeningTo {
            track: "Song".to_string(),
            artists: vec!["Band".to_string()],
            album: "Record".to_string(),
            url: None,
            played_at: DateTime::parse_from_rfc3339("2024-03-01T11:58:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };

        let json = serde_json::to_value(&listening).unwrap();
        assert_eq!(json["track"], "Song");
        assert!(json.get("playedAt").is_some());
        assert!(json.get("url").is_none());
    }
}
