//! Authority service types
//!
//! Wire shapes follow the Spotify Web API (client-credentials token and
//! artist search). Only the fields used for matching are typed; the full
//! artist object is kept as an opaque JSON snapshot.

use std::time::Duration;

use serde::Deserialize;

/// A freshly issued bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: Duration,
}

/// One ranked search hit
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorityMatch {
    pub name: String,
    pub popularity: i32,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub artists: ArtistPage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArtistPage {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ArtistFields {
    name: String,
    #[serde(default)]
    popularity: i32,
}

impl AuthorityMatch {
    /// Build a match from a raw artist object, keeping the object as data.
    pub(crate) fn from_artist(item: serde_json::Value) -> Result<Self, serde_json::Error> {
        let fields: ArtistFields = serde_json::from_value(item.clone())?;
        Ok(Self {
            name: fields.name,
            popularity: fields.popularity,
            data: item,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_response() {
        let body = serde_json::json!({
            "artists": {
                "href": "https://api.spotify.com/v1/search?query=beatles",
                "items": [
                    { "id": "3WrFJ7ztbogyGnTHbHJFl2", "name": "The Beatles", "popularity": 95, "genres": ["rock"] },
                    { "id": "x", "name": "Beatles Revival" }
                ]
            }
        });

        let page: SearchResponse = serde_json::from_value(body).unwrap();
        let matches: Vec<_> = page
            .artists
            .items
            .into_iter()
            .map(|item| AuthorityMatch::from_artist(item).unwrap())
            .collect();

        assert_eq!(matches[0].name, "The Beatles");
        assert_eq!(matches[0].popularity, 95);
        assert_eq!(matches[0].data["genres"][0], "rock");
        assert_eq!(matches[1].popularity, 0);
    }

    #[test]
    fn test_parse_token_response() {
        let token: TokenResponse = serde_json::from_str(
            r#"{"access_token":"abc","token_type":"Bearer","expires_in":3600}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in, 3600);
    }
}
