use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;

const TMDB_BASE: &str = "https://api.themoviedb.org/3";

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
}

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn search_movies(&self, query: &str) -> Result<Vec<MovieSummary>>;
    async fn popular_movies(&self) -> Result<Vec<MovieSummary>>;
    async fn top_rated_movies(&self) -> Result<Vec<MovieSummary>>;
    async fn movie_details(&self, id: i64) -> Result<MovieDetails>;
    async fn movie_trailer(&self, id: i64) -> Result<Trailer>;
}

/// One entry of a search or listing response. Field names follow the
/// upstream wire format so callers can pass records through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieSummary {
    pub id: i64,
    pub title: String,
    pub poster_path: Option<String>,
    pub vote_average: f32,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieDetails {
    pub id: i64,
    pub title: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub overview: String,
    #[serde(default)]
    pub release_date: Option<String>,
    pub runtime: Option<u32>,
    pub vote_average: f32,
    #[serde(default)]
    pub genres: Vec<Genre>,
    pub status: String,
    #[serde(default)]
    pub budget: i64,
    #[serde(default)]
    pub credits: Option<Credits>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastMember {
    pub name: String,
    pub character: String,
}

/// Promotional video entry. `kind` is the upstream `type` field; a movie
/// without a trailer is represented by the empty-key sentinel, never by a
/// missing value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trailer {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Trailer {
    pub fn none() -> Self {
        Self {
            key: String::new(),
            kind: String::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.key.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    results: Vec<MovieSummary>,
}

#[derive(Debug, Deserialize)]
struct Videos {
    results: Vec<Trailer>,
}

impl TmdbClient {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("TMDB_API_KEY").context("TMDB_API_KEY not set")?;
        Ok(Self {
            client: Client::new(),
            api_key,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .context("request failed")?;
        let status = res.status();
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            return Err(anyhow!("{} -> {}", url, text));
        }
        let parsed: T = serde_json::from_str(&text).context("JSON parse failed")?;
        Ok(parsed)
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn search_movies(&self, query: &str) -> Result<Vec<MovieSummary>> {
        let url = format!(
            "{TMDB_BASE}/search/movie?api_key={}&query={}",
            self.api_key,
            urlencoding::encode(query)
        );
        let data: ListResponse = self.get_json(&url).await?;
        Ok(data.results)
    }

    async fn popular_movies(&self) -> Result<Vec<MovieSummary>> {
        let url = format!("{TMDB_BASE}/movie/popular?api_key={}", self.api_key);
        let data: ListResponse = self.get_json(&url).await?;
        Ok(data.results)
    }

    async fn top_rated_movies(&self) -> Result<Vec<MovieSummary>> {
        let url = format!("{TMDB_BASE}/movie/top_rated?api_key={}", self.api_key);
        let data: ListResponse = self.get_json(&url).await?;
        Ok(data.results)
    }

    async fn movie_details(&self, id: i64) -> Result<MovieDetails> {
        let url = format!(
            "{TMDB_BASE}/movie/{id}?api_key={}&append_to_response=credits",
            self.api_key
        );
        self.get_json(&url).await
    }

    async fn movie_trailer(&self, id: i64) -> Result<Trailer> {
        let url = format!("{TMDB_BASE}/movie/{id}/videos?api_key={}", self.api_key);
        let data: Videos = self.get_json(&url).await?;
        Ok(select_trailer(data.results))
    }
}

/// First video whose type is exactly "Trailer"; the sentinel when none is.
pub fn select_trailer(videos: Vec<Trailer>) -> Trailer {
    videos
        .into_iter()
        .find(|v| v.kind == "Trailer")
        .unwrap_or_else(Trailer::none)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn picks_first_trailer_entry_skipping_other_kinds() {
        let videos = vec![
            Trailer {
                key: "teaser1".to_string(),
                kind: "Teaser".to_string(),
            },
            Trailer {
                key: "trail1".to_string(),
                kind: "Trailer".to_string(),
            },
            Trailer {
                key: "trail2".to_string(),
                kind: "Trailer".to_string(),
            },
        ];
        let selected = select_trailer(videos);
        assert_eq!(selected.key, "trail1");
        assert_eq!(selected.kind, "Trailer");
    }

    #[test]
    fn no_trailer_entry_yields_empty_key_sentinel() {
        let videos = vec![Trailer {
            key: "clip".to_string(),
            kind: "Clip".to_string(),
        }];
        let selected = select_trailer(videos);
        assert!(selected.is_none());
        assert_eq!(selected, Trailer::none());
    }

    #[test]
    fn trailer_kind_round_trips_as_type_on_the_wire() {
        let parsed: Trailer = serde_json::from_value(json!({ "key": "abc123", "type": "Trailer" }))
            .expect("trailer deserialize");
        assert_eq!(parsed.kind, "Trailer");
        let emitted = serde_json::to_value(&parsed).expect("trailer serialize");
        assert_eq!(emitted["type"], "Trailer");
    }

    #[test]
    fn listing_preserves_upstream_order_and_length() {
        let data: ListResponse = serde_json::from_value(json!({
            "page": 1,
            "results": [
                { "id": 268, "title": "Batman", "poster_path": "/a.jpg", "vote_average": 7.2, "release_date": "1989-06-23" },
                { "id": 272, "title": "Batman Begins", "poster_path": "/b.jpg", "vote_average": 7.7, "release_date": "2005-06-10" },
                { "id": 414, "title": "Batman Forever", "poster_path": null, "vote_average": 5.4, "release_date": "1995-06-16" }
            ],
            "total_results": 3
        }))
        .expect("listing deserialize");
        let titles: Vec<&str> = data.results.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["Batman", "Batman Begins", "Batman Forever"]);
        assert_eq!(data.results[2].poster_path, None);
    }

    #[test]
    fn details_tolerates_missing_credits_and_runtime() {
        let details: MovieDetails = serde_json::from_value(json!({
            "id": 603,
            "title": "The Matrix",
            "poster_path": "/matrix.jpg",
            "backdrop_path": null,
            "overview": "A hacker learns the truth.",
            "release_date": "1999-03-30",
            "runtime": null,
            "vote_average": 8.2,
            "genres": [{ "id": 28, "name": "Action" }],
            "status": "Released",
            "budget": 63000000
        }))
        .expect("details deserialize");
        assert_eq!(details.runtime, None);
        assert!(details.credits.is_none());
        assert_eq!(details.genres[0].name, "Action");
    }

    #[test]
    fn details_exposes_embedded_cast() {
        let details: MovieDetails = serde_json::from_value(json!({
            "id": 603,
            "title": "The Matrix",
            "poster_path": "/matrix.jpg",
            "backdrop_path": "/matrix-bg.jpg",
            "overview": "A hacker learns the truth.",
            "release_date": "1999-03-30",
            "runtime": 136,
            "vote_average": 8.2,
            "genres": [],
            "status": "Released",
            "budget": 63000000,
            "credits": {
                "cast": [
                    { "name": "Keanu Reeves", "character": "Neo", "order": 0 },
                    { "name": "Carrie-Anne Moss", "character": "Trinity", "order": 1 }
                ]
            }
        }))
        .expect("details deserialize");
        let cast = details.credits.expect("credits present").cast;
        assert_eq!(cast.len(), 2);
        assert_eq!(cast[0].character, "Neo");
    }
}
