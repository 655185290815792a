pub mod error;
pub mod types;

pub use error::{Result, TwitterError};
pub use types::{AccountKey, CursoredUsers, User, UserPage};

use chrono::{DateTime, Duration, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

const BASE_URL: &str = "https://api.twitter.com/1.1";

/// Maximum IDs accepted by `users/lookup`.
pub const MAX_LOOKUP_IDS: usize = 100;

/// Users returned per `friends/list` / `followers/list` page.
const PAGE_SIZE: u32 = 200;

/// Header carrying the epoch second at which the rate-limit window resets.
const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// Used when a 429 arrives without a reset header: one standard window.
const DEFAULT_RATE_LIMIT_WINDOW_MINUTES: i64 = 15;

pub struct TwitterClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl TwitterClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, BASE_URL.to_string())
    }

    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Bulk-resolve full user objects. IDs beyond [`MAX_LOOKUP_IDS`] are ignored.
    pub async fn lookup_users(&self, ids: &[i64]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = &ids[..ids.len().min(MAX_LOOKUP_IDS)];
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let url = format!("{}/users/lookup.json", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("user_id", joined.as_str()), ("include_entities", "false")])
            .send()
            .await?;

        // users/lookup answers 404 when none of the IDs resolve.
        if resp.status() == StatusCode::NOT_FOUND {
            tracing::debug!(count = ids.len(), "No users resolved by lookup");
            return Ok(Vec::new());
        }

        let users: Vec<User> = Self::parse(resp).await?;
        tracing::debug!(requested = ids.len(), resolved = users.len(), "Users lookup");
        Ok(users)
    }

    /// One page of accounts the given account follows.
    pub async fn following_page(
        &self,
        account: AccountKey<'_>,
        cursor: Option<&str>,
    ) -> Result<UserPage> {
        self.list_page("friends/list.json", account, cursor).await
    }

    /// One page of accounts following the given account.
    pub async fn followers_page(
        &self,
        account: AccountKey<'_>,
        cursor: Option<&str>,
    ) -> Result<UserPage> {
        self.list_page("followers/list.json", account, cursor).await
    }

    async fn list_page(
        &self,
        endpoint: &str,
        account: AccountKey<'_>,
        cursor: Option<&str>,
    ) -> Result<UserPage> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let (key, value) = match account {
            AccountKey::UserId(id) => ("user_id", id.to_string()),
            AccountKey::ScreenName(name) => ("screen_name", name.to_string()),
        };
        let count = PAGE_SIZE.to_string();

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                (key, value.as_str()),
                ("cursor", cursor.unwrap_or("-1")),
                ("count", count.as_str()),
                ("skip_status", "true"),
                ("include_user_entities", "false"),
            ])
            .send()
            .await?;

        let raw: CursoredUsers = Self::parse(resp).await?;
        let page = UserPage::from(raw);
        tracing::debug!(
            endpoint,
            users = page.users.len(),
            has_next = page.next_cursor.is_some(),
            "Fetched user page"
        );
        Ok(page)
    }

    async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset_at = rate_limit_reset(resp.headers(), Utc::now());
            tracing::warn!(%reset_at, "Rate limit response");
            return Err(TwitterError::RateLimited { reset_at });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TwitterError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Reset time advertised by a rate-limited response, or one window from `now`.
fn rate_limit_reset(headers: &HeaderMap, now: DateTime<Utc>) -> DateTime<Utc> {
    headers
        .get(RATE_LIMIT_RESET_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(|| now + Duration::minutes(DEFAULT_RATE_LIMIT_WINDOW_MINUTES))
}
