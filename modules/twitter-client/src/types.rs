use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Format of `created_at` on v1.1 user objects, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// A user object as returned by the v1.1 user endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub screen_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub followers_count: i64,
    #[serde(default)]
    pub friends_count: i64,
    #[serde(default)]
    pub favourites_count: i64,
    #[serde(default)]
    pub statuses_count: i64,
    #[serde(default)]
    pub listed_count: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub protected: bool,
}

impl User {
    /// Account creation time. Unparseable values fall back to the Unix epoch.
    pub fn joined_at(&self) -> DateTime<Utc> {
        DateTime::parse_from_str(&self.created_at, CREATED_AT_FORMAT)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default()
    }
}

/// One page of a cursored user list (`friends/list`, `followers/list`).
#[derive(Debug, Clone, Deserialize)]
pub struct CursoredUsers {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub next_cursor_str: String,
}

/// A page of users plus the cursor for the next page, if any.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub next_cursor: Option<String>,
}

impl From<CursoredUsers> for UserPage {
    fn from(raw: CursoredUsers) -> Self {
        let next_cursor = match raw.next_cursor_str.as_str() {
            "" | "0" => None,
            other => Some(other.to_string()),
        };
        Self {
            users: raw.users,
            next_cursor,
        }
    }
}

/// How an endpoint addresses the account whose edges are listed.
#[derive(Debug, Clone, Copy)]
pub enum AccountKey<'a> {
    UserId(i64),
    ScreenName(&'a str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const USER_JSON: &str = r#"{
        "id": 783214,
        "id_str": "783214",
        "name": "Twitter",
        "screen_name": "Twitter",
        "location": "everywhere",
        "description": "What's happening?!",
        "protected": false,
        "verified": true,
        "followers_count": 56000000,
        "friends_count": 30,
        "listed_count": 90000,
        "created_at": "Tue Feb 20 14:35:54 +0000 2007",
        "favourites_count": 6000,
        "statuses_count": 14000
    }"#;

    #[test]
    fn deserializes_user_object() {
        let user: User = serde_json::from_str(USER_JSON).unwrap();
        assert_eq!(user.id, 783214);
        assert_eq!(user.screen_name, "Twitter");
        assert_eq!(user.friends_count, 30);
        assert!(user.verified);
        assert!(!user.protected);
        assert_eq!(
            user.joined_at(),
            Utc.with_ymd_and_hms(2007, 2, 20, 14, 35, 54).unwrap()
        );
    }

    #[test]
    fn missing_optional_fields_default() {
        let user: User = serde_json::from_str(r#"{"id": 1, "screen_name": "x"}"#).unwrap();
        assert!(user.description.is_none());
        assert_eq!(user.followers_count, 0);
        assert_eq!(user.joined_at(), DateTime::<Utc>::default());
    }

    #[test]
    fn zero_cursor_ends_pagination() {
        let raw: CursoredUsers =
            serde_json::from_str(r#"{"users": [], "next_cursor_str": "0"}"#).unwrap();
        assert!(UserPage::from(raw).next_cursor.is_none());

        let raw: CursoredUsers =
            serde_json::from_str(r#"{"users": [], "next_cursor_str": "1489467234237774933"}"#)
                .unwrap();
        assert_eq!(
            UserPage::from(raw).next_cursor.as_deref(),
            Some("1489467234237774933")
        );
    }
}
