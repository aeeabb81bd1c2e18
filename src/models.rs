use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::backend::Document;
use crate::timestamp;

pub const POSTS: &str = "posts";
pub const USERS: &str = "users";

/// UI limits. The data-access layer does not enforce them.
pub const MAX_POST_LENGTH: usize = 500;
pub const MAX_COMMENT_LENGTH: usize = 200;

pub const ANONYMOUS: &str = "Anonymous";

/// The backend's identity record for a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl AuthUser {
    /// The part of the email before `@`, if there is a non-empty one.
    pub fn email_local_part(&self) -> Option<&str> {
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|s| !s.is_empty())
    }
}

/// Author display identity copied onto posts and comments at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorSnapshot {
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub user_avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(author: &AuthorSnapshot, text: &str) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: author.user_id.clone(),
            user_name: author.user_name.clone(),
            user_avatar: author.user_avatar.clone(),
            text: text.trim().to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn from_value(value: &Value) -> Self {
        Self {
            id: string_field(value, "id").unwrap_or_default(),
            user_id: string_field(value, "userId").unwrap_or_default(),
            user_name: string_field(value, "userName").unwrap_or_else(|| ANONYMOUS.to_string()),
            user_avatar: string_field(value, "userAvatar"),
            text: string_field(value, "text").unwrap_or_default(),
            created_at: timestamp::parse_timestamp(value.get("createdAt")),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "userId": self.user_id,
            "userName": self.user_name,
            "userAvatar": self.user_avatar,
            "text": self.text,
            "createdAt": timestamp::to_value(self.created_at),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub user_avatar: Option<String>,
    pub text: String,
    pub image_url: Option<String>,
    pub likes: BTreeSet<String>,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn from_document(doc: &Document) -> Self {
        let data = &doc.data;

        let likes = data
            .get("likes")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let comments = data
            .get("comments")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().map(Comment::from_value).collect())
            .unwrap_or_default();

        Self {
            id: doc.id.clone(),
            user_id: string_field(data, "userId").unwrap_or_default(),
            user_name: string_field(data, "userName").unwrap_or_default(),
            user_email: string_field(data, "userEmail").unwrap_or_default(),
            user_avatar: string_field(data, "userAvatar"),
            text: string_field(data, "text").unwrap_or_default(),
            image_url: string_field(data, "imageUrl"),
            likes,
            comments,
            created_at: timestamp::parse_timestamp(data.get("createdAt")),
            updated_at: timestamp::parse_timestamp(data.get("updatedAt")),
            edited_at: timestamp::parse_optional_timestamp(data.get("editedAt")),
        }
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.contains(user_id)
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }
}

/// Decode a batch of post documents, newest first.
pub fn posts_from_documents(docs: &[Document]) -> Vec<Post> {
    let mut posts: Vec<Post> = docs.iter().map(Post::from_document).collect();
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    posts
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub text: String,
    pub image_url: Option<String>,
}

impl NewPost {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_url: None,
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn to_value(&self, author: &AuthorSnapshot) -> Value {
        let now = timestamp::now_value();
        json!({
            "userId": author.user_id,
            "userName": author.user_name,
            "userEmail": author.user_email,
            "userAvatar": author.user_avatar,
            "text": self.text,
            "imageUrl": self.image_url,
            "likes": [],
            "comments": [],
            "createdAt": now.clone(),
            "updatedAt": now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn from_document(doc: &Document) -> Self {
        let data = &doc.data;
        let username = string_field(data, "username").unwrap_or_default();
        Self {
            uid: string_field(data, "uid").unwrap_or_else(|| doc.id.clone()),
            display_name: string_field(data, "displayName").unwrap_or_else(|| username.clone()),
            username,
            email: string_field(data, "email").unwrap_or_default(),
            avatar: string_field(data, "avatar"),
            created_at: timestamp::parse_timestamp(data.get("createdAt")),
            updated_at: timestamp::parse_timestamp(data.get("updatedAt")),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "uid": self.uid,
            "username": self.username,
            "email": self.email,
            "displayName": self.display_name,
            "avatar": self.avatar,
            "createdAt": timestamp::to_value(self.created_at),
            "updatedAt": timestamp::to_value(self.updated_at),
        })
    }
}

/// Engagement counters shown on a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    pub posts: usize,
    pub likes_received: usize,
    pub comments_received: usize,
    pub comments_made: usize,
}

/// Non-empty string field, treating `""` like a missing value.
fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(id: &str, data: Value) -> Document {
        Document {
            id: id.to_string(),
            data,
        }
    }

    #[test]
    fn comment_defaults_missing_fields() {
        let c = Comment::from_value(&json!({"text": "hi"}));
        assert_eq!(c.id, "");
        assert_eq!(c.user_id, "");
        assert_eq!(c.user_name, ANONYMOUS);
        assert_eq!(c.user_avatar, None);
        assert_eq!(c.text, "hi");
    }

    #[test]
    fn new_comment_trims_text_and_gets_uuid() {
        let author = AuthorSnapshot {
            user_id: "u1".into(),
            user_name: "alice".into(),
            user_email: "alice@example.com".into(),
            user_avatar: None,
        };
        let a = Comment::new(&author, "  nice shot  ");
        let b = Comment::new(&author, "again");
        assert_eq!(a.text, "nice shot");
        assert_ne!(a.id, b.id);
        assert!(uuid::Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn post_decodes_likes_as_set() {
        let d = doc(
            "p1",
            json!({
                "userId": "u1",
                "userName": "alice",
                "text": "hello",
                "likes": ["u2", "u3", "u2"],
                "createdAt": {"seconds": 1736942400}
            }),
        );
        let post = Post::from_document(&d);
        assert_eq!(post.like_count(), 2);
        assert!(post.is_liked_by("u3"));
        assert!(post.comments.is_empty());
        assert!(!post.is_edited());
        assert_eq!(
            post.created_at,
            Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn posts_from_documents_sorts_newest_first() {
        let docs = vec![
            doc("old", json!({"createdAt": {"seconds": 100}})),
            doc("new", json!({"createdAt": {"seconds": 300}})),
            doc("mid", json!({"createdAt": {"seconds": 200}})),
        ];
        let ids: Vec<String> = posts_from_documents(&docs).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn new_post_value_starts_empty() {
        let author = AuthorSnapshot {
            user_id: "u1".into(),
            user_name: "alice".into(),
            user_email: "alice@example.com".into(),
            user_avatar: Some("https://img/a.png".into()),
        };
        let v = NewPost::text("hello").to_value(&author);
        assert_eq!(v["likes"], json!([]));
        assert_eq!(v["comments"], json!([]));
        assert_eq!(v["imageUrl"], Value::Null);
        assert_eq!(v["userAvatar"], json!("https://img/a.png"));
        assert_eq!(v["createdAt"], v["updatedAt"]);
    }

    #[test]
    fn profile_display_name_falls_back_to_username() {
        let p = UserProfile::from_document(&doc("u1", json!({"username": "alice"})));
        assert_eq!(p.uid, "u1");
        assert_eq!(p.display_name, "alice");
    }

    #[test]
    fn email_local_part() {
        let user = AuthUser {
            uid: "u1".into(),
            email: Some("bob@example.com".into()),
            display_name: None,
            photo_url: None,
        };
        assert_eq!(user.email_local_part(), Some("bob"));

        let no_local = AuthUser {
            email: Some("@example.com".into()),
            ..user
        };
        assert_eq!(no_local.email_local_part(), None);
    }
}
