use std::sync::Arc;

use chrono::Utc;

use crate::backend::{DocumentStore, Query};
use crate::error::{FramezError, FramezResult};
use crate::models::{AuthUser, AuthorSnapshot, Post, ProfileStats, UserProfile, ANONYMOUS, USERS};

/// Profile reads and writes against the `users` collection.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn DocumentStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Point read of a profile. Absent documents and backend failures both
    /// come back as `None`; callers fall back to the auth identity.
    pub async fn get_user_profile(&self, user_id: &str) -> Option<UserProfile> {
        match self.store.get(USERS, user_id).await {
            Ok(doc) => doc.map(|d| UserProfile::from_document(&d)),
            Err(e) => {
                tracing::error!("Error fetching user profile {}: {}", user_id, e);
                None
            }
        }
    }

    pub async fn get_username(&self, user: &AuthUser) -> String {
        let profile = self.get_user_profile(&user.uid).await;
        display_name_fallback(profile.as_ref(), user)
    }

    /// Display identity to stamp onto a new post or comment.
    pub async fn author_snapshot(&self, user: &AuthUser) -> AuthorSnapshot {
        let profile = self.get_user_profile(&user.uid).await;
        if profile.is_none() {
            tracing::warn!("No profile for {}, using fallback identity", user.uid);
        }
        author_from(profile.as_ref(), user)
    }

    pub async fn create_user_profile(
        &self,
        user: &AuthUser,
        username: &str,
    ) -> FramezResult<UserProfile> {
        let username = normalize_username(username);
        let now = Utc::now();
        let profile = UserProfile {
            uid: user.uid.clone(),
            username: username.clone(),
            email: user.email.clone().unwrap_or_default(),
            display_name: username,
            avatar: user.photo_url.clone(),
            created_at: now,
            updated_at: now,
        };

        self.store
            .set(USERS, &user.uid, profile.to_value())
            .await
            .map_err(|e| FramezError::operation("Failed to save user profile", e))?;

        Ok(profile)
    }

    /// Resolve a username to the email it signed up with.
    pub async fn find_email_by_username(&self, username: &str) -> FramezResult<Option<String>> {
        let query = Query::collection(USERS)
            .where_eq("username", normalize_username(username))
            .limit(1);

        let docs = self
            .store
            .query(&query)
            .await
            .map_err(|e| FramezError::operation("Failed to look up user", e))?;

        Ok(docs
            .first()
            .map(UserProfile::from_document)
            .map(|p| p.email)
            .filter(|email| !email.is_empty()))
    }
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Profile username, then auth display name, then email local part,
/// then "Anonymous".
pub fn display_name_fallback(profile: Option<&UserProfile>, user: &AuthUser) -> String {
    profile
        .map(|p| p.username.as_str())
        .filter(|s| !s.is_empty())
        .or_else(|| user.display_name.as_deref().filter(|s| !s.is_empty()))
        .or_else(|| user.email_local_part())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

pub fn author_from(profile: Option<&UserProfile>, user: &AuthUser) -> AuthorSnapshot {
    AuthorSnapshot {
        user_id: user.uid.clone(),
        user_name: display_name_fallback(profile, user),
        user_email: user.email.clone().unwrap_or_default(),
        user_avatar: profile
            .and_then(|p| p.avatar.clone())
            .or_else(|| user.photo_url.clone()),
    }
}

/// Counters for a profile page: `own_posts` are the user's posts,
/// `all_posts` the feed the user's comments are counted across.
pub fn profile_stats(user_id: &str, own_posts: &[Post], all_posts: &[Post]) -> ProfileStats {
    ProfileStats {
        posts: own_posts.len(),
        likes_received: own_posts.iter().map(Post::like_count).sum(),
        comments_received: own_posts.iter().map(|p| p.comments.len()).sum(),
        comments_made: all_posts
            .iter()
            .flat_map(|p| p.comments.iter())
            .filter(|c| c.user_id == user_id)
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::testing;
    use crate::backend::Document;
    use serde_json::json;

    fn user(display_name: Option<&str>, email: Option<&str>) -> AuthUser {
        AuthUser {
            uid: "u1".into(),
            email: email.map(str::to_string),
            display_name: display_name.map(str::to_string),
            photo_url: None,
        }
    }

    fn profile(username: &str, avatar: Option<&str>) -> UserProfile {
        UserProfile {
            uid: "u1".into(),
            username: username.into(),
            email: "alice@example.com".into(),
            display_name: username.into(),
            avatar: avatar.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn fallback_chain_order() {
        let p = profile("alice", None);
        let full = user(Some("Alice A"), Some("al@example.com"));
        assert_eq!(display_name_fallback(Some(&p), &full), "alice");
        assert_eq!(display_name_fallback(None, &full), "Alice A");
        assert_eq!(
            display_name_fallback(None, &user(None, Some("al@example.com"))),
            "al"
        );
        assert_eq!(display_name_fallback(None, &user(None, None)), "Anonymous");
    }

    #[test]
    fn empty_values_are_skipped() {
        let p = profile("", None);
        let u = user(Some(""), Some("al@example.com"));
        assert_eq!(display_name_fallback(Some(&p), &u), "al");
    }

    #[test]
    fn avatar_prefers_profile() {
        let mut u = user(None, Some("al@example.com"));
        u.photo_url = Some("https://auth/photo.png".into());
        let p = profile("alice", Some("https://cdn/avatar.png"));
        assert_eq!(
            author_from(Some(&p), &u).user_avatar.as_deref(),
            Some("https://cdn/avatar.png")
        );
        assert_eq!(
            author_from(None, &u).user_avatar.as_deref(),
            Some("https://auth/photo.png")
        );
    }

    #[test]
    fn stats_count_engagement() {
        let post = |id: &str, owner: &str, likes: &[&str], commenters: &[&str]| {
            Post::from_document(&Document {
                id: id.into(),
                data: json!({
                    "userId": owner,
                    "likes": likes,
                    "comments": commenters
                        .iter()
                        .map(|c| json!({"userId": c, "text": "hey"}))
                        .collect::<Vec<_>>(),
                }),
            })
        };

        let mine = vec![
            post("p1", "u1", &["u2", "u3"], &["u2"]),
            post("p2", "u1", &["u2"], &["u1", "u3"]),
        ];
        let mut all = mine.clone();
        all.push(post("p3", "u2", &[], &["u1", "u1"]));

        let stats = profile_stats("u1", &mine, &all);
        assert_eq!(stats.posts, 2);
        assert_eq!(stats.likes_received, 3);
        assert_eq!(stats.comments_received, 3);
        assert_eq!(stats.comments_made, 3);
    }

    #[tokio::test]
    async fn profile_round_trip_and_username_lookup() {
        let (_tmp, backend) = testing::backend();
        let users = UserService::new(Arc::new(backend));
        let u = user(None, Some("alice@example.com"));

        let created = users.create_user_profile(&u, "  Alice_01 ").await.unwrap();
        assert_eq!(created.username, "alice_01");

        let fetched = users.get_user_profile("u1").await.unwrap();
        assert_eq!(fetched.username, "alice_01");
        assert_eq!(fetched.display_name, "alice_01");

        assert_eq!(
            users.find_email_by_username("ALICE_01").await.unwrap(),
            Some("alice@example.com".to_string())
        );
        assert_eq!(users.find_email_by_username("bob").await.unwrap(), None);
        assert_eq!(users.get_username(&u).await, "alice_01");
    }

    #[tokio::test]
    async fn missing_profile_is_none() {
        let (_tmp, backend) = testing::backend();
        let users = UserService::new(Arc::new(backend));
        assert!(users.get_user_profile("ghost").await.is_none());
    }
}
