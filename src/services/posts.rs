use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::subscription::Subscription;
use super::users::UserService;
use crate::backend::{BackendResult, Direction, Document, DocumentStore, FieldUpdate, Query};
use crate::error::{FramezError, FramezResult};
use crate::models::{posts_from_documents, AuthUser, Comment, NewPost, Post, POSTS};
use crate::timestamp;

pub const DEFAULT_FEED_SIZE: usize = 50;

type SharedCallback = Arc<Mutex<dyn FnMut(Vec<Post>) + Send>>;

/// Post reads, writes and live feeds over the `posts` collection.
///
/// Writes do not touch any local copy; the change arrives back through the
/// caller's subscription.
#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn DocumentStore>,
    users: UserService,
}

impl PostService {
    pub fn new(store: Arc<dyn DocumentStore>, users: UserService) -> Self {
        Self { store, users }
    }

    /// Write a new post stamped with the author's current display identity.
    pub async fn create_post(&self, author: &AuthUser, data: NewPost) -> FramezResult<String> {
        let snapshot = self.users.author_snapshot(author).await;
        let id = self
            .store
            .add(POSTS, data.to_value(&snapshot))
            .await
            .map_err(|e| FramezError::operation("Failed to create post", e))?;

        tracing::info!("Post {} created by {}", id, author.uid);
        Ok(id)
    }

    pub async fn get_post(&self, post_id: &str) -> FramezResult<Option<Post>> {
        let doc = self
            .store
            .get(POSTS, post_id)
            .await
            .map_err(|e| FramezError::operation("Failed to load post", e))?;
        Ok(doc.map(|d| Post::from_document(&d)))
    }

    /// Live feed of the newest `max_posts` posts, newest first.
    ///
    /// If the ordered query is rejected for a missing index, an unordered
    /// query with the same limit takes over and the list is sorted here.
    pub fn subscribe_to_posts<F>(&self, max_posts: usize, callback: F) -> Subscription
    where
        F: FnMut(Vec<Post>) + Send + 'static,
    {
        let callback: SharedCallback = Arc::new(Mutex::new(callback));
        let subscription = Subscription::new();

        let ordered = Query::collection(POSTS)
            .order_by("createdAt", Direction::Descending)
            .limit(max_posts);

        let store = self.store.clone();
        let fallback_sub = subscription.clone();
        let primary_cb = callback.clone();

        let handle = self.store.listen(
            ordered,
            Box::new(move |result: BackendResult<Vec<Document>>| match result {
                Ok(docs) => deliver(&primary_cb, &docs),
                Err(err) if err.is_missing_index() => {
                    tracing::warn!("Feed index missing, retrying without ordering: {}", err);
                    let fallback_cb = primary_cb.clone();
                    let fallback = store.listen(
                        Query::collection(POSTS).limit(max_posts),
                        Box::new(move |retry| match retry {
                            Ok(docs) => deliver(&fallback_cb, &docs),
                            Err(e) => {
                                tracing::error!("Error with fallback feed query: {}", e);
                                deliver(&fallback_cb, &[]);
                            }
                        }),
                    );
                    fallback_sub.attach(fallback);
                }
                Err(err) => {
                    tracing::error!("Error subscribing to posts: {}", err);
                    deliver(&primary_cb, &[]);
                }
            }),
        );
        subscription.attach(handle);

        subscription
    }

    /// Live list of one user's posts, newest first. The query is filtered
    /// only, so no composite index is needed; sorting happens here.
    pub fn subscribe_to_user_posts<F>(&self, user_id: &str, callback: F) -> Subscription
    where
        F: FnMut(Vec<Post>) + Send + 'static,
    {
        let callback: SharedCallback = Arc::new(Mutex::new(callback));
        let subscription = Subscription::new();
        let query = Query::collection(POSTS).where_eq("userId", user_id);

        let handle = self.store.listen(
            query,
            Box::new(move |result: BackendResult<Vec<Document>>| match result {
                Ok(docs) => deliver(&callback, &docs),
                Err(err) => {
                    tracing::error!("Error subscribing to user posts: {}", err);
                    deliver(&callback, &[]);
                }
            }),
        );
        subscription.attach(handle);

        subscription
    }

    /// [`subscribe_to_posts`](Self::subscribe_to_posts) as a stream.
    pub fn watch_posts(&self, max_posts: usize) -> (Subscription, UnboundedReceiverStream<Vec<Post>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = self.subscribe_to_posts(max_posts, move |posts| {
            let _ = tx.send(posts);
        });
        (sub, UnboundedReceiverStream::new(rx))
    }

    pub fn watch_user_posts(
        &self,
        user_id: &str,
    ) -> (Subscription, UnboundedReceiverStream<Vec<Post>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = self.subscribe_to_user_posts(user_id, move |posts| {
            let _ = tx.send(posts);
        });
        (sub, UnboundedReceiverStream::new(rx))
    }

    pub async fn like_post(&self, post_id: &str, user_id: &str) -> FramezResult<()> {
        self.store
            .update(
                POSTS,
                post_id,
                vec![
                    ("likes".into(), FieldUpdate::ArrayUnion(vec![json!(user_id)])),
                    ("updatedAt".into(), FieldUpdate::Set(timestamp::now_value())),
                ],
            )
            .await
            .map_err(|e| FramezError::operation("Failed to like post", e))
    }

    pub async fn unlike_post(&self, post_id: &str, user_id: &str) -> FramezResult<()> {
        self.store
            .update(
                POSTS,
                post_id,
                vec![
                    ("likes".into(), FieldUpdate::ArrayRemove(vec![json!(user_id)])),
                    ("updatedAt".into(), FieldUpdate::Set(timestamp::now_value())),
                ],
            )
            .await
            .map_err(|e| FramezError::operation("Failed to unlike post", e))
    }

    /// Like or unlike depending on the post as the caller last saw it.
    /// Returns whether the post is now liked.
    pub async fn toggle_like(&self, post: &Post, user_id: &str) -> FramezResult<bool> {
        if post.is_liked_by(user_id) {
            self.unlike_post(&post.id, user_id).await?;
            Ok(false)
        } else {
            self.like_post(&post.id, user_id).await?;
            Ok(true)
        }
    }

    pub async fn add_comment(
        &self,
        post_id: &str,
        author: &AuthUser,
        text: &str,
    ) -> FramezResult<Comment> {
        let snapshot = self.users.author_snapshot(author).await;
        let comment = Comment::new(&snapshot, text);

        self.store
            .update(
                POSTS,
                post_id,
                vec![
                    ("comments".into(), FieldUpdate::ArrayUnion(vec![comment.to_value()])),
                    ("updatedAt".into(), FieldUpdate::Set(timestamp::now_value())),
                ],
            )
            .await
            .map_err(|e| FramezError::operation("Failed to add comment", e))?;

        tracing::debug!("Comment {} added to post {}", comment.id, post_id);
        Ok(comment)
    }

    /// Replace the text and stamp the edit. Likes and comments are untouched.
    pub async fn edit_post(&self, post_id: &str, new_text: &str) -> FramezResult<()> {
        let now = timestamp::now_value();
        self.store
            .update(
                POSTS,
                post_id,
                vec![
                    ("text".into(), FieldUpdate::Set(Value::from(new_text.trim()))),
                    ("editedAt".into(), FieldUpdate::Set(now.clone())),
                    ("updatedAt".into(), FieldUpdate::Set(now)),
                ],
            )
            .await
            .map_err(|e| FramezError::operation("Failed to edit post", e))?;

        tracing::info!("Post {} edited", post_id);
        Ok(())
    }

    pub async fn delete_post(&self, post_id: &str) -> FramezResult<()> {
        self.store
            .delete(POSTS, post_id)
            .await
            .map_err(|e| FramezError::operation("Failed to delete post", e))?;

        tracing::info!("Post {} deleted", post_id);
        Ok(())
    }
}

fn deliver(callback: &SharedCallback, docs: &[Document]) {
    let posts = posts_from_documents(docs);
    let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
    (&mut *callback)(posts);
}
