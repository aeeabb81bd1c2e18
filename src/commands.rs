//! Subcommands and the plain-text rendering of posts and profiles.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use futures::StreamExt;
use serde::Serialize;

use crate::error::{FramezError, FramezResult};
use crate::models::{
    AuthUser, NewPost, Post, ProfileStats, UserProfile, MAX_COMMENT_LENGTH, MAX_POST_LENGTH,
};
use crate::services::users::profile_stats;
use crate::services::Subscription;
use crate::state::App;
use crate::timestamp::format_timestamp_at;

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create an account and sign in
    Signup {
        username: String,
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Sign in with an email or username
    Signin {
        identifier: String,
        #[arg(short, long)]
        password: String,
    },
    Signout,
    /// Show the signed-in user
    Whoami,
    /// Send a password reset email
    ResetPassword { email: String },
    /// Publish a post
    Post {
        text: String,
        /// Local image path or http(s) URL to attach
        #[arg(long)]
        image: Option<String>,
    },
    /// Show the newest posts
    Feed {
        #[arg(long)]
        limit: Option<usize>,
        /// Keep printing the feed as it changes
        #[arg(long)]
        watch: bool,
    },
    /// Show one user's posts (default: yours)
    Posts {
        user_id: Option<String>,
        #[arg(long)]
        watch: bool,
    },
    /// Show a post with its comments
    Show { post_id: String },
    Like { post_id: String },
    Unlike { post_id: String },
    Comment { post_id: String, text: String },
    /// Replace the text of one of your posts
    Edit { post_id: String, text: String },
    /// Delete one of your posts
    Delete { post_id: String },
    /// Show a profile and its counters (default: yours)
    Profile { user_id: Option<String> },
    /// Upload images and print their URLs
    Upload {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

pub async fn run(app: &App, command: Command, output: Output) -> FramezResult<()> {
    match command {
        Command::Signup {
            username,
            email,
            password,
        } => {
            if username.trim().is_empty() {
                return Err(invalid("Username is required"));
            }
            let user = app.session.sign_up(&username, &email, &password).await?;
            println!("Welcome, {}!", user.display_name.unwrap_or_default());
        }
        Command::Signin {
            identifier,
            password,
        } => {
            let user = app.session.sign_in(&identifier, &password).await?;
            println!("Signed in as {}", app.users.get_username(&user).await);
        }
        Command::Signout => {
            app.session.sign_out().await?;
            println!("Signed out");
        }
        Command::Whoami => match app.session.current_user().await {
            user if output == Output::Json => println!("{}", render_json(&user)),
            Some(user) => println!(
                "{} <{}> ({})",
                app.users.get_username(&user).await,
                user.email.as_deref().unwrap_or(""),
                user.uid
            ),
            None => println!("Not signed in"),
        },
        Command::ResetPassword { email } => {
            app.session.send_password_reset(&email).await?;
            println!("Password reset email sent to {}", email.trim());
        }
        Command::Post { text, image } => {
            let user = app.require_user().await?;
            let text = validate_post_text(&text)?;

            let mut post = NewPost::text(text);
            if let Some(source) = image {
                let uploaded = app.media()?.upload_image(&source).await?;
                post = post.with_image(uploaded.url);
            }
            let id = app.posts.create_post(&user, post).await?;
            match output {
                Output::Json => println!("{}", render_json(&serde_json::json!({ "id": id }))),
                Output::Text => println!("Posted {}", id),
            }
        }
        Command::Feed { limit, watch } => {
            let limit = limit.unwrap_or(app.config.feed.max_posts);
            let user = app.session.current_user().await;
            let (sub, stream) = app.posts.watch_posts(limit);
            follow(sub, stream, watch, |posts| match output {
                Output::Json => println!("{}", render_json(&posts)),
                Output::Text => print!("{}", render_feed(&posts, user.as_ref(), Utc::now())),
            })
            .await;
        }
        Command::Posts { user_id, watch } => {
            let user = app.session.current_user().await;
            let target = match user_id {
                Some(id) => id,
                None => app.require_user().await?.uid,
            };
            let (sub, stream) = app.posts.watch_user_posts(&target);
            follow(sub, stream, watch, |posts| match output {
                Output::Json => println!("{}", render_json(&posts)),
                Output::Text => print!("{}", render_feed(&posts, user.as_ref(), Utc::now())),
            })
            .await;
        }
        Command::Show { post_id } => {
            let post = load_post(app, &post_id).await?;
            let user = app.session.current_user().await;
            match output {
                Output::Json => println!("{}", render_json(&post)),
                Output::Text => {
                    print!("{}", render_post_detail(&post, user.as_ref(), Utc::now()))
                }
            }
        }
        Command::Like { post_id } => {
            let user = app.require_user().await?;
            app.posts.like_post(&post_id, &user.uid).await?;
            println!("Liked {}", post_id);
        }
        Command::Unlike { post_id } => {
            let user = app.require_user().await?;
            app.posts.unlike_post(&post_id, &user.uid).await?;
            println!("Unliked {}", post_id);
        }
        Command::Comment { post_id, text } => {
            let user = app.require_user().await?;
            let text = validate_comment_text(&text)?;
            let comment = app.posts.add_comment(&post_id, &user, text).await?;
            println!("Comment {} added", comment.id);
        }
        Command::Edit { post_id, text } => {
            let user = app.require_user().await?;
            let post = load_post(app, &post_id).await?;
            ensure_author(&post, &user, "edit")?;
            let text = validate_post_text(&text)?;
            app.posts.edit_post(&post_id, text).await?;
            println!("Post {} updated", post_id);
        }
        Command::Delete { post_id } => {
            let user = app.require_user().await?;
            let post = load_post(app, &post_id).await?;
            ensure_author(&post, &user, "delete")?;
            app.posts.delete_post(&post_id).await?;
            println!("Post {} deleted", post_id);
        }
        Command::Profile { user_id } => {
            let target = match user_id {
                Some(id) => id,
                None => app.require_user().await?.uid,
            };
            let profile = app.users.get_user_profile(&target).await;

            let own = first_snapshot(app.posts.watch_user_posts(&target)).await;
            let all = first_snapshot(app.posts.watch_posts(app.config.feed.max_posts)).await;
            let stats = profile_stats(&target, &own, &all);

            match output {
                Output::Json => println!(
                    "{}",
                    render_json(&ProfileView {
                        user_id: &target,
                        profile: profile.as_ref(),
                        stats,
                    })
                ),
                Output::Text => print!("{}", render_profile(&target, profile.as_ref(), &stats)),
            }
        }
        Command::Upload { paths } => {
            let results = app.media()?.upload_images(&paths).await?;
            if output == Output::Json {
                println!("{}", render_json(&results));
                return Ok(());
            }
            for (path, result) in paths.iter().zip(results) {
                println!(
                    "{} -> {} ({}x{})",
                    path, result.url, result.width, result.height
                );
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileView<'a> {
    user_id: &'a str,
    profile: Option<&'a UserProfile>,
    stats: ProfileStats,
}

/// Pretty JSON for `--json` output. The rendered types only have string
/// keys, so encoding cannot fail.
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Trimmed post text, or the message the composer would show.
pub fn validate_post_text(text: &str) -> FramezResult<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid("Please write something"));
    }
    if text.chars().count() > MAX_POST_LENGTH {
        return Err(invalid(&format!(
            "Posts are limited to {} characters",
            MAX_POST_LENGTH
        )));
    }
    Ok(text)
}

pub fn validate_comment_text(text: &str) -> FramezResult<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid("Please write a comment"));
    }
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(invalid(&format!(
            "Comments are limited to {} characters",
            MAX_COMMENT_LENGTH
        )));
    }
    Ok(text)
}

pub fn ensure_author(post: &Post, user: &AuthUser, action: &str) -> FramezResult<()> {
    if post.user_id == user.uid {
        Ok(())
    } else {
        Err(invalid(&format!("You can only {} your own posts", action)))
    }
}

fn invalid(message: &str) -> FramezError {
    FramezError::Operation {
        message: message.to_string(),
        source: None,
    }
}

async fn load_post(app: &App, post_id: &str) -> FramezResult<Post> {
    app.posts
        .get_post(post_id)
        .await?
        .ok_or_else(|| invalid("Post not found"))
}

/// Print the first snapshot, then every change until Ctrl-C when `watch`.
async fn follow<S, F>(sub: Subscription, mut stream: S, watch: bool, mut render: F)
where
    S: futures::Stream<Item = Vec<Post>> + Unpin,
    F: FnMut(Vec<Post>),
{
    if !watch {
        if let Some(posts) = stream.next().await {
            render(posts);
        }
        sub.unsubscribe();
        return;
    }

    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(posts) => render(posts),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    sub.unsubscribe();
}

async fn first_snapshot<S>((sub, mut stream): (Subscription, S)) -> Vec<Post>
where
    S: futures::Stream<Item = Vec<Post>> + Unpin,
{
    let posts = stream.next().await.unwrap_or_default();
    sub.unsubscribe();
    posts
}

/// One feed card: author, age, text, image and counters.
pub fn render_post(post: &Post, viewer: Option<&AuthUser>, now: DateTime<Utc>) -> String {
    let mut out = format!(
        "{} · {}{}  [{}]\n",
        post.user_name,
        format_timestamp_at(post.created_at, now),
        if post.is_edited() { " (edited)" } else { "" },
        post.id
    );
    if !post.text.is_empty() {
        out.push_str(&post.text);
        out.push('\n');
    }
    if let Some(url) = &post.image_url {
        out.push_str(&format!("[image] {}\n", url));
    }

    let liked = viewer.map_or(false, |u| post.is_liked_by(&u.uid));
    out.push_str(&format!(
        "{} {}  💬 {}\n",
        if liked { "♥" } else { "♡" },
        post.like_count(),
        post.comments.len()
    ));
    out
}

pub fn render_feed(posts: &[Post], viewer: Option<&AuthUser>, now: DateTime<Utc>) -> String {
    if posts.is_empty() {
        return "No posts yet\n".to_string();
    }
    posts
        .iter()
        .map(|p| render_post(p, viewer, now))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_post_detail(post: &Post, viewer: Option<&AuthUser>, now: DateTime<Utc>) -> String {
    let mut out = render_post(post, viewer, now);
    if post.comments.is_empty() {
        out.push_str("No comments yet\n");
    }
    for comment in &post.comments {
        out.push_str(&format!(
            "  {} · {}: {}\n",
            comment.user_name,
            format_timestamp_at(comment.created_at, now),
            comment.text
        ));
    }
    out
}

pub fn render_profile(user_id: &str, profile: Option<&UserProfile>, stats: &ProfileStats) -> String {
    let mut out = match profile {
        Some(p) => format!("{} (@{})\n{}\n", p.display_name, p.username, p.email),
        None => format!("{}\n", user_id),
    };
    out.push_str(&format!(
        "Posts: {}  Likes: {}  Comments received: {}  Comments made: {}\n",
        stats.posts, stats.likes_received, stats.comments_received, stats.comments_made
    ));
    out
}
