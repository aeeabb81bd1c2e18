pub mod posts;
mod subscription;
pub mod users;

pub use self::posts::{PostService, DEFAULT_FEED_SIZE};
pub use self::subscription::Subscription;
pub use self::users::UserService;
