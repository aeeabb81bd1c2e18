pub mod errors;
pub mod session;

pub use self::session::{SessionState, SessionStore};
