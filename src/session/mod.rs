// Session state store exports
pub mod helpers;
pub mod model;
pub mod store;

pub use model::{Session, SessionState};
pub use store::{SessionError, SessionStore};
