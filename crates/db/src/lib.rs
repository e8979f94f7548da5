pub mod connection;
pub mod feedback;
pub mod migrations;
pub mod repositories;
pub mod session;

pub use connection::{connect, connect_with_settings, DbPool};
pub use feedback::{FeedbackError, FeedbackRecord, FeedbackStore, MarkdownFeedbackStore};
pub use repositories::{
    InMemoryScoutRepository, RepositoryError, ScoutRepository, SqlScoutRepository,
};
pub use session::{InMemorySessionStore, SessionError, SessionStore};
