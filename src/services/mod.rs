pub mod comment;
pub mod database;
pub mod location;

pub use comment::CommentService;
pub use database::Database;
pub use location::LocationService;
