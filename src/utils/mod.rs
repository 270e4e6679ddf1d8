pub mod cache;
pub mod client_info;
pub mod cursor;
pub mod middleware;
pub mod rate_limit;
pub mod security;
