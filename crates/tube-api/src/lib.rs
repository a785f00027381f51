pub mod assets;
pub mod auth;
pub mod comments;
pub mod dashboard;
pub mod error;
pub mod extract;
pub mod likes;
pub mod middleware;
pub mod playlists;
pub mod response;
pub mod routes;
pub mod state;
pub mod subscriptions;
pub mod tweets;
pub mod upload;
pub mod users;
pub mod videos;

pub use routes::api_router;
pub use state::{AppState, AppStateInner};
