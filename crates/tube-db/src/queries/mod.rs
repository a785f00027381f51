pub mod comments;
pub mod dashboard;
pub mod likes;
pub mod playlists;
pub mod subscriptions;
pub mod tweets;
pub mod users;
pub mod videos;

pub use users::{AccountUpdate, NewUser};
pub use videos::{NewVideo, VideoSearch, VideoUpdate};
