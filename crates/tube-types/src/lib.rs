pub mod api;
pub mod like;
pub mod models;
pub mod paging;
