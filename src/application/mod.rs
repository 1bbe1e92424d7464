//! Application services layer.

pub mod cache;
pub mod directory;
pub mod error;
pub mod feed;
pub mod follow;
pub mod pagination;
pub mod posting;
pub mod repos;
pub mod sessions;
