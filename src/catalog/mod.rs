pub mod anilist;
pub mod client;
