pub mod client;
pub mod reddit;
