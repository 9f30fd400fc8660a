pub mod cache;
pub mod google;
pub mod normalizer;
pub mod simulator;
pub mod source;
