pub mod processor;
pub mod sku;
pub mod types;
