pub mod classifier;
pub mod error;
pub mod filter;
pub mod merger;
pub mod taxonomy;
