pub mod feature;
pub mod filter;
