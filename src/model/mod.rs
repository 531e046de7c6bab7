pub mod feature;
pub mod filter;
pub mod output;
