pub mod builder;
pub mod range;
