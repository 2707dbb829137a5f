//! Data models for ChurnWatch

mod alert;
mod customer;
mod query;
mod risk;

pub use alert::*;
pub use customer::*;
pub use query::*;
pub use risk::*;
