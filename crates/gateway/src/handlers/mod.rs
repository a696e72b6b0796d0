//! API handlers module

pub mod ask;
pub mod health;
pub mod papers;
pub mod search;
