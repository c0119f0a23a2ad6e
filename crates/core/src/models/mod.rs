//! Data models for Porter

mod ids;
mod invite;
mod member;

pub use ids::*;
pub use invite::*;
pub use member::*;
