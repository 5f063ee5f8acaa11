//! Database module: the short-id alias table.
//!
//! - `model`: row types returned by repositories.
//! - `repo`: SQL-only functions.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::ShortIdRow;
