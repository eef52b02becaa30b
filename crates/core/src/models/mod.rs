//! Data models for the swap marketplace

mod slot;
mod swap;
mod user;
mod views;

pub use slot::*;
pub use swap::*;
pub use user::*;
pub use views::*;
