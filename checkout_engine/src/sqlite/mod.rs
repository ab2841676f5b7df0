//! SQLite backend for the checkout engine.
//!
//! [`SqliteRepository`] implements [`crate::traits::CheckoutRepository`] on top of the functions in [`db`].
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteRepository;
