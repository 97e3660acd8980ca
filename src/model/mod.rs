//! Domain model for the library circulation core.
//!
//! # Responsibility
//! - Define canonical data structures used by catalogue and loan logic.
//! - Keep availability and loan-state invariants close to the data.
//!
//! # Invariants
//! - Every domain object is identified by a stable UUID.
//! - `0 <= available_copies <= total_copies` for every book.
//! - A loan is active exactly when it has no return timestamp.

pub mod book;
pub mod loan;
pub mod member;
