//! Core domain logic for a library circulation system.
//!
//! Members browse the catalogue and check books out; staff manage inventory
//! and loans. The single hard invariant lives in the checkout/return guard:
//! a book's shelf availability always equals its total copies minus its
//! active loans, and no race between callers may break that. This crate is
//! the single source of truth for those business invariants; web/UI layers
//! sit elsewhere.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{bootstrap, BootstrapError, CoreConfig, StoreLocation};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::book::{normalize_isbn, Book, BookId, BookValidationError};
pub use model::loan::{Loan, LoanFilter, LoanId, LoanScope, LoanStatus};
pub use model::member::{Actor, Member, MemberId, MemberValidationError, Role};
pub use repo::book_repo::{BookListQuery, BookRepository, SqliteBookRepository};
pub use repo::loan_repo::{LoanListQuery, LoanRepository, SqliteLoanRepository};
pub use repo::member_repo::{MemberRepository, MemberSummary, SqliteMemberRepository};
pub use repo::{RepoError, RepoResult};
pub use service::catalog_service::CatalogService;
pub use service::circulation_service::CirculationService;
pub use service::member_service::MemberService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
