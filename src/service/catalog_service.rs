//! Catalogue use-case service.
//!
//! # Responsibility
//! - Expose browse/search to every authenticated caller.
//! - Gate inventory mutations behind staff rights.
//!
//! # Invariants
//! - Service APIs never write `available_copies` directly; copy-count
//!   changes go through `resize_copies`, everything else through the guard.

use crate::model::book::{Book, BookId};
use crate::repo::book_repo::{BookListQuery, BookRepository};
use crate::repo::{RepoError, RepoResult};
use crate::model::member::Actor;

/// Use-case service wrapper for catalogue operations.
pub struct CatalogService<R: BookRepository> {
    repo: R,
}

impl<R: BookRepository> CatalogService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Adds a title to the catalogue (staff only).
    pub fn add_book(&mut self, actor: &Actor, book: &Book) -> RepoResult<BookId> {
        require_staff(actor, "add books to the catalogue")?;
        self.repo.create_book(book)
    }

    /// Edits title/author/ISBN/genres of an existing book (staff only).
    pub fn update_book(&mut self, actor: &Actor, book: &Book) -> RepoResult<()> {
        require_staff(actor, "edit catalogue entries")?;
        self.repo.update_book(book)
    }

    /// Changes how many copies the library owns (staff only).
    ///
    /// Shelf availability is recomputed from active loans; totals below the
    /// checked-out count are rejected.
    pub fn resize_copies(
        &mut self,
        actor: &Actor,
        book_id: BookId,
        total_copies: u32,
    ) -> RepoResult<Book> {
        require_staff(actor, "change copy counts")?;
        self.repo.resize_copies(book_id, total_copies)
    }

    /// Removes a title and its loan history (staff only).
    ///
    /// Refused with `HasActiveLoans` while copies are checked out.
    pub fn remove_book(&mut self, actor: &Actor, book_id: BookId) -> RepoResult<()> {
        require_staff(actor, "remove books from the catalogue")?;
        self.repo.delete_book(book_id)
    }

    /// Gets one book by id.
    pub fn get_book(&self, book_id: BookId) -> RepoResult<Option<Book>> {
        self.repo.get_book(book_id)
    }

    /// Lists books using genre/availability filters + pagination.
    pub fn list_books(&self, query: &BookListQuery) -> RepoResult<Vec<Book>> {
        self.repo.list_books(query)
    }

    /// Keyword search over title, author, ISBN and genre names.
    pub fn search_books(&self, needle: &str) -> RepoResult<Vec<Book>> {
        self.repo.search_books(needle)
    }
}

fn require_staff(actor: &Actor, action: &'static str) -> RepoResult<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(RepoError::NotAuthorized {
            member_id: actor.member_id,
            action,
        })
    }
}
