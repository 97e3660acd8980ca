//! Book domain model.
//!
//! # Responsibility
//! - Represent a catalogue title with its copy counters.
//! - Validate catalogue input before persistence.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another book.
//! - `available_copies` never exceeds `total_copies` and never goes negative.
//! - `available_copies` is mutated only by the loan guard (and the staff
//!   copy-resize path, which recomputes it from active loans).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a catalogue title.
pub type BookId = Uuid;

// ISBN-10 (nine digits + digit or X check char) or ISBN-13, after separator
// stripping.
static ISBN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{9}[\dXx]|\d{13})$").expect("valid isbn regex"));

/// Canonical catalogue record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Stable global ID used for loans and genre links.
    pub uuid: BookId,
    pub title: String,
    pub author: String,
    /// Normalized ISBN (separators stripped), unique across the catalogue.
    pub isbn: Option<String>,
    /// Genre names, normalized to lowercase and deduplicated.
    pub genres: Vec<String>,
    /// Copies owned by the library.
    pub total_copies: u32,
    /// Copies currently on the shelf.
    pub available_copies: u32,
}

impl Book {
    /// Creates a new book with a generated stable ID and all copies on the
    /// shelf.
    pub fn new(title: impl Into<String>, author: impl Into<String>, total_copies: u32) -> Self {
        Self::with_id(Uuid::new_v4(), title, author, total_copies)
    }

    /// Creates a new book with a caller-provided stable ID.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(
        uuid: BookId,
        title: impl Into<String>,
        author: impl Into<String>,
        total_copies: u32,
    ) -> Self {
        Self {
            uuid,
            title: title.into(),
            author: author.into(),
            isbn: None,
            genres: Vec::new(),
            total_copies,
            available_copies: total_copies,
        }
    }

    /// Checks catalogue invariants. Write paths must call this before SQL
    /// mutations.
    pub fn validate(&self) -> Result<(), BookValidationError> {
        if self.title.trim().is_empty() {
            return Err(BookValidationError::EmptyTitle);
        }
        if self.author.trim().is_empty() {
            return Err(BookValidationError::EmptyAuthor);
        }
        if self.total_copies == 0 {
            return Err(BookValidationError::ZeroTotalCopies);
        }
        if self.available_copies > self.total_copies {
            return Err(BookValidationError::AvailableExceedsTotal {
                available_copies: self.available_copies,
                total_copies: self.total_copies,
            });
        }
        if let Some(isbn) = self.isbn.as_deref() {
            if !ISBN_RE.is_match(isbn) {
                return Err(BookValidationError::InvalidIsbn(isbn.to_string()));
            }
        }
        Ok(())
    }

    /// Returns whether at least one copy is on the shelf.
    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }
}

/// Normalizes an ISBN input by stripping separators; empty input maps to
/// `None`. Format is checked later by `Book::validate`.
pub fn normalize_isbn(isbn: &str) -> Option<String> {
    let stripped: String = isbn
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Validation failure for catalogue writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookValidationError {
    EmptyTitle,
    EmptyAuthor,
    ZeroTotalCopies,
    AvailableExceedsTotal {
        available_copies: u32,
        total_copies: u32,
    },
    InvalidIsbn(String),
}

impl Display for BookValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "book title cannot be empty"),
            Self::EmptyAuthor => write!(f, "book author cannot be empty"),
            Self::ZeroTotalCopies => write!(f, "a book must have at least one copy"),
            Self::AvailableExceedsTotal {
                available_copies,
                total_copies,
            } => write!(
                f,
                "available copies ({available_copies}) cannot exceed total copies ({total_copies})"
            ),
            Self::InvalidIsbn(isbn) => write!(f, "invalid ISBN: `{isbn}`"),
        }
    }
}

impl Error for BookValidationError {}

#[cfg(test)]
mod tests {
    use super::{normalize_isbn, Book, BookValidationError};

    #[test]
    fn new_book_starts_with_all_copies_available() {
        let book = Book::new("Dune", "Frank Herbert", 3);
        assert_eq!(book.total_copies, 3);
        assert_eq!(book.available_copies, 3);
        assert!(book.is_available());
        book.validate().unwrap();
    }

    #[test]
    fn validate_rejects_blank_fields_and_zero_copies() {
        let blank_title = Book::new("   ", "someone", 1);
        assert_eq!(
            blank_title.validate().unwrap_err(),
            BookValidationError::EmptyTitle
        );

        let blank_author = Book::new("title", "", 1);
        assert_eq!(
            blank_author.validate().unwrap_err(),
            BookValidationError::EmptyAuthor
        );

        let no_copies = Book::new("title", "someone", 0);
        assert_eq!(
            no_copies.validate().unwrap_err(),
            BookValidationError::ZeroTotalCopies
        );
    }

    #[test]
    fn validate_rejects_available_above_total() {
        let mut book = Book::new("title", "someone", 1);
        book.available_copies = 2;
        assert!(matches!(
            book.validate().unwrap_err(),
            BookValidationError::AvailableExceedsTotal { .. }
        ));
    }

    #[test]
    fn isbn_normalization_and_format_check() {
        assert_eq!(
            normalize_isbn("978-1-59327-828-1").as_deref(),
            Some("9781593278281")
        );
        assert_eq!(normalize_isbn("0-9752298-0-x").as_deref(), Some("097522980X"));
        assert_eq!(normalize_isbn("  "), None);

        let mut book = Book::new("title", "someone", 1);
        book.isbn = normalize_isbn("9781593278281");
        book.validate().unwrap();

        book.isbn = Some("not-an-isbn".to_string());
        assert!(matches!(
            book.validate().unwrap_err(),
            BookValidationError::InvalidIsbn(_)
        ));
    }

    #[test]
    fn serde_shape_is_stable() {
        let book = Book::with_id(
            "00000000-0000-4000-8000-000000000001".parse().unwrap(),
            "Dune",
            "Frank Herbert",
            1,
        );
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["title"], "Dune");
        assert_eq!(json["available_copies"], 1);
        assert!(json["isbn"].is_null());
    }
}
