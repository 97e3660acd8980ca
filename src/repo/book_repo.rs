//! Catalogue repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and browse APIs over the `books` table.
//! - Own genre-link replacement with atomic semantics.
//!
//! # Invariants
//! - Write paths call `Book::validate()` before SQL mutations.
//! - `update_book` never writes `available_copies`; only the loan guard and
//!   `resize_copies` touch the counter.
//! - Genre names are normalized to lowercase before persistence.
//! - Deleting a book is refused while it has active loans.

use crate::model::book::{Book, BookId};
use crate::repo::{
    ensure_schema_current, ensure_tables_ready, is_constraint_violation, RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use uuid::Uuid;

const CATALOG_DEFAULT_LIMIT: u32 = 25;
const CATALOG_LIMIT_MAX: u32 = 100;

const BOOK_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    author,
    isbn,
    total_copies,
    available_copies
FROM books";

/// Query options for catalogue listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookListQuery {
    /// Optional single-genre exact match filter.
    pub genre: Option<String>,
    /// Only books with at least one copy on the shelf.
    pub available_only: bool,
    /// Maximum rows to return. Defaults to 25 and clamps to 100.
    pub limit: Option<u32>,
    /// Number of rows to skip.
    pub offset: u32,
}

/// Repository interface for catalogue operations.
pub trait BookRepository {
    /// Creates one book with its genre links and returns its stable id.
    fn create_book(&mut self, book: &Book) -> RepoResult<BookId>;
    /// Updates title/author/isbn/genres of an existing book.
    fn update_book(&mut self, book: &Book) -> RepoResult<()>;
    /// Changes the owned copy count, recomputing shelf availability from
    /// active loans.
    fn resize_copies(&mut self, book_id: BookId, total_copies: u32) -> RepoResult<Book>;
    /// Gets one book by id.
    fn get_book(&self, book_id: BookId) -> RepoResult<Option<Book>>;
    /// Lists books using genre/availability filters + pagination.
    fn list_books(&self, query: &BookListQuery) -> RepoResult<Vec<Book>>;
    /// Keyword search over title, author, ISBN and genre names.
    fn search_books(&self, needle: &str) -> RepoResult<Vec<Book>>;
    /// Deletes a book and its historical loans; refused with active loans.
    fn delete_book(&mut self, book_id: BookId) -> RepoResult<()>;
}

/// SQLite-backed catalogue repository.
pub struct SqliteBookRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteBookRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_schema_current(conn)?;
        ensure_tables_ready(
            conn,
            &[
                (
                    "books",
                    &[
                        "uuid",
                        "title",
                        "author",
                        "isbn",
                        "total_copies",
                        "available_copies",
                    ],
                ),
                ("genres", &["id", "name"]),
                ("book_genres", &["book_uuid", "genre_id"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl BookRepository for SqliteBookRepository<'_> {
    fn create_book(&mut self, book: &Book) -> RepoResult<BookId> {
        book.validate()?;
        let genres = normalize_genres(&book.genres);

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO books (
                uuid,
                title,
                author,
                isbn,
                total_copies,
                available_copies
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                book.uuid.to_string(),
                book.title.as_str(),
                book.author.as_str(),
                book.isbn.as_deref(),
                book.total_copies,
                book.available_copies,
            ],
        )
        .map_err(|err| translate_isbn_conflict(err, book))?;

        replace_genre_links(&tx, book.uuid, &genres)?;
        tx.commit()?;

        Ok(book.uuid)
    }

    fn update_book(&mut self, book: &Book) -> RepoResult<()> {
        book.validate()?;
        let genres = normalize_genres(&book.genres);

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let changed = tx
            .execute(
                "UPDATE books
                 SET
                    title = ?2,
                    author = ?3,
                    isbn = ?4
                 WHERE uuid = ?1;",
                params![
                    book.uuid.to_string(),
                    book.title.as_str(),
                    book.author.as_str(),
                    book.isbn.as_deref(),
                ],
            )
            .map_err(|err| translate_isbn_conflict(err, book))?;

        if changed == 0 {
            return Err(RepoError::BookNotFound(book.uuid));
        }

        replace_genre_links(&tx, book.uuid, &genres)?;
        tx.commit()?;

        Ok(())
    }

    fn resize_copies(&mut self, book_id: BookId, total_copies: u32) -> RepoResult<Book> {
        if total_copies == 0 {
            return Err(RepoError::BookValidation(
                crate::model::book::BookValidationError::ZeroTotalCopies,
            ));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !book_exists_in_tx(&tx, book_id)? {
            return Err(RepoError::BookNotFound(book_id));
        }

        let active_loans = active_loan_count_in_tx(&tx, book_id)?;
        if total_copies < active_loans {
            return Err(RepoError::CopiesBelowActiveLoans {
                book_id,
                active_loans,
            });
        }

        tx.execute(
            "UPDATE books
             SET
                total_copies = ?2,
                available_copies = ?2 - ?3
             WHERE uuid = ?1;",
            params![book_id.to_string(), total_copies, active_loans],
        )?;

        let book = load_book_required(&tx, book_id)?;
        tx.commit()?;
        Ok(book)
    }

    fn get_book(&self, book_id: BookId) -> RepoResult<Option<Book>> {
        load_book(self.conn, book_id)
    }

    fn list_books(&self, query: &BookListQuery) -> RepoResult<Vec<Book>> {
        let mut sql = format!("{BOOK_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if query.available_only {
            sql.push_str(" AND available_copies > 0");
        }

        if let Some(genre) = query.genre.as_ref() {
            sql.push_str(
                " AND EXISTS (
                    SELECT 1
                    FROM book_genres bg
                    INNER JOIN genres g ON g.id = bg.genre_id
                    WHERE bg.book_uuid = books.uuid
                      AND g.name = ? COLLATE NOCASE
                )",
            );
            bind_values.push(Value::Text(genre.clone()));
        }

        sql.push_str(" ORDER BY title COLLATE NOCASE ASC, uuid ASC");
        let limit = normalize_catalog_limit(query.limit);
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit)));
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        collect_books(self.conn, &sql, bind_values)
    }

    fn search_books(&self, needle: &str) -> RepoResult<Vec<Book>> {
        let trimmed = needle.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = format!("%{trimmed}%");

        let sql = format!(
            "{BOOK_SELECT_SQL}
             WHERE title LIKE ?1
                OR author LIKE ?1
                OR isbn LIKE ?1
                OR EXISTS (
                    SELECT 1
                    FROM book_genres bg
                    INNER JOIN genres g ON g.id = bg.genre_id
                    WHERE bg.book_uuid = books.uuid
                      AND g.name LIKE ?1
                )
             ORDER BY title COLLATE NOCASE ASC, uuid ASC
             LIMIT {CATALOG_LIMIT_MAX}"
        );

        collect_books(self.conn, &sql, vec![Value::Text(pattern)])
    }

    fn delete_book(&mut self, book_id: BookId) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let active_loans = active_loan_count_in_tx(&tx, book_id)?;
        if active_loans > 0 {
            return Err(RepoError::HasActiveLoans {
                book_id,
                active_loans,
            });
        }

        // Historical loans and genre links go with the book (FK cascade).
        let changed = tx.execute(
            "DELETE FROM books WHERE uuid = ?1;",
            [book_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::BookNotFound(book_id));
        }

        tx.commit()?;
        Ok(())
    }
}

/// Normalizes list limit according to the catalogue contract.
pub fn normalize_catalog_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) => CATALOG_DEFAULT_LIMIT,
        Some(value) if value > CATALOG_LIMIT_MAX => CATALOG_LIMIT_MAX,
        Some(value) => value,
        None => CATALOG_DEFAULT_LIMIT,
    }
}

/// Normalizes one genre value.
pub fn normalize_genre(genre: &str) -> Option<String> {
    let trimmed = genre.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes and deduplicates genre values.
pub fn normalize_genres(genres: &[String]) -> Vec<String> {
    let mut unique = BTreeSet::new();
    for genre in genres {
        if let Some(value) = normalize_genre(genre) {
            unique.insert(value);
        }
    }
    unique.into_iter().collect()
}

fn translate_isbn_conflict(err: rusqlite::Error, book: &Book) -> RepoError {
    match (&book.isbn, is_constraint_violation(&err)) {
        (Some(isbn), true) => RepoError::DuplicateIsbn(isbn.clone()),
        _ => err.into(),
    }
}

fn replace_genre_links(tx: &Transaction<'_>, book_id: BookId, genres: &[String]) -> RepoResult<()> {
    let book_id_text = book_id.to_string();
    tx.execute(
        "DELETE FROM book_genres WHERE book_uuid = ?1;",
        [book_id_text.as_str()],
    )?;

    for genre in genres {
        tx.execute(
            "INSERT OR IGNORE INTO genres (name) VALUES (?1);",
            [genre.as_str()],
        )?;
        tx.execute(
            "INSERT INTO book_genres (book_uuid, genre_id)
             SELECT ?1, id
             FROM genres
             WHERE name = ?2 COLLATE NOCASE;",
            params![book_id_text.as_str(), genre.as_str()],
        )?;
    }

    Ok(())
}

pub(crate) fn book_exists_in_tx(tx: &Transaction<'_>, book_id: BookId) -> RepoResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM books WHERE uuid = ?1);",
        [book_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn active_loan_count_in_tx(tx: &Transaction<'_>, book_id: BookId) -> RepoResult<u32> {
    let count: u32 = tx.query_row(
        "SELECT COUNT(*)
         FROM loans
         WHERE book_uuid = ?1
           AND status = 'active';",
        [book_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn collect_books(conn: &Connection, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Book>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut books = Vec::new();

    while let Some(row) = rows.next()? {
        books.push(parse_book_row(conn, row)?);
    }

    Ok(books)
}

pub(crate) fn load_book(conn: &Connection, book_id: BookId) -> RepoResult<Option<Book>> {
    let sql = format!("{BOOK_SELECT_SQL} WHERE uuid = ?1;");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([book_id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_book_row(conn, row)?));
    }
    Ok(None)
}

fn load_book_required(tx: &Transaction<'_>, book_id: BookId) -> RepoResult<Book> {
    load_book(tx, book_id)?.ok_or(RepoError::BookNotFound(book_id))
}

fn parse_book_row(conn: &Connection, row: &rusqlite::Row<'_>) -> RepoResult<Book> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in books.uuid"))
    })?;

    let book = Book {
        uuid,
        title: row.get("title")?,
        author: row.get("author")?,
        isbn: row.get("isbn")?,
        genres: load_genres_for_book(conn, &uuid_text)?,
        total_copies: row.get("total_copies")?,
        available_copies: row.get("available_copies")?,
    };
    book.validate()?;
    Ok(book)
}

fn load_genres_for_book(conn: &Connection, book_uuid: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT g.name
         FROM book_genres bg
         INNER JOIN genres g ON g.id = bg.genre_id
         WHERE bg.book_uuid = ?1
         ORDER BY g.name COLLATE NOCASE ASC;",
    )?;
    let mut rows = stmt.query([book_uuid])?;
    let mut genres = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        genres.push(value.to_lowercase());
    }
    Ok(genres)
}
