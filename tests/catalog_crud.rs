use biblio_core::db::open_db_in_memory;
use biblio_core::{
    normalize_isbn, Book, BookListQuery, BookRepository, BookValidationError, CatalogService,
    LoanRepository, Member, MemberRepository, RepoError, Role, SqliteBookRepository, SqliteLoanRepository,
    SqliteMemberRepository,
};
use rusqlite::Connection;
use uuid::Uuid;

fn register(conn: &Connection, name: &str, role: Role) -> Member {
    let repo = SqliteMemberRepository::try_new(conn).unwrap();
    let member = Member::new(name, role);
    repo.create_member(&member).unwrap();
    member
}

fn book_with(title: &str, author: &str, copies: u32, genres: &[&str]) -> Book {
    let mut book = Book::new(title, author, copies);
    book.genres = genres.iter().map(|g| g.to_string()).collect();
    book
}

#[test]
fn create_and_get_roundtrip_with_genres() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBookRepository::try_new(&mut conn).unwrap();

    let mut book = book_with("Dune", "Frank Herbert", 2, &["Sci-Fi", "  CLASSIC ", "sci-fi"]);
    book.isbn = normalize_isbn("978-0-441-17271-9");
    let id = repo.create_book(&book).unwrap();
    assert_eq!(id, book.uuid);

    let stored = repo.get_book(book.uuid).unwrap().unwrap();
    assert_eq!(stored.title, "Dune");
    assert_eq!(stored.author, "Frank Herbert");
    assert_eq!(stored.isbn.as_deref(), Some("9780441172719"));
    assert_eq!(stored.total_copies, 2);
    assert_eq!(stored.available_copies, 2);
    // Genres come back normalized, deduplicated and sorted.
    assert_eq!(stored.genres, vec!["classic".to_string(), "sci-fi".to_string()]);

    assert!(repo.get_book(Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn duplicate_isbn_is_rejected() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBookRepository::try_new(&mut conn).unwrap();

    let mut first = Book::new("Dune", "Frank Herbert", 1);
    first.isbn = normalize_isbn("9780441172719");
    repo.create_book(&first).unwrap();

    let mut second = Book::new("Dune, again", "someone else", 1);
    second.isbn = normalize_isbn("978-0441172719");
    match repo.create_book(&second) {
        Err(RepoError::DuplicateIsbn(isbn)) => assert_eq!(isbn, "9780441172719"),
        other => panic!("expected DuplicateIsbn, got {other:?}"),
    }

    // Same conflict through the update path.
    let mut third = Book::new("Unrelated", "author", 1);
    repo.create_book(&third).unwrap();
    third.isbn = normalize_isbn("9780441172719");
    assert!(matches!(
        repo.update_book(&third),
        Err(RepoError::DuplicateIsbn(_))
    ));
}

#[test]
fn update_edits_details_without_touching_counters() {
    let mut conn = open_db_in_memory().unwrap();

    let book = {
        let mut repo = SqliteBookRepository::try_new(&mut conn).unwrap();
        let book = book_with("Dune", "Frank Herbert", 2, &["sci-fi"]);
        repo.create_book(&book).unwrap();
        book
    };
    let reader = register(&conn, "reader", Role::Member);
    {
        let mut loans = SqliteLoanRepository::try_new(&mut conn).unwrap();
        loans.checkout(book.uuid, reader.uuid).unwrap();
    }

    let mut repo = SqliteBookRepository::try_new(&mut conn).unwrap();
    let mut edited = repo.get_book(book.uuid).unwrap().unwrap();
    edited.title = "Dune (Chronicles, Book 1)".to_string();
    edited.genres = vec!["sci-fi".to_string(), "desert".to_string()];
    repo.update_book(&edited).unwrap();

    let stored = repo.get_book(book.uuid).unwrap().unwrap();
    assert_eq!(stored.title, "Dune (Chronicles, Book 1)");
    assert_eq!(stored.genres, vec!["desert".to_string(), "sci-fi".to_string()]);
    // The active loan's copy is still off the shelf.
    assert_eq!(stored.total_copies, 2);
    assert_eq!(stored.available_copies, 1);

    let ghost = Book::new("never stored", "nobody", 1);
    assert!(matches!(
        repo.update_book(&ghost),
        Err(RepoError::BookNotFound(id)) if id == ghost.uuid
    ));
}

#[test]
fn validation_failures_never_reach_the_store() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBookRepository::try_new(&mut conn).unwrap();

    let blank = Book::new("  ", "someone", 1);
    assert!(matches!(
        repo.create_book(&blank),
        Err(RepoError::BookValidation(BookValidationError::EmptyTitle))
    ));

    let mut bad_isbn = Book::new("title", "someone", 1);
    bad_isbn.isbn = Some("not-an-isbn".to_string());
    assert!(matches!(
        repo.create_book(&bad_isbn),
        Err(RepoError::BookValidation(BookValidationError::InvalidIsbn(_)))
    ));

    assert!(repo.list_books(&BookListQuery::default()).unwrap().is_empty());
}

#[test]
fn list_filters_by_genre_and_availability_with_pagination() {
    let mut conn = open_db_in_memory().unwrap();

    let (dune, _hobbit, _cookbook) = {
        let mut repo = SqliteBookRepository::try_new(&mut conn).unwrap();
        let dune = book_with("Dune", "Frank Herbert", 1, &["sci-fi"]);
        let hobbit = book_with("The Hobbit", "J.R.R. Tolkien", 1, &["fantasy"]);
        let cookbook = book_with("Bread", "a baker", 1, &[]);
        repo.create_book(&dune).unwrap();
        repo.create_book(&hobbit).unwrap();
        repo.create_book(&cookbook).unwrap();
        (dune, hobbit, cookbook)
    };

    let reader = register(&conn, "reader", Role::Member);
    {
        let mut loans = SqliteLoanRepository::try_new(&mut conn).unwrap();
        loans.checkout(dune.uuid, reader.uuid).unwrap();
    }

    let repo = SqliteBookRepository::try_new(&mut conn).unwrap();

    // Default listing is title-ordered.
    let all = repo.list_books(&BookListQuery::default()).unwrap();
    let titles: Vec<&str> = all.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, vec!["Bread", "Dune", "The Hobbit"]);

    // Genre filter is case-insensitive.
    let sci_fi = repo
        .list_books(&BookListQuery {
            genre: Some("SCI-FI".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(sci_fi.len(), 1);
    assert_eq!(sci_fi[0].uuid, dune.uuid);

    // The checked-out book drops off the availability view.
    let on_shelf = repo
        .list_books(&BookListQuery {
            available_only: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(on_shelf.len(), 2);
    assert!(on_shelf.iter().all(|b| b.uuid != dune.uuid));

    // Pagination walks the same ordering.
    let page = repo
        .list_books(&BookListQuery {
            limit: Some(1),
            offset: 1,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].uuid, dune.uuid);
}

#[test]
fn search_matches_title_author_isbn_and_genre() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBookRepository::try_new(&mut conn).unwrap();

    let mut dune = book_with("Dune", "Frank Herbert", 1, &["sci-fi"]);
    dune.isbn = normalize_isbn("9780441172719");
    let hobbit = book_with("The Hobbit", "J.R.R. Tolkien", 1, &["fantasy"]);
    repo.create_book(&dune).unwrap();
    repo.create_book(&hobbit).unwrap();

    let by_title = repo.search_books("dun").unwrap();
    assert_eq!(by_title.len(), 1);
    assert_eq!(by_title[0].uuid, dune.uuid);

    let by_author = repo.search_books("tolkien").unwrap();
    assert_eq!(by_author.len(), 1);
    assert_eq!(by_author[0].uuid, hobbit.uuid);

    let by_isbn = repo.search_books("0441172719").unwrap();
    assert_eq!(by_isbn.len(), 1);
    assert_eq!(by_isbn[0].uuid, dune.uuid);

    let by_genre = repo.search_books("fantasy").unwrap();
    assert_eq!(by_genre.len(), 1);
    assert_eq!(by_genre[0].uuid, hobbit.uuid);

    assert!(repo.search_books("   ").unwrap().is_empty());
    assert!(repo.search_books("no such thing").unwrap().is_empty());
}

#[test]
fn resize_copies_recomputes_availability_from_active_loans() {
    let mut conn = open_db_in_memory().unwrap();

    let book = {
        let mut repo = SqliteBookRepository::try_new(&mut conn).unwrap();
        let book = Book::new("Dune", "Frank Herbert", 2);
        repo.create_book(&book).unwrap();
        book
    };
    let m1 = register(&conn, "m1", Role::Member);
    let m2 = register(&conn, "m2", Role::Member);
    {
        let mut loans = SqliteLoanRepository::try_new(&mut conn).unwrap();
        loans.checkout(book.uuid, m1.uuid).unwrap();
        loans.checkout(book.uuid, m2.uuid).unwrap();
    }

    let mut repo = SqliteBookRepository::try_new(&mut conn).unwrap();

    // Growing the stock puts the new copies straight on the shelf.
    let grown = repo.resize_copies(book.uuid, 5).unwrap();
    assert_eq!(grown.total_copies, 5);
    assert_eq!(grown.available_copies, 3);

    // Shrinking down to the checked-out count leaves nothing on the shelf.
    let shrunk = repo.resize_copies(book.uuid, 2).unwrap();
    assert_eq!(shrunk.total_copies, 2);
    assert_eq!(shrunk.available_copies, 0);

    // Below the checked-out count is refused.
    match repo.resize_copies(book.uuid, 1) {
        Err(RepoError::CopiesBelowActiveLoans {
            book_id,
            active_loans,
        }) => {
            assert_eq!(book_id, book.uuid);
            assert_eq!(active_loans, 2);
        }
        other => panic!("expected CopiesBelowActiveLoans, got {other:?}"),
    }

    assert!(matches!(
        repo.resize_copies(book.uuid, 0),
        Err(RepoError::BookValidation(BookValidationError::ZeroTotalCopies))
    ));
    assert!(matches!(
        repo.resize_copies(Uuid::new_v4(), 3),
        Err(RepoError::BookNotFound(_))
    ));
}

#[test]
fn delete_is_blocked_by_active_loans_then_cascades() {
    let mut conn = open_db_in_memory().unwrap();

    let book = {
        let mut repo = SqliteBookRepository::try_new(&mut conn).unwrap();
        let book = book_with("Dune", "Frank Herbert", 1, &["sci-fi"]);
        repo.create_book(&book).unwrap();
        book
    };
    let reader = register(&conn, "reader", Role::Member);
    let loan = {
        let mut loans = SqliteLoanRepository::try_new(&mut conn).unwrap();
        loans.checkout(book.uuid, reader.uuid).unwrap()
    };

    {
        let mut repo = SqliteBookRepository::try_new(&mut conn).unwrap();
        match repo.delete_book(book.uuid) {
            Err(RepoError::HasActiveLoans {
                book_id,
                active_loans,
            }) => {
                assert_eq!(book_id, book.uuid);
                assert_eq!(active_loans, 1);
            }
            other => panic!("expected HasActiveLoans, got {other:?}"),
        }
    }

    {
        let mut loans = SqliteLoanRepository::try_new(&mut conn).unwrap();
        loans.return_loan(loan.uuid, &reader.actor()).unwrap();
    }

    {
        let mut repo = SqliteBookRepository::try_new(&mut conn).unwrap();
        repo.delete_book(book.uuid).unwrap();
        assert!(repo.get_book(book.uuid).unwrap().is_none());
        assert!(matches!(
            repo.delete_book(book.uuid),
            Err(RepoError::BookNotFound(_))
        ));
    }

    // Historical loans and genre links went with the book.
    let orphan_loans: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM loans WHERE book_uuid = ?1;",
            [book.uuid.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    let orphan_links: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM book_genres WHERE book_uuid = ?1;",
            [book.uuid.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(orphan_loans, 0);
    assert_eq!(orphan_links, 0);
}

#[test]
fn catalogue_mutations_are_staff_only() {
    let mut conn = open_db_in_memory().unwrap();
    let reader = register(&conn, "reader", Role::Member);
    let librarian = register(&conn, "librarian", Role::Staff);

    let mut service = CatalogService::new(SqliteBookRepository::try_new(&mut conn).unwrap());
    let book = Book::new("Dune", "Frank Herbert", 1);

    assert!(matches!(
        service.add_book(&reader.actor(), &book),
        Err(RepoError::NotAuthorized { member_id, .. }) if member_id == reader.uuid
    ));
    service.add_book(&librarian.actor(), &book).unwrap();

    assert!(matches!(
        service.resize_copies(&reader.actor(), book.uuid, 2),
        Err(RepoError::NotAuthorized { .. })
    ));
    assert!(matches!(
        service.remove_book(&reader.actor(), book.uuid),
        Err(RepoError::NotAuthorized { .. })
    ));

    // Browse and search stay open to everyone.
    assert!(service.get_book(book.uuid).unwrap().is_some());
    assert_eq!(service.search_books("dune").unwrap().len(), 1);

    service.remove_book(&librarian.actor(), book.uuid).unwrap();
}
