use crate::auth::{AuthService, NewUser};
use crate::config::{AuthConfig, Config, PasswordScheme};
use crate::db::{
    Book, CREDENTIALS_PROVIDER, Database, Role, Session, Shelf, ShelfEntry, User, now_timestamp,
};
use crate::error::AppError;
use crate::library::{Catalog, NewBook, ShelfService, ShelfUpdate};
use std::sync::{Arc, Barrier};

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn fast_auth_config() -> AuthConfig {
    AuthConfig {
        bcrypt_cost: 4,
        ..AuthConfig::default()
    }
}

fn auth_service(db: &Database) -> AuthService {
    AuthService::new(db.clone(), &fast_auth_config())
}

fn new_user(email: &str, password: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        password: password.to_string(),
        name: String::new(),
        photo: None,
    }
}

fn create_user(db: &Database, id: &str, email: &str) {
    let user = User {
        id: id.to_string(),
        name: "Reader".to_string(),
        email: email.to_string(),
        password_hash: "hash".to_string(),
        provider: CREDENTIALS_PROVIDER.to_string(),
        role: Role::User,
        photo: None,
        created_at: now_timestamp(),
        last_login: None,
    };
    db.create_user(&user).unwrap();
}

fn create_book(db: &Database, id: &str, title: &str, total_pages: Option<i64>) {
    let book = Book {
        id: id.to_string(),
        title: title.to_string(),
        author: "Anon".to_string(),
        cover_image: None,
        total_pages,
        description: None,
        created_at: now_timestamp(),
    };
    db.create_book(&book).unwrap();
}

fn place(book_id: &str, shelf: Shelf, progress: Option<i64>) -> ShelfUpdate {
    ShelfUpdate {
        book_id: book_id.to_string(),
        shelf,
        progress,
        total_pages: None,
    }
}

// ========== DATABASE ==========

#[test]
fn db_create_and_get_user() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");

    let found = db.get_user_by_email("alice@example.com").unwrap().unwrap();
    assert_eq!(found.id, "user-1");
    assert_eq!(found.provider, "credentials");
    assert_eq!(found.role, Role::User);

    let found_by_id = db.get_user_by_id("user-1").unwrap().unwrap();
    assert_eq!(found_by_id.email, "alice@example.com");
}

#[test]
fn db_duplicate_email_is_conflict() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");

    let duplicate = User {
        id: "user-2".to_string(),
        name: "Other".to_string(),
        email: "alice@example.com".to_string(),
        password_hash: "hash2".to_string(),
        provider: CREDENTIALS_PROVIDER.to_string(),
        role: Role::User,
        photo: None,
        created_at: now_timestamp(),
        last_login: None,
    };

    let err = db.create_user(&duplicate).unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(db.list_users().unwrap().len(), 1);
}

#[test]
fn db_delete_user_cascades_shelves() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");
    create_book(&db, "book-1", "Dune", Some(412));
    let shelves = ShelfService::new(db.clone());
    shelves
        .update("user-1", &place("book-1", Shelf::Read, None))
        .unwrap();

    assert!(db.delete_user("alice@example.com").unwrap());
    assert!(db.get_shelf_entry("user-1", "book-1").unwrap().is_none());
    assert!(!db.delete_user("alice@example.com").unwrap());
}

#[test]
fn db_create_and_delete_session() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");

    let session = Session {
        token: "token-1".to_string(),
        user_id: "user-1".to_string(),
        expires_at: now_timestamp() + 3600,
    };
    db.create_session(&session).unwrap();

    let found = db.get_session("token-1").unwrap().unwrap();
    assert_eq!(found.user_id, "user-1");

    db.delete_session("token-1").unwrap();
    assert!(db.get_session("token-1").unwrap().is_none());
}

#[test]
fn db_expired_sessions_cleanup() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");

    db.create_session(&Session {
        token: "expired".to_string(),
        user_id: "user-1".to_string(),
        expires_at: now_timestamp() - 10,
    })
    .unwrap();
    db.create_session(&Session {
        token: "valid".to_string(),
        user_id: "user-1".to_string(),
        expires_at: now_timestamp() + 3600,
    })
    .unwrap();

    assert_eq!(db.cleanup_expired_sessions().unwrap(), 1);
    assert!(db.get_session("expired").unwrap().is_none());
    assert!(db.get_session("valid").unwrap().is_some());
}

#[test]
fn db_list_books_filters_by_title_or_author() {
    let db = test_db();
    create_book(&db, "b1", "Dune", Some(412));
    create_book(&db, "b2", "Emma", Some(474));
    create_book(&db, "b3", "100% Pure", None);

    let all = db.list_books(None).unwrap();
    let titles: Vec<_> = all.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, ["100% Pure", "Dune", "Emma"]);

    let hits = db.list_books(Some("DUN")).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "b1");

    let by_author = db.list_books(Some("anon")).unwrap();
    assert_eq!(by_author.len(), 3);

    // Wildcard characters in the query are matched literally.
    let literal = db.list_books(Some("%")).unwrap();
    assert_eq!(literal.len(), 1);
    assert_eq!(literal[0].id, "b3");
}

#[test]
fn db_shelf_entry_upsert_keeps_added_at() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");
    create_book(&db, "book-1", "Dune", Some(412));

    let mut entry = ShelfEntry {
        user_id: "user-1".to_string(),
        book_id: "book-1".to_string(),
        shelf: Shelf::WantToRead,
        progress: None,
        total_pages: None,
        added_at: 100,
        updated_at: 100,
    };
    db.save_shelf_entry(&entry).unwrap();

    entry.shelf = Shelf::CurrentlyReading;
    entry.progress = Some(10);
    entry.added_at = 999;
    entry.updated_at = 200;
    db.save_shelf_entry(&entry).unwrap();

    let stored = db.get_shelf_entry("user-1", "book-1").unwrap().unwrap();
    assert_eq!(stored.shelf, Shelf::CurrentlyReading);
    assert_eq!(stored.progress, Some(10));
    assert_eq!(stored.added_at, 100);
    assert_eq!(stored.updated_at, 200);
}

#[test]
fn db_shelf_entry_upsert_keeps_omitted_progress() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");
    create_book(&db, "book-1", "Dune", Some(412));

    let mut entry = ShelfEntry {
        user_id: "user-1".to_string(),
        book_id: "book-1".to_string(),
        shelf: Shelf::CurrentlyReading,
        progress: Some(50),
        total_pages: Some(400),
        added_at: 100,
        updated_at: 100,
    };
    db.save_shelf_entry(&entry).unwrap();

    entry.shelf = Shelf::Read;
    entry.progress = None;
    entry.total_pages = None;
    entry.updated_at = 200;
    db.save_shelf_entry(&entry).unwrap();

    let stored = db.get_shelf_entry("user-1", "book-1").unwrap().unwrap();
    assert_eq!(stored.shelf, Shelf::Read);
    assert_eq!(stored.progress, Some(50));
    assert_eq!(stored.total_pages, Some(400));
}

#[test]
fn db_delete_book_removes_shelf_entries() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");
    create_book(&db, "book-1", "Dune", Some(412));
    ShelfService::new(db.clone())
        .update("user-1", &place("book-1", Shelf::WantToRead, None))
        .unwrap();

    assert!(db.delete_book("book-1").unwrap());
    assert!(db.get_user_shelf_entries("user-1").unwrap().is_empty());
}

#[test]
fn db_ping() {
    assert!(test_db().ping().is_ok());
}

// ========== AUTH ==========

#[test]
fn auth_register_and_login() {
    let db = test_db();
    let auth = auth_service(&db);

    let user = auth
        .register(&new_user("Ada@Example.com", "secret1"))
        .unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.name, "ada");
    assert_eq!(user.role, Role::User);
    assert_eq!(user.provider, CREDENTIALS_PROVIDER);
    assert!(user.password_hash.starts_with("$2"));

    let (logged_in, token) = auth.login(" ada@example.com ", "secret1").unwrap();
    assert_eq!(logged_in.id, user.id);
    assert!(!token.is_empty());

    let stored = db.get_user_by_id(&user.id).unwrap().unwrap();
    assert!(stored.last_login.is_some());
}

#[test]
fn auth_register_keeps_given_name_and_photo() {
    let auth = auth_service(&test_db());
    let user = auth
        .register(&NewUser {
            email: "ada@example.com".to_string(),
            password: "secret1".to_string(),
            name: "  Ada Lovelace ".to_string(),
            photo: Some("/uploads/ada.png".to_string()),
        })
        .unwrap();

    assert_eq!(user.name, "Ada Lovelace");
    assert_eq!(user.photo.as_deref(), Some("/uploads/ada.png"));
}

#[test]
fn auth_register_duplicate_email_is_conflict() {
    let auth = auth_service(&test_db());
    auth.register(&new_user("ada@example.com", "secret1"))
        .unwrap();

    let err = auth
        .register(&new_user("ADA@example.com", "another1"))
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[test]
fn auth_concurrent_registration_creates_one_user() {
    let db = test_db();
    let auth = Arc::new(auth_service(&db));
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let auth = auth.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                auth.register(&new_user("race@example.com", "secret1"))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let created = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(created, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, AppError::Conflict(_)))
    );
    assert_eq!(db.list_users().unwrap().len(), 1);
}

#[test]
fn auth_register_validation() {
    let auth = auth_service(&test_db());

    for (email, password) in [
        ("", "secret1"),
        ("ada@example.com", ""),
        ("not-an-email", "secret1"),
        ("@example.com", "secret1"),
        ("ada@", "secret1"),
        ("ada@example.com", "short"),
    ] {
        let err = auth.register(&new_user(email, password)).unwrap_err();
        assert!(
            matches!(err, AppError::Validation(_)),
            "{email:?}/{password:?} gave {err:?}"
        );
    }
}

#[test]
fn auth_registration_disabled() {
    let config = AuthConfig {
        registration: "disabled".to_string(),
        ..fast_auth_config()
    };
    let auth = AuthService::new(test_db(), &config);

    let err = auth
        .register(&new_user("ada@example.com", "secret1"))
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Admins can still create accounts.
    let admin = auth
        .create_user(&new_user("root@example.com", "secret1"), Role::Admin)
        .unwrap();
    assert!(auth.is_admin(&admin));
}

#[test]
fn auth_wrong_password_and_unknown_email_look_the_same() {
    let auth = auth_service(&test_db());
    auth.register(&new_user("ada@example.com", "secret1"))
        .unwrap();

    let wrong = auth.login("ada@example.com", "wrong-pw").unwrap_err();
    let unknown = auth.login("bob@example.com", "secret1").unwrap_err();

    assert!(matches!(wrong, AppError::AuthFailed));
    assert!(matches!(unknown, AppError::AuthFailed));
    assert_eq!(wrong.to_string(), unknown.to_string());
}

#[test]
fn auth_login_requires_fields() {
    let auth = auth_service(&test_db());
    assert!(matches!(
        auth.login("", "secret1").unwrap_err(),
        AppError::Validation(_)
    ));
    assert!(matches!(
        auth.login("ada@example.com", "").unwrap_err(),
        AppError::Validation(_)
    ));
}

#[test]
fn auth_validate_token_and_logout() {
    let auth = auth_service(&test_db());
    auth.register(&new_user("ada@example.com", "secret1"))
        .unwrap();
    let (user, token) = auth.login("ada@example.com", "secret1").unwrap();

    let validated = auth.validate_token(&token).unwrap().unwrap();
    assert_eq!(validated.id, user.id);

    auth.logout(&token).unwrap();
    assert!(auth.validate_token(&token).unwrap().is_none());
    assert!(auth.validate_token("bogus").unwrap().is_none());
}

#[test]
fn auth_change_password() {
    let auth = auth_service(&test_db());
    auth.register(&new_user("ada@example.com", "secret1"))
        .unwrap();

    assert!(auth.change_password("ada@example.com", "newpass1").unwrap());
    assert!(auth.login("ada@example.com", "secret1").is_err());
    assert!(auth.login("ada@example.com", "newpass1").is_ok());

    assert!(!auth.change_password("nobody@example.com", "newpass1").unwrap());
    assert!(matches!(
        auth.change_password("ada@example.com", "x").unwrap_err(),
        AppError::Validation(_)
    ));
}

#[test]
fn auth_argon2_accounts_log_in() {
    let config = AuthConfig {
        password_hash: PasswordScheme::Argon2,
        ..fast_auth_config()
    };
    let auth = AuthService::new(test_db(), &config);

    let user = auth
        .register(&new_user("ada@example.com", "secret1"))
        .unwrap();
    assert!(user.password_hash.starts_with("$argon2"));
    assert!(auth.login("ada@example.com", "secret1").is_ok());
}

#[test]
fn auth_admin_role_is_reported_on_login() {
    let auth = auth_service(&test_db());
    auth.create_user(&new_user("root@example.com", "secret1"), Role::Admin)
        .unwrap();

    let (user, _) = auth.login("root@example.com", "secret1").unwrap();
    assert_eq!(user.public().role, Role::Admin);
}

// ========== SHELVES ==========

#[test]
fn shelf_add_move_and_progress() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");
    create_book(&db, "book-1", "Dune", Some(400));
    let service = ShelfService::new(db.clone());

    let shelves = service
        .update("user-1", &place("book-1", Shelf::WantToRead, None))
        .unwrap();
    assert_eq!(shelves.want_to_read.len(), 1);

    let shelves = service
        .update("user-1", &place("book-1", Shelf::CurrentlyReading, Some(100)))
        .unwrap();
    assert!(shelves.want_to_read.is_empty());
    let item = &shelves.currently_reading[0];
    assert_eq!(item.progress, Some(100));
    assert_eq!(item.total_pages, Some(400));
    assert_eq!(item.percentage, Some(25));

    // Moving keeps the recorded progress.
    let shelves = service
        .update("user-1", &place("book-1", Shelf::Read, None))
        .unwrap();
    assert_eq!(shelves.len(), 1);
    assert_eq!(shelves.read[0].progress, Some(100));
}

#[test]
fn shelf_concurrent_move_never_reverts_progress() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");
    create_book(&db, "book-1", "Dune", Some(400));
    let service = ShelfService::new(db.clone());
    service
        .update("user-1", &place("book-1", Shelf::CurrentlyReading, Some(0)))
        .unwrap();

    let barrier = Arc::new(Barrier::new(2));

    let reader = {
        let service = service.clone();
        let barrier = barrier.clone();
        std::thread::spawn(move || {
            barrier.wait();
            for page in 1..=200 {
                service
                    .update(
                        "user-1",
                        &place("book-1", Shelf::CurrentlyReading, Some(page)),
                    )
                    .unwrap();
            }
        })
    };

    let mover = {
        let service = service.clone();
        let barrier = barrier.clone();
        std::thread::spawn(move || {
            barrier.wait();
            for _ in 0..200 {
                service
                    .update("user-1", &place("book-1", Shelf::Read, None))
                    .unwrap();
            }
        })
    };

    reader.join().unwrap();
    mover.join().unwrap();

    let stored = db.get_shelf_entry("user-1", "book-1").unwrap().unwrap();
    assert_eq!(stored.progress, Some(200));
}

#[test]
fn shelf_progress_is_not_clamped() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");
    create_book(&db, "book-1", "Dune", Some(100));
    let service = ShelfService::new(db);

    let shelves = service
        .update("user-1", &place("book-1", Shelf::CurrentlyReading, Some(150)))
        .unwrap();
    let item = shelves.find("book-1").unwrap();
    assert_eq!(item.progress, Some(150));
    assert_eq!(item.percentage, Some(150));
    assert_eq!(item.bar_width(), Some(100.0));
}

#[test]
fn shelf_entry_page_count_overrides_book() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");
    create_book(&db, "book-1", "Dune", None);
    let service = ShelfService::new(db);

    let shelves = service
        .update("user-1", &place("book-1", Shelf::CurrentlyReading, Some(10)))
        .unwrap();
    assert_eq!(shelves.currently_reading[0].percentage, None);

    let shelves = service
        .update(
            "user-1",
            &ShelfUpdate {
                total_pages: Some(40),
                ..place("book-1", Shelf::CurrentlyReading, None)
            },
        )
        .unwrap();
    let item = &shelves.currently_reading[0];
    assert_eq!(item.progress, Some(10));
    assert_eq!(item.total_pages, Some(40));
    assert_eq!(item.percentage, Some(25));
}

#[test]
fn shelf_update_rejects_bad_input() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");
    create_book(&db, "book-1", "Dune", Some(100));
    let service = ShelfService::new(db);

    let negative = service
        .update("user-1", &place("book-1", Shelf::CurrentlyReading, Some(-1)))
        .unwrap_err();
    assert!(matches!(negative, AppError::Validation(_)));

    let wrong_shelf = service
        .update("user-1", &place("book-1", Shelf::WantToRead, Some(5)))
        .unwrap_err();
    assert!(matches!(wrong_shelf, AppError::Validation(_)));

    let zero_pages = service
        .update(
            "user-1",
            &ShelfUpdate {
                total_pages: Some(0),
                ..place("book-1", Shelf::CurrentlyReading, None)
            },
        )
        .unwrap_err();
    assert!(matches!(zero_pages, AppError::Validation(_)));

    let missing = service
        .update("user-1", &place("nope", Shelf::Read, None))
        .unwrap_err();
    assert!(matches!(missing, AppError::NotFound(_)));
}

#[test]
fn shelf_snapshot_keeps_shelving_order() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");
    create_book(&db, "a", "Zebra", Some(10));
    create_book(&db, "b", "Apple", Some(10));
    create_book(&db, "c", "Mango", Some(10));
    let service = ShelfService::new(db);

    for id in ["a", "b", "c"] {
        service
            .update("user-1", &place(id, Shelf::WantToRead, None))
            .unwrap();
    }

    let shelves = service.shelves("user-1").unwrap();
    let order: Vec<_> = shelves
        .want_to_read
        .iter()
        .map(|i| i.book_id.as_str())
        .collect();
    assert_eq!(order, ["a", "b", "c"]);
}

#[test]
fn shelf_users_are_isolated() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");
    create_user(&db, "user-2", "bob@example.com");
    create_book(&db, "book-1", "Dune", Some(100));
    let service = ShelfService::new(db);

    service
        .update("user-1", &place("book-1", Shelf::Read, None))
        .unwrap();

    assert_eq!(service.shelves("user-1").unwrap().len(), 1);
    assert!(service.shelves("user-2").unwrap().is_empty());
}

#[test]
fn shelf_remove() {
    let db = test_db();
    create_user(&db, "user-1", "alice@example.com");
    create_book(&db, "book-1", "Dune", Some(100));
    let service = ShelfService::new(db);

    service
        .update("user-1", &place("book-1", Shelf::Read, None))
        .unwrap();

    let shelves = service.remove("user-1", "book-1").unwrap();
    assert!(shelves.is_empty());

    let err = service.remove("user-1", "book-1").unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ========== CATALOG ==========

#[test]
fn catalog_add_trims_and_lists() {
    let catalog = Catalog::new(test_db());
    let book = catalog
        .add(&NewBook {
            title: "  Dune ".to_string(),
            author: "Frank Herbert".to_string(),
            total_pages: Some(412),
            ..NewBook::default()
        })
        .unwrap();

    assert_eq!(book.title, "Dune");
    assert_eq!(catalog.get(&book.id).unwrap(), book);
    assert_eq!(catalog.list(Some("herbert")).unwrap().len(), 1);
}

// ========== CONFIG ==========

#[test]
fn config_parse_toml() {
    let toml = r#"
[server]
bind = "127.0.0.1:9090"
title = "Test Shelf"

[database]
path = "/tmp/test.db"

[auth]
registration = "disabled"
session_days = 7
password_hash = "argon2"
bcrypt_cost = 10
min_password_length = 8

[uploads]
dir = "/tmp/uploads"
max_bytes = 1024
"#;
    let config: Config = toml::from_str(toml).unwrap();
    config.validate().unwrap();

    assert_eq!(config.server.bind.port(), 9090);
    assert_eq!(config.server.title, "Test Shelf");
    assert!(!config.auth.registration_enabled());
    assert_eq!(config.auth.session_days, 7);
    assert_eq!(config.auth.password_hash, PasswordScheme::Argon2);
    assert_eq!(config.auth.bcrypt_cost, 10);
    assert_eq!(config.auth.min_password_length, 8);
    assert_eq!(config.uploads.max_bytes, 1024);
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.server.bind.port(), 8080);
    assert_eq!(config.server.title, "BookWorm");
    assert!(config.auth.registration_enabled());
    assert_eq!(config.auth.password_hash, PasswordScheme::Bcrypt);
    assert_eq!(config.auth.bcrypt_cost, 14);
    assert_eq!(config.auth.min_password_length, 6);
    assert_eq!(config.uploads.max_bytes, 5 * 1024 * 1024);
}

#[test]
fn config_generated_default_parses() {
    let config: Config = toml::from_str(&Config::generate_default()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.auth.bcrypt_cost, 14);
}

#[test]
fn config_validate_rejects_bad_values() {
    let mut config = Config::default();
    config.auth.bcrypt_cost = 3;
    assert!(matches!(config.validate(), Err(AppError::Config(_))));

    let mut config = Config::default();
    config.auth.registration = "invite".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.uploads.max_bytes = 0;
    assert!(config.validate().is_err());
}

#[test]
fn config_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bookworm.toml");
    std::fs::write(&path, "[auth]\nsession_days = 2\n").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.auth.session_days, 2);
    assert_eq!(config.auth.bcrypt_cost, 14);

    assert!(matches!(
        Config::load(&dir.path().join("missing.toml")),
        Err(AppError::Config(_))
    ));
}
