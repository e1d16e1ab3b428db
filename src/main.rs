//! bookworm server entry point.

use bookworm::{
    auth::{AuthService, NewUser},
    config::{BookCommand, Cli, Command, Config, UserCommand},
    db::{Database, Role, timestamp_to_datetime},
    library::{Catalog, NewBook},
    server::{self, AppState},
};
use clap::Parser;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired sessions are dropped.
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force).await,
        Some(Command::User { action }) => cmd_user(action, &config).await,
        Some(Command::Book { action }) => cmd_book(action, &config).await,
        Some(Command::Serve { bind }) => cmd_serve(config, bind).await,
        None => cmd_serve(config, None).await,
    }
}

/// Initialize config and database.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("bookworm.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    std::fs::create_dir_all(&config.uploads.dir)?;
    println!("Created upload directory: {}", config.uploads.dir.display());

    println!("\nEdit bookworm.toml to configure your server.");
    println!("Then run: bookworm user add <email> --role admin");
    println!("And: bookworm book add <title> --author <author> --pages <n>");

    Ok(())
}

/// User management commands.
async fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let auth = AuthService::new(db, &config.auth);

    match action {
        UserCommand::Add {
            email,
            name,
            password,
            role,
        } => {
            let role: Role = role.parse().map_err(anyhow::Error::msg)?;
            let password = match password {
                Some(p) => p,
                None => prompt_password("Password: ")?,
            };

            let user = auth.create_user(
                &NewUser {
                    email,
                    password,
                    name: name.unwrap_or_default(),
                    photo: None,
                },
                role,
            )?;
            println!(
                "Created user: {} <{}> (role: {}, id: {})",
                user.name, user.email, user.role, user.id
            );
        }

        UserCommand::Del { email } => {
            if auth.delete_user(&email)? {
                println!("Deleted user: {}", email);
            } else {
                println!("User not found: {}", email);
            }
        }

        UserCommand::List => {
            let users = auth.list_users()?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<32} {:<20} {:<8} LAST LOGIN", "EMAIL", "NAME", "ROLE");
                println!("{}", "-".repeat(80));
                for user in users {
                    let last_login = user
                        .last_login
                        .map(|ts| timestamp_to_datetime(ts).format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "{:<32} {:<20} {:<8} {}",
                        user.email, user.name, user.role, last_login
                    );
                }
            }
        }

        UserCommand::Passwd { email, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("New password: ")?,
            };

            if auth.change_password(&email, &password)? {
                println!("Password changed for: {}", email);
            } else {
                println!("User not found: {}", email);
            }
        }
    }

    Ok(())
}

/// Book catalog commands.
async fn cmd_book(action: BookCommand, config: &Config) -> anyhow::Result<()> {
    let catalog = Catalog::new(Database::open(&config.database.path)?);

    match action {
        BookCommand::Add {
            title,
            author,
            pages,
            cover,
            description,
        } => {
            let book = catalog.add(&NewBook {
                title,
                author,
                cover_image: cover,
                total_pages: pages,
                description,
            })?;
            println!("Added book: {} (id: {})", book.title, book.id);
        }

        BookCommand::Del { id } => {
            if catalog.remove(&id)? {
                println!("Deleted book: {}", id);
            } else {
                println!("Book not found: {}", id);
            }
        }

        BookCommand::List { query } => {
            let books = catalog.list(query.as_deref())?;
            if books.is_empty() {
                println!("No books found.");
            } else {
                println!("{:<36} {:<30} {:<20} PAGES", "ID", "TITLE", "AUTHOR");
                println!("{}", "-".repeat(96));
                for book in books {
                    let pages = book
                        .total_pages
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<36} {:<30} {:<20} {}",
                        book.id, book.title, book.author, pages
                    );
                }
            }
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(mut config: Config, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookworm=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = Database::open(&config.database.path)?;
    std::fs::create_dir_all(&config.uploads.dir)?;

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        uploads = %config.uploads.dir.display(),
        "Starting bookworm server"
    );

    if !config.auth.registration_enabled() {
        tracing::info!("Self-service registration is disabled");
    }

    let bind = config.server.bind;
    let state = AppState::new(config, db);

    let auth = state.auth.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match auth.purge_expired_sessions() {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session purge failed"),
            }
        }
    });

    let app = server::create_router(state);

    let listener = TcpListener::bind(bind).await?;
    tracing::info!(address = %bind, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Prompt for password input.
fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    Ok(password.trim().to_string())
}
