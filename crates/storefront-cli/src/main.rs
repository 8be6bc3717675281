//! Storefront CLI - browse the catalog, place orders, and manage your session
//! from the terminal.

mod cli;

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storefront_core::cache::CacheManager;
use storefront_core::models::OrderItem;
use storefront_core::utils::{format_age, truncate_string};
use storefront_core::{ApiClient, ApiError, Config, CredentialStore};

use cli::{Cli, Commands};

/// Log file written to the cache directory
const LOG_FILE: &str = "storefront.log";

/// Width of the description column in product listings
const DESCRIPTION_WIDTH: usize = 40;

const ENV_EMAIL: &str = "STOREFRONT_EMAIL";
const ENV_PASSWORD: &str = "STOREFRONT_PASSWORD";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
/// Output goes to stderr and, when the cache directory is available,
/// to a log file there as well.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file = config
        .cache_dir()
        .ok()
        .filter(|dir| std::fs::create_dir_all(dir).is_ok())
        .map(|dir| tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE)));

    let stderr_layer = fmt::layer().with_writer(io::stderr);
    match file {
        Some((writer, guard)) => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config ({}), using defaults", e);
            Config::default()
        }
    };
    if let Some(ref base) = cli.api_base {
        config.api_base = Some(base.clone());
    }
    if let Some(mode) = cli.renewal_mode {
        config.renewal_mode = mode.into();
    }

    let _guard = init_tracing(&config);
    info!(api_base = config.api_base(), mode = ?config.renewal_mode, "Storefront CLI starting");

    let store = CredentialStore::new(config.session_backend()?);
    let client = ApiClient::new(&config, store)?;

    let result = run(cli.command, &client, &config).await;
    if let Err(ref e) = result {
        if let Some(ApiError::RenewalFailed(_)) = e.downcast_ref::<ApiError>() {
            eprintln!("Your session has expired. Run `storefront login` to sign in again.");
        }
    }
    result
}

async fn run(command: Commands, client: &ApiClient, config: &Config) -> Result<()> {
    match command {
        Commands::Products { offline } => list_products(client, config, offline).await,
        Commands::Order {
            product_id,
            quantity,
        } => place_order(client, product_id, quantity).await,
        Commands::ShowOrder { order_id } => {
            let order = client.fetch_order(order_id).await?;
            println!("Order #{}: {}", order.id, order.status);
            if let Some(created_at) = order.created_at {
                println!("Placed:   {}", created_at);
            }
            Ok(())
        }
        Commands::Register { email, name } => {
            let password = prompt_password("Choose a password: ")?;
            let registration = client.register(&email, &password, name.as_deref()).await?;
            println!(
                "Registered {} (user #{}). Run `storefront login` to sign in.",
                registration.email, registration.id
            );
            Ok(())
        }
        Commands::Login { email } => login(client, config, email).await,
        Commands::Logout => {
            let outcome = client.logout().await;
            // The local session is gone either way; only mention the server side.
            if let Err(e) = outcome.revocation {
                warn!(error = %e, "Server did not confirm logout");
            }
            println!("Logged out.");
            Ok(())
        }
        Commands::Status => {
            let session = client.session().await;
            println!("Server:   {}", config.api_base());
            println!("Renewal:  {:?}", config.renewal_mode);
            if session.is_authenticated() {
                let age = session
                    .age_minutes()
                    .map(format_age)
                    .unwrap_or_else(|| "unknown".to_string());
                println!("Session:  signed in (credentials updated {})", age);
                let renewal = if session.refresh_token().is_some() {
                    "stored"
                } else if !session.cookies.is_empty() {
                    "server cookie"
                } else {
                    "none"
                };
                println!("Renewal token: {}", renewal);
            } else {
                println!("Session:  signed out");
            }
            Ok(())
        }
    }
}

async fn list_products(client: &ApiClient, config: &Config, offline: bool) -> Result<()> {
    let cache = CacheManager::new(config.cache_dir()?)?;

    let products = if offline {
        None
    } else {
        match client.list_products().await {
            Ok(products) => {
                if let Err(e) = cache.save_products(&products) {
                    warn!(error = %e, "Failed to cache products");
                }
                Some(products)
            }
            Err(e) => {
                warn!(error = %e, "Failed to load products, trying cache");
                None
            }
        }
    };

    let products = match products {
        Some(products) => products,
        None => {
            let cached = cache
                .load_products()?
                .context("Product catalog unavailable and nothing cached yet")?;
            let stale = if cached.is_stale() { ", may be out of date" } else { "" };
            println!("(cached {}{})", cached.age_display(), stale);
            cached.data
        }
    };

    if products.is_empty() {
        println!("No products available.");
    }
    for product in &products {
        println!(
            "{:>4}  {:<24} {:>10}  {:<14} {}",
            product.id,
            truncate_string(&product.name, 24),
            product.price_display(),
            product.inventory_display(),
            truncate_string(product.description.as_deref().unwrap_or(""), DESCRIPTION_WIDTH),
        );
    }
    Ok(())
}

async fn place_order(client: &ApiClient, product_id: i64, quantity: u32) -> Result<()> {
    if !client.is_authenticated().await {
        anyhow::bail!("Not signed in. Run `storefront login` first.");
    }

    let receipt = client
        .place_order(vec![OrderItem::new(product_id, quantity)])
        .await
        .context("Order failed")?;
    println!(
        "Order #{} {} - total {}",
        receipt.order_id,
        receipt.status,
        receipt.total_display()
    );
    Ok(())
}

async fn login(client: &ApiClient, config: &Config, email: Option<String>) -> Result<()> {
    let email = match email
        .or_else(|| std::env::var(ENV_EMAIL).ok())
        .or_else(|| config.last_email.clone())
    {
        Some(email) => email,
        None => prompt("Email: ")?,
    };

    let password = match std::env::var(ENV_PASSWORD) {
        Ok(password) if !password.is_empty() => password,
        _ => prompt_password("Password: ")?,
    };

    client.login(&email, &password).await?;

    if let Err(e) = Config::remember_email(&email) {
        warn!(error = %e, "Failed to save config");
    }

    println!("Signed in as {}.", email);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_password(label: &str) -> Result<String> {
    let password = rpassword::prompt_password(label)?;
    Ok(password)
}
