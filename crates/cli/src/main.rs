//! Tasty Bites CLI - a terminal front-end over the storefront client.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the session persists in TASTY_STORAGE_PATH)
//! tb-cli login -e diner@example.com -p hunter22
//!
//! # Browse and fill the cart
//! tb-cli products
//! tb-cli cart add 65f1c0de
//! tb-cli cart show
//!
//! # Place the order
//! tb-cli checkout -n "An Nguyen" -e diner@example.com --phone 0901234567 -a "12 Le Loi, Q1"
//!
//! # Keep the session alive, refreshing before it expires
//! tb-cli watch
//! ```
//!
//! # Commands
//!
//! - `login` / `logout` / `whoami` - Session management
//! - `products` - List the menu
//! - `cart` - Inspect and edit the persisted cart
//! - `checkout` - Submit the cart as an order
//! - `orders` - List orders; update or delete them (admin)
//! - `watch` - Run the expiry watch until interrupted

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tasty_bites_client::{ClientConfig, Store};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "tb-cli")]
#[command(author, version, about = "Tasty Bites storefront in the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and persist the session
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,
    },
    /// Clear the stored session (the cart is kept)
    Logout,
    /// Show the signed-in user and remaining session time
    Whoami,
    /// List the menu
    Products,
    /// Inspect and edit the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Submit the cart as an order
    Checkout {
        /// Customer name
        #[arg(short, long)]
        name: String,

        /// Contact email
        #[arg(short, long)]
        email: String,

        /// Contact phone
        #[arg(long)]
        phone: String,

        /// Shipping address
        #[arg(short = 'a', long)]
        address: String,

        /// Payment method (`cash`, `vnpay`, `momo`, `bank_transfer`)
        #[arg(long, default_value = "cash")]
        payment: String,

        /// Notes for the kitchen
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Browse and manage orders
    Orders {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Keep the session fresh until Ctrl-C
    Watch,
}

#[derive(Subcommand)]
enum CartAction {
    /// Show cart contents
    Show,
    /// Add one unit of a product
    Add { product_id: String },
    /// Increase a line's quantity by one
    Inc { product_id: String },
    /// Decrease a line's quantity by one (never below 1)
    Dec { product_id: String },
    /// Remove a line
    Remove { product_id: String },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum OrderAction {
    /// List orders
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 12)]
        limit: u32,
    },
    /// Show one order
    Show { order_id: String },
    /// Change an order's status (admin)
    Status {
        order_id: String,

        /// New status (`pending`, `processing`, `shipped`, `completed`, `cancelled`)
        status: String,
    },
    /// Delete an order (admin)
    Delete { order_id: String },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tb_cli=info,tasty_bites_client=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), CliError> {
    let store = Store::from_config(config)?;
    store.initialize().await;

    match cli.command {
        Commands::Login { email, password } => {
            commands::account::login(&store, &email, password).await?;
        }
        Commands::Logout => commands::account::logout(&store),
        Commands::Whoami => commands::account::whoami(&store),
        Commands::Products => commands::shop::products(&store).await?,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::shop::show_cart(&store),
            CartAction::Add { product_id } => commands::shop::add(&store, &product_id).await?,
            CartAction::Inc { product_id } => commands::shop::increase(&store, &product_id)?,
            CartAction::Dec { product_id } => commands::shop::decrease(&store, &product_id)?,
            CartAction::Remove { product_id } => commands::shop::remove(&store, &product_id)?,
            CartAction::Clear => commands::shop::clear(&store),
        },
        Commands::Checkout {
            name,
            email,
            phone,
            address,
            payment,
            notes,
        } => {
            let details = commands::shop::checkout_details(
                name, &email, phone, address, &payment, notes,
            )?;
            commands::shop::checkout(&store, &details).await?;
        }
        Commands::Orders { action } => match action {
            OrderAction::List { page, limit } => commands::orders::list(&store, page, limit).await?,
            OrderAction::Show { order_id } => commands::orders::show(&store, &order_id).await?,
            OrderAction::Status { order_id, status } => {
                commands::orders::set_status(&store, &order_id, &status).await?;
            }
            OrderAction::Delete { order_id } => commands::orders::delete(&store, &order_id).await?,
        },
        Commands::Watch => commands::watch::run(&store).await?,
    }
    Ok(())
}
