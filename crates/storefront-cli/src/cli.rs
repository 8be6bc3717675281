use clap::{Parser, Subcommand, ValueEnum};
use storefront_core::RenewalMode;

#[derive(Parser)]
#[command(name = "storefront")]
#[command(version)]
#[command(about = "Browse the storefront catalog, place orders, and manage your session")]
pub struct Cli {
    /// Storefront API base URL (overrides config and STOREFRONT_API_BASE)
    #[arg(long, global = true, value_name = "URL")]
    pub api_base: Option<String>,

    /// How the server expects session renewal to happen
    #[arg(long, global = true, value_enum)]
    pub renewal_mode: Option<ModeArg>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Lists the product catalog
    Products {
        /// Show the cached catalog without contacting the server
        #[arg(long)]
        offline: bool,
    },
    /// Places an order for a single product
    Order {
        /// The ID of the product to buy
        #[arg(value_name = "PRODUCT_ID")]
        product_id: i64,
        /// How many to buy
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        quantity: u32,
    },
    /// Shows the status of a placed order
    ShowOrder {
        #[arg(value_name = "ORDER_ID")]
        order_id: i64,
    },
    /// Creates a new account (password is prompted)
    Register {
        #[arg(long)]
        email: String,
        /// Full name shown on the account
        #[arg(long)]
        name: Option<String>,
    },
    /// Signs in and stores the session
    Login {
        /// Defaults to STOREFRONT_EMAIL or the last email used
        #[arg(long)]
        email: Option<String>,
    },
    /// Signs out and forgets the stored session
    Logout,
    /// Shows the current session state
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Renewal token in the request body
    Explicit,
    /// Renewal token in an HttpOnly cookie
    Implicit,
}

impl From<ModeArg> for RenewalMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Explicit => RenewalMode::Explicit,
            ModeArg::Implicit => RenewalMode::Implicit,
        }
    }
}
