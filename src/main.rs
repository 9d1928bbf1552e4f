use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use order_engine::{
    config::{self, AppConfig},
    db,
    entities::{OrderStatus, PaymentMethod, PaymentStatus},
    events::{self, EventSender},
    metrics,
    services::{checkout::CreateOrderRequest, orders::OrderDetail},
    OrderService, ServiceFactory,
};

#[derive(Parser)]
#[command(name = "order-engine", about = "Order lifecycle and stock reservation admin tool", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Create an order from a user's cart
    Checkout {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        address: String,
        #[arg(long, default_value = "COD")]
        method: PaymentMethod,
        #[arg(long)]
        note: Option<String>,
    },
    /// Show an order with its items
    Show {
        order_id: Uuid,
        /// Only show the order if it belongs to this user
        #[arg(long)]
        user: Option<Uuid>,
    },
    /// List a user's orders, newest first
    List {
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        per_page: u64,
    },
    /// Move an order to a new status (admin)
    SetStatus { order_id: Uuid, status: OrderStatus },
    /// Cancel an order, as its owner when --user is given
    Cancel {
        order_id: Uuid,
        #[arg(long)]
        user: Option<Uuid>,
    },
    /// Apply a payment notification
    Payment {
        order_id: Uuid,
        transaction_id: String,
        status: PaymentStatus,
    },
    /// Print engine counters in Prometheus text format
    Metrics,
}

struct CliContext {
    config: AppConfig,
    db: Arc<db::DbPool>,
    service: OrderService,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);
        metrics::init();

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        db::check_connection(&db_pool)
            .await
            .context("database is not reachable")?;
        let db = Arc::new(db_pool);

        if config.auto_migrate {
            db::run_migrations(&db).await.map_err(|e| {
                error!("Failed running migrations: {}", e);
                e
            })?;
        }

        let (event_sender, event_rx) = EventSender::channel(config.event_channel_capacity);
        tokio::spawn(events::process_events(event_rx));

        let service = ServiceFactory::from_config(db.clone(), &config, Some(event_sender))?
            .order_service();

        Ok(Self {
            config,
            db,
            service,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;
    info!(environment = %context.config.environment, "order-engine started");

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::Checkout {
            user,
            address,
            method,
            note,
        } => {
            let response = context
                .service
                .create_order(CreateOrderRequest {
                    user_id: user,
                    shipping_address: address,
                    payment_method: method,
                    note,
                })
                .await?;
            if cli.json {
                print_json(&response)?;
            } else {
                render_detail(&response.order);
                println!(
                    "  discount {}% ({}) on {} [{}]",
                    response.discount.discount_percentage,
                    response.discount.discount_amount,
                    response.discount.original_amount,
                    response.discount.user_rank.as_str()
                );
                if let Some(intent) = &response.payment_intent {
                    println!("  payment reference {}", intent.reference);
                }
            }
        }
        Commands::Show { order_id, user } => {
            let detail = match user {
                Some(user_id) => context.service.get_order(user_id, order_id).await?,
                None => context.service.find_order(order_id).await?,
            };
            if cli.json {
                print_json(&detail)?;
            } else {
                render_detail(&detail);
            }
        }
        Commands::List {
            user,
            page,
            per_page,
        } => {
            let listing = context.service.list_orders(user, page, per_page).await?;
            if cli.json {
                print_json(&listing)?;
            } else {
                println!(
                    "{} orders (page {}, {} per page)",
                    listing.total, listing.page, listing.per_page
                );
                for order in &listing.orders {
                    render_order(order);
                }
            }
        }
        Commands::SetStatus { order_id, status } => {
            let order = context
                .service
                .update_order_status(order_id, status)
                .await?;
            output_order(&order, cli.json)?;
        }
        Commands::Cancel { order_id, user } => {
            let order = match user {
                Some(user_id) => context.service.cancel_order(user_id, order_id).await?,
                None => context.service.cancel_order_as_admin(order_id).await?,
            };
            output_order(&order, cli.json)?;
        }
        Commands::Payment {
            order_id,
            transaction_id,
            status,
        } => {
            let order = context
                .service
                .apply_payment_notification(order_id, &transaction_id, status)
                .await?;
            output_order(&order, cli.json)?;
        }
        Commands::Metrics => {
            print!("{}", metrics::gather_text()?);
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn output_order(order: &order_engine::entities::order::Model, json: bool) -> Result<()> {
    if json {
        print_json(order)
    } else {
        render_order(order);
        Ok(())
    }
}

fn render_order(order: &order_engine::entities::order::Model) {
    println!(
        "- Order {} • user {} • status {} • payment {} ({}) • total {}",
        order.id,
        order.user_id,
        order.status.as_str(),
        order.payment_status.as_str(),
        order.payment_method.as_str(),
        order.total_amount
    );
}

fn render_detail(detail: &OrderDetail) {
    render_order(&detail.order);
    for item in &detail.items {
        println!(
            "    {} x{} @ {}",
            item.product_id, item.quantity, item.price_at_purchase
        );
    }
}
