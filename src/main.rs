use anyhow::Context;
use bounty_commerce::config::{AddBountyArgs, Command, PaymentArgs};
use bounty_commerce::domain::model::{BountyPurchaseData, PaymentMethod};
use bounty_commerce::domain::ports::PaymentDetails;
use bounty_commerce::utils::error::ErrorSeverity;
use bounty_commerce::utils::{logger, validation::Validate};
use bounty_commerce::{
    build_payment_service, CheckoutEngine, CliConfig, CommerceConfig, CommerceError, EventBus,
    FileStore,
};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting bounty-commerce CLI");
    if cli.verbose {
        tracing::debug!("CLI args: {:?}", cli);
    }

    let mut config = match &cli.config {
        Some(path) => CommerceConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => CommerceConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.storage.data_dir = data_dir.clone();
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command, &config).await {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 4,      // 輸入錯誤
            ErrorSeverity::Medium => 2,   // 可重試
            ErrorSeverity::High => 1,     // 配置錯誤
            ErrorSeverity::Critical => 3, // 系統錯誤
        };
        std::process::exit(exit_code);
    }

    Ok(())
}

async fn run(command: Command, config: &CommerceConfig) -> Result<(), CommerceError> {
    let store = Arc::new(FileStore::open(&config.storage.data_dir).await?);
    let bus = EventBus::new(config.event_bus.mode, config.event_bus.logging_enabled)
        .with_log_capacity(config.event_bus.log_capacity);
    let payments = build_payment_service(config)?;
    let engine = CheckoutEngine::new(store, config, payments, bus);

    match command {
        Command::CreateOrg {
            name,
            country,
            tax_id,
        } => print_json(&engine.create_organisation(&name, &country, tax_id).await?),
        Command::Deposit {
            org,
            amount_cents,
            payment,
        } => {
            let transaction = match parse_method(&payment)? {
                Some(method) => {
                    engine
                        .wallets()
                        .deposit(org, amount_cents, method, &details(&payment))
                        .await?
                }
                None => {
                    engine
                        .wallets()
                        .add_funds(org, amount_cents, "Manual deposit", None, None)
                        .await?
                }
            };
            print_json(&transaction)
        }
        Command::GrantPoints {
            org,
            points,
            rationale,
        } => print_json(&engine.points().create_grant(org, points, None, &rationale).await?),
        Command::CreateCart { org } => print_json(&engine.carts().create_cart(org).await?),
        Command::AddBounty(args) => {
            let cart_id = args.cart;
            let quantity = args.quantity;
            let data = purchase_data(args)?;
            engine.carts().add_bounty(cart_id, data, quantity).await?;
            print_json(&engine.carts().get_cart(cart_id).await?)
        }
        Command::Checkout { cart, payment } => {
            let method = parse_method(&payment)?;
            let receipt = engine.checkout(cart, method, &details(&payment)).await?;
            print_json(&receipt)
        }
        Command::Refund { order, reason } => {
            print_json(&engine.orders().refund_order(order, &reason).await?)
        }
        Command::ShowOrder { order } => print_json(&engine.orders().get_order(order).await?),
        Command::ShowWallet { org } => {
            #[derive(Serialize)]
            struct WalletView<T: Serialize> {
                organisation_id: uuid::Uuid,
                balance_usd_cents: u64,
                points: u64,
                transactions: Vec<T>,
            }

            print_json(&WalletView {
                organisation_id: org,
                balance_usd_cents: engine.wallets().get_balance(org).await?,
                points: engine.points().balance(org).await?,
                transactions: engine.wallets().transactions(org).await?,
            })
        }
    }
}

fn parse_method(payment: &PaymentArgs) -> Result<Option<PaymentMethod>, CommerceError> {
    payment.method.as_deref().map(str::parse).transpose()
}

fn details(payment: &PaymentArgs) -> PaymentDetails {
    payment.details.iter().cloned().collect()
}

fn purchase_data(args: AddBountyArgs) -> Result<BountyPurchaseData, CommerceError> {
    let mut data = match (args.usd_cents, args.points) {
        (Some(cents), None) => BountyPurchaseData::usd(&args.product, &args.title, cents),
        (None, Some(points)) => BountyPurchaseData::points(&args.product, &args.title, points),
        _ => {
            return Err(CommerceError::validation(
                "Specify exactly one of --usd-cents or --points",
            ))
        }
    };
    data = data.with_description(&args.description);
    if let Some(challenge) = &args.challenge {
        data = data.with_challenge(challenge);
    }
    if let Some(competition) = &args.competition {
        data = data.with_competition(competition);
    }
    Ok(data)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CommerceError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
