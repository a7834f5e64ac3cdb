pub mod toml_config;

pub use toml_config::CommerceConfig;

#[cfg(feature = "cli")]
mod cli_args {
    use clap::{Args, Parser, Subcommand};
    use std::path::PathBuf;
    use uuid::Uuid;

    #[derive(Debug, Clone, Parser)]
    #[command(name = "bounty-commerce")]
    #[command(about = "Fund bounties through carts, sales orders and payments")]
    pub struct CliConfig {
        /// TOML 配置檔
        #[arg(long)]
        pub config: Option<PathBuf>,

        /// 覆寫 [storage] data_dir
        #[arg(long)]
        pub data_dir: Option<String>,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, help = "Emit logs as JSON lines")]
        pub json_logs: bool,

        #[command(subcommand)]
        pub command: Command,
    }

    #[derive(Debug, Clone, Subcommand)]
    pub enum Command {
        /// 建立組織（同時建立錢包與點數帳戶）
        CreateOrg {
            #[arg(long)]
            name: String,
            /// ISO 3166-1 alpha-2
            #[arg(long)]
            country: String,
            #[arg(long)]
            tax_id: Option<String>,
        },
        /// 儲值組織錢包；指定 --method 時透過付款閘道收款
        Deposit {
            #[arg(long)]
            org: Uuid,
            #[arg(long)]
            amount_cents: u64,
            #[command(flatten)]
            payment: PaymentArgs,
        },
        /// 直接發放點數給組織
        GrantPoints {
            #[arg(long)]
            org: Uuid,
            #[arg(long)]
            points: u64,
            #[arg(long, default_value = "Manual grant")]
            rationale: String,
        },
        CreateCart {
            #[arg(long)]
            org: Uuid,
        },
        AddBounty(AddBountyArgs),
        Checkout {
            #[arg(long)]
            cart: Uuid,
            #[command(flatten)]
            payment: PaymentArgs,
        },
        Refund {
            #[arg(long)]
            order: Uuid,
            #[arg(long, default_value = "Refund requested")]
            reason: String,
        },
        ShowOrder {
            #[arg(long)]
            order: Uuid,
        },
        ShowWallet {
            #[arg(long)]
            org: Uuid,
        },
    }

    #[derive(Debug, Clone, Args)]
    pub struct AddBountyArgs {
        #[arg(long)]
        pub cart: Uuid,
        #[arg(long)]
        pub product: String,
        #[arg(long)]
        pub title: String,
        #[arg(long, default_value = "")]
        pub description: String,
        #[arg(long, conflicts_with = "points")]
        pub usd_cents: Option<u64>,
        #[arg(long)]
        pub points: Option<u64>,
        #[arg(long, conflicts_with = "competition")]
        pub challenge: Option<String>,
        #[arg(long)]
        pub competition: Option<String>,
        #[arg(long, default_value = "1")]
        pub quantity: u32,
    }

    #[derive(Debug, Clone, Args)]
    pub struct PaymentArgs {
        /// PayPal、USDT 或 CreditCard
        #[arg(long)]
        pub method: Option<String>,

        /// 付款欄位，例如 --detail paypal_email=org@example.com
        #[arg(long = "detail", value_parser = parse_key_val)]
        pub details: Vec<(String, String)>,
    }

    fn parse_key_val(s: &str) -> Result<(String, String), String> {
        s.split_once('=')
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_checkout_command() {
            let cart = Uuid::new_v4();
            let cli = CliConfig::try_parse_from([
                "bounty-commerce",
                "--verbose",
                "checkout",
                "--cart",
                &cart.to_string(),
                "--method",
                "paypal",
                "--detail",
                "paypal_email=org@example.com",
            ])
            .unwrap();

            assert!(cli.verbose);
            match cli.command {
                Command::Checkout { cart: parsed, payment } => {
                    assert_eq!(parsed, cart);
                    assert_eq!(payment.method.as_deref(), Some("paypal"));
                    assert_eq!(
                        payment.details,
                        vec![("paypal_email".to_string(), "org@example.com".to_string())]
                    );
                }
                other => panic!("unexpected command {:?}", other),
            }
        }

        #[test]
        fn test_add_bounty_rejects_both_rewards() {
            let result = CliConfig::try_parse_from([
                "bounty-commerce",
                "add-bounty",
                "--cart",
                &Uuid::new_v4().to_string(),
                "--product",
                "p",
                "--title",
                "t",
                "--usd-cents",
                "100",
                "--points",
                "5",
            ]);
            assert!(result.is_err());
        }
    }
}

#[cfg(feature = "cli")]
pub use cli_args::{AddBountyArgs, CliConfig, Command, PaymentArgs};
