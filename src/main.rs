//! Bento Optimizer CLI
//!
//! Lists vaults and builds deposit / withdraw / repay transaction payloads. Nothing
//! is signed or broadcast; output is meant to be handed to a wallet.
//!
//! Run with: cargo run -- vaults --token 0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48

use alloy_primitives::{utils::parse_units, Address, U256};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use console::style;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bento_optimizer::chain::{Chain, RpcReader};
use bento_optimizer::config::Config;
use bento_optimizer::http::HttpJsonClient;
use bento_optimizer::math::VaultTotals;
use bento_optimizer::optimizer::protocols::morpho_bundler::{
    calculate_min_assets, calculate_min_shares, MarketParams,
};
use bento_optimizer::optimizer::protocols::Morpho;
use bento_optimizer::optimizer::{
    PositionPair, ProtocolContext, ProtocolManager, TxInfo, VaultMetadata, WithdrawTxs,
};
use bento_optimizer::tokens::{Token, TokenService};

#[derive(Parser)]
#[command(name = "optimizer", version, about = "Vault discovery and batch transaction builder")]
struct Cli {
    /// TOML config file; environment variables are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the effective configuration
    Config,
    /// List registered protocol ids
    Protocols,
    /// List vaults accepting a token across all protocols
    Vaults {
        #[arg(long)]
        token: Address,
    },
    /// Show an existing position
    Position(PairArgs),
    /// Build deposit transactions
    Deposit(TxArgs),
    /// Build withdrawal transactions
    Withdraw(TxArgs),
    /// Build a Morpho Blue loan repayment through the bundler
    Repay(RepayArgs),
    /// Minimum shares for an ERC-4626 deposit (offline)
    QuoteShares {
        #[command(flatten)]
        vault: VaultArgs,
        /// Vault's balance of the underlying asset
        #[arg(long)]
        asset_balance: U256,
        /// Assets being deposited
        #[arg(long)]
        amount: U256,
    },
    /// Minimum assets for an ERC-4626 redeem (offline)
    QuoteAssets {
        #[command(flatten)]
        vault: VaultArgs,
        /// Owner's share balance
        #[arg(long)]
        share_balance: U256,
        /// Shares being redeemed
        #[arg(long)]
        shares: U256,
    },
}

#[derive(Args)]
struct PairArgs {
    #[arg(long)]
    protocol: String,
    #[arg(long)]
    input: Address,
    #[arg(long)]
    output: Address,
}

#[derive(Args)]
struct TxArgs {
    #[command(flatten)]
    pair: PairArgs,
    /// Human units, e.g. 1.5
    #[arg(long)]
    amount: String,
    /// Overrides USER_ADDRESS
    #[arg(long)]
    user: Option<Address>,
}

#[derive(Args)]
struct RepayArgs {
    #[arg(long)]
    loan_token: Address,
    #[arg(long)]
    collateral_token: Address,
    #[arg(long)]
    oracle: Address,
    #[arg(long)]
    irm: Address,
    /// Liquidation LTV scaled by 1e18
    #[arg(long)]
    lltv: U256,
    /// Loan token amount in human units
    #[arg(long, conflicts_with = "shares", required_unless_present = "shares")]
    amount: Option<String>,
    /// Borrow shares to repay
    #[arg(long)]
    shares: Option<U256>,
    /// Overrides USER_ADDRESS
    #[arg(long)]
    user: Option<Address>,
}

impl RepayArgs {
    fn market(&self) -> MarketParams {
        MarketParams {
            loanToken: self.loan_token,
            collateralToken: self.collateral_token,
            oracle: self.oracle,
            irm: self.irm,
            lltv: self.lltv,
        }
    }
}

#[derive(Args)]
struct VaultArgs {
    #[arg(long)]
    total_supply: U256,
    #[arg(long)]
    total_assets: U256,
    #[arg(long, default_value_t = 0)]
    decimals_offset: u8,
}

impl VaultArgs {
    fn totals(&self) -> VaultTotals {
        VaultTotals::new(self.total_supply, self.total_assets, self.decimals_offset)
    }
}

/// Wired collaborators for commands that touch the network
struct App {
    chain: Chain,
    tokens: Arc<TokenService>,
    manager: ProtocolManager,
    morpho: Morpho,
}

impl App {
    fn new(config: &Config) -> Result<Self> {
        let chain = config
            .chain()
            .ok_or_else(|| eyre!("Unsupported CHAIN_ID {}", config.chain_id))?;

        let reader = Arc::new(RpcReader::new(chain.id, &config.rpc_url)?);
        let http = Arc::new(HttpJsonClient::new(config.http_timeout())?);
        let tokens = Arc::new(TokenService::new(
            reader.clone(),
            config.token_cache_max_entries,
            config.token_cache_ttl(),
        ));

        let settings = config.protocol_settings();
        let ctx = ProtocolContext::new(reader, http, tokens.clone());
        let morpho = Morpho::new(ctx.clone(), settings.morpho_api_url.clone());
        let manager = ProtocolManager::with_default_protocols(ctx, &settings);
        debug!("Protocols ready: {:?}", manager.protocol_ids());

        Ok(Self {
            chain,
            tokens,
            manager,
            morpho,
        })
    }

    async fn pair_tokens(&self, pair: &PairArgs) -> Result<(Token, Token)> {
        let (input, output) = futures::try_join!(
            self.tokens.token_info(&self.chain, pair.input),
            self.tokens.token_info(&self.chain, pair.output),
        )?;
        Ok((input, output))
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn user_for(config: &Config, user: Option<Address>) -> Result<Address> {
    user.or(config.user_address)
        .ok_or_else(|| eyre!("No user address: pass --user or set USER_ADDRESS"))
}

fn parse_amount(amount: &str, token: &Token) -> Result<U256> {
    let parsed = parse_units(amount, token.decimals)
        .wrap_err_with(|| format!("invalid amount {amount} for {}", token.symbol))?;
    Ok(parsed.get_absolute())
}

// ============================================
// OUTPUT
// ============================================

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_vaults(vaults: &[VaultMetadata]) {
    if vaults.is_empty() {
        println!("{}", style("No vaults found").yellow());
        return;
    }
    for vault in vaults {
        println!(
            "{} {} {}",
            style(&vault.protocol.name).cyan().bold(),
            vault.name.as_deref().unwrap_or(&vault.output_token.symbol),
            style(format!("[{}]", vault.category)).dim()
        );
        println!(
            "   {} -> {}   APY {:.2}%   TVL ${:.0}",
            vault.input_token.symbol,
            vault.output_token.symbol,
            vault.apy * 100.0,
            vault.tvl
        );
        println!("   {}", style(&vault.site_url).underlined());
    }
}

fn print_txs(txs: &[TxInfo]) {
    for (i, tx) in txs.iter().enumerate() {
        println!("{} {}", style(format!("#{}", i + 1)).green().bold(), tx.description);
        println!("   to:    {}", tx.to);
        if !tx.value.is_zero() {
            println!("   value: {}", tx.value);
        }
        if let Some(function) = &tx.function {
            println!("   fn:    {}", function);
        }
        println!("   data:  {}", tx.data);
    }
}

fn withdraw_txs_json(txs: &WithdrawTxs) -> serde_json::Value {
    match txs {
        WithdrawTxs::Txs(txs) => json!({ "txs": txs }),
        WithdrawTxs::Permit(permit) => json!({
            "permit": { "description": permit.description, "typedData": permit.typed_data }
        }),
    }
}

// ============================================
// MAIN
// ============================================

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.log_level))?,
        )
        .init();

    match cli.command {
        Command::Config => {
            if cli.json {
                print_json(&serde_json::to_value(&config)?)?;
            } else {
                config.print_summary();
            }
        }

        Command::Protocols => {
            let app = App::new(&config)?;
            let ids = app.manager.protocol_ids();
            if cli.json {
                print_json(&json!(ids))?;
            } else {
                for id in ids {
                    println!("{}", id);
                }
            }
        }

        Command::Vaults { token } => {
            let app = App::new(&config)?;
            let vaults = app.manager.vaults_metadata(&app.chain, token).await?;
            info!("Found {} vault(s) on {}", vaults.len(), app.chain.name);
            if cli.json {
                print_json(&serde_json::to_value(&vaults)?)?;
            } else {
                print_vaults(&vaults);
            }
        }

        Command::Position(pair) => {
            let app = App::new(&config)?;
            let positions = app
                .manager
                .positions_metadata(
                    &app.chain,
                    &[PositionPair {
                        protocol_id: pair.protocol.clone(),
                        input_token_address: pair.input,
                        output_token_address: pair.output,
                    }],
                )
                .await;
            if positions.is_empty() {
                return Err(eyre!(
                    "No {} position for {} -> {}",
                    pair.protocol,
                    pair.input,
                    pair.output
                ));
            }
            if cli.json {
                print_json(&serde_json::to_value(&positions)?)?;
            } else {
                print_vaults(&positions);
            }
        }

        Command::Deposit(args) => {
            let user = user_for(&config, args.user)?;
            let app = App::new(&config)?;
            let (input, output) = app.pair_tokens(&args.pair).await?;
            let amount = parse_amount(&args.amount, &input)?;

            let txs = app
                .manager
                .deposit(&args.pair.protocol, &app.chain, user, &input, &output, amount)
                .await?;
            if cli.json {
                print_json(&json!({ "txs": txs }))?;
            } else {
                print_txs(&txs);
            }
        }

        Command::Withdraw(args) => {
            let user = user_for(&config, args.user)?;
            let app = App::new(&config)?;
            let (input, output) = app.pair_tokens(&args.pair).await?;
            // amount is denominated in the position (output) token
            let amount = parse_amount(&args.amount, &output)?;

            let withdraw = app
                .manager
                .withdraw(&args.pair.protocol, &app.chain, user, &input, &output, amount)
                .await?;
            if cli.json {
                let mut value = withdraw_txs_json(&withdraw.txs);
                value["amount"] = json!(withdraw.amount);
                print_json(&value)?;
            } else {
                match &withdraw.txs {
                    WithdrawTxs::Txs(txs) => print_txs(txs),
                    WithdrawTxs::Permit(permit) => {
                        println!("{} {}", style("sign").yellow().bold(), permit.description);
                        println!("{}", permit.typed_data);
                    }
                }
                println!(
                    "Receives ~{} {}",
                    input.display_amount(withdraw.amount),
                    input.symbol
                );
            }
        }

        Command::Repay(args) => {
            let user = user_for(&config, args.user)?;
            let app = App::new(&config)?;
            let loan_token = app.tokens.token_info(&app.chain, args.loan_token).await?;
            let assets = match &args.amount {
                Some(amount) => parse_amount(amount, &loan_token)?,
                None => U256::ZERO,
            };
            let shares = args.shares.unwrap_or_default();

            let txs = app
                .morpho
                .repay(&app.chain, user, &loan_token, args.market(), assets, shares)
                .await?;
            if cli.json {
                print_json(&json!({ "txs": txs }))?;
            } else {
                print_txs(&txs);
            }
        }

        Command::QuoteShares { vault, asset_balance, amount } => {
            let min_shares = calculate_min_shares(asset_balance, amount, &vault.totals())?;
            if cli.json {
                print_json(&json!({ "minShares": min_shares }))?;
            } else {
                println!("minShares: {}", min_shares);
            }
        }

        Command::QuoteAssets { vault, share_balance, shares } => {
            let min_assets = calculate_min_assets(share_balance, shares, &vault.totals())?;
            if cli.json {
                print_json(&json!({ "minAssets": min_assets }))?;
            } else {
                println!("minAssets: {}", min_assets);
            }
        }
    }

    Ok(())
}
