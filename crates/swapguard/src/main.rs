#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use alloy::primitives::{Address, B256, U256};
use clap::{Parser, Subcommand};
use eyre::Context as _;
use serde::Serialize;
use serde_json::json;
use std::{io::Write as _, path::PathBuf, process::ExitCode};
use swapguard::{
    app::App,
    config::AppConfig,
    errors::{ErrorReport, SwapError},
    financial_math,
    index_api::{self, IndexClient, Portfolio, PortfolioStats, DEFAULT_LIMIT, DEFAULT_PAGE},
    paths::SwapguardPaths,
    quote::{minimum_out, slippage_percent_to_bps},
};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "swapguard", version)]
struct Cli {
    /// Config file (defaults to `config.toml` in the config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print resolved paths.
    Paths,

    /// Write a default config file if none exists.
    Init,

    /// List the token registry.
    Tokens,

    /// Print the configured network and whether the RPC endpoint agrees on the chain id.
    Network {
        /// Only print the config; skip the RPC check.
        #[arg(long, default_value_t = false)]
        offline: bool,
    },

    /// Router output estimate for a direct swap.
    Quote {
        from: String,
        to: String,
        amount: String,
    },

    /// Slippage floor for a quoted output in base units. Offline.
    MinOut {
        /// Quoted output in base units.
        quoted: String,
        /// Slippage tolerance in percent.
        #[arg(long, default_value = "0.5")]
        slippage: String,
    },

    /// Current ERC20 allowance toward the router (or `--spender`).
    Allowance {
        token: String,
        /// Defaults to the loaded signer.
        #[arg(long)]
        owner: Option<Address>,
        #[arg(long)]
        spender: Option<Address>,
    },

    /// Approve exactly `amount` of `token` for the router (or `--spender`).
    Approve {
        token: String,
        amount: String,
        #[arg(long)]
        spender: Option<Address>,
    },

    /// Quote, approve if needed, and execute a swap with the loaded signer.
    Swap {
        from: String,
        to: String,
        amount: String,
        /// Slippage tolerance in percent (defaults to `swap.default_slippage_percent`).
        #[arg(long)]
        slippage: Option<String>,
    },

    /// Balances of every registered token.
    Balances {
        /// Defaults to the loaded signer.
        #[arg(long)]
        owner: Option<Address>,
    },

    /// USD price from a router quote against USDC.
    Price {
        token: String,
        /// Also value this many tokens.
        #[arg(long)]
        amount: Option<String>,
    },

    /// Factory pair for two tokens.
    Pool { a: String, b: String },

    /// Pending / success / failed for a transaction hash.
    TxStatus { hash: B256 },

    /// Indexed tokens, NFTs, and recent activity for an address.
    Portfolio {
        address: Address,
        /// Serve fixture data instead of calling the index API.
        #[arg(long, default_value_t = false)]
        demo: bool,
    },

    /// Indexed market data for a token contract.
    Market {
        token: Address,
        #[arg(long, default_value_t = false)]
        demo: bool,
    },

    /// Indexed transaction history for an address, grouped by type.
    History {
        address: Address,
        #[arg(long, default_value_t = DEFAULT_PAGE)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,
        #[arg(long, default_value_t = false)]
        demo: bool,
    },
}

fn init_logging(paths: &SwapguardPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("swapguard.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn emit(v: &impl Serialize) -> eyre::Result<()> {
    let s = serde_json::to_string_pretty(v).context("serialize output")?;
    writeln!(std::io::stdout().lock(), "{s}").context("write output")
}

/// Swap-core failures become a JSON error report on stdout and a failing exit code.
/// Anything else (bad config, unreachable files, output that cannot be rendered) propagates
/// as a regular error.
fn report<T: Serialize>(res: Result<T, SwapError>) -> eyre::Result<ExitCode> {
    match res {
        Ok(v) => {
            emit(&v)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            emit(&json!({ "ok": false, "error": ErrorReport::from(e) }))?;
            Ok(ExitCode::FAILURE)
        }
    }
}

#[derive(Serialize)]
struct PortfolioOutput {
    portfolio: Portfolio,
    stats: PortfolioStats,
}

fn load_config(cli_path: Option<PathBuf>, paths: &SwapguardPaths) -> eyre::Result<AppConfig> {
    let path = cli_path.unwrap_or_else(|| paths.config_file.clone());
    AppConfig::load(&path)
}

fn owner_or_signer(app: &App, owner: Option<Address>) -> eyre::Result<Address> {
    owner.map_or_else(|| app.signer(), Ok)
}

fn with_demo(mut cfg: AppConfig, demo: bool) -> AppConfig {
    cfg.index_api.demo |= demo;
    cfg
}

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = SwapguardPaths::discover()?;
    std::fs::create_dir_all(&paths.data_dir).context("create data dir")?;
    let _log_guard = init_logging(&paths);

    match cli.cmd {
        Command::Paths => {
            emit(&paths)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Init => {
            paths.ensure_private_dirs()?;
            let s = toml::to_string_pretty(&AppConfig::default()).context("render config")?;
            let written = paths.write_config_if_missing(&s)?;
            emit(&json!({ "config_file": paths.config_file, "written": written }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::MinOut { quoted, slippage } => report(min_out(&quoted, &slippage)),
        cmd => {
            let cfg = load_config(cli.config, &paths)?;
            run(cmd, cfg).await
        }
    }
}

fn min_out(quoted: &str, slippage: &str) -> Result<serde_json::Value, SwapError> {
    let q = U256::from_str_radix(quoted.trim(), 10)
        .map_err(|e| SwapError::InvalidAmount(format!("quoted {quoted:?}: {e}")))?;
    let bps = slippage_percent_to_bps(slippage)?;
    Ok(json!({
        "quoted": q.to_string(),
        "slippage_bps": bps,
        "minimum_out": minimum_out(q, bps).to_string(),
    }))
}

async fn run(cmd: Command, cfg: AppConfig) -> eyre::Result<ExitCode> {
    match cmd {
        Command::Tokens => {
            emit(&cfg.tokens)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Network { offline: true } => {
            emit(&json!({ "network": cfg.network, "chain_id_hex": cfg.network.chain_id_hex() }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Portfolio { address, demo } => {
            let index = IndexClient::from_config(&with_demo(cfg, demo).index_api)?;
            let res = index.portfolio(&address.to_string()).await;
            report(res.map(|portfolio| PortfolioOutput {
                stats: index_api::portfolio_stats(&portfolio.tokens),
                portfolio,
            }))
        }
        Command::Market { token, demo } => {
            let index = IndexClient::from_config(&with_demo(cfg, demo).index_api)?;
            let res = index.token_market_data(&token.to_string()).await;
            report(res)
        }
        Command::History {
            address,
            page,
            limit,
            demo,
        } => {
            let index = IndexClient::from_config(&with_demo(cfg, demo).index_api)?;
            let res = index
                .account_transactions(&address.to_string(), page, limit)
                .await;
            report(res.map(|v| {
                let txs = v
                    .get("data")
                    .and_then(serde_json::Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                index_api::group_transactions_by_type(&txs)
            }))
        }
        cmd => {
            let app = App::new(cfg, App::key_from_env().as_ref())?;
            run_chain(cmd, &app).await
        }
    }
}

async fn run_chain(cmd: Command, app: &App) -> eyre::Result<ExitCode> {
    match cmd {
        Command::Network { .. } => {
            let network = &app.config().network;
            let res = app
                .gateway()
                .reader()
                .chain_id()
                .await
                .map_err(|e| SwapError::RpcError(e.to_string()));
            report(res.map(|rpc_chain_id| {
                json!({
                    "network": network,
                    "chain_id_hex": network.chain_id_hex(),
                    "rpc_chain_id": rpc_chain_id,
                    "matches": rpc_chain_id == network.chain_id,
                })
            }))
        }
        Command::Quote { from, to, amount } => {
            let res = app.quote_engine()?.estimate(&from, &to, &amount).await;
            report(res)
        }
        Command::Allowance {
            token,
            owner,
            spender,
        } => {
            let owner = owner_or_signer(app, owner)?;
            let spender = spender.map_or_else(|| app.config().router(), Ok)?;
            let res = match app.registry().resolve(&token) {
                Ok(t) => app.allowances().allowance_of(t, owner, spender).await,
                Err(e) => Err(e),
            };
            report(res.map(|a| json!({ "token": token, "owner": owner, "spender": spender, "allowance": a })))
        }
        Command::Approve {
            token,
            amount,
            spender,
        } => {
            let spender = spender.map_or_else(|| app.config().router(), Ok)?;
            let res = match app.registry().resolve(&token) {
                Ok(t) => app.allowances().approve(t, spender, &amount).await,
                Err(e) => Err(e),
            };
            report(res.map(|r| {
                json!({
                    "token": token,
                    "spender": spender,
                    "amount": amount,
                    "tx_hash": r.map(|receipt| receipt.tx_hash),
                })
            }))
        }
        Command::Swap {
            from,
            to,
            amount,
            slippage,
        } => {
            let owner = app.signer()?;
            let slippage =
                slippage.unwrap_or_else(|| app.config().swap.default_slippage_percent.clone());
            let res = app
                .orchestrator()?
                .execute(&from, &to, &amount, &slippage, owner)
                .await;
            report(res)
        }
        Command::Balances { owner } => {
            let owner = owner_or_signer(app, owner)?;
            let balances = app.market().token_balances(owner).await;
            emit(&json!({ "owner": owner, "balances": balances }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Price { token, amount } => {
            let price = app.market().token_price_usd(&token).await;
            let value = amount
                .as_deref()
                .map(|a| financial_math::usd_value(a, price));
            emit(&json!({ "token": token, "usd": price, "usd_value": value }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Pool { a, b } => {
            let pool = app.market().pool_info(&a, &b).await;
            emit(&json!({ "a": a, "b": b, "pool": pool }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::TxStatus { hash } => {
            let res = app
                .gateway()
                .tx_status(hash)
                .await
                .map_err(|e| SwapError::RpcError(e.to_string()));
            report(res.map(|s| json!({ "tx_hash": hash, "status": s })))
        }
        Command::Paths
        | Command::Init
        | Command::Tokens
        | Command::MinOut { .. }
        | Command::Portfolio { .. }
        | Command::Market { .. }
        | Command::History { .. } => {
            eyre::bail!("command does not need chain access")
        }
    }
}
