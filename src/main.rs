use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use futures::future::{AbortHandle, AbortRegistration};
use tracing::warn;

use abilens::config::{self, Config, NetworkConfig};
use abilens::domain::abi::AbiParser;
use abilens::export::{self, OutputFormat};
use abilens::infrastructure::{ContractResolver, RpcClient, SourcifyClient};
use abilens::store::{AbiCache, AbiStore};
use abilens::{decode_manual, telemetry, App, ContractSummary, DecodeReport, DecodeRequest};

#[derive(Debug, Parser)]
#[command(
    name = "abilens",
    version,
    about = "abilens: decode Ethereum call data against verified contract ABIs"
)]
struct Args {
    /// Config file (default: $ABILENS_CONFIG or ~/.config/abilens/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Network name or chain id
    #[arg(long, short, global = true, default_value = "mainnet")]
    network: String,

    /// HTTP JSON-RPC endpoint for the selected network (e.g. http://localhost:8545)
    #[arg(long, global = true)]
    rpc: Option<String>,

    /// Output format
    #[arg(long, short, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Also write the result to a timestamped file in the export directory
    #[arg(long, global = true)]
    export: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode call data against an ABI given inline or as a file
    Decode {
        /// ABI JSON, or a path to an ABI / build artifact file
        #[arg(long)]
        abi: String,
        /// 0x-prefixed call data
        calldata: String,
    },
    /// Decode call data sent to a contract, resolving its verified ABI
    Contract {
        address: String,
        calldata: String,
        /// Drop any cached entry for the contract before resolving
        #[arg(long)]
        refresh: bool,
    },
    /// Fetch a transaction and decode its input
    Tx { hash: String },
    /// Resolve a contract's metadata (verification, proxy, implementation)
    Resolve {
        address: String,
        /// Drop any cached entry for the contract before resolving
        #[arg(long)]
        refresh: bool,
    },
    /// List function selectors of an ABI
    Selectors {
        /// ABI JSON, or a path to an ABI / build artifact file
        #[arg(long)]
        abi: String,
    },
    /// Drop expired entries from the persistent cache
    PurgeCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => config::load_from(path)?,
        None => config::load(),
    };
    telemetry::init(&config.log);

    match &args.command {
        Command::Decode { abi, calldata } => {
            // Offline: no resolver, RPC or cache is built
            let report = decode_manual(&read_abi(abi)?, calldata)?;
            output_report(&report, &args)
        }
        Command::Contract {
            address,
            calldata,
            refresh,
        } => {
            let network = selected_network(&args, &config)?;
            let request = DecodeRequest::Contract {
                address: address.clone(),
                network: network.chain_id,
                calldata: calldata.clone(),
            };
            let app = build_app(&config, &network, args.rpc.as_deref())?;
            if *refresh {
                app.resolver().invalidate(address, network.chain_id)?;
            }
            run_decode(&app, request, &args).await
        }
        Command::Tx { hash } => {
            let network = selected_network(&args, &config)?;
            let request = DecodeRequest::Transaction {
                tx_hash: hash.clone(),
                network: network.chain_id,
            };
            let app = build_app(&config, &network, args.rpc.as_deref())?;
            run_decode(&app, request, &args).await
        }
        Command::Resolve { address, refresh } => {
            let network = selected_network(&args, &config)?;
            let app = build_app(&config, &network, args.rpc.as_deref())?;
            if *refresh {
                app.resolver().invalidate(address, network.chain_id)?;
            }
            let registration = abort_on_ctrl_c();
            let resolution = app
                .resolver()
                .resolve_abortable(address, network.chain_id, registration)
                .await?;
            print_resolution(
                &ContractSummary::from(resolution.info.as_ref()),
                resolution.cache_used,
                args.format,
            )
        }
        Command::Selectors { abi } => {
            let abi = AbiParser::parse(&read_abi(abi)?)?;
            export::write_selectors(io::stdout().lock(), &abi, args.format)?;
            Ok(())
        }
        Command::PurgeCache => {
            let path = config
                .cache
                .db_path()
                .ok_or_else(|| anyhow!("no data directory for the cache database"))?;
            let cache = AbiCache::new(config.cache.ttl()).with_store(AbiStore::open(&path)?);
            let removed = cache.purge_expired();
            println!("removed {} expired entries from {}", removed, path.display());
            if let Some(remaining) = cache.persisted_len() {
                println!("{} entries remain", remaining);
            }
            Ok(())
        }
    }
}

async fn run_decode(app: &App, request: DecodeRequest, args: &Args) -> Result<()> {
    let registration = abort_on_ctrl_c();
    let report = app.decode_abortable(request, registration).await?;
    output_report(&report, args)
}

fn output_report(report: &DecodeReport, args: &Args) -> Result<()> {
    export::render(io::stdout().lock(), report, args.format)?;
    if args.export {
        let path = export::export_to_file(report, args.format)?;
        eprintln!("exported to {}", path.display());
    }
    Ok(())
}

fn print_resolution(
    summary: &ContractSummary,
    cache_used: bool,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(summary)?;
            value["cache_used"] = serde_json::Value::Bool(cache_used);
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(io::stdout().lock());
            wtr.write_record([
                "address",
                "network",
                "name",
                "verified",
                "proxy",
                "proxy_kind",
                "implementation",
                "cache_used",
            ])?;
            wtr.write_record([
                summary.address.clone(),
                summary.network.to_string(),
                summary.name.clone().unwrap_or_default(),
                summary.is_verified.to_string(),
                summary.is_proxy.to_string(),
                summary.proxy_kind.map(|kind| kind.to_string()).unwrap_or_default(),
                summary.implementation.clone().unwrap_or_default(),
                cache_used.to_string(),
            ])?;
            wtr.flush()?;
        }
        OutputFormat::Table => {
            println!("address         {}", summary.address);
            println!("network         {}", summary.network);
            println!("name            {}", summary.name.as_deref().unwrap_or("-"));
            println!("verified        {}", summary.is_verified);
            println!("proxy           {}", summary.is_proxy);
            if let Some(kind) = summary.proxy_kind {
                println!("proxy kind      {}", kind);
            }
            if let Some(implementation) = &summary.implementation {
                println!("implementation  {}", implementation);
            }
            println!("cached          {}", cache_used);
        }
    }
    Ok(())
}

/// Abort the returned registration on Ctrl-C
fn abort_on_ctrl_c() -> AbortRegistration {
    let (handle, registration) = AbortHandle::new_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.abort();
        }
    });
    registration
}

fn selected_network(args: &Args, config: &Config) -> Result<NetworkConfig> {
    let mut network = config
        .network(&args.network)
        .ok_or_else(|| anyhow!("unknown network '{}'", args.network))?;
    if let Some(rpc) = args.rpc.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        network.rpc = Some(normalize_http_endpoint(rpc));
    }
    Ok(network)
}

fn build_app(config: &Config, network: &NetworkConfig, rpc_override: Option<&str>) -> Result<App> {
    let mut cache = AbiCache::new(config.cache.ttl());
    if config.cache.persist {
        match config.cache.db_path().map(|path| AbiStore::open(&path)) {
            Some(Ok(store)) => cache = cache.with_store(store),
            Some(Err(err)) => warn!(error = %err, "persistent cache disabled"),
            None => warn!("persistent cache disabled: no data directory"),
        }
    }

    let sourcify = SourcifyClient::new(&config.sourcify.url, config.sourcify.timeout())?;

    let mut rpc = RpcClient::new();
    for entry in config.all_networks() {
        if let Some(url) = entry.rpc.as_deref() {
            if let Err(err) = rpc.add_endpoint(entry.chain_id, url) {
                warn!(network = %entry.name, error = %err, "skipping RPC endpoint");
            }
        }
    }
    // The selected network's endpoint (possibly from --rpc) wins
    if let Some(url) = network.rpc.as_deref() {
        rpc.add_endpoint(network.chain_id, url)
            .with_context(|| match rpc_override {
                Some(_) => "invalid --rpc endpoint".to_string(),
                None => format!("invalid RPC endpoint for {}", network.name),
            })?;
    }
    let rpc = Arc::new(rpc);

    let resolver = ContractResolver::new(Arc::new(sourcify), Arc::new(cache))
        .with_chain_reader(rpc.clone())
        .with_max_proxy_depth(config.resolver.max_proxy_depth);
    Ok(App::new(resolver).with_transactions(rpc))
}

/// Inline JSON, or a file containing an ABI array or a build artifact
fn read_abi(value: &str) -> Result<String> {
    let trimmed = value.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return Ok(value.to_string());
    }
    let path = expand_path(value);
    fs::read_to_string(&path).with_context(|| format!("read ABI file {}", path.display()))
}

fn expand_path(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return Path::new(&home).join(rest);
        }
    }
    PathBuf::from(raw)
}

fn normalize_http_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
