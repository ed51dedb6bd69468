//! `evmauth-gateway` command line

use anyhow::{anyhow, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use evmauth_core::{parse_address, AgentId, BackendMode, PaymentId};
use evmauth_gateway::config::parse_mode;
use evmauth_gateway::views::{AgentView, PaymentView};
use evmauth_gateway::{backend, http, telemetry, AgentService, GatewayConfig, LogFormat};
use evmauth_sim::SimulationAdapter;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

fn cli() -> Command {
    Command::new("evmauth-gateway")
        .version(evmauth_gateway::VERSION)
        .about("EVMAuth agent registry and payment gateway")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .env("EVMAUTH_CONFIG")
                .value_parser(value_parser!(PathBuf))
                .help("Path to a TOML configuration file"),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .global(true)
                .env("EVMAUTH_MODE")
                .value_parser(["live", "simulation"])
                .help("Ledger backend"),
        )
        .arg(
            Arg::new("rpc-url")
                .long("rpc-url")
                .global(true)
                .env("EVMAUTH_RPC_URL")
                .help("JSON-RPC endpoint, overrides the network default"),
        )
        .arg(
            Arg::new("contract")
                .long("contract")
                .global(true)
                .env("EVMAUTH_CONTRACT")
                .help("Agent contract address"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .value_parser(["text", "json"])
                .help("Log output format"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("serve").about("Serve the HTTP API").arg(
                Arg::new("bind")
                    .long("bind")
                    .env("EVMAUTH_BIND")
                    .value_parser(value_parser!(SocketAddr))
                    .help("Listen address"),
            ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run a headless simulation session and print its dashboard")
                .arg(
                    Arg::new("seconds")
                        .long("seconds")
                        .default_value("60")
                        .value_parser(value_parser!(u64))
                        .help("Session length"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("failure-rate")
                        .long("failure-rate")
                        .value_parser(value_parser!(f64))
                        .help("Probability that a payment confirmation fails"),
                ),
        )
        .subcommand(
            Command::new("agent").about("Fetch one agent as JSON").arg(
                Arg::new("id")
                    .long("id")
                    .required(true)
                    .value_parser(value_parser!(u64)),
            ),
        )
        .subcommand(
            Command::new("payment").about("Fetch one payment as JSON").arg(
                Arg::new("id")
                    .long("id")
                    .required(true)
                    .value_parser(value_parser!(u64)),
            ),
        )
}

fn load_config(matches: &ArgMatches) -> Result<GatewayConfig> {
    let path = matches.get_one::<PathBuf>("config");
    let mut config = GatewayConfig::load(path.map(PathBuf::as_path))?;
    if let Some(mode) = matches.get_one::<String>("mode") {
        config.mode = parse_mode(mode)?;
    }
    if let Some(url) = matches.get_one::<String>("rpc-url") {
        config.chain.rpc_url = Some(url.clone());
    }
    if let Some(contract) = matches.get_one::<String>("contract") {
        config.chain.contract_address = parse_address(contract)?;
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.log_format = format.parse::<LogFormat>()?;
    }
    config.validate()?;
    Ok(config)
}

fn required_id(args: &ArgMatches) -> Result<u64> {
    args.get_one::<u64>("id")
        .copied()
        .ok_or_else(|| anyhow!("--id is required"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve(config: GatewayConfig, bind: Option<SocketAddr>) -> Result<()> {
    let service = backend::connect(&config)?.into_service(&config);
    let addr = bind.unwrap_or(config.bind);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, backend = %config, "gateway listening");
    axum::serve(listener, http::router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    info!("gateway stopped");
    Ok(())
}

async fn simulate(config: GatewayConfig, args: &ArgMatches) -> Result<()> {
    let seconds = args.get_one::<u64>("seconds").copied().unwrap_or(60);
    let mut sim_config = config.simulation.clone().with_demo_data(true);
    if let Some(seed) = args.get_one::<u64>("seed") {
        sim_config = sim_config.with_seed(*seed);
    }
    if let Some(rate) = args.get_one::<f64>("failure-rate") {
        sim_config = sim_config.with_failure_rate(*rate);
    }
    let owner = sim_config.owner;

    let sim = Arc::new(SimulationAdapter::start(sim_config)?);
    let mut events = sim.subscribe();
    let service = AgentService::new(sim.clone(), config.cache, config.budget_policy)
        .with_event_feed(sim.subscribe());

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => break,
            event = events.recv() => match event {
                Ok(event) => info!(?event, "ledger event"),
                Err(RecvError::Lagged(skipped)) => info!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let dashboard = service.dashboard(owner).await?;
    sim.shutdown();
    print_json(&dashboard.stats)
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    let directive = if matches.get_flag("verbose") { "debug" } else { "info" };
    telemetry::init(config.log_format, directive)?;

    match matches.subcommand() {
        Some(("serve", args)) => serve(config, args.get_one::<SocketAddr>("bind").copied()).await,
        Some(("simulate", args)) => {
            let config = GatewayConfig {
                mode: BackendMode::Simulation,
                ..config
            };
            simulate(config, args).await
        }
        Some(("agent", args)) => {
            let service = backend::connect(&config)?.into_service(&config);
            let agent = service.agent(AgentId(required_id(args)?)).await?;
            print_json(&AgentView::from(agent))
        }
        Some(("payment", args)) => {
            let service = backend::connect(&config)?.into_service(&config);
            let payment = service.payment(PaymentId(required_id(args)?)).await?;
            print_json(&PaymentView::from(payment))
        }
        _ => Err(anyhow!("unknown command")),
    }
}
