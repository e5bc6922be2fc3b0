//! # graphd
//!
//! Distributed graph engine server for GNN training workloads.
//!
//! ## Usage
//!
//! ```bash
//! # Serve partitions 0 and 1 of a converted dataset
//! graphd serve /data/papers100m --partitions 0,1
//!
//! # Streaming storage on a custom port
//! graphd serve /data/papers100m --storage streaming --port 9090
//! ```

mod config;
mod service;

use colored::Colorize;
use config::ServerConfig;
use graphd_storage::{logging, EngineOptions, GraphEngine, SamplerRegistry};
use service::proto::graph_engine_server::GraphEngineServer;
use service::proto::graph_sampler_server::GraphSamplerServer;
use service::{GraphEngineService, GraphSamplerService};
use std::path::PathBuf;
use std::sync::Arc;
use tonic::transport::Server;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => run_serve(&args),
        Some("--help") | Some("-h") | None => print_help(),
        Some(other) => {
            eprintln!("{}: unknown command {other:?}\n", "Error".red());
            print_help();
            std::process::exit(2);
        }
    }
}

fn print_help() {
    println!("{}", "graphd".bold().cyan());
    println!("Distributed graph engine server\n");
    println!("USAGE:");
    println!("    graphd serve <DATA_DIR> [OPTIONS]\n");
    println!("OPTIONS:");
    println!("    --port <PORT>           Listen port (default: 50051)");
    println!("    --partitions <LIST>     Partition numbers to host, e.g. 0,1,2 (default: 0)");
    println!("    --storage <MODE>        mmap | streaming (default: mmap)");
    println!("    --no-threadpool         Disable the request fan-out pool");
    println!("    --config <FILE>         TOML configuration file");
    println!("    --help, -h              Show this help message\n");
    println!("Environment: GRAPHD_LOG controls logging; GRAPHD__* variables");
    println!("override configuration file values.");
}

fn run_serve(args: &[String]) {
    if std::env::var("GRAPHD_LOG_JSON").is_ok() {
        logging::init_json();
    } else {
        logging::init();
    }

    let config = match parse_serve_args(args) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{}: {message}\n", "Error".red());
            print_help();
            std::process::exit(2);
        }
    };

    println!("{}", "graphd".bold().cyan());
    println!("    data:       {}", config.data_dir.display());
    println!("    partitions: {:?}", config.partitions);
    println!("    storage:    {:?}", config.storage);
    println!("    threadpool: {}", config.enable_threadpool);
    println!();

    let engine = match GraphEngine::open(EngineOptions {
        data_dir: config.data_dir.clone(),
        partitions: config.partitions.clone(),
        storage: config.storage,
        enable_threadpool: config.enable_threadpool,
    }) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            eprintln!("{}: {e}", "Startup failed".red());
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: {e}", "Error".red());
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(serve(engine, config.port)) {
        eprintln!("{}: {e}", "Error".red());
        std::process::exit(1);
    }
}

/// Resolves `serve` flags on top of file and environment configuration.
fn parse_serve_args(args: &[String]) -> Result<ServerConfig, String> {
    let mut data_dir: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut port: Option<String> = None;
    let mut partitions: Option<String> = None;
    let mut storage: Option<String> = None;
    let mut no_threadpool = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => config_path = Some(PathBuf::from(take_value(args, &mut i)?)),
            "--port" => port = Some(take_value(args, &mut i)?),
            "--partitions" => partitions = Some(take_value(args, &mut i)?),
            "--storage" => storage = Some(take_value(args, &mut i)?),
            "--no-threadpool" => no_threadpool = true,
            flag if flag.starts_with("--") => return Err(format!("unknown flag {flag:?}")),
            positional => {
                if data_dir.replace(PathBuf::from(positional)).is_some() {
                    return Err(format!("unexpected argument {positional:?}"));
                }
            }
        }
        i += 1;
    }

    let mut config = ServerConfig::load(config_path.as_deref()).map_err(|e| e.to_string())?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    if let Some(value) = port {
        config.port = value
            .parse()
            .map_err(|_| format!("invalid port {value:?}"))?;
    }
    if let Some(value) = partitions {
        config.partitions = config::parse_partitions(&value).map_err(|e| e.to_string())?;
    }
    if let Some(value) = storage {
        config.storage = config::parse_storage_mode(&value).map_err(|e| e.to_string())?;
    }
    if no_threadpool {
        config.enable_threadpool = false;
    }
    Ok(config)
}

fn take_value(args: &[String], i: &mut usize) -> Result<String, String> {
    let flag = args[*i].clone();
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| format!("{flag} requires a value"))
}

async fn serve(engine: Arc<GraphEngine>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(SamplerRegistry::new());
    let engine_service = GraphEngineService::new(Arc::clone(&engine));
    let sampler_service = GraphSamplerService::new(engine, registry);

    let addr = format!("0.0.0.0:{port}").parse()?;
    println!("{} listening on {addr}", "graphd".bold().green());
    println!("    Press Ctrl+C to stop\n");

    Server::builder()
        .add_service(GraphEngineServer::new(engine_service))
        .add_service(GraphSamplerServer::new(sampler_service))
        .serve_with_shutdown(addr, async {
            tokio::signal::ctrl_c().await.ok();
            println!("\nShutdown signal received, draining requests...");
        })
        .await?;

    println!("Server stopped");
    Ok(())
}
