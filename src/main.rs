use clap::Parser;
use gateway::services::settings::GatewaySettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Multi-tenant API gateway execution pipeline, served over MCP stdio.
#[derive(Debug, Parser)]
#[command(name = "gateway", version, about)]
struct Cli {
    /// JSON file backing actions, mappings and mapping configs. In-memory when omitted.
    #[arg(long, env = "GATEWAY_STORE_PATH")]
    store_path: Option<PathBuf>,

    /// error | warn | info | debug
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    std::env::set_var("LOG_LEVEL", &cli.log_level);

    let filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("gateway: failed to start runtime: {}", err);
            std::process::exit(1);
        }
    };

    let settings = GatewaySettings::from_env().with_store_path(cli.store_path);
    if let Err(err) = runtime.block_on(gateway::mcp::server::run_stdio(settings)) {
        eprintln!("gateway: {}", err);
        std::process::exit(1);
    }
}
