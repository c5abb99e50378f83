use std::{env, io, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use tally_server::config::{self, CliOptions};

#[derive(Parser, Debug)]
#[command(name = "tallyd", version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Flat-file JSONL collection backend for trial results and feedback")]
struct Args {
    /// Explicit path to the tally configuration (tally.toml)
    #[arg(long = "config", value_name = "FILE")]
    config_path: Option<PathBuf>,

    /// Directory holding results.jsonl and feedback.jsonl
    #[arg(long = "data-dir", value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Host binding
    #[arg(long = "host", value_name = "HOST")]
    host: Option<String>,

    /// Port binding
    #[arg(long = "port", value_name = "PORT")]
    port: Option<u16>,

    /// Additional CORS allowed origins
    #[arg(long = "cors-origin", value_name = "ORIGIN")]
    cors_origins: Vec<String>,

    /// Optional log filter (e.g. info, debug)
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args);

    let config_path = args.config_path.clone().or_else(|| {
        let candidate = PathBuf::from("tally.toml");
        candidate.exists().then_some(candidate)
    });

    let file_cfg = config::load_file_config(config_path.as_deref())?;

    let cli = CliOptions {
        host: args.host.clone(),
        port: args.port,
        data_dir: args.data_dir.clone(),
        cors_origins: args.cors_origins.clone(),
    };

    let runtime = config::resolve(&cli, file_cfg.as_ref());

    tally_server::serve(runtime).await
}

fn init_tracing(args: &Args) {
    if let Some(level) = &args.log_level {
        env::set_var("RUST_LOG", level);
    }

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr);

    let _ = builder.try_init();
}
