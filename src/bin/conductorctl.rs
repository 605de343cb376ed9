// src/bin/conductorctl.rs

//! The configure-once entry point: load a declarative fleet description,
//! validate and expand it, and replace the datastore contents.

use anyhow::Result;
use conductor::config::ClusterConfig;
use conductor::core::controller;
use std::env;
use std::path::Path;
use std::process;
use tracing::error;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn usage() -> ! {
    eprintln!(
        "Usage: conductorctl --cluster FILE --ldms_config FILE --prefix STRING [--version 4|5]"
    );
    process::exit(1);
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.contains(&"--help".to_string()) {
        println!("conductorctl {VERSION}");
        usage();
    }

    let Some(cluster_path) = flag_value(&args, "--cluster") else {
        eprintln!("--cluster is required");
        usage();
    };
    let Some(description_path) = flag_value(&args, "--ldms_config") else {
        eprintln!("--ldms_config is required");
        usage();
    };
    let Some(prefix) = flag_value(&args, "--prefix") else {
        eprintln!("--prefix is required");
        usage();
    };

    // The output dialect is reserved; only 4 and 5 are accepted.
    let dialect = flag_value(&args, "--version").unwrap_or("4");
    if dialect != "4" && dialect != "5" {
        eprintln!("--version must be 4 or 5");
        usage();
    }

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .compact()
        .with_ansi(true)
        .init();

    let cluster = match ClusterConfig::from_file(cluster_path).await {
        Ok(cluster) => cluster,
        Err(e) => {
            eprintln!("Failed to load cluster configuration from \"{cluster_path}\": {e}");
            process::exit(1);
        }
    };

    if let Err(e) = controller::configure(&cluster, prefix, Path::new(description_path)).await {
        error!("configuration failed: {e:#}");
        process::exit(1);
    }
    Ok(())
}
