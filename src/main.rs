//! deltasync binary entry point.

use anyhow::Context;
use clap::Parser;
use tracing::info;

use deltasync::cli::{Cli, Command, PushArgs};
use deltasync::metrics::init_metrics;
use deltasync::{init_logging, local_push_async};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_format.into()) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }
    init_metrics();

    info!(version = env!("CARGO_PKG_VERSION"), "deltasync starting");

    let result = match cli.command {
        Command::Push(args) => run_push(args).await,
    };

    if let Err(e) = result {
        eprintln!("deltasync: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_push(args: PushArgs) -> anyhow::Result<()> {
    let options = args.push_options().context("invalid configuration")?;

    let ctx = local_push_async(args.new.clone(), args.old.clone(), options)
        .await
        .with_context(|| {
            format!(
                "push {} -> {} failed",
                args.new.display(),
                args.old.display()
            )
        })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ctx)?);
    } else if ctx.force_created {
        let target = args.result.as_ref().unwrap_or(&args.old);
        println!("created {} ({} bytes)", target.display(), ctx.bytes_written);
    } else {
        println!("{}", ctx);
    }

    Ok(())
}
