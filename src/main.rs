use clap::Parser;

use findsuite::cli::{run_cli, CliArgs};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 日志写 stderr，stdout 只输出 JSON
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("findsuite {} 启动", env!("CARGO_PKG_VERSION"));
    run_cli(args).await
}
