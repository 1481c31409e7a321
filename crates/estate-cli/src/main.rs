use anyhow::Context;
use clap::Parser;
use estate_cli::{exit_code, init_tracing, load_config, run, Cli};
use estate_storage::create_storage;
use estate_sync::{MaintenanceSweeper, SweepSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config()?;

    let storage = create_storage(&config)
        .await
        .context("Failed to initialize object storage")?;

    let mut settings = SweepSettings::from_config(&config);
    if let Some(concurrency) = cli.concurrency {
        settings.concurrency = concurrency;
    }
    let sweeper = MaintenanceSweeper::new(storage, settings);

    let report = run(&cli.command, &sweeper).await?;

    let out = serde_json::to_string_pretty(&report).context("Serialize sweep report")?;
    println!("{}", out);

    let code = exit_code(&report);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
