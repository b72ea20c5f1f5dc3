//! E2E test harness entry point
//!
//! This file is the test binary that runs PiHR scenarios from YAML files.
//! Run with: cargo test --package pihr-e2e --test e2e -- --tag smoke

use anyhow::Context;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use pihr_e2e::{
    PlaywrightConfig, PlaywrightPage, RunnerArgs, ScenarioRunner, SuiteResult, TestContext,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = RunnerArgs::parse();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let result = rt.block_on(async_main(args));

    match result {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: RunnerArgs) -> anyhow::Result<bool> {
    let config = args
        .load_config()
        .with_context(|| format!("loading suite config {}", args.config.display()))?;
    let scenarios = args
        .select_scenarios()
        .with_context(|| format!("loading scenarios from {}", args.scenarios.display()))?;

    let page = PlaywrightPage::launch(PlaywrightConfig::from(&config))
        .await
        .context("launching browser")?;
    let runner = ScenarioRunner::new(TestContext::new(config, page));

    if args.preflight {
        runner.preflight().await.context("base URL preflight")?;
    }

    let results: SuiteResult = runner.run_all(&scenarios).await;
    runner.write_results(&results)?;

    if let Err(e) = runner.context().page().close().await {
        warn!("Browser did not close cleanly: {}", e);
    }

    Ok(results.failed == 0)
}
