use anyhow::{Context, Result, anyhow, bail};
use std::env;
use tokio::runtime::Runtime;
use verse_store::{AppConfig, AppStores, FeedScope, ScopeState, SessionSnapshot, init_logging_with};

#[derive(Debug, Clone)]
struct CliOptions {
    scope: FeedScope,
    pretty: bool,
    refresh: bool,
}

#[derive(Debug, serde::Serialize)]
struct ProbeReport {
    scope: String,
    session: SessionSnapshot,
    feed: ScopeState,
}

fn usage() -> &'static str {
    "Usage: feed_probe [--scope <all|trending|user:<id>|bookmarks:<id>>] [--refresh] [--pretty]"
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_args(args)?;

    let config = AppConfig::from_env();
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {e}"))?;
    init_logging_with(&config.logging.filter);

    let rt = Runtime::new().context("Failed to create Tokio runtime")?;
    let report = rt.block_on(probe(&config, &options))?;

    let payload = if options.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("Failed to serialize probe report")?;
    println!("{payload}");
    Ok(())
}

async fn probe(config: &AppConfig, options: &CliOptions) -> Result<ProbeReport> {
    let stores = AppStores::from_config(config)
        .await
        .map_err(|e| anyhow!("Failed to build stores: {e}"))?;

    let session = stores.session.fetch_profile().await;
    let result = if options.refresh {
        stores.content.refresh_posts(options.scope.clone()).await
    } else {
        stores.content.fetch_posts(options.scope.clone()).await
    };
    if let Err(e) = &result {
        // 失敗もレポートに残すので終了はしない
        let hint = if e.is_retryable() {
            " (retryable)"
        } else {
            ""
        };
        eprintln!("Fetching {} failed: {e}{hint}", options.scope);
    }

    Ok(ProbeReport {
        scope: options.scope.to_string(),
        session,
        feed: stores.content.scope(&options.scope),
    })
}

fn parse_args<I>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut scope = FeedScope::All;
    let mut pretty = false;
    let mut refresh = false;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--scope" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--scope requires a value\n{}", usage()))?;
                scope = value
                    .parse()
                    .map_err(|e: String| anyhow!("{e}\n{}", usage()))?;
            }
            "--pretty" => pretty = true,
            "--refresh" => refresh = true,
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other => bail!("Unknown argument: {other}\n{}", usage()),
        }
    }

    Ok(CliOptions {
        scope,
        pretty,
        refresh,
    })
}
