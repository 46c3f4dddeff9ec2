use dotenv::dotenv;
use log::{LevelFilter, info};
use mhlw_hospitalization::{RunOutcome, ScrapingContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let context = ScrapingContext::new()?;

    let level = if context.scraping_config.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match mhlw_hospitalization::run(&context).await? {
        RunOutcome::Unchanged { page_hash } => {
            info!("Skipped: index page {page_hash} was already processed");
        }
        RunOutcome::Written { path, records } => {
            let first = records.first().map(|r| r.date.to_string());
            let last = records.last().map(|r| r.date.to_string());
            info!(
                "Done: {} records ({} .. {}) in {}",
                records.len(),
                first.unwrap_or_default(),
                last.unwrap_or_default(),
                path.display()
            );
        }
    }
    Ok(())
}
