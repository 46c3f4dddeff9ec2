use std::path::PathBuf;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};

use crate::{
    attachment::{AttachmentKind, read_table},
    config::{SOURCE_ENTITY, SOURCE_NAME},
    extract::extract_indicators,
    hash_cache::{HashCache, content_hash},
    index_scraper::{ReportLink, discover_reports},
    record::{HospitalizationRecord, write_records},
    scraping_context::ScrapingContext,
    table::Table,
};

#[derive(Debug)]
pub enum RunOutcome {
    /// The index page hash was already recorded; nothing was written.
    Unchanged { page_hash: String },
    Written {
        path: PathBuf,
        records: Vec<HospitalizationRecord>,
    },
}

pub fn build_record(
    date: NaiveDate,
    source: String,
    kind: AttachmentKind,
    table: &Table,
) -> HospitalizationRecord {
    let indicators = extract_indicators(table, date, kind);
    HospitalizationRecord {
        date,
        hospitalized: indicators.hospitalized,
        require_ventilator_or_in_icu: indicators.critical,
        source,
    }
}

/// Download one report attachment and pull both indicators out of it. Any
/// failure leaves the indicators missing.
pub async fn process_report(ctx: &ScrapingContext, report: ReportLink) -> HospitalizationRecord {
    let url = ctx.scraping_config.attachment_url(&report.href);
    let kind = AttachmentKind::from_url(&url);
    let table = match fetch_table(ctx, &url, kind).await {
        Ok(table) => table,
        Err(e) => {
            warn!("{}: {url}: {e:#}", report.date);
            return HospitalizationRecord::empty(report.date, url);
        }
    };
    let record = build_record(report.date, url, kind, &table);
    debug!("{record:?}");
    record
}

async fn fetch_table(
    ctx: &ScrapingContext,
    url: &str,
    kind: AttachmentKind,
) -> anyhow::Result<Table> {
    let bytes = ctx.request_client.fetch_url_bytes(url).await?;
    // Spreadsheet and PDF decoding is CPU bound.
    let table = tokio::task::spawn_blocking(move || read_table(kind, &bytes)).await??;
    Ok(table)
}

pub async fn run(ctx: &ScrapingContext) -> anyhow::Result<RunOutcome> {
    let config = &ctx.scraping_config;
    info!(
        "Fetching {} ({}) report index: {}",
        SOURCE_NAME, SOURCE_ENTITY, config.source_url
    );
    let page = ctx.request_client.fetch_url_bytes(&config.source_url).await?;
    let page_hash = content_hash(&page);

    // A single-date run is partial output, so it neither consults nor
    // records the page hash.
    let mut cache = match (&config.hash_path, config.only_date) {
        (Some(path), None) => Some(HashCache::load(path)?),
        _ => None,
    };
    if let Some(cache) = &cache {
        debug!("{} page hashes on record", cache.len());
        if cache.contains(&page_hash) && !config.force {
            info!("Index page unchanged ({page_hash}), nothing to do");
            return Ok(RunOutcome::Unchanged { page_hash });
        }
    }

    let html = String::from_utf8_lossy(&page);
    let mut reports = discover_reports(&html, &ctx.report_date_extractor);
    if let Some(only_date) = config.only_date {
        reports.retain(|report| report.date == only_date);
    }
    info!("Processing {} reports", reports.len());

    let records: Vec<HospitalizationRecord> = stream::iter(reports)
        .map(|report| process_report(ctx, report))
        .buffered(config.max_concurrent_downloads)
        .collect()
        .await;

    let incomplete = records
        .iter()
        .filter(|r| r.hospitalized.is_none() || r.require_ventilator_or_in_icu.is_none())
        .count();
    if incomplete > 0 {
        warn!("{incomplete} of {} reports have missing values", records.len());
    }

    write_records(&config.output_path, config.output_format, &records)?;
    info!(
        "Wrote {} records to {}",
        records.len(),
        config.output_path.display()
    );

    if let Some(cache) = &mut cache {
        cache.insert(page_hash);
        cache.save()?;
    }

    Ok(RunOutcome::Written {
        path: config.output_path.clone(),
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    #[test]
    fn record_carries_source_and_indicators() {
        let table = Table::from_rows(vec![
            vec![Cell::text("入院者数"), Cell::text("うち重症者数")],
            vec![Cell::Number(4019.0), Cell::text("226")],
        ]);
        let date = NaiveDate::from_ymd_opt(2020, 6, 3).unwrap();
        let record = build_record(
            date,
            "https://www.mhlw.go.jp/a.pdf".to_string(),
            AttachmentKind::Pdf,
            &table,
        );
        assert_eq!(record.hospitalized, Some(4019));
        assert_eq!(record.require_ventilator_or_in_icu, Some(226));
        assert_eq!(record.source, "https://www.mhlw.go.jp/a.pdf");
    }

    #[test]
    fn spreadsheet_record_skips_the_title_row() {
        let table = Table::from_rows(vec![
            vec![Cell::text("入院者数"), Cell::text("うち重症者数")],
            vec![Cell::text("都道府県"), Cell::text("入院者数")],
            vec![Cell::Number(1.0), Cell::Number(4019.0)],
        ]);
        let date = NaiveDate::from_ymd_opt(2020, 6, 3).unwrap();
        let record = build_record(date, "x.xlsx".to_string(), AttachmentKind::Spreadsheet, &table);
        assert_eq!(record.hospitalized, Some(4019));
        assert_eq!(record.require_ventilator_or_in_icu, None);
    }

    #[test]
    fn table_without_headers_gives_empty_record() {
        let date = NaiveDate::from_ymd_opt(2020, 6, 3).unwrap();
        let record = build_record(
            date,
            "x".to_string(),
            AttachmentKind::Spreadsheet,
            &Table::default(),
        );
        assert_eq!(record, HospitalizationRecord::empty(date, "x".to_string()));
    }
}
