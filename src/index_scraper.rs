use std::sync::LazyLock;

use chrono::NaiveDate;
use log::{debug, warn};
use scraper::{Html, Selector};

use crate::config::ReportDateExtractor;

/// Title shared by every hospitalization status report on the index page.
pub const REPORT_TITLE: &str = "新型コロナウイルス感染症患者の療養状況";

static LIST_ITEM_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".m-grid li").expect("static selector"));
static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLink {
    pub date: NaiveDate,
    /// As written on the page; usually site-relative.
    pub href: String,
}

/// Split the index page into per-report HTML groups. A list item carrying a
/// date starts a new group; groups keep page order.
pub fn segment_groups(html: &str, extractor: &ReportDateExtractor) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut groups = vec![];
    let mut group: Vec<String> = vec![];

    for li in document.select(&LIST_ITEM_SELECTOR) {
        let li_html = li.html();
        if extractor.has_date(&li_html) && !group.is_empty() {
            groups.push(group.concat());
            group.clear();
        }
        group.push(li_html);
    }
    if !group.is_empty() {
        groups.push(group.concat());
    }
    groups
}

/// Link to the attachment most likely to hold the report table: the
/// spreadsheet if the last href (sorted) is one, otherwise the first href.
pub fn pick_attachment(group_html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(group_html);
    let mut links: Vec<String> = fragment
        .select(&LINK_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .collect();
    links.sort();

    if links.last().is_some_and(|last| last.ends_with(".xlsx")) {
        links.pop()
    } else {
        links.into_iter().next()
    }
}

/// Reports on the page, oldest first.
pub fn discover_reports(html: &str, extractor: &ReportDateExtractor) -> Vec<ReportLink> {
    let mut reports = vec![];
    for group in segment_groups(html, extractor).iter().rev() {
        if !group.contains(REPORT_TITLE) {
            continue;
        }
        let date = match extractor.find_date(group) {
            Ok(date) => date,
            Err(e) => {
                warn!("skipping report group without a usable date: {e}");
                continue;
            }
        };
        let Some(href) = pick_attachment(group) else {
            warn!("{date}: report has no attachment link");
            continue;
        };
        debug!("{date}: attachment {href}");
        reports.push(ReportLink { date, href });
    }
    reports
}
