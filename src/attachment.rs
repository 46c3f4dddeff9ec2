use std::io::Cursor;

use anyhow::{Context, anyhow};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use log::debug;
use lopdf::Document;

use crate::{
    extract_error::ExtractError,
    pdf_layout::{layout_table, page_text_runs},
    table::{Cell, Table},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Pdf,
    Spreadsheet,
}

impl AttachmentKind {
    /// Anything that is not a PDF is handed to the spreadsheet reader.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.to_ascii_lowercase().ends_with(".pdf") {
            AttachmentKind::Pdf
        } else {
            AttachmentKind::Spreadsheet
        }
    }
}

pub fn read_table(kind: AttachmentKind, bytes: &[u8]) -> anyhow::Result<Table> {
    match kind {
        AttachmentKind::Pdf => read_pdf_table(bytes).context("failed to read PDF attachment"),
        AttachmentKind::Spreadsheet => {
            read_spreadsheet_table(bytes).context("failed to read spreadsheet attachment")
        }
    }
}

/// First worksheet, header row included.
pub fn read_spreadsheet_table(bytes: &[u8]) -> anyhow::Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
        return Err(ExtractError::EmptyWorkbook.into());
    };
    let range = workbook.worksheet_range(&sheet_name)?;
    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();
    Ok(Table::from_rows(rows))
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::Text(s.clone()),
        other => Cell::Text(other.to_string()),
    }
}

/// Largest table on the first page, rebuilt from where its text is drawn.
pub fn read_pdf_table(bytes: &[u8]) -> anyhow::Result<Table> {
    let document = Document::load_mem(bytes).map_err(|e| anyhow!("invalid PDF: {e}"))?;
    let Some(&first_page) = document.get_pages().values().next() else {
        return Err(ExtractError::NoPages.into());
    };
    let runs = page_text_runs(&document, first_page)?;
    debug!("{} text runs on the first page", runs.len());
    layout_table(runs).ok_or_else(|| ExtractError::NoTable.into())
}
