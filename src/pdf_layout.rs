//! Table reconstruction from the positioned text of a PDF page.
//!
//! Report PDFs carry no table structure, only strings drawn at coordinates.
//! Every text-showing operator becomes a [`TextRun`] at its baseline origin.
//! Runs sharing a baseline form a row, and the longest stretch of consecutive
//! rows with at least two cells is taken as the table. Columns are anchored at
//! the run origins of the row with the most cells; a run belongs to the
//! rightmost anchor at or left of its origin, so right-aligned figures still
//! land under their header.

use std::collections::BTreeMap;

use anyhow::anyhow;
use lopdf::{
    Document, Encoding, Object, ObjectId,
    content::{Content, Operation},
};
use log::debug;

use crate::table::{Cell, Table};

/// Baselines closer than this (in points) share a row.
const ROW_TOLERANCE: f32 = 2.0;
/// Slack allowed when a run starts just left of its column anchor.
const COLUMN_TOLERANCE: f32 = 2.0;
/// Runs drawn at the same origin are one string split across operators.
const SAME_ORIGIN: f32 = 0.5;

/// A string drawn on the page, positioned at its baseline origin.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

impl TextRun {
    pub fn new(x: f32, y: f32, text: impl Into<String>) -> Self {
        Self {
            x,
            y,
            text: text.into(),
        }
    }
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `m` followed by `n`, in PDF row-vector convention.
fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn floats<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    if operands.len() != N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, operand) in out.iter_mut().zip(operands) {
        *slot = operand.as_float().ok()?;
    }
    Some(out)
}

#[derive(Debug)]
struct TextState {
    ctm: Matrix,
    saved: Vec<Matrix>,
    line: Matrix,
    text: Matrix,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            saved: vec![],
            line: IDENTITY,
            text: IDENTITY,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn set_text_matrix(&mut self, matrix: Matrix) {
        self.line = matrix;
        self.text = matrix;
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        let moved = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line);
        self.set_text_matrix(moved);
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn origin(&self) -> (f32, f32) {
        let rendered = multiply(&self.text, &self.ctm);
        (rendered[4], rendered[5])
    }
}

fn decode(bytes: &[u8], font: Option<&Encoding>) -> String {
    font.and_then(|encoding| Document::decode_text(encoding, bytes).ok())
        .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
}

fn shown_text(operands: &[Object], font: Option<&Encoding>) -> String {
    let mut text = String::new();
    for operand in operands {
        match operand {
            Object::String(bytes, _) => text.push_str(&decode(bytes, font)),
            Object::Array(items) => {
                for item in items {
                    if let Object::String(bytes, _) = item {
                        text.push_str(&decode(bytes, font));
                    }
                }
            }
            _ => {}
        }
    }
    text
}

/// Every non-blank string drawn on a page, in drawing order.
pub fn page_text_runs(document: &Document, page_id: ObjectId) -> anyhow::Result<Vec<TextRun>> {
    let encodings: BTreeMap<Vec<u8>, Encoding> = document
        .get_page_fonts(page_id)
        .map_err(|e| anyhow!("unreadable page fonts: {e}"))?
        .into_iter()
        .filter_map(|(name, font)| match font.get_font_encoding(document) {
            Ok(encoding) => Some((name, encoding)),
            Err(e) => {
                debug!("font {}: {e}", String::from_utf8_lossy(&name));
                None
            }
        })
        .collect();

    let raw = document
        .get_page_content(page_id)
        .map_err(|e| anyhow!("unreadable page content: {e}"))?;
    let content = Content::decode(&raw).map_err(|e| anyhow!("undecodable page content: {e}"))?;

    let mut state = TextState::default();
    let mut font: Option<&Encoding> = None;
    let mut runs = vec![];
    for Operation { operator, operands } in &content.operations {
        let shown = match operator.as_str() {
            "q" => {
                state.saved.push(state.ctm);
                None
            }
            "Q" => {
                if let Some(ctm) = state.saved.pop() {
                    state.ctm = ctm;
                }
                None
            }
            "cm" => {
                if let Some(matrix) = floats::<6>(operands) {
                    state.ctm = multiply(&matrix, &state.ctm);
                }
                None
            }
            "BT" => {
                state.set_text_matrix(IDENTITY);
                None
            }
            "Tm" => {
                if let Some(matrix) = floats::<6>(operands) {
                    state.set_text_matrix(matrix);
                }
                None
            }
            "Td" => {
                if let Some([tx, ty]) = floats::<2>(operands) {
                    state.move_line(tx, ty);
                }
                None
            }
            "TD" => {
                if let Some([tx, ty]) = floats::<2>(operands) {
                    state.leading = -ty;
                    state.move_line(tx, ty);
                }
                None
            }
            "TL" => {
                if let Some([leading]) = floats::<1>(operands) {
                    state.leading = leading;
                }
                None
            }
            "T*" => {
                state.next_line();
                None
            }
            "Tf" => {
                font = operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| encodings.get(name));
                None
            }
            "Tj" | "TJ" => Some(shown_text(operands, font)),
            "'" | "\"" => {
                state.next_line();
                Some(shown_text(operands, font))
            }
            _ => None,
        };

        if let Some(text) = shown {
            let text = text.trim();
            if !text.is_empty() {
                let (x, y) = state.origin();
                runs.push(TextRun::new(x, y, text));
            }
        }
    }
    Ok(runs)
}

/// Rows top to bottom, each left to right.
fn group_rows(mut runs: Vec<TextRun>) -> Vec<Vec<TextRun>> {
    runs.sort_by(|a, b| b.y.total_cmp(&a.y));

    let mut rows: Vec<Vec<TextRun>> = vec![];
    for run in runs {
        match rows.last_mut() {
            Some(row) if (row[0].y - run.y).abs() <= ROW_TOLERANCE => row.push(run),
            _ => rows.push(vec![run]),
        }
    }

    rows.into_iter()
        .map(|mut row| {
            row.sort_by(|a, b| a.x.total_cmp(&b.x));
            let mut merged: Vec<TextRun> = Vec::with_capacity(row.len());
            for run in row {
                match merged.last_mut() {
                    Some(prev) if (run.x - prev.x).abs() <= SAME_ORIGIN => {
                        prev.text.push_str(&run.text)
                    }
                    _ => merged.push(run),
                }
            }
            merged
        })
        .collect()
}

fn place_cells(row: &[TextRun], anchors: &[f32]) -> Vec<Cell> {
    let mut cells = vec![Cell::Empty; anchors.len()];
    for run in row {
        let column = anchors
            .iter()
            .rposition(|&x| x <= run.x + COLUMN_TOLERANCE)
            .unwrap_or(0);
        let text = match &cells[column] {
            Cell::Text(existing) => format!("{existing} {}", run.text),
            _ => run.text.clone(),
        };
        cells[column] = Cell::Text(text);
    }
    cells
}

/// The largest table among the runs, or `None` when no two consecutive rows
/// span at least two columns.
pub fn layout_table(runs: Vec<TextRun>) -> Option<Table> {
    let rows = group_rows(runs);

    let mut block: Option<&[Vec<TextRun>]> = None;
    for candidate in rows.split(|row| row.len() < 2) {
        if !candidate.is_empty() && block.is_none_or(|best| candidate.len() > best.len()) {
            block = Some(candidate);
        }
    }
    let block = block?;

    let widest = block
        .iter()
        .reduce(|best, row| if row.len() > best.len() { row } else { best })?;
    let anchors: Vec<f32> = widest.iter().map(|run| run.x).collect();
    debug!("table of {} rows, columns at {anchors:?}", block.len());

    let rows = block.iter().map(|row| place_cells(row, &anchors)).collect();
    Some(Table::from_rows(rows))
}

#[cfg(test)]
mod tests {
    use lopdf::{Stream, dictionary};

    use super::*;
    use crate::{
        attachment::{AttachmentKind, read_pdf_table},
        extract::{extract_indicators, last_value},
        extract_error::ExtractError,
    };

    /// A one-page PDF with a WinAnsi Courier font named `F1`.
    fn single_page_pdf(operations: Vec<Operation>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    /// One text object per string, each placed absolutely with `Td`.
    fn placed_strings(strings: &[(f32, f32, &str)]) -> Vec<Operation> {
        let mut operations = vec![];
        for &(x, y, text) in strings {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 10.into()]));
            operations.push(Operation::new("Td", vec![x.into(), y.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        operations
    }

    #[test]
    fn pdf_table_columns_follow_text_positions() {
        let pdf = single_page_pdf(placed_strings(&[
            (72.0, 800.0, "Hospitalization survey"),
            (72.0, 760.0, "Pref"),
            (200.0, 760.0, "Hosp"),
            (300.0, 760.0, "Crit"),
            (72.0, 745.0, "Hokkaido"),
            (200.0, 745.0, "120"),
            (300.0, 745.0, "4"),
            (72.0, 730.0, "Total"),
            (200.0, 730.0, "150"),
            (300.0, 730.0, "4"),
            (290.0, 40.0, "1"),
        ]));

        let table = read_pdf_table(&pdf).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_cols(), 3);
        assert_eq!(
            table.column(0).collect::<Vec<_>>(),
            vec![&Cell::text("Pref"), &Cell::text("Hokkaido"), &Cell::text("Total")]
        );
        assert_eq!(last_value(&table, 1), Some("150".to_string()));
        assert_eq!(last_value(&table, 2), Some("4".to_string()));
    }

    #[test]
    fn text_state_operators_position_runs() {
        let pdf = single_page_pdf(vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), 10.into(), 20.into()],
            ),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), 100.into(), 700.into()],
            ),
            Operation::new("TL", vec![12.into()]),
            Operation::new("Tj", vec![Object::string_literal("a")]),
            Operation::new("T*", vec![]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("b"),
                    (-120).into(),
                    Object::string_literal("c"),
                ])],
            ),
            Operation::new("TD", vec![50.into(), (-10).into()]),
            Operation::new("'", vec![Object::string_literal("d")]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Td", vec![5.into(), 5.into()]),
            Operation::new("Tj", vec![Object::string_literal("e")]),
            Operation::new("ET", vec![]),
        ]);

        let document = Document::load_mem(&pdf).unwrap();
        let page_id = *document.get_pages().values().next().unwrap();
        let runs = page_text_runs(&document, page_id).unwrap();
        assert_eq!(
            runs,
            vec![
                TextRun::new(110.0, 720.0, "a"),
                TextRun::new(110.0, 708.0, "bc"),
                TextRun::new(160.0, 688.0, "d"),
                TextRun::new(5.0, 5.0, "e"),
            ]
        );
    }

    #[test]
    fn single_column_page_has_no_table() {
        let pdf = single_page_pdf(placed_strings(&[
            (72.0, 800.0, "Notice"),
            (72.0, 780.0, "Figures are published separately."),
            (290.0, 40.0, "1"),
        ]));
        let err = read_pdf_table(&pdf).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExtractError>(),
            Some(ExtractError::NoTable)
        ));
    }

    #[test]
    fn right_aligned_figures_stay_under_their_header() {
        let runs = vec![
            TextRun::new(50.0, 500.0, "都道府県"),
            TextRun::new(150.0, 500.0, "入院者数"),
            TextRun::new(250.0, 500.0, "うち重症者数"),
            TextRun::new(50.0, 480.0, "北海道"),
            TextRun::new(178.0, 480.0, "1,200"),
            TextRun::new(290.0, 480.0, "30"),
            TextRun::new(50.0, 460.0, "合計"),
            TextRun::new(178.0, 460.0, "1,500"),
            TextRun::new(290.0, 460.0, "40"),
            TextRun::new(300.0, 30.0, "1"),
        ];
        let table = layout_table(runs).unwrap();
        assert_eq!(table.num_rows(), 3);

        let date = "2021-01-06".parse().unwrap();
        let got = extract_indicators(&table, date, AttachmentKind::Pdf);
        assert_eq!(got.hospitalized, Some(1500));
        assert_eq!(got.critical, Some(40));
    }

    #[test]
    fn split_strings_at_one_origin_are_joined() {
        let runs = vec![
            TextRun::new(10.0, 100.0, "入院"),
            TextRun::new(10.0, 100.0, "者数"),
            TextRun::new(90.0, 100.0, "x"),
            TextRun::new(10.0, 88.0, "7"),
            TextRun::new(90.0, 88.0, "y"),
        ];
        let table = layout_table(runs).unwrap();
        assert_eq!(
            table.column(0).collect::<Vec<_>>(),
            vec![&Cell::text("入院者数"), &Cell::text("7")]
        );
    }
}
