use std::fmt;

/// Why a report attachment yielded no table.
#[derive(Debug)]
pub enum ExtractError {
    EmptyWorkbook,
    NoPages,
    NoTable,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::EmptyWorkbook => write!(f, "The workbook has no worksheets!"),
            ExtractError::NoPages => write!(f, "The PDF has no pages!"),
            ExtractError::NoTable => write!(f, "No table could be recognised in the attachment!"),
        }
    }
}

impl std::error::Error for ExtractError {}
