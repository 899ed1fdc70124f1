//! Workbook codec interface and the server import/export schema
//!
//! The `.xlsx` codec is an external collaborator; handlers talk to
//! `SheetCodec` only. The delimited-text codec in this module is the
//! in-tree implementation used by tests and tooling.
//!
//! Import schema: the first row must contain the columns
//! `server_name, ipv4, port, health_endpoint, health_check_interval`
//! (case-insensitive, trimmed, any order). Each data row is validated
//! on its own; failures collect into a rejected list instead of
//! aborting the import.

use std::fmt;

use crate::{Server, ServerSpec};

pub type SheetResult<T> = Result<T, SheetError>;

#[derive(Debug, PartialEq, Eq)]
pub enum SheetError {
    /// No data rows below the header
    Empty,

    /// The requested sheet does not exist in the workbook
    SheetNotFound,

    /// Header row lacks a required column
    MissingColumn(String),

    /// Byte-level decode failure
    Malformed(String),
}

impl fmt::Display for SheetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetError::Empty => write!(f, "file is empty"),
            SheetError::SheetNotFound => write!(f, "sheet not found"),
            SheetError::MissingColumn(name) => write!(f, "missing required column: {}", name),
            SheetError::Malformed(msg) => write!(f, "malformed workbook: {}", msg),
        }
    }
}

impl std::error::Error for SheetError {}

/// A single sheet: a name and rows of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

/// Decodes uploaded workbooks and encodes exports. Implementations
/// choose the byte format; handlers never look past `Sheet`.
pub trait SheetCodec: Send + Sync {
    /// Decode the named sheet, or the first sheet when `sheet_name`
    /// is `None`.
    fn decode(&self, bytes: &[u8], sheet_name: Option<&str>) -> SheetResult<Sheet>;

    fn encode(&self, sheet: &Sheet) -> SheetResult<Vec<u8>>;

    /// MIME type of encoded output, for download responses.
    fn content_type(&self) -> &'static str;

    /// File extension of encoded output, without the dot.
    fn file_extension(&self) -> &'static str;

    /// Whether an uploaded file extension (lowercase, no dot) is
    /// decodable by this codec.
    fn accepts_extension(&self, extension: &str) -> bool {
        extension == self.file_extension()
    }
}

/// Tab-separated single-sheet codec.
#[derive(Default)]
pub struct DelimitedSheetCodec;

const DELIMITER: char = '\t';
const SHEET_NAME: &str = "Servers";

impl SheetCodec for DelimitedSheetCodec {
    fn decode(&self, bytes: &[u8], sheet_name: Option<&str>) -> SheetResult<Sheet> {
        if let Some(name) = sheet_name {
            if name != SHEET_NAME {
                return Err(SheetError::SheetNotFound);
            }
        }

        let text =
            std::str::from_utf8(bytes).map_err(|e| SheetError::Malformed(e.to_string()))?;
        let rows: Vec<Vec<String>> = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.split(DELIMITER).map(str::to_string).collect())
            .collect();

        Ok(Sheet {
            name: SHEET_NAME.to_string(),
            rows,
        })
    }

    fn encode(&self, sheet: &Sheet) -> SheetResult<Vec<u8>> {
        let mut out = String::new();
        for row in &sheet.rows {
            out.push_str(&row.join(&DELIMITER.to_string()));
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    fn content_type(&self) -> &'static str {
        "text/tab-separated-values"
    }

    fn file_extension(&self) -> &'static str {
        "tsv"
    }
}

const REQUIRED_COLUMNS: [&str; 5] = [
    "server_name",
    "ipv4",
    "port",
    "health_endpoint",
    "health_check_interval",
];

/// Extract server specs from an import sheet. Returns the valid specs
/// and the `server_name` cells of rejected rows.
pub fn servers_from_sheet(sheet: &Sheet) -> SheetResult<(Vec<ServerSpec>, Vec<String>)> {
    if sheet.rows.len() < 2 {
        return Err(SheetError::Empty);
    }

    let header = &sheet.rows[0];
    let mut columns = std::collections::HashMap::new();
    for (i, cell) in header.iter().enumerate() {
        columns.insert(cell.trim().to_lowercase(), i);
    }
    for required in REQUIRED_COLUMNS {
        if !columns.contains_key(required) {
            return Err(SheetError::MissingColumn(required.to_string()));
        }
    }

    let cell = |row: &Vec<String>, name: &str| -> String {
        columns
            .get(name)
            .and_then(|&i| row.get(i))
            .map(|c| c.trim().to_string())
            .unwrap_or_default()
    };

    let mut valid = Vec::new();
    let mut rejected = Vec::new();

    for row in &sheet.rows[1..] {
        let server_name = cell(row, "server_name");

        let port = cell(row, "port").parse::<u16>();
        let interval = cell(row, "health_check_interval").parse::<u32>();
        let ipv4 = cell(row, "ipv4").parse::<std::net::Ipv4Addr>();
        let health_endpoint = cell(row, "health_endpoint");

        match (port, interval, ipv4) {
            (Ok(port), Ok(interval), Ok(ipv4))
                if port >= 1 && interval >= 1 && !server_name.is_empty() =>
            {
                valid.push(ServerSpec {
                    server_name,
                    ipv4,
                    port,
                    health_endpoint,
                    health_check_interval: interval,
                });
            }
            _ => rejected.push(server_name),
        }
    }

    Ok((valid, rejected))
}

const EXPORT_COLUMNS: [&str; 9] = [
    "id",
    "server_name",
    "status",
    "ipv4",
    "port",
    "health_endpoint",
    "health_check_interval",
    "created_at",
    "updated_at",
];

/// Render servers as an export sheet with the full column set.
pub fn sheet_from_servers(servers: &[Server]) -> Sheet {
    let mut rows = Vec::with_capacity(servers.len() + 1);
    rows.push(EXPORT_COLUMNS.iter().map(|c| c.to_string()).collect());

    for server in servers {
        rows.push(vec![
            server.id.clone(),
            server.server_name.clone(),
            server.status.to_string(),
            server.ipv4.to_string(),
            server.port.to_string(),
            server.health_endpoint.clone(),
            server.health_check_interval.to_string(),
            server.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            server.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }

    Sheet {
        name: "Servers".to_string(),
        rows,
    }
}
