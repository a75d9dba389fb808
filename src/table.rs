use crate::error::SpectraError;

/// Comma-separated table as returned by the Gaia DataLink and TAP services.
/// Lines starting with `#` are treated as comments.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn parse(text: &str) -> Result<Self, SpectraError> {
        let mut lines = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'));
        let header = lines
            .next()
            .ok_or_else(|| SpectraError::Table("empty table".to_string()))?;
        let columns = split_record(header)
            .into_iter()
            .map(|name| name.trim().to_ascii_lowercase())
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        for (index, line) in lines.enumerate() {
            let row = split_record(line);
            if row.len() != columns.len() {
                return Err(SpectraError::Table(format!(
                    "row {} has {} fields, header has {}",
                    index + 1,
                    row.len(),
                    columns.len()
                )));
            }
            rows.push(row);
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    pub fn text_column(&self, name: &str) -> Result<Vec<String>, SpectraError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| SpectraError::Table(format!("missing column {name}")))?;
        Ok(self.rows.iter().map(|row| row[index].clone()).collect())
    }

    /// Empty cells and `null` become NaN so row alignment is preserved.
    pub fn float_column(&self, name: &str) -> Result<Vec<f64>, SpectraError> {
        self.text_column(name)?
            .iter()
            .map(|cell| parse_float(cell))
            .collect()
    }
}

fn parse_float(cell: &str) -> Result<f64, SpectraError> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("null") || cell == "--" {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>()
        .map_err(|_| SpectraError::Table(format!("not a number: {cell}")))
}

/// Splits one CSV record, honouring double-quoted fields.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}
