//! Minimal CSV reading for spreadsheet exports.
//!
//! Handles:
//! - Quoted fields containing commas, newlines and `""` escapes
//! - `\n` and `\r\n` line endings, and a UTF-8 byte order mark
//! - Header synonyms (`qty`, `stock` and `quantity` all map to one column)

use std::collections::HashMap;

use super::{ImportError, ImportResult};

/// A parsed record and the line it starts on (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub line: usize,
    pub fields: Vec<String>,
}

/// Split CSV text into records.
pub fn parse_records(text: &str) -> ImportResult<Vec<Record>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                records.push(Record {
                    line: record_line,
                    fields: std::mem::take(&mut fields),
                });
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ImportError::UnterminatedQuote { line: record_line });
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push(Record {
            line: record_line,
            fields,
        });
    }

    Ok(records
        .into_iter()
        .filter(|r| r.fields.iter().any(|f| !f.trim().is_empty()))
        .collect())
}

/// Columns the importer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Name,
    GenericName,
    Form,
    Strength,
    Barcode,
    UnitPrice,
    CostPrice,
    Quantity,
    ExpiryDate,
    Currency,
    ReorderLevel,
}

impl Column {
    /// Map a header cell to a column, ignoring case, spacing and `_`/`-`.
    pub fn from_header(header: &str) -> Option<Self> {
        let key = header
            .to_lowercase()
            .replace(['_', '-', '.'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let column = match key.as_str() {
            "name" | "drug" | "drug name" | "item" | "item name" | "product" | "trade name" => {
                Column::Name
            }
            "generic" | "generic name" | "active ingredient" => Column::GenericName,
            "form" | "dosage form" => Column::Form,
            "strength" | "dose" | "concentration" => Column::Strength,
            "barcode" | "bar code" | "ean" | "upc" => Column::Barcode,
            "price" | "unit price" | "selling price" | "sale price" => Column::UnitPrice,
            "cost" | "cost price" | "unit cost" | "purchase price" => Column::CostPrice,
            "qty" | "stock" | "quantity" | "on hand" => Column::Quantity,
            "expiry" | "expiry date" | "exp" | "exp date" | "expiration" | "expiration date" => {
                Column::ExpiryDate
            }
            "currency" | "cur" => Column::Currency,
            "reorder" | "reorder level" | "min stock" => Column::ReorderLevel,
            _ => return None,
        };
        Some(column)
    }
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone)]
pub struct Header {
    positions: HashMap<Column, usize>,
    /// Header cells that matched no known column
    pub ignored: Vec<String>,
}

impl Header {
    /// Resolve a header record. The name column is mandatory.
    pub fn resolve(record: &Record) -> ImportResult<Self> {
        let mut positions = HashMap::new();
        let mut ignored = Vec::new();

        for (i, cell) in record.fields.iter().enumerate() {
            match Column::from_header(cell) {
                // First occurrence wins
                Some(column) => {
                    positions.entry(column).or_insert(i);
                }
                None if !cell.trim().is_empty() => ignored.push(cell.trim().to_string()),
                None => {}
            }
        }

        if !positions.contains_key(&Column::Name) {
            return Err(ImportError::MissingColumn("name".into()));
        }
        Ok(Self { positions, ignored })
    }

    /// The trimmed, non-empty cell of `column` in `record`.
    pub fn get<'r>(&self, record: &'r Record, column: Column) -> Option<&'r str> {
        let i = *self.positions.get(&column)?;
        record
            .fields
            .get(i)
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
    }

    pub fn has(&self, column: Column) -> bool {
        self.positions.contains_key(&column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(text: &str) -> Vec<Vec<String>> {
        parse_records(text)
            .unwrap()
            .into_iter()
            .map(|r| r.fields)
            .collect()
    }

    #[test]
    fn test_plain_records() {
        assert_eq!(
            fields("name,qty\nPanadol,10\n"),
            vec![vec!["name", "qty"], vec!["Panadol", "10"]]
        );
    }

    #[test]
    fn test_quoted_fields() {
        let rows = fields("name,notes\n\"Amoxil, 500mg\",\"say \"\"hi\"\"\"\n");
        assert_eq!(rows[1], vec!["Amoxil, 500mg", "say \"hi\""]);
    }

    #[test]
    fn test_crlf_bom_and_missing_trailing_newline() {
        let rows = fields("\u{feff}name,qty\r\nA,1\r\nB,2");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "name");
        assert_eq!(rows[2], vec!["B", "2"]);
    }

    #[test]
    fn test_embedded_newline_keeps_line_numbers() {
        let records = parse_records("name,notes\n\"A\",\"two\nlines\"\nB,x\n").unwrap();
        assert_eq!(records[1].fields[1], "two\nlines");
        assert_eq!(records[1].line, 2);
        assert_eq!(records[2].line, 4);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let records = parse_records("name\n\nA\n , \n").unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(matches!(
            parse_records("name\n\"open"),
            Err(ImportError::UnterminatedQuote { line: 2 })
        ));
    }

    #[test]
    fn test_header_synonyms() {
        assert_eq!(Column::from_header("Drug"), Some(Column::Name));
        assert_eq!(Column::from_header(" Unit_Price "), Some(Column::UnitPrice));
        assert_eq!(Column::from_header("STOCK"), Some(Column::Quantity));
        assert_eq!(Column::from_header("Exp. Date"), Some(Column::ExpiryDate));
        assert_eq!(Column::from_header("shelf"), None);
    }

    #[test]
    fn test_header_requires_name() {
        let record = Record {
            line: 1,
            fields: vec!["qty".into(), "price".into()],
        };
        assert!(matches!(
            Header::resolve(&record),
            Err(ImportError::MissingColumn(_))
        ));

        let record = Record {
            line: 1,
            fields: vec!["Item".into(), "Shelf".into(), "Qty".into()],
        };
        let header = Header::resolve(&record).unwrap();
        assert!(header.has(Column::Quantity));
        assert_eq!(header.ignored, vec!["Shelf"]);

        let row = Record {
            line: 2,
            fields: vec!["Panadol".into(), "A3".into(), " ".into()],
        };
        assert_eq!(header.get(&row, Column::Name), Some("Panadol"));
        assert_eq!(header.get(&row, Column::Quantity), None);
        assert_eq!(header.get(&row, Column::Barcode), None);
    }
}
