//! CSV reader for the card catalog.
//!
//! Line-based: one record per line, fields may be double-quoted so card
//! names containing commas survive. Quoted fields never span lines.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

use super::CatalogEntry;
use crate::error::CatalogError;

const REQUIRED_COLUMNS: [&str; 7] = [
    "name_cn",
    "name_en",
    "card_number",
    "type_en",
    "domain_en",
    "cost",
    "rarity_en",
];

/// Column positions resolved from the header row.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self, CatalogError> {
        let index: HashMap<String, usize> = split_line(header)
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();

        for column in REQUIRED_COLUMNS {
            if !index.contains_key(column) {
                return Err(CatalogError::MissingColumn(column.to_string()));
            }
        }
        Ok(Self { index })
    }

    fn get<'a>(&self, fields: &'a [String], column: &str) -> Option<&'a str> {
        self.index
            .get(column)
            .and_then(|&i| fields.get(i))
            .map(|s| s.trim())
    }
}

/// Loads catalog entries from a CSV file.
///
/// CSV format expected (header row required, extra columns ignored):
/// name_cn,name_en,card_number,type_en,domain_en,cost,rarity_en[,image_url_en]
///
/// Skips empty lines and malformed rows (with warning log).
pub fn read_catalog(path: &Path) -> Result<Vec<CatalogEntry>, CatalogError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(CatalogError::Empty),
    };
    // Spreadsheet exports prepend a UTF-8 BOM
    let columns = Columns::from_header(header.trim_start_matches('\u{feff}'))?;

    let mut entries = Vec::new();
    for (line_num, line_result) in lines.enumerate() {
        let line = line_result?;

        // Skip empty lines
        if line.trim().is_empty() {
            continue;
        }

        // Header is line 1
        match parse_line(&columns, &line, line_num + 2) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping malformed catalog row: {}", e),
        }
    }

    if entries.is_empty() {
        return Err(CatalogError::Empty);
    }
    Ok(entries)
}

/// Parse a single CSV line into a CatalogEntry.
fn parse_line(columns: &Columns, line: &str, line_num: usize) -> Result<CatalogEntry, CatalogError> {
    let fields = split_line(line);
    let malformed = |reason: &str| CatalogError::Malformed {
        line: line_num,
        reason: reason.to_string(),
    };

    let required = |column: &str| -> Result<String, CatalogError> {
        match columns.get(&fields, column) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Err(malformed(&format!("missing `{}`", column))),
        }
    };

    Ok(CatalogEntry {
        localized_name: required("name_cn")?,
        canonical_name: required("name_en")?,
        id: required("card_number")?,
        card_type: columns.get(&fields, "type_en").unwrap_or_default().to_string(),
        domain: columns.get(&fields, "domain_en").unwrap_or_default().to_string(),
        cost: columns.get(&fields, "cost").and_then(|c| c.parse().ok()),
        rarity: columns.get(&fields, "rarity_en").unwrap_or_default().to_string(),
        image_url: columns
            .get(&fields, "image_url_en")
            .filter(|u| !u.is_empty())
            .map(String::from),
    })
}

/// Splits one CSV line, honoring double quotes and `""` escapes.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', _) => in_quotes = !in_quotes,
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const HEADER: &str = "name_cn,name_en,card_number,type_en,domain_en,cost,rarity_en,image_url_en";

    #[test]
    fn test_split_line_quotes() {
        assert_eq!(
            split_line(r#"a,"b, c","say ""hi""",,d"#),
            vec!["a", "b, c", r#"say "hi""#, "", "d"]
        );
    }

    #[test]
    fn test_parse_valid_csv() {
        let content = format!(
            "\u{feff}{}\n\
             \"卡莎, 虚空之女\",\"Kai'Sa, Daughter of the Void\",OGN-039,Champion,Fury,3,Rare,https://x/1.png\n\
             火焰符文,Fury Rune,OGN-007,Rune,Fury,,Common,\n",
            HEADER
        );
        let file = create_test_csv(&content);
        let entries = read_catalog(file.path()).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].localized_name, "卡莎, 虚空之女");
        assert_eq!(entries[0].canonical_name, "Kai'Sa, Daughter of the Void");
        assert_eq!(entries[0].id, "OGN-039");
        assert_eq!(entries[0].cost, Some(3));
        assert_eq!(entries[0].image_url.as_deref(), Some("https://x/1.png"));
        assert_eq!(entries[1].card_type, "Rune");
        assert_eq!(entries[1].cost, None);
        assert_eq!(entries[1].image_url, None);
    }

    #[test]
    fn test_skip_malformed_and_empty_lines() {
        let content = format!(
            "{}\n\
             卡莎,Kai'Sa,OGN-039,Champion,Fury,3,Rare\n\
             \n\
             ,Nameless,OGN-999,Unit,Calm,1,Common\n\
             金克丝,Jinx,OGN-202,Champion,Fury,4,Epic\n",
            HEADER
        );
        let file = create_test_csv(&content);
        let entries = read_catalog(file.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].canonical_name, "Jinx");
    }

    #[test]
    fn test_missing_column_is_error() {
        let file = create_test_csv("name_cn,name_en\n卡莎,Kai'Sa\n");
        assert!(matches!(
            read_catalog(file.path()),
            Err(CatalogError::MissingColumn(c)) if c == "card_number"
        ));
    }

    #[test]
    fn test_header_only_is_empty() {
        let file = create_test_csv(&format!("{}\n", HEADER));
        assert!(matches!(read_catalog(file.path()), Err(CatalogError::Empty)));
    }
}
