//! Maps external CSV columns onto schema fields and funnels the rows
//! through the same batch mutation path as interactive edits.
//!
//! Import is two-phase: validation collects every problem across the whole
//! file (one entry per bad row or cell) so the user gets a complete report,
//! and only a clean file is written. Rows may span months; each month is
//! written as its own optimistic transaction.

use crate::engine::{RemoteStore, SalesEngine};
use crate::error::{Result, SalesEngineError, ValidationError};
use crate::record::{DayPatch, FieldValue, RecordPatch};
use crate::schema::{FieldDefinition, FieldValueType, ViewPage};
use chrono::Datelike;
use std::collections::BTreeMap;
use std::io::Read;

/// One resolved header: CSV column index -> schema field key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub column: usize,
    pub header: String,
    pub field_key: String,
}

/// A header that matched nothing. Surfaced as a candidate for a new schema
/// field (numeric by default) rather than silently dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFieldCandidate {
    pub column: usize,
    pub header: String,
    pub value_type: FieldValueType,
}

#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    pub date_column: Option<usize>,
    pub mappings: Vec<ColumnMapping>,
    pub unmatched: Vec<NewFieldCandidate>,
}

/// The date column is recognized by substring, Japanese or English.
pub fn is_date_header(header: &str) -> bool {
    header.contains("日付") || header.to_lowercase().contains("date")
}

fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != ' ' && *c != '_' && *c != '　')
        .collect()
}

/// Resolves headers against the schema in three passes per header: exact
/// label match, normalized key match, then substring containment in either
/// direction against the label.
pub fn auto_map(headers: &[String], fields: &[FieldDefinition]) -> HeaderMap {
    let mut map = HeaderMap::default();

    for (column, raw_header) in headers.iter().enumerate() {
        let header = raw_header.trim();
        if header.is_empty() {
            continue;
        }
        if map.date_column.is_none() && is_date_header(header) {
            map.date_column = Some(column);
            continue;
        }

        let matched = fields
            .iter()
            .find(|f| f.label == header)
            .or_else(|| fields.iter().find(|f| normalize(&f.key) == normalize(header)))
            .or_else(|| {
                fields.iter().find(|f| {
                    !f.label.is_empty()
                        && (header.contains(f.label.as_str())
                            || f.label.contains(header))
                })
            });

        match matched {
            Some(field) => map.mappings.push(ColumnMapping {
                column,
                header: header.to_string(),
                field_key: field.key.clone(),
            }),
            None => map.unmatched.push(NewFieldCandidate {
                column,
                header: header.to_string(),
                value_type: FieldValueType::Number,
            }),
        }
    }

    map
}

/// Validates every row before anything is written: each row must carry a
/// parseable date, and every mapped numeric cell must coerce. Problems are
/// collected per (row, column), never thrown mid-batch.
pub fn validate(
    rows: &[Vec<String>],
    map: &HeaderMap,
    fields: &[FieldDefinition],
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let date_column = match map.date_column {
        Some(column) => column,
        None => {
            errors.push(ValidationError {
                row: 0,
                column: None,
                message: "no date column recognized (expected a header containing 日付 or date)"
                    .to_string(),
            });
            return errors;
        }
    };

    for (row_index, row) in rows.iter().enumerate() {
        match row.get(date_column) {
            Some(cell) if !cell.trim().is_empty() => {
                if crate::utils::parse_flexible_date(cell).is_err() {
                    errors.push(ValidationError {
                        row: row_index,
                        column: Some("date".to_string()),
                        message: format!("unparseable date '{}'", cell),
                    });
                }
            }
            _ => {
                errors.push(ValidationError {
                    row: row_index,
                    column: Some("date".to_string()),
                    message: "missing date".to_string(),
                });
            }
        }

        for mapping in &map.mappings {
            let is_numeric = fields
                .iter()
                .find(|f| f.key == mapping.field_key)
                .map(|f| f.value_type != FieldValueType::Text)
                .unwrap_or(true);
            if !is_numeric {
                continue;
            }
            if let Some(cell) = row.get(mapping.column) {
                let trimmed = cell.trim();
                if !trimmed.is_empty() && trimmed.parse::<f64>().is_err() {
                    errors.push(ValidationError {
                        row: row_index,
                        column: Some(mapping.header.clone()),
                        message: format!("'{}' is not a number", cell),
                    });
                }
            }
        }
    }

    errors
}

/// Converts validated rows into per-month patch batches. Empty cells mean
/// "no value provided" and are left out of the patch, so they never
/// overwrite existing data with blanks. Unmatched candidate columns are not
/// imported; they only inform the schema editor.
pub fn build_patches(
    rows: &[Vec<String>],
    map: &HeaderMap,
    fields: &[FieldDefinition],
) -> Result<BTreeMap<(i32, u32), Vec<DayPatch>>> {
    let date_column = map.date_column.ok_or_else(|| SalesEngineError::Date(
        "no date column recognized".to_string(),
    ))?;

    let mut grouped: BTreeMap<(i32, u32), Vec<DayPatch>> = BTreeMap::new();

    for row in rows {
        let date_cell = row
            .get(date_column)
            .ok_or_else(|| SalesEngineError::Date("missing date cell".to_string()))?;
        let date = crate::utils::parse_flexible_date(date_cell)?;

        let mut values = RecordPatch::new();
        for mapping in &map.mappings {
            let Some(cell) = row.get(mapping.column) else {
                continue;
            };
            let trimmed = cell.trim();
            if trimmed.is_empty() {
                continue;
            }

            let is_text = fields
                .iter()
                .find(|f| f.key == mapping.field_key)
                .map(|f| f.value_type == FieldValueType::Text)
                .unwrap_or(false);

            let value = if is_text {
                FieldValue::Text(trimmed.to_string())
            } else {
                match trimmed.parse::<f64>() {
                    Ok(n) => FieldValue::Number(n),
                    Err(_) => continue,
                }
            };
            values.insert(mapping.field_key.clone(), value);
        }

        grouped
            .entry((date.year(), date.month()))
            .or_default()
            .push(DayPatch::new(date, values));
    }

    Ok(grouped)
}

/// Validates and imports a parsed CSV for one store. Returns the number of
/// day records written. Nothing is written unless the whole file validates,
/// and every write goes through the engine's batch mutation path, so
/// imported data obeys exactly the same consistency guarantees as edits.
pub async fn import<S: RemoteStore>(
    engine: &mut SalesEngine<S>,
    store_id: &str,
    headers: &[String],
    rows: &[Vec<String>],
) -> Result<usize> {
    let fields = engine.schema_for_store(store_id);
    let map = auto_map(headers, &fields);
    if map.mappings.is_empty() {
        return Err(SalesEngineError::MissingSchema(store_id.to_string()));
    }

    let errors = validate(rows, &map, &fields);
    if !errors.is_empty() {
        return Err(SalesEngineError::ImportValidation { errors });
    }

    let grouped = build_patches(rows, &map, &fields)?;
    let mut written = 0;
    for ((year, month), patches) in grouped {
        written += patches.len();
        engine.mutate_batch(store_id, year, month, patches).await?;
    }
    Ok(written)
}

/// Thin reader helper: first row is headers, every cell trimmed.
pub fn read_rows<R: Read>(reader: R) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        rows.push(record.iter().map(|c| c.trim().to_string()).collect());
    }

    Ok((headers, rows))
}

fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        FieldValue::Number(n) => n.to_string(),
        FieldValue::Text(s) => s.clone(),
        FieldValue::Empty => String::new(),
    }
}

/// Renders a cached month back out as CSV: a 日付 column plus one column per
/// visible daily field, one row per calendar day.
pub fn export_csv(
    daily_data: &BTreeMap<chrono::NaiveDate, crate::record::DailyRecord>,
    fields: &[FieldDefinition],
) -> String {
    let columns = crate::schema::visible_fields(fields, ViewPage::Daily);

    let mut out = String::from("日付");
    for field in &columns {
        out.push(',');
        out.push_str(&field.label);
    }
    out.push('\n');

    for (date, record) in daily_data {
        out.push_str(&date.format("%Y-%m-%d").to_string());
        for field in &columns {
            out.push(',');
            if let Some(value) = record.get(&field.key) {
                out.push_str(&format_value(value));
            }
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::standard_restaurant_fields;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_auto_map_exact_label() {
        let fields = standard_restaurant_fields();
        let map = auto_map(&headers(&["日付", "売上", "原価"]), &fields);
        assert_eq!(map.date_column, Some(0));
        assert_eq!(map.mappings.len(), 2);
        assert_eq!(map.mappings[0].field_key, "revenue");
        assert_eq!(map.mappings[1].field_key, "cost");
        assert!(map.unmatched.is_empty());
    }

    #[test]
    fn test_auto_map_normalized_key() {
        let fields = standard_restaurant_fields();
        let map = auto_map(&headers(&["Date", "Store Net Sales"]), &fields);
        assert_eq!(map.date_column, Some(0));
        assert_eq!(map.mappings[0].field_key, "store_net_sales");
    }

    #[test]
    fn test_auto_map_substring_both_directions() {
        let fields = standard_restaurant_fields();
        // header contains the label
        let map = auto_map(&headers(&["日付", "1月の総客数"]), &fields);
        assert_eq!(map.mappings[0].field_key, "total_customers");
        // label contains the header
        let map = auto_map(&headers(&["日付", "客単"]), &fields);
        assert_eq!(map.mappings[0].field_key, "customer_unit_price");
    }

    #[test]
    fn test_auto_map_surfaces_unmatched_as_candidates() {
        let fields = standard_restaurant_fields();
        let map = auto_map(&headers(&["日付", "謎の指標"]), &fields);
        assert!(map.mappings.is_empty());
        assert_eq!(map.unmatched.len(), 1);
        assert_eq!(map.unmatched[0].header, "謎の指標");
        assert_eq!(map.unmatched[0].value_type, FieldValueType::Number);
    }

    #[test]
    fn test_validate_reports_every_bad_row_and_cell() {
        let fields = standard_restaurant_fields();
        let map = auto_map(&headers(&["日付", "売上"]), &fields);
        let rows = vec![
            row(&["2024-01-01", "100000"]),
            row(&["not-a-date", "200000"]),
            row(&["2024-01-03", "lots"]),
            row(&["", "300000"]),
        ];
        let errors = validate(&rows, &map, &fields);
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].row, 1);
        assert_eq!(errors[1].row, 2);
        assert_eq!(errors[1].column.as_deref(), Some("売上"));
        assert_eq!(errors[2].row, 3);
    }

    #[test]
    fn test_validate_without_date_column() {
        let fields = standard_restaurant_fields();
        let map = auto_map(&headers(&["売上"]), &fields);
        let errors = validate(&[row(&["100"])], &map, &fields);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("date column"));
    }

    #[test]
    fn test_validate_accepts_slash_dates_and_blanks() {
        let fields = standard_restaurant_fields();
        let map = auto_map(&headers(&["日付", "売上"]), &fields);
        let rows = vec![row(&["2024/01/05", ""]), row(&["2024-01-06", "5000"])];
        assert!(validate(&rows, &map, &fields).is_empty());
    }

    #[test]
    fn test_build_patches_groups_by_month() {
        let fields = standard_restaurant_fields();
        let map = auto_map(&headers(&["日付", "売上"]), &fields);
        let rows = vec![
            row(&["2024-01-31", "100"]),
            row(&["2024-02-01", "200"]),
            row(&["2024-01-15", "300"]),
        ];
        let grouped = build_patches(&rows, &map, &fields).unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&(2024, 1)].len(), 2);
        assert_eq!(grouped[&(2024, 2)].len(), 1);
    }

    #[test]
    fn test_build_patches_skips_empty_cells() {
        let fields = standard_restaurant_fields();
        let map = auto_map(&headers(&["日付", "売上", "原価"]), &fields);
        let rows = vec![row(&["2024-01-01", "100", ""])];
        let grouped = build_patches(&rows, &map, &fields).unwrap();
        let patch = &grouped[&(2024, 1)][0];
        assert!(patch.values.contains_key("revenue"));
        assert!(!patch.values.contains_key("cost"));
    }

    #[test]
    fn test_read_rows_round_trip() {
        let csv = "日付,売上\n2024-01-01,100000\n2024-01-02,120000\n";
        let (headers, rows) = read_rows(csv.as_bytes()).unwrap();
        assert_eq!(headers, vec!["日付", "売上"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["2024-01-01", "100000"]);
    }

    #[test]
    fn test_export_includes_visible_daily_fields() {
        use crate::record::DailyRecord;
        let fields = standard_restaurant_fields();
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut record = DailyRecord::new(date);
        record.set("revenue", 100000.0);
        record.set("memo", "opening day");
        let mut daily = BTreeMap::new();
        daily.insert(date, record);

        let csv = export_csv(&daily, &fields);
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("日付"));
        assert!(header.contains("売上"));
        assert!(header.contains("備考"));
        let first = lines.next().unwrap();
        assert!(first.starts_with("2024-01-01"));
        assert!(first.contains("100000"));
        assert!(first.contains("opening day"));
    }
}
