use crate::collection::CollectionController;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AssetKind, InventoryDraft, InventoryItem, Investment, InvestmentDraft, Priority, Task, TaskDraft,
};
use crate::record::Record;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// A record kind that can be exported to and imported from CSV.
///
/// Export writes every column in `COLUMNS`; import looks columns up by header
/// name, so missing optional trailing columns are tolerated and identity
/// columns (`id`, `createdAt`) are ignored in favour of fresh values.
pub trait CsvRecord: Record {
    const COLUMNS: &'static [&'static str];

    fn to_row(&self) -> Vec<String>;
    fn draft_from_row(row: &CsvRow<'_>) -> Result<Self::Draft, String>;
}

pub struct CsvRow<'a> {
    line: usize,
    columns: &'a HashMap<String, usize>,
    fields: &'a [String],
}

impl<'a> CsvRow<'a> {
    pub fn line(&self) -> usize {
        self.line
    }

    /// Trimmed value; `None` when the column is absent or blank.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let index = *self.columns.get(&column.to_ascii_lowercase())?;
        let fields: &'a [String] = self.fields;
        fields
            .get(index)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn required(&self, column: &str) -> Result<&'a str, String> {
        self.get(column)
            .ok_or_else(|| format!("missing required field '{}'", column))
    }

    pub fn parse<T: FromStr>(&self, column: &str) -> Result<Option<T>, String> {
        match self.get(column) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| format!("unparseable {} '{}'", column, raw)),
        }
    }

    pub fn date(&self, column: &str) -> Result<Option<NaiveDate>, String> {
        match self.get(column) {
            None => Ok(None),
            Some(raw) => parse_date(raw)
                .map(Some)
                .ok_or_else(|| format!("unparseable {} '{}'", column, raw)),
        }
    }

    pub fn flag(&self, column: &str) -> Result<bool, String> {
        match self.get(column) {
            None => Ok(false),
            Some(raw) => parse_flag(raw).ok_or_else(|| format!("unparseable {} '{}'", column, raw)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRow {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: Vec<SkippedRow>,
}

pub fn export_csv<R: CsvRecord>(records: &[R]) -> String {
    let mut out = R::COLUMNS.join(",");
    out.push('\n');
    for record in records {
        let line = record
            .to_row()
            .iter()
            .map(|value| quote(value))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Adds every valid row to `controller` in one batch. Rows that fail to parse
/// or validate are skipped and reported with their 1-based line number.
pub fn import_csv<R: CsvRecord>(controller: &mut CollectionController<R>, text: &str) -> AppResult<ImportReport> {
    let mut rows = parse_csv(text).into_iter();
    let Some((_, header)) = rows.next() else {
        return Err(AppError::Validation("CSV input is empty".to_string()));
    };

    let columns: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .map(|(index, name)| (name.trim().to_ascii_lowercase(), index))
        .collect();
    let recognized = R::COLUMNS
        .iter()
        .any(|column| columns.contains_key(&column.to_ascii_lowercase()));
    if !recognized {
        return Err(AppError::Validation(format!(
            "CSV header does not match {} columns ({})",
            R::KIND,
            R::COLUMNS.join(",")
        )));
    }

    let mut drafts = Vec::new();
    let mut draft_lines = Vec::new();
    let mut skipped = Vec::new();
    for (line, fields) in rows {
        let row = CsvRow {
            line,
            columns: &columns,
            fields: &fields,
        };
        match R::draft_from_row(&row) {
            Ok(draft) => {
                drafts.push(draft);
                draft_lines.push(line);
            }
            Err(reason) => {
                tracing::debug!(kind = R::KIND, line, reason = %reason, "skipping CSV row");
                skipped.push(SkippedRow { line, reason });
            }
        }
    }

    let outcome = controller.add_many(drafts);
    for (index, errors) in outcome.rejected {
        let line = draft_lines.get(index).copied().unwrap_or_default();
        tracing::debug!(kind = R::KIND, line, errors = %errors, "skipping invalid CSV row");
        skipped.push(SkippedRow {
            line,
            reason: errors.to_string(),
        });
    }
    skipped.sort_by_key(|row| row.line);

    tracing::info!(
        kind = R::KIND,
        imported = outcome.added.len(),
        skipped = skipped.len(),
        "CSV import finished"
    );
    Ok(ImportReport {
        imported: outcome.added.len(),
        skipped,
    })
}

/// Splits CSV text into records, each tagged with the line it starts on.
/// Quoted fields may contain commas, doubled quotes and newlines. Blank lines
/// are dropped.
pub fn parse_csv(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut rows = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut row_start = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push('\n');
                }
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                push_row(&mut rows, row_start, std::mem::take(&mut fields));
                line += 1;
                row_start = line;
            }
            _ => field.push(ch),
        }
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        push_row(&mut rows, row_start, fields);
    }
    rows
}

fn push_row(rows: &mut Vec<(usize, Vec<String>)>, line: usize, fields: Vec<String>) {
    if fields.iter().all(|field| field.trim().is_empty()) {
        return;
    }
    rows.push((line, fields));
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "x" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn optional_text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

impl CsvRecord for Task {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "text",
        "completed",
        "priority",
        "dueDate",
        "category",
        "createdAt",
        "completedAt",
    ];

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.text.clone(),
            self.completed.to_string(),
            self.priority.as_str().to_string(),
            self.due_date.map(|date| date.to_string()).unwrap_or_default(),
            optional_text(self.category.as_deref()),
            self.created_at.to_rfc3339(),
            self.completed_at.map(|at| at.to_rfc3339()).unwrap_or_default(),
        ]
    }

    fn draft_from_row(row: &CsvRow<'_>) -> Result<TaskDraft, String> {
        let priority = match row.get("priority") {
            None => Priority::default(),
            Some(raw) => Priority::parse(raw).ok_or_else(|| format!("unknown priority '{}'", raw))?,
        };
        Ok(TaskDraft {
            text: row.required("text")?.to_string(),
            completed: row.flag("completed")?,
            priority,
            due_date: row.date("dueDate")?,
            category: row.get("category").map(ToString::to_string),
        })
    }
}

impl CsvRecord for InventoryItem {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "sku",
        "quantity",
        "unitPrice",
        "category",
        "reorderLevel",
        "discontinued",
        "createdAt",
    ];

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.sku.clone(),
            self.quantity.to_string(),
            self.unit_price.to_string(),
            optional_text(self.category.as_deref()),
            self.reorder_level.to_string(),
            self.discontinued.to_string(),
            self.created_at.to_rfc3339(),
        ]
    }

    fn draft_from_row(row: &CsvRow<'_>) -> Result<InventoryDraft, String> {
        let unit_price: f64 = row
            .parse("unitPrice")?
            .ok_or_else(|| "missing required field 'unitPrice'".to_string())?;
        Ok(InventoryDraft {
            name: row.required("name")?.to_string(),
            sku: row.required("sku")?.to_string(),
            quantity: row.parse("quantity")?.unwrap_or(0),
            unit_price,
            category: row.get("category").map(ToString::to_string),
            reorder_level: row.parse("reorderLevel")?.unwrap_or(0),
            discontinued: row.flag("discontinued")?,
        })
    }
}

impl CsvRecord for Investment {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "symbol",
        "name",
        "kind",
        "shares",
        "purchasePrice",
        "currentPrice",
        "purchaseDate",
        "notes",
        "createdAt",
    ];

    fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.symbol.clone(),
            self.name.clone(),
            self.kind.as_str().to_string(),
            self.shares.to_string(),
            self.purchase_price.to_string(),
            self.current_price.to_string(),
            self.purchase_date.to_string(),
            optional_text(self.notes.as_deref()),
            self.created_at.to_rfc3339(),
        ]
    }

    fn draft_from_row(row: &CsvRow<'_>) -> Result<InvestmentDraft, String> {
        let symbol = row.required("symbol")?;
        let kind = match row.get("kind") {
            None => AssetKind::default(),
            Some(raw) => AssetKind::parse(raw).ok_or_else(|| format!("unknown kind '{}'", raw))?,
        };
        Ok(InvestmentDraft {
            symbol: symbol.to_string(),
            name: row.get("name").unwrap_or(symbol).to_string(),
            kind,
            shares: row
                .parse("shares")?
                .ok_or_else(|| "missing required field 'shares'".to_string())?,
            purchase_price: row
                .parse("purchasePrice")?
                .ok_or_else(|| "missing required field 'purchasePrice'".to_string())?,
            current_price: row.parse("currentPrice")?,
            purchase_date: row
                .date("purchaseDate")?
                .ok_or_else(|| "missing required field 'purchaseDate'".to_string())?,
            notes: row.get("notes").map(ToString::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{export_csv, import_csv, parse_csv, parse_date};
    use crate::collection::CollectionController;
    use crate::models::{InventoryItem, Investment, Task, TaskDraft};
    use crate::store::PersistentStore;

    fn tasks() -> CollectionController<Task> {
        CollectionController::open(PersistentStore::in_memory(), "tasks")
    }

    #[test]
    fn parser_handles_quotes_newlines_and_blank_lines() {
        let rows = parse_csv("a,b\r\n\"x, y\",\"say \"\"hi\"\"\"\n\n\"multi\nline\",z");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], (1, vec!["a".to_string(), "b".to_string()]));
        assert_eq!(rows[1].1, vec!["x, y".to_string(), "say \"hi\"".to_string()]);
        assert_eq!(rows[2].0, 4);
        assert_eq!(rows[2].1[0], "multi\nline");
    }

    #[test]
    fn export_quotes_every_value() {
        let mut controller = tasks();
        controller.add(TaskDraft::new("say \"hi\", then go")).expect("add");
        let csv = export_csv(controller.records());
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("id,text,completed,priority,dueDate,category,createdAt,completedAt")
        );
        assert!(lines.next().unwrap_or_default().contains("\"say \"\"hi\"\", then go\""));
    }

    #[test]
    fn import_skips_invalid_rows_but_keeps_valid_ones() {
        let mut controller = tasks();
        let csv = "text,completed,priority,dueDate\n\
                   Buy milk,false,high,2026-04-01\n\
                   ,false,low,\n\
                   Pay rent,yes,,04/30/2026\n\
                   Bad date,no,,tomorrow\n\
                   Short row\n";
        let report = import_csv(&mut controller, csv).expect("import");

        assert_eq!(report.imported, 3);
        let lines: Vec<_> = report.skipped.iter().map(|row| row.line).collect();
        assert_eq!(lines, vec![3, 5]);
        assert!(report.skipped[0].reason.contains("text"));

        let rent = controller
            .records()
            .iter()
            .find(|task| task.text == "Pay rent")
            .expect("imported");
        assert!(rent.completed);
        assert!(rent.completed_at.is_some());
        assert_eq!(rent.due_date, parse_date("2026-04-30"));
    }

    #[test]
    fn round_trip_through_csv_preserves_fields() {
        let mut source = tasks();
        let mut draft = TaskDraft::new("Water plants");
        draft.category = Some("home".to_string());
        draft.due_date = parse_date("2026-07-04");
        source.add(draft).expect("add");
        let csv = export_csv(source.records());

        let mut target = tasks();
        let report = import_csv(&mut target, &csv).expect("import");
        assert_eq!(report.imported, 1);
        let imported = &target.records()[0];
        let original = &source.records()[0];
        assert_ne!(imported.id, original.id);
        assert_eq!(imported.text, original.text);
        assert_eq!(imported.category, original.category);
        assert_eq!(imported.due_date, original.due_date);
    }

    #[test]
    fn inventory_and_investment_rows_validate_numbers() {
        let mut items = CollectionController::<InventoryItem>::open(PersistentStore::in_memory(), "items");
        let report = import_csv(
            &mut items,
            "name,sku,quantity,unitPrice\nBolt,B-1,10,0.25\nNut,N-1,lots,0.1\nWasher,W 1,5,0.05\n",
        )
        .expect("import");
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped.len(), 2);

        let mut positions = CollectionController::<Investment>::open(PersistentStore::in_memory(), "inv");
        let report = import_csv(
            &mut positions,
            "symbol,shares,purchasePrice,purchaseDate\nacme,3,10.5,2026-01-05\nxyz,,1,2026-01-05\n",
        )
        .expect("import");
        assert_eq!(report.imported, 1);
        assert_eq!(positions.records()[0].symbol, "ACME");
        assert_eq!(positions.records()[0].name, "acme");
        assert_eq!(positions.records()[0].current_price, 10.5);
    }

    #[test]
    fn unrelated_header_is_rejected() {
        let mut controller = tasks();
        assert!(import_csv(&mut controller, "foo,bar\n1,2\n").is_err());
        assert!(import_csv(&mut controller, "").is_err());
    }
}
