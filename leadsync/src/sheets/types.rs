//! Destination columns, cell values and loaded sheet data

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

/// How a column's displayed text is read back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Number,
    Bool,
}

/// The fixed set of destination columns
///
/// Declaration order is the order rows are built in; the actual position of
/// each column in a sheet comes from that sheet's header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Id,
    Link,
    ArrivedAt,
    Manager,
    Client,
    Pipeline,
    Stage,
    Bank,
    Insurer,
    PolicyType,
    PolicyNumber,
    PolicyStart,
    Premium,
    Cashback,
    AgentAmount,
    AgentPercent,
    Prolongation,
}

impl Column {
    pub const ALL: [Column; 17] = [
        Column::Id,
        Column::Link,
        Column::ArrivedAt,
        Column::Manager,
        Column::Client,
        Column::Pipeline,
        Column::Stage,
        Column::Bank,
        Column::Insurer,
        Column::PolicyType,
        Column::PolicyNumber,
        Column::PolicyStart,
        Column::Premium,
        Column::Cashback,
        Column::AgentAmount,
        Column::AgentPercent,
        Column::Prolongation,
    ];

    /// Header label in the template sheet
    pub fn header(self) -> &'static str {
        match self {
            Column::Id => "ID",
            Column::Link => "Ссылка",
            Column::ArrivedAt => "Дата",
            Column::Manager => "Менеджер",
            Column::Client => "Клиент",
            Column::Pipeline => "Воронка",
            Column::Stage => "Этап",
            Column::Bank => "Банк",
            Column::Insurer => "Страховая",
            Column::PolicyType => "Тип",
            Column::PolicyNumber => "Номер полиса",
            Column::PolicyStart => "Начало полиса",
            Column::Premium => "Премия",
            Column::Cashback => "Кэшбэк",
            Column::AgentAmount => "Агентское",
            Column::AgentPercent => "Процент",
            Column::Prolongation => "Пролонгация",
        }
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            Column::Premium | Column::Cashback | Column::AgentAmount | Column::AgentPercent => ColumnKind::Number,
            Column::Prolongation => ColumnKind::Bool,
            _ => ColumnKind::Text,
        }
    }

    /// Match a header cell, ignoring surrounding whitespace and case
    pub fn from_header(header: &str) -> Option<Column> {
        let wanted = header.trim().to_lowercase();
        Column::ALL.into_iter().find(|c| c.header().to_lowercase() == wanted)
    }

    /// Whether drift in this column marks an existing row for update
    ///
    /// The id and link never change for a lead; stage and percentage are
    /// derived and may be edited by hand.
    pub fn is_tracked(self) -> bool {
        !matches!(self, Column::Id | Column::Link | Column::Stage | Column::AgentPercent)
    }
}

/// A primitive cell value
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// Text value; empty text is `Null`
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() { CellValue::Null } else { CellValue::Text(s) }
    }

    /// Read a displayed cell back into a typed value
    ///
    /// Numbers drop whitespace grouping and accept a decimal comma; booleans
    /// are true only for the literal `TRUE`. Empty cells are `Null`.
    /// Unparseable numbers stay as text so they compare unequal.
    pub fn parse(kind: ColumnKind, raw: &str) -> Self {
        if raw.trim().is_empty() {
            return CellValue::Null;
        }
        match kind {
            ColumnKind::Text => CellValue::Text(raw.to_string()),
            ColumnKind::Bool => CellValue::Bool(raw.trim().eq_ignore_ascii_case("true")),
            ColumnKind::Number => {
                let normalized: String = raw
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .map(|c| if c == ',' { '.' } else { c })
                    .collect();
                let normalized = normalized.trim_end_matches('%');
                match normalized.parse::<f64>() {
                    Ok(n) => CellValue::Number(n),
                    Err(_) => CellValue::Text(raw.to_string()),
                }
            }
        }
    }

    /// JSON form sent to the spreadsheet
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::String(String::new()),
            CellValue::Text(s) => Value::String(s.clone()),
            CellValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(n.to_string())),
            CellValue::Bool(b) => Value::Bool(*b),
        }
    }
}

/// A destination row keyed by column
pub type Row = BTreeMap<Column, CellValue>;

/// One data row as loaded from a sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 1-based row number in the sheet
    pub number: usize,
    /// Displayed cell text, in sheet column order
    pub cells: Vec<String>,
}

/// Header and data rows of a sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetData {
    pub header: Vec<String>,
    pub rows: Vec<SheetRow>,
}

impl SheetData {
    /// Position of every known column present in the header
    pub fn layout(&self) -> ColumnLayout {
        ColumnLayout::from_header(&self.header)
    }
}

/// Where each known column sits in a particular sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnLayout {
    positions: HashMap<Column, usize>,
    width: usize,
}

impl ColumnLayout {
    pub fn from_header(header: &[String]) -> Self {
        let mut positions = HashMap::new();
        for (index, label) in header.iter().enumerate() {
            if let Some(column) = Column::from_header(label) {
                positions.entry(column).or_insert(index);
            }
        }
        Self {
            positions,
            width: header.len(),
        }
    }

    pub fn position(&self, column: Column) -> Option<usize> {
        self.positions.get(&column).copied()
    }

    pub fn contains(&self, column: Column) -> bool {
        self.positions.contains_key(&column)
    }

    /// Typed view of a loaded row; columns missing from the header are skipped
    pub fn parse_row(&self, row: &SheetRow) -> Row {
        self.positions
            .iter()
            .map(|(&column, &index)| {
                let raw = row.cells.get(index).map(String::as_str).unwrap_or("");
                (column, CellValue::parse(column.kind(), raw))
            })
            .collect()
    }

    /// Cells of `row` laid out in sheet order, blanks where the sheet has
    /// columns this program does not know
    pub fn render(&self, row: &Row) -> Vec<CellValue> {
        let mut cells = vec![CellValue::Null; self.width];
        for (&column, &index) in &self.positions {
            if let Some(value) = row.get(&column) {
                cells[index] = value.clone();
            }
        }
        cells
    }
}

/// A1 column letters for a 0-based index
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}
