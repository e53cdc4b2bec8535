//! Flattened, spreadsheet-ready view of a lead

pub mod dates;
pub mod fields;
pub mod path;
mod transform;

pub use path::{get_path, get_path_or, get_str};
pub use transform::{CLIENT_PLACEHOLDER, TransformOptions, create_entry_from_lead, parse_money, policy_type};

use crate::sheets::{CellValue, Column, Row};

/// One exported row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryData {
    /// Business identifier: the lead id, or `<lead id>-2` for a second policy
    pub id: String,
    /// Sheet formula linking to the lead in the CRM
    pub link: String,
    pub arrived_at: String,
    pub manager: String,
    pub client: String,
    pub pipeline: String,
    pub stage: String,
    pub bank: String,
    pub insurer: String,
    pub policy_type: String,
    pub policy_number: String,
    pub policy_start: String,
    pub premium: i64,
    pub cashback: i64,
    pub agent_amount: i64,
    pub agent_percent: f64,
    pub prolongation: bool,
}

impl EntryData {
    pub fn to_row(&self) -> Row {
        Column::ALL
            .into_iter()
            .map(|column| {
                let value = match column {
                    Column::Id => CellValue::text(&self.id),
                    Column::Link => CellValue::text(&self.link),
                    Column::ArrivedAt => CellValue::text(&self.arrived_at),
                    Column::Manager => CellValue::text(&self.manager),
                    Column::Client => CellValue::text(&self.client),
                    Column::Pipeline => CellValue::text(&self.pipeline),
                    Column::Stage => CellValue::text(&self.stage),
                    Column::Bank => CellValue::text(&self.bank),
                    Column::Insurer => CellValue::text(&self.insurer),
                    Column::PolicyType => CellValue::text(&self.policy_type),
                    Column::PolicyNumber => CellValue::text(&self.policy_number),
                    Column::PolicyStart => CellValue::text(&self.policy_start),
                    Column::Premium => CellValue::Number(self.premium as f64),
                    Column::Cashback => CellValue::Number(self.cashback as f64),
                    Column::AgentAmount => CellValue::Number(self.agent_amount as f64),
                    Column::AgentPercent => CellValue::Number(self.agent_percent),
                    Column::Prolongation => CellValue::Bool(self.prolongation),
                };
                (column, value)
            })
            .collect()
    }
}

/// Everything derived from one lead in one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Destination sheet title
    pub sheet: String,
    pub primary: EntryData,
    /// Second policy bundled in the same lead
    pub secondary: Option<EntryData>,
}

impl Entry {
    /// Primary row, then the secondary one if present
    pub fn rows(&self) -> Vec<Row> {
        std::iter::once(&self.primary)
            .chain(self.secondary.as_ref())
            .map(EntryData::to_row)
            .collect()
    }
}
