//! Diff target rows against destination sheets and apply the difference
//!
//! Rows are matched on the business id column. Missing rows are appended in
//! one batch per sheet; rows whose tracked columns drifted are overwritten in
//! place. Nothing is ever deleted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use eyre::{Context, Result, eyre};
use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::retry::{RetryPolicy, with_retry};
use crate::sheets::{CellValue, Column, ColumnLayout, Row, SheetsApi, SheetsError};

/// Outcome of reconciling one sheet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SheetReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// A pending in-place overwrite
struct Update {
    row_number: usize,
    cells: Vec<(usize, CellValue)>,
}

pub struct Reconciler {
    sheets: Arc<dyn SheetsApi>,
    template_title: String,
    retry: RetryPolicy,
}

impl Reconciler {
    pub fn new(sheets: Arc<dyn SheetsApi>, template_title: impl Into<String>) -> Self {
        Self {
            sheets,
            template_title: template_title.into(),
            retry: RetryPolicy::none(),
        }
    }

    /// Retry spreadsheet calls with `policy`
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Make sure sheet `title` exists, cloning the template if needed
    ///
    /// Returns true when the sheet was created.
    pub async fn ensure_sheet(&self, title: &str) -> Result<bool> {
        debug!(%title, "Reconciler::ensure_sheet: called");
        let titles = self.call("sheet_titles", || self.sheets.sheet_titles()).await?;
        if titles.iter().any(|t| t == title) {
            return Ok(false);
        }
        if !titles.iter().any(|t| *t == self.template_title) {
            return Err(SheetsError::TemplateMissing(self.template_title.clone()).into());
        }

        info!(%title, template = %self.template_title, "Creating sheet from template");
        self.call("duplicate_sheet", || {
            self.sheets.duplicate_sheet(&self.template_title, title)
        })
        .await?;
        self.call("clear_sheet", || self.sheets.clear_sheet(title)).await?;
        Ok(true)
    }

    /// Bring sheet `title` in line with `rows`
    pub async fn reconcile_sheet(&self, title: &str, rows: &[Row]) -> Result<SheetReport> {
        debug!(%title, candidates = rows.len(), "Reconciler::reconcile_sheet: called");
        self.ensure_sheet(title).await?;

        let data = self.call("load_rows", || self.sheets.load_rows(title)).await?;
        let layout = data.layout();
        if !layout.contains(Column::Id) {
            return Err(eyre!(
                "Sheet '{}' has no '{}' column in its header",
                title,
                Column::Id.header()
            ));
        }

        let mut existing: HashMap<String, (usize, Row)> = HashMap::new();
        for sheet_row in &data.rows {
            let parsed = layout.parse_row(sheet_row);
            if let Some(id) = row_id(&parsed) {
                existing.entry(id).or_insert((sheet_row.number, parsed));
            }
        }

        let mut report = SheetReport::default();
        let mut seen = HashSet::new();
        let mut inserts = Vec::new();
        let mut updates = Vec::new();

        for candidate in rows {
            let Some(id) = row_id(candidate) else {
                warn!(%title, "Skipping row without an id");
                continue;
            };
            if !seen.insert(id.clone()) {
                debug!(%title, %id, "Reconciler::reconcile_sheet: duplicate id in batch");
                continue;
            }

            match existing.get(&id) {
                None => inserts.push(layout.render(candidate)),
                Some((row_number, stored)) if drifted(&layout, stored, candidate) => {
                    debug!(%title, %id, row_number, "Reconciler::reconcile_sheet: row drifted");
                    updates.push(Update {
                        row_number: *row_number,
                        cells: tracked_cells(&layout, candidate),
                    });
                }
                Some(_) => report.unchanged += 1,
            }
        }

        try_join_all(updates.iter().map(|update| {
            self.call("update_cells", || {
                self.sheets
                    .update_cells(title, update.row_number, update.cells.clone())
            })
        }))
        .await?;
        report.updated = updates.len();

        if !inserts.is_empty() {
            report.inserted = inserts.len();
            self.call("append_rows", || self.sheets.append_rows(title, inserts.clone()))
                .await?;
        }

        info!(
            %title,
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            "Reconciled sheet"
        );
        Ok(report)
    }

    /// Reconcile every group concurrently
    pub async fn reconcile(&self, groups: &BTreeMap<String, Vec<Row>>) -> Result<BTreeMap<String, SheetReport>> {
        debug!(sheets = groups.len(), "Reconciler::reconcile: called");
        let reports = try_join_all(groups.iter().map(|(title, rows)| async move {
            let report = self
                .reconcile_sheet(title, rows)
                .await
                .context(format!("Failed to reconcile sheet '{}'", title))?;
            Ok::<_, eyre::Report>((title.clone(), report))
        }))
        .await?;
        Ok(reports.into_iter().collect())
    }

    async fn call<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SheetsError>>,
    {
        with_retry(operation, &self.retry, f).await.map_err(|err| {
            if err.is_rate_limit() {
                warn!(operation, "Spreadsheet quota exhausted after retries");
            }
            eyre::Report::from(err)
        })
    }
}

fn row_id(row: &Row) -> Option<String> {
    match row.get(&Column::Id)? {
        CellValue::Text(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        CellValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn tracked_columns(layout: &ColumnLayout) -> impl Iterator<Item = (Column, usize)> + '_ {
    Column::ALL
        .into_iter()
        .filter(|c| c.is_tracked())
        .filter_map(|c| layout.position(c).map(|index| (c, index)))
}

fn same_value(stored: &CellValue, candidate: &CellValue) -> bool {
    match (stored, candidate) {
        (CellValue::Number(a), CellValue::Number(b)) => (a - b).abs() < 1e-9,
        (CellValue::Text(a), CellValue::Text(b)) => a.trim() == b.trim(),
        (a, b) => a == b,
    }
}

/// Whether any tracked column present in the sheet differs
fn drifted(layout: &ColumnLayout, stored: &Row, candidate: &Row) -> bool {
    tracked_columns(layout).any(|(column, _)| {
        let stored = stored.get(&column).unwrap_or(&CellValue::Null);
        let candidate = candidate.get(&column).unwrap_or(&CellValue::Null);
        !same_value(stored, candidate)
    })
}

fn tracked_cells(layout: &ColumnLayout, candidate: &Row) -> Vec<(usize, CellValue)> {
    tracked_columns(layout)
        .map(|(column, index)| (index, candidate.get(&column).cloned().unwrap_or(CellValue::Null)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryData;
    use crate::sheets::client::mock::{MockSheets, Write, display};
    use crate::sheets::{SheetRow, column_letter};

    const TEMPLATE: &str = "Шаблон";

    fn header() -> Vec<&'static str> {
        Column::ALL.iter().map(|c| c.header()).collect()
    }

    fn data(id: &str) -> EntryData {
        EntryData {
            id: id.to_string(),
            link: format!("=HYPERLINK(\"https://app.okocrm.com/leads/{}\";\"{}\")", id, id),
            arrived_at: "15.06.2024".to_string(),
            manager: "Андрей".to_string(),
            client: "Иванова Мария".to_string(),
            pipeline: "Первая покупка".to_string(),
            stage: "Полис оформлен".to_string(),
            bank: "Сбербанк".to_string(),
            insurer: "Ингосстрах".to_string(),
            policy_type: "ЖИ".to_string(),
            policy_number: "ИП-0042".to_string(),
            policy_start: "20.06.2024".to_string(),
            premium: 10000,
            cashback: 1500,
            agent_amount: 8500,
            agent_percent: 85.0,
            prolongation: false,
        }
    }

    /// Sheet text of `row` as it would display after being written
    fn displayed(row: &Row) -> Vec<String> {
        let header: Vec<String> = header().into_iter().map(str::to_string).collect();
        ColumnLayout::from_header(&header)
            .render(row)
            .iter()
            .map(display)
            .collect()
    }

    fn mock_with(title: &str, rows: &[Vec<String>]) -> Arc<MockSheets> {
        let mut all = vec![header()];
        all.extend(rows.iter().map(|r| r.iter().map(String::as_str).collect::<Vec<_>>()));
        Arc::new(
            MockSheets::default()
                .with_sheet(TEMPLATE, vec![header()])
                .with_sheet(title, all),
        )
    }

    fn reconciler(mock: &Arc<MockSheets>) -> Reconciler {
        Reconciler::new(mock.clone(), TEMPLATE)
    }

    #[tokio::test]
    async fn test_unchanged_row_is_not_written() {
        let row = data("501").to_row();
        let mock = mock_with("июнь 24", &[displayed(&row)]);

        let report = reconciler(&mock).reconcile_sheet("июнь 24", &[row]).await.unwrap();

        assert_eq!(
            report,
            SheetReport {
                inserted: 0,
                updated: 0,
                unchanged: 1
            }
        );
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_untracked_drift_is_ignored() {
        let stored = EntryData {
            stage: "Оплачено".to_string(),
            agent_percent: 12.5,
            ..data("501")
        };
        let mock = mock_with("июнь 24", &[displayed(&stored.to_row())]);

        let report = reconciler(&mock)
            .reconcile_sheet("июнь 24", &[data("501").to_row()])
            .await
            .unwrap();

        assert_eq!(report.unchanged, 1);
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_drifted_row_is_updated_in_place() {
        let stored = data("501");
        let mock = mock_with("июнь 24", &[displayed(&stored.to_row())]);
        let candidate = EntryData {
            premium: 12000,
            stage: "Оплачено".to_string(),
            ..data("501")
        };

        let report = reconciler(&mock)
            .reconcile_sheet("июнь 24", &[candidate.to_row()])
            .await
            .unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.inserted, 0);
        let writes = mock.writes();
        assert_eq!(writes.len(), 1);
        let Write::Update { row, cells, .. } = &writes[0] else {
            panic!("expected an update, got {:?}", writes[0]);
        };
        assert_eq!(*row, 2);
        let written: Vec<usize> = cells.iter().map(|(i, _)| *i).collect();
        for untouched in [Column::Id, Column::Link, Column::Stage, Column::AgentPercent] {
            let index = Column::ALL.iter().position(|c| *c == untouched).unwrap();
            assert!(!written.contains(&index), "{} was written", column_letter(index));
        }

        let sheet = mock.sheet("июнь 24").unwrap();
        let premium = Column::ALL.iter().position(|c| *c == Column::Premium).unwrap();
        let stage = Column::ALL.iter().position(|c| *c == Column::Stage).unwrap();
        assert_eq!(sheet[1][premium], "12000");
        assert_eq!(sheet[1][stage], "Полис оформлен");
    }

    #[tokio::test]
    async fn test_locale_formatted_numbers_compare_equal() {
        let row = data("501").to_row();
        let mut cells = displayed(&row);
        let premium = Column::ALL.iter().position(|c| *c == Column::Premium).unwrap();
        cells[premium] = "10 000,00".to_string();
        let mock = mock_with("июнь 24", &[cells]);

        let report = reconciler(&mock).reconcile_sheet("июнь 24", &[row]).await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_new_ids_appended_once_in_one_batch() {
        let mock = mock_with("июнь 24", &[displayed(&data("501").to_row())]);
        let rows = vec![
            data("501").to_row(),
            data("502").to_row(),
            data("502").to_row(),
            data("502-2").to_row(),
        ];

        let report = reconciler(&mock).reconcile_sheet("июнь 24", &rows).await.unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.unchanged, 1);
        let appends: Vec<_> = mock
            .writes()
            .into_iter()
            .filter(|w| matches!(w, Write::Append { .. }))
            .collect();
        assert_eq!(appends.len(), 1);
        assert_eq!(mock.sheet("июнь 24").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_first_matching_row_wins() {
        let stored = displayed(&data("501").to_row());
        let mut stale = stored.clone();
        let bank = Column::ALL.iter().position(|c| *c == Column::Bank).unwrap();
        stale[bank] = "ВТБ".to_string();
        let mock = mock_with("июнь 24", &[stored, stale]);

        let report = reconciler(&mock)
            .reconcile_sheet("июнь 24", &[data("501").to_row()])
            .await
            .unwrap();

        assert_eq!(report.unchanged, 1);
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_sheet_cloned_from_template_and_cleared() {
        let mock = Arc::new(
            MockSheets::default().with_sheet(TEMPLATE, vec![header(), vec!["образец"]]),
        );

        let created = reconciler(&mock).ensure_sheet("июль 24").await.unwrap();

        assert!(created);
        assert_eq!(
            mock.writes(),
            vec![
                Write::Duplicate {
                    source: TEMPLATE.to_string(),
                    title: "июль 24".to_string()
                },
                Write::Clear {
                    title: "июль 24".to_string()
                },
            ]
        );
        assert_eq!(mock.sheet("июль 24").unwrap().len(), 1);
        assert_eq!(mock.sheet(TEMPLATE).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_template_is_fatal() {
        let mock = Arc::new(MockSheets::default());

        let err = reconciler(&mock)
            .reconcile_sheet("июль 24", &[data("1").to_row()])
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SheetsError>(),
            Some(SheetsError::TemplateMissing(t)) if t == TEMPLATE
        ));
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_sheet_without_id_column_is_rejected() {
        let mock = Arc::new(MockSheets::default().with_sheet("июнь 24", vec![vec!["Клиент"]]));

        let err = reconciler(&mock)
            .reconcile_sheet("июнь 24", &[data("1").to_row()])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no 'ID' column"));
    }

    #[tokio::test]
    async fn test_reconcile_groups_reports_per_sheet() {
        let mock = mock_with("май 24", &[displayed(&data("400").to_row())]);
        let mut groups = BTreeMap::new();
        groups.insert("май 24".to_string(), vec![data("400").to_row()]);
        groups.insert("июнь 24".to_string(), vec![data("501").to_row(), data("502").to_row()]);

        let reports = reconciler(&mock).reconcile(&groups).await.unwrap();

        assert_eq!(reports["май 24"].unchanged, 1);
        assert_eq!(reports["июнь 24"].inserted, 2);
        assert_eq!(mock.sheet("июнь 24").unwrap().len(), 3);
    }

    #[test]
    fn test_row_id_trims() {
        let layout = ColumnLayout::from_header(&["ID".to_string()]);
        let row = layout.parse_row(&SheetRow {
            number: 2,
            cells: vec![" 77 ".to_string()],
        });
        assert_eq!(row_id(&row).as_deref(), Some("77"));
    }
}
