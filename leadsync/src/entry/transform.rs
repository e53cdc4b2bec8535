//! Lead to row transformation

use chrono_tz::Tz;
use serde_json::Value;
use tracing::debug;

use super::dates::{format_field_date, format_timestamp, sheet_name};
use super::fields::{self, PolicyFields};
use super::path::{get_path, get_path_or, get_str};
use super::{Entry, EntryData};
use crate::crm::Lead;
use crate::fetch::Directory;

/// Shown when a lead has no named contact
pub const CLIENT_PLACEHOLDER: &str = "Без имени";

/// Knobs that affect rendering only
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub timezone: Tz,
    /// Prefix of a lead's web page; the lead id is appended
    pub lead_url: String,
}

/// Build the entry for one lead
///
/// Pure: the result depends only on the lead, the directory and the options.
pub fn create_entry_from_lead(lead: &Lead, directory: &Directory, options: &TransformOptions) -> Entry {
    let tree = lead.as_value();
    let has_secondary = fields::secondary::TRIGGERS
        .iter()
        .any(|path| get_path(&tree, path).is_some());
    debug!(lead_id = lead.id, has_secondary, "create_entry_from_lead: called");

    let premium = parse_money(&Value::String(lead.budget.clone()));
    let cashback = money_at(&tree, fields::CASHBACK);
    let agent_amount = if has_secondary {
        money_at(&tree, fields::AGENT_AMOUNT)
    } else {
        premium.saturating_sub(cashback)
    };

    let pipeline = directory
        .pipeline(lead.pipeline_id)
        .map(|p| p.name.clone())
        .unwrap_or_default();

    let primary = EntryData {
        id: lead.id.to_string(),
        link: hyperlink(&options.lead_url, lead.id),
        arrived_at: format_timestamp(lead.arrived_stage_at, options.timezone),
        manager: manager_name(lead, directory),
        client: get_str(&tree, fields::CLIENT_NAME).unwrap_or_else(|| CLIENT_PLACEHOLDER.to_string()),
        prolongation: pipeline.trim().to_lowercase() == fields::PROLONGATION_PIPELINE,
        pipeline,
        stage: directory
            .stage(lead.stages_id)
            .map(|s| s.name.clone())
            .unwrap_or_default(),
        bank: get_str(&tree, fields::BANK).unwrap_or_default(),
        premium,
        cashback,
        agent_amount,
        agent_percent: percent(agent_amount, premium),
        ..policy_data(&tree, &fields::primary::POLICY, options.timezone)
    };

    let secondary = has_secondary.then(|| {
        let premium = money_at(&tree, fields::secondary::PREMIUM);
        let agent_amount = money_at(&tree, fields::secondary::AGENT_AMOUNT);
        let overlay = policy_data(&tree, &fields::secondary::POLICY, options.timezone);
        EntryData {
            id: format!("{}-2", lead.id),
            policy_number: overlay.policy_number,
            policy_type: overlay.policy_type,
            insurer: overlay.insurer,
            policy_start: overlay.policy_start,
            premium,
            cashback: money_at(&tree, fields::secondary::CASHBACK),
            agent_amount,
            agent_percent: percent(agent_amount, premium),
            ..primary.clone()
        }
    });

    Entry {
        sheet: sheet_name(lead.arrived_stage_at, options.timezone),
        primary,
        secondary,
    }
}

/// Policy-specific fields; everything else is left at its default
fn policy_data(tree: &Value, policy: &PolicyFields, tz: Tz) -> EntryData {
    EntryData {
        policy_number: get_str(tree, policy.number).unwrap_or_default(),
        policy_type: policy_type(get_path_or(tree, policy.kind, &Value::Null)),
        insurer: get_str(tree, policy.insurer).unwrap_or_default(),
        policy_start: format_field_date(get_path(tree, policy.start), tz),
        ..EntryData::default()
    }
}

/// First word of the owning user's name
fn manager_name(lead: &Lead, directory: &Directory) -> String {
    lead.user_id
        .and_then(|id| directory.user(id))
        .and_then(|user| user.name.split_whitespace().next())
        .unwrap_or_default()
        .to_string()
}

fn hyperlink(lead_url: &str, id: i64) -> String {
    format!("=HYPERLINK(\"{}{}\";\"{}\")", lead_url, id, id)
}

/// Translate one selected coverage option
fn policy_kind_code(name: &str) -> String {
    match name.trim().to_uppercase().as_str() {
        "ЖИЗНЬ" => "Ж".to_string(),
        "ИМУЩЕСТВО" => "И".to_string(),
        "ЖИЗНЬ И ИМУЩЕСТВО" => "ЖИ".to_string(),
        _ => name.to_string(),
    }
}

/// Coverage codes of a multi-select value, comma-joined
///
/// The trailing `"Ж, И"` → `"ЖИ"` rewrite only fires when life precedes
/// property in the selection; `"И, Ж"` is left as is.
pub fn policy_type(selected: &Value) -> String {
    let names: Vec<String> = match selected {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(_) => get_str(item, "name"),
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    };

    names
        .iter()
        .map(|name| policy_kind_code(name))
        .collect::<Vec<_>>()
        .join(", ")
        .replace("Ж, И", "ЖИ")
}

fn money_at(tree: &Value, path: &str) -> i64 {
    get_path(tree, path).map(parse_money).unwrap_or(0)
}

/// Integer amount of a string or number field, 0 when absent or non-numeric
///
/// Strings are read up to the first character that is not a digit, after
/// dropping whitespace grouping, so `"10 000.50"` is 10000.
pub fn parse_money(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)).unwrap_or(0),
        Value::String(s) => {
            let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
            let (sign, digits) = match compact.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, compact.strip_prefix('+').unwrap_or(&compact)),
            };
            let leading: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
            leading.parse::<i64>().map(|n| sign * n).unwrap_or(0)
        }
        _ => 0,
    }
}

fn percent(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 10_000.0).round() / 100.0
}
