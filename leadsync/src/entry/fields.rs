//! Custom-field catalogue of the insurance-sales account.
//!
//! Paths are relative to the lead's JSON tree (see [`crate::Lead::as_value`]).
//! Select-type custom fields arrive as arrays of `{ id, name }` options, so
//! their display value sits at `.0.name`.
//!
//! A lead may bundle a second policy; its fields mirror the primary ones
//! under their own keys.

/// First contact's display name
pub const CLIENT_NAME: &str = "contacts.0.name";

/// Bank the policy is issued for (select)
pub const BANK: &str = "cf_9104.0.name";

/// Cashback paid back to the client, primary policy
pub const CASHBACK: &str = "cf_9120";

/// Agent amount of the primary policy when a second policy exists
pub const AGENT_AMOUNT: &str = "cf_9121";

/// Fields describing one policy
#[derive(Debug, Clone, Copy)]
pub struct PolicyFields {
    pub number: &'static str,
    /// Multi-select of coverage kinds
    pub kind: &'static str,
    pub insurer: &'static str,
    pub start: &'static str,
}

pub mod primary {
    use super::PolicyFields;

    pub const POLICY: PolicyFields = PolicyFields {
        number: "cf_9101",
        kind: "cf_9102",
        insurer: "cf_9103.0.name",
        start: "cf_9105",
    };
}

pub mod secondary {
    use super::PolicyFields;

    pub const POLICY: PolicyFields = PolicyFields {
        number: "cf_9111",
        kind: "cf_9112",
        insurer: "cf_9113.0.name",
        start: "cf_9115",
    };

    /// Premium of the second policy
    pub const PREMIUM: &str = "cf_9116";

    /// Cashback of the second policy
    pub const CASHBACK: &str = "cf_9126";

    /// Agent amount of the second policy
    pub const AGENT_AMOUNT: &str = "cf_9122";

    /// Either of these being non-null means the lead carries a second policy
    pub const TRIGGERS: [&str; 2] = [POLICY.number, PREMIUM];
}

/// Pipeline whose leads are renewals
pub const PROLONGATION_PIPELINE: &str = "пролонгация";
