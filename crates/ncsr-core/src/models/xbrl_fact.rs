use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::xbrl_facts;

/// **XBRL Fact Model**
///
/// One inline XBRL fact per row: the concept name, the (scaled) value, and
/// the context the fact was reported in. Attributes the parser does not model
/// explicitly land in `additional_attributes`.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = xbrl_facts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct XbrlFact {
    pub id: i32,
    pub filing_id: i32,

    /// Concept name from the `name` attribute, e.g. `us-gaap:NetAssets`
    pub concept: String,

    /// Fact value with scale applied for numeric facts
    pub value: Option<String>,

    /// Unit reference
    pub unit_ref: Option<String>,

    /// Context reference binding the fact to a period and entity
    pub context_ref: Option<String>,

    /// Period boundaries resolved from the referenced context
    pub period_start_date: Option<NaiveDate>,
    pub period_end_date: Option<NaiveDate>,
    pub period_instant: Option<NaiveDate>,

    /// Entity identifier (CIK) from the context
    pub entity_identifier: Option<String>,

    /// Decimals attribute; null when the filing declared INF
    pub decimals: Option<i32>,

    /// Scale attribute as declared
    pub scale: Option<i32>,

    /// Precision attribute as declared
    pub precision: Option<i32>,

    /// Remaining attributes, verbatim
    pub additional_attributes: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

/// New XBRL fact for insertion
#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = xbrl_facts)]
pub struct NewXbrlFact {
    pub filing_id: i32,
    pub concept: String,
    pub value: Option<String>,
    pub unit_ref: Option<String>,
    pub context_ref: Option<String>,
    pub period_start_date: Option<NaiveDate>,
    pub period_end_date: Option<NaiveDate>,
    pub period_instant: Option<NaiveDate>,
    pub entity_identifier: Option<String>,
    pub decimals: Option<i32>,
    pub scale: Option<i32>,
    pub precision: Option<i32>,
    pub additional_attributes: Option<serde_json::Value>,
}
