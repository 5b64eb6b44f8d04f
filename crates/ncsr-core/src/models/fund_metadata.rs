use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::fund_metadata;

/// **Fund Metadata Model**
///
/// At most one row per filing: the fund-level figures the parsers managed to
/// surface (net assets, NAV per share, expense ratio) plus the raw blob of
/// everything else they reported.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = fund_metadata)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FundMetadata {
    pub id: i32,
    pub filing_id: i32,

    /// Fund name from the filing headings
    pub fund_name: Option<String>,

    /// Total net assets in dollars
    pub total_net_assets: Option<BigDecimal>,

    /// Shares outstanding
    pub shares_outstanding: Option<i64>,

    /// Net asset value per share
    pub nav_per_share: Option<BigDecimal>,

    /// Expense ratio as a fraction
    pub expense_ratio: Option<BigDecimal>,

    /// Portfolio snapshot date
    pub portfolio_date: Option<NaiveDate>,

    /// Everything the parser reported, verbatim
    pub raw_data: Option<serde_json::Value>,
}

/// New fund metadata for insertion
#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = fund_metadata)]
pub struct NewFundMetadata {
    pub filing_id: i32,
    pub fund_name: Option<String>,
    pub total_net_assets: Option<BigDecimal>,
    pub shares_outstanding: Option<i64>,
    pub nav_per_share: Option<BigDecimal>,
    pub expense_ratio: Option<BigDecimal>,
    pub portfolio_date: Option<NaiveDate>,
    pub raw_data: Option<serde_json::Value>,
}
