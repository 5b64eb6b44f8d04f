use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{ncsr_table_rows, ncsr_tables};

/// Table extracted from a filing, with preserved HTML and grid dimensions
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = ncsr_tables)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NcsrTable {
    pub id: i32,
    pub filing_id: i32,
    pub table_type: String,
    pub caption: Option<String>,
    pub table_html: String,
    pub row_count: i32,
    pub column_count: i32,
}

/// New table for insertion
#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = ncsr_tables)]
pub struct NewNcsrTable {
    pub filing_id: i32,
    pub table_type: String,
    pub caption: Option<String>,
    pub table_html: String,
    pub row_count: i32,
    pub column_count: i32,
}

/// One scalar cell of a table, long-form: (row, column name, value, type)
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = ncsr_table_rows)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NcsrTableRow {
    pub id: i32,
    pub table_id: i32,
    pub row_index: i32,
    pub col_name: String,
    pub col_value: String,
    pub col_type: String,
}

/// New long-form cell for insertion
#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = ncsr_table_rows)]
pub struct NewNcsrTableRow {
    pub table_id: i32,
    pub row_index: i32,
    pub col_name: String,
    pub col_value: String,
    pub col_type: String,
}

/// Inferred type of a table cell value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnType {
    Currency,
    Percentage,
    Number,
    Date,
    Text,
    Null,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Currency => write!(f, "currency"),
            ColumnType::Percentage => write!(f, "percentage"),
            ColumnType::Number => write!(f, "number"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Null => write!(f, "null"),
        }
    }
}

impl From<String> for ColumnType {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "currency" => ColumnType::Currency,
            "percentage" => ColumnType::Percentage,
            "number" => ColumnType::Number,
            "date" => ColumnType::Date,
            "null" => ColumnType::Null,
            _ => ColumnType::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_round_trip() {
        for col_type in [
            ColumnType::Currency,
            ColumnType::Percentage,
            ColumnType::Number,
            ColumnType::Date,
            ColumnType::Text,
            ColumnType::Null,
        ] {
            assert_eq!(ColumnType::from(col_type.to_string()), col_type);
        }
    }
}
