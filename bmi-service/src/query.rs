//! SQL for the BMI category distribution.
//!
//! The state code only ever travels as a bound parameter; the statement text
//! is one of two fixed shapes.

use serde::Serialize;
use sqlx::mysql::MySqlRow;
use sqlx::{FromRow, Row};

pub const TABLE: &str = "brfss_microdata";
pub const CATEGORY_COLUMN: &str = "_BMI5CAT";
pub const STATE_COLUMN: &str = "_STATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidState;

/// Optional geographic restriction. `None` means all regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateFilter(pub Option<i64>);

impl StateFilter {
    /// Parses the raw `state` query value. Absent or empty input selects all
    /// regions; anything else, whitespace-only included, must be a base-10
    /// integer, optionally padded with whitespace.
    pub fn parse(raw: Option<&str>) -> Result<Self, InvalidState> {
        match raw {
            None | Some("") => Ok(StateFilter(None)),
            Some(s) => s
                .trim()
                .parse::<i64>()
                .map(|code| StateFilter(Some(code)))
                .map_err(|_| InvalidState),
        }
    }
}

/// One aggregated output row.
///
/// The category column is expected to hold integer codes, but it may be
/// stored as a signed or unsigned integer or as a floating-point type. Any of
/// these decodes as long as the value is integral and fits in `i64`.
/// `DECIMAL` columns are not supported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BmiDistributionRow {
    #[serde(rename = "_BMI5CAT")]
    pub category: Option<i64>,
    pub count: i64,
}

impl<'r> FromRow<'r, MySqlRow> for BmiDistributionRow {
    fn from_row(row: &'r MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(BmiDistributionRow {
            category: decode_category(row)?,
            count: row.try_get("count")?,
        })
    }
}

fn decode_category(row: &MySqlRow) -> Result<Option<i64>, sqlx::Error> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(CATEGORY_COLUMN) {
        return Ok(v);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(CATEGORY_COLUMN) {
        return v.map(unsigned_code).transpose();
    }
    let v: Option<f64> = row.try_get(CATEGORY_COLUMN)?;
    v.map(float_code).transpose()
}

fn unsigned_code(v: u64) -> Result<i64, sqlx::Error> {
    i64::try_from(v).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn float_code(v: f64) -> Result<i64, sqlx::Error> {
    if v.fract() != 0.0 || !(i64::MIN as f64..=i64::MAX as f64).contains(&v) {
        return Err(sqlx::Error::Decode(
            format!("{} is not an integer category code", v).into(),
        ));
    }
    Ok(v as i64)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmiQuery {
    pub sql: String,
    pub params: Vec<i64>,
}

impl BmiQuery {
    pub fn build(filter: StateFilter) -> Self {
        let mut sql = format!(
            "SELECT {cat}, COUNT(*) AS count FROM {table} WHERE {cat} IS NOT NULL",
            cat = CATEGORY_COLUMN,
            table = TABLE,
        );
        let mut params = Vec::new();

        if let Some(code) = filter.0 {
            sql.push_str(&format!(" AND {} = ?", STATE_COLUMN));
            params.push(code);
        }

        sql.push_str(&format!(
            " GROUP BY {cat} ORDER BY {cat}",
            cat = CATEGORY_COLUMN
        ));
        BmiQuery { sql, params }
    }

    pub fn state_code(&self) -> Option<i64> {
        self.params.first().copied()
    }
}
