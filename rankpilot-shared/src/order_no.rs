use chrono::NaiveDate;

/// Document number prefixes, one per entity type.
pub const CUSTOMER_ORDER_PREFIX: &str = "CO";
pub const SUPPLIER_ORDER_PREFIX: &str = "SO";
pub const STATEMENT_PREFIX: &str = "FS";

/// Date-scoped key a sequence counter is allocated under, e.g. `SO20250301`.
pub fn sequence_key(prefix: &str, date: NaiveDate) -> String {
    format!("{}{}", prefix, date.format("%Y%m%d"))
}

/// Full document number: `{prefix}{yyyymmdd}-{seq}`.
pub fn format_number(prefix: &str, date: NaiveDate, sequence: i64) -> String {
    format!("{}-{}", sequence_key(prefix, date), sequence)
}
