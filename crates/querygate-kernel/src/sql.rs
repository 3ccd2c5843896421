use sqlformat::{FormatOptions, Indent, QueryParams};

/// Display formatting for engine-generated SQL: keywords upper-cased, clauses
/// re-indented by two spaces.
pub fn format_sql(sql: &str) -> String {
    if sql.trim().is_empty() {
        return String::new();
    }
    let options = FormatOptions {
        indent: Indent::Spaces(2),
        uppercase: Some(true),
        ..Default::default()
    };
    sqlformat::format(sql, &QueryParams::None, &options)
        .trim()
        .to_string()
}
