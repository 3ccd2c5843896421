use querygate_contracts::{
    AuditStatus, ChartResponse, ChartResult, EngineResult, EngineValue, NormalizedResponse,
};

use crate::serialize::to_json_safe;
use crate::sql::format_sql;

pub const NO_RESULTS_NOTICE: &str = "No results found for your query.";
pub const DEFAULT_RESULTS_PREAMBLE: &str = "Here are your results:";

/// Prefixes the tenant tag unless the message already names a company id.
pub fn tag_tenant(message: &str, tenant_id: i64) -> String {
    let lower = message.to_lowercase();
    if ["companyid", "company id"].iter().any(|tag| lower.contains(tag)) {
        message.to_string()
    } else {
        format!("[CompanyID: {tenant_id}] {message}")
    }
}

/// A pipe somewhere plus a later line opening with `|-`.
pub fn has_markdown_table(text: &str) -> bool {
    text.contains('|') && text.contains("\n|-")
}

/// Classifies a chat engine result. The order of the checks matters: fields can
/// co-occur and the first match wins.
pub fn normalize_chat(result: &EngineResult, tenant_id: i64) -> (NormalizedResponse, AuditStatus) {
    let error = result.error.as_deref().filter(|e| !e.is_empty());
    let results = result.results.as_ref().filter(|r| !r.is_empty());

    let (message, natural_response, status) = if result.is_clarification {
        let question = result.natural_response.clone().unwrap_or_default();
        (question.clone(), question, AuditStatus::ClarificationNeeded)
    } else if let Some(error) = error {
        let message = format!("Error: {error}");
        (message.clone(), message, AuditStatus::Error)
    } else if let (Some(summary), None) = (&result.summary, results) {
        (summary.clone(), summary.clone(), AuditStatus::Success)
    } else if let Some(rows) = results {
        let natural = result
            .natural_response
            .clone()
            .unwrap_or_else(|| DEFAULT_RESULTS_PREAMBLE.to_string());
        let message = if has_markdown_table(&natural) {
            natural.clone()
        } else {
            format!("{natural}\n\n{}", render_rows(rows))
        };
        (message, natural, AuditStatus::Success)
    } else if let Some(natural) = result.natural_response.as_ref().filter(|n| !n.is_empty()) {
        (natural.clone(), natural.clone(), AuditStatus::Success)
    } else {
        let notice = NO_RESULTS_NOTICE.to_string();
        (notice.clone(), notice, AuditStatus::Success)
    };

    let response = NormalizedResponse {
        summary_text: result
            .summary_text
            .clone()
            .unwrap_or_else(|| natural_response.clone()),
        message,
        natural_response,
        sql: format_sql(result.sql_query.as_deref().unwrap_or_default()),
        error: result.error.clone(),
        tenant_id,
        session_token: result.session_token.clone(),
        is_clarification: result.is_clarification,
    };
    (response, status)
}

pub fn normalize_chart(result: &ChartResult, tenant_id: i64) -> (ChartResponse, AuditStatus) {
    let status = if result.error.as_deref().is_some_and(|e| !e.is_empty()) {
        AuditStatus::Error
    } else {
        AuditStatus::Success
    };
    let response = ChartResponse {
        sql: format_sql(result.sql_query.as_deref().unwrap_or_default()),
        error: result.error.clone(),
        chart_config: result.chart_config.as_ref().map(to_json_safe),
        results: result.results.as_ref().map(to_json_safe),
        company_id: tenant_id,
    };
    (response, status)
}

fn render_rows(rows: &EngineValue) -> String {
    to_json_safe(rows).to_string()
}
