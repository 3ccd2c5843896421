mod guard;
mod normalize;
mod serialize;
mod sql;

pub use guard::{AccessDenied, AccessPolicy};
pub use normalize::{
    has_markdown_table, normalize_chart, normalize_chat, tag_tenant, DEFAULT_RESULTS_PREAMBLE,
    NO_RESULTS_NOTICE,
};
pub use serialize::to_json_safe;
pub use sql::format_sql;

use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn jcs_sha256_hex(value: &Value) -> Result<String, String> {
    let canonical = serde_jcs::to_string(value)
        .map_err(|err| format!("failed to canonicalize JSON via JCS: {err}"))?;
    Ok(sha256_hex(canonical.as_bytes()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
