//! JSON rendering for stdout

use anyhow::Result;
use serde_json::Value;

pub fn render(document: &Value, pretty: bool) -> Result<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(document)?
    } else {
        serde_json::to_string(document)?
    };
    Ok(rendered)
}
