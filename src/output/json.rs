use super::Formatter;
use crate::ensemble::Ensemble;

/// Full ensemble as one line of JSON, readable back by `JsonLinesSource`
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, ensemble: &Ensemble) -> String {
        serde_json::to_string(ensemble)
            .unwrap_or_else(|e| format!(r#"{{"error":"{}"}}"#, e))
    }
}
