//! Parameter substitution using minijinja.
//!
//! Action parameters may reference the current item with Jinja2-compatible
//! placeholders, e.g. `{{data.filename}}` or `{{meta.jobId}}`. Substitution
//! happens in one explicit pass immediately before the action runs, against
//! the item's wire shape (see [`DataItem::to_context`](crate::DataItem::to_context)).

use minijinja::Environment;
use serde_json::Value;

use crate::error::TemplateError;

/// Template engine shared by all stages of all runs.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_filter("datetime", filter_datetime);
        Self { env }
    }

    /// Check if a string contains template syntax.
    pub fn is_template(s: &str) -> bool {
        s.contains("{{") || s.contains("{%")
    }

    /// Render a parameter string against an item context. Plain strings are
    /// returned unchanged.
    pub fn render(&self, template: &str, context: &Value) -> Result<String, TemplateError> {
        if !Self::is_template(template) {
            return Ok(template.to_string());
        }
        Ok(self.env.render_str(template, context)?)
    }

    /// Render a value that might contain templates.
    ///
    /// Template strings that render to valid JSON are replaced by the parsed
    /// value, so `"{{data.count}}"` can substitute a number. Objects and
    /// arrays are rendered recursively.
    pub fn render_value(&self, value: &Value, context: &Value) -> Result<Value, TemplateError> {
        match value {
            Value::String(s) if Self::is_template(s) => {
                let rendered = self.render(s, context)?;
                Ok(serde_json::from_str(&rendered).unwrap_or_else(|_| Value::String(rendered)))
            }
            Value::Object(object) => {
                let mut result = serde_json::Map::new();
                for (key, value) in object {
                    result.insert(key.clone(), self.render_value(value, context)?);
                }
                Ok(Value::Object(result))
            }
            Value::Array(array) => {
                let result: Result<Vec<_>, _> = array
                    .iter()
                    .map(|value| self.render_value(value, context))
                    .collect();
                Ok(Value::Array(result?))
            }
            _ => Ok(value.clone()),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Format an epoch-millisecond timestamp, e.g.
/// `{{meta.timestamp | datetime('%Y-%m-%d')}}`.
fn filter_datetime(value: minijinja::Value, format: String) -> Result<String, minijinja::Error> {
    let millis = value.to_string().parse::<i64>().map_err(|_| {
        minijinja::Error::new(
            minijinja::ErrorKind::InvalidOperation,
            "datetime expects an epoch-millisecond value",
        )
    })?;
    let datetime = chrono::DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        minijinja::Error::new(
            minijinja::ErrorKind::InvalidOperation,
            "timestamp out of range",
        )
    })?;
    Ok(datetime.format(&format).to_string())
}
