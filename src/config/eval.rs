/// Variable resolution for configuration bodies
use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::Value;

use super::diagnostics::{Diagnostic, Diagnostics};

/// Variables available to `${var.NAME}` references in configuration values.
///
/// A string that is exactly one reference is replaced by the variable's value
/// with its type intact, so `count: ${var.workers}` can yield a number. A
/// reference embedded in a longer string is interpolated and must name a
/// scalar. `$${` produces a literal `${`.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    variables: BTreeMap<String, Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load variables from a YAML mapping file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Diagnostics> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Diagnostic::error(
                "Failed to read variables file",
                format!("{}: {}", path.display(), e),
            )
        })?;
        Self::from_yaml(&content)
    }

    /// Parse variables from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, Diagnostics> {
        let variables: BTreeMap<String, Value> = serde_yaml::from_str(content)
            .map_err(|e| Diagnostic::error("Invalid variables file", e.to_string()))?;
        Ok(Self { variables })
    }

    /// Set a variable, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Resolve every reference in `value`, reporting all failures at once
    pub fn resolve(&self, value: &Value) -> Result<Value, Diagnostics> {
        let mut diags = Diagnostics::new();
        let resolved = self.resolve_value(value, &mut diags);
        if diags.is_empty() {
            Ok(resolved)
        } else {
            Err(diags)
        }
    }

    fn resolve_value(&self, value: &Value, diags: &mut Diagnostics) -> Value {
        match value {
            Value::String(s) => self.resolve_str(s, diags),
            Value::Sequence(items) => Value::Sequence(
                items
                    .iter()
                    .map(|item| self.resolve_value(item, diags))
                    .collect(),
            ),
            Value::Mapping(map) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v, diags)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn resolve_str(&self, input: &str, diags: &mut Diagnostics) -> Value {
        if let Some(expr) = whole_reference(input) {
            return match self.lookup(expr, diags) {
                Some(value) => value.clone(),
                None => Value::String(input.to_string()),
            };
        }

        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            // "$${" is an escaped literal
            if rest[..start].ends_with('$') {
                out.push_str(&rest[..start - 1]);
                out.push_str("${");
                rest = &rest[start + 2..];
                continue;
            }

            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let Some(end) = after.find('}') else {
                diags.push(Diagnostic::error(
                    "Unterminated template sequence",
                    format!("Missing closing brace in {:?}", input),
                ));
                out.push_str(&rest[start..]);
                return Value::String(out);
            };

            let expr = after[..end].trim();
            if let Some(value) = self.lookup(expr, diags) {
                match scalar_to_string(value) {
                    Some(s) => out.push_str(&s),
                    None => diags.push(Diagnostic::error(
                        "Invalid template interpolation value",
                        format!(
                            "Variable reference {:?} in {:?} is not a string, number or bool",
                            expr, input
                        ),
                    )),
                }
            }

            rest = &after[end + 1..];
        }

        out.push_str(rest);
        Value::String(out)
    }

    fn lookup(&self, expr: &str, diags: &mut Diagnostics) -> Option<&Value> {
        let Some(name) = expr.strip_prefix("var.") else {
            diags.push(Diagnostic::error(
                "Unsupported expression",
                format!(
                    "Only variable references like ${{var.name}} are supported, got {:?}",
                    expr
                ),
            ));
            return None;
        };

        let value = self.variables.get(name);
        if value.is_none() {
            diags.push(Diagnostic::error(
                "Unknown variable",
                format!("There is no variable named {:?}", name),
            ));
        }
        value
    }
}

fn whole_reference(input: &str) -> Option<&str> {
    let inner = input.strip_prefix("${")?.strip_suffix('}')?;
    if inner.contains('}') || inner.contains("${") {
        return None;
    }
    Some(inner.trim())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> EvalContext {
        EvalContext::from_yaml("region: westeurope\nworkers: 3\nzones: [a, b]\n").unwrap()
    }

    #[test]
    fn test_whole_reference_keeps_type() {
        let value: Value = serde_yaml::from_str("count: ${var.workers}").unwrap();
        let resolved = ctx().resolve(&value).unwrap();
        assert_eq!(resolved["count"], Value::from(3));
    }

    #[test]
    fn test_interpolation_inside_string() {
        let value = Value::from("rg-${var.region}-prod");
        let resolved = ctx().resolve(&value).unwrap();
        assert_eq!(resolved, Value::from("rg-westeurope-prod"));
    }

    #[test]
    fn test_escaped_sequence_is_literal() {
        let value = Value::from("$${var.region}");
        let resolved = ctx().resolve(&value).unwrap();
        assert_eq!(resolved, Value::from("${var.region}"));
    }

    #[test]
    fn test_reports_every_unknown_variable() {
        let value: Value =
            serde_yaml::from_str("a: ${var.missing_one}\nb: x-${var.missing_two}").unwrap();
        let diags = ctx().resolve(&value).unwrap_err();
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.summary == "Unknown variable"));
    }

    #[test]
    fn test_sequence_cannot_be_interpolated() {
        let value = Value::from("zones: ${var.zones}!");
        let diags = ctx().resolve(&value).unwrap_err();
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn test_unsupported_expression() {
        let value = Value::from("${local.name}");
        let diags = ctx().resolve(&value).unwrap_err();
        assert_eq!(diags.iter().next().unwrap().summary, "Unsupported expression");
    }
}
