// Template Resolver - evaluates {{expr}} placeholders against a run context

use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static WHOLE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\{([^}]+)\}\}$").expect("valid regex literal"));
static INLINE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("valid regex literal"));

/// Per-run resolution context. Built fresh for each workflow run and
/// discarded afterwards; `env` is a read-only configuration snapshot.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub inputs: Value,
    pub steps: Map<String, Value>,
    pub env: Value,
}

impl RunContext {
    pub fn new(inputs: Value, env: Value) -> Self {
        Self {
            inputs,
            steps: Map::new(),
            env,
        }
    }

    /// Resolve a reference expression to a value.
    ///
    /// Grammar: `now` | `env.<path>` | `inputs.<path>` | `steps.<path>`,
    /// otherwise the path is tried against prior step outputs first and
    /// then against the whole context. Missing references are `None`,
    /// never an error.
    pub fn lookup(&self, expr: &str) -> Option<Value> {
        let expr = expr.trim();
        if expr == "now" {
            return Some(Value::String(Utc::now().to_rfc3339()));
        }
        if let Some(rest) = expr.strip_prefix("env.") {
            return lookup_path(&self.env, rest);
        }
        if let Some(rest) = expr.strip_prefix("inputs.") {
            return lookup_path(&self.inputs, rest);
        }
        if let Some(rest) = expr.strip_prefix("steps.") {
            return lookup_path_in_map(&self.steps, rest);
        }
        lookup_path_in_map(&self.steps, expr).or_else(|| {
            let root = serde_json::json!({
                "inputs": self.inputs,
                "steps": Value::Object(self.steps.clone()),
                "env": self.env,
            });
            lookup_path(&root, expr)
        })
    }

    pub fn record_step(&mut self, output_key: &str, value: Value) {
        self.steps.insert(output_key.to_string(), value);
    }
}

/// Resolve every placeholder in a template tree, preserving its shape.
///
/// A string that is exactly one placeholder returns the referenced value
/// unconverted, so numbers and objects survive. Strings mixing literal
/// text and placeholders are substituted textually, with missing or null
/// references becoming the empty string.
pub fn resolve(template: &Value, ctx: &RunContext) -> Value {
    match template {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, ctx)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, ctx)).collect()),
        Value::String(s) => resolve_string(s, ctx),
        other => other.clone(),
    }
}

fn resolve_string(s: &str, ctx: &RunContext) -> Value {
    if let Some(cap) = WHOLE_PLACEHOLDER.captures(s) {
        return ctx.lookup(&cap[1]).unwrap_or(Value::Null);
    }

    let replaced = INLINE_PLACEHOLDER.replace_all(s, |cap: &regex::Captures| {
        match ctx.lookup(&cap[1]) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
        }
    });
    Value::String(replaced.into_owned())
}

/// One segment of a dotted/bracketed path.
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }
        let mut rest = part;
        while let Some(open) = rest.find('[') {
            if open > 0 {
                segments.push(Segment::Key(rest[..open].to_string()));
            }
            let close = rest[open..].find(']')? + open;
            let idx: usize = rest[open + 1..close].parse().ok()?;
            segments.push(Segment::Index(idx));
            rest = &rest[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Key(rest.to_string()));
        }
    }
    Some(segments)
}

/// Walk a path into a value, short-circuiting to `None` the moment an
/// intermediate is not the expected shape.
fn lookup_path(root: &Value, path: &str) -> Option<Value> {
    let segments = parse_path(path)?;
    let mut current = root;
    for segment in &segments {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(key)?,
            Segment::Index(idx) => current.as_array()?.get(*idx)?,
        };
    }
    Some(current.clone())
}

fn lookup_path_in_map(map: &Map<String, Value>, path: &str) -> Option<Value> {
    let segments = parse_path(path)?;
    let mut iter = segments.iter();
    let first = match iter.next()? {
        Segment::Key(key) => map.get(key)?,
        Segment::Index(_) => return None,
    };
    let mut current = first;
    for segment in iter {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(key)?,
            Segment::Index(idx) => current.as_array()?.get(*idx)?,
        };
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with(inputs: Value) -> RunContext {
        RunContext::new(inputs, json!({}))
    }

    #[test]
    fn whole_placeholder_preserves_type() {
        let ctx = ctx_with(json!({"x": 5}));
        assert_eq!(resolve(&json!("{{inputs.x}}"), &ctx), json!(5));
    }

    #[test]
    fn whole_placeholder_preserves_objects() {
        let ctx = ctx_with(json!({"addr": {"city": "Denver"}}));
        assert_eq!(
            resolve(&json!("{{inputs.addr}}"), &ctx),
            json!({"city": "Denver"})
        );
    }

    #[test]
    fn mixed_text_substitutes_as_string() {
        let ctx = ctx_with(json!({"name": "Sam"}));
        assert_eq!(resolve(&json!("Hi {{inputs.name}}"), &ctx), json!("Hi Sam"));
    }

    #[test]
    fn missing_reference_is_empty_in_mixed_and_null_whole() {
        let ctx = ctx_with(json!({}));
        assert_eq!(resolve(&json!("Hi {{inputs.nope}}!"), &ctx), json!("Hi !"));
        assert_eq!(resolve(&json!("{{inputs.nope}}"), &ctx), Value::Null);
    }

    #[test]
    fn step_outputs_resolve_with_and_without_prefix() {
        let mut ctx = ctx_with(json!({}));
        ctx.record_step("contact", json!({"id": "abc-1"}));
        assert_eq!(resolve(&json!("{{steps.contact.id}}"), &ctx), json!("abc-1"));
        assert_eq!(resolve(&json!("{{contact.id}}"), &ctx), json!("abc-1"));
    }

    #[test]
    fn array_indices_in_paths() {
        let ctx = ctx_with(json!({"items": [{"sku": "A"}, {"sku": "B"}]}));
        assert_eq!(resolve(&json!("{{inputs.items[1].sku}}"), &ctx), json!("B"));
        // Indexing into a non-array short-circuits instead of erroring.
        assert_eq!(resolve(&json!("{{inputs.items.sku[0]}}"), &ctx), Value::Null);
    }

    #[test]
    fn env_lookup_and_now() {
        let ctx = RunContext::new(json!({}), json!({"company": {"name": "Leadline"}}));
        assert_eq!(
            resolve(&json!("From {{env.company.name}}"), &ctx),
            json!("From Leadline")
        );
        let now = resolve(&json!("{{now}}"), &ctx);
        assert!(now.as_str().is_some_and(|s| s.contains('T')));
    }

    #[test]
    fn structure_is_preserved() {
        let ctx = ctx_with(json!({"n": 2, "tag": "vip"}));
        let template = json!({
            "count": "{{inputs.n}}",
            "labels": ["lead", "{{inputs.tag}}"],
            "flag": true
        });
        assert_eq!(
            resolve(&template, &ctx),
            json!({"count": 2, "labels": ["lead", "vip"], "flag": true})
        );
    }
}
