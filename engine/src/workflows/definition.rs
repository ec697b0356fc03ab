// Workflow definitions - immutable specs built at deploy time

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Declared parameter in a workflow's input schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    pub kind: String,
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    Stop,
    Continue,
}

/// Per-definition failure policy: bounded retries with linear backoff,
/// then either stop the run or carry on to the next step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPolicy {
    pub on_error: OnError,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            on_error: OnError::Continue,
            retry_count: 0,
            retry_delay_ms: 500,
        }
    }
}

/// Labels and custom-field keys the workflow assumes exist in the CRM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDependencies {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFieldSpec {
    pub key: String,
    pub kind: String,
}

/// One unit of work. `params` is a template tree; `conditions` are ANDed
/// expressions; a `schedule` marker defers the step to the sequence
/// scheduler and `service == "internal"` marks a no-op control step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub service: String,
    pub action: String,
    #[serde(default)]
    pub params: Value,
    pub output_key: String,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub schedule: Option<String>,
}

pub const INTERNAL_SERVICE: &str = "internal";

impl Step {
    pub fn new(id: &str, name: &str, service: &str, action: &str, params: Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            service: service.to_string(),
            action: action.to_string(),
            params,
            output_key: id.to_string(),
            conditions: Vec::new(),
            schedule: None,
        }
    }

    pub fn internal(id: &str, name: &str) -> Self {
        Self::new(id, name, INTERNAL_SERVICE, "noop", Value::Null)
    }

    pub fn with_output_key(mut self, key: &str) -> Self {
        self.output_key = key.to_string();
        self
    }

    pub fn with_condition(mut self, expr: &str) -> Self {
        self.conditions.push(expr.to_string());
        self
    }

    pub fn deferred(mut self, schedule: &str) -> Self {
        self.schedule = Some(schedule.to_string());
        self
    }

    pub fn is_internal(&self) -> bool {
        self.service == INTERNAL_SERVICE
    }
}

/// Immutable workflow spec. Built once from static definitions and never
/// mutated at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub input_schema: BTreeMap<String, InputSpec>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub outputs: Value,
    #[serde(default)]
    pub dependencies: WorkflowDependencies,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

impl WorkflowDefinition {
    pub fn new(name: &str, version: u32) -> Self {
        Self {
            name: name.to_string(),
            version,
            input_schema: BTreeMap::new(),
            steps: Vec::new(),
            outputs: Value::Null,
            dependencies: WorkflowDependencies::default(),
            error_policy: ErrorPolicy::default(),
        }
    }

    pub fn input(mut self, name: &str, kind: &str, required: bool, default: Option<Value>) -> Self {
        self.input_schema.insert(
            name.to_string(),
            InputSpec {
                kind: kind.to_string(),
                required,
                default,
            },
        );
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn outputs(mut self, outputs: Value) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn labels(mut self, labels: &[&str]) -> Self {
        self.dependencies.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn custom_field(mut self, key: &str, kind: &str) -> Self {
        self.dependencies.custom_fields.push(CustomFieldSpec {
            key: key.to_string(),
            kind: kind.to_string(),
        });
        self
    }
}

/// Reference workflows for the contractor lead funnel.
pub mod presets {
    use super::*;
    use serde_json::json;

    /// The immediate action sequence for an inbound lead: create the CRM
    /// contact, label it by temperature, send the welcome email, and open
    /// a follow-up task for the leads worth calling today. The multi-day
    /// drip itself is a deferred marker handled by the sequence scheduler.
    pub fn lead_intake() -> WorkflowDefinition {
        WorkflowDefinition::new("lead-intake", 1)
            .input("name", "string", true, None)
            .input("email", "string", true, None)
            .input("phone", "string", false, Some(json!("")))
            .input("category", "string", true, None)
            .input("score", "number", false, Some(json!(0)))
            .input("message", "string", false, Some(json!("")))
            .input("source", "string", false, Some(json!("website")))
            .step(Step::new(
                "contact",
                "Create CRM contact",
                "crm",
                "create_contact",
                json!({
                    "name": "{{inputs.name}}",
                    "email": "{{inputs.email}}",
                    "phone": "{{inputs.phone}}",
                    "source": "{{inputs.source}}",
                    "custom_fields": {
                        "lead_score": "{{inputs.score}}",
                        "lead_source": "{{inputs.source}}"
                    }
                }),
            ))
            .step(
                Step::new(
                    "label",
                    "Label by temperature",
                    "crm",
                    "add_label",
                    json!({
                        "contact_id": "{{steps.contact.id}}",
                        "label": "lead-{{inputs.category}}"
                    }),
                )
                .with_condition("steps.contact.id != null"),
            )
            .step(Step::new(
                "welcome",
                "Send welcome email",
                "email",
                "send",
                json!({
                    "to": "{{inputs.email}}",
                    "subject": "Thanks for reaching out, {{inputs.name}}",
                    "html_body": "<p>Hi {{inputs.name}},</p><p>We received your request and one of our project specialists will be in touch shortly.</p><p>{{env.company.name}}</p>",
                    "track_opens": true,
                    "track_clicks": true
                }),
            ))
            .step(
                Step::new(
                    "follow_up",
                    "Open same-day follow-up task",
                    "crm",
                    "create_task",
                    json!({
                        "contact_id": "{{steps.contact.id}}",
                        "title": "Call {{inputs.name}} ({{inputs.category}} lead, score {{inputs.score}})",
                        "due": "{{now}}"
                    }),
                )
                .with_condition("inputs.category == 'hot' || inputs.category == 'emergency'"),
            )
            .step(
                Step::new(
                    "nurture",
                    "Enroll in nurture drip",
                    "email",
                    "send",
                    Value::Null,
                )
                .deferred("drip"),
            )
            .step(Step::internal("done", "Intake complete"))
            .outputs(json!({
                "contact_id": "{{steps.contact.id}}",
                "category": "{{inputs.category}}",
                "welcomed": "{{steps.welcome.id}}"
            }))
            .labels(&[
                "lead-emergency",
                "lead-hot",
                "lead-warm",
                "lead-cold",
                "website-lead",
            ])
            .custom_field("lead_score", "number")
            .custom_field("lead_source", "text")
            .error_policy(ErrorPolicy {
                on_error: OnError::Continue,
                retry_count: 2,
                retry_delay_ms: 500,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_builder() {
        let step = Step::new("s1", "First", "crm", "add_label", json!({"label": "x"}))
            .with_condition("inputs.ok")
            .with_output_key("labelled");
        assert_eq!(step.output_key, "labelled");
        assert_eq!(step.conditions.len(), 1);
        assert!(!step.is_internal());
        assert!(Step::internal("w", "Wait").is_internal());
    }

    #[test]
    fn intake_preset_shape() {
        let def = presets::lead_intake();
        assert!(def.input_schema["name"].required);
        assert!(def.input_schema["phone"].default.is_some());
        assert!(def.steps.iter().any(|s| s.schedule.is_some()));
        assert!(def.dependencies.labels.contains(&"lead-hot".to_string()));
    }
}
