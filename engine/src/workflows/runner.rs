// Workflow runner - executes a definition's steps in order for one trigger

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use super::conditions;
use super::definition::{OnError, WorkflowDefinition};
use super::dispatch::DispatchTable;
use super::template::{self, RunContext};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Skipped,
    Failed,
}

/// Per-step outcome for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub name: String,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub attempts: u32,
    pub duration_ms: i64,
}

/// Immutable record of one run, suitable for logging and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub workflow: String,
    pub status: RunStatus,
    pub step_results: Vec<StepResult>,
    pub outputs: Value,
    pub started_at: chrono::DateTime<Utc>,
    pub duration_ms: i64,
}

impl ExecutionResult {
    pub fn steps_run(&self) -> usize {
        self.step_results
            .iter()
            .filter(|s| s.outcome == StepOutcome::Success)
            .count()
    }

    pub fn steps_skipped(&self) -> usize {
        self.step_results
            .iter()
            .filter(|s| s.outcome == StepOutcome::Skipped)
            .count()
    }

    pub fn steps_failed(&self) -> usize {
        self.step_results
            .iter()
            .filter(|s| s.outcome == StepOutcome::Failed)
            .count()
    }
}

/// Executes workflow definitions synchronously, one trigger at a time.
/// Steps run strictly in declared order because later steps may reference
/// earlier outputs; there is no rollback of external side effects.
pub struct WorkflowRunner {
    table: Arc<DispatchTable>,
    env: Value,
}

impl WorkflowRunner {
    pub fn new(table: Arc<DispatchTable>, env: Value) -> Self {
        Self { table, env }
    }

    pub async fn execute(&self, definition: &WorkflowDefinition, inputs: Value) -> ExecutionResult {
        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        let run_timer = Instant::now();

        info!(workflow = %definition.name, %execution_id, "executing workflow");

        let inputs = match validate_inputs(definition, inputs) {
            Ok(inputs) => inputs,
            Err(message) => {
                warn!(workflow = %definition.name, %message, "input validation failed");
                return ExecutionResult {
                    execution_id,
                    workflow: definition.name.clone(),
                    status: RunStatus::Failed,
                    step_results: vec![StepResult {
                        step_id: "_validation".to_string(),
                        name: "Input validation".to_string(),
                        outcome: StepOutcome::Failed,
                        output: None,
                        error: Some(message),
                        note: None,
                        attempts: 0,
                        duration_ms: 0,
                    }],
                    outputs: Value::Null,
                    started_at,
                    duration_ms: run_timer.elapsed().as_millis() as i64,
                };
            }
        };

        let mut ctx = RunContext::new(inputs, self.env.clone());
        let mut step_results = Vec::with_capacity(definition.steps.len());
        let mut failed = 0usize;

        for step in &definition.steps {
            let step_timer = Instant::now();

            if let Some(skip_note) = self.skip_reason(step, &ctx) {
                step_results.push(StepResult {
                    step_id: step.id.clone(),
                    name: step.name.clone(),
                    outcome: StepOutcome::Skipped,
                    output: None,
                    error: None,
                    note: Some(skip_note),
                    attempts: 0,
                    duration_ms: step_timer.elapsed().as_millis() as i64,
                });
                continue;
            }

            let params = template::resolve(&step.params, &ctx);
            let policy = &definition.error_policy;
            let mut attempts = 0u32;
            let mut last_error = None;
            let mut output = None;

            loop {
                attempts += 1;
                match self.table.dispatch(&step.service, &step.action, &params).await {
                    Ok(value) => {
                        output = Some(value);
                        break;
                    }
                    Err(e) => {
                        last_error = Some(e.to_string());
                        let attempt_index = attempts - 1;
                        if attempt_index < policy.retry_count {
                            let delay = policy.retry_delay_ms * (attempt_index as u64 + 1);
                            warn!(
                                workflow = %definition.name,
                                step = %step.id,
                                attempt = attempts,
                                delay_ms = delay,
                                "step failed, retrying"
                            );
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                        } else {
                            break;
                        }
                    }
                }
            }

            let duration_ms = step_timer.elapsed().as_millis() as i64;
            match output {
                Some(value) => {
                    ctx.record_step(&step.output_key, value.clone());
                    step_results.push(StepResult {
                        step_id: step.id.clone(),
                        name: step.name.clone(),
                        outcome: StepOutcome::Success,
                        output: Some(value),
                        error: None,
                        note: None,
                        attempts,
                        duration_ms,
                    });
                }
                None => {
                    failed += 1;
                    let message = last_error.unwrap_or_else(|| "dispatch failed".to_string());
                    // Later steps may reference the error text.
                    ctx.record_step(&step.output_key, json!({"error": message}));
                    warn!(workflow = %definition.name, step = %step.id, %message, "step failed");
                    step_results.push(StepResult {
                        step_id: step.id.clone(),
                        name: step.name.clone(),
                        outcome: StepOutcome::Failed,
                        output: None,
                        error: Some(message),
                        note: None,
                        attempts,
                        duration_ms,
                    });
                    if policy.on_error == OnError::Stop {
                        break;
                    }
                }
            }
        }

        let outputs = template::resolve(&definition.outputs, &ctx);
        let succeeded = step_results
            .iter()
            .filter(|s| s.outcome == StepOutcome::Success)
            .count();
        let status = if failed > 0 && succeeded == 0 {
            RunStatus::Failed
        } else if failed == 0 {
            RunStatus::Completed
        } else {
            RunStatus::Partial
        };

        info!(
            workflow = %definition.name,
            %execution_id,
            ?status,
            run = succeeded,
            failed,
            "workflow finished"
        );

        ExecutionResult {
            execution_id,
            workflow: definition.name.clone(),
            status,
            step_results,
            outputs,
            started_at,
            duration_ms: run_timer.elapsed().as_millis() as i64,
        }
    }

    fn skip_reason(&self, step: &super::definition::Step, ctx: &RunContext) -> Option<String> {
        for expr in &step.conditions {
            let truthy = match conditions::evaluate(expr, ctx) {
                Ok(value) => conditions::is_truthy(&value),
                Err(e) => {
                    warn!(step = %step.id, condition = %expr, error = %e, "condition failed to evaluate");
                    false
                }
            };
            if !truthy {
                return Some(format!("condition not met: {expr}"));
            }
        }
        if let Some(schedule) = &step.schedule {
            return Some(format!("deferred to sequence scheduler ({schedule})"));
        }
        if step.is_internal() {
            return Some("internal control step".to_string());
        }
        None
    }
}

fn validate_inputs(definition: &WorkflowDefinition, inputs: Value) -> Result<Value, String> {
    let mut map = match inputs {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => return Err(format!("inputs must be an object, got {other}")),
    };

    for (name, spec) in &definition.input_schema {
        let present = map.get(name).map(|v| !v.is_null()).unwrap_or(false);
        if present {
            continue;
        }
        match &spec.default {
            Some(default) => {
                map.insert(name.clone(), default.clone());
            }
            None if spec.required => {
                return Err(format!("missing required input '{name}'"));
            }
            None => {}
        }
    }
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::definition::{ErrorPolicy, Step};
    use crate::workflows::dispatch::{DispatchError, ServiceAdapter};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Adapter that fails a configured number of times before succeeding,
    /// recording every call it receives.
    struct FlakyAdapter {
        fail_first: usize,
        calls: AtomicUsize,
        seen: Mutex<Vec<(String, Value)>>,
    }

    impl FlakyAdapter {
        fn new(fail_first: usize) -> Self {
            Self {
                fail_first,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ServiceAdapter for FlakyAdapter {
        fn service(&self) -> &str {
            "crm"
        }

        async fn call(&self, action: &str, params: &Value) -> Result<Value, DispatchError> {
            self.seen
                .lock()
                .unwrap()
                .push((action.to_string(), params.clone()));
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(DispatchError::Service {
                    service: "crm".to_string(),
                    message: "simulated outage".to_string(),
                })
            } else {
                Ok(json!({"id": "c-1", "attempt": n + 1}))
            }
        }
    }

    fn runner_with(adapter: Arc<FlakyAdapter>) -> WorkflowRunner {
        let table = DispatchTable::new().with(adapter);
        WorkflowRunner::new(Arc::new(table), json!({"company": {"name": "Leadline"}}))
    }

    fn one_step_definition(policy: ErrorPolicy) -> WorkflowDefinition {
        WorkflowDefinition::new("test", 1)
            .step(Step::new("s1", "Step 1", "crm", "create_contact", json!({})))
            .error_policy(policy)
    }

    #[tokio::test]
    async fn false_condition_skips_and_run_completes() {
        let adapter = Arc::new(FlakyAdapter::new(0));
        let runner = runner_with(adapter.clone());
        let def = WorkflowDefinition::new("test", 1).step(
            Step::new("s1", "Step 1", "crm", "create_contact", json!({}))
                .with_condition("inputs.vip == true"),
        );

        let result = runner.execute(&def, json!({"vip": false})).await;
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.steps_skipped(), 1);
        assert_eq!(result.steps_run(), 0);
        assert!(adapter.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let adapter = Arc::new(FlakyAdapter::new(2));
        let runner = runner_with(adapter.clone());
        let def = one_step_definition(ErrorPolicy {
            on_error: OnError::Continue,
            retry_count: 2,
            retry_delay_ms: 1,
        });

        let result = runner.execute(&def, json!({})).await;
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.step_results[0].outcome, StepOutcome::Success);
        assert_eq!(result.step_results[0].attempts, 3);
    }

    #[tokio::test]
    async fn exhausted_retries_record_failure() {
        let adapter = Arc::new(FlakyAdapter::new(2));
        let runner = runner_with(adapter);
        let def = one_step_definition(ErrorPolicy {
            on_error: OnError::Continue,
            retry_count: 1,
            retry_delay_ms: 1,
        });

        let result = runner.execute(&def, json!({})).await;
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.step_results[0].outcome, StepOutcome::Failed);
        assert_eq!(result.step_results[0].attempts, 2);
    }

    #[tokio::test]
    async fn stop_policy_halts_before_later_steps() {
        let adapter = Arc::new(FlakyAdapter::new(usize::MAX));
        let runner = runner_with(adapter.clone());
        let def = WorkflowDefinition::new("test", 1)
            .step(Step::new("s1", "Step 1", "crm", "create_contact", json!({})))
            .step(Step::new("s2", "Step 2", "crm", "add_label", json!({})))
            .error_policy(ErrorPolicy {
                on_error: OnError::Stop,
                retry_count: 0,
                retry_delay_ms: 1,
            });

        let result = runner.execute(&def, json!({})).await;
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.step_results.len(), 1);
        assert!(!result.step_results.iter().any(|s| s.step_id == "s2"));
    }

    #[tokio::test]
    async fn missing_required_input_fails_before_any_step() {
        let adapter = Arc::new(FlakyAdapter::new(0));
        let runner = runner_with(adapter.clone());
        let def = WorkflowDefinition::new("test", 1)
            .input("email", "string", true, None)
            .step(Step::new("s1", "Step 1", "crm", "create_contact", json!({})));

        let result = runner.execute(&def, json!({})).await;
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.step_results[0].step_id, "_validation");
        assert!(adapter.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn defaults_fill_missing_optional_inputs() {
        let adapter = Arc::new(FlakyAdapter::new(0));
        let runner = runner_with(adapter.clone());
        let def = WorkflowDefinition::new("test", 1)
            .input("source", "string", false, Some(json!("website")))
            .step(Step::new(
                "s1",
                "Step 1",
                "crm",
                "create_contact",
                json!({"source": "{{inputs.source}}"}),
            ));

        let result = runner.execute(&def, json!({})).await;
        assert_eq!(result.status, RunStatus::Completed);
        let seen = adapter.seen.lock().unwrap();
        assert_eq!(seen[0].1, json!({"source": "website"}));
    }

    #[tokio::test]
    async fn deferred_and_internal_steps_are_skipped() {
        let adapter = Arc::new(FlakyAdapter::new(0));
        let runner = runner_with(adapter.clone());
        let def = WorkflowDefinition::new("test", 1)
            .step(Step::new("drip", "Nurture", "email", "send", json!({})).deferred("drip"))
            .step(Step::internal("wait", "Wait marker"));

        let result = runner.execute(&def, json!({})).await;
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.steps_skipped(), 2);
        assert!(adapter.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn later_steps_see_earlier_outputs_and_error_text() {
        let adapter = Arc::new(FlakyAdapter::new(1));
        let runner = runner_with(adapter.clone());
        // First step fails once (no retries), second references its error.
        let def = WorkflowDefinition::new("test", 1)
            .step(Step::new("first", "First", "crm", "create_contact", json!({})))
            .step(Step::new(
                "second",
                "Second",
                "crm",
                "create_task",
                json!({"note": "previous: {{steps.first.error}}"}),
            ));

        let result = runner.execute(&def, json!({})).await;
        assert_eq!(result.status, RunStatus::Partial);
        let seen = adapter.seen.lock().unwrap();
        let note = seen[1].1["note"].as_str().unwrap();
        assert!(note.contains("simulated outage"));
    }

    #[tokio::test]
    async fn unknown_service_degrades_to_skipped_result() {
        let adapter = Arc::new(FlakyAdapter::new(0));
        let runner = runner_with(adapter);
        let def = WorkflowDefinition::new("test", 1).step(Step::new(
            "s1",
            "Future step",
            "image_ai",
            "generate",
            json!({}),
        ));

        let result = runner.execute(&def, json!({})).await;
        assert_eq!(result.status, RunStatus::Completed);
        let output = result.step_results[0].output.as_ref().unwrap();
        assert_eq!(output["skipped"], json!(true));
    }

    #[tokio::test]
    async fn outputs_resolve_against_final_context() {
        let adapter = Arc::new(FlakyAdapter::new(0));
        let runner = runner_with(adapter);
        let def = WorkflowDefinition::new("test", 1)
            .step(Step::new("contact", "Create", "crm", "create_contact", json!({})))
            .outputs(json!({"contact_id": "{{steps.contact.id}}"}));

        let result = runner.execute(&def, json!({})).await;
        assert_eq!(result.outputs, json!({"contact_id": "c-1"}));
    }
}
