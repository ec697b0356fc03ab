// Workflow Automation Engine
//
// Declarative workflow definitions resolved against a run context and
// executed step by step through a table of service adapters.

pub mod conditions;
pub mod definition;
pub mod dispatch;
pub mod provision;
pub mod runner;
pub mod template;

pub use conditions::{evaluate, is_truthy, ConditionError};
pub use definition::{
    presets, CustomFieldSpec, ErrorPolicy, InputSpec, OnError, Step, WorkflowDefinition,
    WorkflowDependencies, INTERNAL_SERVICE,
};
pub use dispatch::{DispatchError, DispatchTable, ServiceAdapter};
pub use provision::{provision_dependencies, ProvisionReport};
pub use runner::{ExecutionResult, RunStatus, StepOutcome, StepResult, WorkflowRunner};
pub use template::{resolve, RunContext};
