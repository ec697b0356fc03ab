// Dependency provisioning - labels and custom fields a workflow expects

use tracing::warn;

use super::definition::WorkflowDependencies;
use crate::integrations::CrmClient;

#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub ensured: usize,
    pub failed: Vec<String>,
}

impl ProvisionReport {
    pub fn all_ensured(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ensure every label and custom field a workflow depends on exists in
/// the CRM. Idempotent; failures are collected and logged, never fatal.
/// A missing label degrades one step at run time, which is preferable to
/// refusing the whole lead.
pub async fn provision_dependencies(
    crm: &CrmClient,
    deps: &WorkflowDependencies,
) -> ProvisionReport {
    let mut report = ProvisionReport::default();

    for label in &deps.labels {
        match crm.ensure_label(label).await {
            Ok(()) => report.ensured += 1,
            Err(e) => {
                warn!(label = %label, error = %e, "failed to provision label");
                report.failed.push(format!("label '{label}': {e}"));
            }
        }
    }

    for field in &deps.custom_fields {
        match crm.ensure_custom_field(&field.key, &field.kind).await {
            Ok(()) => report.ensured += 1,
            Err(e) => {
                warn!(field = %field.key, error = %e, "failed to provision custom field");
                report.failed.push(format!("field '{}': {e}", field.key));
            }
        }
    }

    report
}
