// End-to-end flow over the full pipeline: classify, intake workflow,
// drip enrolment, tick. External services are wiremock stubs.

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::classifier::{self, LeadEvent, ScoreWeights, ServiceCatalog};
use crate::config::{CrmConfig, EmailConfig};
use crate::integrations::{CrmAdapter, CrmClient, EmailAdapter, EmailClient};
use crate::sequences::store::memory::MemorySequenceStore;
use crate::sequences::{SequenceScheduler, SequenceStatus, SequenceStore, StartOutcome};
use crate::workflows::{presets, provision_dependencies, DispatchTable, RunStatus, WorkflowRunner};

struct Pipeline {
    server: MockServer,
    crm: CrmClient,
    runner: WorkflowRunner,
    sequences: SequenceScheduler,
    store: Arc<MemorySequenceStore>,
}

async fn pipeline() -> Pipeline {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/contacts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "contact-1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/contacts/contact-1/labels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "task-1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/labels"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/custom-fields"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg-1"})))
        .mount(&server)
        .await;

    let crm = CrmClient::new(&CrmConfig {
        base_url: server.uri(),
        api_key: "test".to_string(),
    });
    let email = EmailClient::new(&EmailConfig {
        base_url: server.uri(),
        api_key: "test".to_string(),
        from_email: "hello@leadline.test".to_string(),
        from_name: "Leadline Builders".to_string(),
    });

    let table = Arc::new(
        DispatchTable::new()
            .with(Arc::new(CrmAdapter::new(crm.clone())))
            .with(Arc::new(EmailAdapter::new(email))),
    );
    let env = json!({"company": {"name": "Leadline Builders", "phone": "555-0199", "site_url": "https://leadline.test"}});
    let store = Arc::new(MemorySequenceStore::new());

    Pipeline {
        server,
        crm,
        runner: WorkflowRunner::new(table.clone(), env.clone()),
        sequences: SequenceScheduler::new(store.clone(), table, env),
        store,
    }
}

fn hot_lead() -> LeadEvent {
    LeadEvent {
        name: "Sam Rivera".to_string(),
        email: "sam@example.com".to_string(),
        phone: Some("555-0100".to_string()),
        address: Some("12 Oak St".to_string()),
        services: vec!["kitchen".to_string()],
        timeline: Some("next month".to_string()),
        budget: Some("$50k-$80k".to_string()),
        message: Some("Full kitchen remodel, ready to start".to_string()),
        source: "website".to_string(),
    }
}

#[tokio::test]
async fn full_intake_flow_for_a_hot_lead() {
    let p = pipeline().await;
    let lead = hot_lead();

    let score = classifier::score(&lead, &ServiceCatalog::default(), &ScoreWeights::default());
    assert!(score.total >= 70);

    let intake = presets::lead_intake();
    let report = provision_dependencies(&p.crm, &intake.dependencies).await;
    assert!(report.all_ensured());

    let inputs = json!({
        "name": lead.name,
        "email": lead.email,
        "phone": lead.phone,
        "category": score.category.as_str(),
        "score": score.total,
        "source": lead.source,
    });
    let result = p.runner.execute(&intake, inputs).await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.outputs["contact_id"], "contact-1");
    // contact, label, welcome, follow_up; nurture defers, done is internal
    assert_eq!(result.steps_run(), 4);
    assert_eq!(result.steps_skipped(), 2);

    let outcome = p
        .sequences
        .start(&lead, score.category, Some("contact-1".to_string()))
        .await
        .unwrap();
    let StartOutcome::Started { id, first_send } = outcome else {
        panic!("expected enrolment");
    };
    assert!(first_send);

    let row = p.store.get(id).await.unwrap().unwrap();
    assert_eq!(row.current_step, 1);
    assert_eq!(row.status, SequenceStatus::Active);
    assert_eq!(row.contact_id.as_deref(), Some("contact-1"));
}

#[tokio::test]
async fn drip_advances_over_ticks_and_survives_provider_outage() {
    let p = pipeline().await;
    let lead = hot_lead();

    let StartOutcome::Started { id, .. } = p
        .sequences
        .start(&lead, classifier::LeadCategory::Hot, None)
        .await
        .unwrap()
    else {
        panic!("expected enrolment");
    };

    // Second step comes due.
    let mut row = p.store.get(id).await.unwrap().unwrap();
    row.steps[1].scheduled_at = Some(Utc::now() - Duration::hours(1));
    p.store.insert(&row).await.unwrap();

    // Provider outage: the tick records a failure and does not advance.
    p.server.reset().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&p.server)
        .await;
    let outage = p.sequences.tick().await;
    assert_eq!(outage.failures, 1);
    assert_eq!(p.store.get(id).await.unwrap().unwrap().current_step, 1);

    // Provider recovers: the same step goes out on the next tick.
    p.server.reset().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg-2"})))
        .mount(&p.server)
        .await;
    let recovered = p.sequences.tick().await;
    assert_eq!(recovered.sent, 1);

    let row = p.store.get(id).await.unwrap().unwrap();
    assert_eq!(row.current_step, 2);
    assert!(row.steps[1].sent_at.is_some());
}

#[tokio::test]
async fn workflow_run_degrades_without_failing_when_a_channel_is_missing() {
    // Only the CRM adapter is registered; email steps skip instead of
    // failing the run.
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/contacts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "contact-9"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/contacts/contact-9/labels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let crm = CrmClient::new(&CrmConfig {
        base_url: server.uri(),
        api_key: "test".to_string(),
    });
    let table = Arc::new(DispatchTable::new().with(Arc::new(CrmAdapter::new(crm))));
    let runner = WorkflowRunner::new(table, json!({"company": {"name": "Leadline"}}));

    let result = runner
        .execute(
            &presets::lead_intake(),
            json!({
                "name": "Quiet Lead",
                "email": "quiet@example.com",
                "category": "cold",
            }),
        )
        .await;

    assert_ne!(result.status, RunStatus::Failed);
    let welcome = result
        .step_results
        .iter()
        .find(|s| s.step_id == "welcome")
        .unwrap();
    assert_eq!(welcome.output.as_ref().unwrap()["skipped"], true);
}
