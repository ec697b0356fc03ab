// Drip campaign templates - ordered step delays plus message templates

use serde_json::{json, Value};

use crate::classifier::LeadCategory;
use crate::workflows::template::{self, RunContext};

/// One deferred message. `delay_hours` is the gap after the previous
/// step; the scheduler turns these into absolute `scheduled_at` stamps at
/// enrolment time.
#[derive(Debug, Clone)]
pub struct SequenceStepTemplate {
    pub delay_hours: i64,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Clone)]
pub struct SequenceTemplate {
    pub name: String,
    pub steps: Vec<SequenceStepTemplate>,
}

impl SequenceTemplate {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Render a step's subject and body against the stored lead snapshot.
    pub fn render(&self, index: usize, lead: &Value, env: &Value) -> Option<(String, String)> {
        let step = self.steps.get(index)?;
        let ctx = RunContext::new(lead.clone(), env.clone());
        let subject = render_text(&step.subject, &ctx);
        let body = render_text(&step.html_body, &ctx);
        Some((subject, body))
    }

    /// The drip campaign for a lead temperature. Step 1 always goes out
    /// immediately at enrolment; the rest are spaced out over days.
    pub fn for_category(category: LeadCategory) -> Self {
        match category {
            LeadCategory::Emergency => Self {
                name: "emergency-response".to_string(),
                steps: vec![
                    step(
                        0,
                        "We're on it, {{inputs.name}}",
                        "<p>Hi {{inputs.name}},</p><p>Your emergency request is in our dispatcher's queue. Expect a call from {{env.company.name}} within the hour.</p>",
                    ),
                    step(
                        24,
                        "How did we do?",
                        "<p>Hi {{inputs.name}},</p><p>Checking in after yesterday's emergency call. If anything still needs attention, reply to this email or call us at {{env.company.phone}}.</p>",
                    ),
                ],
            },
            LeadCategory::Hot => Self {
                name: "hot-lead-drip".to_string(),
                steps: vec![
                    step(
                        0,
                        "Your project estimate from {{env.company.name}}",
                        "<p>Hi {{inputs.name}},</p><p>Thanks for the detail you shared. We'll have a project specialist call you today to talk scope and timing.</p>",
                    ),
                    step(
                        24,
                        "Quick question about your project",
                        "<p>Hi {{inputs.name}},</p><p>Did you have plans or photos you could share? It helps us arrive at your free consultation with a real number.</p>",
                    ),
                    step(
                        72,
                        "Recent projects like yours",
                        "<p>Hi {{inputs.name}},</p><p>Here are three recent projects in your area, with budgets and timelines: {{env.company.site_url}}/portfolio</p>",
                    ),
                    step(
                        168,
                        "Still thinking it over?",
                        "<p>Hi {{inputs.name}},</p><p>No rush. When you're ready, your consultation slot is still open: {{env.company.site_url}}/schedule</p>",
                    ),
                ],
            },
            LeadCategory::Warm => Self {
                name: "warm-lead-drip".to_string(),
                steps: vec![
                    step(
                        0,
                        "Thanks for reaching out, {{inputs.name}}",
                        "<p>Hi {{inputs.name}},</p><p>We received your request and will follow up with ideas and a ballpark range for your project.</p>",
                    ),
                    step(
                        48,
                        "What does a project like yours cost?",
                        "<p>Hi {{inputs.name}},</p><p>Our pricing guide breaks down typical budgets by project type: {{env.company.site_url}}/pricing</p>",
                    ),
                    step(
                        120,
                        "Planning checklist",
                        "<p>Hi {{inputs.name}},</p><p>A one-page checklist our clients use before their first consultation: {{env.company.site_url}}/checklist</p>",
                    ),
                    step(
                        240,
                        "Ready when you are",
                        "<p>Hi {{inputs.name}},</p><p>If the timing's right this season, grab a consultation slot here: {{env.company.site_url}}/schedule</p>",
                    ),
                ],
            },
            LeadCategory::Cold => Self {
                name: "cold-lead-drip".to_string(),
                steps: vec![
                    step(
                        0,
                        "Thanks for your interest, {{inputs.name}}",
                        "<p>Hi {{inputs.name}},</p><p>Glad you found {{env.company.name}}. We'll send the occasional idea worth stealing for your home.</p>",
                    ),
                    step(
                        168,
                        "Before-and-after: three local projects",
                        "<p>Hi {{inputs.name}},</p><p>A quick look at what's possible: {{env.company.site_url}}/portfolio</p>",
                    ),
                    step(
                        504,
                        "Seasonal maintenance reminders",
                        "<p>Hi {{inputs.name}},</p><p>Our seasonal checklist keeps small problems from becoming emergencies: {{env.company.site_url}}/maintenance</p>",
                    ),
                ],
            },
        }
    }
}

fn step(delay_hours: i64, subject: &str, html_body: &str) -> SequenceStepTemplate {
    SequenceStepTemplate {
        delay_hours,
        subject: subject.to_string(),
        html_body: html_body.to_string(),
    }
}

fn render_text(text: &str, ctx: &RunContext) -> String {
    match template::resolve(&json!(text), ctx) {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
