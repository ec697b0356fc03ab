// Lead classifier - scores an inbound lead and assigns the campaign category

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An inbound lead event: contact identity plus optional free-text and
/// service-selection fields from the request form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadEvent {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "website".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadCategory {
    Emergency,
    Hot,
    Warm,
    Cold,
}

impl LeadCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }
}

impl fmt::Display for LeadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emergency" => Ok(Self::Emergency),
            "hot" => Ok(Self::Hot),
            "warm" => Ok(Self::Warm),
            "cold" => Ok(Self::Cold),
            other => Err(format!("unknown lead category '{other}'")),
        }
    }
}

/// One service line the contractor offers, with the signals used to infer
/// it from free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub urgency_multiplier: f64,
    pub avg_project_value: i64,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCatalog {
    pub entries: Vec<ServiceEntry>,
    /// Keywords that force the emergency category regardless of score.
    pub urgent_keywords: Vec<String>,
    /// Projects at or above this value count as high-value work.
    pub high_value_threshold: i64,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        let entry = |name: &str, urgency: f64, value: i64, keywords: &[&str]| ServiceEntry {
            name: name.to_string(),
            urgency_multiplier: urgency,
            avg_project_value: value,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        };
        Self {
            entries: vec![
                entry("kitchen", 1.0, 45_000, &["kitchen", "cabinet", "countertop"]),
                entry("bathroom", 1.0, 25_000, &["bathroom", "shower", "tub", "vanity"]),
                entry("addition", 1.0, 120_000, &["addition", "extension", "adu"]),
                entry("roofing", 1.5, 18_000, &["roof", "shingle", "gutter"]),
                entry("basement", 1.0, 60_000, &["basement", "foundation"]),
                entry(
                    "emergency",
                    3.0,
                    8_000,
                    &["emergency", "urgent", "flood", "burst", "leak", "collapse"],
                ),
            ],
            urgent_keywords: vec![
                "emergency".to_string(),
                "urgent".to_string(),
                "asap".to_string(),
                "right away".to_string(),
                "flooding".to_string(),
                "burst pipe".to_string(),
            ],
            high_value_threshold: 40_000,
        }
    }
}

/// Configurable weights for each contributing rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub multiple_services: i64,
    pub timeline_present: i64,
    pub budget_present: i64,
    pub phone_present: i64,
    pub address_present: i64,
    pub urgent_keyword: i64,
    pub high_value_service: i64,
    pub hot_threshold: i64,
    pub warm_threshold: i64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            multiple_services: 15,
            timeline_present: 20,
            budget_present: 25,
            phone_present: 10,
            address_present: 10,
            urgent_keyword: 30,
            high_value_service: 20,
            hot_threshold: 70,
            warm_threshold: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreFactor {
    pub rule: String,
    pub weight: i64,
}

/// Ephemeral scoring result. `factors` lists every rule that fired, in
/// evaluation order, so the total is auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadScore {
    pub total: i64,
    pub category: LeadCategory,
    pub factors: Vec<ScoreFactor>,
}

/// Score a lead against the service catalog and rule weights.
///
/// Keyword matching is case-insensitive over the free-text fields and
/// infers a service when the lead did not pick one explicitly. An urgent
/// keyword forces the emergency category outright; emergency response is
/// never gated on a borderline numeric total.
pub fn score(lead: &LeadEvent, catalog: &ServiceCatalog, weights: &ScoreWeights) -> LeadScore {
    let free_text = [
        lead.message.as_deref().unwrap_or(""),
        lead.timeline.as_deref().unwrap_or(""),
    ]
    .join(" ")
    .to_lowercase();

    let explicit: Vec<String> = lead.services.iter().map(|s| s.to_lowercase()).collect();
    let mut matched: Vec<&ServiceEntry> = Vec::new();
    for entry in &catalog.entries {
        let selected = explicit.iter().any(|s| s == &entry.name);
        let implied = entry
            .keywords
            .iter()
            .any(|k| free_text.contains(k.as_str()));
        if selected || implied {
            matched.push(entry);
        }
    }

    let mut factors = Vec::new();
    let mut apply = |fired: bool, rule: &str, weight: i64| {
        if fired {
            factors.push(ScoreFactor {
                rule: rule.to_string(),
                weight,
            });
        }
    };

    apply(
        matched.len() > 1 || explicit.len() > 1,
        "multiple_services",
        weights.multiple_services,
    );
    apply(
        lead.timeline.as_deref().is_some_and(|t| !t.is_empty()),
        "timeline_present",
        weights.timeline_present,
    );
    apply(
        lead.budget.as_deref().is_some_and(|b| !b.is_empty()),
        "budget_present",
        weights.budget_present,
    );
    apply(
        lead.phone.as_deref().is_some_and(|p| !p.is_empty()),
        "phone_present",
        weights.phone_present,
    );
    apply(
        lead.address.as_deref().is_some_and(|a| !a.is_empty()),
        "address_present",
        weights.address_present,
    );

    let urgent = catalog
        .urgent_keywords
        .iter()
        .any(|k| free_text.contains(k.as_str()))
        || explicit.iter().any(|s| s == "emergency");
    apply(urgent, "urgent_keyword", weights.urgent_keyword);

    apply(
        matched
            .iter()
            .any(|e| e.avg_project_value >= catalog.high_value_threshold),
        "high_value_service",
        weights.high_value_service,
    );

    let total: i64 = factors.iter().map(|f| f.weight).sum();
    let category = if urgent {
        LeadCategory::Emergency
    } else if total >= weights.hot_threshold {
        LeadCategory::Hot
    } else if total >= weights.warm_threshold {
        LeadCategory::Warm
    } else {
        LeadCategory::Cold
    };

    LeadScore {
        total,
        category,
        factors,
    }
}
