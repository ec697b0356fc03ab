// Outbound integrations
//
// Thin HTTP clients over the CRM and transactional email providers, plus
// the adapters that expose them to the dispatch table.

pub mod crm;
pub mod email;

use thiserror::Error;

pub use crm::{CrmAdapter, CrmClient};
pub use email::{EmailAdapter, EmailClient};

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
