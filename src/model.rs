use chrono::NaiveDate;
use serde::Deserialize;

/// Reason stored when the provider cancelled a service without saying why.
pub const NO_REASON_GIVEN: &str = "NO REASON GIVEN";

/// One departure to check, as pushed onto the queue: `{"id": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkItem {
    pub id: String,
}

impl WorkItem {
    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDetails {
    pub is_cancelled: bool,
    pub operator: Operator,
    pub cancel_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationRecord {
    pub train_id: String,
    pub operator: String,
    pub cancellation_date: NaiveDate,
    pub reason: String,
}

impl CancellationRecord {
    /// Returns `None` unless the service was cancelled.
    pub fn from_details(train_id: &str, details: &ServiceDetails, date: NaiveDate) -> Option<Self> {
        if !details.is_cancelled {
            return None;
        }

        Some(CancellationRecord {
            train_id: train_id.to_string(),
            operator: details.operator.name.clone(),
            cancellation_date: date,
            reason: details
                .cancel_reason
                .clone()
                .unwrap_or_else(|| NO_REASON_GIVEN.to_string()),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetailsResponse {
    #[serde(default)]
    pub is_cancelled: bool,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub cancel_reason: Option<CancelReason>,
}

// The darwin feed sends either a bare string or `{"value": "...", "near": ...}`.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum CancelReason {
    Text(String),
    Detailed { value: Option<String> },
}

impl From<ServiceDetailsResponse> for ServiceDetails {
    fn from(response: ServiceDetailsResponse) -> Self {
        let cancel_reason = response.cancel_reason.and_then(|reason| match reason {
            CancelReason::Text(text) => Some(text),
            CancelReason::Detailed { value } => value,
        });

        ServiceDetails {
            is_cancelled: response.is_cancelled,
            operator: Operator {
                name: response.operator.unwrap_or_default(),
            },
            cancel_reason: cancel_reason.filter(|reason| !reason.trim().is_empty()),
        }
    }
}
