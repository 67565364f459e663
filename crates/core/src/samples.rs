use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{IntakeSource, Purpose, TimeOfDay, VisitRequest};

/// A fixture visit paired with the rule it is expected to hit.
#[derive(Debug, Clone, Serialize)]
pub struct SampleVisit {
    pub name: &'static str,
    pub expected_policy_id: &'static str,
    pub payload: VisitRequest,
}

impl SampleVisit {
    pub fn envelope(&self, source: IntakeSource) -> Value {
        json!({
            "source": source,
            "payload": self.payload,
        })
    }
}

pub fn sample_visits() -> Vec<SampleVisit> {
    vec![
        sample("interview_business_hours_v1_1", "V-10293", Purpose::Interview, (10, 30), "eng", true, true),
        sample("interview_business_hours_v1_2", "V-10456", Purpose::Interview, (14, 15), "product", true, true),
        sample("contractor_after_hours_v1_1", "V-20111", Purpose::Contractor, (18, 0), "facilities", false, false),
        sample("contractor_after_hours_v1_2", "V-20122", Purpose::Contractor, (20, 30), "facilities", true, false),
        sample("delivery_no_badge_v1_1", "V-30111", Purpose::Delivery, (11, 0), "reception", false, false),
        sample("delivery_no_badge_v1_2", "V-30122", Purpose::Delivery, (15, 45), "reception", false, true),
        sample("default_unknown_v1_1", "V-40111", Purpose::Other, (12, 0), "unknown", false, false),
        sample("default_unknown_v1_2", "V-40122", Purpose::Other, (16, 30), "unknown", true, false),
    ]
}

fn sample(
    name: &'static str,
    visitor_id: &str,
    purpose: Purpose,
    (hour, minute): (u8, u8),
    host: &str,
    badge_required: bool,
    pre_registered: bool,
) -> SampleVisit {
    // Sample names are "<policy id>_<n>".
    let expected_policy_id = name.rsplit_once('_').map(|(id, _)| id).unwrap_or(name);
    SampleVisit {
        name,
        expected_policy_id,
        payload: VisitRequest {
            visitor_id: visitor_id.to_string(),
            purpose,
            time: TimeOfDay { hour, minute },
            host: host.to_string(),
            badge_required,
            pre_registered,
        },
    }
}
