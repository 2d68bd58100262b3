use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;

use crate::report::EventReporter;

#[derive(Clone, Debug)]
pub struct TrackedEvent {
    pub name: Option<String>,
    pub type_: EventType,
    pub action: String,
    pub reason: String,
    pub note: String,
}

#[derive(Default)]
pub struct EventTracker {
    events: Mutex<Vec<TrackedEvent>>,
}

impl EventTracker {
    pub fn events(&self) -> Vec<TrackedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn issued_for(&self, name: &str, action: &str, reason: &str) -> bool {
        self.events.lock().unwrap().iter().any(|event| {
            event.name.as_deref() == Some(name) && event.action == action && event.reason == reason
        })
    }
}

#[async_trait]
impl EventReporter for EventTracker {
    async fn report(
        &self,
        reference: &ObjectReference,
        type_: EventType,
        action: &str,
        reason: &str,
        note: String,
    ) {
        self.events.lock().unwrap().push(TrackedEvent {
            name: reference.name.clone(),
            type_,
            action: action.to_owned(),
            reason: reason.to_owned(),
            note,
        });
    }
}
