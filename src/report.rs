use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};
use tracing::{event_enabled, info, warn, Level};

const MAX_NOTE_LENGTH: usize = 1024;

/// Observability sink for drain decisions. Reporting never fails the drain.
#[async_trait]
pub trait EventReporter: Send + Sync {
    async fn report(
        &self,
        reference: &ObjectReference,
        type_: EventType,
        action: &str,
        reason: &str,
        note: String,
    );
}

#[async_trait]
impl EventReporter for Recorder {
    async fn report(
        &self,
        reference: &ObjectReference,
        type_: EventType,
        action: &str,
        reason: &str,
        note: String,
    ) {
        let event = Event {
            type_,
            action: action.to_string(),
            reason: reason.to_string(),
            note: Some(truncate_note(note)),
            secondary: None,
        };

        // ignore the error of diagnostic events
        let _ = self.publish(&event, reference).await;
    }
}

fn truncate_note(note: String) -> String {
    if note.len() <= MAX_NOTE_LENGTH {
        return note;
    }

    let mut boundary = MAX_NOTE_LENGTH - "...".len();
    loop {
        if note.is_char_boundary(boundary) {
            break format!("{}...", &note[..boundary]);
        }

        boundary -= 1;
    }
}

pub async fn report_for(
    reporter: &dyn EventReporter,
    reference: &ObjectReference,
    action: &str,
    reason: &str,
    note: String,
) {
    if event_enabled!(Level::INFO) {
        info!(action, reason, note);
    }

    reporter
        .report(reference, EventType::Normal, action, reason, note)
        .await;
}

pub async fn warn_report_for(
    reporter: &dyn EventReporter,
    reference: &ObjectReference,
    action: &str,
    reason: &str,
    note: String,
) {
    if event_enabled!(Level::WARN) {
        warn!(action, reason, note);
    }

    reporter
        .report(reference, EventType::Warning, action, reason, note)
        .await;
}
