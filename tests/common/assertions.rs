//! Waiting and event helpers for integration tests

use std::time::Duration;
use tokio::sync::broadcast;
use tubedl::{Event, JobId, JobRecord, JobStatus, Pipeline};

/// Wait for a job to reach COMPLETED or FAILED and return its final snapshot
///
/// Panics if that takes longer than `timeout`.
pub async fn wait_for_terminal(pipeline: &Pipeline, id: JobId, timeout: Duration) -> JobRecord {
    let polled = tokio::time::timeout(timeout, async {
        loop {
            let job = pipeline.get_job(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    match polled {
        Ok(job) => job,
        Err(_) => {
            let job = pipeline.get_job(id).await.unwrap();
            panic!("job {} still {} after {:?}", id, job.status, timeout);
        }
    }
}

/// Drain everything currently buffered on an event receiver
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Status transitions of `id`, in the order they were announced
pub fn status_sequence(events: &[Event], id: JobId) -> Vec<JobStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::StatusChanged { id: event_id, to, .. } if *event_id == id => Some(*to),
            _ => None,
        })
        .collect()
}

/// Assert that a status sequence never moves backward and never leaves a terminal status
pub fn assert_monotonic(statuses: &[JobStatus]) {
    for pair in statuses.windows(2) {
        assert!(
            pair[0].can_advance_to(pair[1]) && pair[0] != pair[1],
            "illegal transition {} -> {} in {:?}",
            pair[0],
            pair[1],
            statuses
        );
    }
}
