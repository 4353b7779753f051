use std::sync::Arc;
use tokio::sync::broadcast;

use super::test_helpers::*;
use super::*;
use crate::types::{JobStatus, Stage};

mod lifecycle;

fn new_job(url: &str, destinations: Option<&[&str]>) -> NewJob {
    NewJob {
        url: url.to_string(),
        profile: PROFILE.to_string(),
        destinations: destinations.map(|names| names.iter().map(|n| n.to_string()).collect()),
    }
}

/// Status changes seen so far, in order
fn observed_statuses(rx: &mut broadcast::Receiver<Event>) -> Vec<JobStatus> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Event::StatusChanged { to, .. } = event {
            seen.push(to);
        }
    }
    seen
}
