//! Recovery Utility: on-demand scan for stuck locked tasks, cross-
//! checked against the in-flight and sent-mirror queues before
//! unlocking and failing them (§4.9). Not part of the steady-state
//! loop; invoked by `bridge-ctl recovery run`.

use crate::app::Application;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct RecoveryReport {
    pub checked: u64,
    pub stuck: u64,
    pub unlocked: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

pub async fn recover_stuck_tasks(
    app: &Application,
    worker_id: Option<&str>,
    max_age_minutes: i64,
) -> RecoveryReport {
    let mut report = RecoveryReport::default();

    let tasks = match app.engine.list_locked_tasks(worker_id).await {
        Ok(tasks) => tasks,
        Err(e) => {
            report.errors.push(format!("failed to list locked tasks: {e}"));
            return report;
        }
    };

    for task in tasks {
        report.checked += 1;

        let age_minutes = lock_age_minutes(task.lock_expiration_time.as_deref());
        if age_minutes <= max_age_minutes {
            continue;
        }

        let in_flight = queue_has_task(app, &task, false).await;
        let mirrored = queue_has_task(app, &task, true).await;
        if in_flight || mirrored {
            continue;
        }

        report.stuck += 1;

        if let Err(e) = app.engine.unlock(&task.id).await {
            report.errors.push(format!("unlock {} failed: {e}", task.id));
            continue;
        }
        report.unlocked += 1;

        match app
            .engine
            .failure(
                &task.id,
                "recovered by recovery utility: task appeared stuck with no broker trace",
                None,
                0,
                0,
            )
            .await
        {
            Ok(()) => report.failed += 1,
            Err(e) => report.errors.push(format!("failure {} failed: {e}", task.id)),
        }
    }

    report
}

/// Missing or unparseable lock times are suspicious; the absolute value
/// of the (possibly negative, future) age is used as-is.
fn lock_age_minutes(lock_expiration_time: Option<&str>) -> i64 {
    let Some(raw) = lock_expiration_time else {
        return i64::MAX;
    };
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => (Utc::now() - ts.with_timezone(&Utc)).num_minutes().abs(),
        Err(_) => i64::MAX,
    }
}

async fn queue_has_task(
    app: &Application,
    task: &bridge_engine_client::ExternalTask,
    sent: bool,
) -> bool {
    let system = app.routing.system_for_topic(&task.topic_name).unwrap_or("default");
    let Some(route) = app.routing.route_for_system(system) else {
        return false;
    };
    let queue = if sent { &route.sent_queue } else { &route.queue };

    let mut requeued = Vec::new();
    let mut found = false;

    loop {
        let Ok(Some(message)) = app.broker.basic_get(queue).await else {
            break;
        };
        let matches = std::str::from_utf8(&message.data)
            .map(|s| s.contains(&task.id))
            .unwrap_or(false);
        if matches {
            found = true;
        }
        requeued.push(message);
    }

    for message in requeued {
        let _ = message
            .nack(lapin::options::BasicNackOptions {
                requeue: true,
                ..Default::default()
            })
            .await;
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lock_time_is_maximally_suspicious() {
        assert_eq!(lock_age_minutes(None), i64::MAX);
    }

    #[test]
    fn report_defaults_to_zero() {
        let report = RecoveryReport::default();
        assert_eq!(report.checked, 0);
        assert!(report.errors.is_empty());
    }
}
