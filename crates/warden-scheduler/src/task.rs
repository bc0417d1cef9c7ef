//! Scheduled tasks.

use chrono::{DateTime, Utc};

use crate::descriptor::JobDescriptor;

/// One recurring job bound to its next fire time.
#[derive(Debug, Clone)]
pub struct Task {
    pub descriptor: JobDescriptor,
    pub next_fire: DateTime<Utc>,
}

impl Task {
    /// Schedule `descriptor` relative to `now`.
    ///
    /// Returns `None` for `once` jobs and cron expressions that never fire
    /// again.
    pub fn schedule(descriptor: JobDescriptor, now: DateTime<Utc>) -> Option<Self> {
        let next_fire = descriptor.every.next_after(now)?;
        Some(Self {
            descriptor,
            next_fire,
        })
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_fire
    }

    /// Move the next fire time past `completed_at`. Returns `false` when the
    /// cadence has no further occurrence.
    pub fn reschedule(&mut self, completed_at: DateTime<Utc>) -> bool {
        match self.descriptor.every.next_after(completed_at) {
            Some(next) => {
                self.next_fire = next;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Every;
    use chrono::{Duration, TimeZone};
    use std::path::PathBuf;

    fn descriptor(every: &str) -> JobDescriptor {
        JobDescriptor {
            plugin_id: "p".to_string(),
            name: "job".to_string(),
            file: "job.sh".to_string(),
            every: Every::parse(every).unwrap(),
            reload: false,
            path: PathBuf::from("/plugins/p"),
        }
    }

    #[test]
    fn test_once_is_not_scheduled() {
        assert!(Task::schedule(descriptor("once"), Utc::now()).is_none());
    }

    #[test]
    fn test_interval_due_after_cadence() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let task = Task::schedule(descriptor("minute"), now).unwrap();
        assert!(!task.is_due(now));
        assert!(task.is_due(now + Duration::minutes(1)));
    }

    #[test]
    fn test_cron_reschedule_never_in_past() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut task = Task::schedule(descriptor("*/5 * * * *"), now).unwrap();
        assert_eq!(task.next_fire, now + Duration::minutes(5));

        // Run completes long after the scheduled slot.
        let completed = now + Duration::minutes(17);
        assert!(task.reschedule(completed));
        assert!(task.next_fire > completed);
        assert_eq!(task.next_fire, now + Duration::minutes(20));
    }
}
