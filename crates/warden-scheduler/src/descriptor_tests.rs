use super::*;
use chrono::{Local, Timelike, TimeZone};
use serde_json::json;

fn parse(entry: Value) -> Result<JobDescriptor, SchedulerError> {
    JobDescriptor::from_manifest_entry("geo", Path::new("/plugins/geo"), &entry)
}

#[test]
fn test_valid_entry() {
    let job = parse(json!({
        "name": "download-db",
        "file": "download.py",
        "every": "day",
        "reload": true
    }))
    .unwrap();
    assert_eq!(job.plugin_id, "geo");
    assert_eq!(job.name, "download-db");
    assert_eq!(job.every, Every::Day);
    assert!(job.reload);
    assert_eq!(job.executable(), PathBuf::from("/plugins/geo/jobs/download.py"));
}

#[test]
fn test_missing_key_rejected() {
    let err = parse(json!({"name": "a", "file": "a.py", "every": "hour"})).unwrap_err();
    assert!(err.to_string().contains("reload"));
}

#[test]
fn test_non_object_rejected() {
    assert!(parse(json!("download")).is_err());
}

#[test]
fn test_name_regex() {
    let too_long = "a".repeat(129);
    for name in ["has space", "semi;colon", "", too_long.as_str()] {
        let result = parse(json!({"name": name, "file": "a.py", "every": "hour", "reload": false}));
        assert!(result.is_err(), "name {:?} should be rejected", name);
    }
    let ok = "a".repeat(128);
    assert!(parse(json!({"name": ok, "file": "a.py", "every": "hour", "reload": false})).is_ok());
}

#[test]
fn test_file_allows_slashes() {
    let job = parse(json!({
        "name": "nested",
        "file": "sub/dir/run.sh",
        "every": "minute",
        "reload": false
    }))
    .unwrap();
    assert_eq!(job.file, "sub/dir/run.sh");
}

#[test]
fn test_file_regex_rejects_shell_chars() {
    let result = parse(json!({"name": "x", "file": "run.sh; rm", "every": "hour", "reload": false}));
    assert!(result.is_err());
}

#[test]
fn test_reload_must_be_bool() {
    let result = parse(json!({"name": "x", "file": "x.py", "every": "hour", "reload": "yes"}));
    assert!(result.unwrap_err().to_string().contains("reload"));
}

#[test]
fn test_unknown_every_rejected() {
    let result = parse(json!({"name": "x", "file": "x.py", "every": "fortnight", "reload": false}));
    assert!(result.unwrap_err().to_string().contains("every"));
}

#[test]
fn test_every_keywords() {
    assert!(Every::parse("once").unwrap().is_once());
    assert_eq!(Every::parse("week").unwrap(), Every::Week);
}

#[test]
fn test_five_field_cron_accepted() {
    let every = Every::parse("*/5 * * * *").unwrap();
    assert_eq!(every.as_str(), "*/5 * * * *");
    assert!(matches!(every, Every::Cron { .. }));
}

#[test]
fn test_invalid_cron_rejected() {
    assert!(Every::parse("99 * * * *").is_err());
    assert!(Every::parse("* * *").is_err());
}

#[test]
fn test_interval_next_after() {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    assert_eq!(Every::Hour.next_after(now), Some(now + Duration::hours(1)));
    assert_eq!(Every::Week.next_after(now), Some(now + Duration::weeks(1)));
    assert_eq!(Every::Once.next_after(now), None);
}

#[test]
fn test_cron_fields_use_local_time() {
    let every = Every::parse("30 3 * * *").unwrap();
    let now = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
    let next = every.next_after(now).unwrap().with_timezone(&Local);
    assert_eq!((next.hour(), next.minute()), (3, 30));
    assert!(next.with_timezone(&Utc) > now);
}

#[test]
fn test_cron_next_after_is_strictly_later() {
    let every = Every::parse("*/5 * * * *").unwrap();
    let on_boundary = Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap();
    let next = every.next_after(on_boundary).unwrap();
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 10, 10, 0).unwrap());

    let mid = Utc.with_ymd_and_hms(2024, 3, 1, 10, 7, 30).unwrap();
    assert_eq!(
        every.next_after(mid).unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 10, 0).unwrap()
    );
}
