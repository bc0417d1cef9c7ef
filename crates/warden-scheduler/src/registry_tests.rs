use super::*;
use serde_json::json;
use tempfile::TempDir;

fn write_plugin(root: &Path, id: &str, manifest: &Value) {
    let dir = root.join(id);
    fs::create_dir_all(dir.join("jobs")).unwrap();
    fs::write(dir.join(MANIFEST), manifest.to_string()).unwrap();
}

#[test]
fn test_load_valid_plugins() {
    let root = TempDir::new().unwrap();
    write_plugin(
        root.path(),
        "geo",
        &json!({"id": "geo", "jobs": [
            {"name": "geo-download", "file": "download.py", "every": "day", "reload": true},
            {"name": "geo-check", "file": "check.py", "every": "hour", "reload": false}
        ]}),
    );
    write_plugin(root.path(), "misc", &json!({"id": "misc"}));

    let jobs = JobRegistry::new(vec![root.path().to_path_buf()]).load();
    assert_eq!(jobs.len(), 2);
    let names: Vec<&str> = jobs["geo"].iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["geo-download", "geo-check"]);
    assert!(jobs["misc"].is_empty());
    assert_eq!(jobs["geo"][0].path, root.path().join("geo"));
}

#[test]
fn test_invalid_entries_dropped_rest_kept() {
    let root = TempDir::new().unwrap();
    write_plugin(
        root.path(),
        "blacklist",
        &json!({"jobs": [
            {"name": "missing-reload", "file": "a.py", "every": "hour"},
            {"name": "bad name!", "file": "a.py", "every": "hour", "reload": false},
            {"name": "bad-every", "file": "a.py", "every": "sometimes", "reload": false},
            {"name": "ok", "file": "ok.py", "every": "*/5 * * * *", "reload": false}
        ]}),
    );

    let jobs = JobRegistry::new(vec![root.path().to_path_buf()]).load();
    assert_eq!(jobs["blacklist"].len(), 1);
    assert_eq!(jobs["blacklist"][0].name, "ok");
}

#[test]
fn test_malformed_manifest_contributes_no_jobs() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("broken");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(MANIFEST), "{not json").unwrap();

    let jobs = JobRegistry::new(vec![root.path().to_path_buf()]).load();
    assert!(jobs["broken"].is_empty());
}

#[test]
fn test_directory_without_manifest_skipped() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("empty")).unwrap();

    let jobs = JobRegistry::new(vec![root.path().to_path_buf()]).load();
    assert!(jobs.is_empty());
}

#[test]
fn test_missing_root_is_not_fatal() {
    let jobs = JobRegistry::new(vec![PathBuf::from("/nonexistent/warden/plugins")]).load();
    assert!(jobs.is_empty());
}

#[test]
fn test_later_root_replaces_plugin() {
    let core = TempDir::new().unwrap();
    let external = TempDir::new().unwrap();
    write_plugin(
        core.path(),
        "geo",
        &json!({"jobs": [{"name": "core-job", "file": "a.py", "every": "day", "reload": false}]}),
    );
    write_plugin(
        external.path(),
        "geo",
        &json!({"jobs": [{"name": "ext-job", "file": "a.py", "every": "day", "reload": false}]}),
    );

    let jobs = JobRegistry::new(vec![core.path().to_path_buf(), external.path().to_path_buf()])
        .load();
    assert_eq!(jobs["geo"].len(), 1);
    assert_eq!(jobs["geo"][0].name, "ext-job");
}

#[test]
fn test_every_load_builds_new_map() {
    let root = TempDir::new().unwrap();
    let registry = JobRegistry::new(vec![root.path().to_path_buf()]);
    write_plugin(
        root.path(),
        "a",
        &json!({"jobs": [{"name": "a", "file": "a.py", "every": "day", "reload": false}]}),
    );
    assert_eq!(registry.load().len(), 1);

    fs::remove_dir_all(root.path().join("a")).unwrap();
    assert!(registry.load().is_empty());
}
