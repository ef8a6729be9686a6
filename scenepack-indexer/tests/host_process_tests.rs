//! Process-backed extraction host driven by stand-in shell scripts
//!
//! Serialized: writing a script and exec-ing it right away can hit
//! ETXTBSY when another test forks at the same moment.

#![cfg(unix)]

use scenepack_common::config::{HostConfig, WORKER_ARG};
use scenepack_common::db::PatternSnapshot;
use scenepack_indexer::extraction::host::WORKER_SCRIPT;
use scenepack_indexer::extraction::{run_extraction, ExtractionError, ExtractionHost, ExtractionMode, ExtractionRequest, ProcessHost};
use serial_test::serial;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

/// Test bed: a container file, a worker script and a private temp dir
struct Bed {
    dir: TempDir,
    container: PathBuf,
    temp: PathBuf,
}

impl Bed {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pack = dir.path().join("pack");
        std::fs::create_dir_all(&pack).unwrap();
        let container = pack.join("city.blend");
        std::fs::write(&container, b"BLENDER").unwrap();
        let temp = dir.path().join("tmp");
        std::fs::create_dir_all(&temp).unwrap();
        Self { dir, container, temp }
    }

    /// Host running `body` as a POSIX shell script
    ///
    /// The script sees `-- <request> <container> <output>`; `$out` holds the
    /// output path.
    fn host(&self, body: &str) -> ProcessHost {
        let script = self.dir.path().join("worker.sh");
        let text = format!("#!/bin/sh\nfor a in \"$@\"; do out=\"$a\"; done\n{}\n", body);
        std::fs::write(&script, text).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        ProcessHost::new(script, Vec::new()).with_temp_dir(&self.temp)
    }

    fn temp_is_empty(&self) -> bool {
        std::fs::read_dir(&self.temp).unwrap().next().is_none()
    }
}

fn quick_scan() -> ExtractionRequest {
    ExtractionRequest::quick_scan(PatternSnapshot::default())
}

#[tokio::test]
#[serial]
async fn test_worker_report_parsed() {
    let bed = Bed::new();
    // Checks the argument layout, request body and working directory
    let host = bed.host(
        r#"[ "$1" = "--" ] || exit 3
grep -q '"mode": "quick_scan"' "$2" || exit 4
[ -f "$(basename "$3")" ] || exit 5
cat > "$out" <<'EOF'
{"success": true, "groups": [{"name": "Tower", "children": [], "elements": [], "has_mesh": true}]}
EOF"#,
    );

    let report = host.extract(&bed.container, &quick_scan(), TIMEOUT).await.unwrap();
    assert!(report.success);
    assert_eq!(report.groups.len(), 1);
    assert!(report.group("Tower").unwrap().has_mesh);
    assert!(bed.temp_is_empty());
}

#[tokio::test]
#[serial]
async fn test_worker_reported_failure() {
    let bed = Bed::new();
    let host = bed.host(
        r#"printf '%s' '{"success": false, "error": "Group not found: Tower", "traceback": "line 12"}' > "$out""#,
    );
    let request = ExtractionRequest::single_group("Tower", PatternSnapshot::default());

    let report = host.extract(&bed.container, &request, TIMEOUT).await.unwrap();
    assert!(!report.success);

    let err = run_extraction(&host, &bed.container, &request, TIMEOUT).await.unwrap_err();
    match err {
        ExtractionError::WorkerReported { message, traceback } => {
            assert!(message.contains("Tower"));
            assert_eq!(traceback.as_deref(), Some("line 12"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn test_non_zero_exit_keeps_output_tails() {
    let bed = Bed::new();
    let host = bed.host("echo 'loading city.blend'\necho 'Error: file is corrupt' >&2\nexit 2");

    let err = host.extract(&bed.container, &quick_scan(), TIMEOUT).await.unwrap_err();
    match &err {
        ExtractionError::NonZeroExit {
            code,
            stderr_tail,
            stdout_tail,
        } => {
            assert_eq!(*code, Some(2));
            assert!(stderr_tail.contains("file is corrupt"));
            assert!(stdout_tail.contains("loading city.blend"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!err.is_transient());
    assert!(bed.temp_is_empty());
}

#[tokio::test]
#[serial]
async fn test_timeout_kills_worker() {
    let bed = Bed::new();
    let host = bed.host("exec sleep 30");

    let started = std::time::Instant::now();
    let err = host
        .extract(&bed.container, &quick_scan(), Duration::from_millis(300))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(matches!(
        err,
        ExtractionError::Timeout {
            mode: ExtractionMode::QuickScan,
            ..
        }
    ));
    assert!(err.is_transient());
    assert!(bed.temp_is_empty());
}

#[tokio::test]
#[serial]
async fn test_missing_output() {
    let bed = Bed::new();
    let host = bed.host("exit 0");

    let err = host.extract(&bed.container, &quick_scan(), TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ExtractionError::MissingOutput(_)));
}

#[tokio::test]
#[serial]
async fn test_malformed_output() {
    let bed = Bed::new();
    let host = bed.host(r#"echo 'Blender quit unexpectedly' > "$out""#);

    let err = host.extract(&bed.container, &quick_scan(), TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ExtractionError::MalformedOutput(_)));
    assert!(bed.temp_is_empty());
}

#[tokio::test]
#[serial]
async fn test_spawn_failure() {
    let bed = Bed::new();
    let host = ProcessHost::new(bed.dir.path().join("no-such-host"), Vec::new()).with_temp_dir(&bed.temp);

    let err = host.extract(&bed.container, &quick_scan(), TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ExtractionError::Spawn(_)));
    assert!(bed.temp_is_empty());
}

#[tokio::test]
#[serial]
async fn test_invalid_request_never_spawns() {
    let bed = Bed::new();
    let marker = bed.dir.path().join("ran");
    let host = bed.host(&format!("touch '{}'", marker.display()));
    let request = ExtractionRequest::standalone(&[], PatternSnapshot::default());

    let err = host.extract(&bed.container, &request, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ExtractionError::InvalidRequest(_)));
    assert!(!Path::new(&marker).exists());
}

#[tokio::test]
#[serial]
async fn test_missing_container() {
    let bed = Bed::new();
    let host = bed.host("exit 0");

    let err = host
        .extract(&bed.dir.path().join("absent.blend"), &quick_scan(), TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::Io(_)));
}

#[tokio::test]
#[serial]
async fn test_default_host_is_headless_with_bundled_worker() {
    let bed = Bed::new();
    let host = ProcessHost::from_config(&HostConfig::default()).with_temp_dir(&bed.temp);
    assert_eq!(host.executable(), Path::new("blender"));

    let args = host.resolved_args().await.unwrap();
    assert_eq!(args.len(), 3);
    assert_eq!(args[0], "--background");
    assert_eq!(args[1], "--python");

    let worker = PathBuf::from(&args[2]);
    assert_eq!(worker.parent(), Some(bed.temp.as_path()));
    assert_eq!(std::fs::read_to_string(&worker).unwrap(), WORKER_SCRIPT);

    // Installed once per host
    assert_eq!(host.resolved_args().await.unwrap(), args);
    assert_eq!(std::fs::read_dir(&bed.temp).unwrap().count(), 1);
}

#[tokio::test]
#[serial]
async fn test_configured_worker_script() {
    let bed = Bed::new();
    let custom = bed.dir.path().join("custom_worker.py");
    std::fs::write(&custom, "print('custom')").unwrap();

    let config = HostConfig {
        worker_script: Some(custom.clone()),
        ..HostConfig::default()
    };
    let host = ProcessHost::from_config(&config).with_temp_dir(&bed.temp);
    let args = host.resolved_args().await.unwrap();
    assert_eq!(PathBuf::from(&args[2]), custom);
    assert!(bed.temp_is_empty());

    let missing = HostConfig {
        worker_script: Some(bed.dir.path().join("absent.py")),
        ..HostConfig::default()
    };
    let host = ProcessHost::from_config(&missing).with_temp_dir(&bed.temp);
    let err = host.resolved_args().await.unwrap_err();
    assert!(matches!(err, ExtractionError::Spawn(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
#[serial]
async fn test_worker_placeholder_resolved_at_launch() {
    let bed = Bed::new();
    let script = bed.dir.path().join("host.sh");
    // The first argument must be the installed worker, followed by `--`
    std::fs::write(
        &script,
        r#"#!/bin/sh
for a in "$@"; do out="$a"; done
grep -q 'open_mainfile' "$1" || exit 3
[ "$2" = "--" ] || exit 4
printf '%s' '{"success": true}' > "$out"
"#,
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let host = ProcessHost::new(script, vec![WORKER_ARG.to_string()]).with_temp_dir(&bed.temp);
    let report = host.extract(&bed.container, &quick_scan(), TIMEOUT).await.unwrap();
    assert!(report.success);

    // Only the installed worker is left behind
    let left: Vec<_> = std::fs::read_dir(&bed.temp)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(left.len(), 1);
}
