use sourcepin_core::{CoreError, Engine, RunObserver, RunOptions, Silent, Task, TaskOutcome};
use sourcepin_resolve::testing::{MockHttpServer, MockResponse};
use sourcepin_resolve::{
    DigestResolver, FatalError, Mirror, ProcessError, RegistryError, ResolveContext,
    ResolverConfig,
};
use sourcepin_schema::{ExtractedManifest, Policy, ReferenceRecord, SchemaError, SourceKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const HELLO_SHA256: &str =
    "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

/// Registry double: answers from a table, `"slow"` blocks until the run is
/// cancelled, `"fail"` errors after a short wait, anything missing is not
/// found.
#[derive(Default)]
struct FakeRegistry {
    answers: HashMap<String, String>,
    lookups: Mutex<Vec<String>>,
}

impl FakeRegistry {
    fn with(mut self, reference: &str, answer: &str) -> Self {
        self.answers.insert(reference.to_owned(), answer.to_owned());
        self
    }
}

impl DigestResolver for FakeRegistry {
    fn digest(&self, reference: &str, ctx: &ResolveContext) -> Result<String, RegistryError> {
        self.lookups.lock().unwrap().push(reference.to_owned());
        match self.answers.get(reference).map(String::as_str) {
            Some("slow") => {
                let started = Instant::now();
                while started.elapsed() < Duration::from_secs(10) {
                    if ctx.is_cancelled() {
                        return Err(RegistryError::Process(ProcessError::Cancelled {
                            program: "crane".to_owned(),
                        }));
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(RegistryError::Other("never cancelled".to_owned()))
            }
            Some("fail") => {
                std::thread::sleep(Duration::from_millis(200));
                Err(RegistryError::Other("connection reset by peer".to_owned()))
            }
            Some(digest) => Ok(digest.to_owned()),
            None => Err(RegistryError::NotFound(reference.to_owned())),
        }
    }
}

fn digest(c: char) -> String {
    format!("sha256:{}", c.to_string().repeat(64))
}

fn records(literals: &[&str]) -> Vec<ReferenceRecord> {
    literals
        .iter()
        .enumerate()
        .map(|(i, original)| ReferenceRecord {
            original: (*original).to_owned(),
            line: i as u32 + 1,
        })
        .collect()
}

fn manifest(images: &[&str], http: &[String], git: &[&str]) -> ExtractedManifest {
    let http: Vec<&str> = http.iter().map(String::as_str).collect();
    ExtractedManifest {
        path: Some("Dockerfile".to_owned()),
        images: records(images),
        http: records(&http),
        git: records(git),
    }
}

fn engine(registry: Arc<FakeRegistry>) -> Engine {
    Engine::new(ResolverConfig::default(), registry)
}

fn selectors(policy: &Policy) -> Vec<&str> {
    policy
        .rules
        .iter()
        .map(|r| r.selector.identifier.as_str())
        .collect()
}

fn hello_server() -> MockHttpServer {
    let server = MockHttpServer::start();
    server.route("GET", "/a.txt", MockResponse::ok(b"hello".to_vec()));
    server.route("GET", "/b.txt", MockResponse::ok(b"hello".to_vec()));
    server
}

#[test]
fn duplicates_across_manifests_resolve_once_in_first_seen_order() {
    let server = hello_server();
    let registry = Arc::new(
        FakeRegistry::default()
            .with("docker.io/library/alpine:3.18", &digest('a'))
            .with("docker.io/library/node:20", &digest('b')),
    );

    let manifests = [
        manifest(&["alpine:3.18"], &[server.url("/a.txt")], &[]),
        manifest(
            &["node:20", "alpine:3.18"],
            &[server.url("/b.txt"), server.url("/a.txt")],
            &[],
        ),
    ];
    let report = engine(registry.clone())
        .pin(&manifests, &RunOptions::default(), &Silent)
        .unwrap();

    assert_eq!(
        selectors(&report.policy),
        [
            "docker-image://alpine:3.18".to_owned(),
            "docker-image://node:20".to_owned(),
            server.url("/a.txt"),
            server.url("/b.txt"),
        ]
    );
    assert_eq!(registry.lookups.lock().unwrap().len(), 2);
    let gets = server
        .requests()
        .iter()
        .filter(|r| r.method == "GET" && r.path == "/a.txt")
        .count();
    assert_eq!(gets, 1);
    assert!(report.skipped.is_empty());
}

#[test]
fn policy_carries_pins_and_checksums() {
    let server = hello_server();
    let registry =
        Arc::new(FakeRegistry::default().with("docker.io/library/alpine:3.18", &digest('a')));

    let report = engine(registry)
        .pin(
            &[manifest(&["alpine:3.18"], &[server.url("/a.txt")], &[])],
            &RunOptions::default(),
            &Silent,
        )
        .unwrap();

    let rules = &report.policy.rules;
    assert_eq!(
        rules[0].updates.identifier,
        format!("docker-image://docker.io/library/alpine:3.18@{}", digest('a'))
    );
    assert_eq!(rules[1].updates.attrs["http.checksum"], HELLO_SHA256);
    assert_eq!(rules[1].updates.attrs.len(), 1);
}

#[test]
fn differing_literals_for_the_same_image_give_two_rules() {
    let registry =
        Arc::new(FakeRegistry::default().with("docker.io/library/alpine:3.18", &digest('a')));
    let report = engine(registry)
        .pin(
            &[manifest(
                &["alpine:3.18", "docker.io/library/alpine:3.18", "alpine:3.18"],
                &[],
                &[],
            )],
            &RunOptions::default(),
            &Silent,
        )
        .unwrap();
    assert_eq!(
        selectors(&report.policy),
        [
            "docker-image://alpine:3.18",
            "docker-image://docker.io/library/alpine:3.18"
        ]
    );
}

#[test]
fn digested_images_are_not_looked_up() {
    let registry = Arc::new(FakeRegistry::default());
    let pinned = format!("alpine@{}", digest('a'));
    let report = engine(registry.clone())
        .pin(
            &[manifest(&[&pinned], &[], &[])],
            &RunOptions::default(),
            &Silent,
        )
        .unwrap();
    assert!(report.policy.is_empty());
    assert!(registry.lookups.lock().unwrap().is_empty());
}

#[test]
fn volatile_and_auth_failures_are_skipped() {
    let server = hello_server();
    server.route(
        "HEAD",
        "/nightly.tgz",
        MockResponse::ok(Vec::new()).header("Cache-Control", "no-store"),
    );
    server.route("GET", "/private.tgz", MockResponse::status(401));

    let report = engine(Arc::new(FakeRegistry::default()))
        .pin(
            &[manifest(
                &[],
                &[
                    server.url("/nightly.tgz"),
                    server.url("/a.txt"),
                    server.url("/private.tgz"),
                ],
                &[],
            )],
            &RunOptions::default(),
            &Silent,
        )
        .unwrap();

    assert_eq!(selectors(&report.policy), [server.url("/a.txt")]);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.skipped[0].reference, server.url("/nightly.tgz"));
    assert!(report.skipped[0].reason.contains("no-store"));
    assert_eq!(report.skipped[1].reference, server.url("/private.tgz"));
    assert_eq!(report.skipped[1].kind, SourceKind::Http);
    assert!(!server
        .requests()
        .iter()
        .any(|r| r.method == "GET" && r.path == "/nightly.tgz"));
}

#[test]
fn fatal_error_aborts_and_cancels_other_workers() {
    let server = MockHttpServer::start();
    server.route("GET", "/broken.tgz", MockResponse::status(500));
    let registry =
        Arc::new(FakeRegistry::default().with("docker.io/library/alpine:3.18", "slow"));

    let options = RunOptions::default();
    let started = Instant::now();
    let err = engine(registry)
        .pin(
            &[manifest(&["alpine:3.18"], &[server.url("/broken.tgz")], &[])],
            &options,
            &Silent,
        )
        .unwrap_err();

    match err {
        CoreError::Resolve {
            kind,
            reference,
            source,
        } => {
            assert_eq!(kind, SourceKind::Http);
            assert_eq!(reference, server.url("/broken.tgz"));
            assert!(matches!(source, FatalError::Status { status: 500, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(
        !options.cancel.is_cancelled(),
        "a fatal error must not cancel the caller's token"
    );
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn fatal_error_interrupts_stalled_download() {
    let server = MockHttpServer::start();
    server.route(
        "HEAD",
        "/stalled.tgz",
        MockResponse::ok(Vec::new()).header_delay(Duration::from_secs(30)),
    );
    let registry =
        Arc::new(FakeRegistry::default().with("docker.io/library/alpine:3.18", "fail"));

    let started = Instant::now();
    let err = engine(registry)
        .pin(
            &[manifest(&["alpine:3.18"], &[server.url("/stalled.tgz")], &[])],
            &RunOptions::default(),
            &Silent,
        )
        .unwrap_err();

    assert!(
        matches!(
            err,
            CoreError::Resolve {
                kind: SourceKind::Image,
                ..
            }
        ),
        "{err}"
    );
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "run took {:?}",
        started.elapsed()
    );
}

#[test]
fn length_mismatch_is_fatal() {
    let server = MockHttpServer::start();
    server.route(
        "GET",
        "/short.bin",
        MockResponse::ok(b"hello".to_vec()).declared_length(100),
    );
    let err = engine(Arc::new(FakeRegistry::default()))
        .pin(
            &[manifest(&[], &[server.url("/short.bin")], &[])],
            &RunOptions::default(),
            &Silent,
        )
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("100"), "{message}");
    assert!(message.contains('5'), "{message}");
}

#[test]
fn cancelled_before_start_resolves_nothing() {
    let registry =
        Arc::new(FakeRegistry::default().with("docker.io/library/alpine:3.18", &digest('a')));
    let options = RunOptions::default();
    options.cancel.cancel();

    let err = engine(registry.clone())
        .pin(
            &[manifest(&["alpine:3.18"], &[], &[])],
            &options,
            &Silent,
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    assert!(registry.lookups.lock().unwrap().is_empty());
}

#[test]
fn expired_deadline_is_fatal() {
    let registry =
        Arc::new(FakeRegistry::default().with("docker.io/library/alpine:3.18", &digest('a')));
    let options = RunOptions {
        timeout: Some(Duration::ZERO),
        ..RunOptions::default()
    };
    let err = engine(registry)
        .pin(&[manifest(&["alpine:3.18"], &[], &[])], &options, &Silent)
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Resolve {
            source: FatalError::DeadlineExceeded,
            ..
        }
    ));
}

#[test]
fn invalid_image_reference_fails_before_any_lookup() {
    let registry = Arc::new(FakeRegistry::default());
    let err = engine(registry.clone())
        .pin(
            &[manifest(&["alpine:3.18", "Bad/Name"], &[], &[])],
            &RunOptions::default(),
            &Silent,
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Schema(_)));
    assert!(registry.lookups.lock().unwrap().is_empty());
}

#[test]
fn preferred_mirror_names_the_mirror_image() {
    let registry = Arc::new(
        FakeRegistry::default().with("public.ecr.aws/docker/library/alpine:3.18", &digest('e')),
    );
    let report = engine(registry)
        .with_mirrors(vec![Mirror::EcrPublic])
        .pin(
            &[manifest(&["alpine:3.18"], &[], &[])],
            &RunOptions::default(),
            &Silent,
        )
        .unwrap();
    assert_eq!(
        report.policy.rules[0].updates.identifier,
        format!(
            "docker-image://public.ecr.aws/docker/library/alpine:3.18@{}",
            digest('e')
        )
    );
}

#[derive(Default)]
struct Recorder {
    bytes: AtomicU64,
    declared: Mutex<Vec<Option<u64>>>,
    finished: Mutex<Vec<(usize, TaskOutcome)>>,
}

impl RunObserver for Recorder {
    fn download_started(&self, _task: &Task, declared: Option<u64>) {
        self.declared.lock().unwrap().push(declared);
    }

    fn bytes_received(&self, _task: &Task, n: u64) {
        self.bytes.fetch_add(n, Ordering::SeqCst);
    }

    fn task_finished(&self, task: &Task, outcome: TaskOutcome) {
        self.finished.lock().unwrap().push((task.index, outcome));
    }
}

#[test]
fn observer_sees_progress_and_outcomes() {
    let server = hello_server();
    server.route("GET", "/gone.tgz", MockResponse::status(403));
    let registry =
        Arc::new(FakeRegistry::default().with("docker.io/library/alpine:3.18", &digest('a')));
    let recorder = Recorder::default();

    engine(registry)
        .pin(
            &[manifest(
                &["alpine:3.18"],
                &[server.url("/a.txt"), server.url("/gone.tgz")],
                &[],
            )],
            &RunOptions::default(),
            &recorder,
        )
        .unwrap();

    assert_eq!(recorder.bytes.load(Ordering::SeqCst), 5);
    assert_eq!(*recorder.declared.lock().unwrap(), [Some(5)]);
    let mut finished = recorder.finished.lock().unwrap().clone();
    finished.sort_by_key(|(index, _)| *index);
    assert_eq!(
        finished,
        [
            (0, TaskOutcome::Resolved),
            (1, TaskOutcome::Resolved),
            (2, TaskOutcome::Skipped),
        ]
    );
}

#[test]
fn empty_input_gives_empty_policy() {
    let report = engine(Arc::new(FakeRegistry::default()))
        .pin(&[], &RunOptions::default(), &Silent)
        .unwrap();
    assert!(report.policy.is_empty());
    report.policy.validate().unwrap();
}

#[cfg(unix)]
#[test]
fn git_references_pin_to_the_peeled_commit() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let git = dir.path().join("git");
    let tag_object = "1".repeat(40);
    let commit = "c".repeat(40);
    std::fs::write(
        &git,
        format!(
            "#!/bin/sh\nprintf '{tag_object}\\trefs/tags/v1.0.0\\n{commit}\\trefs/tags/v1.0.0^{{}}\\n'\n"
        ),
    )
    .unwrap();
    std::fs::set_permissions(&git, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = ResolverConfig {
        git_program: git.display().to_string(),
        ..ResolverConfig::default()
    };
    let url = "https://example.com/r.git#v1.0.0";
    let report = Engine::new(config, Arc::new(FakeRegistry::default()))
        .pin(
            &[manifest(&[], &[], &[url, url])],
            &RunOptions::default(),
            &Silent,
        )
        .unwrap();

    assert_eq!(selectors(&report.policy), [url]);
    assert_eq!(report.policy.rules[0].updates.attrs["git.checksum"], commit);
}

#[test]
fn option_like_git_remote_never_reaches_git() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("pwned");
    let url = format!(
        "--upload-pack=touch {}#{}",
        marker.display(),
        dir.path().display()
    );

    let err = engine(Arc::new(FakeRegistry::default()))
        .pin(
            &[manifest(&[], &[], &[url.as_str()])],
            &RunOptions::default(),
            &Silent,
        )
        .unwrap_err();

    assert!(
        matches!(
            err,
            CoreError::Schema(SchemaError::InvalidGitReference { .. })
        ),
        "{err}"
    );
    assert!(!marker.exists());
}
