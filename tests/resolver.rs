// ABOUTME: Registry credential lookup and its effect on image resolution.
// ABOUTME: Uses temporary client config directories and scoped environment variables.

mod support;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use support::*;
use watchtower::engine::{Engine, EngineOptions};
use watchtower::resolver::{
    CredentialError, CredentialSource, DockerCredentials, ImageResolver, REPO_PASS_ENV,
    REPO_USER_ENV, WarnStrategy,
};
use watchtower::runtime::{MockRuntime, RegistryAuth};
use watchtower::session::Trigger;
use watchtower::types::ImageRef;
use watchtower::update::{self, UpdateParams};

const NO_REPO_ENV: [(&str, Option<&str>); 2] = [(REPO_USER_ENV, None), (REPO_PASS_ENV, None)];

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn lookup(credentials: &DockerCredentials, image: &str) -> Result<Option<RegistryAuth>, CredentialError> {
    let image = ImageRef::parse(image).unwrap();
    block_on(credentials.lookup(&image))
}

fn write_config(dir: &Path, json: &str) {
    fs::write(dir.join("config.json"), json).unwrap();
}

#[test]
fn environment_credentials_win() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), r#"{"auths":{"ghcr.io":{"username":"file","password":"file"}}}"#);
    let credentials = DockerCredentials::new(dir.path());

    temp_env::with_vars([(REPO_USER_ENV, Some("robot")), (REPO_PASS_ENV, Some("hunter2"))], || {
        let auth = lookup(&credentials, "ghcr.io/org/app:1").unwrap().unwrap();
        assert_eq!(auth.username, "robot");
        assert_eq!(auth.password, "hunter2");
        assert!(auth.server.is_none());
    });
}

#[test]
fn repo_pass_may_name_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let secret = dir.path().join("repo_pass");
    fs::write(&secret, "from-file\n").unwrap();
    let credentials = DockerCredentials::new(dir.path());

    temp_env::with_vars(
        [(REPO_USER_ENV, Some("robot")), (REPO_PASS_ENV, Some(secret.to_str().unwrap()))],
        || {
            let auth = lookup(&credentials, "nginx").unwrap().unwrap();
            assert_eq!(auth.password, "from-file");
        },
    );
}

#[test]
fn config_auths_match_by_registry_host() {
    let dir = tempfile::tempdir().unwrap();
    let encoded = STANDARD.encode("alice:s3cret");
    write_config(
        dir.path(),
        &format!(
            r#"{{"auths":{{"https://index.docker.io/v1/":{{"auth":"{0}"}},"ghcr.io":{{"auth":"{0}"}}}}}}"#,
            encoded
        ),
    );
    let credentials = DockerCredentials::new(dir.path());

    temp_env::with_vars(NO_REPO_ENV, || {
        let hub = lookup(&credentials, "containrrr/watchtower").unwrap().unwrap();
        assert_eq!(hub.username, "alice");
        assert_eq!(hub.server.as_deref(), Some("index.docker.io"));

        let ghcr = lookup(&credentials, "ghcr.io/org/app:2").unwrap().unwrap();
        assert_eq!(ghcr.password, "s3cret");

        assert!(lookup(&credentials, "quay.io/org/app").unwrap().is_none());
    });
}

#[test]
fn missing_config_means_anonymous() {
    let dir = tempfile::tempdir().unwrap();
    let credentials = DockerCredentials::new(dir.path());

    temp_env::with_vars(NO_REPO_ENV, || {
        assert!(lookup(&credentials, "nginx:1.25").unwrap().is_none());
    });
}

#[test]
fn unreadable_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), "{ not json");
    let credentials = DockerCredentials::new(dir.path());

    temp_env::with_vars(NO_REPO_ENV, || {
        assert!(matches!(
            lookup(&credentials, "nginx"),
            Err(CredentialError::ParseConfig { .. })
        ));
    });
}

#[test]
fn credential_failure_skips_the_container() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), "{ not json");
    let mock = Arc::new(MockRuntime::new());
    seed_stale(&mock, ContainerFixture::new("web", "web:1", &image_id("w1")), "web:1", "w1", "w2");
    let resolver = ImageResolver::new(
        Arc::new(DockerCredentials::new(dir.path())),
        None,
        WarnStrategy::Never,
    );
    let engine = Engine::new(
        mock.clone(),
        resolver,
        EngineOptions {
            pull_images: true,
            ..Default::default()
        },
    );

    temp_env::with_vars(NO_REPO_ENV, || {
        let report = block_on(update::update(&engine, &UpdateParams::default(), Trigger::Scheduler)).unwrap();
        assert_eq!(names(&report.skipped), vec!["web"]);
        assert!(report.scanned.is_empty());
        assert!(mock.pull_credentials().is_empty());
    });
}

#[test]
fn pulls_carry_resolved_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockRuntime::new());
    seed_stale(&mock, ContainerFixture::new("web", "web:1", &image_id("w1")), "web:1", "w1", "w2");
    let engine = Engine::new(
        mock.clone(),
        ImageResolver::new(Arc::new(DockerCredentials::new(dir.path())), None, WarnStrategy::Never),
        EngineOptions {
            pull_images: true,
            ..Default::default()
        },
    );

    temp_env::with_vars([(REPO_USER_ENV, Some("robot")), (REPO_PASS_ENV, Some("hunter2"))], || {
        block_on(update::update(&engine, &UpdateParams::default(), Trigger::Scheduler)).unwrap();
    });

    let pulls = mock.pull_credentials();
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].as_ref().unwrap().username, "robot");
}
