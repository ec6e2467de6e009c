//! Authentication strategy resolution tests
//!
//! Every combination of broker URL, token, certificate files and package
//! metadata must select exactly one mode, following the fixed precedence.


use mqtt_cli::auth::{AuthError, AuthInputs, AuthMode, AuthResolver, ProtocolVersion, TlsSetting};
use mqtt_cli::config::CliConfig;
use serde_json::{json, Value};
use tempfile::TempDir;
use test_helpers::{test_jwt, write_certificates, write_manifest, write_password};

#[derive(Debug, Clone, Copy)]
enum Url {
    Absent,
    Plain,
    Tls,
}

struct Fixture {
    working_dir: TempDir,
    home: TempDir,
}

fn fixture(certificates: bool, metadata: bool) -> Fixture {
    let working_dir = tempfile::tempdir().unwrap();
    let home = tempfile::tempdir().unwrap();
    if certificates {
        write_certificates(working_dir.path());
    }
    if metadata {
        write_manifest(working_dir.path(), "pkg", "1.2.3", None);
        write_password(home.path(), "pkg", "s3cret\n");
    }
    Fixture { working_dir, home }
}

fn inputs(fixture: &Fixture, url: Url, jwt: bool) -> AuthInputs {
    AuthInputs {
        broker_url: match url {
            Url::Absent => None,
            Url::Plain => Some("mqtt://broker.example:1884".to_string()),
            Url::Tls => Some("mqtts://broker.example".to_string()),
        },
        jwt: jwt.then(|| test_jwt(&json!({"id": "device-1", "scope": "rw"}))),
        home: Some(fixture.home.path().to_path_buf()),
        working_dir: fixture.working_dir.path().to_path_buf(),
    }
}

fn expected_mode(url: Url, jwt: bool, certificates: bool, metadata: bool) -> Option<AuthMode> {
    match (url, jwt) {
        (Url::Plain | Url::Tls, true) => Some(AuthMode::Jwt),
        (Url::Tls, false) if certificates => Some(AuthMode::Certificate),
        (Url::Tls | Url::Plain, false) => Some(AuthMode::ExplicitUrl),
        (Url::Absent, _) if metadata => Some(AuthMode::Capability),
        (Url::Absent, _) => None,
    }
}

#[test]
fn test_precedence_matrix() {
    let resolver = AuthResolver::new(&CliConfig::default());

    for url in [Url::Absent, Url::Plain, Url::Tls] {
        for jwt in [false, true] {
            for certificates in [false, true] {
                for metadata in [false, true] {
                    let fixture = fixture(certificates, metadata);
                    let result = resolver.resolve(&inputs(&fixture, url, jwt));
                    let expected = expected_mode(url, jwt, certificates, metadata);
                    let case = format!(
                        "url={url:?} jwt={jwt} certificates={certificates} metadata={metadata}"
                    );

                    match expected {
                        Some(mode) => {
                            let config = result.unwrap_or_else(|e| panic!("{case}: {e}"));
                            assert_eq!(config.mode, mode, "{case}");
                        }
                        None => assert!(
                            matches!(result, Err(AuthError::NoAuthMethod(_))),
                            "{case}"
                        ),
                    }
                }
            }
        }
    }
}

#[test]
fn test_jwt_credentials_shape() {
    let fixture = fixture(true, true);
    let config = AuthResolver::new(&CliConfig::default())
        .resolve(&inputs(&fixture, Url::Tls, true))
        .unwrap();

    let username: Value = serde_json::from_str(config.username.as_deref().unwrap()).unwrap();
    assert_eq!(username["id"], "device-1");
    assert_eq!(username["payload"]["scope"], "rw");
    assert_eq!(config.password.as_deref().map(|p| p.split('.').count()), Some(3));
    assert_eq!(config.protocol, ProtocolVersion::V5);
    // Token mode never carries a client certificate
    assert_eq!(config.tls, TlsSetting::DefaultRoots);
}

#[test]
fn test_malformed_jwt_is_fatal() {
    let fixture = fixture(false, true);
    let mut inputs = inputs(&fixture, Url::Plain, false);
    inputs.jwt = Some("not-a-token".to_string());

    let result = AuthResolver::new(&CliConfig::default()).resolve(&inputs);
    assert!(matches!(result, Err(AuthError::InvalidJwt { .. })));
}

#[test]
fn test_capability_client_id() {
    let fixture = fixture(false, true);
    let config = AuthResolver::new(&CliConfig::default())
        .resolve(&inputs(&fixture, Url::Absent, false))
        .unwrap();

    assert_eq!(config.client_id.as_deref(), Some("pkg/1.2.3"));
    assert_eq!(config.password.as_deref(), Some("s3cret"));
    assert_eq!(config.username.as_deref(), Some(r#"{"version":"1.2.3"}"#));
    assert_eq!(config.broker_url(), "mqtt://localhost:1883");
    assert_eq!(config.protocol, ProtocolVersion::V311);
}

#[test]
fn test_capability_namespace_granularity() {
    let working_dir = tempfile::tempdir().unwrap();
    let home = tempfile::tempdir().unwrap();
    write_manifest(working_dir.path(), "pkg", "1.2.3", Some("minor"));
    write_password(home.path(), "pkg", "pw");

    let config = AuthResolver::new(&CliConfig::default())
        .resolve(&AuthInputs {
            home: Some(home.path().to_path_buf()),
            working_dir: working_dir.path().to_path_buf(),
            ..AuthInputs::default()
        })
        .unwrap();
    assert_eq!(config.client_id.as_deref(), Some("pkg/1.2"));
}

#[test]
fn test_capability_missing_password_is_fatal() {
    let working_dir = tempfile::tempdir().unwrap();
    let home = tempfile::tempdir().unwrap();
    write_manifest(working_dir.path(), "pkg", "1.2.3", None);

    let result = AuthResolver::new(&CliConfig::default()).resolve(&AuthInputs {
        home: Some(home.path().to_path_buf()),
        working_dir: working_dir.path().to_path_buf(),
        ..AuthInputs::default()
    });

    match result {
        Err(AuthError::NoAuthMethod(cause)) => {
            assert!(matches!(*cause, AuthError::UnreadableFile { .. }))
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_certificate_mode_loads_bundle() {
    let fixture = fixture(true, false);
    let config = AuthResolver::new(&CliConfig::default())
        .resolve(&inputs(&fixture, Url::Tls, false))
        .unwrap();

    match config.tls {
        TlsSetting::ClientCertificate(bundle) => {
            assert_eq!(bundle.cert, b"cert");
            assert_eq!(bundle.key, b"key");
            assert_eq!(bundle.ca, b"ca");
        }
        other => panic!("expected client certificate, got {other:?}"),
    }
    assert_eq!(config.port, 8883);
}
