use std::time::Duration;

use threatsync::SyncError;

#[test]
fn test_error_display() {
    let err = SyncError::NotFound("Source not found".into());
    assert_eq!(err.to_string(), "not found: Source not found");

    let err = SyncError::Timeout {
        after: Duration::from_secs(30),
    };
    assert_eq!(err.to_string(), "request timed out after 30s");

    let err = SyncError::Server {
        status: 502,
        message: "bad gateway".into(),
    };
    assert_eq!(err.to_string(), "server error (502): bad gateway");
}

#[test]
fn test_status_classification() {
    assert!(matches!(SyncError::from_status(401, ""), SyncError::Unauthorized));
    assert!(matches!(SyncError::from_status(404, ""), SyncError::NotFound(_)));
    assert!(matches!(
        SyncError::from_status(400, r#"{"detail": "Source URL already exists"}"#),
        SyncError::Validation { status: 400, .. }
    ));
    assert!(matches!(
        SyncError::from_status(409, "conflict"),
        SyncError::Validation { status: 409, .. }
    ));
    assert!(matches!(
        SyncError::from_status(500, ""),
        SyncError::Server { status: 500, .. }
    ));
    assert!(matches!(
        SyncError::from_status(301, "moved"),
        SyncError::UnexpectedStatus { status: 301, .. }
    ));
}

#[test]
fn test_failure_predicates() {
    let network = SyncError::Network("connection refused".into());
    let timeout = SyncError::Timeout {
        after: Duration::from_secs(1),
    };
    assert!(network.is_network_failure());
    assert!(!network.is_timeout());
    assert!(timeout.is_network_failure());
    assert!(timeout.is_timeout());

    assert!(SyncError::Unauthorized.is_auth_failure());
    assert!(SyncError::InvalidCredentials.is_auth_failure());
    assert!(!SyncError::SessionSuperseded.is_auth_failure());
}

#[test]
fn test_status_codes() {
    assert_eq!(SyncError::Unauthorized.status(), Some(401));
    assert_eq!(SyncError::NotFound(String::new()).status(), Some(404));
    assert_eq!(SyncError::from_status(422, "{}").status(), Some(422));
    assert_eq!(SyncError::Network("reset".into()).status(), None);
    assert_eq!(SyncError::InvalidCredentials.status(), None);
}

#[test]
fn test_labels_are_distinct() {
    let errors = [
        SyncError::Network(String::new()),
        SyncError::Timeout {
            after: Duration::ZERO,
        },
        SyncError::Unauthorized,
        SyncError::NotFound(String::new()),
        SyncError::from_status(422, ""),
        SyncError::from_status(500, ""),
        SyncError::from_status(304, ""),
        SyncError::InvalidCredentials,
        SyncError::SessionSuperseded,
        SyncError::Decode(String::new()),
        SyncError::Storage(String::new()),
        SyncError::Configuration(String::new()),
    ];
    let mut labels: Vec<&str> = errors.iter().map(SyncError::label).collect();
    labels.sort_unstable();
    labels.dedup();
    assert_eq!(labels.len(), errors.len());
}

#[test]
fn test_json_errors_become_decode() {
    let err: SyncError = serde_json::from_str::<u32>("nope").unwrap_err().into();
    assert!(matches!(err, SyncError::Decode(_)));
}
