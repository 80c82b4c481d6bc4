//! Unit tests for the `AppError` taxonomy and conversions.

use codepunk_rollback::AppError;

#[test]
fn display_prefixes_identify_the_failure_domain() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(
        AppError::GitUnavailable("missing".into()).to_string(),
        "git unavailable: missing"
    );
    assert_eq!(AppError::Git("exit 1".into()).to_string(), "git: exit 1");
    assert_eq!(
        AppError::NotInitialized("store".into()).to_string(),
        "not initialized: store"
    );
    assert_eq!(
        AppError::NotFound("cp-1".into()).to_string(),
        "not found: cp-1"
    );
    assert_eq!(
        AppError::Serialization("corrupt".into()).to_string(),
        "serialization: corrupt"
    );
    assert_eq!(
        AppError::Session("illegal".into()).to_string(),
        "session: illegal"
    );
    assert_eq!(AppError::Io("denied".into()).to_string(), "io: denied");
    assert_eq!(AppError::Cancelled.to_string(), "cancelled");
}

#[test]
fn toml_errors_convert_to_config() {
    let parse_err = toml::from_str::<toml::Value>("= broken").expect_err("invalid toml");
    let err: AppError = parse_err.into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn serde_json_errors_convert_to_serialization() {
    let parse_err = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
    let err: AppError = parse_err.into();
    assert!(matches!(err, AppError::Serialization(_)));
}

#[test]
fn io_errors_convert_to_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: AppError = io_err.into();
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn app_error_implements_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(AppError::Cancelled);
    assert_eq!(err.to_string(), "cancelled");
}
