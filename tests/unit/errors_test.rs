use bookmark_sync::types::errors::*;
use rstest::rstest;

// === BackendError Tests ===

#[rstest]
#[case(BackendError::MissingTable("bookmarks".into()), "Table not found: bookmarks")]
#[case(BackendError::PolicyDenied("rls".into()), "Denied by access policy: rls")]
#[case(
    BackendError::Rejected { status: 500, message: "boom".into() },
    "Backend rejected request (500): boom"
)]
#[case(BackendError::Network("timeout".into()), "Network error: timeout")]
#[case(BackendError::NoSession, "No active session")]
#[case(BackendError::Decode("eof".into()), "Malformed backend response: eof")]
fn backend_error_display(#[case] err: BackendError, #[case] expected: &str) {
    assert_eq!(err.to_string(), expected);
}

#[test]
fn backend_error_from_serde_json_is_decode() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(BackendError::from(json_err), BackendError::Decode(_)));
}

// === FetchError Tests ===

#[test]
fn fetch_error_wraps_backend_error() {
    let err = FetchError::from(BackendError::Network("down".into()));
    assert_eq!(err.to_string(), "Failed to fetch bookmarks: Network error: down");
}

// === DispatchError Tests ===

#[rstest]
#[case(
    BackendError::MissingTable("bookmarks".into()),
    DispatchError::BackendRejected(RejectReason::MissingTable("bookmarks".into()))
)]
#[case(
    BackendError::PolicyDenied("rls".into()),
    DispatchError::BackendRejected(RejectReason::PolicyDenied("rls".into()))
)]
#[case(
    BackendError::Rejected { status: 409, message: "conflict".into() },
    DispatchError::BackendRejected(RejectReason::Other { status: 409, message: "conflict".into() })
)]
#[case(BackendError::Network("reset".into()), DispatchError::Network("reset".into()))]
#[case(BackendError::NoSession, DispatchError::NotAuthenticated)]
#[case(
    BackendError::Decode("bad json".into()),
    DispatchError::BackendRejected(RejectReason::Other { status: 0, message: "bad json".into() })
)]
fn dispatch_error_from_backend_error(#[case] source: BackendError, #[case] expected: DispatchError) {
    assert_eq!(DispatchError::from(source), expected);
}

#[test]
fn dispatch_error_display_variants() {
    assert_eq!(DispatchError::NotAuthenticated.to_string(), "Not authenticated");
    assert_eq!(
        DispatchError::Validation("title".into()).to_string(),
        "Validation failed: title must not be empty"
    );
    assert_eq!(
        DispatchError::BackendRejected(RejectReason::MissingTable("x".into())).to_string(),
        "Backend rejected mutation: the bookmarks table is missing: x"
    );
    assert_eq!(
        DispatchError::BackendRejected(RejectReason::Other {
            status: 500,
            message: "boom".into()
        })
        .to_string(),
        "Backend rejected mutation: boom (status 500)"
    );
}

// === ChannelError Tests ===

#[test]
fn channel_error_display_variants() {
    assert_eq!(ChannelError::AlreadyOpen.to_string(), "Change channel already open");
    assert_eq!(
        ChannelError::from(BackendError::NoSession).to_string(),
        "Failed to open change channel: No active session"
    );
    assert_eq!(
        ChannelError::Protocol("bad frame".into()).to_string(),
        "Change channel protocol error: bad frame"
    );
}

// === ConfigError Tests ===

#[test]
fn config_error_implements_error_trait() {
    let err: Box<dyn std::error::Error> = Box::new(ConfigError::InvalidValue("x".into()));
    assert_eq!(err.to_string(), "Invalid config value: x");
    assert!(err.source().is_none());
}
