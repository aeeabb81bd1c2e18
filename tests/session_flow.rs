use framez::backend::local::{LocalBackend, LocalOptions};
use framez::backend::ErrorCode;
use framez::config::Config;
use framez::state::App;
use tempfile::TempDir;

async fn open_app(dir: &TempDir) -> App {
    let backend = LocalBackend::open(
        &dir.path().join("framez.db"),
        LocalOptions {
            poll_interval: None,
            bcrypt_cost: 4,
            ..LocalOptions::default()
        },
    )
    .expect("Failed to open backend");
    App::with_backend(Config::default(), backend).await
}

#[tokio::test]
async fn test_session_survives_restart_until_sign_out() {
    let dir = TempDir::new().unwrap();

    let uid = {
        let app = open_app(&dir).await;
        app.session
            .sign_up("frank", "frank@example.com", "Secret123")
            .await
            .unwrap()
            .uid
    };

    let app = open_app(&dir).await;
    let state = app.session.state().await;
    assert!(state.is_authenticated());
    assert_eq!(state.user.unwrap().uid, uid);

    app.session.sign_out().await.unwrap();
    drop(app);

    let app = open_app(&dir).await;
    assert!(!app.session.state().await.is_authenticated());
}

#[tokio::test]
async fn test_sign_in_by_username_and_error_messages() {
    let dir = TempDir::new().unwrap();
    let app = open_app(&dir).await;

    app.session
        .sign_up("Grace", "grace@example.com", "Secret123")
        .await
        .unwrap();
    app.session.sign_out().await.unwrap();

    let user = app.session.sign_in("GRACE", "Secret123").await.unwrap();
    assert_eq!(app.users.get_username(&user).await, "grace");

    let err = app
        .session
        .sign_up("other", "grace@example.com", "Secret123")
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&ErrorCode::EmailAlreadyInUse));
    assert_eq!(err.user_message(), "An account with this email already exists");

    let err = app
        .session
        .sign_up("weak", "weak@example.com", "123")
        .await
        .unwrap_err();
    assert_eq!(
        err.user_message(),
        "Password is too weak. Please use at least 6 characters"
    );
}
