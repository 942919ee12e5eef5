use relay_agent::core::middleware::Approval;
use relay_agent::core::{Error, Role};
use relay_agent::tools::{Outbox, SentEmail};
use relay_agent::{Session, SessionBuilder};
use relay_agent_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use serde_json::json;

fn send_email_script() -> TestModelProvider {
    TestModelProvider::with_responses([
        PresetResponse::with_events([PresetEvent::tool_call(
            "call:1",
            "send_email",
            json!({
                "recipient": "user@example.com",
                "subject": "Status",
                "body": "All good",
            }),
        )]),
        PresetResponse::text("Done."),
    ])
}

fn session(
    provider: TestModelProvider,
    decide: impl Fn(Approval) + Send + Sync + 'static,
) -> Session {
    SessionBuilder::with_model_provider(provider)
        .with_system_prompt("You are an email assistant.")
        .on_tool_call_request(decide)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_read_email() {
    let provider = TestModelProvider::with_responses([
        PresetResponse::with_events([PresetEvent::tool_call(
            "call:1",
            "read_email",
            json!({ "email_id": "42" }),
        )]),
        PresetResponse::text("It's a test email."),
    ]);
    // Reading is never interrupted.
    let session = session(provider, |_| panic!("unexpected approval"));

    let outcome = session.send_message("What does email 42 say?").await.unwrap();
    assert_eq!(
        outcome.final_message().map(|msg| msg.content()),
        Some("It's a test email.")
    );

    let history = session.history().await;
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].role(), Role::User);
    assert_eq!(history[2].role(), Role::Tool);
    assert_eq!(
        history[2].content(),
        "Contents of email 42: Hello, this is a test email."
    );
}

#[tokio::test]
async fn test_send_email_approved() {
    let session = session(send_email_script(), |approval| {
        assert_eq!(approval.what(), "send_email");
        assert_eq!(approval.arguments()["recipient"], "user@example.com");
        approval.approve();
    });

    session.send_message("Tell the user it's fine").await.unwrap();
    assert_eq!(
        session.outbox().sent(),
        vec![SentEmail {
            recipient: "user@example.com".to_owned(),
            subject: "Status".to_owned(),
            body: "All good".to_owned(),
        }]
    );

    let history = session.history().await;
    assert_eq!(
        history[2].content(),
        "Email sent to user@example.com. Subject: Status"
    );
}

#[tokio::test]
async fn test_send_email_edited() {
    let outbox = Outbox::new();
    let session = SessionBuilder::with_model_provider(send_email_script())
        .with_outbox(outbox.clone())
        .on_tool_call_request(|approval| {
            approval.edit(json!({
                "recipient": "boss@example.com",
                "subject": "Status",
                "body": "All good",
            }));
        })
        .build()
        .unwrap();

    session.send_message("Tell the user it's fine").await.unwrap();
    let sent = outbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "boss@example.com");
}

#[tokio::test]
async fn test_send_email_rejected() {
    let session = session(send_email_script(), |approval| {
        approval.reject(Some("not now".to_owned()));
    });

    let outcome = session.send_message("Tell the user it's fine").await.unwrap();
    assert_eq!(
        outcome.final_message().map(|msg| msg.content()),
        Some("Done.")
    );
    assert!(session.outbox().sent().is_empty());

    let history = session.history().await;
    assert!(history[2].is_error());
    assert!(history[2].content().contains("not now"));
}

#[tokio::test]
async fn test_blocked_keyword() {
    let provider = TestModelProvider::with_responses([PresetResponse::text(
        "Your password is hunter2.",
    )]);
    let session = SessionBuilder::with_model_provider(provider.clone())
        .with_blocked_keywords(["password"])
        .with_thread_id("blocked")
        .build()
        .unwrap();

    let outcome = session.send_message("What's my password?").await.unwrap();
    assert_eq!(
        outcome.final_message().map(|msg| msg.content()),
        Some("I cannot respond to that request.")
    );
    assert_eq!(provider.call_count(), 0);
    assert_eq!(session.thread_id().as_str(), "blocked");
}

#[tokio::test]
async fn test_invalid_config() {
    let result = SessionBuilder::with_model_provider(TestModelProvider::default())
        .with_config(relay_agent::core::AgentConfig::default().with_recursion_limit(0))
        .build();
    assert!(matches!(result, Err(Error::Configuration(_))));
}
