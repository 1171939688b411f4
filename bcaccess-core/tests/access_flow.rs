/*
    Access Flow Integration Tests

    Drives the orchestrator end to end with a scripted prompt:
    - sign-in against an existing key
    - sign-up with alias registration and progress
    - validation failing before any key store or ledger access
    - idempotent get_node and identity switching
    - import resolving into a pre-filled sign-in
*/

use bcaccess_core::access::{AccessOptions, AccessState, SignUpProgress};
use bcaccess_core::callbacks::AccessEvent;
use bcaccess_core::core_identity::{Keystore, Password};
use bcaccess_core::test_utils::*;
use bcaccess_core::AccessError;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const LIMIT: Duration = Duration::from_secs(30);

fn store_key(stack: &TestStack, alias: &str) {
    stack
        .keystore
        .inner()
        .create(alias, &Password::from(TEST_PASSWORD))
        .unwrap();
}

/// **P1: sign-in with the right password yields the alias's node**
#[tokio::test]
async fn test_sign_in_with_existing_key() {
    let dir = tempdir().unwrap();
    let stack = TestStack::new(dir.path()).unwrap();
    store_key(&stack, "alice");

    stack.prompt.then(vec![
        sign_in("alice", "wrongpassword"),
        sign_in("alice", TEST_PASSWORD),
    ]);

    let node = assert_completes_within(LIMIT, stack.orchestrator.get_node())
        .await
        .unwrap();
    assert_eq!(node.alias(), "alice");
    assert_eq!(
        stack.prompt.errors(),
        vec!["Authentication failed for alice".to_string()]
    );
    assert_eq!(
        stack.callbacks.events(),
        vec![AccessEvent::SignedIn("alice".into())]
    );
    assert_eq!(
        stack.prompt.last_dialog().unwrap().state(),
        AccessState::Resolved
    );
}

/// **P1: a wrong password never produces a node**
#[tokio::test]
async fn test_wrong_password_only() {
    let dir = tempdir().unwrap();
    let stack = TestStack::build(
        dir.path(),
        ScriptedPrompt::cancelling(),
        AccessOptions {
            node_timeout: Some(Duration::from_millis(500)),
            ..Default::default()
        },
    )
    .unwrap();
    store_key(&stack, "alice");
    stack.prompt.then(vec![sign_in("alice", "wrongpassword")]);

    let result = stack.orchestrator.get_node().await;
    assert!(matches!(result, Err(AccessError::TimedOut(_))));
    assert!(stack.session.node().await.is_none());
    assert!(stack.callbacks.events().is_empty());
}

/// **P7: sign-up registers the alias and reports progress ending at 1.0**
#[tokio::test]
async fn test_sign_up_end_to_end() {
    let dir = tempdir().unwrap();
    let stack = TestStack::new(dir.path()).unwrap();
    stack.prompt.then(vec![sign_up("bob", TEST_PASSWORD, TEST_PASSWORD)]);

    let node = assert_completes_within(LIMIT, stack.orchestrator.get_node())
        .await
        .unwrap();

    assert_eq!(node.alias(), "bob");
    assert_eq!(stack.ledger.registers(), 1);
    assert_eq!(
        stack.prompt.progress().first(),
        Some(&SignUpProgress::CreatingKeys)
    );
    assert_progress_completes(&stack.prompt.registration_fractions());
    assert_eq!(
        stack.callbacks.events(),
        vec![AccessEvent::SignedUp("bob".into())]
    );
}

/// **P3: a short password fails before the key store or ledger is touched**
#[tokio::test]
async fn test_short_password_checked_first() {
    let dir = tempdir().unwrap();
    let stack = TestStack::new(dir.path()).unwrap();
    let dialog_requests = vec![sign_in("alice", "abc"), sign_up("alice", "abc", "abc")];
    stack.prompt.then(dialog_requests);

    let orchestrator = stack.orchestrator.clone();
    let waiter = tokio::spawn(async move { orchestrator.get_node().await });

    let prompt = stack.prompt.clone();
    assert!(wait_until(LIMIT, || prompt.errors().len() == 2).await);
    assert_eq!(
        stack.prompt.errors()[0],
        "Password Too Short: 3 Minimum: 8"
    );
    assert_eq!(stack.keystore.key_accesses(), 0);
    assert_eq!(stack.ledger.network_calls(), 0);

    stack.orchestrator.cancel();
    assert!(matches!(waiter.await.unwrap(), Err(AccessError::Cancelled)));
}

/// **P4: mismatched confirmation never reaches key creation**
#[tokio::test]
async fn test_mismatched_confirmation() {
    let dir = tempdir().unwrap();
    let stack = TestStack::new(dir.path()).unwrap();
    stack
        .prompt
        .then(vec![sign_up("carol", "secret1secret", "secret2secret")]);

    let orchestrator = stack.orchestrator.clone();
    let waiter = tokio::spawn(async move { orchestrator.get_node().await });

    let prompt = stack.prompt.clone();
    assert!(wait_until(LIMIT, || !prompt.errors().is_empty()).await);
    assert_eq!(
        stack.prompt.errors(),
        vec!["Passwords Do Not Match".to_string()]
    );
    assert_eq!(stack.keystore.creates(), 0);
    assert_eq!(stack.ledger.registers(), 0);
    assert_eq!(
        stack.prompt.last_dialog().unwrap().state(),
        AccessState::AwaitingChoice
    );

    stack.orchestrator.cancel();
    assert!(waiter.await.unwrap().is_err());
}

/// **P5: a bound node is returned again without a dialog**
#[tokio::test]
async fn test_get_node_idempotent() {
    let dir = tempdir().unwrap();
    let stack = TestStack::new(dir.path()).unwrap();
    store_key(&stack, "alice");
    stack.prompt.then(vec![sign_in("alice", TEST_PASSWORD)]);

    let first = stack.orchestrator.get_node().await.unwrap();
    let second = stack.orchestrator.get_node().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(stack.prompt.dialogs_shown(), 1);
}

/// **P6: switching identity makes get_node open a new dialog**
#[tokio::test]
async fn test_switch_identity_reopens_flow() {
    let dir = tempdir().unwrap();
    let stack = TestStack::new(dir.path()).unwrap();
    store_key(&stack, "alice");
    store_key(&stack, "bob");
    stack
        .prompt
        .then(vec![sign_in("alice", TEST_PASSWORD)])
        .then(vec![sign_in("bob", TEST_PASSWORD)]);

    let alice = stack.orchestrator.get_node().await.unwrap();
    stack.orchestrator.lifecycle().switch_identity().await;
    assert!(stack.session.node().await.is_none());

    let bob = stack.orchestrator.get_node().await.unwrap();
    assert_eq!(alice.alias(), "alice");
    assert_eq!(bob.alias(), "bob");
    assert_eq!(stack.prompt.dialogs_shown(), 2);
    assert_eq!(
        stack.callbacks.events(),
        vec![
            AccessEvent::SignedIn("alice".into()),
            AccessEvent::SignedOut,
            AccessEvent::SignedIn("bob".into())
        ]
    );
}

/// **Most recently used alias is pre-selected**
#[tokio::test]
async fn test_dialog_prefill() {
    let dir = tempdir().unwrap();
    let stack = TestStack::build(
        dir.path(),
        ScriptedPrompt::cancelling(),
        AccessOptions::default(),
    )
    .unwrap();
    store_key(&stack, "older");
    store_key(&stack, "newer");

    assert!(matches!(
        stack.orchestrator.get_node().await,
        Err(AccessError::Cancelled)
    ));

    let dialog = stack.prompt.last_dialog().unwrap();
    assert_eq!(dialog.prefill().alias.as_deref(), Some("newer"));
    assert_eq!(
        dialog.prefill().aliases,
        vec!["newer".to_string(), "older".to_string()]
    );
    assert_eq!(dialog.prefill().host, TEST_HOST);
}

/// **Import resolves the dialog, then sign-in proceeds with the imported alias**
#[tokio::test]
async fn test_import_then_sign_in() {
    let dir = tempdir().unwrap();
    let source = TestStack::new(&dir.path().join("source")).unwrap();
    source
        .prompt
        .then(vec![sign_up("dave", TEST_PASSWORD, TEST_PASSWORD)]);
    let node = source.orchestrator.get_node().await.unwrap();
    let code = source
        .lifecycle
        .export_keys(&node, &Password::from(TEST_PASSWORD), TEST_HOST)
        .await
        .unwrap();

    // Second machine on the same ledger
    let target = TestStack::with_ledger(
        &dir.path().join("target"),
        source.ledger.clone(),
        ScriptedPrompt::new(),
        AccessOptions::default(),
    );
    target
        .prompt
        .then(vec![
            import_key("dave", "not-the-code", TEST_HOST),
            import_key("dave", code.as_str(), TEST_HOST),
        ])
        .then(vec![sign_in("dave", TEST_PASSWORD)]);

    let imported = assert_completes_within(LIMIT, target.orchestrator.get_node())
        .await
        .unwrap();

    assert_eq!(imported.alias(), "dave");
    assert_eq!(imported.public_key(), node.public_key());
    assert_eq!(target.prompt.dialogs_shown(), 2);
    assert_eq!(target.prompt.errors().len(), 1);
    let reopened = target.prompt.last_dialog().unwrap();
    assert_eq!(reopened.prefill().alias.as_deref(), Some("dave"));
    assert_eq!(
        target.callbacks.events(),
        vec![
            AccessEvent::KeysImported("dave".into()),
            AccessEvent::SignedIn("dave".into())
        ]
    );
}

/// **Concurrent callers share one dialog round**
#[tokio::test]
async fn test_concurrent_get_node() {
    let dir = tempdir().unwrap();
    let stack = TestStack::new(dir.path()).unwrap();
    store_key(&stack, "alice");
    stack.prompt.then(vec![sign_in("alice", TEST_PASSWORD)]);

    let (a, b) = tokio::join!(
        stack.orchestrator.get_node(),
        stack.orchestrator.get_node()
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(stack.prompt.dialogs_shown(), 1);
}
