//! Access Flow Orchestrator
//!
//! `get_node` returns the session's node, or opens an access dialog through
//! the `AccessPrompt` and waits until the human completes one of sign-in,
//! sign-up or import:
//!
//! ```text
//! get_node ──> node bound? ──yes──> return it
//!                  │no
//!                  v
//!          open dialog (prefill) ──> prompt.show_access_dialog
//!                  │
//!          wait on oneshot (optional timeout)
//!                  │
//!     Resolved(node) ─> return     KeysImported(alias) ─> reopen, alias pre-filled
//!     sender dropped ─> Cancelled  timeout ─> TimedOut
//! ```
//!
//! Dialog submit handlers run on whatever task the front end drives them
//! from; `get_node` only waits on the channel.

use crate::callbacks::AccessCallbacks;
use crate::config::DEFAULT_BC_HOST;
use crate::core_identity::validation::Password;
use crate::errors::{AccessError, AccessResult};
use crate::lifecycle::{AccessCode, Lifecycle};
use crate::node::{Node, NodeFactory};
use crate::session::Session;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

mod dialog;
pub mod prefill;

pub use dialog::AccessDialog;
pub use prefill::{DevBootstrap, Prefill};

use dialog::{DialogOutcome, FlowContext};

/// Dialog states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    /// No dialog shown yet
    Idle,
    AwaitingChoice,
    SigningIn,
    SigningUp,
    Importing,
    Resolved,
    Cancelled,
}

impl AccessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AccessState::Resolved | AccessState::Cancelled)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            AccessState::SigningIn | AccessState::SigningUp | AccessState::Importing
        )
    }
}

/// One action chosen by the human
#[derive(Clone)]
pub enum AccessRequest {
    SignIn {
        alias: String,
        password: Password,
    },
    SignUp {
        alias: String,
        password: Password,
        confirm: Password,
    },
    ImportKey {
        alias: String,
        access_code: AccessCode,
        host: String,
    },
}

impl AccessRequest {
    pub fn name(&self) -> &'static str {
        match self {
            AccessRequest::SignIn { .. } => "sign_in",
            AccessRequest::SignUp { .. } => "sign_up",
            AccessRequest::ImportKey { .. } => "import",
        }
    }

    fn in_flight_state(&self) -> AccessState {
        match self {
            AccessRequest::SignIn { .. } => AccessState::SigningIn,
            AccessRequest::SignUp { .. } => AccessState::SigningUp,
            AccessRequest::ImportKey { .. } => AccessState::Importing,
        }
    }
}

impl fmt::Debug for AccessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessRequest::SignIn { alias, .. } => f
                .debug_struct("SignIn")
                .field("alias", alias)
                .finish_non_exhaustive(),
            AccessRequest::SignUp { alias, .. } => f
                .debug_struct("SignUp")
                .field("alias", alias)
                .finish_non_exhaustive(),
            AccessRequest::ImportKey { alias, host, .. } => f
                .debug_struct("ImportKey")
                .field("alias", alias)
                .field("host", host)
                .finish_non_exhaustive(),
        }
    }
}

/// Sign-up phases reported to the prompt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignUpProgress {
    /// Generating and storing the key
    CreatingKeys,
    /// Alias registration, `0.0..=1.0`
    Registering(f64),
}

/// Front end presenting dialogs, progress and errors
pub trait AccessPrompt: Send + Sync {
    /// Present `dialog`, replacing any dialog shown before
    fn show_access_dialog(&self, dialog: AccessDialog);

    fn show_progress(&self, _progress: SignUpProgress) {}

    /// Report a failed action
    fn show_error(&self, error: &AccessError);
}

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct AccessOptions {
    /// Upper bound on one `get_node` wait; `None` waits until resolved or cancelled
    pub node_timeout: Option<Duration>,
    /// Host offered by the import form
    pub default_host: String,
    pub bootstrap: DevBootstrap,
}

impl Default for AccessOptions {
    fn default() -> Self {
        Self {
            node_timeout: None,
            default_host: DEFAULT_BC_HOST.to_string(),
            bootstrap: DevBootstrap::default(),
        }
    }
}

/// Hands out the session node, running access dialogs as needed
pub struct AccessOrchestrator {
    ctx: Arc<FlowContext>,
    options: AccessOptions,
    /// Serializes dialog rounds across concurrent `get_node` callers
    gate: tokio::sync::Mutex<()>,
    current: Mutex<Option<AccessDialog>>,
    next_id: AtomicU64,
}

impl AccessOrchestrator {
    pub fn new(
        session: Arc<Session>,
        factory: NodeFactory,
        lifecycle: Lifecycle,
        prompt: Arc<dyn AccessPrompt>,
        callbacks: Arc<dyn AccessCallbacks>,
        options: AccessOptions,
    ) -> Self {
        let ctx = FlowContext {
            session,
            factory,
            lifecycle,
            prompt,
            callbacks,
        };
        Self {
            ctx: Arc::new(ctx),
            options,
            gate: tokio::sync::Mutex::new(()),
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.ctx.session
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.ctx.lifecycle
    }

    /// The dialog shown most recently, if any
    pub fn current_dialog(&self) -> Option<AccessDialog> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// State of the most recent dialog, `Idle` before the first is shown
    pub fn state(&self) -> AccessState {
        self.current_dialog()
            .map_or(AccessState::Idle, |dialog| dialog.state())
    }

    /// Dismiss the open dialog, releasing its `get_node` with `Cancelled`
    pub fn cancel(&self) {
        if let Some(dialog) = self.current_dialog() {
            dialog.cancel();
        }
    }

    /// The bound node, or the node produced by an access dialog
    pub async fn get_node(&self) -> AccessResult<Arc<Node>> {
        if let Some(node) = self.ctx.session.node().await {
            return Ok(node);
        }

        let _round = self.gate.lock().await;
        let mut imported: Option<String> = None;
        loop {
            // Another caller may have completed a dialog while we waited
            if let Some(node) = self.ctx.session.node().await {
                return Ok(node);
            }

            let (dialog, mut rx) = self.open_dialog(imported.take()).await;
            info!(dialog = dialog.id(), "Awaiting access choice");
            self.ctx.prompt.show_access_dialog(dialog.clone());

            let received = match self.options.node_timeout {
                Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                    Ok(received) => received,
                    Err(_) if dialog.cancel() => {
                        warn!(dialog = dialog.id(), "Access dialog timed out");
                        return Err(AccessError::TimedOut(limit));
                    }
                    // Resolved as the limit passed; the outcome is on its way
                    Err(_) => rx.await,
                },
                None => rx.await,
            };

            match received {
                Ok(DialogOutcome::Resolved(node)) => return Ok(node),
                Ok(DialogOutcome::KeysImported(alias)) => {
                    info!(alias = %alias, "Keys imported; reopening access dialog");
                    imported = Some(alias);
                }
                Err(_) => return Err(AccessError::Cancelled),
            }
        }
    }

    async fn open_dialog(
        &self,
        imported: Option<String>,
    ) -> (AccessDialog, tokio::sync::oneshot::Receiver<DialogOutcome>) {
        let keystore = Arc::clone(self.ctx.factory.keystore());
        let aliases = match tokio::task::spawn_blocking(move || keystore.list()).await {
            Ok(Ok(aliases)) => aliases,
            Ok(Err(e)) => {
                warn!(error = %e, "Could not list local aliases");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Alias listing task failed");
                Vec::new()
            }
        };
        let prefill = prefill::build_prefill(
            imported,
            aliases,
            &self.options.bootstrap,
            &self.options.default_host,
        );

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (dialog, rx) = AccessDialog::open(id, prefill, Arc::clone(&self.ctx));
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(dialog.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        (dialog, rx)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::NoCallbacks;
    use crate::core_identity::keypair::Keypair;
    use crate::core_identity::keystore::{Keystore, MemoryKeystore};
    use crate::ledger::{AliasRecord, AliasRegistry, LedgerError, LocalLedger, ProgressListener};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Keeps shown dialogs for the test to drive by hand
    #[derive(Default)]
    struct ManualPrompt {
        dialogs: StdMutex<Vec<AccessDialog>>,
        errors: StdMutex<Vec<String>>,
    }

    impl ManualPrompt {
        fn last(&self) -> Option<AccessDialog> {
            self.dialogs.lock().unwrap().last().cloned()
        }
    }

    impl AccessPrompt for ManualPrompt {
        fn show_access_dialog(&self, dialog: AccessDialog) {
            self.dialogs.lock().unwrap().push(dialog);
        }

        fn show_error(&self, error: &AccessError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    /// Registration held until the test releases it
    struct GatedRegistry {
        inner: Arc<LocalLedger>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl AliasRegistry for GatedRegistry {
        async fn register(
            &self,
            alias: &str,
            keypair: &Keypair,
            progress: &dyn ProgressListener,
        ) -> Result<AliasRecord, LedgerError> {
            self.gate.notified().await;
            self.inner.register(alias, keypair, progress).await
        }

        async fn lookup(&self, alias: &str) -> Result<Option<AliasRecord>, LedgerError> {
            self.inner.lookup(alias).await
        }
    }

    struct Fixture {
        _dir: TempDir,
        keystore: MemoryKeystore,
        prompt: Arc<ManualPrompt>,
        orchestrator: Arc<AccessOrchestrator>,
    }

    fn fixture(options: AccessOptions) -> Fixture {
        fixture_with(options, None)
    }

    fn fixture_with(options: AccessOptions, gate: Option<Arc<Notify>>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(Session::new(dir.path().join("root"), vec![]));
        let keystore = MemoryKeystore::new();
        let ledger = Arc::new(LocalLedger::open(dir.path().join("ledger"), 0).unwrap());
        let registry: Arc<dyn AliasRegistry> = match gate {
            Some(gate) => Arc::new(GatedRegistry {
                inner: ledger.clone(),
                gate,
            }),
            None => ledger.clone(),
        };
        let factory = NodeFactory::new(Arc::new(keystore.clone()), registry);
        let lifecycle = Lifecycle::new(
            session.clone(),
            Arc::new(keystore.clone()),
            ledger.clone(),
            ledger,
            Arc::new(NoCallbacks),
        );
        let prompt = Arc::new(ManualPrompt::default());
        let orchestrator = Arc::new(AccessOrchestrator::new(
            session,
            factory,
            lifecycle,
            prompt.clone(),
            Arc::new(NoCallbacks),
            options,
        ));
        Fixture {
            _dir: dir,
            keystore,
            prompt,
            orchestrator,
        }
    }

    async fn wait_for_dialog(prompt: &ManualPrompt, count: usize) -> AccessDialog {
        for _ in 0..200 {
            if prompt.dialogs.lock().unwrap().len() >= count {
                return prompt.last().unwrap();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("dialog {} never shown", count);
    }

    async fn wait_for_state(dialog: &AccessDialog, state: AccessState) {
        for _ in 0..200 {
            if dialog.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("dialog never reached {:?}", state);
    }

    fn sign_in(alias: &str, password: &str) -> AccessRequest {
        AccessRequest::SignIn {
            alias: alias.into(),
            password: Password::from(password),
        }
    }

    fn sign_up(alias: &str, password: &str) -> AccessRequest {
        AccessRequest::SignUp {
            alias: alias.into(),
            password: Password::from(password),
            confirm: Password::from(password),
        }
    }

    #[tokio::test]
    async fn test_sign_in_resolves_get_node() {
        let f = fixture(AccessOptions::default());
        f.keystore
            .create("alice", &Password::from("longpassword"))
            .unwrap();
        assert_eq!(f.orchestrator.state(), AccessState::Idle);

        let orchestrator = f.orchestrator.clone();
        let waiter = tokio::spawn(async move { orchestrator.get_node().await });

        let dialog = wait_for_dialog(&f.prompt, 1).await;
        assert_eq!(dialog.prefill().alias.as_deref(), Some("alice"));
        assert_eq!(dialog.prefill().host, DEFAULT_BC_HOST);
        assert_eq!(f.orchestrator.state(), AccessState::AwaitingChoice);

        dialog.submit(sign_in("alice", "longpassword")).await.unwrap();
        assert_eq!(dialog.state(), AccessState::Resolved);
        assert_eq!(f.orchestrator.state(), AccessState::Resolved);

        let node = waiter.await.unwrap().unwrap();
        assert_eq!(node.alias(), "alice");
    }

    #[tokio::test]
    async fn test_failed_sign_in_keeps_dialog_open() {
        let f = fixture(AccessOptions::default());
        f.keystore
            .create("alice", &Password::from("longpassword"))
            .unwrap();

        let orchestrator = f.orchestrator.clone();
        let waiter = tokio::spawn(async move { orchestrator.get_node().await });
        let dialog = wait_for_dialog(&f.prompt, 1).await;

        let err = dialog
            .submit(sign_in("alice", "wrongpassword"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::AuthenticationFailed { .. }));
        assert_eq!(dialog.state(), AccessState::AwaitingChoice);
        assert_eq!(f.prompt.errors.lock().unwrap().len(), 1);

        dialog.submit(sign_in("alice", "longpassword")).await.unwrap();
        assert_eq!(waiter.await.unwrap().unwrap().alias(), "alice");
    }

    #[tokio::test]
    async fn test_failed_sign_in_leaves_session_unbound() {
        let f = fixture(AccessOptions::default());
        f.keystore
            .create("alice", &Password::from("longpassword"))
            .unwrap();

        let orchestrator = f.orchestrator.clone();
        let waiter = tokio::spawn(async move { orchestrator.get_node().await });
        let dialog = wait_for_dialog(&f.prompt, 1).await;
        let session = f.orchestrator.session();

        assert!(dialog
            .submit(sign_in("alice", "wrongpassword"))
            .await
            .is_err());
        assert!(session.node().await.is_none());
        assert!(session.cache().await.is_none());
        assert!(session.network().await.is_none());

        dialog.submit(sign_in("alice", "longpassword")).await.unwrap();
        let node = waiter.await.unwrap().unwrap();
        let cache = session.cache().await.unwrap();
        assert!(Arc::ptr_eq(&cache, node.cache()));
        assert!(session.network().await.is_some());
    }

    #[tokio::test]
    async fn test_submit_while_running_is_busy() {
        let gate = Arc::new(Notify::new());
        let f = fixture_with(AccessOptions::default(), Some(gate.clone()));

        let orchestrator = f.orchestrator.clone();
        let waiter = tokio::spawn(async move { orchestrator.get_node().await });
        let dialog = wait_for_dialog(&f.prompt, 1).await;

        let running = dialog.clone();
        let signing_up = tokio::spawn(async move {
            running
                .submit(sign_up("alice", "longpassword"))
                .await
        });
        wait_for_state(&dialog, AccessState::SigningUp).await;

        let busy = dialog.submit(sign_in("alice", "longpassword")).await;
        assert!(matches!(busy, Err(AccessError::FlowBusy)));
        assert_eq!(dialog.state(), AccessState::SigningUp);
        assert!(f.prompt.errors.lock().unwrap().is_empty());

        gate.notify_one();
        signing_up.await.unwrap().unwrap();
        assert_eq!(dialog.state(), AccessState::Resolved);
        assert_eq!(waiter.await.unwrap().unwrap().alias(), "alice");
    }

    #[tokio::test]
    async fn test_submit_after_resolve_is_closed() {
        let f = fixture(AccessOptions::default());
        f.keystore
            .create("alice", &Password::from("longpassword"))
            .unwrap();

        let orchestrator = f.orchestrator.clone();
        let waiter = tokio::spawn(async move { orchestrator.get_node().await });
        let dialog = wait_for_dialog(&f.prompt, 1).await;
        dialog.submit(sign_in("alice", "longpassword")).await.unwrap();

        let second = dialog.submit(sign_up("bob", "longpassword")).await;
        assert!(matches!(second, Err(AccessError::FlowClosed)));
        assert_eq!(waiter.await.unwrap().unwrap().alias(), "alice");
        assert!(!f.keystore.contains("bob").unwrap());
    }

    #[tokio::test]
    async fn test_cancel_after_resolve_keeps_outcome() {
        let f = fixture(AccessOptions::default());
        f.keystore
            .create("alice", &Password::from("longpassword"))
            .unwrap();

        let orchestrator = f.orchestrator.clone();
        let waiter = tokio::spawn(async move { orchestrator.get_node().await });
        let dialog = wait_for_dialog(&f.prompt, 1).await;
        dialog.submit(sign_in("alice", "longpassword")).await.unwrap();

        assert!(!dialog.cancel());
        assert_eq!(dialog.state(), AccessState::Resolved);
        assert_eq!(waiter.await.unwrap().unwrap().alias(), "alice");
    }

    #[tokio::test]
    async fn test_cancel_releases_get_node() {
        let f = fixture(AccessOptions::default());
        let orchestrator = f.orchestrator.clone();
        let waiter = tokio::spawn(async move { orchestrator.get_node().await });

        let dialog = wait_for_dialog(&f.prompt, 1).await;
        f.orchestrator.cancel();

        assert!(matches!(waiter.await.unwrap(), Err(AccessError::Cancelled)));
        assert_eq!(dialog.state(), AccessState::Cancelled);
        assert!(!dialog.cancel());
        assert!(matches!(
            dialog.submit(sign_in("alice", "longpassword")).await,
            Err(AccessError::FlowClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_node_timeout() {
        let options = AccessOptions {
            node_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let f = fixture(options);

        let result = f.orchestrator.get_node().await;
        assert!(matches!(result, Err(AccessError::TimedOut(_))));
        assert_eq!(f.prompt.last().unwrap().state(), AccessState::Cancelled);
    }

    #[tokio::test]
    async fn test_new_dialog_replaces_previous() {
        let options = AccessOptions {
            node_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let f = fixture(options);

        assert!(f.orchestrator.get_node().await.is_err());
        let first = f.prompt.last().unwrap();

        let orchestrator = f.orchestrator.clone();
        let waiter = tokio::spawn(async move { orchestrator.get_node().await });
        let second = wait_for_dialog(&f.prompt, 2).await;

        assert_ne!(first.id(), second.id());
        assert!(!first.is_open());
        assert!(second.is_open());
        f.orchestrator.cancel();
        assert!(waiter.await.unwrap().is_err());
    }

    #[test]
    fn test_request_debug_hides_secrets() {
        let request = AccessRequest::ImportKey {
            alias: "alice".into(),
            access_code: AccessCode::from("topsecretcode"),
            host: "bc.example".into(),
        };
        let debug = format!("{:?}", request);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("topsecretcode"));
    }
}
