//! One access dialog: a single human interaction resolving at most once
//!
//! ```text
//! AwaitingChoice --submit--> SigningIn | SigningUp | Importing
//!       ^                              |
//!       +-------- failure -------------+----- success --> Resolved
//!
//! any non-terminal state --cancel / replaced--> Cancelled
//! ```

use super::prefill::Prefill;
use super::{AccessPrompt, AccessRequest, AccessState, SignUpProgress};
use crate::callbacks::AccessCallbacks;
use crate::core_identity::validation::{validate_alias, validate_confirmation, validate_password};
use crate::errors::{AccessError, AccessResult};
use crate::lifecycle::Lifecycle;
use crate::metrics::{self, Flow, Timer, REGISTRATION_DURATION};
use crate::node::{Node, NodeFactory};
use crate::session::Session;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Collaborators every dialog of one orchestrator shares
pub(crate) struct FlowContext {
    pub(crate) session: Arc<Session>,
    pub(crate) factory: NodeFactory,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) prompt: Arc<dyn AccessPrompt>,
    pub(crate) callbacks: Arc<dyn AccessCallbacks>,
}

/// What a resolved dialog hands back to `get_node`
#[derive(Debug)]
pub(crate) enum DialogOutcome {
    Resolved(Arc<Node>),
    KeysImported(String),
}

enum Completed {
    SignedIn(Node),
    SignedUp(Node),
    Imported(String),
}

type OutcomeSender = oneshot::Sender<DialogOutcome>;

struct DialogInner {
    id: u64,
    prefill: Prefill,
    /// State and sender change together under this lock
    state: Mutex<(AccessState, Option<OutcomeSender>)>,
    ctx: Arc<FlowContext>,
}

/// Handle given to the prompt for one dialog.
///
/// Cloning shares the dialog; `submit` may be called repeatedly until one
/// action succeeds.
#[derive(Clone)]
pub struct AccessDialog {
    inner: Arc<DialogInner>,
}

impl AccessDialog {
    pub(crate) fn open(
        id: u64,
        prefill: Prefill,
        ctx: Arc<FlowContext>,
    ) -> (Self, oneshot::Receiver<DialogOutcome>) {
        let (tx, rx) = oneshot::channel();
        let inner = DialogInner {
            id,
            prefill,
            state: Mutex::new((AccessState::AwaitingChoice, Some(tx))),
            ctx,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn prefill(&self) -> &Prefill {
        &self.inner.prefill
    }

    pub fn state(&self) -> AccessState {
        self.lock_state().0
    }

    /// Still accepting submissions or running one
    pub fn is_open(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Dismiss the dialog. The waiting `get_node` observes `Cancelled`.
    /// An action already running is not interrupted.
    ///
    /// Returns `false` if the dialog had already resolved or been cancelled.
    pub fn cancel(&self) -> bool {
        let sender = {
            let mut guard = self.lock_state();
            if guard.0.is_terminal() {
                return false;
            }
            guard.0 = AccessState::Cancelled;
            guard.1.take()
        };
        drop(sender);
        info!(dialog = self.inner.id, "Access dialog cancelled");
        true
    }

    /// Run one action. Failures are reported to the prompt and leave the
    /// dialog open for another attempt.
    pub async fn submit(&self, request: AccessRequest) -> AccessResult<()> {
        self.begin(request.in_flight_state())?;
        debug!(
            dialog = self.inner.id,
            flow = request.name(),
            "Access action submitted"
        );

        match self.run(request).await {
            Ok(completed) => self.finish(completed).await,
            Err(err) => {
                self.fail();
                warn!(dialog = self.inner.id, error = %err, "Access action failed");
                self.inner.ctx.prompt.show_error(&err);
                Err(err)
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, (AccessState, Option<OutcomeSender>)> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, next: AccessState) -> AccessResult<()> {
        let mut guard = self.lock_state();
        match guard.0 {
            AccessState::AwaitingChoice => {
                guard.0 = next;
                Ok(())
            }
            s if s.is_terminal() => Err(AccessError::FlowClosed),
            _ => Err(AccessError::FlowBusy),
        }
    }

    /// Back to `AwaitingChoice` unless a cancel got there first
    fn fail(&self) {
        let mut guard = self.lock_state();
        if guard.0.is_in_flight() {
            guard.0 = AccessState::AwaitingChoice;
        }
    }

    /// Move to `Resolved`, taking the sender. `None` if cancelled meanwhile.
    fn claim(&self) -> Option<Option<OutcomeSender>> {
        let mut guard = self.lock_state();
        if !guard.0.is_in_flight() {
            return None;
        }
        guard.0 = AccessState::Resolved;
        Some(guard.1.take())
    }

    async fn run(&self, request: AccessRequest) -> AccessResult<Completed> {
        let ctx = &self.inner.ctx;
        match request {
            AccessRequest::SignIn { alias, password } => {
                metrics::record_attempt(Flow::SignIn);
                let result = async {
                    validate_password(&password, ctx.factory.min_password_length())?;
                    let (cache, network) = ctx.session.handles().await?;
                    ctx.factory
                        .load_existing(&alias, &password, cache, network)
                        .await
                }
                .await;
                if result.is_err() {
                    metrics::record_failure(Flow::SignIn);
                }
                Ok(Completed::SignedIn(result?))
            }
            AccessRequest::SignUp {
                alias,
                password,
                confirm,
            } => {
                metrics::record_attempt(Flow::SignUp);
                let result = async {
                    validate_alias(&alias)?;
                    validate_password(&password, ctx.factory.min_password_length())?;
                    validate_confirmation(&password, &confirm)?;

                    let (cache, network) = ctx.session.handles().await?;
                    ctx.prompt.show_progress(SignUpProgress::CreatingKeys);
                    let prompt = Arc::clone(&ctx.prompt);
                    let listener = move |fraction: f64| {
                        prompt.show_progress(SignUpProgress::Registering(fraction))
                    };
                    let timer = Timer::new(REGISTRATION_DURATION);
                    let node = ctx
                        .factory
                        .create_new(&alias, &password, cache, network, &listener)
                        .await?;
                    timer.stop();
                    Ok::<_, AccessError>(node)
                }
                .await;
                if result.is_err() {
                    metrics::record_failure(Flow::SignUp);
                }
                Ok(Completed::SignedUp(result?))
            }
            AccessRequest::ImportKey {
                alias,
                access_code,
                host,
            } => {
                ctx.lifecycle
                    .import_keys(&host, &alias, &access_code)
                    .await?;
                Ok(Completed::Imported(alias))
            }
        }
    }

    async fn finish(&self, completed: Completed) -> AccessResult<()> {
        let Some(sender) = self.claim() else {
            // Dismissed while the action ran; its result is dropped
            return Err(AccessError::Cancelled);
        };

        let ctx = &self.inner.ctx;
        let outcome = match completed {
            Completed::SignedIn(node) => {
                let node = ctx.session.bind(node).await;
                ctx.callbacks.on_signed_in(&node);
                DialogOutcome::Resolved(node)
            }
            Completed::SignedUp(node) => {
                let node = ctx.session.bind(node).await;
                ctx.callbacks.on_signed_up(&node);
                DialogOutcome::Resolved(node)
            }
            Completed::Imported(alias) => DialogOutcome::KeysImported(alias),
        };

        info!(dialog = self.inner.id, "Access dialog resolved");
        if let Some(tx) = sender {
            // Receiver gone means get_node stopped waiting
            let _ = tx.send(outcome);
        }
        Ok(())
    }
}

impl fmt::Debug for AccessDialog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessDialog")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("prefill", &self.inner.prefill)
            .finish()
    }
}
