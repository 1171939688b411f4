//! Test fixtures: counting collaborators, a scripted prompt and a wired stack

use crate::access::{
    AccessDialog, AccessOptions, AccessOrchestrator, AccessPrompt, AccessRequest, SignUpProgress,
};
use crate::callbacks::RecordingCallbacks;
use crate::core_identity::keypair::Keypair;
use crate::core_identity::keystore::{Keystore, KeystoreError, MemoryKeystore};
use crate::core_identity::validation::Password;
use crate::errors::AccessError;
use crate::ledger::{
    AliasRecord, AliasRegistry, KeyExchange, KeyShare, LedgerError, LocalLedger, ProgressListener,
};
use crate::lifecycle::Lifecycle;
use crate::node::NodeFactory;
use crate::session::Session;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub const TEST_HOST: &str = "bc.example";
pub const TEST_PASSWORD: &str = "longpassword";

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Memory keystore that counts every call
#[derive(Default)]
pub struct CountingKeystore {
    inner: MemoryKeystore,
    loads: AtomicUsize,
    creates: AtomicUsize,
    lists: AtomicUsize,
    transfers: AtomicUsize,
}

impl CountingKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryKeystore {
        &self.inner
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Calls that read or write key material (everything but `list`)
    pub fn key_accesses(&self) -> usize {
        self.loads() + self.creates() + self.transfers.load(Ordering::SeqCst)
    }
}

impl Keystore for CountingKeystore {
    fn load(&self, alias: &str, password: &Password) -> Result<Keypair, KeystoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(alias, password)
    }

    fn create(&self, alias: &str, password: &Password) -> Result<Keypair, KeystoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(alias, password)
    }

    fn list(&self) -> Result<Vec<String>, KeystoreError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list()
    }

    fn export_sealed(&self, alias: &str) -> Result<Vec<u8>, KeystoreError> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        self.inner.export_sealed(alias)
    }

    fn import_sealed(&self, alias: &str, sealed: &[u8]) -> Result<(), KeystoreError> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        self.inner.import_sealed(alias, sealed)
    }

    fn delete(&self, alias: &str) -> Result<(), KeystoreError> {
        self.inner.delete(alias)
    }

    fn contains(&self, alias: &str) -> Result<bool, KeystoreError> {
        self.inner.contains(alias)
    }
}

/// Local ledger that counts registry and exchange calls
pub struct CountingLedger {
    inner: LocalLedger,
    registers: AtomicUsize,
    uploads: AtomicUsize,
    downloads: AtomicUsize,
}

impl CountingLedger {
    pub fn new(inner: LocalLedger) -> Self {
        Self {
            inner,
            registers: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn registers(&self) -> usize {
        self.registers.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Every call that would reach the network
    pub fn network_calls(&self) -> usize {
        self.registers() + self.uploads() + self.downloads()
    }
}

#[async_trait]
impl AliasRegistry for CountingLedger {
    async fn register(
        &self,
        alias: &str,
        keypair: &Keypair,
        progress: &dyn ProgressListener,
    ) -> Result<AliasRecord, LedgerError> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        self.inner.register(alias, keypair, progress).await
    }

    async fn lookup(&self, alias: &str) -> Result<Option<AliasRecord>, LedgerError> {
        self.inner.lookup(alias).await
    }
}

#[async_trait]
impl KeyExchange for CountingLedger {
    async fn upload(&self, host: &str, share: KeyShare) -> Result<(), LedgerError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.inner.upload(host, share).await
    }

    async fn download(
        &self,
        host: &str,
        alias: &str,
        access_digest: &[u8],
    ) -> Result<KeyShare, LedgerError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.inner.download(host, alias, access_digest).await
    }
}

/// Prompt that answers each dialog from a script.
///
/// Each queued entry drives one dialog: its requests are submitted in order
/// until one succeeds. With no entry left the dialog stays open, or is
/// cancelled when `cancel_when_exhausted` is set.
#[derive(Default)]
pub struct ScriptedPrompt {
    script: Mutex<VecDeque<Vec<AccessRequest>>>,
    cancel_when_exhausted: bool,
    dialogs: Mutex<Vec<AccessDialog>>,
    errors: Mutex<Vec<String>>,
    progress: Mutex<Vec<SignUpProgress>>,
}

impl ScriptedPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling() -> Self {
        Self {
            cancel_when_exhausted: true,
            ..Default::default()
        }
    }

    /// Queue the requests for the next dialog
    pub fn then(&self, requests: Vec<AccessRequest>) -> &Self {
        lock(&self.script).push_back(requests);
        self
    }

    pub fn dialogs_shown(&self) -> usize {
        lock(&self.dialogs).len()
    }

    pub fn last_dialog(&self) -> Option<AccessDialog> {
        lock(&self.dialogs).last().cloned()
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    pub fn progress(&self) -> Vec<SignUpProgress> {
        lock(&self.progress).clone()
    }

    /// Registration fractions reported so far
    pub fn registration_fractions(&self) -> Vec<f64> {
        self.progress()
            .into_iter()
            .filter_map(|p| match p {
                SignUpProgress::Registering(fraction) => Some(fraction),
                SignUpProgress::CreatingKeys => None,
            })
            .collect()
    }
}

impl AccessPrompt for ScriptedPrompt {
    fn show_access_dialog(&self, dialog: AccessDialog) {
        lock(&self.dialogs).push(dialog.clone());
        let next = lock(&self.script).pop_front();
        match next {
            Some(requests) => {
                tokio::spawn(async move {
                    for request in requests {
                        if dialog.submit(request).await.is_ok() {
                            break;
                        }
                    }
                });
            }
            None if self.cancel_when_exhausted => {
                dialog.cancel();
            }
            None => {}
        }
    }

    fn show_progress(&self, progress: SignUpProgress) {
        lock(&self.progress).push(progress);
    }

    fn show_error(&self, error: &AccessError) {
        lock(&self.errors).push(error.to_string());
    }
}

pub fn sign_in(alias: &str, password: &str) -> AccessRequest {
    AccessRequest::SignIn {
        alias: alias.to_string(),
        password: Password::from(password),
    }
}

pub fn sign_up(alias: &str, password: &str, confirm: &str) -> AccessRequest {
    AccessRequest::SignUp {
        alias: alias.to_string(),
        password: Password::from(password),
        confirm: Password::from(confirm),
    }
}

pub fn import_key(alias: &str, code: &str, host: &str) -> AccessRequest {
    AccessRequest::ImportKey {
        alias: alias.to_string(),
        access_code: code.into(),
        host: host.to_string(),
    }
}

/// A fully wired orchestrator over counting collaborators
pub struct TestStack {
    pub session: Arc<Session>,
    pub keystore: Arc<CountingKeystore>,
    pub ledger: Arc<CountingLedger>,
    pub callbacks: Arc<RecordingCallbacks>,
    pub prompt: Arc<ScriptedPrompt>,
    pub factory: NodeFactory,
    pub lifecycle: Lifecycle,
    pub orchestrator: Arc<AccessOrchestrator>,
}

impl TestStack {
    /// Stack rooted at `root` with a cheap proof of work
    pub fn new(root: &Path) -> Result<Self, LedgerError> {
        Self::build(root, ScriptedPrompt::new(), AccessOptions::default())
    }

    pub fn build(
        root: &Path,
        prompt: ScriptedPrompt,
        options: AccessOptions,
    ) -> Result<Self, LedgerError> {
        let ledger =
            LocalLedger::open(root.join("ledger"), 4)?.with_hosts(vec![TEST_HOST.to_string()]);
        Ok(Self::with_ledger(
            root,
            Arc::new(CountingLedger::new(ledger)),
            prompt,
            options,
        ))
    }

    /// Stack sharing `ledger` with other stacks, like two machines on one network
    pub fn with_ledger(
        root: &Path,
        ledger: Arc<CountingLedger>,
        prompt: ScriptedPrompt,
        options: AccessOptions,
    ) -> Self {
        let session = Arc::new(Session::new(root.join("bc"), vec![TEST_HOST.to_string()]));
        let keystore = Arc::new(CountingKeystore::new());
        let callbacks = Arc::new(RecordingCallbacks::new());
        let prompt = Arc::new(prompt);

        let factory = NodeFactory::new(keystore.clone(), ledger.clone());
        let lifecycle = Lifecycle::new(
            session.clone(),
            keystore.clone(),
            ledger.clone(),
            ledger.clone(),
            callbacks.clone(),
        );
        let orchestrator = Arc::new(AccessOrchestrator::new(
            session.clone(),
            factory.clone(),
            lifecycle.clone(),
            prompt.clone(),
            callbacks.clone(),
            AccessOptions {
                default_host: TEST_HOST.to_string(),
                ..options
            },
        ));

        Self {
            session,
            keystore,
            ledger,
            callbacks,
            prompt,
            factory,
            lifecycle,
            orchestrator,
        }
    }
}
