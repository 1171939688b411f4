//! Wires a configured session, key store and ledger into the access flow

use crate::prompt::TerminalPrompt;
use anyhow::{Context, Result};
use bcaccess_core::core_identity::FileKeystore;
use bcaccess_core::ledger::LocalLedger;
use bcaccess_core::{AccessOrchestrator, Config, Lifecycle, NodeFactory, Session};
use std::sync::Arc;
use tracing::info;

pub struct App {
    pub session: Arc<Session>,
    pub keystore: Arc<FileKeystore>,
    pub lifecycle: Lifecycle,
    pub orchestrator: AccessOrchestrator,
    pub prompt: TerminalPrompt,
    pub bc_host: String,
}

impl App {
    pub async fn build(config: &Config, prompt: TerminalPrompt) -> Result<Self> {
        let session = Arc::new(Session::new(
            config.client.root_dir.clone(),
            config.client.peers.clone(),
        ));
        let root = session.root().await?;
        let keystore = Arc::new(session.open_keystore(config.kdf()).await?);

        let ledger_dir = config.ledger_dir(&root);
        let ledger = Arc::new(
            LocalLedger::open(ledger_dir.clone(), config.ledger.difficulty_bits)
                .with_context(|| format!("opening ledger at {}", ledger_dir.display()))?,
        );

        let callbacks = Arc::new(prompt.clone());
        let factory = NodeFactory::new(keystore.clone(), ledger.clone())
            .with_min_password_length(config.access.min_password_length)
            .with_rollback_on_registration_failure(config.access.rollback_on_registration_failure);
        let lifecycle = Lifecycle::new(
            session.clone(),
            keystore.clone(),
            ledger.clone(),
            ledger,
            callbacks.clone(),
        )
        .with_min_password_length(config.access.min_password_length);
        let orchestrator = AccessOrchestrator::new(
            session.clone(),
            factory,
            lifecycle.clone(),
            Arc::new(prompt.clone()),
            callbacks,
            config.access_options(),
        );

        info!(
            root = %root.display(),
            ledger = %ledger_dir.display(),
            "Client ready"
        );

        Ok(Self {
            session,
            keystore,
            lifecycle,
            orchestrator,
            prompt,
            bc_host: config.client.bc_host.clone(),
        })
    }
}
