//! Terminal front end for the access dialog
//!
//! Reads choices line by line. Input is shared by every dialog so buffered
//! lines are never lost between dialogs.

use bcaccess_core::access::{AccessDialog, AccessPrompt, AccessRequest, SignUpProgress};
use bcaccess_core::callbacks::AccessCallbacks;
use bcaccess_core::core_identity::Password;
use bcaccess_core::{AccessCode, AccessError, Node};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::debug;

type LineSource = Lines<Box<dyn AsyncBufRead + Unpin + Send>>;

/// Prompt on stdin/stdout
#[derive(Clone)]
pub struct TerminalPrompt {
    input: Arc<Mutex<LineSource>>,
}

impl TerminalPrompt {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    pub fn from_reader(reader: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        let boxed: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(reader);
        Self {
            input: Arc::new(Mutex::new(boxed.lines())),
        }
    }

    /// Print `label` and read one line; `None` on end of input
    pub async fn read_line(&self, label: &str) -> Option<String> {
        print!("{}", label);
        let _ = std::io::stdout().flush();
        match self.input.lock().await.next_line().await {
            Ok(line) => line.map(|l| l.trim_end_matches('\r').to_string()),
            Err(e) => {
                debug!(error = %e, "Reading input failed");
                None
            }
        }
    }

    /// Read a value, falling back to `default` on an empty line
    async fn read_with_default(&self, label: &str, default: Option<&str>) -> Option<String> {
        let label = match default {
            Some(d) => format!("{} [{}]: ", label, d),
            None => format!("{}: ", label),
        };
        let line = self.read_line(&label).await?;
        if line.trim().is_empty() {
            Some(default.unwrap_or_default().to_string())
        } else {
            Some(line.trim().to_string())
        }
    }

    async fn read_password(&self, label: &str, default: Option<&Password>) -> Option<Password> {
        let line = self.read_line(&format!("{}: ", label)).await?;
        match default {
            Some(password) if line.is_empty() => Some(password.clone()),
            _ => Some(Password::from(line)),
        }
    }

    /// Ask for one action; `None` when the human quits or input ends
    async fn read_request(&self, dialog: &AccessDialog) -> Option<AccessRequest> {
        let prefill = dialog.prefill();
        let alias = prefill.alias.as_deref();
        let password = prefill.password.as_ref();
        if !prefill.aliases.is_empty() {
            println!("Keys: {}", prefill.aliases.join(", "));
        }

        loop {
            println!("1) Sign In  2) Sign Up  3) Import Keys  q) Cancel");
            let choice = self.read_line("> ").await?;
            let request = match choice.trim() {
                "1" => AccessRequest::SignIn {
                    alias: self.read_with_default("Alias", alias).await?,
                    password: self.read_password("Password", password).await?,
                },
                "2" => AccessRequest::SignUp {
                    alias: self.read_with_default("Alias", alias).await?,
                    password: self.read_password("Password", password).await?,
                    confirm: self.read_password("Confirm Password", password).await?,
                },
                "3" => AccessRequest::ImportKey {
                    host: self
                        .read_with_default("Host", Some(prefill.host.as_str()))
                        .await?,
                    alias: self.read_with_default("Alias", alias).await?,
                    access_code: AccessCode::from(
                        self.read_with_default("Access Code", None).await?,
                    ),
                },
                "q" | "Q" => return None,
                other => {
                    println!("Unknown choice: {}", other);
                    continue;
                }
            };
            return Some(request);
        }
    }

    async fn drive(self, dialog: AccessDialog) {
        while dialog.is_open() {
            let request = match self.read_request(&dialog).await {
                Some(request) => request,
                None => {
                    dialog.cancel();
                    break;
                }
            };
            match dialog.submit(request).await {
                Ok(()) => break,
                Err(AccessError::FlowClosed) | Err(AccessError::Cancelled) => break,
                // Already reported through show_error; ask again
                Err(_) => continue,
            }
        }
    }
}

impl AccessPrompt for TerminalPrompt {
    fn show_access_dialog(&self, dialog: AccessDialog) {
        tokio::spawn(self.clone().drive(dialog));
    }

    fn show_progress(&self, progress: SignUpProgress) {
        match progress {
            SignUpProgress::CreatingKeys => println!("Creating Keys..."),
            SignUpProgress::Registering(fraction) => {
                let percent = (fraction * 100.0).round() as u32;
                print!("\rRegistering Alias: {:>3}%", percent);
                if fraction >= 1.0 {
                    println!();
                }
                let _ = std::io::stdout().flush();
            }
        }
    }

    fn show_error(&self, error: &AccessError) {
        eprintln!("Error: {}", error);
    }
}

impl AccessCallbacks for TerminalPrompt {
    fn on_signed_in(&self, node: &Arc<Node>) {
        println!("Signed In as {}", node.alias());
    }

    fn on_signed_up(&self, node: &Arc<Node>) {
        println!("Signed Up as {}", node.alias());
    }

    fn on_signed_out(&self) {
        println!("Signed Out");
    }

    fn on_keys_imported(&self, alias: &str) {
        println!("Keys Imported for {}", alias);
    }

    fn on_keys_exported(&self, alias: &str) {
        println!("Keys Exported for {}", alias);
    }
}
