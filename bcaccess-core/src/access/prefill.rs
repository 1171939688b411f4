//! Access dialog pre-fill and the development bootstrap

use crate::core_identity::validation::Password;
use std::env;
use tracing::warn;

/// Environment variable pre-filling the alias field
pub const ALIAS_VAR: &str = "ALIAS";

/// Environment variable pre-filling the password field
pub const PASSWORD_VAR: &str = "PASSWORD";

/// Values a front end shows when the dialog opens
#[derive(Debug, Clone, Default)]
pub struct Prefill {
    /// Alias to pre-select
    pub alias: Option<String>,
    /// Known local aliases, most recently used first
    pub aliases: Vec<String>,
    pub password: Option<Password>,
    /// Host the import form points at
    pub host: String,
}

/// Credentials taken from the environment for non-interactive runs.
///
/// Development only: nothing is read unless explicitly allowed.
#[derive(Debug, Clone, Default)]
pub struct DevBootstrap {
    pub alias: Option<String>,
    pub password: Option<Password>,
}

impl DevBootstrap {
    /// Read `ALIAS`/`PASSWORD` when `allow_env_credentials` is set
    pub fn load(allow_env_credentials: bool) -> Self {
        Self::load_with(allow_env_credentials, |key| env::var(key).ok())
    }

    /// Like `load`, reading variables through `lookup`
    pub fn load_with<F>(allow_env_credentials: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if !allow_env_credentials {
            return Self::default();
        }
        warn!("Development bootstrap enabled: access dialog pre-filled from environment");
        Self {
            alias: lookup(ALIAS_VAR).filter(|a| !a.is_empty()),
            password: lookup(PASSWORD_VAR)
                .filter(|p| !p.is_empty())
                .map(Password::from),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.alias.is_none() && self.password.is_none()
    }
}

/// Choose the alias to pre-select.
///
/// An alias just imported wins, then the bootstrap alias, then the most
/// recently used local key.
pub(crate) fn build_prefill(
    imported: Option<String>,
    aliases: Vec<String>,
    bootstrap: &DevBootstrap,
    host: &str,
) -> Prefill {
    let alias = imported
        .or_else(|| bootstrap.alias.clone())
        .or_else(|| aliases.first().cloned());
    Prefill {
        alias,
        aliases,
        password: bootstrap.password.clone(),
        host: host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> Vec<String> {
        vec!["recent".to_string(), "older".to_string()]
    }

    #[test]
    fn test_most_recent_alias_preselected() {
        let prefill = build_prefill(None, aliases(), &DevBootstrap::default(), "bc.example");
        assert_eq!(prefill.alias.as_deref(), Some("recent"));
        assert_eq!(prefill.aliases.len(), 2);
        assert!(prefill.password.is_none());
        assert_eq!(prefill.host, "bc.example");
    }

    #[test]
    fn test_bootstrap_overrides_key_store() {
        let bootstrap = DevBootstrap {
            alias: Some("dev".into()),
            password: Some(Password::from("devpassword")),
        };
        let prefill = build_prefill(None, aliases(), &bootstrap, "bc.example");
        assert_eq!(prefill.alias.as_deref(), Some("dev"));
        assert_eq!(prefill.password, Some(Password::from("devpassword")));
    }

    #[test]
    fn test_imported_alias_wins() {
        let bootstrap = DevBootstrap {
            alias: Some("dev".into()),
            password: None,
        };
        let prefill = build_prefill(
            Some("imported".into()),
            aliases(),
            &bootstrap,
            "bc.example",
        );
        assert_eq!(prefill.alias.as_deref(), Some("imported"));
    }

    #[test]
    fn test_empty_store() {
        let prefill = build_prefill(None, vec![], &DevBootstrap::default(), "bc.example");
        assert!(prefill.alias.is_none());
    }

    fn dev_env(key: &str) -> Option<String> {
        match key {
            ALIAS_VAR => Some("dev".to_string()),
            PASSWORD_VAR => Some("devpassword".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_bootstrap_disabled_reads_nothing() {
        assert!(DevBootstrap::load(false).is_empty());
        assert!(DevBootstrap::load_with(false, dev_env).is_empty());
    }

    #[test]
    fn test_bootstrap_enabled_reads_credentials() {
        let bootstrap = DevBootstrap::load_with(true, dev_env);
        assert_eq!(bootstrap.alias.as_deref(), Some("dev"));
        assert_eq!(bootstrap.password, Some(Password::from("devpassword")));

        let prefill = build_prefill(None, aliases(), &bootstrap, "bc.example");
        assert_eq!(prefill.alias.as_deref(), Some("dev"));
        assert_eq!(prefill.password, Some(Password::from("devpassword")));
    }

    #[test]
    fn test_bootstrap_ignores_empty_values() {
        let bootstrap = DevBootstrap::load_with(true, |_| Some(String::new()));
        assert!(bootstrap.is_empty());
    }
}
