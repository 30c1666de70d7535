//! Command sanitization policy.
//!
//! Every command passes through [`Policy::apply`] before it is recorded. A
//! denied command is replaced wholesale by [`DENIED_PLACEHOLDER`]; anything
//! else goes through an ordered chain of value-only redactions so the stored
//! text stays readable as documentation without carrying secrets.

pub mod error;
pub mod kubectl;
pub mod rules;

use std::path::Path;
use std::sync::{Arc, RwLock};

use infratrack_core::config::{Config, DEFAULT_DENYLIST, DEFAULT_REDACTION_KEYWORDS};
use regex::Regex;

pub use error::{PolicyError, Result};
pub use infratrack_core::{DENIED_PLACEHOLDER, REDACTED_VALUE};
pub use rules::compile_deny_pattern;

/// Binaries whose only purpose is to print the environment.
const ENV_DUMPERS: &[&str] = &["env", "printenv"];

/// Outcome of sanitizing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyResult {
    pub command: String,
    pub denied: bool,
}

/// Inputs for building a [`Policy`]. Empty lists fall back to the defaults.
#[derive(Debug, Clone, Default)]
pub struct PolicyOptions {
    pub denylist: Vec<String>,
    pub redaction_keywords: Vec<String>,
    pub enforce_denylist: bool,
}

/// Compiled, immutable rule set.
#[derive(Debug, Clone)]
pub struct Policy {
    denylist: Vec<Regex>,
    secret_keys: Regex,
    redactors: Vec<rules::Redactor>,
    enforce_denylist: bool,
}

impl Policy {
    pub fn new(opts: PolicyOptions) -> Result<Self> {
        let deny_patterns: Vec<String> = if opts.denylist.is_empty() {
            DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect()
        } else {
            opts.denylist
        };
        let mut keywords = rules::normalize_keywords(&opts.redaction_keywords);
        if keywords.is_empty() {
            keywords = rules::normalize_keywords(DEFAULT_REDACTION_KEYWORDS);
        }

        let denylist = deny_patterns
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| compile_deny_pattern(p))
            .collect::<Result<Vec<_>>>()?;
        let redactors = rules::build_redactors(&keywords)?;
        let secret_keys = rules::keyword_matcher(&keywords)?;

        tracing::debug!(
            denylist = denylist.len(),
            keywords = keywords.len(),
            enforce = opts.enforce_denylist,
            "policy compiled"
        );

        Ok(Self {
            denylist,
            secret_keys,
            redactors,
            enforce_denylist: opts.enforce_denylist,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(PolicyOptions {
            denylist: config.policy.denylist.clone(),
            redaction_keywords: config.policy.redaction_keywords.clone(),
            enforce_denylist: config.policy.enforce_denylist,
        })
    }

    /// Build from a `config.yaml`. A malformed file or pattern is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Config::from_yaml(&text).map_err(|source| PolicyError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_config(&config)
    }

    /// Like [`Policy::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match path.try_exists() {
            Ok(false) => {
                tracing::debug!(path = %path.display(), "no policy config, using defaults");
                Ok(Self::default())
            }
            Ok(true) => Self::load(path),
            Err(source) => Err(PolicyError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Whether denied commands must be blocked instead of run-and-redacted.
    pub fn enforce_denylist(&self) -> bool {
        self.enforce_denylist
    }

    /// Sanitize `raw` (its parsed argument vector is `args`). Never fails.
    pub fn apply(&self, raw: &str, args: &[String]) -> PolicyResult {
        if self.is_denied(raw, args) {
            return PolicyResult {
                command: DENIED_PLACEHOLDER.to_string(),
                denied: true,
            };
        }

        let (text, preserved) = kubectl::preserve_image_assignments(raw, args, &self.secret_keys);
        let redacted = self
            .redactors
            .iter()
            .fold(text, |acc, rule| rule.apply(&acc));

        PolicyResult {
            command: preserved.restore(redacted),
            denied: false,
        }
    }

    fn is_denied(&self, raw: &str, args: &[String]) -> bool {
        if let Some(arg0) = args.first() {
            let binary = kubectl::binary_name(arg0);
            if ENV_DUMPERS.contains(&binary.as_str()) {
                return true;
            }
            if kubectl::is_secret_dump(args) {
                return true;
            }
        }
        self.denylist.iter().any(|re| re.is_match(raw))
    }
}

impl Default for Policy {
    fn default() -> Self {
        // Built from constants; a compile failure here is a programming error.
        Self::new(PolicyOptions::default()).expect("default policy must compile")
    }
}

/// Shared, reloadable policy. Readers take an `Arc` snapshot; a reload
/// compiles a fresh [`Policy`] and swaps it in, so a rule set is never
/// modified while in use and a failed reload keeps the previous one.
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    inner: Arc<RwLock<Arc<Policy>>>,
}

impl PolicyHandle {
    pub fn new(policy: Policy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(policy))),
        }
    }

    pub fn current(&self) -> Arc<Policy> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, policy: Policy) {
        let next = Arc::new(policy);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Recompile from `path` (missing file ⇒ defaults) and swap in.
    pub fn reload(&self, path: &Path) -> Result<()> {
        let policy = Policy::load_or_default(path)?;
        self.replace(policy);
        tracing::info!(path = %path.display(), "policy reloaded");
        Ok(())
    }
}
