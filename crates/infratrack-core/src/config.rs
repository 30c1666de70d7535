//! Schema of `config.yaml`, shared by the store (which writes the default
//! file on init) and the policy engine (which compiles rules from it).

use serde::{Deserialize, Serialize};

pub const DEFAULT_DENYLIST: &[&str] = &[
    "env",
    "printenv",
    "cat ~/.ssh/*",
    "*id_rsa*",
    "*.pem",
    "*.key",
    "kubectl get secret -o yaml",
    "kubectl get secret -o json",
    "gcloud auth print-access-token",
];

pub const DEFAULT_REDACTION_KEYWORDS: &[&str] = &[
    "token",
    "secret",
    "password",
    "passwd",
    "authorization",
    "bearer",
    "api_key",
    "apikey",
    "private_key",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub policy: PolicySection,
    pub capture: CaptureSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub denylist: Vec<String>,
    pub redaction_keywords: Vec<String>,
    /// When true, denied commands are recorded but not executed.
    pub enforce_denylist: bool,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
            redaction_keywords: DEFAULT_REDACTION_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            enforce_denylist: false,
        }
    }
}

/// Capture settings read by the execution layer. Output capture is not
/// implemented; the flags are kept so existing config files stay valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub include_stdout: bool,
    pub include_stderr: bool,
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
