//! Argument-vector shapes that need structural, not textual, handling.

use regex::Regex;

use crate::rules::CREDENTIAL_REF;

/// Lower-cased base name of an executable path, without an `.exe` suffix.
/// Both `/` and `\` count as separators so Windows paths resolve anywhere.
pub fn binary_name(arg0: &str) -> String {
    let trimmed = arg0.trim().trim_matches(|c| c == '"' || c == '\'');
    let base = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .to_lowercase();
    match base.strip_suffix(".exe") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => base,
    }
}

fn is_kubectl(args: &[String]) -> bool {
    args.first().is_some_and(|a| binary_name(a) == "kubectl")
}

/// `kubectl get secret[s] ... -o yaml|json` in any of the `-o` spellings.
pub fn is_secret_dump(args: &[String]) -> bool {
    if args.len() < 4 || !is_kubectl(args) {
        return false;
    }
    if !args[1].eq_ignore_ascii_case("get") {
        return false;
    }
    let resource = args[2].to_ascii_lowercase();
    if resource != "secret" && resource != "secrets" {
        return false;
    }

    let dumps = |format: &str| {
        let format = format.to_ascii_lowercase();
        format == "yaml" || format == "json"
    };
    let rest = &args[3..];
    for (i, arg) in rest.iter().enumerate() {
        let next = rest.get(i + 1).map(String::as_str);
        if arg == "-o" || arg == "--output" {
            if next.is_some_and(dumps) {
                return true;
            }
        } else if let Some(v) = arg
            .strip_prefix("--output=")
            .or_else(|| arg.strip_prefix("-o="))
            .or_else(|| arg.strip_prefix("-o"))
        {
            if dumps(v) {
                return true;
            }
        }
    }
    false
}

/// `kubectl set image ...`
pub fn is_set_image(args: &[String]) -> bool {
    args.len() >= 3
        && is_kubectl(args)
        && args[1].eq_ignore_ascii_case("set")
        && args[2].eq_ignore_ascii_case("image")
}

/// A `container=image[:tag]` argument that carries nothing secret.
/// `secret_keys` must match any redaction keyword in any spelling the
/// redaction chain would catch.
fn is_safe_assignment(arg: &str, secret_keys: &Regex) -> bool {
    let Some((key, value)) = arg.split_once('=') else {
        return false;
    };
    if key.is_empty() || value.is_empty() {
        return false;
    }
    if secret_keys.is_match(key) || secret_keys.is_match(value) {
        return false;
    }
    !CREDENTIAL_REF.is_match(value)
}

/// Safe image assignments swapped out of the raw text before redaction.
#[derive(Debug, Default)]
pub(crate) struct Preserved {
    pairs: Vec<(String, String)>,
}

impl Preserved {
    /// Put the original assignments back in place of their placeholders.
    pub(crate) fn restore(&self, mut text: String) -> String {
        for (placeholder, original) in &self.pairs {
            text = text.replace(placeholder, original);
        }
        text
    }
}

/// Replace every safe `key=value` argument of a `kubectl set image` command
/// with a placeholder the redaction chain cannot match.
pub(crate) fn preserve_image_assignments(
    raw: &str,
    args: &[String],
    secret_keys: &Regex,
) -> (String, Preserved) {
    let mut preserved = Preserved::default();
    if !is_set_image(args) {
        return (raw.to_string(), preserved);
    }

    let mut text = raw.to_string();
    for arg in &args[3..] {
        if arg.starts_with('-') || !arg.contains('=') || !is_safe_assignment(arg, secret_keys) {
            continue;
        }
        if !text.contains(arg.as_str()) {
            continue;
        }
        let placeholder = format!("__INFRATRACK_PRESERVED_{}__", preserved.pairs.len());
        text = text.replace(arg.as_str(), &placeholder);
        preserved.pairs.push((placeholder, arg.clone()));
    }
    (text, preserved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn keywords() -> Regex {
        let keywords =
            crate::rules::normalize_keywords(infratrack_core::config::DEFAULT_REDACTION_KEYWORDS);
        crate::rules::keyword_matcher(&keywords).unwrap()
    }

    #[test]
    fn binary_name_strips_paths_and_exe() {
        assert_eq!(binary_name("/usr/bin/env"), "env");
        assert_eq!(binary_name(r"C:\Windows\System32\PrintEnv.EXE"), "printenv");
        assert_eq!(binary_name("\"kubectl.exe\""), "kubectl");
        assert_eq!(binary_name(".exe"), ".exe");
    }

    #[test]
    fn secret_dump_flag_spellings() {
        assert!(is_secret_dump(&argv("kubectl get secret app -o yaml")));
        assert!(is_secret_dump(&argv("kubectl get secrets -n prod -o JSON")));
        assert!(is_secret_dump(&argv("KUBECTL GET SECRET app --output=json")));
        assert!(is_secret_dump(&argv("kubectl get secret app -oyaml")));
        assert!(!is_secret_dump(&argv("kubectl get secret app -o wide")));
        assert!(!is_secret_dump(&argv("kubectl get pods -o yaml")));
        assert!(!is_secret_dump(&argv("kubectl get secret")));
    }

    #[test]
    fn safe_assignment_rules() {
        let kw = keywords();
        assert!(is_safe_assignment("api=repo/app:v2", &kw));
        assert!(!is_safe_assignment("api=bob:pw@registry/app:v2", &kw));
        assert!(!is_safe_assignment("token=repo/app:v2", &kw));
        assert!(!is_safe_assignment("api=repo/secret-app:v2", &kw));
        assert!(!is_safe_assignment("api=", &kw));
        assert!(!is_safe_assignment("api-key=repo/app:v2", &kw));
        assert!(!is_safe_assignment("API-Key=repo/app:v2", &kw));
        assert!(!is_safe_assignment("web=repo/private-key:v2", &kw));
    }

    #[test]
    fn preserve_and_restore() {
        let raw = "kubectl set image deployment/web api=repo/app:v2";
        let (text, preserved) = preserve_image_assignments(raw, &argv(raw), &keywords());
        assert!(!text.contains("api=repo"));
        assert_eq!(preserved.restore(text), raw);
    }

    #[test]
    fn other_commands_are_untouched() {
        let raw = "kubectl apply -f x.yaml";
        let (text, preserved) = preserve_image_assignments(raw, &argv(raw), &keywords());
        assert_eq!(text, raw);
        assert!(preserved.pairs.is_empty());
    }
}
