use std::fmt::Display;
use std::io::IsTerminal;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy)]
enum Role {
    Ok,
    Warn,
    Error,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::Ok => "[OK]",
            Role::Warn => "[WARN]",
            Role::Error => "[ERROR]",
        }
    }

    fn ansi(self) -> u8 {
        match self {
            Role::Ok => 32,
            Role::Warn => 33,
            Role::Error => 31,
        }
    }
}

/// Status-line printer. Results go to stdout, warnings and errors to stderr.
#[derive(Debug, Clone, Copy)]
pub struct Ui {
    color_out: bool,
    color_err: bool,
}

impl Ui {
    pub fn new(no_color: bool) -> Self {
        let allowed = !no_color && color_allowed_by_env();
        Self {
            color_out: allowed && std::io::stdout().is_terminal(),
            color_err: allowed && std::io::stderr().is_terminal(),
        }
    }

    pub fn ok(&self, msg: impl Display) {
        println!("{} {msg}", paint(Role::Ok, self.color_out));
    }

    pub fn warn(&self, msg: impl Display) {
        eprintln!("{} {msg}", paint(Role::Warn, self.color_err));
    }

    pub fn error(&self, msg: impl Display) {
        eprintln!("{} {msg}", paint(Role::Error, self.color_err));
    }

    pub fn hint(&self, msg: impl Display) {
        eprintln!("Tip:\n   {msg}");
    }
}

fn paint(role: Role, color: bool) -> String {
    if color {
        format!("\x1b[{}m{}\x1b[0m", role.ansi(), role.label())
    } else {
        role.label().to_string()
    }
}

fn color_allowed_by_env() -> bool {
    let set = |name: &str| std::env::var_os(name).is_some_and(|v| !v.is_empty());
    if set("NO_COLOR") || std::env::var("CLICOLOR").is_ok_and(|v| v == "0") {
        return false;
    }
    !std::env::var("TERM").is_ok_and(|t| t.trim().eq_ignore_ascii_case("dumb"))
}

pub fn timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

pub fn exit_code(code: Option<i32>) -> String {
    code.map_or_else(|| "n/a".to_string(), |c| c.to_string())
}

/// `1h02m03s`-style rendering for session lengths.
pub fn duration(d: time::Duration) -> String {
    let secs = d.whole_seconds().max(0);
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{h}h{m:02}m{s:02}s")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn plain_labels_without_color() {
        assert_eq!(paint(Role::Ok, false), "[OK]");
        assert_eq!(paint(Role::Error, true), "\x1b[31m[ERROR]\x1b[0m");
    }

    #[test]
    fn formats() {
        assert_eq!(timestamp(datetime!(2026-03-01 10:00 UTC)), "2026-03-01T10:00:00Z");
        assert_eq!(exit_code(None), "n/a");
        assert_eq!(exit_code(Some(3)), "3");
        assert_eq!(duration(time::Duration::seconds(3723)), "1h02m03s");
        assert_eq!(duration(time::Duration::seconds(65)), "1m05s");
        assert_eq!(duration(time::Duration::seconds(-4)), "0s");
    }
}
