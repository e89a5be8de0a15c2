//! Macro script parsing
//!
//! Macro tiles carry a small line-oriented script that the host executes:
//!
//! ```text
//! # comments and blank lines are skipped
//! TYPE "Hello"
//! PRESS enter
//! COMBO ctrl,shift,t
//! WAIT 1.5
//! ```
//!
//! The client never runs a script. It parses one to preview the steps in
//! the editor and to point out lines the host would reject.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// One executable line of a macro
#[derive(Debug, Clone, PartialEq)]
pub enum MacroStep {
    Type(String),
    Press(String),
    Combo(Vec<String>),
    Wait(Duration),
}

impl MacroStep {
    /// Short display string for the editor preview
    pub fn to_display_string(&self) -> String {
        match self {
            MacroStep::Type(text) => format!("⌨ \"{}\"", text),
            MacroStep::Press(key) => format!("↓↑ {}", key),
            MacroStep::Combo(keys) => format!("↓↑ {}", keys.join("+")),
            MacroStep::Wait(duration) => format!("⏱ {}s", duration.as_secs_f64()),
        }
    }
}

impl fmt::Display for MacroStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// A line the host would not be able to run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("line {line}: unknown command '{command}'")]
    UnknownCommand { line: usize, command: String },

    #[error("line {line}: {command} needs an argument")]
    MissingArgument { line: usize, command: &'static str },

    #[error("line {line}: WAIT needs a number of seconds (got '{value}')")]
    BadWait { line: usize, value: String },
}

/// Parsed macro script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroScript {
    pub steps: Vec<MacroStep>,
    pub errors: Vec<ScriptError>,
}

impl MacroScript {
    /// Parse a script. Bad lines are collected in `errors`, parsing goes on.
    pub fn parse(script: &str) -> Self {
        let mut parsed = MacroScript::default();

        for (index, raw) in script.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (command, args) = match line.split_once(char::is_whitespace) {
                Some((command, args)) => (command, args.trim()),
                None => (line, ""),
            };

            match parse_line(line_no, &command.to_ascii_uppercase(), args) {
                Ok(step) => parsed.steps.push(step),
                Err(err) => parsed.errors.push(err),
            }
        }

        parsed
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total time spent in WAIT steps
    pub fn total_wait(&self) -> Duration {
        self.steps
            .iter()
            .filter_map(|step| match step {
                MacroStep::Wait(duration) => Some(*duration),
                _ => None,
            })
            .sum()
    }

    /// One step per line
    pub fn to_display_text(&self) -> String {
        if self.steps.is_empty() {
            return "No steps".to_string();
        }
        self.steps
            .iter()
            .map(MacroStep::to_display_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn parse_line(line: usize, command: &str, args: &str) -> Result<MacroStep, ScriptError> {
    match command {
        "TYPE" => Ok(MacroStep::Type(args.trim_matches('"').to_string())),
        "PRESS" => {
            if args.is_empty() {
                return Err(ScriptError::MissingArgument { line, command: "PRESS" });
            }
            Ok(MacroStep::Press(args.to_string()))
        }
        "COMBO" => {
            let keys: Vec<String> = args
                .split([',', '+'])
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string)
                .collect();
            if keys.is_empty() {
                return Err(ScriptError::MissingArgument { line, command: "COMBO" });
            }
            Ok(MacroStep::Combo(keys))
        }
        "WAIT" => {
            let seconds: f64 = args.parse().map_err(|_| ScriptError::BadWait {
                line,
                value: args.to_string(),
            })?;
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(ScriptError::BadWait { line, value: args.to_string() });
            }
            Ok(MacroStep::Wait(Duration::from_secs_f64(seconds)))
        }
        other => Err(ScriptError::UnknownCommand { line, command: other.to_string() }),
    }
}
