//! Command metadata: availability, declared inputs and raw arguments.

use crate::error::CatastoError;

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// When a command is offered and allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Listed and allowed in every status.
    Always,
    /// Listed only in the login menu. Dispatching while connected reconnects.
    WhenDisconnected,
    /// Requires a connected session.
    WhenConnected,
}

impl Availability {
    /// Whether dispatch must refuse the command without a live session.
    pub fn requires_connection(self) -> bool {
        matches!(self, Self::WhenConnected)
    }

    /// Whether the command belongs in the menu for the given connection state.
    pub fn is_listed(self, connected: bool) -> bool {
        match self {
            Self::Always => true,
            Self::WhenDisconnected => !connected,
            Self::WhenConnected => connected,
        }
    }
}

/// Shape of a prompted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Required free text
    Text,
    /// Free text that may be left blank
    OptionalText,
    /// Integer
    Integer,
    /// Comma-separated integers
    IntegerList,
    /// Date in YYYY-MM-DD form
    Date,
    /// Password, not echoed where the front-end can avoid it
    Secret,
    /// Yes/no confirmation
    Confirm,
}

/// One input a command asks for before it runs.
#[derive(Debug, Clone, Copy)]
pub struct InputSpec {
    /// Argument name
    pub name: &'static str,
    /// Prompt text
    pub label: &'static str,
    /// Expected shape
    pub kind: InputKind,
    /// Value used when the user leaves it blank
    pub default: Option<&'static str>,
}

impl InputSpec {
    /// Declare an input without a default.
    pub const fn new(name: &'static str, label: &'static str, kind: InputKind) -> Self {
        Self { name, label, kind, default: None }
    }

    /// Declare an input with a default.
    pub const fn with_default(
        name: &'static str,
        label: &'static str,
        kind: InputKind,
        default: &'static str,
    ) -> Self {
        Self { name, label, kind, default: Some(default) }
    }
}

/// Raw, user-entered arguments keyed by input name.
///
/// Values stay strings until a handler asks for a typed view, so that a bad
/// value fails before any database call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    values: BTreeMap<String, String>,
}

impl CommandArgs {
    /// Create empty arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set an argument.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Fill blank or missing arguments from the declared defaults.
    pub fn with_defaults(mut self, inputs: &[InputSpec]) -> Self {
        for input in inputs {
            let Some(default) = input.default else { continue };
            let blank = self.values.get(input.name).map_or(true, |v| v.trim().is_empty());
            if blank {
                self.values.insert(input.name.to_string(), default.to_string());
            }
        }
        self
    }

    /// Raw value, trimmed, `None` when missing or blank.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// Raw value without trimming, `None` when missing.
    pub fn get_raw(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Required text.
    pub fn text(&self, name: &str) -> Result<&str, CatastoError> {
        self.get(name).ok_or_else(|| CatastoError::input_format(name, "valore obbligatorio"))
    }

    /// Optional text.
    pub fn optional_text(&self, name: &str) -> Option<&str> {
        self.get(name)
    }

    /// Required integer.
    pub fn integer(&self, name: &str) -> Result<i32, CatastoError> {
        let raw = self.text(name)?;
        raw.parse::<i32>().map_err(|_| {
            CatastoError::input_format(name, format!("'{raw}' non è un numero intero valido"))
        })
    }

    /// Required positive integer (database identifiers).
    pub fn id(&self, name: &str) -> Result<i32, CatastoError> {
        let value = self.integer(name)?;
        if value <= 0 {
            return Err(CatastoError::input_format(name, "deve essere un numero positivo"));
        }
        Ok(value)
    }

    /// Required port number.
    pub fn port(&self, name: &str) -> Result<u16, CatastoError> {
        let raw = self.text(name)?;
        match raw.parse::<u16>() {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(CatastoError::input_format(
                name,
                format!("'{raw}' non è una porta tra 1 e 65535"),
            )),
        }
    }

    /// Required non-empty list of positive integers separated by commas.
    pub fn integer_list(&self, name: &str) -> Result<Vec<i32>, CatastoError> {
        let raw = self.text(name)?;
        let mut values = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.parse::<i32>() {
                Ok(v) if v > 0 => values.push(v),
                _ => {
                    return Err(CatastoError::input_format(
                        name,
                        format!("'{part}' non è un identificativo valido"),
                    ))
                }
            }
        }
        if values.is_empty() {
            return Err(CatastoError::input_format(name, "serve almeno un identificativo"));
        }
        Ok(values)
    }

    /// Optional date in YYYY-MM-DD form.
    pub fn optional_date(&self, name: &str) -> Result<Option<NaiveDate>, CatastoError> {
        match self.get(name) {
            None => Ok(None),
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(Some).map_err(|_| {
                CatastoError::input_format(name, format!("'{raw}' non è una data (AAAA-MM-GG)"))
            }),
        }
    }

    /// Yes/no answer; anything but an explicit yes counts as no.
    pub fn confirmed(&self, name: &str) -> bool {
        matches!(
            self.get(name).map(str::to_lowercase).as_deref(),
            Some("s" | "si" | "sì" | "y" | "yes")
        )
    }
}
