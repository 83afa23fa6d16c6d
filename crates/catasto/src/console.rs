//! Line-based console front-end.

use crate::render::{render_error, render_payload};

use catasto_core::{
    CommandArgs, CommandDescriptor, Frontend, InputKind, LocalStorage, MenuChoice, Outcome,
    Payload, SessionStatus,
};
use std::collections::HashMap;
use std::io::{BufRead, Write};

const RULE: &str = "============================================================";

/// Menus on a reader/writer pair, usually stdin and stdout.
pub struct Console<R, W> {
    input: R,
    output: W,
    /// Prompt defaults that take precedence over the built-in ones
    defaults: HashMap<&'static str, String>,
    storage: Option<LocalStorage>,
    remember: bool,
    /// Read secrets from the terminal with echo off
    hide_secrets: bool,
}

impl<R: BufRead, W: Write> Console<R, W> {
    /// Create a console over the given streams.
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            defaults: HashMap::new(),
            storage: None,
            remember: false,
            hide_secrets: false,
        }
    }

    /// Override prompt defaults by input name.
    pub fn with_defaults(mut self, defaults: HashMap<&'static str, String>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Remember successful logins in local storage.
    pub fn with_storage(mut self, storage: Option<LocalStorage>, remember: bool) -> Self {
        self.storage = storage;
        self.remember = remember;
        self
    }

    /// Read secrets from the controlling terminal without echo.
    ///
    /// Only meaningful when input is an interactive terminal; otherwise
    /// secrets come from the input stream like every other value.
    pub fn with_hidden_secrets(mut self, hide: bool) -> Self {
        self.hide_secrets = hide;
        self
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = writeln!(self.output, "{text}").and_then(|_| self.output.flush()) {
            tracing::warn!(error = %e, "Failed to write to console");
        }
    }

    fn prompt(&mut self, text: &str) {
        if let Err(e) = write!(self.output, "{text}").and_then(|_| self.output.flush()) {
            tracing::warn!(error = %e, "Failed to write to console");
        }
    }

    /// One line without its terminator, `None` at end of input.
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                let trimmed = line.strip_suffix('\n').unwrap_or(&line);
                Some(trimmed.strip_suffix('\r').unwrap_or(trimmed).to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read from console");
                None
            }
        }
    }

    /// A secret value, `None` at end of input.
    fn read_secret(&mut self, label: &str) -> Option<String> {
        if !self.hide_secrets {
            self.prompt(&format!("{label}: "));
            return self.read_line();
        }
        match rpassword::prompt_password(format!("{label}: ")) {
            Ok(secret) => Some(secret),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read password from terminal");
                None
            }
        }
    }

    fn default_for(&self, name: &str, builtin: Option<&'static str>) -> Option<String> {
        self.defaults.get(name).cloned().or_else(|| builtin.map(str::to_string))
    }

    fn remember_login(&mut self, payload: &Payload) {
        let (Payload::Connected(summary), true, Some(storage)) =
            (payload, self.remember, self.storage.as_ref())
        else {
            return;
        };
        if let Err(e) = storage.remember_connection(summary) {
            tracing::warn!(error = %e, "Failed to remember connection");
        }
    }
}

impl<R: BufRead, W: Write> Frontend for Console<R, W> {
    fn select_command(
        &mut self,
        status: &SessionStatus,
        available: &[&CommandDescriptor],
    ) -> MenuChoice {
        let mut menu = vec![
            String::new(),
            RULE.to_string(),
            "                 SISTEMA CATASTO STORICO".to_string(),
            RULE.to_string(),
        ];
        match status {
            SessionStatus::Connected => {}
            SessionStatus::Failed { reason } => {
                menu.push(format!("Non sei connesso al database ({reason})."))
            }
            _ => menu.push("Non sei connesso al database.".to_string()),
        }
        menu.push(String::new());
        menu.extend(available.iter().map(|c| format!("{:>2}) {}", c.key, c.label)));
        menu.push(String::new());
        self.emit(&menu.join("\n"));
        self.prompt("Scelta: ");

        let Some(line) = self.read_line() else {
            return MenuChoice::Closed;
        };
        let input = line.trim();
        input
            .parse::<u32>()
            .ok()
            .and_then(|key| available.iter().find(|c| c.key == key))
            .map(|c| MenuChoice::Command(c.id.to_string()))
            .unwrap_or_else(|| MenuChoice::Unrecognized(input.to_string()))
    }

    fn collect_args(&mut self, command: &CommandDescriptor) -> Option<CommandArgs> {
        let mut args = CommandArgs::new();
        for input in command.inputs {
            if input.kind == InputKind::Secret {
                let secret = self.read_secret(input.label)?;
                args.insert(input.name, secret);
                continue;
            }

            let default = self.default_for(input.name, input.default);
            match &default {
                Some(value) => self.prompt(&format!("{} [{value}]: ", input.label)),
                None => self.prompt(&format!("{}: ", input.label)),
            }

            let line = self.read_line()?;
            let value = match default {
                Some(default) if line.trim().is_empty() => default,
                _ => line,
            };
            args.insert(input.name, value);
        }
        Some(args)
    }

    fn render(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success(payload) => {
                self.remember_login(payload);
                let text = render_payload(payload);
                self.emit(&format!("\n{text}"));
            }
            Outcome::Failure(e) => {
                let text = render_error(e);
                self.emit(&format!("\n{text}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catasto_core::{available_commands, CatastoError, CommandRegistry, ProfileSummary};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn console(input: &str) -> Console<Cursor<Vec<u8>>, Vec<u8>> {
        Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn output(console: &Console<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8(console.output.clone()).unwrap()
    }

    #[test]
    fn test_login_menu_selection() {
        let registry = CommandRegistry::standard();
        let available = available_commands(&SessionStatus::Disconnected, &registry);
        let mut console = console("1\n");
        let choice = console.select_command(&SessionStatus::Disconnected, &available);
        assert_eq!(choice, MenuChoice::Command("connect".to_string()));

        let shown = output(&console);
        assert!(shown.contains("SISTEMA CATASTO STORICO"));
        assert!(shown.contains(" 1) Connetti al database"));
        assert!(shown.contains(" 0) Esci"));
        assert!(!shown.contains("Visualizza comuni"));
    }

    #[test]
    fn test_same_key_maps_by_menu() {
        let registry = CommandRegistry::standard();
        let available = available_commands(&SessionStatus::Connected, &registry);
        let mut console = console("1\n");
        let choice = console.select_command(&SessionStatus::Connected, &available);
        assert_eq!(choice, MenuChoice::Command("listMunicipalities".to_string()));
    }

    #[test]
    fn test_unrecognized_and_closed_input() {
        let registry = CommandRegistry::standard();
        let available = available_commands(&SessionStatus::Disconnected, &registry);
        let mut console = console(" 7 \n");
        assert_eq!(
            console.select_command(&SessionStatus::Disconnected, &available),
            MenuChoice::Unrecognized("7".to_string())
        );
        assert_eq!(
            console.select_command(&SessionStatus::Disconnected, &available),
            MenuChoice::Closed
        );
    }

    #[test]
    fn test_collect_login_args_uses_overrides() {
        let registry = CommandRegistry::standard();
        let connect = registry.get("connect").unwrap();
        let defaults = HashMap::from([("host", "db.archivio.local".to_string())]);
        let mut console = console("\n\n\n\narchivista\n secret \n").with_defaults(defaults);

        let args = console.collect_args(connect).unwrap();
        assert_eq!(args.get("host"), Some("db.archivio.local"));
        assert_eq!(args.get("port"), Some("5432"));
        assert_eq!(args.get("user"), Some("archivista"));
        assert_eq!(args.get_raw("password"), Some(" secret "));
        assert!(output(&console).contains("Host [db.archivio.local]: "));
        assert!(output(&console).contains("Password: "));
    }

    #[test]
    fn test_secret_comes_from_input_when_not_on_a_terminal() {
        let registry = CommandRegistry::standard();
        let connect = registry.get("connect").unwrap();
        let mut console = console("\n\n\n\npostgres\n\n");
        assert!(!console.hide_secrets);

        let args = console.collect_args(connect).unwrap();
        assert_eq!(args.get_raw("password"), Some(""));
        assert!(output(&console).ends_with("Password: "));
    }

    #[test]
    fn test_collect_args_stops_at_end_of_input() {
        let registry = CommandRegistry::standard();
        let connect = registry.get("connect").unwrap();
        let mut console = console("localhost\n");
        assert!(console.collect_args(connect).is_none());
    }

    #[test]
    fn test_render_failure() {
        let mut console = console("");
        console.render(&Outcome::Failure(CatastoError::unknown_command("42")));
        let shown = output(&console);
        assert!(shown.contains("Errore: Comando non riconosciuto: 42"));
        assert!(shown.contains("Suggerimento: Scegli una delle opzioni elencate"));
    }

    #[test]
    fn test_connected_login_is_remembered() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path().join("data")).unwrap();
        let summary = ProfileSummary {
            host: "localhost".to_string(),
            port: 5432,
            database: "catasto_storico".to_string(),
            schema: "catasto".to_string(),
            user: "postgres".to_string(),
        };

        let mut console = console("").with_storage(Some(storage), true);
        console.render(&Outcome::Success(Payload::Connected(summary.clone())));
        let stored = console.storage.as_ref().unwrap().last_connection().unwrap();
        assert_eq!(stored, Some(summary));
        assert!(output(&console).contains("Connessione al database stabilita con successo!"));
    }

    #[test]
    fn test_no_remember_skips_storage() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::open(dir.path().join("data")).unwrap();
        let summary = ProfileSummary {
            host: "localhost".to_string(),
            port: 5432,
            database: "catasto_storico".to_string(),
            schema: "catasto".to_string(),
            user: "postgres".to_string(),
        };

        let mut console = console("").with_storage(Some(storage), false);
        console.render(&Outcome::Success(Payload::Connected(summary)));
        assert_eq!(console.storage.as_ref().unwrap().last_connection().unwrap(), None);
    }
}
