//! Menu-driven command dispatch over a [`Session`].
//!
//! The controller holds no connection state of its own. Every operation
//! takes the session explicitly; the front-end only picks commands, collects
//! their inputs and renders outcomes.

use crate::commands::{CommandAction, CommandDescriptor, CommandRegistry};
use crate::error::CatastoError;
use crate::models::{CommandArgs, ConnectionProfile, Outcome, Payload, Secret, SessionStatus};
use crate::services::collaborator::Collaborator;
use crate::session::Session;

use std::process::ExitCode;

/// What the user picked from a menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuChoice {
    /// A command identifier from the registry
    Command(String),
    /// Input that matched no listed command
    Unrecognized(String),
    /// The input stream ended
    Closed,
}

/// The user-facing side of the main loop.
pub trait Frontend {
    /// Show the menu for `status` and read one selection.
    fn select_command(
        &mut self,
        status: &SessionStatus,
        available: &[&CommandDescriptor],
    ) -> MenuChoice;

    /// Prompt for the command's inputs. `None` means the input stream ended.
    fn collect_args(&mut self, command: &CommandDescriptor) -> Option<CommandArgs>;

    /// Show the result of one dispatch.
    fn render(&mut self, outcome: &Outcome);
}

/// Commands to list for the given status, in menu order.
pub fn available_commands<'r>(
    status: &SessionStatus,
    registry: &'r CommandRegistry,
) -> Vec<&'r CommandDescriptor> {
    let connected = status.is_connected();
    registry.iter().filter(|c| c.availability.is_listed(connected)).collect()
}

/// Dispatches commands against a session.
#[derive(Debug, Clone)]
pub struct SessionController {
    registry: CommandRegistry,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(CommandRegistry::standard())
    }
}

impl SessionController {
    /// Controller over a registry.
    pub fn new(registry: CommandRegistry) -> Self {
        Self { registry }
    }

    /// The command registry.
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Run one command and turn whatever happens into an [`Outcome`].
    pub fn dispatch<C: Collaborator>(
        &self,
        session: &mut Session<C>,
        command_id: &str,
        args: &CommandArgs,
    ) -> Outcome {
        let Some(command) = self.registry.get(command_id) else {
            tracing::debug!(command = command_id, "Unknown command");
            return Outcome::Failure(CatastoError::unknown_command(command_id));
        };

        if command.requires_connection() && !session.is_connected() {
            tracing::debug!(command = command.id, status = session.status().label(), "Refused");
            return Outcome::Failure(CatastoError::NotConnected);
        }

        let args = args.clone().with_defaults(command.inputs);
        tracing::debug!(session_id = %session.id(), command = command.id, "Dispatching");

        let outcome: Outcome = match command.action {
            CommandAction::Connect => connect(session, &args).into(),
            CommandAction::Disconnect => {
                session.disconnect();
                Outcome::Success(Payload::message("Disconnesso dal database."))
            }
            CommandAction::Exit => Outcome::Success(Payload::Exit),
            CommandAction::Run(handler) => match session.gateway() {
                Ok(mut gateway) => {
                    handler(&mut gateway, &args).map_err(CatastoError::into_command_failure).into()
                }
                Err(e) => Outcome::Failure(e),
            },
        };

        if let Outcome::Failure(e) = &outcome {
            tracing::info!(command = command.id, category = e.category(), error = %e, "Command failed");
        }
        outcome
    }

    /// Drive the front-end until `exit` or end of input. Always disconnects.
    pub fn main_loop<C: Collaborator>(
        &self,
        session: &mut Session<C>,
        frontend: &mut dyn Frontend,
    ) -> ExitCode {
        tracing::info!(session_id = %session.id(), "Main loop started");
        loop {
            let available = available_commands(session.status(), &self.registry);
            let command_id = match frontend.select_command(session.status(), &available) {
                MenuChoice::Command(id) => id,
                MenuChoice::Unrecognized(input) => {
                    frontend.render(&Outcome::Failure(CatastoError::unknown_command(input)));
                    continue;
                }
                MenuChoice::Closed => break,
            };

            let args = match self.registry.get(&command_id) {
                Some(command) if !command.requires_connection() || session.is_connected() => {
                    match frontend.collect_args(command) {
                        Some(args) => args,
                        None => break,
                    }
                }
                _ => CommandArgs::new(),
            };

            let outcome = self.dispatch(session, &command_id, &args);
            frontend.render(&outcome);
            if outcome.is_exit() {
                break;
            }
        }

        session.disconnect();
        tracing::info!(session_id = %session.id(), "Main loop finished");
        ExitCode::SUCCESS
    }
}

/// Build a profile from login arguments.
pub fn profile_from_args(args: &CommandArgs) -> Result<ConnectionProfile, CatastoError> {
    let port = args.port("port")?;
    ConnectionProfile::builder()
        .host(args.text("host")?)
        .port(port)
        .database(args.text("database")?)
        .schema(args.text("schema")?)
        .user(args.text("user")?)
        .secret(Secret::new(args.get_raw("password").unwrap_or_default()))
        .build()
        .map_err(|reason| CatastoError::input_format("connessione", reason))
}

fn connect<C: Collaborator>(
    session: &mut Session<C>,
    args: &CommandArgs,
) -> Result<Payload, CatastoError> {
    let profile = profile_from_args(args)?;
    let summary = profile.summary();
    session.connect(profile)?;
    Ok(Payload::Connected(summary))
}
