//! `!commands`: the named operations the model and players can invoke
//! from chat.
//!
//! Commands are registered in a [`CommandRegistry`], which renders their
//! documentation for the `$COMMAND_DOCS` placeholder and dispatches calls
//! found in text.

pub mod actions;
pub mod queries;

use crate::executor::Executor;
use crate::history::History;
use crate::modes::ModeController;
use crate::syntax::{self, ArgValue, CommandCall};
use async_trait::async_trait;
use blockmind_core::error::CommandError;
use blockmind_core::lifecycle::Terminator;
use blockmind_core::world::World;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// The type a command parameter is coerced to before `perform` sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Bool,
}

impl ParamKind {
    fn label(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandParam {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
}

impl CommandParam {
    pub const fn new(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, description }
    }
}

/// Everything a command may touch.
#[derive(Clone)]
pub struct CommandContext {
    pub agent_name: String,
    pub world: Arc<dyn World>,
    pub executor: Arc<Executor>,
    pub modes: Arc<Mutex<ModeController>>,
    pub history: Arc<Mutex<History>>,
    pub terminator: Arc<dyn Terminator>,
    pub allow_insecure_coding: bool,
}

/// A named operation callable as `!name(args)`.
#[async_trait]
pub trait Command: Send + Sync {
    /// Includes the leading `!`.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn params(&self) -> &[CommandParam] {
        &[]
    }

    /// Run with arguments already coerced to the declared kinds. `None`
    /// means there is nothing to report back.
    async fn perform(&self, ctx: &CommandContext, args: &[ArgValue]) -> Result<Option<String>, CommandError>;
}

pub struct CommandRegistry {
    commands: Vec<Box<dyn Command>>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Queries first, then actions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        queries::register(&mut registry);
        actions::register(&mut registry);
        registry
    }

    /// Register a command. Replaces any existing command with the same name.
    pub fn register(&mut self, command: Box<dyn Command>) {
        let name = command.name().to_string();
        match self.index.get(&name) {
            Some(&i) => self.commands[i] = command,
            None => {
                self.index.insert(name, self.commands.len());
                self.commands.push(command);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.index.get(name).map(|&i| self.commands[i].as_ref())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name()).collect()
    }

    /// Documentation for `$COMMAND_DOCS`.
    pub fn docs(&self) -> String {
        let mut docs = String::from(
            "\n*COMMAND DOCS\n You can use the following commands to perform actions and get information about the world. \
             Use the commands with the syntax: !commandName or !commandName(\"arg1\", 1.2, ...) if the command takes arguments.\n\
             Do not use codeblocks. Only use one command in each response, trailing commands and comments will be ignored.\n",
        );
        for command in &self.commands {
            docs.push_str(&format!("{}: {}\n", command.name(), command.description()));
            if !command.params().is_empty() {
                docs.push_str("Params:\n");
                for param in command.params() {
                    docs.push_str(&format!(
                        "{}: ({}) {}\n",
                        param.name,
                        param.kind.label(),
                        param.description
                    ));
                }
            }
        }
        docs.push_str("*\n");
        docs
    }

    /// Run the first command found in `text`. `Ok(None)` when the text holds
    /// no command or the command had nothing to say.
    pub async fn execute(&self, ctx: &CommandContext, text: &str) -> Result<Option<String>, CommandError> {
        match syntax::find_command(text) {
            None => Ok(None),
            Some(Err(reason)) => Err(CommandError::InvalidArguments {
                command: syntax::contains_command(text).unwrap_or_default(),
                reason,
            }),
            Some(Ok(call)) => self.execute_call(ctx, &call).await,
        }
    }

    pub async fn execute_call(&self, ctx: &CommandContext, call: &CommandCall) -> Result<Option<String>, CommandError> {
        let command = self
            .get(&call.name)
            .ok_or_else(|| CommandError::NotFound(call.name.clone()))?;
        let args = coerce(&call.name, command.params(), &call.args)?;
        debug!(command = %call.name, args = args.len(), "Performing command");
        command.perform(ctx, &args).await
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check the argument count and convert each value to its declared kind.
fn coerce(command: &str, params: &[CommandParam], args: &[ArgValue]) -> Result<Vec<ArgValue>, CommandError> {
    let invalid = |reason: String| CommandError::InvalidArguments {
        command: command.to_string(),
        reason,
    };
    if args.len() != params.len() {
        return Err(invalid(format!(
            "Command {command} was given {} args, but requires {} args.",
            args.len(),
            params.len()
        )));
    }
    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let value = match param.kind {
                ParamKind::String => Some(ArgValue::Str(arg.to_string())),
                ParamKind::Number => arg.as_f64().filter(|n| n.is_finite()).map(ArgValue::Num),
                ParamKind::Bool => arg.as_bool().map(ArgValue::Bool),
            };
            value.ok_or_else(|| {
                invalid(format!(
                    "Param '{}' must be of type {}, got {arg}.",
                    param.name,
                    param.kind.label()
                ))
            })
        })
        .collect()
}

/// Positional accessors for coerced arguments.
pub(crate) struct Args<'a> {
    command: &'a str,
    values: &'a [ArgValue],
}

impl<'a> Args<'a> {
    pub(crate) fn new(command: &'a str, values: &'a [ArgValue]) -> Self {
        Self { command, values }
    }

    fn missing(&self, i: usize) -> CommandError {
        CommandError::InvalidArguments {
            command: self.command.to_string(),
            reason: format!("missing argument {}", i + 1),
        }
    }

    pub(crate) fn string(&self, i: usize) -> Result<String, CommandError> {
        self.values
            .get(i)
            .and_then(ArgValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| self.missing(i))
    }

    pub(crate) fn number(&self, i: usize) -> Result<f64, CommandError> {
        self.values
            .get(i)
            .and_then(ArgValue::as_f64)
            .ok_or_else(|| self.missing(i))
    }

    /// A number rounded down to a non-negative count.
    pub(crate) fn count(&self, i: usize) -> Result<u32, CommandError> {
        Ok(self.number(i)?.max(0.0).floor() as u32)
    }

    pub(crate) fn flag(&self, i: usize) -> Result<bool, CommandError> {
        self.values
            .get(i)
            .and_then(ArgValue::as_bool)
            .ok_or_else(|| self.missing(i))
    }
}
