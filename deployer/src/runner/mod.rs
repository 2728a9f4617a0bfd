//! Post-deploy command execution

pub mod output;
pub mod parse;
pub mod process;

use std::fmt;

use async_trait::async_trait;

use crate::errors::DeployerError;

/// Value of a named option
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Text(text) => write!(f, "{text}"),
            OptionValue::Int(int) => write!(f, "{int}"),
            OptionValue::Float(float) => write!(f, "{float}"),
            OptionValue::Bool(flag) => write!(f, "{flag}"),
        }
    }
}

/// One parsed command argument
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOption {
    Positional(String),
    /// Flag with its dashes kept, e.g. `--force` or `-v`
    Named { name: String, value: OptionValue },
}

/// A command name and its ordered options
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub name: String,
    pub options: Vec<CommandOption>,
}

impl CommandSpec {
    /// Render the options as process arguments. A false flag is left out.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.options.len());
        for option in &self.options {
            match option {
                CommandOption::Positional(arg) => args.push(arg.clone()),
                CommandOption::Named {
                    name,
                    value: OptionValue::Bool(true),
                } => args.push(name.clone()),
                CommandOption::Named {
                    value: OptionValue::Bool(false),
                    ..
                } => {}
                CommandOption::Named { name, value } => args.push(format!("{name}={value}")),
            }
        }
        args
    }
}

/// Executes named operations on the target
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one command, returning its captured output
    async fn run(&self, spec: &CommandSpec) -> Result<String, DeployerError>;

    /// Drop whatever the runtime cached about the code on disk. Called after
    /// every extraction.
    async fn invalidate_caches(&self) {}
}
