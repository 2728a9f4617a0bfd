//! Command line parsing into a [`CommandSpec`]

use crate::runner::{CommandOption, CommandSpec, OptionValue};

/// Parse `<name> [token]*`.
///
/// Returns `None` for a blank line.
pub fn parse_command(line: &str) -> Option<CommandSpec> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next()?.to_string();
    let options = tokens.map(parse_token).collect();
    Some(CommandSpec { name, options })
}

fn parse_token(token: &str) -> CommandOption {
    if let Some(rest) = token.strip_prefix("--") {
        if let Some((key, value)) = rest.split_once('=') {
            if !key.is_empty() && !value.is_empty() {
                return CommandOption::Named {
                    name: format!("--{key}"),
                    value: coerce(value),
                };
            }
        } else if !rest.is_empty() {
            return CommandOption::Named {
                name: token.to_string(),
                value: OptionValue::Bool(true),
            };
        }
    }

    let mut chars = token.chars();
    if let (Some('-'), Some(letter), None) = (chars.next(), chars.next(), chars.next()) {
        if letter.is_ascii_alphabetic() {
            return CommandOption::Named {
                name: token.to_string(),
                value: OptionValue::Bool(true),
            };
        }
    }

    CommandOption::Positional(token.to_string())
}

fn coerce(value: &str) -> OptionValue {
    if let Ok(int) = value.parse::<i64>() {
        return OptionValue::Int(int);
    }
    if value.contains('.') {
        if let Ok(float) = value.parse::<f64>() {
            if float.is_finite() {
                return OptionValue::Float(float);
            }
        }
    }
    if value.eq_ignore_ascii_case("true") {
        return OptionValue::Bool(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return OptionValue::Bool(false);
    }
    OptionValue::Text(value.to_string())
}
