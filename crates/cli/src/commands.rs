//! Line commands.
//!
//! One command per line, fields separated by commas:
//!
//! ```text
//! insert, <key>, <value>
//! query, <key>          ("*" dumps every node)
//! delete, <key>
//! join, <serial>
//! depart, <serial>
//! ring
//! q
//! ```

use replication::Reply;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use streaming::protocol::WILDCARD;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Insert { key: String, value: String },
    Query { key: String },
    QueryAll,
    Delete { key: String },
    Join { serial: u64 },
    Depart { serial: u64 },
    Ring,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command {0:?}, type help")]
    Unknown(String),
    #[error("{command} needs a {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("{0} takes fewer arguments")]
    TooManyArguments(&'static str),
    #[error("invalid node serial {0:?}")]
    InvalidSerial(String),
}

pub const HELP: &str = "\
insert, <key>, <value>   store a value
query, <key>             read a value (* for every node)
delete, <key>            remove a key
join, <serial>           add node <serial> to the ring
depart, <serial>         remove node <serial> from the ring
ring                     print the ring as JSON
q                        quit";

fn fields(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

fn argument<'a>(
    fields: &[&'a str],
    index: usize,
    command: &'static str,
    argument: &'static str,
) -> Result<&'a str, CommandError> {
    match fields.get(index) {
        Some(field) if !field.is_empty() => Ok(field),
        _ => Err(CommandError::MissingArgument { command, argument }),
    }
}

fn serial(fields: &[&str], command: &'static str) -> Result<u64, CommandError> {
    let raw = argument(fields, 1, command, "node serial")?;
    raw.parse()
        .map_err(|_| CommandError::InvalidSerial(raw.to_string()))
}

fn at_most(fields: &[&str], count: usize, command: &'static str) -> Result<(), CommandError> {
    if fields.len() > count {
        return Err(CommandError::TooManyArguments(command));
    }
    Ok(())
}

fn query(key: &str) -> Command {
    if key == WILDCARD {
        Command::QueryAll
    } else {
        Command::Query {
            key: key.to_string(),
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields = fields(line);
        let name = fields[0].to_ascii_lowercase();
        match name.as_str() {
            "insert" => {
                at_most(&fields, 3, "insert")?;
                let key = argument(&fields, 1, "insert", "key")?;
                let value = argument(&fields, 2, "insert", "value")?;
                Ok(Command::Insert {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            "query" => {
                at_most(&fields, 2, "query")?;
                Ok(query(argument(&fields, 1, "query", "key")?))
            }
            "delete" => {
                at_most(&fields, 2, "delete")?;
                let key = argument(&fields, 1, "delete", "key")?;
                Ok(Command::Delete {
                    key: key.to_string(),
                })
            }
            "join" => {
                at_most(&fields, 2, "join")?;
                Ok(Command::Join {
                    serial: serial(&fields, "join")?,
                })
            }
            "depart" => {
                at_most(&fields, 2, "depart")?;
                Ok(Command::Depart {
                    serial: serial(&fields, "depart")?,
                })
            }
            "ring" => Ok(Command::Ring),
            "help" => Ok(Command::Help),
            "q" | "quit" | "exit" => Ok(Command::Quit),
            _ => Err(CommandError::Unknown(fields[0].to_string())),
        }
    }
}

/// How the lines of an input file are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// `key, value` lines
    Inserts,
    /// key lines
    Queries,
    /// full commands
    Commands,
}

impl InputFormat {
    /// Chosen from the file name: `insert` or `query` in it selects the
    /// short forms.
    pub fn for_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.contains("insert") {
            InputFormat::Inserts
        } else if name.contains("query") {
            InputFormat::Queries
        } else {
            InputFormat::Commands
        }
    }

    /// Blank lines yield `None`.
    pub fn parse_line(self, line: &str) -> Result<Option<Command>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let command = match self {
            InputFormat::Inserts => format!("insert, {line}").parse::<Command>()?,
            InputFormat::Queries => {
                let fields = fields(line);
                at_most(&fields, 1, "query")?;
                query(fields[0])
            }
            InputFormat::Commands => line.parse::<Command>()?,
        };
        Ok(Some(command))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Reply { verb: &'static str, reply: Reply },
    Ring(String),
    Help,
    Quit,
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Reply { verb, reply } => {
                let status = if reply.ok { "OK" } else { "FAIL" };
                write!(f, "{status} {verb} {}", reply.key)?;
                match &reply.value {
                    Some(value) if value.contains('\n') => write!(f, "\n{value}"),
                    Some(value) => write!(f, " = {value}"),
                    None => Ok(()),
                }
            }
            CommandResult::Ring(json) => f.write_str(json),
            CommandResult::Help => f.write_str(HELP),
            CommandResult::Quit => f.write_str("bye"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_commands() {
        assert_eq!(
            "insert, alice, 1".parse::<Command>(),
            Ok(Command::Insert {
                key: "alice".into(),
                value: "1".into()
            })
        );
        assert_eq!("QUERY,alice".parse::<Command>(), Ok(Command::Query { key: "alice".into() }));
        assert_eq!("query, *".parse::<Command>(), Ok(Command::QueryAll));
        assert_eq!("delete, alice".parse::<Command>(), Ok(Command::Delete { key: "alice".into() }));
    }

    #[test]
    fn test_parse_membership_commands() {
        assert_eq!("join, 7".parse::<Command>(), Ok(Command::Join { serial: 7 }));
        assert_eq!("depart,3".parse::<Command>(), Ok(Command::Depart { serial: 3 }));
        assert_eq!(
            "join, seven".parse::<Command>(),
            Err(CommandError::InvalidSerial("seven".into()))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "insert, alice".parse::<Command>(),
            Err(CommandError::MissingArgument { argument: "value", .. })
        ));
        assert!(matches!(
            "query".parse::<Command>(),
            Err(CommandError::MissingArgument { .. })
        ));
        assert_eq!(
            "delete, a, b".parse::<Command>(),
            Err(CommandError::TooManyArguments("delete"))
        );
        assert!(matches!("fly, away".parse::<Command>(), Err(CommandError::Unknown(_))));
    }

    #[test]
    fn test_input_format_from_file_name() {
        assert_eq!(InputFormat::for_path(Path::new("data/insert.txt")), InputFormat::Inserts);
        assert_eq!(InputFormat::for_path(Path::new("query.txt")), InputFormat::Queries);
        assert_eq!(InputFormat::for_path(Path::new("requests.txt")), InputFormat::Commands);
    }

    #[test]
    fn test_short_form_lines() {
        assert_eq!(
            InputFormat::Inserts.parse_line("Like a Rolling Stone, 523"),
            Ok(Some(Command::Insert {
                key: "Like a Rolling Stone".into(),
                value: "523".into()
            }))
        );
        assert_eq!(
            InputFormat::Queries.parse_line(" Hey Jude "),
            Ok(Some(Command::Query { key: "Hey Jude".into() }))
        );
        assert_eq!(InputFormat::Commands.parse_line("   "), Ok(None));
    }

    #[test]
    fn test_reply_display() {
        let result = CommandResult::Reply {
            verb: "query",
            reply: Reply {
                ok: true,
                key: "alice".into(),
                value: Some("1".into()),
            },
        };
        assert_eq!(result.to_string(), "OK query alice = 1");

        let result = CommandResult::Reply {
            verb: "delete",
            reply: Reply {
                ok: false,
                key: "bob".into(),
                value: None,
            },
        };
        assert_eq!(result.to_string(), "FAIL delete bob");
    }
}
