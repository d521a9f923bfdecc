//! Command parser for the orchestration input line.
//!
//! One line of input becomes exactly one [`Command`]: a single agent
//! invocation, a multi-agent fan-out, a dependency pipeline, a system
//! command, or raw free text. The grammar is a small explicit lexer
//! over `@`, `,`, `->`, `&`, and `/`, not a regex.
//!
//! Grammar accepted, in priority order:
//! - `@id <content>` single agent invocation
//! - `@a,b,c <content>` multi-agent fan-out (no interior whitespace)
//! - `@.. <content> -> @.. <content>` pipeline; `->` is only the
//!   operator when followed by another `@` invocation
//! - trailing isolated `&` marks the command (pipeline: its final
//!   stage) as backgroundable
//! - `/name args...` system command
//! - anything else passes through as raw text
//!
//! Known quirk, kept on purpose: the agent capture after `@` greedily
//! eats commas up to the first whitespace, so `@pm, ba task` parses as
//! a single agent literally named `pm,` with content `ba task`, not as
//! a two-agent fan-out.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// One stage of a pipeline: a set of agents all receiving the same
/// content. Stage *i+1* depends on every task produced by stage *i*.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Agents fanned out for this stage, in written order.
    pub agent_ids: Vec<String>,
    /// Instruction text shared by every agent in the stage.
    pub content: String,
}

/// Parsed form of one input line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Command {
    /// Single agent invocation.
    Agent {
        agent_id: String,
        content: String,
        background: bool,
    },
    /// Multiple agents, identical content.
    MultiAgent {
        agent_ids: Vec<String>,
        content: String,
        background: bool,
    },
    /// Ordered stages wired stage-to-stage with dependency edges.
    Pipeline { stages: Vec<Stage>, background: bool },
    /// Slash command with whitespace-delimited arguments.
    System { name: String, args: Vec<String> },
    /// Free text, passed through verbatim.
    Raw { text: String },
}

/// Parse one line of input into a [`Command`].
///
/// # Errors
/// Returns `Parse` when an agent invocation has empty content.
pub fn parse(line: &str) -> Result<Command> {
    let trimmed = line.trim();

    if let Some(rest) = trimmed.strip_prefix('/') {
        return Ok(parse_system(rest, trimmed));
    }

    if trimmed.starts_with('@') && starts_invocation(trimmed) {
        return parse_agent_line(trimmed);
    }

    Ok(Command::Raw {
        text: line.to_string(),
    })
}

// `@` must be followed by a letter to count as an invocation at all.
fn starts_invocation(s: &str) -> bool {
    s.strip_prefix('@')
        .and_then(|rest| rest.chars().next())
        .map(|c| c.is_ascii_alphabetic())
        .unwrap_or(false)
}

fn parse_system(rest: &str, original: &str) -> Command {
    let mut tokens = rest.split_whitespace();
    match tokens.next() {
        Some(name) => Command::System {
            name: name.to_string(),
            args: tokens.map(str::to_string).collect(),
        },
        // A lone slash is not a command.
        None => Command::Raw {
            text: original.to_string(),
        },
    }
}

fn parse_agent_line(line: &str) -> Result<Command> {
    // A trailing isolated `&` (preceded by whitespace, nothing after)
    // backgrounds the command. An `&` embedded mid-content is content.
    let (body, background) = match line.strip_suffix('&') {
        Some(head) if head.ends_with(char::is_whitespace) && !head.trim_end().is_empty() => {
            (head.trim_end(), true)
        }
        _ => (line, false),
    };

    let mut stages = Vec::new();
    for piece in split_stages(body) {
        stages.push(parse_stage(piece)?);
    }

    if stages.len() == 1 {
        let stage = stages.remove(0);
        if stage.agent_ids.len() == 1 {
            let mut agent_ids = stage.agent_ids;
            return Ok(Command::Agent {
                agent_id: agent_ids.remove(0),
                content: stage.content,
                background,
            });
        }
        return Ok(Command::MultiAgent {
            agent_ids: stage.agent_ids,
            content: stage.content,
            background,
        });
    }

    Ok(Command::Pipeline { stages, background })
}

// Split on every `->` that is followed, after optional whitespace, by
// another `@` invocation. Any other `->` stays inside the content.
fn split_stages(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'-' && bytes[i + 1] == b'>' {
            let after = body[i + 2..].trim_start();
            if starts_invocation(after) {
                pieces.push(body[start..i].trim_end());
                start = i + 2 + (body[i + 2..].len() - after.len());
                i = start;
                continue;
            }
        }
        i += 1;
    }
    pieces.push(&body[start..]);
    pieces
}

// Parse one `@capture <content>` stage.
fn parse_stage(piece: &str) -> Result<Stage> {
    let rest = piece
        .trim()
        .strip_prefix('@')
        .ok_or_else(|| Error::Parse(format!("expected agent invocation, got: {}", piece)))?;

    // Greedy capture over letters, digits, hyphens, and commas, up to
    // the first whitespace. This is where the comma quirk lives.
    let capture_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == ','))
        .unwrap_or(rest.len());
    let capture = &rest[..capture_len];
    let content = rest[capture_len..].trim();

    if capture.is_empty() {
        return Err(Error::Parse(format!("missing agent name in: {}", piece)));
    }
    if content.is_empty() {
        return Err(Error::Parse(format!(
            "agent command needs content: @{}",
            capture
        )));
    }

    let segments: Vec<&str> = capture.split(',').collect();
    let agent_ids = if segments.len() > 1 && segments.iter().all(|s| is_identifier(s)) {
        segments.iter().map(|s| s.to_string()).collect()
    } else {
        // Not a clean comma list: the whole capture, commas included,
        // is one agent name.
        vec![capture.to_string()]
    };

    Ok(Stage {
        agent_ids,
        content: content.to_string(),
    })
}

// Identifier: letter followed by letters, digits, or hyphens.
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_agent() {
        let cmd = parse("@pm Create a plan").unwrap();
        assert_eq!(
            cmd,
            Command::Agent {
                agent_id: "pm".to_string(),
                content: "Create a plan".to_string(),
                background: false,
            }
        );
    }

    #[test]
    fn test_parse_agent_hyphenated_name() {
        let cmd = parse("@builder-2 Build the API").unwrap();
        match cmd {
            Command::Agent { agent_id, .. } => assert_eq!(agent_id, "builder-2"),
            other => panic!("expected Agent, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_agent_empty_content_fails() {
        assert!(matches!(parse("@pm"), Err(Error::Parse(_))));
        assert!(matches!(parse("@pm    "), Err(Error::Parse(_))));
    }

    #[test]
    fn test_parse_multi_agent() {
        let cmd = parse("@pm,ba,qa Review the design").unwrap();
        assert_eq!(
            cmd,
            Command::MultiAgent {
                agent_ids: vec!["pm".to_string(), "ba".to_string(), "qa".to_string()],
                content: "Review the design".to_string(),
                background: false,
            }
        );
    }

    #[test]
    fn test_parse_comma_space_quirk_is_single_agent() {
        // The capture greedily includes the trailing comma, so this is
        // one agent named "pm," and the rest is content.
        let cmd = parse("@pm, ba task").unwrap();
        assert_eq!(
            cmd,
            Command::Agent {
                agent_id: "pm,".to_string(),
                content: "ba task".to_string(),
                background: false,
            }
        );
    }

    #[test]
    fn test_parse_double_comma_is_single_agent() {
        let cmd = parse("@pm,,ba task").unwrap();
        match cmd {
            Command::Agent { agent_id, .. } => assert_eq!(agent_id, "pm,,ba"),
            other => panic!("expected Agent, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_background_suffix() {
        let cmd = parse("@pm Create a plan &").unwrap();
        assert_eq!(
            cmd,
            Command::Agent {
                agent_id: "pm".to_string(),
                content: "Create a plan".to_string(),
                background: true,
            }
        );
    }

    #[test]
    fn test_parse_mid_content_ampersand_not_background() {
        let cmd = parse("@pm Create plan & execute it").unwrap();
        match cmd {
            Command::Agent {
                content,
                background,
                ..
            } => {
                assert!(!background);
                assert!(content.contains("& execute"));
            }
            other => panic!("expected Agent, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pipeline_two_stages() {
        let cmd = parse("@pm Plan the feature -> @builder Build it").unwrap();
        match cmd {
            Command::Pipeline { stages, background } => {
                assert!(!background);
                assert_eq!(stages.len(), 2);
                assert_eq!(stages[0].agent_ids, vec!["pm"]);
                assert_eq!(stages[0].content, "Plan the feature");
                assert_eq!(stages[1].agent_ids, vec!["builder"]);
                assert_eq!(stages[1].content, "Build it");
            }
            other => panic!("expected Pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pipeline_fanout_background_roundtrip() {
        let cmd = parse("@pm,ba Plan -> @builder-1,builder-2 Build &").unwrap();
        match cmd {
            Command::Pipeline { stages, background } => {
                assert!(background);
                assert_eq!(stages.len(), 2);
                assert_eq!(stages[0].agent_ids, vec!["pm", "ba"]);
                assert_eq!(stages[0].content, "Plan");
                assert_eq!(stages[1].agent_ids, vec!["builder-1", "builder-2"]);
                assert_eq!(stages[1].content, "Build");
            }
            other => panic!("expected Pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pipeline_three_stages() {
        let cmd = parse("@pm Plan -> @builder Build -> @qa Verify").unwrap();
        match cmd {
            Command::Pipeline { stages, .. } => {
                assert_eq!(stages.len(), 3);
                assert_eq!(stages[2].agent_ids, vec!["qa"]);
                assert_eq!(stages[2].content, "Verify");
            }
            other => panic!("expected Pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_arrow_without_invocation_is_content() {
        // "->" not followed by @agent stays inside the content.
        let cmd = parse("@pm Map input -> output").unwrap();
        assert_eq!(
            cmd,
            Command::Agent {
                agent_id: "pm".to_string(),
                content: "Map input -> output".to_string(),
                background: false,
            }
        );
    }

    #[test]
    fn test_parse_pipeline_stage_missing_content_fails() {
        assert!(matches!(
            parse("@pm Plan -> @builder"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_parse_system_command() {
        let cmd = parse("/status all verbose").unwrap();
        assert_eq!(
            cmd,
            Command::System {
                name: "status".to_string(),
                args: vec!["all".to_string(), "verbose".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_system_command_no_args() {
        let cmd = parse("/help").unwrap();
        assert_eq!(
            cmd,
            Command::System {
                name: "help".to_string(),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_parse_lone_slash_is_raw() {
        let cmd = parse("/").unwrap();
        assert!(matches!(cmd, Command::Raw { .. }));
    }

    #[test]
    fn test_parse_raw_text() {
        let cmd = parse("just some free text").unwrap();
        assert_eq!(
            cmd,
            Command::Raw {
                text: "just some free text".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_at_without_letter_is_raw() {
        let cmd = parse("@123 nope").unwrap();
        assert!(matches!(cmd, Command::Raw { .. }));
        let cmd = parse("@").unwrap();
        assert!(matches!(cmd, Command::Raw { .. }));
    }

    #[test]
    fn test_parse_empty_line_is_raw() {
        let cmd = parse("").unwrap();
        assert!(matches!(cmd, Command::Raw { .. }));
    }

    #[test]
    fn test_parse_bare_ampersand_not_background() {
        // No whitespace before the `&` means it is ordinary content,
        // not a background marker.
        let cmd = parse("@pm task&").unwrap();
        match cmd {
            Command::Agent {
                content,
                background,
                ..
            } => {
                assert!(!background);
                assert_eq!(content, "task&");
            }
            other => panic!("expected Agent, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_command_serialization() {
        let cmd = parse("@pm,ba Plan &").unwrap();
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("multi_agent"));
        let parsed: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, parsed);
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("pm"));
        assert!(is_identifier("builder-2"));
        assert!(is_identifier("a1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("-lead"));
        assert!(!is_identifier("pm,"));
    }
}
