//! Parser for the tag-delimited action language
//!
//! Model output is ordinary prose with embedded blocks such as:
//!
//! ```text
//! <autoArtifact id="todo-app" title="Todo app">
//!   <autoAction type="file" filePath="src/App.tsx">...</autoAction>
//!   <autoAction type="shell">npm install</autoAction>
//! </autoArtifact>
//! ```
//!
//! `boltArtifact` / `boltAction` are accepted as synonyms. Only blocks whose
//! closing tag is present are returned, so the same text can be re-parsed as
//! it grows and a block shows up exactly once, fully formed. All functions are
//! pure: the same input always yields the same output.

use crate::{Artifact, Command, CommandKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

static ARTIFACT_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(autoArtifact|boltArtifact)\b([^>]*)>").expect("artifact tag pattern")
});

static ACTION_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(autoAction|boltAction)\b([^>]*)>").expect("action tag pattern"));

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attribute pattern")
});

/// Artifacts and standalone actions found in one response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub artifacts: Vec<Artifact>,
    pub actions: Vec<Command>,
}

impl ParsedResponse {
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty() && self.actions.is_empty()
    }

    /// Total number of commands, artifact members included
    pub fn command_count(&self) -> usize {
        self.actions.len() + self.artifacts.iter().map(|a| a.actions.len()).sum::<usize>()
    }
}

/// A closed `<tag ...>body</tag>` span
struct Block<'a> {
    start: usize,
    end: usize,
    attrs: &'a str,
    body: &'a str,
}

fn find_blocks<'a>(text: &'a str, open: &Regex) -> Vec<Block<'a>> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(caps) = open.captures_at(text, pos) {
        let (Some(whole), Some(tag)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let attrs = caps.get(2).map_or("", |m| m.as_str());
        let closing = format!("</{}>", tag.as_str());

        let Some(offset) = text[whole.end()..].find(&closing) else {
            // Still streaming; nothing after an unclosed opener is final yet
            break;
        };
        let body_end = whole.end() + offset;
        let end = body_end + closing.len();
        blocks.push(Block {
            start: whole.start(),
            end,
            attrs,
            body: &text[whole.end()..body_end],
        });
        pos = end;
    }

    blocks
}

fn unescape(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn parse_attributes(raw: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for caps in ATTRIBUTE.captures_iter(raw) {
        let Some(name) = caps.get(1) else { continue };
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str());
        attrs
            .entry(name.as_str().to_string())
            .or_insert_with(|| unescape(value));
    }
    attrs
}

/// Drop the line break that directly follows the opening tag
fn file_payload(body: &str) -> String {
    body.strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body)
        .to_string()
}

fn build_command(raw_attrs: &str, body: &str) -> Option<Command> {
    let attrs = parse_attributes(raw_attrs);

    let kind = match attrs.get("type").map(|t| t.parse::<CommandKind>()) {
        Some(Ok(kind)) => kind,
        Some(Err(e)) => {
            debug!("Ignoring action: {}", e);
            return None;
        }
        None => {
            debug!("Ignoring action without a type attribute");
            return None;
        }
    };
    let description = attrs.get("description").cloned();
    let path = attrs.get("filePath").or_else(|| attrs.get("path")).cloned();

    match (kind, path) {
        (CommandKind::RunShell, _) => Some(Command::RunShell {
            command: body.trim().to_string(),
            description,
        }),
        (_, None) => {
            debug!("Ignoring {} action without a file path", kind);
            None
        }
        (CommandKind::CreateFile, Some(path)) => Some(Command::CreateFile {
            path,
            content: file_payload(body),
            description,
        }),
        (CommandKind::EditFile, Some(path)) => Some(Command::EditFile {
            path,
            content: file_payload(body),
            description,
        }),
        (CommandKind::DeleteFile, Some(path)) => Some(Command::DeleteFile { path, description }),
    }
}

/// Every complete action block in `text`, in document order
pub fn parse_actions(text: &str) -> Vec<Command> {
    find_blocks(text, &ACTION_OPEN)
        .into_iter()
        .filter_map(|block| build_command(block.attrs, block.body))
        .collect()
}

/// Every complete artifact block in `text`, in document order
pub fn parse_artifacts(text: &str) -> Vec<Artifact> {
    find_blocks(text, &ARTIFACT_OPEN)
        .into_iter()
        .filter_map(|block| {
            let attrs = parse_attributes(block.attrs);
            let (Some(id), Some(title)) = (attrs.get("id"), attrs.get("title")) else {
                debug!("Ignoring artifact missing id or title");
                return None;
            };
            Some(Artifact {
                id: id.clone(),
                title: title.clone(),
                description: attrs.get("description").cloned(),
                actions: parse_actions(block.body),
            })
        })
        .collect()
}

/// Actions outside any artifact block.
///
/// Artifact spans (malformed ones included) are cut out first, so an action
/// is never reported both as an artifact member and standalone. An artifact
/// whose closing tag has not arrived owns everything after its opener.
pub fn parse_standalone_actions(text: &str) -> Vec<Command> {
    let spans = find_blocks(text, &ARTIFACT_OPEN);
    let cursor = spans.last().map_or(0, |span| span.end);
    let tail_end = ARTIFACT_OPEN
        .find_at(text, cursor)
        .map_or(text.len(), |open| open.start());
    if spans.is_empty() {
        return parse_actions(&text[..tail_end]);
    }

    let mut remainder = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in &spans {
        remainder.push_str(&text[cursor..span.start]);
        // A tag name cannot contain a newline, so the seam never forms a new tag
        remainder.push('\n');
        cursor = span.end;
    }
    remainder.push_str(&text[cursor..tail_end]);

    parse_actions(&remainder)
}

/// Artifacts plus standalone actions
pub fn parse_response(text: &str) -> ParsedResponse {
    ParsedResponse {
        artifacts: parse_artifacts(text),
        actions: parse_standalone_actions(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: &str = r#"Sure, here is the app.
<autoArtifact id="todo" title="Todo App" description="Initial scaffold">
<autoAction type="file" filePath="src/App.tsx">
export default function App() {}
</autoAction>
<autoAction type="shell">
  npm install
</autoAction>
</autoArtifact>
Let me know if you need anything else."#;

    #[test]
    fn test_full_artifact() {
        let artifacts = parse_artifacts(ARTIFACT);
        assert_eq!(artifacts.len(), 1);

        let artifact = &artifacts[0];
        assert_eq!(artifact.id, "todo");
        assert_eq!(artifact.title, "Todo App");
        assert_eq!(artifact.description.as_deref(), Some("Initial scaffold"));
        assert_eq!(
            artifact.actions,
            vec![
                Command::create_file("src/App.tsx", "export default function App() {}\n"),
                Command::run_shell("npm install"),
            ]
        );
    }

    #[test]
    fn test_prefixes_before_closing_tag_yield_nothing() {
        let closing = ARTIFACT.find("</autoArtifact>").unwrap();
        for (idx, _) in ARTIFACT.char_indices().filter(|(i, _)| *i <= closing) {
            assert!(
                parse_artifacts(&ARTIFACT[..idx]).is_empty(),
                "prefix of length {} produced an artifact",
                idx
            );
        }
        let done = closing + "</autoArtifact>".len();
        assert_eq!(parse_artifacts(&ARTIFACT[..done]).len(), 1);
    }

    #[test]
    fn test_parsing_is_idempotent() {
        assert_eq!(parse_artifacts(ARTIFACT), parse_artifacts(ARTIFACT));
        assert_eq!(parse_response(ARTIFACT), parse_response(ARTIFACT));
    }

    #[test]
    fn test_standalone_excludes_artifact_members() {
        let text = format!(
            "{}\n<autoAction type=\"delete\" filePath=\"old.txt\"></autoAction>",
            ARTIFACT
        );
        let parsed = parse_response(&text);
        assert_eq!(parsed.artifacts.len(), 1);
        assert_eq!(parsed.actions, vec![Command::delete_file("old.txt")]);
        assert_eq!(parsed.command_count(), 3);
    }

    #[test]
    fn test_streaming_increments() {
        let mut buffer = String::from(r#"<autoAction type="file" filePath="a.ts">"#);
        assert!(parse_standalone_actions(&buffer).is_empty());

        buffer.push_str("hello</autoAction>");
        let actions = parse_standalone_actions(&buffer);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].path(), Some("a.ts"));
        assert_eq!(actions[0].content(), Some("hello"));
    }

    #[test]
    fn test_unclosed_artifact_owns_its_members() {
        let text = r#"<autoAction type="shell">npm test</autoAction>
<autoArtifact id="x" title="X"><autoAction type="file" filePath="a.ts">a</autoAction>
<autoAction type="delete" filePath="b.ts"></autoAction>"#;
        let parsed = parse_response(text);
        assert!(parsed.artifacts.is_empty());
        assert_eq!(parsed.actions, vec![Command::run_shell("npm test")]);

        let closed = format!(
            "{}</autoArtifact>\n<autoArtifact id=\"y\" title=\"Y\"><autoAction type=\"file\" filePath=\"c.ts\">c</autoAction>",
            text
        );
        let parsed = parse_response(&closed);
        assert_eq!(parsed.artifacts.len(), 1);
        assert_eq!(parsed.artifacts[0].actions.len(), 2);
        assert_eq!(parsed.actions, vec![Command::run_shell("npm test")]);
    }

    #[test]
    fn test_legacy_tag_family() {
        let text = r#"<boltArtifact id="x" title="Legacy"><boltAction type="edit" filePath="a.md"># hi</boltAction></boltArtifact>"#;
        let artifacts = parse_artifacts(text);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].actions, vec![Command::edit_file("a.md", "# hi")]);
    }

    #[test]
    fn test_closing_tag_must_match_opener() {
        let text = r#"<autoAction type="file" filePath="a.ts">x</boltAction>"#;
        assert!(parse_actions(text).is_empty());
    }

    #[test]
    fn test_malformed_blocks_are_ignored() {
        let text = r#"
<autoAction type="file">no path</autoAction>
<autoAction type="patch" filePath="a.ts">unknown</autoAction>
<autoAction filePath="b.ts">no type</autoAction>
<autoArtifact title="no id"><autoAction type="file" filePath="c.ts">c</autoAction></autoArtifact>
<autoAction type='file' path='d &amp; e.ts' description="with &quot;quotes&quot;">d</autoAction>
"#;
        assert!(parse_artifacts(text).is_empty());
        let actions = parse_standalone_actions(text);
        assert_eq!(
            actions,
            vec![Command::create_file("d & e.ts", "d").with_description("with \"quotes\"")]
        );
    }

    #[test]
    fn test_empty_payloads() {
        let text = r#"<autoAction type="file" filePath="empty.txt"></autoAction><autoAction type="shell"> </autoAction>"#;
        let actions = parse_actions(text);
        assert_eq!(
            actions,
            vec![Command::create_file("empty.txt", ""), Command::run_shell("")]
        );
    }

    #[test]
    fn test_no_tags() {
        assert!(parse_response("just prose, no commands <b>bold</b>").is_empty());
    }
}
