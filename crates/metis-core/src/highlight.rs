//! Typed syntax highlighting for pretty-printed JSON. Output is a list of
//! spans, never markup, so record contents are displayed verbatim.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Key,
    String,
    Number,
    Boolean,
    Null,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

pub type HighlightedLine = Vec<Token>;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#""(\\u[a-zA-Z0-9]{4}|\\[^u]|[^\\"])*"(\s*:)?|\b(true|false|null)\b|-?\d+(?:\.\d*)?(?:[eE][+\-]?\d+)?"#,
        )
        .expect("valid regex")
    })
}

pub fn highlight_value(value: &Value) -> Vec<HighlightedLine> {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    highlight_json(&pretty)
}

pub fn highlight_json(text: &str) -> Vec<HighlightedLine> {
    text.lines().map(highlight_line).collect()
}

fn highlight_line(line: &str) -> HighlightedLine {
    let mut tokens = Vec::new();
    let mut cursor = 0;
    for found in token_pattern().find_iter(line) {
        if found.start() > cursor {
            tokens.push(Token {
                kind: TokenKind::Punct,
                text: line[cursor..found.start()].to_string(),
            });
        }
        tokens.push(Token {
            kind: classify(found.as_str()),
            text: found.as_str().to_string(),
        });
        cursor = found.end();
    }
    if cursor < line.len() {
        tokens.push(Token {
            kind: TokenKind::Punct,
            text: line[cursor..].to_string(),
        });
    }
    tokens
}

fn classify(text: &str) -> TokenKind {
    if text.starts_with('"') {
        if text.ends_with(':') {
            TokenKind::Key
        } else {
            TokenKind::String
        }
    } else if text == "true" || text == "false" {
        TokenKind::Boolean
    } else if text == "null" {
        TokenKind::Null
    } else {
        TokenKind::Number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kinds(line: &HighlightedLine) -> Vec<TokenKind> {
        line.iter()
            .filter(|token| token.kind != TokenKind::Punct)
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn classifies_each_literal() {
        let lines = highlight_json(r#"  "dataset": "/A/B", "n": -1.5e3, "ok": true, "x": null"#);
        assert_eq!(
            kinds(&lines[0]),
            vec![
                TokenKind::Key,
                TokenKind::String,
                TokenKind::Key,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::Boolean,
                TokenKind::Key,
                TokenKind::Null,
            ]
        );
    }

    #[test]
    fn spans_reassemble_the_source_line() {
        let value = json!({"general": {"tag": "<b>v1</b>", "njobs_done": 3}});
        let lines = highlight_value(&value);
        let rebuilt: Vec<String> = lines
            .iter()
            .map(|line| line.iter().map(|token| token.text.as_str()).collect())
            .collect();
        let pretty = serde_json::to_string_pretty(&value).expect("pretty");
        assert_eq!(rebuilt.join("\n"), pretty);
        assert!(lines
            .iter()
            .flatten()
            .any(|token| token.kind == TokenKind::String && token.text == "\"<b>v1</b>\""));
    }

    #[test]
    fn escaped_quotes_stay_inside_strings() {
        let lines = highlight_json(r#""msg": "say \"hi\"""#);
        assert_eq!(lines[0][2].kind, TokenKind::String);
        assert_eq!(lines[0][2].text, r#""say \"hi\"""#);
    }
}
