//! A small text template engine.
//!
//! The syntax is a subset of Go's `text/template`, enough for configuration
//! files that embed secrets:
//!
//! ```text
//! {{/* database settings */}}
//! user={{ .Get "db/username" }}
//! password={{ .Get `db/password` -}}
//! ```
//!
//! Text outside of `{{ }}` is copied verbatim. An action holds one command:
//! either `.Get` with a single string argument, which is replaced by the
//! secret value at that path, or a bare string literal. `{{- ` trims the
//! whitespace before an action and ` -}}` the whitespace after it.
//!
//! Parsing is separate from rendering; a template that parses renders the
//! same way against any [`SecretSource`] up to the values it fetches.

use secretsfs_core::{Bytes, FsError};

/// Where `.Get` fetches values from.
pub trait SecretSource {
    fn get(&self, path: &str) -> Result<Bytes, FsError>;
}

/// The template text could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template is not valid UTF-8")]
    InvalidUtf8,

    #[error("line {line}: unterminated {what}")]
    Unterminated { line: usize, what: &'static str },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// Rendering stopped at a `.Get` that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("line {line}: Get {path:?}: {source}")]
    Get {
        line: usize,
        path: String,
        source: FsError,
    },
}

impl RenderError {
    /// How the failure is reported to the reader of the template.
    ///
    /// A denied secret stays a permission error; everything else is a
    /// failed render.
    pub fn fs_error(&self) -> FsError {
        match self {
            RenderError::Get {
                source: FsError::PermissionDenied,
                ..
            } => FsError::PermissionDenied,
            RenderError::Get { .. } => FsError::RemoteIo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Get { path: String, line: usize },
}

#[derive(Debug)]
enum Token {
    Field(String),
    Str(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(src: &str) -> Result<Self, TemplateError> {
        Parser { src, pos: 0 }.parse()
    }

    pub fn parse_bytes(src: &[u8]) -> Result<Self, TemplateError> {
        let src = std::str::from_utf8(src).map_err(|_| TemplateError::InvalidUtf8)?;
        Self::parse(src)
    }

    /// Paths of every `.Get` in the template, in order of appearance.
    pub fn secret_paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Get { path, .. } => Some(path.as_str()),
            Node::Text(_) => None,
        })
    }

    /// Render the full output. Nothing is returned unless every `.Get`
    /// succeeds.
    pub fn render(&self, source: &dyn SecretSource) -> Result<Vec<u8>, RenderError> {
        let mut out = Vec::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.extend_from_slice(text.as_bytes()),
                Node::Get { path, line } => {
                    let value = source.get(path).map_err(|source| RenderError::Get {
                        line: *line,
                        path: path.clone(),
                        source,
                    })?;
                    out.extend_from_slice(&value);
                }
            }
        }
        Ok(out)
    }
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const TRIM_CLOSE: &str = "-}}";
const COMMENT_OPEN: &str = "/*";
const COMMENT_CLOSE: &str = "*/";

fn is_trim_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn line(&self, offset: usize) -> usize {
        self.src[..offset].matches('\n').count() + 1
    }

    fn syntax(&self, offset: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::Syntax {
            line: self.line(offset),
            message: message.into(),
        }
    }

    /// Skip whitespace inside an action, reporting whether there was any.
    fn skip_space(&mut self) -> bool {
        let rest = self.rest();
        let trimmed = rest.trim_start_matches(is_trim_space);
        self.pos += rest.len() - trimmed.len();
        rest.len() != trimmed.len()
    }

    fn parse(mut self) -> Result<Template, TemplateError> {
        let mut nodes = Vec::new();
        let mut trim_next = false;

        loop {
            let rest = self.rest();
            let found = rest.find(OPEN);
            let mut text = match found {
                Some(i) => &rest[..i],
                None => rest,
            };
            if trim_next {
                text = text.trim_start_matches(is_trim_space);
            }

            let Some(i) = found else {
                push_text(&mut nodes, text);
                break;
            };
            let start = self.pos + i;
            self.pos = start + OPEN.len();

            // "{{- " trims the text before the action.
            let rest = self.rest();
            if rest.starts_with('-') && rest[1..].starts_with(is_trim_space) {
                text = text.trim_end_matches(is_trim_space);
                self.pos += 2;
            }
            push_text(&mut nodes, text);

            // Comments start right at the delimiter or its trim marker.
            if self.rest().starts_with(COMMENT_OPEN) {
                trim_next = self.comment(start)?;
                continue;
            }

            let line = self.line(start);
            let (tokens, trim) = self.action(start)?;
            trim_next = trim;
            nodes.push(self.command(tokens, start, line)?);
        }

        Ok(Template { nodes })
    }

    /// Consume `/* ... */` and the closing delimiter.
    fn comment(&mut self, start: usize) -> Result<bool, TemplateError> {
        let end = self
            .rest()
            .find(COMMENT_CLOSE)
            .ok_or(TemplateError::Unterminated {
                line: self.line(start),
                what: "comment",
            })?;
        self.pos += end + COMMENT_CLOSE.len();

        let rest = self.rest();
        if rest.starts_with(is_trim_space) && rest[1..].starts_with(TRIM_CLOSE) {
            self.pos += 1 + TRIM_CLOSE.len();
            Ok(true)
        } else if rest.starts_with(CLOSE) {
            self.pos += CLOSE.len();
            Ok(false)
        } else {
            Err(self.syntax(start, "comment ends before closing delimiter"))
        }
    }

    /// Tokens up to the closing delimiter, and whether it trims.
    fn action(&mut self, start: usize) -> Result<(Vec<Token>, bool), TemplateError> {
        let mut tokens = Vec::new();
        loop {
            let spaced = self.skip_space();
            let rest = self.rest();

            if spaced && rest.starts_with(TRIM_CLOSE) {
                self.pos += TRIM_CLOSE.len();
                return Ok((tokens, true));
            }
            if rest.starts_with(CLOSE) {
                self.pos += CLOSE.len();
                return Ok((tokens, false));
            }

            match rest.chars().next() {
                None => {
                    return Err(TemplateError::Unterminated {
                        line: self.line(start),
                        what: "action",
                    })
                }
                Some('"') => tokens.push(Token::Str(self.quoted()?)),
                Some('`') => tokens.push(Token::Str(self.raw()?)),
                Some('.') => tokens.push(Token::Field(self.field()?)),
                Some(c) => {
                    return Err(self.syntax(self.pos, format!("unexpected {:?} in command", c)))
                }
            }
        }
    }

    fn command(&self, tokens: Vec<Token>, start: usize, line: usize) -> Result<Node, TemplateError> {
        let mut tokens = tokens.into_iter();
        let node = match (tokens.next(), tokens.next()) {
            (None, _) => return Err(self.syntax(start, "missing value for command")),
            (Some(Token::Str(text)), None) => Node::Text(text),
            (Some(Token::Str(_)), Some(_)) => {
                return Err(self.syntax(start, "can't give argument to non-function"))
            }
            (Some(Token::Field(name)), arg) if name == "Get" => match arg {
                Some(Token::Str(path)) => Node::Get { path, line },
                Some(Token::Field(_)) => {
                    return Err(self.syntax(start, "Get expects a string argument"))
                }
                None => {
                    return Err(self.syntax(start, "wrong number of args for Get: want 1 got 0"))
                }
            },
            (Some(Token::Field(name)), _) => {
                return Err(self.syntax(start, format!("can't evaluate field {}", name)))
            }
        };

        let extra = tokens.count();
        if extra > 0 {
            return Err(self.syntax(
                start,
                format!("wrong number of args for Get: want 1 got {}", extra + 1),
            ));
        }
        Ok(node)
    }

    fn field(&mut self) -> Result<String, TemplateError> {
        let start = self.pos;
        let name: String = self.src[start + 1..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() {
            return Err(self.syntax(start, "unexpected '.' in command"));
        }
        self.pos = start + 1 + name.len();
        Ok(name)
    }

    fn raw(&mut self) -> Result<String, TemplateError> {
        let start = self.pos;
        let body = &self.src[start + 1..];
        let end = body.find('`').ok_or(TemplateError::Unterminated {
            line: self.line(start),
            what: "raw quoted string",
        })?;
        self.pos = start + 1 + end + 1;
        Ok(body[..end].to_string())
    }

    fn quoted(&mut self) -> Result<String, TemplateError> {
        let start = self.pos;
        let src: &'a str = self.src;
        let body = start + 1;
        let mut chars = src[body..].char_indices();
        let mut out = String::new();

        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos = body + i + 1;
                    return Ok(out);
                }
                '\n' => break,
                '\\' => {
                    let Some((_, escape)) = chars.next() else {
                        break;
                    };
                    let c = match escape {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        'a' => '\x07',
                        'b' => '\x08',
                        'f' => '\x0c',
                        'v' => '\x0b',
                        '\\' | '"' | '\'' => escape,
                        'x' | 'u' | 'U' => {
                            let digits = match escape {
                                'x' => 2,
                                'u' => 4,
                                _ => 8,
                            };
                            let hex: String = chars.by_ref().take(digits).map(|(_, c)| c).collect();
                            u32::from_str_radix(&hex, 16)
                                .ok()
                                .filter(|_| hex.len() == digits)
                                .and_then(char::from_u32)
                                .ok_or_else(|| {
                                    self.syntax(start, format!("invalid escape \\{}{}", escape, hex))
                                })?
                        }
                        other => {
                            return Err(
                                self.syntax(start, format!("unknown escape sequence \\{}", other))
                            )
                        }
                    };
                    out.push(c);
                }
                c => out.push(c),
            }
        }

        Err(TemplateError::Unterminated {
            line: self.line(start),
            what: "quoted string",
        })
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapSource(HashMap<&'static str, Result<&'static str, FsError>>);

    impl SecretSource for MapSource {
        fn get(&self, path: &str) -> Result<Bytes, FsError> {
            match self.0.get(path) {
                Some(Ok(value)) => Ok(Bytes::from_static(value.as_bytes())),
                Some(Err(e)) => Err(*e),
                None => Err(FsError::NotFound),
            }
        }
    }

    fn source() -> MapSource {
        MapSource(HashMap::from([
            ("db/username", Ok("admin")),
            ("db/password", Ok("s3cret")),
            ("restricted/key", Err(FsError::PermissionDenied)),
        ]))
    }

    fn render(src: &str) -> String {
        let out = Template::parse(src).unwrap().render(&source()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn plain_text() {
        assert_eq!(render("no actions here\n"), "no actions here\n");
        assert_eq!(render(""), "");
    }

    #[test]
    fn get_substitutes_value() {
        assert_eq!(render(r#"user={{.Get "db/username"}}"#), "user=admin");
        assert_eq!(
            render("user={{ .Get \"db/username\" }}\npass={{ .Get `db/password` }}\n"),
            "user=admin\npass=s3cret\n"
        );
    }

    #[test]
    fn string_literals() {
        assert_eq!(render(r#"{{"a\tb"}}"#), "a\tb");
        assert_eq!(render("{{`raw\\n`}}"), "raw\\n");
        assert_eq!(render(r#"{{"\x41\u00e9"}}"#), "Aé");
        assert_eq!(render(r#"{{"}}"}}"#), "}}");
    }

    #[test]
    fn trim_markers() {
        assert_eq!(render("a  \n {{- \"b\" -}} \n c"), "abc");
        assert_eq!(render("a {{- .Get \"db/username\" }} c"), "aadmin c");
    }

    #[test]
    fn comments() {
        assert_eq!(render("a{{/* note */}}b"), "ab");
        assert_eq!(render("a\n{{- /* note */ -}}\nb"), "ab");
        assert_eq!(render("a {{-\n/* note */\n-}} b"), "ab");
    }

    #[test]
    fn secret_paths_in_order() {
        let t = Template::parse(r#"{{.Get "b"}}{{.Get `a`}}"#).unwrap();
        assert_eq!(t.secret_paths().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn parse_errors() {
        let cases = [
            "{{ .Get \"db/username\" ",
            "{{ .Get \"unterminated }}",
            "{{ .Get }}",
            "{{ .Get \"a\" \"b\" }}",
            "{{ .Missing \"a\" }}",
            "{{ }}",
            "{{ \"a\" \"b\" }}",
            "{{ Get \"a\" }}",
            "{{ .Get .Get }}",
            "x {{-3}}",
            "{{/* open comment",
            "{{ /* spaced comment */}}",
            "{{/* spaced close */ }}",
            "{{-  /* wide trim */}}",
            "{{ \"\\q\" }}",
        ];
        for case in cases {
            assert!(Template::parse(case).is_err(), "{case:?} should not parse");
        }
    }

    #[test]
    fn parse_error_reports_line() {
        let err = Template::parse("a\nb\n{{ .Nope }}").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { line: 3, .. }));
    }

    #[test]
    fn invalid_utf8() {
        assert_eq!(
            Template::parse_bytes(&[0x66, 0xff]),
            Err(TemplateError::InvalidUtf8)
        );
    }

    #[test]
    fn get_failure_aborts() {
        let t = Template::parse("ok {{ .Get \"restricted/key\" }} more").unwrap();
        let err = t.render(&source()).unwrap_err();
        assert_eq!(err.fs_error(), FsError::PermissionDenied);

        let t = Template::parse("{{ .Get \"db/missing\" }}").unwrap();
        let err = t.render(&source()).unwrap_err();
        assert_eq!(err.fs_error(), FsError::RemoteIo);
        assert!(err.to_string().contains("db/missing"));
    }
}
