// ABOUTME: Manifest template parsing and rendering against recipe configuration.
// ABOUTME: Strict on missing values, bounded by a timeout and an output size ceiling.

use std::time::Duration;

use serde_json::Value;
use snafu::{OptionExt, Snafu, ensure};

use crate::recipe::{ConfigValues, value_to_string};

/// Errors from parsing or rendering a manifest template.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RenderError {
    #[snafu(display("template parse error on line {line}: {message}"))]
    Parse { line: usize, message: String },

    #[snafu(display("no value for '{key}' and no default"))]
    MissingValue { key: String },

    #[snafu(display("rendered output exceeds {limit} bytes"))]
    OutputTooLarge { limit: usize },

    #[snafu(display("template rendering timed out after {timeout:?}"))]
    Timeout { timeout: Duration },

    #[snafu(display("template worker failed: {message}"))]
    Worker { message: String },
}

impl RenderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RenderError::Timeout { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Default(String),
    Quote,
    Lower,
    Upper,
    Trim,
}

#[derive(Debug, Clone, PartialEq)]
struct Expr {
    key: String,
    filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Expr(Expr),
    If {
        cond: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

struct Frame {
    cond: Expr,
    line: usize,
    then: Vec<Node>,
    otherwise: Option<Vec<Node>>,
}

impl Frame {
    fn active(&mut self) -> &mut Vec<Node> {
        match &mut self.otherwise {
            Some(nodes) => nodes,
            None => &mut self.then,
        }
    }
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, RenderError> {
        let mut root = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut rest = source;
        let mut line = 1;

        while let Some(open) = rest.find("{{") {
            let (text, after_open) = rest.split_at(open);
            if !text.is_empty() {
                push(&mut root, &mut stack, Node::Text(text.to_string()));
            }
            line += text.matches('\n').count();

            let after_open = &after_open[2..];
            let close = after_open.find("}}").context(ParseSnafu {
                line,
                message: "unterminated '{{'",
            })?;
            let tag = &after_open[..close];
            let tag_line = line;
            line += tag.matches('\n').count();
            rest = &after_open[close + 2..];

            let tag = tag.trim();
            if tag == "end" {
                let frame = stack.pop().context(ParseSnafu {
                    line: tag_line,
                    message: "'end' without matching 'if'",
                })?;
                let node = Node::If {
                    cond: frame.cond,
                    then: frame.then,
                    otherwise: frame.otherwise.unwrap_or_default(),
                };
                push(&mut root, &mut stack, node);
            } else if tag == "else" {
                let frame = stack.last_mut().context(ParseSnafu {
                    line: tag_line,
                    message: "'else' without matching 'if'",
                })?;
                ensure!(
                    frame.otherwise.is_none(),
                    ParseSnafu {
                        line: tag_line,
                        message: "duplicate 'else'",
                    }
                );
                frame.otherwise = Some(Vec::new());
            } else if let Some(cond) = tag.strip_prefix("if ") {
                stack.push(Frame {
                    cond: parse_expr(cond, tag_line)?,
                    line: tag_line,
                    then: Vec::new(),
                    otherwise: None,
                });
            } else {
                let expr = parse_expr(tag, tag_line)?;
                push(&mut root, &mut stack, Node::Expr(expr));
            }
        }

        if !rest.is_empty() {
            push(&mut root, &mut stack, Node::Text(rest.to_string()));
        }

        if let Some(frame) = stack.last() {
            return ParseSnafu {
                line: frame.line,
                message: "'if' without matching 'end'",
            }
            .fail();
        }

        Ok(Self { nodes: root })
    }

    /// Render against `values`, failing once the output passes `limit` bytes.
    pub fn render(&self, values: &ConfigValues, limit: usize) -> Result<String, RenderError> {
        let mut out = String::new();
        render_nodes(&self.nodes, values, limit, &mut out)?;
        Ok(out)
    }
}

fn push(root: &mut Vec<Node>, stack: &mut [Frame], node: Node) {
    match stack.last_mut() {
        Some(frame) => frame.active().push(node),
        None => root.push(node),
    }
}

fn render_nodes(
    nodes: &[Node],
    values: &ConfigValues,
    limit: usize,
    out: &mut String,
) -> Result<(), RenderError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Expr(expr) => {
                let value = eval(expr, values).context(MissingValueSnafu {
                    key: expr.key.clone(),
                })?;
                out.push_str(&value);
            }
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if is_truthy(cond, values) {
                    then
                } else {
                    otherwise
                };
                render_nodes(branch, values, limit, out)?;
            }
        }
        ensure!(out.len() <= limit, OutputTooLargeSnafu { limit });
    }
    Ok(())
}

/// Evaluate an expression; `None` means the key is missing and nothing
/// supplied a default.
fn eval(expr: &Expr, values: &ConfigValues) -> Option<String> {
    let mut current = values.get(&expr.key).map(value_to_string);
    for filter in &expr.filters {
        current = match (filter, current) {
            (Filter::Default(fallback), None) => Some(fallback.clone()),
            (Filter::Default(fallback), Some(v)) if v.is_empty() => Some(fallback.clone()),
            (_, None) => None,
            (Filter::Default(_), Some(v)) => Some(v),
            (Filter::Quote, Some(v)) => Some(format!(
                "\"{}\"",
                v.replace('\\', "\\\\").replace('"', "\\\"")
            )),
            (Filter::Lower, Some(v)) => Some(v.to_lowercase()),
            (Filter::Upper, Some(v)) => Some(v.to_uppercase()),
            (Filter::Trim, Some(v)) => Some(v.trim().to_string()),
        };
    }
    current
}

fn is_truthy(expr: &Expr, values: &ConfigValues) -> bool {
    if expr.filters.is_empty() {
        return match values.get(&expr.key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(_) => true,
        };
    }
    eval(expr, values).is_some_and(|v| !v.is_empty() && v != "false" && v != "0")
}

#[derive(Debug, PartialEq)]
enum Token {
    Key(String),
    Word(String),
    Str(String),
    Pipe,
}

fn tokenize(source: &str, line: usize) -> Result<Vec<Token>, RenderError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '|' {
            chars.next();
            tokens.push(Token::Pipe);
        } else if c == '"' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(escaped) => s.push(escaped),
                        None => break,
                    },
                    Some(other) => s.push(other),
                    None => {
                        return ParseSnafu {
                            line,
                            message: "unterminated string literal",
                        }
                        .fail();
                    }
                }
            }
            tokens.push(Token::Str(s));
        } else {
            let mut word = String::new();
            while let Some(&w) = chars.peek() {
                if w.is_whitespace() || w == '|' || w == '"' {
                    break;
                }
                word.push(w);
                chars.next();
            }
            match word.strip_prefix('.') {
                Some(key) => tokens.push(Token::Key(key.to_string())),
                None => tokens.push(Token::Word(word)),
            }
        }
    }

    Ok(tokens)
}

fn parse_expr(source: &str, line: usize) -> Result<Expr, RenderError> {
    let mut tokens = tokenize(source, line)?.into_iter();

    let key = match tokens.next() {
        Some(Token::Key(key)) if is_valid_key(&key) => key,
        Some(Token::Key(key)) => {
            return ParseSnafu {
                line,
                message: format!("invalid key '.{}'", key),
            }
            .fail();
        }
        Some(_) => {
            return ParseSnafu {
                line,
                message: format!("expected '.name' in '{}'", source),
            }
            .fail();
        }
        None => {
            return ParseSnafu {
                line,
                message: "empty expression",
            }
            .fail();
        }
    };

    let mut filters = Vec::new();
    while let Some(token) = tokens.next() {
        ensure!(
            token == Token::Pipe,
            ParseSnafu {
                line,
                message: format!("expected '|' in '{}'", source),
            }
        );
        let filter = match tokens.next() {
            Some(Token::Word(name)) => match name.as_str() {
                "default" => match tokens.next() {
                    Some(Token::Str(fallback)) => Filter::Default(fallback),
                    _ => {
                        return ParseSnafu {
                            line,
                            message: "'default' requires a quoted argument",
                        }
                        .fail();
                    }
                },
                "quote" => Filter::Quote,
                "lower" => Filter::Lower,
                "upper" => Filter::Upper,
                "trim" => Filter::Trim,
                other => {
                    return ParseSnafu {
                        line,
                        message: format!("unknown filter '{}'", other),
                    }
                    .fail();
                }
            },
            _ => {
                return ParseSnafu {
                    line,
                    message: "expected filter name after '|'",
                }
                .fail();
            }
        };
        filters.push(filter);
    }

    Ok(Expr { key, filters })
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Renders manifest templates off the async runtime under a time and size bound.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    timeout: Duration,
    max_output_bytes: usize,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 1024 * 1024)
    }
}

impl TemplateRenderer {
    pub fn new(timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            timeout,
            max_output_bytes,
        }
    }

    pub fn parse(&self, source: &str) -> Result<Template, RenderError> {
        Template::parse(source)
    }

    pub async fn render(&self, source: &str, values: &ConfigValues) -> Result<String, RenderError> {
        let template = Template::parse(source)?;
        let values = values.clone();
        let limit = self.max_output_bytes;

        let worker = tokio::task::spawn_blocking(move || template.render(&values, limit));
        match tokio::time::timeout(self.timeout, worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => WorkerSnafu {
                message: join.to_string(),
            }
            .fail(),
            Err(_) => TimeoutSnafu {
                timeout: self.timeout,
            }
            .fail(),
        }
    }
}
