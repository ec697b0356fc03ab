// Condition evaluator - a restricted expression grammar for step gating.
//
// Supports literals, context references, comparisons, boolean AND/OR/NOT
// and basic arithmetic. Workflow definitions stay data-driven; there is no
// path from a condition string to arbitrary code execution.

use serde_json::Value;
use thiserror::Error;

use super::template::RunContext;

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("unexpected character '{0}' in expression")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
}

/// Evaluate an expression against the run context.
///
/// Missing references evaluate to null rather than erroring, so conditions
/// over not-yet-present fields are simply falsy.
pub fn evaluate(expr: &str, ctx: &RunContext) -> Result<Value, ConditionError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_expr(0, ctx)?;
    if parser.pos != parser.tokens.len() {
        return Err(ConditionError::UnexpectedToken(format!(
            "{:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(value)
}

/// Truthiness rule shared by the runner: `false`, `"false"`, `"0"`, null,
/// zero and the empty string are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !(s.is_empty() || s == "false" || s == "0"),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Reference(String),
    True,
    False,
    Null,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '\'' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\'') => break,
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return Err(ConditionError::UnterminatedString),
                    }
                }
                i += 1;
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ConditionError::UnexpectedToken(text))?;
                tokens.push(Token::Number(n));
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric()
                        || matches!(chars[i], '_' | '.' | '[' | ']'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Reference(word),
                });
            }
            other => return Err(ConditionError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

// Binding powers, loosest first: || < && < equality < ordering < additive < multiplicative.
fn binding_power(token: &Token) -> Option<u8> {
    match token {
        Token::Or => Some(1),
        Token::And => Some(2),
        Token::Eq | Token::Ne => Some(3),
        Token::Lt | Token::Le | Token::Gt | Token::Ge => Some(4),
        Token::Plus | Token::Minus => Some(5),
        Token::Star | Token::Slash => Some(6),
        _ => None,
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ConditionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ConditionError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn parse_expr(&mut self, min_bp: u8, ctx: &RunContext) -> Result<Value, ConditionError> {
        let mut lhs = self.parse_prefix(ctx)?;

        while let Some(op) = self.peek() {
            let Some(bp) = binding_power(op) else { break };
            if bp < min_bp {
                break;
            }
            let op = self.next()?;
            let rhs = self.parse_expr(bp + 1, ctx)?;
            lhs = apply_binary(&op, &lhs, &rhs);
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self, ctx: &RunContext) -> Result<Value, ConditionError> {
        match self.next()? {
            Token::Number(n) => Ok(number(n)),
            Token::Str(s) => Ok(Value::String(s)),
            Token::True => Ok(Value::Bool(true)),
            Token::False => Ok(Value::Bool(false)),
            Token::Null => Ok(Value::Null),
            Token::Reference(path) => Ok(ctx.lookup(&path).unwrap_or(Value::Null)),
            Token::Not => {
                let operand = self.parse_prefix(ctx)?;
                Ok(Value::Bool(!is_truthy(&operand)))
            }
            Token::Minus => {
                let operand = self.parse_prefix(ctx)?;
                Ok(operand.as_f64().map(|f| number(-f)).unwrap_or(Value::Null))
            }
            Token::LParen => {
                let inner = self.parse_expr(0, ctx)?;
                match self.next()? {
                    Token::RParen => Ok(inner),
                    other => Err(ConditionError::UnexpectedToken(format!("{other:?}"))),
                }
            }
            other => Err(ConditionError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}

fn number(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::Number((f as i64).into())
    } else {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn apply_binary(op: &Token, lhs: &Value, rhs: &Value) -> Value {
    match op {
        Token::And => Value::Bool(is_truthy(lhs) && is_truthy(rhs)),
        Token::Or => Value::Bool(is_truthy(lhs) || is_truthy(rhs)),
        Token::Eq => Value::Bool(loose_eq(lhs, rhs)),
        Token::Ne => Value::Bool(!loose_eq(lhs, rhs)),
        Token::Lt | Token::Le | Token::Gt | Token::Ge => {
            let result = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(x), Some(y)) => match op {
                    Token::Lt => x < y,
                    Token::Le => x <= y,
                    Token::Gt => x > y,
                    _ => x >= y,
                },
                _ => match (lhs.as_str(), rhs.as_str()) {
                    (Some(x), Some(y)) => match op {
                        Token::Lt => x < y,
                        Token::Le => x <= y,
                        Token::Gt => x > y,
                        _ => x >= y,
                    },
                    _ => false,
                },
            };
            Value::Bool(result)
        }
        Token::Plus => match (lhs, rhs) {
            (Value::String(a), b) => Value::String(format!("{a}{}", display(b))),
            (a, Value::String(b)) => Value::String(format!("{}{b}", display(a))),
            _ => match (lhs.as_f64(), rhs.as_f64()) {
                (Some(x), Some(y)) => number(x + y),
                _ => Value::Null,
            },
        },
        Token::Minus | Token::Star | Token::Slash => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(x), Some(y)) => match op {
                Token::Minus => number(x - y),
                Token::Star => number(x * y),
                _ if y == 0.0 => Value::Null,
                _ => number(x / y),
            },
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(inputs: Value) -> RunContext {
        RunContext::new(inputs, json!({}))
    }

    #[test]
    fn comparisons_and_boolean_ops() {
        let c = ctx(json!({"score": 72, "category": "hot"}));
        assert_eq!(evaluate("inputs.score >= 70", &c).unwrap(), json!(true));
        assert_eq!(
            evaluate("inputs.category == 'hot' && inputs.score > 50", &c).unwrap(),
            json!(true)
        );
        assert_eq!(
            evaluate("inputs.category == 'cold' || inputs.score < 10", &c).unwrap(),
            json!(false)
        );
        assert_eq!(evaluate("!(inputs.score > 90)", &c).unwrap(), json!(true));
    }

    #[test]
    fn arithmetic_with_precedence() {
        let c = ctx(json!({"a": 2, "b": 3}));
        assert_eq!(evaluate("inputs.a + inputs.b * 2", &c).unwrap(), json!(8));
        assert_eq!(evaluate("(inputs.a + inputs.b) * 2", &c).unwrap(), json!(10));
        assert_eq!(evaluate("inputs.a / 0", &c).unwrap(), Value::Null);
    }

    #[test]
    fn missing_references_are_falsy_null() {
        let c = ctx(json!({}));
        assert_eq!(evaluate("inputs.missing", &c).unwrap(), Value::Null);
        assert!(!is_truthy(&evaluate("inputs.missing", &c).unwrap()));
        assert_eq!(evaluate("inputs.missing == null", &c).unwrap(), json!(true));
    }

    #[test]
    fn string_truthiness_rules() {
        assert!(!is_truthy(&json!("false")));
        assert!(!is_truthy(&json!("0")));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!(0)));
    }

    #[test]
    fn step_output_references() {
        let mut c = ctx(json!({}));
        c.record_step("contact", json!({"id": "x", "labels": ["a", "b"]}));
        assert_eq!(evaluate("steps.contact.id == 'x'", &c).unwrap(), json!(true));
        assert_eq!(
            evaluate("contact.labels[1] == 'b'", &c).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn parse_errors_are_reported() {
        let c = ctx(json!({}));
        assert!(evaluate("inputs.a ==", &c).is_err());
        assert!(evaluate("'unterminated", &c).is_err());
        assert!(evaluate("a @ b", &c).is_err());
    }
}
