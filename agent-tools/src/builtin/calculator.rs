//! Arithmetic tool backed by a small recursive-descent parser.
//!
//! Input is restricted to digits, `+ - * / . ( )` and spaces. The whitelist is
//! checked before anything is parsed; the parser then builds an [`Expr`] tree
//! that is evaluated in `f64`. Nothing is ever evaluated dynamically.

use serde_json::Value;
use thiserror::Error;

use crate::registry::{Tool, ToolError, ToolResult};
use crate::schema::{ParamType, ParameterSpec, ToolArgs, ToolDefinition};

/// Registered name of the calculator tool.
pub const CALCULATE: &str = "calculate";

const MAX_DEPTH: usize = 64;
const MAX_LEN: usize = 1024;

/// Reasons an expression is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalcError {
    /// The expression contains a character outside the whitelist.
    #[error("invalid characters")]
    InvalidCharacters,
    /// The expression is empty or exceeds the length limit.
    #[error("expression must contain 1 to {MAX_LEN} characters")]
    Length,
    /// The expression is not well formed.
    #[error("malformed expression: {0}")]
    Syntax(String),
    /// A division by zero occurred.
    #[error("division by zero")]
    DivisionByZero,
    /// The result overflowed to infinity or NaN.
    #[error("result is not a finite number")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Open,
    Close,
}

impl Token {
    fn describe(self) -> String {
        match self {
            Self::Number(value) => format!("number {value}"),
            Self::Plus => "`+`".into(),
            Self::Minus => "`-`".into(),
            Self::Star => "`*`".into(),
            Self::Slash => "`/`".into(),
            Self::Open => "`(`".into(),
            Self::Close => "`)`".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parsed arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    #[allow(clippy::float_cmp)]
    fn eval(&self) -> Result<f64, CalcError> {
        let value = match self {
            Self::Number(value) => *value,
            Self::Negate(inner) => -inner.eval()?,
            Self::Binary { op, lhs, rhs } => {
                let (lhs, rhs) = (lhs.eval()?, rhs.eval()?);
                match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::Div if rhs == 0.0 => return Err(CalcError::DivisionByZero),
                    BinaryOp::Div => lhs / rhs,
                }
            }
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(CalcError::NonFinite)
        }
    }
}

fn is_allowed(c: char) -> bool {
    matches!(c, '0'..='9' | '+' | '-' | '*' | '/' | '.' | '(' | ')' | ' ')
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            ' ' => continue,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::Open,
            ')' => Token::Close,
            _ => {
                let mut end = start + c.len_utf8();
                while let Some(&(idx, next)) = chars.peek() {
                    if !(next.is_ascii_digit() || next == '.') {
                        break;
                    }
                    end = idx + next.len_utf8();
                    chars.next();
                }
                let literal = &input[start..end];
                let value = literal
                    .parse::<f64>()
                    .ok()
                    .filter(|_| literal.matches('.').count() <= 1)
                    .ok_or_else(|| CalcError::Syntax(format!("bad number `{literal}`")))?;
                Token::Number(value)
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn parse(tokens: Vec<Token>) -> Result<Expr, CalcError> {
        let mut parser = Self {
            tokens,
            position: 0,
            depth: 0,
        };
        let expr = parser.expression()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(CalcError::Syntax(format!(
                "unexpected {}",
                token.describe()
            ))),
        }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        self.position += 1;
        token
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<Expr, CalcError> {
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinaryOp::Add),
            Some(Token::Minus) => Some(BinaryOp::Sub),
            _ => None,
        } {
            self.position += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // term := unary (('*' | '/') unary)*
    fn term(&mut self) -> Result<Expr, CalcError> {
        let mut lhs = self.unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinaryOp::Mul),
            Some(Token::Slash) => Some(BinaryOp::Div),
            _ => None,
        } {
            self.position += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // unary := ('+' | '-') unary | primary
    fn unary(&mut self) -> Result<Expr, CalcError> {
        self.enter()?;
        let expr = match self.peek() {
            Some(Token::Plus) => {
                self.position += 1;
                self.unary()?
            }
            Some(Token::Minus) => {
                self.position += 1;
                Expr::Negate(Box::new(self.unary()?))
            }
            _ => self.primary()?,
        };
        self.depth -= 1;
        Ok(expr)
    }

    // primary := NUMBER | '(' expression ')'
    fn primary(&mut self) -> Result<Expr, CalcError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Open) => {
                let inner = self.expression()?;
                match self.advance() {
                    Some(Token::Close) => Ok(inner),
                    Some(token) => Err(CalcError::Syntax(format!(
                        "expected `)`, found {}",
                        token.describe()
                    ))),
                    None => Err(CalcError::Syntax("unclosed `(`".into())),
                }
            }
            Some(token) => Err(CalcError::Syntax(format!(
                "unexpected {}",
                token.describe()
            ))),
            None => Err(CalcError::Syntax("unexpected end of expression".into())),
        }
    }

    fn enter(&mut self) -> Result<(), CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::Syntax("expression nested too deeply".into()));
        }
        Ok(())
    }
}

/// Evaluates an arithmetic expression.
///
/// # Errors
///
/// Returns [`CalcError::InvalidCharacters`] before any parsing when a
/// character falls outside the whitelist, and the other variants for
/// malformed input, division by zero, or non-finite results.
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    if !expression.chars().all(is_allowed) {
        return Err(CalcError::InvalidCharacters);
    }
    if expression.trim().is_empty() || expression.len() > MAX_LEN {
        return Err(CalcError::Length);
    }

    let tokens = tokenize(expression)?;
    Parser::parse(tokens)?.eval()
}

/// Evaluates an expression and formats the result.
///
/// Integral results print without a fractional part (`"8"`), everything else
/// uses the shortest round-trip form (`"2.5"`).
///
/// # Errors
///
/// See [`evaluate`].
pub fn calculate(expression: &str) -> Result<String, CalcError> {
    evaluate(expression).map(format_number)
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Builds the `calculate` tool.
///
/// # Errors
///
/// Only fails if the static definition is invalid.
pub fn calculator_tool() -> ToolResult<Tool> {
    let definition = ToolDefinition::new(CALCULATE, "Perform mathematical calculations")?
        .with_parameter(
            ParameterSpec::required("expression", ParamType::String)
                .describe("A mathematical expression, e.g. \"2 + 2 * 3\""),
        )?;

    Ok(Tool::new(definition, |args: ToolArgs| async move {
        let expression = args.str("expression")?;
        calculate(expression)
            .map(Value::from)
            .map_err(|err| ToolError::execution(err.to_string()))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_precedence() {
        assert_eq!(calculate("2 + 2 * 3").unwrap(), "8");
        assert_eq!(calculate("(2 + 2) * 3").unwrap(), "12");
        assert_eq!(calculate("10 - 4 - 3").unwrap(), "3");
        assert_eq!(calculate("100 / 10 / 5").unwrap(), "2");
    }

    #[test]
    fn fractional_results() {
        assert_eq!(calculate("10 / 4").unwrap(), "2.5");
        assert_eq!(calculate("0.15 * 250").unwrap(), "37.5");
        assert_eq!(calculate(".5 + 5.").unwrap(), "5.5");
    }

    #[test]
    fn unary_operators() {
        assert_eq!(calculate("-3 + 5").unwrap(), "2");
        assert_eq!(calculate("-(2 * 3)").unwrap(), "-6");
        assert_eq!(calculate("+4 * --2").unwrap(), "8");
    }

    #[test]
    fn whitelist_checked_before_parsing() {
        assert_eq!(
            calculate("2+2; import os").unwrap_err(),
            CalcError::InvalidCharacters
        );
        assert_eq!(calculate("2 ** x").unwrap_err(), CalcError::InvalidCharacters);
        assert_eq!(calculate("1e5").unwrap_err(), CalcError::InvalidCharacters);
        assert_eq!(
            CalcError::InvalidCharacters.to_string(),
            "invalid characters"
        );
    }

    #[test]
    fn division_by_zero_fails() {
        assert_eq!(calculate("1 / 0").unwrap_err(), CalcError::DivisionByZero);
        assert_eq!(
            calculate("5 / (2 - 2)").unwrap_err(),
            CalcError::DivisionByZero
        );
    }

    #[test]
    fn malformed_syntax_fails() {
        for input in ["", "   ", "2 +", "(1 + 2", "1 + 2)", "2 ** 3", "1.2.3", ".", "()", "2 3"] {
            assert!(
                matches!(calculate(input), Err(CalcError::Syntax(_) | CalcError::Length)),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let input = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(matches!(calculate(&input), Err(CalcError::Syntax(_))));
        let negations = format!("{}1", "-".repeat(200));
        assert!(matches!(calculate(&negations), Err(CalcError::Syntax(_))));
    }

    #[tokio::test]
    async fn tool_reports_failures_as_reasons() {
        let tool = calculator_tool().unwrap();
        let mut args = serde_json::Map::new();
        args.insert("expression".into(), Value::from("2+2; import os"));

        let err = tool
            .call(&args, crate::schema::UnknownArgumentPolicy::Ignore)
            .await
            .expect_err("whitelist violation");
        assert_eq!(err.failure_message(), "invalid characters");

        args.insert("expression".into(), Value::from("2 + 2 * 3"));
        let value = tool
            .call(&args, crate::schema::UnknownArgumentPolicy::Ignore)
            .await
            .unwrap();
        assert_eq!(value, Value::from("8"));
    }
}
