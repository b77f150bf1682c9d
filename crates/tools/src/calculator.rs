//! Calculator tool — evaluates arithmetic expressions for agents.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    = term (('+' | '-') term)*
//! term    = power (('*' | '/' | '%') power)*
//! power   = unary ('^' power)?          right-associative
//! unary   = '-' unary | call
//! call    = IDENT '(' expr ')' | primary
//! primary = NUMBER | '(' expr ')'
//! ```
//!
//! Supported functions: `sqrt`, `abs`, `ln`, `round`.
//!
//! Nesting (parentheses, function calls, unary minus and `^` chains) is
//! capped at [`MAX_DEPTH`] so model-supplied input cannot exhaust the stack.

use async_trait::async_trait;
use convoy_core::error::ToolError;
use convoy_core::tool::{Tool, ToolResult};
use std::iter::Peekable;
use std::str::Chars;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses, decimals, \
         and the functions sqrt, abs, ln, round."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. '(2 + 3) ^ 2 / sqrt(16)'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let expr = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;

        let value = evaluate(expr).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: "calculator".into(),
            reason,
        })?;

        Ok(ToolResult::text(format_number(value))
            .with_data(serde_json::json!({ "expression": expr, "result": value })))
    }
}

/// Integers print without a trailing `.0`.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Deepest nesting the parser will follow.
pub const MAX_DEPTH: usize = 128;

/// Evaluate an expression string.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let mut parser = Parser {
        chars: expr.chars().peekable(),
        depth: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if let Some(c) = parser.chars.peek() {
        return Err(format!("Unexpected trailing input at '{c}'"));
    }
    if !value.is_finite() {
        return Err("Result is not a finite number".into());
    }
    Ok(value)
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    depth: usize,
}

impl Parser<'_> {
    /// Run `rule` one nesting level deeper.
    fn nested(&mut self, rule: fn(&mut Self) -> Result<f64, String>) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("Expression nested too deeply".into());
        }
        self.depth += 1;
        let value = rule(self);
        self.depth -= 1;
        value
    }

    fn skip_ws(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    /// Consume `c` if it is the next non-blank character.
    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        self.chars.next_if_eq(&c).is_some()
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut left = self.term()?;
        loop {
            if self.eat('+') {
                left += self.term()?;
            } else if self.eat('-') {
                left -= self.term()?;
            } else {
                return Ok(left);
            }
        }
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut left = self.power()?;
        loop {
            if self.eat('*') {
                left *= self.power()?;
            } else if self.eat('/') {
                let right = self.power()?;
                if right == 0.0 {
                    return Err("Division by zero".into());
                }
                left /= right;
            } else if self.eat('%') {
                let right = self.power()?;
                if right == 0.0 {
                    return Err("Modulo by zero".into());
                }
                left %= right;
            } else {
                return Ok(left);
            }
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.unary()?;
        if self.eat('^') {
            let exponent = self.nested(Self::power)?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64, String> {
        if self.eat('-') {
            return Ok(-self.nested(Self::unary)?);
        }
        self.call()
    }

    fn call(&mut self) -> Result<f64, String> {
        self.skip_ws();
        let mut ident = String::new();
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_alphabetic()) {
            ident.push(c);
        }
        if ident.is_empty() {
            return self.primary();
        }

        if !self.eat('(') {
            return Err(format!("Expected '(' after function '{ident}'"));
        }
        let arg = self.nested(Self::expr)?;
        if !self.eat(')') {
            return Err(format!("Expected ')' to close '{ident}('"));
        }

        match ident.as_str() {
            "sqrt" if arg < 0.0 => Err("sqrt of a negative number".into()),
            "sqrt" => Ok(arg.sqrt()),
            "abs" => Ok(arg.abs()),
            "ln" if arg <= 0.0 => Err("ln of a non-positive number".into()),
            "ln" => Ok(arg.ln()),
            "round" => Ok(arg.round()),
            other => Err(format!("Unknown function '{other}'")),
        }
    }

    fn primary(&mut self) -> Result<f64, String> {
        if self.eat('(') {
            let value = self.nested(Self::expr)?;
            if !self.eat(')') {
                return Err("Expected closing parenthesis".into());
            }
            return Ok(value);
        }

        self.skip_ws();
        let mut literal = String::new();
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
            literal.push(c);
        }
        if literal.is_empty() {
            return match self.chars.peek() {
                Some(c) => Err(format!("Unexpected character '{c}'")),
                None => Err("Unexpected end of expression".into()),
            };
        }
        literal
            .parse()
            .map_err(|_| format!("Invalid number: {literal}"))
    }
}
