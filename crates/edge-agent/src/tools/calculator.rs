use async_trait::async_trait;
use serde_json::{json, Value};

use super::{required_str, AgentTool};
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::Tool;

/// Evaluates arithmetic expressions
pub struct Calculator {
    tool: Tool,
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calculator {
    pub fn new() -> Self {
        let tool = Tool::new(
            "calculator",
            "Useful for getting the result of a math expression. \
            The input to this tool should be a valid mathematical expression \
            that could be executed by a simple calculator, for example `(3 + 4) * 2^3`. \
            Supports + - * / % ^, parentheses, the constants pi and e, and the functions \
            sqrt, abs, sin, cos, tan, ln, log, exp, floor, ceil and round.",
            json!({
                "type": "object",
                "required": ["input"],
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "The expression to evaluate."
                    }
                }
            }),
        );
        Self { tool }
    }
}

#[async_trait]
impl AgentTool for Calculator {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> AgentResult<Vec<Content>> {
        let expression = required_str(&arguments, "input")?;
        let value = evaluate(expression)?;
        Ok(vec![Content::text(format_number(value))])
    }
}

/// Print whole numbers without a fractional part
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

pub fn evaluate(expression: &str) -> AgentResult<f64> {
    let mut parser = Parser {
        chars: expression.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expression()?;
    parser.skip_whitespace();
    if let Some(c) = parser.peek() {
        return Err(invalid(format!("unexpected `{}` at position {}", c, parser.pos)));
    }
    if !value.is_finite() {
        return Err(AgentError::ExecutionError(format!(
            "`{}` does not have a finite result",
            expression
        )));
    }
    Ok(value)
}

fn invalid(message: String) -> AgentError {
    AgentError::InvalidParameters(message)
}

/// Nesting allowed through parentheses, signs, exponents and function calls
const MAX_DEPTH: usize = 256;

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> AgentResult<f64> {
        let mut value = self.term()?;
        loop {
            if self.eat('+') {
                value += self.term()?;
            } else if self.eat('-') {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> AgentResult<f64> {
        let mut value = self.unary()?;
        loop {
            if self.eat('*') {
                value *= self.unary()?;
            } else if self.eat('/') {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err(AgentError::ExecutionError("division by zero".to_string()));
                }
                value /= divisor;
            } else if self.eat('%') {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err(AgentError::ExecutionError("modulo by zero".to_string()));
                }
                value %= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    // every recursive rule passes through here, so this bounds the stack
    fn unary(&mut self) -> AgentResult<f64> {
        if self.depth >= MAX_DEPTH {
            return Err(invalid("expression nests too deeply".to_string()));
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    // unary := ('-' | '+') unary | power
    fn signed(&mut self) -> AgentResult<f64> {
        if self.eat('-') {
            Ok(-self.unary()?)
        } else if self.eat('+') {
            self.unary()
        } else {
            self.power()
        }
    }

    // power := primary ('^' unary)?, right associative
    fn power(&mut self) -> AgentResult<f64> {
        let base = self.primary()?;
        if self.eat('^') {
            let exponent = self.unary()?;
            Ok(base.powf(exponent))
        } else {
            Ok(base)
        }
    }

    fn primary(&mut self) -> AgentResult<f64> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let value = self.expression()?;
                if !self.eat(')') {
                    return Err(invalid("missing closing parenthesis".to_string()));
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.identifier(),
            Some(c) => Err(invalid(format!("unexpected `{}` at position {}", c, self.pos))),
            None => Err(invalid("unexpected end of expression".to_string())),
        }
    }

    fn number(&mut self) -> AgentResult<f64> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.' || c == '_' || c == ',')
        {
            self.pos += 1;
        }
        // scientific notation, e.g. 1.5e3
        if matches!(self.peek(), Some('e') | Some('E'))
            && self
                .chars
                .get(self.pos + 1)
                .is_some_and(|c| c.is_ascii_digit() || *c == '-' || *c == '+')
        {
            self.pos += 2;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let literal: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_' && **c != ',')
            .collect();
        literal
            .parse::<f64>()
            .map_err(|_| invalid(format!("invalid number `{}`", literal)))
    }

    fn identifier(&mut self) -> AgentResult<f64> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect::<String>().to_lowercase();
        match name.as_str() {
            "pi" => return Ok(std::f64::consts::PI),
            "e" => return Ok(std::f64::consts::E),
            _ => {}
        }

        if !self.eat('(') {
            return Err(invalid(format!("unknown identifier `{}`", name)));
        }
        let argument = self.expression()?;
        if !self.eat(')') {
            return Err(invalid("missing closing parenthesis".to_string()));
        }
        let value = match name.as_str() {
            "sqrt" => argument.sqrt(),
            "abs" => argument.abs(),
            "sin" => argument.sin(),
            "cos" => argument.cos(),
            "tan" => argument.tan(),
            "ln" => argument.ln(),
            "log" => argument.log10(),
            "exp" => argument.exp(),
            "floor" => argument.floor(),
            "ceil" => argument.ceil(),
            "round" => argument.round(),
            _ => return Err(invalid(format!("unknown function `{}`", name))),
        };
        Ok(value)
    }
}
