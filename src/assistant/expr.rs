//! Constrained arithmetic evaluator.
//!
//! Grammar (whitespace is ignored):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary ('^' unary)?
//! primary := number | '(' expr ')'
//! ```
//!
//! `^` is right-associative and binds tighter than a leading sign, so
//! `-2^2` is `-4`. Anything outside this grammar is rejected.

use thiserror::Error;

pub const MAX_INPUT_LEN: usize = 256;
pub const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("expression is empty")]
    Empty,
    #[error("expression longer than {MAX_INPUT_LEN} bytes")]
    TooLong,
    #[error("expression nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
    #[error("unexpected character {0:?} at byte {1}")]
    UnexpectedChar(char, usize),
    #[error("malformed number {0:?}")]
    BadNumber(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token at byte {0}")]
    UnexpectedToken(usize),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tok {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<(Tok, usize)>, ExprError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let tok = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'+' => Tok::Plus,
            b'-' => Tok::Minus,
            b'*' => Tok::Star,
            b'/' => Tok::Slash,
            b'^' => Tok::Caret,
            b'(' => Tok::LParen,
            b')' => Tok::RParen,
            b'0'..=b'9' | b'.' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let text = &src[start..i];
                let v: f64 = text
                    .parse()
                    .map_err(|_| ExprError::BadNumber(text.to_string()))?;
                out.push((Tok::Num(v), start));
                continue;
            }
            _ => {
                // Report the full char, not a UTF-8 fragment.
                let ch = src[i..].chars().next().unwrap_or('?');
                return Err(ExprError::UnexpectedChar(ch, i));
            }
        };
        out.push((tok, i));
        i += 1;
    }
    Ok(out)
}

struct Parser {
    toks: Vec<(Tok, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Tok> {
        self.toks.get(self.pos).map(|(t, _)| *t)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut acc = self.term()?;
        loop {
            match self.peek() {
                Some(Tok::Plus) => {
                    self.bump();
                    acc += self.term()?;
                }
                Some(Tok::Minus) => {
                    self.bump();
                    acc -= self.term()?;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut acc = self.unary()?;
        loop {
            match self.peek() {
                Some(Tok::Star) => {
                    self.bump();
                    acc *= self.unary()?;
                }
                Some(Tok::Slash) => {
                    self.bump();
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    acc /= rhs;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, ExprError> {
        match self.peek() {
            Some(Tok::Minus) => {
                self.bump();
                self.enter()?;
                let v = self.unary();
                self.leave();
                Ok(-v?)
            }
            Some(Tok::Plus) => {
                self.bump();
                self.enter()?;
                let v = self.unary();
                self.leave();
                v
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, ExprError> {
        let base = self.primary()?;
        if self.peek() == Some(Tok::Caret) {
            self.bump();
            self.enter()?;
            let exp = self.unary();
            self.leave();
            return Ok(base.powf(exp?));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, ExprError> {
        let at = self.toks.get(self.pos).map(|(_, p)| *p);
        match self.bump() {
            Some(Tok::Num(v)) => Ok(v),
            Some(Tok::LParen) => {
                self.enter()?;
                let v = self.expr();
                self.leave();
                let v = v?;
                match self.bump() {
                    Some(Tok::RParen) => Ok(v),
                    Some(_) => Err(ExprError::UnexpectedToken(self.offset_of(self.pos - 1))),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(_) => Err(ExprError::UnexpectedToken(at.unwrap_or(0))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn offset_of(&self, idx: usize) -> usize {
        self.toks.get(idx).map(|(_, p)| *p).unwrap_or(0)
    }
}

/// Evaluate an arithmetic expression. Never executes anything; input that
/// does not fit the grammar is an error.
pub fn evaluate(src: &str) -> Result<f64, ExprError> {
    if src.len() > MAX_INPUT_LEN {
        return Err(ExprError::TooLong);
    }
    let toks = tokenize(src)?;
    if toks.is_empty() {
        return Err(ExprError::Empty);
    }
    let mut p = Parser {
        toks,
        pos: 0,
        depth: 0,
    };
    let v = p.expr()?;
    if p.pos < p.toks.len() {
        return Err(ExprError::UnexpectedToken(p.offset_of(p.pos)));
    }
    if !v.is_finite() {
        return Err(ExprError::NonFinite);
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ^ 2").unwrap(), -4.0);
        assert_eq!(evaluate("2 ^ -1").unwrap(), 0.5);
        assert_eq!(evaluate("7 / 2").unwrap(), 3.5);
        assert_eq!(evaluate("1.5 * 4").unwrap(), 6.0);
    }

    #[test]
    fn rejects_non_arithmetic_input() {
        assert!(matches!(
            evaluate("2+2; DROP TABLE x"),
            Err(ExprError::UnexpectedChar(';', 3))
        ));
        assert!(matches!(
            evaluate("alert(1)"),
            Err(ExprError::UnexpectedChar('a', 0))
        ));
        assert!(matches!(evaluate("{}"), Err(ExprError::UnexpectedChar('{', 0))));
        assert!(matches!(evaluate("2 ñ 3"), Err(ExprError::UnexpectedChar('ñ', 2))));
    }

    #[test]
    fn reports_structural_errors() {
        assert_eq!(evaluate(""), Err(ExprError::Empty));
        assert_eq!(evaluate("   "), Err(ExprError::Empty));
        assert_eq!(evaluate("2 +"), Err(ExprError::UnexpectedEnd));
        assert_eq!(evaluate("(2 + 3"), Err(ExprError::UnexpectedEnd));
        assert_eq!(evaluate("2 3"), Err(ExprError::UnexpectedToken(2)));
        assert_eq!(evaluate(")"), Err(ExprError::UnexpectedToken(0)));
        assert!(matches!(evaluate("1.2.3"), Err(ExprError::BadNumber(_))));
    }

    #[test]
    fn division_by_zero_and_overflow() {
        assert_eq!(evaluate("5 / 0"), Err(ExprError::DivisionByZero));
        assert_eq!(evaluate("5 / (2 - 2)"), Err(ExprError::DivisionByZero));
        assert_eq!(evaluate("10 ^ 400"), Err(ExprError::NonFinite));
    }

    #[test]
    fn limits_length_and_nesting() {
        let long = "1+".repeat(200) + "1";
        assert_eq!(evaluate(&long), Err(ExprError::TooLong));

        let deep = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(evaluate(&deep), Err(ExprError::TooDeep));

        let signs = format!("{}1", "-".repeat(40));
        assert_eq!(evaluate(&signs), Err(ExprError::TooDeep));

        let ok = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(evaluate(&ok).unwrap(), 1.0);
    }
}
