//! Recursive-descent parser for the short DSL (§6.3).
//!
//! Precedence, loosest to tightest: additive, multiplicative, unary minus,
//! right-associative `^`, atoms.

use crate::compiler::ast::{BinOp, Expr};
use crate::compiler::lexer::{lex, Token};
use crate::note::NoteId;
use crate::rational::Rational;
use crate::variable::VariableKind;

pub fn parse(src: &str) -> Result<Expr, String> {
    let tokens = lex(src)?;
    let mut p = Parser { tokens, pos: 0 };
    let expr = p.parse_expression()?;
    p.expect(&Token::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected {:?}, found {:?}", expected, self.peek()))
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, String> {
        self.parse_sum()
    }

    fn parse_sum(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_product()?;
        loop {
            match self.peek() {
                Token::Plus => {
                    self.advance();
                    let rhs = self.parse_product()?;
                    lhs = Expr::Bin(BinOp::Add, Box::new(lhs), Box::new(rhs));
                }
                Token::Minus => {
                    self.advance();
                    let rhs = self.parse_product()?;
                    lhs = Expr::Bin(BinOp::Sub, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_product(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek() {
                Token::Star => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::Bin(BinOp::Mul, Box::new(lhs), Box::new(rhs));
                }
                Token::Slash => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::Bin(BinOp::Div, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if *self.peek() == Token::Minus {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_atom()?;
        if *self.peek() == Token::Caret {
            self.advance();
            let exp = self.parse_unary()?;
            return Ok(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr, String> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Num(number_to_rational(n)))
            }
            Token::Base => {
                self.advance();
                if *self.peek() == Token::Dot {
                    self.advance();
                    let prop = self.parse_property_name()?;
                    Ok(Expr::BaseProp(prop))
                } else {
                    Ok(Expr::NoteRefLit(0))
                }
            }
            Token::LBracket => {
                self.advance();
                let id = self.parse_note_id()?;
                self.expect(&Token::RBracket)?;
                if *self.peek() == Token::Dot {
                    self.advance();
                    let prop = self.parse_property_name()?;
                    Ok(Expr::RefProp(id, prop))
                } else {
                    Ok(Expr::NoteRefLit(id))
                }
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => match name.as_str() {
                "tempo" | "measure" | "beat" => {
                    self.advance();
                    self.expect(&Token::LParen)?;
                    let arg = self.parse_expression()?;
                    self.expect(&Token::RParen)?;
                    Ok(match name.as_str() {
                        "tempo" => Expr::Tempo(Box::new(arg)),
                        "measure" => Expr::Measure(Box::new(arg)),
                        _ => Expr::Beat(Box::new(arg)),
                    })
                }
                _ => Err(format!("unexpected identifier '{}'", name)),
            },
            other => Err(format!("unexpected token {:?}", other)),
        }
    }

    fn parse_note_id(&mut self) -> Result<NoteId, String> {
        match self.advance() {
            Token::Number(n) if n.fract() == 0.0 && n >= 0.0 => Ok(n as NoteId),
            other => Err(format!("expected note id, found {:?}", other)),
        }
    }

    fn parse_property_name(&mut self) -> Result<VariableKind, String> {
        match self.advance() {
            Token::Ident(name) => {
                VariableKind::from_shortcut(&name).ok_or_else(|| format!("unknown property '{}'", name))
            }
            other => Err(format!("expected property name, found {:?}", other)),
        }
    }
}

fn number_to_rational(n: f64) -> Rational {
    if n.fract() == 0.0 {
        Rational::from_integer(n as i64)
    } else {
        Rational::from_f64_approx(n)
    }
}
