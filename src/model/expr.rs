//! Symbolic expressions over model parameters, variables and intermediates
//!
//! Expressions are built with ordinary arithmetic operators on handles
//! returned by the model builder, evaluated against index-based bindings and
//! printed in APM model syntax.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Which declaration table a symbol indexes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Parameter,
    Variable,
    Intermediate,
}

/// Reference to a declared model quantity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub index: usize,
    pub name: String,
}

/// Values a symbol resolves to during evaluation
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub parameters: &'a [f64],
    pub variables: &'a [f64],
    pub intermediates: &'a [f64],
}

impl<'a> Bindings<'a> {
    fn lookup(&self, symbol: &Symbol) -> f64 {
        let table = match symbol.kind {
            SymbolKind::Parameter => self.parameters,
            SymbolKind::Variable => self.variables,
            SymbolKind::Intermediate => self.intermediates,
        };
        // Unresolved symbols poison the result instead of panicking
        table.get(symbol.index).copied().unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Symbol(Symbol),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, i32),
    Sin(Box<Expr>),
    Cos(Box<Expr>),
}

// Binding strength used when printing
const PREC_SUM: u8 = 1;
const PREC_PRODUCT: u8 = 2;
const PREC_UNARY: u8 = 3;
const PREC_ATOM: u8 = 5;

impl Expr {
    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    pub fn sin(self) -> Self {
        Expr::Sin(Box::new(self))
    }

    pub fn cos(self) -> Self {
        Expr::Cos(Box::new(self))
    }

    pub fn powi(self, exponent: i32) -> Self {
        Expr::Pow(Box::new(self), exponent)
    }

    pub fn eval(&self, bindings: &Bindings) -> f64 {
        match self {
            Expr::Const(v) => *v,
            Expr::Symbol(s) => bindings.lookup(s),
            Expr::Neg(e) => -e.eval(bindings),
            Expr::Add(a, b) => a.eval(bindings) + b.eval(bindings),
            Expr::Sub(a, b) => a.eval(bindings) - b.eval(bindings),
            Expr::Mul(a, b) => a.eval(bindings) * b.eval(bindings),
            Expr::Div(a, b) => a.eval(bindings) / b.eval(bindings),
            Expr::Pow(e, n) => e.eval(bindings).powi(*n),
            Expr::Sin(e) => e.eval(bindings).sin(),
            Expr::Cos(e) => e.eval(bindings).cos(),
        }
    }

    /// Every symbol referenced by this expression, in depth-first order
    pub fn symbols(&self) -> Vec<&Symbol> {
        let mut out = Vec::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols<'a>(&'a self, out: &mut Vec<&'a Symbol>) {
        match self {
            Expr::Const(_) => {}
            Expr::Symbol(s) => out.push(s),
            Expr::Neg(e) | Expr::Pow(e, _) | Expr::Sin(e) | Expr::Cos(e) => e.collect_symbols(out),
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
        }
    }

    /// Constant value when the expression has no symbols
    pub fn as_constant(&self) -> Option<f64> {
        if self.symbols().is_empty() {
            Some(self.eval(&Bindings {
                parameters: &[],
                variables: &[],
                intermediates: &[],
            }))
        } else {
            None
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Const(v) if *v < 0.0 => 0,
            Expr::Const(_) | Expr::Symbol(_) | Expr::Sin(_) | Expr::Cos(_) => PREC_ATOM,
            Expr::Neg(_) => 0,
            Expr::Add(..) | Expr::Sub(..) => PREC_SUM,
            Expr::Mul(..) | Expr::Div(..) => PREC_PRODUCT,
            Expr::Pow(..) => PREC_UNARY + 1,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{}", v),
            Expr::Symbol(s) => write!(f, "{}", s.name),
            Expr::Neg(e) => {
                write!(f, "-")?;
                e.fmt_child(f, PREC_UNARY)
            }
            Expr::Add(a, b) => {
                // a leading sum operand never needs parentheses
                a.fmt_child(f, 0)?;
                write!(f, " + ")?;
                b.fmt_child(f, PREC_SUM)
            }
            Expr::Sub(a, b) => {
                a.fmt_child(f, 0)?;
                write!(f, " - ")?;
                b.fmt_child(f, PREC_PRODUCT)
            }
            Expr::Mul(a, b) => {
                a.fmt_child(f, PREC_PRODUCT)?;
                write!(f, "*")?;
                b.fmt_child(f, PREC_PRODUCT)
            }
            Expr::Div(a, b) => {
                a.fmt_child(f, PREC_PRODUCT)?;
                write!(f, "/")?;
                b.fmt_child(f, PREC_UNARY)
            }
            Expr::Pow(e, n) => {
                e.fmt_child(f, PREC_ATOM)?;
                if *n < 0 {
                    write!(f, "^({})", n)
                } else {
                    write!(f, "^{}", n)
                }
            }
            Expr::Sin(e) => write!(f, "sin({})", e),
            Expr::Cos(e) => write!(f, "cos({})", e),
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

macro_rules! impl_binary_op {
    ($op:ident, $method:ident, $variant:ident) => {
        impl $op<Expr> for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs))
            }
        }

        impl $op<f64> for Expr {
            type Output = Expr;

            fn $method(self, rhs: f64) -> Expr {
                Expr::$variant(Box::new(self), Box::new(Expr::Const(rhs)))
            }
        }

        impl $op<Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(Expr::Const(self)), Box::new(rhs))
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Sub);
impl_binary_op!(Mul, mul, Mul);
impl_binary_op!(Div, div, Div);
