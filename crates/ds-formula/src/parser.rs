//! Recursive-descent formula evaluator.
//!
//! Parsing and evaluation happen in one pass: the grammar is small enough
//! that an AST would only be ceremony, and the `CONFIG` operator needs its
//! component-limit override dynamically scoped around the evaluation of
//! its second argument, which a single pass gives for free.
//!
//! Grammar (precedence low to high):
//!
//! ```text
//! expression := term (('+' | '-') term)*
//! term       := factor (('*' | '/') factor)*
//! factor     := NUMBER | IDENT | IDENT '(' args ')'
//!             | '-' factor | '(' expression ')'
//! args       := (arg (',' arg)*)?
//! arg        := IDENT ':' IDENT | expression
//! ```
//!
//! `+`/`-` are convolution and its negated form; `*`/`/` require at least
//! one scalar operand. A range literal is only recognized in argument
//! position; anywhere else `A1:B3` parses as `A1` followed by trailing
//! tokens, which the top-level evaluator ignores.

use ds_core::dist::Dist;
use ds_core::error::{Error, Result};
use ds_core::flat::{flatten, unflatten};
use ds_core::reduce::{ReduceOpts, reduce};
use ds_core::traits::{DistKernels, RuinKernel};
use ds_core::DEFAULT_MAX_COMPONENTS;

use crate::token::{Token, tokenize};

/// Resolution environment for a formula evaluation.
///
/// `resolve` is total: unknown identifiers yield the empty distribution.
pub trait EvalContext {
    fn resolve(&self, id: &str) -> Dist;

    /// Component cap for this evaluation, when the embedder sets one.
    fn component_limit(&self) -> Option<usize> {
        None
    }

    /// Accelerated bulk kernels, when the embedder plugs them. Absent,
    /// the pure `Dist` operations run with identical semantics.
    fn dist_kernels(&self) -> Option<&dyn DistKernels> {
        None
    }

    /// Accelerated Monte Carlo ruin backend, when the embedder plugs one.
    fn ruin_kernel(&self) -> Option<&dyn RuinKernel> {
        None
    }
}

/// Context with no cells, no overrides, no accelerators.
pub struct EmptyContext;

impl EvalContext for EmptyContext {
    fn resolve(&self, _id: &str) -> Dist {
        Dist::empty()
    }
}

/// Evaluate a formula against a context. An empty formula yields the
/// empty distribution; tokens left over after the top-level expression
/// are ignored.
pub fn evaluate(formula: &str, ctx: &dyn EvalContext) -> Result<Dist> {
    let tokens = tokenize(formula)?;
    if tokens.is_empty() {
        return Ok(Dist::empty());
    }
    let mut parser = Parser { tokens, pos: 0, ctx, limit_override: None };
    parser.expression()
}

pub(crate) struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a dyn EvalContext,
    /// `CONFIG`-scoped component limit, shadowing the context's.
    limit_override: Option<usize>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.peek() {
            Some(t) if t == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(Error::Parse(format!("expected {expected:?}, found {t:?}"))),
            None => Err(Error::Parse(format!("expected {expected:?}, found end of input"))),
        }
    }

    pub(crate) fn effective_limit(&self) -> usize {
        self.limit_override
            .or_else(|| self.ctx.component_limit())
            .unwrap_or(DEFAULT_MAX_COMPONENTS)
    }

    pub(crate) fn ruin_kernel(&self) -> Option<&dyn RuinKernel> {
        self.ctx.ruin_kernel()
    }

    /// Post-operation safety check: reduce back under the effective limit
    /// with the sign boundary pinned.
    pub(crate) fn checked(&self, d: Dist) -> Dist {
        let limit = self.effective_limit();
        if d.len() > limit { reduce(&d, &ReduceOpts::safety(limit)) } else { d }
    }

    // -- kernel-routed value operations -------------------------------------
    //
    // Each op goes through the context's bulk kernels when present and the
    // pure Dist implementation otherwise. The flattened encoding carries no
    // repr, so the kernel path snaps merged-bin reprs back to midpoints;
    // for freshly constructed components both paths agree exactly.

    pub(crate) fn convolve_values(&self, a: &Dist, b: &Dist) -> Dist {
        match self.ctx.dist_kernels() {
            Some(k) => Dist::from_components(unflatten(
                &k.convolve(&flatten(a.components()), &flatten(b.components())),
            )),
            None => a.convolve(b),
        }
    }

    pub(crate) fn scale_values(&self, d: &Dist, factor: f64) -> Dist {
        match self.ctx.dist_kernels() {
            Some(k) => {
                Dist::from_components(unflatten(&k.scale(&flatten(d.components()), factor)))
            }
            None => d.scale(factor),
        }
    }

    pub(crate) fn subtract_values(&self, a: &Dist, b: &Dist) -> Dist {
        self.convolve_values(a, &self.scale_values(b, -1.0))
    }

    pub(crate) fn mix_values(&self, a: &Dist, b: &Dist, p: f64) -> Result<Dist> {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::Argument(format!("mixture weight must be in [0, 1], got {p}")));
        }
        match self.ctx.dist_kernels() {
            Some(k) => Ok(Dist::from_components(unflatten(&k.mix(
                &flatten(a.components()),
                &flatten(b.components()),
                p,
            )))),
            None => a.mix(b, p),
        }
    }

    pub(crate) fn mean_of(&self, d: &Dist) -> f64 {
        match self.ctx.dist_kernels() {
            Some(k) => k.mean(&flatten(d.components())),
            None => d.mean(),
        }
    }

    pub(crate) fn variance_of(&self, d: &Dist) -> f64 {
        match self.ctx.dist_kernels() {
            Some(k) => k.variance(&flatten(d.components())),
            None => d.variance(),
        }
    }

    pub(crate) fn std_of(&self, d: &Dist) -> f64 {
        match self.ctx.dist_kernels() {
            Some(k) => k.std_dev(&flatten(d.components())),
            None => d.std_dev(),
        }
    }

    pub(crate) fn prob_gt_of(&self, d: &Dist, x: f64) -> f64 {
        match self.ctx.dist_kernels() {
            Some(k) => k.prob_gt(&flatten(d.components()), x),
            None => d.prob_gt(x),
        }
    }

    /// `*`: at least one operand must be a scalar; the other is scaled.
    pub(crate) fn multiply(&self, lhs: &Dist, rhs: &Dist) -> Result<Dist> {
        if let Some(k) = as_scalar(lhs) {
            Ok(self.scale_values(rhs, k))
        } else if let Some(k) = as_scalar(rhs) {
            Ok(self.scale_values(lhs, k))
        } else {
            Err(Error::Argument("multiplication requires at least one scalar operand".into()))
        }
    }

    /// `/`: dist / scalar scales by the reciprocal; scalar / dist goes
    /// through the reciprocal distribution.
    pub(crate) fn divide(&self, lhs: &Dist, rhs: &Dist) -> Result<Dist> {
        if let Some(k) = as_scalar(rhs) {
            if k == 0.0 {
                return Err(Error::Argument("division by zero".into()));
            }
            Ok(self.scale_values(lhs, 1.0 / k))
        } else if let Some(k) = as_scalar(lhs) {
            Ok(self.scale_values(&rhs.reciprocal(), k))
        } else {
            Err(Error::Argument("division requires a scalar operand".into()))
        }
    }

    pub(crate) fn expression(&mut self) -> Result<Dist> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    value = self.checked(self.convolve_values(&value, &rhs));
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    value = self.checked(self.subtract_values(&value, &rhs));
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<Dist> {
        let mut value = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    value = self.checked(self.multiply(&value, &rhs)?);
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    value = self.checked(self.divide(&value, &rhs)?);
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<Dist> {
        match self.advance() {
            Some(Token::Number(n)) => Dist::constant(n),
            Some(Token::Minus) => Ok(self.factor()?.scale(-1.0)),
            Some(Token::LParen) => {
                let value = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    self.call(&name)
                } else {
                    Ok(self.ctx.resolve(&name))
                }
            }
            Some(t) => Err(Error::Parse(format!("unexpected token {t:?}"))),
            None => Err(Error::Parse("unexpected end of input".into())),
        }
    }

    /// Function call; the opening paren has been consumed.
    fn call(&mut self, name: &str) -> Result<Dist> {
        let upper = name.to_ascii_uppercase();
        if upper == "CONFIG" {
            return self.config_call();
        }
        let args = self.parse_args()?;
        self.expect(&Token::RParen)?;
        self.dispatch(&upper, args)
    }

    /// `CONFIG(limit, expr)`: evaluates `expr` with the component limit
    /// overridden, restoring the previous override regardless of outcome.
    fn config_call(&mut self) -> Result<Dist> {
        let limit_value = self.expression()?;
        let limit = scalar_usize(&limit_value, "CONFIG limit")?;
        if limit == 0 {
            return Err(Error::Argument("CONFIG limit must be >= 1".into()));
        }
        self.expect(&Token::Comma)?;

        let saved = self.limit_override;
        self.limit_override = Some(limit);
        let result = self.expression();
        self.limit_override = saved;
        let value = result?;

        if self.peek() == Some(&Token::Comma) {
            return Err(Error::Arity("CONFIG takes exactly 2 arguments".into()));
        }
        self.expect(&Token::RParen)?;
        Ok(value)
    }

    /// Argument list. Range literals expand row-major into individual cell
    /// values; everything else is a full expression.
    fn parse_args(&mut self) -> Result<Vec<Dist>> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            return Ok(args);
        }
        loop {
            self.parse_arg(&mut args)?;
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(args)
    }

    fn parse_arg(&mut self, args: &mut Vec<Dist>) -> Result<()> {
        if let (Some(Token::Ident(from)), Some(Token::Colon), Some(Token::Ident(to))) =
            (self.peek(), self.peek_at(1), self.peek_at(2))
        {
            let ids = expand_range(from, to)?;
            self.pos += 3;
            for id in ids {
                args.push(self.ctx.resolve(&id));
            }
            return Ok(());
        }
        args.push(self.expression()?);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scalar coercion and scalar arithmetic
// ---------------------------------------------------------------------------

/// A value counts as a scalar when it is a single unit-mass atom (number
/// literals, `CONST`, and scalar observations all produce this shape).
pub fn as_scalar(d: &Dist) -> Option<f64> {
    match d.components() {
        [ds_core::component::Component::Atom { x, p }] if (p - 1.0).abs() < 1e-9 => Some(*x),
        _ => None,
    }
}

pub(crate) fn scalar(d: &Dist, what: &str) -> Result<f64> {
    as_scalar(d).ok_or_else(|| Error::Argument(format!("{what} must be a scalar")))
}

pub(crate) fn scalar_usize(d: &Dist, what: &str) -> Result<usize> {
    let x = scalar(d, what)?;
    if x < 0.0 || x.fract().abs() > 1e-9 {
        return Err(Error::Argument(format!("{what} must be a non-negative integer, got {x}")));
    }
    Ok(x as usize)
}

// ---------------------------------------------------------------------------
// Cell references and ranges
// ---------------------------------------------------------------------------

/// Split a cell identifier into column letters and row digits.
fn parse_cell_id(id: &str) -> Option<(u32, u32)> {
    let letters: String = id.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &id[letters.len()..];
    if letters.is_empty() || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut col: u32 = 0;
    for c in letters.chars() {
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    let row: u32 = digits.parse().ok()?;
    Some((col - 1, row))
}

/// Column index back to letters (0 → A, 25 → Z, 26 → AA).
fn col_name(mut col: u32) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (col % 26) as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// Expand `from:to` row-major, independent of direction: `B3:A1` expands
/// identically to `A1:B3`.
pub(crate) fn expand_range(from: &str, to: &str) -> Result<Vec<String>> {
    let (c1, r1) = parse_cell_id(from)
        .ok_or_else(|| Error::Parse(format!("invalid range endpoint '{from}'")))?;
    let (c2, r2) = parse_cell_id(to)
        .ok_or_else(|| Error::Parse(format!("invalid range endpoint '{to}'")))?;
    let (clo, chi) = (c1.min(c2), c1.max(c2));
    let (rlo, rhi) = (r1.min(r2), r1.max(r2));
    let mut ids = Vec::with_capacity(((chi - clo + 1) * (rhi - rlo + 1)) as usize);
    for row in rlo..=rhi {
        for col in clo..=chi {
            ids.push(format!("{}{}", col_name(col), row));
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cell_id_parsing() {
        assert_eq!(parse_cell_id("A1"), Some((0, 1)));
        assert_eq!(parse_cell_id("Z9"), Some((25, 9)));
        assert_eq!(parse_cell_id("AA10"), Some((26, 10)));
        assert_eq!(parse_cell_id("A"), None);
        assert_eq!(parse_cell_id("1A"), None);
        assert_eq!(parse_cell_id(""), None);
    }

    #[test]
    fn col_names_round_trip() {
        for col in 0..200 {
            let name = col_name(col);
            assert_eq!(parse_cell_id(&format!("{name}1")), Some((col, 1)));
        }
    }

    #[test]
    fn range_expansion_row_major() {
        let ids = expand_range("A1", "B2").unwrap();
        assert_eq!(ids, vec!["A1", "B1", "A2", "B2"]);
    }

    #[test]
    fn range_expansion_direction_independent() {
        assert_eq!(expand_range("B3", "A1").unwrap(), expand_range("A1", "B3").unwrap());
    }

    #[test]
    fn invalid_range_rejected() {
        assert!(expand_range("A", "B2").is_err());
        assert!(expand_range("A1", "FOO").is_err());
    }

    #[test]
    fn scalar_detection() {
        assert_eq!(as_scalar(&Dist::constant(4.5).unwrap()), Some(4.5));
        assert_eq!(as_scalar(&Dist::uniform(0.0, 1.0).unwrap()), None);
        assert_eq!(as_scalar(&Dist::empty()), None);
    }

    #[test]
    fn basic_arithmetic() {
        let d = evaluate("1 + 2 * 3", &EmptyContext).unwrap();
        assert_relative_eq!(as_scalar(&d).unwrap(), 7.0);
    }

    #[test]
    fn parentheses_override_precedence() {
        let d = evaluate("(1 + 2) * 3", &EmptyContext).unwrap();
        assert_relative_eq!(as_scalar(&d).unwrap(), 9.0);
    }

    #[test]
    fn unary_minus() {
        let d = evaluate("-4 + 1", &EmptyContext).unwrap();
        assert_relative_eq!(as_scalar(&d).unwrap(), -3.0);
    }

    #[test]
    fn division_by_zero_fails() {
        assert!(matches!(evaluate("1 / 0", &EmptyContext), Err(Error::Argument(_))));
    }

    #[test]
    fn trailing_tokens_ignored() {
        // Outside argument position `A1:B3` parses as `A1` plus unread
        // trailing tokens.
        let d = evaluate("3 : 4", &EmptyContext).unwrap();
        assert_relative_eq!(as_scalar(&d).unwrap(), 3.0);
    }

    #[test]
    fn empty_formula_is_empty_dist() {
        assert!(evaluate("", &EmptyContext).unwrap().is_empty());
    }

    #[test]
    fn unknown_cell_is_empty() {
        assert!(evaluate("Q99", &EmptyContext).unwrap().is_empty());
    }

    #[test]
    fn dist_times_dist_rejected() {
        let err = evaluate("UNIFORM(0, 1) * UNIFORM(0, 1)", &EmptyContext);
        assert!(matches!(err, Err(Error::Argument(_))));
    }
}
