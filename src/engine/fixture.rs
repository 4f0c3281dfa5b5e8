//! Deterministic in-tree engine.
//!
//! Exact rational arithmetic over `i64` pairs, REPL-style bindings that carry
//! across a batch, and a builtin registry shaped like the surface a real CAS
//! ships (including the names the worker defangs). Cost knobs let tests drive
//! the timeout paths without real slow computation. This exists so the
//! `worker` binary runs end-to-end without linking an external engine.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::config::types::{EvalMode, Result};
use crate::engine::clock::Clock;
use crate::engine::{CalcOutcome, Diagnostic, Engine, EvalProfile, Formatted, Severity};

const TIMED_OUT_MARKER: &str = "timed out";
const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const MAX_POW_EXPONENT: u64 = 4096;
const MAX_PARSE_DEPTH: usize = 200;

/// Exact rational over `i64`. Denominator strictly positive, fraction
/// reduced. Arithmetic is checked; `None` means the value left the
/// representable range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rational {
    num: i64,
    den: i64,
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Rational {
    pub const ZERO: Rational = Rational { num: 0, den: 1 };

    pub fn int(n: i64) -> Self {
        Self { num: n, den: 1 }
    }

    /// `None` when the denominator is zero or normalization overflows.
    pub fn new(num: i64, den: i64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let (num, den) = if den < 0 {
            (num.checked_neg()?, den.checked_neg()?)
        } else {
            (num, den)
        };
        let g = gcd(num.unsigned_abs(), den.unsigned_abs());
        if g <= 1 {
            return Some(Self { num, den });
        }
        Some(Self {
            num: num / g as i64,
            den: den / g as i64,
        })
    }

    pub fn is_zero(self) -> bool {
        self.num == 0
    }

    pub fn is_integer(self) -> bool {
        self.den == 1
    }

    fn add(self, o: Self) -> Option<Self> {
        let a = self.num.checked_mul(o.den)?;
        let b = o.num.checked_mul(self.den)?;
        Self::new(a.checked_add(b)?, self.den.checked_mul(o.den)?)
    }

    fn sub(self, o: Self) -> Option<Self> {
        let a = self.num.checked_mul(o.den)?;
        let b = o.num.checked_mul(self.den)?;
        Self::new(a.checked_sub(b)?, self.den.checked_mul(o.den)?)
    }

    fn mul(self, o: Self) -> Option<Self> {
        Self::new(self.num.checked_mul(o.num)?, self.den.checked_mul(o.den)?)
    }

    fn div(self, o: Self) -> Option<Self> {
        if o.num == 0 {
            return None;
        }
        Self::new(self.num.checked_mul(o.den)?, self.den.checked_mul(o.num)?)
    }

    /// Integer exponent only; the caller validates range and the zero base
    /// with a negative exponent.
    fn pow(self, exp: i64) -> Option<Self> {
        if exp == 0 {
            return Some(Self::int(1));
        }
        let base = if exp < 0 {
            Self::int(1).div(self)?
        } else {
            self
        };
        let mut acc = Self::int(1);
        for _ in 0..exp.unsigned_abs() {
            acc = acc.mul(base)?;
        }
        Some(acc)
    }
}

/// Engine value carried between calculate and format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Number(Rational),
    /// Calendar date answered by the injected clock.
    Date(i32, u32, u32),
    /// An identifier nothing resolves, echoed symbolically.
    Symbol(String),
    Undefined,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(Rational),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut it = input.char_indices().peekable();

    while let Some(&(start, c)) = it.peek() {
        match c {
            c if c.is_whitespace() => {
                it.next();
            }
            '+' | '-' | '*' | '/' | '^' | '(' | ')' | ',' => {
                it.next();
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '^' => Token::Caret,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    _ => Token::Comma,
                });
            }
            '0'..='9' | '.' => {
                let mut end = start;
                let mut seen_dot = false;
                while let Some(&(pos, c)) = it.peek() {
                    match c {
                        '0'..='9' => {
                            end = pos + 1;
                            it.next();
                        }
                        '.' if !seen_dot => {
                            seen_dot = true;
                            end = pos + 1;
                            it.next();
                        }
                        _ => break,
                    }
                }
                tokens.push(Token::Number(parse_number(&input[start..end])?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(pos, c)) = it.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        end = pos + 1;
                        it.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(input[start..end].to_string()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

/// Decimal literals only; the output base never affects parsing.
fn parse_number(text: &str) -> std::result::Result<Rational, String> {
    let bad = || format!("cannot parse number '{text}'");
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(bad());
    }

    let mut num: i64 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        let d = (c as u8 - b'0') as i64;
        num = num
            .checked_mul(10)
            .and_then(|n| n.checked_add(d))
            .ok_or_else(bad)?;
    }
    let mut den: i64 = 1;
    for _ in frac_part.chars() {
        den = den.checked_mul(10).ok_or_else(bad)?;
    }
    Rational::new(num, den).ok_or_else(bad)
}

#[derive(Debug)]
enum Ast {
    Num(Rational),
    Ident(String),
    Call(String, Vec<Ast>),
    Neg(Box<Ast>),
    Bin(BinOp, Box<Ast>, Box<Ast>),
}

#[derive(Clone, Copy, Debug)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn parse(tokens: Vec<Token>) -> std::result::Result<Ast, String> {
        let mut p = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let ast = p.expr()?;
        if p.pos != p.tokens.len() {
            return Err("trailing input after expression".to_string());
        }
        Ok(ast)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, t: &Token) -> bool {
        if self.peek() == Some(t) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Input is untrusted; recursion depth must stay bounded.
    fn enter(&mut self) -> std::result::Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            Err("expression nested too deeply".to_string())
        } else {
            Ok(())
        }
    }

    fn expr(&mut self) -> std::result::Result<Ast, String> {
        self.enter()?;
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Ast::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth -= 1;
        Ok(lhs)
    }

    fn term(&mut self) -> std::result::Result<Ast, String> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Ast::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> std::result::Result<Ast, String> {
        self.enter()?;
        let ast = if self.eat(&Token::Minus) {
            Ast::Neg(Box::new(self.unary()?))
        } else {
            self.power()?
        };
        self.depth -= 1;
        Ok(ast)
    }

    fn power(&mut self) -> std::result::Result<Ast, String> {
        let base = self.atom()?;
        if self.eat(&Token::Caret) {
            // right-associative, and the exponent carries its own sign
            let exp = self.unary()?;
            return Ok(Ast::Bin(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> std::result::Result<Ast, String> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(Ast::Num(n)),
            Some(Token::Ident(name)) => {
                if !self.eat(&Token::LParen) {
                    return Ok(Ast::Ident(name));
                }
                let mut args = Vec::new();
                if self.eat(&Token::RParen) {
                    return Ok(Ast::Call(name, args));
                }
                loop {
                    args.push(self.expr()?);
                    if self.eat(&Token::Comma) {
                        continue;
                    }
                    if self.eat(&Token::RParen) {
                        return Ok(Ast::Call(name, args));
                    }
                    return Err("expected ',' or ')' in argument list".to_string());
                }
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                if !self.eat(&Token::RParen) {
                    return Err("unbalanced parenthesis".to_string());
                }
                Ok(inner)
            }
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

/// `name = expr` binds; anything else evaluates as written. Only a bare
/// identifier left of the first `=` makes it an assignment.
fn split_assignment(expr: &str) -> (Option<&str>, &str) {
    if let Some((lhs, rhs)) = expr.split_once('=') {
        let name = lhs.trim();
        if is_identifier(name) {
            return (Some(name), rhs);
        }
    }
    (None, expr)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Base-10 rendering used when echoing unresolved calls.
fn plain(value: &Value) -> String {
    match value {
        Value::Number(r) if r.is_integer() => r.num.to_string(),
        Value::Number(r) => format!("{}/{}", r.num, r.den),
        Value::Date(y, m, d) => format!("{y:04}-{m:02}-{d:02}"),
        Value::Symbol(s) => s.clone(),
        Value::Undefined => "undefined".to_string(),
    }
}

fn uint_to_base(mut n: u128, base: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = String::new();
    while n > 0 {
        out.push(DIGITS[(n % base) as usize] as char);
        n /= base;
    }
    out.chars().rev().collect()
}

fn int_to_base(n: i64, base: u128) -> String {
    let body = uint_to_base(n.unsigned_abs() as u128, base);
    if n < 0 {
        format!("-{body}")
    } else {
        body
    }
}

/// The in-tree [`Engine`] implementation.
pub struct FixtureEngine {
    clock: Box<dyn Clock>,
    profile: EvalProfile,
    /// User bindings accumulated across a batch.
    bindings: HashMap<String, Value>,
    /// Builtin functions still active. Populated by `load_definitions`.
    functions: HashSet<String>,
    /// Builtin variables still active. Populated by `load_definitions`.
    variables: HashMap<String, Value>,
    queue: Vec<Diagnostic>,
    fetch_possible: bool,
    fetch_succeeds: bool,
    calc_cost: Duration,
    format_cost: Duration,
}

impl FixtureEngine {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            profile: EvalProfile::new(EvalMode::from_bits(0), 10),
            bindings: HashMap::new(),
            functions: HashSet::new(),
            variables: HashMap::new(),
            queue: Vec::new(),
            fetch_possible: false,
            fetch_succeeds: true,
            calc_cost: Duration::ZERO,
            format_cost: Duration::ZERO,
        }
    }

    /// Pretend evaluation takes this long, for driving budget expiry.
    pub fn set_calc_cost(&mut self, cost: Duration) {
        self.calc_cost = cost;
    }

    /// Pretend formatting takes this long.
    pub fn set_format_cost(&mut self, cost: Duration) {
        self.format_cost = cost;
    }

    /// Whether this build claims a working rate-fetch path. Off by default;
    /// the fixture has no network.
    pub fn set_fetch_possible(&mut self, possible: bool) {
        self.fetch_possible = possible;
    }

    /// What `fetch_rates` reports when fetching is possible.
    pub fn set_fetch_result(&mut self, succeeds: bool) {
        self.fetch_succeeds = succeeds;
    }

    fn report(&mut self, severity: Severity, text: impl Into<String>) {
        self.queue.push(Diagnostic {
            severity,
            text: text.into(),
        });
    }

    fn lookup(&mut self, name: &str) -> Value {
        if let Some(v) = self.bindings.get(name) {
            return v.clone();
        }
        // Live time queries answer from the injected clock, never the kernel.
        if name == "today" {
            let (y, m, d) = self.clock.today();
            return Value::Date(y, m, d);
        }
        if name == "timestamp" {
            let (secs, _) = self.clock.now();
            return Value::Number(Rational::int(secs));
        }
        if let Some(v) = self.variables.get(name) {
            return v.clone();
        }
        self.report(Severity::Error, format!("unknown identifier: {name}"));
        Value::Symbol(name.to_string())
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Value {
        if !self.functions.contains(name) {
            self.report(Severity::Error, format!("unknown function: {name}"));
            let rendered: Vec<String> = args.iter().map(plain).collect();
            return Value::Symbol(format!("{name}({})", rendered.join(", ")));
        }
        // Stand-ins for builtins a real engine ships. Nothing dangerous
        // happens here; what matters is that defanging makes them
        // unresolvable.
        match name {
            "command" | "plot" => Value::Number(Rational::ZERO),
            _ => Value::Undefined,
        }
    }

    fn eval(&mut self, ast: &Ast) -> Value {
        match ast {
            Ast::Num(n) => Value::Number(*n),
            Ast::Ident(name) => self.lookup(name),
            Ast::Call(name, args) => {
                let args: Vec<Value> = args.iter().map(|a| self.eval(a)).collect();
                self.call(name, args)
            }
            Ast::Neg(inner) => match self.eval(inner) {
                Value::Number(n) => match Rational::ZERO.sub(n) {
                    Some(neg) => Value::Number(neg),
                    None => {
                        self.report(Severity::Error, "numeric overflow");
                        Value::Undefined
                    }
                },
                _ => Value::Undefined,
            },
            Ast::Bin(op, lhs, rhs) => {
                let l = self.eval(lhs);
                let r = self.eval(rhs);
                self.apply(*op, l, r)
            }
        }
    }

    fn apply(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        let (l, r) = match (lhs, rhs) {
            (Value::Number(l), Value::Number(r)) => (l, r),
            // a symbolic or undefined operand already produced its message
            _ => return Value::Undefined,
        };
        let result = match op {
            BinOp::Add => l.add(r),
            BinOp::Sub => l.sub(r),
            BinOp::Mul => l.mul(r),
            BinOp::Div => {
                if r.is_zero() {
                    self.report(Severity::Error, "division by zero");
                    return Value::Undefined;
                }
                l.div(r)
            }
            BinOp::Pow => {
                if !r.is_integer() {
                    self.report(Severity::Error, "non-integer exponent");
                    return Value::Undefined;
                }
                if r.num.unsigned_abs() > MAX_POW_EXPONENT {
                    self.report(Severity::Error, "exponent too large");
                    return Value::Undefined;
                }
                if l.is_zero() && r.num < 0 {
                    self.report(Severity::Error, "division by zero");
                    return Value::Undefined;
                }
                l.pow(r.num)
            }
        };
        match result {
            Some(n) => Value::Number(n),
            None => {
                self.report(Severity::Error, "numeric overflow");
                Value::Undefined
            }
        }
    }

    fn render(&self, value: &Value) -> Formatted {
        match value {
            Value::Number(r) => self.render_number(*r),
            Value::Date(y, m, d) => Formatted {
                text: format!("{y:04}-{m:02}-{d:02}"),
                approximate: false,
            },
            // Plain numbers are never styled; symbols are, when color is on.
            Value::Symbol(s) => Formatted {
                text: if self.profile.color {
                    format!("\x1b[1m{s}\x1b[0m")
                } else {
                    s.clone()
                },
                approximate: false,
            },
            Value::Undefined => Formatted {
                text: "undefined".to_string(),
                approximate: false,
            },
        }
    }

    fn render_number(&self, r: Rational) -> Formatted {
        // configure() clamped the base into 2..=36
        let base = self.profile.base as u128;

        if self.profile.exact {
            let text = if r.is_integer() {
                int_to_base(r.num, base)
            } else {
                format!("{}/{}", int_to_base(r.num, base), int_to_base(r.den, base))
            };
            return Formatted {
                text,
                approximate: false,
            };
        }

        if r.is_integer() {
            return Formatted {
                text: int_to_base(r.num, base),
                approximate: false,
            };
        }

        // Long division to at most `precision` fractional digits.
        let negative = r.num < 0;
        let abs = r.num.unsigned_abs() as u128;
        let den = r.den as u128;
        let int_part = abs / den;
        let mut rem = abs % den;
        let mut digits = Vec::new();
        for _ in 0..self.profile.precision {
            if rem == 0 {
                break;
            }
            rem *= base;
            digits.push(DIGITS[(rem / den) as usize] as char);
            rem %= den;
        }
        while digits.last() == Some(&'0') {
            digits.pop();
        }
        let truncated = rem != 0;

        let mut text = String::new();
        if negative {
            text.push('-');
        }
        text.push_str(&uint_to_base(int_part, base));
        if !digits.is_empty() {
            text.push('.');
            text.extend(digits);
        }
        if truncated && self.profile.indicate_infinite_series {
            text.push('…');
        }
        Formatted {
            text,
            approximate: truncated,
        }
    }
}

impl Engine for FixtureEngine {
    type Value = Value;

    /// Cached exchange rates load silently; staleness is never reported.
    fn load_definitions(&mut self) -> Result<()> {
        self.functions.insert("command".to_string());
        self.functions.insert("plot".to_string());
        // uptime is seconds since boot, frozen like everything else here
        self.variables
            .insert("uptime".to_string(), Value::Number(Rational::int(424_242)));
        self.variables
            .insert("export".to_string(), Value::Number(Rational::ZERO));
        self.variables
            .insert("load".to_string(), Value::Number(Rational::ZERO));
        Ok(())
    }

    fn defang(&mut self, name: &str) {
        self.functions.remove(name);
        self.variables.remove(name);
    }

    fn configure(&mut self, profile: &EvalProfile) {
        let mut profile = *profile;
        if !(2..=36).contains(&profile.base) {
            self.report(
                Severity::Warning,
                format!("output base {} out of range, using 10", profile.base),
            );
            profile.base = 10;
        }
        self.profile = profile;
    }

    fn calculate(&mut self, expr: &str, budget: Duration) -> CalcOutcome<Value> {
        if self.calc_cost > budget {
            return CalcOutcome::TimedOut;
        }

        let (target, body) = split_assignment(expr);
        let value = match tokenize(body).and_then(Parser::parse) {
            Ok(ast) => self.eval(&ast),
            Err(msg) => {
                self.report(Severity::Error, msg);
                Value::Undefined
            }
        };
        if let Some(name) = target {
            self.bindings.insert(name.to_string(), value.clone());
        }
        CalcOutcome::Complete(value)
    }

    fn drain_messages(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.queue)
    }

    fn format(&mut self, value: &Value, budget: Duration) -> Formatted {
        if self.format_cost > budget {
            return Formatted {
                text: TIMED_OUT_MARKER.to_string(),
                approximate: true,
            };
        }
        self.render(value)
    }

    fn timed_out_marker(&self) -> &str {
        TIMED_OUT_MARKER
    }

    fn can_fetch(&self) -> bool {
        self.fetch_possible
    }

    fn fetch_rates(&mut self, _budget: Duration) -> bool {
        self.fetch_possible && self.fetch_succeeds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::{SnapshotClock, TimeSnapshot};

    fn snapshot() -> TimeSnapshot {
        TimeSnapshot {
            year: 2024,
            month: 5,
            day: 17,
            epoch_secs: 1_715_900_000,
            micros: 0,
        }
    }

    fn engine() -> FixtureEngine {
        let mut e = FixtureEngine::new(Box::new(SnapshotClock::new(snapshot())));
        e.load_definitions().unwrap();
        e
    }

    fn calc(e: &mut FixtureEngine, expr: &str) -> Value {
        match e.calculate(expr, Duration::from_secs(1)) {
            CalcOutcome::Complete(v) => v,
            CalcOutcome::TimedOut => panic!("unexpected timeout for {expr:?}"),
        }
    }

    fn text(e: &mut FixtureEngine, expr: &str) -> String {
        let v = calc(e, expr);
        e.format(&v, Duration::from_secs(1)).text
    }

    fn profile(bits: u32, base: i32) -> EvalProfile {
        EvalProfile::new(EvalMode::from_bits(bits), base)
    }

    #[test]
    fn precedence_and_parentheses() {
        let mut e = engine();
        assert_eq!(text(&mut e, "2+3*4"), "14");
        assert_eq!(text(&mut e, "(2+3)*4"), "20");
        assert_eq!(text(&mut e, "-2^2"), "-4");
    }

    #[test]
    fn exact_mode_keeps_fractions() {
        let mut e = engine();
        e.configure(&profile(EvalMode::EXACT, 10));
        assert_eq!(text(&mut e, "1/3+1/3"), "2/3");
        assert_eq!(text(&mut e, "2^-2"), "1/4");
    }

    #[test]
    fn terminating_decimal_is_exact() {
        let mut e = engine();
        let v = calc(&mut e, "1/4");
        let f = e.format(&v, Duration::from_secs(1));
        assert_eq!(f.text, "0.25");
        assert!(!f.approximate);
    }

    #[test]
    fn nonterminating_decimal_is_truncated_and_marked() {
        let mut e = engine();
        let v = calc(&mut e, "1/3");
        let f = e.format(&v, Duration::from_secs(1));
        assert!(f.approximate);
        assert!(f.text.starts_with("0.333"));
        assert!(f.text.ends_with('…'));
        // default precision is 20 fractional digits
        assert_eq!(f.text.trim_end_matches('…').len(), 2 + 20);
    }

    #[test]
    fn high_precision_widens_and_drops_the_ellipsis() {
        let mut e = engine();
        e.configure(&profile(EvalMode::PRECISION, 10));
        let v = calc(&mut e, "1/3");
        let f = e.format(&v, Duration::from_secs(1));
        assert!(f.approximate);
        assert!(!f.text.contains('…'));
        assert_eq!(f.text.len(), 2 + 1024);
    }

    #[test]
    fn bindings_carry_between_lines() {
        let mut e = engine();
        assert_eq!(text(&mut e, "x = 3"), "3");
        assert_eq!(text(&mut e, "x*2"), "6");
        assert!(e.drain_messages().is_empty());
    }

    #[test]
    fn assignment_needs_an_identifier_on_the_left() {
        let mut e = engine();
        let v = calc(&mut e, "2 = 3");
        assert_eq!(v, Value::Undefined);
        let msgs = e.drain_messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].severity, Severity::Error);
    }

    #[test]
    fn unknown_identifier_reports_and_echoes() {
        let mut e = engine();
        let v = calc(&mut e, "nosuch");
        assert_eq!(v, Value::Symbol("nosuch".to_string()));
        let msgs = e.drain_messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].severity, Severity::Error);
        assert!(msgs[0].text.contains("nosuch"));
    }

    #[test]
    fn builtin_function_works_until_defanged() {
        let mut e = engine();
        let v = calc(&mut e, "command(2)");
        assert_eq!(v, Value::Number(Rational::ZERO));
        assert!(e.drain_messages().is_empty());

        e.defang("command");
        let v = calc(&mut e, "command(2)");
        assert_eq!(v, Value::Symbol("command(2)".to_string()));
        let msgs = e.drain_messages();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].text.contains("unknown function"));
    }

    #[test]
    fn builtin_variable_works_until_defanged() {
        let mut e = engine();
        assert_eq!(text(&mut e, "uptime"), "424242");
        assert!(e.drain_messages().is_empty());

        e.defang("uptime");
        let v = calc(&mut e, "uptime");
        assert_eq!(v, Value::Symbol("uptime".to_string()));
        assert_eq!(e.drain_messages().len(), 1);
    }

    #[test]
    fn defang_tolerates_absent_names() {
        let mut e = engine();
        e.defang("no_such_builtin");
        e.defang("command");
        e.defang("command");
        assert!(e.drain_messages().is_empty());
    }

    #[test]
    fn division_by_zero_reports() {
        let mut e = engine();
        let v = calc(&mut e, "1/0");
        assert_eq!(v, Value::Undefined);
        let msgs = e.drain_messages();
        assert_eq!(msgs[0].text, "division by zero");
    }

    #[test]
    fn overflow_reports() {
        let mut e = engine();
        let v = calc(&mut e, "9223372036854775807+1");
        assert_eq!(v, Value::Undefined);
        assert_eq!(e.drain_messages()[0].text, "numeric overflow");
    }

    #[test]
    fn non_integer_exponent_is_rejected() {
        let mut e = engine();
        let v = calc(&mut e, "2^0.5");
        assert_eq!(v, Value::Undefined);
        assert_eq!(e.drain_messages()[0].text, "non-integer exponent");
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let mut e = engine();
        let expr = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        let v = calc(&mut e, &expr);
        assert_eq!(v, Value::Undefined);
        assert!(e.drain_messages()[0].text.contains("nested too deeply"));
    }

    #[test]
    fn calc_cost_above_budget_times_out() {
        let mut e = engine();
        e.set_calc_cost(Duration::from_millis(50));
        assert!(matches!(
            e.calculate("1+1", Duration::from_millis(10)),
            CalcOutcome::TimedOut
        ));
    }

    #[test]
    fn format_cost_above_budget_yields_the_marker() {
        let mut e = engine();
        e.set_format_cost(Duration::from_millis(50));
        let v = calc(&mut e, "1+1");
        let f = e.format(&v, Duration::from_millis(10));
        assert!(f.text.ends_with(e.timed_out_marker()));
        assert!(f.approximate);
    }

    #[test]
    fn base_conversion() {
        let mut e = engine();
        e.configure(&profile(0, 16));
        assert_eq!(text(&mut e, "255"), "FF");
        assert_eq!(text(&mut e, "-255"), "-FF");
        e.configure(&profile(0, 2));
        assert_eq!(text(&mut e, "5"), "101");
    }

    #[test]
    fn out_of_range_base_warns_and_falls_back_to_ten() {
        let mut e = engine();
        e.configure(&profile(0, 99));
        let msgs = e.drain_messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].severity, Severity::Warning);
        assert_eq!(text(&mut e, "255"), "255");
    }

    #[test]
    fn color_styles_symbols_but_not_numbers() {
        let mut e = engine();
        let v = calc(&mut e, "ghost");
        e.drain_messages();
        assert!(e.format(&v, Duration::from_secs(1)).text.contains("\x1b[1m"));
        assert_eq!(text(&mut e, "2+2"), "4");

        e.configure(&profile(EvalMode::NO_COLOR, 10));
        assert_eq!(e.format(&v, Duration::from_secs(1)).text, "ghost");
    }

    #[test]
    fn clock_queries_answer_from_the_snapshot() {
        let mut e = engine();
        assert_eq!(text(&mut e, "today"), "2024-05-17");
        assert_eq!(text(&mut e, "timestamp"), "1715900000");
        assert!(e.drain_messages().is_empty());
    }

    #[test]
    fn drain_clears_the_queue() {
        let mut e = engine();
        calc(&mut e, "nosuch");
        assert_eq!(e.drain_messages().len(), 1);
        assert!(e.drain_messages().is_empty());
    }

    #[test]
    fn fetch_defaults_to_impossible() {
        let mut e = engine();
        assert!(!e.can_fetch());
        assert!(!e.fetch_rates(Duration::from_secs(30)));

        e.set_fetch_possible(true);
        assert!(e.can_fetch());
        assert!(e.fetch_rates(Duration::from_secs(30)));
        e.set_fetch_result(false);
        assert!(!e.fetch_rates(Duration::from_secs(30)));
    }
}
