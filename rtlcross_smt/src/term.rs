//! Owned S-expression terms.
//!
//! Terms are built by the crossbars and the equivalence engine, rendered into
//! the solver session, and parsed back out of `get-value` responses. Nothing
//! here enforces sorting; the solver does that for us.

use std::fmt;

use rand::Rng;
use thiserror::Error;

/// An SMT-LIBv2 S-expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// A bare symbol, keyword, or literal, stored exactly as rendered.
    Atom(String),
    /// A parenthesized list of terms.
    List(Vec<Term>),
}

/// Characters allowed in a simple (unquoted) SMT-LIB symbol.
fn is_simple_symbol(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c)
        })
}

impl Term {
    /// A bare atom, rendered verbatim.
    pub fn atom(s: impl Into<String>) -> Self {
        Term::Atom(s.into())
    }

    /// A symbol, quoted with `|...|` when it is not a simple symbol.
    pub fn symbol(s: impl Into<String>) -> Self {
        let s = s.into();
        if is_simple_symbol(&s) {
            Term::Atom(s)
        } else {
            Term::Atom(format!("|{s}|"))
        }
    }

    /// A parenthesized list.
    #[must_use]
    pub fn list(items: Vec<Term>) -> Self {
        Term::List(items)
    }

    /// Application of the function symbol `head` to `args`.
    pub fn app(head: impl Into<String>, args: Vec<Term>) -> Self {
        let mut items = vec![Term::symbol(head)];
        items.extend(args);
        Term::List(items)
    }

    /// A numeral literal.
    #[must_use]
    pub fn numeral(n: u64) -> Self {
        Term::Atom(n.to_string())
    }

    /// The bit-vector literal `(_ bv<value> <width>)`.
    #[must_use]
    pub fn bv(value: u64, width: u32) -> Self {
        Term::List(vec![
            Term::atom("_"),
            Term::atom(format!("bv{value}")),
            Term::numeral(u64::from(width)),
        ])
    }

    /// A `#b...` literal of `width` uniformly random bits.
    pub fn random_bv(rng: &mut impl Rng, width: u32) -> Self {
        let bits: String = (0..width).map(|_| if rng.r#gen::<bool>() { '1' } else { '0' }).collect();
        Term::Atom(format!("#b{bits}"))
    }

    /// The boolean constants `true` / `false`.
    #[must_use]
    pub fn bool(value: bool) -> Self {
        Term::atom(if value { "true" } else { "false" })
    }

    /// `(not t)`
    #[must_use]
    pub fn not(t: Term) -> Self {
        Term::app("not", vec![t])
    }

    /// N-ary conjunction, collapsing the trivial cases.
    #[must_use]
    pub fn and(mut terms: Vec<Term>) -> Self {
        match terms.len() {
            0 => Term::bool(true),
            1 => terms.remove(0),
            _ => Term::app("and", terms),
        }
    }

    /// N-ary disjunction, collapsing the trivial cases.
    #[must_use]
    pub fn or(mut terms: Vec<Term>) -> Self {
        match terms.len() {
            0 => Term::bool(false),
            1 => terms.remove(0),
            _ => Term::app("or", terms),
        }
    }

    /// `(= a b)`
    #[must_use]
    pub fn eq(a: Term, b: Term) -> Self {
        Term::app("=", vec![a, b])
    }

    /// `(ite c t e)`
    #[must_use]
    pub fn ite(c: Term, t: Term, e: Term) -> Self {
        Term::app("ite", vec![c, t, e])
    }

    /// `((_ zero_extend k) t)`, or `t` unchanged when `k == 0`.
    #[must_use]
    pub fn zero_extend(k: u32, t: Term) -> Self {
        if k == 0 {
            return t;
        }
        Term::List(vec![
            Term::List(vec![
                Term::atom("_"),
                Term::atom("zero_extend"),
                Term::numeral(u64::from(k)),
            ]),
            t,
        ])
    }

    /// N-ary `concat`, most significant first.
    #[must_use]
    pub fn concat(mut terms: Vec<Term>) -> Self {
        match terms.len() {
            1 => terms.remove(0),
            _ => Term::app("concat", terms),
        }
    }

    /// `((_ extract hi lo) t)`
    #[must_use]
    pub fn extract(hi: u32, lo: u32, t: Term) -> Self {
        Term::List(vec![
            Term::List(vec![
                Term::atom("_"),
                Term::atom("extract"),
                Term::numeral(u64::from(hi)),
                Term::numeral(u64::from(lo)),
            ]),
            t,
        ])
    }

    /// Whether this term is a literal constant (`#b...`, `#x...`, a
    /// `(_ bvN w)` form, a numeral, or a boolean constant).
    #[must_use]
    pub fn is_literal(&self) -> bool {
        match self {
            Term::Atom(a) => {
                a.starts_with("#b")
                    || a.starts_with("#x")
                    || a == "true"
                    || a == "false"
                    || a.chars().all(|c| c.is_ascii_digit())
            }
            Term::List(items) => {
                items.len() == 3
                    && items[0] == Term::atom("_")
                    && matches!(&items[1], Term::Atom(a) if a.starts_with("bv"))
            }
        }
    }

    /// Interprets a solver value (literal forms only) as an unsigned integer.
    #[must_use]
    pub fn literal_value(&self) -> Option<u128> {
        match self {
            Term::Atom(a) => {
                if let Some(bits) = a.strip_prefix("#b") {
                    u128::from_str_radix(bits, 2).ok()
                } else if let Some(hex) = a.strip_prefix("#x") {
                    u128::from_str_radix(hex, 16).ok()
                } else if a == "true" {
                    Some(1)
                } else if a == "false" {
                    Some(0)
                } else {
                    a.parse().ok()
                }
            }
            Term::List(items) => match (items.first(), items.get(1)) {
                (Some(Term::Atom(u)), Some(Term::Atom(v))) if u == "_" => {
                    v.strip_prefix("bv").and_then(|n| n.parse().ok())
                }
                _ => None,
            },
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(a) => f.write_str(a),
            Term::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A term together with its bit width.
///
/// Backend accessors all normalize to bit-vectors, so carrying the width is
/// enough to align two circuits' signals by zero extension.
#[derive(Debug, Clone)]
pub struct TypedTerm {
    /// The bit-vector valued term.
    pub term: Term,
    /// Its width in bits.
    pub width: u32,
}

impl TypedTerm {
    /// Wraps a term of known width.
    #[must_use]
    pub const fn new(term: Term, width: u32) -> Self {
        Self { term, width }
    }

    /// Zero-extends to `width` (no-op when already that wide).
    #[must_use]
    pub fn zero_extend_to(self, width: u32) -> Self {
        let grown = width.saturating_sub(self.width);
        TypedTerm::new(Term::zero_extend(grown, self.term), self.width.max(width))
    }
}

/// Failures while reading solver output back into terms.
#[derive(Debug, Error)]
#[error("malformed s-expression: {0}")]
pub struct TermParseError(pub String);

/// Parses a sequence of S-expressions.
pub fn parse_terms(input: &str) -> Result<Vec<Term>, TermParseError> {
    let mut tokens = tokenize(input)?;
    tokens.reverse();
    let mut terms = Vec::new();
    while !tokens.is_empty() {
        terms.push(parse_one(&mut tokens)?);
    }
    Ok(terms)
}

#[derive(Debug)]
enum Token {
    Open,
    Close,
    Atom(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, TermParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '|' => {
                let mut sym = String::from('|');
                loop {
                    match chars.next() {
                        Some('|') => {
                            sym.push('|');
                            break;
                        }
                        Some(c) => sym.push(c),
                        None => return Err(TermParseError("unterminated |symbol|".into())),
                    }
                }
                tokens.push(Token::Atom(sym));
            }
            '"' => {
                let mut lit = String::from('"');
                loop {
                    match chars.next() {
                        Some('"') => {
                            lit.push('"');
                            if chars.peek() == Some(&'"') {
                                chars.next();
                                lit.push('"');
                                continue;
                            }
                            break;
                        }
                        Some(c) => lit.push(c),
                        None => return Err(TermParseError("unterminated string".into())),
                    }
                }
                tokens.push(Token::Atom(lit));
            }
            c if c.is_whitespace() => {}
            c => {
                let mut atom = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || next == '(' || next == ')' || next == ';' {
                        break;
                    }
                    atom.push(next);
                    chars.next();
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }
    Ok(tokens)
}

fn parse_one(tokens: &mut Vec<Token>) -> Result<Term, TermParseError> {
    match tokens.pop() {
        Some(Token::Atom(a)) => Ok(Term::Atom(a)),
        Some(Token::Open) => {
            let mut items = Vec::new();
            loop {
                match tokens.last() {
                    Some(Token::Close) => {
                        tokens.pop();
                        return Ok(Term::List(items));
                    }
                    Some(_) => items.push(parse_one(tokens)?),
                    None => return Err(TermParseError("unbalanced parentheses".into())),
                }
            }
        }
        Some(Token::Close) => Err(TermParseError("unexpected `)`".into())),
        None => Err(TermParseError("empty input".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_applications() {
        let t = Term::app("main_t", vec![Term::atom("s0"), Term::atom("s1")]);
        assert_eq!(t.to_string(), "(main_t s0 s1)");
    }

    #[test]
    fn quotes_non_simple_symbols() {
        assert_eq!(Term::symbol("main_t").to_string(), "main_t");
        assert_eq!(Term::symbol("main_n c").to_string(), "|main_n c|");
    }

    #[test]
    fn collapses_trivial_connectives() {
        assert_eq!(Term::and(vec![]).to_string(), "true");
        assert_eq!(Term::and(vec![Term::atom("a")]).to_string(), "a");
        assert_eq!(
            Term::or(vec![Term::atom("a"), Term::atom("b")]).to_string(),
            "(or a b)"
        );
    }

    #[test]
    fn parses_what_it_renders() {
        let t = Term::app(
            "=",
            vec![
                Term::bv(3, 4),
                Term::zero_extend(2, Term::atom("#b01")),
            ],
        );
        let parsed = parse_terms(&t.to_string()).unwrap();
        assert_eq!(parsed, vec![t]);
    }

    #[test]
    fn parses_quoted_symbols_and_comments() {
        let terms = parse_terms("; header\n((|main_n c| s0) #b0101)").unwrap();
        assert_eq!(
            terms,
            vec![Term::List(vec![
                Term::List(vec![Term::atom("|main_n c|"), Term::atom("s0")]),
                Term::atom("#b0101"),
            ])]
        );
    }

    #[test]
    fn literal_values() {
        assert_eq!(Term::atom("#b0101").literal_value(), Some(5));
        assert_eq!(Term::atom("#xff").literal_value(), Some(255));
        assert_eq!(Term::bv(9, 8).literal_value(), Some(9));
        assert_eq!(Term::atom("s0").literal_value(), None);
        assert!(Term::bv(9, 8).is_literal());
        assert!(!Term::atom("s0").is_literal());
    }

    #[test]
    fn zero_extension_aligns_widths() {
        let t = TypedTerm::new(Term::atom("x"), 4).zero_extend_to(8);
        assert_eq!(t.width, 8);
        assert_eq!(t.term.to_string(), "((_ zero_extend 4) x)");

        let same = TypedTerm::new(Term::atom("y"), 8).zero_extend_to(8);
        assert_eq!(same.term.to_string(), "y");
    }
}
