//! Textual rules: `premise & premise & ... => conclusion`.
//!
//! A term is `rel(arg, ...)`, or `rel'(fact, arg, ...)` where `fact` binds the
//! witness node of the matched fact itself. Arguments are variables
//! (identifiers), integer constants or quoted string constants. Variables
//! shared between premises are join constraints.
//!
//! Rules are compiled into trie paths by [`compile`] and fired by
//! [`generator::RuleGenerator`].

pub mod compile;
pub mod generator;

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{RuleError, RuleResult};
use crate::hypergraph::Value;
use crate::schema::ArgPos;

pub use compile::{CompiledPath, CompiledRule, compile};
pub use generator::{ConstantScorer, FnScorer, RuleGenerator, Scorer};

static RE_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_\-]*)(')?\s*\((.*)\)$").unwrap()
});

static RE_VAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

// ---------------------------------------------------------------------------
// Terms
// ---------------------------------------------------------------------------

/// A term argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arg {
    Var(String),
    Const(Value),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Var(v) => write!(f, "{v}"),
            Arg::Const(Value::Str(s)) => write!(f, "\"{s}\""),
            Arg::Const(v) => write!(f, "{v}"),
        }
    }
}

/// One predicate occurrence, e.g. `ner3(i,t,b)` or `ner3'(f,i,t,b)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub relation: String,
    /// Variable bound to the fact's witness node, for primed terms.
    pub fact_var: Option<String>,
    pub args: Vec<Arg>,
}

impl Term {
    pub(crate) fn parse(text: &str, rule: &str) -> RuleResult<Self> {
        let parse_err = |message: String| RuleError::Parse {
            rule: rule.to_string(),
            message,
        };
        let caps = RE_TERM
            .captures(text.trim())
            .ok_or_else(|| parse_err(format!("malformed term '{}'", text.trim())))?;
        let relation = caps[1].to_string();
        let primed = caps.get(2).is_some();
        let mut args = Vec::new();
        for token in split_args(&caps[3]) {
            args.push(parse_arg(&token).ok_or_else(|| parse_err(format!("bad argument '{token}'")))?);
        }

        let fact_var = if primed {
            match args.first() {
                Some(Arg::Var(v)) => Some(v.clone()),
                _ => {
                    return Err(parse_err(format!(
                        "primed term {relation}' must start with a fact variable"
                    )));
                }
            }
        } else {
            None
        };
        if primed {
            args.remove(0);
        }
        Ok(Self {
            relation,
            fact_var,
            args,
        })
    }

    /// Argument at `pos`, with the fact variable at [`ArgPos::Head`].
    pub fn arg_at(&self, pos: ArgPos) -> Option<Arg> {
        match pos {
            ArgPos::Head => self.fact_var.clone().map(Arg::Var),
            ArgPos::Tail(i) => self.args.get(i).cloned(),
        }
    }

    /// Every bound position: the head first (for primed terms), then the tail.
    pub fn positions(&self) -> Vec<(ArgPos, Arg)> {
        let head = self
            .fact_var
            .iter()
            .map(|v| (ArgPos::Head, Arg::Var(v.clone())));
        let tail = self
            .args
            .iter()
            .enumerate()
            .map(|(i, a)| (ArgPos::Tail(i), a.clone()));
        head.chain(tail).collect()
    }

    /// Variables in position order, without duplicates.
    pub fn variables(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (_, arg) in self.positions() {
            if let Arg::Var(v) = arg {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }

    pub fn is_primed(&self) -> bool {
        self.fact_var.is_some()
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relation)?;
        let mut parts: Vec<String> = Vec::new();
        if let Some(v) = &self.fact_var {
            write!(f, "'")?;
            parts.push(v.clone());
        }
        parts.extend(self.args.iter().map(Arg::to_string));
        write!(f, "({})", parts.join(","))
    }
}

fn parse_arg(token: &str) -> Option<Arg> {
    let token = token.trim();
    if token.starts_with('"') {
        return (token.len() >= 2 && token.ends_with('"')).then(|| Arg::Const(Value::parse_token(token)));
    }
    if let Ok(i) = token.parse::<i64>() {
        return Some(Arg::Const(Value::Int(i)));
    }
    RE_VAR.is_match(token).then(|| Arg::Var(token.to_string()))
}

/// Split on commas outside double quotes.
fn split_args(inner: &str) -> Vec<String> {
    if inner.trim().is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    for c in inner.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                cur.push(c);
            }
            ',' if !quoted => out.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    out.push(cur);
    out.into_iter().map(|s| s.trim().to_string()).collect()
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A parsed, unresolved rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub lhs: Vec<Term>,
    pub rhs: Term,
    /// Trailing `#` comment, if any.
    pub comment: Option<String>,
}

impl Rule {
    /// Parse `t1(..) & t2(..) => t(..)`.
    pub fn parse(text: &str) -> RuleResult<Self> {
        let (body, comment) = strip_comment(text);
        let parse_err = |message: &str| RuleError::Parse {
            rule: body.to_string(),
            message: message.to_string(),
        };
        let (lhs, rhs) = body
            .split_once("=>")
            .ok_or_else(|| parse_err("missing '=>'"))?;
        if rhs.contains("=>") {
            return Err(parse_err("more than one '=>'"));
        }
        let lhs = lhs
            .split('&')
            .map(|t| Term::parse(t, body))
            .collect::<RuleResult<Vec<_>>>()?;
        let rhs = Term::parse(rhs, body)?;
        if rhs.is_primed() {
            return Err(parse_err("the conclusion cannot be primed"));
        }
        Ok(Self { lhs, rhs, comment })
    }

    /// Parse one rule per non-empty line; `#` starts a comment.
    pub fn parse_all(text: &str) -> RuleResult<Vec<Self>> {
        text.lines()
            .filter(|line| !strip_comment(line).0.is_empty())
            .map(Rule::parse)
            .collect()
    }

    /// Read and parse a rules file.
    pub fn load(path: &Path) -> RuleResult<Vec<Self>> {
        let text = std::fs::read_to_string(path).map_err(|e| RuleError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse_all(&text)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lhs: Vec<String> = self.lhs.iter().map(Term::to_string).collect();
        write!(f, "{} => {}", lhs.join(" & "), self.rhs)
    }
}

/// Split off a trailing comment at the first `#` outside double quotes.
fn strip_comment(line: &str) -> (&str, Option<String>) {
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '#' if !quoted => {
                let comment = line[i + 1..].trim();
                return (line[..i].trim(), (!comment.is_empty()).then(|| comment.to_string()));
            }
            _ => {}
        }
    }
    (line.trim(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chain_rule() {
        let rule = Rule::parse("ner3(i,ti,bi) & succ(i,j) & biolu(bi,ti,bj,tj) => ner3(j,tj,bj)").unwrap();
        assert_eq!(rule.lhs.len(), 3);
        assert_eq!(rule.lhs[1].relation, "succ");
        assert_eq!(rule.lhs[1].args, vec![Arg::Var("i".into()), Arg::Var("j".into())]);
        assert_eq!(rule.rhs.relation, "ner3");
        assert_eq!(rule.to_string(), "ner3(i,ti,bi) & succ(i,j) & biolu(bi,ti,bj,tj) => ner3(j,tj,bj)");
    }

    #[test]
    fn parse_primed_term_and_constants() {
        let rule = Rule::parse("event1'(e, t) & tag(t, \"PER\", 3) => mention(e, t)  # keep").unwrap();
        let primed = &rule.lhs[0];
        assert_eq!(primed.fact_var.as_deref(), Some("e"));
        assert_eq!(primed.args, vec![Arg::Var("t".into())]);
        assert_eq!(primed.arg_at(ArgPos::Head), Some(Arg::Var("e".into())));
        assert_eq!(
            rule.lhs[1].args,
            vec![
                Arg::Var("t".into()),
                Arg::Const(Value::str("PER")),
                Arg::Const(Value::Int(3))
            ]
        );
        assert_eq!(rule.comment.as_deref(), Some("keep"));
    }

    #[test]
    fn quoted_constants_may_contain_commas() {
        let rule = Rule::parse("a(x, \"p,q\") => b(x)").unwrap();
        assert_eq!(rule.lhs[0].args[1], Arg::Const(Value::str("p,q")));
    }

    #[test]
    fn hash_inside_quotes_is_not_a_comment() {
        let rule = Rule::parse("a(x, \"c#1\") => b(x) # real comment").unwrap();
        assert_eq!(rule.lhs[0].args[1], Arg::Const(Value::str("c#1")));
        assert_eq!(rule.comment.as_deref(), Some("real comment"));
    }

    #[test]
    fn unreadable_rule_file_is_a_rule_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.rules");
        assert!(matches!(Rule::load(&missing), Err(RuleError::Io { .. })));
    }

    #[test]
    fn malformed_rules_are_rejected() {
        for bad in [
            "a(x) b(x)",
            "a(x) => b(x) => c(x)",
            "a(x => b(x)",
            "a(x) => b'(f, x)",
            "a'(\"c\", x) => b(x)",
            "a(x-y) => b(x)",
        ] {
            assert!(
                matches!(Rule::parse(bad), Err(RuleError::Parse { .. })),
                "expected parse error for {bad}"
            );
        }
    }

    #[test]
    fn parse_all_skips_comments_and_blanks() {
        let rules = Rule::parse_all("# header\n\na(x) => b(x)\n  # note\nb(x) => c(x) # tail\n").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].comment.as_deref(), Some("tail"));
    }

    #[test]
    fn variables_are_deduplicated_in_order() {
        let rule = Rule::parse("r'(f, x, y, x) => s(f, y)").unwrap();
        assert_eq!(rule.lhs[0].variables(), vec!["f", "x", "y"]);
    }
}
