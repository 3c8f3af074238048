//! Line-oriented fact files.
//!
//! ```text
//! # comment
//! def succ <tokenIndex> <tokenIndex>
//! schema biolu B PER I PER
//! startdoc doc1
//! x succ 0 1
//! y ner3 1 PER I
//! ```
//!
//! Values that parse as integers become [`Value::Int`]; everything else,
//! and anything in double quotes, is a string.

use std::path::Path;

use serde::Serialize;

use crate::error::{FactsError, FactsResult};
use crate::hypergraph::Value;

/// One meaningful line of a fact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum FactLine {
    /// `def rel <type> ...`
    Def { relation: String, types: Vec<String> },
    /// `schema rel v ...`: a schema fact, committed without matching.
    Schema { relation: String, values: Vec<Value> },
    /// `x rel v ...`: an observed fact.
    Fact { relation: String, values: Vec<Value> },
    /// `y rel v ...`: a gold label.
    Label { relation: String, values: Vec<Value> },
    /// `startdoc id`
    StartDoc { id: String },
}

impl FactLine {
    /// Parse one line. Blank and comment-only lines give `Ok(None)`.
    pub fn parse(text: &str, line: usize) -> FactsResult<Option<Self>> {
        let body = text.split_once('#').map_or(text, |(b, _)| b).trim();
        if body.is_empty() {
            return Ok(None);
        }
        let toks = tokenize(body).ok_or_else(|| FactsError::Parse {
            line,
            message: "unterminated quote".to_string(),
        })?;
        let need = |n: usize, what: &str| {
            if toks.len() < n {
                Err(FactsError::Parse {
                    line,
                    message: format!("{} needs {what}", toks[0]),
                })
            } else {
                Ok(())
            }
        };
        let values = |toks: &[String]| toks.iter().map(|t| Value::parse_token(t)).collect::<Vec<_>>();

        let parsed = match toks[0].as_str() {
            "def" => {
                need(2, "a relation name")?;
                let types = toks[2..]
                    .iter()
                    .map(|t| {
                        let inner = t.strip_prefix('<').map(|t| t.strip_suffix('>'));
                        match inner {
                            None => Ok(t.clone()),
                            Some(Some(inner)) if !inner.is_empty() => Ok(inner.to_string()),
                            Some(_) => Err(FactsError::Parse {
                                line,
                                message: format!("malformed type {t}"),
                            }),
                        }
                    })
                    .collect::<FactsResult<Vec<_>>>()?;
                FactLine::Def {
                    relation: toks[1].clone(),
                    types,
                }
            }
            "schema" => {
                need(2, "a relation name")?;
                FactLine::Schema {
                    relation: toks[1].clone(),
                    values: values(&toks[2..]),
                }
            }
            "x" => {
                need(2, "a relation name")?;
                FactLine::Fact {
                    relation: toks[1].clone(),
                    values: values(&toks[2..]),
                }
            }
            "y" => {
                need(2, "a relation name")?;
                FactLine::Label {
                    relation: toks[1].clone(),
                    values: values(&toks[2..]),
                }
            }
            "startdoc" => {
                if toks.len() != 2 {
                    return Err(FactsError::Parse {
                        line,
                        message: "startdoc takes exactly one document id".to_string(),
                    });
                }
                FactLine::StartDoc { id: toks[1].clone() }
            }
            other => {
                return Err(FactsError::UnknownCommand {
                    line,
                    command: other.to_string(),
                });
            }
        };
        Ok(Some(parsed))
    }
}

/// Split on whitespace, keeping double-quoted tokens (quotes included) whole.
fn tokenize(body: &str) -> Option<Vec<String>> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    for c in body.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                cur.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if !cur.is_empty() {
                    out.push(std::mem::take(&mut cur));
                }
            }
            _ => cur.push(c),
        }
    }
    if quoted {
        return None;
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    Some(out)
}

/// Parse a whole fact file. Line numbers in errors are 1-based.
pub fn parse_facts(text: &str) -> FactsResult<Vec<FactLine>> {
    let mut out = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(fact) = FactLine::parse(line, i + 1)? {
            out.push(fact);
        }
    }
    Ok(out)
}

/// Read and parse a fact file.
pub fn read_facts_file(path: &Path) -> FactsResult<Vec<FactLine>> {
    let text = std::fs::read_to_string(path).map_err(|e| FactsError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_facts(&text)
}

/// A document: its id (if it had a `startdoc` line) and its lines, starting
/// with the `startdoc` line itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: Option<String>,
    pub lines: Vec<FactLine>,
}

/// Split lines into a prelude (everything before the first `startdoc`) and
/// documents. A file without `startdoc` lines yields one anonymous document
/// holding every non-`def`, non-`schema` line.
pub fn split_documents(lines: Vec<FactLine>) -> (Vec<FactLine>, Vec<Document>) {
    if !lines.iter().any(|l| matches!(l, FactLine::StartDoc { .. })) {
        let (prelude, body): (Vec<_>, Vec<_>) = lines
            .into_iter()
            .partition(|l| matches!(l, FactLine::Def { .. } | FactLine::Schema { .. }));
        let docs = if body.is_empty() {
            Vec::new()
        } else {
            vec![Document { id: None, lines: body }]
        };
        return (prelude, docs);
    }

    let mut prelude = Vec::new();
    let mut docs: Vec<Document> = Vec::new();
    for line in lines {
        if let FactLine::StartDoc { id } = &line {
            let id = Some(id.clone());
            docs.push(Document { id, lines: vec![line] });
        } else if let Some(doc) = docs.last_mut() {
            doc.lines.push(line);
        } else {
            prelude.push(line);
        }
    }
    (prelude, docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_each_command() {
        let text = "\
# header
def succ <tokenIndex> <tokenIndex>
def word2 tokenIndex word

schema biolu B PER I PER
startdoc d1
x word2 0 \"New York\"  # trailing
y succ 0 1
";
        let lines = parse_facts(text).unwrap();
        assert_eq!(lines.len(), 6);
        assert_eq!(
            lines[0],
            FactLine::Def {
                relation: "succ".into(),
                types: vec!["tokenIndex".into(), "tokenIndex".into()]
            }
        );
        assert_eq!(
            lines[1],
            FactLine::Def {
                relation: "word2".into(),
                types: vec!["tokenIndex".into(), "word".into()]
            }
        );
        assert_eq!(lines[3], FactLine::StartDoc { id: "d1".into() });
        assert_eq!(
            lines[4],
            FactLine::Fact {
                relation: "word2".into(),
                values: vec![Value::Int(0), Value::str("New York")]
            }
        );
        assert!(matches!(lines[5], FactLine::Label { .. }));
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = parse_facts("def a t\nz a 1\n").unwrap_err();
        assert!(matches!(err, FactsError::UnknownCommand { line: 2, ref command } if command == "z"));
        let err = parse_facts("x\n").unwrap_err();
        assert!(matches!(err, FactsError::Parse { line: 1, .. }));
        let err = parse_facts("\n\nx a \"open\n").unwrap_err();
        assert!(matches!(err, FactsError::Parse { line: 3, .. }));
        let err = parse_facts("startdoc a b\n").unwrap_err();
        assert!(matches!(err, FactsError::Parse { line: 1, .. }));
        let err = parse_facts("def r <>\n").unwrap_err();
        assert!(matches!(err, FactsError::Parse { line: 1, .. }));
    }

    #[test]
    fn split_into_prelude_and_documents() {
        let lines = parse_facts(
            "def succ <t> <t>\nschema succ 0 1\nstartdoc a\nx succ 1 2\nstartdoc b\nx succ 2 3\ny succ 2 3\n",
        )
        .unwrap();
        let (prelude, docs) = split_documents(lines);
        assert_eq!(prelude.len(), 2);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id.as_deref(), Some("a"));
        assert_eq!(docs[0].lines.len(), 2);
        assert_eq!(docs[1].lines.len(), 3);
    }

    #[test]
    fn file_without_documents_is_one_document() {
        let lines = parse_facts("def succ <t> <t>\nx succ 0 1\nschema succ 5 6\n").unwrap();
        let (prelude, docs) = split_documents(lines);
        assert_eq!(prelude.len(), 2);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, None);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_facts_file(Path::new("/definitely/not/here.facts")).unwrap_err();
        assert!(matches!(err, FactsError::Io { .. }));
    }
}
