mod parse;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::ast::Ast;
use crate::ast::Simplify;
use crate::error::EvalError;
use crate::error::GrammarError;
use crate::node::Node;
use crate::node::RuleType;
use crate::rule::replay_after;
use crate::rule::EvalResult;
use crate::rule::Rule;
use crate::rule::SpacePolicy;
use crate::stream::CharStream;
use crate::stream::PrependStream;
use crate::stream::StringStream;

/// A named rule with the line it was declared on.
#[derive(Debug, Clone)]
pub struct RuleRecord {
    name: String,
    rule: Rule,
    line: usize,
}

impl RuleRecord {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn line(&self) -> usize {
        self.line
    }
}

/// An ordered, name-indexed collection of rule definitions, with the
/// reference graph derived from them.
///
/// Build one from xbnf text with [`FromStr`], or incrementally with
/// [`Grammar::add_rule`] followed by [`Grammar::validate`]. Rules that
/// no other rule references are the grammar's *roots*; the evaluator
/// tries every root at each step of the input.
///
/// ## Example
/// ```rust
/// use xbnf_parser::{Grammar, Simplify};
///
/// let grammar: Grammar = "greeting = \"hello\" | \"hi\"".parse().unwrap();
/// let ast = grammar.eval_text("hello", Simplify::Basic).unwrap();
/// assert_eq!(ast.text(), "hello");
/// ```
#[derive(Debug, Clone)]
pub struct Grammar {
    file_name: Option<String>,
    records: IndexMap<String, RuleRecord>,
    /// referenced name → names of the rules referencing it
    usages: IndexMap<String, Vec<String>>,
    /// defined but never referenced, in declaration order
    roots: Vec<String>,
    /// rules that reference no other rule, in declaration order
    terminals: Vec<String>,
    max_line: usize,
}

impl Grammar {
    pub fn new() -> Self {
        Grammar {
            file_name: None,
            records: IndexMap::new(),
            usages: IndexMap::new(),
            roots: Vec::new(),
            terminals: Vec::new(),
            max_line: 0,
        }
    }

    /// Provenance label copied onto produced ASTs.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn set_file_name(&mut self, file_name: &str) {
        self.file_name = Some(file_name.to_string());
    }

    pub fn record(&self, rule_name: &str) -> Option<&RuleRecord> {
        self.records.get(rule_name)
    }

    pub fn rule(&self, rule_name: &str) -> Option<&Rule> {
        self.records.get(rule_name).map(RuleRecord::rule)
    }

    /// Every record, in declaration order.
    pub fn records(&self) -> impl Iterator<Item = &RuleRecord> {
        self.records.values()
    }

    /// Names of the root rules (defined but unreferenced), in
    /// declaration order. Empty before [`Grammar::validate`].
    pub fn root_rules(&self) -> &[String] {
        &self.roots
    }

    /// Names of the terminal rules (referencing no other rule), in
    /// declaration order. Empty before [`Grammar::validate`].
    pub fn terminal_rules(&self) -> &[String] {
        &self.terminals
    }

    /// The rules that reference `rule_name`.
    pub fn users_of(&self, rule_name: &str) -> &[String] {
        self.usages
            .get(rule_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn add_usage(&mut self, referenced: &str, user: &str) {
        self.usages
            .entry(referenced.to_string())
            .or_default()
            .push(user.to_string());
    }

    /// Adds one `name = definition` line.
    pub fn add_rule(&mut self, definition: &str) -> Result<(), GrammarError> {
        let line = self.max_line + 1;
        let (name, body) = definition.split_once('=').ok_or_else(|| {
            GrammarError::MissingEquals {
                line,
                text: definition.trim().to_string(),
            }
        })?;
        self.parse_rule_at(name.trim(), body.trim(), line)?;
        self.max_line = line;
        Ok(())
    }

    /// Parses `body` as the definition of `name` and registers it.
    pub fn parse_rule(&mut self, name: &str, body: &str) -> Result<(), GrammarError> {
        let line = self.max_line + 1;
        self.parse_rule_at(name, body, line)?;
        self.max_line = line;
        Ok(())
    }

    fn parse_rule_at(&mut self, name: &str, body: &str, line: usize) -> Result<(), GrammarError> {
        let syntax = |message: String| GrammarError::Syntax {
            line,
            name: name.to_string(),
            message,
        };
        parse::validate_rule_name(name).map_err(syntax)?;
        if let Some(existing) = self.records.get(name) {
            return Err(GrammarError::DuplicateRule {
                name: name.to_string(),
                line: existing.line,
            });
        }
        let mut cs = StringStream::new(body.trim());
        let mut rule = self.parse_body(name, &mut cs, &[]).map_err(syntax)?;
        rule.set_name(name);
        self.records.insert(
            name.to_string(),
            RuleRecord {
                name: name.to_string(),
                rule,
                line,
            },
        );
        Ok(())
    }

    /// Checks that every reference resolves, then derives the root and
    /// terminal rule sets. Must run before evaluation; [`FromStr`] calls
    /// it automatically.
    pub fn validate(&mut self) -> Result<(), GrammarError> {
        for referenced in self.usages.keys() {
            if !self.records.contains_key(referenced) {
                return Err(GrammarError::UndefinedReference(referenced.clone()));
            }
        }
        let users: HashSet<&String> = self.usages.values().flatten().collect();
        self.terminals = self
            .records
            .keys()
            .filter(|name| !users.contains(*name))
            .cloned()
            .collect();
        self.roots = self
            .records
            .keys()
            .filter(|name| !self.usages.contains_key(*name))
            .cloned()
            .collect();
        Ok(())
    }

    /// Evaluates the stream and post-processes the tree to `simplify`.
    pub fn eval(
        &self,
        cs: &mut dyn CharStream,
        simplify: Simplify,
    ) -> Result<Ast, EvalError> {
        let mut ast = self.eval_raw(cs)?;
        ast.simplify(simplify);
        Ok(ast)
    }

    /// Convenience wrapper over [`Grammar::eval`] for string input.
    pub fn eval_text(&self, input: &str, simplify: Simplify) -> Result<Ast, EvalError> {
        let mut cs = StringStream::new(input);
        self.eval(&mut cs, simplify)
    }

    /// The evaluator driver: repeatedly tries every root rule at the
    /// current position, adopting the greediest match, until the stream
    /// is exhausted. Returns the tree exactly as matched.
    pub fn eval_raw(&self, cs: &mut dyn CharStream) -> Result<Ast, EvalError> {
        if cs.peek().is_none() {
            return Err(EvalError::new("EOF encountered", cs.cursor()));
        }
        if self.roots.is_empty() {
            return Err(EvalError::new(
                "grammar has no root rules (was it validated?)",
                cs.cursor(),
            ));
        }

        let mut ast = Ast::new();
        ast.file_name = self.file_name.clone();
        let mut pending: Vec<char> = Vec::new();
        let mut policy = SpacePolicy::SuggestSkip;
        loop {
            if pending.is_empty() && cs.peek().is_none() {
                break;
            }
            let mut max_read: Vec<char> = Vec::new();
            let mut matched: Vec<EvalResult> = Vec::new();
            let mut errors: Vec<EvalError> = Vec::new();
            for name in &self.roots {
                let buffer = replay_after(&pending, max_read.len(), &max_read);
                let mut replay = PrependStream::new(&mut *cs, buffer);
                let result = self.records[name].rule.eval(self, &mut replay, policy);
                if max_read.len() < result.chars_read.len() {
                    max_read = result.chars_read.clone();
                }
                if result.node.is_some() {
                    matched.push(result);
                } else if let Some(error) = result.error {
                    errors.push(error);
                }
            }

            let adopted = match matched.len() {
                0 => {
                    let summary: String = errors
                        .iter()
                        .map(|error| format!("{}; ", error.message()))
                        .collect();
                    let index = errors.iter().map(EvalError::index).max().unwrap_or(0);
                    return Err(EvalError::with_position(
                        format!("no matches found: {summary}"),
                        index,
                        cs.position_lookup(index),
                    ));
                }
                1 => matched.remove(0),
                _ => {
                    let mut max_used = 0;
                    let mut max_result: Option<EvalResult> = None;
                    for result in matched {
                        let used = result.count_chars_used();
                        if used == max_used {
                            if let Some(ref previous) = max_result {
                                let a = previous.node.as_ref().unwrap();
                                let b = result.node.as_ref().unwrap();
                                return Err(EvalError::new(
                                    format!(
                                        "ambiguity found: {}(\"{}\") vs {}(\"{}\")",
                                        a.rule_name,
                                        a.text(),
                                        b.rule_name,
                                        b.text(),
                                    ),
                                    cs.cursor(),
                                ));
                            }
                        }
                        if used >= max_used {
                            max_used = used;
                            max_result = Some(result);
                        }
                    }
                    max_result.unwrap()
                }
            };

            policy = if adopted.sticky {
                SpacePolicy::SuggestKeep
            } else {
                SpacePolicy::SuggestSkip
            };
            let buffer = replay_after(&pending, max_read.len(), &max_read);
            pending = buffer[adopted.count_chars_used()..].to_vec();
            ast.nodes.push(adopted.node.unwrap());
        }

        if ast.nodes.is_empty() {
            return Err(EvalError::new("no AST node found", cs.cursor()));
        }
        Ok(ast)
    }

    /// Evaluates a single named rule against a string, with leading
    /// whitespace skipping suggested. The raw result carries the match
    /// (or miss) plus the read/unused accounting.
    pub fn eval_rule(&self, rule_name: &str, sample: &str) -> EvalResult {
        let record = match self.records.get(rule_name) {
            Some(record) => record,
            None => {
                return EvalResult {
                    error: Some(EvalError::new(format!("rule '{rule_name}' not defined"), 0)),
                    ..EvalResult::default()
                }
            }
        };
        let mut cs = StringStream::new(sample);
        record.rule.eval(self, &mut cs, SpacePolicy::SuggestSkip)
    }

    /// Scans a string for embedded occurrences of a rule: wherever the
    /// rule matches, the match becomes a child of a synthetic Embed
    /// node; codepoints it skips over accumulate into Text children
    /// (rule name `_`) instead of failing the evaluation.
    pub fn eval_embed(&self, rule_name: &str, sample: &str) -> EvalResult {
        let mut eval_result = EvalResult::default();
        let record = match self.records.get(rule_name) {
            Some(record) => record,
            None => {
                eval_result.error =
                    Some(EvalError::new(format!("rule '{rule_name}' not defined"), 0));
                return eval_result;
            }
        };

        let mut node = Node::new(RuleType::Embed, rule_name);
        let mut cs = StringStream::new(sample);
        let mut pending: Vec<char> = Vec::new();
        let mut text: Vec<char> = Vec::new();
        loop {
            let attempt = {
                let mut replay = PrependStream::new(&mut cs, pending.clone());
                record.rule.eval(self, &mut replay, SpacePolicy::Keep)
            };
            pending = replay_after(&pending, attempt.chars_read.len(), &attempt.chars_unused);
            match attempt.node {
                Some(matched) => {
                    if !text.is_empty() {
                        node.children.push(text_node(std::mem::take(&mut text)));
                    }
                    node.children.push(matched);
                }
                None => {
                    let next = if pending.is_empty() {
                        cs.next()
                    } else {
                        Some(pending.remove(0))
                    };
                    match next {
                        None => {
                            if !text.is_empty() {
                                node.children.push(text_node(std::mem::take(&mut text)));
                            }
                            break;
                        }
                        Some(ch) => text.push(ch),
                    }
                }
            }
        }
        eval_result.node = Some(node);
        eval_result
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

fn text_node(text: Vec<char>) -> Node {
    let mut node = Node::new(RuleType::Text, "_");
    node.chars = text;
    node
}

impl FromStr for Grammar {
    type Err = GrammarError;

    /// Parses a whole grammar: one `name = definition` per line, with
    /// blank lines and `//` comments skipped, then validates.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut grammar = Grammar::new();
        for (i, raw_line) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with("//") {
                grammar.max_line = line_no;
                continue;
            }
            let (name, body) = line.split_once('=').ok_or_else(|| {
                GrammarError::MissingEquals {
                    line: line_no,
                    text: line.to_string(),
                }
            })?;
            grammar.parse_rule_at(name.trim(), body.trim(), line_no)?;
            grammar.max_line = line_no;
        }
        if grammar.records.is_empty() {
            return Err(GrammarError::NoRules);
        }
        grammar.validate()?;
        Ok(grammar)
    }
}

/// Renders the grammar as re-parseable xbnf text, one rule per line in
/// declaration order.
impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in self.records.values() {
            writeln!(f, "{} = {}", record.name, record.rule)?;
        }
        Ok(())
    }
}
