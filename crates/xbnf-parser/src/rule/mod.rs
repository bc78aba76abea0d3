mod block;
mod choice;
mod concat;
mod eof;
mod group;
mod option;
mod reference;
mod repetition;
mod terminal;

use std::fmt;

use crate::error::EvalError;
use crate::grammar::Grammar;
use crate::node::Node;
use crate::stream::CharStream;
use crate::stream::PrependStream;

pub(crate) use block::BlockParts;

/// How a rule should treat leading whitespace in the stream.
///
/// String terminals skip under either suggestion; the other terminals
/// skip only under [`SuggestSkip`]; [`Keep`] forbids skipping for all.
/// Composites thread the policy through to their children, flipping the
/// suggestion based on the stickiness of the previous sibling.
///
/// [`SuggestSkip`]: SpacePolicy::SuggestSkip
/// [`Keep`]: SpacePolicy::Keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpacePolicy {
    /// The rule may skip leading whitespace.
    SuggestSkip,
    /// The rule should prefer not to skip.
    SuggestKeep,
    /// The rule must not skip.
    Keep,
}

/// The outcome of evaluating one rule against a stream.
///
/// A mismatch is a value, not an error: `node` is `None` and `error`
/// explains the furthest failure. Either way, `chars_read` holds every
/// codepoint the attempt consumed and `chars_unused` the trailing suffix
/// the produced node did not incorporate; the caller must re-present the
/// unused suffix to whatever rule runs next (see [`PrependStream`]).
#[derive(Debug, Default, Clone)]
pub struct EvalResult {
    pub node: Option<Node>,
    pub error: Option<EvalError>,
    /// Stream index of the furthest failure, for top-level diagnostics.
    pub err_idx: usize,
    pub chars_read: Vec<char>,
    pub chars_unused: Vec<char>,
    /// Whether the produced node joins its neighbours without a space.
    pub sticky: bool,
}

impl EvalResult {
    pub(crate) fn sticky() -> Self {
        EvalResult {
            sticky: true,
            ..EvalResult::default()
        }
    }

    /// The codepoints the node actually incorporated.
    pub fn chars_used(&self) -> &[char] {
        &self.chars_read[..self.count_chars_used()]
    }

    pub fn count_chars_used(&self) -> usize {
        self.chars_read.len() - self.chars_unused.len()
    }

    /// Folds a child result evaluated against `chars_unused`-then-stream
    /// into this accumulator. The child consumed some prefix of the
    /// pending buffer (possibly reading past it into the stream); the
    /// pending buffer shrinks by what the child used, and reads beyond it
    /// extend `chars_read`.
    pub(crate) fn absorb(&mut self, child: &EvalResult) {
        if child.chars_read.len() > self.chars_unused.len() {
            let extra = &child.chars_read[self.chars_unused.len()..];
            self.chars_read.extend_from_slice(extra);
            self.chars_unused = child.chars_unused.clone();
        } else {
            self.chars_unused.drain(..child.count_chars_used());
        }
        if !child.sticky {
            self.sticky = false;
        }
    }
}

/// The replay buffer left outstanding after evaluating a child against
/// `PrependStream::new(stream, pending)`: whatever the child handed back
/// (`returned`), followed by the part of `pending` the child never
/// reached.
pub(crate) fn replay_after(pending: &[char], read_len: usize, returned: &[char]) -> Vec<char> {
    let consumed = read_len.min(pending.len());
    let mut next = returned.to_vec();
    next.extend_from_slice(&pending[consumed..]);
    next
}

/// A single grammar rule: an annotation header shared by every variant,
/// plus the variant payload.
///
/// Anonymous inner rules (inside groups, options, repetitions, blocks)
/// carry an empty name and are owned by their parent; only named rules
/// are registered with the grammar.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub(crate) name: String,
    pub(crate) virtual_: bool,
    pub(crate) non_data: bool,
    pub(crate) kind: RuleKind,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RuleKind {
    Char {
        ch: char,
        unicode: bool,
    },
    Chars {
        text: Vec<char>,
    },
    String {
        text: Vec<char>,
    },
    Range {
        begin: char,
        begin_unicode: bool,
        end: char,
        end_unicode: bool,
    },
    Reference {
        target: String,
    },
    Group {
        rule: Box<Rule>,
    },
    Option {
        rule: Box<Rule>,
    },
    Repetition {
        rule: Box<Rule>,
        min: u32,
        /// 0 means unbounded.
        max: u32,
    },
    /// Ordered priority groups of unordered alternates.
    Choice {
        groups: Vec<Vec<Rule>>,
    },
    Concatenate {
        rules: Vec<Rule>,
    },
    Block {
        open: Box<Rule>,
        escape: Option<Box<Rule>>,
        excludes: Vec<Rule>,
        close: Box<Rule>,
        virtual_close: bool,
    },
    Eof,
}

impl Rule {
    pub(crate) fn new(kind: RuleKind) -> Self {
        Rule {
            name: String::new(),
            virtual_: false,
            non_data: false,
            kind,
        }
    }

    /// The built-in `EOF` rule: implicitly virtual and non-data.
    pub(crate) fn eof() -> Self {
        Rule {
            name: "EOF".to_string(),
            virtual_: true,
            non_data: true,
            kind: RuleKind::Eof,
        }
    }

    /// The rule's name; empty for anonymous inner rules.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_
    }

    pub fn is_non_data(&self) -> bool {
        self.non_data
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub(crate) fn set_virtual(&mut self, virtual_: bool) {
        self.virtual_ = virtual_;
    }

    pub(crate) fn set_non_data(&mut self, non_data: bool) {
        self.non_data = non_data;
    }

    /// Evaluate the stream against this rule.
    ///
    /// Never panics and never unwinds the stream: on mismatch the result
    /// carries the consumed codepoints for the caller to replay.
    pub fn eval(
        &self,
        grammar: &Grammar,
        cs: &mut dyn CharStream,
        spaces: SpacePolicy,
    ) -> EvalResult {
        match &self.kind {
            RuleKind::Char { ch, .. } => terminal::eval_char(self, *ch, cs, spaces),
            RuleKind::Chars { text } => terminal::eval_chars(self, text, cs, spaces),
            RuleKind::String { text } => terminal::eval_string(self, text, cs, spaces),
            RuleKind::Range { begin, end, .. } => {
                terminal::eval_range(self, *begin, *end, cs, spaces)
            }
            RuleKind::Reference { target } => reference::eval(self, target, grammar, cs, spaces),
            RuleKind::Group { rule } => group::eval(self, rule, grammar, cs, spaces),
            RuleKind::Option { rule } => option::eval(self, rule, grammar, cs, spaces),
            RuleKind::Repetition { rule, min, max } => {
                repetition::eval(self, rule, *min, *max, grammar, cs, spaces)
            }
            RuleKind::Choice { groups } => choice::eval(self, groups, grammar, cs, spaces),
            RuleKind::Concatenate { rules } => concat::eval(self, rules, grammar, cs, spaces),
            RuleKind::Block {
                open,
                escape,
                excludes,
                close,
                virtual_close,
            } => block::eval(
                self,
                BlockParts {
                    open,
                    escape: escape.as_deref(),
                    excludes,
                    close,
                    virtual_close: *virtual_close,
                },
                grammar,
                cs,
                spaces,
            ),
            RuleKind::Eof => eof::eval(self, cs, spaces),
        }
    }

    /// A short human description for mismatch messages.
    pub(crate) fn desc(&self) -> String {
        if !self.name.is_empty() {
            if let RuleKind::Option { .. } = self.kind {
                return format!("optional {}", self.name);
            }
            if let RuleKind::Repetition { min, max, .. } = self.kind {
                return format!("{}: {}", self.name, repetition_desc(min, max));
            }
            return self.name.clone();
        }
        match &self.kind {
            RuleKind::Char { ch, .. } => format!("'{ch}'"),
            RuleKind::Chars { text } => format!("'{}'", text.iter().collect::<String>()),
            RuleKind::String { text } => format!("\"{}\"", text.iter().collect::<String>()),
            RuleKind::Range { begin, end, .. } => format!("{begin}-{end}"),
            RuleKind::Reference { target } => target.clone(),
            RuleKind::Group { rule } => rule.desc(),
            RuleKind::Option { rule } => format!("optional {}", rule.desc()),
            RuleKind::Repetition { rule, min, max } => {
                format!("{} of {}", repetition_desc(*min, *max), rule.desc())
            }
            RuleKind::Choice { groups } => {
                let alternates: Vec<String> =
                    groups.iter().flatten().map(|rule| rule.desc()).collect();
                match alternates.split_last() {
                    Some((last, rest)) if !rest.is_empty() => {
                        format!("{} and {}", rest.join(", "), last)
                    }
                    _ => alternates.join(""),
                }
            }
            RuleKind::Concatenate { .. } => self.to_string(),
            RuleKind::Block { open, close, .. } => {
                format!("{} to {}", open.desc(), close.desc())
            }
            RuleKind::Eof => "EOF".to_string(),
        }
    }

    fn annotation(&self) -> String {
        let mut out = String::new();
        if self.virtual_ {
            out.push('~');
        }
        if self.non_data {
            out.push('#');
        }
        out
    }
}

fn repetition_desc(min: u32, max: u32) -> String {
    if max == 0 {
        format!("{min} or more time(s)")
    } else {
        format!("{min} to {max} time(s)")
    }
}

fn quote_char(ch: char) -> String {
    match ch {
        '\\' => "'\\\\'".to_string(),
        '\'' => "'\\''".to_string(),
        _ => format!("'{ch}'"),
    }
}

/// Renders the rule in canonical xbnf form; re-parsing the output yields
/// the same rendering back.
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let annotation = self.annotation();
        f.write_str(&annotation)?;
        match &self.kind {
            RuleKind::Char { ch, unicode } => {
                if *unicode {
                    write!(f, "\\u{:04X}", *ch as u32)
                } else {
                    f.write_str(&quote_char(*ch))
                }
            }
            RuleKind::Chars { text } => {
                let mut out = String::with_capacity(text.len() + 2);
                out.push('\'');
                for &ch in text {
                    if ch == '\'' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push('\'');
                f.write_str(&out)
            }
            RuleKind::String { text } => {
                write!(f, "\"{}\"", text.iter().collect::<String>())
            }
            RuleKind::Range {
                begin,
                begin_unicode,
                end,
                end_unicode,
            } => {
                if *begin_unicode {
                    write!(f, "\\u{:04X}", *begin as u32)?;
                } else {
                    f.write_str(&quote_char(*begin))?;
                }
                f.write_str("-")?;
                if *end_unicode {
                    write!(f, "\\u{:04X}", *end as u32)
                } else {
                    f.write_str(&quote_char(*end))
                }
            }
            RuleKind::Reference { target } => f.write_str(target),
            RuleKind::Group { rule } => write!(f, "( {rule} )"),
            RuleKind::Option { rule } => write!(f, "[ {rule} ]"),
            RuleKind::Repetition { rule, min, max } => {
                write!(f, "{{ {rule} }}{}", repetition_suffix(*min, *max))
            }
            RuleKind::Choice { groups } => {
                if !annotation.is_empty() {
                    f.write_str("(")?;
                }
                for (g, group) in groups.iter().enumerate() {
                    if g > 0 {
                        f.write_str(" > ")?;
                    }
                    for (i, rule) in group.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" | ")?;
                        }
                        write!(f, "{rule}")?;
                    }
                }
                if !annotation.is_empty() {
                    f.write_str(")")?;
                }
                Ok(())
            }
            RuleKind::Concatenate { rules } => {
                if !annotation.is_empty() {
                    f.write_str("(")?;
                }
                for (i, rule) in rules.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{rule}")?;
                }
                if !annotation.is_empty() {
                    f.write_str(")")?;
                }
                Ok(())
            }
            RuleKind::Block {
                open,
                escape,
                excludes,
                close,
                virtual_close,
            } => {
                write!(f, "<{open}")?;
                if let Some(escape) = escape {
                    write!(f, " {escape}")?;
                }
                for exclude in excludes {
                    write!(f, " ^{exclude}")?;
                }
                write!(f, " {close}")?;
                if *virtual_close {
                    f.write_str(" !")?;
                }
                f.write_str(">")
            }
            RuleKind::Eof => f.write_str("EOF"),
        }
    }
}

fn repetition_suffix(min: u32, max: u32) -> String {
    if min == max {
        if min == 0 {
            String::new()
        } else {
            format!("<{min}>")
        }
    } else if max == 0 {
        if min == 1 {
            "+".to_string()
        } else {
            format!("<{min},0>")
        }
    } else {
        format!("<{min},{max}>")
    }
}

/// Evaluates every rule independently against the same starting state
/// (replaying reads between attempts) and adopts the one that used the
/// most codepoints. Two maximal candidates are an ambiguity. Backs both
/// Choice groups and Block exclude selection.
pub(crate) fn most_greedy(
    grammar: &Grammar,
    cs: &mut dyn CharStream,
    spaces: SpacePolicy,
    rules: &[Rule],
) -> EvalResult {
    let mut eval_result = EvalResult::default();
    let mut matched: Vec<EvalResult> = Vec::new();
    let mut max_read: Vec<char> = Vec::new();
    for rule in rules {
        let mut replay = PrependStream::new(&mut *cs, max_read.clone());
        let result = rule.eval(grammar, &mut replay, spaces);
        if max_read.len() < result.chars_read.len() {
            max_read = result.chars_read.clone();
        }
        if result.node.is_some() {
            matched.push(result);
        }
    }

    let found = match matched.len() {
        0 => {
            eval_result.chars_read = max_read;
            eval_result.chars_unused = eval_result.chars_read.clone();
            return eval_result;
        }
        1 => matched.into_iter().next().unwrap(),
        _ => {
            let mut max_used = 0;
            let mut max_result: Option<EvalResult> = None;
            for result in matched {
                let used = result.count_chars_used();
                if used < max_used {
                    continue;
                }
                if used == max_used {
                    if let Some(ref previous) = max_result {
                        let a = previous.node.as_ref().unwrap().text();
                        let b = result.node.as_ref().unwrap().text();
                        eval_result.error = Some(EvalError::new(
                            format!("ambiguity found: \"{a}\" vs \"{b}\""),
                            cs.cursor(),
                        ));
                        return eval_result;
                    }
                }
                max_used = used;
                max_result = Some(result);
            }
            max_result.unwrap()
        }
    };

    let used = found.count_chars_used();
    eval_result.node = found.node;
    eval_result.sticky = found.sticky;
    eval_result.chars_read = max_read;
    eval_result.chars_unused = eval_result.chars_read[used..].to_vec();
    eval_result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chars_unused_is_a_suffix_of_chars_read() {
        let result = EvalResult {
            chars_read: vec!['a', 'b', 'c'],
            chars_unused: vec!['c'],
            ..EvalResult::default()
        };
        assert_eq!(result.count_chars_used(), 2);
        assert_eq!(result.chars_used(), &['a', 'b']);
    }

    #[test]
    fn absorb_shrinks_the_pending_buffer_by_what_the_child_used() {
        // parent read "abcde", of which "cde" is pending; child re-read
        // "cd" and used both
        let mut parent = EvalResult {
            chars_read: "abcde".chars().collect(),
            chars_unused: "cde".chars().collect(),
            sticky: true,
            ..EvalResult::default()
        };
        let child = EvalResult {
            chars_read: "cd".chars().collect(),
            chars_unused: vec![],
            sticky: true,
            ..EvalResult::default()
        };
        parent.absorb(&child);
        assert_eq!(parent.chars_read, "abcde".chars().collect::<Vec<_>>());
        assert_eq!(parent.chars_unused, vec!['e']);
        assert!(parent.sticky);
    }

    #[test]
    fn absorb_extends_chars_read_when_the_child_reads_past_the_buffer() {
        let mut parent = EvalResult {
            chars_read: "ab".chars().collect(),
            chars_unused: "b".chars().collect(),
            sticky: true,
            ..EvalResult::default()
        };
        let child = EvalResult {
            chars_read: "bcd".chars().collect(),
            chars_unused: "d".chars().collect(),
            sticky: false,
            ..EvalResult::default()
        };
        parent.absorb(&child);
        assert_eq!(parent.chars_read, "abcd".chars().collect::<Vec<_>>());
        assert_eq!(parent.chars_unused, vec!['d']);
        assert!(!parent.sticky, "one non-sticky child spoils the run");
    }

    #[test]
    fn replay_after_keeps_the_unreached_remainder() {
        // pending "abc", child read only "ab" and returned both
        let next = replay_after(&['a', 'b', 'c'], 2, &['a', 'b']);
        assert_eq!(next, vec!['a', 'b', 'c']);
        // child read past the buffer and kept everything
        let next = replay_after(&['a'], 3, &[]);
        assert!(next.is_empty());
        // child read past the buffer, returning a tail
        let next = replay_after(&['a'], 3, &['z']);
        assert_eq!(next, vec!['z']);
    }
}
