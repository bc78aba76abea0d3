//! Evaluation of the literal terminals: Char, Chars, String, Range.
//!
//! Char, Chars and Range are sticky; String is the token-forming
//! terminal and is not. String skips leading whitespace under either
//! suggestion, the others only under an explicit skip suggestion.

use crate::error::EvalError;
use crate::node::Node;
use crate::node::RuleType;
use crate::rule::EvalResult;
use crate::rule::Rule;
use crate::rule::SpacePolicy;
use crate::stream::display_position;
use crate::stream::is_whitespace;
use crate::stream::CharStream;

pub(crate) fn eval_char(
    rule: &Rule,
    ch: char,
    cs: &mut dyn CharStream,
    spaces: SpacePolicy,
) -> EvalResult {
    let mut result = EvalResult::sticky();
    if cs.peek().is_none() {
        result.error = Some(EvalError::new(
            format!("missing {} at EOF", rule.desc()),
            cs.cursor(),
        ));
        result.err_idx = cs.cursor();
        return result;
    }
    let mut node = Node::new(RuleType::Char, &rule.name);
    node.virtual_ = rule.virtual_;
    node.non_data = rule.non_data;
    node.sticky = true;

    let start_pos = cs.position();

    if spaces == SpacePolicy::SuggestSkip {
        let skipped = cs.skip_spaces();
        result.chars_read.extend_from_slice(&skipped);
        // the literal may itself be a whitespace sitting inside the
        // skipped run
        if is_whitespace(ch) && !skipped.is_empty() {
            for (i, &space) in skipped.iter().enumerate() {
                if space == ch {
                    node.chars.push(ch);
                    node.position = cs.position_lookup(cs.cursor() - skipped.len() + i);
                    result.node = Some(node);
                    result.chars_unused = skipped[i + 1..].to_vec();
                    return result;
                }
            }
            result.chars_unused = result.chars_read.clone();
            result.error = Some(EvalError::with_position(
                format!("missing {} at {}", rule.desc(), display_position(start_pos)),
                cs.cursor(),
                start_pos,
            ));
            result.err_idx = cs.cursor();
            return result;
        }
    }

    if cs.peek() != Some(ch) {
        result.chars_unused = result.chars_read.clone();
        result.error = Some(EvalError::with_position(
            format!("missing {} at {}", rule.desc(), display_position(start_pos)),
            cs.cursor(),
            start_pos,
        ));
        result.err_idx = cs.cursor();
        return result;
    }
    node.position = cs.position();
    cs.next();
    result.chars_read.push(ch);
    node.chars.push(ch);
    result.node = Some(node);
    result
}

pub(crate) fn eval_chars(
    rule: &Rule,
    text: &[char],
    cs: &mut dyn CharStream,
    spaces: SpacePolicy,
) -> EvalResult {
    let mut result = EvalResult::sticky();
    if cs.peek().is_none() {
        result.error = Some(EvalError::new(
            format!("missing {} at EOF", rule.desc()),
            cs.cursor(),
        ));
        result.err_idx = cs.cursor();
        return result;
    }
    let mut node = Node::new(RuleType::Chars, &rule.name);
    node.virtual_ = rule.virtual_;
    node.non_data = rule.non_data;
    node.sticky = true;

    let start_pos = cs.position();
    let mut start_cursor = cs.cursor();
    let mut remaining = text;
    if spaces == SpacePolicy::SuggestSkip {
        match skip_against_leading(rule, text, cs, start_pos, &mut result) {
            SkipOutcome::Miss => return result,
            SkipOutcome::Matched { skipped_len } => {
                start_cursor += skipped_len;
                remaining = &text[leading_whitespace(text).len()..];
            }
        }
    }

    let (read, ok) = cs.match_seq(remaining);
    result.chars_read.extend_from_slice(&read);
    if !ok {
        result.chars_unused = result.chars_read.clone();
        result.error = Some(EvalError::with_position(
            format!("missing {} at {}", rule.desc(), display_position(start_pos)),
            cs.cursor(),
            start_pos,
        ));
        result.err_idx = cs.cursor();
        return result;
    }
    node.position = cs.position_lookup(start_cursor);
    node.chars.extend_from_slice(text);
    result.node = Some(node);
    result
}

pub(crate) fn eval_string(
    rule: &Rule,
    text: &[char],
    cs: &mut dyn CharStream,
    spaces: SpacePolicy,
) -> EvalResult {
    let mut result = EvalResult::default();
    if cs.peek().is_none() {
        if !rule.name.is_empty() {
            result.error = Some(EvalError::new(format!("missing {}", rule.name), cs.cursor()));
        }
        result.err_idx = cs.cursor();
        return result;
    }
    let mut node = Node::new(RuleType::String, &rule.name);
    node.virtual_ = rule.virtual_;
    node.non_data = rule.non_data;

    // a string terminal skips unless explicitly forbidden
    let mut remaining = text;
    if spaces != SpacePolicy::Keep {
        let start_pos = cs.position();
        match skip_against_leading(rule, text, cs, start_pos, &mut result) {
            SkipOutcome::Miss => {
                // string mismatches stay anonymous unless the rule is named
                if rule.name.is_empty() {
                    result.error = None;
                } else {
                    result.error =
                        Some(EvalError::new(format!("missing {}", rule.name), result.err_idx));
                }
                return result;
            }
            SkipOutcome::Matched { .. } => {
                remaining = &text[leading_whitespace(text).len()..];
            }
        }
    }

    let start_cursor = cs.cursor();
    let (read, ok) = cs.match_seq(remaining);
    result.chars_read.extend_from_slice(&read);
    if !ok {
        result.chars_unused = result.chars_read.clone();
        if !rule.name.is_empty() {
            result.error = Some(EvalError::new(format!("missing {}", rule.name), cs.cursor()));
        }
        result.err_idx = cs.cursor();
        return result;
    }
    node.position = cs.position_lookup(start_cursor);
    node.chars.extend_from_slice(text);
    result.node = Some(node);
    result
}

pub(crate) fn eval_range(
    rule: &Rule,
    begin: char,
    end: char,
    cs: &mut dyn CharStream,
    spaces: SpacePolicy,
) -> EvalResult {
    let mut result = EvalResult::sticky();
    if cs.peek().is_none() {
        result.error = Some(EvalError::new(
            format!("missing {} at EOF", rule.desc()),
            cs.cursor(),
        ));
        result.err_idx = cs.cursor();
        return result;
    }
    let mut node = Node::new(RuleType::Range, &rule.name);
    node.virtual_ = rule.virtual_;
    node.non_data = rule.non_data;
    node.sticky = true;

    if spaces == SpacePolicy::SuggestSkip {
        let skipped = cs.skip_spaces();
        result.chars_read.extend_from_slice(&skipped);
        for (i, &space) in skipped.iter().enumerate() {
            if begin <= space && space <= end {
                node.chars.push(space);
                node.position = cs.position_lookup(cs.cursor() - skipped.len() + i);
                result.node = Some(node);
                result.chars_unused = skipped[i + 1..].to_vec();
                return result;
            }
        }
    }

    let start_pos = cs.position();
    match cs.peek() {
        Some(ch) if begin <= ch && ch <= end => {
            node.position = cs.position();
            cs.next();
            result.chars_read.push(ch);
            node.chars.push(ch);
            result.node = Some(node);
            result
        }
        _ => {
            result.chars_unused = result.chars_read.clone();
            result.error = Some(EvalError::with_position(
                format!("missing {} at {}", rule.desc(), display_position(start_pos)),
                cs.cursor(),
                start_pos,
            ));
            result.err_idx = cs.cursor();
            result
        }
    }
}

/// The run of whitespace a pattern starts with.
fn leading_whitespace(text: &[char]) -> &[char] {
    let end = text
        .iter()
        .position(|&ch| !is_whitespace(ch))
        .unwrap_or(text.len());
    &text[..end]
}

enum SkipOutcome {
    Matched { skipped_len: usize },
    Miss,
}

/// Skips whitespace and checks the skipped run covers the pattern's own
/// leading whitespace: at least as many codepoints must have been
/// skipped, and the tail of the skipped run must equal the pattern's
/// prefix. On a miss the result is finalized (all reads unused, error
/// set from `start_pos`).
fn skip_against_leading(
    rule: &Rule,
    text: &[char],
    cs: &mut dyn CharStream,
    start_pos: Option<crate::stream::Position>,
    result: &mut EvalResult,
) -> SkipOutcome {
    let leading = leading_whitespace(text);
    let skipped = cs.skip_spaces();
    result.chars_read.extend_from_slice(&skipped);

    let covered = skipped.len() >= leading.len()
        && skipped[skipped.len() - leading.len()..] == *leading;
    if !covered {
        result.chars_unused = result.chars_read.clone();
        result.error = Some(EvalError::with_position(
            format!("missing {} at {}", rule.desc(), display_position(start_pos)),
            cs.cursor(),
            start_pos,
        ));
        result.err_idx = cs.cursor();
        return SkipOutcome::Miss;
    }
    SkipOutcome::Matched {
        skipped_len: skipped.len(),
    }
}
