use crate::error::EvalError;
use crate::grammar::Grammar;
use crate::node::Node;
use crate::node::RuleType;
use crate::rule::EvalResult;
use crate::rule::Rule;
use crate::rule::SpacePolicy;
use crate::stream::CharStream;
use crate::stream::PrependStream;

/// Ordered priority groups of unordered alternates. Every alternate in a
/// group is tried against the same starting state; the greediest match
/// wins, a tie is a hard ambiguity, and only when a whole group misses
/// does the next group get a look. A mismatch reports the error of the
/// alternate that reached furthest into the stream.
pub(crate) fn eval(
    rule: &Rule,
    groups: &[Vec<Rule>],
    grammar: &Grammar,
    cs: &mut dyn CharStream,
    spaces: SpacePolicy,
) -> EvalResult {
    let mut result = EvalResult::default();
    let mut node = Node::new(RuleType::Choice, &rule.name);
    node.virtual_ = rule.virtual_;
    node.non_data = rule.non_data;

    let mut sticky = true;
    let mut deepest: Option<EvalError> = None;
    let mut deepest_idx = 0usize;
    let mut found: Option<EvalResult> = None;

    'groups: for group in groups {
        let mut matched: Vec<EvalResult> = Vec::new();
        for alternate in group {
            let mut replay = PrependStream::new(&mut *cs, result.chars_read.clone());
            let attempt = alternate.eval(grammar, &mut replay, spaces);
            // one non-sticky alternate makes the whole choice non-sticky
            if !attempt.sticky {
                sticky = false;
            }
            if result.chars_read.len() < attempt.chars_read.len() {
                result.chars_read = attempt.chars_read.clone();
            }
            if attempt.node.is_some() {
                matched.push(attempt);
            } else if let Some(error) = attempt.error {
                if deepest.is_none() || attempt.err_idx > deepest_idx {
                    deepest_idx = attempt.err_idx;
                    deepest = Some(error);
                }
            }
        }

        match matched.len() {
            0 => continue,
            1 => {
                found = matched.into_iter().next();
                break 'groups;
            }
            _ => {
                let mut max_used = 0;
                let mut max_result: Option<EvalResult> = None;
                for attempt in matched {
                    let used = attempt.count_chars_used();
                    if used < max_used {
                        continue;
                    }
                    if used == max_used {
                        if let Some(ref previous) = max_result {
                            let previous_node = previous.node.as_ref().unwrap();
                            let attempt_node = attempt.node.as_ref().unwrap();
                            result.error = Some(EvalError::new(
                                format!(
                                    "{}: ambiguity found: {} \"{}\" vs {} \"{}\"",
                                    rule.desc(),
                                    previous_node.rule_name,
                                    previous_node.text(),
                                    attempt_node.rule_name,
                                    attempt_node.text(),
                                ),
                                cs.cursor(),
                            ));
                            return result;
                        }
                    }
                    max_used = used;
                    max_result = Some(attempt);
                }
                found = max_result;
                break 'groups;
            }
        }
    }

    result.sticky = sticky;
    match found {
        Some(adopted) => {
            let used = adopted.count_chars_used();
            let adopted_node = adopted.node.unwrap();
            node.position = adopted_node.position;
            node.sticky = sticky;
            node.children.push(adopted_node);
            result.chars_unused = result.chars_read[used..].to_vec();
            result.node = Some(node);
        }
        None => {
            result.chars_unused = result.chars_read.clone();
            result.err_idx = deepest_idx;
            result.error = Some(match deepest {
                Some(error) => EvalError::with_position(
                    format!("{}: {}", rule.desc(), error.message()),
                    error.index(),
                    error.position(),
                ),
                None => EvalError::new(format!("{}: no alternate matched", rule.desc()), deepest_idx),
            });
        }
    }
    result
}
