use crate::error::EvalError;
use crate::grammar::Grammar;
use crate::node::Node;
use crate::node::RuleType;
use crate::rule::EvalResult;
use crate::rule::Rule;
use crate::rule::SpacePolicy;
use crate::stream::CharStream;
use crate::stream::PrependStream;

/// Evaluates the inner rules in order, re-presenting each child's unused
/// codepoints to the next. Between children the whitespace policy is
/// recomputed from the previous result's stickiness, except after an
/// option that matched nothing, which leaves the policy untouched.
pub(crate) fn eval(
    rule: &Rule,
    rules: &[Rule],
    grammar: &Grammar,
    cs: &mut dyn CharStream,
    spaces: SpacePolicy,
) -> EvalResult {
    let mut result = EvalResult::sticky();
    let mut node = Node::new(RuleType::Concatenate, &rule.name);
    node.virtual_ = rule.virtual_;
    node.non_data = rule.non_data;

    let mut policy = spaces;
    for inner in rules {
        let mut replay = PrependStream::new(&mut *cs, result.chars_unused.clone());
        let child = inner.eval(grammar, &mut replay, policy);
        result.absorb(&child);

        let child_node = match child.node {
            Some(child_node) => child_node,
            None => {
                result.chars_unused = result.chars_read.clone();
                result.err_idx = child.err_idx;
                result.error = child.error.map(|error| {
                    if rule.name.is_empty() {
                        error
                    } else {
                        EvalError::with_position(
                            format!("{}: {}", rule.name, error.message()),
                            error.index(),
                            error.position(),
                        )
                    }
                });
                return result;
            }
        };

        // an option that matched nothing carries no evidence either way,
        // so the policy survives it unchanged
        let empty_option = child_node.rule_type == RuleType::Option
            && child_node.children.is_empty()
            && child_node.chars.is_empty();
        if !empty_option {
            policy = if child.sticky {
                SpacePolicy::SuggestKeep
            } else {
                SpacePolicy::SuggestSkip
            };
        }

        node.children.push(child_node);
    }

    node.sticky = result.sticky;
    if node.position.is_none() {
        node.position = node.children.iter().find_map(|child| child.position);
    }
    result.node = Some(node);
    result
}

#[cfg(test)]
mod test {
    use crate::Grammar;

    #[test]
    fn children_run_back_to_back_over_one_stream() {
        let grammar: Grammar = "pair = { '0'-'9' } \";\"".parse().unwrap();
        let result = grammar.eval_rule("pair", "42;");
        assert_eq!(result.node.unwrap().text(), "42 ;");
        assert!(result.chars_unused.is_empty());
    }

    #[test]
    fn sticky_children_forbid_skipping_before_the_next() {
        let grammar: Grammar = "hex = '0x' '0'-'9'".parse().unwrap();
        assert!(grammar.eval_rule("hex", "0x5").node.is_some());
        // the chars terminal is sticky, so the digit may not skip the gap
        assert!(grammar.eval_rule("hex", "0x 5").node.is_none());
    }

    #[test]
    fn token_children_allow_skipping_before_the_next() {
        let grammar: Grammar = "kv = \"key\" \"value\"".parse().unwrap();
        let result = grammar.eval_rule("kv", "key   value");
        assert_eq!(result.node.unwrap().text(), "key value");
    }

    #[test]
    fn empty_option_leaves_the_policy_alone() {
        // after the sticky '0x' the policy says keep; the empty option
        // must not reset it to skip, so the digit still may not jump the
        // gap
        let grammar: Grammar = "hex = '0x' [ '_' ] '0'-'9'".parse().unwrap();
        assert!(grammar.eval_rule("hex", "0x7").node.is_some());
        assert!(grammar.eval_rule("hex", "0x_7").node.is_some());
        assert!(grammar.eval_rule("hex", "0x 7").node.is_none());
    }

    #[test]
    fn mismatch_returns_everything_and_names_the_rule() {
        let grammar: Grammar = "pair = 'a' 'b'".parse().unwrap();
        let result = grammar.eval_rule("pair", "ax");
        assert!(result.node.is_none());
        assert_eq!(result.chars_read, result.chars_unused);
        let error = result.error.unwrap();
        assert!(error.message().starts_with("pair: "), "{}", error.message());
    }
}
