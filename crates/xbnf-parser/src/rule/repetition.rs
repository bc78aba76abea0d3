use crate::error::EvalError;
use crate::grammar::Grammar;
use crate::node::Node;
use crate::node::RuleType;
use crate::rule::EvalResult;
use crate::rule::Rule;
use crate::rule::SpacePolicy;
use crate::stream::CharStream;
use crate::stream::PrependStream;

/// Repeats the inner rule, replaying unused codepoints between
/// iterations. Stops at end of input, at `max` matches (`max == 0` means
/// unbounded), on an inner mismatch, or when an iteration matches
/// without consuming anything, which would otherwise never terminate.
/// Fewer than `min` matches fails the whole rule and returns every read.
pub(crate) fn eval(
    rule: &Rule,
    inner: &Rule,
    min: u32,
    max: u32,
    grammar: &Grammar,
    cs: &mut dyn CharStream,
    spaces: SpacePolicy,
) -> EvalResult {
    let mut result = EvalResult::sticky();
    let mut node = Node::new(RuleType::Repetition, &rule.name);
    node.virtual_ = rule.virtual_;
    node.non_data = rule.non_data;

    let mut nodes: Vec<Node> = Vec::new();
    loop {
        let mut replay = PrependStream::new(&mut *cs, result.chars_unused.clone());
        if replay.peek().is_none() {
            break;
        }
        let child = inner.eval(grammar, &mut replay, spaces);
        let child_used = child.count_chars_used();
        result.absorb(&child);

        let child_node = match child.node {
            Some(child_node) => child_node,
            None => {
                result.error = child.error;
                result.err_idx = cs.cursor();
                break;
            }
        };

        if node.position.is_none() {
            node.position = child_node.position;
        }
        nodes.push(child_node);
        if max > 0 && nodes.len() == max as usize {
            break;
        }
        if child_used == 0 {
            // a zero-width match would repeat forever
            break;
        }
    }

    if nodes.len() < min as usize {
        result.chars_unused = result.chars_read.clone();
        if result.error.is_none() {
            result.error = Some(EvalError::new(
                format!("{}: {} less than minimal {}", rule.desc(), nodes.len(), min),
                cs.cursor(),
            ));
            result.err_idx = cs.cursor();
        }
        return result;
    }

    node.sticky = result.sticky;
    node.children = nodes;
    result.node = Some(node);
    result
}

#[cfg(test)]
mod test {
    use crate::Grammar;

    #[test]
    fn unbounded_repetition_stops_at_the_first_mismatch() {
        let grammar: Grammar = "digits = { '0'-'9' }".parse().unwrap();
        let result = grammar.eval_rule("digits", "123x");
        let node = result.node.unwrap();
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.text(), "123");
    }

    #[test]
    fn min_bound_underflow_fails_and_returns_all_reads() {
        let grammar: Grammar = "hex = { digit_hex }<2,>\ndigit_hex = '0'-'9' | 'A'-'F'"
            .parse()
            .unwrap();
        assert_eq!(grammar.eval_rule("hex", "FF0").node.unwrap().text(), "FF0");

        let result = grammar.eval_rule("hex", "F");
        assert!(result.node.is_none());
        assert_eq!(result.chars_read, result.chars_unused);
        assert!(result
            .error
            .unwrap()
            .message()
            .contains("less than minimal 2"));
    }

    #[test]
    fn max_bound_stops_consuming() {
        let grammar: Grammar = "two = { '0'-'9' }<0,2>".parse().unwrap();
        let result = grammar.eval_rule("two", "123");
        assert_eq!(result.count_chars_used(), 2);
        assert_eq!(result.node.unwrap().text(), "12");
    }

    #[test]
    fn zero_width_matches_terminate() {
        // the option matches the empty string forever; one iteration is
        // kept and the loop must stop
        let grammar: Grammar = "opts = { [ 'x' ] } 'y'".parse().unwrap();
        let result = grammar.eval_rule("opts", "y");
        assert!(result.node.is_some(), "must terminate and match");
    }

    #[test]
    fn empty_input_yields_an_empty_repetition() {
        let grammar: Grammar = "digits = { '0'-'9' }".parse().unwrap();
        let result = grammar.eval_rule("digits", "");
        let node = result.node.expect("zero matches satisfy min 0");
        assert!(node.children.is_empty());
    }
}
