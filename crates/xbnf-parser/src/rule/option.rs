use crate::grammar::Grammar;
use crate::node::Node;
use crate::node::RuleType;
use crate::rule::EvalResult;
use crate::rule::Rule;
use crate::rule::SpacePolicy;
use crate::stream::CharStream;

/// An option always produces an Option node, childless when the inner
/// rule did not match. Concatenate relies on this to tell "matched
/// nothing" apart from "matched an empty option" when threading its
/// whitespace policy.
pub(crate) fn eval(
    rule: &Rule,
    inner: &Rule,
    grammar: &Grammar,
    cs: &mut dyn CharStream,
    spaces: SpacePolicy,
) -> EvalResult {
    let mut result = inner.eval(grammar, cs, spaces);
    let mut node = Node::new(RuleType::Option, &rule.name);
    node.virtual_ = rule.virtual_;
    node.non_data = rule.non_data;
    node.sticky = result.sticky;
    if let Some(inner_node) = result.node.take() {
        node.position = inner_node.position;
        node.children.push(inner_node);
    }
    result.node = Some(node);
    result
}

#[cfg(test)]
mod test {
    use crate::Grammar;
    use crate::RuleType;

    #[test]
    fn empty_option_still_produces_a_node() {
        let grammar: Grammar = "num = [ '-' ] '0'-'9'".parse().unwrap();
        let result = grammar.eval_rule("num", "7");
        let node = result.node.unwrap();
        assert_eq!(node.children[0].rule_type, RuleType::Option);
        assert!(node.children[0].children.is_empty());
        assert_eq!(node.text(), "7");
    }

    #[test]
    fn matched_option_wraps_its_inner_node() {
        let grammar: Grammar = "num = [ '-' ] '0'-'9'".parse().unwrap();
        let result = grammar.eval_rule("num", "-7");
        let node = result.node.unwrap();
        assert_eq!(node.children[0].children.len(), 1);
        assert_eq!(node.text(), "-7");
    }

    #[test]
    fn unmatched_option_keeps_the_inner_error_for_diagnostics() {
        let grammar: Grammar = "maybe = [ '-' ]".parse().unwrap();
        let result = grammar.eval_rule("maybe", "7");
        // the node is there either way; the inner miss rides along
        assert!(result.node.is_some());
        assert!(result.error.is_some());
    }
}
