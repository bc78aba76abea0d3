use crate::grammar::Grammar;
use crate::node::Node;
use crate::node::RuleType;
use crate::rule::EvalResult;
use crate::rule::Rule;
use crate::rule::SpacePolicy;
use crate::stream::CharStream;

/// A group is transparent: it wraps the inner match in a Group node and
/// passes stickiness and position through unchanged.
pub(crate) fn eval(
    rule: &Rule,
    inner: &Rule,
    grammar: &Grammar,
    cs: &mut dyn CharStream,
    spaces: SpacePolicy,
) -> EvalResult {
    let mut result = inner.eval(grammar, cs, spaces);
    let inner_node = match result.node.take() {
        Some(node) => node,
        None => {
            result.chars_unused = result.chars_read.clone();
            return result;
        }
    };
    let mut node = Node::new(RuleType::Group, &rule.name);
    node.virtual_ = rule.virtual_;
    node.non_data = rule.non_data;
    node.sticky = result.sticky;
    node.position = inner_node.position;
    node.children.push(inner_node);
    result.node = Some(node);
    result
}
