use crate::error::EvalError;
use crate::node::Node;
use crate::node::RuleType;
use crate::rule::EvalResult;
use crate::rule::Rule;
use crate::rule::SpacePolicy;
use crate::stream::CharStream;

/// The built-in `EOF` rule: matches end of input, skipping leading
/// whitespace when suggested. Its node is always virtual and non-data.
pub(crate) fn eval(rule: &Rule, cs: &mut dyn CharStream, spaces: SpacePolicy) -> EvalResult {
    let mut result = EvalResult::sticky();
    if spaces == SpacePolicy::SuggestSkip {
        result.chars_read = cs.skip_spaces();
    }
    if cs.peek().is_none() {
        let mut node = Node::new(RuleType::Eof, "EOF");
        node.virtual_ = rule.virtual_;
        node.non_data = rule.non_data;
        node.sticky = true;
        node.position = cs.position();
        result.node = Some(node);
    } else {
        result.chars_unused = result.chars_read.clone();
        result.error = Some(EvalError::new("missing EOF", cs.cursor()));
        result.err_idx = cs.cursor();
    }
    result
}

#[cfg(test)]
mod test {
    use crate::Grammar;

    #[test]
    fn eof_matches_trailing_whitespace_then_end() {
        // "a" is a token, so the policy after it suggests skipping and
        // EOF eats the trailing run
        let grammar: Grammar = "line = \"a\" EOF".parse().unwrap();
        let result = grammar.eval_rule("line", "a   ");
        let node = result.node.expect("whitespace before EOF is skipped");
        assert_eq!(node.text(), "a");
        let eof = &node.children[1];
        assert!(eof.virtual_ && eof.non_data);
        assert_eq!(eof.position, None);
    }

    #[test]
    fn eof_misses_when_input_remains() {
        let grammar: Grammar = "line = \"a\" EOF".parse().unwrap();
        let result = grammar.eval_rule("line", "ab");
        assert!(result.node.is_none());
        assert!(result.error.unwrap().message().contains("missing EOF"));
    }
}
