use crate::error::EvalError;
use crate::grammar::Grammar;
use crate::rule::EvalResult;
use crate::rule::Rule;
use crate::rule::SpacePolicy;
use crate::stream::CharStream;

/// Resolves the referenced rule at evaluation time, so definitions may
/// reference rules declared later. Annotations on the reference site
/// toggle (XOR) the produced node's flags: referencing a virtual rule
/// through `~ref` yields a non-virtual node.
pub(crate) fn eval(
    rule: &Rule,
    target: &str,
    grammar: &Grammar,
    cs: &mut dyn CharStream,
    spaces: SpacePolicy,
) -> EvalResult {
    let record = match grammar.record(target) {
        Some(record) => record,
        None => {
            return EvalResult {
                error: Some(EvalError::new(
                    format!("rule '{target}' not defined"),
                    cs.cursor(),
                )),
                err_idx: cs.cursor(),
                ..EvalResult::default()
            };
        }
    };
    let mut result = record.rule().eval(grammar, cs, spaces);
    if let Some(node) = result.node.as_mut() {
        if rule.virtual_ {
            node.virtual_ = !node.virtual_;
        }
        if rule.non_data {
            node.non_data = !node.non_data;
        }
    }
    result
}

#[cfg(test)]
mod test {
    use crate::stream::StringStream;
    use crate::Grammar;
    use crate::SpacePolicy;

    #[test]
    fn forward_references_resolve_at_eval_time() {
        let grammar: Grammar = "word = letter { letter }\nletter = 'a'-'z'"
            .parse()
            .unwrap();
        let result = grammar.eval_rule("word", "abc");
        assert_eq!(result.node.unwrap().text(), "abc");
    }

    #[test]
    fn missing_target_is_a_mismatch_not_a_panic() {
        let mut grammar = Grammar::new();
        grammar.add_rule("top = ghost").unwrap();
        let rule = grammar.rule("top").unwrap().clone();
        let mut cs = StringStream::new("anything");
        let result = rule.eval(&grammar, &mut cs, SpacePolicy::SuggestSkip);
        assert!(result.node.is_none());
        assert_eq!(
            result.error.unwrap().message(),
            "rule 'ghost' not defined"
        );
    }

    #[test]
    fn annotations_on_the_reference_site_toggle_flags() {
        let grammar: Grammar = unindent::unindent(
            "
            ws    = ~{ ' ' }
            visible = ~ws 'a'
            ",
        )
        .parse()
        .unwrap();
        // ws is virtual; referencing it with ~ makes the node plain again
        let result = grammar.eval_rule("visible", "  a");
        let node = result.node.unwrap();
        let ws_node = &node.children[0];
        assert!(!ws_node.virtual_, "double negation yields a data node");
    }
}
