use crate::error::EvalError;
use crate::grammar::Grammar;
use crate::node::Node;
use crate::node::RuleType;
use crate::rule::most_greedy;
use crate::rule::replay_after;
use crate::rule::EvalResult;
use crate::rule::Rule;
use crate::rule::SpacePolicy;
use crate::stream::CharStream;
use crate::stream::PrependStream;

pub(crate) struct BlockParts<'a> {
    pub open: &'a Rule,
    pub escape: Option<&'a Rule>,
    pub excludes: &'a [Rule],
    pub close: &'a Rule,
    pub virtual_close: bool,
}

/// Matches an open/content/close envelope around free-form text.
///
/// After the open rule, the loop gives the escape rule first refusal
/// (an escape escaping an escape is swallowed whole), then the exclude
/// rules (a hit outside an escape kills the block), then the close rule,
/// and otherwise moves one codepoint into the content. The produced node
/// has children open, content (a synthetic sticky Chars node) and close;
/// with a virtual close the close chars are handed back to the stream
/// instead.
pub(crate) fn eval(
    rule: &Rule,
    parts: BlockParts<'_>,
    grammar: &Grammar,
    cs: &mut dyn CharStream,
    spaces: SpacePolicy,
) -> EvalResult {
    let mut result = EvalResult::default();
    let mut node = Node::new(RuleType::Block, &rule.name);
    node.virtual_ = rule.virtual_;
    node.non_data = rule.non_data;
    node.sticky = false; // a block of text never glues to its neighbours

    let mut open = parts.open.eval(grammar, cs, spaces);
    let open_node = match open.node.take() {
        Some(open_node) => open_node,
        None => {
            result.error = open.error;
            result.err_idx = cs.cursor();
            result.chars_read = open.chars_read;
            result.chars_unused = open.chars_unused;
            return result;
        }
    };
    let open_used: Vec<char> = open.chars_used().to_vec();
    // codepoints read but not yet owned by anyone, in stream order
    let mut pending: Vec<char> = open.chars_unused.clone();

    node.position = open_node.position;
    node.children.push(open_node);

    let mut content = Node::new(RuleType::Chars, "");
    content.sticky = true;
    {
        let mut replay = PrependStream::new(&mut *cs, pending.clone());
        content.position = replay.position();
    }

    let mut close_used: Vec<char> = Vec::new();
    let mut close_node: Option<Node> = None;
    let mut failure: Option<EvalError> = None;

    loop {
        let mut escaped = false;
        if let Some(escape) = parts.escape {
            let attempt = {
                let mut replay = PrependStream::new(&mut *cs, pending.clone());
                escape.eval(grammar, &mut replay, SpacePolicy::Keep)
            };
            if attempt.node.is_some() {
                content.chars.extend_from_slice(attempt.chars_used());
                pending = replay_after(&pending, attempt.chars_read.len(), &attempt.chars_unused);
                // an escape right after an escape is literal content
                let second = {
                    let mut replay = PrependStream::new(&mut *cs, pending.clone());
                    escape.eval(grammar, &mut replay, SpacePolicy::Keep)
                };
                if second.node.is_some() {
                    content.chars.extend_from_slice(second.chars_used());
                    pending =
                        replay_after(&pending, second.chars_read.len(), &second.chars_unused);
                    continue;
                }
                pending = replay_after(&pending, second.chars_read.len(), &second.chars_read);
                escaped = true;
            } else {
                pending = replay_after(&pending, attempt.chars_read.len(), &attempt.chars_read);
            }
        }

        if !parts.excludes.is_empty() {
            let attempt = {
                let mut replay = PrependStream::new(&mut *cs, pending.clone());
                most_greedy(grammar, &mut replay, SpacePolicy::Keep, parts.excludes)
            };
            if attempt.node.is_some() {
                if escaped {
                    content.chars.extend_from_slice(attempt.chars_used());
                    pending =
                        replay_after(&pending, attempt.chars_read.len(), &attempt.chars_unused);
                    continue;
                }
                let offending: String = attempt.chars_used().iter().collect();
                result.error = Some(EvalError::new(
                    format!("text `{offending}` is not allowed in text block"),
                    cs.cursor(),
                ));
                result.err_idx = cs.cursor();
                result.chars_read = open_used.clone();
                result.chars_read.extend_from_slice(&content.chars);
                result.chars_read.extend(replay_after(
                    &pending,
                    attempt.chars_read.len(),
                    &attempt.chars_read,
                ));
                result.chars_unused = result.chars_read.clone();
                return result;
            }
            pending = replay_after(&pending, attempt.chars_read.len(), &attempt.chars_read);
        }

        let attempt = {
            let mut replay = PrependStream::new(&mut *cs, pending.clone());
            parts.close.eval(grammar, &mut replay, SpacePolicy::Keep)
        };
        if attempt.node.is_some() {
            pending = replay_after(&pending, attempt.chars_read.len(), &attempt.chars_unused);
            if escaped {
                content.chars.extend_from_slice(attempt.chars_used());
                continue;
            }
            close_used = attempt.chars_used().to_vec();
            close_node = attempt.node;
            break;
        }
        pending = replay_after(&pending, attempt.chars_read.len(), &attempt.chars_read);

        match pending.first().copied().or_else(|| cs.peek()) {
            None => {
                failure = Some(EvalError::new(
                    format!("missing {} at EOF", parts.close.desc()),
                    cs.cursor(),
                ));
                break;
            }
            Some(_) => {
                let ch = if pending.is_empty() {
                    cs.next().unwrap()
                } else {
                    pending.remove(0)
                };
                content.chars.push(ch);
            }
        }
    }

    result.chars_read = open_used;
    result.chars_read.extend_from_slice(&content.chars);
    result.chars_read.extend_from_slice(&close_used);
    result.chars_read.extend_from_slice(&pending);

    if let Some(error) = failure {
        result.err_idx = cs.cursor();
        result.error = Some(error);
        result.chars_unused = result.chars_read.clone();
        return result;
    }

    node.children.push(content);
    if parts.virtual_close {
        // the close match is evidence only; its chars go back out
        let mut unused = close_used;
        unused.extend_from_slice(&pending);
        result.chars_unused = unused;
    } else {
        node.children.push(close_node.expect("close matched"));
        result.chars_unused = pending;
    }
    result.node = Some(node);
    result
}

#[cfg(test)]
mod test {
    use crate::Grammar;
    use unindent::unindent;

    fn grammar() -> Grammar {
        unindent(
            r#"
            comment   = <'/*' '*/'>
            string_dq = <'"' '\\' ^NL '"'>
            key       = < "" '\\' ^NL ('='|':') >
            baretext  = < "" ',' !>
            NL        = \u000A

            "#,
        )
        .parse()
        .unwrap()
    }

    #[test]
    fn block_spans_until_its_close() {
        let result = grammar().eval_rule("comment", "  /* the block \ncomment   */  ");
        let node = result.node.expect("comment matches");
        assert_eq!(node.text(), "/* the block \ncomment   */");
        assert_eq!(node.children.len(), 3);
        // surrounding spaces: the leading run was read for the open rule,
        // the trailing one was never touched
        assert_eq!(result.chars_unused, Vec::<char>::new());
    }

    #[test]
    fn content_node_is_a_sticky_leaf_with_the_exact_text() {
        let result = grammar().eval_rule("comment", "/*abc*/");
        let node = result.node.unwrap();
        let content = &node.children[1];
        assert!(content.sticky);
        assert_eq!(content.chars.iter().collect::<String>(), "abc");
    }

    #[test]
    fn escape_keeps_the_close_in_the_content() {
        let result = grammar().eval_rule("string_dq", r#" " this \" escape " "#);
        let node = result.node.expect("escaped quote stays inside");
        assert_eq!(node.text(), r#"" this \" escape ""#);
    }

    #[test]
    fn double_escape_is_literal_and_closes_normally() {
        let result = grammar().eval_rule("string_dq", r#" " this \\" escape "#);
        let node = result.node.expect("double escape closes the string");
        assert_eq!(node.text(), r#"" this \\""#);
    }

    #[test]
    fn exclude_kills_the_block_outside_an_escape() {
        let result = grammar().eval_rule("string_dq", "\"no \n newline\"");
        assert!(result.node.is_none());
        let message = result.error.unwrap().message().to_string();
        assert!(message.contains("not allowed in text block"), "{message}");
    }

    #[test]
    fn escaped_exclude_is_swallowed() {
        let result = grammar().eval_rule("key", " this \\= key = that value ");
        let node = result.node.expect("escaped = stays in the key");
        assert_eq!(node.text(), "this \\= key =");
    }

    #[test]
    fn unterminated_block_reports_the_missing_close() {
        let result = grammar().eval_rule("comment", "/* never ends");
        assert!(result.node.is_none());
        let message = result.error.unwrap().message().to_string();
        assert!(message.contains("missing"), "{message}");
        assert_eq!(result.chars_read, result.chars_unused);
    }

    #[test]
    fn virtual_close_returns_the_close_chars() {
        let result = grammar().eval_rule("baretext", "value,rest");
        let node = result.node.expect("baretext matches");
        // two children only: open and content
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.text(), "value");
        // the comma is evidence, not content: it goes back to the stream
        assert_eq!(result.chars_unused, vec![',']);
    }
}
