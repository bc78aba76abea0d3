use std::fmt;

use crate::stream::is_whitespace;
use crate::stream::Position;

/// The rule variant that produced a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    Eof,
    Char,
    Chars,
    String,
    Range,
    Group,
    Option,
    Block,
    Reference,
    Repetition,
    Choice,
    Concatenate,
    /// Synthetic root produced by [`Grammar::eval_embed`].
    ///
    /// [`Grammar::eval_embed`]: crate::Grammar::eval_embed
    Embed,
    /// Free-text segment inside an Embed root.
    Text,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleType::Eof => "EOF",
            RuleType::Char => "char",
            RuleType::Chars => "chars",
            RuleType::String => "string",
            RuleType::Range => "range",
            RuleType::Group => "group",
            RuleType::Option => "option",
            RuleType::Block => "block",
            RuleType::Reference => "reference",
            RuleType::Repetition => "repetition",
            RuleType::Choice => "choice",
            RuleType::Concatenate => "concatenate",
            RuleType::Embed => "embed",
            RuleType::Text => "text",
        };
        f.write_str(name)
    }
}

/// Options for the diagnostic tree rendering.
#[derive(Debug, Clone, Copy)]
pub struct TreeConfig {
    /// Print `/type` after each node's rule name.
    pub rule_type: bool,
    /// Print reconstructed text on interior nodes too, not just leaves.
    pub non_leaf_text: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            rule_type: true,
            non_leaf_text: false,
        }
    }
}

/// One node of the parse tree.
///
/// A node is a leaf when `children` is empty; its text then comes from
/// `chars`. Interior nodes reconstruct their text from their children
/// (see [`Node::text`]).
#[derive(Clone, PartialEq)]
pub struct Node {
    pub rule_type: RuleType,
    pub rule_name: String,
    pub position: Option<Position>,
    /// Joins neighbouring nodes without an injected space.
    pub sticky: bool,
    /// Marked for removal at the NoVirtual and DataOnly levels.
    pub virtual_: bool,
    /// Structural only; removed at the DataOnly level.
    pub non_data: bool,
    pub chars: Vec<char>,
    pub children: Vec<Node>,
}

impl Node {
    pub(crate) fn new(rule_type: RuleType, rule_name: &str) -> Self {
        Node {
            rule_type,
            rule_name: rule_name.to_string(),
            position: None,
            sticky: false,
            virtual_: false,
            non_data: false,
            chars: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Reconstructed text. Between adjacent children a single space is
    /// injected iff the text so far ends in a non-whitespace, the child's
    /// text starts with one, and the two siblings are not both sticky.
    /// Block nodes never separate their open/content/close children.
    pub fn text(&self) -> String {
        if !self.chars.is_empty() {
            return self.chars.iter().collect();
        }
        let mut text = String::new();
        let mut prev_sticky = false;
        let mut first = true;
        for child in &self.children {
            let child_text = child.text();
            if self.rule_type != RuleType::Block
                && !first
                && text.chars().next_back().is_some_and(|ch| !is_whitespace(ch))
                && child_text.chars().next().is_some_and(|ch| !is_whitespace(ch))
                && (!prev_sticky || !child.sticky)
            {
                text.push(' ');
            }
            text.push_str(&child_text);
            prev_sticky = child.sticky;
            first = false;
        }
        text
    }

    /// Total node count of the tree rooted here, itself included.
    pub fn count_nodes(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(Node::count_nodes)
            .sum::<usize>()
    }

    /// Leaf count of the tree rooted here.
    pub fn count_tokens(&self) -> usize {
        if self.children.is_empty() {
            return 1;
        }
        self.children.iter().map(Node::count_tokens).sum()
    }

    pub fn count_sticky_nodes(&self) -> usize {
        let own = usize::from(self.sticky);
        own + self
            .children
            .iter()
            .map(Node::count_sticky_nodes)
            .sum::<usize>()
    }

    /// Collapses runs of adjacent sticky children into single leaves.
    /// The first simplification step; effectively tokenization.
    ///
    /// Block nodes keep their open/content/close children separate: each
    /// is merged internally and stripped of its sticky flag instead.
    pub fn merge_sticky_nodes(&mut self) {
        if self.children.is_empty() {
            return;
        }
        if self.rule_type == RuleType::Block {
            for child in &mut self.children {
                child.merge_sticky_nodes();
                child.sticky = false;
            }
            self.sticky = false;
            return;
        }
        self.children = merge_sticky_list(std::mem::take(&mut self.children));
    }

    /// Drops virtual nodes in the tree rooted here.
    pub fn remove_virtual_nodes(&mut self) {
        if self.children.is_empty() {
            return;
        }
        self.children.retain(|child| !child.virtual_);
        for child in &mut self.children {
            child.remove_virtual_nodes();
        }
    }

    /// Drops non-data nodes in the tree rooted here.
    pub fn remove_non_data_nodes(&mut self) {
        if self.children.is_empty() {
            return;
        }
        self.children.retain(|child| !child.non_data);
        for child in &mut self.children {
            child.remove_non_data_nodes();
        }
    }

    /// Collapses anonymous wrappers: a single anonymous child donates its
    /// content to this node, anonymous interior children are spliced into
    /// this node's child list, empty anonymous children are dropped.
    pub fn remove_redundant_nodes(&mut self) {
        if self.children.is_empty() {
            return;
        }

        for child in &mut self.children {
            child.remove_redundant_nodes();
        }

        if self.children.len() == 1 && self.children[0].rule_name.is_empty() {
            let only = self.children.remove(0);
            if !only.chars.is_empty() {
                self.chars = only.chars;
            } else {
                self.children = only.children;
            }
        }

        let mut children = Vec::with_capacity(self.children.len());
        for child in self.children.drain(..) {
            if child.rule_name.is_empty() && child.text().is_empty() {
                continue;
            }
            if child.rule_name.is_empty() && !child.children.is_empty() {
                children.extend(child.children);
            } else {
                children.push(child);
            }
        }
        self.children = children;

        if self.children.len() == 1
            && self.children[0].rule_name.is_empty()
            && self.children[0].children.is_empty()
        {
            self.chars = self.children.remove(0).chars;
        }
    }

    fn header(&self, config: &TreeConfig) -> String {
        let mut out = self.rule_name.clone();
        if config.rule_type {
            out.push('/');
            out.push_str(&self.rule_type.to_string());
        }
        if self.virtual_ {
            out.push('~');
        }
        if self.non_data {
            out.push('#');
        }
        if self.sticky {
            out.push('+');
        }
        out
    }

    /// Box-drawing rendering of the tree rooted here. Diagnostic only.
    pub fn tree_string(&self, config: &TreeConfig) -> String {
        let mut out = String::new();
        if self.children.is_empty() || config.non_leaf_text {
            out.push_str(&format!("{}: >{}<", self.header(config), self.text()));
        } else {
            out.push_str(&self.header(config));
        }
        if let Some((last, rest)) = self.children.split_last() {
            for child in rest {
                let rendered = child.tree_string(config).replace('\n', "\n│  ");
                out.push_str(&format!("\n├──{rendered}"));
            }
            let rendered = last.tree_string(config).replace('\n', "\n   ");
            out.push_str(&format!("\n└──{rendered}"));
        }
        out
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tree_string(&TreeConfig::default()))
    }
}

/// Merges runs of sticky siblings in a node list. Each finished run
/// collapses into its first node, which becomes a leaf holding the run's
/// concatenated text and loses its sticky flag.
pub(crate) fn merge_sticky_list(nodes: Vec<Node>) -> Vec<Node> {
    let mut children: Vec<Node> = Vec::with_capacity(nodes.len());
    let mut run_open = false;
    for mut node in nodes {
        if node.sticky {
            let text: Vec<char> = node.text().chars().collect();
            if run_open {
                let prev = children.last_mut().unwrap();
                prev.chars.extend(text);
                continue;
            }
            node.chars = text;
            node.children.clear();
            children.push(node);
            run_open = true;
            continue;
        }
        if run_open {
            children.last_mut().unwrap().sticky = false;
            run_open = false;
        }
        node.merge_sticky_nodes();
        children.push(node);
    }
    if run_open {
        children.last_mut().unwrap().sticky = false;
    }
    children
}

#[cfg(test)]
mod test {
    use super::*;

    fn leaf(name: &str, text: &str, sticky: bool) -> Node {
        Node {
            sticky,
            chars: text.chars().collect(),
            ..Node::new(RuleType::Chars, name)
        }
    }

    fn parent(rule_type: RuleType, name: &str, children: Vec<Node>) -> Node {
        Node {
            children,
            ..Node::new(rule_type, name)
        }
    }

    #[test]
    fn text_injects_a_space_between_loose_neighbours() {
        let node = parent(
            RuleType::Concatenate,
            "pair",
            vec![leaf("", "key", false), leaf("", "value", false)],
        );
        assert_eq!(node.text(), "key value");
    }

    #[test]
    fn text_keeps_sticky_neighbours_joined() {
        let node = parent(
            RuleType::Concatenate,
            "word",
            vec![leaf("", "ab", true), leaf("", "cd", true)],
        );
        assert_eq!(node.text(), "abcd");
    }

    #[test]
    fn text_never_doubles_existing_whitespace() {
        let node = parent(
            RuleType::Concatenate,
            "",
            vec![leaf("", "a ", false), leaf("", "b", false)],
        );
        assert_eq!(node.text(), "a b");
        let node = parent(
            RuleType::Concatenate,
            "",
            vec![leaf("", "a", false), leaf("", " b", false)],
        );
        assert_eq!(node.text(), "a b");
    }

    #[test]
    fn block_text_gets_no_injected_spaces() {
        let node = parent(
            RuleType::Block,
            "comment",
            vec![
                leaf("", "/*", false),
                leaf("", "body", false),
                leaf("", "*/", false),
            ],
        );
        assert_eq!(node.text(), "/*body*/");
    }

    #[test]
    fn merge_collapses_sticky_runs_and_clears_the_flag() {
        let mut node = parent(
            RuleType::Concatenate,
            "n",
            vec![
                leaf("", "1", true),
                leaf("", "2", true),
                leaf("", "+", false),
                leaf("", "3", true),
            ],
        );
        node.merge_sticky_nodes();
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.children[0].text(), "12");
        assert_eq!(node.children[2].text(), "3");
        assert_eq!(node.count_sticky_nodes(), 0);
    }

    #[test]
    fn merge_sticky_is_idempotent() {
        let mut node = parent(
            RuleType::Concatenate,
            "n",
            vec![leaf("", "a", true), leaf("", "b", true), leaf("", "c", false)],
        );
        node.merge_sticky_nodes();
        let once = node.clone();
        node.merge_sticky_nodes();
        assert_eq!(node, once);
    }

    #[test]
    fn merge_leaves_block_children_separate() {
        let mut node = parent(
            RuleType::Block,
            "str",
            vec![
                leaf("", "\"", true),
                leaf("", "text", true),
                leaf("", "\"", true),
            ],
        );
        node.merge_sticky_nodes();
        assert_eq!(node.children.len(), 3);
        assert_eq!(node.count_sticky_nodes(), 0);
    }

    #[test]
    fn remove_virtual_is_recursive_and_idempotent() {
        let mut node = parent(
            RuleType::Concatenate,
            "top",
            vec![
                Node {
                    virtual_: true,
                    ..leaf("ws", " ", false)
                },
                parent(
                    RuleType::Group,
                    "inner",
                    vec![Node {
                        virtual_: true,
                        ..leaf("ws", " ", false)
                    }],
                ),
            ],
        );
        node.remove_virtual_nodes();
        let once = node.clone();
        node.remove_virtual_nodes();
        assert_eq!(node, once);
        assert_eq!(node.children.len(), 1);
        assert!(node.children[0].children.is_empty());
    }

    #[test]
    fn remove_redundant_promotes_single_anonymous_children() {
        // choice wrapping an anonymous leaf: the leaf's chars move up
        let mut node = parent(RuleType::Choice, "value", vec![leaf("", "true", false)]);
        node.remove_redundant_nodes();
        assert!(node.children.is_empty());
        assert_eq!(node.text(), "true");
    }

    #[test]
    fn remove_redundant_splices_anonymous_interiors() {
        let mut node = parent(
            RuleType::Concatenate,
            "list",
            vec![
                leaf("item", "a", false),
                parent(
                    RuleType::Repetition,
                    "",
                    vec![leaf("item", "b", false), leaf("item", "c", false)],
                ),
            ],
        );
        node.remove_redundant_nodes();
        assert_eq!(node.children.len(), 3);
        assert!(node.children.iter().all(|c| c.rule_name == "item"));
        // nothing anonymous with a single anonymous child remains
        let once = node.clone();
        node.remove_redundant_nodes();
        assert_eq!(node, once);
    }

    #[test]
    fn remove_redundant_drops_empty_anonymous_children() {
        let mut node = parent(
            RuleType::Concatenate,
            "x",
            vec![leaf("", "", false), leaf("k", "v", false)],
        );
        node.remove_redundant_nodes();
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].rule_name, "k");
    }

    #[test]
    fn tree_string_marks_flags_and_nests() {
        let node = parent(
            RuleType::Concatenate,
            "kv",
            vec![
                leaf("key", "a", false),
                Node {
                    non_data: true,
                    ..leaf("", "=", false)
                },
                Node {
                    sticky: true,
                    ..leaf("value", "1", false)
                },
            ],
        );
        let rendered = node.tree_string(&TreeConfig::default());
        let expected = "\
kv/concatenate
├──key/chars: >a<
├──/chars#: >=<
└──value/chars+: >1<";
        assert_eq!(rendered, expected);
    }
}
