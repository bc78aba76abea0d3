use std::fmt;

use crate::node::merge_sticky_list;
use crate::node::Node;
use crate::node::TreeConfig;

/// How far [`Grammar::eval`] post-processes the tree it built.
///
/// Every level beyond `Raw` finishes with a redundant-node collapse.
///
/// [`Grammar::eval`]: crate::Grammar::eval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Simplify {
    /// The tree exactly as matched.
    Raw,
    /// Adjacent sticky nodes merged.
    Basic,
    /// Basic, then virtual (`~`) nodes dropped.
    NoVirtual,
    /// NoVirtual, then non-data (`#`) nodes dropped.
    DataOnly,
}

impl Simplify {
    /// The numeric encoding used at the engine boundary: −1 Raw, 0 Basic,
    /// 1 NoVirtual, 2 DataOnly. Anything else falls back to Basic.
    pub fn from_level(level: i32) -> Self {
        match level {
            -1 => Simplify::Raw,
            1 => Simplify::NoVirtual,
            2 => Simplify::DataOnly,
            _ => Simplify::Basic,
        }
    }
}

/// The evaluator's output: the top-level nodes matched by root rules.
#[derive(Clone, PartialEq)]
pub struct Ast {
    /// Provenance label, when the grammar's caller has one.
    pub file_name: Option<String>,
    pub nodes: Vec<Node>,
}

impl Ast {
    pub(crate) fn new() -> Self {
        Ast {
            file_name: None,
            nodes: Vec::new(),
        }
    }

    /// Concatenated text of the top-level nodes.
    pub fn text(&self) -> String {
        self.nodes.iter().map(Node::text).collect()
    }

    pub fn count_nodes(&self) -> usize {
        self.nodes.iter().map(Node::count_nodes).sum()
    }

    pub fn count_tokens(&self) -> usize {
        self.nodes.iter().map(Node::count_tokens).sum()
    }

    pub fn count_sticky_nodes(&self) -> usize {
        self.nodes.iter().map(Node::count_sticky_nodes).sum()
    }

    /// Merges adjacent sticky nodes, across and inside the top-level
    /// nodes.
    pub fn merge_sticky_nodes(&mut self) {
        if self.nodes.is_empty() {
            return;
        }
        self.nodes = merge_sticky_list(std::mem::take(&mut self.nodes));
    }

    pub fn remove_virtual_nodes(&mut self) {
        self.nodes.retain(|node| !node.virtual_);
        for node in &mut self.nodes {
            node.remove_virtual_nodes();
        }
    }

    pub fn remove_non_data_nodes(&mut self) {
        self.nodes.retain(|node| !node.non_data);
        for node in &mut self.nodes {
            node.remove_non_data_nodes();
        }
    }

    /// Collapses redundant anonymous wrappers inside each retained
    /// top-level node. Non-data roots are left alone; they are either
    /// already gone or intentionally kept structural.
    pub fn remove_redundant_nodes(&mut self) {
        for node in &mut self.nodes {
            if node.non_data {
                continue;
            }
            node.remove_redundant_nodes();
        }
    }

    pub(crate) fn simplify(&mut self, level: Simplify) {
        match level {
            Simplify::Raw => return,
            Simplify::Basic => {
                self.merge_sticky_nodes();
            }
            Simplify::NoVirtual => {
                self.merge_sticky_nodes();
                self.remove_virtual_nodes();
            }
            Simplify::DataOnly => {
                self.merge_sticky_nodes();
                self.remove_virtual_nodes();
                self.remove_non_data_nodes();
            }
        }
        self.remove_redundant_nodes();
    }

    /// Box-drawing rendering of the whole tree. Diagnostic only.
    pub fn tree_string(&self, config: &TreeConfig) -> String {
        let mut out = String::from("Abstract Syntax Tree");
        out.push_str(&format!(
            "\n├─ file:{}",
            self.file_name.as_deref().unwrap_or("")
        ));
        match self.nodes.split_last() {
            None => out.push_str("\n└─ Nodes: 0"),
            Some((last, rest)) => {
                out.push_str(&format!("\n├─ Nodes: {}", self.nodes.len()));
                for node in rest {
                    let rendered = node.tree_string(config).replace('\n', "\n│   ");
                    out.push_str(&format!("\n├───{rendered}"));
                }
                let rendered = last.tree_string(config).replace('\n', "\n    ");
                out.push_str(&format!("\n└───{rendered}"));
            }
        }
        out
    }
}

impl fmt::Debug for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tree_string(&TreeConfig::default()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::RuleType;

    fn leaf(name: &str, text: &str, sticky: bool) -> Node {
        Node {
            sticky,
            chars: text.chars().collect(),
            ..Node::new(RuleType::Chars, name)
        }
    }

    #[test]
    fn from_level_maps_the_boundary_integers() {
        assert_eq!(Simplify::from_level(-1), Simplify::Raw);
        assert_eq!(Simplify::from_level(0), Simplify::Basic);
        assert_eq!(Simplify::from_level(1), Simplify::NoVirtual);
        assert_eq!(Simplify::from_level(2), Simplify::DataOnly);
        // unknown values fall back to Basic
        assert_eq!(Simplify::from_level(7), Simplify::Basic);
        assert_eq!(Simplify::from_level(-3), Simplify::Basic);
    }

    #[test]
    fn merge_spans_top_level_nodes() {
        let mut ast = Ast::new();
        ast.nodes = vec![leaf("", "12", true), leaf("", "34", true), leaf("", "x", false)];
        ast.merge_sticky_nodes();
        assert_eq!(ast.nodes.len(), 2);
        assert_eq!(ast.nodes[0].text(), "1234");
        assert_eq!(ast.count_sticky_nodes(), 0);
    }

    #[test]
    fn virtual_and_non_data_roots_are_dropped_at_their_levels() {
        let mut ast = Ast::new();
        ast.nodes = vec![
            Node {
                virtual_: true,
                ..leaf("ws", " ", false)
            },
            Node {
                non_data: true,
                ..leaf("comma", ",", false)
            },
            leaf("word", "hi", false),
        ];
        let mut no_virtual = ast.clone();
        no_virtual.simplify(Simplify::NoVirtual);
        assert_eq!(no_virtual.nodes.len(), 2);
        let mut data_only = ast.clone();
        data_only.simplify(Simplify::DataOnly);
        assert_eq!(data_only.nodes.len(), 1);
        assert_eq!(data_only.text(), "hi");
    }

    #[test]
    fn empty_tree_renders_its_shell() {
        let ast = Ast::new();
        assert_eq!(
            ast.tree_string(&TreeConfig::default()),
            "Abstract Syntax Tree\n├─ file:\n└─ Nodes: 0"
        );
    }
}
