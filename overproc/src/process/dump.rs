//! Text rendering of a process tree, for diagnostics.

use super::Process;

/// One node of a rendered tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpNode {
    kind: String,
    bare: bool,
    attrs: Vec<String>,
    children: Vec<(String, DumpNode)>,
}

impl DumpNode {
    /// A node rendered as `kind{ ... }`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            bare: false,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// A node rendered as a single line, used for stream endpoints.
    pub fn label(text: impl Into<String>) -> Self {
        Self {
            bare: true,
            ..Self::new(text)
        }
    }

    /// Add a `key: value` attribute line.
    pub fn attr(mut self, line: impl Into<String>) -> Self {
        self.attrs.push(line.into());
        self
    }

    /// Add a named child.
    pub fn child(mut self, name: impl Into<String>, node: Self) -> Self {
        self.children.push((name.into(), node));
        self
    }
}

enum Item<'a> {
    Node(&'a DumpNode),
    Text(String),
}

/// Render `process` and everything it owns as an indented tree.
///
/// Rendering walks the tree with an explicit stack. Collecting the tree
/// through [`Process::dump_node`] still recurses once per nesting level, so
/// depth is bounded by the stack for that step.
///
/// ```text
/// Redirect{
///     proc:
///         Process{
///             cmd: ["echo", "123"]
///         }
///     stdout:
///         [File output.txt]
/// }
/// ```
pub fn dump_tree(process: &dyn Process) -> String {
    render(&process.dump_node())
}

fn render(root: &DumpNode) -> String {
    let mut lines = Vec::new();
    let mut stack = vec![(Item::Node(root), 0usize)];

    while let Some((item, depth)) = stack.pop() {
        let pad = "\t".repeat(depth);
        match item {
            Item::Text(text) => lines.push(format!("{pad}{text}")),
            Item::Node(node) if node.bare => lines.push(format!("{pad}{}", node.kind)),
            Item::Node(node) => {
                lines.push(format!("{pad}{}{{", node.kind));
                stack.push((Item::Text("}".to_string()), depth));
                for (name, child) in node.children.iter().rev() {
                    stack.push((Item::Node(child), depth + 2));
                    stack.push((Item::Text(format!("{name}:")), depth + 1));
                }
                for attr in node.attrs.iter().rev() {
                    stack.push((Item::Text(attr.clone()), depth + 1));
                }
            }
        }
    }

    lines.join("\n")
}
