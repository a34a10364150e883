use crate::source::Span;
use crate::stack::ensure_sufficient_stack;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate, // -
    Not,    // !
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Negate => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
        };
        write!(f, "{}", symbol)
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "&&"),
            LogicalOp::Or => write!(f, "||"),
        }
    }
}

/// A named function as written in the source.
///
/// Held behind an `Rc` in the tree so every closure created from it shares the
/// same immutable body.
#[derive(Debug, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span, // The source span it covers
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    NumberLiteral(f64),
    StringLiteral(String),
    BooleanLiteral(bool),
    NilLiteral,
    Identifier(String),
    Assign {
        name: String,
        value: Box<Node>,
    },
    Let {
        name: String,
        value: Box<Node>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    FunctionDef(Rc<FunctionDecl>),
    Block(Vec<Node>),
    If {
        condition: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Option<Box<Node>>,
    },
    /// `increment` is only set by `for` desugaring. It runs after every
    /// iteration that ends normally or through `continue`.
    While {
        condition: Box<Node>,
        body: Box<Node>,
        increment: Option<Box<Node>>,
    },
    Return(Option<Box<Node>>),
    Break,
    Continue,
    Program(Vec<Node>),
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Node { kind, span }
    }

    /// True for nodes that produce a value when used as a statement.
    pub fn is_expression(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::NumberLiteral(_)
                | NodeKind::StringLiteral(_)
                | NodeKind::BooleanLiteral(_)
                | NodeKind::NilLiteral
                | NodeKind::Identifier(_)
                | NodeKind::Assign { .. }
                | NodeKind::Unary { .. }
                | NodeKind::Binary { .. }
                | NodeKind::Logical { .. }
                | NodeKind::Call { .. }
        )
    }

    /// Takes the kind out of the node, leaving `NilLiteral` behind.
    pub fn into_kind(mut self) -> NodeKind {
        std::mem::replace(&mut self.kind, NodeKind::NilLiteral)
    }
}

// Moves the direct children of `kind` onto `pending`.
fn detach_children(kind: NodeKind, pending: &mut Vec<Node>) {
    match kind {
        NodeKind::Assign { value, .. } | NodeKind::Let { value, .. } => pending.push(*value),
        NodeKind::Unary { operand, .. } => pending.push(*operand),
        NodeKind::Binary { left, right, .. } | NodeKind::Logical { left, right, .. } => {
            pending.push(*left);
            pending.push(*right);
        }
        NodeKind::Call { callee, args } => {
            pending.push(*callee);
            pending.extend(args);
        }
        // A body still shared with a closure is freed by its last owner.
        NodeKind::FunctionDef(decl) => {
            if let Ok(decl) = Rc::try_unwrap(decl) {
                pending.extend(decl.body);
            }
        }
        NodeKind::Block(statements) | NodeKind::Program(statements) => pending.extend(statements),
        NodeKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            pending.push(*condition);
            pending.push(*then_branch);
            pending.extend(else_branch.map(|node| *node));
        }
        NodeKind::While {
            condition,
            body,
            increment,
        } => {
            pending.push(*condition);
            pending.push(*body);
            pending.extend(increment.map(|node| *node));
        }
        NodeKind::Return(value) => pending.extend(value.map(|node| *node)),
        NodeKind::NumberLiteral(_)
        | NodeKind::StringLiteral(_)
        | NodeKind::BooleanLiteral(_)
        | NodeKind::NilLiteral
        | NodeKind::Identifier(_)
        | NodeKind::Break
        | NodeKind::Continue => {}
    }
}

// Frees the tree with a worklist so deep nesting cannot exhaust the stack.
impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        detach_children(
            std::mem::replace(&mut self.kind, NodeKind::NilLiteral),
            &mut pending,
        );
        while let Some(node) = pending.pop() {
            detach_children(node.into_kind(), &mut pending);
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    for node in nodes {
        write!(f, " {}", node)?;
    }
    Ok(())
}

// S-expression rendering, handy for debugging and for asserting tree shape.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ensure_sufficient_stack(|| self.write_sexpr(f))
    }
}

impl Node {
    fn write_sexpr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::NumberLiteral(n) => write!(f, "{}", n),
            NodeKind::StringLiteral(s) => write!(f, "{:?}", s),
            NodeKind::BooleanLiteral(b) => write!(f, "{}", b),
            NodeKind::NilLiteral => write!(f, "nil"),
            NodeKind::Identifier(name) => write!(f, "{}", name),
            NodeKind::Assign { name, value } => write!(f, "(= {} {})", name, value),
            NodeKind::Let { name, value } => write!(f, "(let {} {})", name, value),
            NodeKind::Unary { op, operand } => write!(f, "({} {})", op, operand),
            NodeKind::Binary { op, left, right } => write!(f, "({} {} {})", op, left, right),
            NodeKind::Logical { op, left, right } => write!(f, "({} {} {})", op, left, right),
            NodeKind::Call { callee, args } => {
                write!(f, "(call {}", callee)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            NodeKind::FunctionDef(decl) => {
                write!(f, "(fn {} ({})", decl.name, decl.params.join(" "))?;
                write_list(f, &decl.body)?;
                write!(f, ")")
            }
            NodeKind::Block(statements) => {
                write!(f, "(block")?;
                write_list(f, statements)?;
                write!(f, ")")
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                write!(f, "(if {} {}", condition, then_branch)?;
                if let Some(else_branch) = else_branch {
                    write!(f, " {}", else_branch)?;
                }
                write!(f, ")")
            }
            NodeKind::While {
                condition,
                body,
                increment,
            } => {
                write!(f, "(while {} {}", condition, body)?;
                if let Some(increment) = increment {
                    write!(f, " {}", increment)?;
                }
                write!(f, ")")
            }
            NodeKind::Return(Some(value)) => write!(f, "(return {})", value),
            NodeKind::Return(None) => write!(f, "(return)"),
            NodeKind::Break => write!(f, "(break)"),
            NodeKind::Continue => write!(f, "(continue)"),
            NodeKind::Program(statements) => {
                write!(f, "(program")?;
                write_list(f, statements)?;
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Node {
        Node::new(NodeKind::NumberLiteral(n), Span::default())
    }

    #[test]
    fn test_into_kind() {
        assert_eq!(num(1.0).into_kind(), NodeKind::NumberLiteral(1.0));
    }

    #[test]
    fn test_drop_deep_operator_chain() {
        let mut node = num(0.0);
        for _ in 0..300_000 {
            node = Node::new(
                NodeKind::Binary {
                    op: BinaryOp::Add,
                    left: Box::new(node),
                    right: Box::new(num(1.0)),
                },
                Span::default(),
            );
        }
        drop(node);
    }

    #[test]
    fn test_display_deep_unary() {
        let depth = 50_000;
        let mut node = num(1.0);
        for _ in 0..depth {
            node = Node::new(
                NodeKind::Unary {
                    op: UnaryOp::Negate,
                    operand: Box::new(node),
                },
                Span::default(),
            );
        }
        let rendered = node.to_string();
        assert!(rendered.starts_with("(- (- "), "{}", &rendered[..20]);
        assert_eq!(rendered.matches('(').count(), depth);
    }

    #[test]
    fn test_drop_deep_blocks_inside_function() {
        let mut node = num(1.0);
        for _ in 0..300_000 {
            node = Node::new(NodeKind::Block(vec![node]), Span::default());
        }
        let decl = FunctionDecl {
            name: "deep".to_string(),
            params: vec![],
            body: vec![node],
            span: Span::default(),
        };
        let def = Node::new(NodeKind::FunctionDef(Rc::new(decl)), Span::default());
        drop(Node::new(NodeKind::Program(vec![def]), Span::default()));
    }
}
