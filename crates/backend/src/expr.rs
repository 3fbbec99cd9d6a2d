use std::collections::HashSet;

use crate::types::CType;

/// Index of a node in its function's `ExprArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub(crate) usize);

/// C-level binary operator. LLVM signedness distinctions are expressed by
/// unsigned casts inserted around the operands, not by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl CBinOp {
    fn symbol(self) -> &'static str {
        match self {
            CBinOp::Add => "+",
            CBinOp::Sub => "-",
            CBinOp::Mul => "*",
            CBinOp::Div => "/",
            CBinOp::Rem => "%",
            CBinOp::And => "&",
            CBinOp::Or => "|",
            CBinOp::Xor => "^",
            CBinOp::Shl => "<<",
            CBinOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    Name(String),
    Ptr(ExprId),
}

/// First getelementptr index: a zero index on the base pointer is elided,
/// anything else is pointer arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub enum GepFirst {
    Zero,
    Index(ExprId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GepStep {
    Array(ExprId),
    Field(String),
}

/// One node of the abstract expression tree. The tree is a DAG: a node can
/// be referenced from several positions (every use of an SSA value), so all
/// links are arena indices.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Named C variable. Declared at its first rendering within a pass.
    Value { name: String, ty: CType },
    /// Literal constant (integer, float, string, brace initializer).
    Lit { repr: String, ty: CType },
    /// Module-level variable referenced from a function body.
    Global { name: String, ty: CType },
    Ref { target: ExprId },
    Deref { target: ExprId },
    Assign { lhs: ExprId, rhs: ExprId },
    Bin {
        op: CBinOp,
        lhs: ExprId,
        rhs: ExprId,
        ty: CType,
    },
    Cmp {
        pred: &'static str,
        lhs: ExprId,
        rhs: ExprId,
    },
    Cast { ty: CType, val: ExprId },
    Call {
        target: CallTarget,
        args: Vec<ExprId>,
        ty: CType,
        is_variadic: bool,
    },
    Gep {
        base: ExprId,
        first: GepFirst,
        path: Vec<GepStep>,
        ty: CType,
    },
    /// extractvalue: member access on an aggregate rvalue.
    Field {
        base: ExprId,
        path: Vec<GepStep>,
        ty: CType,
    },
    Select {
        cond: ExprId,
        then_val: ExprId,
        else_val: ExprId,
    },
    Switch {
        cond: ExprId,
        cases: Vec<(i128, String)>,
        default: Option<String>,
    },
    /// Conditional branch, or `goto` when `cond` is `None`.
    Branch {
        cond: Option<ExprId>,
        then_label: String,
        else_label: String,
    },
    Ret { val: Option<ExprId> },
    Asm {
        template: String,
        outputs: Vec<(String, ExprId)>,
        inputs: Vec<(String, ExprId)>,
        clobbers: String,
    },
}

#[derive(Debug, Default)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn alloc(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(expr);
        id
    }

    pub fn get(&self, id: ExprId) -> &Expr {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.nodes[id.0]
    }

    /// Static type of the expression, for the binary-conversion join.
    pub fn ty_of(&self, id: ExprId) -> CType {
        match self.get(id) {
            Expr::Value { ty, .. }
            | Expr::Lit { ty, .. }
            | Expr::Global { ty, .. }
            | Expr::Bin { ty, .. }
            | Expr::Cast { ty, .. }
            | Expr::Call { ty, .. }
            | Expr::Gep { ty, .. }
            | Expr::Field { ty, .. } => ty.clone(),
            Expr::Ref { target } => CType::pointer_to(self.ty_of(*target)),
            Expr::Deref { target } => match self.ty_of(*target) {
                CType::Pointer { elem, .. } => *elem,
                CType::Array { elem, .. } => *elem,
                other => other,
            },
            Expr::Cmp { .. } => CType::Int { unsigned: false },
            Expr::Select { then_val, .. } => self.ty_of(*then_val),
            Expr::Assign { lhs, .. } => self.ty_of(*lhs),
            Expr::Switch { .. } | Expr::Branch { .. } | Expr::Ret { .. } | Expr::Asm { .. } => {
                CType::Void
            }
        }
    }

    // ===== Rendering =====

    /// Render as an expression. `declared` tracks which named values have
    /// had their declaration emitted in the current pass; the first
    /// rendering of a `Value` produces its declaration.
    pub fn render(&self, id: ExprId, declared: &mut HashSet<String>) -> String {
        match self.get(id) {
            Expr::Value { name, ty } => {
                if declared.contains(name) {
                    name.clone()
                } else {
                    declared.insert(name.clone());
                    ty.decl(name)
                }
            }
            Expr::Lit { repr, .. } => repr.clone(),
            Expr::Global { name, .. } => name.clone(),
            Expr::Ref { target } => match self.get(*target) {
                Expr::Deref { target: inner } => self.render(*inner, declared),
                _ => format!("&{}", self.render_operand(*target, declared)),
            },
            Expr::Deref { target } => match self.get(*target) {
                Expr::Ref { target: inner } => self.render(*inner, declared),
                Expr::Gep { .. } => self.render_gep_chain(*target, declared),
                _ => format!("*{}", self.render_operand(*target, declared)),
            },
            Expr::Assign { lhs, rhs } => format!(
                "{} = {}",
                self.render(*lhs, declared),
                self.render(*rhs, declared)
            ),
            Expr::Bin { op, lhs, rhs, .. } => format!(
                "{} {} {}",
                self.render_operand(*lhs, declared),
                op.symbol(),
                self.render_operand(*rhs, declared)
            ),
            Expr::Cmp { pred, lhs, rhs } => format!(
                "{} {} {}",
                self.render_operand(*lhs, declared),
                pred,
                self.render_operand(*rhs, declared)
            ),
            Expr::Cast { ty, val } => format!(
                "({}){}",
                ty.to_c_string(),
                self.render_operand(*val, declared)
            ),
            Expr::Call { target, args, .. } => {
                let callee = match target {
                    CallTarget::Name(name) => name.clone(),
                    CallTarget::Ptr(id) => self.render_operand(*id, declared),
                };
                let rendered: Vec<String> =
                    args.iter().map(|a| self.render(*a, declared)).collect();
                format!("{}({})", callee, rendered.join(", "))
            }
            Expr::Gep { .. } => format!("&{}", self.render_gep_chain(id, declared)),
            Expr::Field { base, path, .. } => {
                let mut out = self.render_operand(*base, declared);
                self.push_steps(&mut out, path, declared);
                out
            }
            Expr::Select {
                cond,
                then_val,
                else_val,
            } => format!(
                "{} ? {} : {}",
                self.render_operand(*cond, declared),
                self.render_operand(*then_val, declared),
                self.render_operand(*else_val, declared)
            ),
            Expr::Switch { .. }
            | Expr::Branch { .. }
            | Expr::Ret { .. }
            | Expr::Asm { .. } => self.render_stmt_body(id, declared),
        }
    }

    /// Render as an operand of a larger expression: composite expressions
    /// get parenthesized.
    fn render_operand(&self, id: ExprId, declared: &mut HashSet<String>) -> String {
        let needs_parens = matches!(
            self.get(id),
            Expr::Bin { .. }
                | Expr::Cmp { .. }
                | Expr::Cast { .. }
                | Expr::Select { .. }
                | Expr::Assign { .. }
        );
        let rendered = self.render(id, declared);
        if needs_parens {
            format!("({})", rendered)
        } else {
            rendered
        }
    }

    /// The lvalue chain of a gep, without the leading address-of.
    fn render_gep_chain(&self, id: ExprId, declared: &mut HashSet<String>) -> String {
        let Expr::Gep {
            base, first, path, ..
        } = self.get(id)
        else {
            return self.render(id, declared);
        };
        let mut out = match first {
            GepFirst::Zero => match self.get(*base) {
                Expr::Ref { target } => self.render(*target, declared),
                Expr::Gep { .. } => self.render_gep_chain(*base, declared),
                _ => format!("(*{})", self.render_operand(*base, declared)),
            },
            GepFirst::Index(idx) => format!(
                "{}[{}]",
                self.render_operand(*base, declared),
                self.render(*idx, declared)
            ),
        };
        self.push_steps(&mut out, path, declared);
        out
    }

    fn push_steps(&self, out: &mut String, path: &[GepStep], declared: &mut HashSet<String>) {
        for step in path {
            match step {
                GepStep::Array(idx) => {
                    out.push('[');
                    out.push_str(&self.render(*idx, declared));
                    out.push(']');
                }
                GepStep::Field(name) => {
                    out.push('.');
                    out.push_str(name);
                }
            }
        }
    }

    fn render_stmt_body(&self, id: ExprId, declared: &mut HashSet<String>) -> String {
        match self.get(id) {
            Expr::Branch {
                cond: None,
                then_label,
                ..
            } => format!("goto {};", then_label),
            Expr::Branch {
                cond: Some(cond),
                then_label,
                else_label,
            } => format!(
                "if ({}) {{ goto {}; }} else {{ goto {}; }}",
                self.render(*cond, declared),
                then_label,
                else_label
            ),
            Expr::Switch {
                cond,
                cases,
                default,
            } => {
                let mut out = format!("switch ({}) {{", self.render(*cond, declared));
                for (value, label) in cases {
                    out.push_str(&format!(" case {}: goto {};", value, label));
                }
                if let Some(label) = default {
                    out.push_str(&format!(" default: goto {};", label));
                }
                out.push_str(" }");
                out
            }
            Expr::Ret { val: None } => "return;".to_string(),
            Expr::Ret { val: Some(val) } => format!("return {};", self.render(*val, declared)),
            Expr::Asm {
                template,
                outputs,
                inputs,
                clobbers,
            } => {
                let join = |ops: &[(String, ExprId)], declared: &mut HashSet<String>| {
                    ops.iter()
                        .map(|(constraint, id)| {
                            format!("\"{}\"({})", constraint, self.render(*id, declared))
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let outs = join(outputs, declared);
                let ins = join(inputs, declared);
                let mut out = format!("asm volatile (\"{}\" : {} : {}", template, outs, ins);
                if !clobbers.is_empty() {
                    out.push_str(&format!(" : {}", clobbers));
                }
                out.push_str(");");
                out
            }
            _ => unreachable!("not a statement-only node"),
        }
    }

    /// Render as a statement (with terminating `;` where the form needs one).
    pub fn render_stmt(&self, id: ExprId, declared: &mut HashSet<String>) -> String {
        match self.get(id) {
            Expr::Branch { .. } | Expr::Switch { .. } | Expr::Ret { .. } | Expr::Asm { .. } => {
                self.render_stmt_body(id, declared)
            }
            _ => format!("{};", self.render(id, declared)),
        }
    }
}
