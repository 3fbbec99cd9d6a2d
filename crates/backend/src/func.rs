use std::collections::HashMap;

use log::debug;
use parse::ast as ir;

use crate::expr::{Expr, ExprArena, ExprId};
use crate::program::Program;
use crate::types::{self, CType};
use crate::Result;

/// A lowered basic block: its emitted label and the statement sequence.
/// Statements are indices into the owning function's arena because one
/// node can be referenced from several positions.
#[derive(Debug)]
pub struct CBlock {
    pub name: String,
    pub exprs: Vec<ExprId>,
}

/// A translated function (definition or external declaration).
#[derive(Debug)]
pub struct Func {
    pub name: String,
    pub ret: CType,
    /// `Value` nodes, one per parameter.
    pub params: Vec<ExprId>,
    pub varargs: bool,
    pub is_declaration: bool,
    pub blocks: Vec<CBlock>,
    pub arena: ExprArena,
}

/// Memoization key for the IR-value → node map. Textual IR has no pointer
/// identity, so locals key by SSA name and constants by their structural
/// rendering (LLVM uniques constants, making this equivalent).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum MemoKey {
    Local(String),
    Global(String),
    Const(String),
}

/// Per-function lowering state: counters, the value-to-node map and the
/// block-name map. Consumed by the per-block instruction dispatch.
pub(crate) struct FuncLowerer<'p, 'm> {
    pub prog: &'p mut Program,
    pub module: &'m ir::Module,
    pub ir_func: &'m ir::Function,
    pub arena: ExprArena,
    pub memo: HashMap<MemoKey, ExprId>,
    pub block_names: HashMap<String, String>,
    pub blocks: Vec<CBlock>,
    pub cur_block: usize,
    var_count: usize,
    block_count: usize,
}

impl<'p, 'm> FuncLowerer<'p, 'm> {
    fn new(prog: &'p mut Program, module: &'m ir::Module, ir_func: &'m ir::Function) -> Self {
        FuncLowerer {
            prog,
            module,
            ir_func,
            arena: ExprArena::default(),
            memo: HashMap::new(),
            block_names: HashMap::new(),
            blocks: Vec::new(),
            cur_block: 0,
            var_count: 0,
            block_count: 0,
        }
    }

    pub fn get_var_name(&mut self) -> String {
        let name = format!("var{}", self.var_count);
        self.var_count += 1;
        name
    }

    pub fn get_block_name(&mut self, label: &str) -> String {
        if let Some(name) = self.block_names.get(label) {
            return name.clone();
        }
        let name = format!("block{}", self.block_count);
        self.block_count += 1;
        self.block_names.insert(label.to_string(), name.clone());
        name
    }

    pub fn get_expr(&self, key: &MemoKey) -> Option<ExprId> {
        self.memo.get(key).copied()
    }

    pub fn create_expr(&mut self, key: MemoKey, id: ExprId) {
        self.memo.insert(key, id);
    }

    pub fn append(&mut self, id: ExprId) {
        self.blocks[self.cur_block].exprs.push(id);
    }

    pub fn lower_type(&mut self, ty: &ir::Type) -> Result<CType> {
        types::lower(self.prog, self.module, ty, false)
    }

    fn run(mut self) -> Result<Func> {
        // Parameters first: they claim the lowest var numbers.
        let mut params = Vec::new();
        for p in &self.ir_func.params {
            let ty = self.lower_type(&p.ty)?;
            let name = self.get_var_name();
            let id = self.arena.alloc(Expr::Value { name, ty });
            self.create_expr(MemoKey::Local(p.name.clone()), id);
            params.push(id);
        }

        // Block names in layout order, then phi result values, so that a
        // forward branch or an early phi use always finds its target.
        for b in &self.ir_func.blocks {
            let name = self.get_block_name(&b.label);
            self.blocks.push(CBlock {
                name,
                exprs: Vec::new(),
            });
        }
        for b in &self.ir_func.blocks {
            for inst in &b.insts {
                if let ir::Inst::Phi { result, ty, .. } = inst {
                    let cty = self.lower_type(ty)?;
                    let name = self.get_var_name();
                    let id = self.arena.alloc(Expr::Value { name, ty: cty });
                    self.create_expr(MemoKey::Local(result.clone()), id);
                }
            }
        }

        for i in 0..self.ir_func.blocks.len() {
            self.cur_block = i;
            let insts = &self.ir_func.blocks[i].insts;
            for inst in insts {
                self.lower_inst(inst)?;
            }
        }

        let ret = self.lower_type(&self.ir_func.ret)?;
        Ok(Func {
            name: self.ir_func.name.clone(),
            ret,
            params,
            varargs: self.ir_func.varargs,
            is_declaration: false,
            blocks: self.blocks,
            arena: self.arena,
        })
    }
}

/// Lower one IR function. With `as_decl` only the signature is produced.
pub(crate) fn lower_function(
    prog: &mut Program,
    module: &ir::Module,
    ir_func: &ir::Function,
    as_decl: bool,
) -> Result<Func> {
    if as_decl {
        let mut arena = ExprArena::default();
        let mut params = Vec::new();
        for (i, p) in ir_func.params.iter().enumerate() {
            let ty = types::lower(prog, module, &p.ty, false)?;
            params.push(arena.alloc(Expr::Value {
                name: format!("var{}", i),
                ty,
            }));
        }
        let ret = types::lower(prog, module, &ir_func.ret, false)?;
        return Ok(Func {
            name: ir_func.name.clone(),
            ret,
            params,
            varargs: ir_func.varargs,
            is_declaration: true,
            blocks: Vec::new(),
            arena,
        });
    }

    debug!("lowering function `{}`", ir_func.name);
    FuncLowerer::new(prog, module, ir_func).run()
}
