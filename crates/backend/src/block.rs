use parse::ast as ir;

use crate::expr::{CBinOp, CallTarget, Expr, ExprId, GepFirst, GepStep};
use crate::func::{FuncLowerer, MemoKey};
use crate::program;
use crate::types::CType;
use crate::{Result, TranslateError};

/// How a binary or compare operator treats signedness: LLVM's `u*`
/// variants become unsigned casts around the C operands.
enum UnsignedCasts {
    None,
    Both,
    LhsOnly,
}

impl<'p, 'm> FuncLowerer<'p, 'm> {
    /// One handler per opcode; every produced node is memoized against the
    /// originating IR value so later operand lookups resolve to it.
    pub(crate) fn lower_inst(&mut self, inst: &ir::Inst) -> Result<()> {
        match inst {
            ir::Inst::Alloca { result, ty } => {
                let cty = self.lower_type(ty)?;
                let name = self.get_var_name();
                let value = self.arena.alloc(Expr::Value { name, ty: cty });
                self.append(value);
                let addr = self.arena.alloc(Expr::Ref { target: value });
                self.create_expr(MemoKey::Local(result.clone()), addr);
                Ok(())
            }
            ir::Inst::Load { result, ptr, .. } => {
                let ptr = self.resolve_operand(&ptr.ty, &ptr.op)?;
                let deref = self.arena.alloc(Expr::Deref { target: ptr });
                self.create_expr(MemoKey::Local(result.clone()), deref);
                Ok(())
            }
            ir::Inst::Store { val, ptr } => {
                let rhs = self.resolve_operand(&val.ty, &val.op)?;
                let ptr = self.resolve_operand(&ptr.ty, &ptr.op)?;
                // `*&v = x` collapses to `v = x`.
                let lhs = match self.arena.get(ptr) {
                    Expr::Ref { target } => *target,
                    _ => self.arena.alloc(Expr::Deref { target: ptr }),
                };
                let assign = self.arena.alloc(Expr::Assign { lhs, rhs });
                self.append(assign);
                Ok(())
            }
            ir::Inst::Bin {
                result,
                op,
                ty,
                lhs,
                rhs,
            } => self.lower_bin(result, *op, ty, lhs, rhs),
            ir::Inst::Icmp {
                result,
                pred,
                ty,
                lhs,
                rhs,
            } => {
                let (symbol, unsigned) = match pred.as_str() {
                    "eq" => ("==", false),
                    "ne" => ("!=", false),
                    "sgt" => (">", false),
                    "sge" => (">=", false),
                    "slt" => ("<", false),
                    "sle" => ("<=", false),
                    "ugt" => (">", true),
                    "uge" => (">=", true),
                    "ult" => ("<", true),
                    "ule" => ("<=", true),
                    other => {
                        return Err(TranslateError::unsupported("instruction", format!("icmp {}", other)))
                    }
                };
                let mut l = self.resolve_operand(ty, lhs)?;
                let mut r = self.resolve_operand(ty, rhs)?;
                if unsigned {
                    l = self.cast_to_unsigned(l);
                    r = self.cast_to_unsigned(r);
                }
                let cmp = self.arena.alloc(Expr::Cmp {
                    pred: symbol,
                    lhs: l,
                    rhs: r,
                });
                self.create_expr(MemoKey::Local(result.clone()), cmp);
                Ok(())
            }
            ir::Inst::Fcmp {
                result,
                pred,
                ty,
                lhs,
                rhs,
            } => {
                let symbol = match pred.as_str() {
                    "oeq" | "ueq" => "==",
                    "one" | "une" => "!=",
                    "ogt" | "ugt" => ">",
                    "oge" | "uge" => ">=",
                    "olt" | "ult" => "<",
                    "ole" | "ule" => "<=",
                    other => {
                        return Err(TranslateError::unsupported("instruction", format!("fcmp {}", other)))
                    }
                };
                let l = self.resolve_operand(ty, lhs)?;
                let r = self.resolve_operand(ty, rhs)?;
                let cmp = self.arena.alloc(Expr::Cmp {
                    pred: symbol,
                    lhs: l,
                    rhs: r,
                });
                self.create_expr(MemoKey::Local(result.clone()), cmp);
                Ok(())
            }
            ir::Inst::Br { target } => {
                self.emit_phi_copies(&[target.as_str()])?;
                let then_label = self.get_block_name(target);
                let branch = self.arena.alloc(Expr::Branch {
                    cond: None,
                    then_label,
                    else_label: String::new(),
                });
                self.append(branch);
                Ok(())
            }
            ir::Inst::BrCond {
                cond,
                then_target,
                else_target,
            } => {
                let cond = self.resolve_operand(&ir::Type::Int(1), cond)?;
                self.emit_phi_copies(&[then_target.as_str(), else_target.as_str()])?;
                let then_label = self.get_block_name(then_target);
                let else_label = self.get_block_name(else_target);
                let branch = self.arena.alloc(Expr::Branch {
                    cond: Some(cond),
                    then_label,
                    else_label,
                });
                self.append(branch);
                Ok(())
            }
            ir::Inst::Ret { val } => {
                let val = match val {
                    Some(tv) => Some(self.resolve_operand(&tv.ty, &tv.op)?),
                    None => None,
                };
                let ret = self.arena.alloc(Expr::Ret { val });
                self.append(ret);
                Ok(())
            }
            ir::Inst::Switch {
                val,
                default,
                cases,
            } => {
                let cond = self.resolve_operand(&val.ty, &val.op)?;
                let mut succs: Vec<&str> = vec![default.as_str()];
                succs.extend(cases.iter().map(|(_, l)| l.as_str()));
                self.emit_phi_copies(&succs)?;
                let cases = cases
                    .iter()
                    .map(|(v, l)| (*v, self.get_block_name(l)))
                    .collect();
                let default = Some(self.get_block_name(default));
                let switch = self.arena.alloc(Expr::Switch {
                    cond,
                    cases,
                    default,
                });
                self.append(switch);
                Ok(())
            }
            ir::Inst::Call {
                result,
                ret_ty,
                callee,
                args,
            } => self.lower_call(result, ret_ty, callee, args),
            ir::Inst::Cast {
                result, op, val, to, ..
            } => {
                let id = self.lower_cast_value(*op, val, to)?;
                self.create_expr(MemoKey::Local(result.clone()), id);
                Ok(())
            }
            ir::Inst::Select {
                result,
                cond,
                then_val,
                else_val,
            } => {
                let cond = self.resolve_operand(&cond.ty, &cond.op)?;
                let then_val = self.resolve_operand(&then_val.ty, &then_val.op)?;
                let else_val = self.resolve_operand(&else_val.ty, &else_val.op)?;
                let select = self.arena.alloc(Expr::Select {
                    cond,
                    then_val,
                    else_val,
                });
                self.create_expr(MemoKey::Local(result.clone()), select);
                Ok(())
            }
            ir::Inst::Gep {
                result,
                src_ty,
                base,
                indices,
                ..
            } => {
                let id = self.lower_gep(src_ty, base, indices)?;
                self.create_expr(MemoKey::Local(result.clone()), id);
                Ok(())
            }
            ir::Inst::ExtractValue {
                result,
                base,
                indices,
            } => {
                let id = self.lower_extractvalue(base, indices)?;
                self.create_expr(MemoKey::Local(result.clone()), id);
                Ok(())
            }
            // Phi results were materialized up front; the incoming values
            // are written by every predecessor just before its terminator.
            ir::Inst::Phi { .. } => Ok(()),
            ir::Inst::DbgDeclare { var, di_var } => self.lower_dbg_declare(var, *di_var),
            // Intentionally produces nothing.
            ir::Inst::Unreachable => Ok(()),
            ir::Inst::Other { opcode } => {
                Err(TranslateError::unsupported("instruction", opcode.clone()))
            }
        }
    }

    // ===== Operand resolution =====

    /// Resolve an operand to its node. SSA locals must already be memoized;
    /// constants produce fresh literal nodes; globals resolve through the
    /// module registry; constant expressions re-enter the gep/cast handlers.
    pub(crate) fn resolve_operand(&mut self, ty: &ir::Type, op: &ir::Operand) -> Result<ExprId> {
        match op {
            ir::Operand::Local(name) => self
                .get_expr(&MemoKey::Local(name.clone()))
                .ok_or_else(|| {
                    TranslateError::Internal(format!("no expression memoized for %{}", name))
                }),
            ir::Operand::Global(name) => {
                let key = MemoKey::Global(name.clone());
                if let Some(id) = self.get_expr(&key) {
                    return Ok(id);
                }
                let id = if self.module.get_function(name).is_some() {
                    let ty = self.lower_type(ty)?;
                    self.arena.alloc(Expr::Lit {
                        repr: format!("&{}", name),
                        ty,
                    })
                } else if let Some(global) = self.prog.get_global(name) {
                    let node = Expr::Global {
                        name: global.name.clone(),
                        ty: global.ty.clone(),
                    };
                    let g = self.arena.alloc(node);
                    self.arena.alloc(Expr::Ref { target: g })
                } else {
                    return Err(TranslateError::MalformedIr(format!(
                        "reference to unknown global @{}",
                        name
                    )));
                };
                self.create_expr(key, id);
                Ok(id)
            }
            ir::Operand::Const(c) => self.lower_constant(ty, c),
        }
    }

    fn lower_constant(&mut self, ty: &ir::Type, c: &ir::Constant) -> Result<ExprId> {
        match c {
            ir::Constant::Expr(ce) => self.lower_const_expr(ce),
            ir::Constant::GlobalRef(name) => {
                self.resolve_operand(ty, &ir::Operand::Global(name.clone()))
            }
            ir::Constant::Int(v) => {
                let cty = self.lower_type(ty)?;
                Ok(self.arena.alloc(Expr::Lit {
                    repr: v.to_string(),
                    ty: cty,
                }))
            }
            ir::Constant::Float(f) => {
                let cty = self.lower_type(ty)?;
                Ok(self.arena.alloc(Expr::Lit {
                    repr: program::fmt_float(*f),
                    ty: cty,
                }))
            }
            ir::Constant::Null | ir::Constant::Undef | ir::Constant::Zero => {
                let cty = self.lower_type(ty)?;
                Ok(self.arena.alloc(Expr::Lit {
                    repr: "0".to_string(),
                    ty: cty,
                }))
            }
            ir::Constant::CStr(_) | ir::Constant::Array(_) | ir::Constant::Struct(_) => {
                let repr = self.prog.const_literal(self.module, ty, c)?;
                let cty = self.lower_type(ty)?;
                Ok(self.arena.alloc(Expr::Lit { repr, ty: cty }))
            }
        }
    }

    /// Constant expressions run through the same handlers as their
    /// instruction counterparts and memoize against the constant itself.
    fn lower_const_expr(&mut self, ce: &ir::ConstExpr) -> Result<ExprId> {
        let key = MemoKey::Const(format!("{:?}", ce));
        if let Some(id) = self.get_expr(&key) {
            return Ok(id);
        }
        let id = match ce {
            ir::ConstExpr::Gep {
                src_ty,
                base,
                indices,
                ..
            } => self.lower_gep(src_ty, base, indices)?,
            ir::ConstExpr::Cast { op, val, to } => self.lower_cast_value(*op, val, to)?,
        };
        self.create_expr(key, id);
        Ok(id)
    }

    fn cast_to_unsigned(&mut self, id: ExprId) -> ExprId {
        let ty = self.arena.ty_of(id).as_unsigned();
        self.arena.alloc(Expr::Cast { ty, val: id })
    }

    // ===== Arithmetic =====

    fn lower_bin(
        &mut self,
        result: &str,
        op: ir::BinOp,
        ty: &ir::Type,
        lhs: &ir::Operand,
        rhs: &ir::Operand,
    ) -> Result<()> {
        let (cop, casts) = match op {
            ir::BinOp::Add | ir::BinOp::FAdd => (CBinOp::Add, UnsignedCasts::None),
            ir::BinOp::Sub | ir::BinOp::FSub => (CBinOp::Sub, UnsignedCasts::None),
            ir::BinOp::Mul | ir::BinOp::FMul => (CBinOp::Mul, UnsignedCasts::None),
            ir::BinOp::SDiv | ir::BinOp::FDiv => (CBinOp::Div, UnsignedCasts::None),
            ir::BinOp::UDiv => (CBinOp::Div, UnsignedCasts::Both),
            ir::BinOp::SRem | ir::BinOp::FRem => (CBinOp::Rem, UnsignedCasts::None),
            ir::BinOp::URem => (CBinOp::Rem, UnsignedCasts::Both),
            ir::BinOp::And => (CBinOp::And, UnsignedCasts::None),
            ir::BinOp::Or => (CBinOp::Or, UnsignedCasts::None),
            ir::BinOp::Xor => (CBinOp::Xor, UnsignedCasts::None),
            ir::BinOp::Shl => (CBinOp::Shl, UnsignedCasts::None),
            ir::BinOp::AShr => (CBinOp::Shr, UnsignedCasts::None),
            ir::BinOp::LShr => (CBinOp::Shr, UnsignedCasts::LhsOnly),
        };
        let mut l = self.resolve_operand(ty, lhs)?;
        let mut r = self.resolve_operand(ty, rhs)?;
        match casts {
            UnsignedCasts::None => {}
            UnsignedCasts::Both => {
                l = self.cast_to_unsigned(l);
                r = self.cast_to_unsigned(r);
            }
            UnsignedCasts::LhsOnly => {
                l = self.cast_to_unsigned(l);
            }
        }
        let lt = self.arena.ty_of(l);
        let rt = self.arena.ty_of(r);
        let joined = crate::types::binary_join(&lt, &rt).ok_or_else(|| {
            TranslateError::Internal(format!(
                "binary join on non-arithmetic types {:?} and {:?}",
                lt, rt
            ))
        })?;
        let bin = self.arena.alloc(Expr::Bin {
            op: cop,
            lhs: l,
            rhs: r,
            ty: joined,
        });
        self.create_expr(MemoKey::Local(result.to_string()), bin);
        Ok(())
    }

    // ===== Casts =====

    fn lower_cast_value(
        &mut self,
        op: ir::CastOp,
        val: &ir::TypedOperand,
        to: &ir::Type,
    ) -> Result<ExprId> {
        let v = self.resolve_operand(&val.ty, &val.op)?;
        let target = self.lower_type(to)?;
        let id = match op {
            // Zero-extension and unsigned int→fp read the source as unsigned.
            ir::CastOp::ZExt | ir::CastOp::UiToFp => {
                let u = self.cast_to_unsigned(v);
                self.arena.alloc(Expr::Cast { ty: target, val: u })
            }
            // fp→unsigned lands in the unsigned flavor of the target.
            ir::CastOp::FpToUi => self.arena.alloc(Expr::Cast {
                ty: target.as_unsigned(),
                val: v,
            }),
            _ => self.arena.alloc(Expr::Cast { ty: target, val: v }),
        };
        Ok(id)
    }

    // ===== getelementptr / extractvalue =====

    fn lower_gep(
        &mut self,
        src_ty: &ir::Type,
        base: &ir::TypedOperand,
        indices: &[ir::TypedOperand],
    ) -> Result<ExprId> {
        let base_id = self.resolve_operand(&base.ty, &base.op)?;
        let mut iter = indices.iter();
        let first = match iter.next() {
            None => return Ok(base_id),
            Some(tv) => match const_int(tv) {
                Some(0) => GepFirst::Zero,
                _ => {
                    let idx = self.resolve_operand(&tv.ty, &tv.op)?;
                    GepFirst::Index(idx)
                }
            },
        };

        let mut cur = src_ty.clone();
        let mut path = Vec::new();
        let mut zero_steps = Vec::new();
        for tv in iter {
            match cur {
                ir::Type::Array(_, elem) => {
                    let is_zero = const_int(tv) == Some(0);
                    let idx = self.resolve_operand(&tv.ty, &tv.op)?;
                    path.push(GepStep::Array(idx));
                    zero_steps.push(is_zero);
                    cur = *elem;
                }
                ir::Type::Named(_) | ir::Type::Literal(_) => {
                    let k = const_int(tv).ok_or_else(|| {
                        TranslateError::MalformedIr(
                            "non-constant struct index in getelementptr".to_string(),
                        )
                    })?;
                    let (field, field_ty) = self.prog.field_of(self.module, &cur, k as usize)?;
                    // Member steps stay even at index 0 so field accesses
                    // keep naming the member.
                    path.push(GepStep::Field(field));
                    zero_steps.push(false);
                    cur = field_ty;
                }
                other => {
                    return Err(TranslateError::MalformedIr(format!(
                        "getelementptr index does not match traversed type {:?}",
                        other
                    )))
                }
            }
        }

        // Trailing constant-zero array indices address the base itself;
        // a chain that is nothing but zeros collapses to it entirely.
        while zero_steps.last() == Some(&true) {
            zero_steps.pop();
            path.pop();
        }
        if path.is_empty() {
            if let GepFirst::Zero = first {
                return Ok(base_id);
            }
        }

        let elem = self.lower_type(&cur)?;
        let id = self.arena.alloc(Expr::Gep {
            base: base_id,
            first,
            path,
            ty: CType::pointer_to(elem),
        });
        Ok(id)
    }

    fn lower_extractvalue(&mut self, base: &ir::TypedOperand, indices: &[u32]) -> Result<ExprId> {
        let base_id = self.resolve_operand(&base.ty, &base.op)?;
        let mut cur = base.ty.clone();
        let mut path = Vec::new();
        for &k in indices {
            match cur {
                ir::Type::Array(_, elem) => {
                    let idx = self.arena.alloc(Expr::Lit {
                        repr: k.to_string(),
                        ty: CType::Int { unsigned: false },
                    });
                    path.push(GepStep::Array(idx));
                    cur = *elem;
                }
                ir::Type::Named(_) | ir::Type::Literal(_) => {
                    let (field, field_ty) = self.prog.field_of(self.module, &cur, k as usize)?;
                    path.push(GepStep::Field(field));
                    cur = field_ty;
                }
                other => {
                    return Err(TranslateError::MalformedIr(format!(
                        "extractvalue index does not match traversed type {:?}",
                        other
                    )))
                }
            }
        }
        let ty = self.lower_type(&cur)?;
        Ok(self.arena.alloc(Expr::Field {
            base: base_id,
            path,
            ty,
        }))
    }

    // ===== Phi lowering =====

    /// Before a terminator, write every phi of the successor blocks that has
    /// an incoming value from this block. The assignment must precede the
    /// terminator so conditional branches see the updated bindings.
    fn emit_phi_copies(&mut self, successors: &[&str]) -> Result<()> {
        let ir_func = self.ir_func;
        let cur_label = &ir_func.blocks[self.cur_block].label;
        for succ in successors {
            let Some(block) = ir_func.blocks.iter().find(|b| b.label == *succ) else {
                continue;
            };
            for inst in &block.insts {
                if let ir::Inst::Phi {
                    result,
                    ty,
                    incoming,
                } = inst
                {
                    for (op, pred) in incoming {
                        if pred != cur_label {
                            continue;
                        }
                        let phi = self.get_expr(&MemoKey::Local(result.clone())).ok_or_else(
                            || {
                                TranslateError::Internal(format!(
                                    "phi %{} not materialized",
                                    result
                                ))
                            },
                        )?;
                        let val = self.resolve_operand(ty, op)?;
                        let assign = self.arena.alloc(Expr::Assign {
                            lhs: phi,
                            rhs: val,
                        });
                        self.append(assign);
                    }
                }
            }
        }
        Ok(())
    }

    // ===== Calls =====

    fn lower_call(
        &mut self,
        result: &Option<String>,
        ret_ty: &ir::Type,
        callee: &ir::Callee,
        args: &[ir::TypedOperand],
    ) -> Result<()> {
        match callee {
            ir::Callee::Asm {
                template,
                constraints,
                ..
            } => self.lower_asm(result, ret_ty, template, constraints, args),
            ir::Callee::Value(tv) => {
                let target = self.resolve_operand(&tv.ty, &tv.op)?;
                let mut lowered = Vec::new();
                for a in args {
                    lowered.push(self.resolve_operand(&a.ty, &a.op)?);
                }
                self.finish_call(result, ret_ty, CallTarget::Ptr(target), lowered, false)
            }
            ir::Callee::Global(name) if name.starts_with("llvm.") => {
                self.lower_intrinsic(result, ret_ty, name, args)
            }
            ir::Callee::Global(name) => {
                let decl = self.module.get_function(name);
                let is_variadic = decl.map(|f| f.varargs).unwrap_or(false);
                let param_tys: Option<Vec<ir::Type>> =
                    decl.map(|f| f.params.iter().map(|p| p.ty.clone()).collect());
                if decl.is_none() {
                    let arg_tys: Vec<ir::Type> = args.iter().map(|a| a.ty.clone()).collect();
                    self.prog
                        .add_call_declaration(self.module, name, ret_ty, &arg_tys)?;
                }
                let mut lowered = Vec::new();
                for (i, a) in args.iter().enumerate() {
                    let mut id = self.resolve_operand(&a.ty, &a.op)?;
                    if let Some(ps) = &param_tys {
                        if let Some(pty) = ps.get(i) {
                            if pty != &a.ty {
                                let target = self.lower_type(pty)?;
                                id = self.arena.alloc(Expr::Cast {
                                    ty: target,
                                    val: id,
                                });
                            }
                        }
                    }
                    lowered.push(id);
                }
                self.finish_call(
                    result,
                    ret_ty,
                    CallTarget::Name(name.clone()),
                    lowered,
                    is_variadic,
                )
            }
        }
    }

    fn finish_call(
        &mut self,
        result: &Option<String>,
        ret_ty: &ir::Type,
        target: CallTarget,
        args: Vec<ExprId>,
        is_variadic: bool,
    ) -> Result<()> {
        let cty = self.lower_type(ret_ty)?;
        let call = self.arena.alloc(Expr::Call {
            target,
            args,
            ty: cty.clone(),
            is_variadic,
        });
        match result {
            Some(r) if !matches!(cty, CType::Void) => {
                let name = self.get_var_name();
                let value = self.arena.alloc(Expr::Value { name, ty: cty });
                let assign = self.arena.alloc(Expr::Assign {
                    lhs: value,
                    rhs: call,
                });
                self.append(assign);
                self.create_expr(MemoKey::Local(r.clone()), value);
            }
            _ => self.append(call),
        }
        Ok(())
    }

    fn lower_intrinsic(
        &mut self,
        result: &Option<String>,
        ret_ty: &ir::Type,
        name: &str,
        args: &[ir::TypedOperand],
    ) -> Result<()> {
        // `llvm.dbg.declare` arrives as its own instruction; any other
        // debug intrinsic is consumed silently.
        if name.starts_with("llvm.dbg") {
            return Ok(());
        }
        if name == "llvm.stacksave" || name == "llvm.stackrestore" {
            self.prog.stack_ignored = true;
            if let Some(r) = result {
                let cty = self.lower_type(ret_ty)?;
                let zero = self.arena.alloc(Expr::Lit {
                    repr: "0".to_string(),
                    ty: cty,
                });
                self.create_expr(MemoKey::Local(r.clone()), zero);
            }
            return Ok(());
        }

        let family = name["llvm.".len()..].split('.').next().unwrap_or("");
        match family {
            "memcpy" | "memmove" | "memset" => {
                // Pointer, value/pointer, length; the volatile flag is dropped.
                let mut lowered = Vec::new();
                for a in args.iter().take(3) {
                    lowered.push(self.resolve_operand(&a.ty, &a.op)?);
                }
                self.finish_call(
                    result,
                    ret_ty,
                    CallTarget::Name(family.to_string()),
                    lowered,
                    false,
                )
            }
            "va_start" | "va_end" | "va_copy" => {
                let mut lowered = Vec::new();
                for a in args {
                    let id = self.resolve_operand(&a.ty, &a.op)?;
                    lowered.push(self.as_va_list(id));
                }
                if family == "va_start" {
                    if let Some(last) = self.ir_func.params.last() {
                        let id = self
                            .get_expr(&MemoKey::Local(last.name.clone()))
                            .ok_or_else(|| {
                                TranslateError::Internal(
                                    "parameter not memoized for va_start".to_string(),
                                )
                            })?;
                        lowered.push(id);
                    }
                }
                self.finish_call(
                    result,
                    ret_ty,
                    CallTarget::Name(family.to_string()),
                    lowered,
                    false,
                )
            }
            "sqrt" | "sin" | "cos" | "exp" | "exp2" | "log" | "log10" | "log2" | "fabs"
            | "floor" | "ceil" | "trunc" | "rint" | "nearbyint" | "round" | "pow"
            | "copysign" | "fma" => {
                let mut lowered = Vec::new();
                for a in args {
                    lowered.push(self.resolve_operand(&a.ty, &a.op)?);
                }
                self.finish_call(
                    result,
                    ret_ty,
                    CallTarget::Name(family.to_string()),
                    lowered,
                    false,
                )
            }
            "fmuladd" => {
                let mut lowered = Vec::new();
                for a in args {
                    lowered.push(self.resolve_operand(&a.ty, &a.op)?);
                }
                self.finish_call(result, ret_ty, CallTarget::Name("fma".to_string()), lowered, false)
            }
            "minnum" | "maxnum" => {
                let cname = if family == "minnum" { "fmin" } else { "fmax" };
                let mut lowered = Vec::new();
                for a in args {
                    lowered.push(self.resolve_operand(&a.ty, &a.op)?);
                }
                self.finish_call(result, ret_ty, CallTarget::Name(cname.to_string()), lowered, false)
            }
            _ => Err(TranslateError::unsupported("intrinsic", name.to_string())),
        }
    }

    /// The `i8*` handed to the va intrinsics is a cast of the `va_list`
    /// lvalue; unwrap the casts and dereference so the macro sees it.
    fn as_va_list(&mut self, mut id: ExprId) -> ExprId {
        while let Expr::Cast { val, .. } = self.arena.get(id) {
            id = *val;
        }
        if matches!(self.arena.ty_of(id), CType::Pointer { .. }) {
            id = self.arena.alloc(Expr::Deref { target: id });
        }
        id
    }

    // ===== Inline assembly =====

    fn lower_asm(
        &mut self,
        result: &Option<String>,
        ret_ty: &ir::Type,
        template: &str,
        constraints: &str,
        args: &[ir::TypedOperand],
    ) -> Result<()> {
        let width = self.module.pointer_width;
        let mut out_constraints = Vec::new();
        let mut in_constraints = Vec::new();
        let mut clobbers: Vec<String> = Vec::new();

        for entry in constraints.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            if let Some(inner) = entry.strip_prefix("~{").and_then(|s| s.strip_suffix('}')) {
                let c = match inner {
                    "memory" => "memory".to_string(),
                    "cc" | "dirflag" | "fpsr" | "flags" => "cc".to_string(),
                    other => get_register(other, width),
                };
                if !clobbers.contains(&c) {
                    clobbers.push(c);
                }
            } else if let Some(rest) = entry.strip_prefix('=') {
                out_constraints.push(map_constraint(rest, width));
            } else {
                in_constraints.push(map_constraint(entry, width));
            }
        }

        // Every output operand binds a fresh local, declared before the
        // asm statement.
        let mut outputs = Vec::new();
        for (i, c) in out_constraints.iter().enumerate() {
            let ty = if i == 0 && !matches!(ret_ty, ir::Type::Void) {
                self.lower_type(ret_ty)?
            } else {
                CType::Int { unsigned: false }
            };
            let name = self.get_var_name();
            let value = self.arena.alloc(Expr::Value { name, ty });
            self.append(value);
            outputs.push((format!("={}", c), value));
        }
        if let Some(r) = result {
            if let Some((_, value)) = outputs.first() {
                self.create_expr(MemoKey::Local(r.clone()), *value);
            }
        }

        let mut inputs = Vec::new();
        for (c, a) in in_constraints.iter().zip(args.iter()) {
            let id = self.resolve_operand(&a.ty, &a.op)?;
            inputs.push((c.clone(), id));
        }

        let clobbers = clobbers
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        let asm = self.arena.alloc(Expr::Asm {
            template: rewrite_template(template),
            outputs,
            inputs,
            clobbers,
        });
        self.append(asm);
        Ok(())
    }

    // ===== Debug metadata =====

    /// `llvm.dbg.declare` recovers the source name and signedness of a
    /// local and is dropped from the output.
    fn lower_dbg_declare(&mut self, var: &ir::Operand, di_var: u64) -> Result<()> {
        let ir::Operand::Local(name) = var else {
            return Ok(());
        };
        let Some(id) = self.get_expr(&MemoKey::Local(name.clone())) else {
            return Ok(());
        };
        let value_id = match self.arena.get(id) {
            Expr::Ref { target } => *target,
            _ => id,
        };
        let Some(di) = self.module.di_locals.get(&di_var) else {
            return Ok(());
        };
        let di_name = di.name.clone();
        let unsigned = di_type_is_unsigned(self.module, di.ty);
        let void_ptr = di_type_is_void(self.module, di.ty);
        if let Expr::Value { name, ty } = self.arena.get_mut(value_id) {
            if !di_name.is_empty() {
                *name = di_name;
            }
            if unsigned {
                ty.set_unsigned();
            }
            if void_ptr {
                if let CType::Pointer { elem, .. } = ty {
                    if matches!(**elem, CType::Char { .. }) {
                        **elem = CType::Void;
                    }
                }
            }
        }
        Ok(())
    }
}

fn const_int(tv: &ir::TypedOperand) -> Option<i128> {
    match &tv.op {
        ir::Operand::Const(ir::Constant::Int(v)) => Some(*v),
        _ => None,
    }
}

/// Follow a derived-type chain to its base encoding.
fn di_type_is_unsigned(module: &ir::Module, mut ty: Option<u64>) -> bool {
    for _ in 0..64 {
        match ty.and_then(|id| module.di_types.get(&id)) {
            Some(ir::DiType::Basic { encoding, .. }) => {
                return matches!(
                    encoding.as_deref(),
                    Some("DW_ATE_unsigned") | Some("DW_ATE_unsigned_char")
                )
            }
            Some(ir::DiType::Derived { base }) => ty = *base,
            None => return false,
        }
    }
    false
}

/// A derived chain that bottoms out with no base type names `void`.
fn di_type_is_void(module: &ir::Module, mut ty: Option<u64>) -> bool {
    let mut seen_derived = false;
    for _ in 0..64 {
        match ty {
            None => return seen_derived,
            Some(id) => match module.di_types.get(&id) {
                Some(ir::DiType::Basic { .. }) => return false,
                Some(ir::DiType::Derived { base }) => {
                    seen_derived = true;
                    ty = *base;
                }
                None => return false,
            },
        }
    }
    false
}

/// LLVM register constraint (`{ax}`) to the C register letter. The stack
/// and frame pointers have no letter; their spelling follows the target's
/// pointer width.
fn get_register(reg: &str, pointer_width: u32) -> String {
    let base = if reg.len() == 3 && (reg.starts_with('e') || reg.starts_with('r')) {
        &reg[1..]
    } else {
        reg
    };
    match base {
        "ax" => "a",
        "bx" => "b",
        "cx" => "c",
        "dx" => "d",
        "si" => "S",
        "di" => "D",
        "sp" => {
            if pointer_width == 32 {
                "esp"
            } else {
                "rsp"
            }
        }
        "bp" => {
            if pointer_width == 32 {
                "ebp"
            } else {
                "rbp"
            }
        }
        _ => return reg.to_string(),
    }
    .to_string()
}

fn map_constraint(c: &str, pointer_width: u32) -> String {
    let c = c.trim_start_matches(['*', '&', '+']);
    if let Some(inner) = c.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        get_register(inner, pointer_width)
    } else {
        c.to_string()
    }
}

/// `$N` placeholders become `%N`; literal `%` doubles; `$$` collapses.
fn rewrite_template(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '%' => out.push_str("%%"),
            '$' => match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some(d) if d.is_ascii_digit() => {
                    out.push('%');
                }
                _ => out.push('$'),
            },
            other => out.push(other),
        }
    }
    out
}
