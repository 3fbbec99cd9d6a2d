use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use log::{info, warn};
use parse::ast as ir;

use crate::expr::{Expr, ExprArena};
use crate::func::{self, Func};
use crate::types::{self, CType};
use crate::{Result, TranslateError};

/// A translated struct or union. Field names are recovered from debug
/// metadata where possible and synthesized as `structVar<N>` otherwise.
#[derive(Debug)]
pub struct Struct {
    /// Emitted C name; empty for anonymous structs.
    pub name: String,
    pub is_union: bool,
    /// Field order matches the IR layout.
    pub items: Vec<(CType, String)>,
}

impl Struct {
    fn keyword(&self) -> &'static str {
        if self.is_union {
            "union"
        } else {
            "struct"
        }
    }

    pub fn definition(&self) -> String {
        let mut out = format!("{} {} {{\n", self.keyword(), self.name);
        for (ty, name) in &self.items {
            out.push_str(&format!("    {};\n", ty.decl(name)));
        }
        out.push_str("};");
        out
    }

    /// Single-line body used where an anonymous struct appears inline.
    pub fn inline_body(&self) -> String {
        let mut out = String::from("struct { ");
        for (ty, name) in &self.items {
            out.push_str(&ty.decl(name));
            out.push_str("; ");
        }
        out.push('}');
        out
    }
}

/// A module-level variable. `value` is the rendered initializer literal,
/// empty when the global has none.
#[derive(Debug)]
pub struct GlobalValue {
    pub name: String,
    pub ty: CType,
    pub value: String,
    pub is_static: bool,
}

impl GlobalValue {
    fn static_prefix(&self) -> &'static str {
        if self.is_static {
            "static "
        } else {
            ""
        }
    }

    pub fn decl_to_string(&self) -> String {
        format!("{}{};", self.static_prefix(), self.ty.decl(&self.name))
    }

    pub fn def_to_string(&self) -> String {
        if self.value.is_empty() {
            self.decl_to_string()
        } else {
            format!(
                "{}{} = {};",
                self.static_prefix(),
                self.ty.decl(&self.name),
                self.value
            )
        }
    }
}

/// The whole translated module. Owns every struct, global and function;
/// emission makes two ordered passes (declarations, then definitions).
#[derive(Debug, Default)]
pub struct Program {
    pub structs: Vec<Struct>,
    /// Anonymous structs keyed by the identity of their originating IR type.
    unnamed_structs: Vec<(ir::Type, Struct)>,
    pub globals: Vec<GlobalValue>,
    global_index: HashMap<String, usize>,
    pub functions: Vec<Func>,
    pub declarations: Vec<Func>,
    declared_names: HashSet<String>,
    struct_var_count: usize,
    gvar_count: usize,
    pub has_varargs: bool,
    /// Set when stacksave/stackrestore intrinsics were dropped; reported
    /// once as a warning, never an error.
    pub stack_ignored: bool,
}

impl Program {
    pub fn translate(module: &ir::Module) -> Result<Program> {
        info!("translating module `{}`", module.name);
        let mut prog = Program::default();
        prog.parse_global_vars(module)?;
        prog.parse_structs(module)?;
        prog.parse_functions(module)?;
        info!("module successfully translated");
        if prog.stack_ignored {
            warn!("intrinsic stacksave/stackrestore ignored");
        }
        Ok(prog)
    }

    // ===== Construction passes =====

    fn parse_global_vars(&mut self, module: &ir::Module) -> Result<()> {
        for gvar in &module.globals {
            let mut name = gvar.name.replace('.', "_");
            if name.is_empty() {
                name = format!("gvar{}", self.gvar_count);
                self.gvar_count += 1;
            }
            let ty = types::lower(self, module, &gvar.ty, false)?;
            let value = match &gvar.init {
                Some(c) => self.const_literal(module, &gvar.ty, c)?,
                None => String::new(),
            };
            self.global_index
                .insert(gvar.name.clone(), self.globals.len());
            self.globals.push(GlobalValue {
                name,
                ty,
                value,
                is_static: gvar.is_private,
            });
        }
        Ok(())
    }

    fn parse_structs(&mut self, module: &ir::Module) -> Result<()> {
        for sd in &module.structs {
            let Some(c_name) = types::struct_c_name(&sd.name) else {
                // Identified struct without a symbolic name; materialized
                // lazily as an anonymous struct when first used.
                continue;
            };
            if c_name == "__va_list_tag" {
                self.has_varargs = true;
                let void_ptr = CType::pointer_to(CType::Void);
                self.structs.push(Struct {
                    name: "__va_list_tag".to_string(),
                    is_union: false,
                    items: vec![
                        (CType::Int { unsigned: true }, "gp_offset".to_string()),
                        (CType::Int { unsigned: true }, "fp_offset".to_string()),
                        (void_ptr.clone(), "overflow_arg_area".to_string()),
                        (void_ptr, "reg_save_area".to_string()),
                    ],
                });
                continue;
            }
            let mut items = Vec::new();
            for field in &sd.fields {
                let cty = types::lower(self, module, field, false)?;
                let fname = self.get_struct_var_name();
                items.push((cty, fname));
            }
            self.structs.push(Struct {
                name: c_name,
                is_union: sd.name.starts_with("union."),
                items,
            });
        }
        Ok(())
    }

    fn parse_functions(&mut self, module: &ir::Module) -> Result<()> {
        for f in &module.functions {
            self.declared_names.insert(f.name.clone());
        }
        for f in &module.functions {
            if !f.is_declaration() {
                let func = func::lower_function(self, module, f, false)?;
                self.functions.push(func);
            }
            if (f.is_declaration() || f.is_internal) && !f.name.starts_with("llvm.dbg") {
                let func = func::lower_function(self, module, f, true)?;
                self.declarations.push(func);
            }
        }
        Ok(())
    }

    // ===== Registries =====

    pub(crate) fn get_struct_var_name(&mut self) -> String {
        let name = format!("structVar{}", self.struct_var_count);
        self.struct_var_count += 1;
        name
    }

    pub fn get_struct(&self, name: &str) -> Option<&Struct> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub(crate) fn get_global(&self, ir_name: &str) -> Option<&GlobalValue> {
        self.global_index.get(ir_name).map(|&i| &self.globals[i])
    }

    /// Register (or fetch) the anonymous struct for an IR struct type and
    /// return its printed inline body.
    pub(crate) fn ensure_unnamed_struct(
        &mut self,
        module: &ir::Module,
        key: &ir::Type,
        fields: &[ir::Type],
    ) -> Result<String> {
        if let Some((_, s)) = self.unnamed_structs.iter().find(|(k, _)| k == key) {
            return Ok(s.inline_body());
        }
        // Reserve the slot first so a self-referential field terminates.
        let slot = self.unnamed_structs.len();
        self.unnamed_structs.push((
            key.clone(),
            Struct {
                name: String::new(),
                is_union: false,
                items: Vec::new(),
            },
        ));
        let mut items = Vec::new();
        for field in fields {
            let cty = types::lower(self, module, field, false)?;
            let fname = self.get_struct_var_name();
            items.push((cty, fname));
        }
        self.unnamed_structs[slot].1.items = items;
        Ok(self.unnamed_structs[slot].1.inline_body())
    }

    /// Field name and IR type of member `k` of a struct type.
    pub(crate) fn field_of(
        &mut self,
        module: &ir::Module,
        ty: &ir::Type,
        k: usize,
    ) -> Result<(String, ir::Type)> {
        match ty {
            ir::Type::Named(n) => {
                let def = module.get_struct(n).ok_or_else(|| {
                    TranslateError::MalformedIr(format!("unknown struct type `%{}`", n))
                })?;
                let field_ty = def.fields.get(k).cloned().ok_or_else(|| {
                    TranslateError::MalformedIr(format!(
                        "field index {} out of range for `%{}`",
                        k, n
                    ))
                })?;
                match types::struct_c_name(n) {
                    Some(c_name) => {
                        let s = self.get_struct(&c_name).ok_or_else(|| {
                            TranslateError::MalformedIr(format!(
                                "struct `{}` not registered",
                                c_name
                            ))
                        })?;
                        let fname = s
                            .items
                            .get(k)
                            .map(|(_, f)| f.clone())
                            .ok_or_else(|| {
                                TranslateError::MalformedIr(format!(
                                    "field index {} out of range for `{}`",
                                    k, c_name
                                ))
                            })?;
                        Ok((fname, field_ty))
                    }
                    None => {
                        let fields = def.fields.clone();
                        self.ensure_unnamed_struct(module, ty, &fields)?;
                        Ok((self.unnamed_field(ty, k)?, field_ty))
                    }
                }
            }
            ir::Type::Literal(fields) => {
                let field_ty = fields.get(k).cloned().ok_or_else(|| {
                    TranslateError::MalformedIr(format!(
                        "field index {} out of range for literal struct",
                        k
                    ))
                })?;
                let fields = fields.clone();
                self.ensure_unnamed_struct(module, ty, &fields)?;
                Ok((self.unnamed_field(ty, k)?, field_ty))
            }
            other => Err(TranslateError::MalformedIr(format!(
                "field access on non-struct type {:?}",
                other
            ))),
        }
    }

    fn unnamed_field(&self, key: &ir::Type, k: usize) -> Result<String> {
        self.unnamed_structs
            .iter()
            .find(|(key2, _)| key2 == key)
            .and_then(|(_, s)| s.items.get(k))
            .map(|(_, f)| f.clone())
            .ok_or_else(|| {
                TranslateError::Internal("anonymous struct field not registered".to_string())
            })
    }

    /// A call site referenced a function the module never declares; append
    /// an external declaration synthesized from the call.
    pub(crate) fn add_call_declaration(
        &mut self,
        module: &ir::Module,
        name: &str,
        ret_ty: &ir::Type,
        arg_tys: &[ir::Type],
    ) -> Result<()> {
        if !self.declared_names.insert(name.to_string()) {
            return Ok(());
        }
        let mut arena = ExprArena::default();
        let mut params = Vec::new();
        for (i, ty) in arg_tys.iter().enumerate() {
            let cty = types::lower(self, module, ty, false)?;
            params.push(arena.alloc(Expr::Value {
                name: format!("var{}", i),
                ty: cty,
            }));
        }
        let ret = types::lower(self, module, ret_ty, false)?;
        self.declarations.push(Func {
            name: name.to_string(),
            ret,
            params,
            varargs: false,
            is_declaration: true,
            blocks: Vec::new(),
            arena,
        });
        Ok(())
    }

    // ===== Initializer literals =====

    pub(crate) fn const_literal(
        &mut self,
        module: &ir::Module,
        ty: &ir::Type,
        c: &ir::Constant,
    ) -> Result<String> {
        Ok(match c {
            ir::Constant::Int(v) => v.to_string(),
            ir::Constant::Float(f) => fmt_float(*f),
            ir::Constant::Null | ir::Constant::Undef => "0".to_string(),
            ir::Constant::Zero => match ty {
                ir::Type::Array(..) | ir::Type::Named(_) | ir::Type::Literal(_) => {
                    "{0}".to_string()
                }
                _ => "0".to_string(),
            },
            ir::Constant::CStr(bytes) => c_string_literal(bytes),
            ir::Constant::GlobalRef(g) => self.global_ref_literal(module, g),
            ir::Constant::Array(elems) | ir::Constant::Struct(elems) => {
                let mut parts = Vec::new();
                for tv in elems {
                    parts.push(self.typed_operand_literal(module, tv)?);
                }
                format!("{{{}}}", parts.join(", "))
            }
            ir::Constant::Expr(ce) => match &**ce {
                ir::ConstExpr::Gep { base, indices, .. } => {
                    let all_zero = indices.iter().all(|tv| {
                        matches!(&tv.op, ir::Operand::Const(ir::Constant::Int(0)))
                    });
                    match &base.op {
                        // A zero-index gep of a global is the decayed array.
                        ir::Operand::Global(g) if all_zero => self
                            .get_global(g)
                            .map(|gv| gv.name.clone())
                            .unwrap_or_else(|| g.replace('.', "_")),
                        ir::Operand::Global(g) => self.global_ref_literal(module, g),
                        _ => "0".to_string(),
                    }
                }
                ir::ConstExpr::Cast { val, .. } => self.typed_operand_literal(module, val)?,
            },
        })
    }

    fn typed_operand_literal(
        &mut self,
        module: &ir::Module,
        tv: &ir::TypedOperand,
    ) -> Result<String> {
        match &tv.op {
            ir::Operand::Const(c) => self.const_literal(module, &tv.ty, c),
            ir::Operand::Global(g) => Ok(self.global_ref_literal(module, g)),
            ir::Operand::Local(_) => Err(TranslateError::MalformedIr(
                "local value in constant initializer".to_string(),
            )),
        }
    }

    fn global_ref_literal(&self, module: &ir::Module, g: &str) -> String {
        if module.get_function(g).is_some() {
            return format!("&{}", g);
        }
        match self.get_global(g) {
            Some(gv) => format!("&{}", gv.name),
            None => format!("&{}", g.replace('.', "_")),
        }
    }

    // ===== Emission =====

    /// Write the translation to a sink. Each call is an independent pass:
    /// declaration tracking starts fresh, so repeated calls are
    /// byte-identical.
    pub fn print(&self, sink: &mut dyn io::Write) -> io::Result<()> {
        self.write(sink)
    }

    /// Truncate `path` and write the translation into it.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;
        self.write(&mut file)?;
        info!("translated program saved into {}", path.display());
        Ok(())
    }

    /// Render the whole program to a string (used heavily by tests).
    pub fn to_c_string(&self) -> String {
        let mut buf = Vec::new();
        self.write(&mut buf).expect("write to Vec cannot fail");
        String::from_utf8(buf).expect("emitted C is ASCII")
    }

    fn write(&self, w: &mut dyn io::Write) -> io::Result<()> {
        if self.has_varargs {
            writeln!(w, "#include <stdarg.h>")?;
            writeln!(w)?;
        }

        if !self.structs.is_empty() {
            writeln!(w, "//Struct declarations")?;
            for s in &self.structs {
                writeln!(w, "{} {};", s.keyword(), s.name)?;
            }
            writeln!(w)?;
            writeln!(w, "//Struct definitions")?;
            let mut printed = HashSet::new();
            for s in &self.structs {
                self.write_struct(s, w, &mut printed)?;
            }
            writeln!(w)?;
        }

        if !self.globals.is_empty() {
            writeln!(w, "//Global variable declarations")?;
            for g in &self.globals {
                writeln!(w, "{}", g.decl_to_string())?;
            }
            writeln!(w)?;
            writeln!(w, "//Global variable definitions")?;
            for g in &self.globals {
                writeln!(w, "{}", g.def_to_string())?;
            }
            writeln!(w)?;
        }

        if !self.declarations.is_empty() {
            writeln!(w, "//Function declarations")?;
            for f in &self.declarations {
                let mut declared = HashSet::new();
                writeln!(w, "{};", signature(f, &mut declared))?;
            }
            writeln!(w)?;
        }

        if !self.functions.is_empty() {
            writeln!(w, "//Function definitions")?;
            for f in &self.functions {
                self.write_function(f, w)?;
            }
        }
        Ok(())
    }

    /// Depth-first over field dependencies so every struct a definition
    /// mentions by value is defined before it.
    fn write_struct(
        &self,
        s: &Struct,
        w: &mut dyn io::Write,
        printed: &mut HashSet<String>,
    ) -> io::Result<()> {
        if !printed.insert(s.name.clone()) {
            return Ok(());
        }
        for (ty, _) in &s.items {
            let dep = match ty {
                CType::Array {
                    is_struct_array: true,
                    struct_name: Some(n),
                    ..
                } => Some(n),
                CType::Pointer {
                    is_struct_ptr: true,
                    is_array_ptr: true,
                    struct_name: Some(n),
                    ..
                } => Some(n),
                CType::Struct(n) => Some(n),
                _ => None,
            };
            if let Some(n) = dep {
                if let Some(d) = self.get_struct(n) {
                    self.write_struct(d, w, printed)?;
                }
            }
        }
        writeln!(w, "{}", s.definition())?;
        writeln!(w)?;
        Ok(())
    }

    fn write_function(&self, f: &Func, w: &mut dyn io::Write) -> io::Result<()> {
        let mut declared = HashSet::new();
        writeln!(w, "{} {{", signature(f, &mut declared))?;
        for (i, block) in f.blocks.iter().enumerate() {
            // The entry block's label never appears.
            if i > 0 {
                writeln!(w, "{}:", block.name)?;
            }
            for &e in &block.exprs {
                writeln!(w, "    {}", f.arena.render_stmt(e, &mut declared))?;
            }
        }
        writeln!(w, "}}")?;
        writeln!(w)?;
        Ok(())
    }
}

fn signature(f: &Func, declared: &mut HashSet<String>) -> String {
    let mut params = Vec::new();
    for &pid in &f.params {
        if let Expr::Value { name, ty } = f.arena.get(pid) {
            declared.insert(name.clone());
            params.push(ty.decl(name));
        }
    }
    let inner = if params.is_empty() {
        "void".to_string()
    } else if f.varargs {
        format!("{}, ...", params.join(", "))
    } else {
        params.join(", ")
    };
    f.ret.decl(&format!("{}({})", f.name, inner))
}

pub(crate) fn fmt_float(f: f64) -> String {
    if f.is_nan() {
        "(0.0 / 0.0)".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "(1.0 / 0.0)".to_string()
        } else {
            "(-1.0 / 0.0)".to_string()
        }
    } else {
        format!("{:?}", f)
    }
}

/// A character array that came from a C string literal renders as a
/// double-quoted string; the trailing NUL is implicit in C.
pub(crate) fn c_string_literal(bytes: &[u8]) -> String {
    let data = match bytes.split_last() {
        Some((0, rest)) => rest,
        _ => bytes,
    };
    let mut out = String::from("\"");
    for &b in data {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out.push('"');
    out
}
