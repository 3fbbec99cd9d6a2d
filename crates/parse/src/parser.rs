use crate::ast::*;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("parse error at line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

/// Parse a textual LLVM IR module (typed-pointer dialect). `name` becomes
/// the module name, usually the input file stem.
pub fn parse_module(src: &str, name: &str) -> Result<Module, ParseError> {
    let mut module = Module {
        name: name.to_string(),
        pointer_width: 64,
        ..Module::default()
    };
    let mut saw_datalayout = false;
    let mut lines = Lines::new(src);

    while let Some((line_no, text)) = lines.next_logical() {
        let mut cur = Cursor::new(&text, line_no);
        cur.skip_ws();
        if cur.eof() {
            continue;
        }
        match cur.peek() {
            Some(b'%') => parse_struct_def(&mut cur, &mut module)?,
            Some(b'@') => parse_global(&mut cur, &mut module)?,
            Some(b'!') => parse_metadata(&mut cur, &mut module)?,
            _ => {
                let save = cur.pos;
                let word = cur.word();
                match word.as_str() {
                    "declare" => {
                        let f = parse_signature(&mut cur)?;
                        module.functions.push(f);
                    }
                    "define" => {
                        cur.pos = save;
                        parse_define(&mut cur, &mut lines, &mut module)?;
                    }
                    "target" => parse_target(&mut cur, &mut module, &mut saw_datalayout),
                    // Module-level noise we tolerate and drop.
                    "source_filename" | "attributes" | "module" => {}
                    "" => {}
                    other => {
                        return Err(cur.err(format!("unexpected top-level token `{}`", other)));
                    }
                }
            }
        }
    }

    Ok(module)
}

// ===== Logical lines =====

struct Lines<'a> {
    lines: Vec<&'a str>,
    idx: usize,
}

impl<'a> Lines<'a> {
    fn new(src: &'a str) -> Self {
        Lines {
            lines: src.lines().collect(),
            idx: 0,
        }
    }

    /// Next non-empty line with comments stripped; lines are joined while
    /// square brackets stay unbalanced (multi-line `switch`).
    fn next_logical(&mut self) -> Option<(usize, String)> {
        while self.idx < self.lines.len() {
            let line_no = self.idx + 1;
            let mut text = strip_comment(self.lines[self.idx]).trim().to_string();
            self.idx += 1;
            if text.is_empty() {
                continue;
            }
            let mut depth = bracket_depth(&text);
            while depth > 0 && self.idx < self.lines.len() {
                let next = strip_comment(self.lines[self.idx]).trim().to_string();
                self.idx += 1;
                depth += bracket_depth(&next);
                text.push(' ');
                text.push_str(&next);
            }
            return Some((line_no, text));
        }
        None
    }
}

fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_str = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_str = !in_str,
            b';' if !in_str => return &line[..i],
            _ => {}
        }
    }
    line
}

fn bracket_depth(line: &str) -> i32 {
    let mut depth = 0;
    let mut in_str = false;
    for &b in line.as_bytes() {
        match b {
            b'"' => in_str = !in_str,
            b'[' if !in_str => depth += 1,
            b']' if !in_str => depth -= 1,
            _ => {}
        }
    }
    depth
}

// ===== Cursor =====

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

const LINKAGE_AND_ATTR_WORDS: &[&str] = &[
    "private",
    "internal",
    "external",
    "linkonce",
    "linkonce_odr",
    "weak",
    "weak_odr",
    "common",
    "appending",
    "extern_weak",
    "dso_local",
    "dso_preemptable",
    "hidden",
    "protected",
    "default",
    "thread_local",
    "unnamed_addr",
    "local_unnamed_addr",
    "externally_initialized",
    "ccc",
    "fastcc",
    "coldcc",
    "zeroext",
    "signext",
    "inreg",
    "noalias",
    "nonnull",
    "noundef",
    "nocapture",
    "readonly",
    "readnone",
    "writeonly",
    "returned",
    "nest",
    "inalloca",
    "immarg",
    "nsw",
    "nuw",
    "exact",
    "nnan",
    "ninf",
    "nsz",
    "arcp",
    "contract",
    "afn",
    "reassoc",
    "fast",
];

const PAREN_ATTR_WORDS: &[&str] = &["byval", "sret", "align", "dereferenceable", "dereferenceable_or_null", "preallocated", "elementtype"];

impl<'a> Cursor<'a> {
    fn new(src: &'a str, line: usize) -> Self {
        Cursor { src, pos: 0, line }
    }

    fn err(&self, message: String) -> ParseError {
        ParseError {
            line: self.line,
            message,
        }
    }

    fn eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, b: u8) -> bool {
        self.skip_ws();
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), ParseError> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(self.err(format!("expected `{}`", b as char)))
        }
    }

    /// A bare keyword/opcode word: letters, digits, `_`, `.`.
    fn word(&mut self) -> String {
        self.skip_ws();
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    /// A value identifier after `%`/`@`/`!`: LLVM's `[-a-zA-Z$._0-9]+` or a
    /// quoted name.
    fn name(&mut self) -> Result<String, ParseError> {
        if self.peek() == Some(b'"') {
            return self.quoted();
        }
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'$' | b'.' | b'_') {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.err("expected identifier".to_string()));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    /// Quoted string contents with `\XX` hex escapes decoded to raw bytes.
    fn quoted_bytes(&mut self) -> Result<Vec<u8>, ParseError> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => {
                    let hi = self.bump().ok_or_else(|| self.err("unterminated escape".into()))?;
                    if hi == b'\\' {
                        out.push(b'\\');
                        continue;
                    }
                    let lo = self.bump().ok_or_else(|| self.err("unterminated escape".into()))?;
                    let hex = [hi, lo];
                    let s = std::str::from_utf8(&hex)
                        .ok()
                        .and_then(|s| u8::from_str_radix(s, 16).ok())
                        .ok_or_else(|| self.err("bad hex escape".into()))?;
                    out.push(s);
                }
                Some(b) => out.push(b),
                None => return Err(self.err("unterminated string".to_string())),
            }
        }
        Ok(out)
    }

    fn quoted(&mut self) -> Result<String, ParseError> {
        let bytes = self.quoted_bytes()?;
        String::from_utf8(bytes).map_err(|_| self.err("non-utf8 string".to_string()))
    }

    fn integer(&mut self) -> Result<i128, ParseError> {
        self.skip_ws();
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.src[start..self.pos]
            .parse::<i128>()
            .map_err(|_| self.err("expected integer".to_string()))
    }

    /// Skip linkage/cconv/attribute words; stops at the first word that is
    /// not one of them (leaving the cursor before it).
    fn skip_attr_words(&mut self) {
        loop {
            self.skip_ws();
            let save = self.pos;
            let w = self.word();
            if w.is_empty() {
                self.pos = save;
                return;
            }
            if PAREN_ATTR_WORDS.contains(&w.as_str()) {
                self.skip_ws();
                if self.peek() == Some(b'(') {
                    self.skip_balanced_parens();
                } else {
                    // `align N`
                    let _ = self.integer();
                }
                continue;
            }
            if LINKAGE_AND_ATTR_WORDS.contains(&w.as_str()) {
                continue;
            }
            self.pos = save;
            return;
        }
    }

    fn skip_balanced_parens(&mut self) {
        let mut depth = 0;
        while let Some(b) = self.bump() {
            match b {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    // ===== Types =====

    fn parse_type(&mut self) -> Result<Type, ParseError> {
        self.skip_ws();
        let mut ty = match self.peek() {
            Some(b'%') => {
                self.pos += 1;
                Type::Named(self.name()?)
            }
            Some(b'[') => {
                self.pos += 1;
                let n = self.integer()? as u64;
                let x = self.word();
                if x != "x" {
                    return Err(self.err("expected `x` in array type".to_string()));
                }
                let elem = self.parse_type()?;
                self.expect(b']')?;
                Type::Array(n, Box::new(elem))
            }
            Some(b'<') => {
                self.pos += 1;
                // `<{ ... }>` packed struct or `<N x T>` vector
                self.skip_ws();
                if self.peek() == Some(b'{') {
                    let inner = self.parse_type()?;
                    self.expect(b'>')?;
                    inner
                } else {
                    let n = self.integer()? as u64;
                    let x = self.word();
                    if x != "x" {
                        return Err(self.err("expected `x` in vector type".to_string()));
                    }
                    let elem = self.parse_type()?;
                    self.expect(b'>')?;
                    Type::Vector(n, Box::new(elem))
                }
            }
            Some(b'{') => {
                self.pos += 1;
                let mut fields = Vec::new();
                self.skip_ws();
                if self.peek() == Some(b'}') {
                    self.pos += 1;
                } else {
                    loop {
                        fields.push(self.parse_type()?);
                        if self.eat(b'}') {
                            break;
                        }
                        self.expect(b',')?;
                    }
                }
                Type::Literal(fields)
            }
            _ => {
                let w = self.word();
                match w.as_str() {
                    "void" => Type::Void,
                    "float" => Type::Float,
                    "double" => Type::Double,
                    "x86_fp80" => Type::X86Fp80,
                    "label" => Type::Label,
                    "metadata" => Type::Metadata,
                    "opaque" => Type::Literal(Vec::new()),
                    _ if w.starts_with('i') && w[1..].chars().all(|c| c.is_ascii_digit()) && w.len() > 1 => {
                        Type::Int(w[1..].parse().map_err(|_| self.err("bad integer width".into()))?)
                    }
                    other => return Err(self.err(format!("unknown type `{}`", other))),
                }
            }
        };

        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    ty = Type::Ptr(Box::new(ty));
                }
                Some(b'(') => {
                    self.pos += 1;
                    let mut params = Vec::new();
                    let mut varargs = false;
                    self.skip_ws();
                    if self.peek() == Some(b')') {
                        self.pos += 1;
                    } else {
                        loop {
                            self.skip_ws();
                            if self.src[self.pos..].starts_with("...") {
                                self.pos += 3;
                                varargs = true;
                            } else {
                                params.push(self.parse_type()?);
                            }
                            if self.eat(b')') {
                                break;
                            }
                            self.expect(b',')?;
                        }
                    }
                    ty = Type::Func {
                        ret: Box::new(ty),
                        params,
                        varargs,
                    };
                }
                _ => break,
            }
        }
        Ok(ty)
    }

    // ===== Operands and constants =====

    fn parse_operand(&mut self, ty: &Type) -> Result<Operand, ParseError> {
        self.skip_ws();
        match self.peek() {
            Some(b'%') => {
                self.pos += 1;
                Ok(Operand::Local(self.name()?))
            }
            Some(b'@') => {
                self.pos += 1;
                Ok(Operand::Global(self.name()?))
            }
            Some(b'c') if self.src[self.pos..].starts_with("c\"") => {
                self.pos += 1;
                Ok(Operand::Const(Constant::CStr(self.quoted_bytes()?)))
            }
            Some(b'[') => {
                self.pos += 1;
                let mut elems = Vec::new();
                self.skip_ws();
                if self.peek() == Some(b']') {
                    self.pos += 1;
                } else {
                    loop {
                        elems.push(self.parse_typed_operand()?);
                        if self.eat(b']') {
                            break;
                        }
                        self.expect(b',')?;
                    }
                }
                Ok(Operand::Const(Constant::Array(elems)))
            }
            Some(b'{') => {
                self.pos += 1;
                let mut elems = Vec::new();
                self.skip_ws();
                if self.peek() == Some(b'}') {
                    self.pos += 1;
                } else {
                    loop {
                        elems.push(self.parse_typed_operand()?);
                        if self.eat(b'}') {
                            break;
                        }
                        self.expect(b',')?;
                    }
                }
                Ok(Operand::Const(Constant::Struct(elems)))
            }
            Some(b) if b == b'-' || b.is_ascii_digit() => {
                if ty.is_float_ty() {
                    Ok(Operand::Const(Constant::Float(self.float_literal()?)))
                } else {
                    Ok(Operand::Const(Constant::Int(self.integer()?)))
                }
            }
            _ => {
                let save = self.pos;
                let w = self.word();
                match w.as_str() {
                    "true" => Ok(Operand::Const(Constant::Int(1))),
                    "false" => Ok(Operand::Const(Constant::Int(0))),
                    "null" => Ok(Operand::Const(Constant::Null)),
                    "undef" | "poison" => Ok(Operand::Const(Constant::Undef)),
                    "zeroinitializer" => Ok(Operand::Const(Constant::Zero)),
                    "getelementptr" => {
                        let inbounds = {
                            let s = self.pos;
                            if self.word() == "inbounds" {
                                true
                            } else {
                                self.pos = s;
                                false
                            }
                        };
                        self.expect(b'(')?;
                        let src_ty = self.parse_type()?;
                        self.expect(b',')?;
                        let base = self.parse_typed_operand()?;
                        let mut indices = Vec::new();
                        while self.eat(b',') {
                            indices.push(self.parse_typed_operand()?);
                        }
                        self.expect(b')')?;
                        Ok(Operand::Const(Constant::Expr(Box::new(ConstExpr::Gep {
                            inbounds,
                            src_ty,
                            base,
                            indices,
                        }))))
                    }
                    _ => {
                        if let Some(op) = cast_op(&w) {
                            self.expect(b'(')?;
                            let val = self.parse_typed_operand()?;
                            let to_kw = self.word();
                            if to_kw != "to" {
                                return Err(self.err("expected `to` in cast".to_string()));
                            }
                            let to = self.parse_type()?;
                            self.expect(b')')?;
                            return Ok(Operand::Const(Constant::Expr(Box::new(ConstExpr::Cast {
                                op,
                                val,
                                to,
                            }))));
                        }
                        self.pos = save;
                        Err(self.err(format!("expected operand, found `{}`", w)))
                    }
                }
            }
        }
    }

    fn parse_typed_operand(&mut self) -> Result<TypedOperand, ParseError> {
        let ty = self.parse_type()?;
        self.skip_attr_words();
        let op = self.parse_operand(&ty)?;
        Ok(TypedOperand { ty, op })
    }

    fn float_literal(&mut self) -> Result<f64, ParseError> {
        self.skip_ws();
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        if self.src[self.pos..].starts_with("0x") {
            self.pos += 2;
            // Optional width marker: K (x86_fp80), H/L/M/R others.
            let marker = match self.peek() {
                Some(m @ (b'K' | b'H' | b'L' | b'M' | b'R')) => {
                    self.pos += 1;
                    Some(m)
                }
                _ => None,
            };
            let hex_start = self.pos;
            while matches!(self.peek(), Some(b) if b.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let hex = &self.src[hex_start..self.pos];
            let neg = self.src.as_bytes()[start] == b'-';
            let value = match marker {
                None => {
                    let bits = u64::from_str_radix(hex, 16)
                        .map_err(|_| self.err("bad float literal".to_string()))?;
                    f64::from_bits(bits)
                }
                Some(b'K') => {
                    // 80-bit extended: 16-bit sign+exponent, 64-bit mantissa
                    // with explicit integer bit.
                    let bits = u128::from_str_radix(hex, 16)
                        .map_err(|_| self.err("bad float literal".to_string()))?;
                    let sign = if bits >> 79 & 1 == 1 { -1.0 } else { 1.0 };
                    let exp = ((bits >> 64) & 0x7fff) as i32;
                    let mantissa = (bits & u64::MAX as u128) as u64;
                    sign * mantissa as f64 * 2f64.powi(exp - 16383 - 63)
                }
                Some(_) => {
                    return Err(self.err("unsupported float literal width".to_string()));
                }
            };
            return Ok(if neg { -value } else { value });
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_digit() || b == b'.' || b == b'e' || b == b'E' || b == b'+' || b == b'-') {
            // `e+`/`e-` are only valid after the exponent marker; a bare
            // `+`/`-` terminates the literal.
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                let prev = self.src.as_bytes()[self.pos - 1];
                if prev != b'e' && prev != b'E' {
                    break;
                }
            }
            self.pos += 1;
        }
        self.src[start..self.pos]
            .parse::<f64>()
            .map_err(|_| self.err("bad float literal".to_string()))
    }
}

fn cast_op(word: &str) -> Option<CastOp> {
    Some(match word {
        "trunc" => CastOp::Trunc,
        "zext" => CastOp::ZExt,
        "sext" => CastOp::SExt,
        "fptoui" => CastOp::FpToUi,
        "fptosi" => CastOp::FpToSi,
        "uitofp" => CastOp::UiToFp,
        "sitofp" => CastOp::SiToFp,
        "ptrtoint" => CastOp::PtrToInt,
        "inttoptr" => CastOp::IntToPtr,
        "bitcast" => CastOp::BitCast,
        "fpext" => CastOp::FpExt,
        "fptrunc" => CastOp::FpTrunc,
        _ => return None,
    })
}

fn bin_op(word: &str) -> Option<BinOp> {
    Some(match word {
        "add" => BinOp::Add,
        "fadd" => BinOp::FAdd,
        "sub" => BinOp::Sub,
        "fsub" => BinOp::FSub,
        "mul" => BinOp::Mul,
        "fmul" => BinOp::FMul,
        "udiv" => BinOp::UDiv,
        "sdiv" => BinOp::SDiv,
        "fdiv" => BinOp::FDiv,
        "urem" => BinOp::URem,
        "srem" => BinOp::SRem,
        "frem" => BinOp::FRem,
        "and" => BinOp::And,
        "or" => BinOp::Or,
        "xor" => BinOp::Xor,
        "shl" => BinOp::Shl,
        "lshr" => BinOp::LShr,
        "ashr" => BinOp::AShr,
        _ => return None,
    })
}

const OTHER_OPCODES: &[&str] = &[
    "invoke",
    "landingpad",
    "resume",
    "indirectbr",
    "callbr",
    "atomicrmw",
    "cmpxchg",
    "fence",
    "insertvalue",
    "insertelement",
    "extractelement",
    "shufflevector",
    "freeze",
    "va_arg",
    "catchswitch",
    "catchret",
    "cleanupret",
    "catchpad",
    "cleanuppad",
];

// ===== Top-level constructs =====

/// `target datalayout`/`target triple` lines. Only the pointer width is
/// extracted; a datalayout wins over the triple.
fn parse_target(cur: &mut Cursor, module: &mut Module, saw_datalayout: &mut bool) {
    let kind = cur.word();
    if !cur.eat(b'=') {
        return;
    }
    cur.skip_ws();
    let Ok(value) = cur.quoted() else {
        return;
    };
    match kind.as_str() {
        "datalayout" => {
            if let Some(width) = datalayout_pointer_width(&value) {
                module.pointer_width = width;
                *saw_datalayout = true;
            }
        }
        "triple" => {
            if !*saw_datalayout {
                if let Some(width) = triple_pointer_width(&value) {
                    module.pointer_width = width;
                }
            }
        }
        _ => {}
    }
}

/// The address-space-0 pointer component (`p:32:32`) of a datalayout.
fn datalayout_pointer_width(layout: &str) -> Option<u32> {
    for part in layout.split('-') {
        let rest = part.strip_prefix("p:").or_else(|| part.strip_prefix("p0:"));
        if let Some(rest) = rest {
            if let Some(width) = rest.split(':').next().and_then(|w| w.parse().ok()) {
                return Some(width);
            }
        }
    }
    None
}

fn triple_pointer_width(triple: &str) -> Option<u32> {
    let arch = triple.split('-').next().unwrap_or("");
    match arch {
        "i386" | "i486" | "i586" | "i686" | "arm" | "armv7" | "thumb" | "thumbv7" | "mips"
        | "mipsel" | "riscv32" | "wasm32" => Some(32),
        "x86_64" | "aarch64" | "arm64" | "mips64" | "mips64el" | "riscv64" | "wasm64"
        | "powerpc64" | "powerpc64le" => Some(64),
        _ => None,
    }
}

fn parse_struct_def(cur: &mut Cursor, module: &mut Module) -> Result<(), ParseError> {
    cur.expect(b'%')?;
    let name = cur.name()?;
    cur.expect(b'=')?;
    let kw = cur.word();
    if kw != "type" {
        return Err(cur.err(format!("expected `type` after `%{} =`", name)));
    }
    cur.skip_ws();
    let save = cur.pos;
    let w = cur.word();
    if w == "opaque" {
        module.structs.push(StructDef {
            name,
            fields: Vec::new(),
            opaque: true,
        });
        return Ok(());
    }
    cur.pos = save;
    let body = cur.parse_type()?;
    let fields = match body {
        Type::Literal(fields) => fields,
        other => return Err(cur.err(format!("expected struct body, found {:?}", other))),
    };
    module.structs.push(StructDef {
        name,
        fields,
        opaque: false,
    });
    Ok(())
}

fn parse_global(cur: &mut Cursor, module: &mut Module) -> Result<(), ParseError> {
    cur.expect(b'@')?;
    let name = cur.name()?;
    cur.expect(b'=')?;

    let mut is_private = false;
    let mut is_extern = false;
    let is_constant;
    loop {
        let save = cur.pos;
        let w = cur.word();
        match w.as_str() {
            "private" | "internal" => {
                is_private = true;
            }
            "external" | "extern_weak" => {
                is_extern = true;
            }
            "global" => {
                is_constant = false;
                break;
            }
            "constant" => {
                is_constant = true;
                break;
            }
            "alias" | "ifunc" => return Ok(()),
            _ if LINKAGE_AND_ATTR_WORDS.contains(&w.as_str()) => {}
            _ if w == "addrspace" => {
                cur.skip_ws();
                if cur.peek() == Some(b'(') {
                    cur.skip_balanced_parens();
                }
            }
            other => {
                cur.pos = save;
                return Err(cur.err(format!("unexpected token `{}` in global", other)));
            }
        }
    }

    let ty = cur.parse_type()?;
    cur.skip_ws();
    let init = if is_extern || cur.eof() || cur.peek() == Some(b',') {
        None
    } else {
        match cur.parse_operand(&ty)? {
            Operand::Const(c) => Some(c),
            Operand::Global(g) => Some(Constant::GlobalRef(g)),
            Operand::Local(_) => {
                return Err(cur.err("local value in global initializer".to_string()))
            }
        }
    };

    module.globals.push(Global {
        name,
        ty,
        init,
        is_private,
        is_constant,
    });
    Ok(())
}

/// Shared by `declare` and the `define` header: linkage words, return type,
/// name, parameter list.
fn parse_signature(cur: &mut Cursor) -> Result<Function, ParseError> {
    cur.skip_attr_words();
    let mut is_internal = false;
    {
        // `internal`/`private` are consumed by skip_attr_words; re-scan the
        // consumed prefix for them.
        let prefix = &cur.src[..cur.pos];
        if prefix.contains("internal") || prefix.contains("private") {
            is_internal = true;
        }
    }
    let ret = cur.parse_type()?;
    cur.skip_attr_words();
    cur.expect(b'@')?;
    let name = cur.name()?;
    cur.expect(b'(')?;

    let mut params = Vec::new();
    let mut varargs = false;
    cur.skip_ws();
    if cur.peek() == Some(b')') {
        cur.pos += 1;
    } else {
        loop {
            cur.skip_ws();
            if cur.src[cur.pos..].starts_with("...") {
                cur.pos += 3;
                varargs = true;
            } else {
                let ty = cur.parse_type()?;
                cur.skip_attr_words();
                cur.skip_ws();
                let pname = if cur.peek() == Some(b'%') {
                    cur.pos += 1;
                    cur.name()?
                } else {
                    params.len().to_string()
                };
                params.push(Param { name: pname, ty });
            }
            if cur.eat(b')') {
                break;
            }
            cur.expect(b',')?;
        }
    }

    Ok(Function {
        name,
        ret,
        params,
        varargs,
        blocks: Vec::new(),
        is_internal,
    })
}

fn parse_define(
    cur: &mut Cursor,
    lines: &mut Lines,
    module: &mut Module,
) -> Result<(), ParseError> {
    let kw = cur.word();
    debug_assert_eq!(kw, "define");
    let mut func = parse_signature(cur)?;

    // Body: blocks until the closing `}`.
    let mut current: Option<BasicBlock> = None;
    loop {
        let (line_no, text) = lines
            .next_logical()
            .ok_or_else(|| cur.err("unterminated function body".to_string()))?;
        let trimmed = text.trim();
        if trimmed == "}" {
            break;
        }
        if let Some(label) = label_line(trimmed) {
            if let Some(block) = current.take() {
                func.blocks.push(block);
            }
            current = Some(BasicBlock {
                label,
                insts: Vec::new(),
            });
            continue;
        }
        let block = current.get_or_insert_with(|| BasicBlock {
            label: "entry".to_string(),
            insts: Vec::new(),
        });
        let mut icur = Cursor::new(trimmed, line_no);
        if let Some(inst) = parse_inst(&mut icur)? {
            block.insts.push(inst);
        }
    }
    if let Some(block) = current.take() {
        func.blocks.push(block);
    }

    module.functions.push(func);
    Ok(())
}

fn label_line(line: &str) -> Option<String> {
    let body = line.strip_suffix(':')?;
    if !body.is_empty()
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'$' | b'.' | b'_'))
    {
        Some(body.to_string())
    } else {
        None
    }
}

// ===== Instructions =====

/// Parse one instruction line. Returns `None` for instructions that are
/// consumed silently (debug intrinsics other than `llvm.dbg.declare`).
fn parse_inst(cur: &mut Cursor) -> Result<Option<Inst>, ParseError> {
    cur.skip_ws();
    let result = if cur.peek() == Some(b'%') {
        cur.pos += 1;
        let name = cur.name()?;
        cur.expect(b'=')?;
        Some(name)
    } else {
        None
    };

    let mut opcode = cur.word();
    if matches!(opcode.as_str(), "tail" | "musttail" | "notail") {
        opcode = cur.word();
    }

    if let Some(op) = bin_op(&opcode) {
        cur.skip_attr_words();
        let ty = cur.parse_type()?;
        let lhs = cur.parse_operand(&ty)?;
        cur.expect(b',')?;
        let rhs = cur.parse_operand(&ty)?;
        return Ok(Some(Inst::Bin {
            result: result.ok_or_else(|| cur.err("binary op without result".into()))?,
            op,
            ty,
            lhs,
            rhs,
        }));
    }

    if let Some(op) = cast_op(&opcode) {
        let val = cur.parse_typed_operand()?;
        let to_kw = cur.word();
        if to_kw != "to" {
            return Err(cur.err("expected `to` in cast".to_string()));
        }
        let to = cur.parse_type()?;
        return Ok(Some(Inst::Cast {
            result: result.ok_or_else(|| cur.err("cast without result".into()))?,
            op,
            val,
            to,
        }));
    }

    match opcode.as_str() {
        "alloca" => {
            cur.skip_attr_words();
            let ty = cur.parse_type()?;
            if cur.eat(b',') {
                let save = cur.pos;
                let w = cur.word();
                if w != "align" && w != "addrspace" {
                    // Dynamic count operand: outside the supported set.
                    cur.pos = save;
                    return Ok(Some(Inst::Other {
                        opcode: "dynamic alloca".to_string(),
                    }));
                }
            }
            Ok(Some(Inst::Alloca {
                result: result.ok_or_else(|| cur.err("alloca without result".into()))?,
                ty,
            }))
        }
        "load" => {
            cur.skip_ws();
            let save = cur.pos;
            if cur.word() != "volatile" {
                cur.pos = save;
            }
            let ty = cur.parse_type()?;
            cur.expect(b',')?;
            let ptr = cur.parse_typed_operand()?;
            Ok(Some(Inst::Load {
                result: result.ok_or_else(|| cur.err("load without result".into()))?,
                ty,
                ptr,
            }))
        }
        "store" => {
            cur.skip_ws();
            let save = cur.pos;
            if cur.word() != "volatile" {
                cur.pos = save;
            }
            let val = cur.parse_typed_operand()?;
            cur.expect(b',')?;
            let ptr = cur.parse_typed_operand()?;
            Ok(Some(Inst::Store { val, ptr }))
        }
        "icmp" | "fcmp" => {
            cur.skip_attr_words();
            let pred = cur.word();
            let ty = cur.parse_type()?;
            let lhs = cur.parse_operand(&ty)?;
            cur.expect(b',')?;
            let rhs = cur.parse_operand(&ty)?;
            let result = result.ok_or_else(|| cur.err("cmp without result".into()))?;
            if opcode == "icmp" {
                Ok(Some(Inst::Icmp {
                    result,
                    pred,
                    ty,
                    lhs,
                    rhs,
                }))
            } else {
                Ok(Some(Inst::Fcmp {
                    result,
                    pred,
                    ty,
                    lhs,
                    rhs,
                }))
            }
        }
        "br" => {
            let w = cur.word();
            if w == "label" {
                cur.expect(b'%')?;
                return Ok(Some(Inst::Br {
                    target: cur.name()?,
                }));
            }
            // `br i1 %c, label %a, label %b`
            let cond = cur.parse_operand(&Type::Int(1))?;
            cur.expect(b',')?;
            let lw = cur.word();
            if lw != "label" {
                return Err(cur.err("expected `label` in br".to_string()));
            }
            cur.expect(b'%')?;
            let then_target = cur.name()?;
            cur.expect(b',')?;
            let lw = cur.word();
            if lw != "label" {
                return Err(cur.err("expected `label` in br".to_string()));
            }
            cur.expect(b'%')?;
            let else_target = cur.name()?;
            Ok(Some(Inst::BrCond {
                cond,
                then_target,
                else_target,
            }))
        }
        "ret" => {
            let ty = cur.parse_type()?;
            if ty == Type::Void {
                Ok(Some(Inst::Ret { val: None }))
            } else {
                let op = cur.parse_operand(&ty)?;
                Ok(Some(Inst::Ret {
                    val: Some(TypedOperand { ty, op }),
                }))
            }
        }
        "switch" => {
            let val = cur.parse_typed_operand()?;
            cur.expect(b',')?;
            let lw = cur.word();
            if lw != "label" {
                return Err(cur.err("expected `label` in switch".to_string()));
            }
            cur.expect(b'%')?;
            let default = cur.name()?;
            cur.expect(b'[')?;
            let mut cases = Vec::new();
            loop {
                cur.skip_ws();
                if cur.eat(b']') {
                    break;
                }
                let cty = cur.parse_type()?;
                let cv = match cur.parse_operand(&cty)? {
                    Operand::Const(Constant::Int(v)) => v,
                    other => {
                        return Err(cur.err(format!("non-integer switch case {:?}", other)))
                    }
                };
                cur.expect(b',')?;
                let lw = cur.word();
                if lw != "label" {
                    return Err(cur.err("expected `label` in switch case".to_string()));
                }
                cur.expect(b'%')?;
                cases.push((cv, cur.name()?));
            }
            Ok(Some(Inst::Switch {
                val,
                default,
                cases,
            }))
        }
        "phi" => {
            cur.skip_attr_words();
            let ty = cur.parse_type()?;
            let mut incoming = Vec::new();
            loop {
                cur.expect(b'[')?;
                let op = cur.parse_operand(&ty)?;
                cur.expect(b',')?;
                cur.expect(b'%')?;
                let label = cur.name()?;
                cur.expect(b']')?;
                incoming.push((op, label));
                if !cur.eat(b',') {
                    break;
                }
            }
            Ok(Some(Inst::Phi {
                result: result.ok_or_else(|| cur.err("phi without result".into()))?,
                ty,
                incoming,
            }))
        }
        "select" => {
            let cond = cur.parse_typed_operand()?;
            cur.expect(b',')?;
            let then_val = cur.parse_typed_operand()?;
            cur.expect(b',')?;
            let else_val = cur.parse_typed_operand()?;
            Ok(Some(Inst::Select {
                result: result.ok_or_else(|| cur.err("select without result".into()))?,
                cond,
                then_val,
                else_val,
            }))
        }
        "getelementptr" => {
            let inbounds = {
                let save = cur.pos;
                if cur.word() == "inbounds" {
                    true
                } else {
                    cur.pos = save;
                    false
                }
            };
            let src_ty = cur.parse_type()?;
            cur.expect(b',')?;
            let base = cur.parse_typed_operand()?;
            let mut indices = Vec::new();
            loop {
                cur.skip_ws();
                if !cur.eat(b',') {
                    break;
                }
                cur.skip_ws();
                if cur.peek() == Some(b'!') {
                    break;
                }
                let save = cur.pos;
                if cur.word() != "inrange" {
                    cur.pos = save;
                }
                indices.push(cur.parse_typed_operand()?);
            }
            Ok(Some(Inst::Gep {
                result: result.ok_or_else(|| cur.err("gep without result".into()))?,
                inbounds,
                src_ty,
                base,
                indices,
            }))
        }
        "extractvalue" => {
            let base = cur.parse_typed_operand()?;
            let mut indices = Vec::new();
            while cur.eat(b',') {
                cur.skip_ws();
                if cur.peek() == Some(b'!') {
                    break;
                }
                indices.push(cur.integer()? as u32);
            }
            Ok(Some(Inst::ExtractValue {
                result: result.ok_or_else(|| cur.err("extractvalue without result".into()))?,
                base,
                indices,
            }))
        }
        "call" => parse_call(cur, result),
        "unreachable" => Ok(Some(Inst::Unreachable)),
        other if OTHER_OPCODES.contains(&other) => Ok(Some(Inst::Other {
            opcode: other.to_string(),
        })),
        other => Err(cur.err(format!("unknown instruction `{}`", other))),
    }
}

enum CallArg {
    Value(TypedOperand),
    Meta(Option<u64>),
}

fn parse_call(cur: &mut Cursor, result: Option<String>) -> Result<Option<Inst>, ParseError> {
    cur.skip_attr_words();
    let ty = cur.parse_type()?;
    // With an explicit function type the return type is its `ret`; a plain
    // type is the return type itself.
    let ret_ty = match &ty {
        Type::Func { ret, .. } => (**ret).clone(),
        other => other.clone(),
    };

    cur.skip_ws();
    let callee = match cur.peek() {
        Some(b'@') => {
            cur.pos += 1;
            Callee::Global(cur.name()?)
        }
        Some(b'%') => {
            cur.pos += 1;
            Callee::Value(TypedOperand {
                ty: ty.clone(),
                op: Operand::Local(cur.name()?),
            })
        }
        _ => {
            let w = cur.word();
            if w != "asm" {
                return Err(cur.err(format!("expected callee, found `{}`", w)));
            }
            let mut sideeffect = false;
            loop {
                let save = cur.pos;
                let flag = cur.word();
                match flag.as_str() {
                    "sideeffect" => sideeffect = true,
                    "alignstack" | "inteldialect" | "unwind" => {}
                    _ => {
                        cur.pos = save;
                        break;
                    }
                }
            }
            let template = cur.quoted()?;
            cur.expect(b',')?;
            let constraints = cur.quoted()?;
            Callee::Asm {
                template,
                constraints,
                sideeffect,
            }
        }
    };

    cur.expect(b'(')?;
    let mut args = Vec::new();
    cur.skip_ws();
    if cur.peek() == Some(b')') {
        cur.pos += 1;
    } else {
        loop {
            cur.skip_ws();
            let save = cur.pos;
            let w = cur.word();
            if w == "metadata" {
                cur.skip_ws();
                if cur.peek() == Some(b'!') {
                    cur.pos += 1;
                    cur.skip_ws();
                    if matches!(cur.peek(), Some(b) if b.is_ascii_digit()) {
                        args.push(CallArg::Meta(Some(cur.integer()? as u64)));
                    } else {
                        // `!DIExpression(...)` or a tuple; skip it.
                        let _ = cur.name();
                        cur.skip_ws();
                        if cur.peek() == Some(b'(') {
                            cur.skip_balanced_parens();
                        }
                        args.push(CallArg::Meta(None));
                    }
                } else {
                    let inner = cur.parse_typed_operand()?;
                    args.push(CallArg::Value(inner));
                }
            } else {
                cur.pos = save;
                args.push(CallArg::Value(cur.parse_typed_operand()?));
            }
            if cur.eat(b')') {
                break;
            }
            cur.expect(b',')?;
        }
    }

    if let Callee::Global(name) = &callee {
        if name == "llvm.dbg.declare" {
            let mut var = None;
            let mut di_var = None;
            for a in &args {
                match a {
                    CallArg::Value(tv) => {
                        if var.is_none() {
                            var = Some(tv.op.clone());
                        }
                    }
                    CallArg::Meta(Some(id)) => {
                        if di_var.is_none() {
                            di_var = Some(*id);
                        }
                    }
                    CallArg::Meta(None) => {}
                }
            }
            return match (var, di_var) {
                (Some(var), Some(di_var)) => Ok(Some(Inst::DbgDeclare { var, di_var })),
                _ => Ok(None),
            };
        }
        if name.starts_with("llvm.dbg.") {
            return Ok(None);
        }
    }

    let args = args
        .into_iter()
        .filter_map(|a| match a {
            CallArg::Value(tv) => Some(tv),
            CallArg::Meta(_) => None,
        })
        .collect();

    Ok(Some(Inst::Call {
        result,
        ret_ty,
        callee,
        args,
    }))
}

// ===== Metadata =====

fn parse_metadata(cur: &mut Cursor, module: &mut Module) -> Result<(), ParseError> {
    cur.expect(b'!')?;
    cur.skip_ws();
    if !matches!(cur.peek(), Some(b) if b.is_ascii_digit()) {
        // Named metadata (`!llvm.module.flags = ...`); ignored.
        return Ok(());
    }
    let id = cur.integer()? as u64;
    cur.expect(b'=')?;
    {
        let save = cur.pos;
        if cur.word() != "distinct" {
            cur.pos = save;
        }
    }
    if !cur.eat(b'!') {
        return Ok(());
    }
    cur.skip_ws();
    if cur.peek() == Some(b'{') {
        // Plain tuple; ignored.
        return Ok(());
    }
    let kind = cur.word();
    cur.skip_ws();
    if cur.peek() != Some(b'(') {
        return Ok(());
    }
    cur.pos += 1;

    let mut str_fields: Vec<(String, String)> = Vec::new();
    let mut ref_fields: Vec<(String, u64)> = Vec::new();
    let mut null_fields: Vec<String> = Vec::new();
    loop {
        cur.skip_ws();
        if cur.eat(b')') {
            break;
        }
        let key = cur.word();
        if key.is_empty() {
            return Err(cur.err("expected metadata field name".to_string()));
        }
        cur.expect(b':')?;
        cur.skip_ws();
        match cur.peek() {
            Some(b'"') => {
                let v = cur.quoted()?;
                str_fields.push((key, v));
            }
            Some(b'!') => {
                cur.pos += 1;
                cur.skip_ws();
                if matches!(cur.peek(), Some(b) if b.is_ascii_digit()) {
                    let v = cur.integer()? as u64;
                    ref_fields.push((key, v));
                } else if cur.peek() == Some(b'{') {
                    skip_balanced(cur, b'{', b'}');
                } else {
                    let _ = cur.name();
                    cur.skip_ws();
                    if cur.peek() == Some(b'(') {
                        cur.skip_balanced_parens();
                    }
                }
            }
            Some(b) if b == b'-' || b.is_ascii_digit() => {
                let _ = cur.integer()?;
            }
            _ => {
                let w = cur.word();
                if w == "null" {
                    null_fields.push(key.clone());
                }
                if w.is_empty() {
                    return Err(cur.err("expected metadata field value".to_string()));
                }
                str_fields.push((key, w));
            }
        }
        cur.skip_ws();
        if cur.peek() == Some(b',') {
            cur.pos += 1;
        }
    }

    let get_str = |k: &str| {
        str_fields
            .iter()
            .find(|(key, _)| key == k)
            .map(|(_, v)| v.clone())
    };
    let get_ref = |k: &str| ref_fields.iter().find(|(key, _)| key == k).map(|(_, v)| *v);

    match kind.as_str() {
        "DILocalVariable" => {
            module.di_locals.insert(
                id,
                DiLocalVar {
                    name: get_str("name").unwrap_or_default(),
                    ty: get_ref("type"),
                },
            );
        }
        "DIBasicType" => {
            module.di_types.insert(
                id,
                DiType::Basic {
                    name: get_str("name"),
                    encoding: get_str("encoding"),
                },
            );
        }
        "DIDerivedType" => {
            let base = if null_fields.iter().any(|k| k == "baseType") {
                None
            } else {
                get_ref("baseType")
            };
            module.di_types.insert(id, DiType::Derived { base });
        }
        _ => {}
    }
    Ok(())
}

fn skip_balanced(cur: &mut Cursor, open: u8, close: u8) {
    let mut depth = 0;
    while let Some(b) = cur.bump() {
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return;
            }
        }
    }
}
