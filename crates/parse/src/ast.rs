use std::collections::HashMap;

/// An LLVM IR type as written in textual IR (typed-pointer dialect).
///
/// Derives `Eq + Hash` so that a structurally identical anonymous struct
/// type can be used as a registry key, standing in for LLVM's uniqued
/// type pointers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    /// `iN` with its bit width.
    Int(u32),
    Float,
    Double,
    X86Fp80,
    Ptr(Box<Type>),
    /// `[N x T]`
    Array(u64, Box<Type>),
    /// Identified struct type, name without the leading `%`
    /// (e.g. `struct.point`, `union.u`, `0`).
    Named(String),
    /// Anonymous literal struct type `{ T, T, ... }`.
    Literal(Vec<Type>),
    /// `<N x T>` — parsed but rejected by the translator.
    Vector(u64, Box<Type>),
    Func {
        ret: Box<Type>,
        params: Vec<Type>,
        varargs: bool,
    },
    Label,
    Metadata,
}

impl Type {
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_float_ty(&self) -> bool {
        matches!(self, Type::Float | Type::Double | Type::X86Fp80)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i128),
    Float(f64),
    Null,
    Undef,
    Zero,
    /// Raw bytes of a `c"..."` data array, escapes already decoded.
    CStr(Vec<u8>),
    /// `@name` used as an initializer.
    GlobalRef(String),
    Array(Vec<TypedOperand>),
    Struct(Vec<TypedOperand>),
    Expr(Box<ConstExpr>),
}

/// Constant expressions embedded in operands. Lowered through the same
/// handlers as the corresponding instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstExpr {
    Gep {
        inbounds: bool,
        src_ty: Type,
        base: TypedOperand,
        indices: Vec<TypedOperand>,
    },
    Cast {
        op: CastOp,
        val: TypedOperand,
        to: Type,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// SSA register `%name`.
    Local(String),
    /// `@name`.
    Global(String),
    Const(Constant),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedOperand {
    pub ty: Type,
    pub op: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    FAdd,
    Sub,
    FSub,
    Mul,
    FMul,
    UDiv,
    SDiv,
    FDiv,
    URem,
    SRem,
    FRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    FpToUi,
    FpToSi,
    UiToFp,
    SiToFp,
    PtrToInt,
    IntToPtr,
    BitCast,
    FpExt,
    FpTrunc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Global(String),
    /// Indirect call through a function pointer value.
    Value(TypedOperand),
    Asm {
        template: String,
        constraints: String,
        sideeffect: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Alloca {
        result: String,
        ty: Type,
    },
    Load {
        result: String,
        ty: Type,
        ptr: TypedOperand,
    },
    Store {
        val: TypedOperand,
        ptr: TypedOperand,
    },
    Bin {
        result: String,
        op: BinOp,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    Icmp {
        result: String,
        pred: String,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    Fcmp {
        result: String,
        pred: String,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    Br {
        target: String,
    },
    BrCond {
        cond: Operand,
        then_target: String,
        else_target: String,
    },
    Ret {
        val: Option<TypedOperand>,
    },
    Switch {
        val: TypedOperand,
        default: String,
        cases: Vec<(i128, String)>,
    },
    Call {
        result: Option<String>,
        ret_ty: Type,
        callee: Callee,
        args: Vec<TypedOperand>,
    },
    Cast {
        result: String,
        op: CastOp,
        val: TypedOperand,
        to: Type,
    },
    Select {
        result: String,
        cond: TypedOperand,
        then_val: TypedOperand,
        else_val: TypedOperand,
    },
    Gep {
        result: String,
        inbounds: bool,
        src_ty: Type,
        base: TypedOperand,
        indices: Vec<TypedOperand>,
    },
    ExtractValue {
        result: String,
        base: TypedOperand,
        indices: Vec<u32>,
    },
    Phi {
        result: String,
        ty: Type,
        incoming: Vec<(Operand, String)>,
    },
    /// `call void @llvm.dbg.declare(metadata <ty> %var, metadata !N, ...)`
    DbgDeclare {
        var: Operand,
        di_var: u64,
    },
    Unreachable,
    /// Recognized but untranslatable opcode (invoke, atomics, vector ops, ...).
    Other {
        opcode: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub insts: Vec<Inst>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub ret: Type,
    pub params: Vec<Param>,
    pub varargs: bool,
    /// Empty for declarations.
    pub blocks: Vec<BasicBlock>,
    pub is_internal: bool,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    /// IR name without the leading `%`.
    pub name: String,
    pub fields: Vec<Type>,
    pub opaque: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    /// Value type (the pointee of the IR global's pointer type).
    pub ty: Type,
    /// `None` for external declarations.
    pub init: Option<Constant>,
    pub is_private: bool,
    pub is_constant: bool,
}

/// `!N = !DILocalVariable(...)`
#[derive(Debug, Clone, PartialEq)]
pub struct DiLocalVar {
    pub name: String,
    pub ty: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiType {
    Basic {
        name: Option<String>,
        encoding: Option<String>,
    },
    /// Typedef/pointer/qualifier chain; `base` is `None` when the chain ends
    /// in the unnamed primitive, i.e. `void`.
    Derived {
        base: Option<u64>,
    },
}

/// A parsed LLVM module: the read-only query surface the translator consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub name: String,
    /// Pointer width in bits, taken from `target datalayout` (or the
    /// `target triple` when no datalayout names one); 64 otherwise.
    pub pointer_width: u32,
    pub structs: Vec<StructDef>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
    pub di_locals: HashMap<u64, DiLocalVar>,
    pub di_types: HashMap<u64, DiType>,
}

impl Module {
    pub fn get_struct(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}
