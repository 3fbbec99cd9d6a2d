use parse::ast as ir;

use crate::program::Program;
use crate::{Result, TranslateError};

/// A C type. Pointer and array variants record whether a struct hides
/// behind them so the emitter can hoist the struct's definition first.
#[derive(Debug, Clone, PartialEq)]
pub enum CType {
    Void,
    Char { unsigned: bool },
    Short { unsigned: bool },
    Int { unsigned: bool },
    Long { unsigned: bool },
    UInt128,
    Float,
    Double,
    LongDouble,
    Pointer {
        elem: Box<CType>,
        is_struct_ptr: bool,
        is_array_ptr: bool,
        struct_name: Option<String>,
    },
    Array {
        elem: Box<CType>,
        len: u64,
        is_struct_array: bool,
        struct_name: Option<String>,
    },
    /// Reference to a named struct or union by its emitted C name
    /// (`s_*`, `u_*`, or `__va_list_tag`).
    Struct(String),
    /// Anonymous struct used inline; the field carries the printed body.
    AnonStruct(String),
    Func {
        ret: Box<CType>,
        params: Vec<CType>,
    },
}

impl CType {
    pub fn pointer_to(elem: CType) -> CType {
        let (is_struct_ptr, is_array_ptr, struct_name) = match &elem {
            CType::Struct(name) => (true, false, Some(name.clone())),
            CType::Array {
                is_struct_array: true,
                struct_name,
                ..
            } => (true, true, struct_name.clone()),
            _ => (false, false, None),
        };
        CType::Pointer {
            elem: Box::new(elem),
            is_struct_ptr,
            is_array_ptr,
            struct_name,
        }
    }

    pub fn array_of(elem: CType, len: u64) -> CType {
        let (is_struct_array, struct_name) = match &elem {
            CType::Struct(name) => (true, Some(name.clone())),
            _ => (false, None),
        };
        CType::Array {
            elem: Box::new(elem),
            len,
            is_struct_array,
            struct_name,
        }
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            CType::Char { unsigned: true }
                | CType::Short { unsigned: true }
                | CType::Int { unsigned: true }
                | CType::Long { unsigned: true }
                | CType::UInt128
        )
    }

    /// The same rank with the unsigned flag set; non-integer types are
    /// returned unchanged.
    pub fn as_unsigned(&self) -> CType {
        match self {
            CType::Char { .. } => CType::Char { unsigned: true },
            CType::Short { .. } => CType::Short { unsigned: true },
            CType::Int { .. } => CType::Int { unsigned: true },
            CType::Long { .. } => CType::Long { unsigned: true },
            other => other.clone(),
        }
    }

    pub fn set_unsigned(&mut self) {
        *self = self.as_unsigned();
    }

    fn base_str(&self) -> String {
        match self {
            CType::Void => "void".to_string(),
            CType::Char { unsigned } => {
                if *unsigned {
                    "unsigned char".to_string()
                } else {
                    "char".to_string()
                }
            }
            CType::Short { unsigned } => {
                if *unsigned {
                    "unsigned short".to_string()
                } else {
                    "short".to_string()
                }
            }
            CType::Int { unsigned } => {
                if *unsigned {
                    "unsigned int".to_string()
                } else {
                    "int".to_string()
                }
            }
            CType::Long { unsigned } => {
                if *unsigned {
                    "unsigned long".to_string()
                } else {
                    "long".to_string()
                }
            }
            CType::UInt128 => "__uint128_t".to_string(),
            CType::Float => "float".to_string(),
            CType::Double => "double".to_string(),
            CType::LongDouble => "long double".to_string(),
            CType::Struct(name) => {
                if name.starts_with("u_") {
                    format!("union {}", name)
                } else {
                    format!("struct {}", name)
                }
            }
            CType::AnonStruct(body) => body.clone(),
            CType::Pointer { .. } | CType::Array { .. } | CType::Func { .. } => {
                unreachable!("handled by decl")
            }
        }
    }

    /// Compose a C declaration of `inner` with this type, handling the
    /// inside-out declarator syntax (`int (*x)[10]`, `int (*f)(char)`).
    pub fn decl(&self, inner: &str) -> String {
        match self {
            CType::Pointer { elem, .. } => {
                let starred = if matches!(**elem, CType::Array { .. } | CType::Func { .. }) {
                    format!("(*{})", inner)
                } else {
                    format!("*{}", inner)
                };
                elem.decl(&starred)
            }
            CType::Array { elem, len, .. } => elem.decl(&format!("{}[{}]", inner, len)),
            CType::Func { ret, params } => {
                let ps: Vec<String> = params.iter().map(|p| p.to_c_string()).collect();
                ret.decl(&format!("{}({})", inner, ps.join(", ")))
            }
            base => {
                if inner.is_empty() {
                    base.base_str()
                } else {
                    format!("{} {}", base.base_str(), inner)
                }
            }
        }
    }

    /// Abstract form, e.g. for casts: `int *`, `struct s_point`.
    pub fn to_c_string(&self) -> String {
        self.decl("").trim_end().to_string()
    }
}

/// C usual-arithmetic-conversions: the join is the first matching rank of
/// {long double, double, float, __uint128_t, long, int, short, char};
/// signedness comes from the operand that supplied the winning rank.
/// `None` when neither operand is arithmetic.
pub fn binary_join(left: &CType, right: &CType) -> Option<CType> {
    for side in [left, right] {
        if matches!(side, CType::LongDouble) {
            return Some(CType::LongDouble);
        }
    }
    for side in [left, right] {
        if matches!(side, CType::Double) {
            return Some(CType::Double);
        }
    }
    for side in [left, right] {
        if matches!(side, CType::Float) {
            return Some(CType::Float);
        }
    }
    for side in [left, right] {
        if matches!(side, CType::UInt128) {
            return Some(CType::UInt128);
        }
    }
    for side in [left, right] {
        if let CType::Long { unsigned } = side {
            return Some(CType::Long { unsigned: *unsigned });
        }
    }
    for side in [left, right] {
        if let CType::Int { unsigned } = side {
            return Some(CType::Int { unsigned: *unsigned });
        }
    }
    for side in [left, right] {
        if let CType::Short { unsigned } = side {
            return Some(CType::Short { unsigned: *unsigned });
        }
    }
    for side in [left, right] {
        if let CType::Char { unsigned } = side {
            return Some(CType::Char { unsigned: *unsigned });
        }
    }
    None
}

/// The emitted C name of an identified struct type, or `None` for an
/// identified type with no symbolic prefix (treated as anonymous).
pub(crate) fn struct_c_name(ir_name: &str) -> Option<String> {
    if ir_name == "struct.__va_list_tag" {
        return Some("__va_list_tag".to_string());
    }
    if let Some(rest) = ir_name.strip_prefix("struct.") {
        return Some(format!("s_{}", rest));
    }
    if let Some(rest) = ir_name.strip_prefix("union.") {
        return Some(format!("u_{}", rest));
    }
    None
}

/// Lower an IR type to its C type. `void_mode` maps the next ≤8-bit
/// integer to `void`; it is set only when debug metadata has proven that
/// an `i8*` is really a `void*`.
pub(crate) fn lower(
    prog: &mut Program,
    module: &ir::Module,
    ty: &ir::Type,
    void_mode: bool,
) -> Result<CType> {
    match ty {
        ir::Type::Void => Ok(CType::Void),
        ir::Type::Int(1) => Ok(CType::Int { unsigned: false }),
        ir::Type::Int(width) if *width <= 8 => {
            if void_mode {
                Ok(CType::Void)
            } else {
                Ok(CType::Char { unsigned: false })
            }
        }
        ir::Type::Int(width) if *width <= 16 => Ok(CType::Short { unsigned: false }),
        ir::Type::Int(width) if *width <= 32 => Ok(CType::Int { unsigned: false }),
        ir::Type::Int(width) if *width <= 64 => Ok(CType::Long { unsigned: false }),
        ir::Type::Int(_) => Ok(CType::UInt128),
        ir::Type::Float => Ok(CType::Float),
        ir::Type::Double => Ok(CType::Double),
        ir::Type::X86Fp80 => Ok(CType::LongDouble),
        ir::Type::Ptr(inner) => {
            let elem = lower(prog, module, inner, void_mode)?;
            Ok(CType::pointer_to(elem))
        }
        ir::Type::Array(len, inner) => {
            let elem = lower(prog, module, inner, void_mode)?;
            Ok(CType::array_of(elem, *len))
        }
        ir::Type::Named(name) => match struct_c_name(name) {
            Some(c_name) => {
                if c_name == "__va_list_tag" {
                    prog.has_varargs = true;
                }
                Ok(CType::Struct(c_name))
            }
            None => {
                // Identified struct with no symbolic name: treat like an
                // anonymous struct keyed by its IR identity.
                let fields = module
                    .get_struct(name)
                    .map(|s| s.fields.clone())
                    .ok_or_else(|| {
                        TranslateError::MalformedIr(format!("unknown struct type `%{}`", name))
                    })?;
                let body = prog.ensure_unnamed_struct(module, ty, &fields)?;
                Ok(CType::AnonStruct(body))
            }
        },
        ir::Type::Literal(fields) => {
            let body = prog.ensure_unnamed_struct(module, ty, fields)?;
            Ok(CType::AnonStruct(body))
        }
        ir::Type::Func {
            ret,
            params,
            varargs: _,
        } => {
            let ret = lower(prog, module, ret, void_mode)?;
            let params = if params.is_empty() {
                vec![CType::Void]
            } else {
                params
                    .iter()
                    .map(|p| lower(prog, module, p, void_mode))
                    .collect::<Result<Vec<_>>>()?
            };
            Ok(CType::Func {
                ret: Box::new(ret),
                params,
            })
        }
        ir::Type::Vector(len, inner) => Err(TranslateError::unsupported(
            "type",
            format!("vector type <{} x {:?}>", len, inner),
        )),
        ir::Type::Label | ir::Type::Metadata => Err(TranslateError::Internal(format!(
            "attempted to lower non-value type {:?}",
            ty
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_prefers_higher_rank() {
        let l = CType::Int { unsigned: false };
        let r = CType::Double;
        assert_eq!(binary_join(&l, &r), Some(CType::Double));
        assert_eq!(binary_join(&r, &l), Some(CType::Double));
    }

    #[test]
    fn join_signedness_follows_winner() {
        let l = CType::Long { unsigned: true };
        let r = CType::Int { unsigned: false };
        assert_eq!(binary_join(&l, &r), Some(CType::Long { unsigned: true }));
        assert_eq!(binary_join(&r, &l), Some(CType::Long { unsigned: true }));
    }

    #[test]
    fn join_is_commutative_up_to_signedness() {
        let ranks = [
            CType::Char { unsigned: false },
            CType::Short { unsigned: false },
            CType::Int { unsigned: true },
            CType::Long { unsigned: false },
            CType::UInt128,
            CType::Float,
            CType::Double,
            CType::LongDouble,
        ];
        for l in &ranks {
            for r in &ranks {
                let a = binary_join(l, r).unwrap();
                let b = binary_join(r, l).unwrap();
                assert_eq!(
                    std::mem::discriminant(&a),
                    std::mem::discriminant(&b),
                    "join of {:?} and {:?} not commutative",
                    l,
                    r
                );
            }
        }
    }

    #[test]
    fn join_rejects_non_arithmetic() {
        let p = CType::pointer_to(CType::Int { unsigned: false });
        assert_eq!(binary_join(&p, &p), None);
    }

    #[test]
    fn declarator_composition() {
        let int = CType::Int { unsigned: false };
        assert_eq!(int.decl("x"), "int x");
        assert_eq!(CType::pointer_to(int.clone()).decl("x"), "int *x");
        assert_eq!(CType::array_of(int.clone(), 10).decl("x"), "int x[10]");
        assert_eq!(
            CType::pointer_to(CType::array_of(int.clone(), 10)).decl("x"),
            "int (*x)[10]"
        );
        let fnty = CType::Func {
            ret: Box::new(int.clone()),
            params: vec![CType::Char { unsigned: false }],
        };
        assert_eq!(CType::pointer_to(fnty).decl("f"), "int (*f)(char)");
    }
}
