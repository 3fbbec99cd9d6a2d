pub mod ast;
mod parser;

pub use parser::{parse_module, ParseError};

#[cfg(test)]
mod tests {
    use super::*;
    use ast::*;

    #[test]
    fn parse_minimal_function() {
        let src = r#"
            define i32 @main() {
              ret i32 0
            }
        "#;
        let m = parse_module(src, "m").unwrap();
        assert_eq!(m.functions.len(), 1);
        let f = &m.functions[0];
        assert_eq!(f.name, "main");
        assert_eq!(f.ret, Type::Int(32));
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(
            f.blocks[0].insts,
            vec![Inst::Ret {
                val: Some(TypedOperand {
                    ty: Type::Int(32),
                    op: Operand::Const(Constant::Int(0)),
                }),
            }]
        );
    }

    #[test]
    fn parse_pointer_and_array_types() {
        let src = "@buf = global [16 x i8*] zeroinitializer\n";
        let m = parse_module(src, "m").unwrap();
        assert_eq!(m.globals.len(), 1);
        assert_eq!(
            m.globals[0].ty,
            Type::Array(16, Box::new(Type::Ptr(Box::new(Type::Int(8)))))
        );
    }

    #[test]
    fn parse_error_carries_line() {
        let src = "@g = global i32 42\n@h = global ??? 1\n";
        let err = parse_module(src, "m").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
