use parse::ast::*;
use parse::parse_module;

#[test]
fn define_with_attributes_and_body() {
    let src = r#"
        define dso_local i32 @main(i32 noundef %argc, i8** nocapture %argv) local_unnamed_addr #0 {
        entry:
          ret i32 0
        }
    "#;
    let m = parse_module(src, "m").unwrap();
    let f = &m.functions[0];
    assert_eq!(f.name, "main");
    assert_eq!(f.params.len(), 2);
    assert_eq!(f.params[0].name, "argc");
    assert_eq!(
        f.params[1].ty,
        Type::Ptr(Box::new(Type::Ptr(Box::new(Type::Int(8)))))
    );
}

#[test]
fn implicit_entry_label() {
    let src = "define void @f() {\n  ret void\n}\n";
    let m = parse_module(src, "m").unwrap();
    assert_eq!(m.functions[0].blocks[0].label, "entry");
}

#[test]
fn multi_line_switch_is_joined() {
    let src = r#"
        define i32 @pick(i32 %x) {
        entry:
          switch i32 %x, label %def [
            i32 1, label %one
            i32 2, label %two
          ]
        one:
          ret i32 1
        two:
          ret i32 2
        def:
          ret i32 0
        }
    "#;
    let m = parse_module(src, "m").unwrap();
    let entry = &m.functions[0].blocks[0];
    match &entry.insts[0] {
        Inst::Switch { default, cases, .. } => {
            assert_eq!(default, "def");
            assert_eq!(cases, &vec![(1, "one".to_string()), (2, "two".to_string())]);
        }
        other => panic!("expected switch, got {:?}", other),
    }
}

#[test]
fn phi_incoming_pairs() {
    let src = r#"
        define i32 @f(i1 %c) {
        entry:
          br i1 %c, label %a, label %b
        a:
          br label %end
        b:
          br label %end
        end:
          %v = phi i32 [ 1, %a ], [ 2, %b ]
          ret i32 %v
        }
    "#;
    let m = parse_module(src, "m").unwrap();
    let end = &m.functions[0].blocks[3];
    match &end.insts[0] {
        Inst::Phi { incoming, .. } => {
            assert_eq!(incoming.len(), 2);
            assert_eq!(incoming[0].1, "a");
            assert_eq!(incoming[1].1, "b");
        }
        other => panic!("expected phi, got {:?}", other),
    }
}

#[test]
fn inline_asm_callee() {
    let src = r#"
        define void @f(i32 %x) {
        entry:
          call void asm sideeffect "nop $0", "r"(i32 %x)
          ret void
        }
    "#;
    let m = parse_module(src, "m").unwrap();
    match &m.functions[0].blocks[0].insts[0] {
        Inst::Call { callee, args, .. } => {
            match callee {
                Callee::Asm {
                    template,
                    constraints,
                    sideeffect,
                } => {
                    assert_eq!(template, "nop $0");
                    assert_eq!(constraints, "r");
                    assert!(sideeffect);
                }
                other => panic!("expected asm callee, got {:?}", other),
            }
            assert_eq!(args.len(), 1);
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn unsupported_opcodes_are_recorded_not_rejected() {
    let src = r#"
        define void @f() {
        entry:
          fence seq_cst
          ret void
        }
    "#;
    let m = parse_module(src, "m").unwrap();
    assert_eq!(
        m.functions[0].blocks[0].insts[0],
        Inst::Other {
            opcode: "fence".to_string()
        }
    );
}

#[test]
fn instruction_metadata_suffix_is_ignored() {
    let src = r#"
        define i32 @f(i32 %a, i32 %b) {
        entry:
          %r = add nsw i32 %a, %b, !dbg !7
          ret i32 %r, !dbg !8
        }
    "#;
    let m = parse_module(src, "m").unwrap();
    match &m.functions[0].blocks[0].insts[0] {
        Inst::Bin { op, .. } => assert_eq!(*op, BinOp::Add),
        other => panic!("expected add, got {:?}", other),
    }
}

#[test]
fn dbg_declare_is_extracted() {
    let src = r#"
        define void @f() {
        entry:
          %x = alloca i32
          call void @llvm.dbg.declare(metadata i32* %x, metadata !7, metadata !DIExpression())
          ret void
        }

        !7 = !DILocalVariable(name: "x", type: !8)
        !8 = !DIBasicType(name: "int", size: 32, encoding: DW_ATE_signed)
    "#;
    let m = parse_module(src, "m").unwrap();
    match &m.functions[0].blocks[0].insts[1] {
        Inst::DbgDeclare { var, di_var } => {
            assert_eq!(var, &Operand::Local("x".to_string()));
            assert_eq!(*di_var, 7);
        }
        other => panic!("expected dbg.declare, got {:?}", other),
    }
    assert_eq!(m.di_locals[&7].name, "x");
    assert!(matches!(
        m.di_types[&8],
        DiType::Basic { .. }
    ));
}
