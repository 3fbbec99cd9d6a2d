use backend::translate;
use parse::parse_module;

fn lower(src: &str) -> String {
    let module = parse_module(src, "test_module").expect("parse ok");
    let program = translate(&module).expect("translate ok");
    program.to_c_string()
}

#[test]
fn array_index_on_local_array() {
    let src = r#"
        define i32 @third() {
        entry:
          %a = alloca [10 x i32]
          %e = getelementptr inbounds [10 x i32], [10 x i32]* %a, i32 0, i32 3
          %v = load i32, i32* %e
          ret i32 %v
        }
    "#;
    let c = lower(src);
    assert!(c.contains("int var0[10];"), "got:\n{}", c);
    assert!(c.contains("return var0[3];"), "got:\n{}", c);
}

#[test]
fn pointer_arithmetic_without_leading_zero() {
    let src = r#"
        define i32 @at(i32* %p, i64 %i) {
        entry:
          %e = getelementptr inbounds i32, i32* %p, i64 %i
          %v = load i32, i32* %e
          ret i32 %v
        }
    "#;
    let c = lower(src);
    assert!(c.contains("return var0[var1];"), "got:\n{}", c);
}

#[test]
fn gep_of_single_zero_collapses_to_base() {
    let src = r#"
        define i32 @first(i32* %p) {
        entry:
          %e = getelementptr inbounds i32, i32* %p, i64 0
          %v = load i32, i32* %e
          ret i32 %v
        }
    "#;
    let c = lower(src);
    // The index chain is a lone zero: the gep is its base, so the load is
    // a plain dereference of the parameter.
    assert!(c.contains("return *var0;"), "got:\n{}", c);
}

#[test]
fn all_zero_chain_collapses_to_the_decayed_array() {
    let src = r#"
        define i32 @head() {
        entry:
          %a = alloca [10 x i32]
          %e = getelementptr inbounds [10 x i32], [10 x i32]* %a, i32 0, i32 0
          %v = load i32, i32* %e
          ret i32 %v
        }
    "#;
    let c = lower(src);
    // Both indices are zero: the gep is the array itself, no `[0]`.
    assert!(c.contains("return var0;"), "got:\n{}", c);
    assert!(!c.contains("[0]"), "zero chain must collapse:\n{}", c);
}

#[test]
fn trailing_zero_after_nonzero_index_is_dropped() {
    let src = r#"
        define i32 @row() {
        entry:
          %a = alloca [4 x [4 x i32]]
          %e = getelementptr inbounds [4 x [4 x i32]], [4 x [4 x i32]]* %a, i64 0, i64 2, i64 0
          %v = load i32, i32* %e
          ret i32 %v
        }
    "#;
    let c = lower(src);
    assert!(c.contains("return var0[2];"), "got:\n{}", c);
    assert!(!c.contains("var0[2][0]"), "got:\n{}", c);
}

#[test]
fn variable_array_index() {
    let src = r#"
        define void @setat(i64 %i) {
        entry:
          %a = alloca [8 x i64]
          %e = getelementptr inbounds [8 x i64], [8 x i64]* %a, i64 0, i64 %i
          store i64 0, i64* %e
          ret void
        }
    "#;
    let c = lower(src);
    assert!(c.contains("var1[var0] = 0;"), "got:\n{}", c);
}

#[test]
fn struct_index_must_be_constant() {
    let src = r#"
        %struct.p = type { i32, i32 }

        define void @bad(%struct.p* %s, i32 %i) {
        entry:
          %f = getelementptr inbounds %struct.p, %struct.p* %s, i32 0, i32 %i
          ret void
        }
    "#;
    let module = parse_module(src, "m").expect("parse ok");
    let err = translate(&module).unwrap_err();
    assert!(
        matches!(err, backend::TranslateError::MalformedIr(_)),
        "expected MalformedIr, got {:?}",
        err
    );
}

#[test]
fn gep_through_global_array() {
    let src = r#"
        @table = global [4 x i32] zeroinitializer

        define i32 @lookup() {
        entry:
          %e = getelementptr inbounds [4 x i32], [4 x i32]* @table, i32 0, i32 2
          %v = load i32, i32* %e
          ret i32 %v
        }
    "#;
    let c = lower(src);
    assert!(c.contains("return table[2];"), "got:\n{}", c);
}
