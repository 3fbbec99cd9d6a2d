use backend::translate;
use parse::parse_module;

fn lower(src: &str) -> String {
    let module = parse_module(src, "test_module").expect("parse ok");
    let program = translate(&module).expect("translate ok");
    program.to_c_string()
}

#[test]
fn named_struct_gets_prefix_and_synthesized_fields() {
    let src = r#"
        %struct.point = type { i32, i32 }

        define void @init() {
        entry:
          %p = alloca %struct.point
          %f = getelementptr inbounds %struct.point, %struct.point* %p, i32 0, i32 0
          store i32 1, i32* %f
          ret void
        }
    "#;
    let c = lower(src);
    assert!(c.contains("struct s_point;"), "forward declaration, got:\n{}", c);
    assert!(c.contains("struct s_point {"), "definition, got:\n{}", c);
    assert!(c.contains("int structVar0;"), "got:\n{}", c);
    assert!(c.contains("int structVar1;"), "got:\n{}", c);
    assert!(c.contains("struct s_point var0;"), "local declaration, got:\n{}", c);
    // The alloca'd pointer cancels `*&`, leaving a plain member store.
    assert!(c.contains("var0.structVar0 = 1;"), "got:\n{}", c);
}

#[test]
fn union_uses_the_union_keyword() {
    let src = r#"
        %union.box = type { i64 }

        define void @u() {
        entry:
          %b = alloca %union.box
          ret void
        }
    "#;
    let c = lower(src);
    assert!(c.contains("union u_box;"), "got:\n{}", c);
    assert!(c.contains("union u_box {"), "got:\n{}", c);
    assert!(c.contains("union u_box var0;"), "got:\n{}", c);
}

#[test]
fn field_struct_definitions_come_first() {
    // `outer` is declared before `inner` in the IR; the emitter must still
    // define `inner` first because `outer` holds it by value.
    let src = concat!(
        "%struct.outer = type { %struct.inner, i32 }\n",
        "%struct.inner = type { i32 }\n",
    );
    let c = lower(src);
    let inner = c.find("struct s_inner {").expect("inner defined");
    let outer = c.find("struct s_outer {").expect("outer defined");
    assert!(inner < outer, "field struct must be defined first:\n{}", c);
}

#[test]
fn struct_array_dependency_is_hoisted() {
    let src = concat!(
        "%struct.table = type { [4 x %struct.entry] }\n",
        "%struct.entry = type { i32 }\n",
    );
    let c = lower(src);
    let entry = c.find("struct s_entry {").expect("entry defined");
    let table = c.find("struct s_table {").expect("table defined");
    assert!(entry < table, "array element struct must be defined first:\n{}", c);
    assert!(c.contains("struct s_entry structVar0[4];"), "got:\n{}", c);
}

#[test]
fn nested_member_store() {
    let src = r#"
        %struct.inner = type { i32 }
        %struct.outer = type { %struct.inner }

        define void @set() {
        entry:
          %o = alloca %struct.outer
          %i = getelementptr inbounds %struct.outer, %struct.outer* %o, i32 0, i32 0
          %f = getelementptr inbounds %struct.inner, %struct.inner* %i, i32 0, i32 0
          store i32 7, i32* %f
          ret void
        }
    "#;
    let c = lower(src);
    assert!(c.contains("var0.structVar1.structVar0 = 7;"), "got:\n{}", c);
}

#[test]
fn extractvalue_renders_member_chain() {
    let src = r#"
        %struct.pair = type { i32, i32 }

        define i32 @second(%struct.pair %p) {
        entry:
          %v = extractvalue %struct.pair %p, 1
          ret i32 %v
        }
    "#;
    let c = lower(src);
    assert!(c.contains("return var0.structVar1;"), "got:\n{}", c);
}
