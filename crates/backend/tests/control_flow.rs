use backend::translate;
use parse::parse_module;

fn lower(src: &str) -> String {
    let module = parse_module(src, "test_module").expect("parse ok");
    let program = translate(&module).expect("translate ok");
    program.to_c_string()
}

#[test]
fn conditional_branch_becomes_if_goto() {
    let src = r#"
        define i32 @max(i32 %a, i32 %b) {
        entry:
          %c = icmp sgt i32 %a, %b
          br i1 %c, label %then, label %else
        then:
          ret i32 %a
        else:
          ret i32 %b
        }
    "#;
    let c = lower(src);
    assert!(
        c.contains("if (var0 > var1) { goto block1; } else { goto block2; }"),
        "got:\n{}",
        c
    );
    assert!(c.contains("block1:"), "got:\n{}", c);
    assert!(c.contains("block2:"), "got:\n{}", c);
    // The entry block's label is never emitted.
    assert!(!c.contains("block0"), "got:\n{}", c);
}

#[test]
fn unconditional_branch_is_goto() {
    let src = r#"
        define void @skip() {
        entry:
          br label %done
        done:
          ret void
        }
    "#;
    let c = lower(src);
    assert!(c.contains("    goto block1;"), "got:\n{}", c);
    assert!(c.contains("block1:"), "got:\n{}", c);
}

#[test]
fn switch_lowers_to_case_gotos() {
    let src = r#"
        define i32 @pick(i32 %x) {
        entry:
          switch i32 %x, label %def [
            i32 1, label %one
            i32 2, label %two
          ]
        one:
          ret i32 10
        two:
          ret i32 20
        def:
          ret i32 0
        }
    "#;
    let c = lower(src);
    assert!(
        c.contains("switch (var0) { case 1: goto block1; case 2: goto block2; default: goto block3; }"),
        "got:\n{}",
        c
    );
    assert!(c.contains("block3:"), "got:\n{}", c);
}

#[test]
fn every_emitted_label_is_branched_to() {
    let src = r#"
        define void @loop(i32 %n) {
        entry:
          br label %head
        head:
          %c = icmp slt i32 0, %n
          br i1 %c, label %body, label %exit
        body:
          br label %head
        exit:
          ret void
        }
    "#;
    let c = lower(src);
    for label in ["block1", "block2", "block3"] {
        let def = format!("{}:", label);
        let jump = format!("goto {};", label);
        assert!(c.contains(&def), "label {} missing:\n{}", label, c);
        assert!(c.contains(&jump), "no branch to {}:\n{}", label, c);
    }
}

#[test]
fn unreachable_emits_nothing() {
    let src = r#"
        define void @dead() {
        entry:
          unreachable
        }
    "#;
    let c = lower(src);
    assert!(c.contains("void dead(void) {"), "got:\n{}", c);
    assert!(!c.contains("unreachable"), "got:\n{}", c);
}
