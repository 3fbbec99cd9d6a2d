use backend::translate;
use parse::parse_module;

fn lower(src: &str) -> String {
    let module = parse_module(src, "test_module").expect("parse ok");
    let program = translate(&module).expect("translate ok");
    program.to_c_string()
}

#[test]
fn phi_becomes_predecessor_assignments() {
    let src = r#"
        define i32 @sel(i1 %c) {
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
    let c = lower(src);
    assert!(c.contains("var1 = 1;"), "got:\n{}", c);
    assert!(c.contains("var1 = 2;"), "got:\n{}", c);
    assert!(c.contains("return var1;"), "got:\n{}", c);
    // No phi survives into the output.
    assert!(!c.contains("phi"), "got:\n{}", c);
}

#[test]
fn phi_assignment_precedes_the_terminator() {
    let src = r#"
        define i32 @sel(i1 %c) {
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
    let c = lower(src);
    let assign = c.find("var1 = 1;").expect("assignment present");
    let block_a_goto = c[assign..].find("goto").expect("terminator after assignment");
    // The goto of block `a` appears after its phi copy.
    assert!(block_a_goto > 0);
}

#[test]
fn loop_phi_with_incoming_from_entry_and_latch() {
    let src = r#"
        define i32 @count(i32 %n) {
        entry:
          br label %head
        head:
          %i = phi i32 [ 0, %entry ], [ %next, %body ]
          %c = icmp slt i32 %i, %n
          br i1 %c, label %body, label %exit
        body:
          %next = add i32 %i, 1
          br label %head
        exit:
          ret i32 %i
        }
    "#;
    let c = lower(src);
    // Entry writes the initial value, the latch writes the increment.
    assert!(c.contains("var1 = 0;"), "got:\n{}", c);
    assert!(c.contains("var1 = var1 + 1;"), "got:\n{}", c);
    assert!(c.contains("return var1;"), "got:\n{}", c);
}
