use backend::translate;
use parse::parse_module;

fn lower(src: &str) -> String {
    let module = parse_module(src, "test_module").expect("parse ok");
    let program = translate(&module).expect("translate ok");
    program.to_c_string()
}

#[test]
fn asm_with_output_temporary() {
    let src = r#"
        define void @probe(i32 %x) {
        entry:
          call void asm sideeffect "mov $0, $1", "=r,r"(i32 %x)
          ret void
        }
    "#;
    let c = lower(src);
    // The output operand binds a freshly declared temporary.
    assert!(c.contains("int var1;"), "got:\n{}", c);
    assert!(
        c.contains("asm volatile (\"mov %0, %1\" : \"=r\"(var1) : \"r\"(var0));"),
        "got:\n{}",
        c
    );
}

#[test]
fn asm_result_feeds_later_uses() {
    let src = r#"
        define i32 @rd(i32 %x) {
        entry:
          %r = call i32 asm "add $0, $1", "=r,r"(i32 %x)
          ret i32 %r
        }
    "#;
    let c = lower(src);
    assert!(c.contains("asm volatile (\"add %0, %1\" : \"=r\"(var1) : \"r\"(var0));"), "got:\n{}", c);
    assert!(c.contains("return var1;"), "got:\n{}", c);
}

#[test]
fn register_constraints_map_to_c_letters() {
    let src = r#"
        define void @port(i32 %v) {
        entry:
          call void asm sideeffect "outl $0, $$0x80", "{ax}"(i32 %v)
          ret void
        }
    "#;
    let c = lower(src);
    assert!(
        c.contains("asm volatile (\"outl %0, $0x80\" :  : \"a\"(var0));"),
        "got:\n{}",
        c
    );
}

#[test]
fn stack_registers_follow_a_32_bit_datalayout() {
    let src = r#"
        target datalayout = "e-m:e-p:32:32-p270:32:32-p271:32:32-p272:64:64-f64:32:64-f80:32-n8:16:32-S128"
        target triple = "i686-unknown-linux-gnu"

        define void @frame() {
        entry:
          call void asm sideeffect "nop", "~{sp},~{bp}"()
          ret void
        }
    "#;
    let c = lower(src);
    assert!(
        c.contains("asm volatile (\"nop\" :  :  : \"esp\", \"ebp\");"),
        "got:\n{}",
        c
    );
}

#[test]
fn stack_registers_default_to_64_bit() {
    let src = r#"
        define void @frame() {
        entry:
          call void asm sideeffect "nop", "~{sp},~{bp}"()
          ret void
        }
    "#;
    let c = lower(src);
    assert!(
        c.contains("asm volatile (\"nop\" :  :  : \"rsp\", \"rbp\");"),
        "got:\n{}",
        c
    );
}

#[test]
fn clobbers_pass_through() {
    let src = r#"
        define void @sync() {
        entry:
          call void asm sideeffect "mfence", "~{memory},~{dirflag},~{fpsr},~{flags}"()
          ret void
        }
    "#;
    let c = lower(src);
    assert!(
        c.contains("asm volatile (\"mfence\" :  :  : \"memory\", \"cc\");"),
        "got:\n{}",
        c
    );
}
