use backend::translate;
use parse::parse_module;

fn lower(src: &str) -> String {
    let module = parse_module(src, "test_module").expect("parse ok");
    let program = translate(&module).expect("translate ok");
    program.to_c_string()
}

#[test]
fn private_global_is_static() {
    let src = "@g = private constant i32 42\n";
    let c = lower(src);
    assert!(c.contains("static int g;"), "got:\n{}", c);
    assert!(c.contains("static int g = 42;"), "got:\n{}", c);
}

#[test]
fn global_declarations_precede_definitions() {
    let src = "@a = global i32 1\n@b = global i32 2\n";
    let c = lower(src);
    let decl = c.find("int a;").expect("declaration present");
    let def = c.find("int a = 1;").expect("definition present");
    assert!(decl < def, "declToString must precede toString:\n{}", c);
}

#[test]
fn dots_in_names_become_underscores() {
    let src = "@.str = private unnamed_addr constant [6 x i8] c\"hello\\00\", align 1\n";
    let c = lower(src);
    assert!(c.contains("static char _str[6] = \"hello\";"), "got:\n{}", c);
}

#[test]
fn string_gep_initializer_decays_to_the_array_name() {
    let src = concat!(
        "@.str = private unnamed_addr constant [6 x i8] c\"hello\\00\"\n",
        "@msg = global i8* getelementptr inbounds ([6 x i8], [6 x i8]* @.str, i32 0, i32 0)\n",
    );
    let c = lower(src);
    assert!(c.contains("char *msg = _str;"), "got:\n{}", c);
}

#[test]
fn aggregate_initializers_use_braces() {
    let src = "@arr = global [3 x i32] [i32 1, i32 2, i32 3]\n";
    let c = lower(src);
    assert!(c.contains("int arr[3] = {1, 2, 3};"), "got:\n{}", c);
}

#[test]
fn zeroinitializer_and_null() {
    let src = "@z = global [4 x i32] zeroinitializer\n@p = global i32* null\n";
    let c = lower(src);
    assert!(c.contains("int z[4] = {0};"), "got:\n{}", c);
    assert!(c.contains("int *p = 0;"), "got:\n{}", c);
}

#[test]
fn external_global_has_no_initializer() {
    let src = "@ext = external global i32\n";
    let c = lower(src);
    assert!(c.contains("int ext;"), "got:\n{}", c);
    assert!(!c.contains("ext ="), "external global must not be initialized:\n{}", c);
}

#[test]
fn function_address_initializer() {
    let src = concat!(
        "declare i32 @handler(i32)\n",
        "@hook = global i32 (i32)* @handler\n",
    );
    let c = lower(src);
    assert!(c.contains("int (*hook)(int) = &handler;"), "got:\n{}", c);
}
