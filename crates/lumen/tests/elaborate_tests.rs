//! End-to-end elaboration tests over in-memory programs.
//!
//! Each test compiles a small Lumen program through the public driver and
//! checks either the compile-time values it produces or the diagnostic it
//! fails with.

use lumen::{compile_source, CollectStringPrint, CompileError, Compilation, ErrorKind, NoPrint, ValueData};

fn with_compilation<R>(source: &str, check: impl FnOnce(&Compilation) -> R) -> R {
    let mut print = NoPrint;
    let compilation = compile_source("test.lang", source, &mut print)
        .unwrap_or_else(|error| panic!("expected the program to compile, got: {error}"));
    check(&compilation)
}

fn check_ok(source: &str) {
    with_compilation(source, |_| ());
}

fn check_err(source: &str) -> CompileError {
    let mut print = NoPrint;
    compile_source("test.lang", source, &mut print)
        .err()
        .expect("expected a diagnostic")
}

// =============================================================================
// Generics and monomorphization
// =============================================================================

/// A generic identity call types as its argument's type, per instantiation.
#[test]
fn generic_identity_types_after_its_argument() {
    with_compilation(
        "def id = fn<T: type>(x: T): T -> x;\n\
         def a = run id(3);\n\
         def c = run id(true);",
        |compilation| {
            let (a, a_ty) = compilation.define("a").expect("a should be defined");
            assert!(matches!(compilation.values().get(a), ValueData::Integer(3)));
            assert!(matches!(
                compilation.values().get(a_ty),
                ValueData::IntegerType { signed: true, bits: 64 }
            ));
            let (c, c_ty) = compilation.define("c").expect("c should be defined");
            assert!(matches!(compilation.values().get(c), ValueData::Boolean(true)));
            assert!(matches!(compilation.values().get(c_ty), ValueData::BooleanType));
        },
    );
}

/// Contradicting inferred bindings are a pattern-match failure.
#[test]
fn contradicting_inferred_bindings_fail() {
    let error = check_err(
        "def pair = fn<T: type>(a: T, b: T): T -> a;\n\
         def bad = run pair(1, true);",
    );
    assert_eq!(error.kind, ErrorKind::PatternMatch);
    assert!(error.message.contains("Pattern matching failed"));
}

/// The caller's wanted type flows into the callee's return-type pattern.
#[test]
fn wanted_type_binds_through_the_return_pattern() {
    with_compilation(
        "def zero = fn<T: type>(): T -> @embed(\"0\");\n\
         def z: uint = run zero();",
        |compilation| {
            let (z, z_ty) = compilation.define("z").expect("z should be defined");
            assert!(matches!(compilation.values().get(z), ValueData::Integer(0)));
            assert!(matches!(
                compilation.values().get(z_ty),
                ValueData::IntegerType { signed: false, bits: 64 }
            ));
        },
    );
}

/// An inferred parameter's default value fills a binding nothing matched.
#[test]
fn inferred_parameter_defaults_apply() {
    with_compilation(
        "def tag = fn<T: type = uint>(): T -> @embed(\"1\");\n\
         def t = run tag();",
        |compilation| {
            let (t, t_ty) = compilation.define("t").expect("t should be defined");
            assert!(matches!(compilation.values().get(t), ValueData::Integer(1)));
            assert!(matches!(
                compilation.values().get(t_ty),
                ValueData::IntegerType { signed: false, bits: 64 }
            ));
        },
    );
}

/// A generic define instantiates per static-argument tuple, and its `where`
/// constraint is evaluated per instantiation.
#[test]
fn generic_define_constraint_gates_instantiation() {
    check_ok(
        "def Wide<T: type; @size_of(T) == 8> = struct { item: T };\n\
         def ok_ = Wide(uint);",
    );
    let error = check_err(
        "def Wide<T: type; @size_of(T) == 8> = struct { item: T };\n\
         def bad = Wide(byte);",
    );
    assert_eq!(error.kind, ErrorKind::PatternMatch);
    assert!(error.message.contains("constraint"));
}

/// Parameter patterns of the form `Template(T)` match against the applied
/// generic's recorded static arguments.
#[test]
fn applied_generic_patterns_bind_their_arguments() {
    check_ok(
        "def Box<T: type> = struct { item: T };\n\
         def IntBox = Box(uint);\n\
         def item_type = fn<T: type>(b: Box(T)): type -> T;\n\
         def probe = fn(b: IntBox): type -> item_type(b);",
    );
}

// =============================================================================
// Operator overloads and method calls
// =============================================================================

const VEC: &str = "def Vec = fn(static T: type): type -> struct {\n\
     items: [4]T,\n\
     op [] = fn(s: ^@self, i: uint): ^T -> &s.*.items[i],\n\
 };\n\
 def V = Vec(uint);\n";

/// `v[i]` on a struct with an `[]` overload resolves to the overload and
/// types as its pointee.
#[test]
fn index_overload_resolves_and_types() {
    check_ok(&format!("{VEC}def get = fn(v: ^V): uint -> v[1];"));
}

/// `v[i] = x` types the right-hand side against the overload's item type.
#[test]
fn index_overload_assignment_checks_the_item_type() {
    check_ok(&format!("{VEC}def set = fn(v: ^V) -> {{ v[0] = 3; }};"));
    let error = check_err(&format!("{VEC}def set = fn(v: ^V) -> {{ v[0] = true; }};"));
    assert_eq!(error.kind, ErrorKind::TypeMismatch);
}

/// Array access on a type with neither builtin indexing nor an overload.
#[test]
fn index_without_overload_is_an_operator_error() {
    let error = check_err("def f = fn(x: uint): uint -> x[0];");
    assert_eq!(error.kind, ErrorKind::OperatorNotFound);
}

/// A named overload is invoked by method-call syntax with the receiver
/// pointer as argument 0.
#[test]
fn method_calls_resolve_against_struct_overloads() {
    check_ok(
        "def Counter = struct {\n\
             count: uint,\n\
             op bump = fn(s: ^@self, by: uint): uint -> s.*.count + by,\n\
         };\n\
         def use_it = fn(c: ^Counter): uint -> c.bump(2);",
    );
    let error = check_err(
        "def Counter = struct { count: uint };\n\
         def use_it = fn(c: ^Counter): uint -> c.bump(2);",
    );
    assert_eq!(error.kind, ErrorKind::OperatorNotFound);
    assert!(error.message.contains("Method 'bump' not found"));
}

// =============================================================================
// Tagged unions, optionals, results
// =============================================================================

const UNION: &str = "def U = tagged_union { a: uint, b: str };\n";

/// `u is tag` yields an optional of the payload, and the `if` capture binds
/// the payload type.
#[test]
fn is_check_yields_an_optional_payload() {
    check_ok(&format!(
        "{UNION}def first = fn(u: U): uint -> {{\n\
             if u is a => x {{\n\
                 return x;\n\
             }} else {{}};\n\
             0\n\
         }};"
    ));
}

/// The unwrap form `o.?` projects the optional's inner type.
#[test]
fn deoptional_projects_the_inner_type() {
    check_ok(&format!(
        "{UNION}def get = fn(u: U): uint -> {{ var o: ?uint = u is a; o.? }};"
    ));
}

/// `is` on a non-tagged-union type is a type error.
#[test]
fn is_requires_a_tagged_union() {
    let error = check_err("def f = fn(x: uint): bool -> x is a;");
    assert_eq!(error.kind, ErrorKind::TypeMismatch);
    assert!(error.message.contains("Expected tagged union"));
}

/// `return ok`/`return err` project into the result arms, and `catch` binds
/// the error while producing the success type.
#[test]
fn result_projection_and_catch() {
    check_ok(
        "def E = enum { oops };\n\
         def may_fail = fn(flag: bool): uint!E -> {\n\
             if flag {\n\
                 return err oops;\n\
             } else {};\n\
             return ok 7;\n\
         };\n\
         def fallback = fn(): uint -> may_fail(true) catch (e) { 0 };",
    );
}

/// A catch arm that neither produces the success type nor diverges is an
/// error.
#[test]
fn catch_arm_must_produce_or_diverge() {
    let error = check_err(
        "def E = enum { oops };\n\
         def may_fail = fn(): uint!E -> return ok 1;\n\
         def bad = fn(): uint -> may_fail() catch { true };",
    );
    assert_eq!(error.kind, ErrorKind::TypeMismatch);
}

// =============================================================================
// Compile-time control flow
// =============================================================================

/// `for static` unrolls at compile time; mutation of a static variable
/// accumulates across the unrolled iterations.
#[test]
fn static_for_unrolls_and_accumulates() {
    with_compilation(
        "def total = run {\n\
             var static n: uint = 0;\n\
             for static [_]uint.{1, 2, 3} => v {\n\
                 n = n + v;\n\
             };\n\
             n\n\
         };",
        |compilation| {
            let (total, _) = compilation.define("total").expect("total should be defined");
            assert!(
                matches!(compilation.values().get(total), ValueData::Integer(6)),
                "expected the unrolled loop to sum to 6"
            );
        },
    );
}

/// Each unrolled iteration sees its own binding; `@print` observes them in
/// order.
#[test]
fn static_for_rebinds_per_iteration() {
    let mut print = CollectStringPrint::new();
    compile_source(
        "test.lang",
        "def out = run {\n\
             for static [_]str.{\"a\", \"b\"} => s, i {\n\
                 @print(s);\n\
             };\n\
             0\n\
         };",
        &mut print,
    )
    .expect("expected the program to compile");
    assert_eq!(print.take_output(), "a\nb\n");
}

/// `if static` elaborates only the taken branch: the untaken branch may
/// reference names that do not exist.
#[test]
fn static_if_skips_the_untaken_branch() {
    with_compilation(
        "def pick = run if static true { 1 } else { missing };",
        |compilation| {
            let (pick, _) = compilation.define("pick").expect("pick should be defined");
            assert!(matches!(compilation.values().get(pick), ValueData::Integer(1)));
        },
    );
    with_compilation(
        "def pick = run if static false { missing } else { 2 };",
        |compilation| {
            let (pick, _) = compilation.define("pick").expect("pick should be defined");
            assert!(matches!(compilation.values().get(pick), ValueData::Integer(2)));
        },
    );
}

/// `switch static` selects exactly one case; the others are not elaborated.
#[test]
fn static_switch_selects_one_case() {
    with_compilation(
        "def Color = enum { red, green };\n\
         def c: Color = red;\n\
         def n = run switch static c {\n\
             case red: 1;\n\
             case green: missing;\n\
         };",
        |compilation| {
            let (n, _) = compilation.define("n").expect("n should be defined");
            assert!(matches!(compilation.values().get(n), ValueData::Integer(1)));
        },
    );
}

// =============================================================================
// Runtime control flow semantics
// =============================================================================

/// All breaks agree on the loop's value type; the else arm supplies the
/// fallthrough result.
#[test]
fn while_breaks_agree_and_else_supplies_fallthrough() {
    check_ok("def count = fn(): uint -> while true { break 4; } else 0;");
    let error = check_err("def f = fn(): uint -> while true { break 4; break true; } else 0;");
    assert_eq!(error.kind, ErrorKind::TypeMismatch);
}

#[test]
fn break_outside_while_is_a_control_flow_error() {
    let error = check_err("def f = fn() -> { break; };");
    assert_eq!(error.kind, ErrorKind::ControlFlow);
    assert!(error.message.contains("No surrounding while"));
}

/// A value-producing if needs both arms, unless an arm statically diverges.
#[test]
fn if_needs_an_else_to_produce_a_value() {
    let error = check_err("def f = fn(): uint -> { var x: uint = if true { 1 }; x };");
    assert_eq!(error.kind, ErrorKind::TypeMismatch);
    assert!(error.message.contains("Expected else"));
    // A diverging arm is exempt from the agreement requirement.
    check_ok("def f = fn(flag: bool): int(true, 64) -> if flag { 1 } else { return 2; };");
}

/// Non-static switches are exhaustive unless an else case is present.
#[test]
fn switch_exhaustiveness_is_counted_against_the_enum() {
    const ENUM: &str = "def Color = enum { red, green };\n";
    check_ok(&format!(
        "{ENUM}def pick = fn(c: Color): uint -> switch c {{ case red: 1; case green: 2; }};"
    ));
    check_ok(&format!(
        "{ENUM}def pick = fn(c: Color): uint -> switch c {{ case red: 1; case: 2; }};"
    ));
    let error = check_err(&format!(
        "{ENUM}def pick = fn(c: Color): uint -> switch c {{ case red: 1; }};"
    ));
    assert_eq!(error.kind, ErrorKind::Exhaustiveness);
}

/// A non-none value in statement position must be consumed.
#[test]
fn unused_values_are_rejected() {
    let error = check_err("def f = fn() -> { 3; };");
    assert_eq!(error.kind, ErrorKind::ControlFlow);
    assert!(error.message.contains("Unused value"));
}

#[test]
fn arity_mismatch_is_reported() {
    let error = check_err("def f = fn(a: uint): uint -> a;\ndef x = run f(1, 2);");
    assert_eq!(error.kind, ErrorKind::Arity);
    assert!(error.message.contains("Expected 1 arguments, but got 2"));
}

/// A variadic function accepts a tail beyond its declared parameters.
#[test]
fn variadic_functions_accept_a_tail() {
    with_compilation(
        "def first = fn(a: uint, ..): uint -> a;\n\
         def x = run first(1, 2, 3);",
        |compilation| {
            let (x, _) = compilation.define("x").expect("x should be defined");
            assert!(matches!(compilation.values().get(x), ValueData::Integer(1)));
        },
    );
}

// =============================================================================
// Casts
// =============================================================================

/// Only pointer-to-pointer and integer-to-byte casts exist; pointer-to-void
/// is assignable in both directions.
#[test]
fn cast_policy() {
    check_ok("def p = fn(p: ^void): ^byte -> cast(^byte) p;");
    check_ok("def q = fn(p: ^byte): ^void -> p;");
    check_ok("def b = fn(n: uint): byte -> cast(byte) n;");
    let error = check_err("def bad = fn(): uint -> cast(uint) 3.5;");
    assert_eq!(error.kind, ErrorKind::TypeMismatch);
    assert!(error.message.contains("Cannot cast"));
}

// =============================================================================
// Intrinsics
// =============================================================================

/// `@embed` splices compile-time bytes back through the parser and elaborates
/// the result under the ambient wanted type.
#[test]
fn embed_splices_an_expression() {
    with_compilation("def n: uint = @embed(\"4\", \"2\");", |compilation| {
        let (n, n_ty) = compilation.define("n").expect("n should be defined");
        assert!(matches!(compilation.values().get(n), ValueData::Integer(42)));
        assert!(matches!(
            compilation.values().get(n_ty),
            ValueData::IntegerType { signed: false, bits: 64 }
        ));
    });
}

/// `@type_info_of` builds a tagged reflection value whose tag encodes the
/// type kind.
#[test]
fn type_info_reflects_struct_kinds() {
    with_compilation(
        "def P = struct { x: uint, y: bool };\n\
         def info = @type_info_of(P);",
        |compilation| {
            let (info, _) = compilation.define("info").expect("info should be defined");
            let ValueData::TaggedUnion { tag, .. } = compilation.values().get(info) else {
                panic!("type info should be a tagged union value");
            };
            assert!(
                matches!(compilation.values().get(*tag), ValueData::Enum(1)),
                "struct kinds carry tag 1"
            );
        },
    );
}

#[test]
fn size_of_queries_the_layout_oracle() {
    with_compilation("def s = @size_of(struct { a: uint, b: byte });", |compilation| {
        let (s, _) = compilation.define("s").expect("s should be defined");
        assert!(matches!(compilation.values().get(s), ValueData::Integer(9)));
    });
}

#[test]
fn compile_error_reports_at_the_call_site() {
    let error = check_err("def x = @compile_error(\"boom\");");
    assert_eq!(error.kind, ErrorKind::Intrinsic);
    assert_eq!(error.to_string(), "test.lang:1:9: boom");
}

#[test]
fn intrinsic_arity_is_checked() {
    let error = check_err("def x = @size_of();");
    assert_eq!(error.kind, ErrorKind::Intrinsic);
    assert!(error.message.contains("Expected 1 inputs to @size_of"));
}

/// String escapes expand in the elaborator, not the lexer.
#[test]
fn print_expands_string_escapes() {
    let mut print = CollectStringPrint::new();
    compile_source("test.lang", "def x = run { @print(\"a\\nb\"); 0 };", &mut print)
        .expect("expected the program to compile");
    assert_eq!(print.take_output(), "a\nb\n");
}

// =============================================================================
// Modules, globals, misc
// =============================================================================

/// Qualified access searches the module's defines under its captured scopes.
#[test]
fn module_access_resolves_member_defines() {
    with_compilation(
        "def M = mod { def x = 5; };\n\
         def y = M::x;",
        |compilation| {
            let (y, _) = compilation.define("y").expect("y should be defined");
            assert!(matches!(compilation.values().get(y), ValueData::Integer(5)));
        },
    );
}

/// Globals resolve like variables; extern functions carry no body.
#[test]
fn globals_and_extern_functions() {
    check_ok(
        "global counter: uint = 0;\n\
         def puts = fn extern \"puts\" (s: ^byte): uint;\n\
         def bump = fn() -> { counter = 1; };",
    );
}

/// `null` takes its type from the wanted context and cannot stand alone.
#[test]
fn null_needs_a_wanted_type() {
    check_ok("def none_yet = fn(): ?uint -> null;");
    let error = check_err("def b = null;");
    assert_eq!(error.kind, ErrorKind::TypeMismatch);
}

/// Slicing a view yields a view of the same element type.
#[test]
fn slices_produce_views() {
    check_ok("def tail = fn(xs: []uint): []uint -> xs[1..];");
}

/// Tuple members are positional, accessed as `_0`, `_1`, ….
#[test]
fn tuple_literals_and_positional_access() {
    check_ok("def f = fn(): int(true, 64) -> { var t = .{1, true}; t._0 };");
    let error = check_err("def f = fn(): int(true, 64) -> { var t = .{1, true}; t._7 };");
    assert_eq!(error.kind, ErrorKind::UnresolvedIdentifier);
}
