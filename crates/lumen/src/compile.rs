//! The driver: parse the internal prelude, parse the user file, elaborate,
//! and hand the decorated tree to the code generator.

use std::{path::Path, rc::Rc};

use crate::{
    ast::NodeId,
    codegen::{Codegen, HostLayout},
    context::Context,
    data::NodeData,
    error::CompileResult,
    io::{PrintWriter, StdPrint},
    value::{ValueId, Values},
};

/// The internal prelude: primitive type names, the string alias, and the
/// reflection types, written in the language itself. Its top-level defines
/// are the last stop of identifier resolution.
const INTERNAL_PRELUDE: &str = r#"
def void = @void;
def uint = @uint;
def uint8 = @uint8;
def type = @type;
def byte = @byte;
def flt64 = @flt64;
def bool = @bool;
def str = []byte;
def int = fn(static signed: bool, static size: uint): type -> @int(signed, size);

def Type_Field = struct {
    name: str,
    field_type: type,
};

def Type_Info = tagged_union {
    integer: struct { size: uint, signed: bool },
    structure: struct { fields: []Type_Field },
    untagged: struct { fields: []Type_Field },
    tagged: struct { fields: []Type_Field },
    enumeration: struct { names: []str },
    optional: struct { inner: type },
    array: struct { size: uint, element: type },
    array_view: struct { element: type },
    tuple: struct { elements: []type },
    byte: struct {},
};
"#;

/// A finished compilation: the decorated context plus the root module node.
pub struct Compilation<'p> {
    context: Context<'p>,
    root: NodeId,
}

impl<'p> Compilation<'p> {
    /// The root module node of the user file.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The decorated context, as handed to the code generator.
    #[must_use]
    pub fn context(&self) -> &Context<'p> {
        &self.context
    }

    /// The value universe.
    #[must_use]
    pub fn values(&self) -> &Values {
        self.context.values()
    }

    /// The compile-time value and type bound by a top-level `def`, by name.
    #[must_use]
    pub fn define(&self, name: &str) -> Option<(ValueId, ValueId)> {
        let name = self.context.interns.find(name)?;
        let crate::ast::NodeKind::Module { body } = self.context.node(self.root).kind else {
            return None;
        };
        let define = self.context.find_define(body, name)?;
        match self.context.get_data(define) {
            Some(NodeData::Define { value, ty }) => Some((*value, *ty)),
            _ => None,
        }
    }
}

fn compile_with<'p>(
    codegen: Rc<dyn Codegen>,
    print: &'p mut dyn PrintWriter,
    load: impl FnOnce(&mut Context<'p>) -> CompileResult<NodeId>,
) -> CompileResult<Compilation<'p>> {
    let mut context = Context::new(codegen, print);

    let internal_root = context.parse_source("internal", INTERNAL_PRELUDE)?;
    context.elaborate(internal_root)?;
    context.internal_root = Some(internal_root);
    // The prelude mentions `type`; that must not taint the user file.
    context.compile_only = false;

    let root = load(&mut context)?;
    context.elaborate(root)?;

    let codegen = Rc::clone(&context.codegen);
    codegen.build(&context, root);
    Ok(Compilation { context, root })
}

/// Compiles a source file with a custom code generator and print sink.
pub fn compile_file_with<'p>(
    path: &Path,
    codegen: Rc<dyn Codegen>,
    print: &'p mut dyn PrintWriter,
) -> CompileResult<Compilation<'p>> {
    compile_with(codegen, print, |context| context.parse_file(path))
}

/// Compiles a source file with the host layout model, printing to stdout.
/// Exit-code semantics are the caller's: any error is fatal.
pub fn compile_file(path: &Path) -> CompileResult<()> {
    let mut print = StdPrint;
    compile_file_with(path, Rc::new(HostLayout), &mut print)?;
    Ok(())
}

/// Compiles in-memory source under the given display path.
pub fn compile_source<'p>(
    path: &str,
    source: &str,
    print: &'p mut dyn PrintWriter,
) -> CompileResult<Compilation<'p>> {
    compile_with(Rc::new(HostLayout), print, |context| context.parse_source(path, source))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::ErrorKind,
        io::{CollectStringPrint, NoPrint},
        value::ValueData,
    };

    fn compile_ok(source: &str) -> Compilation<'static> {
        let print = Box::leak(Box::new(NoPrint));
        compile_source("test.lang", source, print).expect("expected the program to compile")
    }

    fn compile_err(source: &str) -> crate::error::CompileError {
        let print = Box::leak(Box::new(NoPrint));
        compile_source("test.lang", source, print).err().expect("expected a diagnostic")
    }

    #[test]
    fn prelude_primitives_resolve() {
        let compilation = compile_ok("def w = uint;");
        let (value, ty) = compilation.define("w").expect("w should be defined");
        assert!(matches!(
            compilation.values().get(value),
            ValueData::IntegerType { signed: false, bits: 64 }
        ));
        assert!(matches!(compilation.values().get(ty), ValueData::TypeType));
    }

    #[test]
    fn unresolved_identifier_is_fatal() {
        let error = compile_err("def x = missing;");
        assert_eq!(error.kind, ErrorKind::UnresolvedIdentifier);
        assert_eq!(error.to_string(), "test.lang:1:9: Identifier 'missing' not found");
    }

    #[test]
    fn number_literals_default_and_follow_wanted_types() {
        let compilation = compile_ok("def a = 3; def b: flt64 = 2.5; def c: uint8 = 7;");
        let (_, a_ty) = compilation.define("a").unwrap();
        assert!(matches!(
            compilation.values().get(a_ty),
            ValueData::IntegerType { signed: true, bits: 64 }
        ));
        let (_, b_ty) = compilation.define("b").unwrap();
        assert!(matches!(compilation.values().get(b_ty), ValueData::FloatType { bits: 64 }));
        let (c, _) = compilation.define("c").unwrap();
        assert!(matches!(compilation.values().get(c), ValueData::Integer(7)));
    }

    #[test]
    fn compile_time_print_writes_through_the_sink() {
        let mut print = CollectStringPrint::new();
        compile_source("test.lang", "def x = run { @print(\"hi\"); 1 };", &mut print)
            .expect("expected the program to compile");
        assert_eq!(print.take_output(), "hi\n");
    }

    #[test]
    fn type_mismatch_reports_both_types() {
        let error = compile_err("def b: bool = 3;");
        assert_eq!(error.kind, ErrorKind::TypeMismatch);
        assert!(
            error.message.contains("Expected 'bool'"),
            "message should name the wanted type: {}",
            error.message
        );
    }

    /// The resolved function value of the call inside the `index`-th
    /// top-level define (whose expression is `run <call>`).
    fn run_call_function_value(compilation: &Compilation<'_>, index: usize) -> crate::value::ValueId {
        let context = &compilation.context;
        let crate::ast::NodeKind::Module { body } = context.node(compilation.root).kind else {
            panic!("root is not a module");
        };
        let crate::ast::NodeKind::Block { ref statements, .. } = context.node(body).kind else {
            panic!("module body is not a block");
        };
        let crate::ast::NodeKind::Define { expression, .. } = context.node(statements[index]).kind else {
            panic!("statement {index} is not a define");
        };
        let crate::ast::NodeKind::Run { value } = context.node(expression).kind else {
            panic!("define {index} is not a run");
        };
        match context.get_data(value) {
            Some(NodeData::Call {
                function_value: Some(function),
                ..
            }) => *function,
            other => panic!("expected resolved call data, got {other:?}"),
        }
    }

    /// Two calls with value-equal static arguments share the memoized
    /// instantiation; different values allocate a new one.
    #[test]
    fn monomorphization_memo_shares_equal_instantiations() {
        let compilation = compile_ok(
            "def id = fn<T: type>(x: T): T -> x;\n\
             def a = run id(3);\n\
             def b = run id(3);\n\
             def c = run id(true);",
        );
        let first = run_call_function_value(&compilation, 1);
        let second = run_call_function_value(&compilation, 2);
        let third = run_call_function_value(&compilation, 3);
        assert_eq!(first, second, "equal static arguments must reuse the instantiation");
        assert_ne!(first, third, "distinct static arguments must instantiate separately");
    }

    mod imports {
        use std::{
            fs,
            path::PathBuf,
            sync::atomic::{AtomicUsize, Ordering},
        };

        use pretty_assertions::assert_eq;

        use super::*;

        static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

        fn scratch_dir() -> PathBuf {
            let dir = std::env::temp_dir().join(format!(
                "lumen-import-test-{}-{}",
                std::process::id(),
                DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
            ));
            fs::create_dir_all(&dir).expect("failed to create scratch dir");
            dir
        }

        /// Two import sites with the same absolute path receive the same
        /// module value: the cache holds one entry per file.
        #[test]
        fn same_absolute_path_shares_the_module_value() {
            let dir = scratch_dir();
            fs::write(dir.join("lib.lang"), "def answer = 42;\n").unwrap();
            fs::write(dir.join("a.lang"), "def l = @import(\"lib.lang\");\n").unwrap();
            fs::write(dir.join("b.lang"), "def l = @import(\"lib.lang\");\n").unwrap();
            let main = dir.join("main.lang");
            fs::write(
                &main,
                "def a = @import(\"a.lang\");\ndef b = @import(\"b.lang\");\n",
            )
            .unwrap();

            let mut print = NoPrint;
            let compilation = compile_file_with(&main, Rc::new(HostLayout), &mut print)
                .expect("expected the program to compile");
            // a, b, and lib, with lib cached once despite two import sites.
            assert_eq!(
                compilation.context.cached_files.len(),
                3,
                "lib must be imported once: {:?}",
                compilation.context.cached_files.keys().collect::<Vec<_>>()
            );
            let _ = fs::remove_dir_all(&dir);
        }

        /// A missing import is an I/O diagnostic naming the path.
        #[test]
        fn missing_import_is_fatal() {
            let dir = scratch_dir();
            let main = dir.join("main.lang");
            fs::write(&main, "def a = @import(\"nope.lang\");\n").unwrap();
            let mut print = NoPrint;
            let error = compile_file_with(&main, Rc::new(HostLayout), &mut print)
                .err()
                .expect("expected a diagnostic");
            assert_eq!(error.kind, ErrorKind::Io);
            assert!(error.message.contains("Failed to open path"));
            let _ = fs::remove_dir_all(&dir);
        }
    }
}
