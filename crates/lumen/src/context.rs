//! The per-compilation context.
//!
//! Owns the node and value arenas, the interner, the elaboration side tables
//! keyed by static id, the scope stack, and the imported-file cache. The
//! elaborator and evaluator are implemented as `impl Context` blocks across
//! their modules; everything they share lives here.

use std::{
    path::{Path, PathBuf},
    rc::Rc,
};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    arena::Arena,
    ast::{Node, NodeId, SourceLoc},
    codegen::Codegen,
    data::NodeData,
    error::{CompileError, CompileResult, ErrorKind},
    evaluate::Frame,
    intern::Interns,
    io::PrintWriter,
    parser,
    scope::Scope,
    value::{ValueId, Values},
};

/// Registry of source paths; nodes carry a `path_ref` index into it.
#[derive(Debug, Default)]
pub(crate) struct SourceMap {
    paths: Vec<String>,
}

impl SourceMap {
    pub fn register(&mut self, path: &str) -> u32 {
        if let Some(index) = self.paths.iter().position(|known| known == path) {
            return u32::try_from(index).expect("source map overflow");
        }
        self.paths.push(path.to_owned());
        u32::try_from(self.paths.len() - 1).expect("source map overflow")
    }

    pub fn path(&self, path_ref: u32) -> &str {
        &self.paths[path_ref as usize]
    }
}

/// The context a parent expression pushes down into its children.
///
/// Saved and restored around every recursive elaboration call, so a child
/// cannot leak its context to siblings.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TemporaryContext {
    /// The type the parent expects of this expression.
    pub wanted_type: Option<ValueId>,
    /// The parent needs the l-value (address) form of this expression.
    pub want_pointer: bool,
}

impl TemporaryContext {
    pub fn wanting(wanted_type: Option<ValueId>) -> Self {
        Self {
            wanted_type,
            want_pointer: false,
        }
    }

    pub fn pointer() -> Self {
        Self {
            wanted_type: None,
            want_pointer: true,
        }
    }
}

/// Everything one compilation owns.
pub struct Context<'p> {
    pub(crate) nodes: Arena<Node>,
    pub(crate) values: Values,
    pub(crate) interns: Interns,
    pub(crate) sources: SourceMap,
    /// `static_id -> node -> type`; id 0 is the generic template world.
    node_types: AHashMap<u64, AHashMap<NodeId, ValueId>>,
    /// `static_id -> node -> data`, same keying.
    node_datas: AHashMap<u64, AHashMap<NodeId, NodeData>>,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) static_id: u64,
    static_id_counter: u64,
    pub(crate) temporary: TemporaryContext,
    /// The current function body unconditionally diverged.
    pub(crate) returned: bool,
    /// The current function mentions compile-only values (`type`) and must
    /// not reach codegen.
    pub(crate) compile_only: bool,
    /// Imported files by absolute path; re-imports reuse the module value.
    pub(crate) cached_files: IndexMap<PathBuf, ValueId>,
    /// Compile-time slots of `var static` declarations.
    pub(crate) static_variable_values: AHashMap<(u64, NodeId), ValueId>,
    /// Root of the internal prelude, consulted last during name lookup.
    pub(crate) internal_root: Option<NodeId>,
    pub(crate) codegen: Rc<dyn Codegen>,
    pub(crate) print: &'p mut dyn PrintWriter,
    /// Evaluator call frames; each holds the frame's argument values.
    pub(crate) frames: Vec<Frame>,
}

impl<'p> Context<'p> {
    pub(crate) fn new(codegen: Rc<dyn Codegen>, print: &'p mut dyn PrintWriter) -> Self {
        Self {
            nodes: Arena::new(),
            values: Values::new(),
            interns: Interns::new(),
            sources: SourceMap::default(),
            node_types: AHashMap::new(),
            node_datas: AHashMap::new(),
            scopes: Vec::new(),
            static_id: 0,
            static_id_counter: 0,
            temporary: TemporaryContext::default(),
            returned: false,
            compile_only: false,
            cached_files: IndexMap::new(),
            static_variable_values: AHashMap::new(),
            internal_root: None,
            codegen,
            print,
            frames: Vec::new(),
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id)
    }

    pub(crate) fn loc(&self, id: NodeId) -> SourceLoc {
        self.nodes.get(id).loc
    }

    /// Builds a diagnostic anchored at `node`.
    pub(crate) fn error(&self, node: NodeId, kind: ErrorKind, message: String) -> CompileError {
        let loc = self.loc(node);
        CompileError::new(self.sources.path(loc.path_ref), loc, kind, message)
    }

    pub(crate) fn expected_type_error(&self, node: NodeId, wanted: Option<ValueId>, given: Option<ValueId>) -> CompileError {
        let wanted = self.values.format_type_outer(&self.nodes, &self.interns, wanted);
        let given = self.values.format_type_outer(&self.nodes, &self.interns, given);
        self.error(node, ErrorKind::TypeMismatch, format!("Expected {wanted}, but got {given}"))
    }

    pub(crate) fn mismatched_type_error(&self, node: NodeId, first: Option<ValueId>, second: Option<ValueId>) -> CompileError {
        let first = self.values.format_type_outer(&self.nodes, &self.interns, first);
        let second = self.values.format_type_outer(&self.nodes, &self.interns, second);
        self.error(
            node,
            ErrorKind::TypeMismatch,
            format!("Mismatched types {first} and {second}"),
        )
    }

    // --- Side tables -------------------------------------------------------

    /// The inferred type of `node` under the ambient static id, falling back
    /// to the template world (id 0) so generic-independent information is
    /// shared between instantiations.
    pub(crate) fn get_type(&self, node: NodeId) -> Option<ValueId> {
        if let Some(&ty) = self.node_types.get(&self.static_id).and_then(|types| types.get(&node)) {
            return Some(ty);
        }
        if self.static_id != 0 {
            if let Some(&ty) = self.node_types.get(&0).and_then(|types| types.get(&node)) {
                return Some(ty);
            }
        }
        None
    }

    pub(crate) fn set_type(&mut self, node: NodeId, ty: ValueId) {
        self.node_types.entry(self.static_id).or_default().insert(node, ty);
    }

    /// The elaborated side-data of `node`, with the same id-0 fallback as
    /// [`Context::get_type`].
    pub(crate) fn get_data(&self, node: NodeId) -> Option<&NodeData> {
        if let Some(data) = self.node_datas.get(&self.static_id).and_then(|datas| datas.get(&node)) {
            return Some(data);
        }
        if self.static_id != 0 {
            if let Some(data) = self.node_datas.get(&0).and_then(|datas| datas.get(&node)) {
                return Some(data);
            }
        }
        None
    }

    pub(crate) fn set_data(&mut self, node: NodeId, data: NodeData) {
        self.node_datas.entry(self.static_id).or_default().insert(node, data);
    }

    /// Mutable access to the data entry where it currently lives: the
    /// ambient static id, else the template world. Read-modify-write updates
    /// (the monomorphization memo, `while` break types) must land on the
    /// entry other instantiations will also find.
    pub(crate) fn get_data_mut(&mut self, node: NodeId) -> Option<&mut NodeData> {
        let id = if self
            .node_datas
            .get(&self.static_id)
            .is_some_and(|datas| datas.contains_key(&node))
        {
            self.static_id
        } else {
            0
        };
        self.node_datas.get_mut(&id)?.get_mut(&node)
    }

    /// Forgets `node`'s type and data in the current static id only, so it
    /// can be re-elaborated under a different wanted type or pointer mode.
    pub(crate) fn reset_node(&mut self, node: NodeId) {
        if let Some(types) = self.node_types.get_mut(&self.static_id) {
            types.remove(&node);
        }
        if let Some(datas) = self.node_datas.get_mut(&self.static_id) {
            datas.remove(&node);
        }
    }

    /// Allocates a fresh instantiation world.
    pub(crate) fn fresh_static_id(&mut self) -> u64 {
        self.static_id_counter += 1;
        self.static_id_counter
    }

    // --- Scopes ------------------------------------------------------------

    pub(crate) fn push_scope(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub(crate) fn last_scope_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack is empty")
    }

    // --- Parsing entry points ----------------------------------------------

    /// Reads and parses a file into a module node.
    pub(crate) fn parse_file(&mut self, path: &Path) -> CompileResult<NodeId> {
        let source = std::fs::read_to_string(path).map_err(|_| {
            CompileError::positionless(ErrorKind::Io, format!("Failed to open path '{}'", path.display()))
        })?;
        let path_text = path.to_string_lossy().into_owned();
        self.parse_source(&path_text, &source)
    }

    pub(crate) fn parse_source(&mut self, path: &str, source: &str) -> CompileResult<NodeId> {
        let path_ref = self.sources.register(path);
        parser::parse_source(&mut self.nodes, &mut self.interns, path, path_ref, source)
    }

    /// Parses an expression produced at compile time (the `@embed` splice).
    pub(crate) fn parse_expression_source(&mut self, path: &str, source: &str) -> CompileResult<NodeId> {
        let path_ref = self.sources.register(path);
        parser::parse_source_expression(&mut self.nodes, &mut self.interns, path, path_ref, source)
    }
}

/// Read-only views handed to the code generator and to tests.
impl Context<'_> {
    /// The value universe of this compilation.
    #[must_use]
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// The type of `node` under static id 0, if elaborated.
    #[must_use]
    pub fn root_type_of(&self, node: NodeId) -> Option<ValueId> {
        self.node_types.get(&0).and_then(|types| types.get(&node)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::{Node, NodeKind, SourceLoc},
        codegen::HostLayout,
        io::NoPrint,
    };

    fn test_context(print: &mut NoPrint) -> Context<'_> {
        Context::new(Rc::new(HostLayout), print)
    }

    fn dummy_node(context: &mut Context<'_>) -> NodeId {
        context.nodes.alloc(Node {
            loc: SourceLoc::default(),
            kind: NodeKind::Null,
        })
    }

    /// A type missing under instantiation id `k` falls back to the template
    /// world unchanged; an entry at `k` shadows it.
    #[test]
    fn type_lookup_falls_back_to_the_template_world() {
        let mut print = NoPrint;
        let mut context = test_context(&mut print);
        let node = dummy_node(&mut context);
        let shared = context.values.byte_type();
        context.set_type(node, shared);

        context.static_id = 7;
        assert_eq!(context.get_type(node), Some(shared), "id 7 must fall back to id 0");

        let local = context.values.boolean_type();
        context.set_type(node, local);
        assert_eq!(context.get_type(node), Some(local), "a local entry shadows the template");

        context.reset_node(node);
        assert_eq!(
            context.get_type(node),
            Some(shared),
            "reset forgets only the current static id"
        );
        context.static_id = 0;
        assert_eq!(context.get_type(node), Some(shared));
    }

    /// Source paths register once and keep their indices.
    #[test]
    fn source_map_dedupes_paths() {
        let mut sources = SourceMap::default();
        let a = sources.register("a.lang");
        let b = sources.register("b.lang");
        assert_eq!(sources.register("a.lang"), a);
        assert_ne!(a, b);
        assert_eq!(sources.path(b), "b.lang");
    }
}
