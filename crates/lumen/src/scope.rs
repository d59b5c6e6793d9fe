//! Scope stack entries.
//!
//! A scope is pushed before entering any node that introduces bindings and
//! popped on exit; the entry owns its maps. Scopes are also captured by value
//! into module values and function stubs, so instantiating a generic function
//! or resolving a qualified name replays the lexical chain it was declared
//! under.

use ahash::AHashMap;

use crate::{ast::NodeId, intern::NameId, value::ValueId};

/// A runtime binding introduced by `catch`, an `if` capture, a `for` binding,
/// or a tagged-union `switch` case.
#[derive(Debug, Clone, Copy)]
pub struct Binding {
    pub ty: ValueId,
    /// Position among the owning node's bindings, consumed by codegen.
    pub index: usize,
}

/// A compile-time value together with its type.
#[derive(Debug, Clone, Copy)]
pub struct TypedValue {
    pub value: ValueId,
    pub ty: ValueId,
}

/// One entry of the scope stack.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// The node that owns this scope (block, function, while, …).
    pub node: Option<NodeId>,
    /// Runtime local variables, by declaration node.
    pub variables: AHashMap<NameId, NodeId>,
    /// Value bindings (see [`Binding`]).
    pub bindings: AHashMap<NameId, Binding>,
    /// Compile-time known bindings: generic arguments, static parameters,
    /// `for static` loop variables, `if static` captures.
    pub static_bindings: AHashMap<NameId, TypedValue>,
    /// `var static` declarations, by declaration node.
    pub static_variables: AHashMap<NameId, NodeId>,
    /// The elaborated function type when this scope belongs to a function,
    /// used to resolve parameter references.
    pub function_type: Option<ValueId>,
    /// The type currently being defined, for the `@self` intrinsic.
    pub current_type: Option<ValueId>,
}

impl Scope {
    pub fn for_node(node: NodeId) -> Self {
        Self {
            node: Some(node),
            ..Self::default()
        }
    }
}
