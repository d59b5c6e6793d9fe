//! Variant-specific elaborated side-data.
//!
//! One `NodeData` is attached to each elaborated node, keyed by the static id
//! it was elaborated under, and consumed by the code generator: the resolved
//! identifier kind, the chosen overload, structural layout info, divergence
//! flags. The elaborator also uses a few entries as its own working storage:
//! the `while` break type accumulates here, and the function-type entry owns
//! the monomorphization memo.

use crate::{ast::NodeId, value::ValueId};

/// What an identifier resolved to.
#[derive(Debug, Clone, Copy)]
pub enum IdentifierKind {
    /// A runtime local, by declaration node.
    Variable(NodeId),
    /// A function parameter, by index among the non-static, non-inferred
    /// parameters.
    Argument(usize),
    /// A value binding on an enclosing node (`catch`, `if` capture, `for`).
    Binding { node: NodeId, index: usize },
    /// A `var static` slot, by declaration node.
    StaticVariable(NodeId),
    /// A compile-time value (module item, function literal, enum item,
    /// static binding).
    Value(ValueId),
    /// The `_` discard target.
    Discard,
}

/// One memoized instantiation of a function with static parameters, or of a
/// generic define.
#[derive(Debug, Clone)]
pub struct Variation {
    /// Canonicalized static-argument values, in declaration order.
    pub static_arguments: Vec<ValueId>,
    pub value: ValueId,
    pub ty: ValueId,
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Identifier {
        kind: IdentifierKind,
        ty: ValueId,
        want_pointer: bool,
    },
    Variable {
        ty: ValueId,
    },
    String {
        ty: ValueId,
        /// Escape-expanded bytes.
        bytes: Vec<u8>,
    },
    Character {
        value: u8,
    },
    Number {
        ty: ValueId,
    },
    Null {
        ty: ValueId,
    },
    Structure {
        ty: ValueId,
    },
    Run {
        value: ValueId,
    },
    Call {
        function_type: ValueId,
        function_value: Option<ValueId>,
    },
    CallMethod {
        /// Receiver first, then the written arguments.
        arguments: Vec<NodeId>,
        function: ValueId,
        function_type: ValueId,
    },
    If {
        condition_type: ValueId,
        /// The branch taken by `if static`.
        static_condition: Option<bool>,
        then_returned: bool,
        else_returned: bool,
        returned: bool,
        result_type: Option<ValueId>,
    },
    Define {
        value: ValueId,
        ty: ValueId,
    },
    /// A generic define: the family of instantiations, indexed by
    /// static-argument tuple.
    DefineTemplate {
        instances: Vec<Variation>,
    },
    Function {
        compile_only: bool,
        returned: bool,
    },
    FunctionType {
        value: ValueId,
        /// Monomorphization memo for functions with static parameters.
        variations: Vec<Variation>,
    },
    StructureAccess {
        structure_type: ValueId,
        item_type: ValueId,
        /// Member position, for codegen.
        index: usize,
        /// Whether the parent was already a pointer (an indirect access).
        pointer_access: bool,
        want_pointer: bool,
    },
    Dereference {
        ty: ValueId,
    },
    Deoptional {
        ty: ValueId,
    },
    ArrayAccess {
        array_type: ValueId,
        item_type: ValueId,
        /// Resolved `[]` overload: function value and its type.
        overload: Option<(ValueId, ValueId)>,
        want_pointer: bool,
    },
    Slice {
        array_like_type: ValueId,
    },
    BinaryOp {
        operand_type: ValueId,
    },
    Block {
        /// Deferred statements, elaborated after the block's main statements.
        defers: Vec<NodeId>,
    },
    Break {
        /// The enclosing while.
        target: NodeId,
    },
    While {
        wanted_type: Option<ValueId>,
        /// Type agreed on by `break value` statements; `Some(None)` records
        /// that breaks carry no value.
        break_type: Option<Option<ValueId>>,
    },
    Catch {
        result_type: ValueId,
        returned: bool,
    },
    Switch {
        /// The case selected by `switch static`.
        static_case: Option<usize>,
        cases_returned: Vec<bool>,
        returned: bool,
        ty: Option<ValueId>,
    },
    Return {
        return_type: Option<ValueId>,
    },
    For {
        item_types: Vec<ValueId>,
        /// One fresh static id per unrolled iteration of `for static`.
        static_ids: Vec<u64>,
    },
    Cast {
        from: ValueId,
        to: ValueId,
    },
    Internal {
        /// The intrinsic's compile-time result, when it has one.
        value: Option<ValueId>,
        /// The expression spliced in by `@embed`.
        embed: Option<NodeId>,
    },
    Is {
        /// The checked tag as an enum value.
        tag: ValueId,
        ty: ValueId,
    },
    Global {
        ty: ValueId,
    },
    /// The struct type value pre-created during elaboration so that `@self`
    /// inside member types can observe the type being defined; its member
    /// list is filled on first evaluation.
    StructTypeValue {
        value: ValueId,
    },
    /// A generic define applied at a call site: the memoized instance and its
    /// type.
    TemplateApply {
        value: ValueId,
        ty: ValueId,
    },
}
