//! The value universe.
//!
//! Types are values: one closed tagged sum covers compile-time values and the
//! type forms of each, so `evaluate(type-expr)` and `@size_of(value)` work on
//! the same representation. Values are allocated in a 64 K-block arena and
//! addressed by [`ValueId`]; id equality is the pointer equality that the
//! monomorphization memo and the import cache promise, while [`Values::equal`]
//! is the structural relation used to compare static-argument tuples.

use std::fmt::Write as _;

use crate::{
    arena::{Arena, Id},
    ast::{Node, NodeId, NodeKind},
    intern::{Interns, NameId},
    scope::Scope,
};

/// Handle of a value in the value arena.
pub type ValueId = Id<ValueData>;

/// One declared parameter inside a function-type value.
#[derive(Debug, Clone)]
pub struct ParamValue {
    pub name: NameId,
    /// Absent while the parameter is inferred and unresolved.
    pub ty: Option<ValueId>,
    pub is_static: bool,
    pub inferred: bool,
}

/// The closed tag set of runtime values and type values.
#[derive(Debug, Clone)]
pub enum ValueData {
    // Values.
    Integer(i64),
    Float(f64),
    Byte(u8),
    Boolean(bool),
    /// An enum item by index into its enum type's item list.
    Enum(usize),
    Optional {
        present: bool,
        value: Option<ValueId>,
    },
    Range {
        start: ValueId,
        end: Option<ValueId>,
    },
    /// A compile-time pointer; `None` is the null pointer.
    Pointer(Option<ValueId>),
    Array(Vec<ValueId>),
    ArrayView(Vec<ValueId>),
    /// Struct and tuple payloads share this positional form.
    Struct(Vec<ValueId>),
    TaggedUnion {
        tag: ValueId,
        payload: ValueId,
    },
    Union(ValueId),
    /// A module with the scope chain captured where it was evaluated.
    Module {
        body: NodeId,
        scopes: Vec<Scope>,
    },
    /// A fully elaborated function.
    Function {
        ty: ValueId,
        body: Option<NodeId>,
        static_id: u64,
        node: NodeId,
        extern_name: Option<NameId>,
        compile_only: bool,
    },
    /// A function whose type is incomplete (static parameters pending); the
    /// captured scopes are replayed per instantiation.
    FunctionStub {
        node: NodeId,
        scopes: Vec<Scope>,
    },
    /// A generic define awaiting its static arguments; applied with call
    /// syntax and memoized per argument tuple.
    Template {
        node: NodeId,
        scopes: Vec<Scope>,
    },
    // Types.
    IntegerType {
        signed: bool,
        bits: u32,
    },
    FloatType {
        bits: u32,
    },
    ByteType,
    BooleanType,
    /// The type of types.
    TypeType,
    /// The `none` sentinel: the absent value, and the `void` pointee.
    None,
    EnumType {
        items: Vec<NameId>,
    },
    OptionalType {
        inner: ValueId,
    },
    PointerType {
        inner: ValueId,
    },
    ArrayType {
        inner: ValueId,
        /// `None` while the size is still to be inferred from a literal.
        size: Option<ValueId>,
    },
    ArrayViewType {
        inner: ValueId,
    },
    RangeType {
        element: ValueId,
    },
    ResultType {
        value: Option<ValueId>,
        error: ValueId,
    },
    /// Member types are positional; the names live on the declaration node.
    StructType {
        members: Vec<ValueId>,
        node: Option<NodeId>,
        /// Static arguments of an applied generic, consulted by pattern
        /// matching when a parameter type is written as `Template(args…)`.
        arguments: Vec<ValueId>,
        operators: Vec<(NameId, ValueId)>,
    },
    TupleType {
        members: Vec<ValueId>,
    },
    UnionType {
        items: Vec<(NameId, ValueId)>,
    },
    TaggedUnionType {
        items: Vec<(NameId, ValueId)>,
        /// The companion enum type carrying the tag.
        enum_type: ValueId,
    },
    FunctionType {
        parameters: Vec<ParamValue>,
        return_type: Option<ValueId>,
        variadic: bool,
        /// Set while static parameters await resolution; the full type exists
        /// only per instantiation.
        incomplete: bool,
        node: Option<NodeId>,
    },
    ModuleType,
}

/// Owner of all values of one compilation, with pre-allocated singletons for
/// the tag-only types.
#[derive(Debug)]
pub struct Values {
    arena: Arena<ValueData>,
    none: ValueId,
    type_type: ValueId,
    byte_type: ValueId,
    boolean_type: ValueId,
    module_type: ValueId,
}

impl Values {
    pub(crate) fn new() -> Self {
        let mut arena = Arena::new();
        let none = arena.alloc(ValueData::None);
        let type_type = arena.alloc(ValueData::TypeType);
        let byte_type = arena.alloc(ValueData::ByteType);
        let boolean_type = arena.alloc(ValueData::BooleanType);
        let module_type = arena.alloc(ValueData::ModuleType);
        Self {
            arena,
            none,
            type_type,
            byte_type,
            boolean_type,
            module_type,
        }
    }

    pub(crate) fn alloc(&mut self, data: ValueData) -> ValueId {
        self.arena.alloc(data)
    }

    pub fn get(&self, id: ValueId) -> &ValueData {
        self.arena.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: ValueId) -> &mut ValueData {
        self.arena.get_mut(id)
    }

    pub fn none(&self) -> ValueId {
        self.none
    }

    pub fn type_type(&self) -> ValueId {
        self.type_type
    }

    pub fn byte_type(&self) -> ValueId {
        self.byte_type
    }

    pub fn boolean_type(&self) -> ValueId {
        self.boolean_type
    }

    pub fn module_type(&self) -> ValueId {
        self.module_type
    }

    pub fn integer(&mut self, value: i64) -> ValueId {
        self.alloc(ValueData::Integer(value))
    }

    pub fn byte(&mut self, value: u8) -> ValueId {
        self.alloc(ValueData::Byte(value))
    }

    pub fn boolean(&mut self, value: bool) -> ValueId {
        self.alloc(ValueData::Boolean(value))
    }

    pub fn enum_value(&mut self, index: usize) -> ValueId {
        self.alloc(ValueData::Enum(index))
    }

    pub fn integer_type(&mut self, signed: bool, bits: u32) -> ValueId {
        self.alloc(ValueData::IntegerType { signed, bits })
    }

    pub fn float_type(&mut self, bits: u32) -> ValueId {
        self.alloc(ValueData::FloatType { bits })
    }

    pub fn pointer_type(&mut self, inner: ValueId) -> ValueId {
        self.alloc(ValueData::PointerType { inner })
    }

    pub fn optional_type(&mut self, inner: ValueId) -> ValueId {
        self.alloc(ValueData::OptionalType { inner })
    }

    pub fn array_type(&mut self, inner: ValueId, size: Option<ValueId>) -> ValueId {
        self.alloc(ValueData::ArrayType { inner, size })
    }

    pub fn array_view_type(&mut self, inner: ValueId) -> ValueId {
        self.alloc(ValueData::ArrayViewType { inner })
    }

    pub fn range_type(&mut self, element: ValueId) -> ValueId {
        self.alloc(ValueData::RangeType { element })
    }

    /// The default string type: an array view of bytes.
    pub fn str_type(&mut self) -> ValueId {
        let byte = self.byte_type;
        self.array_view_type(byte)
    }

    /// Builds an array-view value of byte values from raw bytes.
    pub fn bytes_view(&mut self, bytes: &[u8]) -> ValueId {
        let values = bytes.iter().map(|&b| self.byte(b)).collect();
        self.alloc(ValueData::ArrayView(values))
    }

    /// Extracts raw bytes from a byte-like value: a byte, an array view of
    /// bytes, a byte array, or a pointer to one.
    pub fn byte_payload(&self, id: ValueId) -> Option<Vec<u8>> {
        match self.get(id) {
            ValueData::Byte(value) => Some(vec![*value]),
            ValueData::ArrayView(items) | ValueData::Array(items) => items
                .iter()
                .map(|&item| match self.get(item) {
                    ValueData::Byte(value) => Some(*value),
                    _ => None,
                })
                .collect(),
            ValueData::Pointer(Some(inner)) => match self.get(*inner) {
                ValueData::Array(_) => self.byte_payload(*inner),
                _ => None,
            },
            _ => None,
        }
    }

    /// Structural value equality: the relation used to canonicalize static
    /// argument tuples and compare enum tags.
    pub fn equal(&self, a: ValueId, b: ValueId) -> bool {
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (ValueData::Integer(x), ValueData::Integer(y)) => x == y,
            (ValueData::Float(x), ValueData::Float(y)) => x == y,
            (ValueData::Byte(x), ValueData::Byte(y)) => x == y,
            (ValueData::Boolean(x), ValueData::Boolean(y)) => x == y,
            (ValueData::Enum(x), ValueData::Enum(y)) => x == y,
            (
                ValueData::Optional { present: p1, value: v1 },
                ValueData::Optional { present: p2, value: v2 },
            ) => p1 == p2 && self.optional_ids_equal(*v1, *v2),
            (ValueData::Range { start: s1, end: e1 }, ValueData::Range { start: s2, end: e2 }) => {
                self.equal(*s1, *s2) && self.optional_ids_equal(*e1, *e2)
            }
            // Pointer values compare by pointee identity.
            (ValueData::Pointer(x), ValueData::Pointer(y)) => x == y,
            (ValueData::Array(x), ValueData::Array(y))
            | (ValueData::ArrayView(x), ValueData::ArrayView(y))
            | (ValueData::Struct(x), ValueData::Struct(y)) => self.all_equal(x, y),
            (ValueData::TaggedUnion { tag: t1, payload: p1 }, ValueData::TaggedUnion { tag: t2, payload: p2 }) => {
                self.equal(*t1, *t2) && self.equal(*p1, *p2)
            }
            (ValueData::Union(x), ValueData::Union(y)) => self.equal(*x, *y),
            (ValueData::Module { body: b1, .. }, ValueData::Module { body: b2, .. }) => b1 == b2,
            (
                ValueData::Function {
                    node: n1, static_id: s1, ..
                },
                ValueData::Function {
                    node: n2, static_id: s2, ..
                },
            ) => n1 == n2 && s1 == s2,
            (ValueData::FunctionStub { node: n1, .. }, ValueData::FunctionStub { node: n2, .. })
            | (ValueData::Template { node: n1, .. }, ValueData::Template { node: n2, .. }) => n1 == n2,
            (
                ValueData::IntegerType { signed: s1, bits: b1 },
                ValueData::IntegerType { signed: s2, bits: b2 },
            ) => s1 == s2 && b1 == b2,
            (ValueData::FloatType { bits: x }, ValueData::FloatType { bits: y }) => x == y,
            (ValueData::ByteType, ValueData::ByteType)
            | (ValueData::BooleanType, ValueData::BooleanType)
            | (ValueData::TypeType, ValueData::TypeType)
            | (ValueData::None, ValueData::None)
            | (ValueData::ModuleType, ValueData::ModuleType) => true,
            (ValueData::EnumType { items: x }, ValueData::EnumType { items: y }) => x == y,
            (ValueData::OptionalType { inner: x }, ValueData::OptionalType { inner: y })
            | (ValueData::PointerType { inner: x }, ValueData::PointerType { inner: y })
            | (ValueData::ArrayViewType { inner: x }, ValueData::ArrayViewType { inner: y }) => self.equal(*x, *y),
            (
                ValueData::ArrayType { inner: i1, size: s1 },
                ValueData::ArrayType { inner: i2, size: s2 },
            ) => self.equal(*i1, *i2) && self.optional_ids_equal(*s1, *s2),
            (ValueData::RangeType { element: x }, ValueData::RangeType { element: y }) => self.equal(*x, *y),
            (
                ValueData::ResultType { value: v1, error: e1 },
                ValueData::ResultType { value: v2, error: e2 },
            ) => self.optional_ids_equal(*v1, *v2) && self.equal(*e1, *e2),
            (
                ValueData::StructType {
                    members: m1, node: n1, ..
                },
                ValueData::StructType {
                    members: m2, node: n2, ..
                },
            ) => n1 == n2 && self.all_equal(m1, m2),
            (ValueData::TupleType { members: x }, ValueData::TupleType { members: y }) => self.all_equal(x, y),
            (ValueData::UnionType { items: x }, ValueData::UnionType { items: y }) => self.items_equal(x, y),
            (
                ValueData::TaggedUnionType { items: x, .. },
                ValueData::TaggedUnionType { items: y, .. },
            ) => self.items_equal(x, y),
            (
                ValueData::FunctionType {
                    parameters: p1,
                    return_type: r1,
                    variadic: v1,
                    ..
                },
                ValueData::FunctionType {
                    parameters: p2,
                    return_type: r2,
                    variadic: v2,
                    ..
                },
            ) => {
                v1 == v2
                    && self.optional_ids_equal(*r1, *r2)
                    && p1.len() == p2.len()
                    && p1.iter().zip(p2).all(|(a, b)| {
                        a.is_static == b.is_static
                            && a.inferred == b.inferred
                            && match (a.ty, b.ty) {
                                (Some(x), Some(y)) => self.equal(x, y),
                                (None, None) => true,
                                _ => false,
                            }
                    })
            }
            _ => false,
        }
    }

    fn optional_ids_equal(&self, a: Option<ValueId>, b: Option<ValueId>) -> bool {
        match (a, b) {
            (Some(x), Some(y)) => self.equal(x, y),
            (None, None) => true,
            _ => false,
        }
    }

    fn all_equal(&self, a: &[ValueId], b: &[ValueId]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| self.equal(x, y))
    }

    fn items_equal(&self, a: &[(NameId, ValueId)], b: &[(NameId, ValueId)]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.0 == y.0 && self.equal(x.1, y.1))
    }

    /// Whether a value of type `got` may flow where `want` is expected.
    ///
    /// The single subtyping rule: a pointer whose pointee is `void` is
    /// assignable to and from any pointer type. Everything else is exact
    /// structural equality; integer and float widths must match.
    pub fn assignable(&self, want: ValueId, got: ValueId) -> bool {
        if let (ValueData::PointerType { inner: w }, ValueData::PointerType { inner: g }) =
            (self.get(want), self.get(got))
        {
            if matches!(self.get(*w), ValueData::None) || matches!(self.get(*g), ValueData::None) {
                return true;
            }
            return self.equal(*w, *g);
        }
        self.equal(want, got)
    }

    /// Renders a type for diagnostics, in the surface spelling.
    pub fn format_type(&self, nodes: &Arena<Node>, interns: &Interns, id: ValueId) -> String {
        let mut out = String::new();
        self.format_type_into(nodes, interns, id, &mut out);
        out
    }

    /// Renders `Some(type)` quoted and `None` as `nothing`, the shape used by
    /// expected/got diagnostics.
    pub fn format_type_outer(&self, nodes: &Arena<Node>, interns: &Interns, id: Option<ValueId>) -> String {
        match id {
            Some(id) => format!("'{}'", self.format_type(nodes, interns, id)),
            None => "nothing".to_owned(),
        }
    }

    fn format_type_into(&self, nodes: &Arena<Node>, interns: &Interns, id: ValueId, out: &mut String) {
        match self.get(id) {
            ValueData::PointerType { inner } => {
                out.push('^');
                if !matches!(self.get(*inner), ValueData::None) {
                    self.format_type_into(nodes, interns, *inner, out);
                } else {
                    out.push_str("void");
                }
            }
            ValueData::OptionalType { inner } => {
                out.push('?');
                self.format_type_into(nodes, interns, *inner, out);
            }
            ValueData::ResultType { value, error } => {
                if let Some(value) = value {
                    self.format_type_into(nodes, interns, *value, out);
                }
                out.push('!');
                self.format_type_into(nodes, interns, *error, out);
            }
            ValueData::ArrayType { inner, size } => {
                out.push('[');
                match size {
                    Some(size) => self.format_type_into(nodes, interns, *size, out),
                    None => out.push('_'),
                }
                out.push(']');
                self.format_type_into(nodes, interns, *inner, out);
            }
            ValueData::ArrayViewType { inner } => {
                out.push_str("[]");
                self.format_type_into(nodes, interns, *inner, out);
            }
            ValueData::RangeType { element } => {
                out.push_str("range ");
                self.format_type_into(nodes, interns, *element, out);
            }
            ValueData::StructType { members, node, .. } => {
                out.push_str("struct{");
                for (index, member) in members.iter().enumerate() {
                    if index > 0 {
                        out.push(',');
                    }
                    if let Some(name) = struct_member_name(nodes, *node, index) {
                        let _ = write!(out, "{}:", interns.get(name));
                    }
                    self.format_type_into(nodes, interns, *member, out);
                }
                out.push('}');
            }
            ValueData::TupleType { members } => {
                out.push_str("tuple{");
                for (index, member) in members.iter().enumerate() {
                    if index > 0 {
                        out.push(',');
                    }
                    self.format_type_into(nodes, interns, *member, out);
                }
                out.push('}');
            }
            ValueData::UnionType { items } => self.format_items(nodes, interns, "union{", items, out),
            ValueData::TaggedUnionType { items, .. } => {
                self.format_items(nodes, interns, "tagged_union{", items, out);
            }
            ValueData::EnumType { items } => {
                out.push_str("enum{");
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        out.push(',');
                    }
                    out.push_str(interns.get(*item));
                }
                out.push('}');
            }
            ValueData::IntegerType { signed, bits } => {
                let _ = write!(out, "int({signed},{bits})");
            }
            ValueData::FloatType { bits } => {
                let _ = write!(out, "flt{bits}");
            }
            ValueData::ByteType => out.push_str("byte"),
            ValueData::BooleanType => out.push_str("bool"),
            ValueData::TypeType => out.push_str("type"),
            ValueData::ModuleType => out.push_str("module"),
            ValueData::None => out.push_str("()"),
            ValueData::FunctionType {
                parameters,
                return_type,
                variadic,
                ..
            } => {
                out.push_str("fn(");
                let mut first = true;
                for parameter in parameters {
                    if parameter.inferred {
                        continue;
                    }
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    match parameter.ty {
                        Some(ty) => self.format_type_into(nodes, interns, ty, out),
                        None => out.push('_'),
                    }
                }
                if *variadic {
                    if !first {
                        out.push(',');
                    }
                    out.push_str("..");
                }
                out.push(')');
                if let Some(return_type) = return_type {
                    out.push(':');
                    self.format_type_into(nodes, interns, *return_type, out);
                }
            }
            // Plain values reach here through static argument diagnostics.
            ValueData::Integer(value) => {
                let _ = write!(out, "{value}");
            }
            ValueData::Boolean(value) => {
                let _ = write!(out, "{value}");
            }
            other => {
                let _ = write!(out, "<{}>", value_tag_name(other));
            }
        }
    }

    fn format_items(
        &self,
        nodes: &Arena<Node>,
        interns: &Interns,
        open: &str,
        items: &[(NameId, ValueId)],
        out: &mut String,
    ) {
        out.push_str(open);
        for (index, (name, ty)) in items.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}:", interns.get(*name));
            self.format_type_into(nodes, interns, *ty, out);
        }
        out.push('}');
    }

    /// Renders a value for the `@print` intrinsic.
    pub fn format_value(&self, nodes: &Arena<Node>, interns: &Interns, id: ValueId) -> String {
        match self.get(id) {
            ValueData::Integer(value) => value.to_string(),
            ValueData::Float(value) => value.to_string(),
            ValueData::Byte(value) => char::from(*value).to_string(),
            ValueData::Boolean(value) => value.to_string(),
            ValueData::Enum(index) => format!(".{index}"),
            ValueData::None => "()".to_owned(),
            ValueData::Optional { present: false, .. } => "null".to_owned(),
            ValueData::Optional {
                present: true,
                value: Some(inner),
            } => self.format_value(nodes, interns, *inner),
            ValueData::ArrayView(items) | ValueData::Array(items) => {
                if let Some(bytes) = self.byte_payload(id) {
                    return String::from_utf8_lossy(&bytes).into_owned();
                }
                let rendered: Vec<String> = items
                    .iter()
                    .map(|&item| self.format_value(nodes, interns, item))
                    .collect();
                format!("[{}]", rendered.join(", "))
            }
            ValueData::Struct(members) => {
                let rendered: Vec<String> = members
                    .iter()
                    .map(|&member| self.format_value(nodes, interns, member))
                    .collect();
                format!(".{{{}}}", rendered.join(", "))
            }
            ValueData::Pointer(Some(inner)) => {
                if let Some(bytes) = self.byte_payload(id) {
                    return String::from_utf8_lossy(&bytes).into_owned();
                }
                format!("^{}", self.format_value(nodes, interns, *inner))
            }
            ValueData::Pointer(None) => "null".to_owned(),
            ValueData::Range { start, end } => {
                let start = self.format_value(nodes, interns, *start);
                match end {
                    Some(end) => format!("{start}..{}", self.format_value(nodes, interns, *end)),
                    None => format!("{start}.."),
                }
            }
            _ => self.format_type(nodes, interns, id),
        }
    }
}

/// Name of a struct type's member at `index`, read off the declaration node.
pub(crate) fn struct_member_name(nodes: &Arena<Node>, node: Option<NodeId>, index: usize) -> Option<NameId> {
    let node = node?;
    match &nodes.get(node).kind {
        NodeKind::StructType { members, .. } => members.get(index).map(|member| member.name),
        _ => None,
    }
}

fn value_tag_name(data: &ValueData) -> &'static str {
    match data {
        ValueData::Integer(_) => "integer",
        ValueData::Float(_) => "float",
        ValueData::Byte(_) => "byte",
        ValueData::Boolean(_) => "boolean",
        ValueData::Enum(_) => "enum",
        ValueData::Optional { .. } => "optional",
        ValueData::Range { .. } => "range",
        ValueData::Pointer(_) => "pointer",
        ValueData::Array(_) => "array",
        ValueData::ArrayView(_) => "array-view",
        ValueData::Struct(_) => "struct",
        ValueData::TaggedUnion { .. } => "tagged-union",
        ValueData::Union(_) => "union",
        ValueData::Module { .. } => "module",
        ValueData::Function { .. } => "function",
        ValueData::FunctionStub { .. } => "function",
        ValueData::Template { .. } => "template",
        ValueData::IntegerType { .. } => "integer-type",
        ValueData::FloatType { .. } => "float-type",
        ValueData::ByteType => "byte-type",
        ValueData::BooleanType => "boolean-type",
        ValueData::TypeType => "type",
        ValueData::None => "none",
        ValueData::EnumType { .. } => "enum-type",
        ValueData::OptionalType { .. } => "optional-type",
        ValueData::PointerType { .. } => "pointer-type",
        ValueData::ArrayType { .. } => "array-type",
        ValueData::ArrayViewType { .. } => "array-view-type",
        ValueData::RangeType { .. } => "range-type",
        ValueData::ResultType { .. } => "result-type",
        ValueData::StructType { .. } => "struct-type",
        ValueData::TupleType { .. } => "tuple-type",
        ValueData::UnionType { .. } => "union-type",
        ValueData::TaggedUnionType { .. } => "tagged-union-type",
        ValueData::FunctionType { .. } => "function-type",
        ValueData::ModuleType => "module-type",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widths_compare_exactly() {
        let mut values = Values::new();
        let i64s = values.integer_type(true, 64);
        let i64s_again = values.integer_type(true, 64);
        let i32s = values.integer_type(true, 32);
        let u64s = values.integer_type(false, 64);
        assert!(values.assignable(i64s, i64s_again));
        assert!(!values.assignable(i64s, i32s), "width must match exactly");
        assert!(!values.assignable(i64s, u64s), "signedness must match exactly");
    }

    /// Pointer-to-void is assignable to and from any pointer type, in both
    /// directions.
    #[test]
    fn void_pointer_is_a_two_way_wildcard() {
        let mut values = Values::new();
        let none = values.none();
        let byte = values.byte_type();
        let void_ptr = values.pointer_type(none);
        let byte_ptr = values.pointer_type(byte);
        let bool_ty = values.boolean_type();
        let bool_ptr = values.pointer_type(bool_ty);
        assert!(values.assignable(void_ptr, byte_ptr));
        assert!(values.assignable(byte_ptr, void_ptr));
        assert!(values.assignable(void_ptr, bool_ptr));
        assert!(!values.assignable(byte_ptr, bool_ptr), "distinct pointees stay apart");
    }

    #[test]
    fn structural_equality_descends() {
        let mut values = Values::new();
        let byte = values.byte_type();
        let view_a = values.array_view_type(byte);
        let view_b = values.array_view_type(byte);
        assert!(values.equal(view_a, view_b));

        let three_a = values.integer(3);
        let three_b = values.integer(3);
        let four = values.integer(4);
        let arr_a = values.array_type(byte, Some(three_a));
        let arr_b = values.array_type(byte, Some(three_b));
        let arr_c = values.array_type(byte, Some(four));
        assert!(values.equal(arr_a, arr_b));
        assert!(!values.equal(arr_a, arr_c), "array sizes participate in equality");
    }

    #[test]
    fn byte_payload_reads_views_and_pointed_arrays() {
        let mut values = Values::new();
        let view = values.bytes_view(b"abc");
        assert_eq!(values.byte_payload(view).as_deref(), Some(b"abc".as_slice()));

        let a = values.byte(b'h');
        let b = values.byte(b'i');
        let array = values.alloc(ValueData::Array(vec![a, b]));
        let pointer = values.alloc(ValueData::Pointer(Some(array)));
        assert_eq!(values.byte_payload(pointer).as_deref(), Some(b"hi".as_slice()));
    }
}
