//! Compile-time evaluation.
//!
//! A strict, single-threaded, re-entrant tree-walking interpreter over nodes
//! the elaborator has already decorated: identifier nodes carry their resolved
//! values, calls carry their monomorphized function, intrinsics carry their
//! computed results. `return` travels as a control variant of the error
//! channel and is caught by the nearest call frame, so nested calls restore
//! the parent's escape implicitly, including across re-entry through
//! `@import` and `run`.

use crate::{
    ast::{NodeId, NodeKind, NumberValue},
    context::Context,
    data::{IdentifierKind, NodeData},
    error::{CompileError, ErrorKind},
    value::{ValueData, ValueId},
};

/// One evaluator call frame: the argument values of the call, indexed by
/// position among the non-static, non-inferred parameters.
#[derive(Debug)]
pub(crate) struct Frame {
    pub arguments: Vec<ValueId>,
}

/// Why evaluation stopped early.
#[derive(Debug)]
pub(crate) enum EvalInterrupt {
    /// A `return` unwinding to the nearest call frame.
    Return(ValueId),
    /// A fatal diagnostic.
    Error(CompileError),
}

impl From<CompileError> for EvalInterrupt {
    fn from(error: CompileError) -> Self {
        Self::Error(error)
    }
}

pub(crate) type EvalResult<T> = Result<T, EvalInterrupt>;

impl Context<'_> {
    /// Evaluation as invoked from inside elaboration, where a stray `return`
    /// has no frame to land in and becomes a diagnostic.
    pub(crate) fn evaluate_for_elaboration(&mut self, node: NodeId) -> Result<ValueId, CompileError> {
        match self.evaluate(node) {
            Ok(value) => Ok(value),
            Err(EvalInterrupt::Return(_)) => Err(self.error(
                node,
                ErrorKind::ControlFlow,
                "Return outside of a call".to_owned(),
            )),
            Err(EvalInterrupt::Error(error)) => Err(error),
        }
    }

    fn eval_failure(&self, node: NodeId, what: &str) -> EvalInterrupt {
        EvalInterrupt::Error(self.error(
            node,
            ErrorKind::ControlFlow,
            format!("Cannot evaluate {what} at compile time"),
        ))
    }

    /// Evaluates an elaborated node to a value.
    pub(crate) fn evaluate(&mut self, node: NodeId) -> EvalResult<ValueId> {
        match &self.node(node).kind {
            NodeKind::Number { value } => {
                let value = *value;
                Ok(match value {
                    NumberValue::Integer(integer) => self.values.integer(integer),
                    NumberValue::Decimal(decimal) => self.values.alloc(ValueData::Float(decimal)),
                })
            }
            NodeKind::Boolean { value } => {
                let value = *value;
                Ok(self.values.boolean(value))
            }
            NodeKind::Null => Ok(self.values.alloc(ValueData::Optional {
                present: false,
                value: None,
            })),
            NodeKind::Character { .. } => {
                let Some(NodeData::Character { value }) = self.get_data(node) else {
                    return Err(self.eval_failure(node, "character"));
                };
                let value = *value;
                Ok(self.values.byte(value))
            }
            NodeKind::String { .. } => self.evaluate_string(node),
            NodeKind::Identifier { assign_value, .. } => {
                let assign_value = *assign_value;
                self.evaluate_identifier(node, assign_value)
            }
            NodeKind::Function { function_type, body, extern_name } => {
                let (function_type, body, extern_name) = (*function_type, *body, *extern_name);
                self.evaluate_function(node, function_type, body, extern_name)
            }
            NodeKind::FunctionType { .. } => {
                let Some(NodeData::FunctionType { value, .. }) = self.get_data(node) else {
                    return Err(self.eval_failure(node, "function type"));
                };
                Ok(*value)
            }
            NodeKind::Module { body } => {
                let body = *body;
                let mut scopes = self.scopes.clone();
                scopes.push(crate::scope::Scope::for_node(body));
                Ok(self.values.alloc(ValueData::Module { body, scopes }))
            }
            NodeKind::PointerType { inner } => {
                let inner = *inner;
                let inner = self.evaluate(inner)?;
                Ok(self.values.pointer_type(inner))
            }
            NodeKind::OptionalType { inner } => {
                let inner = *inner;
                let inner = self.evaluate(inner)?;
                Ok(self.values.optional_type(inner))
            }
            NodeKind::ArrayViewType { inner } => {
                let inner = *inner;
                let inner = self.evaluate(inner)?;
                Ok(self.values.array_view_type(inner))
            }
            NodeKind::ArrayType { inner, size } => {
                let (inner, size) = (*inner, *size);
                let size = match size {
                    Some(size) => Some(self.evaluate(size)?),
                    None => None,
                };
                let inner = self.evaluate(inner)?;
                Ok(self.values.array_type(inner, size))
            }
            NodeKind::ResultType { value, error } => {
                let (value, error) = (*value, *error);
                let value = match value {
                    Some(value) => Some(self.evaluate(value)?),
                    None => None,
                };
                let error = self.evaluate(error)?;
                Ok(self.values.alloc(ValueData::ResultType { value, error }))
            }
            NodeKind::EnumType { items } => {
                let items = items.clone();
                Ok(self.values.alloc(ValueData::EnumType { items }))
            }
            NodeKind::StructType { .. } => self.evaluate_struct_type(node),
            NodeKind::UnionType { members } => {
                let members = members.clone();
                let mut items = Vec::with_capacity(members.len());
                for member in members {
                    items.push((member.name, self.evaluate(member.ty)?));
                }
                Ok(self.values.alloc(ValueData::UnionType { items }))
            }
            NodeKind::TaggedUnionType { members } => {
                let members = members.clone();
                let mut items = Vec::with_capacity(members.len());
                for member in &members {
                    items.push((member.name, self.evaluate(member.ty)?));
                }
                let names = members.iter().map(|member| member.name).collect();
                let enum_type = self.values.alloc(ValueData::EnumType { items: names });
                Ok(self.values.alloc(ValueData::TaggedUnionType { items, enum_type }))
            }
            NodeKind::Structure { .. } => self.evaluate_structure(node),
            NodeKind::StructureAccess { parent, name, .. } => {
                let (parent, name) = (*parent, *name);
                self.evaluate_structure_access(node, parent, name)
            }
            NodeKind::ArrayAccess { parent, index, .. } => {
                let (parent, index) = (*parent, *index);
                self.evaluate_array_access(node, parent, index)
            }
            NodeKind::BinaryOp { left, right, op } => {
                let (left, right, op) = (*left, *right, *op);
                self.evaluate_binary_op(node, left, right, op)
            }
            NodeKind::Block { statements, has_result } => {
                let (statements, has_result) = (statements.clone(), *has_result);
                self.evaluate_block(node, &statements, has_result)
            }
            NodeKind::Return { value, .. } => {
                let value = *value;
                let result = match value {
                    Some(value) => self.evaluate(value)?,
                    None => self.values.none(),
                };
                Err(EvalInterrupt::Return(result))
            }
            NodeKind::If { .. } => self.evaluate_if(node),
            NodeKind::Switch { .. } => self.evaluate_switch(node),
            NodeKind::For { body, .. } => {
                let body = *body;
                // A static for unrolls: replay the body once per recorded
                // iteration world.
                let Some(NodeData::For { static_ids, .. }) = self.get_data(node) else {
                    return Err(self.eval_failure(node, "for"));
                };
                let static_ids = static_ids.clone();
                if static_ids.is_empty() {
                    return Err(self.eval_failure(node, "runtime for"));
                }
                let saved = self.static_id;
                for static_id in static_ids {
                    self.static_id = static_id;
                    let result = self.evaluate(body);
                    self.static_id = saved;
                    result?;
                }
                Ok(self.values.none())
            }
            NodeKind::Call { function, .. } => {
                let function = *function;
                self.evaluate_call(node, function)
            }
            NodeKind::Internal { .. } => self.evaluate_internal(node),
            NodeKind::Run { .. } => {
                let Some(NodeData::Run { value }) = self.get_data(node) else {
                    return Err(self.eval_failure(node, "run"));
                };
                Ok(*value)
            }
            NodeKind::Range { start, end } => {
                let (start, end) = (*start, *end);
                let start = self.evaluate(start)?;
                let end = match end {
                    Some(end) => Some(self.evaluate(end)?),
                    None => None,
                };
                Ok(self.values.alloc(ValueData::Range { start, end }))
            }
            NodeKind::Reference { value } => {
                let value = *value;
                let value = self.evaluate(value)?;
                Ok(self.values.alloc(ValueData::Pointer(Some(value))))
            }
            NodeKind::Dereference { value, .. } => {
                let value = *value;
                let value = self.evaluate(value)?;
                match self.values.get(value) {
                    ValueData::Pointer(Some(inner)) => Ok(*inner),
                    _ => Err(self.eval_failure(node, "dereference")),
                }
            }
            NodeKind::Deoptional { value, .. } => {
                let value = *value;
                let value = self.evaluate(value)?;
                match self.values.get(value) {
                    ValueData::Optional {
                        present: true,
                        value: Some(inner),
                    } => Ok(*inner),
                    ValueData::Optional { .. } => Err(EvalInterrupt::Error(self.error(
                        node,
                        ErrorKind::ControlFlow,
                        "Unwrapped an absent optional at compile time".to_owned(),
                    ))),
                    _ => Err(self.eval_failure(node, "deoptional")),
                }
            }
            NodeKind::Is { value, .. } => {
                let value = *value;
                let Some(NodeData::Is { tag, .. }) = self.get_data(node) else {
                    return Err(self.eval_failure(node, "is"));
                };
                let tag = *tag;
                let union_value = self.evaluate(value)?;
                let ValueData::TaggedUnion { tag: actual, payload } = self.values.get(union_value) else {
                    return Err(self.eval_failure(node, "is"));
                };
                let (actual, payload) = (*actual, *payload);
                let present = self.values.equal(actual, tag);
                Ok(self.values.alloc(ValueData::Optional {
                    present,
                    value: present.then_some(payload),
                }))
            }
            NodeKind::Slice { parent, start, end } => {
                let (parent, start, end) = (*parent, *start, *end);
                self.evaluate_slice(node, parent, start, end)
            }
            NodeKind::Cast { value, .. } => {
                let value = *value;
                let inner = self.evaluate(value)?;
                let Some(NodeData::Cast { to, .. }) = self.get_data(node) else {
                    return Err(self.eval_failure(node, "cast"));
                };
                let to = *to;
                match (self.values.get(inner), self.values.get(to)) {
                    (ValueData::Integer(integer), ValueData::ByteType) => {
                        let byte = u8::try_from(*integer & 0xff).unwrap_or(0);
                        Ok(self.values.byte(byte))
                    }
                    _ => Ok(inner),
                }
            }
            NodeKind::Define { .. } | NodeKind::Defer { .. } => Ok(self.values.none()),
            NodeKind::Variable { is_static, .. } => {
                if *is_static {
                    // The slot was filled during elaboration.
                    Ok(self.values.none())
                } else {
                    Err(self.eval_failure(node, "runtime variable"))
                }
            }
            NodeKind::Global { .. } => Err(self.eval_failure(node, "global")),
            NodeKind::While { .. } => Err(self.eval_failure(node, "while")),
            NodeKind::Break { .. } => Err(self.eval_failure(node, "break")),
            NodeKind::Catch { .. } => Err(self.eval_failure(node, "catch")),
            NodeKind::CallMethod { .. } => Err(self.eval_failure(node, "method call")),
        }
    }

    fn evaluate_string(&mut self, node: NodeId) -> EvalResult<ValueId> {
        let Some(NodeData::String { ty, bytes }) = self.get_data(node) else {
            return Err(self.eval_failure(node, "string"));
        };
        let (ty, bytes) = (*ty, bytes.clone());
        // A pointer-typed string evaluates to a pointer at a byte array;
        // otherwise it is an array view of bytes.
        if let ValueData::PointerType { .. } = self.values.get(ty) {
            let items = bytes.iter().map(|&byte| self.values.byte(byte)).collect();
            let array = self.values.alloc(ValueData::Array(items));
            Ok(self.values.alloc(ValueData::Pointer(Some(array))))
        } else {
            Ok(self.values.bytes_view(&bytes))
        }
    }

    fn evaluate_identifier(&mut self, node: NodeId, assign_value: Option<NodeId>) -> EvalResult<ValueId> {
        let Some(NodeData::Identifier { kind, .. }) = self.get_data(node) else {
            return Err(self.eval_failure(node, "identifier"));
        };
        let kind = *kind;
        match kind {
            IdentifierKind::Value(value) => Ok(value),
            IdentifierKind::Argument(index) => {
                let Some(frame) = self.frames.last() else {
                    return Err(self.eval_failure(node, "argument reference"));
                };
                frame
                    .arguments
                    .get(index)
                    .copied()
                    .ok_or_else(|| self.eval_failure(node, "argument reference"))
            }
            IdentifierKind::StaticVariable(declaration) => {
                if let Some(assign_value) = assign_value {
                    let value = self.evaluate(assign_value)?;
                    self.store_static_variable(declaration, value);
                    return Ok(self.values.none());
                }
                self.load_static_variable(declaration)
                    .ok_or_else(|| self.eval_failure(node, "static variable"))
            }
            IdentifierKind::Discard => {
                if let Some(assign_value) = assign_value {
                    self.evaluate(assign_value)?;
                }
                Ok(self.values.none())
            }
            IdentifierKind::Variable(_) | IdentifierKind::Binding { .. } => {
                Err(self.eval_failure(node, "runtime variable"))
            }
        }
    }

    /// Stores into the slot of the world the declaration was elaborated in,
    /// so mutation inside an unrolled iteration updates the outer slot.
    pub(crate) fn store_static_variable(&mut self, declaration: NodeId, value: ValueId) {
        let key = if self.static_variable_values.contains_key(&(self.static_id, declaration)) {
            (self.static_id, declaration)
        } else if self.static_variable_values.contains_key(&(0, declaration)) {
            (0, declaration)
        } else {
            (self.static_id, declaration)
        };
        self.static_variable_values.insert(key, value);
    }

    pub(crate) fn load_static_variable(&self, declaration: NodeId) -> Option<ValueId> {
        self.static_variable_values
            .get(&(self.static_id, declaration))
            .or_else(|| self.static_variable_values.get(&(0, declaration)))
            .copied()
    }

    fn evaluate_function(
        &mut self,
        node: NodeId,
        function_type: NodeId,
        body: Option<NodeId>,
        extern_name: Option<crate::intern::NameId>,
    ) -> EvalResult<ValueId> {
        let Some(NodeData::FunctionType { value, .. }) = self.get_data(function_type) else {
            return Err(self.eval_failure(node, "function"));
        };
        let ty = *value;
        if let ValueData::FunctionType { incomplete: true, .. } = self.values.get(ty) {
            // Incomplete functions capture their scopes; instantiation
            // replays them.
            return Ok(self.values.alloc(ValueData::FunctionStub {
                node,
                scopes: self.scopes.clone(),
            }));
        }
        let compile_only = match self.get_data(node) {
            Some(NodeData::Function { compile_only, .. }) => *compile_only,
            _ => false,
        };
        Ok(self.values.alloc(ValueData::Function {
            ty,
            body,
            static_id: self.static_id,
            node,
            extern_name,
            compile_only,
        }))
    }

    /// Struct type values are created and filled during elaboration; here the
    /// pre-built value is simply returned.
    fn evaluate_struct_type(&mut self, node: NodeId) -> EvalResult<ValueId> {
        match self.get_data(node) {
            Some(NodeData::StructTypeValue { value }) => Ok(*value),
            _ => Err(self.eval_failure(node, "struct type")),
        }
    }

    fn evaluate_structure(&mut self, node: NodeId) -> EvalResult<ValueId> {
        let Some(NodeData::Structure { ty }) = self.get_data(node) else {
            return Err(self.eval_failure(node, "structure literal"));
        };
        let ty = *ty;
        let NodeKind::Structure { values: entries, .. } = &self.node(node).kind else {
            return Err(self.eval_failure(node, "structure literal"));
        };
        let entries = entries.clone();
        let mut evaluated = Vec::with_capacity(entries.len());
        for entry in &entries {
            evaluated.push(self.evaluate(entry.value)?);
        }
        match self.values.get(ty).clone() {
            ValueData::ArrayType { .. } => Ok(self.values.alloc(ValueData::Array(evaluated))),
            ValueData::ArrayViewType { .. } => Ok(self.values.alloc(ValueData::ArrayView(evaluated))),
            ValueData::TaggedUnionType { items, .. } => {
                let Some(name) = entries.first().and_then(|entry| entry.name) else {
                    return Err(self.eval_failure(node, "tagged union literal"));
                };
                let Some(index) = items.iter().position(|(item, _)| *item == name) else {
                    return Err(self.eval_failure(node, "tagged union literal"));
                };
                let tag = self.values.enum_value(index);
                let payload = evaluated[0];
                Ok(self.values.alloc(ValueData::TaggedUnion { tag, payload }))
            }
            ValueData::UnionType { .. } => Ok(self.values.alloc(ValueData::Union(evaluated[0]))),
            _ => Ok(self.values.alloc(ValueData::Struct(evaluated))),
        }
    }

    fn evaluate_structure_access(
        &mut self,
        node: NodeId,
        parent: NodeId,
        _name: crate::intern::NameId,
    ) -> EvalResult<ValueId> {
        let Some(NodeData::StructureAccess { index, .. }) = self.get_data(node) else {
            return Err(self.eval_failure(node, "structure access"));
        };
        let index = *index;
        let parent_value = self.evaluate(parent)?;
        match self.values.get(parent_value) {
            ValueData::Struct(members) => members
                .get(index)
                .copied()
                .ok_or_else(|| self.eval_failure(node, "structure access")),
            ValueData::Union(value) => Ok(*value),
            ValueData::ArrayView(items) => {
                // Only `len` of a view is compile-time meaningful.
                let length = i64::try_from(items.len()).unwrap_or(i64::MAX);
                Ok(self.values.integer(length))
            }
            _ => Err(self.eval_failure(node, "structure access")),
        }
    }

    fn evaluate_array_access(&mut self, node: NodeId, parent: NodeId, index: NodeId) -> EvalResult<ValueId> {
        if let Some(NodeData::ArrayAccess { overload: Some(_), .. }) = self.get_data(node) {
            return Err(self.eval_failure(node, "overloaded array access"));
        }
        let parent_value = self.evaluate(parent)?;
        let index_value = self.evaluate(index)?;
        let ValueData::Integer(offset) = self.values.get(index_value) else {
            return Err(self.eval_failure(node, "array access"));
        };
        let offset = usize::try_from(*offset).map_err(|_| self.eval_failure(node, "array access"))?;
        let items = match self.values.get(parent_value) {
            ValueData::Array(items) | ValueData::ArrayView(items) => items,
            ValueData::Pointer(Some(inner)) => match self.values.get(*inner) {
                ValueData::Array(items) | ValueData::ArrayView(items) => items,
                _ => return Err(self.eval_failure(node, "array access")),
            },
            _ => return Err(self.eval_failure(node, "array access")),
        };
        items
            .get(offset)
            .copied()
            .ok_or_else(|| self.eval_failure(node, "array access"))
    }

    fn evaluate_binary_op(
        &mut self,
        node: NodeId,
        left: NodeId,
        right: NodeId,
        op: crate::ast::BinaryOp,
    ) -> EvalResult<ValueId> {
        use crate::ast::BinaryOp as Op;
        let left_value = self.evaluate(left)?;
        let right_value = self.evaluate(right)?;
        match op {
            Op::Equals => {
                let equal = self.values.equal(left_value, right_value);
                Ok(self.values.boolean(equal))
            }
            Op::NotEquals => {
                let equal = self.values.equal(left_value, right_value);
                Ok(self.values.boolean(!equal))
            }
            Op::And | Op::Or => {
                let (ValueData::Boolean(a), ValueData::Boolean(b)) =
                    (self.values.get(left_value), self.values.get(right_value))
                else {
                    return Err(self.eval_failure(node, "logical operator"));
                };
                let result = if op == Op::And { *a && *b } else { *a || *b };
                Ok(self.values.boolean(result))
            }
            _ => match (self.values.get(left_value), self.values.get(right_value)) {
                (ValueData::Integer(a), ValueData::Integer(b)) => {
                    let (a, b) = (*a, *b);
                    Ok(match op {
                        Op::Less => self.values.boolean(a < b),
                        Op::LessEquals => self.values.boolean(a <= b),
                        Op::Greater => self.values.boolean(a > b),
                        Op::GreaterEquals => self.values.boolean(a >= b),
                        Op::Add => self.values.integer(a.wrapping_add(b)),
                        Op::Subtract => self.values.integer(a.wrapping_sub(b)),
                        Op::Multiply => self.values.integer(a.wrapping_mul(b)),
                        Op::Divide => {
                            if b == 0 {
                                return Err(EvalInterrupt::Error(self.error(
                                    node,
                                    ErrorKind::ControlFlow,
                                    "Division by zero at compile time".to_owned(),
                                )));
                            }
                            self.values.integer(a.wrapping_div(b))
                        }
                        Op::Modulus => {
                            if b == 0 {
                                return Err(EvalInterrupt::Error(self.error(
                                    node,
                                    ErrorKind::ControlFlow,
                                    "Division by zero at compile time".to_owned(),
                                )));
                            }
                            self.values.integer(a.wrapping_rem(b))
                        }
                        Op::Equals | Op::NotEquals | Op::And | Op::Or => unreachable!("handled above"),
                    })
                }
                (ValueData::Float(a), ValueData::Float(b)) => {
                    let (a, b) = (*a, *b);
                    Ok(match op {
                        Op::Less => self.values.boolean(a < b),
                        Op::LessEquals => self.values.boolean(a <= b),
                        Op::Greater => self.values.boolean(a > b),
                        Op::GreaterEquals => self.values.boolean(a >= b),
                        Op::Add => self.values.alloc(ValueData::Float(a + b)),
                        Op::Subtract => self.values.alloc(ValueData::Float(a - b)),
                        Op::Multiply => self.values.alloc(ValueData::Float(a * b)),
                        Op::Divide => self.values.alloc(ValueData::Float(a / b)),
                        _ => return Err(self.eval_failure(node, "float operator")),
                    })
                }
                (ValueData::Byte(a), ValueData::Byte(b)) => {
                    let (a, b) = (*a, *b);
                    Ok(match op {
                        Op::Less => self.values.boolean(a < b),
                        Op::LessEquals => self.values.boolean(a <= b),
                        Op::Greater => self.values.boolean(a > b),
                        Op::GreaterEquals => self.values.boolean(a >= b),
                        _ => return Err(self.eval_failure(node, "byte operator")),
                    })
                }
                _ => Err(self.eval_failure(node, "binary operator")),
            },
        }
    }

    fn evaluate_block(&mut self, _node: NodeId, statements: &[NodeId], has_result: bool) -> EvalResult<ValueId> {
        let mut result = self.values.none();
        for (index, &statement) in statements.iter().enumerate() {
            let value = self.evaluate(statement)?;
            if has_result && index == statements.len() - 1 {
                result = value;
            }
        }
        Ok(result)
    }

    fn truthy(&self, node: NodeId, value: ValueId) -> EvalResult<bool> {
        match self.values.get(value) {
            ValueData::Boolean(value) => Ok(*value),
            ValueData::Optional { present, .. } => Ok(*present),
            _ => Err(self.eval_failure(node, "condition")),
        }
    }

    fn evaluate_if(&mut self, node: NodeId) -> EvalResult<ValueId> {
        let NodeKind::If {
            condition,
            then_body,
            else_body,
            ..
        } = self.node(node).kind
        else {
            return Err(self.eval_failure(node, "if"));
        };
        // A static if already selected its branch during elaboration.
        if let Some(NodeData::If {
            static_condition: Some(taken),
            ..
        }) = self.get_data(node)
        {
            return if *taken {
                self.evaluate(then_body)
            } else {
                match else_body {
                    Some(else_body) => self.evaluate(else_body),
                    None => Ok(self.values.none()),
                }
            };
        }
        let condition_value = self.evaluate(condition)?;
        if self.truthy(node, condition_value)? {
            self.evaluate(then_body)
        } else {
            match else_body {
                Some(else_body) => self.evaluate(else_body),
                None => Ok(self.values.none()),
            }
        }
    }

    fn evaluate_switch(&mut self, node: NodeId) -> EvalResult<ValueId> {
        let NodeKind::Switch { condition, ref cases, .. } = self.node(node).kind else {
            return Err(self.eval_failure(node, "switch"));
        };
        let cases = cases.clone();
        if let Some(NodeData::Switch {
            static_case: Some(index), ..
        }) = self.get_data(node)
        {
            let index = *index;
            return self.evaluate(cases[index].body);
        }
        let condition_value = self.evaluate(condition)?;
        let tag = match self.values.get(condition_value) {
            ValueData::TaggedUnion { tag, .. } => *tag,
            _ => condition_value,
        };
        let mut default = None;
        for case in &cases {
            match case.value {
                Some(value) => {
                    let case_value = self.evaluate(value)?;
                    if self.values.equal(case_value, tag) {
                        return self.evaluate(case.body);
                    }
                }
                None => default = Some(case.body),
            }
        }
        match default {
            Some(body) => self.evaluate(body),
            None => Ok(self.values.none()),
        }
    }

    fn evaluate_call(&mut self, node: NodeId, function: NodeId) -> EvalResult<ValueId> {
        let NodeKind::Call { ref arguments, .. } = self.node(node).kind else {
            return Err(self.eval_failure(node, "call"));
        };
        let arguments = arguments.clone();
        // An applied generic define evaluates to its memoized instance.
        if let Some(NodeData::TemplateApply { value, .. }) = self.get_data(node) {
            return Ok(*value);
        }
        // Prefer the monomorphized function recorded during elaboration.
        let (function_value, function_type) = match self.get_data(node) {
            Some(NodeData::Call {
                function_value: Some(value),
                function_type,
            }) => (*value, *function_type),
            Some(NodeData::Call { function_type, .. }) => {
                let ty = *function_type;
                (self.evaluate(function)?, ty)
            }
            _ => return Err(self.eval_failure(node, "call")),
        };
        let ValueData::Function { body, .. } = self.values.get(function_value) else {
            return Err(self.eval_failure(node, "call target"));
        };
        let Some(body) = *body else {
            return Err(self.eval_failure(node, "extern function call"));
        };
        let ValueData::FunctionType { parameters, .. } = self.values.get(function_type).clone() else {
            return Err(self.eval_failure(node, "call"));
        };
        let inferred_count = parameters.iter().filter(|parameter| parameter.inferred).count();

        // Only runtime (non-static) arguments occupy frame slots.
        let mut frame_arguments = Vec::new();
        for (position, &argument) in arguments.iter().enumerate() {
            let declared = parameters.get(position + inferred_count);
            if declared.is_some_and(|parameter| parameter.is_static) {
                continue;
            }
            frame_arguments.push(self.evaluate(argument)?);
        }

        // The callee may live in another instantiation world.
        let callee_static_id = match self.values.get(function_value) {
            ValueData::Function { static_id, .. } => *static_id,
            _ => self.static_id,
        };
        let saved_static_id = self.static_id;
        self.static_id = callee_static_id;
        self.frames.push(Frame {
            arguments: frame_arguments,
        });
        let outcome = self.evaluate(body);
        self.frames.pop();
        self.static_id = saved_static_id;
        match outcome {
            Ok(value) => Ok(value),
            Err(EvalInterrupt::Return(value)) => Ok(value),
            Err(error) => Err(error),
        }
    }

    fn evaluate_internal(&mut self, node: NodeId) -> EvalResult<ValueId> {
        let NodeKind::Internal { kind, ref inputs } = self.node(node).kind else {
            return Err(self.eval_failure(node, "intrinsic"));
        };
        let inputs = inputs.clone();
        match kind {
            crate::ast::InternalKind::Print => {
                for &input in &inputs {
                    let value = self.evaluate(input)?;
                    let rendered = self.values.format_value(&self.nodes, &self.interns, value);
                    self.print.write(rendered.into());
                }
                self.print.push('\n');
                Ok(self.values.none())
            }
            crate::ast::InternalKind::Embed => {
                let Some(NodeData::Internal { embed: Some(inner), .. }) = self.get_data(node) else {
                    return Err(self.eval_failure(node, "embed"));
                };
                let inner = *inner;
                self.evaluate(inner)
            }
            _ => match self.get_data(node) {
                Some(NodeData::Internal { value: Some(value), .. }) => Ok(*value),
                _ => Err(self.eval_failure(node, "intrinsic")),
            },
        }
    }

    fn evaluate_slice(
        &mut self,
        node: NodeId,
        parent: NodeId,
        start: NodeId,
        end: Option<NodeId>,
    ) -> EvalResult<ValueId> {
        let parent_value = self.evaluate(parent)?;
        let start_value = self.evaluate(start)?;
        let ValueData::Integer(start_index) = self.values.get(start_value) else {
            return Err(self.eval_failure(node, "slice"));
        };
        let start_index = usize::try_from(*start_index).map_err(|_| self.eval_failure(node, "slice"))?;
        let items = match self.values.get(parent_value) {
            ValueData::Array(items) | ValueData::ArrayView(items) => items.clone(),
            ValueData::Pointer(Some(inner)) => match self.values.get(*inner) {
                ValueData::Array(items) => items.clone(),
                _ => return Err(self.eval_failure(node, "slice")),
            },
            _ => return Err(self.eval_failure(node, "slice")),
        };
        let end_index = match end {
            Some(end) => {
                let end_value = self.evaluate(end)?;
                let ValueData::Integer(end_index) = self.values.get(end_value) else {
                    return Err(self.eval_failure(node, "slice"));
                };
                usize::try_from(*end_index).map_err(|_| self.eval_failure(node, "slice"))?
            }
            None => items.len(),
        };
        if start_index > end_index || end_index > items.len() {
            return Err(EvalInterrupt::Error(self.error(
                node,
                ErrorKind::ControlFlow,
                "Slice bounds out of range at compile time".to_owned(),
            )));
        }
        Ok(self.values.alloc(ValueData::ArrayView(items[start_index..end_index].to_vec())))
    }
}
