//! The elaborator.
//!
//! One recursive pass that resolves identifiers, synthesizes types,
//! evaluates compile-time constants, instantiates static-parameter functions
//! on demand, and decorates every node with its type and its variant-specific
//! side-data, both keyed by the ambient static id. Elaboration is idempotent
//! within a static id: a node that already has a type there returns
//! immediately. The [`TemporaryContext`] flows down only; it is saved and
//! restored around every recursive call.

mod calls;
mod control;
mod exprs;
mod idents;
mod intrinsics;
mod typeforms;

use crate::{
    ast::{NodeId, NodeKind},
    context::{Context, TemporaryContext},
    error::{CompileResult, ErrorKind},
    scope::Scope,
    value::{ValueData, ValueId},
};

impl Context<'_> {
    /// Elaborates `node` with an empty downward context.
    pub(crate) fn elaborate(&mut self, node: NodeId) -> CompileResult<()> {
        self.elaborate_with(TemporaryContext::default(), node)
    }

    /// Elaborates `node` under the given downward context.
    pub(crate) fn elaborate_with(&mut self, temporary: TemporaryContext, node: NodeId) -> CompileResult<()> {
        if self.get_type(node).is_some() {
            return Ok(());
        }

        let saved = self.temporary;
        self.temporary = temporary;
        let result = self.elaborate_dispatch(node);
        self.temporary = saved;
        result
    }

    fn elaborate_dispatch(&mut self, node: NodeId) -> CompileResult<()> {
        match &self.node(node).kind {
            NodeKind::ArrayAccess { parent, index, assign_value } => {
                let (parent, index, assign_value) = (*parent, *index, *assign_value);
                self.elaborate_array_access(node, parent, index, assign_value)
            }
            NodeKind::ArrayType { inner, size } => {
                let (inner, size) = (*inner, *size);
                self.elaborate_array_type(node, inner, size)
            }
            NodeKind::ArrayViewType { inner } => {
                let inner = *inner;
                self.elaborate_array_view_type(node, inner)
            }
            NodeKind::BinaryOp { left, right, op } => {
                let (left, right, op) = (*left, *right, *op);
                self.elaborate_binary_op(node, left, right, op)
            }
            NodeKind::Block { statements, has_result } => {
                let (statements, has_result) = (statements.clone(), *has_result);
                self.elaborate_block(node, &statements, has_result)
            }
            NodeKind::Boolean { .. } => {
                let ty = self.values.boolean_type();
                self.set_type(node, ty);
                Ok(())
            }
            NodeKind::Break { value } => {
                let value = *value;
                self.elaborate_break(node, value)
            }
            NodeKind::Cast { value, ty } => {
                let (value, ty) = (*value, *ty);
                self.elaborate_cast(node, value, ty)
            }
            NodeKind::Call { function, arguments } => {
                let (function, arguments) = (*function, arguments.clone());
                self.elaborate_call(node, function, &arguments)
            }
            NodeKind::CallMethod {
                receiver,
                method,
                arguments,
            } => {
                let (receiver, method, arguments) = (*receiver, *method, arguments.clone());
                self.elaborate_call_method(node, receiver, method, &arguments)
            }
            NodeKind::Character { text } => {
                let text = *text;
                self.elaborate_character(node, text)
            }
            NodeKind::Catch { value, binding, error } => {
                let (value, binding, error) = (*value, *binding, *error);
                self.elaborate_catch(node, value, binding, error)
            }
            NodeKind::Defer { body } => {
                // Defers are collected and elaborated by their enclosing
                // block; a directly visited one just elaborates its body.
                let body = *body;
                self.elaborate(body)
            }
            NodeKind::Define { .. } => self.elaborate_define(node),
            NodeKind::Deoptional { value, assign_value } => {
                let (value, assign_value) = (*value, *assign_value);
                self.elaborate_deoptional(node, value, assign_value)
            }
            NodeKind::Dereference { value, assign_value } => {
                let (value, assign_value) = (*value, *assign_value);
                self.elaborate_dereference(node, value, assign_value)
            }
            NodeKind::EnumType { .. } => {
                let ty = self.values.type_type();
                self.set_type(node, ty);
                Ok(())
            }
            NodeKind::For {
                items,
                bindings,
                body,
                is_static,
            } => {
                let (items, bindings, body, is_static) = (items.clone(), bindings.clone(), *body, *is_static);
                self.elaborate_for(node, &items, &bindings, body, is_static)
            }
            NodeKind::Function { .. } => self.elaborate_function(node, false),
            NodeKind::FunctionType { .. } => self.elaborate_function_type(node, false).map(|_| ()),
            NodeKind::Identifier { .. } => self.elaborate_identifier(node),
            NodeKind::If { .. } => self.elaborate_if(node),
            NodeKind::Internal { .. } => self.elaborate_internal(node),
            NodeKind::Is { value, check } => {
                let (value, check) = (*value, *check);
                self.elaborate_is(node, value, check)
            }
            NodeKind::Module { body } => {
                let body = *body;
                self.elaborate(body)?;
                let ty = self.values.module_type();
                self.set_type(node, ty);
                Ok(())
            }
            NodeKind::Null => self.elaborate_null(node),
            NodeKind::Number { value } => {
                let value = *value;
                self.elaborate_number(node, value)
            }
            NodeKind::OptionalType { inner } => {
                let inner = *inner;
                self.elaborate(inner)?;
                let ty = self.values.type_type();
                self.set_type(node, ty);
                Ok(())
            }
            NodeKind::PointerType { inner } => {
                let inner = *inner;
                self.elaborate(inner)?;
                let ty = self.values.type_type();
                self.set_type(node, ty);
                Ok(())
            }
            NodeKind::Range { start, end } => {
                let (start, end) = (*start, *end);
                self.elaborate_range(node, start, end)
            }
            NodeKind::Reference { value } => {
                let value = *value;
                self.elaborate_with(TemporaryContext::pointer(), value)?;
                if let Some(ty) = self.get_type(value) {
                    self.set_type(node, ty);
                }
                Ok(())
            }
            NodeKind::ResultType { value, error } => {
                let (value, error) = (*value, *error);
                if let Some(value) = value {
                    self.elaborate(value)?;
                }
                self.elaborate(error)?;
                let ty = self.values.type_type();
                self.set_type(node, ty);
                Ok(())
            }
            NodeKind::Return { value, kind } => {
                let (value, kind) = (*value, *kind);
                self.elaborate_return(node, value, kind)
            }
            NodeKind::Run { value } => {
                let value = *value;
                self.elaborate_run(node, value)
            }
            NodeKind::Slice { parent, start, end } => {
                let (parent, start, end) = (*parent, *start, *end);
                self.elaborate_slice(node, parent, start, end)
            }
            NodeKind::String { text } => {
                let text = *text;
                self.elaborate_string(node, text)
            }
            NodeKind::StructType { .. } => self.elaborate_struct_type(node),
            NodeKind::Structure { ty, values } => {
                let (ty, values) = (*ty, values.clone());
                self.elaborate_structure(node, ty, &values)
            }
            NodeKind::StructureAccess {
                parent,
                name,
                assign_value,
            } => {
                let (parent, name, assign_value) = (*parent, *name, *assign_value);
                self.elaborate_structure_access(node, parent, name, assign_value)
            }
            NodeKind::Switch { .. } => self.elaborate_switch(node),
            NodeKind::TaggedUnionType { members } | NodeKind::UnionType { members } => {
                let members: Vec<_> = members.iter().map(|member| member.ty).collect();
                for member in members {
                    self.elaborate(member)?;
                }
                let ty = self.values.type_type();
                self.set_type(node, ty);
                Ok(())
            }
            NodeKind::Variable { .. } => self.elaborate_variable(node),
            NodeKind::Global { .. } => self.elaborate_global(node),
            NodeKind::While { .. } => self.elaborate_while(node),
        }
    }

    /// Elaborates `node` under a replaced scope chain (used for defines found
    /// in other scopes and for module members), restoring the current chain
    /// afterwards.
    pub(crate) fn elaborate_with_scopes(&mut self, node: NodeId, scopes: Option<Vec<Scope>>) -> CompileResult<()> {
        let saved = scopes.map(|scopes| std::mem::replace(&mut self.scopes, scopes));
        self.push_scope(Scope::for_node(node));
        let result = self.elaborate(node);
        self.pop_scope();
        if let Some(saved) = saved {
            self.scopes = saved;
        }
        result
    }

    /// Elaborates `node` and, when its type is not already a pointer,
    /// re-elaborates it in l-value mode.
    pub(crate) fn enforce_pointer(&mut self, node: NodeId) -> CompileResult<ValueId> {
        self.elaborate(node)?;
        let ty = self.require_type(node)?;
        if matches!(self.values.get(ty), ValueData::PointerType { .. }) {
            return Ok(ty);
        }
        self.reset_node(node);
        self.elaborate_with(TemporaryContext::pointer(), node)?;
        self.require_type(node)
    }

    /// [`Context::enforce_pointer`], applied only when an assignment or the
    /// parent's pointer request needs the address form.
    pub(crate) fn enforce_pointer_sometimes(&mut self, node: NodeId, is_assign: bool) -> CompileResult<ValueId> {
        self.elaborate(node)?;
        let ty = self.require_type(node)?;
        if (is_assign || self.temporary.want_pointer) && !matches!(self.values.get(ty), ValueData::PointerType { .. }) {
            self.reset_node(node);
            self.elaborate_with(TemporaryContext::pointer(), node)?;
            return self.require_type(node);
        }
        Ok(ty)
    }

    /// The elaborated type of `node`, which must have produced one.
    pub(crate) fn require_type(&self, node: NodeId) -> CompileResult<ValueId> {
        self.get_type(node)
            .ok_or_else(|| self.error(node, ErrorKind::TypeMismatch, "Expected value".to_owned()))
    }

    /// Elaborates an attached assignment value against the target's type.
    pub(crate) fn elaborate_assign(&mut self, node: NodeId, target_type: ValueId, assign: NodeId) -> CompileResult<()> {
        self.elaborate_with(TemporaryContext::wanting(Some(target_type)), assign)?;
        let value_type = self.get_type(assign);
        let ok = value_type.is_some_and(|value_type| self.values.assignable(target_type, value_type));
        if !ok {
            return Err(self.expected_type_error(node, Some(target_type), value_type));
        }
        Ok(())
    }

    fn elaborate_block(&mut self, node: NodeId, statements: &[NodeId], has_result: bool) -> CompileResult<()> {
        let mut defers = Vec::new();
        self.push_scope(Scope::for_node(node));
        let result = self.elaborate_block_inner(node, statements, has_result, &mut defers);
        self.pop_scope();
        result?;
        self.set_data(node, crate::data::NodeData::Block { defers });
        Ok(())
    }

    fn elaborate_block_inner(
        &mut self,
        node: NodeId,
        statements: &[NodeId],
        has_result: bool,
        defers: &mut Vec<NodeId>,
    ) -> CompileResult<()> {
        for (index, &statement) in statements.iter().enumerate() {
            if let NodeKind::Defer { body } = self.node(statement).kind {
                defers.push(body);
                continue;
            }
            if has_result && index == statements.len() - 1 {
                let wanted = self.temporary.wanted_type;
                self.elaborate_with(TemporaryContext::wanting(wanted), statement)?;
                if let Some(ty) = self.get_type(statement) {
                    self.set_type(node, ty);
                }
            } else {
                self.elaborate(statement)?;
                // A non-`none` value in statement position must be consumed.
                if let Some(ty) = self.get_type(statement) {
                    if !matches!(self.values.get(ty), ValueData::None) && !self.statement_may_discard(statement) {
                        let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(ty));
                        return Err(self.error(
                            statement,
                            ErrorKind::ControlFlow,
                            format!("Unused value {rendered}"),
                        ));
                    }
                }
            }
        }
        // Deferred statements elaborate after the block's main statements, so
        // they see already-bound names.
        for index in 0..defers.len() {
            let deferred = defers[index];
            self.elaborate(deferred)?;
        }
        Ok(())
    }

    /// Statement forms whose types decorate the node without representing a
    /// produced runtime value.
    fn statement_may_discard(&self, statement: NodeId) -> bool {
        matches!(
            self.node(statement).kind,
            NodeKind::Define { .. }
                | NodeKind::Variable { .. }
                | NodeKind::Global { .. }
                | NodeKind::Function { .. }
                | NodeKind::FunctionType { .. }
                | NodeKind::Module { .. }
                | NodeKind::Internal { .. }
        )
    }
}
