//! Identifier resolution and `def` elaboration.

use crate::{
    ast::{NodeId, NodeKind},
    context::{Context, TemporaryContext},
    data::{IdentifierKind, NodeData},
    error::{CompileResult, ErrorKind},
    intern::{NameId, UNDERSCORE},
    scope::Scope,
    value::{ValueData, ValueId},
};

/// Outcome of walking the scope stack for a name.
enum Lookup {
    Fail,
    /// A `define` statement, with the scope chain to elaborate it under.
    Define { node: NodeId, scopes: Vec<Scope> },
    Variable { node: NodeId, ty: ValueId },
    Binding { node: NodeId, index: usize, ty: ValueId },
    Argument { index: usize, ty: ValueId },
    StaticBinding { value: ValueId, ty: ValueId },
    StaticVariable { node: NodeId, ty: ValueId },
}

impl Context<'_> {
    /// Finds a `define` statement by name among a block's statements.
    pub(crate) fn find_define(&self, block: NodeId, name: NameId) -> Option<NodeId> {
        let NodeKind::Block { statements, .. } = &self.node(block).kind else {
            return None;
        };
        statements.iter().copied().find(|&statement| {
            matches!(
                self.node(statement).kind,
                NodeKind::Define { name: define_name, .. } if define_name == name
            )
        })
    }

    /// The declared type recorded for a variable or global declaration node.
    fn declaration_type(&self, declaration: NodeId) -> Option<ValueId> {
        match self.get_data(declaration) {
            Some(NodeData::Variable { ty } | NodeData::Global { ty }) => Some(*ty),
            _ => None,
        }
    }

    /// Walks the scope stack top-down: local variable, binding, enclosing
    /// function parameter, static binding, static variable, block define,
    /// stopping at the first hit. The internal prelude's defines come last.
    fn lookup(&self, name: NameId) -> Lookup {
        let mut found_function = false;
        for (depth, scope) in self.scopes.iter().enumerate().rev() {
            if let Some(&declaration) = scope.variables.get(&name) {
                if let Some(ty) = self.declaration_type(declaration) {
                    return Lookup::Variable { node: declaration, ty };
                }
            }
            if let Some(binding) = scope.bindings.get(&name) {
                if let Some(owner) = scope.node {
                    return Lookup::Binding {
                        node: owner,
                        index: binding.index,
                        ty: binding.ty,
                    };
                }
            }
            if !found_function {
                if let Some(hit) = self.lookup_argument(scope, name) {
                    return hit;
                }
                if scope
                    .node
                    .is_some_and(|owner| matches!(self.node(owner).kind, NodeKind::Function { .. }))
                {
                    found_function = true;
                }
            }
            if let Some(typed) = scope.static_bindings.get(&name) {
                return Lookup::StaticBinding {
                    value: typed.value,
                    ty: typed.ty,
                };
            }
            if let Some(&declaration) = scope.static_variables.get(&name) {
                if let Some(ty) = self.declaration_type(declaration) {
                    return Lookup::StaticVariable { node: declaration, ty };
                }
            }
            if let Some(owner) = scope.node {
                if matches!(self.node(owner).kind, NodeKind::Block { .. }) {
                    if let Some(define) = self.find_define(owner, name) {
                        return Lookup::Define {
                            node: define,
                            scopes: self.scopes[..=depth].to_vec(),
                        };
                    }
                }
            }
        }
        // The internal prelude's top-level defines resolve last.
        if let Some(internal_root) = self.internal_root {
            if let NodeKind::Module { body } = self.node(internal_root).kind {
                if let Some(define) = self.find_define(body, name) {
                    return Lookup::Define {
                        node: define,
                        scopes: vec![Scope::for_node(body)],
                    };
                }
            }
        }
        Lookup::Fail
    }

    /// Matches `name` against the nearest enclosing function's non-static
    /// parameters; the argument index counts only non-static, non-inferred
    /// positions.
    fn lookup_argument(&self, scope: &Scope, name: NameId) -> Option<Lookup> {
        let owner = scope.node?;
        let NodeKind::Function { function_type, .. } = self.node(owner).kind else {
            return None;
        };
        let NodeKind::FunctionType { parameters, .. } = &self.node(function_type).kind else {
            return None;
        };
        let function_type_value = scope.function_type?;
        let ValueData::FunctionType {
            parameters: parameter_values,
            ..
        } = self.values.get(function_type_value)
        else {
            return None;
        };
        let mut runtime_index = 0;
        for (position, parameter) in parameters.iter().enumerate() {
            if parameter.is_static {
                continue;
            }
            if parameter.name == name {
                let ty = parameter_values.get(position).and_then(|parameter| parameter.ty)?;
                return Some(Lookup::Argument {
                    index: runtime_index,
                    ty,
                });
            }
            runtime_index += 1;
        }
        None
    }

    pub(crate) fn elaborate_identifier(&mut self, node: NodeId) -> CompileResult<()> {
        let NodeKind::Identifier {
            module,
            name,
            assign_value,
        } = self.node(node).kind
        else {
            unreachable!("elaborate_identifier on a non-identifier");
        };
        let want_pointer = self.temporary.want_pointer;

        let mut kind = None;
        let mut value = None;
        let mut ty = None;
        let mut define = None;

        if let Some(module_expr) = module {
            // Qualified access: elaborate the module expression and search
            // its body's defines under the module's captured scopes.
            self.elaborate(module_expr)?;
            let module_value = self.evaluate_for_elaboration(module_expr)?;
            let ValueData::Module { body, scopes } = self.values.get(module_value) else {
                let given = self.get_type(module_expr);
                return Err(self.expected_type_error(node, Some(self.values.module_type()), given));
            };
            let (body, scopes) = (*body, scopes.clone());
            if let Some(found) = self.find_define(body, name) {
                define = Some((found, scopes));
            }
        } else {
            // When an enum type is wanted, an identifier naming one of its
            // items resolves as an enum value without a name lookup.
            if let Some(wanted) = self.temporary.wanted_type {
                if let ValueData::EnumType { items } = self.values.get(wanted) {
                    if let Some(index) = items.iter().position(|&item| item == name) {
                        value = Some(self.values.enum_value(index));
                        ty = Some(wanted);
                    }
                }
            }
            if ty.is_none() {
                if name == UNDERSCORE {
                    kind = Some(IdentifierKind::Discard);
                    ty = Some(self.values.none());
                    if let Some(assign) = assign_value {
                        self.elaborate(assign)?;
                    }
                } else {
                    match self.lookup(name) {
                        Lookup::Define { node: found, scopes } => define = Some((found, scopes)),
                        Lookup::Variable { node: declaration, ty: base } => {
                            kind = Some(IdentifierKind::Variable(declaration));
                            ty = Some(self.wrap_pointer(base, want_pointer));
                            if let Some(assign) = assign_value {
                                self.elaborate_assign(node, base, assign)?;
                            }
                        }
                        Lookup::Argument { index, ty: base } => {
                            kind = Some(IdentifierKind::Argument(index));
                            ty = Some(self.wrap_pointer(base, want_pointer));
                            if assign_value.is_some() {
                                return Err(self.error(
                                    node,
                                    ErrorKind::ControlFlow,
                                    format!("Cannot assign to argument '{}'", self.interns.get(name)),
                                ));
                            }
                        }
                        Lookup::Binding { node: owner, index, ty: base } => {
                            kind = Some(IdentifierKind::Binding { node: owner, index });
                            ty = Some(self.wrap_pointer(base, want_pointer));
                            if assign_value.is_some() {
                                return Err(self.error(
                                    node,
                                    ErrorKind::ControlFlow,
                                    format!("Cannot assign to binding '{}'", self.interns.get(name)),
                                ));
                            }
                        }
                        Lookup::StaticBinding { value: bound, ty: base } => {
                            value = Some(bound);
                            ty = Some(base);
                        }
                        Lookup::StaticVariable { node: declaration, ty: base } => {
                            kind = Some(IdentifierKind::StaticVariable(declaration));
                            ty = Some(base);
                            if let Some(assign) = assign_value {
                                self.elaborate_assign(node, base, assign)?;
                            }
                        }
                        Lookup::Fail => {}
                    }
                }
            }
        }

        if let Some((define_node, define_scopes)) = define {
            // Defines elaborate in the template world regardless of the
            // ambient instantiation.
            let saved_static_id = self.static_id;
            self.static_id = 0;
            let result = self.elaborate_with_scopes(define_node, Some(define_scopes.clone()));
            self.static_id = saved_static_id;
            result?;
            match self.get_data(define_node) {
                Some(NodeData::Define { value: bound, ty: base }) => {
                    value = Some(*bound);
                    ty = Some(*base);
                }
                Some(NodeData::DefineTemplate { .. }) => {
                    // A generic define: its name denotes the family, applied
                    // with static arguments at a call site.
                    value = Some(self.values.alloc(ValueData::Template {
                        node: define_node,
                        scopes: define_scopes,
                    }));
                    ty = Some(self.values.type_type());
                }
                _ => {}
            }
        }

        let Some(ty) = ty else {
            return Err(self.error(
                node,
                ErrorKind::UnresolvedIdentifier,
                format!("Identifier '{}' not found", self.interns.get(name)),
            ));
        };

        if value.is_some() && assign_value.is_some() {
            return Err(self.error(
                node,
                ErrorKind::ControlFlow,
                format!("Cannot assign to '{}'", self.interns.get(name)),
            ));
        }

        let kind = match value {
            Some(value) => IdentifierKind::Value(value),
            None => kind.unwrap_or(IdentifierKind::Discard),
        };
        self.set_data(
            node,
            NodeData::Identifier {
                kind,
                ty,
                want_pointer,
            },
        );
        if assign_value.is_none() {
            self.set_type(node, ty);
        }
        Ok(())
    }

    fn wrap_pointer(&mut self, ty: ValueId, want_pointer: bool) -> ValueId {
        if want_pointer {
            self.values.pointer_type(ty)
        } else {
            ty
        }
    }

    pub(crate) fn elaborate_define(&mut self, node: NodeId) -> CompileResult<()> {
        if matches!(
            self.get_data(node),
            Some(NodeData::Define { .. } | NodeData::DefineTemplate { .. })
        ) {
            return Ok(());
        }
        let NodeKind::Define {
            ty,
            expression,
            ref generics,
            ..
        } = self.node(node).kind
        else {
            unreachable!("elaborate_define on a non-define");
        };
        if !generics.is_empty() {
            // Template defines elaborate per instantiation; register the
            // (empty) family now.
            self.set_data(node, NodeData::DefineTemplate { instances: Vec::new() });
            return Ok(());
        }

        self.push_scope(Scope::for_node(node));
        let result = self.elaborate_define_body(node, ty, expression);
        self.pop_scope();
        result
    }

    fn elaborate_define_body(&mut self, node: NodeId, ty: Option<NodeId>, expression: NodeId) -> CompileResult<()> {
        let wanted = match ty {
            Some(ty) => {
                self.elaborate(ty)?;
                Some(self.evaluate_for_elaboration(ty)?)
            }
            None => None,
        };
        self.elaborate_with(TemporaryContext::wanting(wanted), expression)?;
        let expression_type = self.require_type(expression)?;
        if let Some(wanted) = wanted {
            if !self.values.assignable(wanted, expression_type) {
                return Err(self.expected_type_error(node, Some(wanted), Some(expression_type)));
            }
        }
        let value = self.evaluate_for_elaboration(expression)?;
        self.set_data(
            node,
            NodeData::Define {
                value,
                ty: expression_type,
            },
        );
        Ok(())
    }
}
