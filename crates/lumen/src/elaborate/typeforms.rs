//! Type-declaration nodes: struct types, array types, and function types.

use crate::{
    ast::{NodeId, NodeKind},
    context::{Context, TemporaryContext},
    data::NodeData,
    error::CompileResult,
    scope::Scope,
    value::{ParamValue, ValueData},
};

impl Context<'_> {
    pub(crate) fn elaborate_array_type(&mut self, node: NodeId, inner: NodeId, size: Option<NodeId>) -> CompileResult<()> {
        self.elaborate(inner)?;
        if let Some(size) = size {
            self.elaborate(size)?;
        }
        let ty = self.values.type_type();
        self.set_type(node, ty);
        Ok(())
    }

    pub(crate) fn elaborate_array_view_type(&mut self, node: NodeId, inner: NodeId) -> CompileResult<()> {
        self.elaborate(inner)?;
        let ty = self.values.type_type();
        self.set_type(node, ty);
        Ok(())
    }

    /// Pre-creates the struct type value with an empty member list, then
    /// elaborates member types and overload functions in a scope whose
    /// `current_type` is that value, so `@self` resolves to the type being
    /// defined. The member list is filled before the overload functions
    /// elaborate, letting their bodies access members of the receiver.
    pub(crate) fn elaborate_struct_type(&mut self, node: NodeId) -> CompileResult<()> {
        let NodeKind::StructType { members, operators } = &self.node(node).kind else {
            unreachable!("elaborate_struct_type on a non-struct");
        };
        let member_types: Vec<_> = members.iter().map(|member| member.ty).collect();
        let operators: Vec<_> = operators
            .iter()
            .map(|operator| (operator.name, operator.function))
            .collect();

        let value = self.values.alloc(ValueData::StructType {
            members: Vec::new(),
            node: Some(node),
            arguments: Vec::new(),
            operators: Vec::new(),
        });
        self.set_data(node, NodeData::StructTypeValue { value });

        let mut scope = Scope::for_node(node);
        scope.current_type = Some(value);
        self.push_scope(scope);
        let result = (|| {
            let mut filled_members = Vec::with_capacity(member_types.len());
            for member in member_types {
                self.elaborate(member)?;
                filled_members.push(self.evaluate_for_elaboration(member)?);
            }
            if let ValueData::StructType { members, .. } = self.values.get_mut(value) {
                *members = filled_members;
            }
            let mut filled_operators = Vec::with_capacity(operators.len());
            for (name, function) in operators {
                self.elaborate(function)?;
                filled_operators.push((name, self.evaluate_for_elaboration(function)?));
            }
            if let ValueData::StructType { operators, .. } = self.values.get_mut(value) {
                *operators = filled_operators;
            }
            Ok(())
        })();
        self.pop_scope();
        result?;

        let ty = self.values.type_type();
        self.set_type(node, ty);
        Ok(())
    }

    pub(crate) fn elaborate_function(&mut self, node: NodeId, given_static_arguments: bool) -> CompileResult<()> {
        let NodeKind::Function { function_type, body, .. } = self.node(node).kind else {
            unreachable!("elaborate_function on a non-function");
        };

        let compile_only_parent = self.compile_only;
        let returned_parent = self.returned;
        self.compile_only = false;
        self.returned = false;

        let result = self.elaborate_function_inner(node, function_type, body, given_static_arguments);

        let compile_only = self.compile_only;
        let returned = self.returned;
        self.compile_only = compile_only_parent;
        self.returned = returned_parent;
        result?;

        self.set_data(node, NodeData::Function { compile_only, returned });
        Ok(())
    }

    fn elaborate_function_inner(
        &mut self,
        node: NodeId,
        function_type: NodeId,
        body: Option<NodeId>,
        given_static_arguments: bool,
    ) -> CompileResult<()> {
        let has_static = self.elaborate_function_type(function_type, given_static_arguments)?;

        let Some(NodeData::FunctionType { value, .. }) = self.get_data(function_type) else {
            unreachable!("function type without elaborated data");
        };
        let function_type_value = *value;
        self.set_type(node, function_type_value);

        // A function with static parameters is never body-elaborated in the
        // template world; only instantiations are.
        if has_static && !given_static_arguments {
            return Ok(());
        }

        let Some(body) = body else {
            return Ok(());
        };

        let return_type = match self.values.get(function_type_value) {
            ValueData::FunctionType { return_type, .. } => *return_type,
            _ => None,
        };

        let mut scope = Scope::for_node(node);
        scope.function_type = Some(function_type_value);
        self.push_scope(scope);
        let result = self.elaborate_with(TemporaryContext::wanting(return_type), body);
        self.pop_scope();
        result?;

        if let Some(return_type) = return_type {
            if !self.returned {
                let body_type = self.get_type(body);
                let ok = body_type.is_some_and(|body_type| self.values.assignable(return_type, body_type));
                if !ok {
                    return Err(self.expected_type_error(node, Some(return_type), body_type));
                }
            }
        }
        Ok(())
    }

    /// Elaborates a function-type node. Returns whether the declaration has
    /// static parameters; in that case (and absent instantiation arguments)
    /// only an incomplete type value is produced.
    pub(crate) fn elaborate_function_type(&mut self, node: NodeId, given_static_arguments: bool) -> CompileResult<bool> {
        let NodeKind::FunctionType {
            parameters,
            return_type,
            variadic,
        } = &self.node(node).kind
        else {
            unreachable!("elaborate_function_type on a non-function-type");
        };
        let parameters = parameters.clone();
        let (return_type, variadic) = (*return_type, *variadic);

        let has_static = parameters.iter().any(|parameter| parameter.is_static);
        // The template entry owns the monomorphization memo; never rebuild it.
        if !given_static_arguments && matches!(self.get_data(node), Some(NodeData::FunctionType { .. })) {
            return Ok(has_static);
        }
        if has_static && !given_static_arguments {
            let placeholders = parameters
                .iter()
                .map(|parameter| ParamValue {
                    name: parameter.name,
                    ty: None,
                    is_static: parameter.is_static,
                    inferred: parameter.inferred,
                })
                .collect();
            let value = self.values.alloc(ValueData::FunctionType {
                parameters: placeholders,
                return_type: None,
                variadic,
                incomplete: true,
                node: Some(node),
            });
            self.set_data(
                node,
                NodeData::FunctionType {
                    value,
                    variations: Vec::new(),
                },
            );
            return Ok(true);
        }

        let mut parameter_values = Vec::with_capacity(parameters.len());
        for parameter in &parameters {
            // Inferred parameters already live in the scope as static
            // bindings during instantiation; their declared type expressions
            // only drive pattern matching.
            let ty = match parameter.ty {
                Some(ty) if !parameter.inferred => {
                    self.elaborate(ty)?;
                    Some(self.evaluate_for_elaboration(ty)?)
                }
                _ => None,
            };
            parameter_values.push(ParamValue {
                name: parameter.name,
                ty,
                is_static: parameter.is_static,
                inferred: parameter.inferred,
            });
        }

        let return_type_value = match return_type {
            Some(return_type) => {
                self.elaborate(return_type)?;
                Some(self.evaluate_for_elaboration(return_type)?)
            }
            None => None,
        };

        let value = self.values.alloc(ValueData::FunctionType {
            parameters: parameter_values,
            return_type: return_type_value,
            variadic,
            incomplete: false,
            node: Some(node),
        });
        self.set_data(
            node,
            NodeData::FunctionType {
                value,
                variations: Vec::new(),
            },
        );
        let ty = self.values.type_type();
        self.set_type(node, ty);
        Ok(has_static)
    }
}
