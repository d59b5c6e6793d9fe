//! Call elaboration: argument checking, operator overloads, generic-define
//! application, and monomorphization of static-parameter functions.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    ast::{FunctionParam, NodeId, NodeKind},
    context::{Context, TemporaryContext},
    data::{IdentifierKind, NodeData, Variation},
    error::{CompileResult, ErrorKind},
    intern::NameId,
    scope::{Scope, TypedValue},
    value::{ValueData, ValueId},
};

/// Inferred-name bindings produced by structural pattern matching.
type MatchResult = AHashMap<NameId, TypedValue>;

impl Context<'_> {
    pub(crate) fn elaborate_call(&mut self, node: NodeId, function: NodeId, arguments: &[NodeId]) -> CompileResult<()> {
        self.elaborate(function)?;
        let mut function_type = self.require_type(function)?;

        // The callee may be a compile-time value: a function literal, a
        // stub awaiting static arguments, or a generic define.
        let mut function_value = None;
        if let Some(NodeData::Identifier {
            kind: IdentifierKind::Value(value),
            ..
        }) = self.get_data(function)
        {
            function_value = Some(*value);
        }
        if let Some(value) = function_value {
            if matches!(self.values.get(value), ValueData::Template { .. }) {
                return self.elaborate_template_apply(node, value, arguments);
            }
        }

        self.pre_elaborate_arguments(function_type, arguments)?;
        let resolved = self.elaborate_call_generic(node, function_value, &mut function_type, arguments)?;

        self.set_data(
            node,
            NodeData::Call {
                function_type,
                function_value: resolved,
            },
        );
        if let ValueData::FunctionType {
            return_type: Some(return_type),
            ..
        } = self.values.get(function_type)
        {
            let return_type = *return_type;
            self.set_type(node, return_type);
        }
        Ok(())
    }

    /// Method calls auto-address the receiver and resolve the name as an
    /// operator overload on the pointee's type; the receiver pointer is
    /// argument 0.
    pub(crate) fn elaborate_call_method(
        &mut self,
        node: NodeId,
        receiver: NodeId,
        method: NameId,
        arguments: &[NodeId],
    ) -> CompileResult<()> {
        let mut all_arguments = Vec::with_capacity(arguments.len() + 1);
        all_arguments.push(receiver);
        all_arguments.extend_from_slice(arguments);

        let receiver_type = self.enforce_pointer(receiver)?;
        let pointee = match self.values.get(receiver_type) {
            ValueData::PointerType { inner } => *inner,
            _ => receiver_type,
        };

        let Some((function, mut function_type)) = self.find_custom_operator(pointee, method) else {
            return Err(self.error(
                node,
                ErrorKind::OperatorNotFound,
                format!("Method '{}' not found", self.interns.get(method)),
            ));
        };

        self.pre_elaborate_arguments(function_type, &all_arguments)?;
        let resolved =
            self.elaborate_call_generic(node, Some(function), &mut function_type, &all_arguments)?;
        let function = resolved.unwrap_or(function);

        self.set_data(
            node,
            NodeData::CallMethod {
                arguments: all_arguments,
                function,
                function_type,
            },
        );
        if let ValueData::FunctionType {
            return_type: Some(return_type),
            ..
        } = self.values.get(function_type)
        {
            let return_type = *return_type;
            self.set_type(node, return_type);
        }
        Ok(())
    }

    pub(crate) fn elaborate_array_access(
        &mut self,
        node: NodeId,
        parent: NodeId,
        index: NodeId,
        assign_value: Option<NodeId>,
    ) -> CompileResult<()> {
        self.elaborate(parent)?;
        let original_type = self.require_type(parent)?;

        let bits = self.codegen.default_integer_size();
        let index_type = self.values.integer_type(false, bits);
        self.elaborate_with(TemporaryContext::wanting(Some(index_type)), index)?;

        let array_type = self.enforce_pointer(parent)?;
        let pointee = match self.values.get(array_type) {
            ValueData::PointerType { inner } => *inner,
            _ => array_type,
        };

        let operator_name = self.interns.intern("[]");
        let overload = self.find_custom_operator(pointee, operator_name);

        let item_type = match (&overload, self.values.get(pointee)) {
            (None, ValueData::ArrayType { inner, .. } | ValueData::ArrayViewType { inner }) => *inner,
            (None, _) => {
                let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(original_type));
                return Err(self.error(
                    node,
                    ErrorKind::OperatorNotFound,
                    format!("Cannot perform array access operation on {rendered}"),
                ));
            }
            (Some(_), _) => self.values.none(), // replaced below
        };

        // With an overload, the site becomes a call to it: receiver pointer
        // first, then the index. Its return type is a pointer at the item.
        let overload = match overload {
            Some((function, mut function_type)) => {
                let overload_arguments = [parent, index];
                self.pre_elaborate_arguments(function_type, &overload_arguments)?;
                let resolved =
                    self.elaborate_call_generic(node, Some(function), &mut function_type, &overload_arguments)?;
                Some((resolved.unwrap_or(function), function_type))
            }
            None => None,
        };
        let item_type = match &overload {
            Some((_, function_type)) => match self.values.get(*function_type) {
                ValueData::FunctionType {
                    return_type: Some(return_type),
                    ..
                } => match self.values.get(*return_type) {
                    ValueData::PointerType { inner } => *inner,
                    _ => {
                        return Err(self.error(
                            node,
                            ErrorKind::OperatorNotFound,
                            "An index overload must return a pointer".to_owned(),
                        ));
                    }
                },
                _ => {
                    return Err(self.error(
                        node,
                        ErrorKind::OperatorNotFound,
                        "An index overload must declare a return type".to_owned(),
                    ));
                }
            },
            None => item_type,
        };

        let want_pointer = self.temporary.want_pointer;
        self.set_data(
            node,
            NodeData::ArrayAccess {
                array_type,
                item_type,
                overload,
                want_pointer,
            },
        );
        if let Some(assign) = assign_value {
            self.elaborate_assign(node, item_type, assign)?;
        } else {
            let ty = if want_pointer {
                self.values.pointer_type(item_type)
            } else {
                item_type
            };
            self.set_type(node, ty);
        }
        Ok(())
    }

    /// Looks up a named overload on a struct type, returning the function
    /// value and its (possibly incomplete) type.
    pub(crate) fn find_custom_operator(&self, ty: ValueId, name: NameId) -> Option<(ValueId, ValueId)> {
        let ValueData::StructType { operators, .. } = self.values.get(ty) else {
            return None;
        };
        let (_, function) = operators.iter().find(|(operator, _)| *operator == name)?;
        let function_type = match self.values.get(*function) {
            ValueData::Function { ty, .. } => *ty,
            ValueData::FunctionStub { node, .. } => {
                let NodeKind::Function { function_type, .. } = self.node(*node).kind else {
                    return None;
                };
                match self.get_data(function_type) {
                    Some(NodeData::FunctionType { value, .. }) => *value,
                    _ => return None,
                }
            }
            _ => return None,
        };
        Some((*function, function_type))
    }

    /// Declared parameters of the function-type node backing `function_type`.
    fn declared_parameters(&self, function_type: ValueId) -> Option<(NodeId, Vec<FunctionParam>, Option<NodeId>, bool)> {
        let ValueData::FunctionType { node: Some(node), .. } = self.values.get(function_type) else {
            return None;
        };
        let node = *node;
        let NodeKind::FunctionType {
            parameters,
            return_type,
            variadic,
        } = &self.node(node).kind
        else {
            return None;
        };
        Some((node, parameters.clone(), *return_type, *variadic))
    }

    /// Pre-elaborates arguments at positions whose declared parameter type
    /// mentions an inferred name, so pattern matching sees actual types.
    fn pre_elaborate_arguments(&mut self, function_type: ValueId, arguments: &[NodeId]) -> CompileResult<()> {
        let Some((_, parameters, _, _)) = self.declared_parameters(function_type) else {
            return Ok(());
        };
        let inferred: SmallVec<[NameId; 4]> = parameters
            .iter()
            .filter(|parameter| parameter.inferred)
            .map(|parameter| parameter.name)
            .collect();
        if inferred.is_empty() {
            return Ok(());
        }
        for (position, &argument) in arguments.iter().enumerate() {
            if self.get_type(argument).is_some() {
                continue;
            }
            let declared_index = position + inferred.len();
            let Some(parameter) = parameters.get(declared_index) else {
                continue;
            };
            let mentions = parameter
                .ty
                .is_some_and(|ty| self.uses_inferred_arguments(ty, &inferred));
            if mentions {
                self.elaborate(argument)?;
            }
        }
        Ok(())
    }

    /// Whether a parameter-type expression mentions any inferred name.
    fn uses_inferred_arguments(&self, node: NodeId, inferred: &[NameId]) -> bool {
        match &self.node(node).kind {
            NodeKind::PointerType { inner }
            | NodeKind::OptionalType { inner }
            | NodeKind::ArrayViewType { inner } => self.uses_inferred_arguments(*inner, inferred),
            NodeKind::ArrayType { inner, size } => {
                self.uses_inferred_arguments(*inner, inferred)
                    || size.is_some_and(|size| self.uses_inferred_arguments(size, inferred))
            }
            NodeKind::Call { arguments, .. } => arguments
                .iter()
                .any(|&argument| self.uses_inferred_arguments(argument, inferred)),
            NodeKind::Identifier { name, module: None, .. } => inferred.contains(name),
            _ => false,
        }
    }

    /// Structural pattern matching of a declared parameter-type expression
    /// against an actual type value, binding inferred names. Shape mismatch
    /// is not a failure here; only contradicting bindings are. Missing
    /// bindings surface when the inferred list is collected.
    fn pattern_match(
        &mut self,
        node: NodeId,
        value: ValueId,
        inferred: &[NameId],
        result: &mut MatchResult,
    ) -> bool {
        match &self.node(node).kind {
            NodeKind::PointerType { inner } => {
                let inner = *inner;
                match self.values.get(value) {
                    ValueData::PointerType { inner: pointee } => {
                        let pointee = *pointee;
                        self.pattern_match(inner, pointee, inferred, result)
                    }
                    _ => true,
                }
            }
            NodeKind::OptionalType { inner } => {
                let inner = *inner;
                match self.values.get(value) {
                    ValueData::OptionalType { inner: wrapped } => {
                        let wrapped = *wrapped;
                        self.pattern_match(inner, wrapped, inferred, result)
                    }
                    _ => true,
                }
            }
            NodeKind::ArrayViewType { inner } => {
                let inner = *inner;
                match self.values.get(value) {
                    ValueData::ArrayViewType { inner: element } => {
                        let element = *element;
                        self.pattern_match(inner, element, inferred, result)
                    }
                    _ => true,
                }
            }
            NodeKind::ArrayType { inner, size } => {
                let (inner, size) = (*inner, *size);
                match self.values.get(value) {
                    ValueData::ArrayType {
                        inner: element,
                        size: actual_size,
                    } => {
                        let (element, actual_size) = (*element, *actual_size);
                        if !self.pattern_match(inner, element, inferred, result) {
                            return false;
                        }
                        match (size, actual_size) {
                            (Some(size), Some(actual_size)) => {
                                self.pattern_match(size, actual_size, inferred, result)
                            }
                            _ => true,
                        }
                    }
                    _ => true,
                }
            }
            // An applied generic in parameter position matches against the
            // static arguments recorded on the instantiated struct type.
            NodeKind::Call { arguments, .. } => {
                let arguments = arguments.clone();
                match self.values.get(value) {
                    ValueData::StructType {
                        arguments: actual_arguments,
                        ..
                    } => {
                        let actual_arguments = actual_arguments.clone();
                        arguments
                            .iter()
                            .zip(actual_arguments)
                            .all(|(&argument, actual)| self.pattern_match(argument, actual, inferred, result))
                    }
                    _ => true,
                }
            }
            NodeKind::Identifier { name, module: None, .. } => {
                let name = *name;
                if !inferred.contains(&name) {
                    return true;
                }
                if let Some(previous) = result.get(&name) {
                    // A second binding must agree with the first.
                    return self.values.equal(previous.value, value);
                }
                let ty = self.values.type_type();
                result.insert(name, TypedValue { value, ty });
                true
            }
            _ => true,
        }
    }

    /// Resolves static and inferred parameters for a call of a possibly
    /// incomplete function, reusing a memoized instantiation when the
    /// static-argument values match, and finally checks the runtime arguments
    /// against the complete type.
    ///
    /// Returns the resolved function value when one is known.
    pub(crate) fn elaborate_call_generic(
        &mut self,
        node: NodeId,
        mut function_value: Option<ValueId>,
        function_type: &mut ValueId,
        arguments: &[NodeId],
    ) -> CompileResult<Option<ValueId>> {
        let declared = self.declared_parameters(*function_type);
        let mut inferred_count = 0usize;

        if let Some((ft_node, parameters, return_type_node, _variadic)) = declared {
            let has_static = parameters.iter().any(|parameter| parameter.is_static);
            if has_static {
                let inferred: SmallVec<[NameId; 4]> = parameters
                    .iter()
                    .filter(|parameter| parameter.inferred)
                    .map(|parameter| parameter.name)
                    .collect();
                inferred_count = inferred.len();

                let resolved = self.monomorphize(
                    node,
                    ft_node,
                    &parameters,
                    return_type_node,
                    &inferred,
                    function_value,
                    arguments,
                )?;
                function_value = Some(resolved.0);
                *function_type = resolved.1;
            } else {
                inferred_count = parameters.iter().filter(|parameter| parameter.inferred).count();
            }
        }

        let ValueData::FunctionType {
            parameters,
            variadic,
            incomplete,
            ..
        } = self.values.get(*function_type)
        else {
            let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(*function_type));
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                format!("Expected function pointer, but got {rendered}"),
            ));
        };
        debug_assert!(!incomplete, "call of an incomplete function type");
        let parameters = parameters.clone();
        let variadic = *variadic;

        // Argument count is checked against the non-inferred parameters; a
        // variadic function accepts a tail.
        let expected = parameters.iter().filter(|parameter| !parameter.inferred).count();
        if arguments.len() != expected && !variadic {
            return Err(self.error(
                node,
                ErrorKind::Arity,
                format!("Expected {expected} arguments, but got {}", arguments.len()),
            ));
        }

        for (position, &argument) in arguments.iter().enumerate() {
            let declared_index = position + inferred_count;
            if parameters
                .get(declared_index)
                .is_some_and(|parameter| parameter.is_static)
            {
                continue;
            }
            let wanted = parameters.get(declared_index).and_then(|parameter| parameter.ty);
            self.elaborate_with(TemporaryContext::wanting(wanted), argument)?;
            if let Some(wanted) = wanted {
                let argument_type = self.get_type(argument);
                let ok = argument_type.is_some_and(|argument_type| self.values.assignable(wanted, argument_type));
                if !ok {
                    return Err(self.expected_type_error(node, Some(wanted), argument_type));
                }
            }
        }

        Ok(function_value)
    }

    /// Resolves one instantiation of a static-parameter function.
    #[expect(clippy::too_many_arguments, reason = "one site, split from elaborate_call_generic for length")]
    fn monomorphize(
        &mut self,
        node: NodeId,
        ft_node: NodeId,
        parameters: &[FunctionParam],
        return_type_node: Option<NodeId>,
        inferred: &[NameId],
        function_value: Option<ValueId>,
        arguments: &[NodeId],
    ) -> CompileResult<(ValueId, ValueId)> {
        let saved_static_id = self.static_id;
        let new_static_id = self.fresh_static_id();
        let compile_only_parent = self.compile_only;

        // Inferred-parameter defaults elaborate up front so they can supply
        // missing bindings later.
        for parameter in parameters {
            if parameter.inferred {
                if let Some(default) = parameter.default_value {
                    self.elaborate(default)?;
                }
            }
        }

        let mut pattern_fail = false;
        let mut static_arguments: Vec<(NameId, TypedValue)> = Vec::new();
        let mut match_result = MatchResult::new();

        for (position, &argument) in arguments.iter().enumerate() {
            let declared_index = position + inferred.len();
            let Some(parameter) = parameters.get(declared_index) else {
                break;
            };
            if parameter.is_static {
                // Evaluate the declared type in the fresh world (it may
                // mention earlier static parameters), then re-elaborate the
                // argument against it and take its compile-time value.
                let mut wanted = None;
                if !parameter.inferred {
                    if let Some(ty) = parameter.ty {
                        self.static_id = new_static_id;
                        let outcome = self
                            .elaborate(ty)
                            .and_then(|()| self.evaluate_for_elaboration(ty));
                        self.static_id = saved_static_id;
                        wanted = Some(outcome?);
                    }
                }
                self.reset_node(argument);
                self.elaborate_with(TemporaryContext::wanting(wanted), argument)?;
                let value = self.evaluate_for_elaboration(argument)?;
                let ty = self.require_type(argument)?;
                static_arguments.push((parameter.name, TypedValue { value, ty }));
            } else {
                // A runtime argument triggers the structural matching pass
                // over every non-static declared parameter.
                for (declared_position, declared) in parameters.iter().enumerate() {
                    if declared.inferred || declared.is_static {
                        continue;
                    }
                    let argument_position = declared_position - inferred.len();
                    let Some(&matched_argument) = arguments.get(argument_position) else {
                        continue;
                    };
                    let Some(actual) = self.get_type(matched_argument) else {
                        continue;
                    };
                    if let Some(ty) = declared.ty {
                        if !self.pattern_match(ty, actual, inferred, &mut match_result) {
                            pattern_fail = true;
                        }
                    }
                }
            }
        }

        // Context also flows up: a stated return type matches against the
        // caller's wanted type.
        if let (Some(return_node), Some(wanted)) = (return_type_node, self.temporary.wanted_type) {
            if !self.pattern_match(return_node, wanted, inferred, &mut match_result) {
                pattern_fail = true;
            }
        }

        for parameter in parameters {
            if !parameter.inferred {
                continue;
            }
            let bound = match match_result.get(&parameter.name) {
                Some(bound) => Some(*bound),
                None => match parameter.default_value {
                    Some(default) => {
                        let value = self.evaluate_for_elaboration(default)?;
                        let ty = self.require_type(default)?;
                        Some(TypedValue { value, ty })
                    }
                    None => None,
                },
            };
            match bound {
                Some(mut bound) => {
                    // Pattern bindings carry `type` as their type; a
                    // non-type binding (an array size, say) takes the
                    // parameter's declared type instead.
                    if !self.is_type_form(bound.value) {
                        if let Some(ty) = parameter.ty {
                            self.static_id = new_static_id;
                            let outcome = self
                                .elaborate(ty)
                                .and_then(|()| self.evaluate_for_elaboration(ty));
                            self.static_id = saved_static_id;
                            bound.ty = outcome?;
                        }
                    }
                    static_arguments.push((parameter.name, bound));
                }
                None => pattern_fail = true,
            }
        }

        if pattern_fail {
            return Err(self.error(
                node,
                ErrorKind::PatternMatch,
                "Pattern matching failed".to_owned(),
            ));
        }

        // Canonical tuple: static-argument values in declaration order.
        let mut canonical = Vec::new();
        for parameter in parameters {
            if !parameter.is_static {
                continue;
            }
            let Some((_, typed)) = static_arguments
                .iter()
                .find(|(name, _)| *name == parameter.name)
            else {
                return Err(self.error(
                    node,
                    ErrorKind::PatternMatch,
                    "Pattern matching failed".to_owned(),
                ));
            };
            canonical.push(typed.value);
        }

        // A previous instantiation with value-equal static arguments shares
        // its function value and type.
        if let Some(NodeData::FunctionType { variations, .. }) = self.get_data(ft_node) {
            for variation in variations {
                if variation.static_arguments.len() != canonical.len() {
                    continue;
                }
                let matches = variation
                    .static_arguments
                    .iter()
                    .zip(&canonical)
                    .all(|(&a, &b)| self.values.equal(a, b));
                if matches {
                    return Ok((variation.value, variation.ty));
                }
            }
        }

        // Fresh instantiation: replay the stub's captured scopes, install the
        // static bindings, and body-elaborate under the new world.
        let Some(stub) = function_value else {
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                "Cannot instantiate an unknown function".to_owned(),
            ));
        };
        let (fn_node, stub_scopes) = match self.values.get(stub) {
            ValueData::FunctionStub { node, scopes } => (*node, scopes.clone()),
            ValueData::Function { node, .. } => (*node, self.scopes.clone()),
            _ => {
                return Err(self.error(
                    node,
                    ErrorKind::TypeMismatch,
                    "Cannot instantiate a non-function".to_owned(),
                ));
            }
        };

        self.static_id = new_static_id;
        self.reset_node(fn_node);

        let saved_scopes = std::mem::replace(&mut self.scopes, stub_scopes);
        let mut call_scope = Scope::for_node(node);
        for (name, typed) in &static_arguments {
            call_scope.static_bindings.insert(*name, *typed);
        }
        self.push_scope(call_scope);

        let instantiation = (|| {
            self.elaborate_function(fn_node, true)?;
            self.compile_only = compile_only_parent;
            let ty = self.require_type(fn_node)?;
            let value = self.evaluate_for_elaboration(fn_node)?;
            Ok((value, ty))
        })();

        self.pop_scope();
        self.scopes = saved_scopes;
        self.static_id = saved_static_id;
        let (value, ty) = instantiation?;

        // Publish the instantiation for later calls with the same tuple.
        if let Some(NodeData::FunctionType { variations, .. }) = self.get_data_mut(ft_node) {
            variations.push(Variation {
                static_arguments: canonical,
                value,
                ty,
            });
        }
        Ok((value, ty))
    }

    fn is_type_form(&self, value: ValueId) -> bool {
        matches!(
            self.values.get(value),
            ValueData::IntegerType { .. }
                | ValueData::FloatType { .. }
                | ValueData::ByteType
                | ValueData::BooleanType
                | ValueData::TypeType
                | ValueData::None
                | ValueData::EnumType { .. }
                | ValueData::OptionalType { .. }
                | ValueData::PointerType { .. }
                | ValueData::ArrayType { .. }
                | ValueData::ArrayViewType { .. }
                | ValueData::RangeType { .. }
                | ValueData::ResultType { .. }
                | ValueData::StructType { .. }
                | ValueData::TupleType { .. }
                | ValueData::UnionType { .. }
                | ValueData::TaggedUnionType { .. }
                | ValueData::FunctionType { .. }
                | ValueData::ModuleType
        )
    }

    /// Applies a generic define: static arguments are evaluated against the
    /// declared generic parameter types, the `where` constraint is checked,
    /// and the define body elaborates under a fresh static id, memoized per
    /// value-equal argument tuple.
    pub(crate) fn elaborate_template_apply(
        &mut self,
        node: NodeId,
        template: ValueId,
        arguments: &[NodeId],
    ) -> CompileResult<()> {
        let ValueData::Template { node: define_node, scopes } = self.values.get(template) else {
            unreachable!("elaborate_template_apply on a non-template");
        };
        let (define_node, template_scopes) = (*define_node, scopes.clone());
        let NodeKind::Define {
            ty: declared_type,
            expression,
            ref generics,
            constraint,
            ..
        } = self.node(define_node).kind
        else {
            unreachable!("template value points at a non-define");
        };
        let generics = generics.clone();

        if arguments.len() != generics.len() {
            return Err(self.error(
                node,
                ErrorKind::Arity,
                format!("Expected {} arguments, but got {}", generics.len(), arguments.len()),
            ));
        }

        // Evaluate each generic argument against its declared type.
        let mut bindings: Vec<(NameId, TypedValue)> = Vec::with_capacity(generics.len());
        for (generic, &argument) in generics.iter().zip(arguments) {
            self.elaborate(generic.ty)?;
            let wanted = self.evaluate_for_elaboration(generic.ty)?;
            self.elaborate_with(TemporaryContext::wanting(Some(wanted)), argument)?;
            let argument_type = self.require_type(argument)?;
            if !self.values.assignable(wanted, argument_type) {
                return Err(self.expected_type_error(node, Some(wanted), Some(argument_type)));
            }
            let value = self.evaluate_for_elaboration(argument)?;
            bindings.push((
                generic.name,
                TypedValue {
                    value,
                    ty: argument_type,
                },
            ));
        }
        let canonical: Vec<ValueId> = bindings.iter().map(|(_, typed)| typed.value).collect();

        // Instantiations with value-equal argument tuples share node data
        // and type.
        if let Some(NodeData::DefineTemplate { instances }) = self.get_data(define_node) {
            for instance in instances {
                if instance.static_arguments.len() != canonical.len() {
                    continue;
                }
                let matches = instance
                    .static_arguments
                    .iter()
                    .zip(&canonical)
                    .all(|(&a, &b)| self.values.equal(a, b));
                if matches {
                    let (value, ty) = (instance.value, instance.ty);
                    self.set_data(node, NodeData::TemplateApply { value, ty });
                    self.set_type(node, ty);
                    return Ok(());
                }
            }
        }

        let saved_static_id = self.static_id;
        let new_static_id = self.fresh_static_id();

        let saved_scopes = std::mem::replace(&mut self.scopes, template_scopes);
        let mut instantiation_scope = Scope::for_node(define_node);
        for (name, typed) in &bindings {
            instantiation_scope.static_bindings.insert(*name, *typed);
        }
        self.push_scope(instantiation_scope);
        self.static_id = new_static_id;

        let instantiation = (|| {
            // The where-constraint is evaluated per instantiation; yielding
            // false fails the compile.
            if let Some(constraint) = constraint {
                self.elaborate(constraint)?;
                let verdict = self.evaluate_for_elaboration(constraint)?;
                if !matches!(self.values.get(verdict), ValueData::Boolean(true)) {
                    return Err(self.error(
                        node,
                        ErrorKind::PatternMatch,
                        "Generic constraint not satisfied".to_owned(),
                    ));
                }
            }
            let wanted = match declared_type {
                Some(declared) => {
                    self.elaborate(declared)?;
                    Some(self.evaluate_for_elaboration(declared)?)
                }
                None => None,
            };
            self.elaborate_with(TemporaryContext::wanting(wanted), expression)?;
            let ty = self.require_type(expression)?;
            let value = self.evaluate_for_elaboration(expression)?;
            Ok((value, ty))
        })();

        self.static_id = saved_static_id;
        self.pop_scope();
        self.scopes = saved_scopes;
        let (value, ty) = instantiation?;

        // Record the applied arguments on an instantiated struct type so
        // parameter patterns like `Template(T)` can match against it.
        if let ValueData::StructType { arguments: slots, .. } = self.values.get_mut(value) {
            if slots.is_empty() {
                *slots = canonical.clone();
            }
        }

        if let Some(NodeData::DefineTemplate { instances }) = self.get_data_mut(define_node) {
            instances.push(Variation {
                static_arguments: canonical,
                value,
                ty,
            });
        }
        self.set_data(node, NodeData::TemplateApply { value, ty });
        self.set_type(node, ty);
        Ok(())
    }
}
