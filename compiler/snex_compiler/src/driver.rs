//! The pass driver: source text in, callable object out.
//!
//! [`Compiler::compile`] runs the fixed pass sequence from [`Pass`] over
//! one translation unit. Function bodies are captured as token ranges
//! during the first parse and re-parsed only once every top-level symbol,
//! struct layout and template is known, so forward references and
//! member access inside methods resolve without a dedicated forward pass.

use rustc_hash::FxHashMap;

use snex_codegen::{CompiledFunction, GlobalEntry, JitObject, NativeFunction};
use snex_diagnostic::{CompileError, CompileResult, Diagnostic};
use snex_ir::{
    ComplexTypeId, Name, NamespacedIdentifier, NodeId, NodeKind, ScopeId, StringInterner, Symbol,
    SymbolFlags, SyntaxTree, TypeInfo, Types, VariableStorage,
};
use snex_lexer::lex;
use snex_parse::{all_paths_return, ParseSession, Parser};
use snex_types::{
    ComplexTypeKind, ComplexTypeRegistry, FunctionData, FunctionImpl, NamespaceHandler,
    SymbolType, TemplateArg, TemplateRegistry,
};

use crate::functions::{CallMap, FunctionTable};
use crate::intrinsics::register_intrinsics;
use crate::lower::{lower_function, LowerInput};
use crate::optimize::{
    candidate_from_body, inline_calls, run_to_fixpoint, BinaryOpOptimization, ConstantFolding,
    DeadCodeElimination, OptimizationPass, OptimizeCtx,
};
use crate::pass::Pass;
use crate::resolve::{resolve, PendingWarning, ResolveCtx};
use crate::scope::{
    allocate_frame, allocate_globals, GlobalSlot, ScopeArena, ScopeKind, VarLoc,
};
use crate::settings::{optimizations, CompilerSettings};
use crate::sugar::desugar;
use crate::typecheck::{typecheck, TypecheckCtx};

/// A successful compilation: the executable object plus any warnings
/// collected along the way.
#[derive(Debug)]
pub struct CompileOutput {
    pub jit: JitObject,
    /// Indented listing of the resolved syntax tree, for host inspection
    /// next to [`JitObject::assembly`].
    pub syntax_tree: String,
    pub warnings: Vec<Diagnostic>,
}

/// One-shot compiler for a single translation unit.
pub struct Compiler {
    settings: CompilerSettings,
}

impl Compiler {
    pub fn new(settings: CompilerSettings) -> Self {
        Compiler { settings }
    }

    /// Compile `source` into a callable object. The first error aborts
    /// the pipeline; warnings accumulate across passes and only surface
    /// on success.
    pub fn compile(&self, source: &str) -> Result<CompileOutput, Diagnostic> {
        let mut warnings = Vec::new();
        match compile_inner(&self.settings, source, &mut warnings) {
            Ok((jit, syntax_tree)) => Ok(CompileOutput {
                jit,
                syntax_tree,
                warnings: warnings
                    .into_iter()
                    .map(|w| Diagnostic::warning(w.code, w.message, w.span, source))
                    .collect(),
            }),
            Err(err) => Err(err.into_diagnostic(source)),
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new(CompilerSettings::default())
    }
}

fn trace_pass(pass: Pass) {
    tracing::debug!(%pass, "pass");
}

fn compile_inner(
    settings: &CompilerSettings,
    source: &str,
    warnings: &mut Vec<PendingWarning>,
) -> CompileResult<(JitObject, String)> {
    let mut interner = StringInterner::new();
    let mut namespaces = NamespaceHandler::new();
    let mut complex_types = ComplexTypeRegistry::new();
    let mut templates = TemplateRegistry::new();
    let mut tree = SyntaxTree::new();
    let mut scopes = ScopeArena::new();
    let mut functions = FunctionTable::new();
    let mut natives: Vec<NativeFunction> = Vec::new();
    let mut calls = CallMap::default();

    let events =
        register_intrinsics(&mut interner, &mut namespaces, &mut functions, &mut natives)?;
    let this_name = interner.intern("this");

    trace_pass(Pass::Parsing);
    let tokens = lex(source, &mut interner)?;
    let mut body_bindings: FxHashMap<NamespacedIdentifier, FxHashMap<Name, TemplateArg>> =
        FxHashMap::default();
    let mut parser = Parser::new(
        &tokens,
        ParseSession {
            interner: &mut interner,
            namespaces: &mut namespaces,
            complex_types: &mut complex_types,
            templates: &mut templates,
            tree: &mut tree,
        },
    );
    let root = parser.parse_program()?;
    let instantiated = parser.take_instantiated();
    body_bindings.extend(parser.take_body_bindings());
    drop(parser);
    append_statements(&mut tree, root, &instantiated);

    trace_pass(Pass::ComplexTypeParsing);
    for (_, complex) in complex_types.iter() {
        debug_assert!(complex.is_finalized());
    }

    trace_pass(Pass::DataSizeCalculation);
    for (id, _) in complex_types.iter() {
        tracing::debug!(
            ty = ?id,
            size = complex_types.size_of(TypeInfo::Complex(id)),
            "complex type"
        );
    }

    // Folding always runs here regardless of the optimization settings:
    // global initializers must reduce to immediates before the data pass,
    // and a constant zero divisor is diagnosed during folding.
    trace_pass(Pass::PreSymbolOptimization);
    fold(&mut tree, &calls, root)?;

    trace_pass(Pass::DataAllocation);
    let mut layout = allocate_globals(&mut tree, root, &complex_types, &interner)?;
    // An `auto` global took its type from the initializer; mirror that in
    // the namespace so references pick up the concrete type.
    for slot in &layout.globals {
        if let Some(item) = namespaces.get_mut(&slot.id) {
            item.symbol.type_info = slot.ty;
        }
    }

    trace_pass(Pass::DataInitialisation);
    let mut globals_mem = vec![0u8; layout.size as usize];
    let mut symbols: Vec<GlobalEntry> = Vec::new();
    for slot in &layout.globals {
        init_global(
            &tree,
            &complex_types,
            &interner,
            slot,
            &mut globals_mem,
            &mut symbols,
        )?;
    }

    trace_pass(Pass::ResolvingSymbols);
    let root_statements: Vec<NodeId> = match tree.kind(root) {
        NodeKind::StatementBlock { statements, .. } => statements.iter().copied().collect(),
        _ => Vec::new(),
    };
    {
        let mut cx = ResolveCtx {
            tree: &mut tree,
            interner: &interner,
            namespaces: &mut namespaces,
            scopes: &mut scopes,
            warnings: &mut *warnings,
        };
        for &stmt in &root_statements {
            resolve(&mut cx, stmt, ScopeId::GLOBAL)?;
        }
    }

    trace_pass(Pass::TypeCheck);
    {
        let mut cx = TypecheckCtx {
            tree: &mut tree,
            interner: &interner,
            namespaces: &mut namespaces,
            complex_types: &complex_types,
            functions: &functions,
            calls: &mut calls,
            events,
            relaxed_floats: settings.relaxed_float_policy,
            return_type: None,
            method_of: None,
        };
        for &stmt in &root_statements {
            typecheck(&mut cx, stmt)?;
        }
    }

    trace_pass(Pass::SyntaxSugarReplacements);
    desugar(&mut tree, root);

    trace_pass(Pass::PostSymbolOptimization);
    optimize_subtree(settings, &mut tree, &calls, root, false)?;

    // Templates were instantiated eagerly while parsing; their bodies sit
    // in `body_bindings` and re-parse with the rest below.
    trace_pass(Pass::FunctionTemplateParsing);

    trace_pass(Pass::FunctionParsing);
    let mut pending: Vec<NodeId> = Vec::new();
    collect_functions(&tree, root, &mut pending);
    for (index, &node) in pending.iter().enumerate() {
        register_function(&tree, node, index as u32, &mut functions);
    }

    let mut i = 0;
    while i < pending.len() {
        let node = pending[i];
        i += 1;
        let info = match tree.kind(node) {
            NodeKind::Function(info) => info.as_ref().clone(),
            _ => continue,
        };
        let span = tree.node(node).span;
        tracing::debug!(function = %info.name.id.display(&interner), "parsing body");

        // Parameter lookups and member access resolve against the
        // function's own namespace path, so enter it for the whole of
        // parse, resolve and typecheck.
        for &seg in info.name.id.segments() {
            namespaces.push(seg);
        }

        let mut parser = Parser::new(
            &tokens,
            ParseSession {
                interner: &mut interner,
                namespaces: &mut namespaces,
                complex_types: &mut complex_types,
                templates: &mut templates,
                tree: &mut tree,
            },
        );
        if let Some(bindings) = body_bindings.get(&info.name.id) {
            parser.bind_template_args(bindings.clone());
        }
        let body = parser.parse_body(info.body_tokens)?;
        let instantiated = parser.take_instantiated();
        body_bindings.extend(parser.take_body_bindings());
        drop(parser);

        // A template instantiated from inside this body brings new
        // top-level nodes and possibly new functions along.
        append_statements(&mut tree, root, &instantiated);
        for &new_node in &instantiated {
            let before = pending.len();
            collect_functions(&tree, new_node, &mut pending);
            for (offset, &f) in pending[before..].iter().enumerate() {
                register_function(&tree, f, (before + offset) as u32, &mut functions);
            }
        }

        if let NodeKind::Function(f) = &mut tree.node_mut(node).kind {
            f.body = Some(body);
        }

        let method_of = struct_owner(&namespaces, &info.name.id);
        let fscope = scopes.add(ScopeId::GLOBAL, ScopeKind::Function);
        {
            let mut cx = ResolveCtx {
                tree: &mut tree,
                interner: &interner,
                namespaces: &mut namespaces,
                scopes: &mut scopes,
                warnings: &mut *warnings,
            };
            resolve(&mut cx, body, fscope)?;
        }
        {
            let mut cx = TypecheckCtx {
                tree: &mut tree,
                interner: &interner,
                namespaces: &mut namespaces,
                complex_types: &complex_types,
                functions: &functions,
                calls: &mut calls,
                events,
                relaxed_floats: settings.relaxed_float_policy,
                return_type: Some(info.name.type_info),
                method_of,
            };
            typecheck(&mut cx, body)?;
        }
        for _ in info.name.id.segments() {
            namespaces.pop();
        }

        if info.name.type_info != TypeInfo::VOID && !all_paths_return(&tree, body) {
            return Err(CompileError::MissingReturn {
                function: info.name.id.display(&interner).to_string(),
                span,
            });
        }

        desugar(&mut tree, body);
        optimize_subtree(settings, &mut tree, &calls, body, true)?;
    }

    trace_pass(Pass::PreCodeGenerationOptimization);
    if settings.is_enabled(optimizations::INLINING) {
        inline_pass(&mut tree, &calls, &pending)?;
    }

    trace_pass(Pass::RegisterAllocation);
    // Structs instantiated after the data pass still need their member
    // offsets in the location map.
    for (_, complex) in complex_types.iter() {
        if let ComplexTypeKind::Struct { name, members } = &complex.kind {
            for member in members {
                layout
                    .locations
                    .entry(name.child(member.name))
                    .or_insert(VarLoc::Member {
                        offset: member.offset,
                    });
            }
        }
    }
    struct FunctionPlan {
        name: Symbol,
        params: Vec<Symbol>,
        this: Option<NamespacedIdentifier>,
        body: NodeId,
        frame_size: u32,
    }
    let mut plans: Vec<FunctionPlan> = Vec::with_capacity(pending.len());
    for &node in &pending {
        let info = match tree.kind(node) {
            NodeKind::Function(info) => info.as_ref().clone(),
            _ => continue,
        };
        let Some(body) = info.body else { continue };
        let mut params: Vec<Symbol> = Vec::with_capacity(info.parameters.len() + 1);
        // Methods take the receiver as a leading pointer argument.
        let this = struct_owner(&namespaces, &info.name.id).map(|type_id| {
            let id = info.name.id.child(this_name);
            params.push(
                Symbol::new(id.clone(), TypeInfo::Complex(type_id))
                    .with_flags(SymbolFlags::PARAMETER),
            );
            id
        });
        params.extend(info.parameters.iter().cloned());
        let frame_size =
            allocate_frame(&tree, &params, body, &complex_types, &mut layout.locations);
        plans.push(FunctionPlan {
            name: info.name,
            params,
            this,
            body,
            frame_size,
        });
    }

    trace_pass(Pass::CodeGeneration);
    let mut compiled: Vec<CompiledFunction> = Vec::with_capacity(plans.len());
    for plan in plans {
        let input = LowerInput {
            tree: &tree,
            complex_types: &complex_types,
            locations: &layout.locations,
            calls: &calls,
        };
        let code = lower_function(&input, &plan.params, plan.this, plan.body);
        tracing::debug!(
            function = %plan.name.id.display(&interner),
            insts = code.len(),
            frame = plan.frame_size,
            "lowered"
        );
        compiled.push(CompiledFunction {
            name: plan.name.id.display(&interner).to_string(),
            return_type: plan.name.type_info.register_type(),
            arg_types: plan
                .params
                .iter()
                .map(|p| p.type_info.register_type())
                .collect(),
            code,
            frame_size: plan.frame_size,
        });
    }

    let syntax_tree = tree.dump(root, &interner);
    Ok((
        JitObject::new(compiled, natives, globals_mem, symbols),
        syntax_tree,
    ))
}

fn append_statements(tree: &mut SyntaxTree, root: NodeId, new: &[NodeId]) {
    if new.is_empty() {
        return;
    }
    if let NodeKind::StatementBlock { statements, .. } = &mut tree.node_mut(root).kind {
        statements.extend(new.iter().copied());
    }
}

/// Constant folding alone; always applied.
fn fold(tree: &mut SyntaxTree, calls: &CallMap, root: NodeId) -> CompileResult<()> {
    let mut cx = OptimizeCtx { tree, calls, root };
    run_to_fixpoint(&mut cx, &[&ConstantFolding])?;
    Ok(())
}

/// The configurable rewrites over one subtree. Dead-code elimination only
/// applies to function bodies; a global stays visible to the host even
/// when no function reads it.
fn optimize_subtree(
    settings: &CompilerSettings,
    tree: &mut SyntaxTree,
    calls: &CallMap,
    root: NodeId,
    function_body: bool,
) -> CompileResult<()> {
    let mut passes: Vec<&dyn OptimizationPass> = vec![&ConstantFolding];
    if settings.is_enabled(optimizations::BINARY_OP) {
        passes.push(&BinaryOpOptimization);
    }
    if function_body && settings.is_enabled(optimizations::DEAD_CODE_ELIMINATION) {
        passes.push(&DeadCodeElimination);
    }
    let mut cx = OptimizeCtx { tree, calls, root };
    run_to_fixpoint(&mut cx, &passes)?;
    Ok(())
}

/// Substitute single-expression function bodies into their call sites,
/// then re-fold whatever became constant.
fn inline_pass(tree: &mut SyntaxTree, calls: &CallMap, pending: &[NodeId]) -> CompileResult<()> {
    let mut candidates = Vec::new();
    for (index, &node) in pending.iter().enumerate() {
        let NodeKind::Function(info) = tree.kind(node) else {
            continue;
        };
        if !info.is_inlinable {
            continue;
        }
        let Some(body) = info.body else { continue };
        let params: Vec<NamespacedIdentifier> =
            info.parameters.iter().map(|p| p.id.clone()).collect();
        if let Some(candidate) = candidate_from_body(tree, index as u32, &params, body) {
            candidates.push(candidate);
        }
    }
    if candidates.is_empty() {
        return Ok(());
    }
    for &node in pending {
        let body = match tree.kind(node) {
            NodeKind::Function(info) => info.body,
            _ => None,
        };
        let Some(body) = body else { continue };
        let inlined = inline_calls(tree, calls, &candidates, body);
        if inlined > 0 {
            tracing::debug!(count = inlined, "inlined calls");
            fold(tree, calls, body)?;
        }
    }
    Ok(())
}

fn collect_functions(tree: &SyntaxTree, root: NodeId, out: &mut Vec<NodeId>) {
    for node in tree.walk(root) {
        if matches!(tree.kind(node), NodeKind::Function(_)) {
            out.push(node);
        }
    }
}

fn register_function(tree: &SyntaxTree, node: NodeId, index: u32, functions: &mut FunctionTable) {
    let NodeKind::Function(info) = tree.kind(node) else {
        return;
    };
    let mut data = FunctionData::new(info.name.id.clone(), info.name.type_info)
        .with_args(info.parameters.iter().cloned());
    data.is_inlinable = info.is_inlinable;
    data.implementation = FunctionImpl::Compiled(index);
    functions.add(data);
}

fn struct_owner(
    namespaces: &NamespaceHandler,
    id: &NamespacedIdentifier,
) -> Option<ComplexTypeId> {
    let parent = id.parent()?;
    let item = namespaces.get(&parent)?;
    if item.kind != SymbolType::Struct {
        return None;
    }
    match item.symbol.type_info {
        TypeInfo::Complex(type_id) => Some(type_id),
        TypeInfo::Primitive(_) => None,
    }
}

fn immediate_of(tree: &SyntaxTree, node: NodeId) -> Option<VariableStorage> {
    match tree.kind(node) {
        NodeKind::Immediate(v) => Some(*v),
        _ => None,
    }
}

/// Write one global's initial bytes and record its host-visible symbol
/// entries. Initializers must have folded to immediates by this point.
fn init_global(
    tree: &SyntaxTree,
    complex_types: &ComplexTypeRegistry,
    interner: &StringInterner,
    slot: &GlobalSlot,
    mem: &mut [u8],
    symbols: &mut Vec<GlobalEntry>,
) -> CompileResult<()> {
    let span = tree.node(slot.node).span;
    let non_constant = || CompileError::NonConstantGlobal {
        name: slot.id.display(interner).to_string(),
        span,
    };
    match tree.kind(slot.node) {
        NodeKind::VariableDefinition { init, .. } => {
            let ty = slot.ty.register_type();
            if let Some(init) = *init {
                let value = immediate_of(tree, init).ok_or_else(non_constant)?;
                write_value(mem, slot.offset, ty, value);
            }
            symbols.push(GlobalEntry {
                name: slot.id.display(interner).to_string(),
                ty,
                offset: slot.offset,
            });
        }
        NodeKind::ComplexTypeDefinition { type_id, init, .. } => {
            match &complex_types.get(*type_id).kind {
                ComplexTypeKind::Span { element, .. } => {
                    let elem = element.register_type();
                    let stride = complex_types.size_of(*element);
                    for (index, &node) in init.iter().enumerate() {
                        let value = immediate_of(tree, node).ok_or_else(non_constant)?;
                        write_value(mem, slot.offset + index as u32 * stride, elem, value);
                    }
                }
                ComplexTypeKind::Struct { members, .. } => {
                    for member in members {
                        if let Some(default) = member.default {
                            write_value(
                                mem,
                                slot.offset + member.offset,
                                member.ty.register_type(),
                                default,
                            );
                        }
                    }
                    // Brace initializers override defaults in member order.
                    for (member, &node) in members.iter().zip(init.iter()) {
                        let value = immediate_of(tree, node).ok_or_else(non_constant)?;
                        write_value(
                            mem,
                            slot.offset + member.offset,
                            member.ty.register_type(),
                            value,
                        );
                    }
                    for member in members {
                        if let TypeInfo::Primitive(ty) = member.ty {
                            symbols.push(GlobalEntry {
                                name: format!(
                                    "{}.{}",
                                    slot.id.display(interner),
                                    interner.resolve(member.name)
                                ),
                                ty,
                                offset: slot.offset + member.offset,
                            });
                        }
                    }
                }
                // A dyn binds to host memory at run time; no initial bytes.
                ComplexTypeKind::Dyn { .. } => {}
            }
        }
        _ => {}
    }
    Ok(())
}

fn write_value(mem: &mut [u8], offset: u32, ty: Types, value: VariableStorage) {
    let offset = offset as usize;
    match ty {
        Types::Integer => {
            let v = value.to_int() as i32;
            mem[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
        }
        Types::Float => {
            let v = value.to_float();
            mem[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
        }
        Types::Double => {
            let v = value.to_double();
            mem[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
        }
        // Events, blocks and pointers have no literal form.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use snex_diagnostic::ErrorCode;

    fn compile(source: &str) -> Result<CompileOutput, Diagnostic> {
        Compiler::new(CompilerSettings::all_optimizations()).compile(source)
    }

    #[test]
    fn compiles_and_calls_a_simple_function() {
        let mut jit = compile("int add(int a, int b) { return a + b; }")
            .expect("compile")
            .jit;
        let result = jit
            .call("add", &[VariableStorage::Int(2), VariableStorage::Int(3)])
            .expect("call");
        assert_eq!(result.to_int(), 5);
    }

    #[test]
    fn global_initializer_folds_and_is_visible() {
        let mut jit = compile("int x = 2 + 3; int get() { return x; }")
            .expect("compile")
            .jit;
        assert_eq!(jit.get_variable("x").map(|v| v.to_int()), Some(5));
        let result = jit.call("get", &[]).expect("call");
        assert_eq!(result.to_int(), 5);
    }

    #[test]
    fn compile_output_carries_a_tree_dump() {
        let out = compile("int add(int a, int b) { return a + b; }").expect("compile");
        assert!(out.syntax_tree.contains("Function add"));
        assert!(out.syntax_tree.contains("BinaryOp +"));
    }

    #[test]
    fn constant_zero_divisor_is_rejected() {
        let err = compile("int test(int input) { int x = 6 / 0; return x; }").unwrap_err();
        assert_eq!(err.message, "Division by zero");
    }

    #[test]
    fn non_constant_global_initializer_is_rejected() {
        let err = compile("int f() { return 4; }\nint x = f();").unwrap_err();
        assert_eq!(err.code, ErrorCode::E1006);
    }

    #[test]
    fn missing_return_is_rejected() {
        let err = compile("int f(int a) { if (a) return 1; }").unwrap_err();
        assert_eq!(err.code, ErrorCode::E1005);
    }

    #[test]
    fn forward_references_between_functions_resolve() {
        let source = "
            int first(int a) { return second(a) + 1; }
            int second(int a) { return a * 2; }
        ";
        let mut jit = compile(source).expect("compile").jit;
        let result = jit
            .call("first", &[VariableStorage::Int(10)])
            .expect("call");
        assert_eq!(result.to_int(), 21);
    }

    #[test]
    fn methods_address_members_through_the_receiver() {
        let source = "
            struct Counter
            {
                int value = 0;
                void bump() { value += 1; }
                int read() { return value; }
            };
            Counter c;
            void tick() { c.bump(); }
            int count() { return c.read(); }
        ";
        let mut jit = compile(source).expect("compile").jit;
        jit.call("tick", &[]).expect("tick");
        jit.call("tick", &[]).expect("tick");
        let result = jit.call("count", &[]).expect("count");
        assert_eq!(result.to_int(), 2);
        assert_eq!(jit.get_variable("c.value").map(|v| v.to_int()), Some(2));
    }

    #[test]
    fn block_local_is_not_visible_after_its_block() {
        let err = compile("int test(int a) { if (a) { int y = 1; } return y; }").unwrap_err();
        assert_eq!(err.code, ErrorCode::E2001);
        assert!(err.message.contains("undefined symbol"));
    }

    #[test]
    fn outer_local_stays_visible_inside_nested_blocks() {
        let source = "int test(int a) { int y = 2; if (a) { y = y + 1; } return y; }";
        let mut jit = compile(source).expect("compile").jit;
        let result = jit.call("test", &[VariableStorage::Int(1)]).expect("call");
        assert_eq!(result.to_int(), 3);
    }

    #[test]
    fn default_settings_still_diagnose_constant_division() {
        let err = Compiler::new(CompilerSettings::default())
            .compile("int f() { return 1 / 0; }")
            .unwrap_err();
        assert_eq!(err.message, "Division by zero");
    }
}
