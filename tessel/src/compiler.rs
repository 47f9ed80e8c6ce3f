//! Syntax tree to [`CompiledUnit`] code generation.
//!
//! One [`FunctionCompiler`] runs per unit. Declarations are collected up
//! front so that slot numbers are final before the first instruction is
//! emitted; nested functions are compiled depth first and stored in the
//! parent's function table.
use std::sync::Arc;

use bytecode::{
    BytecodeBuilder, CompiledUnit, Instruction, Label, TryRegion, UnitKind, UnitParts,
    VariableTable,
};
use indexmap::IndexSet;
use parser::{
    BinaryOp, Expr, ExprKind, ForInit, Function, LogicalOp, Program, Stmt, StmtKind, UnaryOp,
    UpdateOp,
};

use crate::config::CompileOptions;
use crate::error::CompileError;

/// Hidden script slot holding the value of the last expression statement.
const RESULT_SLOT: &str = "%result";

const MAX_ARGS: usize = u8::MAX as usize;
const MAX_INDEX: usize = u16::MAX as usize;

/// Parse and compile a whole script.
pub fn compile(source: &str, options: &CompileOptions) -> Result<Arc<CompiledUnit>, CompileError> {
    let program = parser::parse(source)?;
    compile_program(&program, source, options)
}

pub fn compile_program(
    program: &Program,
    source: &str,
    options: &CompileOptions,
) -> Result<Arc<CompiledUnit>, CompileError> {
    let source: Arc<str> = Arc::from(source);
    let decls = Declarations::collect(&program.body);

    let mut vars = VariableTable::new();
    vars.add_local(RESULT_SLOT);
    vars.establish_indices();

    let mut declared = IndexSet::new();
    for name in decls.vars.iter().chain(&decls.catch_params) {
        declared.insert(name.to_string());
    }
    for func in &decls.functions {
        if let Some(name) = &func.name {
            declared.insert(name.clone());
        }
    }

    let name = options.source_name.clone();
    let mut fc = FunctionCompiler::new(options, &source, name, UnitKind::Script, vars);
    fc.hoist_functions(&decls.functions)?;
    fc.statements(&program.body)?;
    let result = fc.slot(RESULT_SLOT)?;
    fc.builder.emit(Instruction::GetLocal { slot: result });
    fc.builder.emit(Instruction::Return);
    fc.finish(false, declared.into_iter().collect())
}

/// Compile one function literal and everything nested in it.
fn compile_function(
    func: &Function,
    options: &CompileOptions,
    source: &Arc<str>,
) -> Result<Arc<CompiledUnit>, CompileError> {
    let decls = Declarations::collect(&func.body);

    let mut vars = VariableTable::new();
    for param in &func.params {
        vars.add_parameter(&param.name);
    }
    for name in decls.vars.iter().chain(&decls.catch_params) {
        vars.add_local(name);
    }
    for inner in &decls.functions {
        if let Some(name) = &inner.name {
            vars.add_local(name);
        }
    }
    vars.establish_indices();

    let uses_arguments = decls.mentions_arguments && vars.index_of("arguments").is_none();
    let needs_activation = decls.has_nested || uses_arguments || options.force_activation;

    let name = func.name.clone().unwrap_or_default();
    let mut fc = FunctionCompiler::new(options, source, name, UnitKind::Function, vars);
    fc.uses_arguments = uses_arguments;
    fc.hoist_functions(&decls.functions)?;
    fc.statements(&func.body)?;
    fc.builder.emit(Instruction::PushUndefined);
    fc.builder.emit(Instruction::Return);
    fc.finish(needs_activation, Vec::new())
}

/// Names a unit body declares, gathered without entering nested functions.
#[derive(Default)]
struct Declarations<'a> {
    vars: Vec<&'a str>,
    functions: Vec<&'a Function>,
    catch_params: Vec<&'a str>,
    has_nested: bool,
    mentions_arguments: bool,
}

impl<'a> Declarations<'a> {
    fn collect(body: &'a [Stmt]) -> Self {
        let mut decls = Self::default();
        for stmt in body {
            decls.stmt(stmt);
        }
        decls
    }

    fn stmt(&mut self, stmt: &'a Stmt) {
        match &stmt.kind {
            StmtKind::Var(list) => {
                for decl in list {
                    self.vars.push(&decl.name);
                    if let Some(init) = &decl.init {
                        self.expr(init);
                    }
                }
            }
            StmtKind::FunctionDecl(func) => {
                self.has_nested = true;
                self.functions.push(func);
            }
            StmtKind::Expr(e) | StmtKind::Throw(e) => self.expr(e),
            StmtKind::Return(value) => {
                if let Some(e) = value {
                    self.expr(e);
                }
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test);
                self.stmt(consequent);
                if let Some(alt) = alternate {
                    self.stmt(alt);
                }
            }
            StmtKind::While { test, body } | StmtKind::DoWhile { body, test } => {
                self.expr(test);
                self.stmt(body);
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                match init {
                    Some(ForInit::Var(list)) => {
                        for decl in list {
                            self.vars.push(&decl.name);
                            if let Some(init) = &decl.init {
                                self.expr(init);
                            }
                        }
                    }
                    Some(ForInit::Expr(e)) => self.expr(e),
                    None => {}
                }
                for e in test.iter().chain(update) {
                    self.expr(e);
                }
                self.stmt(body);
            }
            StmtKind::Try {
                block,
                param,
                handler,
            } => {
                block.iter().for_each(|s| self.stmt(s));
                self.catch_params.push(param);
                handler.iter().for_each(|s| self.stmt(s));
            }
            StmtKind::Block(body) => body.iter().for_each(|s| self.stmt(s)),
            StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {}
        }
    }

    fn expr(&mut self, expr: &'a Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => {
                if name == "arguments" {
                    self.mentions_arguments = true;
                }
            }
            ExprKind::Function(_) => self.has_nested = true,
            ExprKind::Object(props) => props.iter().for_each(|(_, e)| self.expr(e)),
            ExprKind::Member { object, .. } => self.expr(object),
            ExprKind::Index { object, index } => {
                self.expr(object);
                self.expr(index);
            }
            ExprKind::Call { callee, args } => {
                self.expr(callee);
                args.iter().for_each(|e| self.expr(e));
            }
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Update { target, .. } => self.expr(target),
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Logical { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test);
                self.expr(consequent);
                self.expr(alternate);
            }
            ExprKind::Assign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            ExprKind::Sequence(list) => list.iter().for_each(|e| self.expr(e)),
            ExprKind::Yield(value) => {
                if let Some(e) = value {
                    self.expr(e);
                }
            }
            ExprKind::Number(_)
            | ExprKind::String(_)
            | ExprKind::Bool(_)
            | ExprKind::Null
            | ExprKind::This => {}
        }
    }
}

/// Where an identifier lives.
#[derive(Debug, Clone, Copy)]
enum Binding {
    Local(u16),
    /// The implicit `arguments` object of the running activation.
    Arguments,
    Undefined,
    /// Free name, resolved along the scope chain. Holds the string index.
    Name(u16),
}

struct LoopLabels {
    break_to: Label,
    continue_to: Label,
}

struct FunctionCompiler<'a> {
    options: &'a CompileOptions,
    source: &'a Arc<str>,
    name: String,
    kind: UnitKind,
    builder: BytecodeBuilder,
    vars: VariableTable,
    strings: IndexSet<Arc<str>>,
    /// Number constants keyed by bit pattern so `-0` and NaN survive.
    numbers: IndexSet<u64>,
    functions: Vec<Arc<CompiledUnit>>,
    try_regions: Vec<TryRegion>,
    try_depth: usize,
    max_try_depth: usize,
    loops: Vec<LoopLabels>,
    uses_arguments: bool,
}

impl<'a> FunctionCompiler<'a> {
    fn new(
        options: &'a CompileOptions,
        source: &'a Arc<str>,
        name: String,
        kind: UnitKind,
        vars: VariableTable,
    ) -> Self {
        Self {
            options,
            source,
            name,
            kind,
            builder: BytecodeBuilder::new(),
            vars,
            strings: IndexSet::new(),
            numbers: IndexSet::new(),
            functions: Vec::new(),
            try_regions: Vec::new(),
            try_depth: 0,
            max_try_depth: 0,
            loops: Vec::new(),
            uses_arguments: false,
        }
    }

    fn finish(
        self,
        needs_activation: bool,
        declared_names: Vec<String>,
    ) -> Result<Arc<CompiledUnit>, CompileError> {
        let assembled = self.builder.finish()?;
        log::debug!(
            "compiled `{}`: {} bytes, {} slots, activation: {needs_activation}",
            self.name,
            assembled.code.len(),
            self.vars.len()
        );
        Ok(Arc::new(CompiledUnit::new(UnitParts {
            name: self.name,
            kind: self.kind,
            code: assembled.code,
            strings: self.strings.into_iter().collect(),
            numbers: self.numbers.into_iter().map(f64::from_bits).collect(),
            functions: self.functions,
            param_count: self.vars.param_count(),
            slot_names: self.vars.names(),
            needs_activation,
            uses_arguments: self.uses_arguments,
            max_stack: assembled.max_stack,
            max_try_depth: self.max_try_depth,
            try_regions: self.try_regions,
            lines: assembled.lines,
            language_version: self.options.language_version,
            declared_names,
            source: Some(self.source.clone()),
            source_name: self.options.source_name.clone(),
        })))
    }

    // ── constant tables ────────────────────────────────────────────

    fn limit(&self, what: &'static str, limit: usize) -> CompileError {
        CompileError::Limit {
            what,
            unit: if self.name.is_empty() {
                "<script>".to_string()
            } else {
                self.name.clone()
            },
            limit,
        }
    }

    fn string(&mut self, text: &str) -> Result<u16, CompileError> {
        let index = match self.strings.get_index_of(text) {
            Some(index) => index,
            None => self.strings.insert_full(Arc::from(text)).0,
        };
        u16::try_from(index).map_err(|_| self.limit("string constants", MAX_INDEX))
    }

    fn number(&mut self, value: f64) -> Result<u16, CompileError> {
        let (index, _) = self.numbers.insert_full(value.to_bits());
        u16::try_from(index).map_err(|_| self.limit("number constants", MAX_INDEX))
    }

    fn slot(&self, name: &str) -> Result<u16, CompileError> {
        let index = self.vars.index_of(name).unwrap_or(usize::MAX);
        u16::try_from(index).map_err(|_| self.limit("variables", MAX_INDEX))
    }

    fn nested(&mut self, func: &Function) -> Result<u16, CompileError> {
        let unit = compile_function(func, self.options, self.source)?;
        self.functions.push(unit);
        u16::try_from(self.functions.len() - 1).map_err(|_| self.limit("nested functions", MAX_INDEX))
    }

    // ── bindings ───────────────────────────────────────────────────

    fn resolve(&mut self, name: &str) -> Result<Binding, CompileError> {
        if self.vars.index_of(name).is_some() {
            return self.slot(name).map(Binding::Local);
        }
        if self.kind == UnitKind::Function && name == "arguments" {
            return Ok(Binding::Arguments);
        }
        if name == "undefined" {
            return Ok(Binding::Undefined);
        }
        self.string(name).map(Binding::Name)
    }

    fn load(&mut self, binding: Binding) {
        self.builder.emit(match binding {
            Binding::Local(slot) => Instruction::GetLocal { slot },
            Binding::Arguments => Instruction::GetArguments,
            Binding::Undefined => Instruction::PushUndefined,
            Binding::Name(name) => Instruction::GetName { name },
        });
    }

    /// Store the top of stack, leaving it in place.
    fn store(&mut self, binding: Binding, name: &str) -> Result<(), CompileError> {
        let instr = match binding {
            Binding::Local(slot) => Instruction::SetLocal { slot },
            // Writes to the implicit bindings go through the scope chain.
            Binding::Arguments | Binding::Undefined => Instruction::SetName {
                name: self.string(name)?,
            },
            Binding::Name(name) => Instruction::SetName { name },
        };
        self.builder.emit(instr);
        Ok(())
    }

    fn hoist_functions(&mut self, functions: &[&Function]) -> Result<(), CompileError> {
        for func in functions {
            let Some(name) = &func.name else {
                continue;
            };
            self.builder.mark_line(func.span.start.line as u32);
            let index = self.nested(func)?;
            self.builder.emit(Instruction::Closure { func: index });
            let binding = self.resolve(name)?;
            self.store(binding, name)?;
            self.builder.emit(Instruction::Pop);
        }
        Ok(())
    }

    // ── statements ─────────────────────────────────────────────────

    fn statements(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        body.iter().try_for_each(|stmt| self.statement(stmt))
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        if !matches!(stmt.kind, StmtKind::Block(_) | StmtKind::FunctionDecl(_) | StmtKind::Empty) {
            self.builder.mark_line(stmt.line() as u32);
        }
        match &stmt.kind {
            StmtKind::Var(list) => self.var_decls(list),
            StmtKind::FunctionDecl(_) | StmtKind::Empty => Ok(()),
            StmtKind::Expr(e) => {
                self.expr(e)?;
                if self.kind == UnitKind::Script {
                    let slot = self.slot(RESULT_SLOT)?;
                    self.builder.emit(Instruction::SetLocal { slot });
                }
                self.builder.emit(Instruction::Pop);
                Ok(())
            }
            StmtKind::Return(value) => {
                if self.kind == UnitKind::Script {
                    return Err(CompileError::Unsupported {
                        message: "return outside of a function".to_string(),
                        line: stmt.line(),
                    });
                }
                match value {
                    Some(e) => self.expr(e)?,
                    None => self.builder.emit(Instruction::PushUndefined),
                }
                self.builder.emit(Instruction::Return);
                Ok(())
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                let otherwise = self.builder.new_label();
                let end = self.builder.new_label();
                self.expr(test)?;
                self.builder.jump_if_false(otherwise);
                self.statement(consequent)?;
                if let Some(alt) = alternate {
                    self.builder.jump(end);
                    self.builder.mark(otherwise)?;
                    self.statement(alt)?;
                } else {
                    self.builder.mark(otherwise)?;
                }
                self.builder.mark(end)?;
                Ok(())
            }
            StmtKind::While { test, body } => {
                let top = self.builder.new_label();
                let end = self.builder.new_label();
                self.builder.mark(top)?;
                self.expr(test)?;
                self.builder.jump_if_false(end);
                self.loop_body(body, end, top)?;
                self.builder.jump(top);
                self.builder.mark(end)?;
                Ok(())
            }
            StmtKind::DoWhile { body, test } => {
                let top = self.builder.new_label();
                let next = self.builder.new_label();
                let end = self.builder.new_label();
                self.builder.mark(top)?;
                self.loop_body(body, end, next)?;
                self.builder.mark(next)?;
                self.builder.mark_line(test.line() as u32);
                self.expr(test)?;
                self.builder.jump_if_true(top);
                self.builder.mark(end)?;
                Ok(())
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                match init {
                    Some(ForInit::Var(list)) => self.var_decls(list)?,
                    Some(ForInit::Expr(e)) => {
                        self.expr(e)?;
                        self.builder.emit(Instruction::Pop);
                    }
                    None => {}
                }
                let top = self.builder.new_label();
                let next = self.builder.new_label();
                let end = self.builder.new_label();
                self.builder.mark(top)?;
                if let Some(test) = test {
                    self.expr(test)?;
                    self.builder.jump_if_false(end);
                }
                self.loop_body(body, end, next)?;
                self.builder.mark(next)?;
                if let Some(update) = update {
                    self.expr(update)?;
                    self.builder.emit(Instruction::Pop);
                }
                self.builder.jump(top);
                self.builder.mark(end)?;
                Ok(())
            }
            StmtKind::Break | StmtKind::Continue => {
                let is_break = matches!(stmt.kind, StmtKind::Break);
                let Some(labels) = self.loops.last() else {
                    return Err(CompileError::Unsupported {
                        message: format!("{} outside of a loop", if is_break { "break" } else { "continue" }),
                        line: stmt.line(),
                    });
                };
                let target = if is_break { labels.break_to } else { labels.continue_to };
                self.builder.jump(target);
                Ok(())
            }
            StmtKind::Throw(e) => {
                self.expr(e)?;
                self.builder.emit(Instruction::Throw);
                Ok(())
            }
            StmtKind::Try {
                block,
                param,
                handler,
            } => self.try_catch(block, param, handler),
            StmtKind::Block(body) => self.statements(body),
        }
    }

    fn var_decls(&mut self, list: &[parser::VarDecl]) -> Result<(), CompileError> {
        for decl in list {
            let Some(init) = &decl.init else {
                continue;
            };
            self.expr(init)?;
            let binding = self.resolve(&decl.name)?;
            self.store(binding, &decl.name)?;
            self.builder.emit(Instruction::Pop);
        }
        Ok(())
    }

    fn loop_body(&mut self, body: &Stmt, break_to: Label, continue_to: Label) -> Result<(), CompileError> {
        self.loops.push(LoopLabels {
            break_to,
            continue_to,
        });
        let result = self.statement(body);
        self.loops.pop();
        result
    }

    fn try_catch(&mut self, block: &[Stmt], param: &str, handler: &[Stmt]) -> Result<(), CompileError> {
        let depth = self.builder.stack_depth();
        let after = self.builder.new_label();

        let start = self.builder.current_offset();
        self.try_depth += 1;
        self.max_try_depth = self.max_try_depth.max(self.try_depth);
        let body = self.statements(block);
        self.try_depth -= 1;
        body?;
        let end = self.builder.current_offset();
        self.builder.jump(after);

        // The unwinder pushes the thrown value on entry.
        let handler_pc = self.builder.current_offset();
        self.builder.set_stack_depth(depth + 1);
        let binding = self.resolve(param)?;
        self.store(binding, param)?;
        self.builder.emit(Instruction::Pop);
        self.statements(handler)?;
        self.builder.mark(after)?;

        self.try_regions.push(TryRegion {
            start,
            end,
            handler: handler_pc,
            stack_depth: depth,
        });
        Ok(())
    }

    // ── expressions ────────────────────────────────────────────────

    fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Number(n) => self.push_number(*n)?,
            ExprKind::String(s) => {
                let idx = self.string(s)?;
                self.builder.emit(Instruction::PushString { idx });
            }
            ExprKind::Bool(true) => self.builder.emit(Instruction::PushTrue),
            ExprKind::Bool(false) => self.builder.emit(Instruction::PushFalse),
            ExprKind::Null => self.builder.emit(Instruction::PushNull),
            ExprKind::This => self.builder.emit(Instruction::PushThis),
            ExprKind::Ident(name) => {
                let binding = self.resolve(name)?;
                self.load(binding);
            }
            ExprKind::Object(props) => {
                self.builder.emit(Instruction::NewObject);
                for (key, value) in props {
                    self.expr(value)?;
                    let name = self.string(key)?;
                    self.builder.emit(Instruction::InitProp { name });
                }
            }
            ExprKind::Function(func) => {
                let index = self.nested(func)?;
                self.builder.emit(Instruction::Closure { func: index });
            }
            ExprKind::Member { object, property } => {
                self.expr(object)?;
                let name = self.string(property)?;
                self.builder.emit(Instruction::GetProp { name });
            }
            ExprKind::Index { object, index } => {
                self.expr(object)?;
                self.expr(index)?;
                self.builder.emit(Instruction::GetElem);
            }
            ExprKind::Call { callee, args } => self.call(callee, args, expr.line())?,
            ExprKind::Unary { op, operand } => self.unary(*op, operand)?,
            ExprKind::Update { op, prefix, target } => self.update(*op, *prefix, target, expr.line())?,
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.builder.emit(binary_instruction(*op));
            }
            ExprKind::Logical { op, lhs, rhs } => {
                let end = self.builder.new_label();
                self.expr(lhs)?;
                self.builder.emit(Instruction::Dup);
                match op {
                    LogicalOp::And => self.builder.jump_if_false(end),
                    LogicalOp::Or => self.builder.jump_if_true(end),
                }
                self.builder.emit(Instruction::Pop);
                self.expr(rhs)?;
                self.builder.mark(end)?;
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let otherwise = self.builder.new_label();
                let end = self.builder.new_label();
                self.expr(test)?;
                self.builder.jump_if_false(otherwise);
                let depth = self.builder.stack_depth();
                self.expr(consequent)?;
                self.builder.jump(end);
                self.builder.mark(otherwise)?;
                self.builder.set_stack_depth(depth);
                self.expr(alternate)?;
                self.builder.mark(end)?;
            }
            ExprKind::Assign { op, target, value } => self.assign(*op, target, value, expr.line())?,
            ExprKind::Sequence(list) => {
                for (i, e) in list.iter().enumerate() {
                    if i > 0 {
                        self.builder.emit(Instruction::Pop);
                    }
                    self.expr(e)?;
                }
                if list.is_empty() {
                    self.builder.emit(Instruction::PushUndefined);
                }
            }
            ExprKind::Yield(value) => {
                match value {
                    Some(e) => self.expr(e)?,
                    None => self.builder.emit(Instruction::PushUndefined),
                }
                self.builder.emit(Instruction::Suspend);
            }
        }
        Ok(())
    }

    fn push_number(&mut self, n: f64) -> Result<(), CompileError> {
        let small = n.fract() == 0.0
            && n >= f64::from(i16::MIN)
            && n <= f64::from(i16::MAX)
            && !(n == 0.0 && n.is_sign_negative());
        if small {
            self.builder.emit(Instruction::PushSmi { value: n as i16 });
        } else {
            let idx = self.number(n)?;
            self.builder.emit(Instruction::PushNumber { idx });
        }
        Ok(())
    }

    fn call(&mut self, callee: &Expr, args: &[Expr], line: usize) -> Result<(), CompileError> {
        if args.len() > MAX_ARGS {
            return Err(self.limit("call arguments", MAX_ARGS));
        }
        match &callee.kind {
            ExprKind::Member { object, property } => {
                self.expr(object)?;
                self.builder.emit(Instruction::Dup);
                let name = self.string(property)?;
                self.builder.emit(Instruction::GetProp { name });
                self.builder.emit(Instruction::Swap);
            }
            ExprKind::Index { object, index } => {
                self.expr(object)?;
                self.builder.emit(Instruction::Dup);
                self.expr(index)?;
                self.builder.emit(Instruction::GetElem);
                self.builder.emit(Instruction::Swap);
            }
            _ => {
                self.expr(callee)?;
                self.builder.emit(Instruction::PushUndefined);
            }
        }
        for arg in args {
            self.expr(arg)?;
        }
        self.builder.mark_line(line as u32);
        self.builder.emit(Instruction::Call {
            argc: args.len() as u8,
        });
        Ok(())
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<(), CompileError> {
        match (op, &operand.kind) {
            (UnaryOp::TypeOf, ExprKind::Ident(name)) => match self.resolve(name)? {
                Binding::Name(name) => self.builder.emit(Instruction::TypeOfName { name }),
                binding => {
                    self.load(binding);
                    self.builder.emit(Instruction::TypeOf);
                }
            },
            (UnaryOp::Delete, ExprKind::Member { object, property }) => {
                self.expr(object)?;
                let name = self.string(property)?;
                self.builder.emit(Instruction::DeleteProp { name });
            }
            (UnaryOp::Delete, ExprKind::Index { object, index }) => {
                self.expr(object)?;
                self.expr(index)?;
                self.builder.emit(Instruction::DeleteElem);
            }
            // Variables are not deletable.
            (UnaryOp::Delete, ExprKind::Ident(_)) => self.builder.emit(Instruction::PushFalse),
            (UnaryOp::Delete, _) => {
                self.expr(operand)?;
                self.builder.emit(Instruction::Pop);
                self.builder.emit(Instruction::PushTrue);
            }
            (op, _) => {
                self.expr(operand)?;
                self.builder.emit(match op {
                    UnaryOp::Neg => Instruction::Neg,
                    UnaryOp::Plus => Instruction::Plus,
                    UnaryOp::Not => Instruction::Not,
                    UnaryOp::TypeOf | UnaryOp::Delete => Instruction::TypeOf,
                });
            }
        }
        Ok(())
    }

    fn update(&mut self, op: UpdateOp, prefix: bool, target: &Expr, line: usize) -> Result<(), CompileError> {
        let step = match op {
            UpdateOp::Increment => Instruction::Add,
            UpdateOp::Decrement => Instruction::Sub,
        };
        match &target.kind {
            ExprKind::Ident(name) => {
                let binding = self.resolve(name)?;
                self.load(binding);
                self.builder.emit(Instruction::Plus);
                if !prefix {
                    self.builder.emit(Instruction::Dup);
                }
                self.builder.emit(Instruction::PushSmi { value: 1 });
                self.builder.emit(step);
                self.store(binding, name)?;
                if !prefix {
                    self.builder.emit(Instruction::Pop);
                }
            }
            ExprKind::Member { object, property } => {
                let name = self.string(property)?;
                self.expr(object)?;
                self.builder.emit(Instruction::Dup);
                self.builder.emit(Instruction::GetProp { name });
                self.builder.emit(Instruction::Plus);
                if !prefix {
                    // obj old -> old obj old
                    self.builder.emit(Instruction::Dup);
                    self.builder.emit(Instruction::Insert { depth: 2 });
                }
                self.builder.emit(Instruction::PushSmi { value: 1 });
                self.builder.emit(step);
                self.builder.emit(Instruction::SetProp { name });
                if !prefix {
                    self.builder.emit(Instruction::Pop);
                }
            }
            ExprKind::Index { object, index } => {
                self.expr(object)?;
                self.expr(index)?;
                self.builder.emit(Instruction::Dup2);
                self.builder.emit(Instruction::GetElem);
                self.builder.emit(Instruction::Plus);
                if !prefix {
                    self.builder.emit(Instruction::Dup);
                    self.builder.emit(Instruction::Insert { depth: 3 });
                }
                self.builder.emit(Instruction::PushSmi { value: 1 });
                self.builder.emit(step);
                self.builder.emit(Instruction::SetElem);
                if !prefix {
                    self.builder.emit(Instruction::Pop);
                }
            }
            _ => return Err(invalid_target(line)),
        }
        Ok(())
    }

    fn assign(&mut self, op: Option<BinaryOp>, target: &Expr, value: &Expr, line: usize) -> Result<(), CompileError> {
        match &target.kind {
            ExprKind::Ident(name) => {
                let binding = self.resolve(name)?;
                if let Some(op) = op {
                    self.load(binding);
                    self.expr(value)?;
                    self.builder.emit(binary_instruction(op));
                } else {
                    self.expr(value)?;
                }
                self.store(binding, name)?;
            }
            ExprKind::Member { object, property } => {
                let name = self.string(property)?;
                self.expr(object)?;
                if let Some(op) = op {
                    self.builder.emit(Instruction::Dup);
                    self.builder.emit(Instruction::GetProp { name });
                    self.expr(value)?;
                    self.builder.emit(binary_instruction(op));
                } else {
                    self.expr(value)?;
                }
                self.builder.emit(Instruction::SetProp { name });
            }
            ExprKind::Index { object, index } => {
                self.expr(object)?;
                self.expr(index)?;
                if let Some(op) = op {
                    self.builder.emit(Instruction::Dup2);
                    self.builder.emit(Instruction::GetElem);
                    self.expr(value)?;
                    self.builder.emit(binary_instruction(op));
                } else {
                    self.expr(value)?;
                }
                self.builder.emit(Instruction::SetElem);
            }
            _ => return Err(invalid_target(line)),
        }
        Ok(())
    }
}

fn invalid_target(line: usize) -> CompileError {
    CompileError::Unsupported {
        message: "invalid assignment target".to_string(),
        line,
    }
}

fn binary_instruction(op: BinaryOp) -> Instruction {
    match op {
        BinaryOp::Add => Instruction::Add,
        BinaryOp::Sub => Instruction::Sub,
        BinaryOp::Mul => Instruction::Mul,
        BinaryOp::Div => Instruction::Div,
        BinaryOp::Mod => Instruction::Mod,
        BinaryOp::Eq => Instruction::Eq,
        BinaryOp::Ne => Instruction::Ne,
        BinaryOp::StrictEq => Instruction::StrictEq,
        BinaryOp::StrictNe => Instruction::StrictNe,
        BinaryOp::Lt => Instruction::Lt,
        BinaryOp::Le => Instruction::Le,
        BinaryOp::Gt => Instruction::Gt,
        BinaryOp::Ge => Instruction::Ge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode::{BytecodeDecoder, LanguageVersion};

    fn script(source: &str) -> Arc<CompiledUnit> {
        compile(source, &CompileOptions::default()).unwrap()
    }

    fn instructions(unit: &CompiledUnit) -> Vec<Instruction> {
        BytecodeDecoder::new(&unit.code())
            .map(|r| r.unwrap().1)
            .filter(|i| !matches!(i, Instruction::Line { .. }))
            .collect()
    }

    #[test]
    fn script_declarations_bind_on_the_scope() {
        let unit = script("var a = 1, b\nfunction f() {}\ntry {} catch (e) {}");
        assert_eq!(unit.declared_names, ["a", "b", "e", "f"]);
        assert_eq!(unit.slot_names, [RESULT_SLOT]);
        assert!(!unit.needs_activation);
        assert_eq!(unit.functions.len(), 1);
    }

    #[test]
    fn function_slots_follow_declaration_order() {
        let unit = script("function f(a, b) { var c = a; function g() {} try {} catch (e) {} }");
        let f = &unit.functions[0];
        assert_eq!(f.param_count, 2);
        assert_eq!(f.slot_names, ["a", "b", "c", "e", "g"]);
        assert!(f.needs_activation);
        assert!(!f.uses_arguments);
        assert_eq!(f.max_try_depth, 1);
    }

    #[test]
    fn leaf_functions_run_without_an_activation() {
        let unit = script("function f(x) { return x * 2 }");
        assert!(!unit.functions[0].needs_activation);

        let options = CompileOptions {
            force_activation: true,
            ..CompileOptions::default()
        };
        let forced = compile("function f(x) { return x * 2 }", &options).unwrap();
        assert!(forced.functions[0].needs_activation);
    }

    #[test]
    fn arguments_use_requires_an_activation() {
        let unit = script("function f(a) { return arguments[0] }");
        let f = &unit.functions[0];
        assert!(f.uses_arguments && f.needs_activation);
        assert!(instructions(f).contains(&Instruction::GetArguments));

        let shadowed = script("function f(arguments) { return arguments }");
        assert!(!shadowed.functions[0].uses_arguments);
    }

    #[test]
    fn member_calls_pass_the_receiver() {
        let unit = script("o.m(1)");
        let code = instructions(&unit);
        assert_eq!(
            &code[..6],
            &[
                Instruction::GetName { name: 0 },
                Instruction::Dup,
                Instruction::GetProp { name: 1 },
                Instruction::Swap,
                Instruction::PushSmi { value: 1 },
                Instruction::Call { argc: 1 },
            ]
        );
    }

    #[test]
    fn constants_are_deduplicated() {
        let unit = script("x = 'a' + 'a' + 1.5 + 1.5 + -0 + 70000");
        assert_eq!(unit.strings.iter().filter(|s| &***s == "a").count(), 1);
        assert_eq!(unit.numbers.len(), 2);
        assert!(unit.numbers.contains(&1.5));
        assert!(unit.numbers.contains(&70000.0));
    }

    #[test]
    fn try_regions_are_innermost_first() {
        let unit = script("try { try { throw 1 } catch (a) {} } catch (b) {}");
        assert_eq!(unit.try_regions.len(), 2);
        let (inner, outer) = (unit.try_regions[0], unit.try_regions[1]);
        assert!(outer.start <= inner.start && inner.end <= outer.end);
        assert_eq!(unit.max_try_depth, 2);
    }

    #[test]
    fn statements_carry_line_markers() {
        let unit = script("var a = 1\n\nvar b = 2");
        assert_eq!(unit.lines.lines(), [1, 3]);
        assert!(unit.set_breakpoint(3, true));
    }

    #[test]
    fn units_inherit_the_language_version() {
        let options = CompileOptions {
            language_version: LanguageVersion::V1_2,
            ..CompileOptions::default()
        };
        let unit = compile("function f() {}", &options).unwrap();
        assert_eq!(unit.functions[0].language_version, LanguageVersion::V1_2);
    }

    #[test]
    fn rejects_what_the_generator_cannot_express() {
        assert!(matches!(
            compile("f() = 1", &CompileOptions::default()),
            Err(CompileError::Unsupported { .. }) | Err(CompileError::Parse(_))
        ));
        assert!(matches!(
            compile("while (1) {}\nbreak", &CompileOptions::default()),
            Err(CompileError::Parse(_))
        ));
        let args = vec!["0"; 300].join(", ");
        assert!(matches!(
            compile(&format!("f({args})"), &CompileOptions::default()),
            Err(CompileError::Limit { limit: 255, .. })
        ));
    }
}
