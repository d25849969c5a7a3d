use crate::ast::{
    Class, Expression, KeywordLiteral, Operator, Statement, Subroutine, SubroutineCall,
    SubroutineKind, Term, UnaryOp, VarType,
};
use crate::error::{CompileResult, SemanticError, UnresolvedSymbolError};
use crate::symbols::{Scope, ScopeChain, Symbol, SymbolTable};
use crate::vm::{self, Instruction, Segment};
use indexmap::IndexMap;

/// Compile one class into VM instruction text. Deterministic: the same
/// class value always renders byte-identical output.
pub fn compile(class: &Class) -> CompileResult<String> {
    let ctx = ClassContext {
        class,
        statics: class_table(&class.statics, Scope::Static),
        fields: class_table(&class.fields, Scope::Field),
        empty_fields: SymbolTable::empty(Scope::Field),
    };
    let mut labels = LabelAllocator::default();
    let mut out = Vec::new();
    for subroutine in class.subroutines.values() {
        compile_subroutine(&ctx, subroutine, &mut labels, &mut out)?;
    }
    Ok(vm::render(&out))
}

struct ClassContext<'a> {
    class: &'a Class,
    statics: SymbolTable,
    fields: SymbolTable,
    /// Stands in for the field table inside functions, which must not see
    /// instance state.
    empty_fields: SymbolTable,
}

/// Label ids for the whole class. Sharing the counters across subroutines
/// keeps every emitted label unique within one compilation unit.
#[derive(Default)]
struct LabelAllocator {
    whiles: u16,
    ifs: u16,
}

impl LabelAllocator {
    fn next_while(&mut self) -> u16 {
        let id = self.whiles;
        self.whiles += 1;
        id
    }

    fn next_if(&mut self) -> u16 {
        let id = self.ifs;
        self.ifs += 1;
        id
    }
}

fn class_table(vars: &IndexMap<String, VarType>, scope: Scope) -> SymbolTable {
    SymbolTable::build(
        vars.iter()
            .map(|(name, ty)| (name.clone(), ty.name().to_string())),
        scope,
    )
}

fn compile_subroutine(
    ctx: &ClassContext,
    subroutine: &Subroutine,
    labels: &mut LabelAllocator,
    out: &mut Vec<Instruction>,
) -> CompileResult<()> {
    out.push(Instruction::Function {
        class: ctx.class.name.clone(),
        name: subroutine.name.clone(),
        locals: subroutine.locals.len() as u16,
    });

    let parameters = subroutine
        .parameters
        .iter()
        .map(|parameter| (parameter.name.clone(), parameter.ty.name().to_string()));
    let arguments = match subroutine.kind {
        // The receiver occupies argument 0; declared parameters shift by one.
        SubroutineKind::Method => {
            let receiver = ("this".to_string(), ctx.class.name.clone());
            SymbolTable::build(std::iter::once(receiver).chain(parameters), Scope::Argument)
        }
        _ => SymbolTable::build(parameters, Scope::Argument),
    };
    let locals = SymbolTable::build(
        subroutine
            .locals
            .iter()
            .map(|(name, ty)| (name.clone(), ty.name().to_string())),
        Scope::Local,
    );
    let fields = match subroutine.kind {
        SubroutineKind::Function => &ctx.empty_fields,
        _ => &ctx.fields,
    };

    match subroutine.kind {
        SubroutineKind::Constructor => {
            out.push(Instruction::Push(
                Segment::Constant,
                ctx.class.fields.len() as u16,
            ));
            out.push(call("Memory", "alloc", 1));
            out.push(Instruction::Pop(Segment::Pointer, 0));
        }
        SubroutineKind::Method => {
            out.push(Instruction::Push(Segment::Argument, 0));
            out.push(Instruction::Pop(Segment::Pointer, 0));
        }
        SubroutineKind::Function => {}
    }

    let scopes = ScopeChain::new(&arguments, &locals, fields, &ctx.statics);
    for statement in &subroutine.body {
        compile_statement(ctx, &scopes, labels, statement, out)?;
    }
    Ok(())
}

fn compile_statement(
    ctx: &ClassContext,
    scopes: &ScopeChain,
    labels: &mut LabelAllocator,
    statement: &Statement,
    out: &mut Vec<Instruction>,
) -> CompileResult<()> {
    match statement {
        Statement::Let {
            name,
            index: None,
            value,
        } => {
            let (segment, index) = assign_target(ctx, scopes, name)?;
            compile_expression(ctx, scopes, value, out)?;
            out.push(Instruction::Pop(segment, index));
        }
        Statement::Let {
            name,
            index: Some(element),
            value,
        } => {
            let (segment, index) = assign_target(ctx, scopes, name)?;
            out.push(Instruction::Push(segment, index));
            compile_expression(ctx, scopes, element, out)?;
            out.push(Instruction::Add);
            compile_expression(ctx, scopes, value, out)?;
            // Park the value in temp while the address moves into pointer 1,
            // then write it through `that`.
            out.push(Instruction::Pop(Segment::Temp, 0));
            out.push(Instruction::Pop(Segment::Pointer, 1));
            out.push(Instruction::Push(Segment::Temp, 0));
            out.push(Instruction::Pop(Segment::That, 0));
        }
        Statement::Return(value) => {
            match value {
                Some(expression) => compile_expression(ctx, scopes, expression, out)?,
                // The caller always pops one value.
                None => out.push(Instruction::Push(Segment::Constant, 0)),
            }
            out.push(Instruction::Return);
        }
        Statement::While { condition, body } => {
            let label = format!("while.{}", labels.next_while());
            out.push(Instruction::Label(format!("{label}.start")));
            compile_expression(ctx, scopes, condition, out)?;
            out.push(Instruction::IfGoto(format!("{label}.block")));
            out.push(Instruction::Goto(format!("{label}.end")));
            out.push(Instruction::Label(format!("{label}.block")));
            for statement in body {
                compile_statement(ctx, scopes, labels, statement, out)?;
            }
            out.push(Instruction::Goto(format!("{label}.start")));
            out.push(Instruction::Label(format!("{label}.end")));
        }
        Statement::If {
            condition,
            then_body,
            else_body,
        } => {
            let id = labels.next_if();
            compile_expression(ctx, scopes, condition, out)?;
            out.push(Instruction::IfGoto(format!("if-true.{id}")));
            out.push(Instruction::Goto(format!("if-not.{id}")));
            out.push(Instruction::Label(format!("if-true.{id}")));
            for statement in then_body {
                compile_statement(ctx, scopes, labels, statement, out)?;
            }
            out.push(Instruction::Goto(format!("if-end.{id}")));
            out.push(Instruction::Label(format!("if-not.{id}")));
            if let Some(else_body) = else_body {
                for statement in else_body {
                    compile_statement(ctx, scopes, labels, statement, out)?;
                }
            }
            out.push(Instruction::Label(format!("if-end.{id}")));
        }
        Statement::Do(subroutine_call) => {
            compile_call(ctx, scopes, subroutine_call, out)?;
            // The call is for effect only; discard its return value.
            out.push(Instruction::Pop(Segment::Temp, 0));
        }
    }
    Ok(())
}

/// An expression chain compiles the leftmost term, then the entire rest of
/// the chain, and applies the leftmost operator last. Chained
/// non-associative operators therefore evaluate right to left.
fn compile_expression(
    ctx: &ClassContext,
    scopes: &ScopeChain,
    expression: &Expression,
    out: &mut Vec<Instruction>,
) -> CompileResult<()> {
    compile_term(ctx, scopes, &expression.term, out)?;
    if let Some((op, rest)) = &expression.continuation {
        compile_expression(ctx, scopes, rest, out)?;
        out.push(operator_instruction(*op));
    }
    Ok(())
}

fn operator_instruction(op: Operator) -> Instruction {
    match op {
        Operator::Plus => Instruction::Add,
        Operator::Minus => Instruction::Sub,
        Operator::Times => call("Math", "multiply", 2),
        Operator::DividedBy => call("Math", "divide", 2),
        Operator::And => Instruction::And,
        Operator::Or => Instruction::Or,
        Operator::LessThan => Instruction::Lt,
        Operator::GreaterThan => Instruction::Gt,
        Operator::Equals => Instruction::Eq,
    }
}

fn compile_term(
    ctx: &ClassContext,
    scopes: &ScopeChain,
    term: &Term,
    out: &mut Vec<Instruction>,
) -> CompileResult<()> {
    match term {
        Term::IntegerConstant(value) => out.push(Instruction::Push(Segment::Constant, *value)),
        Term::StringConstant(text) => {
            out.push(Instruction::Push(
                Segment::Constant,
                text.chars().count() as u16,
            ));
            out.push(call("String", "new", 1));
            for c in text.chars() {
                out.push(Instruction::Push(Segment::Constant, c as u16));
                out.push(call("String", "appendChar", 2));
            }
        }
        Term::KeywordLiteral(literal) => match literal {
            KeywordLiteral::True => {
                out.push(Instruction::Push(Segment::Constant, 0));
                out.push(Instruction::Not);
            }
            KeywordLiteral::False | KeywordLiteral::Null => {
                out.push(Instruction::Push(Segment::Constant, 0));
            }
            KeywordLiteral::This => out.push(Instruction::Push(Segment::Pointer, 0)),
        },
        Term::Var { name, index: None } => {
            let symbol = resolve(scopes, name)?;
            out.push(Instruction::Push(symbol.scope.segment(), symbol.index));
        }
        Term::Var {
            name,
            index: Some(element),
        } => {
            let symbol = resolve(scopes, name)?;
            out.push(Instruction::Push(symbol.scope.segment(), symbol.index));
            compile_expression(ctx, scopes, element, out)?;
            out.push(Instruction::Add);
            out.push(Instruction::Pop(Segment::Pointer, 1));
            out.push(Instruction::Push(Segment::That, 0));
        }
        Term::Parenthesized(expression) => compile_expression(ctx, scopes, expression, out)?,
        Term::Unary { op, term } => {
            compile_term(ctx, scopes, term, out)?;
            out.push(match op {
                UnaryOp::Not => Instruction::Not,
                UnaryOp::Negative => Instruction::Neg,
            });
        }
        Term::Call(subroutine_call) => compile_call(ctx, scopes, subroutine_call, out)?,
    }
    Ok(())
}

fn compile_call(
    ctx: &ClassContext,
    scopes: &ScopeChain,
    subroutine_call: &SubroutineCall,
    out: &mut Vec<Instruction>,
) -> CompileResult<()> {
    let argument_count = subroutine_call.arguments.len() as u16;
    match &subroutine_call.target {
        // A call within the current class. Methods get the current receiver
        // passed along implicitly.
        None => {
            let callee = ctx
                .class
                .subroutines
                .get(&subroutine_call.name)
                .ok_or_else(|| UnresolvedSymbolError {
                    name: subroutine_call.name.clone(),
                })?;
            let receiver = matches!(callee.kind, SubroutineKind::Method);
            if receiver {
                out.push(Instruction::Push(Segment::Pointer, 0));
            }
            compile_arguments(ctx, scopes, subroutine_call, out)?;
            out.push(call(
                &ctx.class.name,
                &subroutine_call.name,
                argument_count + u16::from(receiver),
            ));
        }
        Some(target) => match scopes.resolve(target) {
            // The target is a variable: a method call on that object, whose
            // declared type names the callee's class.
            Some(symbol) => {
                let class = symbol.ty.clone();
                out.push(Instruction::Push(symbol.scope.segment(), symbol.index));
                compile_arguments(ctx, scopes, subroutine_call, out)?;
                out.push(call(&class, &subroutine_call.name, argument_count + 1));
            }
            // Otherwise the target is taken literally as a class name.
            None => {
                compile_arguments(ctx, scopes, subroutine_call, out)?;
                out.push(call(target, &subroutine_call.name, argument_count));
            }
        },
    }
    Ok(())
}

fn compile_arguments(
    ctx: &ClassContext,
    scopes: &ScopeChain,
    subroutine_call: &SubroutineCall,
    out: &mut Vec<Instruction>,
) -> CompileResult<()> {
    for argument in &subroutine_call.arguments {
        compile_expression(ctx, scopes, argument, out)?;
    }
    Ok(())
}

fn resolve<'s>(scopes: &'s ScopeChain, name: &str) -> CompileResult<&'s Symbol> {
    scopes.resolve(name).ok_or_else(|| {
        UnresolvedSymbolError {
            name: name.to_string(),
        }
        .into()
    })
}

fn assign_target(
    ctx: &ClassContext,
    scopes: &ScopeChain,
    name: &str,
) -> CompileResult<(Segment, u16)> {
    match scopes.resolve(name) {
        Some(symbol) => Ok((symbol.scope.segment(), symbol.index)),
        None if ctx.class.subroutines.contains_key(name) => {
            Err(SemanticError::AssignToSubroutine {
                name: name.to_string(),
            }
            .into())
        }
        None => Err(UnresolvedSymbolError {
            name: name.to_string(),
        }
        .into()),
    }
}

fn call(class: &str, name: &str, args: u16) -> Instruction {
    Instruction::Call {
        class: class.to_string(),
        name: name.to_string(),
        args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;
    use crate::parser;
    use crate::tokenizer::Tokenizer;
    use indoc::indoc;

    fn compile_source(source: &str) -> CompileResult<String> {
        let mut tokens = Tokenizer::new(source);
        let class = parser::parse(&mut tokens)?;
        compile(&class)
    }

    #[test]
    fn compiles_the_seven_program() {
        let source = indoc! {"
            class Main {
                function void main() {
                    do Output.printInt(1 + (2 * 3));
                    return;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        let expected = indoc! {"
            function Main.main 0
            push constant 1
            push constant 2
            push constant 3
            call Math.multiply 2
            add
            call Output.printInt 1
            pop temp 0
            push constant 0
            return"};
        assert_eq!(output, expected);
    }

    #[test]
    fn compiling_twice_is_byte_identical() {
        let source = indoc! {"
            class Main {
                static int seed;
                function int next() {
                    let seed = seed + 1;
                    return seed;
                }
            }
        "};
        let mut tokens = Tokenizer::new(source);
        let class = parser::parse(&mut tokens).expect("parse failed");
        let first = compile(&class).expect("compile failed");
        let second = compile(&class).expect("compile failed");
        assert_eq!(first, second);
    }

    #[test]
    fn chained_subtraction_evaluates_right_to_left() {
        let source = indoc! {"
            class Main {
                function int f() {
                    return 1 - 2 - 3;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        let expected = indoc! {"
            function Main.f 0
            push constant 1
            push constant 2
            push constant 3
            sub
            sub
            return"};
        assert_eq!(output, expected);
    }

    #[test]
    fn locals_shadow_fields() {
        let source = indoc! {"
            class Counter {
                field int x;
                method int bump() {
                    var int x;
                    let x = 1;
                    return x;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        // The local wins: assignments and reads go to local 0, never this 0.
        assert!(output.contains("pop local 0"));
        assert!(!output.contains("pop this 0"));
    }

    #[test]
    fn functions_cannot_see_fields() {
        let source = indoc! {"
            class Counter {
                field int x;
                function int read() {
                    return x;
                }
            }
        "};
        let error = compile_source(source).expect_err("compile should fail");
        assert_eq!(
            error,
            CompileError::UnresolvedSymbol(UnresolvedSymbolError {
                name: "x".to_string()
            })
        );
    }

    #[test]
    fn methods_can_see_fields_behind_the_receiver() {
        let source = indoc! {"
            class Counter {
                field int count;
                method int read(int offset) {
                    return count + offset;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        let expected = indoc! {"
            function Counter.read 0
            push argument 0
            pop pointer 0
            push this 0
            push argument 1
            add
            return"};
        assert_eq!(output, expected);
    }

    #[test]
    fn constructors_allocate_by_field_count() {
        let source = indoc! {"
            class Point {
                field int x, y;
                constructor Point new(int ax, int ay) {
                    let x = ax;
                    let y = ay;
                    return this;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        let expected = indoc! {"
            function Point.new 0
            push constant 2
            call Memory.alloc 1
            pop pointer 0
            push argument 0
            pop this 0
            push argument 1
            pop this 1
            push pointer 0
            return"};
        assert_eq!(output, expected);
    }

    #[test]
    fn indexed_assignment_parks_the_value_in_temp() {
        let source = indoc! {"
            class Main {
                function void fill() {
                    var Array arr;
                    let arr[0] = 0;
                    return;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        let expected = indoc! {"
            function Main.fill 1
            push local 0
            push constant 0
            add
            push constant 0
            pop temp 0
            pop pointer 1
            push temp 0
            pop that 0
            push constant 0
            return"};
        assert_eq!(output, expected);
    }

    #[test]
    fn indexed_reads_dereference_through_that() {
        let source = indoc! {"
            class Main {
                function int first(Array arr) {
                    return arr[0];
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        let expected = indoc! {"
            function Main.first 0
            push argument 0
            push constant 0
            add
            pop pointer 1
            push that 0
            return"};
        assert_eq!(output, expected);
    }

    #[test]
    fn while_loops_emit_unique_start_block_end_labels() {
        let source = indoc! {"
            class Main {
                function void spin() {
                    while (true) {
                        while (false) {
                            return;
                        }
                    }
                    return;
                }
                function void again() {
                    while (true) {
                        return;
                    }
                    return;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        let labels: Vec<&str> = output
            .lines()
            .filter_map(|line| line.strip_prefix("label "))
            .collect();
        let mut unique = labels.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(labels.len(), unique.len(), "duplicate labels in {output}");
        assert!(output.contains("label while.0.start"));
        assert!(output.contains("label while.1.start"));
        assert!(output.contains("label while.2.start"));
    }

    #[test]
    fn if_else_lowers_to_true_not_end_labels() {
        let source = indoc! {"
            class Main {
                function int pick(boolean flag) {
                    if (flag) {
                        return 1;
                    } else {
                        return 2;
                    }
                    return 0;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        let expected = indoc! {"
            function Main.pick 0
            push argument 0
            if-goto if-true.0
            goto if-not.0
            label if-true.0
            push constant 1
            return
            goto if-end.0
            label if-not.0
            push constant 2
            return
            label if-end.0
            push constant 0
            return"};
        assert_eq!(output, expected);
    }

    #[test]
    fn unqualified_method_calls_pass_the_receiver() {
        let source = indoc! {"
            class Counter {
                field int count;
                method void reset() {
                    let count = 0;
                    return;
                }
                method void clear() {
                    do reset();
                    return;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        assert!(output.contains("push pointer 0\ncall Counter.reset 1\npop temp 0"));
    }

    #[test]
    fn unqualified_function_calls_pass_no_receiver() {
        let source = indoc! {"
            class Main {
                function int one() {
                    return 1;
                }
                function int two() {
                    return one() + one();
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        assert!(output.contains("call Main.one 0"));
        assert!(!output.contains("push pointer 0"));
    }

    #[test]
    fn qualified_calls_through_a_variable_use_its_declared_class() {
        let source = indoc! {"
            class Main {
                function void run(Square square) {
                    do square.draw(1, 2);
                    return;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        let expected = indoc! {"
            function Main.run 0
            push argument 0
            push constant 1
            push constant 2
            call Square.draw 3
            pop temp 0
            push constant 0
            return"};
        assert_eq!(output, expected);
    }

    #[test]
    fn qualified_calls_to_unknown_names_are_static_calls() {
        let source = indoc! {"
            class Main {
                function void log() {
                    do Output.printInt(7);
                    return;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        assert!(output.contains("call Output.printInt 1"));
    }

    #[test]
    fn string_constants_build_and_append() {
        let source = indoc! {"
            class Main {
                function void greet() {
                    do Output.printString(\"Hi\");
                    return;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        let expected = indoc! {"
            function Main.greet 0
            push constant 2
            call String.new 1
            push constant 72
            call String.appendChar 2
            push constant 105
            call String.appendChar 2
            call Output.printString 1
            pop temp 0
            push constant 0
            return"};
        assert_eq!(output, expected);
    }

    #[test]
    fn keyword_literals_lower_to_their_constants() {
        let source = indoc! {"
            class Thing {
                field int x;
                method Thing pair(boolean a, int b) {
                    if (a = true) {
                        return this;
                    }
                    if (b = null) {
                        return null;
                    }
                    return this;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        assert!(output.contains("push constant 0\nnot\neq"));
        assert!(output.contains("push pointer 0\nreturn"));
    }

    #[test]
    fn assignment_to_a_subroutine_name_is_rejected() {
        let source = indoc! {"
            class Main {
                function void f() {
                    let f = 1;
                    return;
                }
            }
        "};
        let error = compile_source(source).expect_err("compile should fail");
        assert_eq!(
            error,
            CompileError::Semantic(SemanticError::AssignToSubroutine {
                name: "f".to_string()
            })
        );
    }

    #[test]
    fn unknown_unqualified_callees_are_unresolved() {
        let source = indoc! {"
            class Main {
                function void f() {
                    do missing();
                    return;
                }
            }
        "};
        let error = compile_source(source).expect_err("compile should fail");
        assert_eq!(
            error,
            CompileError::UnresolvedSymbol(UnresolvedSymbolError {
                name: "missing".to_string()
            })
        );
    }

    #[test]
    fn duplicate_subroutine_names_keep_the_last_definition() {
        let source = indoc! {"
            class Main {
                function int f() {
                    return 1;
                }
                function int f() {
                    return 2;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        let expected = indoc! {"
            function Main.f 0
            push constant 2
            return"};
        assert_eq!(output, expected);
    }

    #[test]
    fn statics_compile_to_the_static_segment() {
        let source = indoc! {"
            class Main {
                static int seed;
                function void set(int value) {
                    let seed = value;
                    return;
                }
            }
        "};
        let output = compile_source(source).expect("compile failed");
        assert!(output.contains("pop static 0"));
    }
}
