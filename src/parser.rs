use indexmap::IndexMap;

use crate::ast::{
    Class, Expression, KeywordLiteral, Operator, Parameter, ReturnType, Statement, Subroutine,
    SubroutineCall, SubroutineKind, Term, UnaryOp, VarType,
};
use crate::error::{CompileError, CompileResult, SemanticError, SyntaxError};
use crate::token::{Keyword, Sym, Token};
use crate::tokenizer::Tokenizer;

/// Parse one class declaration from the token stream. Each nonterminal
/// below is a sub-parser returning `Ok(None)` when it does not match (with
/// nothing consumed), so callers can try the next alternative in order.
pub fn parse(tokens: &mut Tokenizer) -> CompileResult<Class> {
    match tokens.advance()? {
        Token::Keyword(Keyword::Class) => parse_class(tokens),
        token => Err(unexpected("the 'class' keyword", token)),
    }
}

fn parse_class(tokens: &mut Tokenizer) -> CompileResult<Class> {
    let name = expect_identifier(tokens, "a class name")?;
    expect_symbol(tokens, Sym::OpenBrace)?;
    let (statics, fields) = parse_class_var_decs(tokens)?;
    let subroutines = parse_subroutine_decs(tokens)?;
    expect_symbol(tokens, Sym::CloseBrace)?;
    Ok(Class {
        name,
        statics,
        fields,
        subroutines,
    })
}

enum ClassVarScope {
    Static,
    Field,
}

type VarMap = IndexMap<String, VarType>;

fn parse_class_var_decs(tokens: &mut Tokenizer) -> CompileResult<(VarMap, VarMap)> {
    let mut statics = IndexMap::new();
    let mut fields = IndexMap::new();
    while let Some((scope, ty, names)) = parse_class_var_dec(tokens)? {
        let target = match scope {
            ClassVarScope::Static => &mut statics,
            ClassVarScope::Field => &mut fields,
        };
        for name in names {
            target.insert(name, ty.clone());
        }
    }
    Ok((statics, fields))
}

fn parse_class_var_dec(
    tokens: &mut Tokenizer,
) -> CompileResult<Option<(ClassVarScope, VarType, Vec<String>)>> {
    if !tokens.has_next() {
        return Ok(None);
    }
    let scope = match tokens.peek()? {
        Token::Keyword(Keyword::Static) => ClassVarScope::Static,
        Token::Keyword(Keyword::Field) => ClassVarScope::Field,
        _ => return Ok(None),
    };
    tokens.advance()?;
    let (ty, names) = parse_var_type_and_names(tokens)?;
    Ok(Some((scope, ty, names)))
}

fn parse_var_type_and_names(tokens: &mut Tokenizer) -> CompileResult<(VarType, Vec<String>)> {
    let ty = parse_var_type(tokens)?;
    let mut names = Vec::new();
    loop {
        names.push(expect_identifier(tokens, "a variable name")?);
        match tokens.advance()? {
            Token::Sym(Sym::Comma) => continue,
            Token::Sym(Sym::Semicolon) => break,
            token => return Err(unexpected("',' or ';'", token)),
        }
    }
    Ok((ty, names))
}

fn parse_type(tokens: &mut Tokenizer) -> CompileResult<ReturnType> {
    match tokens.advance()? {
        Token::Keyword(Keyword::Void) => Ok(ReturnType::Void),
        Token::Keyword(Keyword::Int) => Ok(ReturnType::Of(VarType::Int)),
        Token::Keyword(Keyword::Char) => Ok(ReturnType::Of(VarType::Char)),
        Token::Keyword(Keyword::Boolean) => Ok(ReturnType::Of(VarType::Boolean)),
        Token::Identifier(name) => Ok(ReturnType::Of(VarType::ClassName(name))),
        token => Err(unexpected("a type", token)),
    }
}

fn parse_var_type(tokens: &mut Tokenizer) -> CompileResult<VarType> {
    match parse_type(tokens)? {
        ReturnType::Void => Err(SemanticError::VoidVariable.into()),
        ReturnType::Of(ty) => Ok(ty),
    }
}

fn parse_subroutine_decs(tokens: &mut Tokenizer) -> CompileResult<IndexMap<String, Subroutine>> {
    let mut subroutines = IndexMap::new();
    while let Some(subroutine) = parse_subroutine_dec(tokens)? {
        subroutines.insert(subroutine.name.clone(), subroutine);
    }
    Ok(subroutines)
}

fn parse_subroutine_dec(tokens: &mut Tokenizer) -> CompileResult<Option<Subroutine>> {
    if !tokens.has_next() {
        return Ok(None);
    }
    let kind = match tokens.peek()? {
        Token::Keyword(Keyword::Function) => SubroutineKind::Function,
        Token::Keyword(Keyword::Method) => SubroutineKind::Method,
        Token::Keyword(Keyword::Constructor) => SubroutineKind::Constructor,
        _ => return Ok(None),
    };
    tokens.advance()?;
    let return_type = parse_type(tokens)?;
    let name = expect_identifier(tokens, "a subroutine name")?;
    let parameters = parse_parameter_list(tokens)?;
    expect_symbol(tokens, Sym::OpenBrace)?;
    let locals = parse_local_var_decs(tokens)?;
    let body = parse_statements(tokens)?;
    // The body must end by returning to the caller; nested blocks are free
    // to fall through, so the check lives here and not in parse_statements.
    if !matches!(body.last(), Some(Statement::Return(_))) {
        return Err(SyntaxError::MissingReturn { subroutine: name }.into());
    }
    expect_symbol(tokens, Sym::CloseBrace)?;
    Ok(Some(Subroutine {
        kind,
        name,
        return_type,
        parameters,
        locals,
        body,
    }))
}

fn parse_parameter_list(tokens: &mut Tokenizer) -> CompileResult<Vec<Parameter>> {
    expect_symbol(tokens, Sym::OpenParen)?;
    let mut parameters = Vec::new();
    if !matches!(tokens.peek()?, Token::Sym(Sym::CloseParen)) {
        loop {
            let ty = parse_var_type(tokens)?;
            let name = expect_identifier(tokens, "a parameter name")?;
            parameters.push(Parameter { name, ty });
            match tokens.peek()? {
                Token::Sym(Sym::Comma) => {
                    tokens.advance()?;
                }
                _ => break,
            }
        }
    }
    expect_symbol(tokens, Sym::CloseParen)?;
    Ok(parameters)
}

fn parse_local_var_decs(tokens: &mut Tokenizer) -> CompileResult<VarMap> {
    let mut locals = IndexMap::new();
    while tokens.has_next() && matches!(tokens.peek()?, Token::Keyword(Keyword::Var)) {
        tokens.advance()?;
        let (ty, names) = parse_var_type_and_names(tokens)?;
        for name in names {
            locals.insert(name, ty.clone());
        }
    }
    Ok(locals)
}

fn parse_statements(tokens: &mut Tokenizer) -> CompileResult<Vec<Statement>> {
    let mut statements = Vec::new();
    while let Some(statement) = parse_statement(tokens)? {
        statements.push(statement);
    }
    Ok(statements)
}

fn parse_statement(tokens: &mut Tokenizer) -> CompileResult<Option<Statement>> {
    if let Some(statement) = parse_return_statement(tokens)? {
        return Ok(Some(statement));
    }
    if let Some(statement) = parse_let_statement(tokens)? {
        return Ok(Some(statement));
    }
    if let Some(statement) = parse_if_statement(tokens)? {
        return Ok(Some(statement));
    }
    if let Some(statement) = parse_while_statement(tokens)? {
        return Ok(Some(statement));
    }
    if let Some(statement) = parse_do_statement(tokens)? {
        return Ok(Some(statement));
    }
    Ok(None)
}

fn parse_return_statement(tokens: &mut Tokenizer) -> CompileResult<Option<Statement>> {
    if !matches_keyword(tokens, Keyword::Return)? {
        return Ok(None);
    }
    tokens.advance()?;
    let value = parse_expression(tokens)?;
    expect_symbol(tokens, Sym::Semicolon)?;
    Ok(Some(Statement::Return(value)))
}

fn parse_let_statement(tokens: &mut Tokenizer) -> CompileResult<Option<Statement>> {
    if !matches_keyword(tokens, Keyword::Let)? {
        return Ok(None);
    }
    tokens.advance()?;
    let name = expect_identifier(tokens, "an assignment target")?;
    let index = parse_index(tokens)?;
    expect_symbol(tokens, Sym::Equals)?;
    let value = require_expression(tokens)?;
    expect_symbol(tokens, Sym::Semicolon)?;
    Ok(Some(Statement::Let { name, index, value }))
}

fn parse_if_statement(tokens: &mut Tokenizer) -> CompileResult<Option<Statement>> {
    if !matches_keyword(tokens, Keyword::If)? {
        return Ok(None);
    }
    tokens.advance()?;
    let condition = parse_condition(tokens)?;
    let then_body = parse_block(tokens)?;
    let else_body = if matches_keyword(tokens, Keyword::Else)? {
        tokens.advance()?;
        Some(parse_block(tokens)?)
    } else {
        None
    };
    Ok(Some(Statement::If {
        condition,
        then_body,
        else_body,
    }))
}

fn parse_while_statement(tokens: &mut Tokenizer) -> CompileResult<Option<Statement>> {
    if !matches_keyword(tokens, Keyword::While)? {
        return Ok(None);
    }
    tokens.advance()?;
    let condition = parse_condition(tokens)?;
    let body = parse_block(tokens)?;
    Ok(Some(Statement::While { condition, body }))
}

fn parse_do_statement(tokens: &mut Tokenizer) -> CompileResult<Option<Statement>> {
    if !matches_keyword(tokens, Keyword::Do)? {
        return Ok(None);
    }
    tokens.advance()?;
    let call = match parse_subroutine_call(tokens)? {
        Some(call) => call,
        None => return Err(unexpected_here(tokens, "a subroutine call")),
    };
    expect_symbol(tokens, Sym::Semicolon)?;
    Ok(Some(Statement::Do(call)))
}

fn parse_condition(tokens: &mut Tokenizer) -> CompileResult<Expression> {
    expect_symbol(tokens, Sym::OpenParen)?;
    let condition = require_expression(tokens)?;
    expect_symbol(tokens, Sym::CloseParen)?;
    Ok(condition)
}

fn parse_block(tokens: &mut Tokenizer) -> CompileResult<Vec<Statement>> {
    expect_symbol(tokens, Sym::OpenBrace)?;
    let statements = parse_statements(tokens)?;
    expect_symbol(tokens, Sym::CloseBrace)?;
    Ok(statements)
}

fn parse_expression(tokens: &mut Tokenizer) -> CompileResult<Option<Expression>> {
    let Some(term) = parse_term(tokens)? else {
        return Ok(None);
    };
    let continuation = match parse_operator(tokens)? {
        Some(op) => {
            let rest = require_expression(tokens)?;
            Some((op, Box::new(rest)))
        }
        None => None,
    };
    Ok(Some(Expression { term, continuation }))
}

fn require_expression(tokens: &mut Tokenizer) -> CompileResult<Expression> {
    match parse_expression(tokens)? {
        Some(expression) => Ok(expression),
        None => Err(unexpected_here(tokens, "an expression")),
    }
}

fn parse_operator(tokens: &mut Tokenizer) -> CompileResult<Option<Operator>> {
    if !tokens.has_next() {
        return Ok(None);
    }
    let op = match tokens.peek()? {
        Token::Sym(sym) => Operator::from_sym(sym),
        _ => None,
    };
    if op.is_some() {
        tokens.advance()?;
    }
    Ok(op)
}

fn parse_term(tokens: &mut Tokenizer) -> CompileResult<Option<Term>> {
    if !tokens.has_next() {
        return Ok(None);
    }
    if let Some(term) = parse_constant(tokens)? {
        return Ok(Some(term));
    }
    if let Some(call) = parse_subroutine_call(tokens)? {
        return Ok(Some(Term::Call(call)));
    }
    if let Some(term) = parse_var_name(tokens)? {
        return Ok(Some(term));
    }
    if let Some(term) = parse_keyword_literal(tokens)? {
        return Ok(Some(term));
    }
    if let Some(term) = parse_unary_op_term(tokens)? {
        return Ok(Some(term));
    }
    if let Some(term) = parse_paren_expression(tokens)? {
        return Ok(Some(term));
    }
    Ok(None)
}

fn parse_constant(tokens: &mut Tokenizer) -> CompileResult<Option<Term>> {
    let term = match tokens.peek()? {
        Token::IntegerLiteral(value) => Term::IntegerConstant(value),
        Token::StringLiteral(text) => Term::StringConstant(text),
        _ => return Ok(None),
    };
    tokens.advance()?;
    Ok(Some(term))
}

/// A name is a subroutine call only when followed by `(` (unqualified) or
/// `.` (qualified), checked one token ahead so a bare variable reference is
/// left for `parse_var_name`.
fn parse_subroutine_call(tokens: &mut Tokenizer) -> CompileResult<Option<SubroutineCall>> {
    if !tokens.has_next() || !matches!(tokens.peek()?, Token::Identifier(_)) {
        return Ok(None);
    }
    let ahead = tokens.lookahead(1)?;
    if !ahead.has_next() {
        return Ok(None);
    }
    match ahead.peek()? {
        Token::Sym(Sym::OpenParen) => {
            let name = expect_identifier(tokens, "a subroutine name")?;
            let arguments = parse_expression_list(tokens)?;
            Ok(Some(SubroutineCall {
                target: None,
                name,
                arguments,
            }))
        }
        Token::Sym(Sym::Dot) => {
            let target = expect_identifier(tokens, "a call target")?;
            tokens.advance()?;
            let name = expect_identifier(tokens, "a subroutine name after '.'")?;
            let arguments = parse_expression_list(tokens)?;
            Ok(Some(SubroutineCall {
                target: Some(target),
                name,
                arguments,
            }))
        }
        _ => Ok(None),
    }
}

fn parse_expression_list(tokens: &mut Tokenizer) -> CompileResult<Vec<Expression>> {
    expect_symbol(tokens, Sym::OpenParen)?;
    let mut arguments = Vec::new();
    if let Some(first) = parse_expression(tokens)? {
        arguments.push(first);
        while tokens.has_next() && matches!(tokens.peek()?, Token::Sym(Sym::Comma)) {
            tokens.advance()?;
            arguments.push(require_expression(tokens)?);
        }
    }
    expect_symbol(tokens, Sym::CloseParen)?;
    Ok(arguments)
}

fn parse_var_name(tokens: &mut Tokenizer) -> CompileResult<Option<Term>> {
    let Token::Identifier(name) = tokens.peek()? else {
        return Ok(None);
    };
    tokens.advance()?;
    let index = parse_index(tokens)?;
    Ok(Some(Term::Var {
        name,
        index: index.map(Box::new),
    }))
}

fn parse_index(tokens: &mut Tokenizer) -> CompileResult<Option<Expression>> {
    if !tokens.has_next() || !matches!(tokens.peek()?, Token::Sym(Sym::OpenSquare)) {
        return Ok(None);
    }
    tokens.advance()?;
    let index = require_expression(tokens)?;
    expect_symbol(tokens, Sym::CloseSquare)?;
    Ok(Some(index))
}

fn parse_keyword_literal(tokens: &mut Tokenizer) -> CompileResult<Option<Term>> {
    let literal = match tokens.peek()? {
        Token::Keyword(Keyword::True) => KeywordLiteral::True,
        Token::Keyword(Keyword::False) => KeywordLiteral::False,
        Token::Keyword(Keyword::Null) => KeywordLiteral::Null,
        Token::Keyword(Keyword::This) => KeywordLiteral::This,
        _ => return Ok(None),
    };
    tokens.advance()?;
    Ok(Some(Term::KeywordLiteral(literal)))
}

/// Commits to the operator only after speculatively parsing the following
/// term on a cloned cursor, so a dangling `~`/`-` is no match rather than
/// a half-consumed error.
fn parse_unary_op_term(tokens: &mut Tokenizer) -> CompileResult<Option<Term>> {
    let symbol = match tokens.peek()? {
        Token::Sym(sym @ (Sym::Tilde | Sym::Minus)) => sym,
        _ => return Ok(None),
    };
    let mut ahead = tokens.lookahead(1)?;
    if parse_term(&mut ahead)?.is_none() {
        return Ok(None);
    }
    tokens.advance()?;
    let op = UnaryOp::from_sym(symbol)?;
    let term = match parse_term(tokens)? {
        Some(term) => term,
        None => return Err(unexpected_here(tokens, "a term")),
    };
    Ok(Some(Term::Unary {
        op,
        term: Box::new(term),
    }))
}

fn parse_paren_expression(tokens: &mut Tokenizer) -> CompileResult<Option<Term>> {
    if !matches!(tokens.peek()?, Token::Sym(Sym::OpenParen)) {
        return Ok(None);
    }
    tokens.advance()?;
    let expression = require_expression(tokens)?;
    expect_symbol(tokens, Sym::CloseParen)?;
    Ok(Some(Term::Parenthesized(Box::new(expression))))
}

fn matches_keyword(tokens: &Tokenizer, keyword: Keyword) -> CompileResult<bool> {
    if !tokens.has_next() {
        return Ok(false);
    }
    Ok(tokens.peek()? == Token::Keyword(keyword))
}

fn expect_symbol(tokens: &mut Tokenizer, symbol: Sym) -> CompileResult<()> {
    match tokens.advance()? {
        Token::Sym(sym) if sym == symbol => Ok(()),
        token => Err(unexpected(&format!("'{symbol}'"), token)),
    }
}

fn expect_identifier(tokens: &mut Tokenizer, expected: &str) -> CompileResult<String> {
    match tokens.advance()? {
        Token::Identifier(name) => Ok(name),
        token => Err(unexpected(expected, token)),
    }
}

fn unexpected(expected: &str, got: Token) -> CompileError {
    SyntaxError::UnexpectedToken {
        expected: expected.to_string(),
        got,
    }
    .into()
}

fn unexpected_here(tokens: &Tokenizer, expected: &str) -> CompileError {
    match tokens.peek() {
        Ok(token) => unexpected(expected, token),
        Err(_) => SyntaxError::UnexpectedEof {
            expected: expected.to_string(),
        }
        .into(),
    }
}
