//! Expression grammar.
//!
//! Precedence, loosest first: `||` < `&&` < comparison/`in` < `+`/`-` <
//! `*`/`/`/`%` < unary `!`/`-` < member selection. All binary tiers are
//! left-associative. Literals: int, float, double-quoted string (with
//! escapes), `true`, `false`, `null`, and `[...]` lists.

use winnow::ascii::dec_int;
use winnow::combinator::{alt, cut_err, delimited, not, opt, preceded, repeat, separated};
use winnow::error::{ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::value::Value;
use super::CompileError;

/// Parse a complete expression; the whole input must be consumed.
pub(crate) fn parse_source(source: &str) -> Result<Expr, CompileError> {
    top.parse(source).map_err(|e| CompileError::Parse {
        offset: e.offset(),
        message: e.inner().to_string(),
    })
}

fn top(input: &mut &str) -> ModalResult<Expr> {
    let parsed = expr(input)?;
    ws.parse_next(input)?;
    Ok(parsed)
}

// -- Whitespace -------------------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_ascii_whitespace())
        .void()
        .parse_next(input)
}

// -- Identifiers ------------------------------------------------------------

fn word<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn ident_boundary(input: &mut &str) -> ModalResult<()> {
    not(one_of(|c: char| c.is_ascii_alphanumeric() || c == '_')).parse_next(input)
}

// -- Literals ---------------------------------------------------------------

fn string_literal(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = any.parse_next(input)?;
        match ch {
            '"' => return Ok(s),
            '\\' => {
                let esc = any.parse_next(input)?;
                match esc {
                    '"' => s.push('"'),
                    '\\' => s.push('\\'),
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            c => s.push(c),
        }
    }
}

fn float_literal(input: &mut &str) -> ModalResult<f64> {
    // Only match numbers that contain a decimal point
    (
        take_while(1.., |c: char| c.is_ascii_digit()),
        '.',
        take_while(1.., |c: char| c.is_ascii_digit()),
    )
        .take()
        .try_map(|s: &str| s.parse::<f64>())
        .parse_next(input)
}

fn number_literal(input: &mut &str) -> ModalResult<Expr> {
    alt((
        float_literal.map(|f| Expr::Literal(Value::Float(f))),
        dec_int::<_, i64, _>.map(|i| Expr::Literal(Value::Int(i))),
    ))
    .parse_next(input)
}

fn list_literal(input: &mut &str) -> ModalResult<Expr> {
    '['.parse_next(input)?;
    let items: Vec<Expr> = separated(0.., expr, (ws, ',')).parse_next(input)?;
    (ws, cut_err(']')).parse_next(input)?;
    Ok(Expr::List(items))
}

// -- Primary expressions ----------------------------------------------------

/// A bare word is either a keyword literal, a function call, or a variable
/// reference. `in` is an operator and never an operand.
fn word_expr(input: &mut &str) -> ModalResult<Expr> {
    let name = word.parse_next(input)?;
    match name {
        "true" => Ok(Expr::Literal(Value::Bool(true))),
        "false" => Ok(Expr::Literal(Value::Bool(false))),
        "null" => Ok(Expr::Literal(Value::Null)),
        "in" => Err(ErrMode::from_input(input)),
        _ => {
            let checkpoint = input.checkpoint();
            ws.parse_next(input)?;
            if opt('(').parse_next(input)?.is_some() {
                let args: Vec<Expr> = separated(0.., expr, (ws, ',')).parse_next(input)?;
                (ws, cut_err(')')).parse_next(input)?;
                Ok(Expr::Call(name.to_owned(), args))
            } else {
                input.reset(&checkpoint);
                Ok(Expr::Ident(name.to_owned()))
            }
        }
    }
}

fn primary(input: &mut &str) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    alt((
        delimited('(', expr, (ws, cut_err(')'))),
        list_literal,
        string_literal.map(|s| Expr::Literal(Value::String(s))),
        number_literal,
        word_expr,
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "expression",
    )))
    .parse_next(input)
}

fn member(input: &mut &str) -> ModalResult<Expr> {
    let mut base = primary.parse_next(input)?;
    loop {
        let checkpoint = input.checkpoint();
        ws.parse_next(input)?;
        if opt('.').parse_next(input)?.is_some() {
            let field = cut_err(word)
                .context(StrContext::Expected(StrContextValue::Description(
                    "field name",
                )))
                .parse_next(input)?;
            base = Expr::Member(Box::new(base), field.to_owned());
        } else {
            input.reset(&checkpoint);
            return Ok(base);
        }
    }
}

// -- Operator tiers ---------------------------------------------------------

fn unary(input: &mut &str) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    if opt('!').parse_next(input)?.is_some() {
        let inner = cut_err(unary).parse_next(input)?;
        Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)))
    } else if opt('-').parse_next(input)?.is_some() {
        let inner = cut_err(unary).parse_next(input)?;
        Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)))
    } else {
        member(input)
    }
}

fn mul_op(input: &mut &str) -> ModalResult<BinaryOp> {
    alt((
        '*'.value(BinaryOp::Mul),
        '/'.value(BinaryOp::Div),
        '%'.value(BinaryOp::Mod),
    ))
    .parse_next(input)
}

fn mul_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = unary(input)?;
    let rest: Vec<(BinaryOp, Expr)> =
        repeat(0.., (preceded(ws, mul_op), cut_err(unary))).parse_next(input)?;
    Ok(fold_binary(first, rest))
}

fn add_op(input: &mut &str) -> ModalResult<BinaryOp> {
    alt(('+'.value(BinaryOp::Add), '-'.value(BinaryOp::Sub))).parse_next(input)
}

fn add_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = mul_expr(input)?;
    let rest: Vec<(BinaryOp, Expr)> =
        repeat(0.., (preceded(ws, add_op), cut_err(mul_expr))).parse_next(input)?;
    Ok(fold_binary(first, rest))
}

fn rel_op(input: &mut &str) -> ModalResult<BinaryOp> {
    alt((
        "==".value(BinaryOp::Eq),
        "!=".value(BinaryOp::Ne),
        "<=".value(BinaryOp::Le),
        ">=".value(BinaryOp::Ge),
        '<'.value(BinaryOp::Lt),
        '>'.value(BinaryOp::Gt),
        ("in", ident_boundary).value(BinaryOp::In),
    ))
    .parse_next(input)
}

fn rel_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = add_expr(input)?;
    let rest: Vec<(BinaryOp, Expr)> =
        repeat(0.., (preceded(ws, rel_op), cut_err(add_expr))).parse_next(input)?;
    Ok(fold_binary(first, rest))
}

fn and_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = rel_expr(input)?;
    let rest: Vec<Expr> =
        repeat(0.., preceded((ws, "&&"), cut_err(rel_expr))).parse_next(input)?;
    Ok(rest.into_iter().fold(first, |acc, r| {
        Expr::Binary(BinaryOp::And, Box::new(acc), Box::new(r))
    }))
}

fn or_expr(input: &mut &str) -> ModalResult<Expr> {
    let first = and_expr(input)?;
    let rest: Vec<Expr> =
        repeat(0.., preceded((ws, "||"), cut_err(and_expr))).parse_next(input)?;
    Ok(rest.into_iter().fold(first, |acc, r| {
        Expr::Binary(BinaryOp::Or, Box::new(acc), Box::new(r))
    }))
}

fn expr(input: &mut &str) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    or_expr(input)
}

fn fold_binary(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |acc, (op, r)| {
        Expr::Binary(op, Box::new(acc), Box::new(r))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Expr {
        parse_source(source).unwrap()
    }

    #[test]
    fn parse_comparison() {
        let expr = parse("User.Age >= 18");
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Ge,
                Box::new(Expr::Member(
                    Box::new(Expr::Ident("User".into())),
                    "Age".into()
                )),
                Box::new(Expr::Literal(Value::Int(18))),
            )
        );
    }

    #[test]
    fn parse_all_comparison_ops() {
        let ops = [
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            ("<", BinaryOp::Lt),
            ("<=", BinaryOp::Le),
            (">", BinaryOp::Gt),
            (">=", BinaryOp::Ge),
        ];
        for (sym, expected) in ops {
            let expr = parse(&format!("x {sym} 1"));
            match expr {
                Expr::Binary(op, _, _) => assert_eq!(op, expected, "failed for {sym}"),
                other => panic!("expected Binary for {sym}, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_all_value_types() {
        let cases = [
            ("42", Value::Int(42)),
            ("3.14", Value::Float(3.14)),
            ("true", Value::Bool(true)),
            ("false", Value::Bool(false)),
            ("null", Value::Null),
            (r#""hello""#, Value::String("hello".into())),
        ];
        for (literal, expected) in cases {
            let expr = parse(&format!("x == {literal}"));
            match expr {
                Expr::Binary(_, _, rhs) => {
                    assert_eq!(*rhs, Expr::Literal(expected), "failed for {literal}");
                }
                other => panic!("expected Binary for {literal}, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_precedence_and_before_or() {
        let expr = parse("a || b && c");
        match expr {
            Expr::Binary(BinaryOp::Or, left, right) => {
                assert_eq!(*left, Expr::Ident("a".into()));
                assert!(matches!(*right, Expr::Binary(BinaryOp::And, _, _)));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn parse_precedence_comparison_before_and() {
        let expr = parse("x > 1 && y < 2");
        assert!(matches!(expr, Expr::Binary(BinaryOp::And, _, _)));
    }

    #[test]
    fn parse_precedence_arithmetic_before_comparison() {
        let expr = parse("x + 1 > y * 2");
        match expr {
            Expr::Binary(BinaryOp::Gt, left, right) => {
                assert!(matches!(*left, Expr::Binary(BinaryOp::Add, _, _)));
                assert!(matches!(*right, Expr::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("expected Gt, got {other:?}"),
        }
    }

    #[test]
    fn parse_parenthesized_grouping() {
        let expr = parse("(a || b) && c");
        match expr {
            Expr::Binary(BinaryOp::And, left, _) => {
                assert!(matches!(*left, Expr::Binary(BinaryOp::Or, _, _)));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn parse_not_and_negation() {
        assert!(matches!(
            parse("!x"),
            Expr::Unary(UnaryOp::Not, _)
        ));
        assert_eq!(
            parse("-5"),
            Expr::Unary(UnaryOp::Neg, Box::new(Expr::Literal(Value::Int(5))))
        );
        assert!(matches!(parse("!!x"), Expr::Unary(UnaryOp::Not, _)));
    }

    #[test]
    fn parse_nested_member_access() {
        let expr = parse("User.Profile.Age");
        assert_eq!(
            expr,
            Expr::Member(
                Box::new(Expr::Member(
                    Box::new(Expr::Ident("User".into())),
                    "Profile".into()
                )),
                "Age".into()
            )
        );
    }

    #[test]
    fn parse_call_with_args() {
        let expr = parse("size(User.Tags)");
        match expr {
            Expr::Call(name, args) => {
                assert_eq!(name, "size");
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn parse_in_list() {
        let expr = parse(r#"User.Region in ["eu", "us"]"#);
        match expr {
            Expr::Binary(BinaryOp::In, _, rhs) => match *rhs {
                Expr::List(items) => assert_eq!(items.len(), 2),
                other => panic!("expected List, got {other:?}"),
            },
            other => panic!("expected In, got {other:?}"),
        }
    }

    #[test]
    fn parse_in_requires_word_boundary() {
        // `index` starts with "in" but is an identifier, not the operator.
        let expr = parse("index");
        assert_eq!(expr, Expr::Ident("index".into()));
    }

    #[test]
    fn parse_string_with_escapes() {
        let expr = parse(r#"x == "a\"b\\c\n""#);
        match expr {
            Expr::Binary(_, _, rhs) => {
                assert_eq!(*rhs, Expr::Literal(Value::String("a\"b\\c\n".into())));
            }
            other => panic!("expected Binary, got {other:?}"),
        }
    }

    #[test]
    fn parse_empty_list() {
        assert_eq!(parse("x in []"), {
            Expr::Binary(
                BinaryOp::In,
                Box::new(Expr::Ident("x".into())),
                Box::new(Expr::List(vec![])),
            )
        });
    }

    #[test]
    fn parse_left_associativity() {
        // a - b - c == (a - b) - c
        let expr = parse("a - b - c");
        match expr {
            Expr::Binary(BinaryOp::Sub, left, right) => {
                assert!(matches!(*left, Expr::Binary(BinaryOp::Sub, _, _)));
                assert_eq!(*right, Expr::Ident("c".into()));
            }
            other => panic!("expected Sub, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_trailing_garbage() {
        assert!(parse_source("x == 1 &&").is_err());
        assert!(parse_source("x == ").is_err());
        assert!(parse_source("(x == 1").is_err());
        assert!(parse_source("== 1").is_err());
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert!(parse_source("").is_err());
        assert!(parse_source("   ").is_err());
    }

    #[test]
    fn parse_error_reports_offset() {
        match parse_source("x == @") {
            Err(CompileError::Parse { offset, .. }) => assert!(offset >= 4),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn parse_whitespace_tolerant() {
        let a = parse("User.Age>=18&&User.Active==true");
        let b = parse("  User.Age  >=  18  &&  User.Active  ==  true  ");
        assert_eq!(a, b);
    }
}
