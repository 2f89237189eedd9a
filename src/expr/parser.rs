use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use super::ast::{BinaryOp, Expr, Lambda, Literal, UnaryOp};
use crate::error::{ChunkloopError, ErrorCode, Result};

#[derive(Parser)]
#[grammar = "expr/grammar.pest"]
struct ExprParser;

/// Parse a work expression into its AST
pub fn parse_expression(source: &str) -> Result<Expr> {
    let mut pairs = ExprParser::parse(Rule::program, source).map_err(|e| {
        ChunkloopError::invalid_input_with_code(
            ErrorCode::INPUT_PARSE_ERROR,
            format!("failed to parse expression: {}", e),
            None,
        )
    })?;

    let expr = pairs
        .next()
        .and_then(|program| program.into_inner().find(|p| p.as_rule() == Rule::expr))
        .ok_or_else(|| syntax_error("empty expression"))?;

    build_expr(expr)
}

fn syntax_error(message: impl Into<String>) -> ChunkloopError {
    ChunkloopError::invalid_input_with_code(ErrorCode::INPUT_PARSE_ERROR, message, None)
}

/// Inner pairs with the keyword tokens dropped
fn significant(pair: Pair<'_, Rule>) -> impl Iterator<Item = Pair<'_, Rule>> {
    pair.into_inner().filter(|p| {
        !matches!(
            p.as_rule(),
            Rule::kw_let | Rule::kw_fn | Rule::kw_if | Rule::kw_else
        )
    })
}

fn next_pair<'a>(
    iter: &mut impl Iterator<Item = Pair<'a, Rule>>,
    what: &str,
) -> Result<Pair<'a, Rule>> {
    iter.next()
        .ok_or_else(|| syntax_error(format!("missing {}", what)))
}

fn build_expr(pair: Pair<'_, Rule>) -> Result<Expr> {
    match pair.as_rule() {
        Rule::expr | Rule::block | Rule::primary => {
            let mut inner = significant(pair);
            build_expr(next_pair(&mut inner, "expression")?)
        }
        Rule::let_expr => {
            let mut inner = significant(pair);
            let name = next_pair(&mut inner, "let name")?.as_str().to_string();
            let value = build_expr(next_pair(&mut inner, "let value")?)?;
            let body = build_expr(next_pair(&mut inner, "let body")?)?;
            Ok(Expr::Let {
                name,
                value: Box::new(value),
                body: Box::new(body),
            })
        }
        Rule::or_expr | Rule::and_expr | Rule::cmp_expr | Rule::add_expr | Rule::mul_expr => {
            build_binary_chain(pair)
        }
        Rule::unary => build_unary(pair),
        Rule::postfix => build_postfix(pair),
        Rule::fn_expr => {
            let mut params = Vec::new();
            let mut body = None;
            for part in significant(pair) {
                match part.as_rule() {
                    Rule::params => {
                        params = part.into_inner().map(|p| p.as_str().to_string()).collect();
                    }
                    _ => body = Some(build_expr(part)?),
                }
            }
            let body = body.ok_or_else(|| syntax_error("function without body"))?;
            Ok(Expr::Lambda(Lambda {
                params,
                body: Box::new(body),
            }))
        }
        Rule::if_expr => {
            let mut inner = significant(pair);
            let condition = build_expr(next_pair(&mut inner, "if condition")?)?;
            let then_branch = build_expr(next_pair(&mut inner, "if branch")?)?;
            let else_branch = inner.next().map(build_expr).transpose()?;
            Ok(Expr::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: else_branch.map(Box::new),
            })
        }
        Rule::list => {
            let items = pair.into_inner().map(build_expr).collect::<Result<Vec<_>>>()?;
            Ok(Expr::List(items))
        }
        Rule::qualified => {
            let mut inner = pair.into_inner();
            let package = next_pair(&mut inner, "package name")?.as_str().to_string();
            let name = next_pair(&mut inner, "function name")?.as_str().to_string();
            Ok(Expr::Qualified { package, name })
        }
        Rule::ident => Ok(Expr::Ident(pair.as_str().to_string())),
        Rule::int => pair
            .as_str()
            .parse::<i64>()
            .map(|v| Expr::Literal(Literal::Int(v)))
            .map_err(|e| syntax_error(format!("invalid integer '{}': {}", pair.as_str(), e))),
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .map(|v| Expr::Literal(Literal::Float(v)))
            .map_err(|e| syntax_error(format!("invalid float '{}': {}", pair.as_str(), e))),
        Rule::string => {
            let raw = pair
                .into_inner()
                .next()
                .map(|p| p.as_str())
                .unwrap_or_default();
            Ok(Expr::Literal(Literal::Str(unescape(raw))))
        }
        Rule::true_lit => Ok(Expr::Literal(Literal::Bool(true))),
        Rule::false_lit => Ok(Expr::Literal(Literal::Bool(false))),
        Rule::null_lit => Ok(Expr::Literal(Literal::Null)),
        other => Err(syntax_error(format!("unexpected syntax node {:?}", other))),
    }
}

fn build_binary_chain(pair: Pair<'_, Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let mut left = build_expr(next_pair(&mut inner, "operand")?)?;

    while let Some(op_pair) = inner.next() {
        let op = binary_op(op_pair.as_str())?;
        let right = build_expr(next_pair(&mut inner, "right operand")?)?;
        left = Expr::binary(op, left, right);
    }

    Ok(left)
}

fn binary_op(symbol: &str) -> Result<BinaryOp> {
    let op = match symbol {
        "||" => BinaryOp::Or,
        "&&" => BinaryOp::And,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        other => return Err(syntax_error(format!("unknown operator '{}'", other))),
    };
    Ok(op)
}

fn build_unary(pair: Pair<'_, Rule>) -> Result<Expr> {
    let mut ops = Vec::new();
    let mut operand = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::unary_op => ops.push(if part.as_str() == "-" {
                UnaryOp::Neg
            } else {
                UnaryOp::Not
            }),
            _ => operand = Some(build_expr(part)?),
        }
    }

    let mut expr = operand.ok_or_else(|| syntax_error("unary operator without operand"))?;
    for op in ops.into_iter().rev() {
        expr = match (op, expr) {
            // Fold negative literals so `-1` stays a literal
            (UnaryOp::Neg, Expr::Literal(Literal::Int(v))) => Expr::Literal(Literal::Int(-v)),
            (UnaryOp::Neg, Expr::Literal(Literal::Float(v))) => Expr::Literal(Literal::Float(-v)),
            (op, expr) => Expr::Unary {
                op,
                operand: Box::new(expr),
            },
        };
    }
    Ok(expr)
}

fn build_postfix(pair: Pair<'_, Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let mut expr = build_expr(next_pair(&mut inner, "primary expression")?)?;

    for suffix in inner {
        expr = match suffix.as_rule() {
            Rule::call_args => {
                let args = suffix.into_inner().map(build_expr).collect::<Result<Vec<_>>>()?;
                Expr::call(expr, args)
            }
            Rule::index => {
                let mut idx = suffix.into_inner();
                let index = build_expr(next_pair(&mut idx, "index expression")?)?;
                Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                }
            }
            other => return Err(syntax_error(format!("unexpected suffix {:?}", other))),
        };
    }

    Ok(expr)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Add,
                Expr::int(1),
                Expr::binary(BinaryOp::Mul, Expr::int(2), Expr::int(3))
            )
        );
    }

    #[test]
    fn test_left_associative_subtraction() {
        let expr = parse_expression("10 - 4 - 3").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Sub,
                Expr::binary(BinaryOp::Sub, Expr::int(10), Expr::int(4)),
                Expr::int(3)
            )
        );
    }

    #[test]
    fn test_call_and_index() {
        let expr = parse_expression("f(x, 2)[0]").unwrap();
        match expr {
            Expr::Index { target, index } => {
                assert_eq!(*index, Expr::int(0));
                assert_eq!(
                    *target,
                    Expr::call(Expr::ident("f"), vec![Expr::ident("x"), Expr::int(2)])
                );
            }
            other => panic!("expected index, got {:?}", other),
        }
    }

    #[test]
    fn test_let_and_lambda() {
        let expr = parse_expression("let sq = fn(v) { v * v }; sq(i)").unwrap();
        match expr {
            Expr::Let { name, value, body } => {
                assert_eq!(name, "sq");
                assert!(matches!(*value, Expr::Lambda(ref l) if l.params == vec!["v".to_string()]));
                assert!(matches!(*body, Expr::Call { .. }));
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else_chain() {
        let expr = parse_expression("if x < 0 { -1 } else if x == 0 { 0 } else { 1 }").unwrap();
        match expr {
            Expr::If { else_branch, .. } => {
                assert!(matches!(else_branch.as_deref(), Some(Expr::If { .. })));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_if_without_else() {
        let expr = parse_expression("if flag { 1 }").unwrap();
        assert!(matches!(expr, Expr::If { else_branch: None, .. }));
    }

    #[test]
    fn test_keyword_prefixed_identifiers() {
        assert_eq!(parse_expression("iffy").unwrap(), Expr::ident("iffy"));
        assert_eq!(parse_expression("letter").unwrap(), Expr::ident("letter"));
        assert_eq!(parse_expression("fnord").unwrap(), Expr::ident("fnord"));
        assert_eq!(parse_expression("nullable").unwrap(), Expr::ident("nullable"));
    }

    #[test]
    fn test_qualified_reference() {
        let expr = parse_expression("math::sqrt(16)").unwrap();
        assert_eq!(
            expr,
            Expr::call(
                Expr::Qualified {
                    package: "math".to_string(),
                    name: "sqrt".to_string()
                },
                vec![Expr::int(16)]
            )
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            parse_expression("\"a\\\"b\\n\"").unwrap(),
            Expr::Literal(Literal::Str("a\"b\n".to_string()))
        );
        assert_eq!(
            parse_expression("2.5").unwrap(),
            Expr::Literal(Literal::Float(2.5))
        );
        assert_eq!(parse_expression("-3").unwrap(), Expr::int(-3));
        assert_eq!(
            parse_expression("[1, 2,]").unwrap(),
            Expr::List(vec![Expr::int(1), Expr::int(2)])
        );
        assert_eq!(
            parse_expression("null").unwrap(),
            Expr::Literal(Literal::Null)
        );
    }

    #[test]
    fn test_comments_are_ignored() {
        let expr = parse_expression("# square it\ni * i").unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinaryOp::Mul, Expr::ident("i"), Expr::ident("i"))
        );
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_expression("1 +").unwrap_err();
        assert_eq!(err.code(), ErrorCode::INPUT_PARSE_ERROR);
        assert!(parse_expression("").is_err());
        assert!(parse_expression("fn(x) x").is_err());
        assert!(parse_expression("let = 3; 4").is_err());
    }
}
