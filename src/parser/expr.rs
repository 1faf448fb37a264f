//! PEST-based parser for placeholder expressions
//!
//! Produces `syntax::Expr` trees. The document parser hands this module the
//! text between placeholder braces and the bodies of expression-valued
//! attributes (guards, assign values, loop bounds).

use pest::Parser;
use pest_derive::Parser;

use crate::syntax::{BinOp, CallArg, Expr, UnaryOp};

#[derive(Parser)]
#[grammar = "parser/expr.pest"]
struct ExprParser;

/// Parse failure inside an expression; the document parser attaches the
/// enclosing node's source position.
#[derive(Debug)]
pub struct ExprError {
    pub detail: String,
}

pub type ExprResult<T> = Result<T, ExprError>;

impl From<pest::error::Error<Rule>> for ExprError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        ExprError {
            detail: err.to_string(),
        }
    }
}

/// Parse an expression source string into an `Expr`
pub fn parse_expr(source: &str) -> ExprResult<Expr> {
    let mut pairs = ExprParser::parse(Rule::expr_input, source)?;
    let input = pairs.next().ok_or_else(|| ExprError {
        detail: "empty expression".to_string(),
    })?;

    // expr_input = { SOI ~ expression ~ EOI }
    let expression = input
        .into_inner()
        .find(|p| p.as_rule() == Rule::expression)
        .ok_or_else(|| ExprError {
            detail: "empty expression".to_string(),
        })?;

    build_expression(expression)
}

/* ===================== AST Builder ===================== */

fn build_expression(pair: pest::iterators::Pair<Rule>) -> ExprResult<Expr> {
    match pair.as_rule() {
        Rule::expression => {
            let inner = pair.into_inner().next().unwrap();
            build_expression(inner)
        }
        Rule::or_expr => build_binary_chain(pair),
        Rule::and_expr => build_binary_chain(pair),
        Rule::cmp_expr => build_binary_chain(pair),
        Rule::add_expr => build_binary_chain(pair),
        Rule::mul_expr => build_binary_chain(pair),
        Rule::unary_expr => build_unary(pair),
        Rule::postfix_expr => build_postfix(pair),
        Rule::primary => {
            let inner = pair.into_inner().next().unwrap();
            build_expression(inner)
        }
        Rule::literal => {
            let inner = pair.into_inner().next().unwrap();
            build_expression(inner)
        }
        Rule::boolean => Ok(Expr::LitBool {
            v: pair.as_str() == "true",
        }),
        Rule::null_lit => Ok(Expr::LitNull),
        Rule::number => {
            let text = pair.as_str();
            let v = text.parse::<f64>().map_err(|e| ExprError {
                detail: format!("invalid number '{}': {}", text, e),
            })?;
            Ok(Expr::LitNum { v })
        }
        Rule::string => {
            let content = pair.into_inner().next().unwrap();
            Ok(Expr::LitStr {
                v: content.as_str().replace("''", "'"),
            })
        }
        Rule::identifier => Ok(Expr::Ident {
            name: pair.as_str().to_string(),
        }),
        Rule::call => build_call(pair),
        other => Err(ExprError {
            detail: format!("unexpected expression rule: {:?}", other),
        }),
    }
}

/// Fold a left-associative operator chain: `operand (op operand)*`
fn build_binary_chain(pair: pest::iterators::Pair<Rule>) -> ExprResult<Expr> {
    let mut inner = pair.into_inner();
    let first = inner.next().unwrap();
    let mut expr = build_expression(first)?;

    while let Some(op_pair) = inner.next() {
        let op = build_bin_op(op_pair.as_str())?;
        let rhs_pair = inner.next().ok_or_else(|| ExprError {
            detail: "operator missing right operand".to_string(),
        })?;
        let rhs = build_expression(rhs_pair)?;
        expr = Expr::Binary {
            op,
            left: Box::new(expr),
            right: Box::new(rhs),
        };
    }

    Ok(expr)
}

fn build_bin_op(text: &str) -> ExprResult<BinOp> {
    let op = match text {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "%" => BinOp::Mod,
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "<" => BinOp::Lt,
        ">" => BinOp::Gt,
        "<=" => BinOp::Le,
        ">=" => BinOp::Ge,
        "&&" => BinOp::And,
        "||" => BinOp::Or,
        other => {
            return Err(ExprError {
                detail: format!("unknown operator '{}'", other),
            })
        }
    };
    Ok(op)
}

fn build_unary(pair: pest::iterators::Pair<Rule>) -> ExprResult<Expr> {
    // unary_expr = { unary_op* ~ postfix_expr }
    let mut ops = Vec::new();
    let mut operand = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::unary_op => ops.push(match inner.as_str() {
                "!" => UnaryOp::Not,
                _ => UnaryOp::Neg,
            }),
            _ => operand = Some(build_expression(inner)?),
        }
    }

    let mut expr = operand.ok_or_else(|| ExprError {
        detail: "unary operator missing operand".to_string(),
    })?;

    // Innermost operator applies first
    for op in ops.into_iter().rev() {
        expr = Expr::Unary {
            op,
            operand: Box::new(expr),
        };
    }

    Ok(expr)
}

fn build_postfix(pair: pest::iterators::Pair<Rule>) -> ExprResult<Expr> {
    // postfix_expr = { primary ~ (member | index)* }
    let mut inner = pair.into_inner();
    let primary = inner.next().unwrap();
    let mut expr = build_expression(primary)?;

    for postfix in inner {
        let part = postfix.into_inner().next().unwrap();
        match part.as_rule() {
            Rule::member => {
                let property = part.into_inner().next().unwrap().as_str().to_string();
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            }
            Rule::index => {
                let index_expr = build_expression(part.into_inner().next().unwrap())?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index_expr),
                };
            }
            other => {
                return Err(ExprError {
                    detail: format!("unexpected postfix rule: {:?}", other),
                })
            }
        }
    }

    Ok(expr)
}

fn build_call(pair: pest::iterators::Pair<Rule>) -> ExprResult<Expr> {
    // call = { identifier ~ "(" ~ arg_list? ~ ")" }
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();

    let mut args = Vec::new();
    if let Some(arg_list) = inner.next() {
        for arg_pair in arg_list.into_inner() {
            // call_arg = { named_arg | expression }
            let arg = arg_pair.into_inner().next().unwrap();
            match arg.as_rule() {
                Rule::named_arg => {
                    let mut parts = arg.into_inner();
                    let arg_name = parts.next().unwrap().as_str().to_string();
                    let value = build_expression(parts.next().unwrap())?;
                    args.push(CallArg {
                        name: Some(arg_name),
                        value,
                    });
                }
                _ => {
                    args.push(CallArg {
                        name: None,
                        value: build_expression(arg)?,
                    });
                }
            }
        }
    }

    Ok(Expr::Call { name, args })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_expr("42").unwrap(), Expr::LitNum { v: 42.0 });
    }

    #[test]
    fn test_parse_string() {
        assert_eq!(
            parse_expr("'hello'").unwrap(),
            Expr::LitStr {
                v: "hello".to_string()
            }
        );
    }

    #[test]
    fn test_doubled_quote_escapes_inside_string() {
        assert_eq!(
            parse_expr("'it''s'").unwrap(),
            Expr::LitStr {
                v: "it's".to_string()
            }
        );
        // An empty literal is still just two quotes
        assert_eq!(parse_expr("''").unwrap(), Expr::LitStr { v: String::new() });
        // The escape does not swallow a real terminator
        assert!(matches!(
            parse_expr("'a' == 'b'").unwrap(),
            Expr::Binary { op: BinOp::Eq, .. }
        ));
    }

    #[test]
    fn test_precedence_mul_over_add() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse_expr("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary {
                op: BinOp::Add,
                right,
                ..
            } => {
                assert!(matches!(*right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_member_and_index() {
        let expr = parse_expr("user.roles[0]").unwrap();
        match expr {
            Expr::Index { object, .. } => {
                assert!(matches!(*object, Expr::Member { .. }));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_comparison() {
        let expr = parse_expr("score >= 90").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinOp::Ge, .. }));
    }

    #[test]
    fn test_call_with_named_arg() {
        let expr = parse_expr("greet('ada', times=3)").unwrap();
        match expr {
            Expr::Call { name, args } => {
                assert_eq!(name, "greet");
                assert_eq!(args.len(), 2);
                assert_eq!(args[0].name, None);
                assert_eq!(args[1].name.as_deref(), Some("times"));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_named_arg_not_confused_with_equality() {
        let expr = parse_expr("check(a == 1)").unwrap();
        match expr {
            Expr::Call { args, .. } => {
                assert_eq!(args[0].name, None);
                assert!(matches!(args[0].value, Expr::Binary { op: BinOp::Eq, .. }));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_logical_chain() {
        let expr = parse_expr("a && b || !c").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinOp::Or, .. }));
    }

    #[test]
    fn test_malformed_expression_fails() {
        assert!(parse_expr("1 +").is_err());
        assert!(parse_expr("").is_err());
    }
}
