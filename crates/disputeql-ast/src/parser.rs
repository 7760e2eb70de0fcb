//! Pest-based parser for dataframe expressions

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use crate::ast::*;
use disputeql_ir::CmpOp;

#[derive(Parser)]
#[grammar = "disputeql.pest"]
pub struct ExprParser;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("invalid syntax\n{0}")]
    Pest(#[from] Box<pest::error::Error<Rule>>),
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        ParseError::Pest(Box::new(err))
    }
}

/// Parse a single expression into its syntax tree
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let mut pairs = ExprParser::parse(Rule::query, source)?;
    let query = pairs
        .next()
        .ok_or_else(|| ParseError::Syntax("Empty input".to_string()))?;

    let expr = query
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or_else(|| ParseError::Syntax("Missing expression".to_string()))?;

    parse_expr(expr)
}

fn next_pair<'a>(inner: &mut Pairs<'a, Rule>, what: &str) -> Result<Pair<'a, Rule>, ParseError> {
    inner
        .next()
        .ok_or_else(|| ParseError::Syntax(format!("Missing {}", what)))
}

fn parse_expr(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::expr => {
            let mut inner = pair.into_inner();
            let left = parse_expr(next_pair(&mut inner, "operand")?)?;
            match inner.next() {
                None => Ok(left),
                Some(op) => {
                    let op = parse_cmp_op(op.as_str())?;
                    let right = parse_expr(next_pair(&mut inner, "right operand")?)?;
                    Ok(Expr::Compare {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    })
                }
            }
        }
        Rule::bit_or | Rule::bit_and | Rule::arith | Rule::term => {
            // Flat sequence: operand (op operand)*
            let mut inner = pair.into_inner();
            let mut left = parse_expr(next_pair(&mut inner, "operand")?)?;

            while let Some(op) = inner.next() {
                let op = parse_bin_op(op.as_str())?;
                let right = parse_expr(next_pair(&mut inner, "right operand")?)?;
                left = Expr::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            }

            Ok(left)
        }
        Rule::unary => {
            let mut ops = Vec::new();
            let mut operand = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::unary_op => ops.push(match inner.as_str() {
                        "~" => UnaryOp::Invert,
                        _ => UnaryOp::Neg,
                    }),
                    _ => operand = Some(parse_expr(inner)?),
                }
            }

            let mut expr = operand.ok_or_else(|| ParseError::Syntax("Missing operand".to_string()))?;
            for op in ops.into_iter().rev() {
                expr = fold_unary(op, expr);
            }
            Ok(expr)
        }
        Rule::postfix => {
            let mut inner = pair.into_inner();
            let mut expr = parse_expr(next_pair(&mut inner, "primary")?)?;
            for trailer in inner {
                expr = parse_trailer(expr, trailer)?;
            }
            Ok(expr)
        }
        Rule::list => {
            let items: Result<Vec<_>, _> = pair.into_inner().map(parse_expr).collect();
            Ok(Expr::List(items?))
        }
        Rule::ident => Ok(Expr::Name(pair.as_str().to_string())),
        Rule::int | Rule::float | Rule::string | Rule::boolean | Rule::none => {
            Ok(Expr::Literal(parse_literal(pair)?))
        }
        rule => Err(ParseError::Syntax(format!("Unexpected rule: {:?}", rule))),
    }
}

/// Negative numeric literals fold into the literal itself
fn fold_unary(op: UnaryOp, operand: Expr) -> Expr {
    match (op, operand) {
        (UnaryOp::Neg, Expr::Literal(Literal::Int(i))) => Expr::Literal(Literal::Int(-i)),
        (UnaryOp::Neg, Expr::Literal(Literal::Float(f))) => Expr::Literal(Literal::Float(-f)),
        (op, operand) => Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        },
    }
}

fn parse_trailer(value: Expr, trailer: Pair<Rule>) -> Result<Expr, ParseError> {
    match trailer.as_rule() {
        Rule::attribute => {
            let attr = next_pair(&mut trailer.into_inner(), "attribute name")?;
            Ok(Expr::Attribute {
                value: Box::new(value),
                attr: attr.as_str().to_string(),
            })
        }
        Rule::subscript => {
            let index = parse_expr(next_pair(&mut trailer.into_inner(), "index")?)?;
            Ok(Expr::Subscript {
                value: Box::new(value),
                index: Box::new(index),
            })
        }
        Rule::call => {
            let mut args = Vec::new();
            for arg in trailer.into_inner() {
                let argument = match arg.as_rule() {
                    Rule::keyword_arg => {
                        let mut inner = arg.into_inner();
                        let name = next_pair(&mut inner, "keyword")?.as_str().to_string();
                        let value = parse_expr(next_pair(&mut inner, "keyword value")?)?;
                        Argument {
                            keyword: Some(name),
                            value,
                        }
                    }
                    _ => {
                        if args.iter().any(|a: &Argument| a.keyword.is_some()) {
                            return Err(ParseError::Syntax(
                                "positional argument follows keyword argument".to_string(),
                            ));
                        }
                        let value = parse_expr(next_pair(&mut arg.into_inner(), "argument")?)?;
                        Argument {
                            keyword: None,
                            value,
                        }
                    }
                };
                args.push(argument);
            }
            Ok(Expr::Call {
                func: Box::new(value),
                args,
            })
        }
        rule => Err(ParseError::Syntax(format!("Unexpected trailer: {:?}", rule))),
    }
}

fn parse_literal(pair: Pair<Rule>) -> Result<Literal, ParseError> {
    match pair.as_rule() {
        Rule::int => pair
            .as_str()
            .parse()
            .map(Literal::Int)
            .map_err(|_| ParseError::Syntax(format!("Integer out of range: {}", pair.as_str()))),
        Rule::float => pair
            .as_str()
            .parse()
            .map(Literal::Float)
            .map_err(|_| ParseError::Syntax(format!("Invalid number: {}", pair.as_str()))),
        Rule::string => {
            let inner = next_pair(&mut pair.into_inner(), "string body")?;
            Ok(Literal::Str(unescape(inner.as_str())))
        }
        Rule::boolean => Ok(Literal::Bool(pair.as_str() == "True")),
        Rule::none => Ok(Literal::None),
        rule => Err(ParseError::Syntax(format!("Unexpected literal: {:?}", rule))),
    }
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
            Some('0') => out.push('\0'),
            Some(c @ ('\\' | '\'' | '"')) => out.push(c),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn parse_cmp_op(op: &str) -> Result<CmpOp, ParseError> {
    Ok(match op {
        "==" => CmpOp::Eq,
        "!=" => CmpOp::Ne,
        "<" => CmpOp::Lt,
        "<=" => CmpOp::Le,
        ">" => CmpOp::Gt,
        ">=" => CmpOp::Ge,
        _ => return Err(ParseError::Syntax(format!("Unknown comparison: {}", op))),
    })
}

fn parse_bin_op(op: &str) -> Result<BinOp, ParseError> {
    Ok(match op {
        "&" => BinOp::BitAnd,
        "|" => BinOp::BitOr,
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "%" => BinOp::Mod,
        _ => return Err(ParseError::Syntax(format!("Unknown operator: {}", op))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Expr {
        Expr::Subscript {
            value: Box::new(Expr::name("df_combined")),
            index: Box::new(Expr::string(name)),
        }
    }

    #[test]
    fn test_parse_len_call() {
        let expr = parse("len(df_combined)").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                func: Box::new(Expr::name("len")),
                args: vec![Argument {
                    keyword: None,
                    value: Expr::name("df_combined"),
                }],
            }
        );
    }

    #[test]
    fn test_comparison_binds_looser_than_bitand() {
        // a & b == c parses as (a & b) == c, as in Python
        let expr = parse("df_combined['a'] & df_combined['b'] == 'x'").unwrap();
        match expr {
            Expr::Compare { op: CmpOp::Eq, left, .. } => {
                assert!(matches!(*left, Expr::BinaryOp { op: BinOp::BitAnd, .. }));
            }
            other => panic!("expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_parenthesized_mask() {
        let expr = parse(
            "df_combined[(df_combined['predicted_category'] == 'FRAUD') & (df_combined['suggested_action'] != 'Auto-refund')]",
        )
        .unwrap();
        let Expr::Subscript { value, index } = expr else {
            panic!("expected subscript");
        };
        assert_eq!(*value, Expr::name("df_combined"));
        let Expr::BinaryOp { op: BinOp::BitAnd, left, right } = *index else {
            panic!("expected &");
        };
        assert_eq!(
            *left,
            Expr::Compare {
                op: CmpOp::Eq,
                left: Box::new(col("predicted_category")),
                right: Box::new(Expr::string("FRAUD")),
            }
        );
        assert!(matches!(*right, Expr::Compare { op: CmpOp::Ne, .. }));
    }

    #[test]
    fn test_keyword_arguments() {
        let expr = parse("df_combined.sort_values('amount', ascending=False)").unwrap();
        let Expr::Call { args, .. } = expr else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert_eq!(args[1].keyword.as_deref(), Some("ascending"));
        assert_eq!(args[1].value, Expr::Literal(Literal::Bool(false)));
    }

    #[test]
    fn test_keyword_does_not_swallow_equality() {
        let expr = parse("len(x == 1)").unwrap();
        let Expr::Call { args, .. } = expr else {
            panic!("expected call");
        };
        assert!(args[0].keyword.is_none());
        assert!(matches!(args[0].value, Expr::Compare { .. }));
    }

    #[test]
    fn test_positional_after_keyword_rejected() {
        assert!(parse("f(a=1, 2)").is_err());
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("-3").unwrap(), Expr::Literal(Literal::Int(-3)));
        assert_eq!(parse("0.5").unwrap(), Expr::Literal(Literal::Float(0.5)));
        assert_eq!(parse("None").unwrap(), Expr::Literal(Literal::None));
        assert_eq!(parse("Nonesuch").unwrap(), Expr::name("Nonesuch"));
        assert_eq!(
            parse(r#""it\'s""#).unwrap(),
            Expr::Literal(Literal::Str("it's".to_string()))
        );
        assert_eq!(
            parse("['FRAUD', 'OTHERS']").unwrap(),
            Expr::List(vec![Expr::string("FRAUD"), Expr::string("OTHERS")])
        );
    }

    #[test]
    fn test_invert_applies_to_postfix() {
        let expr = parse("~df_combined['x'].isna()").unwrap();
        let Expr::UnaryOp { op: UnaryOp::Invert, operand } = expr else {
            panic!("expected ~");
        };
        assert!(matches!(*operand, Expr::Call { .. }));
    }

    #[test]
    fn test_rejects_statements() {
        assert!(parse("import os").is_err());
        assert!(parse("x = 1").is_err());
        assert!(parse("df_combined; df_combined").is_err());
        assert!(parse("").is_err());
        assert!(parse("a < b < c").is_err());
    }
}
