use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::hcl::RawPayload;

/// Parse HCL source into the canonical payload shape: block-type → ordered
/// list of block objects, each keyed by its name/address chain.
///
/// Attribute values are wrapped in single-element lists at every block
/// level; that wrapping is what the variable resolver and module resolver
/// unwrap on their way back down.
pub fn parse_hcl_payload(content: &str, file_path: &Path) -> Result<RawPayload> {
    let body: hcl::Body = hcl::from_str(content)
        .with_context(|| format!("failed to parse HCL in: {}", file_path.display()))?;

    let mut payload = RawPayload::new();
    for structure in body.into_inner() {
        match structure {
            hcl::Structure::Block(block) => {
                let block_type = block.identifier().to_string();
                let object = block_to_object(&block);
                if let Value::Array(blocks) = payload
                    .entry(block_type)
                    .or_insert_with(|| Value::Array(Vec::new()))
                {
                    blocks.push(object);
                }
            }
            hcl::Structure::Attribute(attr) => {
                // Top-level attributes only occur in variable-definition
                // files; they take the same wrapped shape as block bodies.
                let value = expr_to_value(attr.expr());
                payload.insert(attr.key().to_string(), Value::Array(vec![value]));
            }
        }
    }

    Ok(payload)
}

/// Fold a block's labels into nested single-key maps around its body, so
/// `resource "aws_s3_bucket" "b" { ... }` becomes `{"aws_s3_bucket": {"b": {...}}}`.
fn block_to_object(block: &hcl::Block) -> Value {
    let mut object = body_to_object(block.body());
    for label in block.labels().iter().rev() {
        let mut wrapper = serde_json::Map::new();
        wrapper.insert(label.as_str().to_string(), object);
        object = Value::Object(wrapper);
    }
    object
}

fn body_to_object(body: &hcl::Body) -> Value {
    let mut map = serde_json::Map::new();

    for structure in body.iter() {
        match structure {
            hcl::Structure::Attribute(attr) => {
                map.insert(
                    attr.key().to_string(),
                    Value::Array(vec![expr_to_value(attr.expr())]),
                );
            }
            hcl::Structure::Block(inner) => {
                // Repeated inner blocks accumulate under one key.
                let object = block_to_object(inner);
                if let Value::Array(blocks) = map
                    .entry(inner.identifier().to_string())
                    .or_insert_with(|| Value::Array(Vec::new()))
                {
                    blocks.push(object);
                }
            }
        }
    }

    Value::Object(map)
}

/// Convert an hcl::Expression into a JSON value. Unresolved references are
/// rendered as `${...}` strings; anything without a JSON shape is coerced
/// to its string form.
pub fn expr_to_value(expr: &hcl::Expression) -> Value {
    match expr {
        hcl::Expression::Null => Value::Null,
        hcl::Expression::Bool(b) => Value::Bool(*b),
        hcl::Expression::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            } else {
                Value::Null
            }
        }
        hcl::Expression::String(s) => Value::String(s.clone()),
        hcl::Expression::Array(items) => Value::Array(items.iter().map(expr_to_value).collect()),
        hcl::Expression::Object(entries) => {
            let map: serde_json::Map<String, Value> = entries
                .iter()
                .map(|(key, value)| (object_key_to_string(key), expr_to_value(value)))
                .collect();
            Value::Object(map)
        }
        hcl::Expression::TemplateExpr(template) => Value::String(template.to_string()),
        hcl::Expression::Variable(var) => Value::String(format!("${{{}}}", var.as_str())),
        hcl::Expression::Traversal(traversal) => {
            Value::String(format!("${{{}}}", traversal_to_text(traversal)))
        }
        hcl::Expression::Parenthesis(inner) => expr_to_value(inner),
        other => Value::String(format!("${{{}}}", expr_to_interp_text(other))),
    }
}

/// Render an expression the way it would appear inside a `${...}`
/// interpolation. Best-effort for exotic nodes, which fall back to their
/// debug form.
fn expr_to_interp_text(expr: &hcl::Expression) -> String {
    match expr {
        hcl::Expression::Null => "null".to_string(),
        hcl::Expression::Bool(b) => b.to_string(),
        hcl::Expression::Number(n) => n.to_string(),
        hcl::Expression::String(s) => format!("\"{}\"", s),
        hcl::Expression::Variable(var) => var.to_string(),
        hcl::Expression::Traversal(traversal) => traversal_to_text(traversal),
        hcl::Expression::FuncCall(call) => {
            let args: Vec<String> = call.args.iter().map(expr_to_interp_text).collect();
            format!("{}({})", call.name, args.join(", "))
        }
        hcl::Expression::Conditional(cond) => format!(
            "{} ? {} : {}",
            expr_to_interp_text(&cond.cond_expr),
            expr_to_interp_text(&cond.true_expr),
            expr_to_interp_text(&cond.false_expr)
        ),
        hcl::Expression::Operation(op) => match op.as_ref() {
            hcl::expr::Operation::Unary(unary) => {
                let symbol = match unary.operator {
                    hcl::expr::UnaryOperator::Neg => "-",
                    hcl::expr::UnaryOperator::Not => "!",
                };
                format!("{}{}", symbol, expr_to_interp_text(&unary.expr))
            }
            hcl::expr::Operation::Binary(binary) => {
                let symbol = match binary.operator {
                    hcl::expr::BinaryOperator::Eq => "==",
                    hcl::expr::BinaryOperator::NotEq => "!=",
                    hcl::expr::BinaryOperator::Less => "<",
                    hcl::expr::BinaryOperator::LessEq => "<=",
                    hcl::expr::BinaryOperator::Greater => ">",
                    hcl::expr::BinaryOperator::GreaterEq => ">=",
                    hcl::expr::BinaryOperator::Plus => "+",
                    hcl::expr::BinaryOperator::Minus => "-",
                    hcl::expr::BinaryOperator::Mul => "*",
                    hcl::expr::BinaryOperator::Div => "/",
                    hcl::expr::BinaryOperator::Mod => "%",
                    hcl::expr::BinaryOperator::And => "&&",
                    hcl::expr::BinaryOperator::Or => "||",
                };
                format!(
                    "{} {} {}",
                    expr_to_interp_text(&binary.lhs_expr),
                    symbol,
                    expr_to_interp_text(&binary.rhs_expr)
                )
            }
        },
        hcl::Expression::Parenthesis(inner) => format!("({})", expr_to_interp_text(inner)),
        hcl::Expression::Array(items) => {
            let rendered: Vec<String> = items.iter().map(expr_to_interp_text).collect();
            format!("[{}]", rendered.join(", "))
        }
        hcl::Expression::TemplateExpr(template) => template.to_string(),
        other => format!("{:?}", other),
    }
}

fn traversal_to_text(traversal: &hcl::expr::Traversal) -> String {
    let mut text = match &traversal.expr {
        hcl::Expression::Variable(var) => var.to_string(),
        other => expr_to_interp_text(other),
    };
    for operator in &traversal.operators {
        match operator {
            hcl::expr::TraversalOperator::GetAttr(ident) => {
                text.push('.');
                text.push_str(&ident.to_string());
            }
            hcl::expr::TraversalOperator::Index(idx) => {
                text.push_str(&format!("[{}]", expr_to_interp_text(idx)));
            }
            hcl::expr::TraversalOperator::LegacyIndex(n) => {
                text.push_str(&format!("[{}]", n));
            }
            hcl::expr::TraversalOperator::AttrSplat | hcl::expr::TraversalOperator::FullSplat => {
                text.push_str("[*]");
            }
        }
    }
    text
}

fn object_key_to_string(key: &hcl::expr::ObjectKey) -> String {
    match key {
        hcl::expr::ObjectKey::Identifier(id) => id.to_string(),
        hcl::expr::ObjectKey::Expression(expr) => match expr {
            hcl::Expression::String(s) => s.clone(),
            other => expr_to_interp_text(other),
        },
        _ => String::new(),
    }
}
