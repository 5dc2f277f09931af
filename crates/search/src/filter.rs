//! Metadata filter compiler
//!
//! Turns a [`MetadataFilter`] into a SQL condition over the
//! `document_metadata` jsonb column. Dotted field names navigate nested
//! objects: `a.b.c` becomes `document_metadata -> 'a' -> 'b' ->> 'c'`.
//!
//! Missing keys evaluate to SQL NULL, so a filter on an absent field never
//! matches. Numbers compare as `numeric`, which accepts integer and
//! fractional text alike.

use pgvt_common::errors::{AppError, Result};
use pgvt_common::{DocumentColumn, FilterCondition, MetadataFilter};
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Alias, BinOper, Condition, Expr, SimpleExpr};
use serde_json::Value;

/// Compile a filter into a condition on the document table
pub fn build_condition(filter: &MetadataFilter) -> Result<Condition> {
    let path = filter.path()?;
    let value = &filter.value;

    let condition = match filter.condition {
        FilterCondition::Eq => Condition::all().add(equals(&path, value)),
        FilterCondition::Gt
        | FilterCondition::Gte
        | FilterCondition::Lt
        | FilterCondition::Lte => Condition::all().add(compare(&path, filter.condition, value)?),
        FilterCondition::Contains => Condition::all().add(json_contains(&path, value)),
        FilterCondition::In => Condition::all().add(Expr::expr(json_text(&path)).is_in(in_values(value))),
        FilterCondition::Exists => key_exists(&path),
    };

    Ok(condition)
}

/// `document_metadata -> 'a' -> 'b'`, jsonb all the way down
fn json_field(path: &[&str]) -> SimpleExpr {
    path.iter().fold(
        Expr::col(DocumentColumn::DocumentMetadata).into(),
        |expr: SimpleExpr, key| expr.get_json_field(*key),
    )
}

/// `document_metadata -> 'a' ->> 'b'`, the leaf extracted as text
fn json_text(path: &[&str]) -> SimpleExpr {
    match path.split_last() {
        Some((leaf, parents)) => json_field(parents).cast_json_field(*leaf),
        None => Expr::col(DocumentColumn::DocumentMetadata).into(),
    }
}

fn cast(expr: SimpleExpr, sql_type: &str) -> SimpleExpr {
    Expr::expr(expr).cast_as(Alias::new(sql_type))
}

fn jsonb_literal(value: &Value) -> SimpleExpr {
    Expr::val(value.to_string()).cast_as(Alias::new("jsonb"))
}

fn number(n: &serde_json::Number) -> SimpleExpr {
    match n.as_i64() {
        Some(i) => i.into(),
        None => n.as_f64().into(),
    }
}

fn equals(path: &[&str], value: &Value) -> SimpleExpr {
    match value {
        Value::String(s) => Expr::expr(json_text(path)).eq(s.as_str()),
        Value::Bool(b) => Expr::expr(cast(json_text(path), "boolean")).eq(*b),
        Value::Number(n) => Expr::expr(cast(json_text(path), "numeric")).eq(number(n)),
        // null, arrays and objects compare as whole jsonb values
        other => Expr::expr(json_field(path)).eq(jsonb_literal(other)),
    }
}

fn compare(path: &[&str], condition: FilterCondition, value: &Value) -> Result<SimpleExpr> {
    let (left, right): (SimpleExpr, SimpleExpr) = match value {
        Value::String(s) => (json_text(path), s.as_str().into()),
        Value::Number(n) => (cast(json_text(path), "numeric"), number(n)),
        _ => {
            return Err(AppError::invalid_field(
                "value",
                format!(
                    "Condition '{}' requires a numeric or string value, got {}",
                    condition, value
                ),
            ))
        }
    };

    let left = Expr::expr(left);
    Ok(match condition {
        FilterCondition::Gt => left.gt(right),
        FilterCondition::Gte => left.gte(right),
        FilterCondition::Lt => left.lt(right),
        _ => left.lte(right),
    })
}

/// `leaf @> '[value]'::jsonb`; an array value is used as-is
fn json_contains(path: &[&str], value: &Value) -> SimpleExpr {
    let needle = match value {
        Value::Array(_) => value.clone(),
        other => Value::Array(vec![other.clone()]),
    };
    json_field(path).contains(jsonb_literal(&needle))
}

/// Literals compared against the extracted text of the leaf
fn in_values(value: &Value) -> Vec<String> {
    let text = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    match value {
        Value::Array(items) => items.iter().map(text).collect(),
        scalar => vec![text(scalar)],
    }
}

/// `?` at every level of the path
fn key_exists(path: &[&str]) -> Condition {
    (0..path.len()).fold(Condition::all(), |condition, depth| {
        condition.add(SimpleExpr::Binary(
            Box::new(json_field(&path[..depth])),
            BinOper::Custom("?"),
            Box::new(Expr::val(path[depth]).into()),
        ))
    })
}
