//! Runtime value types and declared-type coercion

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::syntax::DeclaredType;

/// Runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Val {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Val>),
    Obj(HashMap<String, Val>),
}

impl Val {
    /// Check if value is truthy (for conditional guards)
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Null => false,
            Val::Bool(b) => *b,
            Val::Num(n) => *n != 0.0,
            Val::Str(s) => !s.is_empty(),
            Val::List(items) => !items.is_empty(),
            Val::Obj(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "boolean",
            Val::Num(_) => "number",
            Val::Str(_) => "string",
            Val::List(_) => "array",
            Val::Obj(_) => "object",
        }
    }

    /// Substitution form used when a placeholder resolves.
    ///
    /// Whole numbers print without a fractional part so `{x}` with `x = 10`
    /// substitutes as `10`, not `10.0`.
    pub fn to_display(&self) -> String {
        match self {
            Val::Null => String::new(),
            Val::Bool(b) => b.to_string(),
            Val::Num(n) => format_num(*n),
            Val::Str(s) => s.clone(),
            Val::List(items) => items
                .iter()
                .map(|v| v.to_display())
                .collect::<Vec<_>>()
                .join(","),
            Val::Obj(_) => "[object]".to_string(),
        }
    }

    /// Deterministic key text for memoization.
    ///
    /// Object keys are sorted so two equal values always produce the same
    /// key regardless of map iteration order.
    pub fn canonical_key(&self) -> String {
        match self {
            Val::Null => "null".to_string(),
            Val::Bool(b) => format!("b:{}", b),
            Val::Num(n) => format!("n:{}", n),
            Val::Str(s) => format!("s:{}", s),
            Val::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.canonical_key()).collect();
                format!("l:[{}]", parts.join(","))
            }
            Val::Obj(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let parts: Vec<String> = keys
                    .iter()
                    .map(|k| format!("{}={}", k, map[*k].canonical_key()))
                    .collect();
                format!("o:{{{}}}", parts.join(","))
            }
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Val::Num(n) => Some(*n),
            Val::Str(s) => s.trim().parse::<f64>().ok(),
            Val::Bool(true) => Some(1.0),
            Val::Bool(false) => Some(0.0),
            _ => None,
        }
    }
}

fn format_num(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/* ===================== Coercion ===================== */

/// Apply declared-type coercion. Failure is fatal for the render; the
/// caller attaches the node position.
pub fn coerce(value: Val, ty: DeclaredType) -> Result<Val, String> {
    match ty {
        DeclaredType::String => Ok(Val::Str(value.to_display())),
        DeclaredType::Number => value
            .as_num()
            .map(Val::Num)
            .ok_or_else(|| format!("{} value '{}'", value.type_name(), value.to_display())),
        DeclaredType::Boolean => match &value {
            Val::Bool(_) => Ok(value),
            Val::Num(n) => Ok(Val::Bool(*n != 0.0)),
            Val::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Val::Bool(true)),
                "false" | "no" | "0" => Ok(Val::Bool(false)),
                _ => Err(format!("string value '{}'", s)),
            },
            _ => Err(format!("{} value", value.type_name())),
        },
        DeclaredType::Array => match value {
            Val::List(_) => Ok(value),
            Val::Null => Ok(Val::List(Vec::new())),
            Val::Str(s) => Ok(Val::List(
                s.split(',')
                    .map(|part| Val::Str(part.trim().to_string()))
                    .collect(),
            )),
            other => Err(format!("{} value", other.type_name())),
        },
    }
}
