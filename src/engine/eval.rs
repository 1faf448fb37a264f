//! Expression evaluation over the layered scope store
//!
//! Unresolved variable references evaluate to empty (`Val::Null`) rather
//! than failing the render; everything else that goes wrong — bad operand
//! types, unknown functions, division by zero — is fatal and carries the
//! position of the node whose template or attribute held the expression.

use std::collections::HashMap;

use tracing::debug;

use super::{Executor, Flow, Val, MAX_CALL_DEPTH};
use crate::error::{Pos, RuntimeError, RuntimeErrorKind};
use crate::syntax::{BinOp, CallArg, Expr, ScopeKind, UnaryOp};

impl<'a> Executor<'a> {
    pub(crate) fn eval_expr(&mut self, expr: &Expr, pos: Pos) -> Result<Val, RuntimeError> {
        match expr {
            Expr::LitNull => Ok(Val::Null),
            Expr::LitBool { v } => Ok(Val::Bool(*v)),
            Expr::LitNum { v } => Ok(Val::Num(*v)),
            Expr::LitStr { v } => Ok(Val::Str(v.clone())),

            Expr::Ident { name } => Ok(self.read_var(name)),

            Expr::Member { object, property } => {
                // `session.x` style qualified reads resolve against the
                // named layer directly, mirroring qualified writes.
                if let Expr::Ident { name } = object.as_ref() {
                    if ScopeKind::from_name(name).is_some() {
                        return Ok(self.read_var(&format!("{}.{}", name, property)));
                    }
                }
                let obj = self.eval_expr(object, pos)?;
                match obj {
                    Val::Obj(map) => Ok(map.get(property).cloned().unwrap_or(Val::Null)),
                    Val::Null => Ok(Val::Null),
                    other => Err(RuntimeError::new(
                        RuntimeErrorKind::TypeMismatch(format!(
                            "cannot read property '{}' of {}",
                            property,
                            other.type_name()
                        )),
                        pos,
                    )),
                }
            }

            Expr::Index { object, index } => {
                let obj = self.eval_expr(object, pos)?;
                let idx = self.eval_expr(index, pos)?;
                match (obj, idx) {
                    (Val::List(items), idx) => {
                        let i = idx.as_num().ok_or_else(|| {
                            RuntimeError::new(
                                RuntimeErrorKind::TypeMismatch(
                                    "array index must be a number".to_string(),
                                ),
                                pos,
                            )
                        })?;
                        Ok(items.get(i as usize).cloned().unwrap_or(Val::Null))
                    }
                    (Val::Obj(map), Val::Str(key)) => {
                        Ok(map.get(&key).cloned().unwrap_or(Val::Null))
                    }
                    (Val::Null, _) => Ok(Val::Null),
                    (other, _) => Err(RuntimeError::new(
                        RuntimeErrorKind::TypeMismatch(format!(
                            "cannot index {}",
                            other.type_name()
                        )),
                        pos,
                    )),
                }
            }

            Expr::Call { name, args } => self.eval_call(name, args, pos),

            Expr::Unary { op, operand } => {
                let val = self.eval_expr(operand, pos)?;
                match op {
                    UnaryOp::Not => Ok(Val::Bool(!val.is_truthy())),
                    UnaryOp::Neg => {
                        let n = val.as_num().ok_or_else(|| {
                            RuntimeError::new(
                                RuntimeErrorKind::TypeMismatch(format!(
                                    "cannot negate {}",
                                    val.type_name()
                                )),
                                pos,
                            )
                        })?;
                        Ok(Val::Num(-n))
                    }
                }
            }

            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, pos),
        }
    }

    fn read_var(&self, name: &str) -> Val {
        match self.scopes.get(name) {
            Some(val) => val.clone(),
            None => {
                debug!(name, "unresolved variable reference, substituting empty");
                Val::Null
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        pos: Pos,
    ) -> Result<Val, RuntimeError> {
        // Logical operators short-circuit
        if op == BinOp::And {
            let l = self.eval_expr(left, pos)?;
            if !l.is_truthy() {
                return Ok(Val::Bool(false));
            }
            return Ok(Val::Bool(self.eval_expr(right, pos)?.is_truthy()));
        }
        if op == BinOp::Or {
            let l = self.eval_expr(left, pos)?;
            if l.is_truthy() {
                return Ok(Val::Bool(true));
            }
            return Ok(Val::Bool(self.eval_expr(right, pos)?.is_truthy()));
        }

        let l = self.eval_expr(left, pos)?;
        let r = self.eval_expr(right, pos)?;

        match op {
            BinOp::Add => {
                if let (Some(a), Some(b)) = (num_operand(&l), num_operand(&r)) {
                    Ok(Val::Num(a + b))
                } else if matches!(l, Val::Str(_)) || matches!(r, Val::Str(_)) {
                    Ok(Val::Str(format!("{}{}", l.to_display(), r.to_display())))
                } else {
                    Err(type_error(op, &l, &r, pos))
                }
            }
            BinOp::Sub | BinOp::Mul | BinOp::Mod => {
                let (a, b) = both_nums(&l, &r).ok_or_else(|| type_error(op, &l, &r, pos))?;
                Ok(Val::Num(match op {
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    _ => a % b,
                }))
            }
            BinOp::Div => {
                let (a, b) = both_nums(&l, &r).ok_or_else(|| type_error(op, &l, &r, pos))?;
                if b == 0.0 {
                    return Err(RuntimeError::new(RuntimeErrorKind::DivisionByZero, pos));
                }
                Ok(Val::Num(a / b))
            }
            BinOp::Eq => Ok(Val::Bool(loose_eq(&l, &r))),
            BinOp::Ne => Ok(Val::Bool(!loose_eq(&l, &r))),
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                let ordering = if let Some((a, b)) = both_nums(&l, &r) {
                    a.partial_cmp(&b)
                } else {
                    Some(l.to_display().cmp(&r.to_display()))
                };
                let ordering = ordering.ok_or_else(|| type_error(op, &l, &r, pos))?;
                Ok(Val::Bool(match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Gt => ordering.is_gt(),
                    BinOp::Le => ordering.is_le(),
                    _ => ordering.is_ge(),
                }))
            }
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    /* ===================== Function calls ===================== */

    fn eval_call(
        &mut self,
        name: &str,
        args: &[CallArg],
        pos: Pos,
    ) -> Result<Val, RuntimeError> {
        let def = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| {
                RuntimeError::new(RuntimeErrorKind::UnknownFunction(name.to_string()), pos)
            })?;

        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::new(
                RuntimeErrorKind::TypeMismatch(format!(
                    "maximum call depth exceeded in '{}'",
                    name
                )),
                pos,
            ));
        }

        // Bind arguments by position or name into a fresh local frame
        let mut frame: HashMap<String, Val> = HashMap::new();
        let mut positional = 0usize;
        for arg in args {
            let val = self.eval_expr(&arg.value, pos)?;
            match &arg.name {
                Some(arg_name) => {
                    if !def.params.iter().any(|p| p.name == *arg_name) {
                        // Attributed to the definition whose signature
                        // lacks the parameter
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::UnknownParameter {
                                func: name.to_string(),
                                param: arg_name.clone(),
                            },
                            def.pos,
                        ));
                    }
                    frame.insert(arg_name.clone(), val);
                }
                None => {
                    if let Some(param) = def.params.get(positional) {
                        frame.insert(param.name.clone(), val);
                    }
                    positional += 1;
                }
            }
        }

        // Declared parameter types coerce; unbound parameters read empty
        for param in &def.params {
            if let Some(ty) = param.ty {
                if let Some(val) = frame.remove(&param.name) {
                    let coerced = super::coerce(val, ty).map_err(|detail| {
                        RuntimeError::new(
                            RuntimeErrorKind::CoercionFailed {
                                value: detail,
                                ty: ty.name().to_string(),
                            },
                            pos,
                        )
                    })?;
                    frame.insert(param.name.clone(), coerced);
                }
            }
        }

        let memo_key = if def.cache {
            let mut arg_keys: Vec<String> = def
                .params
                .iter()
                .map(|p| {
                    frame
                        .get(&p.name)
                        .map(|v| v.canonical_key())
                        .unwrap_or_else(|| "null".to_string())
                })
                .collect();
            arg_keys.insert(0, name.to_string());
            Some(arg_keys.join("\u{1f}"))
        } else {
            None
        };
        if let Some(key) = &memo_key {
            if let Some(val) = self.memo.get(key) {
                debug!(function = name, "memoized result reused");
                return Ok(val.clone());
            }
        }

        // Fresh local scope: the caller's frames are invisible to the body.
        // Body markup output is discarded for expression calls; only the
        // return value escapes.
        let saved = self.scopes.take_frames(frame);
        self.call_depth += 1;
        let mut scratch = Vec::new();
        let result = self.exec_nodes(&def.body, &mut scratch);
        self.call_depth -= 1;
        self.scopes.restore_frames(saved);

        let value = match result? {
            Flow::Return(v) => v,
            Flow::Normal => Val::Null,
        };

        if let Some(key) = memo_key {
            self.memo.insert(key, value.clone());
        }
        Ok(value)
    }
}

/// Numeric reading of an operand for arithmetic and comparison. Empty
/// (null) reads as zero so unresolved references behave as empty values;
/// strings participate only when they parse as numbers.
fn num_operand(val: &Val) -> Option<f64> {
    match val {
        Val::Num(n) => Some(*n),
        Val::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Val::Null => Some(0.0),
        Val::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn both_nums(l: &Val, r: &Val) -> Option<(f64, f64)> {
    Some((num_operand(l)?, num_operand(r)?))
}

fn loose_eq(l: &Val, r: &Val) -> bool {
    if let Some((a, b)) = both_nums(l, r) {
        return a == b;
    }
    match (l, r) {
        (Val::Null, Val::Null) => true,
        (Val::Null, other) | (other, Val::Null) => !other.is_truthy() && other.type_name() == "string",
        _ => l.to_display() == r.to_display(),
    }
}

fn type_error(op: BinOp, l: &Val, r: &Val, pos: Pos) -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::TypeMismatch(format!(
            "operator {:?} cannot combine {} and {}",
            op,
            l.type_name(),
            r.type_name()
        )),
        pos,
    )
}
