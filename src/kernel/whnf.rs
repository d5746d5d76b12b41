//! Weak-head reduction and full normalization.
//!
//! Rules, tried at the head of the term:
//!
//! - beta: `(fun x => b) a` to `b[x := a]`
//! - zeta: `let x := v; b` to `b[x := v]`, and a bound variable whose context
//!   entry carries a `let` value unfolds to that value
//! - delta: a defined constant unfolds to its body, universes instantiated
//! - iota: `(a, b).1` to `a` and `(a, b).2` to `b`, reducing the projection
//!   target first
//!
//! Axioms never unfold. Every step is charged to the checker's budget.

use super::env::Declaration;
use super::error::{TcError, TcResult};
use super::expr::*;
use super::local_ctx::LocalContext;
use super::tc::TypeChecker;

/// Reduce to weak-head normal form, including delta.
pub fn whnf(e: &Expr, ctx: &LocalContext, tc: &mut TypeChecker) -> TcResult<Expr> {
  reduce_head(e, ctx, tc, true)
}

/// Reduce to weak-head normal form without unfolding constants.
pub fn whnf_core(e: &Expr, ctx: &LocalContext, tc: &mut TypeChecker) -> TcResult<Expr> {
  reduce_head(e, ctx, tc, false)
}

fn reduce_head(
  e: &Expr,
  ctx: &LocalContext,
  tc: &mut TypeChecker,
  delta: bool,
) -> TcResult<Expr> {
  let mut cur = e.clone();
  while let Some(next) = head_step(&cur, ctx, tc, delta)? {
    tc.tick()?;
    cur = next;
  }
  Ok(cur)
}

/// One head step, or `None` when no rule applies.
fn head_step(
  e: &Expr,
  ctx: &LocalContext,
  tc: &mut TypeChecker,
  delta: bool,
) -> TcResult<Option<Expr>> {
  match e.as_data() {
    ExprData::Let(_, _, v, b) => Ok(Some(instantiate(b, v))),
    ExprData::Bvar(i) => match ctx.get(*i) {
      None => Err(TcError::LooseBoundVar { idx: *i }),
      Some(decl) => Ok(decl.value.as_ref().map(|v| shift(v, 0, *i as i64 + 1))),
    },
    ExprData::Proj1(p) | ExprData::Proj2(p) => {
      let target = reduce_head(p, ctx, tc, delta)?;
      Ok(match (e.as_data(), target.as_data()) {
        (ExprData::Proj1(_), ExprData::Pair(a, _)) => Some(a.clone()),
        (ExprData::Proj2(_), ExprData::Pair(_, b)) => Some(b.clone()),
        _ => None,
      })
    },
    ExprData::Const(..) => Ok(if delta { unfold_definition(e, tc) } else { None }),
    ExprData::App(..) => {
      let (head, args) = unfold_apps(e);
      let head_r = reduce_head(&head, ctx, tc, delta)?;
      match head_r.as_data() {
        ExprData::Lam(_, _, body) => {
          let reduced = instantiate(body, &args[0]);
          Ok(Some(foldl_apps(reduced, args.into_iter().skip(1))))
        },
        _ if head_r == head => Ok(None),
        _ => Ok(Some(foldl_apps(head_r, args))),
      }
    },
    _ => Ok(None),
  }
}

/// The visible definition named by `e`'s head constant, if any.
pub fn applied_definition<'env>(
  e: &Expr,
  tc: &TypeChecker<'env>,
) -> Option<&'env Declaration> {
  let mut head = e;
  while let ExprData::App(f, _) = head.as_data() {
    head = f;
  }
  match head.as_data() {
    ExprData::Const(name, levels) => tc
      .get_const(name)
      .map(|d| d.as_ref())
      .filter(|d| d.value.is_some() && d.universe_params.len() == levels.len()),
    _ => None,
  }
}

/// Unfold the head constant of an application spine once.
pub fn unfold_definition(e: &Expr, tc: &TypeChecker) -> Option<Expr> {
  let decl = applied_definition(e, tc)?;
  let value = decl.value.as_ref()?;
  let (head, args) = unfold_apps(e);
  let ExprData::Const(_, levels) = head.as_data() else {
    return None;
  };
  let body = subst_levels(value, &decl.universe_params, levels);
  Some(foldl_apps(body, args))
}

/// Full normal form: weak-head reduce, then normalize every sub-term,
/// including under binders.
pub fn normalize(e: &Expr, ctx: &LocalContext, tc: &mut TypeChecker) -> TcResult<Expr> {
  let w = tc.whnf(e, ctx)?;
  match w.as_data() {
    ExprData::Lam(n, t, b) => {
      let t_n = normalize(t, ctx, tc)?;
      let b_n = normalize(b, &ctx.push(n.clone(), t.clone(), None), tc)?;
      Ok(Expr::lam(n.clone(), t_n, b_n))
    },
    ExprData::Pi(n, t, b) => {
      let t_n = normalize(t, ctx, tc)?;
      let b_n = normalize(b, &ctx.push(n.clone(), t.clone(), None), tc)?;
      Ok(Expr::pi(n.clone(), t_n, b_n))
    },
    ExprData::Sigma(n, t, b) => {
      let t_n = normalize(t, ctx, tc)?;
      let b_n = normalize(b, &ctx.push(n.clone(), t.clone(), None), tc)?;
      Ok(Expr::sigma(n.clone(), t_n, b_n))
    },
    ExprData::App(..) => {
      let (head, args) = unfold_apps(&w);
      let mut out = normalize(&head, ctx, tc)?;
      for arg in &args {
        out = Expr::app(out, normalize(arg, ctx, tc)?);
      }
      Ok(out)
    },
    ExprData::Pair(a, b) => {
      Ok(Expr::pair(normalize(a, ctx, tc)?, normalize(b, ctx, tc)?))
    },
    ExprData::Proj1(p) => Ok(Expr::proj1(normalize(p, ctx, tc)?)),
    ExprData::Proj2(p) => Ok(Expr::proj2(normalize(p, ctx, tc)?)),
    _ => Ok(w),
  }
}
