use super::error::TcResult;
use super::expr::*;
use super::level;
use super::local_ctx::LocalContext;
use super::tc::TypeChecker;
use super::whnf::{applied_definition, unfold_definition};

/// Result of lazy delta reduction.
enum DeltaResult {
  Found(bool),
  Exhausted(Expr, Expr),
}

type Work = Vec<(Expr, Expr, LocalContext)>;

/// Check definitional equality of two expressions in `ctx`.
///
/// Uses a conjunction work stack: processes pairs iteratively, all must be
/// equal. Eta is not part of the relation.
pub fn def_eq(
  x: &Expr,
  y: &Expr,
  ctx: &LocalContext,
  tc: &mut TypeChecker,
) -> TcResult<bool> {
  let mut work: Work = vec![(x.clone(), y.clone(), ctx.clone())];
  while let Some((x, y, ctx)) = work.pop() {
    tc.tick()?;
    if !def_eq_step(&x, &y, &ctx, &mut work, tc)? {
      return Ok(false);
    }
  }
  Ok(true)
}

/// Process one pair. `Ok(false)` means definitely not equal; pairs pushed
/// onto `work` must all be equal as well.
fn def_eq_step(
  x: &Expr,
  y: &Expr,
  ctx: &LocalContext,
  work: &mut Work,
  tc: &mut TypeChecker,
) -> TcResult<bool> {
  if let Some(quick) = def_eq_quick_check(x, y) {
    return Ok(quick);
  }

  let x_n = tc.whnf_core(x, ctx)?;
  let y_n = tc.whnf_core(y, ctx)?;

  if let Some(quick) = def_eq_quick_check(&x_n, &y_n) {
    return Ok(quick);
  }

  match lazy_delta_step(&x_n, &y_n, ctx, tc)? {
    DeltaResult::Found(result) => Ok(result),
    DeltaResult::Exhausted(x_e, y_e) => Ok(
      def_eq_atom(&x_e, &y_e)
        || def_eq_app_push(&x_e, &y_e, ctx, work)
        || def_eq_binder_push(&x_e, &y_e, ctx, work)
        || def_eq_pair_push(&x_e, &y_e, ctx, work),
    ),
  }
}

/// Quick syntactic checks.
fn def_eq_quick_check(x: &Expr, y: &Expr) -> Option<bool> {
  if alpha_eq(x, y) {
    return Some(true);
  }
  match (x.as_data(), y.as_data()) {
    (ExprData::Sort(l), ExprData::Sort(r)) => Some(level::equal(l, r)),
    _ => None,
  }
}

fn def_eq_atom(x: &Expr, y: &Expr) -> bool {
  match (x.as_data(), y.as_data()) {
    (ExprData::Const(xn, xl), ExprData::Const(yn, yl)) => {
      xn == yn && level::equal_many(xl, yl)
    },
    (ExprData::Bvar(i), ExprData::Bvar(j)) => i == j,
    (ExprData::Fvar(a), ExprData::Fvar(b)) => a == b,
    _ => false,
  }
}

/// App congruence: push head + arg pairs onto the work stack.
fn def_eq_app_push(x: &Expr, y: &Expr, ctx: &LocalContext, work: &mut Work) -> bool {
  let (f1, args1) = unfold_apps(x);
  if args1.is_empty() {
    return false;
  }
  let (f2, args2) = unfold_apps(y);
  if args1.len() != args2.len() {
    return false;
  }

  work.push((f1, f2, ctx.clone()));
  for (a, b) in args1.into_iter().zip(args2) {
    work.push((a, b, ctx.clone()));
  }
  true
}

/// Eager app congruence, used by lazy delta where a definitive answer is
/// needed before unfolding. Both heads are constants here, so they are
/// compared by name and universe arguments rather than through `def_eq`,
/// which would land back in lazy delta on the same pair.
fn def_eq_app(
  x: &Expr,
  y: &Expr,
  ctx: &LocalContext,
  tc: &mut TypeChecker,
) -> TcResult<bool> {
  let (f1, args1) = unfold_apps(x);
  let (f2, args2) = unfold_apps(y);
  if args1.len() != args2.len() || !def_eq_atom(&f1, &f2) {
    return Ok(false);
  }
  for (a, b) in args1.iter().zip(args2.iter()) {
    if !def_eq(a, b, ctx, tc)? {
      return Ok(false);
    }
  }
  Ok(true)
}

/// Matching binders: domains are compared in `ctx`, bodies under one more
/// binder whose type is the left domain.
fn def_eq_binder_push(x: &Expr, y: &Expr, ctx: &LocalContext, work: &mut Work) -> bool {
  match (x.as_data(), y.as_data()) {
    (ExprData::Pi(n, t1, b1), ExprData::Pi(_, t2, b2))
    | (ExprData::Lam(n, t1, b1), ExprData::Lam(_, t2, b2))
    | (ExprData::Sigma(n, t1, b1), ExprData::Sigma(_, t2, b2)) => {
      work.push((t1.clone(), t2.clone(), ctx.clone()));
      let inner = ctx.push(n.clone(), t1.clone(), None);
      work.push((b1.clone(), b2.clone(), inner));
      true
    },
    _ => false,
  }
}

/// Pair and projection congruence.
fn def_eq_pair_push(x: &Expr, y: &Expr, ctx: &LocalContext, work: &mut Work) -> bool {
  match (x.as_data(), y.as_data()) {
    (ExprData::Pair(a1, b1), ExprData::Pair(a2, b2)) => {
      work.push((a1.clone(), a2.clone(), ctx.clone()));
      work.push((b1.clone(), b2.clone(), ctx.clone()));
      true
    },
    (ExprData::Proj1(p), ExprData::Proj1(q))
    | (ExprData::Proj2(p), ExprData::Proj2(q)) => {
      work.push((p.clone(), q.clone(), ctx.clone()));
      true
    },
    _ => false,
  }
}

/// Unfold definitions one side at a time until the heads agree or neither
/// side can unfold. When both heads are the same definition, argument
/// congruence is tried before unfolding. Otherwise the later-declared
/// definition is unfolded first.
fn lazy_delta_step(
  x: &Expr,
  y: &Expr,
  ctx: &LocalContext,
  tc: &mut TypeChecker,
) -> TcResult<DeltaResult> {
  let mut x = x.clone();
  let mut y = y.clone();

  loop {
    tc.tick()?;
    let x_def = applied_definition(&x, tc).map(|d| d.name.clone());
    let y_def = applied_definition(&y, tc).map(|d| d.name.clone());

    let (unfold_x, unfold_y) = match (&x_def, &y_def) {
      (None, None) => return Ok(DeltaResult::Exhausted(x, y)),
      (Some(_), None) => (true, false),
      (None, Some(_)) => (false, true),
      (Some(x_name), Some(y_name)) if x_name == y_name => {
        if def_eq_app(&x, &y, ctx, tc)? {
          return Ok(DeltaResult::Found(true));
        }
        (true, true)
      },
      (Some(x_name), Some(y_name)) => {
        let later_y = tc.const_index(y_name) > tc.const_index(x_name);
        (!later_y, later_y)
      },
    };

    if unfold_x && let Some(next) = unfold_definition(&x, tc) {
      x = tc.whnf_core(&next, ctx)?;
    }
    if unfold_y && let Some(next) = unfold_definition(&y, tc) {
      y = tc.whnf_core(&next, ctx)?;
    }

    if let Some(quick) = def_eq_quick_check(&x, &y) {
      return Ok(DeltaResult::Found(quick));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::kernel::env::{Declaration, Environment};
  use crate::kernel::error::TcError;
  use crate::kernel::level::Level;
  use crate::kernel::name::Name;

  fn mk_name(s: &str) -> Name {
    Name::from_dotted(s)
  }

  fn cnst(s: &str) -> Expr {
    Expr::cnst(mk_name(s), vec![])
  }

  fn prop() -> Expr {
    Expr::sort(Level::zero())
  }

  /// `A : Prop`, `a b : A`, `f : A → A`, `id`, `id2 := id`.
  fn mk_env() -> Environment {
    let mut env = Environment::new();
    env.insert(Declaration::axiom(mk_name("A"), vec![], prop())).unwrap();
    env.insert(Declaration::axiom(mk_name("a"), vec![], cnst("A"))).unwrap();
    env.insert(Declaration::axiom(mk_name("b"), vec![], cnst("A"))).unwrap();
    env
      .insert(Declaration::axiom(mk_name("f"), vec![], Expr::arrow(cnst("A"), cnst("A"))))
      .unwrap();
    env
      .insert(Declaration::definition(
        mk_name("id"),
        vec![],
        Expr::arrow(cnst("A"), cnst("A")),
        Expr::lam(mk_name("x"), cnst("A"), Expr::bvar(0)),
      ))
      .unwrap();
    env
      .insert(Declaration::definition(
        mk_name("id2"),
        vec![],
        Expr::arrow(cnst("A"), cnst("A")),
        cnst("id"),
      ))
      .unwrap();
    env
  }

  fn is_def_eq(env: &Environment, x: &Expr, y: &Expr) -> bool {
    let mut tc = TypeChecker::new(env);
    def_eq(x, y, &LocalContext::new(), &mut tc).unwrap()
  }

  #[test]
  fn sorts_are_not_cumulative() {
    let env = Environment::new();
    assert!(!is_def_eq(&env, &prop(), &Expr::sort(Level::one())));
    let u = Level::param(mk_name("u"));
    let l = Level::max(u.clone(), u.clone());
    assert!(is_def_eq(&env, &Expr::sort(l), &Expr::sort(u)));
  }

  #[test]
  fn delta_both_sides() {
    let env = mk_env();
    let x = Expr::app(cnst("id2"), cnst("a"));
    let y = Expr::app(cnst("id"), cnst("a"));
    assert!(is_def_eq(&env, &x, &y));
    assert!(is_def_eq(&env, &x, &cnst("a")));
    assert!(!is_def_eq(&env, &x, &cnst("b")));
  }

  #[test]
  fn rigid_heads_compare_arguments() {
    let env = mk_env();
    let x = Expr::app(cnst("f"), Expr::app(cnst("id"), cnst("a")));
    let y = Expr::app(cnst("f"), cnst("a"));
    assert!(is_def_eq(&env, &x, &y));
    assert!(!is_def_eq(&env, &y, &Expr::app(cnst("f"), cnst("b"))));
  }

  #[test]
  fn binders_compare_bodies() {
    let env = mk_env();
    let x = Expr::lam(mk_name("x"), cnst("A"), Expr::app(cnst("id"), Expr::bvar(0)));
    let y = Expr::lam(mk_name("y"), cnst("A"), Expr::bvar(0));
    assert!(is_def_eq(&env, &x, &y));
    let p = Expr::pi(mk_name("x"), cnst("A"), cnst("A"));
    let q = Expr::pi(mk_name("x"), Expr::app(cnst("id"), cnst("a")), cnst("A"));
    assert!(!is_def_eq(&env, &p, &q));
  }

  #[test]
  fn no_eta() {
    let env = mk_env();
    let eta = Expr::lam(mk_name("x"), cnst("A"), Expr::app(cnst("f"), Expr::bvar(0)));
    assert!(!is_def_eq(&env, &eta, &cnst("f")));
  }

  #[test]
  fn pairs_and_projections() {
    let env = mk_env();
    let pair = Expr::pair(cnst("a"), cnst("b"));
    assert!(is_def_eq(&env, &Expr::proj1(pair.clone()), &cnst("a")));
    assert!(is_def_eq(&env, &Expr::proj2(pair.clone()), &cnst("b")));
    let swapped = Expr::pair(cnst("b"), cnst("a"));
    assert!(!is_def_eq(&env, &pair, &swapped));
  }

  #[test]
  fn let_values_in_context() {
    let env = mk_env();
    let ctx = LocalContext::new().push(mk_name("x"), cnst("A"), Some(cnst("a")));
    let mut tc = TypeChecker::new(&env);
    assert!(def_eq(&Expr::bvar(0), &cnst("a"), &ctx, &mut tc).unwrap());
  }

  #[test]
  fn same_head_compares_universe_arguments() {
    let mut env = mk_env();
    let u = mk_name("u");
    let sort_u = Expr::sort(Level::param(u.clone()));
    let typ = Expr::pi(mk_name("x"), Expr::bvar(0), Expr::bvar(1));
    let body = Expr::lam(mk_name("x"), Expr::bvar(0), Expr::bvar(0));
    env
      .insert(Declaration::definition(
        mk_name("pid"),
        vec![u],
        Expr::pi(mk_name("α"), sort_u.clone(), typ),
        Expr::lam(mk_name("α"), sort_u, body),
      ))
      .unwrap();
    let pid = |l: Level| Expr::cnst(mk_name("pid"), vec![l]);
    let u = Level::param(mk_name("u"));
    assert!(is_def_eq(&env, &pid(u.clone()), &pid(Level::max(u.clone(), u))));
    assert!(!is_def_eq(&env, &pid(Level::zero()), &pid(Level::one())));

    let x = Expr::app(Expr::app(pid(Level::one()), prop()), cnst("A"));
    let y = Expr::app(Expr::app(pid(Level::succ(Level::zero())), prop()), cnst("A"));
    assert!(is_def_eq(&env, &x, &y));
    let z = Expr::app(Expr::app(pid(Level::zero()), cnst("A")), cnst("a"));
    assert!(!is_def_eq(&env, &x, &z));
  }

  #[test]
  fn budget_is_reported() {
    let env = mk_env();
    let mut tc = TypeChecker::with_limit(&env, 100);
    let delta = Expr::lam(mk_name("x"), prop(), Expr::app(Expr::bvar(0), Expr::bvar(0)));
    let omega = Expr::app(delta.clone(), delta);
    assert!(matches!(
      def_eq(&omega, &cnst("a"), &LocalContext::new(), &mut tc),
      Err(TcError::ResourceExhausted { .. })
    ));
  }
}
