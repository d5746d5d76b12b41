use std::ops::Range;
use std::sync::Arc;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use super::def_eq::def_eq;
use super::env::{Declaration, Environment};
use super::error::{TcError, TcResult};
use super::expr::*;
use super::level::{self, Level};
use super::local_ctx::LocalContext;
use super::name::Name;
use super::whnf;

/// Default reduction budget per checker.
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

/// The kernel type checker.
///
/// One checker serves one declaration or query: it owns the step budget and
/// the memo tables, which only ever hold closed terms.
pub struct TypeChecker<'env> {
  pub env: &'env Environment,
  /// Constants at insertion positions `>= visible` are treated as unknown.
  pub visible: usize,
  pub max_steps: u64,
  pub steps: u64,
  pub cache_results: bool,
  pub whnf_cache: FxHashMap<Expr, Expr>,
  pub whnf_core_cache: FxHashMap<Expr, Expr>,
  pub infer_cache: FxHashMap<Expr, Expr>,
  pub def_eq_calls: u64,
  pub whnf_calls: u64,
  pub infer_calls: u64,
}

impl<'env> TypeChecker<'env> {
  pub fn new(env: &'env Environment) -> Self {
    Self::with_limit(env, DEFAULT_MAX_STEPS)
  }

  pub fn with_limit(env: &'env Environment, max_steps: u64) -> Self {
    TypeChecker {
      env,
      visible: env.len(),
      max_steps,
      steps: 0,
      cache_results: true,
      whnf_cache: FxHashMap::default(),
      whnf_core_cache: FxHashMap::default(),
      infer_cache: FxHashMap::default(),
      def_eq_calls: 0,
      whnf_calls: 0,
      infer_calls: 0,
    }
  }

  /// Charge one reduction step against the budget.
  pub fn tick(&mut self) -> TcResult<()> {
    self.steps += 1;
    if self.steps > self.max_steps {
      return Err(TcError::ResourceExhausted { limit: self.max_steps });
    }
    Ok(())
  }

  pub fn get_const(&self, name: &Name) -> Option<&'env Arc<Declaration>> {
    let env: &'env Environment = self.env;
    match env.get_full(name) {
      Some((idx, decl)) if idx < self.visible => Some(decl),
      _ => None,
    }
  }

  pub fn const_index(&self, name: &Name) -> Option<usize> {
    self.env.get_full(name).map(|(idx, _)| idx).filter(|idx| *idx < self.visible)
  }

  fn cacheable(&self, e: &Expr) -> bool {
    self.cache_results && !has_loose_bvars(e)
  }

  // ==========================================================================
  // WHNF with caching
  // ==========================================================================

  pub fn whnf(&mut self, e: &Expr, ctx: &LocalContext) -> TcResult<Expr> {
    if let Some(cached) = self.whnf_cache.get(e) {
      return Ok(cached.clone());
    }
    self.whnf_calls += 1;
    let result = whnf::whnf(e, ctx, self)?;
    if self.cacheable(e) {
      self.whnf_cache.insert(e.clone(), result.clone());
    }
    Ok(result)
  }

  pub fn whnf_core(&mut self, e: &Expr, ctx: &LocalContext) -> TcResult<Expr> {
    if let Some(cached) = self.whnf_core_cache.get(e) {
      return Ok(cached.clone());
    }
    let result = whnf::whnf_core(e, ctx, self)?;
    if self.cacheable(e) {
      self.whnf_core_cache.insert(e.clone(), result.clone());
    }
    Ok(result)
  }

  pub fn normalize(&mut self, e: &Expr, ctx: &LocalContext) -> TcResult<Expr> {
    whnf::normalize(e, ctx, self)
  }

  // ==========================================================================
  // Ensure helpers
  // ==========================================================================

  /// `ty` (the type of `expr`) must reduce to a Sort.
  pub fn ensure_sort(&mut self, ty: &Expr, expr: &Expr, ctx: &LocalContext) -> TcResult<Level> {
    if let ExprData::Sort(level) = ty.as_data() {
      return Ok(level.clone());
    }
    let whnfd = self.whnf(ty, ctx)?;
    match whnfd.as_data() {
      ExprData::Sort(level) => Ok(level.clone()),
      _ => Err(TcError::NotASort { expr: expr.clone(), inferred: ty.clone() }),
    }
  }

  /// `ty` (the type of `expr`) must reduce to a Pi; returns the Pi.
  pub fn ensure_pi(&mut self, ty: &Expr, expr: &Expr, ctx: &LocalContext) -> TcResult<Expr> {
    if let ExprData::Pi(..) = ty.as_data() {
      return Ok(ty.clone());
    }
    let whnfd = self.whnf(ty, ctx)?;
    match whnfd.as_data() {
      ExprData::Pi(..) => Ok(whnfd),
      _ => Err(TcError::NotAFunction { expr: expr.clone(), inferred: ty.clone() }),
    }
  }

  /// `ty` (the type of `expr`) must reduce to a Sigma; returns the Sigma.
  pub fn ensure_sigma(&mut self, ty: &Expr, expr: &Expr, ctx: &LocalContext) -> TcResult<Expr> {
    if let ExprData::Sigma(..) = ty.as_data() {
      return Ok(ty.clone());
    }
    let whnfd = self.whnf(ty, ctx)?;
    match whnfd.as_data() {
      ExprData::Sigma(..) => Ok(whnfd),
      _ => Err(TcError::NotAPair { expr: expr.clone(), inferred: ty.clone() }),
    }
  }

  /// Infer the type of `e` and ensure it's a sort; return the universe level.
  pub fn infer_sort_of(&mut self, e: &Expr, ctx: &LocalContext) -> TcResult<Level> {
    let ty = self.infer(e, ctx)?;
    self.ensure_sort(&ty, e, ctx)
  }

  // ==========================================================================
  // Type inference
  // ==========================================================================

  pub fn infer(&mut self, e: &Expr, ctx: &LocalContext) -> TcResult<Expr> {
    if let Some(cached) = self.infer_cache.get(e) {
      return Ok(cached.clone());
    }
    self.infer_calls += 1;
    trace!(call = self.infer_calls, expr = %e, "infer");
    let result = self.infer_core(e, ctx)?;
    if self.cacheable(e) {
      self.infer_cache.insert(e.clone(), result.clone());
    }
    Ok(result)
  }

  fn infer_core(&mut self, e: &Expr, ctx: &LocalContext) -> TcResult<Expr> {
    match e.as_data() {
      ExprData::Bvar(idx) => match ctx.type_of(*idx) {
        Some(ty) => Ok(shift(ty, 0, *idx as i64 + 1)),
        None => Err(TcError::LooseBoundVar { idx: *idx }),
      },
      ExprData::Fvar(name) => {
        Err(TcError::UnexpectedFreeVariable { name: name.clone() })
      },
      ExprData::Sort(level) => Ok(Expr::sort(Level::succ(level.clone()))),
      ExprData::Const(name, levels) => self.infer_const(name, levels),
      ExprData::App(f, a) => {
        let f_ty = self.infer(f, ctx)?;
        let pi = self.ensure_pi(&f_ty, f, ctx)?;
        let ExprData::Pi(_, dom, cod) = pi.as_data() else {
          unreachable!("ensure_pi returns a Pi")
        };
        self.check(a, dom, ctx)?;
        Ok(instantiate(cod, a))
      },
      ExprData::Lam(name, dom, body) => {
        self.infer_sort_of(dom, ctx)?;
        let inner = ctx.push(name.clone(), dom.clone(), None);
        let body_ty = self.infer(body, &inner)?;
        Ok(Expr::pi(name.clone(), dom.clone(), body_ty))
      },
      ExprData::Pi(name, dom, cod) | ExprData::Sigma(name, dom, cod) => {
        let l1 = self.infer_sort_of(dom, ctx)?;
        let inner = ctx.push(name.clone(), dom.clone(), None);
        let l2 = self.infer_sort_of(cod, &inner)?;
        Ok(Expr::sort(level::normalize(&Level::max(l1, l2))))
      },
      ExprData::Let(name, ty, val, body) => {
        self.infer_sort_of(ty, ctx)?;
        self.check(val, ty, ctx)?;
        let inner = ctx.push(name.clone(), ty.clone(), Some(val.clone()));
        let body_ty = self.infer(body, &inner)?;
        Ok(instantiate(&body_ty, val))
      },
      ExprData::Pair(a, b) => {
        let a_ty = self.infer(a, ctx)?;
        let b_ty = self.infer(b, ctx)?;
        Ok(Expr::prod(a_ty, b_ty))
      },
      ExprData::Proj1(p) => {
        let p_ty = self.infer(p, ctx)?;
        let sigma = self.ensure_sigma(&p_ty, p, ctx)?;
        let ExprData::Sigma(_, fst, _) = sigma.as_data() else {
          unreachable!("ensure_sigma returns a Sigma")
        };
        Ok(fst.clone())
      },
      ExprData::Proj2(p) => {
        let p_ty = self.infer(p, ctx)?;
        let sigma = self.ensure_sigma(&p_ty, p, ctx)?;
        let ExprData::Sigma(_, _, snd) = sigma.as_data() else {
          unreachable!("ensure_sigma returns a Sigma")
        };
        Ok(instantiate(snd, &Expr::proj1(p.clone())))
      },
    }
  }

  fn infer_const(&mut self, name: &Name, levels: &[Level]) -> TcResult<Expr> {
    let decl = self
      .get_const(name)
      .ok_or_else(|| TcError::UnknownConstant { name: name.clone() })?;
    if decl.universe_params.len() != levels.len() {
      return Err(TcError::UniverseArityMismatch {
        name: name.clone(),
        expected: decl.universe_params.len(),
        found: levels.len(),
      });
    }
    Ok(subst_levels(&decl.typ, &decl.universe_params, levels))
  }

  // ==========================================================================
  // Checking against an expected type
  // ==========================================================================

  /// Check `e` against `expected`. Lambdas, lets and pairs are pushed into
  /// the expected type; everything else is inferred and compared.
  pub fn check(&mut self, e: &Expr, expected: &Expr, ctx: &LocalContext) -> TcResult<()> {
    match e.as_data() {
      ExprData::Lam(name, dom, body) => {
        let target = self.whnf(expected, ctx)?;
        if let ExprData::Pi(_, exp_dom, exp_cod) = target.as_data() {
          self.infer_sort_of(dom, ctx)?;
          if self.def_eq(dom, exp_dom, ctx)? {
            let inner = ctx.push(name.clone(), dom.clone(), None);
            return self.check(body, exp_cod, &inner);
          }
        }
      },
      ExprData::Let(name, ty, val, body) => {
        self.infer_sort_of(ty, ctx)?;
        self.check(val, ty, ctx)?;
        let inner = ctx.push(name.clone(), ty.clone(), Some(val.clone()));
        return self.check(body, &shift(expected, 0, 1), &inner);
      },
      ExprData::Pair(a, b) => {
        let target = self.whnf(expected, ctx)?;
        if let ExprData::Sigma(_, fst, snd) = target.as_data() {
          self.check(a, fst, ctx)?;
          return self.check(b, &instantiate(snd, a), ctx);
        }
      },
      _ => {},
    }
    let inferred = self.infer(e, ctx)?;
    self.assert_def_eq(&inferred, expected, e, ctx)
  }

  // ==========================================================================
  // Definitional equality (delegated to def_eq module)
  // ==========================================================================

  pub fn def_eq(&mut self, x: &Expr, y: &Expr, ctx: &LocalContext) -> TcResult<bool> {
    self.def_eq_calls += 1;
    let result = def_eq(x, y, ctx, self)?;
    trace!(call = self.def_eq_calls, %x, %y, result, "def_eq");
    Ok(result)
  }

  /// `found` (the type of `expr`) must be definitionally equal to `expected`.
  pub fn assert_def_eq(
    &mut self,
    found: &Expr,
    expected: &Expr,
    expr: &Expr,
    ctx: &LocalContext,
  ) -> TcResult<()> {
    if self.def_eq(found, expected, ctx)? {
      Ok(())
    } else {
      Err(TcError::TypeMismatch {
        expected: expected.clone(),
        found: found.clone(),
        expr: expr.clone(),
      })
    }
  }

  // ==========================================================================
  // Declaration checking
  // ==========================================================================

  /// Closed, free of named variables, and every universe parameter declared.
  fn check_term_hygiene(&self, decl: &Declaration, e: &Expr) -> TcResult<()> {
    if has_loose_bvars(e) {
      return Err(TcError::LooseBoundVar { idx: e.bvar_range() - 1 });
    }
    if let Some(name) = collect_fvars(e).into_iter().next() {
      return Err(TcError::UnexpectedFreeVariable { name });
    }
    if !all_expr_uparams_defined(e, &decl.universe_params) {
      return Err(TcError::UndeclaredUniverse { name: decl.name.clone() });
    }
    Ok(())
  }

  /// Check a single declaration against the visible environment. The
  /// environment itself is not modified.
  pub fn check_declaration(&mut self, decl: &Declaration) -> TcResult<()> {
    debug!(name = %decl.name, "checking declaration");
    if !level::no_dupes_all_params(&decl.universe_params) {
      let dup = decl
        .universe_params
        .iter()
        .enumerate()
        .find(|(i, p)| decl.universe_params[..*i].contains(*p))
        .map(|(_, p)| p.clone())
        .unwrap_or_else(|| decl.name.clone());
      return Err(TcError::DuplicateUniverse { name: dup });
    }

    let ctx = LocalContext::new();
    self.check_term_hygiene(decl, &decl.typ)?;
    self.infer_sort_of(&decl.typ, &ctx)?;

    if let Some(value) = &decl.value {
      self.check_term_hygiene(decl, value)?;
      self.check(value, &decl.typ, &ctx)?;
    }
    debug!(name = %decl.name, steps = self.steps, "declaration ok");
    Ok(())
  }
}

/// Check all declarations in an environment in parallel. Each declaration
/// only sees the ones inserted before it.
pub fn check_env(env: &Environment, max_steps: u64) -> Vec<(Name, TcError)> {
  check_env_range(env, 0..env.len(), max_steps)
}

/// Like [`check_env`], restricted to the declarations at `range`.
pub fn check_env_range(
  env: &Environment,
  range: Range<usize>,
  max_steps: u64,
) -> Vec<(Name, TcError)> {
  let failures: Vec<(Name, TcError)> = range
    .into_par_iter()
    .filter_map(|idx| {
      let decl = env.get_index(idx)?;
      let mut tc = TypeChecker::with_limit(env, max_steps);
      tc.visible = idx;
      match tc.check_declaration(decl) {
        Ok(()) => None,
        Err(e) => Some((decl.name.clone(), e)),
      }
    })
    .collect();
  for (name, err) in &failures {
    warn!(%name, %err, "declaration failed re-verification");
  }
  failures
}
