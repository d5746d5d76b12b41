//! Kernel terms.
//!
//! Terms are immutable, reference counted and use de Bruijn indices for bound
//! variables. Every node caches two facts computed at construction:
//!
//! - a structural hash that ignores binder display names, so alpha-equivalent
//!   terms always hash alike;
//! - its loose bound-variable range: one more than the largest index that
//!   escapes the node (0 for closed terms). `shift` and `subst` use it to skip
//!   closed sub-terms.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::{FxHashSet, FxHasher};

use super::level::{self, Level};
use super::name::Name;

#[derive(Clone)]
pub struct Expr(Arc<ExprNode>);

struct ExprNode {
  data: ExprData,
  hash: u64,
  bvar_range: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ExprData {
  /// Bound variable (de Bruijn index).
  Bvar(u64),
  /// Named free variable; only lives between name resolution and
  /// auto-abstraction, never inside a checked declaration.
  Fvar(Name),
  Sort(Level),
  /// Constant reference with universe arguments.
  Const(Name, Vec<Level>),
  App(Expr, Expr),
  /// Binder name, domain, body.
  Lam(Name, Expr, Expr),
  /// Dependent function type: binder name, domain, codomain family.
  Pi(Name, Expr, Expr),
  /// Binder name, type, value, body.
  Let(Name, Expr, Expr, Expr),
  /// Dependent pair type: binder name, first type, second type family.
  Sigma(Name, Expr, Expr),
  Pair(Expr, Expr),
  Proj1(Expr),
  Proj2(Expr),
}

impl Expr {
  fn mk(data: ExprData) -> Self {
    let hasher = &mut FxHasher::default();
    let bvar_range = match &data {
      ExprData::Bvar(i) => {
        (0u8, i).hash(hasher);
        i.saturating_add(1)
      },
      ExprData::Fvar(n) => {
        (1u8, n).hash(hasher);
        0
      },
      ExprData::Sort(l) => {
        (2u8, l).hash(hasher);
        0
      },
      ExprData::Const(n, ls) => {
        (3u8, n, ls).hash(hasher);
        0
      },
      ExprData::App(f, a) => {
        (4u8, f.0.hash, a.0.hash).hash(hasher);
        f.bvar_range().max(a.bvar_range())
      },
      ExprData::Lam(_, t, b) => {
        (5u8, t.0.hash, b.0.hash).hash(hasher);
        binder_range(t, b)
      },
      ExprData::Pi(_, t, b) => {
        (6u8, t.0.hash, b.0.hash).hash(hasher);
        binder_range(t, b)
      },
      ExprData::Let(_, t, v, b) => {
        (7u8, t.0.hash, v.0.hash, b.0.hash).hash(hasher);
        binder_range(t, b).max(v.bvar_range())
      },
      ExprData::Sigma(_, t, b) => {
        (8u8, t.0.hash, b.0.hash).hash(hasher);
        binder_range(t, b)
      },
      ExprData::Pair(a, b) => {
        (9u8, a.0.hash, b.0.hash).hash(hasher);
        a.bvar_range().max(b.bvar_range())
      },
      ExprData::Proj1(p) => {
        (10u8, p.0.hash).hash(hasher);
        p.bvar_range()
      },
      ExprData::Proj2(p) => {
        (11u8, p.0.hash).hash(hasher);
        p.bvar_range()
      },
    };
    Expr(Arc::new(ExprNode { data, hash: hasher.finish(), bvar_range }))
  }

  pub fn as_data(&self) -> &ExprData {
    &self.0.data
  }
  pub fn get_hash(&self) -> u64 {
    self.0.hash
  }
  /// One more than the largest loose bound variable; 0 when closed.
  pub fn bvar_range(&self) -> u64 {
    self.0.bvar_range
  }
  pub fn ptr_eq(&self, other: &Expr) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }

  pub fn bvar(i: u64) -> Self {
    Expr::mk(ExprData::Bvar(i))
  }
  pub fn fvar(n: Name) -> Self {
    Expr::mk(ExprData::Fvar(n))
  }
  pub fn sort(l: Level) -> Self {
    Expr::mk(ExprData::Sort(l))
  }
  pub fn cnst(n: Name, us: Vec<Level>) -> Self {
    Expr::mk(ExprData::Const(n, us))
  }
  pub fn app(f: Expr, a: Expr) -> Self {
    Expr::mk(ExprData::App(f, a))
  }
  pub fn lam(n: Name, t: Expr, b: Expr) -> Self {
    Expr::mk(ExprData::Lam(n, t, b))
  }
  pub fn pi(n: Name, t: Expr, b: Expr) -> Self {
    Expr::mk(ExprData::Pi(n, t, b))
  }
  #[allow(non_snake_case)]
  pub fn letE(n: Name, t: Expr, v: Expr, b: Expr) -> Self {
    Expr::mk(ExprData::Let(n, t, v, b))
  }
  pub fn sigma(n: Name, t: Expr, b: Expr) -> Self {
    Expr::mk(ExprData::Sigma(n, t, b))
  }
  pub fn pair(a: Expr, b: Expr) -> Self {
    Expr::mk(ExprData::Pair(a, b))
  }
  pub fn proj1(p: Expr) -> Self {
    Expr::mk(ExprData::Proj1(p))
  }
  pub fn proj2(p: Expr) -> Self {
    Expr::mk(ExprData::Proj2(p))
  }

  /// Non-dependent function type `a → b`; `b` is given in the outer scope.
  pub fn arrow(a: Expr, b: Expr) -> Self {
    Expr::pi(Name::anon(), a, shift(&b, 0, 1))
  }
  /// Non-dependent pair type `a × b`; `b` is given in the outer scope.
  pub fn prod(a: Expr, b: Expr) -> Self {
    Expr::sigma(Name::anon(), a, shift(&b, 0, 1))
  }
}

fn binder_range(t: &Expr, b: &Expr) -> u64 {
  t.bvar_range().max(b.bvar_range().saturating_sub(1))
}

impl PartialEq for Expr {
  fn eq(&self, other: &Self) -> bool {
    self.ptr_eq(other) || (self.0.hash == other.0.hash && self.0.data == other.0.data)
  }
}

impl Eq for Expr {}

impl Hash for Expr {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.0.hash.hash(state);
  }
}

impl fmt::Debug for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.as_data().fmt(f)
  }
}

// ============================================================================
// Traversal
// ============================================================================

/// Rebuild `e` bottom-up, letting `f` replace any sub-term. `f` receives the
/// sub-term and the number of binders crossed to reach it.
fn replace<F>(e: &Expr, offset: u64, f: &mut F) -> Expr
where
  F: FnMut(&Expr, u64) -> Option<Expr>,
{
  if let Some(r) = f(e, offset) {
    return r;
  }
  match e.as_data() {
    ExprData::Bvar(_)
    | ExprData::Fvar(_)
    | ExprData::Sort(_)
    | ExprData::Const(..) => e.clone(),
    ExprData::App(fun, arg) => {
      Expr::app(replace(fun, offset, f), replace(arg, offset, f))
    },
    ExprData::Lam(n, t, b) => Expr::lam(
      n.clone(),
      replace(t, offset, f),
      replace(b, offset + 1, f),
    ),
    ExprData::Pi(n, t, b) => Expr::pi(
      n.clone(),
      replace(t, offset, f),
      replace(b, offset + 1, f),
    ),
    ExprData::Let(n, t, v, b) => Expr::letE(
      n.clone(),
      replace(t, offset, f),
      replace(v, offset, f),
      replace(b, offset + 1, f),
    ),
    ExprData::Sigma(n, t, b) => Expr::sigma(
      n.clone(),
      replace(t, offset, f),
      replace(b, offset + 1, f),
    ),
    ExprData::Pair(a, b) => {
      Expr::pair(replace(a, offset, f), replace(b, offset, f))
    },
    ExprData::Proj1(p) => Expr::proj1(replace(p, offset, f)),
    ExprData::Proj2(p) => Expr::proj2(replace(p, offset, f)),
  }
}

/// Adjust every bound variable `>= cutoff` by `delta`.
///
/// A negative `delta` must not push an index below `cutoff`; callers only
/// lower indices that are known not to occur.
pub fn shift(e: &Expr, cutoff: u64, delta: i64) -> Expr {
  if delta == 0 || e.bvar_range() <= cutoff {
    return e.clone();
  }
  replace(e, 0, &mut |sub, offset| {
    let cutoff = cutoff + offset;
    if sub.bvar_range() <= cutoff {
      return Some(sub.clone());
    }
    match sub.as_data() {
      ExprData::Bvar(i) => {
        let shifted = *i as i64 + delta;
        debug_assert!(shifted >= cutoff as i64, "shift below cutoff");
        Some(Expr::bvar(shifted.max(0) as u64))
      },
      _ => None,
    }
  })
}

/// Replace bound variable `idx` by `replacement` and close the gap: indices
/// above `idx` drop by one. `replacement` lives in the resulting scope and is
/// shifted as it moves under binders.
pub fn subst(e: &Expr, idx: u64, replacement: &Expr) -> Expr {
  if e.bvar_range() <= idx {
    return e.clone();
  }
  replace(e, 0, &mut |sub, offset| {
    let target = idx + offset;
    if sub.bvar_range() <= target {
      return Some(sub.clone());
    }
    match sub.as_data() {
      ExprData::Bvar(i) if *i == target => Some(shift(replacement, 0, offset as i64)),
      ExprData::Bvar(i) if *i > target => Some(Expr::bvar(i - 1)),
      ExprData::Bvar(_) => Some(sub.clone()),
      _ => None,
    }
  })
}

/// Instantiate `body` (which sits under one binder) with `arg`.
pub fn instantiate(body: &Expr, arg: &Expr) -> Expr {
  subst(body, 0, arg)
}

/// Substitute universe parameters throughout a term.
pub fn subst_levels(e: &Expr, params: &[Name], values: &[Level]) -> Expr {
  if params.is_empty() {
    return e.clone();
  }
  replace(e, 0, &mut |sub, _| match sub.as_data() {
    ExprData::Sort(l) => Some(Expr::sort(level::subst_level(l, params, values))),
    ExprData::Const(n, ls) => Some(Expr::cnst(
      n.clone(),
      ls.iter().map(|l| level::subst_level(l, params, values)).collect(),
    )),
    _ => None,
  })
}

/// Rewrite constant references. `f` returns the replacement, or `None` to
/// keep the reference as is.
pub fn replace_consts<F>(e: &Expr, mut f: F) -> Expr
where
  F: FnMut(&Name, &[Level]) -> Option<Expr>,
{
  replace(e, 0, &mut |sub, _| match sub.as_data() {
    ExprData::Const(n, ls) => f(n, ls).or_else(|| Some(sub.clone())),
    _ => None,
  })
}

/// Replace the named free variables by bound variables. Follows the
/// telescope convention: `fvars[0]` (outermost) becomes `Bvar(n-1+offset)`,
/// `fvars[n-1]` (innermost) becomes `Bvar(offset)`.
pub fn abstract_fvars(e: &Expr, fvars: &[Name]) -> Expr {
  if fvars.is_empty() || !has_fvars(e) {
    return e.clone();
  }
  let n = fvars.len() as u64;
  replace(e, 0, &mut |sub, offset| match sub.as_data() {
    ExprData::Fvar(name) => {
      let pos = fvars.iter().position(|fv| fv == name)? as u64;
      Some(Expr::bvar(n - 1 - pos + offset))
    },
    _ => None,
  })
}

/// Whether two terms are equal up to binder display names.
pub fn alpha_eq(a: &Expr, b: &Expr) -> bool {
  if a.ptr_eq(b) {
    return true;
  }
  if a.get_hash() != b.get_hash() {
    return false;
  }
  match (a.as_data(), b.as_data()) {
    (ExprData::Bvar(i), ExprData::Bvar(j)) => i == j,
    (ExprData::Fvar(x), ExprData::Fvar(y)) => x == y,
    (ExprData::Sort(l), ExprData::Sort(r)) => l == r,
    (ExprData::Const(x, ls), ExprData::Const(y, rs)) => x == y && ls == rs,
    (ExprData::App(f1, a1), ExprData::App(f2, a2))
    | (ExprData::Lam(_, f1, a1), ExprData::Lam(_, f2, a2))
    | (ExprData::Pi(_, f1, a1), ExprData::Pi(_, f2, a2))
    | (ExprData::Sigma(_, f1, a1), ExprData::Sigma(_, f2, a2))
    | (ExprData::Pair(f1, a1), ExprData::Pair(f2, a2)) => {
      alpha_eq(f1, f2) && alpha_eq(a1, a2)
    },
    (ExprData::Let(_, t1, v1, b1), ExprData::Let(_, t2, v2, b2)) => {
      alpha_eq(t1, t2) && alpha_eq(v1, v2) && alpha_eq(b1, b2)
    },
    (ExprData::Proj1(p), ExprData::Proj1(q))
    | (ExprData::Proj2(p), ExprData::Proj2(q)) => alpha_eq(p, q),
    _ => false,
  }
}

// ============================================================================
// Queries
// ============================================================================

pub fn has_loose_bvars(e: &Expr) -> bool {
  e.bvar_range() > 0
}

/// Immediate sub-terms, left to right.
pub fn children(e: &Expr) -> Vec<&Expr> {
  match e.as_data() {
    ExprData::Bvar(_)
    | ExprData::Fvar(_)
    | ExprData::Sort(_)
    | ExprData::Const(..) => vec![],
    ExprData::App(a, b)
    | ExprData::Lam(_, a, b)
    | ExprData::Pi(_, a, b)
    | ExprData::Sigma(_, a, b)
    | ExprData::Pair(a, b) => vec![a, b],
    ExprData::Let(_, t, v, b) => vec![t, v, b],
    ExprData::Proj1(p) | ExprData::Proj2(p) => vec![p],
  }
}

/// Check if expression contains any free variables (Fvar).
pub fn has_fvars(e: &Expr) -> bool {
  let mut stack: Vec<&Expr> = vec![e];
  while let Some(e) = stack.pop() {
    if let ExprData::Fvar(..) = e.as_data() {
      return true;
    }
    stack.extend(children(e));
  }
  false
}

/// Free variable names in order of first occurrence.
pub fn collect_fvars(e: &Expr) -> Vec<Name> {
  let mut seen = FxHashSet::default();
  let mut out = Vec::new();
  let mut stack: Vec<&Expr> = vec![e];
  while let Some(e) = stack.pop() {
    if let ExprData::Fvar(n) = e.as_data() {
      if seen.insert(n.clone()) {
        out.push(n.clone());
      }
      continue;
    }
    stack.extend(children(e).into_iter().rev());
  }
  out
}

/// Constant names in order of first occurrence.
pub fn collect_consts(e: &Expr) -> Vec<Name> {
  let mut seen = FxHashSet::default();
  let mut out = Vec::new();
  let mut stack: Vec<&Expr> = vec![e];
  while let Some(e) = stack.pop() {
    if let ExprData::Const(n, _) = e.as_data() {
      if seen.insert(n.clone()) {
        out.push(n.clone());
      }
      continue;
    }
    stack.extend(children(e).into_iter().rev());
  }
  out
}

/// Check that all universe parameters in an expression are contained in `params`.
pub fn all_expr_uparams_defined(e: &Expr, params: &[Name]) -> bool {
  let mut stack: Vec<&Expr> = vec![e];
  while let Some(e) = stack.pop() {
    match e.as_data() {
      ExprData::Sort(l) => {
        if !level::all_uparams_defined(l, params) {
          return false;
        }
      },
      ExprData::Const(_, ls) => {
        if !ls.iter().all(|l| level::all_uparams_defined(l, params)) {
          return false;
        }
      },
      _ => stack.extend(children(e)),
    }
  }
  true
}

/// Decompose `f a1 a2 ... an` into `(f, [a1, a2, ..., an])`.
pub fn unfold_apps(e: &Expr) -> (Expr, Vec<Expr>) {
  let mut args = Vec::new();
  let mut cursor = e.clone();
  while let ExprData::App(f, a) = cursor.as_data() {
    args.push(a.clone());
    let next = f.clone();
    cursor = next;
  }
  args.reverse();
  (cursor, args)
}

/// Reconstruct `f a1 a2 ... an`.
pub fn foldl_apps(mut fun: Expr, args: impl IntoIterator<Item = Expr>) -> Expr {
  for arg in args {
    fun = Expr::app(fun, arg);
  }
  fun
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names = Vec::new();
    fmt_expr(self, &mut names, f)
  }
}

fn binder_name(n: &Name) -> String {
  if n.is_anon() { "_".to_owned() } else { n.pretty() }
}

fn is_atomic(e: &Expr) -> bool {
  matches!(
    e.as_data(),
    ExprData::Bvar(_)
      | ExprData::Fvar(_)
      | ExprData::Const(..)
      | ExprData::Pair(..)
      | ExprData::Proj1(_)
      | ExprData::Proj2(_)
  )
}

fn fmt_arg(e: &Expr, names: &mut Vec<String>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
  if is_atomic(e) {
    fmt_expr(e, names, f)
  } else {
    write!(f, "(")?;
    fmt_expr(e, names, f)?;
    write!(f, ")")
  }
}

fn fmt_under(
  body: &Expr,
  n: &Name,
  names: &mut Vec<String>,
  f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
  names.push(binder_name(n));
  let r = fmt_expr(body, names, f);
  names.pop();
  r
}

fn fmt_expr(e: &Expr, names: &mut Vec<String>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
  match e.as_data() {
    ExprData::Bvar(i) => match names.len().checked_sub(1 + *i as usize) {
      Some(pos) if names[pos] != "_" => write!(f, "{}", names[pos]),
      _ => write!(f, "#{i}"),
    },
    ExprData::Fvar(n) => write!(f, "{n}"),
    ExprData::Sort(l) => write!(f, "Sort {l}"),
    ExprData::Const(n, ls) if ls.is_empty() => write!(f, "{n}"),
    ExprData::Const(n, ls) => {
      let ls: Vec<String> = ls.iter().map(|l| l.to_string()).collect();
      write!(f, "{n}.{{{}}}", ls.join(", "))
    },
    ExprData::App(..) => {
      let (head, args) = unfold_apps(e);
      fmt_arg(&head, names, f)?;
      for arg in &args {
        write!(f, " ")?;
        fmt_arg(arg, names, f)?;
      }
      Ok(())
    },
    ExprData::Lam(n, t, b) => {
      write!(f, "fun ({} : ", binder_name(n))?;
      fmt_expr(t, names, f)?;
      write!(f, ") => ")?;
      fmt_under(b, n, names, f)
    },
    ExprData::Pi(n, t, b) => {
      write!(f, "({} : ", binder_name(n))?;
      fmt_expr(t, names, f)?;
      write!(f, ") → ")?;
      fmt_under(b, n, names, f)
    },
    ExprData::Let(n, t, v, b) => {
      write!(f, "let {} : ", binder_name(n))?;
      fmt_expr(t, names, f)?;
      write!(f, " := ")?;
      fmt_expr(v, names, f)?;
      write!(f, "; ")?;
      fmt_under(b, n, names, f)
    },
    ExprData::Sigma(n, t, b) => {
      write!(f, "({} : ", binder_name(n))?;
      fmt_expr(t, names, f)?;
      write!(f, ") × ")?;
      fmt_under(b, n, names, f)
    },
    ExprData::Pair(a, b) => {
      write!(f, "(")?;
      fmt_expr(a, names, f)?;
      write!(f, ", ")?;
      fmt_expr(b, names, f)?;
      write!(f, ")")
    },
    ExprData::Proj1(p) => {
      fmt_arg(p, names, f)?;
      write!(f, ".1")
    },
    ExprData::Proj2(p) => {
      fmt_arg(p, names, f)?;
      write!(f, ".2")
    },
  }
}
