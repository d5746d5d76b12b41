//! Namespaces, sections and section variables.
//!
//! A [`Scope`] is a stack of frames. Namespace frames contribute to the
//! qualifying prefix of new declarations; section frames only delimit the
//! lifetime of variables and `open`s. Every frame owns the namespaces opened
//! and the variables declared while it was innermost.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::kernel::env::Environment;
use crate::kernel::expr::{
  Expr, abstract_fvars, collect_consts, collect_fvars, instantiate, replace_consts,
};
use crate::kernel::local_ctx::LocalContext;
use crate::kernel::name::Name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
  UnresolvedName { name: Name },
  AmbiguousName { name: Name, candidates: Vec<Name> },
  /// A variable or constant of this name is already in scope.
  NameCollision { name: Name },
  UnknownNamespace { name: Name },
  /// Close of a frame that is not the innermost one.
  MismatchedClose { kind: FrameKind, expected: Option<Name>, found: Option<Name> },
  NothingOpen { kind: FrameKind },
}

impl fmt::Display for ScopeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ScopeError::UnresolvedName { name } => write!(f, "unknown identifier '{name}'"),
      ScopeError::AmbiguousName { name, candidates } => {
        let list: Vec<String> = candidates.iter().map(Name::pretty).collect();
        write!(f, "ambiguous identifier '{name}', candidates: {}", list.join(", "))
      },
      ScopeError::NameCollision { name } => {
        write!(f, "'{name}' is already declared in this scope")
      },
      ScopeError::UnknownNamespace { name } => write!(f, "unknown namespace '{name}'"),
      ScopeError::MismatchedClose { kind, expected, found } => {
        let show = |n: &Option<Name>| n.as_ref().map_or("<anonymous>".to_owned(), Name::pretty);
        write!(
          f,
          "invalid 'end', expected {kind} {} but found {}",
          show(expected),
          show(found)
        )
      },
      ScopeError::NothingOpen { kind } => write!(f, "no open {kind} to close"),
    }
  }
}

impl std::error::Error for ScopeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
  Root,
  Namespace,
  Section,
}

impl fmt::Display for FrameKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FrameKind::Root => write!(f, "root scope"),
      FrameKind::Namespace => write!(f, "namespace"),
      FrameKind::Section => write!(f, "section"),
    }
  }
}

/// A section variable. `typ` mentions earlier variables as `Fvar`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionVar {
  pub name: Name,
  pub typ: Expr,
  /// Global declaration order, used to order abstracted binders.
  pub order: usize,
}

#[derive(Debug, Clone)]
struct Frame {
  kind: FrameKind,
  name: Option<Name>,
  opened: Vec<Name>,
  variables: Vec<SectionVar>,
}

impl Frame {
  fn new(kind: FrameKind, name: Option<Name>) -> Self {
    Frame { kind, name, opened: Vec::new(), variables: Vec::new() }
  }
}

/// What a short name refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
  Variable(Name),
  Constant(Name),
}

#[derive(Debug, Clone)]
pub struct Scope {
  frames: Vec<Frame>,
  next_order: usize,
}

impl Default for Scope {
  fn default() -> Self {
    Scope { frames: vec![Frame::new(FrameKind::Root, None)], next_order: 0 }
  }
}

impl Scope {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of frames opened above the root.
  pub fn depth(&self) -> usize {
    self.frames.len() - 1
  }

  pub fn current_namespace(&self) -> Name {
    self
      .frames
      .iter()
      .filter(|fr| fr.kind == FrameKind::Namespace)
      .filter_map(|fr| fr.name.as_ref())
      .fold(Name::anon(), |acc, n| acc.join(n))
  }

  /// Namespace prefixes from the innermost namespace out to the root.
  fn namespace_chain(&self) -> Vec<Name> {
    let mut chain = vec![Name::anon()];
    let mut ns = Name::anon();
    for fr in &self.frames {
      if let (FrameKind::Namespace, Some(n)) = (fr.kind, &fr.name) {
        for seg in n.components() {
          ns = ns.append(seg);
          chain.push(ns.clone());
        }
      }
    }
    chain.reverse();
    chain
  }

  pub fn qualify(&self, short: &Name) -> Name {
    self.current_namespace().join(short)
  }

  fn innermost(&mut self) -> &mut Frame {
    // the root frame is never popped
    let last = self.frames.len() - 1;
    &mut self.frames[last]
  }

  pub fn open_namespace(&mut self, name: Name) {
    debug!(namespace = %name, "open namespace");
    self.frames.push(Frame::new(FrameKind::Namespace, Some(name)));
  }

  pub fn close_namespace(&mut self, name: Option<&Name>) -> Result<(), ScopeError> {
    self.close(FrameKind::Namespace, name)
  }

  pub fn open_section(&mut self, name: Option<Name>) {
    debug!(section = ?name, "open section");
    self.frames.push(Frame::new(FrameKind::Section, name));
  }

  pub fn close_section(&mut self, name: Option<&Name>) -> Result<(), ScopeError> {
    self.close(FrameKind::Section, name)
  }

  /// Pop the innermost frame. It must be of `kind`; when a name is given it
  /// must match the frame's name.
  fn close(&mut self, kind: FrameKind, name: Option<&Name>) -> Result<(), ScopeError> {
    if self.frames.len() == 1 {
      return Err(ScopeError::NothingOpen { kind });
    }
    let top = self.innermost();
    let name_ok = match name {
      Some(n) => top.name.as_ref() == Some(n),
      None => true,
    };
    if top.kind != kind || !name_ok {
      return Err(ScopeError::MismatchedClose {
        kind: top.kind,
        expected: top.name.clone(),
        found: name.cloned(),
      });
    }
    let closed = self.frames.pop();
    debug!(?kind, name = ?closed.and_then(|fr| fr.name), "closed scope");
    Ok(())
  }

  /// Make the declarations under `ns` visible by their short names until the
  /// current frame closes. `ns` is tried relative to the current namespace
  /// first, then outward. Returns the namespace actually opened.
  pub fn open(&mut self, ns: &Name, env: &Environment) -> Result<Name, ScopeError> {
    let target = self
      .namespace_chain()
      .into_iter()
      .map(|prefix| prefix.join(ns))
      .find(|cand| env.has_namespace(cand))
      .ok_or_else(|| ScopeError::UnknownNamespace { name: ns.clone() })?;
    debug!(namespace = %target, "open");
    self.innermost().opened.push(target.clone());
    Ok(target)
  }

  pub fn variables(&self) -> impl Iterator<Item = &SectionVar> {
    self.frames.iter().flat_map(|fr| fr.variables.iter())
  }

  fn variable(&self, name: &Name) -> Option<&SectionVar> {
    self.variables().find(|v| &v.name == name)
  }

  /// Record a section variable in the innermost frame. `typ` must already
  /// be resolved.
  pub fn declare_variable(
    &mut self,
    name: Name,
    typ: Expr,
    env: &Environment,
  ) -> Result<(), ScopeError> {
    if self.variable(&name).is_some() || env.contains(&self.qualify(&name)) {
      return Err(ScopeError::NameCollision { name });
    }
    let order = self.next_order;
    self.next_order += 1;
    debug!(variable = %name, %typ, "declare variable");
    self.innermost().variables.push(SectionVar { name, typ, order });
    Ok(())
  }

  /// Resolve a short name: section variables first, then the namespace
  /// chain from the innermost namespace to the root, then opened namespaces.
  pub fn resolve(&self, short: &Name, env: &Environment) -> Result<Resolved, ScopeError> {
    if let Some(var) = self.variable(short) {
      return Ok(Resolved::Variable(var.name.clone()));
    }
    for prefix in self.namespace_chain() {
      let cand = prefix.join(short);
      if env.contains(&cand) {
        return Ok(Resolved::Constant(cand));
      }
    }
    let mut candidates: Vec<Name> = Vec::new();
    for ns in self.frames.iter().flat_map(|fr| fr.opened.iter()) {
      let cand = ns.join(short);
      if env.contains(&cand) && !candidates.contains(&cand) {
        candidates.push(cand);
      }
    }
    match candidates.len() {
      0 => Err(ScopeError::UnresolvedName { name: short.clone() }),
      1 => Ok(Resolved::Constant(candidates.remove(0))),
      _ => Err(ScopeError::AmbiguousName { name: short.clone(), candidates }),
    }
  }

  /// Rewrite every constant reference of a raw term to its qualified name,
  /// or to an `Fvar` when it names a section variable.
  pub fn resolve_term(&self, e: &Expr, env: &Environment) -> Result<Expr, ScopeError> {
    let mut table: FxHashMap<Name, Resolved> = FxHashMap::default();
    for name in collect_consts(e) {
      let resolved = self.resolve(&name, env)?;
      table.insert(name, resolved);
    }
    Ok(replace_consts(e, |n, ls| match table.get(n)? {
      Resolved::Constant(q) => Some(Expr::cnst(q.clone(), ls.to_vec())),
      Resolved::Variable(v) => Some(Expr::fvar(v.clone())),
    }))
  }

  /// The section variables `terms` depend on, directly or through the types
  /// of other variables, in declaration order.
  pub fn abstraction_for(&self, terms: &[&Expr]) -> Abstraction {
    let mut seen: FxHashSet<Name> = FxHashSet::default();
    let mut vars: Vec<SectionVar> = Vec::new();
    let mut pending: Vec<Name> = terms.iter().flat_map(|t| collect_fvars(t)).collect();
    while let Some(name) = pending.pop() {
      if !seen.insert(name.clone()) {
        continue;
      }
      if let Some(var) = self.variable(&name) {
        pending.extend(collect_fvars(&var.typ));
        vars.push(var.clone());
      }
    }
    vars.sort_by_key(|v| v.order);
    Abstraction { vars }
  }

  /// Auto-abstraction: prepend the section variables used by `typ` or
  /// `value` as leading `Pi` binders of the type and `Lambda` binders of the
  /// value.
  pub fn finalize_declaration(
    &self,
    typ: &Expr,
    value: Option<&Expr>,
  ) -> (Abstraction, Expr, Option<Expr>) {
    let mut terms = vec![typ];
    terms.extend(value);
    let abs = self.abstraction_for(&terms);
    let typ = abs.wrap_pi(typ);
    let value = value.map(|v| abs.wrap_lam(v));
    (abs, typ, value)
  }
}

/// An ordered telescope of section variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Abstraction {
  vars: Vec<SectionVar>,
}

impl Abstraction {
  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn names(&self) -> Vec<Name> {
    self.vars.iter().map(|v| v.name.clone()).collect()
  }

  /// Binder type of the `i`-th variable, under the `i` binders before it.
  fn binder_type(&self, names: &[Name], i: usize) -> Expr {
    abstract_fvars(&self.vars[i].typ, &names[..i])
  }

  /// Local context binding the variables, outermost first.
  pub fn context(&self) -> LocalContext {
    let names = self.names();
    (0..self.vars.len()).fold(LocalContext::new(), |ctx, i| {
      ctx.push(names[i].clone(), self.binder_type(&names, i), None)
    })
  }

  /// `e` with the variables replaced by bound variables of [`Self::context`].
  pub fn close(&self, e: &Expr) -> Expr {
    abstract_fvars(e, &self.names())
  }

  fn wrap(&self, e: &Expr, binder: fn(Name, Expr, Expr) -> Expr) -> Expr {
    let names = self.names();
    (0..self.vars.len())
      .rev()
      .fold(self.close(e), |acc, i| binder(names[i].clone(), self.binder_type(&names, i), acc))
  }

  pub fn wrap_pi(&self, e: &Expr) -> Expr {
    self.wrap(e, Expr::pi)
  }

  pub fn wrap_lam(&self, e: &Expr) -> Expr {
    self.wrap(e, Expr::lam)
  }

  /// Inverse of [`Self::close`].
  pub fn open(&self, e: &Expr) -> Expr {
    self
      .vars
      .iter()
      .rev()
      .fold(e.clone(), |acc, v| instantiate(&acc, &Expr::fvar(v.name.clone())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::kernel::env::Declaration;
  use crate::kernel::expr::alpha_eq;
  use crate::kernel::level::Level;

  fn n(s: &str) -> Name {
    Name::from_dotted(s)
  }

  fn c(s: &str) -> Expr {
    Expr::cnst(n(s), vec![])
  }

  fn env_with(names: &[&str]) -> Environment {
    let mut env = Environment::new();
    for name in names {
      env.insert(Declaration::axiom(n(name), vec![], Expr::sort(Level::one()))).unwrap();
    }
    env
  }

  #[test]
  fn qualification_follows_namespaces() {
    let mut scope = Scope::new();
    scope.open_namespace(n("A.B"));
    scope.open_section(Some(n("s")));
    scope.open_namespace(n("C"));
    assert_eq!(scope.qualify(&n("x")), n("A.B.C.x"));
    assert_eq!(scope.depth(), 3);
  }

  #[test]
  fn close_is_lifo_and_name_checked() {
    let mut scope = Scope::new();
    scope.open_namespace(n("Foo"));
    scope.open_section(Some(n("s")));
    assert!(matches!(
      scope.close_namespace(Some(&n("Foo"))),
      Err(ScopeError::MismatchedClose { kind: FrameKind::Section, .. })
    ));
    assert!(matches!(
      scope.close_section(Some(&n("t"))),
      Err(ScopeError::MismatchedClose { .. })
    ));
    scope.close_section(Some(&n("s"))).unwrap();
    scope.close_namespace(None).unwrap();
    assert_eq!(
      scope.close_namespace(None),
      Err(ScopeError::NothingOpen { kind: FrameKind::Namespace })
    );
  }

  #[test]
  fn resolution_order() {
    let env = env_with(&["x", "Foo.x", "Foo.y", "Bar.y", "Baz.z"]);
    let mut scope = Scope::new();
    scope.open_namespace(n("Foo"));
    // innermost namespace wins over root
    assert_eq!(scope.resolve(&n("x"), &env), Ok(Resolved::Constant(n("Foo.x"))));
    scope.close_namespace(None).unwrap();
    assert_eq!(scope.resolve(&n("x"), &env), Ok(Resolved::Constant(n("x"))));

    scope.open(&n("Foo"), &env).unwrap();
    scope.open(&n("Bar"), &env).unwrap();
    assert!(matches!(
      scope.resolve(&n("y"), &env),
      Err(ScopeError::AmbiguousName { candidates, .. }) if candidates.len() == 2
    ));
    assert_eq!(
      scope.resolve(&n("z"), &env),
      Err(ScopeError::UnresolvedName { name: n("z") })
    );
  }

  #[test]
  fn open_is_scoped_to_frame() {
    let env = env_with(&["Baz.z"]);
    let mut scope = Scope::new();
    scope.open_section(None);
    scope.open(&n("Baz"), &env).unwrap();
    assert_eq!(scope.resolve(&n("z"), &env), Ok(Resolved::Constant(n("Baz.z"))));
    scope.close_section(None).unwrap();
    assert!(scope.resolve(&n("z"), &env).is_err());
    assert_eq!(
      scope.open(&n("Nope"), &env),
      Err(ScopeError::UnknownNamespace { name: n("Nope") })
    );
  }

  #[test]
  fn open_relative_to_current_namespace() {
    let env = env_with(&["A.B.f"]);
    let mut scope = Scope::new();
    scope.open_namespace(n("A"));
    assert_eq!(scope.open(&n("B"), &env), Ok(n("A.B")));
  }

  #[test]
  fn variables_shadow_and_collide() {
    let env = env_with(&["T", "x"]);
    let mut scope = Scope::new();
    scope.open_section(None);
    assert_eq!(
      scope.declare_variable(n("x"), c("T"), &env),
      Err(ScopeError::NameCollision { name: n("x") })
    );
    scope.declare_variable(n("y"), c("T"), &env).unwrap();
    assert_eq!(
      scope.declare_variable(n("y"), c("T"), &env),
      Err(ScopeError::NameCollision { name: n("y") })
    );
    assert_eq!(scope.resolve(&n("y"), &env), Ok(Resolved::Variable(n("y"))));
    let resolved = scope.resolve_term(&Expr::app(c("y"), c("T")), &env).unwrap();
    assert_eq!(resolved, Expr::app(Expr::fvar(n("y")), c("T")));
    scope.close_section(None).unwrap();
    assert!(scope.variables().next().is_none());
  }

  #[test]
  fn abstraction_is_transitive_and_ordered() {
    let env = env_with(&["T"]);
    let mut scope = Scope::new();
    scope.open_section(None);
    // A : Sort 1, x : A, y : A
    scope.declare_variable(n("A"), Expr::sort(Level::one()), &env).unwrap();
    scope.declare_variable(n("x"), Expr::fvar(n("A")), &env).unwrap();
    scope.declare_variable(n("y"), Expr::fvar(n("A")), &env).unwrap();

    let body = Expr::fvar(n("x"));
    let (abs, typ, value) = scope.finalize_declaration(&Expr::fvar(n("A")), Some(&body));
    assert_eq!(abs.names(), vec![n("A"), n("x")]);

    // (A : Sort 1) → (x : A) → A
    let expected_ty = Expr::pi(
      n("A"),
      Expr::sort(Level::one()),
      Expr::pi(n("x"), Expr::bvar(0), Expr::bvar(1)),
    );
    assert!(alpha_eq(&typ, &expected_ty));
    let expected_val = Expr::lam(
      n("A"),
      Expr::sort(Level::one()),
      Expr::lam(n("x"), Expr::bvar(0), Expr::bvar(0)),
    );
    assert!(alpha_eq(&value.unwrap(), &expected_val));
  }

  #[test]
  fn close_then_open_is_identity() {
    let env = env_with(&["T"]);
    let mut scope = Scope::new();
    scope.declare_variable(n("a"), c("T"), &env).unwrap();
    scope.declare_variable(n("b"), c("T"), &env).unwrap();
    let e = Expr::pair(Expr::fvar(n("a")), Expr::fvar(n("b")));
    let abs = scope.abstraction_for(&[&e]);
    assert_eq!(abs.len(), 2);
    let closed = abs.close(&e);
    assert_eq!(closed, Expr::pair(Expr::bvar(1), Expr::bvar(0)));
    assert_eq!(abs.open(&closed), e);
    assert_eq!(abs.context().len(), 2);
  }
}
