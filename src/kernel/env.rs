//! The global environment of checked declarations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use super::error::{TcError, TcResult};
use super::expr::Expr;
use super::name::Name;
use super::level::Level;

/// A constant: an axiom when `value` is `None`, a definition otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
  pub name: Name,
  pub universe_params: Vec<Name>,
  pub typ: Expr,
  pub value: Option<Expr>,
}

impl Declaration {
  pub fn axiom(name: Name, universe_params: Vec<Name>, typ: Expr) -> Self {
    Declaration { name, universe_params, typ, value: None }
  }

  pub fn definition(
    name: Name,
    universe_params: Vec<Name>,
    typ: Expr,
    value: Expr,
  ) -> Self {
    Declaration { name, universe_params, typ, value: Some(value) }
  }
}

type DeclMap = IndexMap<Name, Arc<Declaration>, FxBuildHasher>;

/// Append-only map from fully qualified names to declarations, kept in
/// insertion order. Clones share storage until one side is extended.
#[derive(Debug, Clone, Default)]
pub struct Environment {
  decls: Arc<DeclMap>,
}

impl Environment {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.decls.len()
  }

  pub fn is_empty(&self) -> bool {
    self.decls.is_empty()
  }

  pub fn get(&self, name: &Name) -> Option<&Arc<Declaration>> {
    self.decls.get(name)
  }

  /// Declaration together with its insertion position.
  pub fn get_full(&self, name: &Name) -> Option<(usize, &Arc<Declaration>)> {
    self.decls.get_full(name).map(|(idx, _, decl)| (idx, decl))
  }

  pub fn get_index(&self, idx: usize) -> Option<&Arc<Declaration>> {
    self.decls.get_index(idx).map(|(_, decl)| decl)
  }

  pub fn contains(&self, name: &Name) -> bool {
    self.decls.contains_key(name)
  }

  /// Store an already-checked declaration. Existing entries are never
  /// replaced.
  pub fn insert(&mut self, decl: Declaration) -> TcResult<()> {
    self.insert_arc(Arc::new(decl))
  }

  fn insert_arc(&mut self, decl: Arc<Declaration>) -> TcResult<()> {
    if self.decls.contains_key(&decl.name) {
      return Err(TcError::DuplicateName { name: decl.name.clone() });
    }
    Arc::make_mut(&mut self.decls).insert(decl.name.clone(), decl);
    Ok(())
  }

  /// `Const(name, levels)` after checking the universe arity.
  pub fn instantiate(&self, name: &Name, levels: Vec<Level>) -> TcResult<Expr> {
    let decl = self
      .get(name)
      .ok_or_else(|| TcError::UnknownConstant { name: name.clone() })?;
    if decl.universe_params.len() != levels.len() {
      return Err(TcError::UniverseArityMismatch {
        name: name.clone(),
        expected: decl.universe_params.len(),
        found: levels.len(),
      });
    }
    Ok(Expr::cnst(name.clone(), levels))
  }

  /// A frozen copy; later inserts on either side are not shared.
  pub fn snapshot(&self) -> Environment {
    self.clone()
  }

  /// Add every declaration of `other` not already present. Identical
  /// entries are skipped; a different declaration under an existing name
  /// fails the whole merge and leaves `self` unchanged. Returns the number
  /// of declarations added.
  pub fn merge(&mut self, other: &Environment) -> TcResult<usize> {
    let mut fresh = Vec::new();
    for (name, decl) in other.iter_arc() {
      match self.decls.get(name) {
        Some(existing) if **existing == **decl => {},
        Some(_) => return Err(TcError::DuplicateName { name: name.clone() }),
        None => fresh.push(decl.clone()),
      }
    }
    let added = fresh.len();
    if added > 0 {
      let map = Arc::make_mut(&mut self.decls);
      for decl in fresh {
        map.insert(decl.name.clone(), decl);
      }
    }
    Ok(added)
  }

  /// Declarations in insertion order.
  pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
    self.decls.values().map(|d| &**d)
  }

  pub(crate) fn iter_arc(&self) -> impl Iterator<Item = (&Name, &Arc<Declaration>)> {
    self.decls.iter()
  }

  /// Whether some declaration lives strictly under `ns`.
  pub fn has_namespace(&self, ns: &Name) -> bool {
    self.decls.keys().any(|k| k != ns && ns.is_prefix_of(k))
  }
}

/// An environment shared between threads.
///
/// Readers work on snapshots; `insert` decides duplicates atomically per
/// name, so concurrent writers of one name see exactly one success.
#[derive(Debug, Default)]
pub struct SharedEnvironment {
  decls: DashMap<Name, (u64, Arc<Declaration>), FxBuildHasher>,
  next_seq: AtomicU64,
}

impl SharedEnvironment {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_env(env: &Environment) -> Self {
    let shared = Self::new();
    for (_, decl) in env.iter_arc() {
      let seq = shared.next_seq.fetch_add(1, Ordering::Relaxed);
      shared.decls.insert(decl.name.clone(), (seq, decl.clone()));
    }
    shared
  }

  pub fn len(&self) -> usize {
    self.decls.len()
  }

  pub fn is_empty(&self) -> bool {
    self.decls.is_empty()
  }

  pub fn get(&self, name: &Name) -> Option<Arc<Declaration>> {
    self.decls.get(name).map(|entry| entry.1.clone())
  }

  pub fn insert(&self, decl: Declaration) -> TcResult<()> {
    match self.decls.entry(decl.name.clone()) {
      Entry::Occupied(_) => Err(TcError::DuplicateName { name: decl.name }),
      Entry::Vacant(slot) => {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        slot.insert((seq, Arc::new(decl)));
        Ok(())
      },
    }
  }

  /// Ordered snapshot of everything inserted so far.
  pub fn snapshot(&self) -> Environment {
    let mut entries: Vec<(u64, Arc<Declaration>)> =
      self.decls.iter().map(|e| (e.0, e.1.clone())).collect();
    entries.sort_by_key(|(seq, _)| *seq);
    let mut env = Environment::new();
    for (_, decl) in entries {
      // names in the map are unique
      let _ = env.insert_arc(decl);
    }
    env
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::kernel::level::Level;
  use std::thread;

  fn axiom(name: &str) -> Declaration {
    Declaration::axiom(Name::from_dotted(name), vec![], Expr::sort(Level::zero()))
  }

  #[test]
  fn duplicate_rejected_first_kept() {
    let mut env = Environment::new();
    env.insert(axiom("A")).unwrap();
    let second = Declaration::axiom(Name::atom("A"), vec![], Expr::sort(Level::one()));
    match env.insert(second) {
      Err(TcError::DuplicateName { name }) => assert_eq!(name, Name::atom("A")),
      other => panic!("expected DuplicateName, got {other:?}"),
    }
    assert_eq!(env.len(), 1);
    assert_eq!(env.get(&Name::atom("A")).unwrap().typ, Expr::sort(Level::zero()));
  }

  #[test]
  fn instantiate_checks_arity() {
    let mut env = Environment::new();
    let u = Name::atom("u");
    env
      .insert(Declaration::axiom(
        Name::atom("T"),
        vec![u.clone()],
        Expr::sort(Level::param(u)),
      ))
      .unwrap();
    assert!(env.instantiate(&Name::atom("T"), vec![Level::zero()]).is_ok());
    assert!(matches!(
      env.instantiate(&Name::atom("T"), vec![]),
      Err(TcError::UniverseArityMismatch { expected: 1, found: 0, .. })
    ));
    assert!(matches!(
      env.instantiate(&Name::atom("U"), vec![]),
      Err(TcError::UnknownConstant { .. })
    ));
  }

  #[test]
  fn snapshot_is_isolated() {
    let mut env = Environment::new();
    env.insert(axiom("A")).unwrap();
    let snap = env.snapshot();
    env.insert(axiom("B")).unwrap();
    assert_eq!(snap.len(), 1);
    assert_eq!(env.len(), 2);
  }

  #[test]
  fn merge_reopens_namespace() {
    let mut base = Environment::new();
    base.insert(axiom("Foo.a")).unwrap();
    let mut later = base.snapshot();
    later.insert(axiom("Foo.b")).unwrap();
    assert_eq!(base.merge(&later).unwrap(), 1);
    let names: Vec<String> = base.iter().map(|d| d.name.pretty()).collect();
    assert_eq!(names, vec!["Foo.a", "Foo.b"]);
    assert!(base.has_namespace(&Name::atom("Foo")));
    assert!(!base.has_namespace(&Name::from_dotted("Foo.a")));
  }

  #[test]
  fn merge_conflict_is_all_or_nothing() {
    let mut base = Environment::new();
    base.insert(axiom("A")).unwrap();
    let mut other = Environment::new();
    other.insert(axiom("B")).unwrap();
    other
      .insert(Declaration::axiom(Name::atom("A"), vec![], Expr::sort(Level::one())))
      .unwrap();
    assert!(base.merge(&other).is_err());
    assert_eq!(base.len(), 1);
    assert!(!base.contains(&Name::atom("B")));
  }

  #[test]
  fn concurrent_inserts_single_winner() {
    let shared = Arc::new(SharedEnvironment::new());
    let handles: Vec<_> = (0..8)
      .map(|_| {
        let shared = shared.clone();
        thread::spawn(move || shared.insert(axiom("Race.x")).is_ok())
      })
      .collect();
    let wins = handles
      .into_iter()
      .map(|h| h.join().unwrap())
      .filter(|won| *won)
      .count();
    assert_eq!(wins, 1);
    assert_eq!(shared.len(), 1);
  }

  #[test]
  fn shared_snapshot_keeps_order() {
    let mut seed = Environment::new();
    seed.insert(axiom("d")).unwrap();
    let shared = SharedEnvironment::from_env(&seed);
    for n in ["c", "a", "b"] {
      shared.insert(axiom(n)).unwrap();
    }
    assert!(shared.insert(axiom("d")).is_err());
    let names: Vec<String> = shared.snapshot().iter().map(|d| d.name.pretty()).collect();
    assert_eq!(names, vec!["d", "c", "a", "b"]);
  }
}
