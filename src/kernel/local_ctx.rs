use std::sync::Arc;

use super::expr::Expr;
use super::name::Name;

/// A binder entry: display name, type, and the bound value for `let`.
#[derive(Debug, Clone)]
pub struct LocalDecl {
  pub name: Name,
  pub typ: Expr,
  pub value: Option<Expr>,
}

#[derive(Debug)]
enum CtxNode {
  Empty,
  Cons { decl: LocalDecl, len: usize, lets: usize, rest: LocalContext },
}

/// The stack of binders enclosing the term under inspection.
///
/// Persistent linked list: `push` is O(1), shares the tail, and leaves the
/// original context untouched. Index 0 is the innermost binder. An entry's
/// type and value live in the scope *outside* that entry, so callers shift
/// them by `idx + 1` to use them at the current depth.
#[derive(Debug, Clone)]
pub struct LocalContext(Arc<CtxNode>);

impl LocalContext {
  pub fn new() -> Self {
    LocalContext(Arc::new(CtxNode::Empty))
  }

  pub fn push(&self, name: Name, typ: Expr, value: Option<Expr>) -> Self {
    let lets = self.let_count() + usize::from(value.is_some());
    LocalContext(Arc::new(CtxNode::Cons {
      decl: LocalDecl { name, typ, value },
      len: self.len() + 1,
      lets,
      rest: self.clone(),
    }))
  }

  pub fn len(&self) -> usize {
    match &*self.0 {
      CtxNode::Empty => 0,
      CtxNode::Cons { len, .. } => *len,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of entries carrying a `let` value.
  pub fn let_count(&self) -> usize {
    match &*self.0 {
      CtxNode::Empty => 0,
      CtxNode::Cons { lets, .. } => *lets,
    }
  }

  pub fn has_values(&self) -> bool {
    self.let_count() > 0
  }

  pub fn get(&self, idx: u64) -> Option<&LocalDecl> {
    let mut current = &*self.0;
    let mut i = idx;
    loop {
      match current {
        CtxNode::Empty => return None,
        CtxNode::Cons { decl, rest, .. } => {
          if i == 0 {
            return Some(decl);
          }
          i -= 1;
          current = &*rest.0;
        },
      }
    }
  }

  pub fn type_of(&self, idx: u64) -> Option<&Expr> {
    self.get(idx).map(|d| &d.typ)
  }

  pub fn value_of(&self, idx: u64) -> Option<&Expr> {
    self.get(idx).and_then(|d| d.value.as_ref())
  }

  /// Display names, outermost first.
  pub fn names(&self) -> Vec<Name> {
    let mut out = Vec::with_capacity(self.len());
    let mut current = &*self.0;
    while let CtxNode::Cons { decl, rest, .. } = current {
      out.push(decl.name.clone());
      current = &*rest.0;
    }
    out.reverse();
    out
  }
}

impl Default for LocalContext {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::kernel::level::Level;

  #[test]
  fn push_is_persistent() {
    let ty = Expr::sort(Level::zero());
    let outer = LocalContext::new().push(Name::atom("x"), ty.clone(), None);
    let inner = outer.push(Name::atom("y"), Expr::bvar(0), Some(Expr::bvar(0)));
    assert_eq!(outer.len(), 1);
    assert_eq!(inner.len(), 2);
    assert!(!outer.has_values());
    assert!(inner.has_values());
    assert_eq!(inner.type_of(0), Some(&Expr::bvar(0)));
    assert_eq!(inner.type_of(1), Some(&ty));
    assert_eq!(inner.value_of(1), None);
    assert!(inner.get(2).is_none());
    assert_eq!(inner.names(), vec![Name::atom("x"), Name::atom("y")]);
  }
}
