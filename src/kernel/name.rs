//! Hierarchical names like `Nat.add` or `Algebra.Group.mul`.
//!
//! Names are reference counted and cache their hash at construction, so
//! cloning and hashing are O(1) regardless of depth.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct Name(Arc<NameData>);

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum NameData {
  Anonymous,
  Str(Name, String, u64),
}

impl Name {
  pub fn as_data(&self) -> &NameData {
    &self.0
  }

  pub fn get_hash(&self) -> u64 {
    match *self.0 {
      NameData::Anonymous => 0,
      NameData::Str(.., h) => h,
    }
  }

  pub fn anon() -> Self {
    Name(Arc::new(NameData::Anonymous))
  }

  pub fn str(pre: Name, s: String) -> Self {
    let hasher = &mut FxHasher::default();
    (7, pre.get_hash(), &s).hash(hasher);
    Name(Arc::new(NameData::Str(pre, s, hasher.finish())))
  }

  /// Single-segment name.
  pub fn atom(s: &str) -> Self {
    Name::str(Name::anon(), s.to_owned())
  }

  /// Parse a dotted name such as `A.B.c`. Empty segments are skipped, so
  /// `""` yields the anonymous name.
  pub fn from_dotted(s: &str) -> Self {
    s.split('.')
      .filter(|seg| !seg.is_empty())
      .fold(Name::anon(), |acc, seg| Name::str(acc, seg.to_owned()))
  }

  pub fn is_anon(&self) -> bool {
    matches!(*self.0, NameData::Anonymous)
  }

  pub fn append(&self, segment: &str) -> Self {
    Name::str(self.clone(), segment.to_owned())
  }

  /// `self ++ other`, e.g. `A.B` joined with `c.d` is `A.B.c.d`.
  pub fn join(&self, other: &Name) -> Self {
    other
      .components()
      .iter()
      .fold(self.clone(), |acc, seg| acc.append(seg))
  }

  pub fn prefix(&self) -> Name {
    match self.as_data() {
      NameData::Anonymous => self.clone(),
      NameData::Str(pre, ..) => pre.clone(),
    }
  }

  pub fn last(&self) -> Option<&str> {
    match self.as_data() {
      NameData::Anonymous => None,
      NameData::Str(_, s, _) => Some(s),
    }
  }

  /// Segments from the root outward.
  pub fn components(&self) -> Vec<&str> {
    let mut out = Vec::new();
    let mut cursor = self;
    while let NameData::Str(pre, s, _) = cursor.as_data() {
      out.push(s.as_str());
      cursor = pre;
    }
    out.reverse();
    out
  }

  pub fn len(&self) -> usize {
    let mut n = 0;
    let mut cursor = self;
    while let NameData::Str(pre, ..) = cursor.as_data() {
      n += 1;
      cursor = pre;
    }
    n
  }

  pub fn is_empty(&self) -> bool {
    self.is_anon()
  }

  /// Whether `self` is a (non-strict) prefix of `other`.
  pub fn is_prefix_of(&self, other: &Name) -> bool {
    let depth = self.len();
    let mut cursor = other.clone();
    let mut other_depth = other.len();
    if other_depth < depth {
      return false;
    }
    while other_depth > depth {
      cursor = cursor.prefix();
      other_depth -= 1;
    }
    cursor == *self
  }

  pub fn pretty(&self) -> String {
    if self.is_anon() {
      return "[anonymous]".to_owned();
    }
    self.components().join(".")
  }
}

impl Hash for Name {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.get_hash().hash(state);
  }
}

impl fmt::Display for Name {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.pretty())
  }
}

impl fmt::Debug for Name {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "`{}", self.pretty())
  }
}

impl From<&str> for Name {
  fn from(s: &str) -> Self {
    Name::from_dotted(s)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dotted_roundtrip() {
    let n = Name::from_dotted("Algebra.Group.mul");
    assert_eq!(n.components(), vec!["Algebra", "Group", "mul"]);
    assert_eq!(n.pretty(), "Algebra.Group.mul");
    assert_eq!(n.last(), Some("mul"));
    assert_eq!(n.prefix(), Name::from_dotted("Algebra.Group"));
  }

  #[test]
  fn empty_is_anonymous() {
    assert!(Name::from_dotted("").is_anon());
    assert_eq!(Name::from_dotted("..a.").pretty(), "a");
  }

  #[test]
  fn join_and_prefix() {
    let ns = Name::from_dotted("A.B");
    let full = ns.join(&Name::from_dotted("c.d"));
    assert_eq!(full, Name::from_dotted("A.B.c.d"));
    assert!(ns.is_prefix_of(&full));
    assert!(Name::anon().is_prefix_of(&full));
    assert!(!full.is_prefix_of(&ns));
    assert!(!Name::from_dotted("A.C").is_prefix_of(&full));
  }

  #[test]
  fn equal_names_hash_equal() {
    let a = Name::from_dotted("x.y");
    let b = Name::atom("x").append("y");
    assert_eq!(a, b);
    assert_eq!(a.get_hash(), b.get_hash());
  }
}
