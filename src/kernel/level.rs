//! Universe levels and their normal form.
//!
//! The hierarchy is non-cumulative, so the only relation exposed on levels is
//! equality: two levels are equal iff their normal forms are identical.

use std::fmt;
use std::sync::Arc;

use super::name::Name;

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct Level(Arc<LevelData>);

// Variant order is the canonical order of `Max` arguments in normal forms.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum LevelData {
  Zero,
  Param(Name),
  Succ(Level),
  Max(Level, Level),
  Imax(Level, Level),
}

impl Level {
  pub fn as_data(&self) -> &LevelData {
    &self.0
  }
  pub fn zero() -> Self {
    Level(Arc::new(LevelData::Zero))
  }
  pub fn one() -> Self {
    Level::succ(Level::zero())
  }
  pub fn succ(x: Level) -> Self {
    Level(Arc::new(LevelData::Succ(x)))
  }
  pub fn max(x: Level, y: Level) -> Self {
    Level(Arc::new(LevelData::Max(x, y)))
  }
  pub fn imax(x: Level, y: Level) -> Self {
    Level(Arc::new(LevelData::Imax(x, y)))
  }
  pub fn param(x: Name) -> Self {
    Level(Arc::new(LevelData::Param(x)))
  }
  /// `Succ^n(Zero)`.
  pub fn of_nat(n: u64) -> Self {
    add_offset(Level::zero(), n)
  }
}

/// Split `Succ^k(base)` into `(base, k)`.
pub fn to_offset(l: &Level) -> (&Level, u64) {
  let mut cursor = l;
  let mut k = 0;
  while let LevelData::Succ(inner) = cursor.as_data() {
    cursor = inner;
    k += 1;
  }
  (cursor, k)
}

fn add_offset(mut base: Level, k: u64) -> Level {
  for _ in 0..k {
    base = Level::succ(base);
  }
  base
}

fn is_zero_syntactic(l: &Level) -> bool {
  matches!(l.as_data(), LevelData::Zero)
}

fn is_one_syntactic(l: &Level) -> bool {
  matches!(l.as_data(), LevelData::Succ(inner) if is_zero_syntactic(inner))
}

/// Normalize a level.
///
/// The result is a right-nested `Max` of atoms `Succ^k(base)` where `base` is
/// `Zero`, a `Param` or an irreducible `Imax`, sorted by base with one atom
/// per base. `Succ^k(Zero)` survives only if no other atom has offset >= k.
pub fn normalize(l: &Level) -> Level {
  match l.as_data() {
    LevelData::Zero | LevelData::Param(_) => l.clone(),
    _ => rebuild(canonical_atoms(atoms(l))),
  }
}

/// Flattened `(base, offset)` atoms of a level, not yet canonicalized.
fn atoms(l: &Level) -> Vec<(Level, u64)> {
  match l.as_data() {
    LevelData::Zero | LevelData::Param(_) => vec![(l.clone(), 0)],
    LevelData::Succ(_) => {
      let (base, k) = to_offset(l);
      atoms(base).into_iter().map(|(b, j)| (b, j + k)).collect()
    },
    LevelData::Max(a, b) => {
      let mut out = atoms(a);
      out.extend(atoms(b));
      out
    },
    LevelData::Imax(a, b) => {
      let nb = normalize(b);
      let nb_atoms = atoms(&nb);
      if is_zero_syntactic(&nb) {
        return vec![(Level::zero(), 0)];
      }
      if nb_atoms.iter().any(|(_, k)| *k > 0) {
        // b is never zero, so imax degenerates to max
        let mut out = atoms(a);
        out.extend(nb_atoms);
        return out;
      }
      let na = normalize(a);
      if is_zero_syntactic(&na) || is_one_syntactic(&na) || na == nb {
        return if na == nb { atoms(&na) } else { nb_atoms };
      }
      if let LevelData::Max(x, y) = nb.as_data() {
        let mut out = atoms(&Level::imax(na.clone(), x.clone()));
        out.extend(atoms(&Level::imax(na, y.clone())));
        return out;
      }
      vec![(Level::imax(na, nb), 0)]
    },
  }
}

fn canonical_atoms(mut atoms: Vec<(Level, u64)>) -> Vec<(Level, u64)> {
  atoms.sort();
  // keep the largest offset per base (sorted, so the last one wins)
  let mut dedup: Vec<(Level, u64)> = Vec::with_capacity(atoms.len());
  for (base, k) in atoms {
    match dedup.last_mut() {
      Some((prev, j)) if *prev == base => *j = k.max(*j),
      _ => dedup.push((base, k)),
    }
  }
  let max_other = dedup
    .iter()
    .filter(|(b, _)| !is_zero_syntactic(b))
    .map(|(_, k)| *k)
    .max();
  if let Some(max_other) = max_other {
    dedup.retain(|(b, k)| !is_zero_syntactic(b) || *k > max_other);
  }
  dedup
}

fn rebuild(atoms: Vec<(Level, u64)>) -> Level {
  let mut iter = atoms.into_iter().rev().map(|(b, k)| add_offset(b, k));
  let Some(last) = iter.next() else {
    return Level::zero();
  };
  iter.fold(last, |acc, l| Level::max(l, acc))
}

/// Level equality: identical normal forms.
pub fn equal(a: &Level, b: &Level) -> bool {
  a == b || normalize(a) == normalize(b)
}

/// Pointwise equality of two level lists.
pub fn equal_many(ls: &[Level], rs: &[Level]) -> bool {
  ls.len() == rs.len() && ls.iter().zip(rs.iter()).all(|(l, r)| equal(l, r))
}

/// Whether the level is zero under every assignment of its parameters.
pub fn is_zero(l: &Level) -> bool {
  is_zero_syntactic(&normalize(l))
}

/// Substitute universe parameters: `level[params[i] := values[i]]`.
pub fn subst_level(level: &Level, params: &[Name], values: &[Level]) -> Level {
  match level.as_data() {
    LevelData::Zero => level.clone(),
    LevelData::Succ(inner) => Level::succ(subst_level(inner, params, values)),
    LevelData::Max(a, b) => Level::max(
      subst_level(a, params, values),
      subst_level(b, params, values),
    ),
    LevelData::Imax(a, b) => Level::imax(
      subst_level(a, params, values),
      subst_level(b, params, values),
    ),
    LevelData::Param(name) => params
      .iter()
      .zip(values.iter())
      .find(|(p, _)| *p == name)
      .map_or_else(|| level.clone(), |(_, v)| v.clone()),
  }
}

/// Check that all universe parameters in `level` are contained in `params`.
pub fn all_uparams_defined(level: &Level, params: &[Name]) -> bool {
  match level.as_data() {
    LevelData::Zero => true,
    LevelData::Succ(inner) => all_uparams_defined(inner, params),
    LevelData::Max(a, b) | LevelData::Imax(a, b) => {
      all_uparams_defined(a, params) && all_uparams_defined(b, params)
    },
    LevelData::Param(name) => params.iter().any(|p| p == name),
  }
}

/// Check that a list of parameter names has no duplicates.
pub fn no_dupes_all_params(levels: &[Name]) -> bool {
  for (i, a) in levels.iter().enumerate() {
    for b in &levels[i + 1..] {
      if a == b {
        return false;
      }
    }
  }
  true
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (base, k) = to_offset(self);
    match base.as_data() {
      LevelData::Zero => write!(f, "{k}"),
      LevelData::Param(n) if k == 0 => write!(f, "{n}"),
      LevelData::Param(n) => write!(f, "{n}+{k}"),
      LevelData::Max(a, b) if k == 0 => write!(f, "(max {a} {b})"),
      LevelData::Imax(a, b) if k == 0 => write!(f, "(imax {a} {b})"),
      LevelData::Max(a, b) => write!(f, "(max {a} {b})+{k}"),
      LevelData::Imax(a, b) => write!(f, "(imax {a} {b})+{k}"),
      LevelData::Succ(_) => unreachable!("to_offset strips every succ"),
    }
  }
}

impl fmt::Debug for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{self}")
  }
}
