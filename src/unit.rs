//! Compiled units: a serialized environment that a later session can load
//! and extend.
//!
//! Layout: magic `DTKU`, a version byte, the declaration count, the
//! declarations in insertion order, then a Blake3 digest of all preceding
//! bytes.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::Config;
use crate::kernel::env::{Declaration, Environment};
use crate::kernel::error::TcError;
use crate::kernel::tc::check_env_range;

pub mod digest;
pub mod error;
pub mod serialize;
pub mod tag;

use digest::{DIGEST_LEN, Digest};
use error::{SerializeError, UnitError};
use serialize::{get_declaration, put_declaration};
use tag::{get_u8, get_uint, put_uint};

pub const MAGIC: &[u8; 4] = b"DTKU";
pub const VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Unit {
  pub decls: Vec<Declaration>,
}

impl Unit {
  pub fn new(decls: Vec<Declaration>) -> Self {
    Unit { decls }
  }

  /// Every declaration of `env`, in insertion order.
  pub fn from_env(env: &Environment) -> Self {
    Unit { decls: env.iter().cloned().collect() }
  }

  pub fn len(&self) -> usize {
    self.decls.len()
  }

  pub fn is_empty(&self) -> bool {
    self.decls.is_empty()
  }

  fn body(&self) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION);
    put_uint(self.decls.len() as u64, &mut buf);
    for decl in &self.decls {
      put_declaration(decl, &mut buf);
    }
    buf
  }

  pub fn digest(&self) -> Digest {
    Digest::of(&self.body())
  }

  pub fn to_bytes(&self) -> Vec<u8> {
    let mut buf = self.body();
    let digest = Digest::of(&buf);
    buf.extend_from_slice(digest.as_bytes());
    buf
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializeError> {
    let mut buf = bytes;
    for expected in MAGIC {
      if get_u8(&mut buf, "unit magic")? != *expected {
        return Err(SerializeError::InvalidMagic);
      }
    }
    let version = get_u8(&mut buf, "unit version")?;
    if version != VERSION {
      return Err(SerializeError::UnsupportedVersion { version });
    }
    let body_len = bytes
      .len()
      .checked_sub(DIGEST_LEN)
      .filter(|len| *len >= MAGIC.len() + 1)
      .ok_or(SerializeError::UnexpectedEof { expected: "unit digest" })?;
    let (body, trailer) = bytes.split_at(body_len);
    let recorded = Digest::from_slice(trailer)
      .map_err(|_| SerializeError::Malformed { context: "unit digest" })?;
    let computed = Digest::of(body);
    if recorded != computed {
      return Err(SerializeError::DigestMismatch {
        expected: recorded.hex(),
        found: computed.hex(),
      });
    }

    let mut buf = &body[MAGIC.len() + 1..];
    let count = get_uint(&mut buf)?;
    let mut decls = Vec::with_capacity((count as usize).min(buf.len()));
    for _ in 0..count {
      decls.push(get_declaration(&mut buf)?);
    }
    if !buf.is_empty() {
      return Err(SerializeError::TrailingBytes { count: buf.len() });
    }
    Ok(Unit { decls })
  }

  pub fn write_to(&self, path: impl AsRef<Path>) -> Result<Digest, UnitError> {
    let bytes = self.to_bytes();
    fs::write(path.as_ref(), &bytes)?;
    let digest = self.digest();
    debug!(path = %path.as_ref().display(), decls = self.len(), %digest, "unit written");
    Ok(digest)
  }

  pub fn read_from(path: impl AsRef<Path>) -> Result<Self, UnitError> {
    let bytes = fs::read(path.as_ref())?;
    Ok(Self::from_bytes(&bytes)?)
  }

  /// Replay the unit into `env`.
  ///
  /// Declarations already present and identical are skipped. Any other
  /// clash, or a verification failure when `config.verify_units` is set,
  /// fails the whole load and leaves `env` untouched. Returns the number of
  /// declarations added.
  pub fn load_into(&self, env: &mut Environment, config: &Config) -> Result<usize, UnitError> {
    let mut staged = env.snapshot();
    let start = staged.len();
    for decl in &self.decls {
      match staged.get(&decl.name) {
        Some(existing) if **existing == *decl => continue,
        Some(_) => {
          warn!(name = %decl.name, "unit conflicts with existing declaration");
          return Err(UnitError::Conflict(TcError::DuplicateName { name: decl.name.clone() }));
        },
        None => staged.insert(decl.clone()).map_err(UnitError::Conflict)?,
      }
    }
    let added = staged.len() - start;
    if config.verify_units && added > 0 {
      let failures = check_env_range(&staged, start..staged.len(), config.max_reduction_steps);
      if !failures.is_empty() {
        return Err(UnitError::Verification(failures));
      }
    }
    *env = staged;
    debug!(added, skipped = self.len() - added, "unit loaded");
    Ok(added)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::church;
  use crate::kernel::expr::Expr;
  use crate::kernel::level::Level;
  use crate::kernel::name::Name;

  fn prelude_env() -> Environment {
    let mut env = Environment::new();
    for decl in church::prelude() {
      env.insert(decl).unwrap();
    }
    env
  }

  fn axiom(name: &str, typ: Expr) -> Declaration {
    Declaration::axiom(Name::from_dotted(name), vec![], typ)
  }

  #[test]
  fn bytes_roundtrip() {
    let unit = Unit::from_env(&prelude_env());
    let bytes = unit.to_bytes();
    assert_eq!(&bytes[..4], MAGIC);
    assert_eq!(Unit::from_bytes(&bytes).unwrap(), unit);
  }

  #[test]
  fn digest_is_stable_and_order_sensitive() {
    let unit = Unit::from_env(&prelude_env());
    assert_eq!(unit.digest(), unit.clone().digest());
    let mut reversed = unit.clone();
    reversed.decls.reverse();
    assert_ne!(unit.digest(), reversed.digest());
  }

  #[test]
  fn corrupted_bytes_rejected() {
    let mut bytes = Unit::from_env(&prelude_env()).to_bytes();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x01;
    assert!(matches!(
      Unit::from_bytes(&bytes),
      Err(SerializeError::DigestMismatch { .. })
    ));
  }

  #[test]
  fn header_errors() {
    assert_eq!(Unit::from_bytes(b"XXXX\x01"), Err(SerializeError::InvalidMagic));
    let mut bytes = Unit::default().to_bytes();
    bytes[4] = 9;
    assert_eq!(
      Unit::from_bytes(&bytes),
      Err(SerializeError::UnsupportedVersion { version: 9 })
    );
    assert!(matches!(
      Unit::from_bytes(b"DTK"),
      Err(SerializeError::UnexpectedEof { .. })
    ));
  }

  #[test]
  fn load_extends_and_skips_identical() {
    let base = prelude_env();
    let mut later = base.snapshot();
    let nat = Expr::cnst(church::nat_name(), vec![]);
    later.insert(axiom("Nat.zero", nat)).unwrap();
    let unit = Unit::from_env(&later);

    let mut env = base.snapshot();
    let added = unit.load_into(&mut env, &Config::default()).unwrap();
    assert_eq!(added, 1);
    assert!(env.contains(&Name::from_dotted("Nat.zero")));
    // loading again is a no-op
    assert_eq!(unit.load_into(&mut env, &Config::default()).unwrap(), 0);
  }

  #[test]
  fn load_conflict_leaves_env_untouched() {
    let mut env = Environment::new();
    env.insert(axiom("A", Expr::sort(Level::one()))).unwrap();
    let unit = Unit::new(vec![
      axiom("B", Expr::sort(Level::one())),
      axiom("A", Expr::sort(Level::of_nat(2))),
    ]);
    assert!(matches!(
      unit.load_into(&mut env, &Config::default()),
      Err(UnitError::Conflict(TcError::DuplicateName { .. }))
    ));
    assert_eq!(env.len(), 1);
    assert!(!env.contains(&Name::atom("B")));
  }

  #[test]
  fn load_verifies_when_enabled() {
    // `a : A` with `A` never declared
    let bad = Unit::new(vec![axiom("a", Expr::cnst(Name::atom("A"), vec![]))]);
    let mut env = Environment::new();
    match bad.load_into(&mut env, &Config::default()) {
      Err(UnitError::Verification(failures)) => {
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].1, TcError::UnknownConstant { .. }));
      },
      other => panic!("expected verification failure, got {other:?}"),
    }
    assert!(env.is_empty());

    let trusting = Config { verify_units: false, ..Config::default() };
    assert_eq!(bad.load_into(&mut env, &trusting).unwrap(), 1);
  }

  #[test]
  fn file_roundtrip() {
    let dir = std::env::temp_dir().join(format!("dtk-unit-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("prelude.dtku");
    let unit = Unit::from_env(&prelude_env());
    let digest = unit.write_to(&path).unwrap();
    let read = Unit::read_from(&path).unwrap();
    assert_eq!(read.digest(), digest);
    assert_eq!(read, unit);
    fs::remove_dir_all(&dir).unwrap();
  }
}
