//! Binary encoding of names, levels, terms and declarations.
//!
//! Terms and levels are written and read with explicit work stacks. Decoded
//! terms are limited to [`MAX_EXPR_DEPTH`] levels of nesting, since the
//! checker and the destructor of [`Expr`] walk terms recursively.

#![allow(clippy::cast_possible_truncation)]

use crate::kernel::env::Declaration;
use crate::kernel::expr::{Expr, ExprData, unfold_apps};
use crate::kernel::level::{Level, LevelData, to_offset};
use crate::kernel::name::Name;

use super::error::SerializeError;
use super::tag::{Tag4, get_u8, get_uint, put_uint};

/// Cap capacity for Vec allocation during deserialization. Every item takes
/// at least one byte, so capacity never needs to exceed the remaining input.
#[inline]
fn capped_capacity(count: u64, buf: &[u8]) -> usize {
  (count as usize).min(buf.len())
}

fn put_bool(x: bool, buf: &mut Vec<u8>) {
  buf.push(u8::from(x));
}

fn get_bool(buf: &mut &[u8]) -> Result<bool, SerializeError> {
  match get_u8(buf, "bool")? {
    0 => Ok(false),
    1 => Ok(true),
    value => Err(SerializeError::InvalidBool { value }),
  }
}

// ============================================================================
// Names
// ============================================================================

pub fn put_name(n: &Name, buf: &mut Vec<u8>) {
  let segments = n.components();
  put_uint(segments.len() as u64, buf);
  for seg in segments {
    put_uint(seg.len() as u64, buf);
    buf.extend_from_slice(seg.as_bytes());
  }
}

pub fn get_name(buf: &mut &[u8]) -> Result<Name, SerializeError> {
  let count = get_uint(buf)?;
  let mut name = Name::anon();
  for _ in 0..count {
    let len = get_uint(buf)? as usize;
    let (bytes, rest) = buf
      .split_at_checked(len)
      .ok_or(SerializeError::UnexpectedEof { expected: "name segment" })?;
    let seg = std::str::from_utf8(bytes).map_err(|_| SerializeError::InvalidUtf8)?;
    name = name.append(seg);
    *buf = rest;
  }
  Ok(name)
}

fn put_names(ns: &[Name], buf: &mut Vec<u8>) {
  put_uint(ns.len() as u64, buf);
  for n in ns {
    put_name(n, buf);
  }
}

fn get_names(buf: &mut &[u8]) -> Result<Vec<Name>, SerializeError> {
  let count = get_uint(buf)?;
  let mut out = Vec::with_capacity(capped_capacity(count, buf));
  for _ in 0..count {
    out.push(get_name(buf)?);
  }
  Ok(out)
}

// ============================================================================
// Levels
// ============================================================================

const LEVEL_ZERO: u8 = 0;
const LEVEL_SUCC: u8 = 1; // size = number of successors, base follows
const LEVEL_MAX: u8 = 2;
const LEVEL_IMAX: u8 = 3;
const LEVEL_PARAM: u8 = 4;

/// Largest successor count accepted when decoding.
const MAX_LEVEL_OFFSET: u64 = 1 << 16;

pub fn put_level(l: &Level, buf: &mut Vec<u8>) {
  let mut stack: Vec<&Level> = vec![l];
  while let Some(curr) = stack.pop() {
    match curr.as_data() {
      LevelData::Zero => Tag4::new(LEVEL_ZERO, 0).put(buf),
      LevelData::Succ(_) => {
        let (base, k) = to_offset(curr);
        Tag4::new(LEVEL_SUCC, k).put(buf);
        stack.push(base);
      },
      LevelData::Max(a, b) => {
        Tag4::new(LEVEL_MAX, 0).put(buf);
        stack.push(b);
        stack.push(a);
      },
      LevelData::Imax(a, b) => {
        Tag4::new(LEVEL_IMAX, 0).put(buf);
        stack.push(b);
        stack.push(a);
      },
      LevelData::Param(n) => {
        Tag4::new(LEVEL_PARAM, 0).put(buf);
        put_name(n, buf);
      },
    }
  }
}

enum GetLevelFrame {
  Parse,
  BuildSucc(u64),
  BuildMax,
  BuildImax,
}

pub fn get_level(buf: &mut &[u8]) -> Result<Level, SerializeError> {
  let mut work = vec![GetLevelFrame::Parse];
  let mut results: Vec<Level> = Vec::new();
  let pop = |results: &mut Vec<Level>| {
    results.pop().ok_or(SerializeError::Malformed { context: "level operand missing" })
  };

  while let Some(frame) = work.pop() {
    match frame {
      GetLevelFrame::Parse => {
        let tag = Tag4::get(buf)?;
        match tag.flag {
          LEVEL_ZERO => results.push(Level::zero()),
          LEVEL_SUCC => {
            if tag.size > MAX_LEVEL_OFFSET {
              return Err(SerializeError::Malformed { context: "level offset" });
            }
            work.push(GetLevelFrame::BuildSucc(tag.size));
            work.push(GetLevelFrame::Parse);
          },
          LEVEL_MAX | LEVEL_IMAX => {
            work.push(if tag.flag == LEVEL_MAX {
              GetLevelFrame::BuildMax
            } else {
              GetLevelFrame::BuildImax
            });
            work.push(GetLevelFrame::Parse);
            work.push(GetLevelFrame::Parse);
          },
          LEVEL_PARAM => results.push(Level::param(get_name(buf)?)),
          flag => return Err(SerializeError::InvalidFlag { flag, context: "level" }),
        }
      },
      GetLevelFrame::BuildSucc(k) => {
        let mut l = pop(&mut results)?;
        for _ in 0..k {
          l = Level::succ(l);
        }
        results.push(l);
      },
      GetLevelFrame::BuildMax | GetLevelFrame::BuildImax => {
        let b = pop(&mut results)?;
        let a = pop(&mut results)?;
        results.push(match frame {
          GetLevelFrame::BuildMax => Level::max(a, b),
          _ => Level::imax(a, b),
        });
      },
    }
  }
  single(results, "level")
}

fn single<T>(mut results: Vec<T>, context: &'static str) -> Result<T, SerializeError> {
  match (results.pop(), results.is_empty()) {
    (Some(x), true) => Ok(x),
    _ => Err(SerializeError::Malformed { context }),
  }
}

// ============================================================================
// Terms
// ============================================================================

const EXPR_BVAR: u8 = 0; // size = index
const EXPR_FVAR: u8 = 1;
const EXPR_SORT: u8 = 2;
const EXPR_CONST: u8 = 3; // size = number of universe arguments
const EXPR_APP: u8 = 4; // size = number of arguments in the spine
const EXPR_LAM: u8 = 5;
const EXPR_PI: u8 = 6;
const EXPR_LET: u8 = 7;
const EXPR_SIGMA: u8 = 8;
const EXPR_PAIR: u8 = 9;
const EXPR_PROJ1: u8 = 10;
const EXPR_PROJ2: u8 = 11;

/// Serialize a term (iterative to avoid stack overflow).
pub fn put_expr(e: &Expr, buf: &mut Vec<u8>) {
  let mut stack: Vec<Expr> = vec![e.clone()];

  while let Some(curr) = stack.pop() {
    match curr.as_data() {
      ExprData::Bvar(idx) => Tag4::new(EXPR_BVAR, *idx).put(buf),
      ExprData::Fvar(n) => {
        Tag4::new(EXPR_FVAR, 0).put(buf);
        put_name(n, buf);
      },
      ExprData::Sort(l) => {
        Tag4::new(EXPR_SORT, 0).put(buf);
        put_level(l, buf);
      },
      ExprData::Const(n, ls) => {
        Tag4::new(EXPR_CONST, ls.len() as u64).put(buf);
        put_name(n, buf);
        for l in ls {
          put_level(l, buf);
        }
      },
      ExprData::App(..) => {
        // Spine compression: head, then every argument
        let (head, args) = unfold_apps(&curr);
        Tag4::new(EXPR_APP, args.len() as u64).put(buf);
        stack.extend(args.into_iter().rev());
        stack.push(head); // head last, processed first
      },
      ExprData::Lam(n, t, b)
      | ExprData::Pi(n, t, b)
      | ExprData::Sigma(n, t, b) => {
        let flag = match curr.as_data() {
          ExprData::Lam(..) => EXPR_LAM,
          ExprData::Pi(..) => EXPR_PI,
          _ => EXPR_SIGMA,
        };
        Tag4::new(flag, 0).put(buf);
        put_name(n, buf);
        stack.push(b.clone());
        stack.push(t.clone());
      },
      ExprData::Let(n, t, v, b) => {
        Tag4::new(EXPR_LET, 0).put(buf);
        put_name(n, buf);
        stack.push(b.clone());
        stack.push(v.clone());
        stack.push(t.clone());
      },
      ExprData::Pair(a, b) => {
        Tag4::new(EXPR_PAIR, 0).put(buf);
        stack.push(b.clone());
        stack.push(a.clone());
      },
      ExprData::Proj1(p) => {
        Tag4::new(EXPR_PROJ1, 0).put(buf);
        stack.push(p.clone());
      },
      ExprData::Proj2(p) => {
        Tag4::new(EXPR_PROJ2, 0).put(buf);
        stack.push(p.clone());
      },
    }
  }
}

/// Deepest term nesting accepted when decoding. A spine of `n` arguments
/// counts as `n` levels.
pub const MAX_EXPR_DEPTH: usize = 1024;

/// Largest bound variable index accepted when decoding.
const MAX_BVAR_INDEX: u64 = u32::MAX as u64;

/// Frame for iterative term deserialization.
enum GetExprFrame {
  /// Parse one term at the given nesting depth.
  Parse(usize),
  /// Pop arg and func, push App(func, arg)
  BuildApp,
  BuildLam(Name),
  BuildPi(Name),
  BuildSigma(Name),
  BuildLet(Name),
  BuildPair,
  BuildProj1,
  BuildProj2,
}

/// Deserialize a term (iterative to avoid stack overflow).
pub fn get_expr(buf: &mut &[u8]) -> Result<Expr, SerializeError> {
  let mut work: Vec<GetExprFrame> = vec![GetExprFrame::Parse(0)];
  let mut results: Vec<Expr> = Vec::new();
  let pop = |results: &mut Vec<Expr>| {
    results.pop().ok_or(SerializeError::Malformed { context: "term operand missing" })
  };

  while let Some(frame) = work.pop() {
    match frame {
      GetExprFrame::Parse(depth) => {
        if depth > MAX_EXPR_DEPTH {
          return Err(SerializeError::Malformed { context: "term nesting depth" });
        }
        let child = depth + 1;
        let tag = Tag4::get(buf)?;
        match tag.flag {
          EXPR_BVAR => {
            if tag.size > MAX_BVAR_INDEX {
              return Err(SerializeError::Malformed { context: "bound variable index" });
            }
            results.push(Expr::bvar(tag.size))
          },
          EXPR_FVAR => results.push(Expr::fvar(get_name(buf)?)),
          EXPR_SORT => results.push(Expr::sort(get_level(buf)?)),
          EXPR_CONST => {
            let name = get_name(buf)?;
            let mut levels = Vec::with_capacity(capped_capacity(tag.size, buf));
            for _ in 0..tag.size {
              levels.push(get_level(buf)?);
            }
            results.push(Expr::cnst(name, levels));
          },
          EXPR_APP => {
            if tag.size == 0 || tag.size > buf.len() as u64 {
              return Err(SerializeError::Malformed { context: "application arity" });
            }
            let spine = depth + tag.size as usize;
            if spine > MAX_EXPR_DEPTH {
              return Err(SerializeError::Malformed { context: "term nesting depth" });
            }
            for _ in 0..tag.size {
              work.push(GetExprFrame::BuildApp);
              work.push(GetExprFrame::Parse(spine)); // arg
            }
            work.push(GetExprFrame::Parse(spine)); // func
          },
          EXPR_LAM | EXPR_PI | EXPR_SIGMA => {
            let name = get_name(buf)?;
            work.push(match tag.flag {
              EXPR_LAM => GetExprFrame::BuildLam(name),
              EXPR_PI => GetExprFrame::BuildPi(name),
              _ => GetExprFrame::BuildSigma(name),
            });
            work.push(GetExprFrame::Parse(child)); // body
            work.push(GetExprFrame::Parse(child)); // type
          },
          EXPR_LET => {
            let name = get_name(buf)?;
            work.push(GetExprFrame::BuildLet(name));
            work.push(GetExprFrame::Parse(child)); // body
            work.push(GetExprFrame::Parse(child)); // val
            work.push(GetExprFrame::Parse(child)); // ty
          },
          EXPR_PAIR => {
            work.push(GetExprFrame::BuildPair);
            work.push(GetExprFrame::Parse(child));
            work.push(GetExprFrame::Parse(child));
          },
          EXPR_PROJ1 => {
            work.push(GetExprFrame::BuildProj1);
            work.push(GetExprFrame::Parse(child));
          },
          EXPR_PROJ2 => {
            work.push(GetExprFrame::BuildProj2);
            work.push(GetExprFrame::Parse(child));
          },
          flag => return Err(SerializeError::InvalidFlag { flag, context: "term" }),
        }
      },
      GetExprFrame::BuildApp => {
        let arg = pop(&mut results)?;
        let func = pop(&mut results)?;
        results.push(Expr::app(func, arg));
      },
      GetExprFrame::BuildLam(n) => {
        let body = pop(&mut results)?;
        let ty = pop(&mut results)?;
        results.push(Expr::lam(n, ty, body));
      },
      GetExprFrame::BuildPi(n) => {
        let body = pop(&mut results)?;
        let ty = pop(&mut results)?;
        results.push(Expr::pi(n, ty, body));
      },
      GetExprFrame::BuildSigma(n) => {
        let body = pop(&mut results)?;
        let ty = pop(&mut results)?;
        results.push(Expr::sigma(n, ty, body));
      },
      GetExprFrame::BuildLet(n) => {
        let body = pop(&mut results)?;
        let val = pop(&mut results)?;
        let ty = pop(&mut results)?;
        results.push(Expr::letE(n, ty, val, body));
      },
      GetExprFrame::BuildPair => {
        let b = pop(&mut results)?;
        let a = pop(&mut results)?;
        results.push(Expr::pair(a, b));
      },
      GetExprFrame::BuildProj1 => {
        let p = pop(&mut results)?;
        results.push(Expr::proj1(p));
      },
      GetExprFrame::BuildProj2 => {
        let p = pop(&mut results)?;
        results.push(Expr::proj2(p));
      },
    }
  }
  single(results, "term")
}

// ============================================================================
// Declarations
// ============================================================================

pub fn put_declaration(d: &Declaration, buf: &mut Vec<u8>) {
  put_name(&d.name, buf);
  put_names(&d.universe_params, buf);
  put_expr(&d.typ, buf);
  put_bool(d.value.is_some(), buf);
  if let Some(value) = &d.value {
    put_expr(value, buf);
  }
}

pub fn get_declaration(buf: &mut &[u8]) -> Result<Declaration, SerializeError> {
  let name = get_name(buf)?;
  let universe_params = get_names(buf)?;
  let typ = get_expr(buf)?;
  let value = if get_bool(buf)? { Some(get_expr(buf)?) } else { None };
  Ok(Declaration { name, universe_params, typ, value })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::church;

  fn roundtrip_expr(e: &Expr) -> Expr {
    let mut buf = Vec::new();
    put_expr(e, &mut buf);
    let mut slice = buf.as_slice();
    let out = get_expr(&mut slice).unwrap();
    assert!(slice.is_empty());
    out
  }

  #[test]
  fn names_keep_segments() {
    let n = Name::from_dotted("Algebra.Group.mul");
    let mut buf = Vec::new();
    put_name(&n, &mut buf);
    assert_eq!(get_name(&mut buf.as_slice()).unwrap(), n);
  }

  #[test]
  fn levels_keep_structure() {
    let u = Level::param(Name::atom("u"));
    let l = Level::imax(Level::succ(Level::succ(u.clone())), Level::max(u, Level::zero()));
    let mut buf = Vec::new();
    put_level(&l, &mut buf);
    assert_eq!(get_level(&mut buf.as_slice()).unwrap(), l);
  }

  #[test]
  fn terms_keep_binder_names() {
    let e = Expr::letE(
      Name::atom("k"),
      church::nat_type(),
      church::numeral(2),
      Expr::pair(Expr::proj1(Expr::bvar(0)), Expr::proj2(Expr::bvar(0))),
    );
    let out = roundtrip_expr(&e);
    assert_eq!(out, e);
    assert_eq!(out.to_string(), e.to_string());
  }

  #[test]
  fn nesting_up_to_the_limit_decodes() {
    let mut e = Expr::bvar(0);
    for _ in 0..MAX_EXPR_DEPTH {
      e = Expr::app(Expr::bvar(1), e);
    }
    let out = roundtrip_expr(&e);
    assert_eq!(out.get_hash(), e.get_hash());
  }

  #[test]
  fn rejects_nesting_past_the_limit() {
    let mut e = Expr::bvar(0);
    for _ in 0..=MAX_EXPR_DEPTH {
      e = Expr::proj1(e);
    }
    let mut buf = Vec::new();
    put_expr(&e, &mut buf);
    assert!(matches!(
      get_expr(&mut buf.as_slice()),
      Err(SerializeError::Malformed { context: "term nesting depth" })
    ));

    // one application with a spine longer than the limit
    let args = MAX_EXPR_DEPTH as u64 + 1;
    let mut buf = Vec::new();
    Tag4::new(EXPR_APP, args).put(&mut buf);
    for _ in 0..=args {
      Tag4::new(EXPR_BVAR, 0).put(&mut buf);
    }
    assert!(matches!(
      get_expr(&mut buf.as_slice()),
      Err(SerializeError::Malformed { context: "term nesting depth" })
    ));
  }

  #[test]
  fn rejects_oversized_bound_variables() {
    let mut buf = Vec::new();
    Tag4::new(EXPR_BVAR, u64::MAX).put(&mut buf);
    assert!(matches!(
      get_expr(&mut buf.as_slice()),
      Err(SerializeError::Malformed { context: "bound variable index" })
    ));
    let mut buf = Vec::new();
    Tag4::new(EXPR_BVAR, MAX_BVAR_INDEX).put(&mut buf);
    assert_eq!(get_expr(&mut buf.as_slice()).unwrap().bvar_range(), MAX_BVAR_INDEX + 1);
  }

  #[test]
  fn rejects_bad_flags_and_truncation() {
    let mut buf: &[u8] = &[0xf0];
    assert!(matches!(get_expr(&mut buf), Err(SerializeError::InvalidFlag { flag: 15, .. })));
    let mut full = Vec::new();
    put_expr(&church::add(), &mut full);
    let mut cut = &full[..full.len() - 1];
    assert!(get_expr(&mut cut).is_err());
  }

  #[test]
  fn declarations_roundtrip() {
    for d in church::prelude() {
      let mut buf = Vec::new();
      put_declaration(&d, &mut buf);
      assert_eq!(get_declaration(&mut buf.as_slice()).unwrap(), d);
    }
  }
}
