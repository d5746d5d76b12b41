//! Church-encoded natural numbers.
//!
//! `Nat := (A : Sort 0) → (A → A) → A → A`. Numerals are ordinary closed
//! terms, so the kernel computes with them by beta and delta alone; there are
//! no primitive literals.

use crate::kernel::env::Declaration;
use crate::kernel::expr::{Expr, ExprData};
use crate::kernel::level::Level;
use crate::kernel::name::Name;

pub fn nat_name() -> Name {
  Name::atom("Nat")
}

fn nat_const() -> Expr {
  Expr::cnst(nat_name(), vec![])
}

fn name(s: &str) -> Name {
  Name::atom(s)
}

fn app_n(f: Expr, args: &[Expr]) -> Expr {
  args.iter().fold(f, |acc, a| Expr::app(acc, a.clone()))
}

/// Wrap `body` in the three numeral binders `A`, `s`, `z`.
fn numeral_binders(body: Expr) -> Expr {
  Expr::lam(
    name("A"),
    Expr::sort(Level::zero()),
    Expr::lam(
      name("s"),
      Expr::arrow(Expr::bvar(0), Expr::bvar(0)),
      Expr::lam(name("z"), Expr::bvar(1), body),
    ),
  )
}

/// `(A : Sort 0) → (A → A) → A → A`, a type in `Sort 1`.
pub fn nat_type() -> Expr {
  Expr::pi(
    name("A"),
    Expr::sort(Level::zero()),
    Expr::pi(
      name("s"),
      Expr::arrow(Expr::bvar(0), Expr::bvar(0)),
      Expr::pi(name("z"), Expr::bvar(1), Expr::bvar(2)),
    ),
  )
}

/// `fun A s z => s (s (... z))` with `n` applications of `s`.
pub fn numeral(n: u64) -> Expr {
  let mut body = Expr::bvar(0);
  for _ in 0..n {
    body = Expr::app(Expr::bvar(1), body);
  }
  numeral_binders(body)
}

/// `fun n A s z => s (n A s z)`
pub fn succ() -> Expr {
  // under n A s z: n = #3, A = #2, s = #1, z = #0
  let inner = app_n(Expr::bvar(3), &[Expr::bvar(2), Expr::bvar(1), Expr::bvar(0)]);
  Expr::lam(name("n"), nat_const(), numeral_binders(Expr::app(Expr::bvar(1), inner)))
}

/// `fun m n A s z => m A s (n A s z)`
pub fn add() -> Expr {
  // under m n A s z: m = #4, n = #3
  let n_applied = app_n(Expr::bvar(3), &[Expr::bvar(2), Expr::bvar(1), Expr::bvar(0)]);
  let body = app_n(Expr::bvar(4), &[Expr::bvar(2), Expr::bvar(1), n_applied]);
  Expr::lam(
    name("m"),
    nat_const(),
    Expr::lam(name("n"), nat_const(), numeral_binders(body)),
  )
}

/// `fun m n A s z => m A (n A s) z`
pub fn mul() -> Expr {
  let n_s = app_n(Expr::bvar(3), &[Expr::bvar(2), Expr::bvar(1)]);
  let body = app_n(Expr::bvar(4), &[Expr::bvar(2), n_s, Expr::bvar(0)]);
  Expr::lam(
    name("m"),
    nat_const(),
    Expr::lam(name("n"), nat_const(), numeral_binders(body)),
  )
}

/// Declarations for `Nat`, `Nat.succ`, `Nat.add` and `Nat.mul`, in
/// dependency order.
pub fn prelude() -> Vec<Declaration> {
  let unary = Expr::arrow(nat_const(), nat_const());
  let binary = Expr::arrow(nat_const(), unary.clone());
  vec![
    Declaration::definition(nat_name(), vec![], Expr::sort(Level::one()), nat_type()),
    Declaration::definition(nat_name().append("succ"), vec![], unary, succ()),
    Declaration::definition(nat_name().append("add"), vec![], binary.clone(), add()),
    Declaration::definition(nat_name().append("mul"), vec![], binary, mul()),
  ]
}

/// Read back a numeral in normal form.
pub fn to_u64(e: &Expr) -> Option<u64> {
  let ExprData::Lam(_, _, e) = e.as_data() else { return None };
  let ExprData::Lam(_, _, e) = e.as_data() else { return None };
  let ExprData::Lam(_, _, e) = e.as_data() else { return None };
  let mut n = 0;
  let mut cursor = e;
  loop {
    match cursor.as_data() {
      ExprData::Bvar(0) => return Some(n),
      ExprData::App(f, arg) if matches!(f.as_data(), ExprData::Bvar(1)) => {
        n += 1;
        cursor = arg;
      },
      _ => return None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::kernel::env::Environment;
  use crate::kernel::expr::alpha_eq;
  use crate::kernel::local_ctx::LocalContext;
  use crate::kernel::tc::TypeChecker;
  use quickcheck_macros::quickcheck;

  fn prelude_env() -> Environment {
    let mut env = Environment::new();
    for decl in prelude() {
      TypeChecker::new(&env).check_declaration(&decl).unwrap();
      env.insert(decl).unwrap();
    }
    env
  }

  fn op(s: &str) -> Expr {
    Expr::cnst(Name::from_dotted(s), vec![])
  }

  fn eval(env: &Environment, e: &Expr) -> Expr {
    TypeChecker::new(env).normalize(e, &LocalContext::new()).unwrap()
  }

  #[test]
  fn nat_lives_in_sort_one() {
    let env = Environment::new();
    let ty = TypeChecker::new(&env).infer(&nat_type(), &LocalContext::new()).unwrap();
    assert_eq!(ty, Expr::sort(Level::one()));
  }

  #[test]
  fn numerals_check_against_nat() {
    let env = prelude_env();
    let mut tc = TypeChecker::new(&env);
    for n in [0, 1, 5] {
      tc.check(&numeral(n), &nat_const(), &LocalContext::new()).unwrap();
    }
  }

  #[test]
  fn arithmetic() {
    let env = prelude_env();
    let two_plus_three = app_n(op("Nat.add"), &[numeral(2), numeral(3)]);
    assert_eq!(to_u64(&eval(&env, &two_plus_three)), Some(5));
    let two_times_three = app_n(op("Nat.mul"), &[numeral(2), numeral(3)]);
    assert_eq!(to_u64(&eval(&env, &two_times_three)), Some(6));
    let succ_four = Expr::app(op("Nat.succ"), numeral(4));
    assert!(alpha_eq(&eval(&env, &succ_four), &numeral(5)));
  }

  #[test]
  fn read_back_rejects_non_numerals() {
    assert_eq!(to_u64(&nat_type()), None);
    assert_eq!(to_u64(&succ()), None);
  }

  #[quickcheck]
  fn prop_numeral_read_back(n: u8) -> bool {
    to_u64(&numeral(u64::from(n))) == Some(u64::from(n))
  }

  #[quickcheck]
  fn prop_add_matches_u64(m: u8, n: u8) -> bool {
    let (m, n) = (u64::from(m % 16), u64::from(n % 16));
    let env = prelude_env();
    let sum = app_n(op("Nat.add"), &[numeral(m), numeral(n)]);
    to_u64(&eval(&env, &sum)) == Some(m + n)
  }
}
