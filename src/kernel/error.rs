use super::expr::Expr;
use super::name::Name;

#[derive(Debug, Clone)]
pub enum TcError {
  /// Reference to a constant missing from the environment.
  UnknownConstant {
    name: Name,
  },
  DuplicateName {
    name: Name,
  },
  UniverseArityMismatch {
    name: Name,
    expected: usize,
    found: usize,
  },
  /// Application head whose type is not a Pi after reduction.
  NotAFunction {
    expr: Expr,
    inferred: Expr,
  },
  /// Projection target whose type is not a Sigma after reduction.
  NotAPair {
    expr: Expr,
    inferred: Expr,
  },
  /// Binder or component type that does not reduce to a Sort.
  NotASort {
    expr: Expr,
    inferred: Expr,
  },
  TypeMismatch {
    expected: Expr,
    found: Expr,
    expr: Expr,
  },
  DuplicateUniverse {
    name: Name,
  },
  UndeclaredUniverse {
    name: Name,
  },
  /// Bound variable outside every enclosing binder. Always an internal
  /// invariant violation.
  LooseBoundVar {
    idx: u64,
  },
  /// Named free variable reaching the kernel.
  UnexpectedFreeVariable {
    name: Name,
  },
  /// The reduction step budget ran out.
  ResourceExhausted {
    limit: u64,
  },
}

impl std::fmt::Display for TcError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TcError::UnknownConstant { name } => {
        write!(f, "unknown constant: {}", name.pretty())
      },
      TcError::DuplicateName { name } => {
        write!(f, "duplicate declaration: {}", name.pretty())
      },
      TcError::UniverseArityMismatch { name, expected, found } => write!(
        f,
        "constant {} expects {} universe argument(s), got {}",
        name.pretty(),
        expected,
        found
      ),
      TcError::NotAFunction { expr, inferred } => {
        write!(f, "function expected: {expr} has type {inferred}")
      },
      TcError::NotAPair { expr, inferred } => {
        write!(f, "pair expected: {expr} has type {inferred}")
      },
      TcError::NotASort { expr, inferred } => {
        write!(f, "type expected: {expr} has type {inferred}")
      },
      TcError::TypeMismatch { expected, found, expr } => write!(
        f,
        "type mismatch for {expr}: expected {expected}, found {found}"
      ),
      TcError::DuplicateUniverse { name } => {
        write!(f, "duplicate universe: {}", name.pretty())
      },
      TcError::UndeclaredUniverse { name } => {
        write!(f, "undeclared universe parameter in {}", name.pretty())
      },
      TcError::LooseBoundVar { idx } => {
        write!(f, "free bound variable at index {}", idx)
      },
      TcError::UnexpectedFreeVariable { name } => {
        write!(f, "unexpected free variable: {}", name.pretty())
      },
      TcError::ResourceExhausted { limit } => {
        write!(f, "reduction step limit exceeded ({limit} steps)")
      },
    }
  }
}

impl std::error::Error for TcError {}

pub type TcResult<T> = Result<T, TcError>;
