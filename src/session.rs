//! The declaration and query surface.
//!
//! A [`Session`] owns the global environment, the namespace/section state
//! and the configuration. Declarations go through name resolution,
//! auto-abstraction and the kernel before they reach the environment;
//! queries never modify it.

use std::fmt;
use std::path::Path;

use tracing::{debug, info};

use crate::config::Config;
use crate::kernel::env::{Declaration, Environment};
use crate::kernel::error::TcError;
use crate::kernel::expr::Expr;
use crate::kernel::name::Name;
use crate::kernel::tc::TypeChecker;
use crate::scope::{Scope, ScopeError};
use crate::unit::Unit;
use crate::unit::digest::Digest;
use crate::unit::error::UnitError;

pub type EvalError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub enum Error {
  Scope(ScopeError),
  Check(TcError),
  Unit(UnitError),
  /// The term still mentions section variables.
  OpenTerm { vars: Vec<Name> },
  Evaluation(EvalError),
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Error::Scope(e) => write!(f, "{e}"),
      Error::Check(e) => write!(f, "{e}"),
      Error::Unit(e) => write!(f, "{e}"),
      Error::OpenTerm { vars } => {
        let names: Vec<String> = vars.iter().map(Name::pretty).collect();
        write!(f, "term depends on section variables: {}", names.join(", "))
      },
      Error::Evaluation(e) => write!(f, "evaluation failed: {e}"),
    }
  }
}

impl std::error::Error for Error {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Error::Scope(e) => Some(e),
      Error::Check(e) => Some(e),
      Error::Unit(e) => Some(e),
      Error::OpenTerm { .. } => None,
      Error::Evaluation(e) => Some(e.as_ref()),
    }
  }
}

impl From<ScopeError> for Error {
  fn from(e: ScopeError) -> Self {
    Error::Scope(e)
  }
}

impl From<TcError> for Error {
  fn from(e: TcError) -> Self {
    Error::Check(e)
  }
}

impl From<UnitError> for Error {
  fn from(e: UnitError) -> Self {
    Error::Unit(e)
  }
}

/// An execution engine for checked, closed terms.
pub trait Evaluator {
  fn evaluate(&self, env: &Environment, term: &Expr, typ: &Expr) -> Result<Expr, EvalError>;
}

/// Evaluates by kernel normalization, with axioms left opaque.
#[derive(Debug, Clone, Copy)]
pub struct KernelEvaluator {
  pub max_steps: u64,
}

impl Evaluator for KernelEvaluator {
  fn evaluate(&self, env: &Environment, term: &Expr, _typ: &Expr) -> Result<Expr, EvalError> {
    let mut tc = TypeChecker::with_limit(env, self.max_steps);
    Ok(tc.normalize(term, &Default::default())?)
  }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
  env: Environment,
  scope: Scope,
  config: Config,
}

impl Session {
  pub fn new(config: Config) -> Self {
    Session { env: Environment::new(), scope: Scope::new(), config }
  }

  /// Continue from an existing environment.
  pub fn with_env(env: Environment, config: Config) -> Self {
    Session { env, scope: Scope::new(), config }
  }

  pub fn env(&self) -> &Environment {
    &self.env
  }

  pub fn scope(&self) -> &Scope {
    &self.scope
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  fn checker(&self) -> TypeChecker<'_> {
    let mut tc = TypeChecker::with_limit(&self.env, self.config.max_reduction_steps);
    tc.cache_results = self.config.cache_results;
    tc
  }

  /// Check a declaration and add it under the current namespace. Section
  /// variables it uses become leading parameters. Returns the qualified
  /// name. On failure the environment is unchanged.
  pub fn declare(
    &mut self,
    name: &Name,
    universe_params: Vec<Name>,
    typ: &Expr,
    value: Option<&Expr>,
  ) -> Result<Name, Error> {
    let qualified = self.scope.qualify(name);
    if self.env.contains(&qualified) {
      return Err(TcError::DuplicateName { name: qualified }.into());
    }
    let typ = self.scope.resolve_term(typ, &self.env)?;
    let value = value.map(|v| self.scope.resolve_term(v, &self.env)).transpose()?;
    let (abs, typ, value) = self.scope.finalize_declaration(&typ, value.as_ref());
    if !abs.is_empty() {
      debug!(name = %qualified, vars = ?abs.names(), "abstracted section variables");
    }
    let decl = Declaration { name: qualified.clone(), universe_params, typ, value };
    self.checker().check_declaration(&decl)?;
    self.env.insert(decl)?;
    info!(name = %qualified, "declared");
    Ok(qualified)
  }

  /// Register a section variable. Its type must be a type, possibly
  /// depending on earlier variables.
  pub fn declare_variable(&mut self, name: Name, typ: &Expr) -> Result<(), Error> {
    let typ = self.scope.resolve_term(typ, &self.env)?;
    let abs = self.scope.abstraction_for(&[&typ]);
    self.checker().infer_sort_of(&abs.close(&typ), &abs.context())?;
    self.scope.declare_variable(name, typ, &self.env)?;
    Ok(())
  }

  pub fn open_namespace(&mut self, name: Name) {
    self.scope.open_namespace(name);
  }

  pub fn close_namespace(&mut self, name: Option<&Name>) -> Result<(), Error> {
    Ok(self.scope.close_namespace(name)?)
  }

  pub fn open_section(&mut self, name: Option<Name>) {
    self.scope.open_section(name);
  }

  pub fn close_section(&mut self, name: Option<&Name>) -> Result<(), Error> {
    Ok(self.scope.close_section(name)?)
  }

  pub fn open(&mut self, ns: &Name) -> Result<Name, Error> {
    Ok(self.scope.open(ns, &self.env)?)
  }

  /// Infer the type of a raw term. Section variables it mentions are in
  /// scope and may appear in the result.
  pub fn type_of(&self, term: &Expr) -> Result<Expr, Error> {
    let term = self.scope.resolve_term(term, &self.env)?;
    let abs = self.scope.abstraction_for(&[&term]);
    let ty = self.checker().infer(&abs.close(&term), &abs.context())?;
    Ok(abs.open(&ty))
  }

  /// Full normal form of a raw term, with axioms left opaque.
  pub fn reduce(&self, term: &Expr) -> Result<Expr, Error> {
    let term = self.scope.resolve_term(term, &self.env)?;
    let abs = self.scope.abstraction_for(&[&term]);
    let nf = self.checker().normalize(&abs.close(&term), &abs.context())?;
    Ok(abs.open(&nf))
  }

  /// Type-check a closed term, then hand it to `evaluator`.
  pub fn evaluate(&self, term: &Expr, evaluator: &dyn Evaluator) -> Result<Expr, Error> {
    let term = self.scope.resolve_term(term, &self.env)?;
    let abs = self.scope.abstraction_for(&[&term]);
    if !abs.is_empty() {
      return Err(Error::OpenTerm { vars: abs.names() });
    }
    let typ = self.checker().infer(&term, &Default::default())?;
    evaluator.evaluate(&self.env, &term, &typ).map_err(Error::Evaluation)
  }

  pub fn save_unit(&self, path: impl AsRef<Path>) -> Result<Digest, Error> {
    Ok(Unit::from_env(&self.env).write_to(path)?)
  }

  /// Load a unit written by [`Self::save_unit`]. Returns the number of new
  /// declarations.
  pub fn load_unit(&mut self, path: impl AsRef<Path>) -> Result<usize, Error> {
    let unit = Unit::read_from(path)?;
    let added = unit.load_into(&mut self.env, &self.config)?;
    info!(added, total = self.env.len(), "loaded unit");
    Ok(added)
  }
}
