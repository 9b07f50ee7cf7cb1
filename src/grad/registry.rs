//! Operator-kind to gradient-rule mapping.
//!
//! Construction is two-phase: a [`RegistryBuilder`] collects registrations
//! and rejects duplicates, then [`RegistryBuilder::build`] freezes them into a
//! [`GradientRegistry`] that only supports lookups.

use std::collections::hash_map::Entry;
use std::sync::LazyLock;

use log::{trace, warn};
use rustc_hash::FxHashMap;
use typed_builder::TypedBuilder;

use crate::error::{GradError, Result};
use crate::grad::rules::register_defaults;
use crate::ir::{Expr, OpKind};

/// Signature of a gradient rule: `(orig_call, output_grad) -> one gradient
/// per argument of orig_call`.
pub type GradientFn = fn(&Expr, &Expr) -> Result<Vec<Expr>>;

/// Whether a rule computes the true gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStatus {
    Exact,
    /// Stand-in rule whose gradients disagree with the operator's kernel.
    Placeholder,
}

/// A registered rule, ready to be applied.
#[derive(Debug, Clone, Copy)]
pub struct GradientRule {
    op: OpKind,
    func: GradientFn,
    status: RuleStatus,
    check_gradient_types: bool,
}

impl GradientRule {
    pub fn op(&self) -> OpKind {
        self.op
    }

    pub fn status(&self) -> RuleStatus {
        self.status
    }

    pub fn is_placeholder(&self) -> bool {
        self.status == RuleStatus::Placeholder
    }

    /// Applies the rule to `orig`, a call of this rule's operator, and
    /// `grad`, the gradient of its output.
    ///
    /// The result holds exactly one gradient per argument. Unless disabled in
    /// [`RegistryConfig`], each gradient is also checked to have the type of
    /// its argument.
    pub fn apply(&self, orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
        let op = self.op;
        let call = orig
            .as_call()
            .filter(|call| call.op() == op)
            .ok_or_else(|| GradError::type_mismatch(op, format!("a `{op}` call"), orig))?;
        if grad.ty() != orig.ty() {
            return Err(GradError::type_mismatch(
                op,
                format!("an output gradient of type {}", orig.ty()),
                grad.ty(),
            ));
        }

        if self.is_placeholder() {
            warn!("{op}: placeholder gradient rule applied to {orig}, gradients are not exact");
        }
        trace!("{op}: applying gradient rule");

        let grads = (self.func)(orig, grad)?;
        let args = call.args();
        if grads.len() != args.len() {
            return Err(GradError::ArityMismatch {
                op,
                what: "gradients",
                expected: args.len(),
                actual: grads.len(),
            });
        }
        if self.check_gradient_types {
            for (index, (g, arg)) in grads.iter().zip(args).enumerate() {
                if g.ty() != arg.ty() {
                    return Err(GradError::GradientTypeMismatch {
                        op,
                        index,
                        expected: arg.ty().clone(),
                        actual: g.ty().clone(),
                    });
                }
            }
        }

        trace!("{op}: produced {} gradients", grads.len());
        Ok(grads)
    }
}

/// What the registry holds for one operator kind.
#[derive(Debug, Clone, Copy)]
pub enum Registration {
    Rule(GradientRule),
    /// Intentionally without a rule. Lookups report a missing rule.
    NonDifferentiable { reason: &'static str },
}

/// Registry construction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder)]
pub struct RegistryConfig {
    /// Whether placeholder rules are usable. When `false` they are recorded
    /// as non-differentiable instead.
    #[builder(default = true)]
    pub include_placeholders: bool,
    /// Whether [`GradientRule::apply`] checks each gradient's type.
    #[builder(default = true)]
    pub check_gradient_types: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Mutable construction phase of a [`GradientRegistry`].
#[derive(Debug)]
pub struct RegistryBuilder {
    config: RegistryConfig,
    entries: FxHashMap<OpKind, Registration>,
}

impl RegistryBuilder {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            entries: FxHashMap::default(),
        }
    }

    fn insert(&mut self, op: OpKind, registration: Registration) -> Result<&mut Self> {
        match self.entries.entry(op) {
            Entry::Occupied(_) => Err(GradError::DuplicateRegistration { op }),
            Entry::Vacant(slot) => {
                slot.insert(registration);
                Ok(self)
            }
        }
    }

    fn rule(&self, op: OpKind, func: GradientFn, status: RuleStatus) -> Registration {
        Registration::Rule(GradientRule {
            op,
            func,
            status,
            check_gradient_types: self.config.check_gradient_types,
        })
    }

    /// Registers the gradient rule of `op`.
    pub fn register(&mut self, op: OpKind, func: GradientFn) -> Result<&mut Self> {
        let registration = self.rule(op, func, RuleStatus::Exact);
        self.insert(op, registration)
    }

    /// Registers a rule known to produce inexact gradients.
    pub fn register_placeholder(&mut self, op: OpKind, func: GradientFn) -> Result<&mut Self> {
        let registration = if self.config.include_placeholders {
            self.rule(op, func, RuleStatus::Placeholder)
        } else {
            Registration::NonDifferentiable {
                reason: "placeholder rule excluded by configuration",
            }
        };
        self.insert(op, registration)
    }

    /// Records that `op` intentionally has no gradient rule.
    pub fn mark_non_differentiable(&mut self, op: OpKind, reason: &'static str) -> Result<&mut Self> {
        self.insert(op, Registration::NonDifferentiable { reason })
    }

    /// Freezes the registrations.
    pub fn build(self) -> GradientRegistry {
        GradientRegistry {
            entries: self.entries,
        }
    }
}

/// Frozen, read-only gradient rule table.
#[derive(Debug)]
pub struct GradientRegistry {
    entries: FxHashMap<OpKind, Registration>,
}

impl GradientRegistry {
    pub fn builder(config: RegistryConfig) -> RegistryBuilder {
        RegistryBuilder::new(config)
    }

    /// Registry holding every default rule.
    pub fn with_defaults(config: RegistryConfig) -> Result<Self> {
        let mut builder = RegistryBuilder::new(config);
        register_defaults(&mut builder)?;
        Ok(builder.build())
    }

    pub fn registration(&self, op: OpKind) -> Option<&Registration> {
        self.entries.get(&op)
    }

    /// Rule for `op`. Unregistered and non-differentiable kinds are both
    /// reported as `MissingGradientRule`.
    pub fn lookup(&self, op: OpKind) -> Result<&GradientRule> {
        match self.entries.get(&op) {
            Some(Registration::Rule(rule)) => Ok(rule),
            Some(Registration::NonDifferentiable { reason }) => {
                trace!("{op}: not differentiable ({reason})");
                Err(GradError::MissingGradientRule {
                    op: op.name().to_string(),
                })
            }
            None => Err(GradError::MissingGradientRule {
                op: op.name().to_string(),
            }),
        }
    }

    /// Rule for the operator called `name`.
    pub fn lookup_by_name(&self, name: &str) -> Result<&GradientRule> {
        let op = OpKind::from_name(name).ok_or_else(|| GradError::MissingGradientRule {
            op: name.to_string(),
        })?;
        self.lookup(op)
    }

    /// Operator kinds with neither a rule nor a non-differentiable marker.
    pub fn uncovered_ops(&self) -> Vec<OpKind> {
        OpKind::ALL
            .iter()
            .copied()
            .filter(|op| !self.entries.contains_key(op))
            .collect()
    }

    /// Gradients of `orig`'s arguments given the gradient of its output.
    pub fn gradient(&self, orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
        let call = orig.as_call().ok_or_else(|| GradError::MissingGradientRule {
            op: orig.to_string(),
        })?;
        self.lookup(call.op())?.apply(orig, grad)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static GLOBAL_REGISTRY: LazyLock<GradientRegistry> = LazyLock::new(|| {
    GradientRegistry::with_defaults(RegistryConfig::default())
        .unwrap_or_else(|err| panic!("default gradient rules are inconsistent: {err}"))
});

/// Process-wide registry holding the default rules.
pub fn global_registry() -> &'static GradientRegistry {
    &GLOBAL_REGISTRY
}

/// Rule registered for `op` in the process-wide registry.
pub fn lookup_gradient_rule(op: OpKind) -> Result<&'static GradientRule> {
    global_registry().lookup(op)
}

/// Applies the process-wide rule for `orig`'s operator.
pub fn gradient(orig: &Expr, grad: &Expr) -> Result<Vec<Expr>> {
    global_registry().gradient(orig, grad)
}
