//! Derivation rules.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::domain::{AttrId, EntityId, Value};

static NULL: Value = Value::Null;

/// Pure function computing a derived value from its declared reads.
pub type ComputeFn = Arc<dyn Fn(&RuleInput<'_>) -> Value + Send + Sync>;

/// How a rule reaches the other entities it reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Traversal {
    /// Own attributes only.
    Local,
    /// Every target of the entity's own relation, in identity order.
    Forward(AttrId),
    /// Every entity pointing at this one through the relation, in mirror order.
    Inverse(AttrId),
    /// The element immediately preceding this entity in its target's mirror.
    Previous(AttrId),
}

impl Traversal {
    /// Returns the relation this traversal follows, if any.
    pub fn relation(&self) -> Option<AttrId> {
        match self {
            Traversal::Local => None,
            Traversal::Forward(r) | Traversal::Inverse(r) | Traversal::Previous(r) => Some(*r),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TraversalDecl {
    Local,
    Forward(String),
    Inverse { source_type: String, relation: String },
    Previous(String),
}

/// The reads of a derivation rule, before its function is attached.
#[derive(Debug, Clone)]
pub struct RuleReads {
    pub(crate) own: Vec<String>,
    pub(crate) traversal: TraversalDecl,
    pub(crate) remote: Vec<String>,
}

impl RuleReads {
    /// Adds own attributes to read, after any already declared.
    pub fn reading<I, S>(mut self, own: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.own.extend(own.into_iter().map(Into::into));
        self
    }

    /// Attaches the pure function, completing the rule.
    pub fn compute<F>(self, f: F) -> DerivationRule
    where
        F: Fn(&RuleInput<'_>) -> Value + Send + Sync + 'static,
    {
        DerivationRule {
            reads: self,
            compute: Arc::new(f),
        }
    }
}

/// Declaration of a derived attribute's rule.
///
/// # Example
///
/// ```
/// use shadowforge_core::{DerivationRule, Value};
///
/// // end_date = start_date + duration
/// let rule = DerivationRule::local(["start_date", "duration"])
///     .compute(|input| Value::Int(input.own_int(0) + input.own_int(1)));
/// # let _ = rule;
/// ```
#[derive(Clone)]
pub struct DerivationRule {
    pub(crate) reads: RuleReads,
    pub(crate) compute: ComputeFn,
}

impl DerivationRule {
    /// A rule reading only attributes of its own entity.
    pub fn local<I, S>(own: I) -> RuleReads
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RuleReads {
            own: own.into_iter().map(Into::into).collect(),
            traversal: TraversalDecl::Local,
            remote: Vec::new(),
        }
    }

    /// A rule reading `remote` attributes of every target of `relation`.
    pub fn via<I, S>(relation: impl Into<String>, remote: I) -> RuleReads
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RuleReads {
            own: Vec::new(),
            traversal: TraversalDecl::Forward(relation.into()),
            remote: remote.into_iter().map(Into::into).collect(),
        }
    }

    /// A rule reading `remote` attributes of every `source_type` entity whose
    /// `relation` points at this entity, in mirror order.
    pub fn inverse<I, S>(
        source_type: impl Into<String>,
        relation: impl Into<String>,
        remote: I,
    ) -> RuleReads
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RuleReads {
            own: Vec::new(),
            traversal: TraversalDecl::Inverse {
                source_type: source_type.into(),
                relation: relation.into(),
            },
            remote: remote.into_iter().map(Into::into).collect(),
        }
    }

    /// A rule reading `remote` attributes of the element right before this
    /// entity in the mirror of its own `relation`.
    pub fn previous<I, S>(relation: impl Into<String>, remote: I) -> RuleReads
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RuleReads {
            own: Vec::new(),
            traversal: TraversalDecl::Previous(relation.into()),
            remote: remote.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Debug for DerivationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivationRule")
            .field("reads", &self.reads)
            .finish()
    }
}

/// A derivation rule with every name resolved to an [`AttrId`].
#[derive(Clone)]
pub struct ResolvedRule {
    pub own_reads: Vec<AttrId>,
    pub traversal: Traversal,
    pub remote_reads: Vec<AttrId>,
    compute: ComputeFn,
}

impl ResolvedRule {
    pub(crate) fn new(
        own_reads: Vec<AttrId>,
        traversal: Traversal,
        remote_reads: Vec<AttrId>,
        compute: ComputeFn,
    ) -> Self {
        Self {
            own_reads,
            traversal,
            remote_reads,
            compute,
        }
    }

    /// Runs the rule's function.
    #[inline]
    pub fn evaluate(&self, input: &RuleInput<'_>) -> Value {
        (self.compute)(input)
    }
}

impl fmt::Debug for ResolvedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedRule")
            .field("own_reads", &self.own_reads)
            .field("traversal", &self.traversal)
            .field("remote_reads", &self.remote_reads)
            .finish()
    }
}

/// Values of one related entity, in the rule's `remote` read order.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedValues {
    pub entity: EntityId,
    pub values: SmallVec<[Value; 4]>,
}

impl RelatedValues {
    pub fn value(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&NULL)
    }

    /// Integer read, with non-integers treated as zero.
    pub fn int(&self, index: usize) -> i64 {
        self.value(index).int_or(0)
    }
}

/// Everything a derivation rule may look at.
///
/// Own reads come first, indexed in declaration order; related entities
/// follow the rule's traversal order.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    entity: EntityId,
    own: &'a [Value],
    related: &'a [RelatedValues],
}

impl<'a> RuleInput<'a> {
    pub fn new(entity: EntityId, own: &'a [Value], related: &'a [RelatedValues]) -> Self {
        Self {
            entity,
            own,
            related,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn own(&self, index: usize) -> &'a Value {
        self.own.get(index).unwrap_or(&NULL)
    }

    /// Integer own read, with non-integers treated as zero.
    pub fn own_int(&self, index: usize) -> i64 {
        self.own(index).int_or(0)
    }

    pub fn related(&self) -> &'a [RelatedValues] {
        self.related
    }

    pub fn first(&self) -> Option<&'a RelatedValues> {
        self.related.first()
    }

    pub fn last(&self) -> Option<&'a RelatedValues> {
        self.related.last()
    }

    /// Integer remote reads at `index` across all related entities.
    pub fn related_ints(&self, index: usize) -> impl Iterator<Item = i64> + 'a {
        self.related.iter().map(move |r| r.int(index))
    }
}
