//! Attribute and relation kind definitions

/// The kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttributeKind {
    /// Chosen by the external search process; written only through edits.
    ///
    /// Relations are decision attributes whose value points at other entities.
    Decision,
    /// Computed by exactly one derivation rule; never written directly.
    Derived,
}

impl AttributeKind {
    /// Returns true if this attribute may be set by the caller.
    pub fn is_decision(&self) -> bool {
        matches!(self, AttributeKind::Decision)
    }

    /// Returns true if this attribute is a shadow of other attributes.
    pub fn is_derived(&self) -> bool {
        matches!(self, AttributeKind::Derived)
    }
}

/// How many targets a relation attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// `Null` or `Ref(target)`, e.g. an assignment's employee.
    One,
    /// `Refs(targets)`, e.g. an allocation's predecessors.
    Many,
}

/// What happens to references pointing at an entity being removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RemovalPolicy {
    /// Drop the reference.
    #[default]
    Detach,
    /// Replace the reference with the removed entity's own targets of the
    /// same relation, so chains and precedence orders stay connected.
    ///
    /// Only valid on relations whose target type is the declaring type.
    Splice,
}
