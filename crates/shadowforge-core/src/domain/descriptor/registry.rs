//! The derivation-rule registry.

use std::collections::HashMap;

use crate::domain::{AttrId, AttributeKind, Cardinality, RemovalPolicy};
use crate::error::{Result, ShadowError};

use super::entity::AttributeDecl;
use super::rule::TraversalDecl;
use super::{
    AttributeDescriptor, EntityTypeBuilder, EntityTypeDescriptor, InverseDescriptor,
    RelationDescriptor, ResolvedRule, Traversal,
};

/// Builder for [`ShadowRegistry`].
///
/// # Example
///
/// ```
/// use shadowforge_core::{DerivationRule, RelationDef, ShadowRegistry, Value};
///
/// let registry = ShadowRegistry::builder()
///     .entity("Allocation", |t| {
///         t.decision("duration", 0)
///             .relation("predecessors", RelationDef::many("Allocation"))
///             .derived(
///                 "start_date",
///                 0,
///                 DerivationRule::via("predecessors", ["end_date"])
///                     .compute(|input| Value::Int(input.related_ints(0).max().unwrap_or(0))),
///             )
///             .derived(
///                 "end_date",
///                 0,
///                 DerivationRule::local(["start_date", "duration"])
///                     .compute(|input| Value::Int(input.own_int(0) + input.own_int(1))),
///             )
///     })
///     .build()
///     .unwrap();
///
/// assert!(registry.attr("Allocation", "end_date").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegistryBuilder {
    types: Vec<EntityTypeBuilder>,
}

impl RegistryBuilder {
    /// Declares an entity type and its attributes.
    pub fn entity<F>(mut self, name: impl Into<String>, declare: F) -> Self
    where
        F: FnOnce(EntityTypeBuilder) -> EntityTypeBuilder,
    {
        self.types.push(declare(EntityTypeBuilder::new(name)));
        self
    }

    /// Resolves every name and validates the declarations.
    ///
    /// # Errors
    ///
    /// `UnknownEntityType`/`UnknownAttribute` for dangling names,
    /// `CyclicDependency` when derived attributes of one entity read each
    /// other in a cycle, and `Config` for any other malformed declaration.
    pub fn build(self) -> Result<ShadowRegistry> {
        let mut type_index = HashMap::new();
        for (index, t) in self.types.iter().enumerate() {
            if type_index.insert(t.name.clone(), index).is_some() {
                return Err(ShadowError::Config(format!(
                    "entity type {} declared twice",
                    t.name
                )));
            }
        }

        let mut types = Vec::with_capacity(self.types.len());
        let mut attributes: Vec<AttributeDescriptor> = Vec::new();
        let mut decls: Vec<&AttributeDecl> = Vec::new();
        for (index, t) in self.types.iter().enumerate() {
            let mut ids = Vec::with_capacity(t.attributes.len());
            for (slot, (name, default, decl)) in t.attributes.iter().enumerate() {
                if t.attributes[..slot].iter().any(|(other, _, _)| other == name) {
                    return Err(ShadowError::Config(format!(
                        "attribute {}.{} declared twice",
                        t.name, name
                    )));
                }
                let id = AttrId::from_index(attributes.len());
                let kind = match decl {
                    AttributeDecl::Derived(_) => AttributeKind::Derived,
                    _ => AttributeKind::Decision,
                };
                attributes.push(AttributeDescriptor {
                    id,
                    entity_type: index,
                    name: name.clone(),
                    slot,
                    kind,
                    default: default.clone(),
                    relation: None,
                    rule: None,
                });
                decls.push(decl);
                ids.push(id);
            }
            types.push(EntityTypeDescriptor {
                name: t.name.clone(),
                index,
                attributes: ids,
                derivation_order: Vec::new(),
            });
        }

        let names = Names {
            type_index: &type_index,
            types: &types,
            attributes: &attributes,
        };

        // Relations first: rules refer to them.
        let mut relations = Vec::with_capacity(attributes.len());
        for (i, decl) in decls.iter().enumerate() {
            let AttributeDecl::Relation(def) = decl else {
                relations.push(None);
                continue;
            };
            let owner = attributes[i].entity_type;
            let target_type = names.entity_type(&def.target_type)?;
            if def.removal == RemovalPolicy::Splice && target_type != owner {
                return Err(ShadowError::Config(format!(
                    "{} can only splice on removal when it targets its own type",
                    names.qualified(attributes[i].id)
                )));
            }
            let inverse = match &def.mirror {
                None => None,
                Some(None) => Some(InverseDescriptor { order_key: None }),
                Some(Some(key)) => {
                    let key = names.attr(owner, key)?;
                    if !matches!(decls[key.index()], AttributeDecl::Decision) {
                        return Err(ShadowError::Config(format!(
                            "order key {} must be a plain decision attribute",
                            names.qualified(key)
                        )));
                    }
                    Some(InverseDescriptor {
                        order_key: Some(key),
                    })
                }
            };
            relations.push(Some(RelationDescriptor {
                target_type,
                cardinality: def.cardinality,
                removal: def.removal,
                inverse,
            }));
        }

        let mut rules = Vec::with_capacity(attributes.len());
        for (i, decl) in decls.iter().enumerate() {
            let AttributeDecl::Derived(rule) = decl else {
                rules.push(None);
                continue;
            };
            let owner = attributes[i].entity_type;
            let this = names.qualified(attributes[i].id);
            let own_reads = rule
                .reads
                .own
                .iter()
                .map(|name| names.attr(owner, name))
                .collect::<Result<Vec<_>>>()?;

            let relation_of = |id: AttrId| {
                relations[id.index()].as_ref().ok_or_else(|| {
                    ShadowError::Config(format!(
                        "{} traverses {}, which is not a relation",
                        this,
                        names.qualified(id)
                    ))
                })
            };

            let (traversal, remote_type) = match &rule.reads.traversal {
                TraversalDecl::Local => (Traversal::Local, None),
                TraversalDecl::Forward(relation) => {
                    let r = names.attr(owner, relation)?;
                    let target = relation_of(r)?.target_type;
                    (Traversal::Forward(r), Some(target))
                }
                TraversalDecl::Inverse {
                    source_type,
                    relation,
                } => {
                    let source = names.entity_type(source_type)?;
                    let r = names.attr(source, relation)?;
                    let desc = relation_of(r)?;
                    if desc.target_type != owner {
                        return Err(ShadowError::Config(format!(
                            "{} reads the inverse of {}, which does not target {}",
                            this,
                            names.qualified(r),
                            types[owner].name
                        )));
                    }
                    if desc.inverse.is_none() {
                        return Err(ShadowError::Config(format!(
                            "{} reads the inverse of {}, which is not mirrored",
                            this,
                            names.qualified(r)
                        )));
                    }
                    (Traversal::Inverse(r), Some(source))
                }
                TraversalDecl::Previous(relation) => {
                    let r = names.attr(owner, relation)?;
                    let desc = relation_of(r)?;
                    if desc.cardinality != Cardinality::One || desc.inverse.is_none() {
                        return Err(ShadowError::Config(format!(
                            "{} reads the previous element of {}, which must be a mirrored single relation",
                            this,
                            names.qualified(r)
                        )));
                    }
                    (Traversal::Previous(r), Some(owner))
                }
            };

            let remote_reads = match remote_type {
                Some(remote) => rule
                    .reads
                    .remote
                    .iter()
                    .map(|name| names.attr(remote, name))
                    .collect::<Result<Vec<_>>>()?,
                None if rule.reads.remote.is_empty() => Vec::new(),
                None => {
                    return Err(ShadowError::Config(format!(
                        "{this} declares remote reads without a traversal"
                    )))
                }
            };

            rules.push(Some(ResolvedRule::new(
                own_reads,
                traversal,
                remote_reads,
                rule.compute.clone(),
            )));
        }

        for (i, (relation, rule)) in relations.into_iter().zip(rules).enumerate() {
            if let Some(relation) = relation {
                attributes[i].default = relation.empty_value();
                attributes[i].relation = Some(relation);
            }
            attributes[i].rule = rule;
        }

        for t in &mut types {
            t.derivation_order = derivation_order(t, &attributes)?;
        }

        Ok(ShadowRegistry::index(types, attributes, type_index))
    }
}

// Name lookups used while resolving declarations.
struct Names<'a> {
    type_index: &'a HashMap<String, usize>,
    types: &'a [EntityTypeDescriptor],
    attributes: &'a [AttributeDescriptor],
}

impl Names<'_> {
    fn entity_type(&self, name: &str) -> Result<usize> {
        self.type_index
            .get(name)
            .copied()
            .ok_or_else(|| ShadowError::UnknownEntityType(name.to_string()))
    }

    fn attr(&self, entity_type: usize, name: &str) -> Result<AttrId> {
        lookup(self.types, self.attributes, entity_type, name)
    }

    fn qualified(&self, id: AttrId) -> String {
        let attr = &self.attributes[id.index()];
        format!("{}.{}", self.types[attr.entity_type].name, attr.name)
    }
}

fn lookup(
    types: &[EntityTypeDescriptor],
    attributes: &[AttributeDescriptor],
    entity_type: usize,
    name: &str,
) -> Result<AttrId> {
    let t = &types[entity_type];
    t.attributes
        .iter()
        .copied()
        .find(|id| attributes[id.index()].name == name)
        .ok_or_else(|| ShadowError::UnknownAttribute {
            entity_type: t.name.clone(),
            attribute: name.to_string(),
        })
}

// Kahn's algorithm over same-entity reads between derived attributes,
// ties broken by slot.
fn derivation_order(
    t: &EntityTypeDescriptor,
    attributes: &[AttributeDescriptor],
) -> Result<Vec<AttrId>> {
    let derived: Vec<AttrId> = t
        .attributes
        .iter()
        .copied()
        .filter(|id| attributes[id.index()].kind.is_derived())
        .collect();

    let reads_of = |id: AttrId| -> Vec<AttrId> {
        attributes[id.index()]
            .rule
            .as_ref()
            .map(|rule| {
                rule.own_reads
                    .iter()
                    .copied()
                    .filter(|r| attributes[r.index()].kind.is_derived())
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut order = Vec::with_capacity(derived.len());
    let mut remaining = derived;
    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .position(|&id| reads_of(id).iter().all(|r| order.contains(r)));
        match ready {
            Some(pos) => order.push(remaining.remove(pos)),
            None => {
                let cycle: Vec<String> = remaining
                    .iter()
                    .map(|id| format!("{}.{}", t.name, attributes[id.index()].name))
                    .collect();
                return Err(ShadowError::CyclicDependency(cycle.join(" <-> ")));
            }
        }
    }
    Ok(order)
}

/// Immutable table of entity types, attributes and derivation rules.
///
/// Besides the declarations it holds, per attribute, which derived
/// attributes read it and through which relation. The dependency graph
/// combines these static tables with the relation values in force to find
/// entity-level dependents.
#[derive(Debug, Clone)]
pub struct ShadowRegistry {
    types: Vec<EntityTypeDescriptor>,
    attributes: Vec<AttributeDescriptor>,
    type_index: HashMap<String, usize>,
    own_dependents: Vec<Vec<AttrId>>,
    forward_dependents: Vec<Vec<(AttrId, AttrId)>>,
    inverse_dependents: Vec<Vec<(AttrId, AttrId)>>,
    previous_dependents: Vec<Vec<(AttrId, AttrId)>>,
    inverse_rules: Vec<Vec<AttrId>>,
    previous_rules: Vec<Vec<AttrId>>,
    keyed_relations: Vec<Vec<AttrId>>,
    relations_targeting: Vec<Vec<AttrId>>,
}

impl ShadowRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    fn index(
        types: Vec<EntityTypeDescriptor>,
        attributes: Vec<AttributeDescriptor>,
        type_index: HashMap<String, usize>,
    ) -> Self {
        let n = attributes.len();
        let mut own_dependents = vec![Vec::new(); n];
        let mut forward_dependents = vec![Vec::new(); n];
        let mut inverse_dependents = vec![Vec::new(); n];
        let mut previous_dependents = vec![Vec::new(); n];
        let mut inverse_rules = vec![Vec::new(); n];
        let mut previous_rules = vec![Vec::new(); n];
        let mut keyed_relations = vec![Vec::new(); n];
        let mut relations_targeting = vec![Vec::new(); types.len()];

        for attr in &attributes {
            if let Some(relation) = &attr.relation {
                relations_targeting[relation.target_type].push(attr.id);
                if let Some(key) = relation.inverse.and_then(|inv| inv.order_key) {
                    keyed_relations[key.index()].push(attr.id);
                }
            }

            let Some(rule) = &attr.rule else { continue };
            let d = attr.id;
            for &x in &rule.own_reads {
                own_dependents[x.index()].push(d);
            }
            match rule.traversal {
                Traversal::Local => {}
                Traversal::Forward(r) => {
                    own_dependents[r.index()].push(d);
                    for &x in &rule.remote_reads {
                        forward_dependents[x.index()].push((r, d));
                    }
                }
                Traversal::Inverse(r) => {
                    inverse_rules[r.index()].push(d);
                    inverse_dependents[r.index()].push((r, d));
                    let key = attributes[r.index()]
                        .relation
                        .as_ref()
                        .and_then(|rel| rel.inverse)
                        .and_then(|inv| inv.order_key);
                    if let Some(key) = key {
                        inverse_dependents[key.index()].push((r, d));
                    }
                    for &x in &rule.remote_reads {
                        inverse_dependents[x.index()].push((r, d));
                    }
                }
                Traversal::Previous(r) => {
                    own_dependents[r.index()].push(d);
                    previous_rules[r.index()].push(d);
                    for &x in &rule.remote_reads {
                        previous_dependents[x.index()].push((r, d));
                    }
                }
            }
        }

        for list in &mut own_dependents {
            list.sort_unstable();
            list.dedup();
        }
        for list in forward_dependents
            .iter_mut()
            .chain(inverse_dependents.iter_mut())
            .chain(previous_dependents.iter_mut())
        {
            list.sort_unstable();
            list.dedup();
        }

        Self {
            types,
            attributes,
            type_index,
            own_dependents,
            forward_dependents,
            inverse_dependents,
            previous_dependents,
            inverse_rules,
            previous_rules,
            keyed_relations,
            relations_targeting,
        }
    }

    pub fn entity_types(&self) -> &[EntityTypeDescriptor] {
        &self.types
    }

    pub fn entity_type(&self, index: usize) -> &EntityTypeDescriptor {
        &self.types[index]
    }

    /// Looks up an entity type by name.
    pub fn type_index(&self, name: &str) -> Result<usize> {
        self.type_index
            .get(name)
            .copied()
            .ok_or_else(|| ShadowError::UnknownEntityType(name.to_string()))
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    #[inline]
    pub fn attribute(&self, id: AttrId) -> &AttributeDescriptor {
        &self.attributes[id.index()]
    }

    /// Resolves an attribute name within an entity type.
    pub fn resolve(&self, entity_type: usize, name: &str) -> Result<AttrId> {
        lookup(&self.types, &self.attributes, entity_type, name)
    }

    /// Looks up an attribute by type and attribute name.
    pub fn attr(&self, entity_type: &str, name: &str) -> Option<AttrId> {
        let index = self.type_index.get(entity_type)?;
        self.resolve(*index, name).ok()
    }

    /// Returns `Type.attribute` for messages and logs.
    pub fn qualified_name(&self, id: AttrId) -> String {
        let attr = self.attribute(id);
        format!("{}.{}", self.types[attr.entity_type].name, attr.name)
    }

    /// All relation attributes of all types.
    pub fn relations(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes.iter().filter(|a| a.relation.is_some())
    }

    /// Relations of one entity type.
    pub fn relations_of(&self, entity_type: usize) -> impl Iterator<Item = AttrId> + '_ {
        self.types[entity_type]
            .attributes
            .iter()
            .copied()
            .filter(|id| self.attribute(*id).relation.is_some())
    }

    /// Relations whose targets are of the given type.
    pub fn relations_targeting(&self, entity_type: usize) -> &[AttrId] {
        &self.relations_targeting[entity_type]
    }

    /// Number of derived attributes across all types.
    pub fn derived_count(&self) -> usize {
        self.attributes
            .iter()
            .filter(|a| a.kind.is_derived())
            .count()
    }

    /// Derived attributes of the same entity reading `attr`, including
    /// rules whose forward or previous-element traversal follows `attr`.
    #[inline]
    pub fn own_dependents(&self, attr: AttrId) -> &[AttrId] {
        &self.own_dependents[attr.index()]
    }

    /// `(relation, derived)` pairs reading `attr` on the targets of `relation`.
    #[inline]
    pub fn forward_dependents(&self, attr: AttrId) -> &[(AttrId, AttrId)] {
        &self.forward_dependents[attr.index()]
    }

    /// `(relation, derived)` pairs on the targets of `relation` reading `attr`
    /// of their mirror members. Membership and ordering changes count as reads.
    #[inline]
    pub fn inverse_dependents(&self, attr: AttrId) -> &[(AttrId, AttrId)] {
        &self.inverse_dependents[attr.index()]
    }

    /// `(relation, derived)` pairs reading `attr` of the previous mirror element.
    #[inline]
    pub fn previous_dependents(&self, attr: AttrId) -> &[(AttrId, AttrId)] {
        &self.previous_dependents[attr.index()]
    }

    /// Derived attributes with an inverse traversal over `relation`.
    #[inline]
    pub fn inverse_rules(&self, relation: AttrId) -> &[AttrId] {
        &self.inverse_rules[relation.index()]
    }

    /// Derived attributes with a previous-element traversal over `relation`.
    #[inline]
    pub fn previous_rules(&self, relation: AttrId) -> &[AttrId] {
        &self.previous_rules[relation.index()]
    }

    /// Mirrored relations ordered by `attr`.
    #[inline]
    pub fn keyed_relations(&self, attr: AttrId) -> &[AttrId] {
        &self.keyed_relations[attr.index()]
    }
}
