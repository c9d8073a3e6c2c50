//! The relation graph.
//!
//! Relations are indexed three ways per kind: by `(model, referenced model)`
//! pair, by owning model, and globally by `(model, alias)`.

use crate::model::ModelId;
use modelql_core::{Relation, RelationKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Order in which [`RelationGraph::between`] consults the kinds.
pub const KIND_PRIORITY: [RelationKind; 5] = [
    RelationKind::BelongsTo,
    RelationKind::HasMany,
    RelationKind::HasOne,
    RelationKind::HasOneThrough,
    RelationKind::HasManyThrough,
];

#[derive(Debug, Default)]
struct KindIndex {
    by_pair: HashMap<(ModelId, ModelId), Vec<Arc<Relation>>>,
    by_model: HashMap<ModelId, Vec<Arc<Relation>>>,
}

#[derive(Debug, Default)]
pub struct RelationGraph {
    kinds: HashMap<RelationKind, KindIndex>,
    aliases: HashMap<(ModelId, String), Arc<Relation>>,
}

impl RelationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `relation` from `model` under `alias`.
    ///
    /// A later relation with the same alias replaces the earlier one in the
    /// alias table; both stay in the pair and model views.
    pub fn insert(&mut self, model: &ModelId, alias: &str, relation: Arc<Relation>) {
        let referenced = ModelId::new(relation.referenced_model());
        let index = self.kinds.entry(relation.kind()).or_default();
        index
            .by_pair
            .entry((model.clone(), referenced))
            .or_default()
            .push(Arc::clone(&relation));
        index
            .by_model
            .entry(model.clone())
            .or_default()
            .push(Arc::clone(&relation));

        if let Some(previous) = self
            .aliases
            .insert((model.clone(), alias.to_lowercase()), relation)
        {
            tracing::debug!(
                model = %model,
                alias = %alias,
                previous = previous.referenced_model(),
                "relation alias redefined"
            );
        }
    }

    pub fn by_alias(&self, model: &ModelId, alias: &str) -> Option<Arc<Relation>> {
        self.aliases
            .get(&(model.clone(), alias.to_lowercase()))
            .cloned()
    }

    /// Relations of `kind` from `model` to `referenced`.
    pub fn of_pair(&self, kind: RelationKind, model: &ModelId, referenced: &ModelId) -> &[Arc<Relation>] {
        self.kinds
            .get(&kind)
            .and_then(|index| index.by_pair.get(&(model.clone(), referenced.clone())))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Relations of `kind` declared by `model`.
    pub fn of_model(&self, kind: RelationKind, model: &ModelId) -> &[Arc<Relation>] {
        self.kinds
            .get(&kind)
            .and_then(|index| index.by_model.get(model))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First non-empty pair view in [`KIND_PRIORITY`] order.
    pub fn between(&self, model: &ModelId, referenced: &ModelId) -> Option<Vec<Arc<Relation>>> {
        KIND_PRIORITY.iter().find_map(|kind| {
            let relations = self.of_pair(*kind, model, referenced);
            (!relations.is_empty()).then(|| relations.to_vec())
        })
    }

    /// Every relation declared by `model`, grouped by kind.
    pub fn all(&self, model: &ModelId) -> Vec<Arc<Relation>> {
        KIND_PRIORITY
            .iter()
            .flat_map(|kind| self.of_model(*kind, model).iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelql_core::RelationOptions;

    fn relation(kind: RelationKind, referenced: &str) -> Arc<Relation> {
        Arc::new(Relation::new(
            kind,
            referenced,
            "id".into(),
            "robots_id".into(),
            RelationOptions::new(),
        ))
    }

    #[test]
    fn between_prefers_belongs_to() {
        let mut graph = RelationGraph::new();
        let robots = ModelId::new("Robots");
        graph.insert(&robots, "parts", relation(RelationKind::HasMany, "Parts"));
        graph.insert(&robots, "part", relation(RelationKind::BelongsTo, "Parts"));

        let found = graph.between(&robots, &ModelId::new("PARTS")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind(), RelationKind::BelongsTo);
        assert_eq!(graph.all(&robots).len(), 2);
        assert!(graph.between(&ModelId::new("Parts"), &robots).is_none());
    }

    #[test]
    fn aliases_are_case_insensitive() {
        let mut graph = RelationGraph::new();
        let robots = ModelId::new("Robots");
        graph.insert(&robots, "robotsParts", relation(RelationKind::HasMany, "RobotsParts"));
        assert!(graph.by_alias(&ModelId::new("robots"), "ROBOTSPARTS").is_some());
        assert!(graph.by_alias(&robots, "parts").is_none());
    }
}
