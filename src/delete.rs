//! Cascading delete.
//!
//! Deleting an entity instance also deletes everything that depends on it.
//! [`plan_delete`] walks the relationship graph breadth-first from the root
//! entity and produces one [`DeletePath`] per group of rows to remove:
//!
//! - every relationship touching a reached entity contributes its rows,
//!   except the one just traversed;
//! - a one-to-many, non-loose relationship followed from its source also
//!   reaches its target entity, whose instances are deleted in turn;
//! - an entity already on the path is not reached again.
//!
//! [`delete_entity`] runs the paths longest first, so each statement can still
//! find its rows through the link rows of the shorter paths. Every path is a
//! single statement whose key set is a nested subquery bound to the root id.
//!
//! Embedded relationships live in their target's table. Their rows disappear
//! with the target, and a loose one has its imported fields cleared instead.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::database::ErDatabase;
use crate::db::escape::quote_identifier;
use crate::db::Value;
use crate::error::ErdbError;
use crate::query::QueryError;
use crate::schema::{
    Arity, Direction, FieldType, Metadata, RelationshipMeta, FIELD_FROM_LINK, FIELD_ID, FIELD_TO_LINK,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteMode {
    /// The root instance and everything that depends on it.
    #[default]
    Full,
    /// Only the root instance's own rows.
    OnlyRoot,
    /// Everything that depends on the root instance, but not the root.
    KeepRoot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Entity(String),
    Link {
        relationship: String,
        direction: Direction,
    },
}

/// A route from the root entity to the rows one statement removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePath {
    nodes: Vec<Node>,
}

impl DeletePath {
    fn root(entity: &str) -> Self {
        Self {
            nodes: vec![Node::Entity(entity.to_string())],
        }
    }

    fn extend(&self, node: Node) -> Self {
        let mut nodes = self.nodes.clone();
        nodes.push(node);
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.nodes.len() == 1
    }

    fn last_relationship(&self) -> Option<&str> {
        self.nodes.iter().rev().find_map(|n| match n {
            Node::Link { relationship, .. } => Some(relationship.as_str()),
            Node::Entity(_) => None,
        })
    }

    fn reaches(&self, entity: &str) -> bool {
        self.nodes.iter().any(|n| matches!(n, Node::Entity(e) if e == entity))
    }

    /// Object names along the path; backward links use the converse name.
    pub fn objects(&self, meta: &Metadata) -> Vec<String> {
        self.nodes
            .iter()
            .map(|node| match node {
                Node::Entity(name) => name.clone(),
                Node::Link {
                    relationship,
                    direction: Direction::Forward,
                } => relationship.clone(),
                Node::Link {
                    relationship,
                    direction: Direction::Backward,
                } => meta.converse_of(relationship).unwrap_or(relationship).to_string(),
            })
            .collect()
    }
}

impl fmt::Display for DeletePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .nodes
            .iter()
            .map(|node| match node {
                Node::Entity(name) => name.clone(),
                Node::Link {
                    relationship,
                    direction: Direction::Forward,
                } => relationship.clone(),
                Node::Link { relationship, .. } => format!("{relationship}^"),
            })
            .collect();
        write!(f, "{}", names.join(" -> "))
    }
}

/// Rows removed per object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeleteStats {
    pub deleted: BTreeMap<String, u64>,
    /// Embedded links cleared per relationship.
    pub cleared: BTreeMap<String, u64>,
}

impl DeleteStats {
    pub fn total(&self) -> u64 {
        self.deleted.values().sum()
    }

    pub fn deleted(&self, object: &str) -> u64 {
        self.deleted.get(object).copied().unwrap_or(0)
    }
}

fn unknown(name: &str) -> QueryError {
    QueryError::UnknownObject {
        name: name.to_string(),
    }
}

/// Discover what deleting an instance of `entity` touches, longest path first.
#[instrument(skip(meta))]
pub fn plan_delete(meta: &Metadata, entity: &str, mode: DeleteMode) -> Result<Vec<DeletePath>, QueryError> {
    if meta.entity(entity).is_none() {
        return Err(unknown(entity));
    }
    let root = DeletePath::root(entity);
    if mode == DeleteMode::OnlyRoot {
        return Ok(vec![root]);
    }

    let mut paths = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(path) = queue.pop_front() {
        let Some(Node::Entity(current)) = path.nodes.last() else {
            continue;
        };
        let previous = path.last_relationship();
        for (rel, direction) in meta.relationships_of(current) {
            if previous == Some(rel.name.as_str()) {
                continue;
            }
            let link = path.extend(Node::Link {
                relationship: rel.name.clone(),
                direction,
            });
            let forward = direction == Direction::Forward;
            if !rel.embedded || (forward && rel.loose) {
                paths.push(link.clone());
            }
            let dependent = forward && rel.arity == Arity::OneToMany && !rel.loose;
            if dependent && !path.reaches(&rel.to) {
                queue.push_back(link.extend(Node::Entity(rel.to.clone())));
            }
        }
        paths.push(path);
    }

    if mode == DeleteMode::KeepRoot {
        paths.retain(|p| !p.is_root());
    }
    // Stable, so paths of equal length keep discovery order.
    paths.sort_by(|a, b| b.len().cmp(&a.len()));
    debug!(paths = paths.len(), "Planned delete");
    Ok(paths)
}

/// Table of a relationship's rows and the columns of its `(from, to)` links.
fn link_columns<'m>(meta: &'m Metadata, rel: &'m RelationshipMeta) -> Result<(&'m str, &'m str, &'m str), QueryError> {
    let table = meta.relation(&rel.relation).ok_or_else(|| unknown(&rel.relation))?;
    let from = rel.field(FIELD_FROM_LINK).ok_or_else(|| unknown(&rel.name))?;
    let to = rel.field(FIELD_TO_LINK).ok_or_else(|| unknown(&rel.name))?;
    Ok((&table.sql_name, &from.column, &to.column))
}

/// `column` restricted to the keys of the entity `prefix` ends at.
fn condition(meta: &Metadata, column: &str, prefix: &[Node]) -> Result<String, QueryError> {
    let column = quote_identifier(column);
    let Some((Node::Entity(_), before)) = prefix.split_last() else {
        return Err(QueryError::EmptyObjectList);
    };
    let Some((Node::Link { relationship, direction }, before)) = before.split_last() else {
        return Ok(format!("{column} = ?"));
    };
    let rel = meta.relationship(relationship).ok_or_else(|| unknown(relationship))?;
    let (table, from, to) = link_columns(meta, rel)?;
    let (near, far) = match direction {
        Direction::Forward => (to, from),
        Direction::Backward => (from, to),
    };
    Ok(format!(
        "{column} IN (SELECT {} FROM {} WHERE {})",
        quote_identifier(near),
        quote_identifier(table),
        condition(meta, far, before)?
    ))
}

/// What one path's statements do.
enum Action {
    Delete(String),
    Clear(String),
}

fn compile_path(meta: &Metadata, path: &DeletePath) -> Result<Vec<(Action, String)>, QueryError> {
    let nodes = path.nodes.as_slice();
    match nodes.split_last() {
        Some((Node::Entity(name), _)) => {
            let entity = meta.entity(name).ok_or_else(|| unknown(name))?;
            let filter = condition(meta, FIELD_ID, nodes)?;
            let mut statements = Vec::new();
            // Secondary relations first, the primary relation last.
            for relation in entity.relations.iter().rev() {
                let table = meta.relation(relation).ok_or_else(|| unknown(relation))?;
                statements.push((
                    Action::Delete(relation.clone()),
                    format!("DELETE FROM {} WHERE {filter}", quote_identifier(&table.sql_name)),
                ));
            }
            Ok(statements)
        }
        Some((Node::Link { relationship, direction }, before)) => {
            let rel = meta.relationship(relationship).ok_or_else(|| unknown(relationship))?;
            let (table, from, to) = link_columns(meta, rel)?;
            let far = match direction {
                Direction::Forward => from,
                Direction::Backward => to,
            };
            let filter = condition(meta, far, before)?;
            if !rel.embedded {
                return Ok(vec![(
                    Action::Delete(rel.name.clone()),
                    format!("DELETE FROM {} WHERE {filter}", quote_identifier(table)),
                )]);
            }
            Ok(vec![(
                Action::Clear(rel.name.clone()),
                format!(
                    "UPDATE {} SET {} WHERE {filter}",
                    quote_identifier(table),
                    rel.unlink_assignments()
                ),
            )])
        }
        None => Ok(Vec::new()),
    }
}

/// Delete the instance `id` of `entity` according to `mode`.
///
/// Statements run on the raw connection without retry and outside any
/// transaction; a failure aborts the delete part way.
#[instrument(skip(db, id), fields(id = %id))]
pub fn delete_entity(
    db: &ErDatabase,
    entity: &str,
    id: &Value,
    mode: DeleteMode,
) -> Result<DeleteStats, ErdbError> {
    let meta = db.metadata();
    let key = match meta.field(entity, FIELD_ID) {
        Some(field) => meta.field_type(field)?.encode(id)?,
        None => return Err(unknown(entity).into()),
    };
    let params = [key];

    let mut stats = DeleteStats::default();
    for path in plan_delete(meta, entity, mode)? {
        for (action, sql) in compile_path(meta, &path)? {
            debug!(path = %path, %sql, "Delete step");
            let rows = db.connection().execute(&sql, &params)?;
            match action {
                Action::Delete(object) => *stats.deleted.entry(object).or_default() += rows,
                Action::Clear(object) => *stats.cleared.entry(object).or_default() += rows,
            }
        }
    }
    info!(entity, deleted = stats.total(), "Deleted");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::sync::create_missing;
    use crate::test_utils::{genome_definition, genome_metadata, memory_db, memory_db_with};
    use rstest::{fixture, rstest};

    #[fixture]
    fn db() -> ErDatabase {
        let db = memory_db();
        create_missing(&db).unwrap();
        db
    }

    fn insert(db: &ErDatabase, object: &str, record: Record) -> Value {
        db.insert_object(object, &record).unwrap()
    }

    fn link(db: &ErDatabase, object: &str, from: impl Into<Value>, to: impl Into<Value>) {
        insert(db, object, Record::new().with("from-link", from).with("to-link", to));
    }

    fn annotate(db: &ErDatabase, feature: &str, annotation: &Value) {
        insert(
            db,
            "FeatureHasAnnotation",
            Record::new()
                .with("from-link", feature)
                .with("to-link", annotation.clone())
                .with("annotation-time", 1_700_000_000i64),
        );
    }

    /// Two genomes, each with features, drugs and annotations.
    fn populate(db: &ErDatabase) -> (Value, Value) {
        for g in ["g1", "g2"] {
            insert(
                db,
                "Genome",
                Record::new()
                    .with("id", g)
                    .with("genus", "Escherichia")
                    .with("species", "coli")
                    .with("alias", format!("{g}-alias")),
            );
        }
        for (f, g) in [("f1", "g1"), ("f2", "g1"), ("f3", "g2")] {
            insert(db, "Feature", Record::new().with("id", f).with("alias", format!("{f}-alias")));
            link(db, "GenomeHasFeature", g, f);
        }
        insert(db, "Subsystem", Record::new().with("id", "s1"));
        link(db, "SubsystemHasFeature", "s1", "f1");
        link(db, "SubsystemHasFeature", "s1", "f3");

        let drug = insert(db, "Drug", Record::new().with("name", "aspirin"));
        link(db, "Genome2Drug", "g1", drug.clone());
        link(db, "Genome2Drug", "g2", drug.clone());

        let a1 = insert(db, "Annotation", Record::new());
        let a2 = insert(db, "Annotation", Record::new());
        annotate(db, "f1", &a1);
        annotate(db, "f3", &a2);
        (a1, a2)
    }

    #[rstest]
    fn test_plan_orders_longest_first() {
        let meta = genome_metadata();
        let plan: Vec<String> = plan_delete(&meta, "Genome", DeleteMode::Full)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(plan.first().map(String::as_str), Some("Genome -> GenomeHasFeature -> Feature -> FeatureHasAnnotation -> Annotation"));
        assert_eq!(plan.last().map(String::as_str), Some("Genome"));

        let position = |p: &str| plan.iter().position(|x| x == p).unwrap();
        assert!(position("Genome -> GenomeHasFeature -> Feature") < position("Genome -> GenomeHasFeature"));
        assert!(plan.contains(&"Genome -> GenomeHasFeature -> Feature -> SubsystemHasFeature^".to_string()));
        assert!(plan.contains(&"Genome -> Genome2Drug".to_string()));
        // Many-to-many and backward traversals stop at the relationship.
        assert!(!plan.iter().any(|p| p.ends_with("-> Drug") || p.ends_with("-> Subsystem")));
    }

    #[rstest]
    fn test_plan_modes() {
        let meta = genome_metadata();
        let only = plan_delete(&meta, "Genome", DeleteMode::OnlyRoot).unwrap();
        assert_eq!(only.len(), 1);
        assert!(only[0].is_root());

        let keep = plan_delete(&meta, "Genome", DeleteMode::KeepRoot).unwrap();
        assert!(keep.iter().all(|p| !p.is_root()));
        assert_eq!(keep.len() + 1, plan_delete(&meta, "Genome", DeleteMode::Full).unwrap().len());
    }

    #[rstest]
    fn test_plan_from_dependent_does_not_backtrack() {
        let meta = genome_metadata();
        let plan: Vec<String> = plan_delete(&meta, "Feature", DeleteMode::Full)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert!(plan.contains(&"Feature -> GenomeHasFeature^".to_string()));
        assert!(!plan.iter().any(|p| p.contains("Genome ->") || p.ends_with("Genome")));
    }

    #[rstest]
    fn test_unknown_entity(db: ErDatabase) {
        assert!(matches!(
            delete_entity(&db, "Nope", &Value::from("x"), DeleteMode::Full),
            Err(ErdbError::Query(QueryError::UnknownObject { .. }))
        ));
    }

    #[rstest]
    fn test_full_delete_cascades(db: ErDatabase) {
        let (a1, a2) = populate(&db);
        let stats = delete_entity(&db, "Genome", &Value::from("g1"), DeleteMode::Full).unwrap();

        assert_eq!(stats.deleted("Genome"), 1);
        assert_eq!(stats.deleted("GenomeAlias"), 1);
        assert_eq!(stats.deleted("Feature"), 2);
        assert_eq!(stats.deleted("FeatureAlias"), 2);
        assert_eq!(stats.deleted("GenomeHasFeature"), 2);
        assert_eq!(stats.deleted("Genome2Drug"), 1);
        assert_eq!(stats.deleted("SubsystemHasFeature"), 1);
        assert_eq!(stats.deleted("Annotation"), 1);

        assert!(!db.exists("Genome", &Value::from("g1")).unwrap());
        assert!(!db.exists("Annotation", &a1).unwrap());
        // The other genome's graph is untouched.
        assert!(db.exists("Genome", &Value::from("g2")).unwrap());
        assert!(db.exists("Feature", &Value::from("f3")).unwrap());
        assert!(db.exists("Annotation", &a2).unwrap());
        assert!(db.exists("Subsystem", &Value::from("s1")).unwrap());
        assert_eq!(db.get_count("Drug", "", &[]).unwrap(), 1);
        assert_eq!(db.get_count("Genome2Drug", "", &[]).unwrap(), 1);
        assert_eq!(db.get_count("SubsystemHasFeature", "", &[]).unwrap(), 1);
    }

    #[rstest]
    #[case::only_root(DeleteMode::OnlyRoot, false, true)]
    #[case::keep_root(DeleteMode::KeepRoot, true, false)]
    fn test_root_modes(
        db: ErDatabase,
        #[case] mode: DeleteMode,
        #[case] genome_survives: bool,
        #[case] features_survive: bool,
    ) {
        populate(&db);
        delete_entity(&db, "Genome", &Value::from("g1"), mode).unwrap();
        assert_eq!(db.exists("Genome", &Value::from("g1")).unwrap(), genome_survives);
        assert_eq!(db.exists("Feature", &Value::from("f1")).unwrap(), features_survive);
    }

    #[rstest]
    fn test_loose_embedded_links_cleared() {
        let mut definition = genome_definition();
        for rel in &mut definition.relationships {
            if rel.name == "FeatureHasAnnotation" {
                rel.loose = true;
            }
        }
        let db = memory_db_with(&definition);
        create_missing(&db).unwrap();
        insert(&db, "Feature", Record::new().with("id", "f1"));
        let annotation = insert(&db, "Annotation", Record::new());
        annotate(&db, "f1", &annotation);

        let stats = delete_entity(&db, "Feature", &Value::from("f1"), DeleteMode::Full).unwrap();
        assert_eq!(stats.cleared.get("FeatureHasAnnotation"), Some(&1));
        assert!(db.exists("Annotation", &annotation).unwrap());
        assert_eq!(
            db.get_count("Annotation", "Annotation(feature-has-annotation-from-link) IS NULL", &[])
                .unwrap(),
            1
        );
    }
}
