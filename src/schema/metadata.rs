//! Compiled schema metadata.
//!
//! [`Metadata::compile`] turns a [`SchemaDefinition`] into the immutable store
//! every other component reads:
//!
//! - **entities** and **relationships** with their implicit fields injected
//!   (`id` on entities, `from-link`/`to-link` on relationships);
//! - the **relation table**: physical tables with their ordered fields and indexes;
//! - the **alias table** ([`Metadata::objects`]): every name usable in a query,
//!   including converse names, mapped to the relation holding its rows;
//! - the **converse table**, the **crossing table** and the **jump table**.
//!
//! Embedded relationships are folded into their target entity: the from-link and
//! intersection fields become imported fields of the target's primary relation,
//! named `{relationship-in-kebab-case}-{field}`, and the target's own `id` plays
//! the role of the to-link.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::crossing::{CrossingTable, JumpTable};
use super::definition::{Arity, IndexDef, IndexExtension, RelationshipDef, SchemaDefinition};
use super::types::{FieldType, TypeError, TypeKind, TypeRegistry};
use super::{column_name, is_valid_field_name, is_valid_object_name, kebab_case, snake_case, SchemaError};
use crate::db::escape::quote_identifier;
use crate::db::Value;

pub const FIELD_ID: &str = "id";
pub const FIELD_FROM_LINK: &str = "from-link";
pub const FIELD_TO_LINK: &str = "to-link";

/// Field names the engine injects itself.
pub const RESERVED_FIELDS: &[&str] = &[FIELD_ID, FIELD_FROM_LINK, FIELD_TO_LINK];

const PRIORITY_KEY: u8 = 0;
const PRIORITY_PRIMARY: u8 = 1;
const PRIORITY_SECONDARY: u8 = 2;

/// A field as seen by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    /// SQL column in `relation`.
    pub column: String,
    pub type_name: String,
    /// Logical name of the relation holding the field.
    pub relation: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Copied into an entity from an embedded relationship.
    #[serde(default)]
    pub imported: bool,
    /// `0` for keys and links, `1` for primary relation fields, `2` for secondary.
    pub priority: u8,
}

impl FieldMeta {
    fn new(name: &str, type_name: &str, relation: &str, priority: u8) -> Self {
        Self {
            name: name.to_string(),
            column: column_name(name),
            type_name: type_name.to_string(),
            relation: relation.to_string(),
            nullable: false,
            default: None,
            imported: false,
            priority,
        }
    }

    /// Stored outside the owning object's primary relation.
    pub fn is_secondary(&self) -> bool {
        self.priority == PRIORITY_SECONDARY
    }
}

/// One key column of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexField {
    pub field: String,
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub sql_name: String,
    pub unique: bool,
    pub fields: Vec<IndexField>,
}

/// A physical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationMeta {
    pub name: String,
    pub sql_name: String,
    /// Entity or relationship that owns the relation.
    pub owner: String,
    pub fields: Vec<FieldMeta>,
    pub indexes: Vec<IndexMeta>,
}

impl RelationMeta {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.column.as_str()).collect()
    }

    pub fn has_id(&self) -> bool {
        self.field(FIELD_ID).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub name: String,
    pub key_type: String,
    pub autocounter: bool,
    /// `id` first, then primary relation fields, then secondary fields.
    pub fields: Vec<FieldMeta>,
    /// Primary relation first.
    pub relations: Vec<String>,
}

impl EntityMeta {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_relation(&self) -> &str {
        &self.name
    }

    pub fn secondary_relations(&self) -> impl Iterator<Item = &str> {
        self.relations.iter().skip(1).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMeta {
    pub name: String,
    pub converse: String,
    pub from: String,
    pub to: String,
    pub arity: Arity,
    pub embedded: bool,
    pub loose: bool,
    /// Own relation, or the target entity's primary relation when embedded.
    pub relation: String,
    /// `from-link`, `to-link` and intersection fields.
    pub fields: Vec<FieldMeta>,
    /// The same fields with `from-link` and `to-link` exchanged.
    pub converse_fields: Vec<FieldMeta>,
}

impl RelationshipMeta {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// `SET` list that unlinks an embedded dependent: the from-link and
    /// every intersection column become NULL, the dependent's key is kept.
    pub fn unlink_assignments(&self) -> String {
        self.fields
            .iter()
            .filter(|f| f.name != FIELD_TO_LINK)
            .map(|f| format!("{} = NULL", quote_identifier(&f.column)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Entity,
    Relationship,
    Converse,
}

/// An entry of the alias table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub kind: ObjectKind,
    /// Entity or relationship that defines the object.
    pub base: String,
    /// Relation holding the object's rows.
    pub relation: String,
    pub embedded: bool,
}

/// Direction a relationship is traversed from an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From the relationship's source to its target.
    Forward,
    /// From the target back to the source.
    Backward,
}

fn default_registry() -> Arc<TypeRegistry> {
    Arc::new(TypeRegistry::standard())
}

/// The compiled schema. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub entities: BTreeMap<String, EntityMeta>,
    pub relationships: BTreeMap<String, RelationshipMeta>,
    pub relations: BTreeMap<String, RelationMeta>,
    pub objects: BTreeMap<String, ObjectMeta>,
    pub converses: BTreeMap<String, String>,
    pub crossing: CrossingTable,
    pub jumps: JumpTable,
    #[serde(skip, default = "default_registry")]
    registry: Arc<TypeRegistry>,
}

struct IndexSpec {
    field: String,
    descending: bool,
}

fn parse_index_fields(fields: &[String]) -> Vec<IndexSpec> {
    fields
        .iter()
        .map(|spec| {
            let mut parts = spec.split_whitespace();
            let field = parts.next().unwrap_or_default().to_string();
            let descending = parts.next().is_some_and(|d| d.eq_ignore_ascii_case("DESC"));
            IndexSpec { field, descending }
        })
        .collect()
}

fn check_field_name(object: &str, field: &str) -> Result<(), SchemaError> {
    if RESERVED_FIELDS.contains(&field) {
        return Err(SchemaError::ReservedFieldName {
            object: object.to_string(),
            field: field.to_string(),
        });
    }
    if !is_valid_field_name(field) {
        return Err(SchemaError::InvalidFieldName {
            object: object.to_string(),
            field: field.to_string(),
        });
    }
    Ok(())
}

impl Metadata {
    /// Compile a schema definition against a type registry.
    #[instrument(skip_all)]
    pub fn compile(
        definition: &SchemaDefinition,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self, SchemaError> {
        let mut meta = Metadata {
            entities: BTreeMap::new(),
            relationships: BTreeMap::new(),
            relations: BTreeMap::new(),
            objects: BTreeMap::new(),
            converses: BTreeMap::new(),
            crossing: CrossingTable::default(),
            jumps: JumpTable::default(),
            registry,
        };

        let mut names = BTreeSet::new();
        let mut claim = |name: &str| {
            if !is_valid_object_name(name) {
                return Err(SchemaError::InvalidObjectName {
                    name: name.to_string(),
                });
            }
            if !names.insert(name.to_string()) {
                return Err(SchemaError::DuplicateName {
                    name: name.to_string(),
                });
            }
            Ok(())
        };
        for entity in &definition.entities {
            claim(&entity.name)?;
        }
        for rel in &definition.relationships {
            claim(&rel.name)?;
            claim(&rel.converse)?;
        }

        for entity in &definition.entities {
            meta.add_entity(entity)?;
        }
        for rel in &definition.relationships {
            meta.add_relationship(rel)?;
        }

        for entity in meta.entities.values_mut() {
            entity.fields.sort_by_key(|f| f.priority);
        }

        // Secondary relation names share the object namespace.
        for entity in &definition.entities {
            meta.build_entity_relations(&entity.name, &mut claim)?;
            meta.add_entity_indexes(&entity.name, &entity.indexes)?;
        }
        for rel in &definition.relationships {
            meta.build_relationship_relation(rel)?;
        }

        let relationships: Vec<RelationshipMeta> = meta.relationships.values().cloned().collect();
        for rel in &relationships {
            meta.crossing.add_relationship(rel);
        }
        meta.jumps = JumpTable::build(&relationships);

        debug!(
            entities = meta.entities.len(),
            relationships = meta.relationships.len(),
            relations = meta.relations.len(),
            crossings = meta.crossing.len(),
            jumps = meta.jumps.len(),
            "Compiled schema metadata"
        );
        Ok(meta)
    }

    fn resolve_type(&self, name: &str) -> Result<&TypeKind, SchemaError> {
        Ok(self.registry.resolve(name)?)
    }

    fn add_entity(&mut self, def: &super::EntityDef) -> Result<(), SchemaError> {
        let key = self.resolve_type(&def.key_type)?;
        if def.autocounter && !key.is_integer() {
            return Err(SchemaError::AutocounterKey {
                entity: def.name.clone(),
                key_type: def.key_type.clone(),
            });
        }

        let mut fields = vec![FieldMeta::new(FIELD_ID, &def.key_type, &def.name, PRIORITY_KEY)];
        for field in &def.fields {
            check_field_name(&def.name, &field.name)?;
            if fields.iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField {
                    object: def.name.clone(),
                    field: field.name.clone(),
                });
            }
            self.resolve_type(&field.field_type)?;
            let relation = field.relation.clone().unwrap_or_else(|| def.name.clone());
            let priority = if relation == def.name {
                PRIORITY_PRIMARY
            } else {
                PRIORITY_SECONDARY
            };
            fields.push(FieldMeta {
                nullable: field.nullable,
                default: field.default.clone(),
                ..FieldMeta::new(&field.name, &field.field_type, &relation, priority)
            });
        }

        self.entities.insert(
            def.name.clone(),
            EntityMeta {
                name: def.name.clone(),
                key_type: def.key_type.clone(),
                autocounter: def.autocounter,
                fields,
                relations: Vec::new(),
            },
        );
        self.objects.insert(
            def.name.clone(),
            ObjectMeta {
                name: def.name.clone(),
                kind: ObjectKind::Entity,
                base: def.name.clone(),
                relation: def.name.clone(),
                embedded: false,
            },
        );
        Ok(())
    }

    fn key_type_of(&self, relationship: &str, entity: &str) -> Result<String, SchemaError> {
        self.entities
            .get(entity)
            .map(|e| e.key_type.clone())
            .ok_or_else(|| SchemaError::UnknownEntity {
                relationship: relationship.to_string(),
                entity: entity.to_string(),
            })
    }

    fn add_relationship(&mut self, def: &RelationshipDef) -> Result<(), SchemaError> {
        let from_key = self.key_type_of(&def.name, &def.from)?;
        let to_key = self.key_type_of(&def.name, &def.to)?;
        if def.embedded && def.arity == Arity::ManyToMany {
            return Err(SchemaError::EmbeddedManyToMany {
                relationship: def.name.clone(),
            });
        }

        let mut seen = BTreeSet::new();
        for field in &def.fields {
            check_field_name(&def.name, &field.name)?;
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    object: def.name.clone(),
                    field: field.name.clone(),
                });
            }
            if field.relation.as_ref().is_some_and(|r| r != &def.name) {
                return Err(SchemaError::RelationshipFieldRelation {
                    relationship: def.name.clone(),
                });
            }
            self.resolve_type(&field.field_type)?;
        }

        let fields = if def.embedded {
            self.import_embedded(def, &from_key, &to_key)?
        } else {
            let mut fields = vec![
                FieldMeta::new(FIELD_FROM_LINK, &from_key, &def.name, PRIORITY_KEY),
                FieldMeta::new(FIELD_TO_LINK, &to_key, &def.name, PRIORITY_KEY),
            ];
            fields.extend(def.fields.iter().map(|f| FieldMeta {
                nullable: f.nullable,
                default: f.default.clone(),
                ..FieldMeta::new(&f.name, &f.field_type, &def.name, PRIORITY_PRIMARY)
            }));
            fields
        };

        let converse_fields = fields
            .iter()
            .map(|f| {
                let name = match f.name.as_str() {
                    FIELD_FROM_LINK => FIELD_TO_LINK,
                    FIELD_TO_LINK => FIELD_FROM_LINK,
                    other => other,
                };
                FieldMeta {
                    name: name.to_string(),
                    ..f.clone()
                }
            })
            .collect();

        let relation = if def.embedded {
            def.to.clone()
        } else {
            def.name.clone()
        };
        for (name, kind) in [
            (&def.name, ObjectKind::Relationship),
            (&def.converse, ObjectKind::Converse),
        ] {
            self.objects.insert(
                name.clone(),
                ObjectMeta {
                    name: name.clone(),
                    kind,
                    base: def.name.clone(),
                    relation: relation.clone(),
                    embedded: def.embedded,
                },
            );
        }
        self.converses.insert(def.name.clone(), def.converse.clone());
        self.converses.insert(def.converse.clone(), def.name.clone());

        self.relationships.insert(
            def.name.clone(),
            RelationshipMeta {
                name: def.name.clone(),
                converse: def.converse.clone(),
                from: def.from.clone(),
                to: def.to.clone(),
                arity: def.arity,
                embedded: def.embedded,
                loose: def.loose,
                relation,
                fields,
                converse_fields,
            },
        );
        Ok(())
    }

    /// Copy an embedded relationship's from-link and intersection fields into
    /// the target entity and return the relationship's view of them.
    fn import_embedded(
        &mut self,
        def: &RelationshipDef,
        from_key: &str,
        to_key: &str,
    ) -> Result<Vec<FieldMeta>, SchemaError> {
        let prefix = kebab_case(&def.name);
        let target = def.to.as_str();

        let imported_link = FieldMeta {
            nullable: true,
            imported: true,
            ..FieldMeta::new(
                &format!("{}-{}", prefix, FIELD_FROM_LINK),
                from_key,
                target,
                PRIORITY_PRIMARY,
            )
        };
        let mut imported = vec![imported_link.clone()];
        let mut view = vec![
            FieldMeta {
                name: FIELD_FROM_LINK.to_string(),
                priority: PRIORITY_KEY,
                imported: false,
                ..imported_link
            },
            FieldMeta::new(FIELD_ID, to_key, target, PRIORITY_KEY),
        ];
        view[1].name = FIELD_TO_LINK.to_string();

        for field in &def.fields {
            let local = FieldMeta {
                nullable: true,
                imported: true,
                default: field.default.clone(),
                ..FieldMeta::new(
                    &format!("{}-{}", prefix, field.name),
                    &field.field_type,
                    target,
                    PRIORITY_PRIMARY,
                )
            };
            view.push(FieldMeta {
                name: field.name.clone(),
                nullable: field.nullable,
                imported: false,
                ..local.clone()
            });
            imported.push(local);
        }

        let entity = self
            .entities
            .get_mut(target)
            .ok_or_else(|| SchemaError::UnknownEntity {
                relationship: def.name.clone(),
                entity: target.to_string(),
            })?;
        for field in imported {
            if entity.field(&field.name).is_some() {
                return Err(SchemaError::DuplicateField {
                    object: target.to_string(),
                    field: field.name,
                });
            }
            entity.fields.push(field);
        }
        Ok(view)
    }

    fn build_entity_relations(
        &mut self,
        entity_name: &str,
        claim: &mut impl FnMut(&str) -> Result<(), SchemaError>,
    ) -> Result<(), SchemaError> {
        let Some(entity) = self.entities.get(entity_name).cloned() else {
            return Ok(());
        };
        let id = entity.fields[0].clone();

        let mut order: Vec<String> = vec![entity.name.clone()];
        let mut grouped: BTreeMap<String, Vec<FieldMeta>> = BTreeMap::new();
        for field in &entity.fields {
            if !order.contains(&field.relation) {
                order.push(field.relation.clone());
            }
            grouped.entry(field.relation.clone()).or_default().push(field.clone());
        }

        for name in &order {
            let primary = name == &entity.name;
            if !primary {
                claim(name)?;
            }
            let mut fields = grouped.remove(name).unwrap_or_default();
            if !primary {
                fields.insert(0, FieldMeta { relation: name.clone(), ..id.clone() });
            }
            let sql_name = snake_case(name);
            let (index_name, unique) = if primary { ("pkey", true) } else { ("id", false) };
            let key_index = IndexMeta {
                name: index_name.to_string(),
                sql_name: format!("{}_{}", sql_name, index_name),
                unique,
                fields: vec![IndexField {
                    field: FIELD_ID.to_string(),
                    column: column_name(FIELD_ID),
                    descending: false,
                }],
            };
            self.relations.insert(
                name.clone(),
                RelationMeta {
                    name: name.clone(),
                    sql_name,
                    owner: entity.name.clone(),
                    fields,
                    indexes: vec![key_index],
                },
            );
        }

        if let Some(entity) = self.entities.get_mut(entity_name) {
            entity.relations = order;
        }
        Ok(())
    }

    /// Build an index over `fields`, all of which must be in `candidates`.
    /// Returns the relation the index belongs to.
    fn resolve_index(
        &self,
        object: &str,
        index: &str,
        unique: bool,
        specs: &[IndexSpec],
        candidates: &[FieldMeta],
        default_relation: &str,
    ) -> Result<(String, IndexMeta), SchemaError> {
        let mut relation: Option<&str> = None;
        let mut fields = Vec::with_capacity(specs.len());
        for spec in specs {
            let field = candidates
                .iter()
                .find(|f| f.name == spec.field)
                .ok_or_else(|| SchemaError::UnknownIndexField {
                    object: object.to_string(),
                    index: index.to_string(),
                    field: spec.field.clone(),
                })?;
            if self.resolve_type(&field.type_name)?.index_mod().is_none() {
                return Err(SchemaError::NotIndexable {
                    object: object.to_string(),
                    index: index.to_string(),
                    field: spec.field.clone(),
                });
            }
            // `id` is present in every relation of an entity.
            if field.name != FIELD_ID || field.relation != default_relation {
                match relation {
                    Some(r) if r != field.relation => {
                        return Err(SchemaError::IndexSpansRelations {
                            object: object.to_string(),
                            index: index.to_string(),
                        });
                    }
                    _ => relation = Some(&field.relation),
                }
            }
            fields.push(IndexField {
                field: field.name.clone(),
                column: field.column.clone(),
                descending: spec.descending,
            });
        }
        let relation = relation.unwrap_or(default_relation).to_string();
        let sql_name = format!("{}_{}", snake_case(&relation), snake_case(index));
        Ok((
            relation,
            IndexMeta {
                name: index.to_string(),
                sql_name,
                unique,
                fields,
            },
        ))
    }

    fn attach_index(&mut self, relation: &str, index: IndexMeta) -> Result<(), SchemaError> {
        let Some(target) = self.relations.get_mut(relation) else {
            return Ok(());
        };
        if target.indexes.iter().any(|i| i.sql_name == index.sql_name) {
            return Err(SchemaError::DuplicateName { name: index.name });
        }
        target.indexes.push(index);
        Ok(())
    }

    fn add_entity_indexes(&mut self, entity_name: &str, indexes: &[IndexDef]) -> Result<(), SchemaError> {
        let Some(entity) = self.entities.get(entity_name) else {
            return Ok(());
        };
        let candidates = entity.fields.clone();
        for def in indexes {
            let (relation, index) = self.resolve_index(
                entity_name,
                &def.name,
                def.unique,
                &parse_index_fields(&def.fields),
                &candidates,
                entity_name,
            )?;
            self.attach_index(&relation, index)?;
        }
        Ok(())
    }

    fn link_index(
        &self,
        rel: &RelationshipDef,
        name: &str,
        link: &str,
        extension: Option<&IndexExtension>,
        view: &[FieldMeta],
        relation: &str,
    ) -> Result<(String, IndexMeta), SchemaError> {
        let mut fields = vec![link.to_string()];
        let mut unique = false;
        if let Some(ext) = extension {
            fields.extend(ext.fields.iter().cloned());
            unique = ext.unique;
        }
        self.resolve_index(
            &rel.name,
            name,
            unique,
            &parse_index_fields(&fields),
            view,
            relation,
        )
    }

    fn build_relationship_relation(&mut self, def: &RelationshipDef) -> Result<(), SchemaError> {
        let Some(rel) = self.relationships.get(&def.name).cloned() else {
            return Ok(());
        };

        if rel.embedded {
            let name = format!("idx{}From", rel.name);
            let (relation, index) = self.link_index(
                def,
                &name,
                FIELD_FROM_LINK,
                def.from_index.as_ref(),
                &rel.fields,
                &rel.relation,
            )?;
            self.attach_index(&relation, index)?;
        } else {
            self.relations.insert(
                rel.name.clone(),
                RelationMeta {
                    name: rel.name.clone(),
                    sql_name: snake_case(&rel.name),
                    owner: rel.name.clone(),
                    fields: rel.fields.clone(),
                    indexes: Vec::new(),
                },
            );
            for (name, link, ext) in [
                ("idxFrom", FIELD_FROM_LINK, def.from_index.as_ref()),
                ("idxTo", FIELD_TO_LINK, def.to_index.as_ref()),
            ] {
                let (relation, index) =
                    self.link_index(def, name, link, ext, &rel.fields, &rel.relation)?;
                self.attach_index(&relation, index)?;
            }
        }

        for index in &def.indexes {
            let (relation, meta) = self.resolve_index(
                &rel.name,
                &index.name,
                index.unique,
                &parse_index_fields(&index.fields),
                &rel.fields,
                &rel.relation,
            )?;
            self.attach_index(&relation, meta)?;
        }
        Ok(())
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.registry)
    }

    /// Attach the registry after deserializing a cached copy.
    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn object(&self, name: &str) -> Option<&ObjectMeta> {
        self.objects.get(name)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityMeta> {
        self.entities.get(name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipMeta> {
        self.relationships.get(name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationMeta> {
        self.relations.get(name)
    }

    pub fn converse_of(&self, name: &str) -> Option<&str> {
        self.converses.get(name).map(String::as_str)
    }

    /// Fields addressable through an object name, converse names included.
    pub fn fields_of(&self, object: &str) -> &[FieldMeta] {
        let Some(meta) = self.objects.get(object) else {
            return &[];
        };
        match meta.kind {
            ObjectKind::Entity => self
                .entities
                .get(&meta.base)
                .map(|e| e.fields.as_slice())
                .unwrap_or_default(),
            ObjectKind::Relationship => self
                .relationships
                .get(&meta.base)
                .map(|r| r.fields.as_slice())
                .unwrap_or_default(),
            ObjectKind::Converse => self
                .relationships
                .get(&meta.base)
                .map(|r| r.converse_fields.as_slice())
                .unwrap_or_default(),
        }
    }

    pub fn field(&self, object: &str, field: &str) -> Option<&FieldMeta> {
        self.fields_of(object).iter().find(|f| f.name == field)
    }

    pub fn field_type(&self, field: &FieldMeta) -> Result<&TypeKind, TypeError> {
        self.registry.resolve(&field.type_name)
    }

    /// Relationships touching `entity`, with the direction they leave it in.
    /// A recursive relationship appears once in each direction.
    pub fn relationships_of(&self, entity: &str) -> Vec<(&RelationshipMeta, Direction)> {
        let mut result = Vec::new();
        for rel in self.relationships.values() {
            if rel.from == entity {
                result.push((rel, Direction::Forward));
            }
            if rel.to == entity {
                result.push((rel, Direction::Backward));
            }
        }
        result
    }

    pub fn autocounter_entities(&self) -> impl Iterator<Item = &EntityMeta> {
        self.entities.values().filter(|e| e.autocounter)
    }

    /// Serialize for the persisted metadata cache.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        serde_json::to_string(self).map_err(|e| SchemaError::Parse {
            message: e.to_string(),
        })
    }

    /// Restore a cached copy, checking that every field type is still registered.
    pub fn from_json(json: &str, registry: Arc<TypeRegistry>) -> Result<Self, SchemaError> {
        let meta: Metadata = serde_json::from_str(json).map_err(|e| SchemaError::Parse {
            message: e.to_string(),
        })?;
        let meta = meta.with_registry(registry);
        for relation in meta.relations.values() {
            for field in &relation.fields {
                meta.resolve_type(&field.type_name)?;
            }
        }
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CrossingEntry, EntityDef, FieldDef};
    use crate::test_utils::{genome_definition, genome_metadata};
    use rstest::rstest;

    #[rstest]
    fn test_every_entity_relation_has_id() {
        let meta = genome_metadata();
        for entity in meta.entities.values() {
            for relation in &entity.relations {
                let rel = meta.relation(relation).unwrap();
                assert_eq!(rel.fields[0].name, "id", "{}", relation);
                assert_eq!(rel.fields[0].type_name, entity.key_type);
            }
        }
    }

    #[rstest]
    fn test_relationship_links_typed_from_endpoints() {
        let meta = genome_metadata();
        let rel = meta.relation("Genome2Drug").unwrap();
        let names: Vec<_> = rel.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["from-link", "to-link", "effect"]);
        assert_eq!(rel.field("from-link").unwrap().type_name, "string");
        assert_eq!(rel.field("to-link").unwrap().type_name, "int");
        assert_eq!(rel.sql_name, "genome2_drug");
    }

    #[rstest]
    fn test_secondary_fields_get_own_relation() {
        let meta = genome_metadata();
        let genome = meta.entity("Genome").unwrap();
        assert_eq!(genome.relations, vec!["Genome", "GenomeAlias"]);
        let alias = genome.field("alias").unwrap();
        assert!(alias.is_secondary());
        assert_eq!(alias.relation, "GenomeAlias");

        let relation = meta.relation("GenomeAlias").unwrap();
        assert_eq!(relation.columns(), vec!["id", "alias"]);
        assert_eq!(relation.indexes[0].sql_name, "genome_alias_id");
        assert!(!relation.indexes[0].unique);
        assert!(meta.relation("Genome").unwrap().field("alias").is_none());
    }

    #[rstest]
    fn test_embedded_relationship_imports_fields() {
        let meta = genome_metadata();
        let annotation = meta.relation("Annotation").unwrap();
        let link = annotation.field("feature-has-annotation-from-link").unwrap();
        assert!(link.imported);
        assert!(link.nullable);
        assert_eq!(link.column, "feature_has_annotation_from_link");
        assert!(annotation.field("feature-has-annotation-annotation-time").is_some());
        assert!(meta.relation("FeatureHasAnnotation").is_none());

        let index = annotation
            .indexes
            .iter()
            .find(|i| i.name == "idxFeatureHasAnnotationFrom")
            .unwrap();
        let columns: Vec<_> = index.fields.iter().map(|f| f.column.as_str()).collect();
        assert_eq!(
            columns,
            vec!["feature_has_annotation_from_link", "feature_has_annotation_annotation_time"]
        );
        assert!(index.fields[1].descending);

        let rel = meta.relationship("FeatureHasAnnotation").unwrap();
        assert_eq!(rel.relation, "Annotation");
        assert_eq!(rel.field("to-link").unwrap().column, "id");
        assert!(!rel.field("annotation-time").unwrap().nullable);
        assert!(annotation.field("feature-has-annotation-annotation-time").unwrap().nullable);
        assert_eq!(
            meta.field("AnnotationForFeature", "to-link").unwrap().column,
            "feature_has_annotation_from_link"
        );
    }

    #[rstest]
    fn test_alias_and_converse_tables() {
        let meta = genome_metadata();
        let converse = meta.object("FeatureInGenome").unwrap();
        assert_eq!(converse.kind, ObjectKind::Converse);
        assert_eq!(converse.relation, "GenomeHasFeature");
        assert_eq!(meta.converse_of("FeatureInGenome"), Some("GenomeHasFeature"));
        assert_eq!(meta.converse_of("GenomeHasFeature"), Some("FeatureInGenome"));
        assert_eq!(
            meta.field("FeatureInGenome", "from-link").unwrap().column,
            "to_link"
        );
    }

    #[rstest]
    fn test_relationship_link_indexes() {
        let meta = genome_metadata();
        let relation = meta.relation("Genome2Drug").unwrap();
        let names: Vec<_> = relation.indexes.iter().map(|i| i.sql_name.as_str()).collect();
        assert_eq!(names, vec!["genome2_drug_idx_from", "genome2_drug_idx_to"]);
        assert_eq!(relation.indexes[1].fields.len(), 2);
    }

    #[rstest]
    fn test_crossing_and_jumps_compiled() {
        let meta = genome_metadata();
        assert_eq!(
            meta.crossing.get("Genome", "GenomeHasFeature"),
            Some(&CrossingEntry::Join {
                source: "id".into(),
                target: "from-link".into()
            })
        );
        assert_eq!(meta.jumps.get("Genome", "Feature"), Some("GenomeHasFeature"));
        assert_eq!(meta.jumps.get("Annotation", "Feature"), Some("AnnotationForFeature"));
        assert_eq!(meta.jumps.get("Genome", "Annotation"), None);
    }

    #[rstest]
    fn test_second_path_removes_jump() {
        let mut def = genome_definition();
        let mut second = def.relationships[0].clone();
        second.name = "GenomeReferencesFeature".into();
        second.converse = "FeatureReferencedByGenome".into();
        def.relationships.push(second);
        let meta = Metadata::compile(&def, Arc::new(TypeRegistry::standard())).unwrap();
        assert_eq!(meta.jumps.get("Genome", "Feature"), None);
        assert_eq!(meta.jumps.get("Genome", "Drug"), Some("Genome2Drug"));
    }

    fn compile_err(def: &SchemaDefinition) -> SchemaError {
        Metadata::compile(def, Arc::new(TypeRegistry::standard())).unwrap_err()
    }

    #[rstest]
    fn test_reserved_field_rejected() {
        let mut def = genome_definition();
        def.entities[0].fields.push(FieldDef::new("from-link", "string"));
        assert!(matches!(compile_err(&def), SchemaError::ReservedFieldName { .. }));
    }

    #[rstest]
    fn test_malformed_names_rejected() {
        let mut def = genome_definition();
        def.entities[0].fields.push(FieldDef::new("Bad_Name", "string"));
        assert!(matches!(compile_err(&def), SchemaError::InvalidFieldName { .. }));

        let mut def = genome_definition();
        def.entities[0].name = "Genome7".into();
        assert!(matches!(compile_err(&def), SchemaError::InvalidObjectName { .. }));
    }

    #[rstest]
    fn test_index_spanning_relations_rejected() {
        let mut def = genome_definition();
        def.entities[0].indexes.push(IndexDef {
            name: "idxMixed".into(),
            unique: false,
            fields: vec!["genus".into(), "alias".into()],
        });
        assert_eq!(
            compile_err(&def),
            SchemaError::IndexSpansRelations {
                object: "Genome".into(),
                index: "idxMixed".into()
            }
        );
    }

    #[rstest]
    fn test_unknown_entity_and_type_rejected() {
        let mut def = genome_definition();
        def.relationships[0].to = "Protein".into();
        assert!(matches!(compile_err(&def), SchemaError::UnknownEntity { .. }));

        let mut def = genome_definition();
        def.entities[0].fields.push(FieldDef::new("rank", "decimal"));
        assert!(matches!(compile_err(&def), SchemaError::Type(TypeError::UnknownType { .. })));
    }

    #[rstest]
    fn test_embedded_many_to_many_rejected() {
        let mut def = genome_definition();
        let rel = def.relationships.iter_mut().find(|r| r.name == "Genome2Drug").unwrap();
        rel.embedded = true;
        assert!(matches!(compile_err(&def), SchemaError::EmbeddedManyToMany { .. }));
    }

    #[rstest]
    fn test_autocounter_needs_integer_key() {
        let def = SchemaDefinition {
            entities: vec![EntityDef {
                name: "Tag".into(),
                key_type: "string".into(),
                autocounter: true,
                fields: vec![],
                indexes: vec![],
            }],
            relationships: vec![],
        };
        assert!(matches!(compile_err(&def), SchemaError::AutocounterKey { .. }));
    }

    #[rstest]
    fn test_non_indexable_field_rejected() {
        let mut def = genome_definition();
        def.entities[0].fields.push(FieldDef::new("picture", "image"));
        def.entities[0].indexes.push(IndexDef {
            name: "idxPicture".into(),
            unique: false,
            fields: vec!["picture".into()],
        });
        assert!(matches!(compile_err(&def), SchemaError::NotIndexable { .. }));
    }

    #[rstest]
    fn test_cache_round_trip() {
        let meta = genome_metadata();
        let json = meta.to_json().unwrap();
        let restored = Metadata::from_json(&json, meta.shared_registry()).unwrap();
        assert_eq!(restored.relations, meta.relations);
        assert_eq!(restored.crossing, meta.crossing);
        assert_eq!(restored.jumps, meta.jumps);
    }

    #[rstest]
    fn test_relationships_of_directions() {
        let meta = genome_metadata();
        let feature: Vec<_> = meta
            .relationships_of("Feature")
            .into_iter()
            .map(|(r, d)| (r.name.as_str(), d))
            .collect();
        assert!(feature.contains(&("FeatureHasAnnotation", Direction::Forward)));
        assert!(feature.contains(&("GenomeHasFeature", Direction::Backward)));
        assert!(feature.contains(&("SubsystemHasFeature", Direction::Backward)));
    }
}
