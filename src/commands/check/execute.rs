use serde::Serialize;

use super::CheckCmd;
use crate::schema::{Arity, Metadata};

#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
    pub name: String,
    pub key_type: String,
    pub autocounter: bool,
    pub fields: usize,
    pub relations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipSummary {
    pub name: String,
    pub converse: String,
    pub from: String,
    pub to: String,
    pub arity: Arity,
    pub embedded: bool,
    pub loose: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Jump {
    pub from: String,
    pub to: String,
    pub via: String,
}

/// Result of the check command
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSummary {
    pub entities: Vec<EntitySummary>,
    pub relationships: Vec<RelationshipSummary>,
    pub tables: usize,
    pub crossings: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jumps: Vec<Jump>,
}

impl CheckCmd {
    pub fn inspect(self, meta: &Metadata) -> SchemaSummary {
        let entities = meta
            .entities
            .values()
            .map(|e| EntitySummary {
                name: e.name.clone(),
                key_type: e.key_type.clone(),
                autocounter: e.autocounter,
                fields: e.fields.len(),
                relations: e.relations.clone(),
            })
            .collect();
        let relationships = meta
            .relationships
            .values()
            .map(|r| RelationshipSummary {
                name: r.name.clone(),
                converse: r.converse.clone(),
                from: r.from.clone(),
                to: r.to.clone(),
                arity: r.arity,
                embedded: r.embedded,
                loose: r.loose,
            })
            .collect();
        let jumps = if self.jumps {
            meta.jumps
                .iter()
                .map(|(from, to, via)| Jump {
                    from: from.to_string(),
                    to: to.to_string(),
                    via: via.to_string(),
                })
                .collect()
        } else {
            Vec::new()
        };
        SchemaSummary {
            entities,
            relationships,
            tables: meta.relations.len(),
            crossings: meta.crossing.len(),
            jumps,
        }
    }
}
