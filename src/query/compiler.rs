//! Object-name-list and filter compilation.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use super::filter::{parse_field_ref, parse_filter, FilterPart, NameResolver};
use super::object_list::{ObjectList, ObjectToken, Token};
use super::QueryError;
use crate::db::escape::{count_placeholders, for_each_outside_literals, quote_identifier};
use crate::schema::{CrossingEntry, FieldMeta, Metadata, FIELD_ID};

/// Where a selected field is found in a result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMap {
    /// Selected directly at `index`.
    Primary { index: usize, type_name: String },
    /// Multi-valued: fetched separately from `relation_sql` by the owning
    /// object's id, which is selected at `id_index`.
    Secondary {
        id_index: usize,
        relation: String,
        relation_sql: String,
        column: String,
        type_name: String,
    },
}

/// The output of [`QueryCompiler::compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    /// Object names as given by the caller, in order, without repeats.
    pub objects: Vec<String>,
    /// Token name to SQL alias, inserted jump tokens included.
    pub aliases: BTreeMap<String, String>,
    pub from_clause: String,
    /// Join predicates and the filter condition, without the `WHERE` keyword.
    pub where_clause: String,
    /// `WHERE ...`, `ORDER BY ...` and `LIMIT ...` as they follow the FROM list.
    pub filter_clause: String,
    pub select_list: Vec<String>,
    /// `Object(field)` to its place in the result.
    pub columns: Vec<(String, ColumnMap)>,
    pub param_count: usize,
    /// For each placeholder, the type of the field it is directly compared
    /// with. Such parameters are bound in that type's stored form.
    pub param_types: Vec<Option<String>>,
}

impl CompiledQuery {
    pub fn select_sql(&self) -> String {
        let sql = format!("SELECT {} FROM {}", self.select_list.join(", "), self.from_clause);
        if self.filter_clause.is_empty() {
            sql
        } else {
            format!("{} {}", sql, self.filter_clause)
        }
    }

    pub fn count_sql(&self) -> String {
        let inner = format!("SELECT 1 FROM {}", self.from_clause);
        let inner = if self.filter_clause.is_empty() {
            inner
        } else {
            format!("{} {}", inner, self.filter_clause)
        };
        format!("SELECT COUNT(*) FROM ({}) counted", inner)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMap> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }
}

/// Compiles queries against one set of metadata.
pub struct QueryCompiler<'a> {
    meta: &'a Metadata,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(meta: &'a Metadata) -> Self {
        Self { meta }
    }

    /// Compile an object-name-list and filter clause.
    ///
    /// `fields` lists `Object(field)` names to select; when `None`, every
    /// non-imported field of every named object is selected.
    #[instrument(skip(self, fields))]
    pub fn compile(
        &self,
        objects: &str,
        filter: &str,
        fields: Option<&[&str]>,
    ) -> Result<CompiledQuery, QueryError> {
        let list = ObjectList::parse(objects)?;
        self.compile_list(&list, filter, fields)
    }

    pub fn compile_list(
        &self,
        list: &ObjectList,
        filter: &str,
        fields: Option<&[&str]>,
    ) -> Result<CompiledQuery, QueryError> {
        let list = list.expand_jumps(self.meta);
        let mut state = State::new(self.meta);
        state.walk(&list)?;

        let first = list.first().ok_or(QueryError::EmptyObjectList)?.name();
        let resolver = Resolver {
            meta: self.meta,
            first_base: state.bases.get(&first).cloned().unwrap_or_default(),
        };
        let parsed = parse_filter(filter, &resolver)?;

        let condition = state.render(&parsed.condition, &first, true)?;
        let order_by = match &parsed.order_by {
            Some(parts) => Some(state.render(parts, &first, false)?),
            None => None,
        };

        let mut where_clause = state.joins.join(" AND ");
        if !condition.is_empty() {
            where_clause = if where_clause.is_empty() {
                condition
            } else {
                format!("{} AND ({})", where_clause, condition)
            };
        }

        let mut clauses = Vec::new();
        if !where_clause.is_empty() {
            clauses.push(format!("WHERE {}", where_clause));
        }
        if let Some(order_by) = order_by {
            clauses.push(format!("ORDER BY {}", order_by));
        }
        if let Some(limit) = &parsed.limit {
            clauses.push(format!("LIMIT {}", limit));
        }
        let filter_clause = clauses.join(" ");
        let param_count = count_placeholders(&filter_clause);
        let mut param_types = std::mem::take(&mut state.param_types);
        param_types.resize(param_count, None);

        let user_objects: Vec<String> = {
            let mut seen = BTreeSet::new();
            list.objects()
                .filter(|o| o.is_user())
                .map(ObjectToken::name)
                .filter(|n| seen.insert(n.clone()))
                .collect()
        };

        let requested: Vec<(String, String)> = match fields {
            Some(specs) => specs
                .iter()
                .map(|spec| {
                    let (object, field) = parse_field_ref(spec)?;
                    Ok((object.unwrap_or_else(|| first.clone()), field))
                })
                .collect::<Result<_, QueryError>>()?,
            None => user_objects
                .iter()
                .flat_map(|name| {
                    let base = state.bases.get(name).cloned().unwrap_or_default();
                    self.meta
                        .fields_of(&base)
                        .iter()
                        .filter(|f| !f.imported)
                        .map(move |f| (name.clone(), f.name.clone()))
                        .collect::<Vec<_>>()
                })
                .collect(),
        };

        let mut select = Selection::default();
        for (object, field) in &requested {
            state.select(&mut select, object, field)?;
        }

        let compiled = CompiledQuery {
            objects: user_objects,
            aliases: state.aliases,
            from_clause: state.from.join(", "),
            where_clause,
            filter_clause,
            select_list: select.list,
            columns: select.columns,
            param_count,
            param_types,
        };
        debug!(
            from = %compiled.from_clause,
            filter = %compiled.filter_clause,
            params = compiled.param_count,
            "Compiled query"
        );
        Ok(compiled)
    }
}

const COMPARISONS: [&str; 7] = ["=", "<>", "!=", "<=", ">=", "<", ">"];

fn is_comparison(text: &str) -> bool {
    COMPARISONS.contains(&text.trim())
}

/// Type of each `?` in `parts`, in order: the type of the field reference the
/// placeholder is compared with by a bare comparison operator, else `None`.
fn placeholder_types(parts: &[FilterPart], field_types: &[Option<String>]) -> Vec<Option<String>> {
    let mut types = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        let FilterPart::Sql(text) = part else {
            continue;
        };
        let before = i.checked_sub(1).and_then(|j| field_types[j].as_ref());
        let after = field_types.get(i + 1).and_then(Option::as_ref);
        for_each_outside_literals(text, |pos, c| {
            if c != '?' {
                return;
            }
            let ty = if is_comparison(&text[..pos]) {
                before
            } else if is_comparison(&text[pos + 1..]) {
                after
            } else {
                None
            };
            types.push(ty.cloned());
        });
    }
    types
}

struct Resolver<'a> {
    meta: &'a Metadata,
    first_base: String,
}

impl NameResolver for Resolver<'_> {
    fn is_object(&self, name: &str) -> bool {
        ObjectToken::parse(name).is_ok_and(|t| self.meta.object(&t.base).is_some())
    }

    fn is_default_field(&self, name: &str) -> bool {
        self.meta.field(&self.first_base, name).is_some()
    }
}

#[derive(Default)]
struct Selection {
    list: Vec<String>,
    columns: Vec<(String, ColumnMap)>,
}

impl Selection {
    fn index_of(&mut self, expr: String) -> usize {
        match self.list.iter().position(|e| *e == expr) {
            Some(index) => index,
            None => {
                self.list.push(expr);
                self.list.len() - 1
            }
        }
    }
}

struct State<'a> {
    meta: &'a Metadata,
    /// Token name to alias.
    aliases: BTreeMap<String, String>,
    /// Token name to base object name.
    bases: BTreeMap<String, String>,
    used: BTreeSet<String>,
    from: Vec<String>,
    joins: Vec<String>,
    /// (alias, relation) to the alias of the joined secondary relation.
    secondary: BTreeMap<(String, String), String>,
    /// Placeholder types of everything rendered so far, in order.
    param_types: Vec<Option<String>>,
}

fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quote_identifier(alias), quote_identifier(column))
}

impl<'a> State<'a> {
    fn new(meta: &'a Metadata) -> Self {
        Self {
            meta,
            aliases: BTreeMap::new(),
            bases: BTreeMap::new(),
            used: BTreeSet::new(),
            from: Vec::new(),
            joins: Vec::new(),
            secondary: BTreeMap::new(),
            param_types: Vec::new(),
        }
    }

    /// Add `table` to the FROM list under a fresh alias derived from `stem`.
    fn add_from(&mut self, table: &str, stem: String) -> String {
        let mut alias = stem.clone();
        let mut n = 1;
        while self.used.contains(&alias) {
            n += 1;
            alias = format!("{}_{}", stem, n);
        }
        self.used.insert(alias.clone());
        self.from.push(format!("{} {}", quote_identifier(table), quote_identifier(&alias)));
        alias
    }

    fn column(&self, object: &str, field: &str) -> Result<&'a FieldMeta, QueryError> {
        self.meta
            .field(object, field)
            .ok_or_else(|| QueryError::UnknownField {
                object: object.to_string(),
                field: field.to_string(),
            })
    }

    fn walk(&mut self, list: &ObjectList) -> Result<(), QueryError> {
        let meta = self.meta;
        let mut prev: Option<&ObjectToken> = None;
        for token in list.tokens() {
            let cur = match token {
                Token::And => {
                    prev = None;
                    continue;
                }
                Token::Object(cur) => cur,
            };
            let object = meta
                .object(&cur.base)
                .ok_or_else(|| QueryError::UnknownObject {
                    name: cur.base.clone(),
                })?;
            let name = cur.name();
            let crossing = prev.and_then(|p| meta.crossing.get(&p.base, &cur.base));

            if !self.aliases.contains_key(&name) {
                let shared = prev
                    .filter(|_| matches!(crossing, Some(CrossingEntry::Shared)))
                    .and_then(|p| self.aliases.get(&p.name()).cloned());
                let alias = match shared {
                    Some(alias) => alias,
                    None => {
                        let relation = meta.relation(&object.relation).ok_or_else(|| {
                            QueryError::UnknownObject {
                                name: object.relation.clone(),
                            }
                        })?;
                        let stem = match cur.instance {
                            Some(n) => format!("{}{}", relation.sql_name, n),
                            None => relation.sql_name.clone(),
                        };
                        let table = relation.sql_name.clone();
                        self.add_from(&table, stem)
                    }
                };
                self.aliases.insert(name.clone(), alias);
                self.bases.insert(name.clone(), cur.base.clone());
            }

            if let Some(p) = prev {
                let prev_alias = self.aliases[&p.name()].clone();
                let cur_alias = self.aliases[&name].clone();
                if prev_alias != cur_alias {
                    let join = match crossing {
                        None => {
                            return Err(QueryError::NoPath {
                                from: p.base.clone(),
                                to: cur.base.clone(),
                            })
                        }
                        Some(CrossingEntry::Join { source, target }) => format!(
                            "{} = {}",
                            qualified(&prev_alias, &self.column(&p.base, source)?.column),
                            qualified(&cur_alias, &self.column(&cur.base, target)?.column),
                        ),
                        Some(CrossingEntry::Shared) => format!(
                            "{} = {}",
                            qualified(&prev_alias, FIELD_ID),
                            qualified(&cur_alias, FIELD_ID)
                        ),
                    };
                    self.joins.push(join);
                }
            }
            prev = Some(cur);
        }
        Ok(())
    }

    /// Alias and base object of a token referenced by a filter or field list.
    fn lookup(&self, object: &str) -> Result<(String, String), QueryError> {
        match (self.aliases.get(object), self.bases.get(object)) {
            (Some(alias), Some(base)) => Ok((alias.clone(), base.clone())),
            _ => {
                let known = ObjectToken::parse(object)
                    .is_ok_and(|t| self.meta.object(&t.base).is_some());
                Err(if known {
                    QueryError::ObjectNotInList {
                        name: object.to_string(),
                    }
                } else {
                    QueryError::UnknownObject {
                        name: object.to_string(),
                    }
                })
            }
        }
    }

    /// Alias of the secondary relation joined to `alias`, joining it on first use.
    fn secondary_alias(&mut self, alias: &str, relation: &str) -> Result<String, QueryError> {
        let key = (alias.to_string(), relation.to_string());
        if let Some(existing) = self.secondary.get(&key) {
            return Ok(existing.clone());
        }
        let table = self
            .meta
            .relation(relation)
            .map(|r| r.sql_name.clone())
            .ok_or_else(|| QueryError::UnknownObject {
                name: relation.to_string(),
            })?;
        let joined = self.add_from(&table, format!("{}_{}", alias, table));
        self.joins.push(format!(
            "{} = {}",
            qualified(alias, FIELD_ID),
            qualified(&joined, FIELD_ID)
        ));
        self.secondary.insert(key, joined.clone());
        Ok(joined)
    }

    fn render(
        &mut self,
        parts: &[FilterPart],
        first: &str,
        allow_secondary: bool,
    ) -> Result<String, QueryError> {
        let mut sql = String::new();
        let mut field_types = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                FilterPart::Sql(text) => {
                    sql.push_str(text);
                    field_types.push(None);
                }
                FilterPart::Field { object, field } => {
                    let object = object.as_deref().unwrap_or(first);
                    let (alias, base) = self.lookup(object)?;
                    let meta = self.column(&base, field)?;
                    field_types.push(Some(meta.type_name.clone()));
                    if meta.is_secondary() {
                        if !allow_secondary {
                            return Err(QueryError::SecondaryInOrderBy {
                                object: object.to_string(),
                                field: field.clone(),
                            });
                        }
                        let joined = self.secondary_alias(&alias, &meta.relation)?;
                        sql.push_str(&qualified(&joined, &meta.column));
                    } else {
                        sql.push_str(&qualified(&alias, &meta.column));
                    }
                }
            }
        }
        self.param_types.extend(placeholder_types(parts, &field_types));
        Ok(sql)
    }

    fn select(&self, select: &mut Selection, object: &str, field: &str) -> Result<(), QueryError> {
        let (alias, base) = self.lookup(object)?;
        let meta = self.column(&base, field)?;
        let key = format!("{}({})", object, field);
        let map = if meta.is_secondary() {
            let id = self.column(&base, FIELD_ID)?;
            let relation_sql = self
                .meta
                .relation(&meta.relation)
                .map(|r| r.sql_name.clone())
                .unwrap_or_default();
            ColumnMap::Secondary {
                id_index: select.index_of(qualified(&alias, &id.column)),
                relation: meta.relation.clone(),
                relation_sql,
                column: meta.column.clone(),
                type_name: meta.type_name.clone(),
            }
        } else {
            ColumnMap::Primary {
                index: select.index_of(qualified(&alias, &meta.column)),
                type_name: meta.type_name.clone(),
            }
        };
        select.columns.push((key, map));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::genome_metadata;
    use rstest::{fixture, rstest};

    #[fixture]
    fn meta() -> Metadata {
        genome_metadata()
    }

    #[rstest]
    fn test_order_by_and_limit_preserved(meta: Metadata) {
        let query = QueryCompiler::new(&meta)
            .compile("Genome", "Genome(genus) = ? ORDER BY Genome(species) LIMIT 10", None)
            .unwrap();
        assert_eq!(
            query.filter_clause,
            r#"WHERE "genome"."genus" = ? ORDER BY "genome"."species" LIMIT 10"#
        );
        assert!(query.filter_clause.ends_with(r#"ORDER BY "genome"."species" LIMIT 10"#));
        assert_eq!(query.param_count, 1);
    }

    #[rstest]
    fn test_join_chain(meta: Metadata) {
        let query = QueryCompiler::new(&meta)
            .compile("Genome GenomeHasFeature Feature", "Feature(feature-type) = 'peg'", None)
            .unwrap();
        assert_eq!(
            query.from_clause,
            r#""genome" "genome", "genome_has_feature" "genome_has_feature", "feature" "feature""#
        );
        assert_eq!(
            query.where_clause,
            r#""genome"."id" = "genome_has_feature"."from_link" AND "genome_has_feature"."to_link" = "feature"."id" AND ("feature"."feature_type" = 'peg')"#
        );
        assert_eq!(query.param_count, 0);
    }

    #[rstest]
    fn test_converse_direction(meta: Metadata) {
        let query = QueryCompiler::new(&meta)
            .compile("Feature FeatureInGenome Genome", "", None)
            .unwrap();
        assert_eq!(
            query.where_clause,
            r#""feature"."id" = "genome_has_feature"."to_link" AND "genome_has_feature"."from_link" = "genome"."id""#
        );
        assert_eq!(query.aliases["FeatureInGenome"], "genome_has_feature");
    }

    #[rstest]
    fn test_embedded_relationship_shares_alias(meta: Metadata) {
        let query = QueryCompiler::new(&meta)
            .compile("Feature FeatureHasAnnotation Annotation", "", None)
            .unwrap();
        assert_eq!(query.aliases["FeatureHasAnnotation"], query.aliases["Annotation"]);
        assert_eq!(query.from_clause, r#""feature" "feature", "annotation" "annotation""#);
        assert_eq!(
            query.where_clause,
            r#""feature"."id" = "annotation"."feature_has_annotation_from_link""#
        );
    }

    #[rstest]
    fn test_no_path(meta: Metadata) {
        let err = QueryCompiler::new(&meta).compile("Drug Annotation", "", None).unwrap_err();
        assert_eq!(
            err,
            QueryError::NoPath {
                from: "Drug".into(),
                to: "Annotation".into()
            }
        );
    }

    #[rstest]
    fn test_jump_expansion(meta: Metadata) {
        let query = QueryCompiler::new(&meta)
            .compile("Genome Feature", "Feature(sequence-length) > ?", None)
            .unwrap();
        assert_eq!(query.objects, vec!["Genome", "Feature"]);
        assert_eq!(query.aliases["GenomeHasFeature100"], "genome_has_feature100");
        assert!(query.from_clause.contains(r#""genome_has_feature" "genome_has_feature100""#));
        assert!(query.columns.iter().all(|(name, _)| !name.starts_with("GenomeHasFeature")));
    }

    #[rstest]
    fn test_instances_get_distinct_aliases(meta: Metadata) {
        let query = QueryCompiler::new(&meta)
            .compile(
                "Genome GenomeHasFeature Feature AND Genome2 Genome2Drug Drug",
                "Genome(genus) = Genome2(genus)",
                None,
            )
            .unwrap();
        assert_eq!(query.aliases["Genome2"], "genome2");
        assert!(query.where_clause.ends_with(r#"("genome"."genus" = "genome2"."genus")"#));
    }

    #[rstest]
    fn test_secondary_field_joined_once(meta: Metadata) {
        let query = QueryCompiler::new(&meta)
            .compile("Genome", "Genome(alias) = ? OR alias LIKE ?", Some(&["Genome(genus)"]))
            .unwrap();
        assert_eq!(query.from_clause, r#""genome" "genome", "genome_alias" "genome_genome_alias""#);
        assert_eq!(
            query.where_clause,
            r#""genome"."id" = "genome_genome_alias"."id" AND ("genome_genome_alias"."alias" = ? OR "genome_genome_alias"."alias" LIKE ?)"#
        );
        assert_eq!(query.param_count, 2);
    }

    #[rstest]
    fn test_secondary_field_in_order_by_rejected(meta: Metadata) {
        let err = QueryCompiler::new(&meta)
            .compile("Genome", "ORDER BY Genome(alias)", None)
            .unwrap_err();
        assert!(matches!(err, QueryError::SecondaryInOrderBy { .. }));
    }

    #[rstest]
    fn test_default_field_list(meta: Metadata) {
        let query = QueryCompiler::new(&meta).compile("Genome", "", None).unwrap();
        let names: Vec<_> = query.columns.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Genome(id)",
                "Genome(genus)",
                "Genome(species)",
                "Genome(domain)",
                "Genome(dna-size)",
                "Genome(alias)"
            ]
        );
        assert_eq!(query.select_list.len(), 5);
        assert!(matches!(
            query.column("Genome(alias)"),
            Some(ColumnMap::Secondary { id_index: 0, .. })
        ));
        assert_eq!(
            query.select_sql(),
            r#"SELECT "genome"."id", "genome"."genus", "genome"."species", "genome"."domain", "genome"."dna_size" FROM "genome" "genome""#
        );
    }

    #[rstest]
    fn test_imported_fields_not_selected_by_default(meta: Metadata) {
        let query = QueryCompiler::new(&meta).compile("Annotation", "", None).unwrap();
        assert!(query.column("Annotation(feature-has-annotation-from-link)").is_none());
        assert!(query.column("Annotation(annotator)").is_some());
    }

    #[rstest]
    fn test_selected_secondary_field_selects_id(meta: Metadata) {
        let query = QueryCompiler::new(&meta)
            .compile("Genome", "", Some(&["Genome(alias)"]))
            .unwrap();
        assert_eq!(query.select_list, vec![r#""genome"."id""#]);
        assert_eq!(
            query.column("Genome(alias)"),
            Some(&ColumnMap::Secondary {
                id_index: 0,
                relation: "GenomeAlias".into(),
                relation_sql: "genome_alias".into(),
                column: "alias".into(),
                type_name: "string".into(),
            })
        );
    }

    #[rstest]
    #[case("Feature(function) IS NULL", QueryError::ObjectNotInList { name: "Feature".into() })]
    #[case("Genome(colour) = ?", QueryError::UnknownField { object: "Genome".into(), field: "colour".into() })]
    #[case("Genmoe(genus) = ?", QueryError::UnknownObject { name: "Genmoe".into() })]
    #[case("Genome(genus) = ? ORDER BY Protein(name)", QueryError::UnknownObject { name: "Protein".into() })]
    fn test_bad_references(meta: Metadata, #[case] filter: &str, #[case] expected: QueryError) {
        let err = QueryCompiler::new(&meta).compile("Genome", filter, None).unwrap_err();
        assert_eq!(err, expected);
    }

    #[rstest]
    #[case("Genome", "Genome(genus) = ? AND dna-size >= ? LIMIT ?", vec![Some("string"), Some("counter"), None])]
    #[case("Drug", "? = Drug(approved) AND Drug(name) LIKE ?", vec![Some("boolean"), None])]
    #[case("Drug", "Drug(name) = '?' OR Drug(id) IN (?, ?)", vec![None, None])]
    #[case("Genome", "(Genome(alias) <> ?)", vec![Some("string")])]
    fn test_placeholder_types(
        meta: Metadata,
        #[case] objects: &str,
        #[case] filter: &str,
        #[case] expected: Vec<Option<&str>>,
    ) {
        let query = QueryCompiler::new(&meta).compile(objects, filter, None).unwrap();
        let expected: Vec<Option<String>> = expected.into_iter().map(|t| t.map(str::to_string)).collect();
        assert_eq!(query.param_types, expected);
        assert_eq!(query.param_types.len(), query.param_count);
    }

    #[rstest]
    fn test_unknown_object(meta: Metadata) {
        let err = QueryCompiler::new(&meta).compile("Protein", "", None).unwrap_err();
        assert_eq!(err, QueryError::UnknownObject { name: "Protein".into() });
    }

    #[rstest]
    fn test_count_sql(meta: Metadata) {
        let query = QueryCompiler::new(&meta)
            .compile("Drug", "Drug(approved) = 1", None)
            .unwrap();
        assert_eq!(
            query.count_sql(),
            r#"SELECT COUNT(*) FROM (SELECT 1 FROM "drug" "drug" WHERE "drug"."approved" = 1) counted"#
        );
    }
}
