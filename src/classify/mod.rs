pub mod plan;
pub mod similarity;

use regex::Regex;

use crate::error::Error;
use crate::migration::model::{FieldDiff, MigrationPattern, SchemaDiff, TableDiff};

use plan::{ApplyPlan, LinkToCreate, SatToCreate, TableToAlter, TableToCreate};

/// Compiles the two patterns used to classify and key tables once per
/// request, rather than recompiling a regex per table as they're consulted.
pub struct CompiledPatterns {
    pub fk_pattern: Regex,
    pub pk_pattern: Regex,
    /// Fallback stem extractor applied to a Sat/Link's own table name when
    /// `fk_pattern`-based resolution doesn't find a hub.
    pub fk_table: Option<Regex>,
}

impl CompiledPatterns {
    pub fn compile(pattern: &MigrationPattern) -> Result<Self, Error> {
        Ok(Self {
            fk_pattern: Regex::new(&pattern.fk_pattern)
                .map_err(|e| Error::Internal(format!("invalid fk_pattern: {e}")))?,
            pk_pattern: Regex::new(&pattern.pk_pattern)
                .map_err(|e| Error::Internal(format!("invalid pk_pattern: {e}")))?,
            fk_table: pattern
                .fk_table
                .as_deref()
                .map(Regex::new)
                .transpose()
                .map_err(|e| Error::Internal(format!("invalid fk_table: {e}")))?,
        })
    }

    fn fk_count(&self, fields: &[FieldDiff]) -> usize {
        fields
            .iter()
            .filter(|f| self.fk_pattern.is_match(f.name()))
            .count()
    }

    fn find_pk(&self, fields: &[FieldDiff]) -> Option<String> {
        let matches: Vec<&str> = fields
            .iter()
            .map(|f| f.name())
            .filter(|n| self.pk_pattern.is_match(n))
            .collect();
        if matches.len() == 1 {
            Some(matches[0].to_string())
        } else {
            None
        }
    }

    fn fk_stem(&self, field_name: &str) -> Option<String> {
        self.fk_pattern
            .captures(field_name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn fk_table_stem(&self, table_name: &str) -> Option<String> {
        self.fk_table
            .as_ref()?
            .captures(table_name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Classifies one schema's table diffs into an [`ApplyPlan`]: routes creates
/// by foreign-key count into Hub/Sat/Link buckets, copies alters verbatim
/// into a role-agnostic bucket, and collects deletes into a single
/// role-agnostic list (see the crate's design notes on why deletes are not
/// bucketed by role here).
pub fn classify_schema(schema: &SchemaDiff, patterns: &CompiledPatterns) -> ApplyPlan {
    let mut plan = ApplyPlan::default();

    for table in &schema.tables {
        if table.is_create() {
            classify_create(table, patterns, &mut plan);
        } else if table.is_delete() {
            plan.tables_to_delete.push(table.name().to_string());
        } else if table.is_alter() {
            classify_alter(table, &mut plan);
        }
    }

    for hub in &plan.hubs_to_create {
        if let Some(pk) = &hub.pk {
            plan.hub_names_to_pks
                .insert(hub.name.clone(), pk.clone());
        }
    }

    plan
}

fn classify_create(table: &TableDiff, patterns: &CompiledPatterns, plan: &mut ApplyPlan) {
    let fk_count = patterns.fk_count(&table.fields);
    let pk = patterns.find_pk(&table.fields);
    let base = TableToCreate {
        name: table.name().to_string(),
        db: table.db.clone(),
        pk,
        fields: table.fields.clone(),
    };

    match fk_count {
        0 => plan.hubs_to_create.push(base),
        1 => {
            let fk = table
                .fields
                .iter()
                .find(|f| patterns.fk_pattern.is_match(f.name()))
                .map(|f| f.name().to_string())
                .expect("fk_count == 1 implies exactly one matching field");
            plan.sats_to_create.push(SatToCreate {
                table: base,
                fk,
                ref_table: None,
            });
        }
        2 => {
            let mut fks = table
                .fields
                .iter()
                .filter(|f| patterns.fk_pattern.is_match(f.name()))
                .map(|f| f.name().to_string());
            let main_fk = fks.next().expect("fk_count == 2 implies two fields");
            let paired_fk = fks.next();
            plan.links_to_create.push(LinkToCreate {
                table: base,
                main_fk,
                main_ref_table: None,
                paired_fk,
                paired_ref_table: None,
                too_many_fks: false,
            });
        }
        _ => {
            // More than two fields match the FK pattern: still a Link by
            // shape (it joins two-or-more things), but the pairing is
            // ambiguous. Non-fatal per `ClassificationError::TooManyForeignKeys`:
            // the Link is still created, just as an isolated node with no
            // topology edges, so the record exists for a later migration to
            // reconcile.
            let matched: Vec<String> = table
                .fields
                .iter()
                .filter(|f| patterns.fk_pattern.is_match(f.name()))
                .map(|f| f.name().to_string())
                .collect();
            let err = crate::error::ClassificationError::TooManyForeignKeys(matched.clone());
            tracing::warn!(table = table.name(), "{err}");
            let mut fks = matched.into_iter();
            let main_fk = fks.next().expect("fk_count > 2 implies at least one field");
            let paired_fk = fks.next();
            plan.links_to_create.push(LinkToCreate {
                table: base,
                main_fk,
                main_ref_table: None,
                paired_fk,
                paired_ref_table: None,
                too_many_fks: true,
            });
        }
    }
}

fn classify_alter(table: &TableDiff, plan: &mut ApplyPlan) {
    let mut fields_to_create = Vec::new();
    let mut fields_to_delete = Vec::new();
    let mut fields_to_alter = Vec::new();

    for field in &table.fields {
        if field.old_name.is_none() {
            fields_to_create.push(field.clone());
        } else if field.new_name.is_none() {
            fields_to_delete.push(field.clone());
        } else {
            fields_to_alter.push(field.clone());
        }
    }

    if fields_to_create.is_empty() && fields_to_delete.is_empty() && fields_to_alter.is_empty() {
        return;
    }

    plan.tables_to_alter.push(TableToAlter {
        name: table.name().to_string(),
        fields_to_create,
        fields_to_delete,
        fields_to_alter,
    });
}

/// Resolves a Satellite's FK stem to a Hub name via the similarity resolver,
/// feeding it the set of Hubs already known in this plan plus any provided
/// by the caller (e.g. Hubs already present in the graph for prior
/// migrations).
pub fn resolve_fk_stem(
    patterns: &CompiledPatterns,
    fk_field: &str,
    asking_table: &str,
    hub_candidates: impl IntoIterator<Item = String>,
) -> Option<String> {
    let candidates: Vec<String> = hub_candidates.into_iter().collect();

    if let Some(stem) = patterns.fk_stem(fk_field) {
        if let Some(hit) = similarity::resolve(
            &stem,
            candidates.iter().map(|s| s.as_str()),
            asking_table,
        ) {
            return Some(hit.to_string());
        }
    }

    // Fall back to extracting the stem from the asking table's own name,
    // for sources whose FK fields don't carry a resolvable stem.
    let stem = patterns.fk_table_stem(asking_table)?;
    similarity::resolve(&stem, candidates.iter().map(|s| s.as_str()), asking_table)
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SystemType;
    use crate::migration::model::FieldDiff;

    fn patterns() -> CompiledPatterns {
        CompiledPatterns::compile(&MigrationPattern::default()).unwrap()
    }

    #[test]
    fn zero_fk_fields_classified_as_hub() {
        let table = TableDiff::created(
            "customer_hub",
            "ns",
            vec![FieldDiff::created("customer_hash_key", SystemType::Str)],
        );
        let schema = SchemaDiff {
            name: "ns".into(),
            tables: vec![table],
        };
        let plan = classify_schema(&schema, &patterns());
        assert_eq!(plan.hubs_to_create.len(), 1);
        assert_eq!(plan.hubs_to_create[0].pk.as_deref(), Some("customer_hash_key"));
    }

    #[test]
    fn one_fk_field_classified_as_sat() {
        let table = TableDiff::created(
            "customer_sat",
            "ns",
            vec![
                FieldDiff::created("idcustomer_hash_fkey", SystemType::Str),
                FieldDiff::created("email", SystemType::Str),
            ],
        );
        let schema = SchemaDiff {
            name: "ns".into(),
            tables: vec![table],
        };
        let plan = classify_schema(&schema, &patterns());
        assert_eq!(plan.sats_to_create.len(), 1);
        assert_eq!(plan.sats_to_create[0].fk, "idcustomer_hash_fkey");
    }

    #[test]
    fn two_fk_fields_classified_as_link() {
        let table = TableDiff::created(
            "customer_order_link",
            "ns",
            vec![
                FieldDiff::created("idcustomer_hash_fkey", SystemType::Str),
                FieldDiff::created("idorder_hash_fkey", SystemType::Str),
            ],
        );
        let schema = SchemaDiff {
            name: "ns".into(),
            tables: vec![table],
        };
        let plan = classify_schema(&schema, &patterns());
        assert_eq!(plan.links_to_create.len(), 1);
    }

    #[test]
    fn more_than_two_fks_becomes_isolated_link() {
        let table = TableDiff::created(
            "weird_table",
            "ns",
            vec![
                FieldDiff::created("a_hash_fkey", SystemType::Str),
                FieldDiff::created("b_hash_fkey", SystemType::Str),
                FieldDiff::created("c_hash_fkey", SystemType::Str),
            ],
        );
        let schema = SchemaDiff {
            name: "ns".into(),
            tables: vec![table],
        };
        let plan = classify_schema(&schema, &patterns());
        assert!(plan.hubs_to_create.is_empty());
        assert!(plan.sats_to_create.is_empty());
        assert_eq!(plan.links_to_create.len(), 1);
        assert!(plan.links_to_create[0].too_many_fks);
    }

    #[test]
    fn deletes_are_role_agnostic() {
        let table = TableDiff::deleted("legacy_sat", "ns");
        let schema = SchemaDiff {
            name: "ns".into(),
            tables: vec![table],
        };
        let plan = classify_schema(&schema, &patterns());
        assert_eq!(plan.tables_to_delete, vec!["legacy_sat".to_string()]);
    }
}
