//! Executes a classified [`ApplyPlan`] against a [`GraphStore`] in the fixed
//! order that correctness depends on: delete, then create Hubs, then create
//! Links, then create Satellites, then alter. Every phase is batched.

use crate::classify::plan::{ApplyPlan, LinkToCreate, SatToCreate, TableToAlter, TableToCreate};
use crate::classify::{resolve_fk_stem, CompiledPatterns};
use crate::error::Error;
use crate::graph::query::{FieldAlter, FieldPayload, HubPayload, LinkPayload, LinkRef, QueryBuilder, SatPayload};
use crate::graph::{GraphStore, NamespaceName};
use crate::metadata::SystemType;

/// Records per graph-mutation statement, matching the source system's batch
/// size for the same operation.
pub const BATCH_SIZE: usize = 50;

pub struct Applier<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> Applier<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    pub async fn apply(
        &self,
        ns: &NamespaceName,
        plan: &ApplyPlan,
        patterns: &CompiledPatterns,
    ) -> Result<(), Error> {
        self.delete_tables(ns, &plan.tables_to_delete).await?;
        self.create_hubs(ns, &plan.hubs_to_create).await?;
        self.create_links(ns, &plan.links_to_create, patterns, &plan.hub_names_to_pks)
            .await?;
        self.create_sats(ns, &plan.sats_to_create, patterns, &plan.hub_names_to_pks)
            .await?;
        self.alter_tables(ns, &plan.tables_to_alter).await?;
        Ok(())
    }

    async fn delete_tables(&self, ns: &NamespaceName, names: &[String]) -> Result<(), Error> {
        for batch in names.chunks(BATCH_SIZE) {
            if batch.is_empty() {
                continue;
            }
            let stmt = QueryBuilder::delete_tables(&ns.graph_name(), batch)?;
            self.store.execute_batch(ns, &stmt).await?;
        }
        Ok(())
    }

    async fn create_hubs(&self, ns: &NamespaceName, hubs: &[TableToCreate]) -> Result<(), Error> {
        for batch in hubs.chunks(BATCH_SIZE) {
            if batch.is_empty() {
                continue;
            }
            let payloads: Vec<HubPayload> = batch.iter().map(hub_payload).collect();
            let stmt = QueryBuilder::create_hubs(&ns.graph_name(), &payloads)?;
            self.store.execute_batch(ns, &stmt).await?;
        }
        Ok(())
    }

    async fn create_links(
        &self,
        ns: &NamespaceName,
        links: &[LinkToCreate],
        patterns: &CompiledPatterns,
        hub_pks: &std::collections::BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let hub_names: Vec<String> = hub_pks.keys().cloned().collect();
        for batch in links.chunks(BATCH_SIZE) {
            if batch.is_empty() {
                continue;
            }
            let payloads: Vec<LinkPayload> = batch
                .iter()
                .map(|l| link_payload(l, patterns, &hub_names, hub_pks))
                .collect();
            let stmt = QueryBuilder::create_links(&ns.graph_name(), &payloads)?;
            self.store.execute_batch(ns, &stmt).await?;
        }
        Ok(())
    }

    async fn create_sats(
        &self,
        ns: &NamespaceName,
        sats: &[SatToCreate],
        patterns: &CompiledPatterns,
        hub_pks: &std::collections::BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let hub_names: Vec<String> = hub_pks.keys().cloned().collect();
        for batch in sats.chunks(BATCH_SIZE) {
            if batch.is_empty() {
                continue;
            }
            let payloads: Vec<SatPayload> = batch
                .iter()
                .map(|s| sat_payload(s, patterns, &hub_names, hub_pks))
                .collect();
            let stmt = QueryBuilder::create_sats(&ns.graph_name(), &payloads)?;
            self.store.execute_batch(ns, &stmt).await?;
        }
        Ok(())
    }

    async fn alter_tables(&self, ns: &NamespaceName, tables: &[TableToAlter]) -> Result<(), Error> {
        for table in tables {
            if !table.fields_to_create.is_empty() {
                let payloads: Vec<FieldPayload> = table
                    .fields_to_create
                    .iter()
                    .map(|f| FieldPayload {
                        name: f.name().to_string(),
                        db_type: f.new_type.unwrap_or(SystemType::Unspecified).to_string(),
                    })
                    .collect();
                for batch in payloads.chunks(BATCH_SIZE) {
                    let stmt = QueryBuilder::create_fields(&ns.graph_name(), &table.name, batch)?;
                    self.store.execute_batch(ns, &stmt).await?;
                }
            }
            if !table.fields_to_delete.is_empty() {
                let names: Vec<String> = table
                    .fields_to_delete
                    .iter()
                    .map(|f| f.name().to_string())
                    .collect();
                for batch in names.chunks(BATCH_SIZE) {
                    let stmt = QueryBuilder::delete_fields(&ns.graph_name(), &table.name, batch)?;
                    self.store.execute_batch(ns, &stmt).await?;
                }
            }
            if !table.fields_to_alter.is_empty() {
                let payloads: Vec<FieldAlter> = table
                    .fields_to_alter
                    .iter()
                    .map(|f| FieldAlter {
                        name: f.name().to_string(),
                        new_type: f.new_type.unwrap_or(SystemType::Unspecified).to_string(),
                    })
                    .collect();
                for batch in payloads.chunks(BATCH_SIZE) {
                    let stmt = QueryBuilder::alter_fields(&ns.graph_name(), &table.name, batch)?;
                    self.store.execute_batch(ns, &stmt).await?;
                }
            }
        }
        Ok(())
    }
}

fn hub_payload(hub: &TableToCreate) -> HubPayload {
    HubPayload {
        name: hub.name.clone(),
        db: hub.db.clone(),
        fields: hub
            .fields
            .iter()
            .map(|f| FieldPayload {
                name: f.name().to_string(),
                db_type: f.new_type.unwrap_or(SystemType::Unspecified).to_string(),
            })
            .collect(),
    }
}

fn sat_payload(
    sat: &SatToCreate,
    patterns: &CompiledPatterns,
    hub_names: &[String],
    hub_pks: &std::collections::BTreeMap<String, String>,
) -> SatPayload {
    let ref_table = sat.ref_table.clone().or_else(|| {
        resolve_fk_stem(
            patterns,
            &sat.fk,
            &sat.table.name,
            hub_names.iter().cloned(),
        )
    });
    let link = ref_table.and_then(|ref_table| {
        hub_pks.get(&ref_table).map(|pk| LinkRef {
            ref_table,
            ref_table_pk: pk.clone(),
            fk: sat.fk.clone(),
        })
    });
    if link.is_none() {
        tracing::warn!(
            table = sat.table.name,
            "satellite's hub could not be resolved; creating as isolated node"
        );
    }
    SatPayload {
        name: sat.table.name.clone(),
        db: sat.table.db.clone(),
        link,
        fields: payload_fields(&sat.table),
    }
}

fn link_payload(
    link: &LinkToCreate,
    patterns: &CompiledPatterns,
    hub_names: &[String],
    hub_pks: &std::collections::BTreeMap<String, String>,
) -> LinkPayload {
    if link.too_many_fks {
        tracing::warn!(
            table = link.table.name,
            "link has more than two foreign keys; creating as isolated node"
        );
        return LinkPayload {
            name: link.table.name.clone(),
            db: link.table.db.clone(),
            main_link: None,
            paired_link: None,
            fields: payload_fields(&link.table),
        };
    }

    let main_ref = link.main_ref_table.clone().or_else(|| {
        resolve_fk_stem(
            patterns,
            &link.main_fk,
            &link.table.name,
            hub_names.iter().cloned(),
        )
    });
    let paired_ref = link.paired_fk.as_ref().and_then(|fk| {
        link.paired_ref_table.clone().or_else(|| {
            resolve_fk_stem(patterns, fk, &link.table.name, hub_names.iter().cloned())
        })
    });

    let main_link = main_ref.and_then(|rt| {
        hub_pks.get(&rt).map(|pk| LinkRef {
            ref_table: rt,
            ref_table_pk: pk.clone(),
            fk: link.main_fk.clone(),
        })
    });
    let paired_link = match (&paired_ref, &link.paired_fk) {
        (Some(rt), Some(fk)) => hub_pks.get(rt).map(|pk| LinkRef {
            ref_table: rt.clone(),
            ref_table_pk: pk.clone(),
            fk: fk.clone(),
        }),
        _ => None,
    };

    if main_link.is_none() || paired_link.is_none() {
        tracing::warn!(
            table = link.table.name,
            "link's hubs could not both be resolved; creating as isolated node"
        );
    }

    LinkPayload {
        name: link.table.name.clone(),
        db: link.table.db.clone(),
        main_link,
        paired_link,
        fields: payload_fields(&link.table),
    }
}

fn payload_fields(table: &TableToCreate) -> Vec<FieldPayload> {
    table
        .fields
        .iter()
        .map(|f| FieldPayload {
            name: f.name().to_string(),
            db_type: f.new_type.unwrap_or(SystemType::Unspecified).to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::model::{FieldDiff, MigrationPattern};
    use std::collections::BTreeMap;

    fn table(name: &str, fk_field: Option<&str>) -> TableToCreate {
        let mut fields = vec![FieldDiff::created("name", SystemType::Str)];
        if let Some(fk) = fk_field {
            fields.push(FieldDiff::created(fk, SystemType::Str));
        }
        TableToCreate {
            name: name.to_string(),
            db: "ns".to_string(),
            pk: None,
            fields,
        }
    }

    #[test]
    fn sat_resolves_hub_by_similarity() {
        let patterns = CompiledPatterns::compile(&MigrationPattern::default()).unwrap();
        let mut hub_pks = BTreeMap::new();
        hub_pks.insert("customer_hub".to_string(), "customer_hash_key".to_string());
        let sat = SatToCreate {
            table: table("customer_sat", Some("idcustomer_hash_fkey")),
            fk: "idcustomer_hash_fkey".to_string(),
            ref_table: None,
        };
        let payload = sat_payload(&sat, &patterns, &["customer_hub".to_string()], &hub_pks);
        assert!(payload.link.is_some());
        assert_eq!(payload.link.unwrap().ref_table, "customer_hub");
    }

    #[test]
    fn sat_falls_back_to_isolated_node_when_unresolved() {
        let patterns = CompiledPatterns::compile(&MigrationPattern::default()).unwrap();
        let hub_pks = BTreeMap::new();
        let sat = SatToCreate {
            table: table("mystery_sat", Some("idmystery_hash_fkey")),
            fk: "idmystery_hash_fkey".to_string(),
            ref_table: None,
        };
        let payload = sat_payload(&sat, &patterns, &[], &hub_pks);
        assert!(payload.link.is_none());
    }
}
