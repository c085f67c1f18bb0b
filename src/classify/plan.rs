use std::collections::BTreeMap;

use crate::migration::model::FieldDiff;

/// A table being created, already classified into its Data Vault role.
#[derive(Debug, Clone)]
pub struct TableToCreate {
    pub name: String,
    pub db: String,
    pub pk: Option<String>,
    pub fields: Vec<FieldDiff>,
}

/// A Satellite being created, with its single foreign key and (if resolved)
/// the Hub it points to.
#[derive(Debug, Clone)]
pub struct SatToCreate {
    pub table: TableToCreate,
    pub fk: String,
    pub ref_table: Option<String>,
}

/// A Link being created, with its two foreign keys and (if resolved) the two
/// Hubs it joins.
#[derive(Debug, Clone)]
pub struct LinkToCreate {
    pub table: TableToCreate,
    pub main_fk: String,
    pub main_ref_table: Option<String>,
    pub paired_fk: Option<String>,
    pub paired_ref_table: Option<String>,
    /// Set when more than two fields matched the FK pattern: the
    /// `TooManyForeignKeys` case. The Applier never attempts hub resolution
    /// for such a Link and always creates it as an isolated node.
    pub too_many_fks: bool,
}

/// An existing table's field-level alterations, role-agnostic (the Applier
/// issues the same three field statements regardless of Hub/Sat/Link role).
#[derive(Debug, Clone)]
pub struct TableToAlter {
    pub name: String,
    pub fields_to_create: Vec<FieldDiff>,
    pub fields_to_delete: Vec<FieldDiff>,
    pub fields_to_alter: Vec<FieldDiff>,
}

/// One namespace's classified plan, ready for the Applier.
#[derive(Debug, Clone, Default)]
pub struct ApplyPlan {
    pub hubs_to_create: Vec<TableToCreate>,
    pub sats_to_create: Vec<SatToCreate>,
    pub links_to_create: Vec<LinkToCreate>,
    pub tables_to_alter: Vec<TableToAlter>,
    /// Role-agnostic: the Applier rediscovers each name's role from graph
    /// topology at delete time rather than bucketing deletes by role here.
    pub tables_to_delete: Vec<String>,
    /// Every Hub's name mapped to its resolved primary-key field, used by
    /// Sats/Links created in a later phase to pair their FK to a PK.
    pub hub_names_to_pks: BTreeMap<String, String>,
}

impl ApplyPlan {
    pub fn is_empty(&self) -> bool {
        self.hubs_to_create.is_empty()
            && self.sats_to_create.is_empty()
            && self.links_to_create.is_empty()
            && self.tables_to_alter.is_empty()
            && self.tables_to_delete.is_empty()
    }
}
