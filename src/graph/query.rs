//! Builds the openCypher fragments the GraphStore wraps in
//! `ag_catalog.cypher(...)` calls, with every scalar passed through
//! [`quote_literal`] so no request-derived value is ever interpolated
//! unescaped into a query string.

use crate::error::Error;

/// One field of a Hub/Sat/Link node being created.
#[derive(Debug, Clone)]
pub struct FieldPayload {
    pub name: String,
    pub db_type: String,
}

/// The hub/fk pairing a Satellite or one side of a Link resolves to.
#[derive(Debug, Clone)]
pub struct LinkRef {
    pub ref_table: String,
    pub ref_table_pk: String,
    pub fk: String,
}

#[derive(Debug, Clone)]
pub struct HubPayload {
    pub name: String,
    pub db: String,
    pub fields: Vec<FieldPayload>,
}

#[derive(Debug, Clone)]
pub struct SatPayload {
    pub name: String,
    pub db: String,
    pub link: Option<LinkRef>,
    pub fields: Vec<FieldPayload>,
}

#[derive(Debug, Clone)]
pub struct LinkPayload {
    pub name: String,
    pub db: String,
    pub main_link: Option<LinkRef>,
    pub paired_link: Option<LinkRef>,
    pub fields: Vec<FieldPayload>,
}

#[derive(Debug, Clone)]
pub struct FieldAlter {
    pub name: String,
    pub new_type: String,
}

/// Escapes `'` and `\` the way `psycopg2.sql.Literal` does for a single
/// string literal, and rejects embedded NUL bytes (Postgres text cannot
/// represent them, and silently truncating would corrupt the query).
pub fn quote_literal(value: &str) -> Result<String, Error> {
    if value.contains('\0') {
        return Err(Error::Internal(format!(
            "field value contains a NUL byte: {value:?}"
        )));
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    Ok(format!("'{escaped}'"))
}

fn fields_literal(fields: &[FieldPayload]) -> Result<String, Error> {
    let mut parts = Vec::with_capacity(fields.len());
    for f in fields {
        parts.push(format!(
            "{{name: {}, dbtype: {}}}",
            quote_literal(&f.name)?,
            quote_literal(&f.db_type)?,
        ));
    }
    Ok(format!("[{}]", parts.join(", ")))
}

fn cypher(graph: &str, body: &str) -> String {
    format!(
        "SELECT * FROM ag_catalog.cypher({}, $$ {} $$) AS (result ag_catalog.agtype)",
        // graph name is our own derived identifier (NamespaceName::graph_name),
        // never request input, so a literal is sufficient quoting here too.
        quote_literal(graph).unwrap_or_else(|_| format!("'{graph}'")),
        body,
    )
}

pub struct QueryBuilder;

impl QueryBuilder {
    pub fn create_graph_if_missing(graph: &str) -> String {
        format!(
            "SELECT ag_catalog.create_graph({}) \
             WHERE NOT EXISTS (SELECT 1 FROM ag_catalog.ag_graph WHERE name = {})",
            quote_literal(graph).unwrap_or_default(),
            quote_literal(graph).unwrap_or_default(),
        )
    }

    pub fn list_tables(graph: &str) -> String {
        cypher(graph, "MATCH (t:Table) RETURN t.name")
    }

    pub fn list_single_table(graph: &str, name: &str) -> Result<String, Error> {
        Ok(cypher(
            graph,
            &format!("MATCH (t:Table {{name: {}}}) RETURN t.name", quote_literal(name)?),
        ))
    }

    pub fn describe(graph: &str, table_names: &[String]) -> Result<String, Error> {
        let mut quoted = Vec::with_capacity(table_names.len());
        for n in table_names {
            quoted.push(quote_literal(n)?);
        }
        let list = format!("[{}]", quoted.join(", "));
        Ok(cypher(
            graph,
            &format!(
                "MATCH (t:Table)-[:ATTR]->(f:Field) WHERE t.name IN {list} \
                 RETURN t.db, t.name, f.name, f.dbtype"
            ),
        ))
    }

    pub fn create_hubs(graph: &str, hubs: &[HubPayload]) -> Result<String, Error> {
        let mut parts = Vec::with_capacity(hubs.len());
        for h in hubs {
            parts.push(format!(
                "{{name: {}, db: {}, fields: {}}}",
                quote_literal(&h.name)?,
                quote_literal(&h.db)?,
                fields_literal(&h.fields)?,
            ));
        }
        let list = format!("[{}]", parts.join(", "));
        Ok(cypher(
            graph,
            &format!(
                "UNWIND {list} AS hub \
                 CREATE (t:Table {{name: hub.name, db: hub.db}}) \
                 WITH t, hub \
                 UNWIND hub.fields AS fld \
                 CREATE (t)-[:ATTR]->(:Field {{name: fld.name, db: hub.db, dbtype: fld.dbtype}})"
            ),
        ))
    }

    pub fn create_sats(graph: &str, sats: &[SatPayload]) -> Result<String, Error> {
        let (linked, unlinked): (Vec<_>, Vec<_>) = sats.iter().partition(|s| s.link.is_some());
        let mut statements = Vec::new();
        if !unlinked.is_empty() {
            statements.push(Self::create_unlinked(graph, "Table", &unlinked.iter().map(|s| (&s.name, &s.db, &s.fields)).collect::<Vec<_>>())?);
        }
        for s in &linked {
            let link = s.link.as_ref().unwrap();
            statements.push(cypher(
                graph,
                &format!(
                    "MATCH (hub:Table {{name: {}}}) \
                     CREATE (sat:Table {{name: {}, db: {}}}) \
                     CREATE (hub)-[:ONE_TO_MANY {{on: [{}, {}]}}]->(sat) \
                     WITH sat \
                     UNWIND {} AS fld \
                     CREATE (sat)-[:ATTR]->(:Field {{name: fld.name, db: {}, dbtype: fld.dbtype}})",
                    quote_literal(&link.ref_table)?,
                    quote_literal(&s.name)?,
                    quote_literal(&s.db)?,
                    quote_literal(&link.ref_table_pk)?,
                    quote_literal(&link.fk)?,
                    fields_literal(&s.fields)?,
                    quote_literal(&s.db)?,
                ),
            ));
        }
        Ok(statements.join("; "))
    }

    pub fn create_links(graph: &str, links: &[LinkPayload]) -> Result<String, Error> {
        let (linked, unlinked): (Vec<_>, Vec<_>) = links
            .iter()
            .partition(|l| l.main_link.is_some() && l.paired_link.is_some());
        let mut statements = Vec::new();
        if !unlinked.is_empty() {
            statements.push(Self::create_unlinked(graph, "Table", &unlinked.iter().map(|l| (&l.name, &l.db, &l.fields)).collect::<Vec<_>>())?);
        }
        for l in &linked {
            let main = l.main_link.as_ref().unwrap();
            let paired = l.paired_link.as_ref().unwrap();
            statements.push(cypher(
                graph,
                &format!(
                    "MATCH (hub1:Table {{name: {}}}), (hub2:Table {{name: {}}}) \
                     CREATE (link:Table {{name: {}, db: {}}}) \
                     CREATE (hub1)-[:ONE_TO_MANY {{on: [{}, {}]}}]->(link) \
                     CREATE (link)-[:MANY_TO_ONE {{on: [{}, {}]}}]->(hub1) \
                     CREATE (hub2)-[:ONE_TO_MANY {{on: [{}, {}]}}]->(link) \
                     CREATE (link)-[:MANY_TO_ONE {{on: [{}, {}]}}]->(hub2) \
                     WITH link \
                     UNWIND {} AS fld \
                     CREATE (link)-[:ATTR]->(:Field {{name: fld.name, db: {}, dbtype: fld.dbtype}})",
                    quote_literal(&main.ref_table)?,
                    quote_literal(&paired.ref_table)?,
                    quote_literal(&l.name)?,
                    quote_literal(&l.db)?,
                    quote_literal(&main.ref_table_pk)?,
                    quote_literal(&main.fk)?,
                    quote_literal(&main.ref_table_pk)?,
                    quote_literal(&main.fk)?,
                    quote_literal(&paired.ref_table_pk)?,
                    quote_literal(&paired.fk)?,
                    quote_literal(&paired.ref_table_pk)?,
                    quote_literal(&paired.fk)?,
                    fields_literal(&l.fields)?,
                    quote_literal(&l.db)?,
                ),
            ));
        }
        Ok(statements.join("; "))
    }

    fn create_unlinked(
        graph: &str,
        label: &str,
        nodes: &[(&String, &String, &Vec<FieldPayload>)],
    ) -> Result<String, Error> {
        let mut parts = Vec::with_capacity(nodes.len());
        for (name, db, fields) in nodes {
            parts.push(format!(
                "{{name: {}, db: {}, fields: {}}}",
                quote_literal(name)?,
                quote_literal(db)?,
                fields_literal(fields)?,
            ));
        }
        let list = format!("[{}]", parts.join(", "));
        Ok(cypher(
            graph,
            &format!(
                "UNWIND {list} AS node \
                 CREATE (t:{label} {{name: node.name, db: node.db}}) \
                 WITH t, node \
                 UNWIND node.fields AS fld \
                 CREATE (t)-[:ATTR]->(:Field {{name: fld.name, db: node.db, dbtype: fld.dbtype}})"
            ),
        ))
    }

    pub fn delete_tables(graph: &str, names: &[String]) -> Result<String, Error> {
        let mut quoted = Vec::with_capacity(names.len());
        for n in names {
            quoted.push(quote_literal(n)?);
        }
        let list = format!("[{}]", quoted.join(", "));
        Ok(cypher(
            graph,
            &format!(
                "MATCH (t:Table) WHERE t.name IN {list} \
                 OPTIONAL MATCH (t)-[:ATTR]->(f:Field) \
                 DETACH DELETE t, f"
            ),
        ))
    }

    pub fn create_fields(graph: &str, table: &str, fields: &[FieldPayload]) -> Result<String, Error> {
        Ok(cypher(
            graph,
            &format!(
                "MATCH (t:Table {{name: {}}}) \
                 UNWIND {} AS fld \
                 CREATE (t)-[:ATTR]->(:Field {{name: fld.name, db: t.db, dbtype: fld.dbtype}})",
                quote_literal(table)?,
                fields_literal(fields)?,
            ),
        ))
    }

    pub fn delete_fields(graph: &str, table: &str, field_names: &[String]) -> Result<String, Error> {
        let mut quoted = Vec::with_capacity(field_names.len());
        for n in field_names {
            quoted.push(quote_literal(n)?);
        }
        let list = format!("[{}]", quoted.join(", "));
        Ok(cypher(
            graph,
            &format!(
                "MATCH (t:Table {{name: {}}})-[:ATTR]->(f:Field) WHERE f.name IN {list} \
                 DETACH DELETE f",
                quote_literal(table)?,
            ),
        ))
    }

    pub fn alter_fields(graph: &str, table: &str, fields: &[FieldAlter]) -> Result<String, Error> {
        let mut parts = Vec::with_capacity(fields.len());
        for f in fields {
            parts.push(format!(
                "{{name: {}, new_type: {}}}",
                quote_literal(&f.name)?,
                quote_literal(&f.new_type)?,
            ));
        }
        let list = format!("[{}]", parts.join(", "));
        Ok(cypher(
            graph,
            &format!(
                "MATCH (t:Table {{name: {}}})-[:ATTR]->(f:Field) \
                 UNWIND {} AS upd WITH f, upd WHERE f.name = upd.name \
                 SET f.dbtype = upd.new_type",
                quote_literal(table)?,
                list,
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_literal_escapes_quotes_and_backslashes() {
        assert_eq!(quote_literal("o'brien").unwrap(), "'o\\'brien'");
        assert_eq!(quote_literal("a\\b").unwrap(), "'a\\\\b'");
    }

    #[test]
    fn quote_literal_rejects_nul_bytes() {
        assert!(quote_literal("bad\0value").is_err());
    }

    #[test]
    fn delete_tables_embeds_quoted_names() {
        let q = QueryBuilder::delete_tables("ns", &["legacy_sat".to_string()]).unwrap();
        assert!(q.contains("'legacy_sat'"));
        assert!(q.contains("DETACH DELETE"));
    }
}
