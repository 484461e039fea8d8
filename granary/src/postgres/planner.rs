//! SQL planner: pure functions mapping grouped operations to statements.
//!
//! Every function here returns `(statement, parameters)` pairs and never
//! executes anything. The executor owns dispatch, embedding calls, and row
//! decoding. Plans are ordinary data so tests can assert on them directly.

use std::collections::HashMap;

use pgvector::Vector;
use serde_json::Value;
use tokio_postgres::types::ToSql;

use crate::embed::StoreIndex;
use crate::error::StoreError;
use crate::store::namespace::{encode_namespace, validate_namespace, Namespace};
use crate::store::ops::{
    FilterOp, GetOp, IndexPolicy, ListNamespacesOp, MatchCondition, NamespaceMatchType, PutOp,
    SearchOp,
};
use crate::store::path::{get_text_at_path, tokenize_path, PathSegment};

/// A parameter bound to a planned statement.
///
/// Kept as plain data (instead of boxed `ToSql` objects) so plans compare
/// and print in tests; [`SqlParam::as_sql`] borrows the driver trait object
/// at dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlParam {
    Text(String),
    TextArray(Vec<String>),
    Json(Value),
    Int(i64),
    Float(f64),
    Vector(Vector),
    /// Slot for a query vector the executor fills after the batched
    /// embedding call.
    QueryVectorSlot,
}

impl SqlParam {
    pub fn as_sql(&self) -> Result<&(dyn ToSql + Sync), StoreError> {
        match self {
            SqlParam::Text(v) => Ok(v),
            SqlParam::TextArray(v) => Ok(v),
            SqlParam::Json(v) => Ok(v),
            SqlParam::Int(v) => Ok(v),
            SqlParam::Float(v) => Ok(v),
            SqlParam::Vector(v) => Ok(v),
            SqlParam::QueryVectorSlot => Err(StoreError::Config(
                "query vector slot was never resolved".to_string(),
            )),
        }
    }
}

pub(crate) type Statement = (String, Vec<SqlParam>);

/// Appends a parameter and returns its 1-based placeholder number.
fn push(params: &mut Vec<SqlParam>, param: SqlParam) -> usize {
    params.push(param);
    params.len()
}

// --- Get ---

/// One statement per namespace, answering every requested key in it.
#[derive(Debug)]
pub(crate) struct GetPlan {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub namespace: Namespace,
    /// `(result index, key)` pairs this statement answers.
    pub requests: Vec<(usize, String)>,
}

pub(crate) fn plan_get_ops(ops: &[(usize, GetOp)]) -> Vec<GetPlan> {
    let mut groups: Vec<(String, Namespace, Vec<(usize, String)>)> = Vec::new();
    let mut at: HashMap<String, usize> = HashMap::new();
    for (idx, op) in ops {
        let prefix = encode_namespace(&op.namespace);
        let slot = *at.entry(prefix.clone()).or_insert_with(|| {
            groups.push((prefix, op.namespace.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].2.push((*idx, op.key.clone()));
    }
    groups
        .into_iter()
        .map(|(prefix, namespace, requests)| {
            let keys: Vec<String> = requests.iter().map(|(_, key)| key.clone()).collect();
            GetPlan {
                sql: "SELECT key, value, created_at, updated_at FROM store \
                      WHERE prefix = $1 AND key = ANY($2)"
                    .to_string(),
                params: vec![SqlParam::Text(prefix), SqlParam::TextArray(keys)],
                namespace,
                requests,
            }
        })
        .collect()
}

// --- Put ---

/// One document text to embed for a `(prefix, key, field_name)` vector row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EmbedDocRow {
    pub prefix: String,
    pub key: String,
    pub field_name: String,
    pub text: String,
}

/// Planned writes for a put group.
#[derive(Debug)]
pub(crate) struct PutPlan {
    /// Item-table statements: per-namespace deletes, then one multi-row
    /// upsert.
    pub statements: Vec<Statement>,
    /// Texts the executor must embed before the vector upsert.
    pub embedding_rows: Vec<EmbedDocRow>,
    /// `(prefix, key)` pairs whose existing vector rows must be scrubbed.
    pub scrub_keys: Vec<(String, String)>,
}

pub(crate) fn plan_put_ops(
    ops: &[(usize, PutOp)],
    index: Option<&StoreIndex>,
) -> Result<PutPlan, StoreError> {
    // Later-in-batch wins: collapse repeated (namespace, key) to the last op
    // while keeping first-seen order for deterministic statements.
    let mut slots: Vec<&PutOp> = Vec::new();
    let mut at: HashMap<(String, String), usize> = HashMap::new();
    for (_, op) in ops {
        validate_namespace(&op.namespace)?;
        let id = (encode_namespace(&op.namespace), op.key.clone());
        match at.get(&id) {
            Some(&slot) => slots[slot] = op,
            None => {
                at.insert(id, slots.len());
                slots.push(op);
            }
        }
    }

    let mut delete_groups: Vec<(String, Vec<String>)> = Vec::new();
    let mut delete_at: HashMap<String, usize> = HashMap::new();
    let mut upserts: Vec<(String, String, &Value, &PutOp)> = Vec::new();
    for &op in &slots {
        let prefix = encode_namespace(&op.namespace);
        match &op.value {
            None => {
                let slot = *delete_at.entry(prefix.clone()).or_insert_with(|| {
                    delete_groups.push((prefix, Vec::new()));
                    delete_groups.len() - 1
                });
                delete_groups[slot].1.push(op.key.clone());
            }
            Some(value) => upserts.push((prefix, op.key.clone(), value, op)),
        }
    }

    let mut statements: Vec<Statement> = Vec::new();
    for (prefix, keys) in delete_groups {
        statements.push((
            "DELETE FROM store WHERE prefix = $1 AND key = ANY($2)".to_string(),
            vec![SqlParam::Text(prefix), SqlParam::TextArray(keys)],
        ));
    }
    if !upserts.is_empty() {
        let mut rows = Vec::with_capacity(upserts.len());
        let mut params = Vec::with_capacity(upserts.len() * 3);
        for (i, (prefix, key, value, _)) in upserts.iter().enumerate() {
            let base = i * 3;
            rows.push(format!("(${}, ${}, ${}, now(), now())", base + 1, base + 2, base + 3));
            params.push(SqlParam::Text(prefix.clone()));
            params.push(SqlParam::Text(key.clone()));
            params.push(SqlParam::Json((*value).clone()));
        }
        statements.push((
            format!(
                "INSERT INTO store (prefix, key, value, created_at, updated_at) VALUES {} \
                 ON CONFLICT (prefix, key) DO UPDATE \
                 SET value = EXCLUDED.value, updated_at = now()",
                rows.join(", ")
            ),
            params,
        ));
    }

    if index.is_none() {
        if let Some(op) = slots
            .iter()
            .find(|op| op.value.is_some() && matches!(op.index, IndexPolicy::Paths(_)))
        {
            return Err(StoreError::MissingEmbedder(format!(
                "put for key {:?} requests index paths but the store has no index configuration",
                op.key
            )));
        }
    }

    let mut embedding_rows = Vec::new();
    let mut scrub_keys = Vec::new();
    if let Some(index) = index {
        for (prefix, key, value, op) in &upserts {
            // Every re-put invalidates previous vectors, index-disabled puts
            // included.
            scrub_keys.push((prefix.clone(), key.clone()));
            let paths: Vec<(String, Vec<PathSegment>)> = match &op.index {
                IndexPolicy::Disabled => continue,
                IndexPolicy::Default => index.default_fields.clone(),
                IndexPolicy::Paths(paths) => paths
                    .iter()
                    .map(|p| Ok((p.clone(), tokenize_path(p)?)))
                    .collect::<Result<_, StoreError>>()?,
            };
            for (path, segments) in &paths {
                let mut texts = get_text_at_path(value, segments);
                if texts.len() == 1 {
                    embedding_rows.push(EmbedDocRow {
                        prefix: prefix.clone(),
                        key: key.clone(),
                        field_name: path.clone(),
                        text: texts.pop().unwrap_or_default(),
                    });
                } else {
                    for (position, text) in texts.into_iter().enumerate() {
                        embedding_rows.push(EmbedDocRow {
                            prefix: prefix.clone(),
                            key: key.clone(),
                            field_name: format!("{}.{}", path, position),
                            text,
                        });
                    }
                }
            }
        }
    }

    Ok(PutPlan {
        statements,
        embedding_rows,
        scrub_keys,
    })
}

/// Removes every vector row belonging to the given `(prefix, key)` pairs.
pub(crate) fn plan_vector_scrub(keys: &[(String, String)]) -> Statement {
    let mut rows = Vec::with_capacity(keys.len());
    let mut params = Vec::with_capacity(keys.len() * 2);
    for (i, (prefix, key)) in keys.iter().enumerate() {
        rows.push(format!("(${}, ${})", i * 2 + 1, i * 2 + 2));
        params.push(SqlParam::Text(prefix.clone()));
        params.push(SqlParam::Text(key.clone()));
    }
    (
        format!(
            "DELETE FROM store_vectors WHERE (prefix, key) IN ({})",
            rows.join(", ")
        ),
        params,
    )
}

/// One multi-row vector upsert, pairing planned rows with freshly computed
/// vectors. Fails when the embedder broke alignment or dimensions.
pub(crate) fn plan_vector_upsert(
    rows: &[EmbedDocRow],
    vectors: Vec<Vec<f32>>,
    dims: usize,
) -> Result<Statement, StoreError> {
    if vectors.len() != rows.len() {
        return Err(StoreError::Embedding(format!(
            "embedder returned {} vectors for {} texts",
            vectors.len(),
            rows.len()
        )));
    }
    let mut clauses = Vec::with_capacity(rows.len());
    let mut params = Vec::with_capacity(rows.len() * 4);
    for (i, (row, vector)) in rows.iter().zip(vectors).enumerate() {
        if vector.len() != dims {
            return Err(StoreError::Embedding(format!(
                "embedder returned a {}-dimensional vector, expected {}",
                vector.len(),
                dims
            )));
        }
        let base = i * 4;
        clauses.push(format!(
            "(${}, ${}, ${}, ${})",
            base + 1,
            base + 2,
            base + 3,
            base + 4
        ));
        params.push(SqlParam::Text(row.prefix.clone()));
        params.push(SqlParam::Text(row.key.clone()));
        params.push(SqlParam::Text(row.field_name.clone()));
        params.push(SqlParam::Vector(Vector::from(vector)));
    }
    Ok((
        format!(
            "INSERT INTO store_vectors (prefix, key, field_name, embedding) VALUES {} \
             ON CONFLICT (prefix, key, field_name) DO UPDATE \
             SET embedding = EXCLUDED.embedding",
            clauses.join(", ")
        ),
        params,
    ))
}

// --- Search ---

/// One statement per search op.
#[derive(Debug)]
pub(crate) struct SearchPlan {
    pub sql: String,
    pub params: Vec<SqlParam>,
    /// Position 0 holds a [`SqlParam::QueryVectorSlot`] the executor must
    /// fill before dispatch.
    pub needs_query_vector: bool,
}

pub(crate) fn plan_search_ops(
    ops: &[(usize, SearchOp)],
    index: Option<&StoreIndex>,
) -> Result<Vec<SearchPlan>, StoreError> {
    ops.iter()
        .map(|(_, op)| match (&op.options.query, index) {
            (Some(_), Some(_)) => plan_vector_search(op),
            (Some(query), None) => Err(StoreError::MissingEmbedder(format!(
                "search query {:?} requires an index configuration",
                query
            ))),
            (None, _) => plan_scan_search(op),
        })
        .collect()
}

fn namespace_prefix_clause(
    namespace_prefix: &[String],
    column: &str,
    params: &mut Vec<SqlParam>,
) -> Option<String> {
    if namespace_prefix.is_empty() {
        return None;
    }
    let prefix = encode_namespace(namespace_prefix);
    let exact = push(params, SqlParam::Text(prefix.clone()));
    let nested = push(params, SqlParam::Text(format!("{}.%", prefix)));
    Some(format!(
        "({column} = ${exact} OR {column} LIKE ${nested})",
        column = column,
        exact = exact,
        nested = nested
    ))
}

fn compile_filters(
    filter: Option<&HashMap<String, FilterOp>>,
    column: &str,
    params: &mut Vec<SqlParam>,
) -> Result<Vec<String>, StoreError> {
    let filter = match filter {
        Some(filter) if !filter.is_empty() => filter,
        _ => return Ok(Vec::new()),
    };
    // Stable clause order regardless of map iteration order.
    let mut fields: Vec<&String> = filter.keys().collect();
    fields.sort();
    let mut clauses = Vec::with_capacity(fields.len());
    for field in fields {
        let pred = &filter[field];
        clauses.push(compile_filter(field, pred, column, params)?);
    }
    Ok(clauses)
}

fn compile_filter(
    field: &str,
    pred: &FilterOp,
    column: &str,
    params: &mut Vec<SqlParam>,
) -> Result<String, StoreError> {
    let numeric = |value: &Value| {
        value.as_f64().ok_or_else(|| {
            StoreError::Config(format!(
                "filter on {:?} requires a numeric operand, got {}",
                field, value
            ))
        })
    };
    let scalar_text = |value: &Value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(match pred {
        FilterOp::Eq(value) => {
            let mut object = serde_json::Map::new();
            object.insert(field.to_string(), value.clone());
            let n = push(params, SqlParam::Json(Value::Object(object)));
            format!("{} @> ${}::jsonb", column, n)
        }
        FilterOp::Ne(value) => {
            let k = push(params, SqlParam::Text(field.to_string()));
            let v = push(params, SqlParam::Text(scalar_text(value)));
            format!("({} ->> ${}) IS DISTINCT FROM ${}", column, k, v)
        }
        FilterOp::Gt(value) => numeric_clause(column, field, ">", numeric(value)?, params),
        FilterOp::Gte(value) => numeric_clause(column, field, ">=", numeric(value)?, params),
        FilterOp::Lt(value) => numeric_clause(column, field, "<", numeric(value)?, params),
        FilterOp::Lte(value) => numeric_clause(column, field, "<=", numeric(value)?, params),
    })
}

fn numeric_clause(
    column: &str,
    field: &str,
    op: &str,
    operand: f64,
    params: &mut Vec<SqlParam>,
) -> String {
    let k = push(params, SqlParam::Text(field.to_string()));
    let v = push(params, SqlParam::Float(operand));
    format!("({} ->> ${})::float8 {} ${}", column, k, op, v)
}

fn plan_scan_search(op: &SearchOp) -> Result<SearchPlan, StoreError> {
    let mut params = Vec::new();
    let mut wheres = Vec::new();
    if let Some(clause) = namespace_prefix_clause(&op.namespace_prefix, "s.prefix", &mut params) {
        wheres.push(clause);
    }
    wheres.extend(compile_filters(
        op.options.filter.as_ref(),
        "s.value",
        &mut params,
    )?);
    let where_sql = if wheres.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", wheres.join(" AND "))
    };
    let limit = push(&mut params, SqlParam::Int(op.options.limit as i64));
    let offset = push(&mut params, SqlParam::Int(op.options.offset as i64));
    Ok(SearchPlan {
        sql: format!(
            "SELECT s.prefix, s.key, s.value, s.created_at, s.updated_at FROM store s{} \
             ORDER BY s.updated_at DESC, s.key ASC LIMIT ${} OFFSET ${}",
            where_sql, limit, offset
        ),
        params,
        needs_query_vector: false,
    })
}

fn plan_vector_search(op: &SearchOp) -> Result<SearchPlan, StoreError> {
    let mut params = Vec::new();
    let slot = push(&mut params, SqlParam::QueryVectorSlot);
    let vec_where =
        match namespace_prefix_clause(&op.namespace_prefix, "prefix", &mut params) {
            Some(clause) => format!(" WHERE {}", clause),
            None => String::new(),
        };
    let filters = compile_filters(op.options.filter.as_ref(), "s.value", &mut params)?;
    let outer_where = if filters.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", filters.join(" AND "))
    };
    let limit = push(&mut params, SqlParam::Int(op.options.limit as i64));
    let offset = push(&mut params, SqlParam::Int(op.options.offset as i64));
    Ok(SearchPlan {
        sql: format!(
            "WITH scored AS (\
               SELECT prefix, key, MIN(embedding <=> ${slot}::vector) AS distance \
               FROM store_vectors{vec_where} GROUP BY prefix, key\
             ) \
             SELECT s.prefix, s.key, s.value, s.created_at, s.updated_at, \
                    (1.0 - sc.distance)::float8 AS score \
             FROM scored sc \
             JOIN store s ON s.prefix = sc.prefix AND s.key = sc.key{outer_where} \
             ORDER BY score DESC, s.updated_at DESC, s.key ASC \
             LIMIT ${limit} OFFSET ${offset}",
            slot = slot,
            vec_where = vec_where,
            outer_where = outer_where,
            limit = limit,
            offset = offset
        ),
        params,
        needs_query_vector: true,
    })
}

// --- ListNamespaces ---

pub(crate) fn plan_list_namespaces_ops(ops: &[(usize, ListNamespacesOp)]) -> Vec<Statement> {
    ops.iter()
        .map(|(_, op)| {
            let mut params = Vec::new();
            let mut wheres = Vec::new();
            for condition in &op.options.match_conditions {
                let n = push(
                    &mut params,
                    SqlParam::Text(namespace_match_regex(condition)),
                );
                wheres.push(format!("prefix ~ ${}", n));
            }
            let where_sql = if wheres.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", wheres.join(" AND "))
            };
            // max_depth is a trusted small integer; inlined because array
            // slice bounds do not take bigint parameters.
            let truncated = match op.options.max_depth {
                Some(depth) => format!(
                    "array_to_string((string_to_array(prefix, '.'))[1:{}], '.')",
                    depth
                ),
                None => "prefix".to_string(),
            };
            let limit = push(&mut params, SqlParam::Int(op.options.limit as i64));
            let offset = push(&mut params, SqlParam::Int(op.options.offset as i64));
            (
                format!(
                    "SELECT DISTINCT {} AS truncated_prefix FROM store{} \
                     ORDER BY truncated_prefix LIMIT ${} OFFSET ${}",
                    truncated, where_sql, limit, offset
                ),
                params,
            )
        })
        .collect()
}

/// Compiles a match condition to an anchored POSIX regex over the
/// `.`-joined namespace path. `*` matches exactly one label.
fn namespace_match_regex(condition: &MatchCondition) -> String {
    let body = condition
        .path
        .iter()
        .map(|label| {
            if label == "*" {
                "[^.]+".to_string()
            } else {
                regex::escape(label)
            }
        })
        .collect::<Vec<_>>()
        .join("\\.");
    match condition.match_type {
        NamespaceMatchType::Prefix => format!("^{}(\\..*)?$", body),
        NamespaceMatchType::Suffix => format!("(^|.*\\.){}$", body),
    }
}
