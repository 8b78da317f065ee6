//! Vector store query model
//!
//! A query carries an optional similarity clause, a function-name scope,
//! equality filters over record fields (falling back to tag keys), a limit
//! and an optional sort. Stores return [`Scored`] items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use spanvec_core::{EmbeddingVector, ExecutionRecord, FunctionDefinition, Timestamp};
use std::cmp::Ordering;
use std::collections::BTreeMap;

// ============================================================================
// QUERY TYPES
// ============================================================================

/// How candidates are scored.
#[derive(Debug, Clone, PartialEq)]
pub enum Similarity {
    /// No scoring; only filters, sort and limit apply
    None,
    /// Cosine similarity against stored vectors
    Vector(EmbeddingVector),
    /// Keyword overlap against the record's search text
    Text(String),
    /// `alpha * vector + (1 - alpha) * keyword`
    Hybrid {
        text: String,
        vector: EmbeddingVector,
        alpha: f32,
    },
}

/// Sort instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub ascending: bool,
}

/// A vector store query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub similarity: Similarity,
    /// Restrict to records of this qualified function name
    pub function_name: Option<String>,
    /// Equality filters: record field first, tag key otherwise
    pub filters: BTreeMap<String, Value>,
    pub limit: usize,
    pub sort: Option<SortSpec>,
}

impl VectorQuery {
    /// Unscored query returning at most `limit` items.
    pub fn new(limit: usize) -> Self {
        Self {
            similarity: Similarity::None,
            function_name: None,
            filters: BTreeMap::new(),
            limit,
            sort: None,
        }
    }

    pub fn nearest(vector: EmbeddingVector, limit: usize) -> Self {
        Self {
            similarity: Similarity::Vector(vector),
            ..Self::new(limit)
        }
    }

    pub fn keyword(text: impl Into<String>, limit: usize) -> Self {
        Self {
            similarity: Similarity::Text(text.into()),
            ..Self::new(limit)
        }
    }

    pub fn hybrid(text: impl Into<String>, vector: EmbeddingVector, alpha: f32, limit: usize) -> Self {
        Self {
            similarity: Similarity::Hybrid {
                text: text.into(),
                vector,
                alpha: alpha.clamp(0.0, 1.0),
            },
            ..Self::new(limit)
        }
    }

    pub fn for_function(mut self, function_name: impl Into<String>) -> Self {
        self.function_name = Some(function_name.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort = Some(SortSpec {
            field: field.into(),
            ascending,
        });
        self
    }
}

/// A query result with its similarity score (absent for unscored queries).
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<T> {
    pub item: T,
    pub score: Option<f32>,
}

// ============================================================================
// QUERYABLE RECORDS
// ============================================================================

/// Record types a store can filter, score and sort.
pub trait Queryable: Clone + Send + Sync {
    /// Qualified function name the record belongs to.
    fn function_name(&self) -> &str;

    /// Flat property map used for filters and sorting.
    fn properties(&self) -> Map<String, Value>;

    /// Stored vector, if any.
    fn vector(&self) -> Option<&EmbeddingVector>;

    /// Text used for keyword scoring.
    fn search_text(&self) -> String;

    /// Recency key for default ordering and tie-breaks.
    fn recency(&self) -> Timestamp;
}

impl Queryable for ExecutionRecord {
    fn function_name(&self) -> &str {
        &self.function_name
    }

    fn properties(&self) -> Map<String, Value> {
        let mut props = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        props.remove("vector");
        props.remove("failure");
        props.remove("tags");
        props.insert(
            "error_code".to_string(),
            self.failure
                .as_ref()
                .map(|f| Value::String(f.error_code.clone()))
                .unwrap_or(Value::Null),
        );
        props.insert(
            "error_message".to_string(),
            self.failure
                .as_ref()
                .map(|f| Value::String(f.error_message.clone()))
                .unwrap_or(Value::Null),
        );
        props.insert("cache_hit".to_string(), Value::Bool(self.cache_hit.is_some()));
        for (key, value) in self.tags.iter() {
            props.entry(key.to_string()).or_insert_with(|| value.to_json());
        }
        props
    }

    fn vector(&self) -> Option<&EmbeddingVector> {
        self.vector.as_ref()
    }

    fn search_text(&self) -> String {
        let mut text = self.function_name.clone();
        if let Some(args) = &self.arguments {
            text.push(' ');
            text.push_str(&args.to_string());
        }
        if let Some(failure) = &self.failure {
            text.push(' ');
            text.push_str(&failure.error_message);
        }
        text
    }

    fn recency(&self) -> Timestamp {
        self.completed_at
    }
}

impl Queryable for FunctionDefinition {
    fn function_name(&self) -> &str {
        &self.qualified_name
    }

    fn properties(&self) -> Map<String, Value> {
        let mut props = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        props.remove("vector");
        props
    }

    fn vector(&self) -> Option<&EmbeddingVector> {
        self.vector.as_ref()
    }

    fn search_text(&self) -> String {
        FunctionDefinition::search_text(self)
    }

    fn recency(&self) -> Timestamp {
        self.created_at
    }
}

// ============================================================================
// SCORING AND ORDERING
// ============================================================================

/// Fraction of distinct query tokens present in `document`, in [0, 1].
pub fn keyword_score(query: &str, document: &str) -> f32 {
    let doc_tokens: std::collections::HashSet<String> = tokenize(document).collect();
    let query_tokens: std::collections::HashSet<String> = tokenize(query).collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let matched = query_tokens
        .iter()
        .filter(|t| doc_tokens.contains(*t))
        .count();
    matched as f32 / query_tokens.len() as f32
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Score a record against a similarity clause.
///
/// Returns `None` when the record cannot match (no vector for a vector query,
/// no keyword overlap for a keyword query).
pub fn score<T: Queryable>(similarity: &Similarity, item: &T) -> Option<Option<f32>> {
    match similarity {
        Similarity::None => Some(None),
        Similarity::Vector(query) => {
            let stored = item.vector()?;
            let s = query.cosine_similarity(stored).ok()?;
            Some(Some(s))
        }
        Similarity::Text(text) => {
            let s = keyword_score(text, &item.search_text());
            (s > 0.0).then_some(Some(s))
        }
        Similarity::Hybrid {
            text,
            vector,
            alpha,
        } => {
            let vector_score = item
                .vector()
                .and_then(|stored| vector.cosine_similarity(stored).ok())
                .unwrap_or(0.0);
            let text_score = keyword_score(text, &item.search_text());
            let combined = alpha * vector_score + (1.0 - alpha) * text_score;
            (combined > 0.0).then_some(Some(combined))
        }
    }
}

/// Whether every filter matches. Record fields shadow tag keys.
pub fn matches_filters(props: &Map<String, Value>, filters: &BTreeMap<String, Value>) -> bool {
    filters.iter().all(|(field, expected)| {
        let actual = props.get(field).unwrap_or(&Value::Null);
        values_equal(actual, expected)
    })
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(items), scalar) if !scalar.is_array() => {
            items.iter().any(|item| values_equal(item, scalar))
        }
        _ => actual == expected,
    }
}

/// Total order over JSON values for sorting. Timestamps compare
/// chronologically; null sorts first.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => match (parse_time(x), parse_time(y)) {
            (Some(tx), Some(ty)) => tx.cmp(&ty),
            _ => x.cmp(y),
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Evaluate a query over an in-memory snapshot.
pub fn evaluate<T: Queryable>(query: &VectorQuery, items: Vec<T>) -> Vec<Scored<T>> {
    let mut hits: Vec<(Scored<T>, Map<String, Value>)> = items
        .into_iter()
        .filter(|item| {
            query
                .function_name
                .as_deref()
                .map_or(true, |name| item.function_name() == name)
        })
        .filter_map(|item| {
            let props = item.properties();
            if !matches_filters(&props, &query.filters) {
                return None;
            }
            let score = score(&query.similarity, &item)?;
            Some((Scored { item, score }, props))
        })
        .collect();

    match &query.sort {
        Some(sort) => hits.sort_by(|(a, pa), (b, pb)| {
            let va = pa.get(&sort.field).unwrap_or(&Value::Null);
            let vb = pb.get(&sort.field).unwrap_or(&Value::Null);
            let ord = compare_values(va, vb);
            let ord = if sort.ascending { ord } else { ord.reverse() };
            ord.then_with(|| b.item.recency().cmp(&a.item.recency()))
        }),
        None => hits.sort_by(|(a, _), (b, _)| {
            let by_score = match (a.score, b.score) {
                (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            };
            by_score.then_with(|| b.item.recency().cmp(&a.item.recency()))
        }),
    }

    hits.into_iter()
        .take(query.limit)
        .map(|(scored, _)| scored)
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
