//! Tag resolution against the property schema.
//!
//! Process-wide tags come from the environment (keyed by the upper-cased
//! schema key) or from explicit values given at startup. Call-specific tags
//! are given at wrap time. Both sources are validated once, when they are
//! supplied; per-call resolution is a pure merge that cannot fail.

use spanvec_core::{PropertySchema, ResolvedTagSet, TagValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Process-wide tag values before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalTags {
    values: BTreeMap<String, TagValue>,
}

impl GlobalTags {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read a value for every schema key from the variable named after the
    /// upper-cased key (`run_id` reads `RUN_ID`).
    pub fn from_env(schema: &PropertySchema) -> Self {
        Self::from_lookup(schema, |name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(schema: &PropertySchema, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let values = schema
            .keys()
            .filter_map(|key| {
                lookup(&key.to_uppercase()).map(|raw| (key.to_string(), TagValue::Text(raw)))
            })
            .collect();
        Self { values }
    }

    /// Explicit process-wide values. Keys need not be in the schema; unknown
    /// keys are dropped (with a warning) when the resolver is built.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<TagValue>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Add or replace one value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Merge process-wide and call-specific tags under a schema.
///
/// For every schema key the call-specific value wins, then the process-wide
/// value; keys with neither are absent. Keys not in the schema never appear
/// in the result.
pub fn resolve_tags(
    global: &ResolvedTagSet,
    call: &ResolvedTagSet,
    schema: &PropertySchema,
) -> ResolvedTagSet {
    let mut resolved = ResolvedTagSet::new();
    for key in schema.keys() {
        if let Some(value) = call.get(key).or_else(|| global.get(key)) {
            resolved.insert(key, value.clone());
        }
    }
    resolved
}

/// Validates tag sources against the schema and resolves per-call tags.
#[derive(Debug, Clone)]
pub struct TagResolver {
    schema: Arc<PropertySchema>,
    global: ResolvedTagSet,
}

impl TagResolver {
    /// Validate the process-wide tags. Unknown keys and values that do not
    /// fit their declared type are dropped with a warning.
    pub fn new(schema: Arc<PropertySchema>, global: GlobalTags) -> Self {
        let global = validate(&schema, global.values, "process-wide", None);
        Self { schema, global }
    }

    pub fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    /// Validated process-wide tags.
    pub fn global(&self) -> &ResolvedTagSet {
        &self.global
    }

    /// Validate the tags declared when wrapping `function`. Called once per
    /// wrap, so each offending key is warned about once.
    pub fn prepare_call_tags(
        &self,
        function: &str,
        tags: BTreeMap<String, TagValue>,
    ) -> ResolvedTagSet {
        validate(&self.schema, tags, "call-specific", Some(function))
    }

    /// Resolve the tag set for one execution.
    pub fn resolve(&self, call: &ResolvedTagSet) -> ResolvedTagSet {
        resolve_tags(&self.global, call, &self.schema)
    }
}

fn validate(
    schema: &PropertySchema,
    tags: BTreeMap<String, TagValue>,
    source: &str,
    function: Option<&str>,
) -> ResolvedTagSet {
    let mut valid = ResolvedTagSet::new();
    for (key, value) in tags {
        let Some(definition) = schema.get(&key) else {
            tracing::warn!(
                key = %key,
                source,
                function = function.unwrap_or("-"),
                "Tag key not declared in property schema, dropped"
            );
            continue;
        };
        match definition.data_type.coerce(&key, value) {
            Ok(value) => valid.insert(key, value),
            Err(e) => tracing::warn!(
                error = %e,
                source,
                function = function.unwrap_or("-"),
                "Tag value does not match its declared type, dropped"
            ),
        }
    }
    valid
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use spanvec_core::{PropertyDefinition, PropertyType};

    fn text_schema(keys: &[String]) -> PropertySchema {
        PropertySchema::from_definitions(
            keys.iter()
                .map(|k| (k.clone(), PropertyDefinition::new(PropertyType::Text))),
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Keys outside the schema never reach a resolved set.
        #[test]
        fn prop_resolved_keys_subset_of_schema(
            schema_keys in prop::collection::vec("[a-m]{1,6}", 0..5),
            global in prop::collection::btree_map("[a-z]{1,6}", "[a-z]{0,8}", 0..6),
            call in prop::collection::btree_map("[a-z]{1,6}", "[a-z]{0,8}", 0..6),
        ) {
            let schema = Arc::new(text_schema(&schema_keys));
            let resolver = TagResolver::new(schema.clone(), GlobalTags::from_pairs(global));
            let call = resolver.prepare_call_tags(
                "m::f",
                call.into_iter().map(|(k, v)| (k, TagValue::Text(v))).collect(),
            );
            let resolved = resolver.resolve(&call);
            for key in resolved.keys() {
                prop_assert!(schema.contains(key));
            }
        }

        /// A key present in both sources resolves to the call value.
        #[test]
        fn prop_call_value_wins(global_value in "[a-z]{1,8}", call_value in "[a-z]{1,8}") {
            let schema = Arc::new(text_schema(&["run_id".to_string()]));
            let resolver = TagResolver::new(
                schema,
                GlobalTags::empty().with("run_id", global_value),
            );
            let call = resolver.prepare_call_tags(
                "m::f",
                BTreeMap::from([("run_id".to_string(), TagValue::Text(call_value.clone()))]),
            );
            let resolved = resolver.resolve(&call);
            prop_assert_eq!(
                resolved.get("run_id"),
                Some(&TagValue::Text(call_value))
            );
        }
    }
}
