use crate::error::Result;
use crate::query::parser;
use crate::query::projection::ParsedProjection;
use crate::query::Expr;
use bson::{Bson, Document};
use std::fmt;

/// A raw find request, before validation.
///
/// Only the namespace and filter are mandatory; everything else defaults to
/// the empty document or zero.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub ns: String,
    pub filter: Document,
    pub sort: Document,
    pub projection: Document,
    pub skip: u64,
    pub limit: Option<u64>,
    pub hint: Document,
    pub explain: bool,
    pub show_disk_loc: bool,
    pub tailable: bool,
}

impl QueryRequest {
    pub fn new(ns: &str, filter: Document) -> Self {
        QueryRequest {
            ns: ns.to_string(),
            filter,
            ..Default::default()
        }
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = sort;
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = projection;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn hint(mut self, hint: Document) -> Self {
        self.hint = hint;
        self
    }

    pub fn explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }

    pub fn show_disk_loc(mut self, show_disk_loc: bool) -> Self {
        self.show_disk_loc = show_disk_loc;
        self
    }

    pub fn tailable(mut self, tailable: bool) -> Self {
        self.tailable = tailable;
        self
    }
}

/// A validated, normalised query: parsed filter tree, validated projection,
/// and the raw request. Immutable after construction.
#[derive(Debug, Clone)]
pub struct CanonicalQuery {
    request: QueryRequest,
    filter: Expr,
    projection: Option<ParsedProjection>,
}

impl CanonicalQuery {
    /// Validates the request: parses the filter and, when a projection was
    /// supplied, validates it against the filter document.
    pub fn canonicalize(request: QueryRequest) -> Result<CanonicalQuery> {
        let filter = parser::parse_conditions(&request.filter)?;
        let projection = if request.projection.is_empty() {
            None
        } else {
            Some(ParsedProjection::make(&request.projection, &request.filter)?)
        };

        Ok(CanonicalQuery {
            request,
            filter,
            projection,
        })
    }

    /// Convenience constructor for a filter-only query.
    pub fn from_filter(ns: &str, filter: Document) -> Result<CanonicalQuery> {
        Self::canonicalize(QueryRequest::new(ns, filter))
    }

    pub fn ns(&self) -> &str {
        &self.request.ns
    }

    pub fn filter(&self) -> &Expr {
        &self.filter
    }

    pub fn filter_doc(&self) -> &Document {
        &self.request.filter
    }

    pub fn sort(&self) -> &Document {
        &self.request.sort
    }

    pub fn projection(&self) -> Option<&ParsedProjection> {
        self.projection.as_ref()
    }

    pub fn skip(&self) -> u64 {
        self.request.skip
    }

    pub fn limit(&self) -> Option<u64> {
        self.request.limit
    }

    /// True when the request carries a positive numeric limit.
    pub fn has_positive_limit(&self) -> bool {
        matches!(self.request.limit, Some(n) if n > 0)
    }

    pub fn hint(&self) -> &Document {
        &self.request.hint
    }

    pub fn is_explain(&self) -> bool {
        self.request.explain
    }

    pub fn show_disk_loc(&self) -> bool {
        self.request.show_disk_loc
    }

    pub fn is_tailable(&self) -> bool {
        self.request.tailable
    }

    /// The key this query selects in the per-collection plan cache: the
    /// filter shape (values stripped), the sort pattern and the projection.
    pub fn plan_cache_key(&self) -> String {
        let mut key = String::new();
        self.filter.write_shape(&mut key);
        key.push('|');
        for (field, value) in self.request.sort.iter() {
            key.push_str(field);
            key.push(if ascending(value) { '+' } else { '-' });
        }
        key.push('|');
        for (field, _) in self.request.projection.iter() {
            key.push_str(field);
            key.push(' ');
        }
        key
    }
}

impl fmt::Display for CanonicalQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ns={} filter={} sort={} proj={}",
            self.request.ns, self.request.filter, self.request.sort, self.request.projection
        )
    }
}

/// Returns true when `query` is a plain `_id` equality: exactly one field
/// named `_id` whose value is a simple scalar, or a document whose first key
/// is not an operator.
pub fn is_simple_id_query(query: &Document) -> bool {
    let mut it = query.iter();
    let (field, value) = match it.next() {
        Some(element) => element,
        None => return false,
    };

    // Just the one field, and it is _id.
    if it.next().is_some() || field != "_id" {
        return false;
    }

    match value {
        Bson::Int32(_)
        | Bson::Int64(_)
        | Bson::Double(_)
        | Bson::String(_)
        | Bson::Boolean(_)
        | Bson::DateTime(_)
        | Bson::ObjectId(_) => true,
        // Not something like { _id: { $gt: ... } }.
        Bson::Document(embedded) => embedded
            .iter()
            .next()
            .map(|(key, _)| !key.starts_with('$'))
            .unwrap_or(true),
        _ => false,
    }
}

fn ascending(direction: &Bson) -> bool {
    match direction {
        Bson::Int32(n) => *n >= 0,
        Bson::Int64(n) => *n >= 0,
        Bson::Double(n) => *n >= 0.0,
        _ => true,
    }
}
