use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filter on a top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A query over one collection: optional equality filter, optional
/// ordering, optional limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Option<FieldFilter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filter: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_every_clause() {
        let q = Query::collection("posts")
            .where_eq("userId", "u1")
            .order_by("createdAt", Direction::Descending)
            .limit(10);

        assert_eq!(q.collection, "posts");
        assert_eq!(q.filter.as_ref().unwrap().value, json!("u1"));
        assert_eq!(q.order_by.as_ref().unwrap().direction, Direction::Descending);
        assert_eq!(q.limit, Some(10));
    }

    #[test]
    fn bare_collection_query_has_no_clauses() {
        let q = Query::collection("users");
        assert!(q.filter.is_none());
        assert!(q.order_by.is_none());
        assert!(q.limit.is_none());
    }
}
