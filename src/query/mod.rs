use crate::util::bson_utils;
use bson::Bson;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

pub mod bounds;
pub mod canonical;
pub mod cursor_registry;
pub mod get_runner;
pub mod parser;
pub mod plan_cache;
pub mod planner;
pub mod planner_params;
pub mod projection;
pub mod query_settings;
pub mod runner;
pub mod solution;
pub mod stage_builder;

/// A parsed filter expression.
///
/// Each node owns its children outright; the canonical query is the single
/// owner of the whole tree for the lifetime of a selector invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// All predicates applying to one (possibly dotted) field,
    /// e.g. `{ "price": { "$gt": 1.99, "$exists": true } }`.
    FieldFilters { field: String, filters: Vec<Expr> },
    /// A single comparison (e.g. `$gt: 5`, `$eq: "Alice"`).
    Comparison {
        operator: ComparisonOperator,
        value: BsonValue,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Nor(Vec<Expr>),
    Not(Box<Expr>),
    /// Field existence.
    Exists(bool),
    /// Array element match.
    ElemMatch(Vec<Expr>),
    /// The empty filter (e.g. `{}` or `$and: []`).
    AlwaysTrue,
}

impl Expr {
    /// True when the expression matches every document.
    pub fn is_trivially_true(&self) -> bool {
        match self {
            Expr::AlwaysTrue => true,
            Expr::And(children) => children.iter().all(|c| c.is_trivially_true()),
            _ => false,
        }
    }

    /// Appends the shape of this expression (operators and field names,
    /// values stripped) to `out`. Two queries with the same shape are
    /// interchangeable for plan-cache purposes.
    pub fn write_shape(&self, out: &mut String) {
        match self {
            Expr::FieldFilters { field, filters } => {
                out.push_str(field);
                out.push('(');
                for filter in filters {
                    filter.write_shape(out);
                }
                out.push(')');
            }
            Expr::Comparison { operator, .. } => {
                out.push_str(operator.name());
                out.push(' ');
            }
            Expr::And(children) => Self::write_tree_shape("and", children, out),
            Expr::Or(children) => Self::write_tree_shape("or", children, out),
            Expr::Nor(children) => Self::write_tree_shape("nor", children, out),
            Expr::Not(child) => {
                out.push_str("not[");
                child.write_shape(out);
                out.push(']');
            }
            Expr::Exists(value) => {
                out.push_str(if *value { "exists " } else { "nexists " });
            }
            Expr::ElemMatch(children) => Self::write_tree_shape("elemMatch", children, out),
            Expr::AlwaysTrue => out.push_str("true "),
        }
    }

    fn write_tree_shape(name: &str, children: &[Expr], out: &mut String) {
        out.push_str(name);
        out.push('[');
        for child in children {
            child.write_shape(out);
        }
        out.push(']');
    }
}

#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum ComparisonOperator {
    Eq,  // `$eq`
    Ne,  // `$ne`
    Gt,  // `$gt`
    Gte, // `$gte`
    Lt,  // `$lt`
    Lte, // `$lte`
    In,  // `$in`
    Nin, // `$nin`
}

impl ComparisonOperator {
    pub fn name(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "eq",
            ComparisonOperator::Ne => "ne",
            ComparisonOperator::Gt => "gt",
            ComparisonOperator::Gte => "gte",
            ComparisonOperator::Lt => "lt",
            ComparisonOperator::Lte => "lte",
            ComparisonOperator::In => "in",
            ComparisonOperator::Nin => "nin",
        }
    }
}

/// A BSON value with the MongoDB total order, equality and hashing semantics.
#[derive(Debug, Clone)]
pub struct BsonValue(pub Bson);

impl BsonValue {
    pub fn to_bson(&self) -> Bson {
        self.0.clone()
    }

    pub fn as_bson(&self) -> &Bson {
        &self.0
    }
}

impl fmt::Display for BsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for BsonValue {
    fn eq(&self, other: &Self) -> bool {
        bson_utils::bson_eq(&self.0, &other.0)
    }
}

impl Eq for BsonValue {}

impl Hash for BsonValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        bson_utils::bson_hash(&self.0, state);
    }
}

impl PartialOrd for BsonValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BsonValue {
    fn cmp(&self, other: &Self) -> Ordering {
        bson_utils::cmp_bson(&self.0, &other.0)
    }
}

impl From<Bson> for BsonValue {
    fn from(value: Bson) -> Self {
        BsonValue(value)
    }
}

impl From<i32> for BsonValue {
    fn from(value: i32) -> Self {
        BsonValue(Bson::Int32(value))
    }
}

impl From<i64> for BsonValue {
    fn from(value: i64) -> Self {
        BsonValue(Bson::Int64(value))
    }
}

impl From<f64> for BsonValue {
    fn from(value: f64) -> Self {
        BsonValue(Bson::Double(value))
    }
}

impl From<&str> for BsonValue {
    fn from(value: &str) -> Self {
        BsonValue(Bson::String(value.to_string()))
    }
}

impl From<bool> for BsonValue {
    fn from(value: bool) -> Self {
        BsonValue(Bson::Boolean(value))
    }
}

#[macro_export]
macro_rules! bson_value {
    ( $($tokens:tt)* ) => {
        $crate::query::BsonValue(::bson::bson!($($tokens)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bson_value_numeric_equality() {
        assert_eq!(bson_value!(5), bson_value!(5));
        assert_eq!(bson_value!(5_i32), bson_value!(5_i64));
        assert_eq!(bson_value!(5_i64), bson_value!(5.0_f64));
        assert_ne!(bson_value!(5), bson_value!(6));
    }

    #[test]
    fn test_bson_value_ordering() {
        assert!(bson_value!(5) < bson_value!(6));
        assert!(BsonValue(Bson::MinKey) < bson_value!(5));
        assert!(BsonValue(Bson::MaxKey) > bson_value!("zzz"));
    }

    #[test]
    fn test_shape_strips_values() {
        let a = Expr::FieldFilters {
            field: "qty".to_string(),
            filters: vec![Expr::Comparison {
                operator: ComparisonOperator::Gt,
                value: bson_value!(5),
            }],
        };
        let b = Expr::FieldFilters {
            field: "qty".to_string(),
            filters: vec![Expr::Comparison {
                operator: ComparisonOperator::Gt,
                value: bson_value!(1_000),
            }],
        };
        let mut shape_a = String::new();
        let mut shape_b = String::new();
        a.write_shape(&mut shape_a);
        b.write_shape(&mut shape_b);
        assert_eq!(shape_a, shape_b);

        let c = Expr::FieldFilters {
            field: "qty".to_string(),
            filters: vec![Expr::Comparison {
                operator: ComparisonOperator::Lt,
                value: bson_value!(5),
            }],
        };
        let mut shape_c = String::new();
        c.write_shape(&mut shape_c);
        assert_ne!(shape_a, shape_c);
    }

    #[test]
    fn test_trivially_true() {
        assert!(Expr::AlwaysTrue.is_trivially_true());
        assert!(Expr::And(vec![]).is_trivially_true());
        assert!(!Expr::Exists(true).is_trivially_true());
    }
}
