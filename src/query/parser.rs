use crate::error::{Error, Result};
use crate::query::{BsonValue, ComparisonOperator, ComparisonOperator::*, Expr};
use bson::{Bson, Document};

/// Parses a BSON `Document` representing a query filter into an `Expr`.
pub fn parse_conditions(doc: &Document) -> Result<Expr> {
    let mut conditions = Vec::new();

    for (key, value) in doc.iter() {
        match key.as_str() {
            // Logical operators
            "$and" | "$or" | "$nor" => {
                conditions.push(parse_logical_operator(key, value)?);
            }
            "$not" => {
                if let Bson::Document(sub_doc) = value {
                    let parsed = parse_conditions(sub_doc)?;
                    conditions.push(Expr::Not(Box::new(parsed)));
                } else {
                    return Err(Error::BadValue(
                        "Invalid format for $not; must be a document".to_string(),
                    ));
                }
            }
            _ => {
                conditions.push(Expr::FieldFilters {
                    field: key.to_string(),
                    filters: parse_predicates(value)?,
                });
            }
        }
    }

    // Combine conditions into an `And` if there are multiple
    match conditions.len() {
        0 => Ok(Expr::AlwaysTrue),
        1 => Ok(conditions.remove(0)),
        _ => Ok(Expr::And(conditions)),
    }
}

/// Parses logical operators ($and, $or, $nor) into an `Expr`.
fn parse_logical_operator(operator: &str, value: &Bson) -> Result<Expr> {
    if let Bson::Array(sub_docs) = value {
        let mut parsed_conditions = Vec::with_capacity(sub_docs.len());
        for bson in sub_docs {
            if let Bson::Document(sub_doc) = bson {
                parsed_conditions.push(parse_conditions(sub_doc)?);
            } else {
                return Err(Error::BadValue(format!(
                    "Invalid format for {}; must be an array of documents",
                    operator
                )));
            }
        }

        match operator {
            "$and" => Ok(Expr::And(parsed_conditions)),
            "$or" => Ok(Expr::Or(parsed_conditions)),
            "$nor" => Ok(Expr::Nor(parsed_conditions)),
            _ => Err(Error::BadValue(format!(
                "Unknown logical operator: {}",
                operator
            ))),
        }
    } else {
        Err(Error::BadValue(format!(
            "Invalid format for {}; must be an array",
            operator
        )))
    }
}

/// Parses predicate conditions (e.g. `$eq`, `$gt`) applying to a single field.
fn parse_predicates(value: &Bson) -> Result<Vec<Expr>> {
    // A sub-document whose first key does not start with '$' is a literal,
    // matched by implicit equality.
    let operators = match value {
        Bson::Document(sub_doc) => match sub_doc.iter().next() {
            Some((first_key, _)) if first_key.starts_with('$') => sub_doc,
            _ => return Ok(vec![new_predicate(Eq, value)]),
        },
        _ => return Ok(vec![new_predicate(Eq, value)]),
    };

    let mut predicates = Vec::new();
    for (key, value) in operators.iter() {
        match key.as_str() {
            "$eq" => predicates.push(new_predicate(Eq, value)),
            "$ne" => predicates.push(new_predicate(Ne, value)),
            "$gt" => predicates.push(new_predicate(Gt, value)),
            "$gte" => predicates.push(new_predicate(Gte, value)),
            "$lt" => predicates.push(new_predicate(Lt, value)),
            "$lte" => predicates.push(new_predicate(Lte, value)),
            "$in" => predicates.push(parse_array_predicate(In, value)?),
            "$nin" => predicates.push(parse_array_predicate(Nin, value)?),
            "$exists" => {
                if let Bson::Boolean(exists) = value {
                    predicates.push(Expr::Exists(*exists));
                } else {
                    return Err(Error::BadValue("$exists must be a boolean".to_string()));
                }
            }
            "$elemMatch" => {
                if let Bson::Document(doc) = value {
                    let nested = parse_conditions(doc)?;
                    let sub_preds = match nested {
                        // flatten a top-level AND of conditions
                        Expr::And(children) => children,
                        other => vec![other],
                    };
                    predicates.push(Expr::ElemMatch(sub_preds));
                } else {
                    return Err(Error::BadValue(
                        "$elemMatch must be a document".to_string(),
                    ));
                }
            }
            _ => return Err(Error::BadValue(format!("Unknown operator: {}", key))),
        }
    }
    Ok(predicates)
}

fn parse_array_predicate(operator: ComparisonOperator, value: &Bson) -> Result<Expr> {
    if matches!(value, Bson::Array(_)) {
        Ok(new_predicate(operator, value))
    } else {
        Err(Error::BadValue(format!(
            "${} must be an array",
            operator.name()
        )))
    }
}

fn new_predicate(operator: ComparisonOperator, value: &Bson) -> Expr {
    Expr::Comparison {
        operator,
        value: BsonValue(value.clone()),
    }
}
