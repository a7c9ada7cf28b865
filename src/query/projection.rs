use crate::error::{Error, Result};
use crate::query::parser;
use bson::{Bson, Document};

/// Which array operator, if any, a projection uses.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArrayOpType {
    Normal,
    ElemMatch,
    Positional,
}

/// A validated projection specification.
///
/// Emits whether the projection can be computed from index keys alone
/// (`requires_document == false`), and if so which fields the index must
/// supply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedProjection {
    source: Document,
    requires_document: bool,
    required_fields: Vec<String>,
    array_op_type: ArrayOpType,
}

impl ParsedProjection {
    /// Parses the projection `spec` and checks its validity with respect to
    /// the query document.
    pub fn make(spec: &Document, query: &Document) -> Result<ParsedProjection> {
        // Inclusion/exclusion polarity: None until the first non-_id simple
        // element pins it.
        let mut include_exclude: Option<bool> = None;

        // When true we default to returning the whole document, which rules
        // out covered execution.
        let mut include = true;
        let mut has_non_simple = false;
        let mut has_dotted_field = false;

        let mut include_id = true;

        let mut array_op_type = ArrayOpType::Normal;

        for (field, value) in spec.iter() {
            if !is_number_or_bool(value) {
                has_non_simple = true;
            }

            if let Bson::Document(obj) = value {
                if obj.len() != 1 {
                    return Err(Error::BadValue(format!(">1 field in obj: {}", obj)));
                }

                let (operator, argument) = obj
                    .iter()
                    .next()
                    .ok_or_else(|| Error::Internal("empty projection operator".to_string()))?;
                match operator.as_str() {
                    "$slice" => validate_slice(argument)?,
                    "$elemMatch" => {
                        if !matches!(argument, Bson::Document(_)) {
                            return Err(Error::BadValue(
                                "elemMatch: Invalid argument, object required.".to_string(),
                            ));
                        }

                        if array_op_type == ArrayOpType::Positional {
                            return Err(Error::BadValue(
                                "Cannot specify positional operator and $elemMatch.".to_string(),
                            ));
                        }

                        if field.contains('.') {
                            return Err(Error::BadValue(
                                "Cannot use $elemMatch projection on a nested field.".to_string(),
                            ));
                        }

                        array_op_type = ArrayOpType::ElemMatch;

                        // The argument must parse as a match expression; the
                        // parsed tree itself is not retained here.
                        let mut elem_match = Document::new();
                        elem_match.insert("$elemMatch", argument.clone());
                        let mut wrapped = Document::new();
                        wrapped.insert(field.clone(), Bson::Document(elem_match));
                        parser::parse_conditions(&wrapped)?;
                    }
                    "$meta" => {
                        // Field for $meta must be top level.
                        if field.contains('.') {
                            return Err(Error::BadValue(
                                "field for $meta cannot be nested".to_string(),
                            ));
                        }

                        match argument {
                            Bson::String(meta) if meta == "text" || meta == "diskloc" => {}
                            Bson::String(meta) => {
                                return Err(Error::BadValue(format!(
                                    "unsupported $meta operator: {}",
                                    meta
                                )))
                            }
                            _ => {
                                return Err(Error::BadValue(
                                    "unexpected argument to $meta in proj".to_string(),
                                ))
                            }
                        }
                    }
                    _ => {
                        return Err(Error::BadValue(format!(
                            "Unsupported projection option: {}: {}",
                            field, value
                        )))
                    }
                }
            } else if field == "_id" && !is_truthy(value) {
                include_id = false;
            } else {
                // Projections of dotted fields aren't covered.
                if field.contains('.') {
                    has_dotted_field = true;
                }

                match include_exclude {
                    None => {
                        // The first non-_id element pins the polarity; later
                        // elements must match it.
                        include_exclude = Some(is_truthy(value));
                        include = !is_truthy(value);
                    }
                    Some(polarity) => {
                        if polarity != is_truthy(value) {
                            return Err(Error::BadValue(
                                "Projection cannot have a mix of inclusion and exclusion."
                                    .to_string(),
                            ));
                        }
                    }
                }
            }

            if field.contains(".$") {
                if !is_truthy(value) {
                    return Err(Error::BadValue(
                        "Cannot exclude array elements with the positional operator.".to_string(),
                    ));
                }

                if array_op_type == ArrayOpType::Positional {
                    return Err(Error::BadValue(
                        "Cannot specify more than one positional proj. per query.".to_string(),
                    ));
                }

                if array_op_type == ArrayOpType::ElemMatch {
                    return Err(Error::BadValue(
                        "Cannot specify positional operator and $elemMatch.".to_string(),
                    ));
                }

                array_op_type = ArrayOpType::Positional;
            }
        }

        // Dotted fields aren't covered, non-simple requires the document, and
        // a defaulting-to-include projection can't know what it is missing.
        let requires_document = include || has_non_simple || has_dotted_field;

        let mut required_fields = Vec::new();
        if !requires_document {
            if include_id {
                required_fields.push("_id".to_string());
            }

            // Only simple non-dotted inclusions can reach this point, so the
            // spec fields are exactly the required fields.
            for (field, value) in spec.iter() {
                if field != "_id" && is_truthy(value) {
                    required_fields.push(field.to_string());
                }
            }
        }

        let parsed = ParsedProjection {
            source: spec.clone(),
            requires_document,
            required_fields,
            array_op_type,
        };

        if array_op_type != ArrayOpType::Positional {
            return Ok(parsed);
        }

        // Positional projections are validated syntactically: some top-level
        // query field must share the positional path's pre-dot prefix. A
        // top-level $and waives the check rather than comparing its branches.
        for (query_field, _) in query.iter() {
            if query_field == "$and" {
                return Ok(parsed);
            }

            for (projection_field, _) in spec.iter() {
                if projection_field.contains(".$")
                    && prefix_before_dot(query_field) == prefix_before_dot(projection_field)
                {
                    return Ok(parsed);
                }
            }
        }

        Err(Error::BadValue(
            "Positional operator does not match the query specifier.".to_string(),
        ))
    }

    /// The projection document this descriptor was parsed from.
    pub fn source(&self) -> &Document {
        &self.source
    }

    /// True when the projection needs the full document to be computed.
    pub fn requires_document(&self) -> bool {
        self.requires_document
    }

    /// The fields an index must supply for covered execution.
    /// Empty whenever `requires_document` is true.
    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    pub fn array_op_type(&self) -> ArrayOpType {
        self.array_op_type
    }
}

fn validate_slice(argument: &Bson) -> Result<()> {
    match argument {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Ok(()),
        Bson::Array(arr) => {
            if arr.len() != 2 {
                return Err(Error::BadValue("$slice array wrong size".to_string()));
            }

            // First element is the skip, unchecked here; the limit must be a
            // positive number.
            let limit = match &arr[1] {
                Bson::Int32(limit) => *limit as i64,
                Bson::Int64(limit) => *limit,
                Bson::Double(limit) => *limit as i64,
                _ => 0,
            };
            if limit <= 0 {
                return Err(Error::BadValue("$slice limit must be positive".to_string()));
            }
            Ok(())
        }
        _ => Err(Error::BadValue(
            "$slice only supports numbers and [skip, limit] arrays".to_string(),
        )),
    }
}

fn is_number_or_bool(value: &Bson) -> bool {
    matches!(
        value,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Boolean(_)
    )
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

fn prefix_before_dot(field: &str) -> &str {
    field.split('.').next().unwrap_or(field)
}
