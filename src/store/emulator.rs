use std::cmp::Ordering;

use serde_json::Value;

use crate::store::document::Document;
use crate::store::query::{Filter, FilterOperator, OrderDirection};

/// Client-side evaluation of the predicates the push store cannot run
/// natively. Kept as its own step, separate from translation, so the
/// over-fetch boundary stays visible: the translator decides what the
/// backend sees, this module decides what the caller sees.
///
/// A record missing a filtered field fails every operator. Absent values are
/// excluded, never silently included.
pub(crate) fn apply_residual_filters(documents: Vec<Document>, residual: &[Filter]) -> Vec<Document> {
    if residual.is_empty() {
        return documents;
    }
    documents
        .into_iter()
        .filter(|document| satisfies_all(document, residual))
        .collect()
}

pub(crate) fn satisfies_all(document: &Document, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| satisfies(document, filter))
}

fn satisfies(document: &Document, filter: &Filter) -> bool {
    match document.field(filter.field()) {
        Some(value) => evaluate(filter.operator(), value, filter.value()),
        None => false,
    }
}

pub(crate) fn evaluate(operator: FilterOperator, left: &Value, right: &Value) -> bool {
    match operator {
        FilterOperator::Equal => left == right,
        FilterOperator::NotEqual => left != right,
        FilterOperator::LessThan => compare_values(left, right) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => matches!(
            compare_values(left, right),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::GreaterThan => compare_values(left, right) == Some(Ordering::Greater),
        FilterOperator::GreaterThanOrEqual => matches!(
            compare_values(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

/// Orders two JSON scalars of compatible type. Integers and doubles compare
/// cross-type; mixed incompatible types are unordered and the range
/// operators treat them as non-matching.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64().partial_cmp(&b.as_f64()),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Orders documents by the given field (or by id when none), ascending, with
/// absent values first; descending reverses the whole comparison, id
/// tie-break included, so equal keys keep a stable relative spelling per
/// direction.
pub(crate) fn sort_documents(
    documents: &mut [Document],
    order_by: Option<&str>,
    direction: OrderDirection,
) {
    documents.sort_by(|left, right| {
        let ordering = match order_by {
            None => left.id().cmp(right.id()),
            Some(field) => {
                let by_field = match (left.field(field), right.field(field)) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
                };
                by_field.then_with(|| left.id().cmp(right.id()))
            }
        };
        match direction {
            OrderDirection::Ascending => ordering,
            OrderDirection::Descending => ordering.reverse(),
        }
    });
}
