use crate::store::error::{internal_error, StoreResult};
use crate::store::path::ResourcePath;
use crate::store::query::{Filter, FilterOperator, OrderDirection, QuerySpec};

/// The primary store's native dialect carries the whole specification;
/// translation is total and nothing is left for the emulator.
#[derive(Clone, Debug)]
pub struct PrimaryQuery {
    pub collection: ResourcePath,
    pub filters: Vec<Filter>,
    pub order_by: Option<String>,
    pub direction: OrderDirection,
    pub limit: Option<u32>,
}

pub(crate) fn translate_primary(collection: ResourcePath, spec: &QuerySpec) -> PrimaryQuery {
    PrimaryQuery {
        collection,
        filters: spec.filters().to_vec(),
        order_by: spec.order_by_field().map(str::to_string),
        direction: spec.direction(),
        limit: spec.limit_value(),
    }
}

/// What the push store's native query model can express: one order axis
/// (a child field or the key), an optional equality restriction on that
/// axis, and a first/last limit over the ascending scan. Everything else is
/// residual and runs through the emulator after the fetch.
#[derive(Clone, Debug)]
pub(crate) struct PushQueryPlan {
    pub params: Vec<(String, String)>,
    pub residual: Vec<Filter>,
    pub order_by: Option<String>,
    pub reverse_results: bool,
}

/// Splits a spec into the native-capable portion and the residual predicates.
///
/// The native call deliberately over-fetches: with N filters at most one runs
/// on the backend and the rest narrow the result client-side. That shape
/// trades result-set size for correctness on a store without compound
/// filtering and must not be collapsed into the translator output.
pub(crate) fn translate_push(spec: &QuerySpec) -> StoreResult<PushQueryPlan> {
    let mut residual: Vec<Filter> = Vec::new();
    let mut order_by = spec.order_by_field().map(str::to_string);
    let mut equality: Option<&Filter> = None;

    for (index, filter) in spec.filters().iter().enumerate() {
        // Only the first filter is a candidate for the native call, and only
        // as an equality restriction on the order axis. A first filter whose
        // field differs from an explicit order axis is not expressible and
        // joins the residual set.
        let pushable = index == 0
            && filter.operator() == FilterOperator::Equal
            && order_by
                .as_deref()
                .map_or(true, |field| field == filter.field());
        if pushable {
            equality = Some(filter);
            if order_by.is_none() {
                order_by = Some(filter.field().to_string());
            }
        } else {
            residual.push(filter.clone());
        }
    }

    let mut params = Vec::new();
    let index = match order_by.as_deref() {
        Some(field) => field.to_string(),
        None => "$key".to_string(),
    };
    params.push((
        "orderBy".to_string(),
        encode_param(&serde_json::Value::String(index))?,
    ));

    if let Some(filter) = equality {
        params.push(("equalTo".to_string(), encode_param(filter.value())?));
    }

    if let Some(limit) = spec.limit_value() {
        // The native scan is ascending only; a descending limit takes the
        // last N of the ascending order and the facade reverses afterwards.
        let key = match spec.direction() {
            OrderDirection::Ascending => "limitToFirst",
            OrderDirection::Descending => "limitToLast",
        };
        params.push((key.to_string(), limit.to_string()));
    }

    Ok(PushQueryPlan {
        params,
        residual,
        order_by,
        reverse_results: spec.direction() == OrderDirection::Descending,
    })
}

fn encode_param(value: &serde_json::Value) -> StoreResult<String> {
    serde_json::to_string(value)
        .map_err(|err| internal_error(format!("Failed to encode query parameter: {err}")))
}
