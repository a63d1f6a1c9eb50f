use serde_json::Value;

/// Comparison operators accepted by [`QuerySpec`] filters. Both dialects
/// understand the full set on the primary store; the push store handles only
/// equality natively and leaves the rest to the emulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equal => "==",
            FilterOperator::NotEqual => "!=",
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEqual => ">=",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    field: String,
    operator: FilterOperator,
    value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

/// A backend-agnostic query description: zero or more filters (logical AND),
/// an optional order field with direction, and an optional result limit.
/// Built per call and never persisted.
#[derive(Clone, Debug, Default)]
pub struct QuerySpec {
    filters: Vec<Filter>,
    order_by: Option<String>,
    direction: OrderDirection,
    limit: Option<u32>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(
        mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push(Filter::new(field, operator, value));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(field.into());
        self.direction = direction;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn order_by_field(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_accumulates_clauses() {
        let spec = QuerySpec::new()
            .filter("status", FilterOperator::Equal, "available")
            .filter("price.amount", FilterOperator::GreaterThanOrEqual, 50)
            .order_by("price.amount", OrderDirection::Descending)
            .limit(3);

        assert_eq!(spec.filters().len(), 2);
        assert_eq!(spec.filters()[0].field(), "status");
        assert_eq!(spec.filters()[1].value(), &json!(50));
        assert_eq!(spec.order_by_field(), Some("price.amount"));
        assert_eq!(spec.direction(), OrderDirection::Descending);
        assert_eq!(spec.limit_value(), Some(3));
    }
}
