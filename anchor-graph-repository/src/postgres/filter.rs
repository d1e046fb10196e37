use sqlx::{Postgres, QueryBuilder};

use crate::query::Filter;

/// Appends `filter` to `builder` as a boolean SQL expression over `id` and `doc`.
///
/// Range comparisons use the "C" collation so that they agree with the
/// byte-wise ordering of the in-memory store.
pub(crate) fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::All => {
            builder.push("TRUE");
        }
        Filter::Ids(ids) => {
            let ids: Vec<String> = ids.iter().map(|id| id.to_hex()).collect();
            builder.push("id = ANY(").push_bind(ids).push(")");
        }
        Filter::Eq { path, value } => {
            builder
                .push("doc #> ")
                .push_bind(path.clone())
                .push(" = ")
                .push_bind(value.clone());
        }
        Filter::Lte { path, value } => {
            builder
                .push("(doc #>> ")
                .push_bind(path.clone())
                .push(") COLLATE \"C\" <= ")
                .push_bind(value.clone());
        }
        Filter::And(filters) => push_joined(builder, filters, " AND ", "TRUE"),
        Filter::Or(filters) => push_joined(builder, filters, " OR ", "FALSE"),
    }
}

fn push_joined(
    builder: &mut QueryBuilder<'_, Postgres>,
    filters: &[Filter],
    separator: &str,
    empty: &str,
) {
    if filters.is_empty() {
        builder.push(empty);
        return;
    }

    builder.push("(");
    for (index, filter) in filters.iter().enumerate() {
        if index > 0 {
            builder.push(separator);
        }
        push_filter(builder, filter);
    }
    builder.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_walker_filter_sql() {
        let filter = Filter::And(vec![
            Filter::eq(&["schedule", "status"], "PENDING"),
            Filter::lte(&["schedule", "execute_date"], "2024-04-23T09:00:00.000000Z"),
        ]);

        let mut builder = QueryBuilder::<Postgres>::new("SELECT doc FROM \"walker\" WHERE ");
        push_filter(&mut builder, &filter);

        assert_eq!(
            builder.sql(),
            "SELECT doc FROM \"walker\" WHERE (doc #> $1 = $2 AND (doc #>> $3) COLLATE \"C\" <= $4)"
        );
    }

    #[test]
    fn test_empty_or_is_false() {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(&mut builder, &Filter::Or(Vec::new()));
        assert_eq!(builder.sql(), "FALSE");
    }
}
