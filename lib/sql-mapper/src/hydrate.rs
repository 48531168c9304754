//! Result rows to entity instances.

use crate::coerce::ValueCoercer;
use crate::entity::Entity;
use crate::error::MapperError;
use crate::mapping::MappedType;
use crate::statement::ResultSet;

/// Populates instances from result rows using the read path of a [`ValueCoercer`].
#[derive(Debug, Clone, Copy)]
pub struct ResultHydrator<'a> {
    coercer: &'a ValueCoercer,
}

impl<'a> ResultHydrator<'a> {
    pub fn new(coercer: &'a ValueCoercer) -> Self {
        ResultHydrator { coercer }
    }

    /// Lower-cased result column names, in result order.
    pub fn column_names<R: ResultSet>(rows: &R) -> Result<Vec<String>, MapperError> {
        (1..=rows.column_count())
            .map(|index| -> Result<String, MapperError> {
                Ok(rows.column_name(index)?.to_lowercase())
            })
            .collect()
    }

    /// Assigns every non-null, non-ignored column of the current row to `target`.
    /// `columns` are the lower-cased names from [`ResultHydrator::column_names`].
    pub fn hydrate<T, R>(
        &self,
        mapped: &MappedType,
        rows: &R,
        columns: &[String],
        target: &mut T,
        ignored: &[&str],
    ) -> Result<(), MapperError>
    where
        T: Entity,
        R: ResultSet,
    {
        for (offset, name) in columns.iter().enumerate() {
            if ignored.iter().any(|i| i.eq_ignore_ascii_case(name)) {
                continue;
            }
            let value = rows.get(offset + 1)?;
            if value.is_null() {
                continue;
            }
            let column = mapped
                .column(name)
                .ok_or_else(|| MapperError::unknown_column(mapped.type_name(), name.as_str()))?;
            let value = self.coercer.to_field(column, value)?;
            target.set_field(column.field, value)?;
        }
        Ok(())
    }

    /// One instance per remaining row.
    pub fn list_from<T, R>(&self, mapped: &MappedType, rows: &mut R) -> Result<Vec<T>, MapperError>
    where
        T: Entity,
        R: ResultSet,
    {
        let columns = Self::column_names(rows)?;
        let mut list = Vec::new();
        while rows.next()? {
            let mut target = T::instantiate()?;
            self.hydrate(mapped, rows, &columns, &mut target, &[])?;
            list.push(target);
        }
        Ok(list)
    }

    /// The first row, or `None` when the result is empty.
    pub fn single_from<T, R>(
        &self,
        mapped: &MappedType,
        rows: &mut R,
    ) -> Result<Option<T>, MapperError>
    where
        T: Entity,
        R: ResultSet,
    {
        let columns = Self::column_names(rows)?;
        if !rows.next()? {
            return Ok(None);
        }
        let mut target = T::instantiate()?;
        self.hydrate(mapped, rows, &columns, &mut target, &[])?;
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FakeRows, Product, ProductType, TreeNode};
    use crate::registry::TypeRegistry;
    use crate::value::{SqlType, SqlValue};
    use crate::JoinKey;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn product_row() -> Vec<(&'static str, SqlValue)> {
        vec![
            ("ID", SqlValue::BigInt(3)),
            ("PRODUCT_TYPE", SqlValue::Text("BOOK".into())),
            ("PRODUCT_CODE", SqlValue::Text("C3".into())),
            ("RANK", SqlValue::Integer(2)),
            ("UNIT_PRICE", SqlValue::Decimal(Decimal::new(1250, 2))),
            ("INTRODUCED", SqlValue::Null(SqlType::Timestamp)),
        ]
    }

    #[test]
    fn hydrates_a_single_row() {
        let registry = TypeRegistry::new();
        let mapped = registry.get::<Product>().unwrap();
        let coercer = ValueCoercer::new();
        let mut rows = FakeRows::new(vec![product_row()]);

        let product: Product = ResultHydrator::new(&coercer)
            .single_from(&mapped, &mut rows)
            .unwrap()
            .unwrap();
        assert_eq!(product.id, 3);
        assert_eq!(product.product_type, ProductType::Book);
        assert_eq!(product.product_code, "C3");
        assert_eq!(product.rank, 2);
        assert_eq!(product.unit_price, Some(Decimal::new(1250, 2)));
        assert_eq!(product.introduced, None);
    }

    #[test]
    fn column_order_does_not_matter() {
        let registry = TypeRegistry::new();
        let mapped = registry.get::<Product>().unwrap();
        let coercer = ValueCoercer::new();
        let hydrator = ResultHydrator::new(&coercer);

        let mut reversed = product_row();
        reversed.reverse();
        let forward: Vec<Product> = hydrator
            .list_from(&mapped, &mut FakeRows::new(vec![product_row()]))
            .unwrap();
        let backward: Vec<Product> = hydrator
            .list_from(&mapped, &mut FakeRows::new(vec![reversed]))
            .unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn empty_result_is_none() {
        let registry = TypeRegistry::new();
        let mapped = registry.get::<Product>().unwrap();
        let coercer = ValueCoercer::new();
        let mut rows = FakeRows::empty(&["id", "product_code"]);
        let found: Option<Product> = ResultHydrator::new(&coercer)
            .single_from(&mapped, &mut rows)
            .unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn unknown_columns_fail_unless_ignored() {
        let registry = TypeRegistry::new();
        let mapped = registry.get::<Product>().unwrap();
        let coercer = ValueCoercer::new();
        let hydrator = ResultHydrator::new(&coercer);
        let mut row = product_row();
        row.push(("SCORE", SqlValue::Integer(9)));

        let err = hydrator
            .list_from::<Product, _>(&mapped, &mut FakeRows::new(vec![row.clone()]))
            .unwrap_err();
        assert!(matches!(
            err,
            MapperError::UnknownColumn { ref column, .. } if column == "score"
        ));

        let mut rows = FakeRows::new(vec![row]);
        let columns = ResultHydrator::column_names(&rows).unwrap();
        assert!(rows.next().unwrap());
        let mut product = Product::default();
        hydrator
            .hydrate(&mapped, &rows, &columns, &mut product, &["score"])
            .unwrap();
        assert_eq!(product.product_code, "C3");
    }

    #[test]
    fn self_join_column_hydrates_key() {
        let registry = TypeRegistry::new();
        let mapped = registry.get::<TreeNode>().unwrap();
        let coercer = ValueCoercer::new();
        let mut rows = FakeRows::new(vec![
            vec![
                ("id", SqlValue::BigInt(2)),
                ("label", SqlValue::Text("child".into())),
                ("parent_id", SqlValue::BigInt(1)),
            ],
            vec![
                ("id", SqlValue::BigInt(1)),
                ("label", SqlValue::Text("root".into())),
                ("parent_id", SqlValue::Null(SqlType::BigInt)),
            ],
        ]);
        let nodes: Vec<TreeNode> = ResultHydrator::new(&coercer)
            .list_from(&mapped, &mut rows)
            .unwrap();
        assert_eq!(nodes[0].parent, Some(JoinKey::new(1)));
        assert_eq!(nodes[1].parent, None);
    }
}
