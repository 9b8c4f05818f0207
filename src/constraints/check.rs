//! CHECK constraint: a boolean expression every stored row must not
//! falsify. Follows SQL three-valued logic — TRUE and UNKNOWN both pass,
//! only FALSE violates.

use super::{Constraint, ConstraintKind};
use crate::error::DbError;
use crate::expr::Expression;
use crate::index::Index;
use crate::rows::Row;
use crate::session::{Session, CANCEL_CHECK_INTERVAL};
use crate::table::Table;
use crate::types::TriBool;
use eyre::{Result, WrapErr};
use hashbrown::HashSet;
use std::sync::{Arc, Weak};

#[derive(Debug)]
pub struct CheckConstraint {
    id: u32,
    name: String,
    table: Weak<Table>,
    expr: Box<dyn Expression>,
}

impl CheckConstraint {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        table: &Arc<Table>,
        expr: Box<dyn Expression>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            table: Arc::downgrade(table),
            expr,
        }
    }

    pub fn expression_sql(&self) -> String {
        self.expr.sql()
    }

    fn short_description(&self) -> String {
        format!("{}: {}", self.name, self.expr.sql())
    }

    fn check(&self, row: &Row) -> Result<()> {
        let value = self
            .expr
            .evaluate(row)
            .wrap_err_with(|| format!("evaluating CHECK constraint {}", self.short_description()))?;
        if TriBool::from_value(&value) == TriBool::False {
            return Err(DbError::CheckViolation {
                constraint: self.name.clone(),
                expr: self.expr.sql(),
            }
            .into());
        }
        Ok(())
    }
}

impl Constraint for CheckConstraint {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Check
    }

    fn table(&self) -> Option<Arc<Table>> {
        self.table.upgrade()
    }

    fn is_before(&self) -> bool {
        true
    }

    fn check_row(
        &self,
        _session: &Session,
        _table: &Arc<Table>,
        _old_row: Option<&Row>,
        new_row: Option<&Row>,
    ) -> Result<()> {
        // Deletes have nothing to check.
        let Some(row) = new_row else {
            return Ok(());
        };
        self.check(row)
    }

    fn check_existing_data(&self, session: &Session) -> Result<()> {
        if session.database_is_starting() {
            // Persisted data is trusted on load.
            return Ok(());
        }
        let Some(table) = self.table.upgrade() else {
            return Ok(());
        };
        let mut cursor = table.scan_index().find(session, None, None)?;
        let mut scanned: u64 = 0;
        while cursor.next()? {
            scanned += 1;
            if scanned % CANCEL_CHECK_INTERVAL == 0 {
                session.check_canceled()?;
            }
            let row = cursor
                .row()
                .ok_or_else(|| eyre::eyre!("scan cursor yielded no row"))?;
            self.check(row)?;
        }
        Ok(())
    }

    fn referenced_columns(&self, table: &Table) -> HashSet<usize> {
        let mut columns = HashSet::new();
        if self
            .table
            .upgrade()
            .map(|own| own.id() == table.id())
            .unwrap_or(false)
        {
            self.expr.collect_columns(&mut columns);
        }
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{column_cmp, CompareOp};
    use crate::session::{SessionKind, User};
    use crate::table::Column;
    use crate::types::{DataType, Value};

    fn setup() -> (Arc<Table>, Session) {
        let table = Table::new(
            1,
            "accounts",
            vec![Column::new("balance", DataType::Int, true)],
            false,
        );
        let session = Session::new(1, SessionKind::User, User::new("t", true));
        (table, session)
    }

    fn non_negative(table: &Arc<Table>) -> CheckConstraint {
        CheckConstraint::new(
            50,
            "CHK_BALANCE",
            table,
            column_cmp(0, "balance", CompareOp::Ge, Value::Int(0)),
        )
    }

    #[test]
    fn false_fails_true_and_unknown_pass() {
        let (table, session) = setup();
        let chk = non_negative(&table);

        let ok = Row::new(vec![Value::Int(10)]);
        assert!(chk.check_row(&session, &table, None, Some(&ok)).is_ok());

        let null = Row::new(vec![Value::Null]);
        assert!(chk.check_row(&session, &table, None, Some(&null)).is_ok());

        let bad = Row::new(vec![Value::Int(-1)]);
        let err = chk
            .check_row(&session, &table, None, Some(&bad))
            .unwrap_err();
        match crate::error::db_error(&err) {
            Some(DbError::CheckViolation { constraint, expr }) => {
                assert_eq!(constraint, "CHK_BALANCE");
                assert_eq!(expr, "balance >= 0");
            }
            other => panic!("expected CheckViolation, got {:?}", other),
        }
    }

    #[test]
    fn delete_is_not_checked() {
        let (table, session) = setup();
        let chk = non_negative(&table);
        let bad = Row::new(vec![Value::Int(-1)]);
        assert!(chk.check_row(&session, &table, Some(&bad), None).is_ok());
    }

    #[test]
    fn existing_data_scan_fails_on_first_violation() {
        let (table, session) = setup();
        table
            .add_row(&session, Row::new(vec![Value::Int(5)]))
            .unwrap();
        table
            .add_row(&session, Row::new(vec![Value::Int(-2)]))
            .unwrap();
        let chk = non_negative(&table);
        let err = chk.check_existing_data(&session).unwrap_err();
        assert!(matches!(
            crate::error::db_error(&err),
            Some(DbError::CheckViolation { .. })
        ));
    }

    #[test]
    fn existing_data_scan_is_skipped_at_startup() {
        let table = Table::new(
            1,
            "accounts",
            vec![Column::new("balance", DataType::Int, true)],
            false,
        );
        let starting = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let session = Session::with_starting_flag(
            1,
            SessionKind::System,
            User::new("sys", true),
            starting,
        );
        table
            .add_row(&session, Row::new(vec![Value::Int(-5)]))
            .unwrap();
        let chk = non_negative(&table);
        assert!(chk.check_existing_data(&session).is_ok());
    }

    #[test]
    fn canceled_session_aborts_the_scan() {
        let (table, session) = setup();
        for i in 0..300 {
            table
                .add_row(&session, Row::new(vec![Value::Int(i)]))
                .unwrap();
        }
        session.cancel();
        let chk = non_negative(&table);
        let err = chk.check_existing_data(&session).unwrap_err();
        assert!(matches!(
            crate::error::db_error(&err),
            Some(DbError::StatementCanceled)
        ));
    }

    #[test]
    fn referenced_columns_reports_expression_columns() {
        let (table, _session) = setup();
        let chk = non_negative(&table);
        let cols = chk.referenced_columns(&table);
        assert!(cols.contains(&0) && cols.len() == 1);

        let other = Table::new(2, "other", vec![], false);
        assert!(chk.referenced_columns(&other).is_empty());
    }
}
