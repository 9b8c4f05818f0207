//! # Constraint Enforcement Test Suite
//!
//! End-to-end constraint scenarios through the DDL commands and the table
//! mutation protocol: CHECK three-valued logic, referential integrity with
//! RESTRICT and CASCADE, validation of pre-existing data, and the
//! guarantee that a failed before-constraint leaves storage untouched.

use opaldb::command::{AddConstraintKind, AlterTableAddConstraint, DropConstraint};
use opaldb::constraints::{Constraint, DeleteAction};
use opaldb::error::db_error;
use opaldb::expr::{column_cmp, CompareOp};
use opaldb::session::{Session, User};
use opaldb::table::{Column, Table};
use opaldb::types::DataType;
use opaldb::{Database, DbError, Row, Value};
use std::sync::Arc;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn setup() -> (Arc<Database>, Arc<Session>) {
    let db = Database::new("testdb");
    let session = db.create_session(User::new("tester", true));
    (db, session)
}

fn create_table(db: &Database, name: &str, columns: Vec<Column>) -> Arc<Table> {
    let table = Table::new(db.allocate_object_id(), name, columns, false);
    db.catalog_mut().add_table(table.clone()).unwrap();
    table
}

fn accounts_table(db: &Database) -> Arc<Table> {
    create_table(
        db,
        "accounts",
        vec![
            Column::new("id", DataType::Int, false),
            Column::new("balance", DataType::Int, true),
        ],
    )
}

fn add_pk(db: &Database, session: &Session, table: &str, column: &str) {
    AlterTableAddConstraint::new(
        table,
        AddConstraintKind::PrimaryKey {
            columns: vec![column.to_string()],
            hash: false,
        },
    )
    .update(session, db)
    .unwrap();
}

// ============================================================================
// CHECK CONSTRAINTS
// ============================================================================

mod check_constraints {
    use super::*;

    #[test]
    fn false_violates_null_passes() {
        let (db, s) = setup();
        let table = accounts_table(&db);
        AlterTableAddConstraint::new(
            "accounts",
            AddConstraintKind::Check {
                expr: column_cmp(1, "balance", CompareOp::Ge, Value::Int(0)),
            },
        )
        .with_name("CHK_BALANCE")
        .update(&s, &db)
        .unwrap();

        table
            .add_row(&s, Row::new(vec![Value::Int(1), Value::Int(100)]))
            .unwrap();
        // UNKNOWN passes: NULL balance is not a violation.
        table
            .add_row(&s, Row::new(vec![Value::Int(2), Value::Null]))
            .unwrap();

        let err = table
            .add_row(&s, Row::new(vec![Value::Int(3), Value::Int(-1)]))
            .unwrap_err();
        match db_error(&err) {
            Some(DbError::CheckViolation { constraint, expr }) => {
                assert_eq!(constraint, "CHK_BALANCE");
                assert!(expr.contains("balance >= 0"));
            }
            other => panic!("expected CheckViolation, got {:?}", other),
        }
    }

    #[test]
    fn failed_check_prevents_any_storage_mutation() {
        let (db, s) = setup();
        let table = accounts_table(&db);
        AlterTableAddConstraint::new(
            "accounts",
            AddConstraintKind::Check {
                expr: column_cmp(1, "balance", CompareOp::Ge, Value::Int(0)),
            },
        )
        .update(&s, &db)
        .unwrap();

        assert!(table
            .add_row(&s, Row::new(vec![Value::Int(1), Value::Int(-5)]))
            .is_err());
        assert_eq!(table.row_count(&s), 0);
    }

    #[test]
    fn existing_data_violation_blocks_constraint_creation() {
        let (db, s) = setup();
        let table = accounts_table(&db);
        table
            .add_row(&s, Row::new(vec![Value::Int(1), Value::Int(-10)]))
            .unwrap();

        let err = AlterTableAddConstraint::new(
            "accounts",
            AddConstraintKind::Check {
                expr: column_cmp(1, "balance", CompareOp::Ge, Value::Int(0)),
            },
        )
        .update(&s, &db)
        .unwrap_err();
        assert!(matches!(
            db_error(&err),
            Some(DbError::CheckViolation { .. })
        ));
        assert!(table.constraints().is_empty());
    }

    #[test]
    fn no_check_skips_existing_data() {
        let (db, s) = setup();
        let table = accounts_table(&db);
        table
            .add_row(&s, Row::new(vec![Value::Int(1), Value::Int(-10)]))
            .unwrap();

        AlterTableAddConstraint::new(
            "accounts",
            AddConstraintKind::Check {
                expr: column_cmp(1, "balance", CompareOp::Ge, Value::Int(0)),
            },
        )
        .no_check()
        .update(&s, &db)
        .unwrap();
        assert_eq!(table.constraints().len(), 1);
    }

    #[test]
    fn cancellation_aborts_existing_data_scan() {
        let (db, s) = setup();
        let table = accounts_table(&db);
        for i in 0..500 {
            table
                .add_row(&s, Row::new(vec![Value::Int(i), Value::Int(i)]))
                .unwrap();
        }
        s.cancel();
        let err = AlterTableAddConstraint::new(
            "accounts",
            AddConstraintKind::Check {
                expr: column_cmp(1, "balance", CompareOp::Ge, Value::Int(0)),
            },
        )
        .update(&s, &db)
        .unwrap_err();
        assert!(matches!(db_error(&err), Some(DbError::StatementCanceled)));
    }
}

// ============================================================================
// UNIQUE / PRIMARY KEY CONSTRAINTS
// ============================================================================

mod unique_constraints {
    use super::*;

    #[test]
    fn primary_key_constraint_enforces_uniqueness_via_index() {
        let (db, s) = setup();
        let table = accounts_table(&db);
        add_pk(&db, &s, "accounts", "id");

        table
            .add_row(&s, Row::new(vec![Value::Int(1), Value::Int(0)]))
            .unwrap();
        let err = table
            .add_row(&s, Row::new(vec![Value::Int(1), Value::Int(5)]))
            .unwrap_err();
        assert!(matches!(db_error(&err), Some(DbError::DuplicateKey { .. })));
        assert_eq!(table.row_count(&s), 1);
    }

    #[test]
    fn update_reinserting_same_key_is_allowed() {
        let (db, s) = setup();
        let table = accounts_table(&db);
        add_pk(&db, &s, "accounts", "id");

        let stored = table
            .add_row(&s, Row::new(vec![Value::Int(7), Value::Int(1)]))
            .unwrap();
        let updated = table
            .update_row(&s, &stored, Row::new(vec![Value::Int(7), Value::Int(2)]))
            .unwrap();
        assert_eq!(updated.pos(), stored.pos());
        assert_eq!(table.row_count(&s), 1);
    }

    #[test]
    fn dropping_unique_constraint_also_drops_backing_index() {
        let (db, s) = setup();
        let table = accounts_table(&db);
        AlterTableAddConstraint::new(
            "accounts",
            AddConstraintKind::Unique {
                columns: vec!["id".to_string()],
            },
        )
        .with_name("UQ_ID")
        .update(&s, &db)
        .unwrap();
        // scan index + backing unique index
        assert_eq!(table.indexes().len(), 2);

        DropConstraint::new("UQ_ID").update(&s, &db).unwrap();
        assert_eq!(table.indexes().len(), 1);
        assert!(table.constraints().is_empty());
    }
}

// ============================================================================
// REFERENTIAL CONSTRAINTS
// ============================================================================

mod referential_constraints {
    use super::*;

    fn parent_child(db: &Database, s: &Session) -> (Arc<Table>, Arc<Table>) {
        let parent = create_table(
            db,
            "departments",
            vec![
                Column::new("id", DataType::Int, false),
                Column::new("name", DataType::Text, true),
            ],
        );
        let child = create_table(
            db,
            "employees",
            vec![
                Column::new("id", DataType::Int, false),
                Column::new("dept_id", DataType::Int, true),
            ],
        );
        add_pk(db, s, "departments", "id");
        add_pk(db, s, "employees", "id");
        (parent, child)
    }

    fn add_fk(db: &Database, s: &Session, action: DeleteAction) {
        AlterTableAddConstraint::new(
            "employees",
            AddConstraintKind::Referential {
                columns: vec!["dept_id".to_string()],
                ref_table: "departments".to_string(),
                ref_columns: vec!["id".to_string()],
                delete_action: action,
            },
        )
        .with_name("FK_DEPT")
        .update(s, db)
        .unwrap();
    }

    #[test]
    fn child_insert_requires_parent_row() {
        let (db, s) = setup();
        let (parent, child) = parent_child(&db, &s);
        add_fk(&db, &s, DeleteAction::Restrict);

        let orphan = Row::new(vec![Value::Int(1), Value::Int(99)]);
        let err = child.add_row(&s, orphan.clone()).unwrap_err();
        assert!(matches!(
            db_error(&err),
            Some(DbError::ReferentialViolation { .. })
        ));
        assert_eq!(child.row_count(&s), 0);

        // After inserting the parent, the same insert succeeds.
        parent
            .add_row(&s, Row::new(vec![Value::Int(99), Value::Null]))
            .unwrap();
        child.add_row(&s, orphan).unwrap();
        assert_eq!(child.row_count(&s), 1);
    }

    #[test]
    fn null_foreign_key_is_exempt() {
        let (db, s) = setup();
        let (_parent, child) = parent_child(&db, &s);
        add_fk(&db, &s, DeleteAction::Restrict);
        child
            .add_row(&s, Row::new(vec![Value::Int(1), Value::Null]))
            .unwrap();
    }

    #[test]
    fn restrict_blocks_parent_delete_with_children() {
        let (db, s) = setup();
        let (parent, child) = parent_child(&db, &s);
        add_fk(&db, &s, DeleteAction::Restrict);

        let dept = parent
            .add_row(&s, Row::new(vec![Value::Int(1), Value::Null]))
            .unwrap();
        child
            .add_row(&s, Row::new(vec![Value::Int(10), Value::Int(1)]))
            .unwrap();

        let err = parent.remove_row(&s, &dept).unwrap_err();
        assert!(matches!(
            db_error(&err),
            Some(DbError::ReferentialViolation { .. })
        ));
        // The failed delete was undone.
        assert_eq!(parent.row_count(&s), 1);
    }

    #[test]
    fn cascade_delete_removes_children() {
        let (db, s) = setup();
        let (parent, child) = parent_child(&db, &s);
        add_fk(&db, &s, DeleteAction::Cascade);

        let dept = parent
            .add_row(&s, Row::new(vec![Value::Int(1), Value::Null]))
            .unwrap();
        for i in 0..3 {
            child
                .add_row(&s, Row::new(vec![Value::Int(10 + i), Value::Int(1)]))
                .unwrap();
        }
        child
            .add_row(&s, Row::new(vec![Value::Int(99), Value::Null]))
            .unwrap();

        parent.remove_row(&s, &dept).unwrap();
        assert_eq!(parent.row_count(&s), 0);
        // Only the NULL-keyed row survives.
        assert_eq!(child.row_count(&s), 1);
    }

    #[test]
    fn existing_orphans_block_fk_creation() {
        let (db, s) = setup();
        let (_parent, child) = parent_child(&db, &s);
        child
            .add_row(&s, Row::new(vec![Value::Int(1), Value::Int(77)]))
            .unwrap();

        let err = AlterTableAddConstraint::new(
            "employees",
            AddConstraintKind::Referential {
                columns: vec!["dept_id".to_string()],
                ref_table: "departments".to_string(),
                ref_columns: vec!["id".to_string()],
                delete_action: DeleteAction::Restrict,
            },
        )
        .update(&s, &db)
        .unwrap_err();
        assert!(matches!(
            db_error(&err),
            Some(DbError::ReferentialViolation { .. })
        ));
    }

    #[test]
    fn fk_requires_unique_index_on_referenced_columns() {
        let (db, s) = setup();
        create_table(
            &db,
            "departments",
            vec![Column::new("id", DataType::Int, false)],
        );
        create_table(
            &db,
            "employees",
            vec![
                Column::new("id", DataType::Int, false),
                Column::new("dept_id", DataType::Int, true),
            ],
        );
        // No primary key on departments.
        let err = AlterTableAddConstraint::new(
            "employees",
            AddConstraintKind::Referential {
                columns: vec!["dept_id".to_string()],
                ref_table: "departments".to_string(),
                ref_columns: vec!["id".to_string()],
                delete_action: DeleteAction::Restrict,
            },
        )
        .update(&s, &db)
        .unwrap_err();
        assert!(format!("{:#}", err).contains("no unique index"));
    }
}

// ============================================================================
// COLUMN DEPENDENCY ANALYSIS
// ============================================================================

#[test]
fn referenced_columns_cover_both_ends_of_a_relationship() {
    let (db, s) = setup();
    let parent = create_table(
        &db,
        "departments",
        vec![Column::new("id", DataType::Int, false)],
    );
    let child = create_table(
        &db,
        "employees",
        vec![
            Column::new("id", DataType::Int, false),
            Column::new("dept_id", DataType::Int, true),
        ],
    );
    add_pk(&db, &s, "departments", "id");
    AlterTableAddConstraint::new(
        "employees",
        AddConstraintKind::Referential {
            columns: vec!["dept_id".to_string()],
            ref_table: "departments".to_string(),
            ref_columns: vec!["id".to_string()],
            delete_action: DeleteAction::Restrict,
        },
    )
    .with_name("FK_DEPT")
    .update(&s, &db)
    .unwrap();

    let fk = child.find_constraint("FK_DEPT").unwrap();
    let child_cols = fk.referenced_columns(&child);
    assert!(child_cols.contains(&1));
    let parent_cols = fk.referenced_columns(&parent);
    assert!(parent_cols.contains(&0));
}
