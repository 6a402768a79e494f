use async_trait::async_trait;
use casbin::error::AdapterError;
use casbin::{Adapter, Filter, Model};
use sea_orm::sea_query::{Alias, ColumnDef, Expr, Order, Query, SimpleExpr, Table};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, QueryResult, TransactionTrait};

use crate::authz::errors::AuthzError;
use crate::authz::types::{pad_rule, section_of, trim_rule, RULE_WIDTH};

const ID_COLUMN: &str = "id";
const PTYPE_COLUMN: &str = "ptype";
const VALUE_COLUMNS: [&str; RULE_WIDTH] = ["v0", "v1", "v2", "v3", "v4", "v5"];

/// Reject anything that is not a plain SQL identifier.
pub fn validate_table_name(table: &str) -> Result<(), AuthzError> {
    let valid = !table.is_empty()
        && table.len() <= 63
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(AuthzError::Configuration(format!(
            "invalid policy table name `{}`",
            table
        )))
    }
}

fn adapter_error(e: DbErr) -> casbin::Error {
    AdapterError(Box::new(e)).into()
}

fn rule_columns() -> Vec<Alias> {
    std::iter::once(PTYPE_COLUMN)
        .chain(VALUE_COLUMNS)
        .map(Alias::new)
        .collect()
}

/// Casbin adapter storing `(ptype, v0..v5)` rows in one table through sea-orm.
///
/// Rows are always written six values wide, padded with empty strings, and
/// trailing empty values are dropped again on load.
pub struct SeaOrmAdapter {
    db: DatabaseConnection,
    table: String,
    is_filtered: bool,
}

impl SeaOrmAdapter {
    /// Bind to `table`, creating it when missing.
    pub async fn new(db: DatabaseConnection, table: &str) -> Result<Self, AuthzError> {
        validate_table_name(table)?;
        let adapter = Self {
            db,
            table: table.to_string(),
            is_filtered: false,
        };
        adapter.ensure_table().await.map_err(|e| {
            AuthzError::Configuration(format!("cannot prepare policy table `{}`: {}", table, e))
        })?;
        Ok(adapter)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn ensure_table(&self) -> Result<(), DbErr> {
        let mut stmt = Table::create();
        stmt.table(Alias::new(&self.table)).if_not_exists().col(
            ColumnDef::new(Alias::new(ID_COLUMN))
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        );
        for col in std::iter::once(PTYPE_COLUMN).chain(VALUE_COLUMNS) {
            stmt.col(ColumnDef::new(Alias::new(col)).string().not_null().default(""));
        }

        let backend = self.db.get_database_backend();
        self.db.execute(backend.build(&stmt)).await?;
        Ok(())
    }

    /// Rows of one section (`p` or `g`), optionally restricted by positional
    /// values; empty values match anything.
    async fn select_rules(
        &self,
        sec: &str,
        conditions: &[&str],
    ) -> Result<Vec<(String, Vec<String>)>, DbErr> {
        let mut stmt = Query::select();
        stmt.columns(rule_columns())
            .from(Alias::new(&self.table))
            .and_where(Expr::col(Alias::new(PTYPE_COLUMN)).like(format!("{}%", sec)))
            .order_by(Alias::new(ID_COLUMN), Order::Asc);
        for (col, value) in VALUE_COLUMNS.iter().zip(conditions) {
            if !value.is_empty() {
                stmt.and_where(Expr::col(Alias::new(*col)).eq(*value));
            }
        }

        let backend = self.db.get_database_backend();
        let rows = self.db.query_all(backend.build(&stmt)).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn rule_exists<C: ConnectionTrait>(
        &self,
        conn: &C,
        ptype: &str,
        rule: &[String],
    ) -> Result<bool, DbErr> {
        let mut stmt = Query::select();
        stmt.column(Alias::new(ID_COLUMN))
            .from(Alias::new(&self.table))
            .and_where(Expr::col(Alias::new(PTYPE_COLUMN)).eq(ptype))
            .limit(1);
        for (col, value) in VALUE_COLUMNS.iter().zip(pad_rule(rule)) {
            stmt.and_where(Expr::col(Alias::new(*col)).eq(value));
        }
        let backend = conn.get_database_backend();
        Ok(conn.query_one(backend.build(&stmt)).await?.is_some())
    }

    /// Insert rules that are not stored yet.
    async fn insert_rules(&self, ptype: &str, rules: &[Vec<String>]) -> Result<u64, DbErr> {
        let txn = self.db.begin().await?;
        let mut inserted = 0;
        for rule in rules {
            if self.rule_exists(&txn, ptype, rule).await? {
                continue;
            }
            let mut values: Vec<SimpleExpr> = vec![ptype.into()];
            values.extend(pad_rule(rule).into_iter().map(SimpleExpr::from));

            let mut stmt = Query::insert();
            stmt.into_table(Alias::new(&self.table))
                .columns(rule_columns())
                .values(values)
                .map_err(|e| DbErr::Custom(e.to_string()))?;
            let backend = txn.get_database_backend();
            txn.execute(backend.build(&stmt)).await?;
            inserted += 1;
        }
        txn.commit().await?;
        Ok(inserted)
    }

    async fn delete_rules(&self, ptype: &str, rules: &[Vec<String>]) -> Result<u64, DbErr> {
        let txn = self.db.begin().await?;
        let mut removed = 0;
        for rule in rules {
            let mut stmt = Query::delete();
            stmt.from_table(Alias::new(&self.table))
                .and_where(Expr::col(Alias::new(PTYPE_COLUMN)).eq(ptype));
            for (col, value) in VALUE_COLUMNS.iter().zip(pad_rule(rule)) {
                stmt.and_where(Expr::col(Alias::new(*col)).eq(value));
            }
            let backend = txn.get_database_backend();
            removed += txn.execute(backend.build(&stmt)).await?.rows_affected();
        }
        txn.commit().await?;
        Ok(removed)
    }

    async fn delete_all(&self) -> Result<(), DbErr> {
        let mut stmt = Query::delete();
        stmt.from_table(Alias::new(&self.table));
        let backend = self.db.get_database_backend();
        self.db.execute(backend.build(&stmt)).await?;
        Ok(())
    }

    /// Drop `table` if it holds no rows. Returns whether it was dropped.
    pub async fn drop_table_if_empty(
        db: &DatabaseConnection,
        table: &str,
    ) -> Result<bool, AuthzError> {
        validate_table_name(table)?;
        let backend = db.get_database_backend();

        let mut probe = Query::select();
        probe
            .column(Alias::new(ID_COLUMN))
            .from(Alias::new(table))
            .limit(1);
        if db.query_one(backend.build(&probe)).await?.is_some() {
            return Ok(false);
        }

        let drop = Table::drop().table(Alias::new(table)).if_exists().to_owned();
        db.execute(backend.build(&drop)).await?;
        tracing::info!(table = %table, "Dropped empty policy table");
        Ok(true)
    }
}

fn decode_row(row: &QueryResult) -> Result<(String, Vec<String>), DbErr> {
    let ptype: String = row.try_get("", PTYPE_COLUMN)?;
    let mut values = Vec::with_capacity(RULE_WIDTH);
    for col in VALUE_COLUMNS {
        values.push(row.try_get::<String>("", col)?);
    }
    Ok((ptype, trim_rule(values)))
}

fn load_rows(m: &mut dyn Model, rows: Vec<(String, Vec<String>)>) {
    for (ptype, rule) in rows {
        if let Some(sec) = section_of(&ptype) {
            m.add_policy(sec, &ptype, rule);
        }
    }
}

#[async_trait]
impl Adapter for SeaOrmAdapter {
    async fn load_policy(&mut self, m: &mut dyn Model) -> casbin::Result<()> {
        for sec in ["p", "g"] {
            let rows = self.select_rules(sec, &[]).await.map_err(adapter_error)?;
            load_rows(m, rows);
        }
        self.is_filtered = false;
        Ok(())
    }

    async fn load_filtered_policy<'a>(
        &mut self,
        m: &mut dyn Model,
        f: Filter<'a>,
    ) -> casbin::Result<()> {
        let rows = self.select_rules("p", &f.p).await.map_err(adapter_error)?;
        load_rows(m, rows);
        // An empty grouping filter means the model has no roles to load
        if !f.g.is_empty() {
            let rows = self.select_rules("g", &f.g).await.map_err(adapter_error)?;
            load_rows(m, rows);
        }
        self.is_filtered = true;
        Ok(())
    }

    async fn save_policy(&mut self, m: &mut dyn Model) -> casbin::Result<()> {
        self.delete_all().await.map_err(adapter_error)?;
        for sec in ["p", "g"] {
            let ptypes: Vec<String> = match m.get_model().get(sec) {
                Some(assertions) => assertions.keys().cloned().collect(),
                None => continue,
            };
            for ptype in ptypes {
                let rules = m.get_policy(sec, &ptype);
                self.insert_rules(&ptype, &rules)
                    .await
                    .map_err(adapter_error)?;
            }
        }
        Ok(())
    }

    async fn clear_policy(&mut self) -> casbin::Result<()> {
        self.delete_all().await.map_err(adapter_error)
    }

    fn is_filtered(&self) -> bool {
        self.is_filtered
    }

    async fn add_policy(&mut self, _sec: &str, ptype: &str, rule: Vec<String>) -> casbin::Result<bool> {
        self.insert_rules(ptype, &[rule])
            .await
            .map_err(adapter_error)?;
        Ok(true)
    }

    async fn add_policies(
        &mut self,
        _sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> casbin::Result<bool> {
        let inserted = self.insert_rules(ptype, &rules).await.map_err(adapter_error)?;
        tracing::debug!(table = %self.table, ptype, inserted, "Stored policy rows");
        Ok(true)
    }

    async fn remove_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        rule: Vec<String>,
    ) -> casbin::Result<bool> {
        self.delete_rules(ptype, &[rule])
            .await
            .map_err(adapter_error)?;
        Ok(true)
    }

    async fn remove_policies(
        &mut self,
        _sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> casbin::Result<bool> {
        let removed = self.delete_rules(ptype, &rules).await.map_err(adapter_error)?;
        tracing::debug!(table = %self.table, ptype, removed, "Removed policy rows");
        Ok(true)
    }

    async fn remove_filtered_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> casbin::Result<bool> {
        if field_index >= RULE_WIDTH {
            return Ok(false);
        }

        let mut stmt = Query::delete();
        stmt.from_table(Alias::new(&self.table))
            .and_where(Expr::col(Alias::new(PTYPE_COLUMN)).eq(ptype));
        for (col, value) in VALUE_COLUMNS[field_index..].iter().zip(field_values) {
            if !value.is_empty() {
                stmt.and_where(Expr::col(Alias::new(*col)).eq(value));
            }
        }

        let backend = self.db.get_database_backend();
        let res = self
            .db
            .execute(backend.build(&stmt))
            .await
            .map_err(adapter_error)?;
        Ok(res.rows_affected() > 0)
    }
}
