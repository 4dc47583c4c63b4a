//! Positional parameter binding.
//!
//! Placeholders stay backend-native (`$1` for PostgreSQL, `?` for MySQL and
//! SQLite, `@P1` for SQL Server); only the values are bound here, in order.

use crate::models::QueryParam;
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Database, MySql, Postgres, Sqlite};

/// Bind `QueryParam`s onto a driver query.
pub(crate) trait BindParams<'q>: Sized {
    fn bind_param(self, param: &'q QueryParam) -> Self;

    fn bind_params(self, params: &'q [QueryParam]) -> Self {
        params.iter().fold(self, Self::bind_param)
    }
}

/// Implements `BindParams` for a sqlx query type. `$json` converts a JSON
/// value into something the backend can bind.
macro_rules! impl_sqlx_bind {
    ($db:ty, |$v:ident| $json:expr) => {
        impl<'q> BindParams<'q> for Query<'q, $db, <$db as Database>::Arguments<'q>> {
            fn bind_param(self, param: &'q QueryParam) -> Self {
                match param {
                    QueryParam::Null => self.bind(None::<String>),
                    QueryParam::Bool(b) => self.bind(*b),
                    QueryParam::Int(i) => self.bind(*i),
                    QueryParam::Float(f) => self.bind(*f),
                    QueryParam::String(s) => self.bind(s.as_str()),
                    QueryParam::Json($v) => self.bind($json),
                }
            }
        }
    };
}

impl_sqlx_bind!(Postgres, |v| Json(v));
impl_sqlx_bind!(MySql, |v| Json(v));
// No JSON column type; bound as text
impl_sqlx_bind!(Sqlite, |v| v.to_string());

/// SQL Server parameters; tiberius owns bound values.
pub(crate) fn bind_mssql_params(query: &mut tiberius::Query<'_>, params: &[QueryParam]) {
    for param in params {
        match param {
            QueryParam::Null => query.bind(Option::<String>::None),
            QueryParam::Bool(b) => query.bind(*b),
            QueryParam::Int(i) => query.bind(*i),
            QueryParam::Float(f) => query.bind(*f),
            QueryParam::String(s) => query.bind(s.clone()),
            QueryParam::Json(v) => query.bind(v.to_string()),
        }
    }
}
