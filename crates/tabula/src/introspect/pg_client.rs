//! Catalog connection to a real Postgres server.

use tokio::runtime::{Builder, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::Instrument;

use super::{CatalogConnection, CatalogError, CatalogRow};
use crate::{Error, Result};

/// A `tokio-postgres` client driven by its own current-thread runtime, so
/// introspection can stay synchronous.
///
/// ```ignore
/// use tabula::{Introspector, PgCatalog, PostgresIntrospector};
///
/// let catalog = PgCatalog::connect("postgres://localhost/app")?;
/// let schema = PostgresIntrospector::new(catalog).introspect()?;
/// ```
pub struct PgCatalog {
    runtime: Runtime,
    client: Client,
}

impl PgCatalog {
    pub fn connect(url: &str) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;

        let (client, connection) = runtime.block_on(tokio_postgres::connect(url, NoTls))?;
        runtime.spawn(async move {
            if let Err(error) = connection.await {
                tracing::error!(%error, "postgres connection closed with an error");
            }
        });

        tracing::debug!("connected to postgres");
        Ok(Self { runtime, client })
    }

    /// Run one or more `;`-separated statements, such as a generated
    /// migration script.
    pub fn batch_execute(&mut self, sql: &str) -> Result<()> {
        let span = tracing::debug_span!("catalog.batch_execute", sql = %sql);
        self.runtime
            .block_on(self.client.batch_execute(sql).instrument(span))?;
        Ok(())
    }
}

impl CatalogConnection for PgCatalog {
    fn query(
        &mut self,
        sql: &str,
        params: &[&str],
    ) -> std::result::Result<Vec<CatalogRow>, CatalogError> {
        let span = tracing::debug_span!(
            "catalog.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let params: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();
        let rows = self
            .runtime
            .block_on(self.client.query(sql, &params).instrument(span.clone()))?;
        span.record("rows", rows.len());

        let rows = rows
            .iter()
            .map(to_catalog_row)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn to_catalog_row(row: &Row) -> std::result::Result<CatalogRow, tokio_postgres::Error> {
    let mut out = CatalogRow::new();
    for (i, column) in row.columns().iter().enumerate() {
        out.insert(column.name(), row.try_get::<_, Option<String>>(i)?);
    }
    Ok(out)
}
